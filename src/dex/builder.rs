//! DEX builder: typed vectors plus intern maps, able to load an existing
//! image, apply class-level edits, and rematerialize the byte image in
//! canonical order.
//!
//! Intern map keys: string bytes, type descriptor, proto signature
//! `"(P1P2..)R"`, field key `"Lclass;->name:type"`, method key
//! `"Lclass;->name(P1P2..)R"`. Insertion order determines pool index and is
//! never reordered, so indices handed out stay stable.

use std::collections::HashMap;

use adler::adler32_slice;
use log::{debug, error};
use sha1::{Digest, Sha1};

use crate::bytes::{align4, patch_u32_le, write_u16_le, write_u32_le, write_uleb128};
use crate::dex::assemble::{parse_class_source, Assembler, SmaliClassSource};
use crate::dex::dex_file::{AccessFlags, DexFile, DexString, HEADER_SIZE, NO_INDEX};
use crate::dex::error::DexError;
use crate::fail;

const TYPE_HEADER_ITEM: u16 = 0x0000;
const TYPE_STRING_ID_ITEM: u16 = 0x0001;
const TYPE_TYPE_ID_ITEM: u16 = 0x0002;
const TYPE_PROTO_ID_ITEM: u16 = 0x0003;
const TYPE_FIELD_ID_ITEM: u16 = 0x0004;
const TYPE_METHOD_ID_ITEM: u16 = 0x0005;
const TYPE_CLASS_DEF_ITEM: u16 = 0x0006;
const TYPE_MAP_LIST: u16 = 0x1000;

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub type_desc: String,
    pub access_flags: u32,
}

#[derive(Debug, Clone)]
pub struct MethodDef {
    pub name: String,
    /// Signature in `"(P1P2..)R"` form.
    pub proto: String,
    pub access_flags: u32,
    pub registers_size: u16,
    pub ins_size: u16,
    pub outs_size: u16,
    /// Raw instruction bytes; empty means abstract/native (no code item).
    pub code: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ClassBuilder {
    pub class_name: String,
    pub super_class: Option<String>,
    pub access_flags: u32,
    pub source_file: Option<String>,
    pub interfaces: Vec<String>,
    pub static_fields: Vec<FieldDef>,
    pub instance_fields: Vec<FieldDef>,
    pub direct_methods: Vec<MethodDef>,
    pub virtual_methods: Vec<MethodDef>,
}

impl ClassBuilder {
    pub fn new(class_name: &str) -> Self {
        ClassBuilder {
            class_name: class_name.to_string(),
            super_class: Some("Ljava/lang/Object;".to_string()),
            access_flags: 0x1,
            source_file: None,
            interfaces: vec![],
            static_fields: vec![],
            instance_fields: vec![],
            direct_methods: vec![],
            virtual_methods: vec![],
        }
    }

    /// Static, private and constructor methods are direct; everything else
    /// dispatches virtually.
    pub fn add_method(&mut self, method: MethodDef) {
        let flags = AccessFlags::from_bits_truncate(method.access_flags);
        if flags.intersects(AccessFlags::STATIC | AccessFlags::PRIVATE | AccessFlags::CONSTRUCTOR) {
            self.direct_methods.push(method);
        } else {
            self.virtual_methods.push(method);
        }
    }
}

#[derive(Debug, Clone)]
struct ProtoDef {
    shorty_idx: u32,
    return_type_idx: u32,
    param_type_idxs: Vec<u32>,
}

#[derive(Debug, Default)]
pub struct DexBuilder {
    strings: Vec<String>,
    string_map: HashMap<String, u32>,
    types: Vec<String>,
    type_map: HashMap<String, u32>,
    protos: Vec<ProtoDef>,
    proto_map: HashMap<String, u32>,
    fields: Vec<(u32, u32, u32)>, // (class type idx, type idx, name string idx)
    field_map: HashMap<String, u32>,
    methods: Vec<(u32, u32, u32)>, // (class type idx, proto idx, name string idx)
    method_map: HashMap<String, u32>,
    classes: Vec<ClassBuilder>,
    class_map: HashMap<String, usize>,
    original: Option<Vec<u8>>,
    dirty: bool,
}

/// Splits a parameter string like `"ILjava/lang/String;[J"` into individual
/// type descriptors.
pub fn split_type_list(params: &str) -> Vec<String> {
    let bytes = params.as_bytes();
    let mut out = vec![];
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        while i < bytes.len() && bytes[i] == b'[' {
            i += 1;
        }
        if i < bytes.len() && bytes[i] == b'L' {
            while i < bytes.len() && bytes[i] != b';' {
                i += 1;
            }
            if i < bytes.len() {
                i += 1;
            }
        } else if i < bytes.len() {
            i += 1;
        }
        out.push(params[start..i].to_string());
    }
    out
}

fn shorty_char(desc: &str) -> char {
    match desc.as_bytes().first() {
        Some(b'L') | Some(b'[') => 'L',
        Some(&c) => c as char,
        None => 'V',
    }
}

fn proto_shorty(return_type: &str, params: &[String]) -> String {
    let mut s = String::new();
    s.push(shorty_char(return_type));
    for p in params {
        s.push(shorty_char(p));
    }
    s
}

impl DexBuilder {
    pub fn new() -> Self {
        DexBuilder::default()
    }

    /// Loads an existing DEX into the builder: pools feed the intern maps in
    /// their original order, and every class is materialized so the image can
    /// be rebuilt after edits. If nothing is changed, [`DexBuilder::build`]
    /// returns the original bytes verbatim.
    pub fn load(bytes: &[u8]) -> Result<DexBuilder, DexError> {
        let dex = DexFile::parse(bytes)?;
        let mut b = DexBuilder::new();

        for s in &dex.strings {
            let text = s.to_string_lossy();
            b.string_map.entry(text.clone()).or_insert(b.strings.len() as u32);
            b.strings.push(text);
        }
        for &string_idx in &dex.types {
            let desc = dex.string(string_idx);
            b.type_map.entry(desc.clone()).or_insert(b.types.len() as u32);
            b.types.push(desc);
        }
        for proto in &dex.protos {
            let key = dex.proto_string(b.protos.len() as u32);
            b.proto_map.entry(key).or_insert(b.protos.len() as u32);
            b.protos.push(ProtoDef {
                shorty_idx: proto.shorty_idx,
                return_type_idx: proto.return_type_idx,
                param_type_idxs: proto.parameters.clone(),
            });
        }
        for (i, f) in dex.fields.iter().enumerate() {
            b.field_map
                .entry(dex.field_signature(i as u32))
                .or_insert(i as u32);
            b.fields.push((f.class_idx, f.type_idx, f.name_idx));
        }
        for (i, m) in dex.methods.iter().enumerate() {
            b.method_map
                .entry(dex.method_signature(i as u32))
                .or_insert(i as u32);
            b.methods.push((m.class_idx, m.proto_idx, m.name_idx));
        }

        for cls in &dex.class_defs {
            let mut cb = ClassBuilder::new(&dex.type_name(cls.class_idx));
            cb.access_flags = cls.access_flags;
            cb.super_class = if cls.superclass_idx == NO_INDEX {
                None
            } else {
                Some(dex.type_name(cls.superclass_idx))
            };
            cb.source_file = if cls.source_file_idx == NO_INDEX {
                None
            } else {
                Some(dex.string(cls.source_file_idx))
            };
            if cls.interfaces_off != 0 {
                for t in dex.type_list(cls.interfaces_off)? {
                    cb.interfaces.push(dex.type_name(t));
                }
            }
            if cls.class_data_off != 0 {
                let cd = dex.class_data(cls.class_data_off)?;
                for f in &cd.static_fields {
                    if let Some(fid) = dex.fields.get(f.field_idx as usize) {
                        cb.static_fields.push(FieldDef {
                            name: dex.string(fid.name_idx),
                            type_desc: dex.type_name(fid.type_idx),
                            access_flags: f.access_flags,
                        });
                    }
                }
                for f in &cd.instance_fields {
                    if let Some(fid) = dex.fields.get(f.field_idx as usize) {
                        cb.instance_fields.push(FieldDef {
                            name: dex.string(fid.name_idx),
                            type_desc: dex.type_name(fid.type_idx),
                            access_flags: f.access_flags,
                        });
                    }
                }
                let materialize = |m: &crate::dex::dex_file::EncodedMethod| -> Result<MethodDef, DexError> {
                    let mid = dex
                        .methods
                        .get(m.method_idx as usize)
                        .ok_or_else(|| DexError::new("method index out of range in class data"))?;
                    let (registers, ins, outs, code) = if m.code_off != 0 {
                        let c = dex.code_item(m.code_off)?;
                        (c.registers_size, c.ins_size, c.outs_size, c.insns)
                    } else {
                        (0, 0, 0, vec![])
                    };
                    Ok(MethodDef {
                        name: dex.string(mid.name_idx),
                        proto: dex.proto_string(mid.proto_idx),
                        access_flags: m.access_flags,
                        registers_size: registers,
                        ins_size: ins,
                        outs_size: outs,
                        code,
                    })
                };
                for m in &cd.direct_methods {
                    cb.direct_methods.push(materialize(m)?);
                }
                for m in &cd.virtual_methods {
                    cb.virtual_methods.push(materialize(m)?);
                }
            }
            b.class_map.insert(cb.class_name.clone(), b.classes.len());
            b.classes.push(cb);
        }

        b.original = Some(bytes.to_vec());
        b.dirty = false;
        debug!("builder loaded {} classes", b.classes.len());
        Ok(b)
    }

    pub fn get_or_add_string(&mut self, s: &str) -> u32 {
        if let Some(&ix) = self.string_map.get(s) {
            return ix;
        }
        let ix = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.string_map.insert(s.to_string(), ix);
        self.dirty = true;
        ix
    }

    pub fn get_or_add_type(&mut self, desc: &str) -> u32 {
        if let Some(&ix) = self.type_map.get(desc) {
            return ix;
        }
        self.get_or_add_string(desc);
        let ix = self.types.len() as u32;
        self.types.push(desc.to_string());
        self.type_map.insert(desc.to_string(), ix);
        self.dirty = true;
        ix
    }

    pub fn get_or_add_proto(&mut self, proto: &str) -> Result<u32, DexError> {
        if let Some(&ix) = self.proto_map.get(proto) {
            return Ok(ix);
        }
        let Some(close) = proto.find(')') else {
            fail!("malformed proto signature: {}", proto);
        };
        if !proto.starts_with('(') {
            fail!("malformed proto signature: {}", proto);
        }
        let params = split_type_list(&proto[1..close]);
        let return_type = &proto[close + 1..];
        if return_type.is_empty() {
            fail!("proto signature missing return type: {}", proto);
        }
        let shorty_idx = self.get_or_add_string(&proto_shorty(return_type, &params));
        let return_type_idx = self.get_or_add_type(return_type);
        let param_type_idxs = params.iter().map(|p| self.get_or_add_type(p)).collect();
        let ix = self.protos.len() as u32;
        self.protos.push(ProtoDef {
            shorty_idx,
            return_type_idx,
            param_type_idxs,
        });
        self.proto_map.insert(proto.to_string(), ix);
        self.dirty = true;
        Ok(ix)
    }

    pub fn get_or_add_field(&mut self, class_name: &str, field_name: &str, type_desc: &str) -> u32 {
        let key = format!("{}->{}:{}", class_name, field_name, type_desc);
        if let Some(&ix) = self.field_map.get(&key) {
            return ix;
        }
        let class_idx = self.get_or_add_type(class_name);
        let type_idx = self.get_or_add_type(type_desc);
        let name_idx = self.get_or_add_string(field_name);
        let ix = self.fields.len() as u32;
        self.fields.push((class_idx, type_idx, name_idx));
        self.field_map.insert(key, ix);
        self.dirty = true;
        ix
    }

    pub fn get_or_add_method(
        &mut self,
        class_name: &str,
        method_name: &str,
        proto: &str,
    ) -> Result<u32, DexError> {
        let key = format!("{}->{}{}", class_name, method_name, proto);
        if let Some(&ix) = self.method_map.get(&key) {
            return Ok(ix);
        }
        let class_idx = self.get_or_add_type(class_name);
        let proto_idx = self.get_or_add_proto(proto)?;
        let name_idx = self.get_or_add_string(method_name);
        let ix = self.methods.len() as u32;
        self.methods.push((class_idx, proto_idx, name_idx));
        self.method_map.insert(key, ix);
        self.dirty = true;
        Ok(ix)
    }

    pub fn get_class(&self, class_name: &str) -> Option<&ClassBuilder> {
        self.class_map.get(class_name).map(|&i| &self.classes[i])
    }

    pub fn make_class(&mut self, class_name: &str) -> &mut ClassBuilder {
        if let Some(&i) = self.class_map.get(class_name) {
            return &mut self.classes[i];
        }
        self.get_or_add_type(class_name);
        self.class_map.insert(class_name.to_string(), self.classes.len());
        self.classes.push(ClassBuilder::new(class_name));
        self.dirty = true;
        self.classes.last_mut().unwrap()
    }

    pub fn delete_class(&mut self, class_name: &str) -> bool {
        let Some(pos) = self.class_map.remove(class_name) else {
            return false;
        };
        self.classes.remove(pos);
        for ix in self.class_map.values_mut() {
            if *ix > pos {
                *ix -= 1;
            }
        }
        self.dirty = true;
        true
    }

    /// Interns every fully-qualified reference a smali body names, so the
    /// assembler can resolve literals that were not in the loaded pools.
    fn intern_body_references(&mut self, body: &str) -> Result<(), DexError> {
        for line in body.lines() {
            let text = line.trim();
            if text.is_empty() || text.starts_with('.') || text.starts_with(':') || text.starts_with('#') {
                continue;
            }
            let operands = match text.find(' ') {
                Some(space) => &text[space + 1..],
                None => continue,
            };
            for part in crate::dex::assemble::split_operands(operands) {
                let p = part.trim();
                if let Some(inner) = p.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
                    self.get_or_add_string(inner);
                } else if let Some((class_part, member)) = p.split_once("->") {
                    if let Some(paren) = member.find('(') {
                        self.get_or_add_method(class_part, &member[..paren], &member[paren..])?;
                    } else if let Some((name, type_desc)) = member.rsplit_once(':') {
                        self.get_or_add_field(class_part, name, type_desc);
                    }
                } else if (p.starts_with('L') && p.ends_with(';')) || p.starts_with('[') {
                    self.get_or_add_type(p);
                }
            }
        }
        Ok(())
    }

    fn assembler(&self) -> Assembler {
        let mut methods = Vec::with_capacity(self.methods.len());
        for &(class_idx, proto_idx, name_idx) in &self.methods {
            methods.push(format!(
                "{}->{}{}",
                self.types.get(class_idx as usize).cloned().unwrap_or_default(),
                self.strings.get(name_idx as usize).cloned().unwrap_or_default(),
                self.proto_string(proto_idx)
            ));
        }
        let mut fields = Vec::with_capacity(self.fields.len());
        for &(class_idx, type_idx, name_idx) in &self.fields {
            fields.push(format!(
                "{}->{}:{}",
                self.types.get(class_idx as usize).cloned().unwrap_or_default(),
                self.strings.get(name_idx as usize).cloned().unwrap_or_default(),
                self.types.get(type_idx as usize).cloned().unwrap_or_default()
            ));
        }
        Assembler {
            strings: self.strings.clone(),
            types: self.types.clone(),
            methods,
            fields,
        }
    }

    fn proto_string(&self, proto_idx: u32) -> String {
        let Some(p) = self.protos.get(proto_idx as usize) else {
            return "()V".to_string();
        };
        let mut s = String::from("(");
        for &t in &p.param_type_idxs {
            s.push_str(self.types.get(t as usize).map(String::as_str).unwrap_or(""));
        }
        s.push(')');
        s.push_str(
            self.types
                .get(p.return_type_idx as usize)
                .map(String::as_str)
                .unwrap_or(""),
        );
        s
    }

    fn assemble_class_source(&mut self, src: &SmaliClassSource) -> Result<Vec<MethodDef>, DexError> {
        self.get_or_add_type(&src.class_name);
        self.get_or_add_type(&src.super_class);
        for m in &src.methods {
            self.get_or_add_method(&src.class_name, &m.name, &m.proto)?;
            self.intern_body_references(&m.body)?;
        }
        let assembler = self.assembler();
        let mut defs = vec![];
        for m in &src.methods {
            let code = assembler
                .assemble(&m.body)
                .map_err(|e| DexError::with_context(e, format!("method {}{}", m.name, m.proto)))?;
            let params = {
                let close = m.proto.find(')').unwrap_or(0);
                split_type_list(&m.proto[1..close])
            };
            let is_static = AccessFlags::from_bits_truncate(m.access_flags).contains(AccessFlags::STATIC);
            let mut ins: u16 = if is_static { 0 } else { 1 };
            for p in &params {
                ins += if p == "J" || p == "D" { 2 } else { 1 };
            }
            defs.push(MethodDef {
                name: m.name.clone(),
                proto: m.proto.clone(),
                access_flags: m.access_flags,
                registers_size: m.registers.max(ins),
                ins_size: ins,
                outs_size: 0,
                code,
            });
        }
        Ok(defs)
    }

    /// Replaces the method bodies of an existing class with ones assembled
    /// from `smali`. Fields and class-level metadata are kept.
    pub fn modify_class(&mut self, class_name: &str, smali: &str) -> Result<(), DexError> {
        let src = parse_class_source(smali)?;
        let target = if src.class_name.is_empty() {
            class_name.to_string()
        } else {
            src.class_name.clone()
        };
        if target != class_name {
            fail!("smali declares {} but {} was requested", target, class_name);
        }
        if !self.class_map.contains_key(class_name) {
            fail!("class not found: {}", class_name);
        }
        let defs = self.assemble_class_source(&src)?;
        let pos = self.class_map[class_name];
        let cb = &mut self.classes[pos];
        cb.direct_methods.clear();
        cb.virtual_methods.clear();
        for def in defs {
            cb.add_method(def);
        }
        self.dirty = true;
        Ok(())
    }

    /// Adds a new class from a smali document. Fails if the class exists.
    pub fn add_class(&mut self, smali: &str) -> Result<(), DexError> {
        let src = parse_class_source(smali)?;
        if self.class_map.contains_key(&src.class_name) {
            fail!("class already present: {}", src.class_name);
        }
        let defs = self.assemble_class_source(&src)?;
        let mut cb = ClassBuilder::new(&src.class_name);
        cb.access_flags = if src.access_flags == 0 { 0x1 } else { src.access_flags };
        cb.super_class = Some(src.super_class.clone());
        for def in defs {
            cb.add_method(def);
        }
        self.class_map.insert(src.class_name.clone(), self.classes.len());
        self.classes.push(cb);
        self.dirty = true;
        Ok(())
    }

    fn field_pool_idx(&self, class_name: &str, f: &FieldDef) -> Option<u32> {
        self.field_map
            .get(&format!("{}->{}:{}", class_name, f.name, f.type_desc))
            .copied()
    }

    fn method_pool_idx(&self, class_name: &str, m: &MethodDef) -> Option<u32> {
        self.method_map
            .get(&format!("{}->{}{}", class_name, m.name, m.proto))
            .copied()
    }

    /// Ensures every field/method carried by materialized classes has a pool
    /// id. New classes added through the typed API (rather than smali) may
    /// name members that were never interned.
    fn intern_class_members(&mut self) -> Result<(), DexError> {
        let classes: Vec<(String, Vec<FieldDef>, Vec<MethodDef>)> = self
            .classes
            .iter()
            .map(|c| {
                (
                    c.class_name.clone(),
                    c.static_fields.iter().chain(c.instance_fields.iter()).cloned().collect(),
                    c.direct_methods.iter().chain(c.virtual_methods.iter()).cloned().collect(),
                )
            })
            .collect();
        for (name, fields, methods) in classes {
            self.get_or_add_type(&name);
            for f in fields {
                self.get_or_add_field(&name, &f.name, &f.type_desc);
            }
            for m in methods {
                self.get_or_add_method(&name, &m.name, &m.proto)?;
            }
        }
        Ok(())
    }

    fn build_code_item(out: &mut Vec<u8>, m: &MethodDef) {
        write_u16_le(out, m.registers_size);
        write_u16_le(out, m.ins_size);
        write_u16_le(out, m.outs_size);
        write_u16_le(out, 0); // tries
        write_u32_le(out, 0); // debug info
        write_u32_le(out, (m.code.len() / 2) as u32);
        out.extend_from_slice(&m.code);
        align4(out);
    }

    /// Rematerializes the byte image: data first (string bodies, type lists,
    /// code items, class data), then the fixed-size id tables, class defs and
    /// map list; finally the header is patched and SHA-1/Adler-32 stamped.
    pub fn build(&mut self) -> Result<Vec<u8>, DexError> {
        if !self.dirty {
            if let Some(original) = &self.original {
                return Ok(original.clone());
            }
        }
        self.intern_class_members()?;

        let mut out = vec![0u8; HEADER_SIZE as usize];
        out[0..8].copy_from_slice(&crate::dex::dex_file::DEX_FILE_MAGIC);
        let data_off = out.len() as u32;

        // String bodies.
        let mut string_data_offs = Vec::with_capacity(self.strings.len());
        for s in &self.strings {
            string_data_offs.push(out.len() as u32);
            DexString::from_string(s).write(&mut out);
        }
        align4(&mut out);

        // Proto parameter type lists, one per proto, word-aligned.
        let mut proto_param_offs = Vec::with_capacity(self.protos.len());
        for p in &self.protos {
            if p.param_type_idxs.is_empty() {
                proto_param_offs.push(0u32);
            } else {
                align4(&mut out);
                proto_param_offs.push(out.len() as u32);
                write_u32_le(&mut out, p.param_type_idxs.len() as u32);
                for &t in &p.param_type_idxs {
                    write_u16_le(&mut out, t as u16);
                }
                align4(&mut out);
            }
        }

        // Interface type lists.
        let mut interface_offs = Vec::with_capacity(self.classes.len());
        for cls in &self.classes {
            if cls.interfaces.is_empty() {
                interface_offs.push(0u32);
            } else {
                align4(&mut out);
                interface_offs.push(out.len() as u32);
                write_u32_le(&mut out, cls.interfaces.len() as u32);
                for desc in &cls.interfaces {
                    let idx = *self.type_map.get(desc).unwrap_or(&0);
                    write_u16_le(&mut out, idx as u16);
                }
                align4(&mut out);
            }
        }

        // Sort member lists by pool index: the differential encoding requires
        // monotone indices.
        struct ClassLayout {
            static_fields: Vec<(u32, u32)>,          // (pool idx, flags)
            instance_fields: Vec<(u32, u32)>,
            direct_methods: Vec<(u32, u32, usize)>,  // (pool idx, flags, method slot)
            virtual_methods: Vec<(u32, u32, usize)>,
        }
        let mut layouts = Vec::with_capacity(self.classes.len());
        for cls in &self.classes {
            let sort_fields = |fields: &[FieldDef]| -> Result<Vec<(u32, u32)>, DexError> {
                let mut v = vec![];
                for f in fields {
                    let idx = self
                        .field_pool_idx(&cls.class_name, f)
                        .ok_or_else(|| DexError::new(&format!("field not interned: {}", f.name)))?;
                    v.push((idx, f.access_flags));
                }
                v.sort_by_key(|&(idx, _)| idx);
                Ok(v)
            };
            let sort_methods = |methods: &[MethodDef]| -> Result<Vec<(u32, u32, usize)>, DexError> {
                let mut v = vec![];
                for (slot, m) in methods.iter().enumerate() {
                    let idx = self
                        .method_pool_idx(&cls.class_name, m)
                        .ok_or_else(|| DexError::new(&format!("method not interned: {}", m.name)))?;
                    v.push((idx, m.access_flags, slot));
                }
                v.sort_by_key(|&(idx, _, _)| idx);
                Ok(v)
            };
            layouts.push(ClassLayout {
                static_fields: sort_fields(&cls.static_fields)?,
                instance_fields: sort_fields(&cls.instance_fields)?,
                direct_methods: sort_methods(&cls.direct_methods)?,
                virtual_methods: sort_methods(&cls.virtual_methods)?,
            });
        }

        // Code items, 4-byte aligned, in class/member emission order.
        let mut code_offs: Vec<(Vec<u32>, Vec<u32>)> = Vec::with_capacity(self.classes.len());
        for (cls, layout) in self.classes.iter().zip(&layouts) {
            let emit = |ordered: &[(u32, u32, usize)], methods: &[MethodDef], out: &mut Vec<u8>| {
                let mut offs = vec![];
                for &(_, _, slot) in ordered {
                    let m = &methods[slot];
                    if m.code.is_empty() {
                        offs.push(0u32);
                    } else {
                        align4(out);
                        offs.push(out.len() as u32);
                        Self::build_code_item(out, m);
                    }
                }
                offs
            };
            let direct = emit(&layout.direct_methods, &cls.direct_methods, &mut out);
            let virtual_ = emit(&layout.virtual_methods, &cls.virtual_methods, &mut out);
            code_offs.push((direct, virtual_));
        }

        // Class data items.
        let mut class_data_offs = Vec::with_capacity(self.classes.len());
        for (ci, layout) in layouts.iter().enumerate() {
            let empty = layout.static_fields.is_empty()
                && layout.instance_fields.is_empty()
                && layout.direct_methods.is_empty()
                && layout.virtual_methods.is_empty();
            if empty {
                class_data_offs.push(0u32);
                continue;
            }
            class_data_offs.push(out.len() as u32);
            write_uleb128(&mut out, layout.static_fields.len() as u32);
            write_uleb128(&mut out, layout.instance_fields.len() as u32);
            write_uleb128(&mut out, layout.direct_methods.len() as u32);
            write_uleb128(&mut out, layout.virtual_methods.len() as u32);
            for fields in [&layout.static_fields, &layout.instance_fields] {
                let mut prev = 0u32;
                for &(idx, flags) in fields.iter() {
                    write_uleb128(&mut out, idx - prev);
                    write_uleb128(&mut out, flags);
                    prev = idx;
                }
            }
            let (direct_offs, virtual_offs) = &code_offs[ci];
            for (ordered, offs) in [
                (&layout.direct_methods, direct_offs),
                (&layout.virtual_methods, virtual_offs),
            ] {
                let mut prev = 0u32;
                for (&(idx, flags, _), &code_off) in ordered.iter().zip(offs.iter()) {
                    write_uleb128(&mut out, idx - prev);
                    write_uleb128(&mut out, flags);
                    write_uleb128(&mut out, code_off);
                    prev = idx;
                }
            }
        }
        align4(&mut out);

        // Fixed-size id tables.
        let string_ids_off = out.len() as u32;
        for off in &string_data_offs {
            write_u32_le(&mut out, *off);
        }
        let type_ids_off = out.len() as u32;
        for desc in &self.types {
            write_u32_le(&mut out, *self.string_map.get(desc).unwrap_or(&0));
        }
        let proto_ids_off = out.len() as u32;
        for (p, &params_off) in self.protos.iter().zip(&proto_param_offs) {
            write_u32_le(&mut out, p.shorty_idx);
            write_u32_le(&mut out, p.return_type_idx);
            write_u32_le(&mut out, params_off);
        }
        let field_ids_off = out.len() as u32;
        for &(class_idx, type_idx, name_idx) in &self.fields {
            write_u16_le(&mut out, class_idx as u16);
            write_u16_le(&mut out, type_idx as u16);
            write_u32_le(&mut out, name_idx);
        }
        let method_ids_off = out.len() as u32;
        for &(class_idx, proto_idx, name_idx) in &self.methods {
            write_u16_le(&mut out, class_idx as u16);
            write_u16_le(&mut out, proto_idx as u16);
            write_u32_le(&mut out, name_idx);
        }

        let class_defs_off = out.len() as u32;
        for (i, cls) in self.classes.iter().enumerate() {
            write_u32_le(&mut out, *self.type_map.get(&cls.class_name).unwrap_or(&0));
            write_u32_le(&mut out, cls.access_flags);
            let super_idx = cls
                .super_class
                .as_ref()
                .and_then(|s| self.type_map.get(s).copied())
                .unwrap_or(NO_INDEX);
            write_u32_le(&mut out, super_idx);
            write_u32_le(&mut out, interface_offs[i]);
            let source_idx = cls
                .source_file
                .as_ref()
                .and_then(|s| self.string_map.get(s).copied())
                .unwrap_or(NO_INDEX);
            write_u32_le(&mut out, source_idx);
            write_u32_le(&mut out, 0); // annotations
            write_u32_le(&mut out, class_data_offs[i]);
            write_u32_le(&mut out, 0); // static values
        }

        // Map list.
        let map_off = out.len() as u32;
        let mut map_items: Vec<(u16, u32, u32)> = vec![(TYPE_HEADER_ITEM, 1, 0)];
        if !self.strings.is_empty() {
            map_items.push((TYPE_STRING_ID_ITEM, self.strings.len() as u32, string_ids_off));
        }
        if !self.types.is_empty() {
            map_items.push((TYPE_TYPE_ID_ITEM, self.types.len() as u32, type_ids_off));
        }
        if !self.protos.is_empty() {
            map_items.push((TYPE_PROTO_ID_ITEM, self.protos.len() as u32, proto_ids_off));
        }
        if !self.fields.is_empty() {
            map_items.push((TYPE_FIELD_ID_ITEM, self.fields.len() as u32, field_ids_off));
        }
        if !self.methods.is_empty() {
            map_items.push((TYPE_METHOD_ID_ITEM, self.methods.len() as u32, method_ids_off));
        }
        if !self.classes.is_empty() {
            map_items.push((TYPE_CLASS_DEF_ITEM, self.classes.len() as u32, class_defs_off));
        }
        map_items.push((TYPE_MAP_LIST, 1, map_off));
        write_u32_le(&mut out, map_items.len() as u32);
        for (type_code, size, offset) in map_items {
            write_u16_le(&mut out, type_code);
            write_u16_le(&mut out, 0);
            write_u32_le(&mut out, size);
            write_u32_le(&mut out, offset);
        }

        // Patch the header.
        let file_size = out.len() as u32;
        let mut patch = |at: usize, val: u32| patch_u32_le(&mut out, at, val);
        patch(0x20, file_size)?;
        patch(0x24, HEADER_SIZE)?;
        patch(0x28, crate::dex::dex_file::ENDIAN_CONSTANT)?;
        patch(0x2c, 0)?; // link size
        patch(0x30, 0)?; // link off
        patch(0x34, map_off)?;
        patch(0x38, self.strings.len() as u32)?;
        patch(0x3c, if self.strings.is_empty() { 0 } else { string_ids_off })?;
        patch(0x40, self.types.len() as u32)?;
        patch(0x44, if self.types.is_empty() { 0 } else { type_ids_off })?;
        patch(0x48, self.protos.len() as u32)?;
        patch(0x4c, if self.protos.is_empty() { 0 } else { proto_ids_off })?;
        patch(0x50, self.fields.len() as u32)?;
        patch(0x54, if self.fields.is_empty() { 0 } else { field_ids_off })?;
        patch(0x58, self.methods.len() as u32)?;
        patch(0x5c, if self.methods.is_empty() { 0 } else { method_ids_off })?;
        patch(0x60, self.classes.len() as u32)?;
        patch(0x64, if self.classes.is_empty() { 0 } else { class_defs_off })?;
        patch(0x68, file_size - data_off)?;
        patch(0x6c, data_off)?;

        // Signature over [32..], then checksum over [12..] which covers it.
        let digest = Sha1::digest(&out[32..]);
        out[12..32].copy_from_slice(&digest);
        let checksum = adler32_slice(&out[12..]);
        patch_u32_le(&mut out, 8, checksum)?;

        if out.len() % 4 != 0 {
            error!("built DEX image is not word-aligned ({} bytes)", out.len());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::disasm;

    fn sample_dex() -> Vec<u8> {
        let mut b = DexBuilder::new();
        b.add_class(
            "\
.class public Lcom/x/A;
.super Ljava/lang/Object;

.method public foo()V
    .registers 1
    return-void
.end method
",
        )
        .unwrap();
        b.build().unwrap()
    }

    #[test]
    fn built_dex_reparses() {
        let bytes = sample_dex();
        let dex = DexFile::parse(&bytes).unwrap();
        assert_eq!(dex.class_defs.len(), 1);
        assert_eq!(dex.type_name(dex.class_defs[0].class_idx), "Lcom/x/A;");
        let code = dex.get_method_code("Lcom/x/A;", "foo").unwrap();
        assert_eq!(code.insns, vec![0x0E, 0x00]);
        assert_eq!(code.registers_size, 1);
    }

    #[test]
    fn checksum_covers_tail() {
        let bytes = sample_dex();
        let mut ix = 8;
        let stored = crate::bytes::read_u32_le(&bytes, &mut ix).unwrap();
        assert_eq!(stored, adler32_slice(&bytes[12..]));
        let digest = Sha1::digest(&bytes[32..]);
        assert_eq!(&bytes[12..32], digest.as_slice());
    }

    #[test]
    fn loaded_and_untouched_returns_original_bytes() {
        let bytes = sample_dex();
        let mut b = DexBuilder::load(&bytes).unwrap();
        assert_eq!(b.build().unwrap(), bytes);
    }

    #[test]
    fn parse_build_is_idempotent_structurally() {
        let bytes = sample_dex();
        let mut loaded = DexBuilder::load(&bytes).unwrap();
        loaded.dirty = true; // force a rebuild through the emitter
        let rebuilt = loaded.build().unwrap();
        let a = DexFile::parse(&bytes).unwrap();
        let b = DexFile::parse(&rebuilt).unwrap();
        assert_eq!(a.strings.len(), b.strings.len());
        assert_eq!(a.types.len(), b.types.len());
        assert_eq!(a.methods.len(), b.methods.len());
        assert_eq!(
            a.get_method_code("Lcom/x/A;", "foo").unwrap().insns,
            b.get_method_code("Lcom/x/A;", "foo").unwrap().insns
        );
    }

    #[test]
    fn modify_class_swaps_method_body() {
        let bytes = sample_dex();
        let mut b = DexBuilder::load(&bytes).unwrap();
        b.modify_class(
            "Lcom/x/A;",
            "\
.class public Lcom/x/A;
.super Ljava/lang/Object;

.method public foo()V
    .registers 2
    const/4 v0, #int 1
    return-void
.end method
",
        )
        .unwrap();
        let rebuilt = b.build().unwrap();
        let dex = DexFile::parse(&rebuilt).unwrap();
        let code = dex.get_method_code("Lcom/x/A;", "foo").unwrap();
        assert_eq!(code.insns, vec![0x12, 0x10, 0x0E, 0x00]);
        assert_eq!(code.registers_size, 2);
    }

    #[test]
    fn add_class_with_new_string_literal() {
        let bytes = sample_dex();
        let mut b = DexBuilder::load(&bytes).unwrap();
        b.add_class(
            "\
.class public Lcom/x/B;
.super Ljava/lang/Object;

.method public static greet()V
    .registers 1
    const-string v0, \"brand new\"
    return-void
.end method
",
        )
        .unwrap();
        let rebuilt = b.build().unwrap();
        let dex = DexFile::parse(&rebuilt).unwrap();
        assert_eq!(dex.class_defs.len(), 2);
        assert!(dex
            .strings
            .iter()
            .any(|s| s.to_string_lossy() == "brand new"));
        let code = dex.get_method_code("Lcom/x/B;", "greet").unwrap();
        assert_eq!(code.insns[0], 0x1A); // const-string
    }

    #[test]
    fn delete_class_removes_the_def() {
        let bytes = sample_dex();
        let mut b = DexBuilder::load(&bytes).unwrap();
        assert!(b.delete_class("Lcom/x/A;"));
        assert!(!b.delete_class("Lcom/x/A;"));
        let rebuilt = b.build().unwrap();
        let dex = DexFile::parse(&rebuilt).unwrap();
        assert!(dex.class_defs.is_empty());
    }

    #[test]
    fn batch_method_codes_keyed_by_class_and_name() {
        let bytes = sample_dex();
        let dex = DexFile::parse(&bytes).unwrap();
        let all = dex.get_all_method_codes();
        assert_eq!(all.len(), 1);
        assert_eq!(all["Lcom/x/A;|foo"].insns, vec![0x0E, 0x00]);
    }

    #[test]
    fn truncated_prefixes_never_panic() {
        let bytes = sample_dex();
        for cut in [0, 7, 8, 0x20, 0x6f, 0x70, bytes.len() / 2, bytes.len() - 1] {
            let _ = DexFile::parse(&bytes[..cut]);
        }
    }

    #[test]
    fn xrefs_found_in_built_image() {
        let mut b = DexBuilder::new();
        b.add_class(
            "\
.class public Lcom/x/A;
.super Ljava/lang/Object;

.method public callee()V
    .registers 1
    return-void
.end method

.method public caller()V
    .registers 1
    invoke-virtual {v0}, Lcom/x/A;->callee()V
    return-void
.end method
",
        )
        .unwrap();
        let bytes = b.build().unwrap();
        let dex = DexFile::parse(&bytes).unwrap();
        let xrefs = dex.find_method_xrefs("Lcom/x/A;", "callee");
        assert_eq!(xrefs.len(), 1);
        assert_eq!(xrefs[0].caller_class, "Lcom/x/A;");
        assert_eq!(xrefs[0].caller_method, "caller");
        assert_eq!(xrefs[0].offset, 0);
    }

    #[test]
    fn class_smali_of_built_image_reassembles() {
        let bytes = sample_dex();
        let dex = DexFile::parse(&bytes).unwrap();
        let smali = disasm::class_smali(&dex, "Lcom/x/A;").unwrap();
        assert!(smali.contains(".class public Lcom/x/A;"));
        assert!(smali.contains(".method public foo()V"));
        let mut b = DexBuilder::load(&bytes).unwrap();
        b.modify_class("Lcom/x/A;", &smali).unwrap();
        let rebuilt = b.build().unwrap();
        let again = DexFile::parse(&rebuilt).unwrap();
        assert_eq!(
            again.get_method_code("Lcom/x/A;", "foo").unwrap().insns,
            vec![0x0E, 0x00]
        );
    }
}
