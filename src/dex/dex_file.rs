//! Dex file format structures and the read-side parser.
//!
//! The parser keeps the owning byte buffer and walks class-data and code
//! items on demand; only the fixed-size pools are materialized eagerly.

use std::collections::HashMap;

use bitflags::bitflags;
use cesu8::{from_java_cesu8, to_java_cesu8};
use log::{debug, warn};

use crate::bytes::{read_u16_le, read_u32_le, read_uleb128, read_x, write_u16_le, write_u32_le, write_uleb128, write_x};
use crate::dex::error::DexError;
use crate::fail;

pub const DEX_FILE_MAGIC: [u8; 8] = [0x64, 0x65, 0x78, 0x0a, 0x30, 0x33, 0x35, 0x00];
pub const ENDIAN_CONSTANT: u32 = 0x12345678;
pub const HEADER_SIZE: u32 = 0x70;
pub const NO_INDEX: u32 = 0xffff_ffff;

bitflags! {
    /// Access flags shared by classes, fields and methods.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessFlags: u32 {
        const PUBLIC = 0x1;
        const PRIVATE = 0x2;
        const PROTECTED = 0x4;
        const STATIC = 0x8;
        const FINAL = 0x10;
        const SYNCHRONIZED = 0x20;
        const VOLATILE = 0x40;
        const TRANSIENT = 0x80;
        const NATIVE = 0x100;
        const INTERFACE = 0x200;
        const ABSTRACT = 0x400;
        const STRICT = 0x800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const CONSTRUCTOR = 0x10000;
        const DECLARED_SYNCHRONIZED = 0x20000;
    }
}

/// Renders flags the way they appear after `.class`/`.method`/`.field`.
pub fn access_flags_smali(flags: u32) -> String {
    const NAMES: &[(u32, &str)] = &[
        (0x1, "public"),
        (0x2, "private"),
        (0x4, "protected"),
        (0x8, "static"),
        (0x10, "final"),
        (0x20, "synchronized"),
        (0x100, "native"),
        (0x200, "interface"),
        (0x400, "abstract"),
        (0x1000, "synthetic"),
        (0x10000, "constructor"),
    ];
    let mut out = String::new();
    for (bit, name) in NAMES {
        if flags & bit != 0 {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(name);
        }
    }
    out
}

/// A string-pool entry. Bodies are MUTF-8; anything cesu8 cannot decode is
/// kept raw so it survives a rebuild byte-for-byte.
#[derive(Debug, Eq, PartialEq, Clone)]
pub enum DexString {
    Decoded(String),
    Raw(u32, Vec<u8>),
}

impl DexString {
    pub fn from_string(s: &str) -> DexString {
        DexString::Decoded(s.to_string())
    }

    pub fn to_string_lossy(&self) -> String {
        match self {
            DexString::Decoded(s) => s.clone(),
            DexString::Raw(_, v) => String::from_utf8_lossy(v).into_owned(),
        }
    }

    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<DexString, DexError> {
        let utf16_size = read_uleb128(bytes, ix)?;
        let mut v = vec![];
        loop {
            let u = crate::bytes::read_u8(bytes, ix)?;
            if u == 0 {
                break;
            }
            v.push(u);
        }
        Ok(match from_java_cesu8(v.as_slice()) {
            Ok(converted) => DexString::Decoded(converted.to_string()),
            _ => DexString::Raw(utf16_size, v),
        })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        match self {
            DexString::Raw(utf16_size, v) => {
                c += write_uleb128(bytes, *utf16_size);
                c += write_x(bytes, v);
                c += crate::bytes::write_u8(bytes, 0);
            }
            DexString::Decoded(s) => {
                let encoded = to_java_cesu8(s);
                c += write_uleb128(bytes, s.chars().count() as u32);
                c += write_x(bytes, &encoded);
                c += crate::bytes::write_u8(bytes, 0);
            }
        }
        c
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Header {
    pub magic: [u8; 8],
    pub checksum: u32,
    pub signature: [u8; 20],
    pub file_size: u32,
    pub header_size: u32,
    pub endian_tag: u32,
    pub link_size: u32,
    pub link_off: u32,
    pub map_off: u32,
    pub string_ids_size: u32,
    pub string_ids_off: u32,
    pub type_ids_size: u32,
    pub type_ids_off: u32,
    pub proto_ids_size: u32,
    pub proto_ids_off: u32,
    pub field_ids_size: u32,
    pub field_ids_off: u32,
    pub method_ids_size: u32,
    pub method_ids_off: u32,
    pub class_defs_size: u32,
    pub class_defs_off: u32,
    pub data_size: u32,
    pub data_off: u32,
}

impl Header {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<Header, DexError> {
        if bytes.len() < HEADER_SIZE as usize {
            fail!("not enough bytes for DEX header");
        }
        let magic = <[u8; 8]>::try_from(read_x(bytes, ix, 8)?).unwrap();
        if magic[0..4] != [0x64, 0x65, 0x78, 0x0a] {
            fail!("invalid DEX magic");
        }
        Ok(Header {
            magic,
            checksum: read_u32_le(bytes, ix)?,
            signature: <[u8; 20]>::try_from(read_x(bytes, ix, 20)?).unwrap(),
            file_size: read_u32_le(bytes, ix)?,
            header_size: read_u32_le(bytes, ix)?,
            endian_tag: read_u32_le(bytes, ix)?,
            link_size: read_u32_le(bytes, ix)?,
            link_off: read_u32_le(bytes, ix)?,
            map_off: read_u32_le(bytes, ix)?,
            string_ids_size: read_u32_le(bytes, ix)?,
            string_ids_off: read_u32_le(bytes, ix)?,
            type_ids_size: read_u32_le(bytes, ix)?,
            type_ids_off: read_u32_le(bytes, ix)?,
            proto_ids_size: read_u32_le(bytes, ix)?,
            proto_ids_off: read_u32_le(bytes, ix)?,
            field_ids_size: read_u32_le(bytes, ix)?,
            field_ids_off: read_u32_le(bytes, ix)?,
            method_ids_size: read_u32_le(bytes, ix)?,
            method_ids_off: read_u32_le(bytes, ix)?,
            class_defs_size: read_u32_le(bytes, ix)?,
            class_defs_off: read_u32_le(bytes, ix)?,
            data_size: read_u32_le(bytes, ix)?,
            data_off: read_u32_le(bytes, ix)?,
        })
    }

    pub fn version(&self) -> String {
        String::from_utf8_lossy(&self.magic[4..7]).into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct PrototypeItem {
    pub shorty_idx: u32,
    pub return_type_idx: u32,
    pub parameters: Vec<u32>,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct FieldItem {
    pub class_idx: u32,
    pub type_idx: u32,
    pub name_idx: u32,
}

impl FieldItem {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<FieldItem, DexError> {
        Ok(FieldItem {
            class_idx: read_u16_le(bytes, ix)? as u32,
            type_idx: read_u16_le(bytes, ix)? as u32,
            name_idx: read_u32_le(bytes, ix)?,
        })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        c += write_u16_le(bytes, self.class_idx as u16);
        c += write_u16_le(bytes, self.type_idx as u16);
        c += write_u32_le(bytes, self.name_idx);
        c
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MethodItem {
    pub class_idx: u32,
    pub proto_idx: u32,
    pub name_idx: u32,
}

impl MethodItem {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<MethodItem, DexError> {
        Ok(MethodItem {
            class_idx: read_u16_le(bytes, ix)? as u32,
            proto_idx: read_u16_le(bytes, ix)? as u32,
            name_idx: read_u32_le(bytes, ix)?,
        })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        c += write_u16_le(bytes, self.class_idx as u16);
        c += write_u16_le(bytes, self.proto_idx as u16);
        c += write_u32_le(bytes, self.name_idx);
        c
    }
}

#[derive(Debug, Clone)]
pub struct ClassDefItem {
    pub class_idx: u32,
    pub access_flags: u32,
    pub superclass_idx: u32,
    pub interfaces_off: u32,
    pub source_file_idx: u32,
    pub annotations_off: u32,
    pub class_data_off: u32,
    pub static_values_off: u32,
}

impl ClassDefItem {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<ClassDefItem, DexError> {
        Ok(ClassDefItem {
            class_idx: read_u32_le(bytes, ix)?,
            access_flags: read_u32_le(bytes, ix)?,
            superclass_idx: read_u32_le(bytes, ix)?,
            interfaces_off: read_u32_le(bytes, ix)?,
            source_file_idx: read_u32_le(bytes, ix)?,
            annotations_off: read_u32_le(bytes, ix)?,
            class_data_off: read_u32_le(bytes, ix)?,
            static_values_off: read_u32_le(bytes, ix)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct EncodedField {
    pub field_idx: u32,
    pub access_flags: u32,
}

#[derive(Debug, Clone)]
pub struct EncodedMethod {
    pub method_idx: u32,
    pub access_flags: u32,
    pub code_off: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ClassDataItem {
    pub static_fields: Vec<EncodedField>,
    pub instance_fields: Vec<EncodedField>,
    pub direct_methods: Vec<EncodedMethod>,
    pub virtual_methods: Vec<EncodedMethod>,
}

impl ClassDataItem {
    /// Decodes the differential ULEB128 encoding: each record's pool index is
    /// the previous index plus the stored diff.
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<ClassDataItem, DexError> {
        let static_field_size = read_uleb128(bytes, ix)?;
        let instance_field_size = read_uleb128(bytes, ix)?;
        let direct_method_size = read_uleb128(bytes, ix)?;
        let virtual_method_size = read_uleb128(bytes, ix)?;

        let mut item = ClassDataItem::default();

        let mut idx = 0u32;
        for _ in 0..static_field_size {
            idx = idx.wrapping_add(read_uleb128(bytes, ix)?);
            item.static_fields.push(EncodedField {
                field_idx: idx,
                access_flags: read_uleb128(bytes, ix)?,
            });
        }
        idx = 0;
        for _ in 0..instance_field_size {
            idx = idx.wrapping_add(read_uleb128(bytes, ix)?);
            item.instance_fields.push(EncodedField {
                field_idx: idx,
                access_flags: read_uleb128(bytes, ix)?,
            });
        }
        idx = 0;
        for _ in 0..direct_method_size {
            idx = idx.wrapping_add(read_uleb128(bytes, ix)?);
            item.direct_methods.push(EncodedMethod {
                method_idx: idx,
                access_flags: read_uleb128(bytes, ix)?,
                code_off: read_uleb128(bytes, ix)?,
            });
        }
        idx = 0;
        for _ in 0..virtual_method_size {
            idx = idx.wrapping_add(read_uleb128(bytes, ix)?);
            item.virtual_methods.push(EncodedMethod {
                method_idx: idx,
                access_flags: read_uleb128(bytes, ix)?,
                code_off: read_uleb128(bytes, ix)?,
            });
        }
        Ok(item)
    }

    pub fn methods(&self) -> impl Iterator<Item = &EncodedMethod> {
        self.direct_methods.iter().chain(self.virtual_methods.iter())
    }
}

#[derive(Debug, Clone)]
pub struct CodeItem {
    pub registers_size: u16,
    pub ins_size: u16,
    pub outs_size: u16,
    pub tries_size: u16,
    pub debug_info_off: u32,
    /// Raw instruction stream, two bytes per code unit.
    pub insns: Vec<u8>,
    pub code_off: u32,
}

impl CodeItem {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<CodeItem, DexError> {
        let code_off = *ix as u32;
        let registers_size = read_u16_le(bytes, ix)?;
        let ins_size = read_u16_le(bytes, ix)?;
        let outs_size = read_u16_le(bytes, ix)?;
        let tries_size = read_u16_le(bytes, ix)?;
        let debug_info_off = read_u32_le(bytes, ix)?;
        let insns_size = read_u32_le(bytes, ix)? as usize;
        let insns = read_x(bytes, ix, insns_size * 2)?;
        Ok(CodeItem {
            registers_size,
            ins_size,
            outs_size,
            tries_size,
            debug_info_off,
            insns,
            code_off,
        })
    }
}

/// A cross-reference hit: the method whose instruction stream references the
/// target, plus the code-unit offset of the referencing instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Xref {
    pub caller_class: String,
    pub caller_method: String,
    pub offset: u32,
}

/// A parsed `.dex` image. Owns the raw buffer so class data and code items
/// can be walked lazily without reslicing lifetimes through the pools.
#[derive(Debug)]
pub struct DexFile {
    data: Vec<u8>,
    pub header: Header,
    pub strings: Vec<DexString>,
    pub types: Vec<u32>,
    pub protos: Vec<PrototypeItem>,
    pub fields: Vec<FieldItem>,
    pub methods: Vec<MethodItem>,
    pub class_defs: Vec<ClassDefItem>,
}

impl DexFile {
    pub fn parse(bytes: &[u8]) -> Result<DexFile, DexError> {
        let mut ix = 0;
        let header = Header::read(bytes, &mut ix)?;

        let mut dex = DexFile {
            data: bytes.to_vec(),
            header,
            strings: vec![],
            types: vec![],
            protos: vec![],
            fields: vec![],
            methods: vec![],
            class_defs: vec![],
        };

        ix = dex.header.string_ids_off as usize;
        for _ in 0..dex.header.string_ids_size {
            let mut string_off = read_u32_le(bytes, &mut ix)? as usize;
            dex.strings.push(DexString::read(bytes, &mut string_off)?);
        }

        ix = dex.header.type_ids_off as usize;
        for _ in 0..dex.header.type_ids_size {
            dex.types.push(read_u32_le(bytes, &mut ix)?);
        }

        ix = dex.header.proto_ids_off as usize;
        for _ in 0..dex.header.proto_ids_size {
            let shorty_idx = read_u32_le(bytes, &mut ix)?;
            let return_type_idx = read_u32_le(bytes, &mut ix)?;
            let parameters_off = read_u32_le(bytes, &mut ix)? as usize;
            let mut parameters = vec![];
            if parameters_off != 0 {
                let mut pix = parameters_off;
                let count = read_u32_le(bytes, &mut pix)?;
                for _ in 0..count {
                    parameters.push(read_u16_le(bytes, &mut pix)? as u32);
                }
            }
            dex.protos.push(PrototypeItem {
                shorty_idx,
                return_type_idx,
                parameters,
            });
        }

        ix = dex.header.field_ids_off as usize;
        for _ in 0..dex.header.field_ids_size {
            dex.fields.push(FieldItem::read(bytes, &mut ix)?);
        }

        ix = dex.header.method_ids_off as usize;
        for _ in 0..dex.header.method_ids_size {
            dex.methods.push(MethodItem::read(bytes, &mut ix)?);
        }

        ix = dex.header.class_defs_off as usize;
        for _ in 0..dex.header.class_defs_size {
            dex.class_defs.push(ClassDefItem::read(bytes, &mut ix)?);
        }

        debug!(
            "parsed dex: {} strings, {} types, {} protos, {} fields, {} methods, {} classes",
            dex.strings.len(),
            dex.types.len(),
            dex.protos.len(),
            dex.fields.len(),
            dex.methods.len(),
            dex.class_defs.len()
        );
        Ok(dex)
    }

    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    /// Pool string by index; a miss reads as empty, matching the tolerant
    /// behavior expected of lookups on lightly malformed files.
    pub fn string(&self, idx: u32) -> String {
        self.strings
            .get(idx as usize)
            .map(|s| s.to_string_lossy())
            .unwrap_or_default()
    }

    pub fn type_name(&self, idx: u32) -> String {
        self.types
            .get(idx as usize)
            .map(|&string_idx| self.string(string_idx))
            .unwrap_or_default()
    }

    pub fn proto_string(&self, proto_idx: u32) -> String {
        let Some(proto) = self.protos.get(proto_idx as usize) else {
            return "()V".to_string();
        };
        let mut s = String::from("(");
        for &p in &proto.parameters {
            s.push_str(&self.type_name(p));
        }
        s.push(')');
        s.push_str(&self.type_name(proto.return_type_idx));
        s
    }

    pub fn method_signature(&self, method_idx: u32) -> String {
        let Some(m) = self.methods.get(method_idx as usize) else {
            return String::new();
        };
        format!(
            "{}->{}{}",
            self.type_name(m.class_idx),
            self.string(m.name_idx),
            self.proto_string(m.proto_idx)
        )
    }

    pub fn field_signature(&self, field_idx: u32) -> String {
        let Some(f) = self.fields.get(field_idx as usize) else {
            return String::new();
        };
        format!(
            "{}->{}:{}",
            self.type_name(f.class_idx),
            self.string(f.name_idx),
            self.type_name(f.type_idx)
        )
    }

    pub fn method_signatures(&self) -> Vec<String> {
        (0..self.methods.len() as u32)
            .map(|i| self.method_signature(i))
            .collect()
    }

    pub fn field_signatures(&self) -> Vec<String> {
        (0..self.fields.len() as u32)
            .map(|i| self.field_signature(i))
            .collect()
    }

    pub fn info(&self) -> String {
        let mut s = String::from("DEX File Info:\n");
        s.push_str(&format!("  Version: {}\n", self.header.version()));
        s.push_str(&format!("  File Size: {} bytes\n", self.header.file_size));
        s.push_str(&format!("  Strings: {}\n", self.header.string_ids_size));
        s.push_str(&format!("  Types: {}\n", self.header.type_ids_size));
        s.push_str(&format!("  Protos: {}\n", self.header.proto_ids_size));
        s.push_str(&format!("  Fields: {}\n", self.header.field_ids_size));
        s.push_str(&format!("  Methods: {}\n", self.header.method_ids_size));
        s.push_str(&format!("  Classes: {}\n", self.header.class_defs_size));
        s
    }

    /// Reads a word-aligned type list (interface lists, proto parameters).
    pub fn type_list(&self, off: u32) -> Result<Vec<u32>, DexError> {
        let mut ix = off as usize;
        let count = read_u32_le(&self.data, &mut ix)?;
        let mut out = Vec::new();
        for _ in 0..count {
            out.push(read_u16_le(&self.data, &mut ix)? as u32);
        }
        Ok(out)
    }

    pub fn class_data(&self, class_data_off: u32) -> Result<ClassDataItem, DexError> {
        let mut ix = class_data_off as usize;
        ClassDataItem::read(&self.data, &mut ix)
    }

    pub fn code_item(&self, code_off: u32) -> Result<CodeItem, DexError> {
        let mut ix = code_off as usize;
        CodeItem::read(&self.data, &mut ix)
    }

    /// Walks every method record of every class. Classes with a malformed
    /// class-data chunk are skipped, not fatal.
    fn for_each_method(&self, mut f: impl FnMut(&ClassDefItem, &EncodedMethod)) {
        for cls in &self.class_defs {
            if cls.class_data_off == 0 {
                continue;
            }
            let class_data = match self.class_data(cls.class_data_off) {
                Ok(cd) => cd,
                Err(e) => {
                    warn!(
                        "skipping malformed class data for {}: {}",
                        self.type_name(cls.class_idx),
                        e
                    );
                    continue;
                }
            };
            for m in class_data.methods() {
                f(cls, m);
            }
        }
    }

    pub fn get_method_code(&self, class_name: &str, method_name: &str) -> Option<CodeItem> {
        let mut found = None;
        self.for_each_method(|cls, m| {
            if found.is_some() || m.code_off == 0 {
                return;
            }
            if self.type_name(cls.class_idx) != class_name {
                return;
            }
            let mid = match self.methods.get(m.method_idx as usize) {
                Some(mid) => mid,
                None => return,
            };
            if self.string(mid.name_idx) == method_name {
                found = self.code_item(m.code_off).ok();
            }
        });
        found
    }

    /// One pass over all class-data chunks, keyed `"ClassType|methodName"`.
    /// Used by batch consumers to avoid re-parsing per method.
    pub fn get_all_method_codes(&self) -> HashMap<String, CodeItem> {
        let mut result = HashMap::new();
        self.for_each_method(|cls, m| {
            if m.code_off == 0 {
                return;
            }
            let class_name = self.type_name(cls.class_idx);
            if class_name.is_empty() {
                return;
            }
            let Some(mid) = self.methods.get(m.method_idx as usize) else {
                return;
            };
            let key = format!("{}|{}", class_name, self.string(mid.name_idx));
            if let Ok(code) = self.code_item(m.code_off) {
                result.insert(key, code);
            }
        });
        result
    }

    fn find_method_index(&self, class_name: &str, method_name: &str) -> Option<u32> {
        self.methods.iter().position(|m| {
            self.type_name(m.class_idx) == class_name && self.string(m.name_idx) == method_name
        }).map(|i| i as u32)
    }

    fn find_field_index(&self, class_name: &str, field_name: &str) -> Option<u32> {
        self.fields.iter().position(|f| {
            self.type_name(f.class_idx) == class_name && self.string(f.name_idx) == field_name
        }).map(|i| i as u32)
    }

    pub fn find_method_xrefs(&self, class_name: &str, method_name: &str) -> Vec<Xref> {
        let Some(target) = self.find_method_index(class_name, method_name) else {
            return vec![];
        };
        self.scan_xrefs(target, |op| (0x6e..=0x72).contains(&op) || (0x74..=0x78).contains(&op), 6)
    }

    pub fn find_field_xrefs(&self, class_name: &str, field_name: &str) -> Vec<Xref> {
        let Some(target) = self.find_field_index(class_name, field_name) else {
            return vec![];
        };
        self.scan_xrefs(target, |op| (0x52..=0x6d).contains(&op), 4)
    }

    /// Scans every instruction stream for references to `target`. Recognized
    /// instructions advance by their real size (`hit_step` bytes); everything
    /// else advances one code unit, which under-counts when a wide
    /// instruction precedes a match. A trailing nop stops the walk.
    fn scan_xrefs(&self, target: u32, recognize: impl Fn(u8) -> bool, hit_step: usize) -> Vec<Xref> {
        let mut results = vec![];
        self.for_each_method(|cls, m| {
            if m.code_off == 0 {
                return;
            }
            let Ok(code) = self.code_item(m.code_off) else {
                return;
            };
            let caller_class = self.type_name(cls.class_idx);
            let caller_method = self
                .methods
                .get(m.method_idx as usize)
                .map(|mid| self.string(mid.name_idx))
                .unwrap_or_default();

            let insns = &code.insns;
            let mut pos = 0usize;
            while pos < insns.len() {
                let opcode = insns[pos];
                if recognize(opcode) {
                    if pos + 4 <= insns.len() {
                        let ref_idx =
                            u16::from_le_bytes([insns[pos + 2], insns[pos + 3]]) as u32;
                        if ref_idx == target {
                            results.push(Xref {
                                caller_class: caller_class.clone(),
                                caller_method: caller_method.clone(),
                                offset: (pos / 2) as u32,
                            });
                        }
                    }
                    pos += hit_step;
                } else {
                    pos += 2;
                    if opcode == 0x00 && pos > 2 {
                        break; // trailing nop padding
                    }
                }
            }
        });
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_rejects_bad_magic() {
        let mut bytes = vec![0u8; 0x70];
        bytes[0..4].copy_from_slice(b"zip\n");
        let mut ix = 0;
        assert!(Header::read(&bytes, &mut ix).is_err());
    }

    #[test]
    fn header_rejects_truncation() {
        let bytes = vec![0u8; 0x40];
        let mut ix = 0;
        assert!(Header::read(&bytes, &mut ix).is_err());
    }

    #[test]
    fn dex_string_roundtrip() {
        for text in ["", "hello", "Lcom/example/Main;", "snowman \u{2603}"] {
            let s = DexString::from_string(text);
            let mut buf = vec![];
            s.write(&mut buf);
            let mut ix = 0;
            let back = DexString::read(&buf, &mut ix).unwrap();
            assert_eq!(back.to_string_lossy(), text);
            assert_eq!(ix, buf.len());
        }
    }

    #[test]
    fn class_data_differential_decode() {
        // 1 static field (idx 3), 0 instance, 2 direct methods (idx 2 then 5).
        let mut buf = vec![];
        for v in [1u32, 0, 2, 0] {
            write_uleb128(&mut buf, v);
        }
        write_uleb128(&mut buf, 3); // field idx diff
        write_uleb128(&mut buf, 0x9); // flags
        write_uleb128(&mut buf, 2); // method idx diff
        write_uleb128(&mut buf, 0x1);
        write_uleb128(&mut buf, 0); // no code
        write_uleb128(&mut buf, 3); // next diff -> idx 5
        write_uleb128(&mut buf, 0x8);
        write_uleb128(&mut buf, 0x100);

        let mut ix = 0;
        let cd = ClassDataItem::read(&buf, &mut ix).unwrap();
        assert_eq!(cd.static_fields[0].field_idx, 3);
        assert_eq!(cd.direct_methods[0].method_idx, 2);
        assert_eq!(cd.direct_methods[1].method_idx, 5);
        assert_eq!(cd.direct_methods[1].code_off, 0x100);
    }

    #[test]
    fn access_flags_render_in_declaration_order() {
        assert_eq!(access_flags_smali(0x1 | 0x8 | 0x10), "public static final");
        assert_eq!(access_flags_smali(0x10002), "private constructor");
        assert_eq!(access_flags_smali(0), "");
    }
}
