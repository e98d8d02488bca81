//! Smali assembler: the inverse of the disassembler.
//!
//! Assembly is line-based. A line may carry a leading offset label
//! (`.0000:`, stripped), a directive such as `.method`, `.registers` or
//! `.line` (ignored for bytecode emission), a jump label (`:name`, recorded),
//! or an instruction. References are resolved against the context pools with
//! a substring fallback for partial signatures. Errors carry the line number.

use std::collections::HashMap;

use nom::branch::alt;
use nom::bytes::complete::{escaped, tag, take_while, take_while1};
use nom::character::complete::{char, none_of, one_of, space0};
use nom::combinator::recognize;
use nom::error::Error as NomError;
use nom::multi::separated_list0;
use nom::sequence::delimited;
use nom::{IResult, Parser};

use crate::dex::dex_file::DexFile;
use crate::dex::error::DexError;
use crate::dex::opcodes::{opcode_by_name, opcode_info, Format};
use crate::fail;

/// Pool context the assembler resolves references against. The vectors are
/// positional, exactly as produced by the parser (and by
/// [`crate::dex::builder::DexBuilder`] after interning).
#[derive(Debug, Default)]
pub struct Assembler {
    pub strings: Vec<String>,
    pub types: Vec<String>,
    pub methods: Vec<String>,
    pub fields: Vec<String>,
}

impl Assembler {
    pub fn for_dex(dex: &DexFile) -> Assembler {
        Assembler {
            strings: dex.strings.iter().map(|s| s.to_string_lossy()).collect(),
            types: (0..dex.types.len() as u32).map(|i| dex.type_name(i)).collect(),
            methods: dex.method_signatures(),
            fields: dex.field_signatures(),
        }
    }

    /// Assembles a block of smali text into an instruction stream. Jump
    /// labels are recorded by code-unit offset as they are encountered.
    pub fn assemble(&self, smali: &str) -> Result<Vec<u8>, DexError> {
        let mut out = vec![];
        let mut labels: HashMap<String, usize> = HashMap::new();
        for (number, line) in smali.lines().enumerate() {
            self.assemble_line(line, &mut out, &mut labels)
                .map_err(|e| DexError::with_context(e, format!("line {}", number + 1)))?;
        }
        Ok(out)
    }

    fn assemble_line(
        &self,
        line: &str,
        out: &mut Vec<u8>,
        labels: &mut HashMap<String, usize>,
    ) -> Result<(), DexError> {
        let mut text = line.trim_start();

        if text.starts_with('.') {
            // `.0000:` offset labels carry an instruction after the colon;
            // every other dot-directive is ignored here.
            match text.find(':') {
                Some(colon) if colon < 8 => text = text[colon + 1..].trim_start(),
                _ => return Ok(()),
            }
        }

        let stripped = strip_comment(text);
        let clean = stripped.trim_end_matches(&['\r', ' ', '\t'][..]);
        if clean.is_empty() {
            return Ok(());
        }

        if let Some(label) = clean.strip_prefix(':') {
            labels.insert(label.trim().to_string(), out.len() / 2);
            return Ok(());
        }

        let (name, operand_text) = match clean.find(' ') {
            Some(space) => (&clean[..space], clean[space + 1..].trim_start()),
            None => (clean, ""),
        };
        let Some(op) = opcode_by_name(name) else {
            fail!("unknown opcode: {}", name);
        };

        let parts = split_operands(operand_text);
        let insn = self.encode(op, &parts)?;
        out.extend_from_slice(&insn);
        Ok(())
    }

    fn find_string(&self, s: &str) -> Option<u32> {
        self.strings.iter().position(|x| x == s).map(|i| i as u32)
    }

    fn find_type(&self, s: &str) -> Option<u32> {
        if let Some(rest) = s.strip_prefix("type@") {
            return rest.parse().ok();
        }
        self.types.iter().position(|x| x == s).map(|i| i as u32)
    }

    fn find_method(&self, s: &str) -> Option<u32> {
        if let Some(rest) = s.strip_prefix("method@") {
            return rest.parse().ok();
        }
        self.methods
            .iter()
            .position(|x| x == s)
            .or_else(|| self.methods.iter().position(|x| x.contains(s)))
            .map(|i| i as u32)
    }

    fn find_field(&self, s: &str) -> Option<u32> {
        if let Some(rest) = s.strip_prefix("field@") {
            return rest.parse().ok();
        }
        self.fields
            .iter()
            .position(|x| x == s)
            .or_else(|| self.fields.iter().position(|x| x.contains(s)))
            .map(|i| i as u32)
    }

    fn encode(&self, op: u8, parts: &[String]) -> Result<Vec<u8>, DexError> {
        let info = opcode_info(op);
        let mut insn = vec![0u8; info.units as usize * 2];
        insn[0] = op;

        let reg = |i: usize| -> Result<u16, DexError> {
            let part = parts.get(i).ok_or_else(|| DexError::new("missing register operand"))?;
            parse_register(part).ok_or_else(|| DexError::new(&format!("invalid register: {}", part)))
        };
        let lit = |i: usize| -> Result<i64, DexError> {
            let part = parts.get(i).ok_or_else(|| DexError::new("missing literal operand"))?;
            parse_literal(part).ok_or_else(|| DexError::new(&format!("invalid literal: {}", part)))
        };

        match info.format {
            Format::Format10x => {}
            Format::Format12x => {
                let (va, vb) = (reg(0)?, reg(1)?);
                insn[1] = (((vb & 0xF) << 4) | (va & 0xF)) as u8;
            }
            Format::Format11n => {
                let va = reg(0)?;
                let v = lit(1)?;
                insn[1] = ((((v as u8) & 0xF) << 4) | (va as u8 & 0xF)) as u8;
            }
            Format::Format11x => {
                insn[1] = reg(0)? as u8;
            }
            Format::Format10t => {
                let v = parts
                    .first()
                    .and_then(|p| parse_literal(p))
                    .ok_or_else(|| DexError::new("invalid branch offset"))?;
                insn[1] = v as i8 as u8;
            }
            Format::Format20t => {
                let v = parts
                    .first()
                    .and_then(|p| parse_literal(p))
                    .ok_or_else(|| DexError::new("invalid branch offset"))?;
                insn[2..4].copy_from_slice(&(v as i16).to_le_bytes());
            }
            Format::Format22x => {
                insn[1] = reg(0)? as u8;
                insn[2..4].copy_from_slice(&reg(1)?.to_le_bytes());
            }
            Format::Format21t | Format::Format21s => {
                insn[1] = reg(0)? as u8;
                insn[2..4].copy_from_slice(&(lit(1)? as i16).to_le_bytes());
            }
            Format::Format21h => {
                insn[1] = reg(0)? as u8;
                let part = parts.get(1).ok_or_else(|| DexError::new("missing literal operand"))?;
                let v = parse_literal(part).ok_or_else(|| DexError::new(&format!("invalid literal: {}", part)))?;
                // The smali text carries the full shifted value; the encoding
                // stores only the high 16 bits.
                let stored = if part.contains("#long") {
                    (v >> 48) as i16
                } else if part.contains("#int") {
                    (v >> 16) as i16
                } else {
                    v as i16
                };
                insn[2..4].copy_from_slice(&stored.to_le_bytes());
            }
            Format::Format21c => {
                insn[1] = reg(0)? as u8;
                let r = parts.get(1).ok_or_else(|| DexError::new("missing reference operand"))?;
                let idx = self.resolve_21c(r)?;
                insn[2..4].copy_from_slice(&(idx as u16).to_le_bytes());
            }
            Format::Format23x => {
                insn[1] = reg(0)? as u8;
                insn[2] = reg(1)? as u8;
                insn[3] = reg(2)? as u8;
            }
            Format::Format22b => {
                insn[1] = reg(0)? as u8;
                insn[2] = reg(1)? as u8;
                insn[3] = lit(2)? as i8 as u8;
            }
            Format::Format22t | Format::Format22s => {
                let (va, vb) = (reg(0)?, reg(1)?);
                insn[1] = (((vb & 0xF) << 4) | (va & 0xF)) as u8;
                insn[2..4].copy_from_slice(&(lit(2)? as i16).to_le_bytes());
            }
            Format::Format22c => {
                let (va, vb) = (reg(0)?, reg(1)?);
                insn[1] = (((vb & 0xF) << 4) | (va & 0xF)) as u8;
                let r = parts.get(2).ok_or_else(|| DexError::new("missing reference operand"))?;
                let idx = self
                    .find_field(r)
                    .or_else(|| self.find_type(r))
                    .ok_or_else(|| DexError::new(&format!("reference not found: {}", r)))?;
                insn[2..4].copy_from_slice(&(idx as u16).to_le_bytes());
            }
            Format::Format32x => {
                insn[2..4].copy_from_slice(&reg(0)?.to_le_bytes());
                insn[4..6].copy_from_slice(&reg(1)?.to_le_bytes());
            }
            Format::Format30t => {
                let v = parts
                    .first()
                    .and_then(|p| parse_literal(p))
                    .ok_or_else(|| DexError::new("invalid branch offset"))?;
                insn[2..6].copy_from_slice(&(v as i32).to_le_bytes());
            }
            Format::Format31t | Format::Format31i => {
                insn[1] = reg(0)? as u8;
                insn[2..6].copy_from_slice(&(lit(1)? as i32).to_le_bytes());
            }
            Format::Format31c => {
                insn[1] = reg(0)? as u8;
                let r = parts.get(1).ok_or_else(|| DexError::new("missing string operand"))?;
                let idx = self.resolve_string_ref(r)?;
                insn[2..6].copy_from_slice(&idx.to_le_bytes());
            }
            Format::Format35c => {
                let regs = parse_register_list(parts.first().map(String::as_str).unwrap_or(""))
                    .ok_or_else(|| DexError::new("invalid register list"))?;
                if regs.len() > 5 {
                    fail!("too many registers for a non-range call: {}", regs.len());
                }
                let r = parts.get(1).ok_or_else(|| DexError::new("missing reference operand"))?;
                let idx = if (0x6e..=0x72).contains(&op) {
                    self.find_method(r)
                        .ok_or_else(|| DexError::new(&format!("method not found: {}", r)))?
                } else {
                    self.find_type(r)
                        .ok_or_else(|| DexError::new(&format!("type not found: {}", r)))?
                };
                let g = regs.get(4).copied().unwrap_or(0) as u8 & 0xF;
                insn[1] = ((regs.len() as u8) << 4) | g;
                insn[2..4].copy_from_slice(&(idx as u16).to_le_bytes());
                let nib = |i: usize| regs.get(i).copied().unwrap_or(0) as u8 & 0xF;
                insn[4] = nib(0) | (nib(1) << 4);
                insn[5] = nib(2) | (nib(3) << 4);
            }
            Format::Format3rc => {
                let (start, end) =
                    parse_register_range(parts.first().map(String::as_str).unwrap_or(""))
                        .ok_or_else(|| DexError::new("invalid register range"))?;
                let r = parts.get(1).ok_or_else(|| DexError::new("missing reference operand"))?;
                let idx = if (0x74..=0x78).contains(&op) {
                    self.find_method(r)
                        .ok_or_else(|| DexError::new(&format!("method not found: {}", r)))?
                } else {
                    self.find_type(r)
                        .ok_or_else(|| DexError::new(&format!("type not found: {}", r)))?
                };
                insn[1] = (end - start + 1) as u8;
                insn[2..4].copy_from_slice(&(idx as u16).to_le_bytes());
                insn[4..6].copy_from_slice(&start.to_le_bytes());
            }
            Format::Format51l => {
                insn[1] = reg(0)? as u8;
                insn[2..10].copy_from_slice(&lit(1)?.to_le_bytes());
            }
        }
        Ok(insn)
    }

    fn resolve_21c(&self, r: &str) -> Result<u32, DexError> {
        if r.starts_with('"') {
            return self.resolve_string_ref(r);
        }
        if let Some(rest) = r.strip_prefix("field@") {
            return rest
                .parse()
                .map_err(|_| DexError::new(&format!("bad field index: {}", r)));
        }
        if r.contains("->") {
            return self
                .find_field(r)
                .ok_or_else(|| DexError::new(&format!("field not found: {}", r)));
        }
        if r.starts_with('L') || r.starts_with('[') || r.starts_with("type@") {
            return self
                .find_type(r)
                .ok_or_else(|| DexError::new(&format!("type not found: {}", r)));
        }
        self.find_field(r)
            .ok_or_else(|| DexError::new(&format!("reference not found: {}", r)))
    }

    fn resolve_string_ref(&self, r: &str) -> Result<u32, DexError> {
        if let Some(inner) = r.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
            return self
                .find_string(inner)
                .ok_or_else(|| DexError::new(&format!("string not found: \"{}\"", inner)));
        }
        if let Some(rest) = r.strip_prefix("string@") {
            return rest
                .parse()
                .map_err(|_| DexError::new(&format!("bad string index: {}", r)));
        }
        self.find_string(r)
            .ok_or_else(|| DexError::new(&format!("string not found: {}", r)))
    }
}

/// Removes a trailing `//` comment, honoring double quotes.
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut in_str = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => in_str = !in_str,
            b'/' if !in_str && i + 1 < bytes.len() && bytes[i + 1] == b'/' => {
                return &line[..i];
            }
            _ => {}
        }
        i += 1;
    }
    line
}

fn quoted(input: &str) -> IResult<&str, &str> {
    let esc = escaped(none_of("\\\""), '\\', one_of("\\\"'tbnrfu"));
    recognize(delimited(char('"'), alt((esc, tag(""))), char('"'))).parse(input)
}

fn braced(input: &str) -> IResult<&str, &str> {
    recognize(delimited(char('{'), take_while(|c| c != '}'), char('}'))).parse(input)
}

fn operand(input: &str) -> IResult<&str, &str> {
    let (input, _) = space0::<&str, NomError<&str>>(input)?;
    alt((quoted, braced, take_while1(|c| c != ','))).parse(input)
}

/// Splits an operand string on commas, keeping braced register lists and
/// quoted strings intact.
pub(crate) fn split_operands(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return vec![];
    }
    match separated_list0(char::<&str, NomError<&str>>(','), operand).parse(text) {
        Ok((_, parts)) => parts.iter().map(|p| p.trim().to_string()).collect(),
        Err(_) => vec![text.trim().to_string()],
    }
}

fn parse_register(s: &str) -> Option<u16> {
    let rest = s.trim().strip_prefix('v')?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Parses a numeric literal leniently: optional `#int`/`#long` prefix,
/// optional sign, decimal or `0x` hex, trailing text ignored (disassembler
/// comments ride along on the same operand).
fn parse_literal(s: &str) -> Option<i64> {
    let mut t = s.trim();
    for prefix in ["#long", "#int", "#"] {
        if let Some(rest) = t.strip_prefix(prefix) {
            t = rest.trim_start();
            break;
        }
    }
    let (negative, t) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t.strip_prefix('+').unwrap_or(t)),
    };
    let (radix, t) = match t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        Some(rest) => (16u32, rest),
        None => (10u32, t),
    };
    let digits: String = t.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return None;
    }
    let magnitude = u64::from_str_radix(&digits, radix).ok()?;
    Some(if negative {
        (magnitude as i64).wrapping_neg()
    } else {
        magnitude as i64
    })
}

fn parse_register_list(s: &str) -> Option<Vec<u16>> {
    let inner = s.trim().strip_prefix('{')?.strip_suffix('}')?;
    let mut regs = vec![];
    for token in inner.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        regs.push(parse_register(token)?);
    }
    Some(regs)
}

fn parse_register_range(s: &str) -> Option<(u16, u16)> {
    let inner = s.trim().strip_prefix('{')?.strip_suffix('}')?;
    match inner.split_once("..") {
        Some((a, b)) => {
            let start = parse_register(a)?;
            let end = parse_register(b)?;
            (end >= start).then_some((start, end))
        }
        None => {
            let only = parse_register(inner)?;
            Some((only, only))
        }
    }
}

// ---------------------------------------------------------------------------
// Class-source parsing for builder-level edits.
// ---------------------------------------------------------------------------

/// One `.method` block lifted out of a smali class document, body still as
/// text for the assembler.
#[derive(Debug, Clone)]
pub struct SmaliMethodSource {
    pub name: String,
    pub proto: String,
    pub access_flags: u32,
    pub registers: u16,
    pub body: String,
}

/// A parsed smali class document: the declaration plus its method blocks.
#[derive(Debug, Clone)]
pub struct SmaliClassSource {
    pub class_name: String,
    pub super_class: String,
    pub access_flags: u32,
    pub methods: Vec<SmaliMethodSource>,
}

fn access_flag_bit(word: &str) -> Option<u32> {
    Some(match word {
        "public" => 0x1,
        "private" => 0x2,
        "protected" => 0x4,
        "static" => 0x8,
        "final" => 0x10,
        "synchronized" => 0x20,
        "bridge" => 0x40,
        "varargs" => 0x80,
        "native" => 0x100,
        "interface" => 0x200,
        "abstract" => 0x400,
        "strict" => 0x800,
        "synthetic" => 0x1000,
        "constructor" => 0x10000,
        _ => return None,
    })
}

fn split_flags_and_tail(text: &str) -> (u32, &str) {
    let mut flags = 0u32;
    let mut rest = text.trim();
    loop {
        let word = rest.split_whitespace().next().unwrap_or("");
        match access_flag_bit(word) {
            Some(bit) => {
                flags |= bit;
                rest = rest[word.len()..].trim_start();
            }
            None => return (flags, rest),
        }
    }
}

/// Parses a `.class`/`.super`/`.method` document into a class source. Lines
/// that are not directives become method body text verbatim.
pub fn parse_class_source(text: &str) -> Result<SmaliClassSource, DexError> {
    let mut class_name = String::new();
    let mut super_class = "Ljava/lang/Object;".to_string();
    let mut class_flags = 0u32;
    let mut methods = vec![];
    let mut current: Option<SmaliMethodSource> = None;

    for (number, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if let Some(rest) = line.strip_prefix(".class") {
            let (flags, tail) = split_flags_and_tail(rest);
            class_flags = flags;
            class_name = tail.trim().to_string();
        } else if let Some(rest) = line.strip_prefix(".super") {
            super_class = rest.trim().to_string();
        } else if line == ".end method" {
            match current.take() {
                Some(m) => methods.push(m),
                None => fail!(".end method without .method at line {}", number + 1),
            }
        } else if let Some(rest) = line.strip_prefix(".method") {
            if current.is_some() {
                fail!("nested .method at line {}", number + 1);
            }
            let (flags, tail) = split_flags_and_tail(rest);
            let sig = tail.trim();
            let Some(paren) = sig.find('(') else {
                fail!("malformed method signature at line {}: {}", number + 1, sig);
            };
            current = Some(SmaliMethodSource {
                name: sig[..paren].to_string(),
                proto: sig[paren..].to_string(),
                access_flags: flags,
                registers: 1,
                body: String::new(),
            });
        } else if let Some(m) = current.as_mut() {
            if let Some(rest) = line.strip_prefix(".registers").or_else(|| line.strip_prefix(".locals")) {
                m.registers = rest.trim().parse().unwrap_or(1);
            } else {
                m.body.push_str(raw);
                m.body.push('\n');
            }
        }
    }

    if current.is_some() {
        fail!("unterminated .method block");
    }
    if class_name.is_empty() {
        fail!("smali document has no .class directive");
    }
    Ok(SmaliClassSource {
        class_name,
        super_class,
        access_flags: class_flags,
        methods,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::disasm::Disassembler;

    fn ctx() -> Assembler {
        Assembler {
            strings: vec!["hello".to_string(), "world".to_string()],
            types: vec!["Lcom/x/A;".to_string(), "[I".to_string()],
            methods: vec![
                "Lcom/x/A;->foo()V".to_string(),
                "Lcom/x/A;->bar(I)I".to_string(),
            ],
            fields: vec!["Lcom/x/A;->f:I".to_string()],
        }
    }

    #[test]
    fn return_void_assembles_to_0e00() {
        let a = ctx();
        assert_eq!(a.assemble("return-void").unwrap(), vec![0x0E, 0x00]);
    }

    #[test]
    fn directives_and_labels_emit_nothing() {
        let a = ctx();
        let smali = ".method public foo()V\n.registers 2\n:start\n.line 3\nreturn-void\n.end method\n";
        assert_eq!(a.assemble(smali).unwrap(), vec![0x0E, 0x00]);
    }

    #[test]
    fn offset_label_prefix_is_stripped() {
        let a = ctx();
        assert_eq!(a.assemble(".0000: return-void").unwrap(), vec![0x0E, 0x00]);
    }

    #[test]
    fn unknown_opcode_reports_line() {
        let a = ctx();
        let err = a.assemble("return-void\nbogus-op v0\n").unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("bogus-op"), "{}", rendered);
        assert!(rendered.contains("line 2"), "{}", rendered);
    }

    #[test]
    fn const_string_resolves_pool_index() {
        let a = ctx();
        let code = a.assemble("const-string v0, \"world\"").unwrap();
        assert_eq!(code, vec![0x1A, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn invoke_with_substring_fallback() {
        let a = ctx();
        let exact = a
            .assemble("invoke-virtual {v0}, Lcom/x/A;->foo()V")
            .unwrap();
        let partial = a.assemble("invoke-virtual {v0}, A;->foo").unwrap();
        assert_eq!(exact, partial);
    }

    #[test]
    fn roundtrip_through_disassembler() {
        let a = ctx();
        let d = Disassembler {
            strings: a.strings.clone(),
            types: a.types.clone(),
            methods: a.methods.clone(),
            fields: a.fields.clone(),
        };
        let programs: &[&[u8]] = &[
            &[0x0E, 0x00],                               // return-void
            &[0x12, 0x71, 0x0F, 0x02],                   // const/4 v1, 7; return v2
            &[0x1A, 0x00, 0x00, 0x00],                   // const-string v0, "hello"
            &[0x6E, 0x20, 0x01, 0x00, 0x31, 0x00],       // invoke-virtual {v1, v3}, bar
            &[0x90, 0x00, 0x01, 0x02],                   // add-int v0, v1, v2
            &[0xD8, 0x00, 0x01, 0x05],                   // add-int/lit8 v0, v1, 5
            &[0x38, 0x00, 0x03, 0x00],                   // if-eqz v0, +3
            &[0x52, 0x10, 0x00, 0x00],                   // iget v0, v1, field
            &[0x62, 0x00, 0x00, 0x00],                   // sget-object v0, field
            &[0x23, 0x10, 0x01, 0x00],                   // new-array v0, v1, [I
            &[0x74, 0x02, 0x00, 0x00, 0x05, 0x00],       // invoke-virtual/range {v5 .. v6}
            &[0x13, 0x00, 0xFF, 0xFF],                   // const/16 v0, -1
            &[0x15, 0x00, 0x01, 0x00],                   // const/high16 v0, 65536
            &[0x19, 0x00, 0x01, 0x00],                   // const-wide/high16
            &[0x18, 0x00, 0xD2, 0x02, 0x96, 0x49, 0x00, 0x00, 0x00, 0x00], // const-wide
        ];
        for code in programs {
            let insns = d.disassemble_method(code);
            let smali = d.to_smali(&insns);
            let rebuilt = a.assemble(&smali).unwrap_or_else(|e| {
                panic!("assemble failed for {:?}: {}", smali, e);
            });
            assert_eq!(&rebuilt, code, "smali was:\n{}", smali);
        }
    }

    #[test]
    fn operand_split_respects_braces_and_quotes() {
        let parts = split_operands("{v0, v1}, Lcom/x/A;->foo()V");
        assert_eq!(parts, vec!["{v0, v1}", "Lcom/x/A;->foo()V"]);
        let parts = split_operands("v0, \"a, b\"");
        assert_eq!(parts, vec!["v0", "\"a, b\""]);
    }

    #[test]
    fn lenient_literal_parsing() {
        assert_eq!(parse_literal("#int 5"), Some(5));
        assert_eq!(parse_literal("+3 # target 7"), Some(3));
        assert_eq!(parse_literal("-0x10"), Some(-16));
        assert_eq!(parse_literal("0x7fffffffL"), Some(0x7fffffff));
        assert_eq!(parse_literal("nope"), None);
    }

    #[test]
    fn class_source_parsing() {
        let text = "\
.class public Lcom/x/New;
.super Ljava/lang/Object;

.method public static main()V
    .registers 2
    const-string v0, \"hello\"
    return-void
.end method
";
        let src = parse_class_source(text).unwrap();
        assert_eq!(src.class_name, "Lcom/x/New;");
        assert_eq!(src.access_flags, 0x1);
        assert_eq!(src.methods.len(), 1);
        assert_eq!(src.methods[0].name, "main");
        assert_eq!(src.methods[0].proto, "()V");
        assert_eq!(src.methods[0].access_flags, 0x9);
        assert_eq!(src.methods[0].registers, 2);
        assert!(src.methods[0].body.contains("const-string"));
    }
}
