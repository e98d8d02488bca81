//! Linear Dalvik disassembler.
//!
//! Decodes one instruction per opcode-table row and substitutes pool
//! references (strings, types, methods, fields) from context vectors built by
//! the parser. No control-flow reconstruction; branches carry a comment with
//! the absolute target in code units.

use crate::dex::dex_file::{access_flags_smali, DexFile};
use crate::dex::error::DexError;
use crate::dex::opcodes::{opcode_info, Format};
use crate::fail;

/// One disassembled instruction.
#[derive(Debug, Clone, Default)]
pub struct Insn {
    /// Byte offset of the instruction within its code stream.
    pub offset: u32,
    pub opcode: String,
    pub operands: String,
    pub comment: String,
    /// The raw 16-bit code units backing this instruction.
    pub raw_units: Vec<u16>,
}

/// Resolver context for pool references. Build one per DEX with
/// [`Disassembler::for_dex`]; the vectors are positional (index = pool id).
#[derive(Debug, Default)]
pub struct Disassembler {
    pub strings: Vec<String>,
    pub types: Vec<String>,
    pub methods: Vec<String>,
    pub fields: Vec<String>,
}

#[inline]
fn u16_at(code: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([code[at], code[at + 1]])
}

#[inline]
fn u32_at(code: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([code[at], code[at + 1], code[at + 2], code[at + 3]])
}

#[inline]
fn i64_at(code: &[u8], at: usize) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&code[at..at + 8]);
    i64::from_le_bytes(raw)
}

#[inline]
fn low_nibble(b: u8) -> u8 {
    b & 0xF
}

#[inline]
fn high_nibble(b: u8) -> u8 {
    (b >> 4) & 0xF
}

/// Sign-extends the high nibble of a `B|A` byte into an i8.
#[inline]
fn signed_high_nibble(b: u8) -> i8 {
    ((b as i8) >> 4) as i8
}

impl Disassembler {
    pub fn for_dex(dex: &DexFile) -> Disassembler {
        Disassembler {
            strings: dex.strings.iter().map(|s| s.to_string_lossy()).collect(),
            types: (0..dex.types.len() as u32).map(|i| dex.type_name(i)).collect(),
            methods: dex.method_signatures(),
            fields: dex.field_signatures(),
        }
    }

    fn resolve_string(&self, idx: u32) -> String {
        match self.strings.get(idx as usize) {
            Some(s) => format!("\"{}\"", s),
            None => format!("string@{}", idx),
        }
    }

    fn resolve_type(&self, idx: u32) -> String {
        match self.types.get(idx as usize) {
            Some(t) => t.clone(),
            None => format!("type@{}", idx),
        }
    }

    fn resolve_method(&self, idx: u32) -> String {
        match self.methods.get(idx as usize) {
            Some(m) => m.clone(),
            None => format!("method@{}", idx),
        }
    }

    fn resolve_field(&self, idx: u32) -> String {
        match self.fields.get(idx as usize) {
            Some(f) => f.clone(),
            None => format!("field@{}", idx),
        }
    }

    /// Decodes the instruction at the start of `code`. `offset` is the byte
    /// offset of `code[0]` within the whole stream, used for branch comments.
    pub fn disassemble_insn(&self, code: &[u8], offset: u32) -> Insn {
        let mut insn = Insn {
            offset,
            ..Insn::default()
        };
        if code.len() < 2 {
            insn.opcode = "invalid".to_string();
            return insn;
        }

        let op = code[0];
        let info = opcode_info(op);
        insn.opcode = info.name.to_string();

        let byte_size = info.units as usize * 2;
        let mut at = 0;
        while at < byte_size && at + 1 < code.len() {
            insn.raw_units.push(u16_at(code, at));
            at += 2;
        }
        if code.len() < byte_size {
            // Truncated tail; render what we know and stop decoding operands.
            insn.operands = "?".to_string();
            return insn;
        }

        let cu = |rel: i32| (offset / 2) as i64 + rel as i64;

        insn.operands = match info.format {
            Format::Format10x => String::new(),
            Format::Format12x => {
                format!("v{}, v{}", low_nibble(code[1]), high_nibble(code[1]))
            }
            Format::Format11n => {
                format!("v{}, #int {}", low_nibble(code[1]), signed_high_nibble(code[1]))
            }
            Format::Format11x => format!("v{}", code[1]),
            Format::Format10t => {
                let rel = code[1] as i8 as i32;
                insn.comment = format!("goto {}", cu(rel));
                format!("{:+}", rel)
            }
            Format::Format20t => {
                let rel = u16_at(code, 2) as i16 as i32;
                insn.comment = format!("goto {}", cu(rel));
                format!("{:+}", rel)
            }
            Format::Format22x => format!("v{}, v{}", code[1], u16_at(code, 2)),
            Format::Format21t => {
                let rel = u16_at(code, 2) as i16 as i32;
                insn.comment = format!("target {}", cu(rel));
                format!("v{}, {:+}", code[1], rel)
            }
            Format::Format21s => {
                format!("v{}, #int {}", code[1], u16_at(code, 2) as i16)
            }
            Format::Format21h => {
                let hi = u16_at(code, 2) as i16;
                if op == 0x15 {
                    format!("v{}, #int {}", code[1], (hi as i32) << 16)
                } else {
                    format!("v{}, #long {}", code[1], (hi as i64) << 48)
                }
            }
            Format::Format21c => {
                let idx = u16_at(code, 2) as u32;
                let arg = match op {
                    0x1a => self.resolve_string(idx),
                    0x1c | 0x1f | 0x22 => self.resolve_type(idx),
                    0x60..=0x6d => self.resolve_field(idx),
                    _ => format!("ref@{}", idx),
                };
                format!("v{}, {}", code[1], arg)
            }
            Format::Format23x => format!("v{}, v{}, v{}", code[1], code[2], code[3]),
            Format::Format22b => {
                format!("v{}, v{}, #int {}", code[1], code[2], code[3] as i8)
            }
            Format::Format22t => {
                let rel = u16_at(code, 2) as i16 as i32;
                insn.comment = format!("target {}", cu(rel));
                format!(
                    "v{}, v{}, {:+}",
                    low_nibble(code[1]),
                    high_nibble(code[1]),
                    rel
                )
            }
            Format::Format22s => {
                format!(
                    "v{}, v{}, #int {}",
                    low_nibble(code[1]),
                    high_nibble(code[1]),
                    u16_at(code, 2) as i16
                )
            }
            Format::Format22c => {
                let idx = u16_at(code, 2) as u32;
                let arg = if op == 0x20 || op == 0x23 {
                    self.resolve_type(idx)
                } else {
                    self.resolve_field(idx)
                };
                format!(
                    "v{}, v{}, {}",
                    low_nibble(code[1]),
                    high_nibble(code[1]),
                    arg
                )
            }
            Format::Format32x => format!("v{}, v{}", u16_at(code, 2), u16_at(code, 4)),
            Format::Format30t => {
                let rel = u32_at(code, 2) as i32;
                insn.comment = format!("goto {}", cu(rel));
                format!("{:+}", rel)
            }
            Format::Format31t => {
                format!("v{}, {:+}", code[1], u32_at(code, 2) as i32)
            }
            Format::Format31i => {
                format!("v{}, #int {}", code[1], u32_at(code, 2) as i32)
            }
            Format::Format31c => {
                format!("v{}, {}", code[1], self.resolve_string(u32_at(code, 2)))
            }
            Format::Format35c => {
                let count = high_nibble(code[1]) as usize;
                let g = low_nibble(code[1]);
                let idx = u16_at(code, 2) as u32;
                let regs = [
                    low_nibble(code[4]),
                    high_nibble(code[4]),
                    low_nibble(code[5]),
                    high_nibble(code[5]),
                    g,
                ];
                let list: Vec<String> = regs
                    .iter()
                    .take(count.min(5))
                    .map(|r| format!("v{}", r))
                    .collect();
                let arg = if (0x6e..=0x72).contains(&op) {
                    self.resolve_method(idx)
                } else {
                    self.resolve_type(idx)
                };
                format!("{{{}}}, {}", list.join(", "), arg)
            }
            Format::Format3rc => {
                let count = code[1] as u16;
                let idx = u16_at(code, 2) as u32;
                let first = u16_at(code, 4);
                let arg = if (0x74..=0x78).contains(&op) {
                    self.resolve_method(idx)
                } else {
                    self.resolve_type(idx)
                };
                format!(
                    "{{v{} .. v{}}}, {}",
                    first,
                    first as u32 + count.saturating_sub(1) as u32,
                    arg
                )
            }
            Format::Format51l => {
                format!("v{}, #long {}", code[1], i64_at(code, 2))
            }
        };
        insn
    }

    /// Decodes the whole instruction stream front to back, stepping by the
    /// table size of each opcode.
    pub fn disassemble_method(&self, code: &[u8]) -> Vec<Insn> {
        let mut result = vec![];
        let mut offset = 0usize;
        while offset + 1 < code.len() {
            let insn = self.disassemble_insn(&code[offset..], offset as u32);
            let step = opcode_info(code[offset]).units as usize * 2;
            result.push(insn);
            offset += step;
        }
        result
    }

    /// Renders disassembled instructions as indented smali body lines.
    pub fn to_smali(&self, insns: &[Insn]) -> String {
        let mut out = String::new();
        for insn in insns {
            out.push_str("    ");
            out.push_str(&insn.opcode);
            if !insn.operands.is_empty() {
                out.push(' ');
                out.push_str(&insn.operands);
            }
            if !insn.comment.is_empty() {
                out.push_str(" # ");
                out.push_str(&insn.comment);
            }
            out.push('\n');
        }
        out
    }
}

/// Disassembles one method into a `.method ... .end method` block.
pub fn method_smali(dex: &DexFile, class_name: &str, method_name: &str) -> Result<String, DexError> {
    let Some(code) = dex.get_method_code(class_name, method_name) else {
        fail!("method not found or has no code: {}->{}", class_name, method_name);
    };
    let disasm = Disassembler::for_dex(dex);
    let insns = disasm.disassemble_method(&code.insns);
    let proto = dex
        .methods
        .iter()
        .find(|m| dex.type_name(m.class_idx) == class_name && dex.string(m.name_idx) == method_name)
        .map(|m| dex.proto_string(m.proto_idx))
        .unwrap_or_else(|| "()V".to_string());

    let mut out = String::new();
    out.push_str(&format!(".method public {}{}\n", method_name, proto));
    out.push_str(&format!("    .registers {}\n", code.registers_size));
    out.push_str(&disasm.to_smali(&insns));
    out.push_str(".end method\n");
    Ok(out)
}

/// Disassembles every code-carrying method of a class into a full smali
/// document. Abstract and native methods are omitted.
pub fn class_smali(dex: &DexFile, class_name: &str) -> Result<String, DexError> {
    let Some(cls) = dex
        .class_defs
        .iter()
        .find(|c| dex.type_name(c.class_idx) == class_name)
    else {
        fail!("class not found: {}", class_name);
    };

    let disasm = Disassembler::for_dex(dex);
    let mut out = String::new();

    let class_flags = access_flags_smali(cls.access_flags);
    if class_flags.is_empty() {
        out.push_str(&format!(".class {}\n", class_name));
    } else {
        out.push_str(&format!(".class {} {}\n", class_flags, class_name));
    }
    let superclass = if cls.superclass_idx == crate::dex::dex_file::NO_INDEX {
        "Ljava/lang/Object;".to_string()
    } else {
        dex.type_name(cls.superclass_idx)
    };
    out.push_str(&format!(".super {}\n\n", superclass));

    if cls.class_data_off != 0 {
        let class_data = dex.class_data(cls.class_data_off)?;
        for m in class_data.methods() {
            if m.code_off == 0 {
                continue;
            }
            let Some(mid) = dex.methods.get(m.method_idx as usize) else {
                continue;
            };
            let code = dex.code_item(m.code_off)?;
            let insns = disasm.disassemble_method(&code.insns);
            let flags = access_flags_smali(m.access_flags);
            let head = if flags.is_empty() {
                format!(".method {}{}\n", dex.string(mid.name_idx), dex.proto_string(mid.proto_idx))
            } else {
                format!(
                    ".method {} {}{}\n",
                    flags,
                    dex.string(mid.name_idx),
                    dex.proto_string(mid.proto_idx)
                )
            };
            out.push_str(&head);
            out.push_str(&format!("    .registers {}\n", code.registers_size));
            out.push_str(&disasm.to_smali(&insns));
            out.push_str(".end method\n\n");
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare() -> Disassembler {
        Disassembler {
            strings: vec!["hello".to_string()],
            types: vec!["Lcom/x/A;".to_string()],
            methods: vec!["Lcom/x/A;->foo()V".to_string()],
            fields: vec!["Lcom/x/A;->f:I".to_string()],
        }
    }

    #[test]
    fn return_void_single_line() {
        let d = bare();
        let insns = d.disassemble_method(&[0x0E, 0x00]);
        assert_eq!(insns.len(), 1);
        assert_eq!(insns[0].opcode, "return-void");
        assert_eq!(insns[0].operands, "");
    }

    #[test]
    fn format12x_nibbles() {
        let d = bare();
        // move vA=2, vB=7 -> byte 1 is B|A = 0x72
        let insn = d.disassemble_insn(&[0x01, 0x72], 0);
        assert_eq!(insn.opcode, "move");
        assert_eq!(insn.operands, "v2, v7");
    }

    #[test]
    fn format11n_signed_literal() {
        let d = bare();
        // const/4 v0, #-1 -> high nibble 0xF
        let insn = d.disassemble_insn(&[0x12, 0xF0], 0);
        assert_eq!(insn.operands, "v0, #int -1");
    }

    #[test]
    fn format21c_resolves_by_opcode_kind() {
        let d = bare();
        let s = d.disassemble_insn(&[0x1A, 0x00, 0x00, 0x00], 0);
        assert_eq!(s.operands, "v0, \"hello\"");
        let t = d.disassemble_insn(&[0x22, 0x01, 0x00, 0x00], 0);
        assert_eq!(t.operands, "v1, Lcom/x/A;");
        let f = d.disassemble_insn(&[0x60, 0x02, 0x00, 0x00], 0);
        assert_eq!(f.operands, "v2, Lcom/x/A;->f:I");
    }

    #[test]
    fn format35c_register_order() {
        let d = bare();
        // invoke-virtual {v1, v2, v3}, method@0
        // A=3, G=0; F|E|D|C nibbles: C=1, D=2, E=3, F=0
        let insn = d.disassemble_insn(&[0x6E, 0x30, 0x00, 0x00, 0x21, 0x03], 0);
        assert_eq!(insn.operands, "{v1, v2, v3}, Lcom/x/A;->foo()V");
    }

    #[test]
    fn format3rc_range_rendering() {
        let d = bare();
        // invoke-static/range {v4 .. v6}, method@0
        let insn = d.disassemble_insn(&[0x77, 0x03, 0x00, 0x00, 0x04, 0x00], 0);
        assert_eq!(insn.operands, "{v4 .. v6}, Lcom/x/A;->foo()V");
    }

    #[test]
    fn branch_comment_is_absolute_code_units() {
        let d = bare();
        // if-eqz v0, +3 at byte offset 4 (code unit 2) -> target 5
        let insn = d.disassemble_insn(&[0x38, 0x00, 0x03, 0x00], 4);
        assert_eq!(insn.operands, "v0, +3");
        assert_eq!(insn.comment, "target 5");
    }

    #[test]
    fn const_wide_decodes_64_bit_literal() {
        let d = bare();
        let mut code = vec![0x18, 0x02];
        code.extend_from_slice(&(-42i64).to_le_bytes());
        let insn = d.disassemble_insn(&code, 0);
        assert_eq!(insn.operands, "v2, #long -42");
    }

    #[test]
    fn high16_literals_are_shifted() {
        let d = bare();
        let insn = d.disassemble_insn(&[0x15, 0x00, 0x01, 0x00], 0);
        assert_eq!(insn.operands, "v0, #int 65536");
        let wide = d.disassemble_insn(&[0x19, 0x00, 0x01, 0x00], 0);
        assert_eq!(wide.operands, "v0, #long 281474976710656");
    }
}
