//! The Dalvik opcode table: mnemonic, encoding format and size in 16-bit
//! code units for all 256 opcode values.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Instruction encoding formats. The letter groups follow the Dalvik
/// instruction-format names: digit = code units, then register/literal shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Format10x,
    Format12x,
    Format11n,
    Format11x,
    Format10t,
    Format20t,
    Format22x,
    Format21t,
    Format21s,
    Format21h,
    Format21c,
    Format23x,
    Format22b,
    Format22t,
    Format22s,
    Format22c,
    Format32x,
    Format30t,
    Format31t,
    Format31i,
    Format31c,
    Format35c,
    Format3rc,
    Format51l,
}

#[derive(Debug, Clone, Copy)]
pub struct OpcodeInfo {
    pub name: &'static str,
    pub format: Format,
    /// Instruction size in 16-bit code units.
    pub units: u16,
}

const fn op(name: &'static str, format: Format, units: u16) -> OpcodeInfo {
    OpcodeInfo { name, format, units }
}

use Format::*;

pub static OPCODES: [OpcodeInfo; 256] = [
    op("nop", Format10x, 1),                    // 0x00
    op("move", Format12x, 1),                   // 0x01
    op("move/from16", Format22x, 2),            // 0x02
    op("move/16", Format32x, 3),                // 0x03
    op("move-wide", Format12x, 1),              // 0x04
    op("move-wide/from16", Format22x, 2),       // 0x05
    op("move-wide/16", Format32x, 3),           // 0x06
    op("move-object", Format12x, 1),            // 0x07
    op("move-object/from16", Format22x, 2),     // 0x08
    op("move-object/16", Format32x, 3),         // 0x09
    op("move-result", Format11x, 1),            // 0x0a
    op("move-result-wide", Format11x, 1),       // 0x0b
    op("move-result-object", Format11x, 1),     // 0x0c
    op("move-exception", Format11x, 1),         // 0x0d
    op("return-void", Format10x, 1),            // 0x0e
    op("return", Format11x, 1),                 // 0x0f
    op("return-wide", Format11x, 1),            // 0x10
    op("return-object", Format11x, 1),          // 0x11
    op("const/4", Format11n, 1),                // 0x12
    op("const/16", Format21s, 2),               // 0x13
    op("const", Format31i, 3),                  // 0x14
    op("const/high16", Format21h, 2),           // 0x15
    op("const-wide/16", Format21s, 2),          // 0x16
    op("const-wide/32", Format31i, 3),          // 0x17
    op("const-wide", Format51l, 5),             // 0x18
    op("const-wide/high16", Format21h, 2),      // 0x19
    op("const-string", Format21c, 2),           // 0x1a
    op("const-string/jumbo", Format31c, 3),     // 0x1b
    op("const-class", Format21c, 2),            // 0x1c
    op("monitor-enter", Format11x, 1),          // 0x1d
    op("monitor-exit", Format11x, 1),           // 0x1e
    op("check-cast", Format21c, 2),             // 0x1f
    op("instance-of", Format22c, 2),            // 0x20
    op("array-length", Format12x, 1),           // 0x21
    op("new-instance", Format21c, 2),           // 0x22
    op("new-array", Format22c, 2),              // 0x23
    op("filled-new-array", Format35c, 3),       // 0x24
    op("filled-new-array/range", Format3rc, 3), // 0x25
    op("fill-array-data", Format31t, 3),        // 0x26
    op("throw", Format11x, 1),                  // 0x27
    op("goto", Format10t, 1),                   // 0x28
    op("goto/16", Format20t, 2),                // 0x29
    op("goto/32", Format30t, 3),                // 0x2a
    op("packed-switch", Format31t, 3),          // 0x2b
    op("sparse-switch", Format31t, 3),          // 0x2c
    op("cmpl-float", Format23x, 2),             // 0x2d
    op("cmpg-float", Format23x, 2),             // 0x2e
    op("cmpl-double", Format23x, 2),            // 0x2f
    op("cmpg-double", Format23x, 2),            // 0x30
    op("cmp-long", Format23x, 2),               // 0x31
    op("if-eq", Format22t, 2),                  // 0x32
    op("if-ne", Format22t, 2),                  // 0x33
    op("if-lt", Format22t, 2),                  // 0x34
    op("if-ge", Format22t, 2),                  // 0x35
    op("if-gt", Format22t, 2),                  // 0x36
    op("if-le", Format22t, 2),                  // 0x37
    op("if-eqz", Format21t, 2),                 // 0x38
    op("if-nez", Format21t, 2),                 // 0x39
    op("if-ltz", Format21t, 2),                 // 0x3a
    op("if-gez", Format21t, 2),                 // 0x3b
    op("if-gtz", Format21t, 2),                 // 0x3c
    op("if-lez", Format21t, 2),                 // 0x3d
    op("unused-3e", Format10x, 1),              // 0x3e
    op("unused-3f", Format10x, 1),              // 0x3f
    op("unused-40", Format10x, 1),              // 0x40
    op("unused-41", Format10x, 1),              // 0x41
    op("unused-42", Format10x, 1),              // 0x42
    op("unused-43", Format10x, 1),              // 0x43
    op("aget", Format23x, 2),                   // 0x44
    op("aget-wide", Format23x, 2),              // 0x45
    op("aget-object", Format23x, 2),            // 0x46
    op("aget-boolean", Format23x, 2),           // 0x47
    op("aget-byte", Format23x, 2),              // 0x48
    op("aget-char", Format23x, 2),              // 0x49
    op("aget-short", Format23x, 2),             // 0x4a
    op("aput", Format23x, 2),                   // 0x4b
    op("aput-wide", Format23x, 2),              // 0x4c
    op("aput-object", Format23x, 2),            // 0x4d
    op("aput-boolean", Format23x, 2),           // 0x4e
    op("aput-byte", Format23x, 2),              // 0x4f
    op("aput-char", Format23x, 2),              // 0x50
    op("aput-short", Format23x, 2),             // 0x51
    op("iget", Format22c, 2),                   // 0x52
    op("iget-wide", Format22c, 2),              // 0x53
    op("iget-object", Format22c, 2),            // 0x54
    op("iget-boolean", Format22c, 2),           // 0x55
    op("iget-byte", Format22c, 2),              // 0x56
    op("iget-char", Format22c, 2),              // 0x57
    op("iget-short", Format22c, 2),             // 0x58
    op("iput", Format22c, 2),                   // 0x59
    op("iput-wide", Format22c, 2),              // 0x5a
    op("iput-object", Format22c, 2),            // 0x5b
    op("iput-boolean", Format22c, 2),           // 0x5c
    op("iput-byte", Format22c, 2),              // 0x5d
    op("iput-char", Format22c, 2),              // 0x5e
    op("iput-short", Format22c, 2),             // 0x5f
    op("sget", Format21c, 2),                   // 0x60
    op("sget-wide", Format21c, 2),              // 0x61
    op("sget-object", Format21c, 2),            // 0x62
    op("sget-boolean", Format21c, 2),           // 0x63
    op("sget-byte", Format21c, 2),              // 0x64
    op("sget-char", Format21c, 2),              // 0x65
    op("sget-short", Format21c, 2),             // 0x66
    op("sput", Format21c, 2),                   // 0x67
    op("sput-wide", Format21c, 2),              // 0x68
    op("sput-object", Format21c, 2),            // 0x69
    op("sput-boolean", Format21c, 2),           // 0x6a
    op("sput-byte", Format21c, 2),              // 0x6b
    op("sput-char", Format21c, 2),              // 0x6c
    op("sput-short", Format21c, 2),             // 0x6d
    op("invoke-virtual", Format35c, 3),         // 0x6e
    op("invoke-super", Format35c, 3),           // 0x6f
    op("invoke-direct", Format35c, 3),          // 0x70
    op("invoke-static", Format35c, 3),          // 0x71
    op("invoke-interface", Format35c, 3),       // 0x72
    op("unused-73", Format10x, 1),              // 0x73
    op("invoke-virtual/range", Format3rc, 3),   // 0x74
    op("invoke-super/range", Format3rc, 3),     // 0x75
    op("invoke-direct/range", Format3rc, 3),    // 0x76
    op("invoke-static/range", Format3rc, 3),    // 0x77
    op("invoke-interface/range", Format3rc, 3), // 0x78
    op("unused-79", Format10x, 1),              // 0x79
    op("unused-7a", Format10x, 1),              // 0x7a
    op("neg-int", Format12x, 1),                // 0x7b
    op("not-int", Format12x, 1),                // 0x7c
    op("neg-long", Format12x, 1),               // 0x7d
    op("not-long", Format12x, 1),               // 0x7e
    op("neg-float", Format12x, 1),              // 0x7f
    op("neg-double", Format12x, 1),             // 0x80
    op("int-to-long", Format12x, 1),            // 0x81
    op("int-to-float", Format12x, 1),           // 0x82
    op("int-to-double", Format12x, 1),          // 0x83
    op("long-to-int", Format12x, 1),            // 0x84
    op("long-to-float", Format12x, 1),          // 0x85
    op("long-to-double", Format12x, 1),         // 0x86
    op("float-to-int", Format12x, 1),           // 0x87
    op("float-to-long", Format12x, 1),          // 0x88
    op("float-to-double", Format12x, 1),        // 0x89
    op("double-to-int", Format12x, 1),          // 0x8a
    op("double-to-long", Format12x, 1),         // 0x8b
    op("double-to-float", Format12x, 1),        // 0x8c
    op("int-to-byte", Format12x, 1),            // 0x8d
    op("int-to-char", Format12x, 1),            // 0x8e
    op("int-to-short", Format12x, 1),           // 0x8f
    op("add-int", Format23x, 2),                // 0x90
    op("sub-int", Format23x, 2),                // 0x91
    op("mul-int", Format23x, 2),                // 0x92
    op("div-int", Format23x, 2),                // 0x93
    op("rem-int", Format23x, 2),                // 0x94
    op("and-int", Format23x, 2),                // 0x95
    op("or-int", Format23x, 2),                 // 0x96
    op("xor-int", Format23x, 2),                // 0x97
    op("shl-int", Format23x, 2),                // 0x98
    op("shr-int", Format23x, 2),                // 0x99
    op("ushr-int", Format23x, 2),               // 0x9a
    op("add-long", Format23x, 2),               // 0x9b
    op("sub-long", Format23x, 2),               // 0x9c
    op("mul-long", Format23x, 2),               // 0x9d
    op("div-long", Format23x, 2),               // 0x9e
    op("rem-long", Format23x, 2),               // 0x9f
    op("and-long", Format23x, 2),               // 0xa0
    op("or-long", Format23x, 2),                // 0xa1
    op("xor-long", Format23x, 2),               // 0xa2
    op("shl-long", Format23x, 2),               // 0xa3
    op("shr-long", Format23x, 2),               // 0xa4
    op("ushr-long", Format23x, 2),              // 0xa5
    op("add-float", Format23x, 2),              // 0xa6
    op("sub-float", Format23x, 2),              // 0xa7
    op("mul-float", Format23x, 2),              // 0xa8
    op("div-float", Format23x, 2),              // 0xa9
    op("rem-float", Format23x, 2),              // 0xaa
    op("add-double", Format23x, 2),             // 0xab
    op("sub-double", Format23x, 2),             // 0xac
    op("mul-double", Format23x, 2),             // 0xad
    op("div-double", Format23x, 2),             // 0xae
    op("rem-double", Format23x, 2),             // 0xaf
    op("add-int/2addr", Format12x, 1),          // 0xb0
    op("sub-int/2addr", Format12x, 1),          // 0xb1
    op("mul-int/2addr", Format12x, 1),          // 0xb2
    op("div-int/2addr", Format12x, 1),          // 0xb3
    op("rem-int/2addr", Format12x, 1),          // 0xb4
    op("and-int/2addr", Format12x, 1),          // 0xb5
    op("or-int/2addr", Format12x, 1),           // 0xb6
    op("xor-int/2addr", Format12x, 1),          // 0xb7
    op("shl-int/2addr", Format12x, 1),          // 0xb8
    op("shr-int/2addr", Format12x, 1),          // 0xb9
    op("ushr-int/2addr", Format12x, 1),         // 0xba
    op("add-long/2addr", Format12x, 1),         // 0xbb
    op("sub-long/2addr", Format12x, 1),         // 0xbc
    op("mul-long/2addr", Format12x, 1),         // 0xbd
    op("div-long/2addr", Format12x, 1),         // 0xbe
    op("rem-long/2addr", Format12x, 1),         // 0xbf
    op("and-long/2addr", Format12x, 1),         // 0xc0
    op("or-long/2addr", Format12x, 1),          // 0xc1
    op("xor-long/2addr", Format12x, 1),         // 0xc2
    op("shl-long/2addr", Format12x, 1),         // 0xc3
    op("shr-long/2addr", Format12x, 1),         // 0xc4
    op("ushr-long/2addr", Format12x, 1),        // 0xc5
    op("add-float/2addr", Format12x, 1),        // 0xc6
    op("sub-float/2addr", Format12x, 1),        // 0xc7
    op("mul-float/2addr", Format12x, 1),        // 0xc8
    op("div-float/2addr", Format12x, 1),        // 0xc9
    op("rem-float/2addr", Format12x, 1),        // 0xca
    op("add-double/2addr", Format12x, 1),       // 0xcb
    op("sub-double/2addr", Format12x, 1),       // 0xcc
    op("mul-double/2addr", Format12x, 1),       // 0xcd
    op("div-double/2addr", Format12x, 1),       // 0xce
    op("rem-double/2addr", Format12x, 1),       // 0xcf
    op("add-int/lit16", Format22s, 2),          // 0xd0
    op("rsub-int", Format22s, 2),               // 0xd1
    op("mul-int/lit16", Format22s, 2),          // 0xd2
    op("div-int/lit16", Format22s, 2),          // 0xd3
    op("rem-int/lit16", Format22s, 2),          // 0xd4
    op("and-int/lit16", Format22s, 2),          // 0xd5
    op("or-int/lit16", Format22s, 2),           // 0xd6
    op("xor-int/lit16", Format22s, 2),          // 0xd7
    op("add-int/lit8", Format22b, 2),           // 0xd8
    op("rsub-int/lit8", Format22b, 2),          // 0xd9
    op("mul-int/lit8", Format22b, 2),           // 0xda
    op("div-int/lit8", Format22b, 2),           // 0xdb
    op("rem-int/lit8", Format22b, 2),           // 0xdc
    op("and-int/lit8", Format22b, 2),           // 0xdd
    op("or-int/lit8", Format22b, 2),            // 0xde
    op("xor-int/lit8", Format22b, 2),           // 0xdf
    op("shl-int/lit8", Format22b, 2),           // 0xe0
    op("shr-int/lit8", Format22b, 2),           // 0xe1
    op("ushr-int/lit8", Format22b, 2),          // 0xe2
    op("unused-e3", Format10x, 1),              // 0xe3
    op("unused-e4", Format10x, 1),              // 0xe4
    op("unused-e5", Format10x, 1),              // 0xe5
    op("unused-e6", Format10x, 1),              // 0xe6
    op("unused-e7", Format10x, 1),              // 0xe7
    op("unused-e8", Format10x, 1),              // 0xe8
    op("unused-e9", Format10x, 1),              // 0xe9
    op("unused-ea", Format10x, 1),              // 0xea
    op("unused-eb", Format10x, 1),              // 0xeb
    op("unused-ec", Format10x, 1),              // 0xec
    op("unused-ed", Format10x, 1),              // 0xed
    op("unused-ee", Format10x, 1),              // 0xee
    op("unused-ef", Format10x, 1),              // 0xef
    op("unused-f0", Format10x, 1),              // 0xf0
    op("unused-f1", Format10x, 1),              // 0xf1
    op("unused-f2", Format10x, 1),              // 0xf2
    op("unused-f3", Format10x, 1),              // 0xf3
    op("unused-f4", Format10x, 1),              // 0xf4
    op("unused-f5", Format10x, 1),              // 0xf5
    op("unused-f6", Format10x, 1),              // 0xf6
    op("unused-f7", Format10x, 1),              // 0xf7
    op("unused-f8", Format10x, 1),              // 0xf8
    op("unused-f9", Format10x, 1),              // 0xf9
    op("unused-fa", Format10x, 1),              // 0xfa
    op("unused-fb", Format10x, 1),              // 0xfb
    op("unused-fc", Format10x, 1),              // 0xfc
    op("unused-fd", Format10x, 1),              // 0xfd
    op("unused-fe", Format10x, 1),              // 0xfe
    op("unused-ff", Format10x, 1),              // 0xff
];

static OPCODE_BY_NAME: Lazy<HashMap<&'static str, u8>> = Lazy::new(|| {
    let mut map = HashMap::with_capacity(256);
    for (value, info) in OPCODES.iter().enumerate() {
        map.entry(info.name).or_insert(value as u8);
    }
    map
});

#[inline]
pub fn opcode_info(opcode: u8) -> &'static OpcodeInfo {
    &OPCODES[opcode as usize]
}

pub fn opcode_by_name(name: &str) -> Option<u8> {
    OPCODE_BY_NAME.get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_covers_every_value() {
        assert_eq!(OPCODES.len(), 256);
        assert_eq!(opcode_info(0x0e).name, "return-void");
        assert_eq!(opcode_info(0x6e).name, "invoke-virtual");
        assert_eq!(opcode_info(0x6e).units, 3);
        assert_eq!(opcode_info(0x18).units, 5);
    }

    #[test]
    fn name_lookup_inverts_the_table() {
        assert_eq!(opcode_by_name("return-void"), Some(0x0e));
        assert_eq!(opcode_by_name("invoke-static/range"), Some(0x77));
        assert_eq!(opcode_by_name("const-wide/high16"), Some(0x19));
        assert_eq!(opcode_by_name("no-such-op"), None);
    }

    #[test]
    fn invoke_ranges_match_xref_walker_assumptions() {
        for v in 0x6e..=0x72u8 {
            assert_eq!(opcode_info(v).units, 3);
        }
        for v in 0x74..=0x78u8 {
            assert_eq!(opcode_info(v).units, 3);
        }
        for v in 0x52..=0x6du8 {
            assert_eq!(opcode_info(v).units, 2);
        }
    }
}
