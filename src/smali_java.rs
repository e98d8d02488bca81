//! Best-effort Smali to Java-like pseudocode translation.
//!
//! Strictly line-scoped pattern matching: no control-flow reconstruction and
//! no real type inference. A per-method register table carries just enough
//! dataflow to name a register on its second use. Lines that match nothing
//! are preserved as `// ...` comments so the output stays reviewable.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

static CONST_STRING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"const-string\s+(\w+),\s*"(.*)""#).unwrap());
static CONST_CLASS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"const-class\s+(\w+),\s*(\S+)").unwrap());
static CONST_NUM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"const(?:-wide)?(?:/\w+)?\s+(\w+),\s*(?:#(?:int|long)\s+)?(-?0x[0-9a-fA-F]+|-?\d+)").unwrap()
});
static MOVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"move(?:-object|-wide|-result(?:-object|-wide)?|-exception)?\s+(\w+)(?:,\s*(\w+))?").unwrap()
});
static INVOKE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"invoke-(\w+)(?:/range)?\s*\{([^}]*)\},\s*(\S+)").unwrap());
static FIELD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(i|s)(get|put)(?:-\w+)?\s+(\w+),\s*(?:(\w+),\s*)?(\S+)").unwrap());
static RETURN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"return(?:-void|-object|-wide)?\s*(\w+)?").unwrap());
static IF_Z_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"if-(eq|ne|lt|ge|gt|le)z\s+(\w+),\s*:?(\S+)").unwrap());
static IF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"if-(eq|ne|lt|ge|gt|le)\s+(\w+),\s*(\w+),\s*:?(\S+)").unwrap());
static NEW_INSTANCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"new-instance\s+(\w+),\s*(\S+)").unwrap());
static NEW_ARRAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"new-array\s+(\w+),\s*(\w+),\s*(\S+)").unwrap());
static ARITH3_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(add|sub|mul|div|rem|and|or|xor|shl|shr|ushr)-(\w+)(?:/lit\d+)?\s+(\w+),\s*(\w+),\s*(.+)")
        .unwrap()
});
static ARITH2_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(add|sub|mul|div|rem|and|or|xor|shl|shr|ushr)-(\w+)/2addr\s+(\w+),\s*(\w+)").unwrap()
});
static NEG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(neg|not)-(\w+)\s+(\w+),\s*(\w+)").unwrap());
static CHECK_CAST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"check-cast\s+(\w+),\s*(\S+)").unwrap());
static CONV_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w+)-to-(\w+)\s+(\w+),\s*(\w+)").unwrap());
static AGET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"aget(?:-\w+)?\s+(\w+),\s*(\w+),\s*(\w+)").unwrap());
static APUT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"aput(?:-\w+)?\s+(\w+),\s*(\w+),\s*(\w+)").unwrap());
static ARRAY_LEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"array-length\s+(\w+),\s*(\w+)").unwrap());
static THROW_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"throw\s+(\w+)").unwrap());

#[derive(Debug, Clone)]
struct RegInfo {
    type_name: String,
}

/// The translator. One instance per conversion; register state resets at
/// every method boundary.
#[derive(Debug, Default)]
pub struct SmaliToJava {
    registers: HashMap<String, RegInfo>,
    indent: usize,
}

/// Converts a Dalvik type descriptor to a Java source type.
pub fn type_to_java(descriptor: &str) -> String {
    let mut t = descriptor;
    let mut array_dims = 0;
    while let Some(rest) = t.strip_prefix('[') {
        array_dims += 1;
        t = rest;
    }
    let base = match t {
        "" | "V" => "void".to_string(),
        "Z" => "boolean".to_string(),
        "B" => "byte".to_string(),
        "S" => "short".to_string(),
        "C" => "char".to_string(),
        "I" => "int".to_string(),
        "J" => "long".to_string(),
        "F" => "float".to_string(),
        "D" => "double".to_string(),
        other => match other.strip_prefix('L').and_then(|s| s.strip_suffix(';')) {
            Some(inner) => inner.replace('/', "."),
            None => other.to_string(),
        },
    };
    format!("{}{}", base, "[]".repeat(array_dims))
}

impl SmaliToJava {
    pub fn new() -> Self {
        SmaliToJava::default()
    }

    fn pad(&self) -> String {
        " ".repeat(self.indent * 4)
    }

    fn set_reg(&mut self, reg: &str, type_name: &str) {
        self.registers.insert(
            reg.to_string(),
            RegInfo {
                type_name: type_name.to_string(),
            },
        );
    }

    fn convert_const(&mut self, line: &str) -> String {
        if let Some(m) = CONST_STRING_RE.captures(line) {
            let (reg, value) = (&m[1], &m[2]);
            self.set_reg(reg, "String");
            return format!("{}String {} = \"{}\";", self.pad(), reg, value);
        }
        if let Some(m) = CONST_CLASS_RE.captures(line) {
            let (reg, cls) = (&m[1], type_to_java(&m[2]));
            self.set_reg(reg, "Class");
            return format!("{}Class {} = {}.class;", self.pad(), reg, cls);
        }
        if let Some(m) = CONST_NUM_RE.captures(line) {
            let (reg, value) = (&m[1], &m[2]);
            self.set_reg(reg, "int");
            return format!("{}int {} = {};", self.pad(), reg, value);
        }
        String::new()
    }

    fn convert_move(&mut self, line: &str) -> String {
        if let Some(m) = MOVE_RE.captures(line) {
            let dst = m[1].to_string();
            if let Some(src) = m.get(2) {
                let type_name = self
                    .registers
                    .get(src.as_str())
                    .map(|r| r.type_name.clone())
                    .unwrap_or_else(|| "Object".to_string());
                self.set_reg(&dst, &type_name);
                return format!("{}{} = {};", self.pad(), dst, src.as_str());
            }
            self.set_reg(&dst, "Object");
            return format!("{}// {} = <result>", self.pad(), dst);
        }
        String::new()
    }

    fn convert_invoke(&mut self, line: &str) -> String {
        let Some(m) = INVOKE_RE.captures(line) else {
            return String::new();
        };
        let kind = &m[1];
        let regs: Vec<&str> = m[2]
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        let method_ref = &m[3];

        let (class_name, method_name) = match method_ref.split_once("->") {
            Some((class_part, member)) => {
                let name = member.split('(').next().unwrap_or(member);
                (type_to_java(class_part), name.to_string())
            }
            None => (String::new(), method_ref.to_string()),
        };
        let short_class = class_name.rsplit('.').next().unwrap_or(&class_name);

        let call = if kind == "static" {
            format!("{}.{}({})", short_class, method_name, regs.join(", "))
        } else if method_name == "<init>" {
            format!("new {}({})", short_class, regs[1..].join(", "))
        } else {
            let receiver = regs.first().copied().unwrap_or("this");
            format!("{}.{}({})", receiver, method_name, regs[1..].join(", "))
        };
        format!("{}{};", self.pad(), call)
    }

    fn convert_field_access(&mut self, line: &str) -> String {
        let Some(m) = FIELD_RE.captures(line) else {
            return String::new();
        };
        let is_static = &m[1] == "s";
        let is_get = &m[2] == "get";
        let val_reg = m[3].to_string();
        let obj_reg = m.get(4).map(|r| r.as_str().to_string()).unwrap_or_default();
        let field_ref = &m[5];

        let (class_name, field_name, field_type) = match field_ref.split_once("->") {
            Some((class_part, member)) => match member.rsplit_once(':') {
                Some((name, type_desc)) => (
                    type_to_java(class_part),
                    name.to_string(),
                    type_to_java(type_desc),
                ),
                None => (type_to_java(class_part), member.to_string(), "Object".to_string()),
            },
            None => (String::new(), field_ref.to_string(), "Object".to_string()),
        };
        let short_class = class_name.rsplit('.').next().unwrap_or(&class_name).to_string();
        let site = if is_static {
            format!("{}.{}", short_class, field_name)
        } else {
            format!("{}.{}", obj_reg, field_name)
        };

        if is_get {
            self.set_reg(&val_reg, &field_type);
            format!("{}{} {} = {};", self.pad(), field_type, val_reg, site)
        } else {
            format!("{}{} = {};", self.pad(), site, val_reg)
        }
    }

    fn convert_return(&mut self, line: &str) -> String {
        if let Some(m) = RETURN_RE.captures(line) {
            return match m.get(1) {
                Some(reg) if !reg.as_str().is_empty() => {
                    format!("{}return {};", self.pad(), reg.as_str())
                }
                _ => format!("{}return;", self.pad()),
            };
        }
        String::new()
    }

    fn java_comparison(op: &str) -> &'static str {
        match op {
            "eq" => "==",
            "ne" => "!=",
            "lt" => "<",
            "ge" => ">=",
            "gt" => ">",
            _ => "<=",
        }
    }

    fn convert_if(&mut self, line: &str) -> String {
        if let Some(m) = IF_Z_RE.captures(line) {
            return format!(
                "{}if ({} {} 0) goto {};",
                self.pad(),
                &m[2],
                Self::java_comparison(&m[1]),
                &m[3]
            );
        }
        if let Some(m) = IF_RE.captures(line) {
            return format!(
                "{}if ({} {} {}) goto {};",
                self.pad(),
                &m[2],
                Self::java_comparison(&m[1]),
                &m[3],
                &m[4]
            );
        }
        String::new()
    }

    fn convert_new(&mut self, line: &str) -> String {
        if let Some(m) = NEW_INSTANCE_RE.captures(line) {
            let (reg, ty) = (m[1].to_string(), type_to_java(&m[2]));
            self.set_reg(&reg, &ty);
            return format!("{}{} {} = new {}();", self.pad(), ty, reg, ty);
        }
        if let Some(m) = NEW_ARRAY_RE.captures(line) {
            let (reg, size_reg, ty) = (m[1].to_string(), &m[2], type_to_java(&m[3]));
            self.set_reg(&reg, &ty);
            let elem = ty.strip_suffix("[]").unwrap_or(&ty);
            return format!("{}{} {} = new {}[{}];", self.pad(), ty, reg, elem, size_reg);
        }
        String::new()
    }

    fn convert_arithmetic(&mut self, line: &str) -> String {
        if let Some(m) = ARITH2_RE.captures(line) {
            let op = match &m[1] {
                "add" => "+=",
                "sub" => "-=",
                "mul" => "*=",
                "div" => "/=",
                "rem" => "%=",
                "and" => "&=",
                "or" => "|=",
                "xor" => "^=",
                "shl" => "<<=",
                "shr" => ">>=",
                _ => ">>>=",
            };
            return format!("{}{} {} {};", self.pad(), &m[3], op, &m[4]);
        }
        if let Some(m) = ARITH3_RE.captures(line) {
            let op = match &m[1] {
                "add" => "+",
                "sub" => "-",
                "mul" => "*",
                "div" => "/",
                "rem" => "%",
                "and" => "&",
                "or" => "|",
                "xor" => "^",
                "shl" => "<<",
                "shr" => ">>",
                _ => ">>>",
            };
            let literal = m[5]
                .trim()
                .trim_start_matches("#int")
                .trim_start_matches("#long")
                .trim_start_matches('#')
                .trim();
            return format!("{}{} = {} {} {};", self.pad(), &m[3], &m[4], op, literal);
        }
        if let Some(m) = NEG_RE.captures(line) {
            let sign = if &m[1] == "neg" { "-" } else { "~" };
            return format!("{}{} = {}{};", self.pad(), &m[3], sign, &m[4]);
        }
        String::new()
    }

    fn convert_cast(&mut self, line: &str) -> String {
        if let Some(m) = CHECK_CAST_RE.captures(line) {
            let (reg, ty) = (&m[1], type_to_java(&m[2]));
            return format!("{}{} = ({}) {};", self.pad(), reg, ty, reg);
        }
        if let Some(m) = CONV_RE.captures(line) {
            return format!("{}{} = ({}) {};", self.pad(), &m[3], &m[2], &m[4]);
        }
        String::new()
    }

    fn convert_array(&mut self, line: &str) -> String {
        if line.starts_with("array-length") {
            if let Some(m) = ARRAY_LEN_RE.captures(line) {
                return format!("{}{} = {}.length;", self.pad(), &m[1], &m[2]);
            }
        }
        if line.starts_with("aget") {
            if let Some(m) = AGET_RE.captures(line) {
                return format!("{}{} = {}[{}];", self.pad(), &m[1], &m[2], &m[3]);
            }
        }
        if line.starts_with("aput") {
            if let Some(m) = APUT_RE.captures(line) {
                return format!("{}{}[{}] = {};", self.pad(), &m[2], &m[3], &m[1]);
            }
        }
        String::new()
    }

    /// Converts one instruction line. Empty output means "emit nothing".
    fn convert_instruction(&mut self, line: &str) -> String {
        let mut text = line.trim();
        if text.is_empty() || text.starts_with('#') {
            return String::new();
        }

        // Offset labels like `.0000:` carry an instruction after the colon.
        if text.starts_with('.') {
            if let Some(colon) = text.find(':') {
                if colon < 8 {
                    text = text[colon + 1..].trim();
                }
            }
        }

        if text.starts_with('.') {
            if text.starts_with(".method") {
                let name = text
                    .rsplit(' ')
                    .next()
                    .map(|sig| sig.split('(').next().unwrap_or(sig))
                    .unwrap_or("");
                return format!("\n{}// Method: {}", self.pad(), name);
            }
            if text.starts_with(".end method") {
                return format!("{}}}\n", self.pad());
            }
            if text.starts_with(".registers") || text.starts_with(".locals") {
                return format!("{}{{", self.pad());
            }
            return String::new();
        }

        if let Some(label) = text.strip_prefix(':') {
            return format!("{}{}:", self.pad(), label);
        }

        // Strip disassembler comments before matching.
        let text = text.split(" # ").next().unwrap_or(text).trim();

        let result = if text.starts_with("const") {
            self.convert_const(text)
        } else if text.starts_with("move") {
            self.convert_move(text)
        } else if text.starts_with("invoke") {
            self.convert_invoke(text)
        } else if text.starts_with("iget")
            || text.starts_with("sget")
            || text.starts_with("iput")
            || text.starts_with("sput")
        {
            self.convert_field_access(text)
        } else if text.starts_with("return") {
            self.convert_return(text)
        } else if text.starts_with("if-") {
            self.convert_if(text)
        } else if text.starts_with("new-") {
            self.convert_new(text)
        } else if text.starts_with("aget") || text.starts_with("aput") || text.starts_with("array-length")
        {
            self.convert_array(text)
        } else if text.starts_with("check-cast") || text.contains("-to-") {
            self.convert_cast(text)
        } else if [
            "add-", "sub-", "mul-", "div-", "rem-", "and-", "or-", "xor-", "shl-", "shr-",
            "ushr-", "neg-", "not-",
        ]
        .iter()
        .any(|p| text.starts_with(p))
        {
            self.convert_arithmetic(text)
        } else if text.starts_with("throw") {
            THROW_RE
                .captures(text)
                .map(|m| format!("{}throw {};", self.pad(), &m[1]))
                .unwrap_or_default()
        } else if text == "nop" {
            return String::new();
        } else if text.starts_with("goto") {
            match text.find(':') {
                Some(colon) => format!("{}goto {};", self.pad(), &text[colon + 1..]),
                None => format!("{}// {}", self.pad(), text),
            }
        } else {
            String::new()
        };

        if result.is_empty() {
            format!("{}// {}", self.pad(), text)
        } else {
            result
        }
    }

    /// Converts a single method body (no `.class` wrapper expected).
    pub fn convert_method(&mut self, method_smali: &str) -> String {
        self.registers.clear();
        self.indent = 1;
        let mut out = String::new();
        for line in method_smali.lines() {
            let converted = self.convert_instruction(line);
            if !converted.is_empty() {
                out.push_str(&converted);
                out.push('\n');
            }
        }
        out
    }

    /// Converts a whole smali class document.
    pub fn convert(&mut self, smali: &str) -> String {
        self.registers.clear();
        self.indent = 0;
        let mut out = String::new();
        let mut in_method = false;

        for line in smali.lines() {
            let trimmed = line.trim();

            if trimmed.starts_with(".class") {
                if let Some(cls) = trimmed.rsplit(' ').next() {
                    out.push_str("// Decompiled from Smali\n");
                    out.push_str(&format!("class {} {{\n", type_to_java(cls)));
                    self.indent = 1;
                }
                continue;
            }
            if trimmed.starts_with(".super") {
                if let Some(super_cls) = trimmed.rsplit(' ').next() {
                    out.push_str(&format!("    // extends {}\n\n", type_to_java(super_cls)));
                }
                continue;
            }
            if trimmed.starts_with(".method") {
                in_method = true;
                self.registers.clear();
            }
            if in_method {
                let converted = self.convert_instruction(line);
                if !converted.is_empty() {
                    out.push_str(&converted);
                    out.push('\n');
                }
            }
            if trimmed.starts_with(".end method") {
                in_method = false;
                out.push('\n');
            }
        }
        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_descriptors() {
        assert_eq!(type_to_java("V"), "void");
        assert_eq!(type_to_java("I"), "int");
        assert_eq!(type_to_java("[I"), "int[]");
        assert_eq!(type_to_java("[[Z"), "boolean[][]");
        assert_eq!(type_to_java("Lcom/x/A;"), "com.x.A");
    }

    #[test]
    fn const_and_field_lines() {
        let mut c = SmaliToJava::new();
        c.indent = 1;
        assert_eq!(
            c.convert_instruction("const-string v0, \"hi\""),
            "    String v0 = \"hi\";"
        );
        assert_eq!(
            c.convert_instruction("const/4 v1, #int 7"),
            "    int v1 = 7;"
        );
        assert_eq!(
            c.convert_instruction("sget-object v0, Lcom/x/A;->NAME:Ljava/lang/String;"),
            "    java.lang.String v0 = A.NAME;"
        );
        assert_eq!(
            c.convert_instruction("iput v2, v1, Lcom/x/A;->count:I"),
            "    v1.count = v2;"
        );
    }

    #[test]
    fn invoke_forms() {
        let mut c = SmaliToJava::new();
        c.indent = 1;
        assert_eq!(
            c.convert_instruction("invoke-static {v0}, Lcom/x/Util;->log(Ljava/lang/String;)V"),
            "    Util.log(v0);"
        );
        assert_eq!(
            c.convert_instruction("invoke-virtual {v1, v2}, Lcom/x/A;->add(I)V"),
            "    v1.add(v2);"
        );
        assert_eq!(
            c.convert_instruction("invoke-direct {v0}, Lcom/x/A;-><init>()V"),
            "    new A();"
        );
    }

    #[test]
    fn branches_and_arithmetic() {
        let mut c = SmaliToJava::new();
        c.indent = 1;
        assert_eq!(
            c.convert_instruction("if-eqz v0, :cond_0"),
            "    if (v0 == 0) goto cond_0;"
        );
        assert_eq!(
            c.convert_instruction("add-int v0, v1, v2"),
            "    v0 = v1 + v2;"
        );
        assert_eq!(
            c.convert_instruction("add-int/2addr v0, v1"),
            "    v0 += v1;"
        );
        assert_eq!(
            c.convert_instruction("add-int/lit8 v0, v1, #int 5"),
            "    v0 = v1 + 5;"
        );
        assert_eq!(
            c.convert_instruction("neg-int v0, v1"),
            "    v0 = -v1;"
        );
        assert_eq!(
            c.convert_instruction("int-to-long v0, v1"),
            "    v0 = (long) v1;"
        );
    }

    #[test]
    fn unknown_lines_become_comments() {
        let mut c = SmaliToJava::new();
        c.indent = 1;
        assert_eq!(
            c.convert_instruction("monitor-enter v0"),
            "    // monitor-enter v0"
        );
    }

    #[test]
    fn whole_class_conversion() {
        let smali = "\
.class public Lcom/x/A;
.super Ljava/lang/Object;

.method public foo()V
    .registers 2
    const-string v0, \"hi\"
    return-void
.end method
";
        let mut c = SmaliToJava::new();
        let java = c.convert(smali);
        assert!(java.contains("class com.x.A {"));
        assert!(java.contains("// Method: foo"));
        assert!(java.contains("String v0 = \"hi\";"));
        assert!(java.contains("return;"));
        assert!(java.trim_end().ends_with('}'));
    }
}
