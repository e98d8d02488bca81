//! The operation surface consumed by the host bridge.
//!
//! Each operation takes a byte buffer plus parameters and returns either a
//! `Serialize`-able result struct or a fresh byte buffer. The bridge is
//! responsible for JSON marshalling and for wrapping errors as
//! `{error: "..."}`; nothing here touches JSON. Mutating operations never
//! modify their input.

use serde::Serialize;

use crate::android::arsc::ResourceTable;
use crate::android::binary_xml::{AxmlDocument, AxmlEditor, AxmlError, AxmlResult};
use crate::dex::builder::DexBuilder;
use crate::dex::dex_file::DexFile;
use crate::dex::disasm;
use crate::dex::error::DexError;
use crate::fail;
use crate::smali_java::SmaliToJava;

// ---------------------------------------------------------------------------
// DEX operations.
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DexInfo {
    pub version: String,
    pub file_size: u32,
    pub strings_count: u32,
    pub types_count: u32,
    pub protos_count: u32,
    pub fields_count: u32,
    pub methods_count: u32,
    pub classes_count: u32,
}

pub fn dex_info(dex_bytes: &[u8]) -> Result<DexInfo, DexError> {
    let dex = DexFile::parse(dex_bytes)?;
    Ok(DexInfo {
        version: dex.header.version(),
        file_size: dex.header.file_size,
        strings_count: dex.header.string_ids_size,
        types_count: dex.header.type_ids_size,
        protos_count: dex.header.proto_ids_size,
        fields_count: dex.header.field_ids_size,
        methods_count: dex.header.method_ids_size,
        classes_count: dex.header.class_defs_size,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassList {
    pub classes: Vec<String>,
    pub shown: usize,
    pub total: usize,
}

/// Lists class names with a substring filter and offset/limit pagination.
/// `total` counts every match, not just the returned page.
pub fn list_classes(
    dex_bytes: &[u8],
    filter: &str,
    offset: usize,
    limit: usize,
) -> Result<ClassList, DexError> {
    let dex = DexFile::parse(dex_bytes)?;
    let mut classes = vec![];
    let mut matched = 0;
    for cls in &dex.class_defs {
        let name = dex.type_name(cls.class_idx);
        if !filter.is_empty() && !name.contains(filter) {
            continue;
        }
        matched += 1;
        if matched > offset && classes.len() < limit {
            classes.push(name);
        }
    }
    Ok(ClassList {
        shown: classes.len(),
        classes,
        total: matched,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    String,
    Class,
    Method,
    Field,
}

impl std::str::FromStr for SearchKind {
    type Err = DexError;

    fn from_str(s: &str) -> Result<SearchKind, DexError> {
        match s {
            "string" => Ok(SearchKind::String),
            "class" => Ok(SearchKind::Class),
            "method" => Ok(SearchKind::Method),
            "field" => Ok(SearchKind::Field),
            other => Err(DexError::new(&format!("unknown search kind: {}", other))),
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SearchHit {
    String {
        value: String,
    },
    Class {
        name: String,
    },
    #[serde(rename_all = "camelCase")]
    Method {
        class: String,
        name: String,
        prototype: String,
    },
    #[serde(rename_all = "camelCase")]
    Field {
        class: String,
        name: String,
        field_type: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub query: String,
    pub results: Vec<SearchHit>,
    pub count: usize,
}

fn matches(haystack: &str, needle: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        haystack.contains(needle)
    } else {
        haystack.to_lowercase().contains(needle)
    }
}

pub fn search(
    dex_bytes: &[u8],
    query: &str,
    kind: SearchKind,
    case_sensitive: bool,
    max: usize,
) -> Result<SearchResults, DexError> {
    let dex = DexFile::parse(dex_bytes)?;
    let needle = if case_sensitive {
        query.to_string()
    } else {
        query.to_lowercase()
    };
    let mut results = vec![];

    match kind {
        SearchKind::String => {
            for s in &dex.strings {
                if results.len() >= max {
                    break;
                }
                let value = s.to_string_lossy();
                if matches(&value, &needle, case_sensitive) {
                    results.push(SearchHit::String { value });
                }
            }
        }
        SearchKind::Class => {
            for cls in &dex.class_defs {
                if results.len() >= max {
                    break;
                }
                let name = dex.type_name(cls.class_idx);
                if matches(&name, &needle, case_sensitive) {
                    results.push(SearchHit::Class { name });
                }
            }
        }
        SearchKind::Method => {
            for m in &dex.methods {
                if results.len() >= max {
                    break;
                }
                let name = dex.string(m.name_idx);
                if matches(&name, &needle, case_sensitive) {
                    results.push(SearchHit::Method {
                        class: dex.type_name(m.class_idx),
                        name,
                        prototype: dex.proto_string(m.proto_idx),
                    });
                }
            }
        }
        SearchKind::Field => {
            for f in &dex.fields {
                if results.len() >= max {
                    break;
                }
                let name = dex.string(f.name_idx);
                if matches(&name, &needle, case_sensitive) {
                    results.push(SearchHit::Field {
                        class: dex.type_name(f.class_idx),
                        name,
                        field_type: dex.type_name(f.type_idx),
                    });
                }
            }
        }
    }

    Ok(SearchResults {
        query: query.to_string(),
        count: results.len(),
        results,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSmali {
    pub class_name: String,
    pub smali: String,
}

pub fn class_smali(dex_bytes: &[u8], class_name: &str) -> Result<ClassSmali, DexError> {
    let dex = DexFile::parse(dex_bytes)?;
    Ok(ClassSmali {
        class_name: class_name.to_string(),
        smali: disasm::class_smali(&dex, class_name)?,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodSmali {
    pub class_name: String,
    pub method_name: String,
    pub registers: u16,
    pub smali: String,
}

pub fn method_smali(
    dex_bytes: &[u8],
    class_name: &str,
    method_name: &str,
) -> Result<MethodSmali, DexError> {
    let dex = DexFile::parse(dex_bytes)?;
    let Some(code) = dex.get_method_code(class_name, method_name) else {
        fail!("method not found or has no code: {}->{}", class_name, method_name);
    };
    Ok(MethodSmali {
        class_name: class_name.to_string(),
        method_name: method_name.to_string(),
        registers: code.registers_size,
        smali: disasm::method_smali(&dex, class_name, method_name)?,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JavaSource {
    pub class_name: String,
    pub java: String,
}

pub fn smali_to_java(dex_bytes: &[u8], class_name: &str) -> Result<JavaSource, DexError> {
    let dex = DexFile::parse(dex_bytes)?;
    let smali = disasm::class_smali(&dex, class_name)?;
    let java = SmaliToJava::new().convert(&smali);
    Ok(JavaSource {
        class_name: class_name.to_string(),
        java,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodEntry {
    pub name: String,
    pub prototype: String,
    pub access_flags: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodList {
    pub class_name: String,
    pub methods: Vec<MethodEntry>,
    pub count: usize,
}

pub fn list_methods(dex_bytes: &[u8], class_name: &str) -> Result<MethodList, DexError> {
    let dex = DexFile::parse(dex_bytes)?;
    let mut methods = vec![];

    // Access flags live in class data, keyed by method pool index.
    let mut flags_by_idx = std::collections::HashMap::new();
    for cls in &dex.class_defs {
        if cls.class_data_off == 0 || dex.type_name(cls.class_idx) != class_name {
            continue;
        }
        if let Ok(cd) = dex.class_data(cls.class_data_off) {
            for m in cd.methods() {
                flags_by_idx.insert(m.method_idx, m.access_flags);
            }
        }
    }

    for (i, m) in dex.methods.iter().enumerate() {
        if dex.type_name(m.class_idx) != class_name {
            continue;
        }
        methods.push(MethodEntry {
            name: dex.string(m.name_idx),
            prototype: dex.proto_string(m.proto_idx),
            access_flags: flags_by_idx.get(&(i as u32)).copied().unwrap_or(0),
        });
    }
    Ok(MethodList {
        class_name: class_name.to_string(),
        count: methods.len(),
        methods,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub access_flags: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldList {
    pub class_name: String,
    pub fields: Vec<FieldEntry>,
    pub count: usize,
}

pub fn list_fields(dex_bytes: &[u8], class_name: &str) -> Result<FieldList, DexError> {
    let dex = DexFile::parse(dex_bytes)?;
    let mut fields = vec![];

    let mut flags_by_idx = std::collections::HashMap::new();
    for cls in &dex.class_defs {
        if cls.class_data_off == 0 || dex.type_name(cls.class_idx) != class_name {
            continue;
        }
        if let Ok(cd) = dex.class_data(cls.class_data_off) {
            for f in cd.static_fields.iter().chain(cd.instance_fields.iter()) {
                flags_by_idx.insert(f.field_idx, f.access_flags);
            }
        }
    }

    for (i, f) in dex.fields.iter().enumerate() {
        if dex.type_name(f.class_idx) != class_name {
            continue;
        }
        fields.push(FieldEntry {
            name: dex.string(f.name_idx),
            field_type: dex.type_name(f.type_idx),
            access_flags: flags_by_idx.get(&(i as u32)).copied().unwrap_or(0),
        });
    }
    Ok(FieldList {
        class_name: class_name.to_string(),
        count: fields.len(),
        fields,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StringList {
    pub strings: Vec<String>,
    pub shown: usize,
    pub matched: usize,
    pub total: usize,
}

pub fn list_strings(dex_bytes: &[u8], filter: &str, limit: usize) -> Result<StringList, DexError> {
    let dex = DexFile::parse(dex_bytes)?;
    let mut strings = vec![];
    let mut matched = 0;
    for s in &dex.strings {
        let value = s.to_string_lossy();
        if !filter.is_empty() && !value.contains(filter) {
            continue;
        }
        matched += 1;
        if strings.len() < limit {
            strings.push(value);
        }
    }
    Ok(StringList {
        shown: strings.len(),
        strings,
        matched,
        total: dex.strings.len(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XrefEntry {
    pub caller_class: String,
    pub caller_method: String,
    pub offset: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XrefList {
    pub class_name: String,
    pub target: String,
    pub xrefs: Vec<XrefEntry>,
    pub count: usize,
}

fn xref_list(class_name: &str, target: &str, raw: Vec<crate::dex::Xref>) -> XrefList {
    let xrefs: Vec<XrefEntry> = raw
        .into_iter()
        .map(|x| XrefEntry {
            caller_class: x.caller_class,
            caller_method: x.caller_method,
            offset: x.offset,
        })
        .collect();
    XrefList {
        class_name: class_name.to_string(),
        target: target.to_string(),
        count: xrefs.len(),
        xrefs,
    }
}

pub fn xref_method(
    dex_bytes: &[u8],
    class_name: &str,
    method_name: &str,
) -> Result<XrefList, DexError> {
    let dex = DexFile::parse(dex_bytes)?;
    Ok(xref_list(
        class_name,
        method_name,
        dex.find_method_xrefs(class_name, method_name),
    ))
}

pub fn xref_field(
    dex_bytes: &[u8],
    class_name: &str,
    field_name: &str,
) -> Result<XrefList, DexError> {
    let dex = DexFile::parse(dex_bytes)?;
    Ok(xref_list(
        class_name,
        field_name,
        dex.find_field_xrefs(class_name, field_name),
    ))
}

pub fn modify_class(
    dex_bytes: &[u8],
    class_name: &str,
    new_smali: &str,
) -> Result<Vec<u8>, DexError> {
    let mut builder = DexBuilder::load(dex_bytes)?;
    builder.modify_class(class_name, new_smali)?;
    builder.build()
}

pub fn add_class(dex_bytes: &[u8], new_smali: &str) -> Result<Vec<u8>, DexError> {
    let mut builder = DexBuilder::load(dex_bytes)?;
    builder.add_class(new_smali)?;
    builder.build()
}

pub fn delete_class(dex_bytes: &[u8], class_name: &str) -> Result<Vec<u8>, DexError> {
    let mut builder = DexBuilder::load(dex_bytes)?;
    if !builder.delete_class(class_name) {
        fail!("class not found: {}", class_name);
    }
    builder.build()
}

/// Builds a standalone DEX from a smali class document.
pub fn assemble_smali(smali: &str) -> Result<Vec<u8>, DexError> {
    let mut builder = DexBuilder::new();
    builder.add_class(smali)?;
    builder.build()
}

// ---------------------------------------------------------------------------
// AXML operations.
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSummary {
    pub package_name: String,
    pub version_name: String,
    pub version_code: i64,
    pub min_sdk: String,
    pub target_sdk: String,
    pub permissions: Vec<String>,
    pub activities: Vec<String>,
    pub services: Vec<String>,
    pub receivers: Vec<String>,
    pub xml: String,
}

pub fn axml_parse(axml_bytes: &[u8]) -> AxmlResult<ManifestSummary> {
    let doc = AxmlDocument::parse(axml_bytes)?;
    Ok(ManifestSummary {
        package_name: doc.package_name(),
        version_name: doc.version_name(),
        version_code: doc.version_code(),
        min_sdk: doc.min_sdk(),
        target_sdk: doc.target_sdk(),
        permissions: doc.permissions(),
        activities: doc.activities(),
        services: doc.services(),
        receivers: doc.receivers(),
        xml: doc.to_xml()?,
    })
}

/// One manifest edit. Actions map 1:1 onto the editor methods.
#[derive(Debug, Clone)]
pub enum ManifestEdit<'a> {
    SetPackage(&'a str),
    SetVersionName(&'a str),
    SetVersionCode(i64),
    SetMinSdk(i64),
    SetTargetSdk(i64),
    AddPermission(&'a str),
    RemovePermission(&'a str),
    AddActivity { name: &'a str, exported: bool },
    RemoveActivity(&'a str),
}

/// Applies one edit and returns the rewritten document. The input buffer is
/// untouched; a miss (unknown element/attribute, unconvertible value) is an
/// error.
pub fn axml_edit(axml_bytes: &[u8], edit: ManifestEdit<'_>) -> AxmlResult<Vec<u8>> {
    let mut editor = AxmlEditor::load(axml_bytes.to_vec())?;
    let applied = match edit {
        ManifestEdit::SetPackage(value) => editor.set_package_name(value)?,
        ManifestEdit::SetVersionName(value) => editor.set_version_name(value)?,
        ManifestEdit::SetVersionCode(code) => editor.set_version_code(code)?,
        ManifestEdit::SetMinSdk(sdk) => editor.set_min_sdk(sdk)?,
        ManifestEdit::SetTargetSdk(sdk) => editor.set_target_sdk(sdk)?,
        ManifestEdit::AddPermission(name) => editor.add_permission(name)?,
        ManifestEdit::RemovePermission(name) => editor.remove_permission(name)?,
        ManifestEdit::AddActivity { name, exported } => editor.add_activity(name, exported)?,
        ManifestEdit::RemoveActivity(name) => editor.remove_activity(name)?,
    };
    if !applied {
        return Err(AxmlError::Malformed("edit target not found".to_string()));
    }
    Ok(editor.into_bytes())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XmlSearchRow {
    pub element_path: String,
    pub element_name: String,
    pub attribute_name: String,
    pub attribute_value: String,
    pub element_index: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XmlSearchResults {
    pub results: Vec<XmlSearchRow>,
    pub count: usize,
}

pub fn axml_search(
    axml_bytes: &[u8],
    attr_name: &str,
    value_pattern: &str,
    limit: usize,
) -> AxmlResult<XmlSearchResults> {
    let editor = AxmlEditor::load(axml_bytes.to_vec())?;
    let rows = if !attr_name.is_empty() {
        editor.search_by_attribute(attr_name, value_pattern)
    } else if !value_pattern.is_empty() {
        editor.search_by_value(value_pattern)
    } else {
        vec![]
    };
    let results: Vec<XmlSearchRow> = rows
        .into_iter()
        .take(limit)
        .map(|r| XmlSearchRow {
            element_path: r.element_path,
            element_name: r.element_name,
            attribute_name: r.attribute_name,
            attribute_value: r.attribute_value,
            element_index: r.element_index,
        })
        .collect();
    Ok(XmlSearchResults {
        count: results.len(),
        results,
    })
}

// ---------------------------------------------------------------------------
// ARSC operations.
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArscSummary {
    pub package_name: String,
    pub string_count: usize,
    pub resource_count: usize,
    pub info: String,
}

pub fn arsc_parse(arsc_bytes: &[u8]) -> Result<ArscSummary, crate::android::arsc::ArscError> {
    let table = ResourceTable::parse(arsc_bytes)?;
    Ok(ArscSummary {
        package_name: table.package_name().to_string(),
        string_count: table.strings().len(),
        resource_count: table.resources().len(),
        info: table.info(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArscStringHit {
    pub index: u32,
    pub value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArscStringResults {
    pub pattern: String,
    pub results: Vec<ArscStringHit>,
    pub count: usize,
}

pub fn arsc_search_strings(
    arsc_bytes: &[u8],
    pattern: &str,
    limit: usize,
) -> Result<ArscStringResults, crate::android::arsc::ArscError> {
    let table = ResourceTable::parse(arsc_bytes)?;
    let results: Vec<ArscStringHit> = table
        .search_strings(pattern)
        .into_iter()
        .take(limit)
        .map(|h| ArscStringHit {
            index: h.index,
            value: h.value,
        })
        .collect();
    Ok(ArscStringResults {
        pattern: pattern.to_string(),
        count: results.len(),
        results,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArscResourceHit {
    pub id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub value: String,
    pub package: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArscResourceResults {
    pub pattern: String,
    pub results: Vec<ArscResourceHit>,
    pub count: usize,
}

pub fn arsc_search_resources(
    arsc_bytes: &[u8],
    pattern: &str,
    type_filter: &str,
    limit: usize,
) -> Result<ArscResourceResults, crate::android::arsc::ArscError> {
    let table = ResourceTable::parse(arsc_bytes)?;
    let results: Vec<ArscResourceHit> = table
        .search_resources(pattern, type_filter)
        .into_iter()
        .take(limit)
        .map(|r| ArscResourceHit {
            id: r.id,
            name: r.name,
            type_name: r.type_name,
            value: r.value,
            package: r.package,
        })
        .collect();
    Ok(ArscResourceResults {
        pattern: pattern.to_string(),
        count: results.len(),
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_CLASS_SMALI: &str = "\
.class public Lcom/x/A;
.super Ljava/lang/Object;

.method public foo()V
    .registers 1
    return-void
.end method

.method public caller()V
    .registers 2
    const-string v0, \"hello world\"
    invoke-virtual {v1}, Lcom/x/A;->foo()V
    return-void
.end method
";

    fn sample_dex() -> Vec<u8> {
        assemble_smali(TWO_CLASS_SMALI).unwrap()
    }

    #[test]
    fn info_reflects_pool_counts() {
        let bytes = sample_dex();
        let info = dex_info(&bytes).unwrap();
        assert_eq!(info.version, "035");
        assert_eq!(info.classes_count, 1);
        assert_eq!(info.file_size as usize, bytes.len());
        assert!(info.strings_count > 0);
    }

    #[test]
    fn class_listing_paginates() {
        let bytes = sample_dex();
        let all = list_classes(&bytes, "", 0, 10).unwrap();
        assert_eq!(all.classes, vec!["Lcom/x/A;"]);
        assert_eq!(all.total, 1);

        let page_past_end = list_classes(&bytes, "", 1, 10).unwrap();
        assert!(page_past_end.classes.is_empty());
        assert_eq!(page_past_end.total, 1);

        let filtered_out = list_classes(&bytes, "Lcom/y/", 0, 10).unwrap();
        assert_eq!(filtered_out.total, 0);
    }

    #[test]
    fn search_kinds() {
        assert_eq!("method".parse::<SearchKind>().unwrap(), SearchKind::Method);
        assert!("bogus".parse::<SearchKind>().is_err());

        let bytes = sample_dex();
        let hits = search(&bytes, "HELLO", SearchKind::String, false, 10).unwrap();
        assert_eq!(hits.count, 1);
        assert_eq!(
            hits.results[0],
            SearchHit::String {
                value: "hello world".to_string()
            }
        );
        assert_eq!(
            search(&bytes, "HELLO", SearchKind::String, true, 10)
                .unwrap()
                .count,
            0
        );

        let classes = search(&bytes, "com/x", SearchKind::Class, true, 10).unwrap();
        assert_eq!(classes.count, 1);

        let methods = search(&bytes, "foo", SearchKind::Method, true, 10).unwrap();
        assert_eq!(methods.count, 1);
        assert!(matches!(
            &methods.results[0],
            SearchHit::Method { prototype, .. } if prototype == "()V"
        ));
    }

    #[test]
    fn smali_views() {
        let bytes = sample_dex();
        let class_view = class_smali(&bytes, "Lcom/x/A;").unwrap();
        assert!(class_view.smali.contains(".method public caller()V"));
        assert!(class_view.smali.contains("const-string v0, \"hello world\""));

        let method_view = method_smali(&bytes, "Lcom/x/A;", "caller").unwrap();
        assert_eq!(method_view.registers, 2);
        assert!(method_view.smali.contains("invoke-virtual"));

        assert!(method_smali(&bytes, "Lcom/x/A;", "nothere").is_err());
        assert!(class_smali(&bytes, "Lcom/x/Missing;").is_err());
    }

    #[test]
    fn java_view_is_best_effort() {
        let bytes = sample_dex();
        let java = smali_to_java(&bytes, "Lcom/x/A;").unwrap();
        assert!(java.java.contains("class com.x.A {"));
        assert!(java.java.contains("String v0 = \"hello world\";"));
    }

    #[test]
    fn member_listings() {
        let bytes = sample_dex();
        let methods = list_methods(&bytes, "Lcom/x/A;").unwrap();
        assert_eq!(methods.count, 2);
        assert!(methods.methods.iter().any(|m| m.name == "foo"));
        assert!(methods.methods.iter().all(|m| m.access_flags & 0x1 != 0));

        let fields = list_fields(&bytes, "Lcom/x/A;").unwrap();
        assert_eq!(fields.count, 0);

        let strings = list_strings(&bytes, "hello", 10).unwrap();
        assert_eq!(strings.matched, 1);
        assert_eq!(strings.strings, vec!["hello world"]);
    }

    #[test]
    fn xref_surface() {
        let bytes = sample_dex();
        let refs = xref_method(&bytes, "Lcom/x/A;", "foo").unwrap();
        assert_eq!(refs.count, 1);
        assert_eq!(refs.xrefs[0].caller_method, "caller");

        let none = xref_method(&bytes, "Lcom/x/A;", "nothere").unwrap();
        assert_eq!(none.count, 0);
    }

    #[test]
    fn mutation_surface_returns_fresh_buffers() {
        let bytes = sample_dex();
        let snapshot = bytes.clone();

        let modified = modify_class(
            &bytes,
            "Lcom/x/A;",
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
        assert_eq!(bytes, snapshot);
        let dex = DexFile::parse(&modified).unwrap();
        assert!(dex.get_method_code("Lcom/x/A;", "caller").is_none());

        let grown = add_class(
            &bytes,
            ".class public Lcom/x/B;\n.super Ljava/lang/Object;\n",
        )
        .unwrap();
        assert_eq!(list_classes(&grown, "", 0, 10).unwrap().total, 2);

        let shrunk = delete_class(&bytes, "Lcom/x/A;").unwrap();
        assert_eq!(list_classes(&shrunk, "", 0, 10).unwrap().total, 0);
        assert!(delete_class(&bytes, "Lcom/x/Zzz;").is_err());
    }

    // A minimal binary manifest for exercising the AXML surface end to end.
    fn sample_manifest() -> Vec<u8> {
        use crate::android::binary_xml::{
            ANDROID_NS, RES_XML_END_ELEMENT_TYPE, RES_XML_START_ELEMENT_TYPE, RES_XML_TYPE,
            TYPE_STRING,
        };
        use crate::bytes::{patch_u32_le, write_u16_le, write_u32_le, write_u8};
        use crate::strpool::StringPool;

        let mut pool = StringPool::new(true);
        let package_attr = pool.intern("package");
        let package_val = pool.intern("com.x");
        let name_attr = pool.intern("name");
        let perm_val = pool.intern("android.permission.INTERNET");
        let manifest_tag = pool.intern("manifest");
        let perm_tag = pool.intern("uses-permission");
        let app_tag = pool.intern("application");
        let ns = pool.intern(ANDROID_NS);

        let start =
            |body: &mut Vec<u8>, tag: u32, attrs: &[(u32, u32, u32, u8, u32)]| {
                let size = 36 + attrs.len() * 20;
                write_u16_le(body, RES_XML_START_ELEMENT_TYPE);
                write_u16_le(body, 16);
                write_u32_le(body, size as u32);
                write_u32_le(body, 1);
                write_u32_le(body, u32::MAX);
                write_u32_le(body, u32::MAX);
                write_u32_le(body, tag);
                write_u16_le(body, 0x14);
                write_u16_le(body, 0x14);
                write_u16_le(body, attrs.len() as u16);
                write_u16_le(body, 0);
                write_u16_le(body, 0);
                write_u16_le(body, 0);
                for &(a_ns, a_name, raw, vtype, data) in attrs {
                    write_u32_le(body, a_ns);
                    write_u32_le(body, a_name);
                    write_u32_le(body, raw);
                    write_u16_le(body, 8);
                    write_u8(body, 0);
                    write_u8(body, vtype);
                    write_u32_le(body, data);
                }
            };
        let end = |body: &mut Vec<u8>, tag: u32| {
            write_u16_le(body, RES_XML_END_ELEMENT_TYPE);
            write_u16_le(body, 16);
            write_u32_le(body, 24);
            write_u32_le(body, 1);
            write_u32_le(body, u32::MAX);
            write_u32_le(body, u32::MAX);
            write_u32_le(body, tag);
        };

        let mut body = vec![];
        start(
            &mut body,
            manifest_tag,
            &[(u32::MAX, package_attr, package_val, TYPE_STRING, package_val)],
        );
        start(
            &mut body,
            perm_tag,
            &[(ns, name_attr, perm_val, TYPE_STRING, perm_val)],
        );
        end(&mut body, perm_tag);
        start(&mut body, app_tag, &[]);
        end(&mut body, app_tag);
        end(&mut body, manifest_tag);

        let mut doc = vec![];
        write_u16_le(&mut doc, RES_XML_TYPE);
        write_u16_le(&mut doc, 8);
        write_u32_le(&mut doc, 0);
        doc.extend_from_slice(&pool.build());
        doc.extend_from_slice(&body);
        let total = doc.len() as u32;
        patch_u32_le(&mut doc, 4, total).unwrap();
        doc
    }

    #[test]
    fn axml_surface_end_to_end() {
        let manifest = sample_manifest();
        let summary = axml_parse(&manifest).unwrap();
        assert_eq!(summary.package_name, "com.x");
        assert_eq!(summary.permissions, vec!["android.permission.INTERNET"]);
        assert!(summary.xml.contains("uses-permission"));

        let edited = axml_edit(&manifest, ManifestEdit::SetPackage("com.y")).unwrap();
        assert_eq!(axml_parse(&edited).unwrap().package_name, "com.y");

        let with_activity = axml_edit(
            &manifest,
            ManifestEdit::AddActivity {
                name: "com.x.Main",
                exported: true,
            },
        )
        .unwrap();
        assert_eq!(axml_parse(&with_activity).unwrap().activities, vec!["com.x.Main"]);

        let without_permission = axml_edit(
            &manifest,
            ManifestEdit::RemovePermission("android.permission.INTERNET"),
        )
        .unwrap();
        assert!(axml_parse(&without_permission).unwrap().permissions.is_empty());

        assert!(axml_edit(&manifest, ManifestEdit::RemoveActivity("com.x.Nope")).is_err());

        let rows = axml_search(&manifest, "name", "", 10).unwrap();
        assert_eq!(rows.count, 1);
        assert_eq!(rows.results[0].element_name, "uses-permission");
    }
}
