//! Compiled Android binary XML (AXML): parser and in-place editor.
//!
//! A document is a 0x0003 chunk wrapping a string pool, an optional
//! resource-id map, and a flat stream of namespace/element chunks. The parser
//! builds an element tree with rendered attribute values. The editor works on
//! the raw bytes: size-preserving attribute writes happen in place, anything
//! that grows the string pool triggers an append-only pool rebuild with the
//! downstream chunk offsets shifted, and structural edits splice whole
//! element chunks in or out.

use std::collections::HashMap;

use log::{error, warn};
use once_cell::sync::Lazy;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::bytes::{self, OutOfBounds};
use crate::strpool::StringPool;

pub const RES_XML_TYPE: u16 = 0x0003;
pub const RES_STRING_POOL_TYPE: u16 = 0x0001;
pub const RES_XML_RESOURCE_MAP_TYPE: u16 = 0x0180;
pub const RES_XML_START_NAMESPACE_TYPE: u16 = 0x0100;
pub const RES_XML_END_NAMESPACE_TYPE: u16 = 0x0101;
pub const RES_XML_START_ELEMENT_TYPE: u16 = 0x0102;
pub const RES_XML_END_ELEMENT_TYPE: u16 = 0x0103;
pub const RES_XML_CDATA_TYPE: u16 = 0x0104;

pub const ANDROID_NS: &str = "http://schemas.android.com/apk/res/android";

const NO_ENTRY: u32 = 0xFFFF_FFFF;

// Typed value tags used by attribute records and resource entries.
pub const TYPE_NULL: u8 = 0x00;
pub const TYPE_REFERENCE: u8 = 0x01;
pub const TYPE_ATTRIBUTE: u8 = 0x02;
pub const TYPE_STRING: u8 = 0x03;
pub const TYPE_FLOAT: u8 = 0x04;
pub const TYPE_DIMENSION: u8 = 0x05;
pub const TYPE_FRACTION: u8 = 0x06;
pub const TYPE_INT_DEC: u8 = 0x10;
pub const TYPE_INT_HEX: u8 = 0x11;
pub const TYPE_INT_BOOLEAN: u8 = 0x12;
pub const TYPE_COLOR_ARGB8: u8 = 0x1c;
pub const TYPE_COLOR_RGB8: u8 = 0x1d;
pub const TYPE_COLOR_ARGB4: u8 = 0x1e;
pub const TYPE_COLOR_RGB4: u8 = 0x1f;

pub type AxmlResult<T> = Result<T, AxmlError>;

#[derive(Debug)]
pub enum AxmlError {
    Malformed(String),
    Xml(String),
}

impl std::fmt::Display for AxmlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AxmlError::Malformed(msg) => write!(f, "malformed binary XML: {msg}"),
            AxmlError::Xml(msg) => write!(f, "XML error: {msg}"),
        }
    }
}

impl std::error::Error for AxmlError {}

impl From<OutOfBounds> for AxmlError {
    fn from(value: OutOfBounds) -> Self {
        AxmlError::Malformed(value.to_string())
    }
}

impl From<quick_xml::Error> for AxmlError {
    fn from(value: quick_xml::Error) -> Self {
        AxmlError::Xml(value.to_string())
    }
}

impl From<std::io::Error> for AxmlError {
    fn from(value: std::io::Error) -> Self {
        AxmlError::Xml(value.to_string())
    }
}

// ---------------------------------------------------------------------------
// Android attribute resource ids.
// ---------------------------------------------------------------------------

/// The manifest-relevant subset of `android:` attribute resource ids. The
/// resource-id map at the file head aligns pool indices with these, so
/// attribute names resolve even when the pool carries no usable string.
static ATTR_ID_TABLE: &[(u32, &str)] = &[
    (0x01010000, "theme"),
    (0x01010001, "label"),
    (0x01010002, "icon"),
    (0x01010003, "name"),
    (0x01010006, "permission"),
    (0x01010007, "readPermission"),
    (0x01010008, "writePermission"),
    (0x01010009, "protectionLevel"),
    (0x0101000b, "sharedUserId"),
    (0x0101000c, "hasCode"),
    (0x0101000d, "persistent"),
    (0x0101000e, "enabled"),
    (0x0101000f, "debuggable"),
    (0x01010010, "exported"),
    (0x01010011, "process"),
    (0x01010012, "taskAffinity"),
    (0x01010018, "authorities"),
    (0x0101001c, "priority"),
    (0x0101001d, "launchMode"),
    (0x0101001e, "screenOrientation"),
    (0x0101001f, "configChanges"),
    (0x01010020, "description"),
    (0x01010021, "targetPackage"),
    (0x01010024, "value"),
    (0x01010025, "resource"),
    (0x01010026, "mimeType"),
    (0x01010027, "scheme"),
    (0x01010028, "host"),
    (0x01010029, "port"),
    (0x0101002a, "path"),
    (0x0101002b, "pathPrefix"),
    (0x0101002c, "pathPattern"),
    (0x0101002d, "action"),
    (0x0101002e, "data"),
    (0x010100d0, "id"),
    (0x010100d1, "tag"),
    (0x010100d4, "background"),
    (0x010100dc, "visibility"),
    (0x010100f4, "layout_width"),
    (0x010100f5, "layout_height"),
    (0x01010095, "textSize"),
    (0x01010098, "textColor"),
    (0x010100af, "gravity"),
    (0x010100c4, "orientation"),
    (0x0101014f, "text"),
    (0x01010150, "hint"),
    (0x01010140, "minWidth"),
    (0x01010141, "minHeight"),
    (0x0101020c, "minSdkVersion"),
    (0x01010270, "targetSdkVersion"),
    (0x01010271, "maxSdkVersion"),
    (0x0101021b, "versionCode"),
    (0x0101021c, "versionName"),
    (0x01010224, "installLocation"),
    (0x0101026c, "largeHeap"),
    (0x0101028e, "hardwareAccelerated"),
    (0x010102b7, "supportsRtl"),
    (0x01010473, "extractNativeLibs"),
    (0x010104d6, "usesCleartextTraffic"),
    (0x0101022b, "windowSoftInputMode"),
    (0x01010362, "parentActivityName"),
];

static ATTR_NAME_BY_ID: Lazy<HashMap<u32, &'static str>> =
    Lazy::new(|| ATTR_ID_TABLE.iter().copied().collect());

static ATTR_ID_BY_NAME: Lazy<HashMap<&'static str, u32>> =
    Lazy::new(|| ATTR_ID_TABLE.iter().map(|&(id, name)| (name, id)).collect());

pub fn android_attr_name(resource_id: u32) -> Option<&'static str> {
    ATTR_NAME_BY_ID.get(&resource_id).copied()
}

pub fn android_attr_id(name: &str) -> Option<u32> {
    ATTR_ID_BY_NAME.get(name).copied()
}

// ---------------------------------------------------------------------------
// Complex values and colors.
// ---------------------------------------------------------------------------

const UNIT_PX: u32 = 0;
const UNIT_DIP: u32 = 1;
const UNIT_SP: u32 = 2;
const UNIT_PT: u32 = 3;
const UNIT_IN: u32 = 4;
const UNIT_MM: u32 = 5;
const UNIT_FRACTION: u32 = 0;
const UNIT_FRACTION_PARENT: u32 = 1;

const MANTISSA_MULT: f32 = 1.0 / 256.0;
const RADIX_MULTS: [f32; 4] = [
    MANTISSA_MULT,
    MANTISSA_MULT / 128.0,
    MANTISSA_MULT / 32768.0,
    MANTISSA_MULT / 8388608.0,
];

/// Decodes a packed dimension/fraction into its textual form with unit.
pub fn decode_complex(data: u32, fraction: bool) -> String {
    let mantissa = (data & 0xffff_ff00) as i32;
    let value = mantissa as f32 * RADIX_MULTS[((data >> 4) & 0x3) as usize];
    let unit = data & 0xf;
    if fraction {
        let pct = value * 100.0;
        match unit {
            UNIT_FRACTION => format!("{:.2}%", pct),
            UNIT_FRACTION_PARENT => format!("{:.2}%p", pct),
            _ => format!("{:.2}", pct),
        }
    } else {
        let suffix = match unit {
            UNIT_PX => "px",
            UNIT_DIP => "dp",
            UNIT_SP => "sp",
            UNIT_PT => "pt",
            UNIT_IN => "in",
            UNIT_MM => "mm",
            _ => "",
        };
        if value == value.trunc() {
            format!("{}{}", value as i32, suffix)
        } else {
            format!("{:.2}{}", value, suffix)
        }
    }
}

/// Encodes a `"16dp"` / `"50%"`-style text. Returns the packed value and
/// whether it is a dimension (false = fraction).
pub fn encode_complex(text: &str) -> Option<(u32, bool)> {
    let trimmed = text.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(split);
    let mut value: f32 = number.parse().ok()?;
    let mut dimension = true;
    let unit = match suffix.trim() {
        "dp" | "dip" => UNIT_DIP,
        "sp" => UNIT_SP,
        "px" | "" => UNIT_PX,
        "pt" => UNIT_PT,
        "in" => UNIT_IN,
        "mm" => UNIT_MM,
        "%" => {
            dimension = false;
            value /= 100.0;
            UNIT_FRACTION
        }
        "%p" => {
            dimension = false;
            value /= 100.0;
            UNIT_FRACTION_PARENT
        }
        _ => return None,
    };

    // Pick the smallest radix that keeps the mantissa in 24 bits.
    let mut encoded = value / MANTISSA_MULT;
    let radix: u32;
    if encoded >= 0x80_0000 as f32 || encoded <= -(0x80_0000 as f32) {
        radix = 0;
    } else if encoded >= 0x1_0000 as f32 || encoded <= -(0x1_0000 as f32) {
        radix = 1;
        encoded *= 128.0;
    } else if encoded >= 0x200 as f32 || encoded <= -(0x200 as f32) {
        radix = 2;
        encoded *= 32768.0;
    } else {
        radix = 3;
        encoded *= 8388608.0;
    }
    let mut mantissa = (encoded as i32) & !0xff;
    if mantissa == 0 && value != 0.0 {
        mantissa = (value as i32) << 8;
    }
    Some(((mantissa as u32 & 0xffff_ff00) | ((radix & 0x3) << 4) | (unit & 0xf), dimension))
}

pub fn format_color(data: u32, value_type: u8) -> String {
    match value_type {
        TYPE_COLOR_RGB8 => format!("#{:06X}", data & 0xFF_FFFF),
        TYPE_COLOR_ARGB4 => format!("#{:04X}", data & 0xFFFF),
        TYPE_COLOR_RGB4 => format!("#{:03X}", data & 0xFFF),
        _ => format!("#{:08X}", data),
    }
}

/// Parses `#RGB` / `#ARGB` / `#RRGGBB` (alpha filled in) / `#AARRGGBB`.
pub fn parse_color(text: &str) -> Option<(u32, u8)> {
    let hex = text.strip_prefix('#')?;
    let data = u32::from_str_radix(hex, 16).ok()?;
    match hex.len() {
        8 => Some((data, TYPE_COLOR_ARGB8)),
        6 => Some((data | 0xFF00_0000, TYPE_COLOR_RGB8)),
        4 => Some((data, TYPE_COLOR_ARGB4)),
        3 => Some((data, TYPE_COLOR_RGB4)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tree model.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Attribute {
    pub namespace_uri: Option<String>,
    pub name: String,
    /// Rendered value text, whatever the typed form was.
    pub value: String,
    pub value_type: u8,
    pub data: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Element {
    pub namespace_uri: Option<String>,
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }
}

struct ChunkHeader {
    chunk_type: u16,
    header_size: u16,
    size: u32,
    start: usize,
}

fn read_chunk_header(data: &[u8], at: usize) -> AxmlResult<ChunkHeader> {
    let mut ix = at;
    let chunk_type = bytes::read_u16_le(data, &mut ix)?;
    let header_size = bytes::read_u16_le(data, &mut ix)?;
    let size = bytes::read_u32_le(data, &mut ix)?;
    if size < 8 || at + size as usize > data.len() {
        return Err(AxmlError::Malformed(format!(
            "chunk at {} has invalid size {}",
            at, size
        )));
    }
    Ok(ChunkHeader {
        chunk_type,
        header_size,
        size,
        start: at,
    })
}

fn render_value(pool: &StringPool, raw_idx: u32, value_type: u8, data: u32) -> String {
    if raw_idx != NO_ENTRY {
        if let Some(s) = pool.get(raw_idx) {
            return s.to_string();
        }
    }
    match value_type {
        TYPE_STRING => pool.get(data).unwrap_or_default().to_string(),
        TYPE_INT_DEC => (data as i32).to_string(),
        TYPE_INT_HEX => format!("0x{:x}", data),
        TYPE_INT_BOOLEAN => if data != 0 { "true" } else { "false" }.to_string(),
        TYPE_REFERENCE => format!("@0x{:x}", data),
        TYPE_ATTRIBUTE => format!("?0x{:x}", data),
        TYPE_DIMENSION => decode_complex(data, false),
        TYPE_FRACTION => decode_complex(data, true),
        TYPE_FLOAT => f32::from_bits(data).to_string(),
        TYPE_COLOR_ARGB8 | TYPE_COLOR_RGB8 | TYPE_COLOR_ARGB4 | TYPE_COLOR_RGB4 => {
            format_color(data, value_type)
        }
        TYPE_NULL => String::new(),
        _ => data.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Read-only document.
// ---------------------------------------------------------------------------

/// Parsed view of a binary manifest: the element tree plus the string pool
/// and resource-id map it was decoded against.
#[derive(Debug)]
pub struct AxmlDocument {
    pub root: Element,
    pool: StringPool,
    resource_ids: Vec<u32>,
}

impl AxmlDocument {
    pub fn parse(data: &[u8]) -> AxmlResult<AxmlDocument> {
        let header = read_chunk_header(data, 0)?;
        if header.chunk_type != RES_XML_TYPE {
            return Err(AxmlError::Malformed(
                "document does not start with RES_XML_TYPE".to_string(),
            ));
        }

        let mut pool = StringPool::new(true);
        let mut resource_ids = vec![];
        let mut stack: Vec<Element> = vec![];
        let mut root: Option<Element> = None;

        let end = (header.size as usize).min(data.len());
        let mut at = header.header_size as usize;
        while at + 8 <= end {
            let chunk = match read_chunk_header(data, at) {
                Ok(c) => c,
                Err(e) => {
                    warn!("stopping chunk walk: {}", e);
                    break;
                }
            };
            match chunk.chunk_type {
                RES_STRING_POOL_TYPE => {
                    pool = StringPool::parse(data, chunk.start)?;
                }
                RES_XML_RESOURCE_MAP_TYPE => {
                    let mut ix = chunk.start + 8;
                    resource_ids.clear();
                    while ix + 4 <= chunk.start + chunk.size as usize {
                        resource_ids.push(bytes::read_u32_le(data, &mut ix)?);
                    }
                }
                RES_XML_START_ELEMENT_TYPE => {
                    let element = Self::parse_start_element(data, &chunk, &pool, &resource_ids)?;
                    stack.push(element);
                }
                RES_XML_END_ELEMENT_TYPE => {
                    if let Some(done) = stack.pop() {
                        match stack.last_mut() {
                            Some(parent) => parent.children.push(done),
                            None => {
                                if root.is_none() {
                                    root = Some(done);
                                }
                            }
                        }
                    }
                }
                RES_XML_CDATA_TYPE => {
                    let mut ix = chunk.start + 16;
                    let data_idx = bytes::read_u32_le(data, &mut ix)?;
                    if let (Some(text), Some(current)) = (pool.get(data_idx), stack.last_mut()) {
                        current.text = text.to_string();
                    }
                }
                RES_XML_START_NAMESPACE_TYPE | RES_XML_END_NAMESPACE_TYPE => {}
                other => {
                    warn!("skipping unknown chunk type 0x{:04x}", other);
                }
            }
            at += chunk.size as usize;
        }

        // Tolerate unterminated elements by folding the remaining stack up.
        while let Some(done) = stack.pop() {
            match stack.last_mut() {
                Some(parent) => parent.children.push(done),
                None if root.is_none() => root = Some(done),
                None => {}
            }
        }

        let root = root.ok_or_else(|| AxmlError::Malformed("document has no root element".into()))?;
        Ok(AxmlDocument {
            root,
            pool,
            resource_ids,
        })
    }

    fn parse_start_element(
        data: &[u8],
        chunk: &ChunkHeader,
        pool: &StringPool,
        resource_ids: &[u32],
    ) -> AxmlResult<Element> {
        let mut ix = chunk.start + 16;
        let ns_idx = bytes::read_u32_le(data, &mut ix)?;
        let name_idx = bytes::read_u32_le(data, &mut ix)?;
        let attr_start = bytes::read_u16_le(data, &mut ix)?;
        let attr_size = bytes::read_u16_le(data, &mut ix)?;
        let attr_count = bytes::read_u16_le(data, &mut ix)?;

        let mut element = Element {
            namespace_uri: pool.get(ns_idx).map(|s| s.to_string()),
            name: pool.get(name_idx).unwrap_or_default().to_string(),
            ..Element::default()
        };

        let step = if attr_size > 0 { attr_size as usize } else { 20 };
        let mut attr_pos = chunk.start + 16 + attr_start as usize;
        for _ in 0..attr_count {
            if attr_pos + 20 > data.len() {
                break;
            }
            let mut aix = attr_pos;
            let attr_ns = bytes::read_u32_le(data, &mut aix)?;
            let attr_name_idx = bytes::read_u32_le(data, &mut aix)?;
            let raw_idx = bytes::read_u32_le(data, &mut aix)?;
            let _value_size = bytes::read_u16_le(data, &mut aix)?;
            let _res0 = bytes::read_u8(data, &mut aix)?;
            let value_type = bytes::read_u8(data, &mut aix)?;
            let value_data = bytes::read_u32_le(data, &mut aix)?;

            // Prefer the pool string; fall back to the resource-id map so
            // android: attributes keep their names in stripped pools.
            let mut name = pool.get(attr_name_idx).unwrap_or_default().to_string();
            if name.is_empty() {
                if let Some(mapped) = resource_ids
                    .get(attr_name_idx as usize)
                    .and_then(|&id| android_attr_name(id))
                {
                    name = mapped.to_string();
                }
            }

            element.attributes.push(Attribute {
                namespace_uri: pool.get(attr_ns).map(|s| s.to_string()),
                name,
                value: render_value(pool, raw_idx, value_type, value_data),
                value_type,
                data: value_data,
            });
            attr_pos += step;
        }
        Ok(element)
    }

    pub fn pool(&self) -> &StringPool {
        &self.pool
    }

    pub fn resource_ids(&self) -> &[u32] {
        &self.resource_ids
    }

    fn root_attribute(&self, name: &str) -> String {
        self.root.attribute(name).unwrap_or_default().to_string()
    }

    pub fn package_name(&self) -> String {
        self.root_attribute("package")
    }

    pub fn version_name(&self) -> String {
        self.root_attribute("versionName")
    }

    pub fn version_code(&self) -> i64 {
        self.root_attribute("versionCode").parse().unwrap_or(0)
    }

    fn uses_sdk_attribute(&self, name: &str) -> String {
        for child in &self.root.children {
            if child.name == "uses-sdk" {
                return child.attribute(name).unwrap_or_default().to_string();
            }
        }
        String::new()
    }

    pub fn min_sdk(&self) -> String {
        self.uses_sdk_attribute("minSdkVersion")
    }

    pub fn target_sdk(&self) -> String {
        self.uses_sdk_attribute("targetSdkVersion")
    }

    pub fn permissions(&self) -> Vec<String> {
        self.root
            .children
            .iter()
            .filter(|c| c.name == "uses-permission")
            .filter_map(|c| c.attribute("name"))
            .map(|s| s.to_string())
            .collect()
    }

    fn application_children(&self, tag: &str) -> Vec<String> {
        let mut out = vec![];
        for child in &self.root.children {
            if child.name != "application" {
                continue;
            }
            for app_child in &child.children {
                if app_child.name == tag {
                    if let Some(name) = app_child.attribute("name") {
                        out.push(name.to_string());
                    }
                }
            }
        }
        out
    }

    pub fn activities(&self) -> Vec<String> {
        self.application_children("activity")
    }

    pub fn services(&self) -> Vec<String> {
        self.application_children("service")
    }

    pub fn receivers(&self) -> Vec<String> {
        self.application_children("receiver")
    }

    pub fn info(&self) -> String {
        let mut s = String::from("AndroidManifest Info:\n");
        s.push_str(&format!("  Package: {}\n", self.package_name()));
        s.push_str(&format!("  Version Name: {}\n", self.version_name()));
        s.push_str(&format!("  Version Code: {}\n", self.version_code()));
        s.push_str(&format!("  Min SDK: {}\n", self.min_sdk()));
        s.push_str(&format!("  Target SDK: {}\n", self.target_sdk()));
        let perms = self.permissions();
        s.push_str(&format!("  Permissions: {}\n", perms.len()));
        for p in &perms {
            s.push_str(&format!("    - {}\n", p));
        }
        s.push_str(&format!("  Activities: {}\n", self.activities().len()));
        s.push_str(&format!("  Services: {}\n", self.services().len()));
        s.push_str(&format!("  Receivers: {}\n", self.receivers().len()));
        s
    }

    /// Renders the tree as indented XML text, prefixing attributes with the
    /// trailing segment of their namespace URI (`android:` in practice).
    pub fn to_xml(&self) -> AxmlResult<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        write_element_xml(&mut writer, &self.root, true)?;
        String::from_utf8(writer.into_inner())
            .map_err(|e| AxmlError::Malformed(e.to_string()))
    }
}

fn ns_prefix(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}

fn write_element_xml(
    writer: &mut Writer<Vec<u8>>,
    element: &Element,
    is_root: bool,
) -> AxmlResult<()> {
    let mut start = BytesStart::new(element.name.as_str());
    if is_root {
        start.push_attribute(("xmlns:android", ANDROID_NS));
    }
    for attr in &element.attributes {
        let key = match attr.namespace_uri.as_deref() {
            Some(uri) => format!("{}:{}", ns_prefix(uri), attr.name),
            None => attr.name.clone(),
        };
        start.push_attribute((key.as_str(), attr.value.as_str()));
    }
    if element.children.is_empty() && element.text.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    if !element.text.is_empty() {
        writer.write_event(Event::Text(BytesText::new(&element.text)))?;
    }
    for child in &element.children {
        write_element_xml(writer, child, false)?;
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Editor.
// ---------------------------------------------------------------------------

/// One search hit from the editor's tree searches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRow {
    pub element_path: String,
    pub element_name: String,
    pub attribute_name: String,
    pub attribute_value: String,
    pub element_index: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct ChunkIndex {
    string_pool_offset: usize,
    string_pool_size: usize,
    resource_map_offset: usize,
    xml_content_offset: usize,
}

/// Byte-level manifest editor. Keeps the raw document, the parsed pool, the
/// resource-id map and a chunk index; re-parses after every mutation so the
/// tree view stays current.
#[derive(Debug)]
pub struct AxmlEditor {
    data: Vec<u8>,
    pool: StringPool,
    resource_ids: Vec<u32>,
    chunks: ChunkIndex,
    root: Element,
}

impl AxmlEditor {
    pub fn load(data: Vec<u8>) -> AxmlResult<AxmlEditor> {
        let mut editor = AxmlEditor {
            data,
            pool: StringPool::new(true),
            resource_ids: vec![],
            chunks: ChunkIndex::default(),
            root: Element::default(),
        };
        editor.reindex()?;
        Ok(editor)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn document(&self) -> AxmlResult<AxmlDocument> {
        AxmlDocument::parse(&self.data)
    }

    fn reindex(&mut self) -> AxmlResult<()> {
        let header = read_chunk_header(&self.data, 0)?;
        if header.chunk_type != RES_XML_TYPE {
            return Err(AxmlError::Malformed("not a binary XML document".into()));
        }
        self.chunks = ChunkIndex::default();
        let mut at = 8usize;
        while at + 8 <= self.data.len() {
            let chunk = match read_chunk_header(&self.data, at) {
                Ok(c) => c,
                Err(_) => break,
            };
            match chunk.chunk_type {
                RES_STRING_POOL_TYPE => {
                    self.chunks.string_pool_offset = at;
                    self.chunks.string_pool_size = chunk.size as usize;
                    self.pool = StringPool::parse(&self.data, at)?;
                }
                RES_XML_RESOURCE_MAP_TYPE => {
                    self.chunks.resource_map_offset = at;
                    self.resource_ids.clear();
                    let mut ix = at + 8;
                    while ix + 4 <= at + chunk.size as usize {
                        self.resource_ids.push(bytes::read_u32_le(&self.data, &mut ix)?);
                    }
                }
                RES_XML_START_ELEMENT_TYPE => {
                    self.chunks.xml_content_offset = at;
                    break;
                }
                _ => {}
            }
            at += chunk.size as usize;
        }
        self.root = AxmlDocument::parse(&self.data)?.root;
        Ok(())
    }

    /// Reads a little-endian u32 straight from the document.
    fn u32_at(&self, at: usize) -> AxmlResult<u32> {
        let mut ix = at;
        Ok(bytes::read_u32_le(&self.data, &mut ix)?)
    }

    fn u16_at(&self, at: usize) -> AxmlResult<u16> {
        let mut ix = at;
        Ok(bytes::read_u16_le(&self.data, &mut ix)?)
    }

    /// Appends `value` to the pool if missing; on growth the 0x0001 chunk is
    /// rebuilt and downstream offsets shift.
    fn intern_string(&mut self, value: &str) -> AxmlResult<u32> {
        if let Some(ix) = self.pool.index_of(value) {
            return Ok(ix);
        }
        let ix = self.pool.intern(value);
        self.rebuild_string_pool()?;
        Ok(ix)
    }

    /// Replaces the string-pool chunk with a freshly built one (original
    /// encoding preserved, strings append-only), patches the file-size header
    /// and shifts the recorded chunk offsets by the size delta.
    fn rebuild_string_pool(&mut self) -> AxmlResult<()> {
        if self.chunks.string_pool_size == 0 {
            return Err(AxmlError::Malformed("document has no string pool".into()));
        }
        let new_chunk = self.pool.build();
        let old_size = self.chunks.string_pool_size;
        let start = self.chunks.string_pool_offset;

        let mut rebuilt = Vec::with_capacity(self.data.len() + new_chunk.len() - old_size);
        rebuilt.extend_from_slice(&self.data[..start]);
        rebuilt.extend_from_slice(&new_chunk);
        rebuilt.extend_from_slice(&self.data[start + old_size..]);

        let delta = new_chunk.len() as i64 - old_size as i64;
        let total = rebuilt.len() as u32;
        bytes::patch_u32_le(&mut rebuilt, 4, total)?;
        self.data = rebuilt;
        self.chunks.string_pool_size = new_chunk.len();
        if self.chunks.resource_map_offset > start {
            self.chunks.resource_map_offset =
                (self.chunks.resource_map_offset as i64 + delta) as usize;
        }
        if self.chunks.xml_content_offset > start {
            self.chunks.xml_content_offset =
                (self.chunks.xml_content_offset as i64 + delta) as usize;
        }
        Ok(())
    }

    fn attr_name_matches(&self, attr_name_idx: u32, wanted: &str) -> bool {
        if self.pool.get(attr_name_idx) == Some(wanted) {
            return true;
        }
        self.resource_ids
            .get(attr_name_idx as usize)
            .and_then(|&id| android_attr_name(id))
            .map_or(false, |mapped| mapped == wanted)
    }

    /// Walks start-element chunks, invoking `visit` with (chunk offset,
    /// chunk size, element index). Stops when the callback returns true.
    fn walk_start_elements(
        &self,
        mut visit: impl FnMut(usize, usize, usize) -> AxmlResult<bool>,
    ) -> AxmlResult<bool> {
        let mut at = self.chunks.xml_content_offset;
        let mut index = 0usize;
        while at + 8 <= self.data.len() {
            let Ok(chunk) = read_chunk_header(&self.data, at) else {
                break;
            };
            if chunk.chunk_type == RES_XML_START_ELEMENT_TYPE {
                if visit(at, chunk.size as usize, index)? {
                    return Ok(true);
                }
                index += 1;
            }
            at += chunk.size as usize;
        }
        Ok(false)
    }

    /// Finds the byte offset of an attribute record inside a start-element
    /// chunk, matching by attribute name (pool or resource-id map).
    fn find_attr_in_chunk(&self, chunk_at: usize, attr_name: &str) -> AxmlResult<Option<usize>> {
        let attr_start = self.u16_at(chunk_at + 24)? as usize;
        let attr_count = self.u16_at(chunk_at + 28)? as usize;
        let mut attr_pos = chunk_at + 16 + attr_start;
        for _ in 0..attr_count {
            if attr_pos + 20 > self.data.len() {
                break;
            }
            let name_idx = self.u32_at(attr_pos + 4)?;
            if self.attr_name_matches(name_idx, attr_name) {
                return Ok(Some(attr_pos));
            }
            attr_pos += 20;
        }
        Ok(None)
    }

    /// Computes the `(raw_idx, data)` pair to store for `new_value` given the
    /// attribute's existing type. Returns None when the text cannot be
    /// converted; string-typed results carry the value to intern.
    fn convert_value(&self, value_type: u8, new_value: &str) -> Option<PendingWrite> {
        let as_int = new_value.parse::<i64>().ok();
        match value_type {
            TYPE_STRING => Some(PendingWrite::InternString),
            TYPE_INT_DEC | TYPE_INT_HEX => {
                if let Some(v) = as_int {
                    Some(PendingWrite::Typed(v as u32))
                } else if let Some(hex) = new_value
                    .strip_prefix("0x")
                    .or_else(|| new_value.strip_prefix("0X"))
                {
                    u32::from_str_radix(hex, 16).ok().map(PendingWrite::Typed)
                } else {
                    None
                }
            }
            TYPE_INT_BOOLEAN => {
                let truthy = new_value == "true" || new_value == "1" || as_int.is_some_and(|v| v != 0);
                Some(PendingWrite::Typed(if truthy { 0xFFFF_FFFF } else { 0 }))
            }
            TYPE_REFERENCE | TYPE_ATTRIBUTE => {
                if let Some(v) = as_int {
                    Some(PendingWrite::Typed(v as u32))
                } else if let Some(rest) = new_value.strip_prefix(|c| c == '@' || c == '?') {
                    let parsed = if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        rest.parse().ok()
                    };
                    parsed.map(PendingWrite::Typed)
                } else {
                    None
                }
            }
            TYPE_DIMENSION => match encode_complex(new_value) {
                Some((packed, true)) => Some(PendingWrite::Typed(packed)),
                _ => as_int.map(|v| PendingWrite::Typed((v as u32) << 8)),
            },
            TYPE_FRACTION => match encode_complex(new_value) {
                Some((packed, false)) => Some(PendingWrite::Typed(packed)),
                _ => None,
            },
            TYPE_COLOR_ARGB8..=TYPE_COLOR_RGB4 => parse_color(new_value)
                .map(|(data, _)| PendingWrite::Typed(data))
                .or_else(|| as_int.map(|v| PendingWrite::Typed(v as u32))),
            TYPE_FLOAT => new_value
                .parse::<f32>()
                .ok()
                .map(|f| PendingWrite::Typed(f.to_bits())),
            _ => {
                if let Some(v) = as_int {
                    Some(PendingWrite::Typed(v as u32))
                } else {
                    Some(PendingWrite::InternString)
                }
            }
        }
    }

    fn write_attr_value(&mut self, attr_pos: usize, raw_idx: u32, data: u32) -> AxmlResult<()> {
        bytes::patch_u32_le(&mut self.data, attr_pos + 8, raw_idx)?;
        bytes::patch_u32_le(&mut self.data, attr_pos + 16, data)?;
        Ok(())
    }

    fn set_attribute_inner(
        &mut self,
        locate: impl Fn(&Self) -> AxmlResult<Option<usize>>,
        new_value: &str,
    ) -> AxmlResult<bool> {
        let Some(attr_pos) = locate(self)? else {
            return Ok(false);
        };
        let value_type = (self.u16_at(attr_pos + 14)? >> 8) as u8;
        let Some(write) = self.convert_value(value_type, new_value) else {
            return Ok(false);
        };
        match write {
            PendingWrite::Typed(data) => {
                self.write_attr_value(attr_pos, NO_ENTRY, data)?;
            }
            PendingWrite::InternString => {
                let before = self.pool.strings.len();
                let idx = self.intern_string(new_value)?;
                if self.pool.strings.len() != before {
                    // The pool rebuild moved every downstream chunk; find the
                    // attribute again in the shifted buffer.
                    let Some(attr_pos) = locate(self)? else {
                        return Ok(false);
                    };
                    self.write_attr_value(attr_pos, idx, idx)?;
                } else {
                    self.write_attr_value(attr_pos, idx, idx)?;
                }
            }
        }
        self.reindex()?;
        Ok(true)
    }

    /// Rewrites one attribute in place, matching the element by name (or any
    /// element when empty) and the attribute by pool name or resource id. The
    /// new value is interpreted against the attribute's existing type.
    pub fn set_attribute(&mut self, element_name: &str, attr_name: &str, new_value: &str) -> AxmlResult<bool> {
        let element_name = element_name.to_string();
        let attr_name_owned = attr_name.to_string();
        self.set_attribute_inner(
            move |this: &Self| {
                let mut found = None;
                this.walk_start_elements(|chunk_at, _size, _index| {
                    let name_idx = this.u32_at(chunk_at + 20)?;
                    let elem_name = this.pool.get(name_idx).unwrap_or_default();
                    let elem_match = element_name.is_empty()
                        || elem_name == element_name
                        || (!elem_name.is_empty() && element_name.contains(elem_name));
                    if !elem_match {
                        return Ok(false);
                    }
                    if let Some(pos) = this.find_attr_in_chunk(chunk_at, &attr_name_owned)? {
                        found = Some(pos);
                        return Ok(true);
                    }
                    Ok(false)
                })?;
                Ok(found)
            },
            new_value,
        )
    }

    /// Same as [`AxmlEditor::set_attribute`], addressing the element by its
    /// document-order index instead of its name.
    pub fn set_attribute_by_index(
        &mut self,
        element_index: usize,
        attr_name: &str,
        new_value: &str,
    ) -> AxmlResult<bool> {
        let attr_name_owned = attr_name.to_string();
        self.set_attribute_inner(
            move |this: &Self| {
                let mut found = None;
                this.walk_start_elements(|chunk_at, _size, index| {
                    if index != element_index {
                        return Ok(false);
                    }
                    if let Some(pos) = this.find_attr_in_chunk(chunk_at, &attr_name_owned)? {
                        found = Some(pos);
                    }
                    Ok(true)
                })?;
                Ok(found)
            },
            new_value,
        )
    }

    pub fn set_package_name(&mut self, name: &str) -> AxmlResult<bool> {
        self.set_attribute("manifest", "package", name)
    }

    pub fn set_version_name(&mut self, name: &str) -> AxmlResult<bool> {
        self.set_attribute("manifest", "versionName", name)
    }

    pub fn set_version_code(&mut self, code: i64) -> AxmlResult<bool> {
        self.set_attribute("manifest", "versionCode", &code.to_string())
    }

    fn set_sdk_attribute(&mut self, attr: &str, sdk: i64) -> AxmlResult<bool> {
        for row in self.search_by_attribute(attr, "") {
            if row.element_name == "uses-sdk" {
                return self.set_attribute_by_index(row.element_index, attr, &sdk.to_string());
            }
        }
        self.set_attribute("uses-sdk", attr, &sdk.to_string())
    }

    pub fn set_min_sdk(&mut self, sdk: i64) -> AxmlResult<bool> {
        self.set_sdk_attribute("minSdkVersion", sdk)
    }

    pub fn set_target_sdk(&mut self, sdk: i64) -> AxmlResult<bool> {
        self.set_sdk_attribute("targetSdkVersion", sdk)
    }

    fn synth_start_element(name_idx: u32, attrs: &[(u32, u32, u32, u8, u32)]) -> Vec<u8> {
        // 16-byte chunk header + 20-byte element header + 20 bytes per attr.
        let size = 36 + attrs.len() * 20;
        let mut chunk = Vec::with_capacity(size);
        bytes::write_u16_le(&mut chunk, RES_XML_START_ELEMENT_TYPE);
        bytes::write_u16_le(&mut chunk, 16);
        bytes::write_u32_le(&mut chunk, size as u32);
        bytes::write_u32_le(&mut chunk, 1); // line
        bytes::write_u32_le(&mut chunk, NO_ENTRY); // comment
        bytes::write_u32_le(&mut chunk, NO_ENTRY); // namespace
        bytes::write_u32_le(&mut chunk, name_idx);
        bytes::write_u16_le(&mut chunk, 0x14); // attribute start
        bytes::write_u16_le(&mut chunk, 0x14); // attribute size
        bytes::write_u16_le(&mut chunk, attrs.len() as u16);
        bytes::write_u16_le(&mut chunk, 0); // id index
        bytes::write_u16_le(&mut chunk, 0); // class index
        bytes::write_u16_le(&mut chunk, 0); // style index
        for &(ns, name, raw, value_type, data) in attrs {
            bytes::write_u32_le(&mut chunk, ns);
            bytes::write_u32_le(&mut chunk, name);
            bytes::write_u32_le(&mut chunk, raw);
            bytes::write_u16_le(&mut chunk, 8);
            bytes::write_u8(&mut chunk, 0);
            bytes::write_u8(&mut chunk, value_type);
            bytes::write_u32_le(&mut chunk, data);
        }
        chunk
    }

    fn synth_end_element(name_idx: u32) -> Vec<u8> {
        let mut chunk = Vec::with_capacity(24);
        bytes::write_u16_le(&mut chunk, RES_XML_END_ELEMENT_TYPE);
        bytes::write_u16_le(&mut chunk, 16);
        bytes::write_u32_le(&mut chunk, 24);
        bytes::write_u32_le(&mut chunk, 1);
        bytes::write_u32_le(&mut chunk, NO_ENTRY);
        bytes::write_u32_le(&mut chunk, NO_ENTRY);
        bytes::write_u32_le(&mut chunk, name_idx);
        chunk
    }

    fn splice_in(&mut self, at: usize, payload: &[u8]) -> AxmlResult<()> {
        let mut rebuilt = Vec::with_capacity(self.data.len() + payload.len());
        rebuilt.extend_from_slice(&self.data[..at]);
        rebuilt.extend_from_slice(payload);
        rebuilt.extend_from_slice(&self.data[at..]);
        let total = rebuilt.len() as u32;
        bytes::patch_u32_le(&mut rebuilt, 4, total)?;
        self.data = rebuilt;
        self.reindex()
    }

    fn splice_out(&mut self, from: usize, to: usize) -> AxmlResult<()> {
        let mut rebuilt = Vec::with_capacity(self.data.len() - (to - from));
        rebuilt.extend_from_slice(&self.data[..from]);
        rebuilt.extend_from_slice(&self.data[to..]);
        let total = rebuilt.len() as u32;
        bytes::patch_u32_le(&mut rebuilt, 4, total)?;
        self.data = rebuilt;
        self.reindex()
    }

    /// Splices a `<uses-permission android:name="..."/>` pair in directly
    /// after the `<manifest>` start element.
    pub fn add_permission(&mut self, permission: &str) -> AxmlResult<bool> {
        let name_attr_idx = self.intern_string("name")?;
        let perm_idx = self.intern_string(permission)?;
        let tag_idx = self.intern_string("uses-permission")?;
        let ns_idx = self.intern_string(ANDROID_NS)?;

        let mut insert_at = None;
        self.walk_start_elements(|chunk_at, size, _| {
            let name_idx = self.u32_at(chunk_at + 20)?;
            if self.pool.get(name_idx) == Some("manifest") {
                insert_at = Some(chunk_at + size);
                return Ok(true);
            }
            Ok(false)
        })?;
        let Some(at) = insert_at else {
            error!("manifest root element not found");
            return Ok(false);
        };

        let mut payload = Self::synth_start_element(
            tag_idx,
            &[(ns_idx, name_attr_idx, perm_idx, TYPE_STRING, perm_idx)],
        );
        payload.extend_from_slice(&Self::synth_end_element(tag_idx));
        self.splice_in(at, &payload)?;
        Ok(true)
    }

    /// Locates a `uses-permission` element whose `name` attribute matches and
    /// splices out the start/end pair.
    pub fn remove_permission(&mut self, permission: &str) -> AxmlResult<bool> {
        let mut range = None;
        let mut wanted_name_idx = None;
        self.walk_start_elements(|chunk_at, size, _| {
            let name_idx = self.u32_at(chunk_at + 20)?;
            if self.pool.get(name_idx) != Some("uses-permission") {
                return Ok(false);
            }
            let attr_start = self.u16_at(chunk_at + 24)? as usize;
            let attr_count = self.u16_at(chunk_at + 28)? as usize;
            let mut attr_pos = chunk_at + 16 + attr_start;
            for _ in 0..attr_count {
                if attr_pos + 20 > self.data.len() {
                    break;
                }
                let attr_name_idx = self.u32_at(attr_pos + 4)?;
                let raw_idx = self.u32_at(attr_pos + 8)?;
                if self.attr_name_matches(attr_name_idx, "name")
                    && self.pool.get(raw_idx) == Some(permission)
                {
                    range = Some((chunk_at, chunk_at + size));
                    wanted_name_idx = Some(name_idx);
                    return Ok(true);
                }
                attr_pos += 20;
            }
            Ok(false)
        })?;

        let (Some((start, after_start)), Some(tag_idx)) = (range, wanted_name_idx) else {
            return Ok(false);
        };

        // Find the matching end element by tag name index.
        let mut end = None;
        let mut at = after_start;
        while at + 8 <= self.data.len() {
            let Ok(chunk) = read_chunk_header(&self.data, at) else {
                break;
            };
            if chunk.chunk_type == RES_XML_END_ELEMENT_TYPE && self.u32_at(at + 20)? == tag_idx {
                end = Some(at + chunk.size as usize);
                break;
            }
            at += chunk.size as usize;
        }
        let Some(end) = end else {
            return Ok(false);
        };
        self.splice_out(start, end)?;
        Ok(true)
    }

    /// Inserts `<activity android:name="..." android:exported="..."/>` just
    /// before the `</application>` end element.
    pub fn add_activity(&mut self, activity_name: &str, exported: bool) -> AxmlResult<bool> {
        let name_attr_idx = self.intern_string("name")?;
        let exported_attr_idx = self.intern_string("exported")?;
        let value_idx = self.intern_string(activity_name)?;
        let tag_idx = self.intern_string("activity")?;
        let ns_idx = self.intern_string(ANDROID_NS)?;

        // Track depth from <application> to find its own end element.
        let mut insert_at = None;
        let mut at = self.chunks.xml_content_offset;
        let mut in_application = false;
        let mut depth = 0i32;
        while at + 8 <= self.data.len() {
            let Ok(chunk) = read_chunk_header(&self.data, at) else {
                break;
            };
            match chunk.chunk_type {
                RES_XML_START_ELEMENT_TYPE => {
                    let name_idx = self.u32_at(at + 20)?;
                    if self.pool.get(name_idx) == Some("application") {
                        in_application = true;
                        depth = 1;
                    } else if in_application {
                        depth += 1;
                    }
                }
                RES_XML_END_ELEMENT_TYPE if in_application => {
                    depth -= 1;
                    if depth == 0 {
                        insert_at = Some(at);
                        break;
                    }
                }
                _ => {}
            }
            at += chunk.size as usize;
        }
        let Some(at) = insert_at else {
            error!("application element not found");
            return Ok(false);
        };

        let mut payload = Self::synth_start_element(
            tag_idx,
            &[
                (ns_idx, name_attr_idx, value_idx, TYPE_STRING, value_idx),
                (
                    ns_idx,
                    exported_attr_idx,
                    NO_ENTRY,
                    TYPE_INT_BOOLEAN,
                    if exported { 0xFFFF_FFFF } else { 0 },
                ),
            ],
        );
        payload.extend_from_slice(&Self::synth_end_element(tag_idx));
        self.splice_in(at, &payload)?;
        Ok(true)
    }

    /// Removes an `<activity>` subtree by its `name` attribute, tracking
    /// start/end depth to find the matching close.
    pub fn remove_activity(&mut self, activity_name: &str) -> AxmlResult<bool> {
        let mut start = None;
        let mut end = None;
        let mut depth = 0i32;
        let mut at = self.chunks.xml_content_offset;
        while at + 8 <= self.data.len() {
            let Ok(chunk) = read_chunk_header(&self.data, at) else {
                break;
            };
            match chunk.chunk_type {
                RES_XML_START_ELEMENT_TYPE => {
                    if start.is_none() {
                        let name_idx = self.u32_at(at + 20)?;
                        if self.pool.get(name_idx) == Some("activity") {
                            let attr_start = self.u16_at(at + 24)? as usize;
                            let attr_count = self.u16_at(at + 28)? as usize;
                            let mut attr_pos = at + 16 + attr_start;
                            for _ in 0..attr_count {
                                if attr_pos + 20 > self.data.len() {
                                    break;
                                }
                                let attr_name_idx = self.u32_at(attr_pos + 4)?;
                                let raw_idx = self.u32_at(attr_pos + 8)?;
                                if self.attr_name_matches(attr_name_idx, "name")
                                    && self.pool.get(raw_idx) == Some(activity_name)
                                {
                                    start = Some(at);
                                    depth = 1;
                                    break;
                                }
                                attr_pos += 20;
                            }
                        }
                    } else {
                        depth += 1;
                    }
                }
                RES_XML_END_ELEMENT_TYPE if start.is_some() => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(at + chunk.size as usize);
                    }
                }
                _ => {}
            }
            if end.is_some() {
                break;
            }
            at += chunk.size as usize;
        }
        let (Some(from), Some(to)) = (start, end) else {
            return Ok(false);
        };
        self.splice_out(from, to)?;
        Ok(true)
    }

    fn search_tree(
        element: &Element,
        path: &str,
        index: &mut usize,
        mut keep: impl FnMut(&Element, &Attribute) -> bool + Copy,
        results: &mut Vec<SearchRow>,
    ) {
        let current_path = if path.is_empty() {
            element.name.clone()
        } else {
            format!("{}/{}", path, element.name)
        };
        for attr in &element.attributes {
            if keep(element, attr) {
                results.push(SearchRow {
                    element_path: current_path.clone(),
                    element_name: element.name.clone(),
                    attribute_name: attr.name.clone(),
                    attribute_value: attr.value.clone(),
                    element_index: *index,
                });
            }
        }
        *index += 1;
        for child in &element.children {
            Self::search_tree(child, &current_path, index, keep, results);
        }
    }

    pub fn search_by_attribute(&self, attr_name: &str, value_pattern: &str) -> Vec<SearchRow> {
        let mut results = vec![];
        let mut index = 0;
        Self::search_tree(
            &self.root,
            "",
            &mut index,
            |_, attr| {
                let name_ok = attr_name.is_empty() || attr.name.contains(attr_name);
                let value_ok = value_pattern.is_empty() || attr.value.contains(value_pattern);
                match (attr_name.is_empty(), value_pattern.is_empty()) {
                    (true, true) => false,
                    _ => name_ok && value_ok,
                }
            },
            &mut results,
        );
        results
    }

    pub fn search_by_element(&self, element_name: &str) -> Vec<SearchRow> {
        let mut results = vec![];
        let mut index = 0;
        Self::search_tree(
            &self.root,
            "",
            &mut index,
            |elem, _| elem.name.contains(element_name),
            &mut results,
        );
        results
    }

    pub fn search_by_value(&self, value_pattern: &str) -> Vec<SearchRow> {
        self.search_by_attribute("", value_pattern)
    }
}

#[derive(Debug, Clone, Copy)]
enum PendingWrite {
    /// Store a typed u32, raw value index cleared.
    Typed(u32),
    /// Intern the new text and store its pool index in both slots.
    InternString,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a small binary manifest from scratch, mirroring the on-disk
    /// chunk layout the parser expects.
    struct ManifestBuilder {
        pool: StringPool,
        body: Vec<u8>,
    }

    impl ManifestBuilder {
        fn new() -> Self {
            ManifestBuilder {
                pool: StringPool::new(true),
                body: vec![],
            }
        }

        fn s(&mut self, value: &str) -> u32 {
            self.pool.intern(value)
        }

        fn start(&mut self, name: &str, attrs: &[(Option<&str>, &str, u8, &str, u32)]) {
            let encoded: Vec<(u32, u32, u32, u8, u32)> = attrs
                .iter()
                .map(|&(ns, aname, vtype, raw, data)| {
                    let ns_idx = ns.map(|u| self.s(u)).unwrap_or(NO_ENTRY);
                    let name_idx = self.s(aname);
                    let (raw_idx, data_val) = if vtype == TYPE_STRING {
                        let idx = self.s(raw);
                        (idx, idx)
                    } else {
                        (NO_ENTRY, data)
                    };
                    (ns_idx, name_idx, raw_idx, vtype, data_val)
                })
                .collect();
            let tag = self.s(name);
            let chunk = AxmlEditor::synth_start_element(tag, &encoded);
            self.body.extend_from_slice(&chunk);
        }

        fn end(&mut self, name: &str) {
            let tag = self.s(name);
            self.body.extend_from_slice(&AxmlEditor::synth_end_element(tag));
        }

        fn finish(&self) -> Vec<u8> {
            let pool_chunk = self.pool.build();
            let mut doc = vec![];
            bytes::write_u16_le(&mut doc, RES_XML_TYPE);
            bytes::write_u16_le(&mut doc, 8);
            bytes::write_u32_le(&mut doc, 0);
            doc.extend_from_slice(&pool_chunk);
            doc.extend_from_slice(&self.body);
            let total = doc.len() as u32;
            bytes::patch_u32_le(&mut doc, 4, total).unwrap();
            doc
        }
    }

    fn sample_manifest() -> Vec<u8> {
        let mut b = ManifestBuilder::new();
        b.start(
            "manifest",
            &[
                (None, "package", TYPE_STRING, "com.x", 0),
                (Some(ANDROID_NS), "versionCode", TYPE_INT_DEC, "", 1),
                (Some(ANDROID_NS), "versionName", TYPE_STRING, "1.0", 0),
            ],
        );
        b.start(
            "uses-sdk",
            &[
                (Some(ANDROID_NS), "minSdkVersion", TYPE_INT_DEC, "", 21),
                (Some(ANDROID_NS), "targetSdkVersion", TYPE_INT_DEC, "", 33),
            ],
        );
        b.end("uses-sdk");
        b.start(
            "uses-permission",
            &[(Some(ANDROID_NS), "name", TYPE_STRING, "android.permission.INTERNET", 0)],
        );
        b.end("uses-permission");
        b.start("application", &[(Some(ANDROID_NS), "debuggable", TYPE_INT_BOOLEAN, "", 0)]);
        b.start(
            "activity",
            &[
                (Some(ANDROID_NS), "name", TYPE_STRING, "com.x.MainActivity", 0),
                (Some(ANDROID_NS), "exported", TYPE_INT_BOOLEAN, "", 0xFFFF_FFFF),
            ],
        );
        b.end("activity");
        b.start(
            "service",
            &[(Some(ANDROID_NS), "name", TYPE_STRING, "com.x.SyncService", 0)],
        );
        b.end("service");
        b.end("application");
        b.end("manifest");
        b.finish()
    }

    fn header_len(data: &[u8]) -> u32 {
        let mut ix = 4;
        bytes::read_u32_le(data, &mut ix).unwrap()
    }

    #[test]
    fn parses_manifest_summary() {
        let doc = AxmlDocument::parse(&sample_manifest()).unwrap();
        assert_eq!(doc.package_name(), "com.x");
        assert_eq!(doc.version_code(), 1);
        assert_eq!(doc.version_name(), "1.0");
        assert_eq!(doc.min_sdk(), "21");
        assert_eq!(doc.target_sdk(), "33");
        assert_eq!(doc.permissions(), vec!["android.permission.INTERNET"]);
        assert_eq!(doc.activities(), vec!["com.x.MainActivity"]);
        assert_eq!(doc.services(), vec!["com.x.SyncService"]);
        assert!(doc.receivers().is_empty());
        let xml = doc.to_xml().unwrap();
        assert!(xml.contains("<manifest"));
        assert!(xml.contains("android:versionCode=\"1\""));
        assert!(xml.contains("uses-permission"));
    }

    #[test]
    fn file_size_header_matches_buffer() {
        let data = sample_manifest();
        assert_eq!(header_len(&data) as usize, data.len());
    }

    #[test]
    fn set_package_and_version_code() {
        let mut editor = AxmlEditor::load(sample_manifest()).unwrap();
        assert!(editor.set_package_name("com.y").unwrap());
        assert!(editor.set_version_code(2).unwrap());
        let data = editor.data().to_vec();
        assert_eq!(header_len(&data) as usize, data.len());
        let doc = AxmlDocument::parse(&data).unwrap();
        assert_eq!(doc.package_name(), "com.y");
        assert_eq!(doc.version_code(), 2);
    }

    #[test]
    fn int_edit_is_size_preserving() {
        let before = sample_manifest();
        let mut editor = AxmlEditor::load(before.clone()).unwrap();
        assert!(editor.set_version_code(7).unwrap());
        assert_eq!(editor.data().len(), before.len());
    }

    #[test]
    fn string_edit_with_existing_string_is_size_preserving() {
        let before = sample_manifest();
        let mut editor = AxmlEditor::load(before.clone()).unwrap();
        // "com.x.SyncService" is already pooled.
        assert!(editor
            .set_attribute("activity", "name", "com.x.SyncService")
            .unwrap());
        assert_eq!(editor.data().len(), before.len());
    }

    #[test]
    fn sdk_levels_edit_in_place() {
        let mut editor = AxmlEditor::load(sample_manifest()).unwrap();
        assert!(editor.set_min_sdk(23).unwrap());
        assert!(editor.set_target_sdk(34).unwrap());
        let doc = editor.document().unwrap();
        assert_eq!(doc.min_sdk(), "23");
        assert_eq!(doc.target_sdk(), "34");
    }

    #[test]
    fn boolean_edit_stores_all_ones() {
        let mut editor = AxmlEditor::load(sample_manifest()).unwrap();
        assert!(editor
            .set_attribute("application", "debuggable", "true")
            .unwrap());
        let doc = editor.document().unwrap();
        let app = doc
            .root
            .children
            .iter()
            .find(|c| c.name == "application")
            .unwrap();
        assert_eq!(app.attribute("debuggable"), Some("true"));
    }

    #[test]
    fn unconvertible_value_leaves_bytes_untouched() {
        let before = sample_manifest();
        let mut editor = AxmlEditor::load(before.clone()).unwrap();
        assert!(!editor
            .set_attribute("manifest", "versionCode", "not-a-number")
            .unwrap());
        assert_eq!(editor.data(), before.as_slice());
        assert!(!editor
            .set_attribute("manifest", "missingAttr", "1")
            .unwrap());
    }

    #[test]
    fn add_permission_lands_after_manifest_start() {
        let mut editor = AxmlEditor::load(sample_manifest()).unwrap();
        assert!(editor.add_permission("android.permission.CAMERA").unwrap());
        let data = editor.data().to_vec();
        assert_eq!(header_len(&data) as usize, data.len());
        let doc = AxmlDocument::parse(&data).unwrap();
        let perms = doc.permissions();
        assert_eq!(
            perms
                .iter()
                .filter(|p| *p == "android.permission.CAMERA")
                .count(),
            1
        );
        // The new element is the manifest's first child.
        assert_eq!(doc.root.children[0].name, "uses-permission");
        assert_eq!(
            doc.root.children[0].attribute("name"),
            Some("android.permission.CAMERA")
        );
    }

    #[test]
    fn remove_permission_splices_the_pair_out() {
        let before = sample_manifest();
        let mut editor = AxmlEditor::load(before.clone()).unwrap();
        assert!(editor
            .remove_permission("android.permission.INTERNET")
            .unwrap());
        let data = editor.data().to_vec();
        assert!(data.len() < before.len());
        assert_eq!(header_len(&data) as usize, data.len());
        let doc = AxmlDocument::parse(&data).unwrap();
        assert!(doc.permissions().is_empty());
        assert!(!editor.remove_permission("android.permission.INTERNET").unwrap());
    }

    #[test]
    fn add_and_remove_activity() {
        let mut editor = AxmlEditor::load(sample_manifest()).unwrap();
        assert!(editor.add_activity("com.x.Second", true).unwrap());
        let doc = editor.document().unwrap();
        assert_eq!(
            doc.activities(),
            vec!["com.x.MainActivity", "com.x.Second"]
        );

        assert!(editor.remove_activity("com.x.MainActivity").unwrap());
        let doc = editor.document().unwrap();
        assert_eq!(doc.activities(), vec!["com.x.Second"]);
        assert!(!editor.remove_activity("com.x.MainActivity").unwrap());
    }

    #[test]
    fn search_rows_carry_paths_and_indices() {
        let editor = AxmlEditor::load(sample_manifest()).unwrap();
        let rows = editor.search_by_attribute("name", "MainActivity");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].element_name, "activity");
        assert_eq!(rows[0].element_path, "manifest/application/activity");
        assert_eq!(rows[0].attribute_value, "com.x.MainActivity");

        let by_value = editor.search_by_value("SyncService");
        assert_eq!(by_value.len(), 1);
        assert_eq!(by_value[0].element_name, "service");

        let by_element = editor.search_by_element("uses-sdk");
        assert_eq!(by_element.len(), 2); // one row per attribute
    }

    #[test]
    fn pool_rebuild_keeps_encoding_and_indices() {
        let mut editor = AxmlEditor::load(sample_manifest()).unwrap();
        let before: Vec<String> = editor.pool.strings.clone();
        let was_utf8 = editor.pool.utf8;
        editor.intern_string("a.fresh.string").unwrap();
        assert_eq!(editor.pool.utf8, was_utf8);
        assert_eq!(&editor.pool.strings[..before.len()], before.as_slice());
        assert_eq!(
            editor.pool.strings.last().map(String::as_str),
            Some("a.fresh.string")
        );
        // The document must still parse cleanly after the splice.
        let doc = editor.document().unwrap();
        assert_eq!(doc.package_name(), "com.x");
    }

    #[test]
    fn attr_id_tables_are_inverse() {
        assert_eq!(android_attr_name(0x0101021b), Some("versionCode"));
        assert_eq!(android_attr_id("versionCode"), Some(0x0101021b));
        assert_eq!(android_attr_name(0xdeadbeef), None);
    }

    /// An attribute whose pool name is empty still resolves through the
    /// resource-id map, for both parsing and editing.
    #[test]
    fn resource_map_supplies_attribute_names() {
        let mut pool = StringPool::new(true);
        let blank = pool.intern(""); // index 0, aligned with the id map
        let value = pool.intern("com.x.Main");
        let tag = pool.intern("activity");
        assert_eq!(blank, 0);

        let mut resource_map = vec![];
        bytes::write_u16_le(&mut resource_map, RES_XML_RESOURCE_MAP_TYPE);
        bytes::write_u16_le(&mut resource_map, 8);
        bytes::write_u32_le(&mut resource_map, 8 + 4);
        bytes::write_u32_le(&mut resource_map, 0x01010003); // android:name

        let mut body = vec![];
        body.extend_from_slice(&AxmlEditor::synth_start_element(
            tag,
            &[(NO_ENTRY, blank, value, TYPE_STRING, value)],
        ));
        body.extend_from_slice(&AxmlEditor::synth_end_element(tag));

        let mut doc = vec![];
        bytes::write_u16_le(&mut doc, RES_XML_TYPE);
        bytes::write_u16_le(&mut doc, 8);
        bytes::write_u32_le(&mut doc, 0);
        doc.extend_from_slice(&pool.build());
        doc.extend_from_slice(&resource_map);
        doc.extend_from_slice(&body);
        let total = doc.len() as u32;
        bytes::patch_u32_le(&mut doc, 4, total).unwrap();

        let parsed = AxmlDocument::parse(&doc).unwrap();
        assert_eq!(parsed.root.attribute("name"), Some("com.x.Main"));

        let mut editor = AxmlEditor::load(doc).unwrap();
        assert!(editor
            .set_attribute("activity", "name", "com.x.Main")
            .unwrap());
    }

    #[test]
    fn complex_value_roundtrip() {
        for text in ["16dp", "12sp", "100px", "8pt", "50.00%", "25.00%p"] {
            let (packed, dimension) = encode_complex(text).unwrap();
            let rendered = decode_complex(packed, !dimension);
            // Accept formatting differences like "50%" vs "50.00%".
            let norm = |s: &str| s.replace(".00", "");
            assert_eq!(norm(&rendered), norm(text), "for {}", text);
        }
        assert!(encode_complex("12furlongs").is_none());
    }

    #[test]
    fn color_parsing_and_formatting() {
        assert_eq!(parse_color("#FF112233"), Some((0xFF112233, TYPE_COLOR_ARGB8)));
        assert_eq!(parse_color("#112233"), Some((0xFF112233, TYPE_COLOR_RGB8)));
        assert_eq!(parse_color("#F12"), Some((0xF12, TYPE_COLOR_RGB4)));
        assert_eq!(parse_color("plaid"), None);
        assert_eq!(format_color(0xFF112233, TYPE_COLOR_ARGB8), "#FF112233");
        assert_eq!(format_color(0xFF112233, TYPE_COLOR_RGB8), "#112233");
    }

    #[test]
    fn truncated_documents_do_not_panic() {
        let data = sample_manifest();
        for cut in [0, 1, 7, 8, 9, 24, data.len() / 2, data.len() - 1] {
            let _ = AxmlDocument::parse(&data[..cut]);
            let _ = AxmlEditor::load(data[..cut].to_vec());
        }
    }
}
