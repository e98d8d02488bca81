//! Compiled resource table (`resources.arsc`) parser and search.
//!
//! A table is a 0x0002 chunk holding the global string pool plus one package
//! chunk per package. Inside the package live the type-strings and
//! key-strings pools and, per resource type, a type-spec chunk followed by
//! type chunks whose entry tables use 0xFFFFFFFF for absent entries. Only
//! simple (non-complex) entries carry a value; maps are skipped.

use std::collections::HashMap;

use log::{debug, warn};

use crate::bytes::{self, OutOfBounds};
use crate::strpool::StringPool;

pub const RES_TABLE_TYPE: u16 = 0x0002;
const RES_STRING_POOL_TYPE: u16 = 0x0001;
const RES_TABLE_PACKAGE_TYPE: u16 = 0x0200;
const RES_TABLE_TYPE_TYPE: u16 = 0x0201;
const RES_TABLE_TYPE_SPEC_TYPE: u16 = 0x0202;

const NO_ENTRY: u32 = 0xFFFF_FFFF;
const ENTRY_FLAG_COMPLEX: u16 = 0x0001;

pub type ArscResult<T> = Result<T, ArscError>;

#[derive(Debug)]
pub enum ArscError {
    Malformed(String),
}

impl std::fmt::Display for ArscError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArscError::Malformed(msg) => write!(f, "malformed resource table: {msg}"),
        }
    }
}

impl std::error::Error for ArscError {}

impl From<OutOfBounds> for ArscError {
    fn from(value: OutOfBounds) -> Self {
        ArscError::Malformed(value.to_string())
    }
}

/// One resolved resource: `id = (package << 24) | (type << 16) | entry`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    pub id: u32,
    pub name: String,
    pub type_name: String,
    pub value: String,
    pub package: String,
}

/// A global-pool string matched by a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringHit {
    pub index: u32,
    pub value: String,
}

#[derive(Debug)]
pub struct ResourceTable {
    strings: Vec<String>,
    package_id: u32,
    package_name: String,
    resources: Vec<ResourceEntry>,
    id_to_index: HashMap<u32, usize>,
}

impl ResourceTable {
    pub fn parse(data: &[u8]) -> ArscResult<ResourceTable> {
        if data.len() < 12 {
            return Err(ArscError::Malformed("too small for a table header".into()));
        }
        let mut ix = 0;
        let chunk_type = bytes::read_u16_le(data, &mut ix)?;
        let header_size = bytes::read_u16_le(data, &mut ix)?;
        let size = bytes::read_u32_le(data, &mut ix)?;
        let _package_count = bytes::read_u32_le(data, &mut ix)?;
        if chunk_type != RES_TABLE_TYPE {
            return Err(ArscError::Malformed("not a resource table".into()));
        }
        if size as usize > data.len() {
            return Err(ArscError::Malformed("declared size exceeds buffer".into()));
        }

        let mut table = ResourceTable {
            strings: vec![],
            package_id: 0,
            package_name: String::new(),
            resources: vec![],
            id_to_index: HashMap::new(),
        };

        let mut at = header_size as usize;
        while at + 8 <= data.len() {
            let mut hix = at;
            let chunk_type = bytes::read_u16_le(data, &mut hix)?;
            let _chunk_header = bytes::read_u16_le(data, &mut hix)?;
            let chunk_size = bytes::read_u32_le(data, &mut hix)? as usize;
            if chunk_size < 8 || at + chunk_size > data.len() {
                warn!("stopping at undersized chunk 0x{:04x} at offset {}", chunk_type, at);
                break;
            }
            match chunk_type {
                RES_STRING_POOL_TYPE => {
                    table.strings = StringPool::parse(data, at)?.strings;
                }
                RES_TABLE_PACKAGE_TYPE => {
                    table.parse_package(data, at, chunk_size)?;
                }
                other => {
                    warn!("skipping top-level chunk 0x{:04x}", other);
                }
            }
            at += chunk_size;
        }

        debug!(
            "resource table: package {} ({:#x}), {} strings, {} resources",
            table.package_name,
            table.package_id,
            table.strings.len(),
            table.resources.len()
        );
        Ok(table)
    }

    fn parse_package(&mut self, data: &[u8], offset: usize, size: usize) -> ArscResult<()> {
        if offset + 288 > data.len() {
            return Err(ArscError::Malformed("package chunk too small".into()));
        }
        let mut ix = offset + 2;
        let header_size = bytes::read_u16_le(data, &mut ix)? as usize;
        ix = offset + 8;
        self.package_id = bytes::read_u32_le(data, &mut ix)?;

        // Package name: UTF-16, up to 128 code units, NUL-terminated.
        let mut name_units = vec![];
        let mut nix = offset + 12;
        for _ in 0..128 {
            let unit = bytes::read_u16_le(data, &mut nix)?;
            if unit == 0 {
                break;
            }
            name_units.push(unit);
        }
        self.package_name = String::from_utf16_lossy(&name_units);

        ix = offset + 268;
        let type_strings_offset = bytes::read_u32_le(data, &mut ix)? as usize;
        ix = offset + 276;
        let key_strings_offset = bytes::read_u32_le(data, &mut ix)? as usize;

        let mut type_strings: Vec<String> = vec![];
        let mut key_strings: Vec<String> = vec![];

        let end = offset + size;
        let mut at = offset + header_size;
        while at + 8 <= end {
            let mut hix = at;
            let chunk_type = bytes::read_u16_le(data, &mut hix)?;
            let chunk_header = bytes::read_u16_le(data, &mut hix)? as usize;
            let chunk_size = bytes::read_u32_le(data, &mut hix)? as usize;
            if chunk_size < 8 || at + chunk_size > end {
                warn!("stopping package walk at malformed chunk");
                break;
            }
            match chunk_type {
                RES_STRING_POOL_TYPE => {
                    let pool = StringPool::parse(data, at)?.strings;
                    let rel = at - offset;
                    if rel == type_strings_offset {
                        type_strings = pool;
                    } else if rel == key_strings_offset {
                        key_strings = pool;
                    } else {
                        warn!("string pool at unexpected package offset {}", rel);
                    }
                }
                RES_TABLE_TYPE_SPEC_TYPE => {
                    // Only consulted for the active type name; entries come
                    // from the type chunks that follow.
                }
                RES_TABLE_TYPE_TYPE => {
                    self.parse_type_chunk(
                        data,
                        at,
                        chunk_header,
                        chunk_size,
                        &type_strings,
                        &key_strings,
                    )?;
                }
                other => {
                    warn!("skipping package chunk 0x{:04x}", other);
                }
            }
            at += chunk_size;
        }
        Ok(())
    }

    fn parse_type_chunk(
        &mut self,
        data: &[u8],
        offset: usize,
        header_size: usize,
        size: usize,
        type_strings: &[String],
        key_strings: &[String],
    ) -> ArscResult<()> {
        let mut ix = offset + 8;
        let type_id = bytes::read_u8(data, &mut ix)? as u32;
        ix = offset + 12;
        let entry_count = bytes::read_u32_le(data, &mut ix)? as usize;
        let entries_start = bytes::read_u32_le(data, &mut ix)? as usize;

        let type_name = if type_id >= 1 {
            type_strings
                .get(type_id as usize - 1)
                .cloned()
                .unwrap_or_default()
        } else {
            String::new()
        };

        let offsets_at = offset + header_size;
        let entries_at = offset + entries_start;
        for i in 0..entry_count {
            let mut oix = offsets_at + i * 4;
            if oix + 4 > data.len() || oix + 4 > offset + size {
                break;
            }
            let entry_offset = bytes::read_u32_le(data, &mut oix)?;
            if entry_offset == NO_ENTRY {
                continue;
            }
            let entry_pos = entries_at + entry_offset as usize;
            if entry_pos + 8 > data.len() {
                continue;
            }
            let mut eix = entry_pos;
            let entry_size = bytes::read_u16_le(data, &mut eix)? as usize;
            let entry_flags = bytes::read_u16_le(data, &mut eix)?;
            let key_index = bytes::read_u32_le(data, &mut eix)?;

            let mut entry = ResourceEntry {
                id: (self.package_id << 24) | (type_id << 16) | i as u32,
                name: key_strings
                    .get(key_index as usize)
                    .cloned()
                    .unwrap_or_default(),
                type_name: type_name.clone(),
                value: String::new(),
                package: self.package_name.clone(),
            };

            if entry_flags & ENTRY_FLAG_COMPLEX == 0 && entry_pos + entry_size + 8 <= data.len() {
                let value_pos = entry_pos + 8;
                let value_type = data[value_pos + 3];
                let mut vix = value_pos + 4;
                let value_data = bytes::read_u32_le(data, &mut vix)?;
                entry.value = self.render_value(value_type, value_data);
            }

            self.id_to_index.insert(entry.id, self.resources.len());
            self.resources.push(entry);
        }
        Ok(())
    }

    fn render_value(&self, value_type: u8, data: u32) -> String {
        match value_type {
            0x03 => self
                .strings
                .get(data as usize)
                .cloned()
                .unwrap_or_default(),
            0x10 => (data as i32).to_string(),
            0x11 => format!("0x{:08X}", data),
            0x12 => if data != 0 { "true" } else { "false" }.to_string(),
            0x1c..=0x1f => format!("#{:08X}", data),
            _ => String::new(),
        }
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    pub fn resources(&self) -> &[ResourceEntry] {
        &self.resources
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn package_id(&self) -> u32 {
        self.package_id
    }

    /// Case-insensitive substring match over the global string pool.
    pub fn search_strings(&self, pattern: &str) -> Vec<StringHit> {
        let needle = pattern.to_ascii_lowercase();
        self.strings
            .iter()
            .enumerate()
            .filter(|(_, s)| s.to_ascii_lowercase().contains(&needle))
            .map(|(i, s)| StringHit {
                index: i as u32,
                value: s.clone(),
            })
            .collect()
    }

    /// Case-insensitive substring match on resource names and values, with an
    /// optional exact type filter.
    pub fn search_resources(&self, pattern: &str, type_filter: &str) -> Vec<ResourceEntry> {
        let needle = pattern.to_ascii_lowercase();
        self.resources
            .iter()
            .filter(|r| type_filter.is_empty() || r.type_name == type_filter)
            .filter(|r| {
                r.name.to_ascii_lowercase().contains(&needle)
                    || r.value.to_ascii_lowercase().contains(&needle)
            })
            .cloned()
            .collect()
    }

    pub fn get_resource(&self, id: u32) -> Option<&ResourceEntry> {
        self.id_to_index.get(&id).map(|&i| &self.resources[i])
    }

    pub fn info(&self) -> String {
        let mut s = String::new();
        s.push_str(&format!("Package: {}\n", self.package_name));
        s.push_str(&format!("Package ID: 0x{:x}\n", self.package_id));
        s.push_str(&format!("String pool size: {}\n", self.strings.len()));
        s.push_str(&format!("Resource count: {}\n", self.resources.len()));
        let mut counts: Vec<(String, usize)> = vec![];
        for r in &self.resources {
            match counts.iter_mut().find(|(t, _)| *t == r.type_name) {
                Some((_, n)) => *n += 1,
                None => counts.push((r.type_name.clone(), 1)),
            }
        }
        s.push_str("\nResources by type:\n");
        for (type_name, count) in counts {
            s.push_str(&format!("  {}: {}\n", type_name, count));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::{patch_u32_le, write_u16_le, write_u32_le, write_u8};

    fn pool_chunk(strings: &[&str]) -> Vec<u8> {
        let mut pool = StringPool::new(true);
        for s in strings {
            pool.intern(s);
        }
        pool.build()
    }

    /// Synthesizes a one-package table: global pool, package "com.x"
    /// (id 0x7f), one `string` type with three entries (string, int, absent).
    fn sample_table() -> Vec<u8> {
        let global = pool_chunk(&["hello", "world"]);
        let type_strings = pool_chunk(&["string"]);
        let key_strings = pool_chunk(&["app_name", "count", "missing"]);

        // Type spec for type id 1 with three entry config masks.
        let mut spec = vec![];
        write_u16_le(&mut spec, RES_TABLE_TYPE_SPEC_TYPE);
        write_u16_le(&mut spec, 16);
        write_u32_le(&mut spec, 16 + 3 * 4);
        write_u8(&mut spec, 1); // type id
        write_u8(&mut spec, 0);
        write_u16_le(&mut spec, 0);
        write_u32_le(&mut spec, 3); // entry count
        for _ in 0..3 {
            write_u32_le(&mut spec, 0);
        }

        // Type chunk: header(20) + offsets(3*4) + two 16-byte entries.
        let mut ty = vec![];
        write_u16_le(&mut ty, RES_TABLE_TYPE_TYPE);
        write_u16_le(&mut ty, 20);
        write_u32_le(&mut ty, 0); // patched below
        write_u8(&mut ty, 1); // type id
        write_u8(&mut ty, 0);
        write_u16_le(&mut ty, 0);
        write_u32_le(&mut ty, 3); // entry count
        write_u32_le(&mut ty, 20 + 3 * 4); // entries start
        write_u32_le(&mut ty, 0); // entry 0 offset
        write_u32_le(&mut ty, 16); // entry 1 offset
        write_u32_le(&mut ty, NO_ENTRY); // entry 2 absent
        for (key, value_type, data) in [(0u32, 0x03u8, 0u32), (1, 0x10, 42)] {
            write_u16_le(&mut ty, 8); // entry size
            write_u16_le(&mut ty, 0); // flags (simple)
            write_u32_le(&mut ty, key);
            write_u16_le(&mut ty, 8); // value size
            write_u8(&mut ty, 0);
            write_u8(&mut ty, value_type);
            write_u32_le(&mut ty, data);
        }
        let ty_size = ty.len() as u32;
        patch_u32_le(&mut ty, 4, ty_size).unwrap();

        // Package chunk.
        let mut pkg = vec![];
        write_u16_le(&mut pkg, RES_TABLE_PACKAGE_TYPE);
        write_u16_le(&mut pkg, 288);
        write_u32_le(&mut pkg, 0); // patched below
        write_u32_le(&mut pkg, 0x7f);
        let mut name_field = vec![0u8; 256];
        for (i, unit) in "com.x".encode_utf16().enumerate() {
            name_field[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
        }
        pkg.extend_from_slice(&name_field);
        write_u32_le(&mut pkg, 288); // type strings offset
        write_u32_le(&mut pkg, 0); // last public type
        write_u32_le(&mut pkg, 288 + type_strings.len() as u32); // key strings offset
        write_u32_le(&mut pkg, 0); // last public key
        write_u32_le(&mut pkg, 0); // type id offset
        pkg.extend_from_slice(&type_strings);
        pkg.extend_from_slice(&key_strings);
        pkg.extend_from_slice(&spec);
        pkg.extend_from_slice(&ty);
        let pkg_size = pkg.len() as u32;
        patch_u32_le(&mut pkg, 4, pkg_size).unwrap();

        let mut table = vec![];
        write_u16_le(&mut table, RES_TABLE_TYPE);
        write_u16_le(&mut table, 12);
        write_u32_le(&mut table, 0); // patched below
        write_u32_le(&mut table, 1); // package count
        table.extend_from_slice(&global);
        table.extend_from_slice(&pkg);
        let total = table.len() as u32;
        patch_u32_le(&mut table, 4, total).unwrap();
        table
    }

    #[test]
    fn parses_package_and_entries() {
        let table = ResourceTable::parse(&sample_table()).unwrap();
        assert_eq!(table.package_name(), "com.x");
        assert_eq!(table.package_id(), 0x7f);
        assert_eq!(table.resources().len(), 2);

        let first = &table.resources()[0];
        assert_eq!(first.id, 0x7f010000);
        assert_eq!(first.name, "app_name");
        assert_eq!(first.type_name, "string");
        assert_eq!(first.value, "hello");

        let second = &table.resources()[1];
        assert_eq!(second.id, 0x7f010001);
        assert_eq!(second.name, "count");
        assert_eq!(second.value, "42");
    }

    #[test]
    fn absent_entries_are_skipped() {
        let table = ResourceTable::parse(&sample_table()).unwrap();
        assert!(table.get_resource(0x7f010002).is_none());
    }

    #[test]
    fn search_strings_is_case_insensitive_substring() {
        let table = ResourceTable::parse(&sample_table()).unwrap();
        let hits = table.search_strings("HEL");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, 0);
        assert_eq!(hits[0].value, "hello");
        assert!(table.search_strings("nothing").is_empty());
    }

    #[test]
    fn search_resources_with_type_filter() {
        let table = ResourceTable::parse(&sample_table()).unwrap();
        let by_name = table.search_resources("APP_", "");
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].name, "app_name");

        let by_value = table.search_resources("hello", "string");
        assert_eq!(by_value.len(), 1);

        assert!(table.search_resources("app_name", "drawable").is_empty());
    }

    #[test]
    fn id_lookup_is_direct() {
        let table = ResourceTable::parse(&sample_table()).unwrap();
        let entry = table.get_resource(0x7f010001).unwrap();
        assert_eq!(entry.name, "count");
        assert!(table.get_resource(0x12345678).is_none());
    }

    #[test]
    fn rejects_wrong_magic_and_truncation() {
        assert!(ResourceTable::parse(&[0u8; 4]).is_err());
        let mut bad = sample_table();
        bad[0] = 0x03; // RES_XML_TYPE
        assert!(ResourceTable::parse(&bad).is_err());
        let good = sample_table();
        for cut in [0, 11, 12, 40, good.len() / 2] {
            let _ = ResourceTable::parse(&good[..cut]);
        }
    }

    #[test]
    fn info_tallies_types() {
        let table = ResourceTable::parse(&sample_table()).unwrap();
        let info = table.info();
        assert!(info.contains("Package: com.x"));
        assert!(info.contains("string: 2"));
    }
}
