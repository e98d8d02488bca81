//! Codec for the resource string-pool chunk (type 0x0001) shared by binary
//! XML documents and resource tables.
//!
//! Pools come in two encodings selected by bit 8 of the header flags: UTF-8
//! (set) with separate code-point-count and byte-count length prefixes, and
//! UTF-16LE (clear) with a code-unit count. Reads are tolerant: an entry with
//! a malformed length or body decodes to an empty string so one bad record
//! does not abort the pool.

use byteorder::{ByteOrder, LittleEndian};
use log::warn;

use crate::bytes::{self, OutOfBounds};

pub const RES_STRING_POOL_TYPE: u16 = 0x0001;
pub const UTF8_FLAG: u32 = 1 << 8;

/// An in-memory string pool plus the encoding it was read with. Rebuilding
/// preserves the encoding; strings are append-only so existing indices stay
/// stable.
#[derive(Debug, Clone)]
pub struct StringPool {
    pub strings: Vec<String>,
    pub utf8: bool,
}

impl StringPool {
    pub fn new(utf8: bool) -> Self {
        StringPool {
            strings: Vec::new(),
            utf8,
        }
    }

    pub fn get(&self, idx: u32) -> Option<&str> {
        if idx == u32::MAX {
            return None;
        }
        self.strings.get(idx as usize).map(|s| s.as_str())
    }

    /// Returns the index of `value`, appending it if absent. Never reorders.
    pub fn intern(&mut self, value: &str) -> u32 {
        if let Some(ix) = self.strings.iter().position(|s| s == value) {
            return ix as u32;
        }
        self.strings.push(value.to_string());
        (self.strings.len() - 1) as u32
    }

    pub fn index_of(&self, value: &str) -> Option<u32> {
        self.strings.iter().position(|s| s == value).map(|i| i as u32)
    }

    /// Parses the 0x0001 chunk starting at `chunk_start`. The caller has
    /// already read the chunk header and verified the type.
    pub fn parse(data: &[u8], chunk_start: usize) -> Result<StringPool, OutOfBounds> {
        let mut ix = chunk_start;
        let _chunk_type = bytes::read_u16_le(data, &mut ix)?;
        let header_size = bytes::read_u16_le(data, &mut ix)? as usize;
        let chunk_size = bytes::read_u32_le(data, &mut ix)? as usize;
        let count = bytes::read_u32_le(data, &mut ix)? as usize;
        let _style_count = bytes::read_u32_le(data, &mut ix)?;
        let flags = bytes::read_u32_le(data, &mut ix)?;
        let strings_start = bytes::read_u32_le(data, &mut ix)? as usize;
        let _styles_start = bytes::read_u32_le(data, &mut ix)?;

        let utf8 = flags & UTF8_FLAG != 0;
        let chunk_end = chunk_start.saturating_add(chunk_size).min(data.len());

        // `count` comes from the wire; let the bounds-checked reads fail
        // before any allocation sized by it.
        let mut offsets = Vec::new();
        ix = chunk_start + header_size;
        for _ in 0..count {
            offsets.push(bytes::read_u32_le(data, &mut ix)? as usize);
        }

        let base = chunk_start + strings_start;
        let mut strings = Vec::new();
        for (i, off) in offsets.into_iter().enumerate() {
            let at = base.saturating_add(off);
            let decoded = if utf8 {
                read_utf8_entry(data, at, chunk_end)
            } else {
                read_utf16_entry(data, at, chunk_end)
            };
            match decoded {
                Some(s) => strings.push(s),
                None => {
                    warn!("string pool entry {} is malformed, using empty string", i);
                    strings.push(String::new());
                }
            }
        }

        Ok(StringPool { strings, utf8 })
    }

    /// Re-emits the whole 0x0001 chunk in the pool's original encoding. The
    /// body is padded to a 4-byte boundary and the chunk size patched last.
    pub fn build(&self) -> Vec<u8> {
        let mut body = Vec::new();
        let mut offsets = Vec::with_capacity(self.strings.len());
        for s in &self.strings {
            offsets.push(body.len() as u32);
            if self.utf8 {
                write_utf8_entry(&mut body, s);
            } else {
                write_utf16_entry(&mut body, s);
            }
        }
        bytes::align4(&mut body);

        let header_size: u16 = 28;
        let strings_start = header_size as u32 + self.strings.len() as u32 * 4;

        let mut chunk = Vec::with_capacity(strings_start as usize + body.len());
        bytes::write_u16_le(&mut chunk, RES_STRING_POOL_TYPE);
        bytes::write_u16_le(&mut chunk, header_size);
        bytes::write_u32_le(&mut chunk, 0); // size, patched below
        bytes::write_u32_le(&mut chunk, self.strings.len() as u32);
        bytes::write_u32_le(&mut chunk, 0); // style count
        bytes::write_u32_le(&mut chunk, if self.utf8 { UTF8_FLAG } else { 0 });
        bytes::write_u32_le(&mut chunk, strings_start);
        bytes::write_u32_le(&mut chunk, 0); // styles start
        for off in offsets {
            bytes::write_u32_le(&mut chunk, off);
        }
        chunk.extend_from_slice(&body);
        let size = chunk.len() as u32;
        chunk[4..8].copy_from_slice(&size.to_le_bytes());
        chunk
    }
}

fn read_utf8_length(data: &[u8], ix: &mut usize, limit: usize) -> Option<usize> {
    if *ix >= limit {
        return None;
    }
    let first = data[*ix];
    *ix += 1;
    if first & 0x80 == 0 {
        return Some(first as usize);
    }
    if *ix >= limit {
        return None;
    }
    let second = data[*ix];
    *ix += 1;
    Some((((first & 0x7F) as usize) << 8) | second as usize)
}

fn read_utf8_entry(data: &[u8], offset: usize, limit: usize) -> Option<String> {
    let mut ix = offset;
    let _char_count = read_utf8_length(data, &mut ix, limit)?;
    let byte_len = read_utf8_length(data, &mut ix, limit)?;
    if ix + byte_len > limit {
        return None;
    }
    let slice = &data[ix..ix + byte_len];
    std::str::from_utf8(slice).ok().map(|s| s.to_string())
}

fn read_utf16_entry(data: &[u8], offset: usize, limit: usize) -> Option<String> {
    let mut ix = offset;
    if ix + 2 > limit {
        return None;
    }
    let first = LittleEndian::read_u16(&data[ix..]);
    ix += 2;
    let unit_count = if first & 0x8000 != 0 {
        if ix + 2 > limit {
            return None;
        }
        let second = LittleEndian::read_u16(&data[ix..]);
        ix += 2;
        (((first & 0x7FFF) as usize) << 16) | second as usize
    } else {
        first as usize
    };
    if ix + unit_count * 2 > limit {
        return None;
    }
    let mut units = Vec::with_capacity(unit_count);
    for _ in 0..unit_count {
        units.push(LittleEndian::read_u16(&data[ix..]));
        ix += 2;
    }
    // Surrogate pairs become well-formed UTF-8 here.
    String::from_utf16(&units).ok()
}

fn write_utf8_length(buf: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        buf.push(len as u8);
    } else {
        buf.push(((len >> 8) as u8 & 0x7F) | 0x80);
        buf.push((len & 0xFF) as u8);
    }
}

fn write_utf8_entry(buf: &mut Vec<u8>, s: &str) {
    // First prefix counts Unicode code points, the second counts bytes.
    write_utf8_length(buf, s.chars().count());
    write_utf8_length(buf, s.len());
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

fn write_utf16_entry(buf: &mut Vec<u8>, s: &str) {
    let units: Vec<u16> = s.encode_utf16().collect();
    let len = units.len();
    if len < 0x8000 {
        bytes::write_u16_le(buf, len as u16);
    } else {
        bytes::write_u16_le(buf, 0x8000 | ((len >> 16) as u16 & 0x7FFF));
        bytes::write_u16_le(buf, (len & 0xFFFF) as u16);
    }
    for unit in units {
        bytes::write_u16_le(buf, unit);
    }
    bytes::write_u16_le(buf, 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(utf8: bool, strings: &[&str]) {
        let mut pool = StringPool::new(utf8);
        for s in strings {
            pool.intern(s);
        }
        let chunk = pool.build();
        let parsed = StringPool::parse(&chunk, 0).expect("parse rebuilt pool");
        assert_eq!(parsed.utf8, utf8);
        assert_eq!(parsed.strings, strings);
    }

    #[test]
    fn utf8_pool_roundtrip() {
        roundtrip(true, &["manifest", "package", "com.example.app", ""]);
    }

    #[test]
    fn utf16_pool_roundtrip() {
        roundtrip(false, &["versionName", "1.0", "äöü", "日本語"]);
    }

    #[test]
    fn utf16_surrogate_pairs() {
        roundtrip(false, &["emoji \u{1F600} name"]);
    }

    #[test]
    fn utf8_code_point_prefix_counts_chars_not_bytes() {
        let mut pool = StringPool::new(true);
        pool.intern("äö"); // 2 code points, 4 bytes
        let chunk = pool.build();
        let body_start = 28 + 4;
        assert_eq!(chunk[body_start], 2); // char count
        assert_eq!(chunk[body_start + 1], 4); // byte count
    }

    #[test]
    fn intern_is_append_only() {
        let mut pool = StringPool::new(true);
        let a = pool.intern("a");
        let b = pool.intern("b");
        assert_eq!(pool.intern("a"), a);
        let c = pool.intern("c");
        assert_eq!((a, b, c), (0, 1, 2));
    }

    #[test]
    fn malformed_entry_reads_as_empty() {
        let mut pool = StringPool::new(true);
        pool.intern("good");
        let mut chunk = pool.build();
        // Point the single offset entry past the chunk.
        bytes::patch_u32_le(&mut chunk, 28, 0xFFFF).unwrap();
        let parsed = StringPool::parse(&chunk, 0).unwrap();
        assert_eq!(parsed.strings, vec![String::new()]);
    }
}
