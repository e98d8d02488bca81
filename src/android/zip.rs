//! ZIP/APK container support.
//!
//! The reader walks the central directory itself (backward EOCD scan, then
//! one record per entry) and inflates DEFLATE entries with flate2. The writer
//! applies the Android packing rules: `resources.arsc` and already-compressed
//! extensions are stored, everything else is deflated only when that is
//! strictly smaller, and every stored entry's data is 4-byte aligned from the
//! archive start by padding the local header's extra field.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use crc32fast::Hasher as Crc32;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use log::{debug, warn};

use crate::bytes::{read_u16_le, read_u32_le, write_u16_le, write_u32_le};

const LOCAL_FILE_HEADER_SIG: u32 = 0x04034b50;
const CENTRAL_DIR_SIG: u32 = 0x02014b50;
const END_CENTRAL_DIR_SIG: u32 = 0x06054b50;

const LOCAL_HEADER_SIZE: usize = 30;
const CENTRAL_DIR_ENTRY_SIZE: usize = 46;
const EOCD_SIZE: usize = 22;

pub const METHOD_STORED: u16 = 0;
pub const METHOD_DEFLATED: u16 = 8;

pub type ZipResult<T> = Result<T, ZipError>;

#[derive(Debug)]
pub enum ZipError {
    Io(io::Error),
    Malformed(String),
    EntryNotFound(String),
}

impl std::fmt::Display for ZipError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZipError::Io(err) => write!(f, "I/O error: {err}"),
            ZipError::Malformed(msg) => write!(f, "malformed archive: {msg}"),
            ZipError::EntryNotFound(name) => write!(f, "no such entry: {name}"),
        }
    }
}

impl std::error::Error for ZipError {}

impl From<io::Error> for ZipError {
    fn from(value: io::Error) -> Self {
        ZipError::Io(value)
    }
}

impl From<crate::bytes::OutOfBounds> for ZipError {
    fn from(value: crate::bytes::OutOfBounds) -> Self {
        ZipError::Malformed(value.to_string())
    }
}

fn deflate_compress(input: &[u8]) -> ZipResult<Vec<u8>> {
    // Raw deflate, no zlib wrapper, maximum level.
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(9));
    encoder.write_all(input)?;
    Ok(encoder.finish()?)
}

fn deflate_decompress(input: &[u8], uncompressed_size: usize) -> ZipResult<Vec<u8>> {
    // The declared size comes from the central directory; cap the hint so a
    // forged header cannot force a huge allocation up front.
    let mut out = Vec::with_capacity(uncompressed_size.min(1 << 20));
    DeflateDecoder::new(input).read_to_end(&mut out)?;
    Ok(out)
}

fn crc32_of(data: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(data);
    hasher.finalize()
}

/// One central-directory record, as read.
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub name: String,
    pub compression_method: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub local_header_offset: u32,
}

/// Read-only view of an archive held in memory.
#[derive(Debug, Default)]
pub struct ZipReader {
    data: Vec<u8>,
    entries: Vec<ZipEntry>,
}

impl ZipReader {
    pub fn open(path: impl AsRef<Path>) -> ZipResult<ZipReader> {
        Self::open_bytes(fs::read(path)?)
    }

    pub fn open_bytes(data: Vec<u8>) -> ZipResult<ZipReader> {
        let mut reader = ZipReader {
            data,
            entries: vec![],
        };
        reader.parse_central_directory()?;
        Ok(reader)
    }

    fn parse_central_directory(&mut self) -> ZipResult<()> {
        if self.data.len() < EOCD_SIZE {
            return Err(ZipError::Malformed("too small for an EOCD record".into()));
        }
        // Scan backwards for the EOCD signature; an archive comment of any
        // length may follow it.
        let mut pos = self.data.len() - EOCD_SIZE;
        loop {
            let mut ix = pos;
            if read_u32_le(&self.data, &mut ix)? == END_CENTRAL_DIR_SIG {
                break;
            }
            if pos == 0 {
                return Err(ZipError::Malformed("end of central directory not found".into()));
            }
            pos -= 1;
        }

        let mut ix = pos + 10;
        let num_entries = read_u16_le(&self.data, &mut ix)?;
        ix = pos + 16;
        let central_dir_offset = read_u32_le(&self.data, &mut ix)? as usize;

        let mut offset = central_dir_offset;
        self.entries.clear();
        for _ in 0..num_entries {
            if offset + CENTRAL_DIR_ENTRY_SIZE > self.data.len() {
                warn!("central directory truncated at {} entries", self.entries.len());
                break;
            }
            let mut ix = offset;
            if read_u32_le(&self.data, &mut ix)? != CENTRAL_DIR_SIG {
                warn!("central directory signature missing at offset {}", offset);
                break;
            }
            ix = offset + 10;
            let compression_method = read_u16_le(&self.data, &mut ix)?;
            ix = offset + 16;
            let crc32 = read_u32_le(&self.data, &mut ix)?;
            let compressed_size = read_u32_le(&self.data, &mut ix)?;
            let uncompressed_size = read_u32_le(&self.data, &mut ix)?;
            let name_len = read_u16_le(&self.data, &mut ix)? as usize;
            let extra_len = read_u16_le(&self.data, &mut ix)? as usize;
            let comment_len = read_u16_le(&self.data, &mut ix)? as usize;
            ix = offset + 42;
            let local_header_offset = read_u32_le(&self.data, &mut ix)?;

            let total = CENTRAL_DIR_ENTRY_SIZE + name_len + extra_len + comment_len;
            if offset + total > self.data.len() {
                warn!("central directory entry overruns the buffer");
                break;
            }
            let name = String::from_utf8_lossy(
                &self.data[offset + CENTRAL_DIR_ENTRY_SIZE..offset + CENTRAL_DIR_ENTRY_SIZE + name_len],
            )
            .into_owned();

            self.entries.push(ZipEntry {
                name,
                compression_method,
                crc32,
                compressed_size,
                uncompressed_size,
                local_header_offset,
            });
            offset += total;
        }
        debug!("archive lists {} entries", self.entries.len());
        Ok(())
    }

    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    pub fn list(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Follows the entry's local header and returns the uncompressed data.
    pub fn extract(&self, name: &str) -> ZipResult<Vec<u8>> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| ZipError::EntryNotFound(name.to_string()))?;

        let offset = entry.local_header_offset as usize;
        let mut ix = offset;
        if read_u32_le(&self.data, &mut ix)? != LOCAL_FILE_HEADER_SIG {
            return Err(ZipError::Malformed(format!(
                "bad local header for entry {}",
                name
            )));
        }
        ix = offset + 26;
        let name_len = read_u16_le(&self.data, &mut ix)? as usize;
        let extra_len = read_u16_le(&self.data, &mut ix)? as usize;
        let data_offset = offset + LOCAL_HEADER_SIZE + name_len + extra_len;
        let end = data_offset + entry.compressed_size as usize;
        if end > self.data.len() {
            return Err(ZipError::Malformed(format!("entry {} overruns archive", name)));
        }
        let raw = &self.data[data_offset..end];
        match entry.compression_method {
            METHOD_STORED => Ok(raw.to_vec()),
            METHOD_DEFLATED => deflate_decompress(raw, entry.uncompressed_size as usize),
            other => Err(ZipError::Malformed(format!(
                "unsupported compression method {} for entry {}",
                other, name
            ))),
        }
    }
}

/// Extensions that are already compressed; deflating them again wastes CPU
/// and can grow the file.
const STORE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "mp3", "ogg", "m4a", "aac", "flac", "mp4", "webm", "3gp",
    "zip", "jar", "apk", "arsc", "so",
];

fn should_store(name: &str) -> bool {
    // resources.arsc must be stored so Android can mmap it.
    if name == "resources.arsc" {
        return true;
    }
    let Some(dot) = name.rfind('.') else {
        return false;
    };
    let ext = name[dot + 1..].to_ascii_lowercase();
    STORE_EXTENSIONS.contains(&ext.as_str())
}

#[derive(Debug)]
struct PendingEntry {
    name: String,
    payload: Vec<u8>,
    uncompressed_size: u32,
    crc32: u32,
    method: u16,
    local_header_offset: u32,
}

/// Streams entries into an in-memory archive image.
#[derive(Debug, Default)]
pub struct ZipWriter {
    entries: Vec<PendingEntry>,
}

impl ZipWriter {
    pub fn new() -> Self {
        ZipWriter::default()
    }

    /// Adds a file under the compression policy: forced STORE for the
    /// store-list, otherwise DEFLATE if and only if it is strictly smaller.
    pub fn add_file(&mut self, name: &str, data: &[u8]) -> ZipResult<()> {
        if should_store(name) {
            self.add_stored(name, data);
            return Ok(());
        }
        if !data.is_empty() {
            let compressed = deflate_compress(data)?;
            if compressed.len() < data.len() {
                self.entries.push(PendingEntry {
                    name: name.to_string(),
                    payload: compressed,
                    uncompressed_size: data.len() as u32,
                    crc32: crc32_of(data),
                    method: METHOD_DEFLATED,
                    local_header_offset: 0,
                });
                return Ok(());
            }
        }
        self.add_stored(name, data);
        Ok(())
    }

    pub fn add_stored(&mut self, name: &str, data: &[u8]) {
        self.entries.push(PendingEntry {
            name: name.to_string(),
            payload: data.to_vec(),
            uncompressed_size: data.len() as u32,
            crc32: crc32_of(data),
            method: METHOD_STORED,
            local_header_offset: 0,
        });
    }

    pub fn save(&mut self, path: impl AsRef<Path>) -> ZipResult<()> {
        let data = self.finalize();
        fs::write(path, data)?;
        Ok(())
    }

    /// Emits local headers, the central directory in insertion order, and the
    /// EOCD. Stored entries get zero-byte extra-field padding so their data
    /// starts at a 4-byte boundary.
    pub fn finalize(&mut self) -> Vec<u8> {
        let mut out = Vec::new();

        for entry in &mut self.entries {
            let offset = out.len() as u32;
            let extra_len = if entry.method == METHOD_STORED {
                let data_start = offset as usize + LOCAL_HEADER_SIZE + entry.name.len();
                ((4 - (data_start % 4)) % 4) as u16
            } else {
                0
            };
            entry.local_header_offset = offset;

            write_u32_le(&mut out, LOCAL_FILE_HEADER_SIG);
            write_u16_le(&mut out, 20); // version needed
            write_u16_le(&mut out, 0); // flags
            write_u16_le(&mut out, entry.method);
            write_u16_le(&mut out, 0); // mod time
            write_u16_le(&mut out, 0); // mod date
            write_u32_le(&mut out, entry.crc32);
            write_u32_le(&mut out, entry.payload.len() as u32);
            write_u32_le(&mut out, entry.uncompressed_size);
            write_u16_le(&mut out, entry.name.len() as u16);
            write_u16_le(&mut out, extra_len);
            out.extend_from_slice(entry.name.as_bytes());
            out.extend(std::iter::repeat(0u8).take(extra_len as usize));
            out.extend_from_slice(&entry.payload);
        }

        let central_dir_offset = out.len() as u32;
        for entry in &self.entries {
            write_u32_le(&mut out, CENTRAL_DIR_SIG);
            write_u16_le(&mut out, 20); // version made by
            write_u16_le(&mut out, 20); // version needed
            write_u16_le(&mut out, 0); // flags
            write_u16_le(&mut out, entry.method);
            write_u16_le(&mut out, 0); // mod time
            write_u16_le(&mut out, 0); // mod date
            write_u32_le(&mut out, entry.crc32);
            write_u32_le(&mut out, entry.payload.len() as u32);
            write_u32_le(&mut out, entry.uncompressed_size);
            write_u16_le(&mut out, entry.name.len() as u16);
            write_u16_le(&mut out, 0); // extra len
            write_u16_le(&mut out, 0); // comment len
            write_u16_le(&mut out, 0); // disk number
            write_u16_le(&mut out, 0); // internal attrs
            write_u32_le(&mut out, 0); // external attrs
            write_u32_le(&mut out, entry.local_header_offset);
            out.extend_from_slice(entry.name.as_bytes());
        }
        let central_dir_size = out.len() as u32 - central_dir_offset;

        write_u32_le(&mut out, END_CENTRAL_DIR_SIG);
        write_u16_le(&mut out, 0); // disk number
        write_u16_le(&mut out, 0); // central dir disk
        write_u16_le(&mut out, self.entries.len() as u16);
        write_u16_le(&mut out, self.entries.len() as u16);
        write_u32_le(&mut out, central_dir_size);
        write_u32_le(&mut out, central_dir_offset);
        write_u16_le(&mut out, 0); // comment len

        out
    }
}

/// A whole APK held in memory, entries in insertion order. Mutations work on
/// the decompressed payloads; compression decisions are re-applied on save.
#[derive(Debug, Default)]
pub struct ApkFile {
    entries: Vec<(String, Vec<u8>)>,
}

impl ApkFile {
    pub fn new() -> Self {
        ApkFile::default()
    }

    pub fn open(path: impl AsRef<Path>) -> ZipResult<ApkFile> {
        Self::from_bytes(fs::read(path)?)
    }

    pub fn from_bytes(data: Vec<u8>) -> ZipResult<ApkFile> {
        let reader = ZipReader::open_bytes(data)?;
        let mut apk = ApkFile::new();
        for entry in reader.entries() {
            if entry.name.ends_with('/') {
                continue;
            }
            match reader.extract(&entry.name) {
                Ok(data) => apk.entries.push((entry.name.clone(), data)),
                Err(e) => warn!("skipping unreadable entry {}: {}", entry.name, e),
            }
        }
        Ok(apk)
    }

    pub fn entry_names(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn entry(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d.as_slice())
    }

    /// Replaces an existing entry's contents.
    pub fn replace_entry(&mut self, name: &str, data: Vec<u8>) -> bool {
        for (n, d) in &mut self.entries {
            if n == name {
                *d = data;
                return true;
            }
        }
        false
    }

    /// Adds a new entry; refuses duplicates.
    pub fn add_entry(&mut self, name: &str, data: Vec<u8>) -> bool {
        if self.entries.iter().any(|(n, _)| n == name) {
            return false;
        }
        self.entries.push((name.to_string(), data));
        true
    }

    pub fn remove_entry(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| n != name);
        self.entries.len() != before
    }

    /// Removes every entry whose name contains `pattern`.
    pub fn remove_matching(&mut self, pattern: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| !n.contains(pattern));
        before - self.entries.len()
    }

    pub fn to_bytes(&self) -> ZipResult<Vec<u8>> {
        let mut writer = ZipWriter::new();
        for (name, data) in &self.entries {
            writer.add_file(name, data)?;
        }
        Ok(writer.finalize())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> ZipResult<()> {
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_roundtrip() {
        let png: Vec<u8> = (0..100u8).collect();
        let txt = vec![b'a'; 1000];

        let mut writer = ZipWriter::new();
        writer.add_file("a.png", &png).unwrap();
        writer.add_file("b.txt", &txt).unwrap();
        let archive = writer.finalize();

        let reader = ZipReader::open_bytes(archive).unwrap();
        assert_eq!(reader.list(), vec!["a.png", "b.txt"]);

        let png_entry = &reader.entries()[0];
        assert_eq!(png_entry.compression_method, METHOD_STORED);
        let txt_entry = &reader.entries()[1];
        assert_eq!(txt_entry.compression_method, METHOD_DEFLATED);
        assert!(txt_entry.compressed_size < 100);

        assert_eq!(reader.extract("a.png").unwrap(), png);
        assert_eq!(reader.extract("b.txt").unwrap(), txt);
        assert!(reader.extract("missing").is_err());
    }

    #[test]
    fn stored_entries_are_word_aligned() {
        let mut writer = ZipWriter::new();
        writer.add_file("x.txt", &vec![b'z'; 400]).unwrap(); // deflated
        writer.add_file("odd.png", &[1, 2, 3]).unwrap();
        writer.add_file("resources.arsc", &[9; 40]).unwrap();
        let archive = writer.finalize();

        let reader = ZipReader::open_bytes(archive.clone()).unwrap();
        for entry in reader.entries() {
            if entry.compression_method != METHOD_STORED {
                continue;
            }
            let off = entry.local_header_offset as usize;
            let mut ix = off + 26;
            let name_len = read_u16_le(&archive, &mut ix).unwrap() as usize;
            let extra_len = read_u16_le(&archive, &mut ix).unwrap() as usize;
            let data_start = off + LOCAL_HEADER_SIZE + name_len + extra_len;
            assert_eq!(data_start % 4, 0, "entry {} misaligned", entry.name);
        }
    }

    #[test]
    fn incompressible_data_falls_back_to_store() {
        // 64 distinct bytes do not deflate smaller than the raw form.
        let noise: Vec<u8> = (0..64u8).map(|i| i.wrapping_mul(37).wrapping_add(101)).collect();
        let mut writer = ZipWriter::new();
        writer.add_file("noise.bin", &noise).unwrap();
        let archive = writer.finalize();
        let reader = ZipReader::open_bytes(archive).unwrap();
        assert_eq!(reader.entries()[0].compression_method, METHOD_STORED);
        assert_eq!(reader.extract("noise.bin").unwrap(), noise);
    }

    #[test]
    fn store_list_is_case_insensitive() {
        assert!(should_store("res/drawable/icon.PNG"));
        assert!(should_store("lib/arm64-v8a/libfoo.so"));
        assert!(should_store("resources.arsc"));
        assert!(!should_store("classes.dex"));
        assert!(!should_store("assets/data.json"));
    }

    #[test]
    fn eocd_found_with_trailing_comment() {
        let mut writer = ZipWriter::new();
        writer.add_file("a.txt", b"hello hello hello hello").unwrap();
        let mut archive = writer.finalize();
        // Forge a comment after the EOCD; the backward scan must still land
        // on the signature.
        let comment = b"trailing junk";
        let eocd_comment_len = archive.len() - 2;
        archive[eocd_comment_len..].copy_from_slice(&(comment.len() as u16).to_le_bytes());
        archive.extend_from_slice(comment);
        let reader = ZipReader::open_bytes(archive).unwrap();
        assert_eq!(reader.list(), vec!["a.txt"]);
    }

    #[test]
    fn apk_file_edit_cycle() {
        let mut writer = ZipWriter::new();
        writer.add_file("AndroidManifest.xml", b"manifest-bytes-manifest-bytes").unwrap();
        writer.add_file("classes.dex", b"dex-bytes").unwrap();
        let archive = writer.finalize();

        let mut apk = ApkFile::from_bytes(archive).unwrap();
        assert_eq!(apk.entry_names().len(), 2);
        assert!(apk.replace_entry("classes.dex", b"new-dex".to_vec()));
        assert!(!apk.replace_entry("nope", vec![]));
        assert!(apk.add_entry("assets/extra.txt", b"x".to_vec()));
        assert!(!apk.add_entry("assets/extra.txt", b"y".to_vec()));
        assert!(apk.remove_entry("AndroidManifest.xml"));

        let rebuilt = apk.to_bytes().unwrap();
        let again = ApkFile::from_bytes(rebuilt).unwrap();
        assert_eq!(again.entry("classes.dex"), Some(&b"new-dex"[..]));
        assert_eq!(again.entry("assets/extra.txt"), Some(&b"x"[..]));
        assert!(again.entry("AndroidManifest.xml").is_none());
    }
}
