//! # apkedit
//!
//! Read, analyze and rewrite the binary containers of Android application
//! packages: Dalvik executables (DEX), compiled binary XML (AXML), compiled
//! resource tables (ARSC) and the enclosing ZIP/APK archive.
//!
//! The crate is stateless between calls: every public entry point takes a
//! byte buffer, builds a local parser/editor/builder, and returns a result or
//! a fresh buffer. Mutations never touch their input.
//!
//! ```no_run
//! use apkedit::android::zip::ApkFile;
//! use apkedit::ops;
//!
//! let apk = ApkFile::open("app.apk").unwrap();
//! let dex = apk.entry("classes.dex").unwrap();
//! let info = ops::dex_info(dex).unwrap();
//! println!("{} classes", info.classes_count);
//! ```

pub mod android;
pub mod bytes;
pub mod dex;
pub mod ops;
pub mod smali_java;
pub mod strpool;

pub use android::arsc::ResourceTable;
pub use android::binary_xml::{AxmlDocument, AxmlEditor};
pub use android::zip::{ApkFile, ZipReader, ZipWriter};
pub use dex::{Assembler, DexBuilder, DexFile, Disassembler};
