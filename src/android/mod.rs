//! Android container formats: the APK archive, binary XML and the resource
//! table.

pub mod arsc;
pub mod binary_xml;
pub mod zip;
