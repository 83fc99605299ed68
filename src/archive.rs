//! Zip archives of analyzer results.
//!
//! Layout:
//!
//! ```text
//! {analyzer}/tablas/{table}.csv
//! {analyzer}/graficos/{chart}.png
//! manifest.json
//! ```
//!
//! `{analyzer}` is the analyzer's namespace (`exploratorio`, `economico`, ...).
//! Table and chart names are sanitized into ASCII path segments. The manifest
//! records provenance and a SHA-256 per entry, checked again on extraction.

pub mod builder;
pub mod manifest;
pub mod naming;
pub mod reader;

use crate::analysis::AnalyzerKind;

pub use builder::{ArchiveMeta, build, table_to_csv};
pub use manifest::{ArchiveManifest, MANIFEST_NAME, ManifestCheck, ManifestEntry};
pub use reader::{ArchiveReader, EntryInfo};

pub const TABLES_DIR: &str = "tablas";
pub const CHARTS_DIR: &str = "graficos";

pub fn table_entry(kind: AnalyzerKind, name: &str) -> String {
    format!(
        "{}/{TABLES_DIR}/{}.csv",
        kind.namespace(),
        naming::sanitize_segment(name)
    )
}

pub fn chart_entry(kind: AnalyzerKind, name: &str) -> String {
    format!(
        "{}/{CHARTS_DIR}/{}.png",
        kind.namespace(),
        naming::sanitize_segment(name)
    )
}
