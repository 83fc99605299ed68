use polars::prelude::*;
use std::collections::HashSet;
use std::io::{Cursor, Write as _};
use ::zip::write::SimpleFileOptions;
use ::zip::{CompressionMethod, ZipWriter};

use super::manifest::{ArchiveManifest, MANIFEST_NAME, MANIFEST_VERSION, ManifestEntry, ProducerInfo};
use super::{chart_entry, table_entry};
use crate::analysis::{AnalyzerKind, AnalyzerResult};
use crate::error::{GurneyError, Result, ResultExt as _};

/// Provenance recorded in the manifest.
#[derive(Debug, Clone)]
pub struct ArchiveMeta {
    pub dataset: String,
    pub dialect: String,
}

/// Serializes a table as comma-delimited CSV with a header row.
pub fn table_to_csv(table: &DataFrame) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut table = table.clone();
    CsvWriter::new(&mut buf)
        .include_header(true)
        .with_separator(b',')
        .finish(&mut table)?;
    Ok(buf)
}

/// Packs analyzer results into a zip blob.
///
/// Entries follow `results` order; within an analyzer, tables come before
/// charts, each in insertion order. `manifest.json` is written last.
///
/// # Errors
///
/// [`GurneyError::Archive`] when two entries sanitize to the same path or the
/// zip cannot be written.
pub fn build(results: &[(AnalyzerKind, AnalyzerResult)], meta: &ArchiveMeta) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    let mut write_entry = |zip: &mut ZipWriter<Cursor<Vec<u8>>>, path: String, bytes: &[u8]| -> Result<()> {
        if !seen.insert(path.clone()) {
            return Err(GurneyError::Archive(format!("Duplicate archive entry '{path}'")));
        }
        zip.start_file(path.as_str(), options)?;
        zip.write_all(bytes)
            .with_context(|| format!("Failed to write archive entry '{path}'"))?;
        entries.push(ManifestEntry::for_bytes(path, bytes));
        Ok(())
    };

    for (kind, result) in results {
        for (name, table) in result.tables() {
            let csv = table_to_csv(table).with_context(|| format!("Failed to serialize table '{name}'"))?;
            write_entry(&mut zip, table_entry(*kind, name), &csv)?;
        }
        for (name, png) in result.charts() {
            write_entry(&mut zip, chart_entry(*kind, name), png)?;
        }
    }

    let manifest = ArchiveManifest {
        manifest_version: MANIFEST_VERSION,
        created_utc: chrono::Utc::now(),
        producer: ProducerInfo::current(),
        dataset: meta.dataset.clone(),
        dialect: meta.dialect.clone(),
        analyzers: results.iter().map(|(k, _)| *k).collect(),
        entries,
    };
    let json = serde_json::to_vec_pretty(&manifest)?;
    zip.start_file(MANIFEST_NAME, options)?;
    zip.write_all(&json)?;

    let bytes = zip.finish()?.into_inner();
    tracing::info!(
        dataset = %meta.dataset,
        entries = manifest.entries.len(),
        bytes = bytes.len(),
        "Archive built"
    );
    Ok(bytes)
}
