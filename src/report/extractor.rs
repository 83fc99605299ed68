use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

use crate::analysis::{AnalyzerKind, RunContext};
use crate::archive::{ArchiveReader, CHARTS_DIR, TABLES_DIR};
use crate::charts::{Chart, ChartData};
use crate::error::{GurneyError, Result, ResultExt as _};
use crate::store::{RecordKind, RecordStore};

/// Files unpacked from a stored analysis, grouped by what they are.
///
/// Each list is ordered by analyzer (archive order) and then by file name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedArtifacts {
    pub record_id: i64,
    /// Name the analysis was stored under
    pub name: String,
    /// `scratch_dir/analysis_{id}`
    pub root: PathBuf,
    /// Chart PNGs
    pub images: Vec<PathBuf>,
    /// Table PNGs, either shipped in the archive or rendered from the CSVs
    pub tables_as_images: Vec<PathBuf>,
    /// Table CSVs
    pub tables: Vec<PathBuf>,
}

impl ExtractedArtifacts {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.tables_as_images.is_empty() && self.tables.is_empty()
    }

    /// Pages of a report: charts first, then tables.
    pub fn report_images(&self) -> Vec<PathBuf> {
        self.images
            .iter()
            .chain(&self.tables_as_images)
            .cloned()
            .collect()
    }
}

/// Unpacks analysis `record_id` into `scratch_dir/analysis_{id}/` and collects
/// its charts and tables, rendering every CSV table to a PNG beside it.
///
/// # Errors
///
/// - [`GurneyError::NotFound`] when the analysis does not exist.
/// - [`GurneyError::Archive`] when the blob is not a zip, an entry would
///   escape the scratch directory, or an entry fails its manifest checksum.
/// - [`GurneyError::EmptyResult`] when the archive holds no charts or tables.
pub fn extract(
    store: &RecordStore,
    record_id: i64,
    scratch_dir: &Path,
    ctx: RunContext<'_>,
) -> Result<ExtractedArtifacts> {
    let record = store.fetch_record(RecordKind::Analysis, record_id)?;
    let mut reader = ArchiveReader::from_bytes(record.blob)
        .with_context(|| format!("Analysis {record_id}"))?;

    let check = reader.verify()?;
    if !check.is_ok() {
        return Err(GurneyError::Archive(format!(
            "Analysis {record_id} failed verification (mismatched: [{}], missing: [{}])",
            check.mismatched.join(", "),
            check.missing.join(", ")
        )));
    }

    let root = scratch_dir.join(format!("analysis_{record_id}"));
    if root.exists() {
        fs::remove_dir_all(&root)
            .with_context(|| format!("Failed to clear {}", root.display()))?;
    }
    reader.extract_to(&root)?;

    let mut artifacts = ExtractedArtifacts {
        record_id,
        name: record.name,
        root: root.clone(),
        ..ExtractedArtifacts::default()
    };

    for kind in AnalyzerKind::ALL {
        let dir = root.join(kind.namespace());
        artifacts
            .images
            .extend(files_with_extension(&dir.join(CHARTS_DIR), "png")?);

        let tables_dir = dir.join(TABLES_DIR);
        let csvs = files_with_extension(&tables_dir, "csv")?;
        for csv in &csvs {
            let png = csv.with_extension("png");
            if !png.exists() {
                render_table(csv, &png, ctx)?;
            }
        }
        artifacts
            .tables_as_images
            .extend(files_with_extension(&tables_dir, "png")?);
        artifacts.tables.extend(csvs);
    }

    if artifacts.images.is_empty() && artifacts.tables_as_images.is_empty() {
        return Err(GurneyError::EmptyResult { record_id });
    }

    tracing::info!(
        record_id,
        charts = artifacts.images.len(),
        tables = artifacts.tables.len(),
        table_images = artifacts.tables_as_images.len(),
        root = %root.display(),
        "Analysis extracted"
    );
    Ok(artifacts)
}

/// Files in `dir` ending in `.{ext}`, sorted by file name. A missing
/// directory has none.
fn files_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ext));
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn render_table(csv: &Path, png: &Path, ctx: RunContext<'_>) -> Result<()> {
    let frame = LazyCsvReader::new(csv)
        .with_has_header(true)
        .finish()
        .and_then(LazyFrame::collect)
        .with_context(|| format!("Failed to read table {}", csv.display()))?;

    let title = csv
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let chart = Chart::new(title, table_data(&frame));
    let bytes = ctx.renderer.render(&chart, ctx.theme)?;
    fs::write(png, bytes).with_context(|| format!("Failed to write {}", png.display()))?;
    tracing::debug!(table = %csv.display(), "Table rendered");
    Ok(())
}

fn table_data(frame: &DataFrame) -> ChartData {
    let headers = frame
        .get_column_names()
        .into_iter()
        .map(|n| n.to_string())
        .collect();
    let rows = (0..frame.height())
        .map(|i| {
            frame
                .get_columns()
                .iter()
                .map(|c| c.get(i).map(|v| cell_text(&v)).unwrap_or_default())
                .collect()
        })
        .collect();
    ChartData::Table { headers, rows }
}

fn cell_text(value: &AnyValue<'_>) -> String {
    match value {
        AnyValue::Null => String::new(),
        AnyValue::String(s) => (*s).to_owned(),
        AnyValue::StringOwned(s) => s.to_string(),
        AnyValue::Float64(v) => crate::utils::fmt_opt(Some(*v)),
        AnyValue::Float32(v) => crate::utils::fmt_opt(Some(f64::from(*v))),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_data_formats_cells() -> anyhow::Result<()> {
        let frame = df!(
            "diagnostico" => [Some("Neumonia"), None],
            "estancia_promedio" => [4.256, 2.0],
            "frecuencia" => [3u64, 1]
        )?;
        let ChartData::Table { headers, rows } = table_data(&frame) else {
            anyhow::bail!("expected a table");
        };
        assert_eq!(headers, vec!["diagnostico", "estancia_promedio", "frecuencia"]);
        assert_eq!(rows[0], vec!["Neumonia", "4.26", "3"]);
        assert_eq!(rows[1], vec!["", "2.00", "1"]);
        Ok(())
    }

    #[test]
    fn test_files_sorted_and_filtered() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        for name in ["b.png", "a.png", "c.csv", "notes.txt"] {
            fs::write(dir.path().join(name), b"x")?;
        }
        let pngs = files_with_extension(dir.path(), "png")?;
        let names: Vec<_> = pngs
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.png", "b.png"]);
        assert!(files_with_extension(&dir.path().join("absent"), "png")?.is_empty());
        Ok(())
    }
}
