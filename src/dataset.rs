//! Dataset loading.
//!
//! A [`Dataset`] is a named polars `DataFrame` exactly as read from the source
//! file. Typing happens later in [`crate::schema::validate`]; loading only
//! decides how to read bytes into columns.

pub mod spreadsheet;

use anyhow::Context as _;
use polars::prelude::*;
use std::path::Path;

use crate::error::{GurneyError, Result};

/// Options for reading a source file.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Zero-based row holding the column labels in spreadsheets.
    pub header_row: usize,
    /// Rows used by the CSV reader to infer column types.
    pub infer_schema_length: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            header_row: 0,
            infer_schema_length: 10_000,
        }
    }
}

/// Source file formats gurney reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Spreadsheet,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Some(Self::Spreadsheet),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dataset {
    name: String,
    frame: DataFrame,
}

impl Dataset {
    pub fn from_frame(name: impl Into<String>, frame: DataFrame) -> Self {
        Self {
            name: name.into(),
            frame,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn labels(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .map(|n| n.to_string())
            .collect()
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// Loads a CSV or spreadsheet file.
    ///
    /// # Errors
    ///
    /// Fails on unknown extensions, unreadable files and files without a
    /// header row.
    pub fn load(path: &Path, options: LoadOptions) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_owned());

        let format = SourceFormat::from_path(path).ok_or_else(|| {
            GurneyError::InvalidPath(format!(
                "Unsupported file type: {} (expected .csv or a spreadsheet)",
                path.display()
            ))
        })?;

        let frame = match format {
            SourceFormat::Csv => load_csv(path, options)?,
            SourceFormat::Spreadsheet => spreadsheet::load_sheet(path, options.header_row)?,
        };

        tracing::info!(
            path = %path.display(),
            rows = frame.height(),
            columns = frame.width(),
            "Dataset loaded"
        );
        Ok(Self::from_frame(name, frame))
    }
}

fn load_csv(path: &Path, options: LoadOptions) -> Result<DataFrame> {
    let frame = LazyCsvReader::new(path)
        .with_infer_schema_length(Some(options.infer_schema_length))
        .with_has_header(true)
        .finish()
        .and_then(LazyFrame::collect)
        .with_context(|| format!("Failed to read CSV {}", path.display()))?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_detection() {
        assert_eq!(
            SourceFormat::from_path(Path::new("a/b/Egresos.XLSX")),
            Some(SourceFormat::Spreadsheet)
        );
        assert_eq!(SourceFormat::from_path(Path::new("x.csv")), Some(SourceFormat::Csv));
        assert_eq!(SourceFormat::from_path(Path::new("x.parquet")), None);
    }

    #[test]
    fn test_load_csv() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("egresos.csv");
        std::fs::write(
            &path,
            "Fecha Egreso,Edad en Años,DG01 principal (descripcion),Valor a Pagar\n\
             2023-01-01,40,Neumonia,1200\n\
             2023-02-01,65,Fractura,800\n",
        )?;

        let dataset = Dataset::load(&path, LoadOptions::default())?;
        assert_eq!(dataset.name(), "egresos.csv");
        assert_eq!(dataset.height(), 2);
        assert_eq!(dataset.labels().len(), 4);
        Ok(())
    }

    #[test]
    fn test_rejects_unknown_extension() {
        let err = Dataset::load(Path::new("data.json"), LoadOptions::default())
            .expect_err("json is not a supported source");
        assert!(matches!(err, GurneyError::InvalidPath(_)));
    }
}
