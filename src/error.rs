//! Centralized error handling for gurney.
//!
//! Every fallible public operation returns [`Result`], whose error side is
//! [`GurneyError`]. Variants are grouped by the component that raises them so
//! callers can react to the category without parsing messages:
//!
//! ```
//! use gurney::error::GurneyError;
//!
//! fn describe(err: &GurneyError) -> &'static str {
//!     match err {
//!         GurneyError::Schema { .. } => "dataset does not match any known layout",
//!         GurneyError::NotFound { .. } => "no such record",
//!         GurneyError::EmptyResult { .. } => "archive holds nothing to report",
//!         _ => "other failure",
//!     }
//! }
//! ```
//!
//! Third-party errors convert through `From`, so `?` works directly on polars,
//! rusqlite, zip and I/O results. [`ResultExt`] adds a `.context()` prefix in
//! the same spirit as `anyhow::Context`.

use std::fmt;

/// Main error type for gurney operations.
#[derive(Debug)]
pub enum GurneyError {
    /// No schema dialect matched. `missing` lists the labels the closest
    /// dialect still needs, in that dialect's declared order.
    Schema {
        dialect: String,
        missing: Vec<String>,
    },

    /// A single analyzer stage failed while computing its outputs.
    AnalyzerComputation {
        analyzer: String,
        stage_index: usize,
        stage: String,
        message: String,
    },

    /// A progress tick arrived after the run had already consumed every step.
    ProgressOverflow { current: usize, total: usize },

    /// Row-store failures (SQLite).
    Persistence(String),

    /// The requested record does not exist.
    NotFound { kind: String, id: i64 },

    /// An archive was extracted but contained neither charts nor tables.
    EmptyResult { record_id: i64 },

    /// Zip packing, unpacking or manifest verification errors
    Archive(String),

    /// Chart rendering errors
    Chart(String),

    /// PDF composition errors
    Report(String),

    /// I/O errors (file operations)
    Io(std::io::Error),

    /// Data processing errors (Polars, spreadsheet parsing, etc.)
    DataProcessing(String),

    /// Configuration errors
    Config(String),

    /// File not found or invalid path
    InvalidPath(String),

    /// Operation aborted by user
    Aborted,

    /// Generic error with context
    Other(String),
}

impl fmt::Display for GurneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schema { dialect, missing } => write!(
                f,
                "Dataset does not match a known layout (closest: '{dialect}'). Missing columns: {}",
                missing.join(", ")
            ),
            Self::AnalyzerComputation {
                analyzer,
                stage_index,
                stage,
                message,
            } => write!(
                f,
                "Analyzer '{analyzer}' failed at stage {stage_index} ('{stage}'): {message}"
            ),
            Self::ProgressOverflow { current, total } => write!(
                f,
                "Progress overflow: step {} reported but the run only declared {total}",
                current + 1
            ),
            Self::Persistence(msg) => write!(f, "Persistence error: {msg}"),
            Self::NotFound { kind, id } => write!(f, "No {kind} record with id {id}"),
            Self::EmptyResult { record_id } => write!(
                f,
                "Analysis {record_id} contains no charts or tables to report"
            ),
            Self::Archive(msg) => write!(f, "Archive error: {msg}"),
            Self::Chart(msg) => write!(f, "Chart rendering error: {msg}"),
            Self::Report(msg) => write!(f, "Report composition error: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::DataProcessing(msg) => write!(f, "Data processing error: {msg}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::InvalidPath(msg) => write!(f, "Invalid path: {msg}"),
            Self::Aborted => write!(f, "Operation aborted by user"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for GurneyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for GurneyError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<anyhow::Error> for GurneyError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(format!("{err:#}"))
    }
}

impl From<serde_json::Error> for GurneyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("JSON error: {err}"))
    }
}

impl From<polars::error::PolarsError> for GurneyError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::DataProcessing(err.to_string())
    }
}

impl From<calamine::Error> for GurneyError {
    fn from(err: calamine::Error) -> Self {
        Self::DataProcessing(format!("Spreadsheet error: {err}"))
    }
}

impl From<rusqlite::Error> for GurneyError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<zip::result::ZipError> for GurneyError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}

// Shell integrations (CLI output, JSON bridges) want plain strings
impl From<GurneyError> for String {
    fn from(err: GurneyError) -> Self {
        err.to_string()
    }
}

/// Result type alias for gurney operations.
pub type Result<T> = std::result::Result<T, GurneyError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<GurneyError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| wrap(e.into(), msg.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| wrap(e.into(), f()))
    }
}

/// Prefixes the message while keeping the category of variants callers match on.
fn wrap(err: GurneyError, msg: String) -> GurneyError {
    match err {
        GurneyError::Persistence(inner) => GurneyError::Persistence(format!("{msg}: {inner}")),
        GurneyError::Archive(inner) => GurneyError::Archive(format!("{msg}: {inner}")),
        GurneyError::DataProcessing(inner) => {
            GurneyError::DataProcessing(format!("{msg}: {inner}"))
        }
        GurneyError::Chart(inner) => GurneyError::Chart(format!("{msg}: {inner}")),
        GurneyError::Report(inner) => GurneyError::Report(format!("{msg}: {inner}")),
        structured @ (GurneyError::Schema { .. }
        | GurneyError::AnalyzerComputation { .. }
        | GurneyError::ProgressOverflow { .. }
        | GurneyError::NotFound { .. }
        | GurneyError::EmptyResult { .. }
        | GurneyError::Aborted) => structured,
        other => GurneyError::Other(format!("{msg}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GurneyError::DataProcessing("column not found".to_owned());
        assert_eq!(err.to_string(), "Data processing error: column not found");
    }

    #[test]
    fn test_schema_error_lists_missing_columns() {
        let err = GurneyError::Schema {
            dialect: "egresos".to_owned(),
            missing: vec!["Valor a Pagar".to_owned(), "Edad en años".to_owned()],
        };
        let msg = err.to_string();
        assert!(msg.contains("egresos"));
        assert!(msg.ends_with("Valor a Pagar, Edad en años"));
    }

    #[test]
    fn test_error_conversion_to_string() {
        let err = GurneyError::Aborted;
        let s: String = err.into();
        assert_eq!(s, "Operation aborted by user");
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file.txt",
        ));

        let result: Result<()> = result.context("Failed to read file");
        assert!(
            result
                .expect_err("context keeps the error")
                .to_string()
                .contains("Failed to read file")
        );
    }

    #[test]
    fn test_context_keeps_not_found_variant() {
        let result: Result<()> = Err(GurneyError::NotFound {
            kind: "analysis".to_owned(),
            id: 7,
        });
        let err = result.context("Fetching analysis").expect_err("still an error");
        assert!(matches!(err, GurneyError::NotFound { id: 7, .. }));
    }
}
