use std::path::{Path, PathBuf};

use crate::dataset::{Dataset, LoadOptions};
use crate::error::{GurneyError, Result, ResultExt as _};

/// Loads a source file on the blocking pool.
///
/// # Errors
///
/// Whatever [`Dataset::load`] reports, or [`GurneyError::Other`] when the
/// loader task panicked.
pub async fn acquire_source(path: PathBuf, options: LoadOptions) -> Result<Dataset> {
    tokio::task::spawn_blocking(move || Dataset::load(&path, options))
        .await
        .map_err(|e| GurneyError::Other(format!("Loader task failed: {e}")))?
}

/// Writes an archive to `dest`, appending `.zip` when the name lacks it.
/// Returns the path written.
pub async fn deliver_archive(bytes: &[u8], dest: &Path) -> Result<PathBuf> {
    deliver_file(bytes, &with_extension(dest, "zip")).await
}

/// Writes a PDF report to `dest`, appending `.pdf` when the name lacks it.
pub async fn deliver_report(bytes: &[u8], dest: &Path) -> Result<PathBuf> {
    deliver_file(bytes, &with_extension(dest, "pdf")).await
}

async fn deliver_file(bytes: &[u8], dest: &Path) -> Result<PathBuf> {
    if let Some(parent) = dest.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(dest, bytes)
        .await
        .with_context(|| format!("Failed to write {}", dest.display()))?;
    tracing::info!(path = %dest.display(), bytes = bytes.len(), "File delivered");
    Ok(dest.to_path_buf())
}

/// `path` with `.{ext}` appended unless it already ends in it (any case).
pub fn with_extension(path: &Path, ext: &str) -> PathBuf {
    let has_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext));
    if has_ext {
        return path.to_path_buf();
    }
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_extension() {
        assert_eq!(with_extension(Path::new("out"), "zip"), PathBuf::from("out.zip"));
        assert_eq!(with_extension(Path::new("a/out.ZIP"), "zip"), PathBuf::from("a/out.ZIP"));
        assert_eq!(
            with_extension(Path::new("out.v2"), "zip"),
            PathBuf::from("out.v2.zip")
        );
    }

    #[tokio::test]
    async fn test_deliver_report_creates_parents() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let written = deliver_report(b"%PDF", &dir.path().join("informes").join("enero")).await?;
        assert_eq!(written, dir.path().join("informes").join("enero.pdf"));
        assert_eq!(tokio::fs::read(&written).await?, b"%PDF");
        Ok(())
    }

    #[tokio::test]
    async fn test_acquire_missing_file() {
        let err = acquire_source(PathBuf::from("/nonexistent/egresos.csv"), LoadOptions::default())
            .await
            .expect_err("file does not exist");
        assert!(!matches!(err, GurneyError::Other(_)));
    }
}
