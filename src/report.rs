//! PDF reports from stored analyses.
//!
//! A report is built in three steps: [`extract`] unpacks an analysis archive
//! into a scratch directory and renders its CSV tables to images, a
//! [`ReportComposer`] lays the images out as a PDF, and the PDF is stored in
//! the `reports` table.

pub mod composer;
pub mod extractor;

use chrono::Local;
use std::path::Path;

use crate::analysis::RunContext;
use crate::error::{Result, ResultExt as _};
use crate::store::{RecordKind, RecordStore};

pub use composer::{GenpdfComposer, ReportComposer};
pub use extractor::{ExtractedArtifacts, extract};

pub const DEFAULT_TITLE: &str = "Informe del Análisis";

/// How a report is titled and where its inputs are unpacked.
#[derive(Debug, Clone, Copy)]
pub struct ReportRequest<'a> {
    pub record_id: i64,
    pub owner_id: i64,
    pub scratch_dir: &'a Path,
    /// Prefix of the title; the analysis name follows after a colon
    pub title_prefix: &'a str,
}

/// Composes a PDF from analysis `request.record_id` and stores it for
/// `request.owner_id`. Returns the report id.
///
/// # Errors
///
/// Anything [`extract`] or the composer reports; persistence errors when the
/// PDF cannot be stored.
pub fn compose_report(
    store: &mut RecordStore,
    request: ReportRequest<'_>,
    ctx: RunContext<'_>,
    composer: &dyn ReportComposer,
) -> Result<i64> {
    let artifacts = extract(store, request.record_id, request.scratch_dir, ctx)?;

    let title = format!("{}: {}", request.title_prefix, artifacts.name);
    let pdf = composer
        .compose(&title, &artifacts.report_images())
        .with_context(|| format!("Report for analysis {}", request.record_id))?;

    let name = format!("Informe_{}.pdf", report_stem(&artifacts.name));
    let id = store.store(
        RecordKind::Report,
        request.owner_id,
        &name,
        Local::now().naive_local(),
        &pdf,
    )?;
    tracing::info!(
        report_id = id,
        analysis_id = request.record_id,
        owner_id = request.owner_id,
        bytes = pdf.len(),
        "Report stored"
    );
    Ok(id)
}

/// Analysis name without its file extension.
fn report_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalyzerKind, AnalyzerResult};
    use crate::archive::{self, ArchiveMeta};
    use crate::charts::{Chart, ChartRenderer, ChartTheme};
    use crate::error::GurneyError;
    use chrono::NaiveDate;
    use polars::prelude::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct StubRenderer;

    impl ChartRenderer for StubRenderer {
        fn render(&self, chart: &Chart, _theme: &ChartTheme) -> Result<Vec<u8>> {
            Ok(chart.title.clone().into_bytes())
        }
    }

    #[derive(Default)]
    struct RecordingComposer {
        calls: Mutex<Vec<(String, Vec<PathBuf>)>>,
    }

    impl ReportComposer for RecordingComposer {
        fn compose(&self, title: &str, images: &[PathBuf]) -> Result<Vec<u8>> {
            self.calls
                .lock()
                .map_err(|_| GurneyError::Other("poisoned".to_owned()))?
                .push((title.to_owned(), images.to_vec()));
            Ok(b"%PDF-1.4".to_vec())
        }
    }

    fn stored_analysis(store: &mut RecordStore) -> anyhow::Result<i64> {
        let mut clinical = AnalyzerResult::new();
        clinical.add_table(
            "top_diagnosticos",
            df!("diagnostico" => ["Neumonia, no especificada"], "frecuencia" => [4u64])?,
        )?;
        clinical.add_chart("barras_top_diagnosticos", vec![1, 2, 3])?;
        let mut exploratory = AnalyzerResult::new();
        exploratory.add_chart("histograma_edad", vec![4, 5])?;

        let blob = archive::build(
            &[
                (AnalyzerKind::Exploratory, exploratory),
                (AnalyzerKind::Clinical, clinical),
            ],
            &ArchiveMeta {
                dataset: "egresos.csv".to_owned(),
                dialect: "egresos".to_owned(),
            },
        )?;
        let at = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(9, 0, 0))
            .expect("valid timestamp");
        Ok(store.store(RecordKind::Analysis, 5, "egresos.csv", at, &blob)?)
    }

    #[test]
    fn test_extract_orders_and_renders_tables() -> anyhow::Result<()> {
        let scratch = tempfile::TempDir::new()?;
        let mut store = RecordStore::open_in_memory()?;
        let id = stored_analysis(&mut store)?;
        let theme = ChartTheme::default();
        let ctx = RunContext {
            renderer: &StubRenderer,
            theme: &theme,
        };

        let artifacts = extract(&store, id, scratch.path(), ctx)?;
        let root = scratch.path().join(format!("analysis_{id}"));
        assert_eq!(artifacts.root, root);
        assert_eq!(
            artifacts.images,
            vec![
                root.join("exploratorio/graficos/histograma_edad.png"),
                root.join("clinico/graficos/barras_top_diagnosticos.png"),
            ]
        );
        let table_png = root.join("clinico/tablas/top_diagnosticos.png");
        assert_eq!(artifacts.tables_as_images, vec![table_png.clone()]);
        assert_eq!(std::fs::read(table_png)?, b"top_diagnosticos");
        assert_eq!(artifacts.tables.len(), 1);
        Ok(())
    }

    #[test]
    fn test_compose_report_stores_pdf() -> anyhow::Result<()> {
        let scratch = tempfile::TempDir::new()?;
        let mut store = RecordStore::open_in_memory()?;
        let id = stored_analysis(&mut store)?;
        let theme = ChartTheme::default();
        let composer = RecordingComposer::default();

        let report_id = compose_report(
            &mut store,
            ReportRequest {
                record_id: id,
                owner_id: 9,
                scratch_dir: scratch.path(),
                title_prefix: DEFAULT_TITLE,
            },
            RunContext {
                renderer: &StubRenderer,
                theme: &theme,
            },
            &composer,
        )?;

        assert_eq!(store.fetch(RecordKind::Report, report_id)?, b"%PDF-1.4");
        let reports = store.list_for_owner(RecordKind::Report, 9)?;
        assert_eq!(reports[0].name, "Informe_egresos.pdf");

        let calls = composer.calls.lock().expect("lock");
        let (title, images) = &calls[0];
        assert_eq!(title, "Informe del Análisis: egresos.csv");
        assert_eq!(images.len(), 3);
        assert!(images[2].ends_with("clinico/tablas/top_diagnosticos.png"));
        Ok(())
    }

    #[test]
    fn test_extract_missing_analysis() -> anyhow::Result<()> {
        let scratch = tempfile::TempDir::new()?;
        let store = RecordStore::open_in_memory()?;
        let theme = ChartTheme::default();
        let err = extract(
            &store,
            42,
            scratch.path(),
            RunContext {
                renderer: &StubRenderer,
                theme: &theme,
            },
        )
        .expect_err("nothing stored");
        assert!(matches!(err, GurneyError::NotFound { id: 42, .. }));
        Ok(())
    }
}
