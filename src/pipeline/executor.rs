use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::analysis::{AnalyzerKind, AnalyzerResult, ProgressAggregator, RunContext};
use crate::archive::{self, ArchiveMeta};
use crate::dataset::Dataset;
use crate::error::{GurneyError, Result};
use crate::schema::{self, DataCoercionWarning, ValidatedDataset};
use crate::store::{RecordKind, RecordStore};
use crate::utils::CancelFlag;

/// How one analyzer fared in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyzerOutcome {
    pub kind: AnalyzerKind,
    /// Stages that produced output
    pub ticks: usize,
    pub declared: usize,
    /// Stages whose fields resolved on this dataset
    pub planned: usize,
    /// Stages skipped for missing fields or empty input
    pub skipped: Vec<String>,
    /// Set when the analyzer failed; its outputs are not archived
    pub error: Option<String>,
}

impl AnalyzerOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub dataset: String,
    pub dialect: String,
    pub rows: usize,

    /// One entry per requested analyzer, in run order
    pub outcomes: Vec<AnalyzerOutcome>,

    /// Values that could not be coerced to their field's type
    pub coercions: Vec<DataCoercionWarning>,

    /// Progress total (sum of declared steps)
    pub total_steps: usize,

    /// Progress steps actually reported
    pub completed_steps: usize,

    /// Time taken for execution
    pub duration: Duration,
}

impl RunReport {
    pub fn failed(&self) -> Vec<AnalyzerKind> {
        self.outcomes
            .iter()
            .filter(|o| !o.succeeded())
            .map(|o| o.kind)
            .collect()
    }

    /// Create a summary message
    pub fn summary(&self) -> String {
        let failed = self.failed();
        format!(
            "Analysis of '{}' ({}, {} rows): {}/{} analyzers succeeded, {}/{} steps, {} coerced values{}, {:.2}s",
            self.dataset,
            self.dialect,
            self.rows,
            self.outcomes.len() - failed.len(),
            self.outcomes.len(),
            self.completed_steps,
            self.total_steps,
            self.coercions.iter().map(|c| c.count).sum::<usize>(),
            if failed.is_empty() {
                String::new()
            } else {
                format!(
                    " (failed: {})",
                    failed
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            },
            self.duration.as_secs_f64()
        )
    }
}

/// A finished run: the report and the results of every analyzer that succeeded.
#[derive(Debug, Clone)]
pub struct AnalysisRun {
    pub report: RunReport,
    pub results: Vec<(AnalyzerKind, AnalyzerResult)>,
}

impl AnalysisRun {
    pub fn result(&self, kind: AnalyzerKind) -> Option<&AnalyzerResult> {
        self.results.iter().find(|(k, _)| *k == kind).map(|(_, r)| r)
    }
}

/// Validates `dataset` and runs `kinds` over it in order. A kind listed more
/// than once runs once, at its first position.
///
/// Progress is started with the sum of declared steps and ticked once per
/// stage that produced output. An analyzer that fails is logged, recorded in
/// the report and left out of the results; the others still run.
///
/// # Errors
///
/// - [`GurneyError::Schema`] when the dataset matches no dialect.
/// - [`GurneyError::Aborted`] when `cancel` is set before an analyzer starts.
/// - [`GurneyError::ProgressOverflow`] when an analyzer reports more steps
///   than it declared.
pub fn run_analysis(
    dataset: &Dataset,
    kinds: &[AnalyzerKind],
    ctx: RunContext<'_>,
    progress: &mut ProgressAggregator,
    cancel: &CancelFlag,
) -> Result<AnalysisRun> {
    let start = Instant::now();
    let validated = schema::validate(dataset)?;

    let kinds = distinct(kinds);
    let total_steps = crate::analysis::total_declared_steps(&kinds);
    progress.start(total_steps);
    tracing::info!(
        dataset = validated.name(),
        dialect = validated.dialect(),
        rows = validated.height(),
        analyzers = kinds.len(),
        total_steps,
        "Analysis run started"
    );

    let mut outcomes = Vec::with_capacity(kinds.len());
    let mut results = Vec::with_capacity(kinds.len());

    for kind in kinds {
        if cancel.is_set() {
            tracing::warn!(analyzer = %kind, "Analysis run cancelled");
            return Err(GurneyError::Aborted);
        }

        let analyzer = kind.analyzer();
        // Each analyzer works on its own copy
        let own: ValidatedDataset = validated.clone();
        let planned = analyzer.planned_steps(&own);
        let mut ticked = 0;
        let mut on_step = |label: &str| {
            progress.tick(&format!("{kind}: {label}"))?;
            ticked += 1;
            Ok(())
        };
        let outcome = analyzer.run(&own, ctx, &mut on_step);

        match outcome {
            Ok(run) => {
                outcomes.push(AnalyzerOutcome {
                    kind,
                    ticks: run.ticks,
                    declared: analyzer.declared_steps(),
                    planned,
                    skipped: run.skipped,
                    error: None,
                });
                results.push((kind, run.result));
            }
            Err(e @ (GurneyError::ProgressOverflow { .. } | GurneyError::Aborted)) => return Err(e),
            Err(e) => {
                if let GurneyError::AnalyzerComputation {
                    stage_index, stage, ..
                } = &e
                {
                    tracing::error!(analyzer = %kind, stage_index, stage = %stage, "Analyzer failed: {e}");
                } else {
                    tracing::error!(analyzer = %kind, "Analyzer failed: {e}");
                }
                // Ticks reported before the failure stay in the progress count
                outcomes.push(AnalyzerOutcome {
                    kind,
                    ticks: ticked,
                    declared: analyzer.declared_steps(),
                    planned,
                    skipped: Vec::new(),
                    error: Some(e.to_string()),
                });
            }
        }
    }

    progress.finish();

    let report = RunReport {
        dataset: validated.name().to_owned(),
        dialect: validated.dialect().to_owned(),
        rows: validated.height(),
        outcomes,
        coercions: validated.coercions().to_vec(),
        total_steps,
        completed_steps: progress.current(),
        duration: start.elapsed(),
    };
    tracing::info!("{}", report.summary());
    Ok(AnalysisRun { report, results })
}

fn distinct(kinds: &[AnalyzerKind]) -> Vec<AnalyzerKind> {
    let mut seen = Vec::with_capacity(kinds.len());
    for &kind in kinds {
        if seen.contains(&kind) {
            tracing::warn!(analyzer = %kind, "Analyzer requested twice, running it once");
        } else {
            seen.push(kind);
        }
    }
    seen
}

/// Packs the successful results of `run` into an archive blob.
pub fn build_archive(run: &AnalysisRun) -> Result<Vec<u8>> {
    archive::build(
        &run.results,
        &ArchiveMeta {
            dataset: run.report.dataset.clone(),
            dialect: run.report.dialect.clone(),
        },
    )
}

/// Stores an archive blob as an analysis of `owner_id`, stamped now.
pub fn store_run(store: &mut RecordStore, owner_id: i64, name: &str, blob: &[u8]) -> Result<i64> {
    store_run_at(store, owner_id, name, Local::now().naive_local(), blob)
}

pub fn store_run_at(
    store: &mut RecordStore,
    owner_id: i64,
    name: &str,
    timestamp: NaiveDateTime,
    blob: &[u8],
) -> Result<i64> {
    store.store(RecordKind::Analysis, owner_id, name, timestamp, blob)
}
