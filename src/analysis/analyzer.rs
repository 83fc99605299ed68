use polars::prelude::DataFrame;

use super::{AnalyzerKind, AnalyzerResult};
use crate::charts::{Chart, ChartRenderer, ChartTheme};
use crate::error::{GurneyError, Result};
use crate::schema::{Field, ValidatedDataset};

/// Builder of one stage. `Ok(None)` means the stage had nothing to show for
/// this dataset (for example, no dated rows) and is skipped without error.
pub type StageBuilder = fn(&ValidatedDataset) -> Result<Option<StageOutput>>;

/// One unit of analyzer work and of progress.
#[derive(Debug, Clone, Copy)]
pub struct Stage {
    pub name: &'static str,
    pub requires: &'static [Field],
    pub build: StageBuilder,
}

impl Stage {
    pub const fn new(name: &'static str, requires: &'static [Field], build: StageBuilder) -> Self {
        Self {
            name,
            requires,
            build,
        }
    }

    pub fn is_runnable(&self, dataset: &ValidatedDataset) -> bool {
        dataset.has_all(self.requires)
    }
}

/// Tables and chart descriptions produced by a stage.
#[derive(Debug, Default)]
pub struct StageOutput {
    pub tables: Vec<(String, DataFrame)>,
    pub charts: Vec<(String, Chart)>,
}

impl StageOutput {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn table(mut self, name: impl Into<String>, table: DataFrame) -> Self {
        self.tables.push((name.into(), table));
        self
    }

    #[must_use]
    pub fn chart(mut self, name: impl Into<String>, chart: Chart) -> Self {
        self.charts.push((name.into(), chart));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.charts.is_empty()
    }
}

/// Collaborators available to a running analyzer.
#[derive(Clone, Copy)]
pub struct RunContext<'a> {
    pub renderer: &'a dyn ChartRenderer,
    pub theme: &'a ChartTheme,
}

/// What one analyzer run produced and which stages it left out.
#[derive(Debug, Default)]
pub struct AnalyzerRun {
    pub result: AnalyzerResult,
    pub ticks: usize,
    pub skipped: Vec<String>,
}

/// A fixed, declarative list of stages over a validated dataset.
pub trait Analyzer: Send + Sync {
    fn kind(&self) -> AnalyzerKind;

    fn stages(&self) -> &'static [Stage];

    /// Upper bound of progress steps; one per stage.
    fn declared_steps(&self) -> usize {
        self.stages().len()
    }

    /// Stages whose required fields `dataset` carries.
    fn planned_steps(&self, dataset: &ValidatedDataset) -> usize {
        self.stages()
            .iter()
            .filter(|s| s.is_runnable(dataset))
            .count()
    }

    /// Runs every runnable stage in order.
    ///
    /// `on_step` is called once per stage that produced output, with the
    /// stage name, after its outputs are in the result.
    ///
    /// # Errors
    ///
    /// [`GurneyError::AnalyzerComputation`] when a stage fails or its charts
    /// cannot be rendered; errors returned by `on_step` are passed through.
    fn run(
        &self,
        dataset: &ValidatedDataset,
        ctx: RunContext<'_>,
        on_step: &mut dyn FnMut(&str) -> Result<()>,
    ) -> Result<AnalyzerRun> {
        let kind = self.kind();
        let mut run = AnalyzerRun::default();

        for (index, stage) in self.stages().iter().enumerate() {
            if !stage.is_runnable(dataset) {
                let missing: Vec<String> = stage
                    .requires
                    .iter()
                    .filter(|f| !dataset.has(**f))
                    .map(|f| format!("{f:?}"))
                    .collect();
                tracing::debug!(
                    analyzer = %kind,
                    stage = stage.name,
                    "Skipping stage, missing fields: {}",
                    missing.join(", ")
                );
                run.skipped.push(stage.name.to_owned());
                continue;
            }

            let failed = |message: String| GurneyError::AnalyzerComputation {
                analyzer: kind.namespace().to_owned(),
                stage_index: index,
                stage: stage.name.to_owned(),
                message,
            };

            let Some(output) = (stage.build)(dataset).map_err(|e| failed(e.to_string()))? else {
                tracing::info!(analyzer = %kind, stage = stage.name, "Stage produced no output");
                run.skipped.push(stage.name.to_owned());
                continue;
            };

            for (name, table) in output.tables {
                run.result
                    .add_table(name, table)
                    .map_err(|e| failed(e.to_string()))?;
            }
            for (name, chart) in output.charts {
                let png = ctx
                    .renderer
                    .render(&chart, ctx.theme)
                    .map_err(|e| failed(e.to_string()))?;
                run.result
                    .add_chart(name, png)
                    .map_err(|e| failed(e.to_string()))?;
            }

            on_step(stage.name)?;
            run.ticks += 1;
        }

        tracing::info!(
            analyzer = %kind,
            steps = run.ticks,
            declared = self.declared_steps(),
            tables = run.result.tables().len(),
            charts = run.result.charts().len(),
            "Analyzer finished"
        );
        Ok(run)
    }
}
