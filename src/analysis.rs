//! # Analysis suite
//!
//! Five analyzers compute tables and charts over the same validated dataset:
//!
//! | Kind | Namespace | Focus |
//! |------|-----------|-------|
//! | [`AnalyzerKind::Exploratory`] | `exploratorio` | descriptive summary, distributions |
//! | [`AnalyzerKind::Economic`] | `economico` | base price vs amount due, cost per day |
//! | [`AnalyzerKind::Clinical`] | `clinico` | length of stay, diagnoses |
//! | [`AnalyzerKind::Cohort`] | `cohortes` | age groups, admission months |
//! | [`AnalyzerKind::Production`] | `produccion` | year-over-year discharge volumes |
//!
//! Each analyzer is a fixed list of [`Stage`]s. A stage names the fields it
//! needs and a builder that turns the dataset into tables and chart
//! descriptions. Stages whose fields are missing are skipped and do not count
//! towards progress; every stage that produces output reports exactly one
//! progress step.
//!
//! Analyzers share nothing. Each one receives its own copy of the dataset and
//! returns an [`AnalyzerResult`] the archive builder packs under the
//! analyzer's namespace.

pub mod analyzer;
pub mod clinical;
pub mod cohort;
pub mod economic;
pub mod exploratory;
pub mod ops;
pub mod production;
pub mod progress;

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{GurneyError, Result};

pub use analyzer::{Analyzer, RunContext, Stage, StageOutput};
pub use progress::{ProgressAggregator, ProgressSnapshot, ProgressState};

/// The analyzers gurney ships, in archive order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnalyzerKind {
    #[serde(rename = "exploratorio")]
    Exploratory,
    #[serde(rename = "economico")]
    Economic,
    #[serde(rename = "clinico")]
    Clinical,
    #[serde(rename = "cohortes")]
    Cohort,
    #[serde(rename = "produccion")]
    Production,
}

impl AnalyzerKind {
    pub const ALL: [Self; 5] = [
        Self::Exploratory,
        Self::Economic,
        Self::Clinical,
        Self::Cohort,
        Self::Production,
    ];

    /// Top-level directory of this analyzer's entries in an archive.
    pub fn namespace(self) -> &'static str {
        match self {
            Self::Exploratory => "exploratorio",
            Self::Economic => "economico",
            Self::Clinical => "clinico",
            Self::Cohort => "cohortes",
            Self::Production => "produccion",
        }
    }

    pub fn from_namespace(namespace: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.namespace() == namespace)
    }

    pub fn analyzer(self) -> Box<dyn Analyzer> {
        match self {
            Self::Exploratory => Box::new(exploratory::ExploratoryAnalyzer),
            Self::Economic => Box::new(economic::EconomicAnalyzer),
            Self::Clinical => Box::new(clinical::ClinicalAnalyzer),
            Self::Cohort => Box::new(cohort::CohortAnalyzer),
            Self::Production => Box::new(production::ProductionAnalyzer),
        }
    }
}

impl fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.namespace())
    }
}

impl FromStr for AnalyzerKind {
    type Err = GurneyError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_lowercase();
        Self::from_namespace(&key)
            .or(match key.as_str() {
                "exploratory" => Some(Self::Exploratory),
                "economic" => Some(Self::Economic),
                "clinical" => Some(Self::Clinical),
                "cohort" | "cohorts" => Some(Self::Cohort),
                "production" => Some(Self::Production),
                _ => None,
            })
            .ok_or_else(|| GurneyError::Config(format!("Unknown analyzer '{s}'")))
    }
}

/// Tables and rendered charts produced by one analyzer, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerResult {
    tables: Vec<(String, DataFrame)>,
    charts: Vec<(String, Vec<u8>)>,
}

impl AnalyzerResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Rejects a name already used by another table of this result.
    pub fn add_table(&mut self, name: impl Into<String>, table: DataFrame) -> Result<()> {
        let name = name.into();
        if self.tables.iter().any(|(n, _)| *n == name) {
            return Err(GurneyError::DataProcessing(format!(
                "Duplicate table name '{name}'"
            )));
        }
        self.tables.push((name, table));
        Ok(())
    }

    /// # Errors
    ///
    /// Rejects a name already used by another chart of this result.
    pub fn add_chart(&mut self, name: impl Into<String>, png: Vec<u8>) -> Result<()> {
        let name = name.into();
        if self.charts.iter().any(|(n, _)| *n == name) {
            return Err(GurneyError::DataProcessing(format!(
                "Duplicate chart name '{name}'"
            )));
        }
        self.charts.push((name, png));
        Ok(())
    }

    pub fn tables(&self) -> &[(String, DataFrame)] {
        &self.tables
    }

    pub fn charts(&self) -> &[(String, Vec<u8>)] {
        &self.charts
    }

    pub fn table(&self, name: &str) -> Option<&DataFrame> {
        self.tables.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    pub fn chart(&self, name: &str) -> Option<&[u8]> {
        self.charts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.charts.is_empty()
    }
}

/// Sum of declared steps over `kinds`; the progress total of a run.
pub fn total_declared_steps(kinds: &[AnalyzerKind]) -> usize {
    kinds.iter().map(|k| k.analyzer().declared_steps()).sum()
}
