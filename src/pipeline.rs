//! Run orchestration: validate, analyze, archive, store.
//!
//! ```no_run
//! use gurney::analysis::{AnalyzerKind, ProgressAggregator, RunContext};
//! use gurney::charts::{ChartTheme, PlottersRenderer};
//! use gurney::dataset::{Dataset, LoadOptions};
//! use gurney::pipeline::{build_archive, run_analysis, store_run};
//! use gurney::store::RecordStore;
//! use gurney::utils::CancelFlag;
//! use std::path::Path;
//!
//! let dataset = Dataset::load(Path::new("egresos.csv"), LoadOptions::default())?;
//! let theme = ChartTheme::default();
//! let renderer = PlottersRenderer::new(&theme);
//! let ctx = RunContext { renderer: &renderer, theme: &theme };
//!
//! let mut progress = ProgressAggregator::new();
//! let run = run_analysis(&dataset, &AnalyzerKind::ALL, ctx, &mut progress, &CancelFlag::new())?;
//! let blob = build_archive(&run)?;
//!
//! let mut store = RecordStore::open(Path::new("gurney.db"))?;
//! let id = store_run(&mut store, 1, dataset.name(), &blob)?;
//! println!("{} (stored as #{id})", run.report.summary());
//! # Ok::<(), gurney::error::GurneyError>(())
//! ```
//!
//! The run itself is synchronous. Only reading the source and writing results
//! to a user-chosen destination are async, see [`acquire_source`] and
//! [`deliver_archive`].

pub mod delivery;
pub mod executor;

pub use delivery::{acquire_source, deliver_archive, deliver_report, with_extension};
pub use executor::{
    AnalysisRun, AnalyzerOutcome, RunReport, build_archive, run_analysis, store_run, store_run_at,
};
