//! # gurney - hospital discharge analytics
//!
//! gurney reads a discharge dataset exported from a hospital information
//! system, checks it against the column layouts it knows, runs five
//! independent analyzers over it and packs their tables (CSV) and charts (PNG)
//! into a single zip archive. Archives are kept in a local SQLite store and can
//! later be turned into a PDF report.
//!
//! ## Quick Start
//!
//! ```no_run
//! use gurney::analysis::{AnalyzerKind, ProgressAggregator, RunContext};
//! use gurney::charts::{ChartTheme, PlottersRenderer};
//! use gurney::dataset::{Dataset, LoadOptions};
//! use gurney::pipeline;
//! use gurney::utils::CancelFlag;
//! use std::path::Path;
//!
//! let dataset = Dataset::load(Path::new("egresos.csv"), LoadOptions::default())?;
//! let theme = ChartTheme::default();
//! let renderer = PlottersRenderer::new(&theme);
//! let ctx = RunContext { renderer: &renderer, theme: &theme };
//!
//! let mut progress = ProgressAggregator::new();
//! let run = pipeline::run_analysis(&dataset, &AnalyzerKind::ALL, ctx, &mut progress, &CancelFlag::new())?;
//! let zip = pipeline::build_archive(&run)?;
//! println!("{} ({} bytes)", run.report.summary(), zip.len());
//! # Ok::<(), gurney::error::GurneyError>(())
//! ```
//!
//! ## Core Modules
//!
//! - [`dataset`]: CSV and spreadsheet loading
//! - [`schema`]: dialect matching and type coercion
//! - [`analysis`]: the analyzers, their stages and progress reporting
//! - [`charts`]: chart descriptions and the PNG renderer
//! - [`archive`]: zip packing, manifest and safe extraction
//! - [`store`]: SQLite persistence of analyses and reports
//! - [`report`]: extraction of stored analyses and PDF composition
//! - [`pipeline`]: run orchestration and the async file boundaries
//! - [`config`], [`logging`], [`error`], [`utils`]: ambient plumbing

#![warn(clippy::all, rust_2018_idioms)]

pub mod analysis;
pub mod archive;
pub mod charts;
pub mod config;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod schema;
pub mod store;
pub mod utils;
