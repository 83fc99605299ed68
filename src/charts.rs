//! Chart descriptions and the rendering seam.
//!
//! Analyzers never draw. They describe what to plot as a [`Chart`] and hand
//! it to a [`ChartRenderer`] together with a [`ChartTheme`]. The theme is an
//! explicit value, so two renders with the same inputs produce the same image
//! regardless of what ran before.

pub mod render;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;

pub use render::PlottersRenderer;

/// Visual settings applied to every chart of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartTheme {
    pub width: u32,
    pub height: u32,
    pub margin: u32,
    pub background: [u8; 3],
    pub foreground: [u8; 3],
    /// Series colors, cycled when a chart has more series than entries
    pub palette: Vec<[u8; 3]>,
    /// Directory holding `{font_family}.ttf` (or `{font_family}-Regular.ttf`)
    pub fonts_dir: Option<PathBuf>,
    pub font_family: Option<String>,
    pub font_size: u32,
    /// Rows drawn for table images; longer tables are cut with a trailing marker row
    pub max_table_rows: usize,
}

impl Default for ChartTheme {
    fn default() -> Self {
        Self {
            width: 960,
            height: 600,
            margin: 16,
            background: [255, 255, 255],
            foreground: [33, 37, 41],
            palette: vec![
                [31, 119, 180],
                [255, 127, 14],
                [44, 160, 44],
                [214, 39, 40],
                [148, 103, 189],
                [140, 86, 75],
                [227, 119, 194],
                [127, 127, 127],
            ],
            fonts_dir: None,
            font_family: None,
            font_size: 14,
            max_table_rows: 40,
        }
    }
}

impl ChartTheme {
    pub fn color(&self, index: usize) -> [u8; 3] {
        if self.palette.is_empty() {
            return self.foreground;
        }
        self.palette
            .get(index % self.palette.len())
            .copied()
            .unwrap_or(self.foreground)
    }

    /// Path of the font file the theme asks for, if configured and present.
    pub fn font_path(&self) -> Option<PathBuf> {
        let dir = self.fonts_dir.as_ref()?;
        let family = self.font_family.as_ref()?;
        [format!("{family}.ttf"), format!("{family}-Regular.ttf")]
            .into_iter()
            .map(|name| dir.join(name))
            .find(|p| p.is_file())
    }
}

/// A named data series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub name: String,
    pub values: Vec<f64>,
}

impl ChartSeries {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// What a chart plots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChartData {
    /// Vertical bars; several series are drawn side by side per category.
    Bar {
        categories: Vec<String>,
        series: Vec<ChartSeries>,
    },
    HorizontalBar {
        categories: Vec<String>,
        values: Vec<f64>,
    },
    StackedBar {
        categories: Vec<String>,
        series: Vec<ChartSeries>,
    },
    Scatter {
        points: Vec<(f64, f64)>,
    },
    Line {
        x_labels: Vec<String>,
        series: Vec<ChartSeries>,
    },
    BoxPlot {
        groups: Vec<ChartSeries>,
    },
    /// `values[row][col]`
    Heatmap {
        rows: Vec<String>,
        columns: Vec<String>,
        values: Vec<Vec<f64>>,
    },
    Histogram {
        values: Vec<f64>,
        bins: usize,
    },
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    },
}

impl ChartData {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bar { .. } => "bar",
            Self::HorizontalBar { .. } => "horizontal_bar",
            Self::StackedBar { .. } => "stacked_bar",
            Self::Scatter { .. } => "scatter",
            Self::Line { .. } => "line",
            Self::BoxPlot { .. } => "boxplot",
            Self::Heatmap { .. } => "heatmap",
            Self::Histogram { .. } => "histogram",
            Self::Table { .. } => "table",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub data: ChartData,
}

impl Chart {
    pub fn new(title: impl Into<String>, data: ChartData) -> Self {
        Self {
            title: title.into(),
            x_label: String::new(),
            y_label: String::new(),
            data,
        }
    }

    #[must_use]
    pub fn labels(mut self, x: impl Into<String>, y: impl Into<String>) -> Self {
        self.x_label = x.into();
        self.y_label = y.into();
        self
    }
}

/// Turns a chart description into PNG bytes.
pub trait ChartRenderer: Send + Sync {
    /// # Errors
    ///
    /// Returns [`crate::error::GurneyError::Chart`] when drawing or encoding fails.
    fn render(&self, chart: &Chart, theme: &ChartTheme) -> Result<Vec<u8>>;
}
