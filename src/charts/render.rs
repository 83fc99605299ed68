//! PNG rendering with plotters.
//!
//! Charts are drawn into an in-memory RGB buffer and encoded with `image`, so
//! rendering never touches the filesystem. Text (captions, axis labels,
//! legends, table cells) needs a font registered with plotters; when the
//! theme does not point at a readable font file the renderer draws geometry
//! only.

use anyhow::{Context as _, Result};
use plotters::coord::Shift;
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;
use polars::prelude::{
    ChunkQuantile as _, ChunkSort as _, Float64Chunked, NewChunkedArray as _, PlSmallStr,
    QuantileMethod,
};
use std::io::Cursor;
use std::ops::Range;
use std::sync::OnceLock;

use super::{Chart, ChartData, ChartRenderer, ChartSeries, ChartTheme};
use crate::error::GurneyError;

/// Family name fonts are registered under.
const FONT: &str = "sans-serif";
const TABLE_ROW_HEIGHT: u32 = 26;
const MAX_LABEL_CHARS: usize = 22;

type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;
type Plot<'a, 'b> = ChartContext<'a, BitMapBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

static FONT_REGISTERED: OnceLock<bool> = OnceLock::new();

/// Default [`ChartRenderer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PlottersRenderer {
    text: bool,
}

impl PlottersRenderer {
    /// Creates a renderer, registering the theme's font on first use.
    ///
    /// Font registration is process wide; the first theme that configures a
    /// font decides which one is used.
    pub fn new(theme: &ChartTheme) -> Self {
        Self {
            text: *FONT_REGISTERED.get_or_init(|| register_theme_font(theme)),
        }
    }

    /// Renderer that draws geometry only.
    pub fn without_text() -> Self {
        Self { text: false }
    }

    pub fn draws_text(&self) -> bool {
        self.text
    }

    fn render_png(&self, chart: &Chart, theme: &ChartTheme) -> Result<Vec<u8>> {
        let (width, height) = canvas_size(chart, theme);
        let mut buffer = vec![0u8; width as usize * height as usize * 3];
        {
            let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
            root.fill(&rgb(theme.background))?;
            let m = i32::try_from(theme.margin).unwrap_or(0);
            let inner = root.margin(m, m, m, m);
            self.draw(&inner, chart, theme)?;
            root.present()?;
        }
        encode_png(width, height, buffer)
    }

    fn draw(&self, root: &Area<'_>, chart: &Chart, theme: &ChartTheme) -> Result<()> {
        match &chart.data {
            ChartData::Bar { categories, series } => {
                self.bars(root, chart, theme, categories, series, false)
            }
            ChartData::StackedBar { categories, series } => {
                self.bars(root, chart, theme, categories, series, true)
            }
            ChartData::HorizontalBar { categories, values } => {
                self.horizontal_bars(root, chart, theme, categories, values)
            }
            ChartData::Scatter { points } => self.scatter(root, chart, theme, points),
            ChartData::Line { x_labels, series } => self.lines(root, chart, theme, x_labels, series),
            ChartData::BoxPlot { groups } => self.boxplot(root, chart, theme, groups),
            ChartData::Heatmap {
                rows,
                columns,
                values,
            } => self.heatmap(root, chart, theme, rows, columns, values),
            ChartData::Histogram { values, bins } => {
                self.histogram(root, chart, theme, values, *bins)
            }
            ChartData::Table { headers, rows } => self.table(root, chart, theme, headers, rows),
        }
    }

    fn plot<'a, 'b>(
        &self,
        root: &'a Area<'b>,
        chart: &Chart,
        theme: &ChartTheme,
        x: Range<f64>,
        y: Range<f64>,
    ) -> Result<Plot<'a, 'b>> {
        let mut builder = ChartBuilder::on(root);
        builder.margin(8);
        if self.text {
            builder
                .caption(chart.title.as_str(), self.font(theme, theme.font_size + 6))
                .x_label_area_size(48)
                .y_label_area_size(72);
        }
        Ok(builder.build_cartesian_2d(x, y)?)
    }

    fn font(&self, theme: &ChartTheme, size: u32) -> TextStyle<'static> {
        (FONT, size).into_font().color(&rgb(theme.foreground))
    }

    /// Axes, grid and tick labels. Category axes place item `i` at `x = i`.
    fn mesh(
        &self,
        plot: &mut Plot<'_, '_>,
        chart: &Chart,
        theme: &ChartTheme,
        x_names: Option<&[String]>,
        y_names: Option<&[String]>,
    ) -> Result<()> {
        if !self.text {
            return Ok(());
        }
        let x_fmt = |v: &f64| category_label(x_names, *v);
        let y_fmt = |v: &f64| category_label(y_names, *v);

        let mut mesh = plot.configure_mesh();
        mesh.label_style(self.font(theme, theme.font_size))
            .axis_desc_style(self.font(theme, theme.font_size))
            .x_desc(chart.x_label.as_str())
            .y_desc(chart.y_label.as_str());
        if let Some(names) = x_names {
            mesh.disable_x_mesh()
                .x_labels(names.len().max(1))
                .x_label_formatter(&x_fmt);
        }
        if let Some(names) = y_names {
            mesh.disable_y_mesh()
                .y_labels(names.len().max(1))
                .y_label_formatter(&y_fmt);
        }
        mesh.draw()?;
        Ok(())
    }

    fn legend<'a, 'b: 'a>(&self, plot: &mut Plot<'a, 'b>, theme: &ChartTheme) -> Result<()> {
        if !self.text {
            return Ok(());
        }
        plot.configure_series_labels()
            .background_style(&rgb(theme.background).mix(0.85))
            .border_style(&rgb(theme.foreground))
            .label_font(self.font(theme, theme.font_size))
            .draw()?;
        Ok(())
    }

    fn bars(
        &self,
        root: &Area<'_>,
        chart: &Chart,
        theme: &ChartTheme,
        categories: &[String],
        series: &[ChartSeries],
        stacked: bool,
    ) -> Result<()> {
        let n = categories.len();
        let y_range = if stacked {
            let totals = (0..n).map(|i| series.iter().map(|s| value_at(s, i).max(0.0)).sum::<f64>());
            value_axis(totals)
        } else {
            value_axis(series.iter().flat_map(|s| s.values.iter().copied()))
        };

        let mut plot = self.plot(root, chart, theme, category_axis(n), y_range)?;
        self.mesh(&mut plot, chart, theme, Some(categories), None)?;

        let group = 0.8;
        let width = if stacked {
            group
        } else {
            group / series.len().max(1) as f64
        };
        let mut base = vec![0.0; n];
        for (j, s) in series.iter().enumerate() {
            let color = rgb(theme.color(j));
            let mut rects = Vec::with_capacity(n);
            for (i, offset) in base.iter_mut().enumerate() {
                let v = value_at(s, i);
                let left = i as f64 - group / 2.0 + if stacked { 0.0 } else { j as f64 * width };
                let (bottom, top) = if stacked {
                    let v = v.max(0.0);
                    let bottom = *offset;
                    *offset += v;
                    (bottom, bottom + v)
                } else {
                    (0.0, v)
                };
                rects.push(Rectangle::new([(left, bottom), (left + width, top)], color.filled()));
            }
            let anno = plot.draw_series(rects)?;
            if series.len() > 1 {
                anno.label(s.name.clone()).legend(move |(x, y)| {
                    Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled())
                });
            }
        }
        if series.len() > 1 {
            self.legend(&mut plot, theme)?;
        }
        Ok(())
    }

    fn horizontal_bars(
        &self,
        root: &Area<'_>,
        chart: &Chart,
        theme: &ChartTheme,
        categories: &[String],
        values: &[f64],
    ) -> Result<()> {
        let n = categories.len();
        // First category on top
        let names: Vec<String> = categories.iter().rev().cloned().collect();
        let mut plot = self.plot(
            root,
            chart,
            theme,
            value_axis(values.iter().copied()),
            category_axis(n),
        )?;
        self.mesh(&mut plot, chart, theme, None, Some(&names))?;

        let color = rgb(theme.color(0));
        plot.draw_series(values.iter().take(n).enumerate().map(|(i, v)| {
            let y = (n - 1 - i) as f64;
            Rectangle::new([(0.0, y - 0.4), (*v, y + 0.4)], color.filled())
        }))?;
        Ok(())
    }

    fn scatter(
        &self,
        root: &Area<'_>,
        chart: &Chart,
        theme: &ChartTheme,
        points: &[(f64, f64)],
    ) -> Result<()> {
        let (xs, ys): (Vec<f64>, Vec<f64>) = points.iter().copied().unzip();
        let mut plot = self.plot(root, chart, theme, data_axis(&xs), data_axis(&ys))?;
        self.mesh(&mut plot, chart, theme, None, None)?;

        let style = rgb(theme.color(0)).mix(0.6).filled();
        plot.draw_series(points.iter().map(|&(x, y)| Circle::new((x, y), 3, style)))?;
        Ok(())
    }

    fn lines(
        &self,
        root: &Area<'_>,
        chart: &Chart,
        theme: &ChartTheme,
        x_labels: &[String],
        series: &[ChartSeries],
    ) -> Result<()> {
        let n = x_labels.len();
        let y_range = value_axis(series.iter().flat_map(|s| s.values.iter().copied()));
        let mut plot = self.plot(root, chart, theme, category_axis(n), y_range)?;
        self.mesh(&mut plot, chart, theme, Some(x_labels), None)?;

        for (j, s) in series.iter().enumerate() {
            let color = rgb(theme.color(j));
            let points: Vec<(f64, f64)> = s
                .values
                .iter()
                .take(n)
                .enumerate()
                .map(|(i, v)| (i as f64, *v))
                .collect();
            let anno = plot.draw_series(LineSeries::new(points.clone(), color.stroke_width(2)))?;
            if series.len() > 1 {
                anno.label(s.name.clone()).legend(move |(x, y)| {
                    PathElement::new(vec![(x, y), (x + 16, y)], color.stroke_width(2))
                });
            }
            plot.draw_series(points.into_iter().map(|p| Circle::new(p, 3, color.filled())))?;
        }
        if series.len() > 1 {
            self.legend(&mut plot, theme)?;
        }
        Ok(())
    }

    fn boxplot(
        &self,
        root: &Area<'_>,
        chart: &Chart,
        theme: &ChartTheme,
        groups: &[ChartSeries],
    ) -> Result<()> {
        let names: Vec<String> = groups.iter().map(|g| g.name.clone()).collect();
        let all: Vec<f64> = groups.iter().flat_map(|g| g.values.iter().copied()).collect();
        let mut plot = self.plot(root, chart, theme, category_axis(groups.len()), data_axis(&all))?;
        self.mesh(&mut plot, chart, theme, Some(&names), None)?;

        for (i, group) in groups.iter().enumerate() {
            let Some(stats) = BoxStats::from_values(&group.values) else {
                continue;
            };
            let color = rgb(theme.color(i));
            let x = i as f64;
            plot.draw_series(std::iter::once(Rectangle::new(
                [(x - 0.3, stats.q1), (x + 0.3, stats.q3)],
                color.mix(0.35).filled(),
            )))?;
            plot.draw_series(std::iter::once(Rectangle::new(
                [(x - 0.3, stats.q1), (x + 0.3, stats.q3)],
                color.stroke_width(2),
            )))?;
            plot.draw_series(
                [
                    vec![(x - 0.3, stats.median), (x + 0.3, stats.median)],
                    vec![(x, stats.q3), (x, stats.upper)],
                    vec![(x, stats.q1), (x, stats.lower)],
                    vec![(x - 0.15, stats.upper), (x + 0.15, stats.upper)],
                    vec![(x - 0.15, stats.lower), (x + 0.15, stats.lower)],
                ]
                .into_iter()
                .map(|path| PathElement::new(path, color.stroke_width(2))),
            )?;
            plot.draw_series(
                stats
                    .outliers
                    .iter()
                    .map(|v| Circle::new((x, *v), 2, color.stroke_width(1))),
            )?;
        }
        Ok(())
    }

    fn heatmap(
        &self,
        root: &Area<'_>,
        chart: &Chart,
        theme: &ChartTheme,
        rows: &[String],
        columns: &[String],
        values: &[Vec<f64>],
    ) -> Result<()> {
        let mut plot = self.plot(
            root,
            chart,
            theme,
            category_axis(columns.len()),
            category_axis(rows.len()),
        )?;
        self.mesh(&mut plot, chart, theme, Some(columns), Some(rows))?;

        let max = values
            .iter()
            .flatten()
            .copied()
            .fold(0.0_f64, f64::max);
        let low = theme.background;
        let high = theme.color(0);
        let mut cells = Vec::new();
        for (r, row) in values.iter().enumerate().take(rows.len()) {
            for (c, v) in row.iter().enumerate().take(columns.len()) {
                let t = if max > 0.0 { (v / max).clamp(0.0, 1.0) } else { 0.0 };
                let (x, y) = (c as f64, r as f64);
                cells.push(Rectangle::new(
                    [(x - 0.5, y - 0.5), (x + 0.5, y + 0.5)],
                    rgb(lerp(low, high, t)).filled(),
                ));
            }
        }
        plot.draw_series(cells)?;
        Ok(())
    }

    fn histogram(
        &self,
        root: &Area<'_>,
        chart: &Chart,
        theme: &ChartTheme,
        values: &[f64],
        bins: usize,
    ) -> Result<()> {
        let counts = histogram_counts(values, bins.max(1));
        let x_range = data_axis(values);
        let y_range = value_axis(counts.iter().map(|(_, _, c)| *c as f64));
        let mut plot = self.plot(root, chart, theme, x_range, y_range)?;
        self.mesh(&mut plot, chart, theme, None, None)?;

        let color = rgb(theme.color(0));
        plot.draw_series(counts.iter().map(|(lo, hi, count)| {
            Rectangle::new([(*lo, 0.0), (*hi, *count as f64)], color.mix(0.8).filled())
        }))?;
        plot.draw_series(counts.iter().map(|(lo, hi, count)| {
            Rectangle::new([(*lo, 0.0), (*hi, *count as f64)], rgb(theme.background).stroke_width(1))
        }))?;
        Ok(())
    }

    fn table(
        &self,
        root: &Area<'_>,
        chart: &Chart,
        theme: &ChartTheme,
        headers: &[String],
        rows: &[Vec<String>],
    ) -> Result<()> {
        let (width, _) = root.dim_in_pixel();
        let row_h = TABLE_ROW_HEIGHT as i32;
        let cols = headers.len().max(1);
        let cell_w = (width as i32 / cols as i32).max(1);
        let fg = rgb(theme.foreground);
        let header_fill = rgb(theme.color(0)).mix(0.25);
        let max_chars = (cell_w as f64 / (f64::from(theme.font_size) * 0.6)).floor().max(1.0) as usize;

        let mut top = 0;
        if self.text {
            root.draw(&Text::new(
                chart.title.clone(),
                (0, 0),
                self.font(theme, theme.font_size + 4),
            ))?;
            top = row_h + 4;
        }

        let shown = visible_rows(rows, headers.len(), theme.max_table_rows);
        for (r, cells) in std::iter::once(headers).chain(shown.iter().map(Vec::as_slice)).enumerate() {
            let y0 = top + r as i32 * row_h;
            for c in 0..cols {
                let x0 = c as i32 * cell_w;
                let corners = [(x0, y0), (x0 + cell_w - 1, y0 + row_h)];
                if r == 0 {
                    root.draw(&Rectangle::new(corners, header_fill.filled()))?;
                }
                root.draw(&Rectangle::new(corners, fg.stroke_width(1)))?;
                if self.text
                    && let Some(cell) = cells.get(c)
                {
                    root.draw(&Text::new(
                        truncate(cell, max_chars),
                        (x0 + 4, y0 + 6),
                        self.font(theme, theme.font_size),
                    ))?;
                }
            }
        }
        Ok(())
    }
}

impl ChartRenderer for PlottersRenderer {
    fn render(&self, chart: &Chart, theme: &ChartTheme) -> crate::error::Result<Vec<u8>> {
        self.render_png(chart, theme).map_err(|e| {
            GurneyError::Chart(format!("'{}' ({}): {e:#}", chart.title, chart.data.kind()))
        })
    }
}

fn register_theme_font(theme: &ChartTheme) -> bool {
    let Some(path) = theme.font_path() else {
        tracing::info!("No chart font configured; charts are rendered without text");
        return false;
    };
    match std::fs::read(&path) {
        Ok(bytes) => {
            // plotters keeps registered fonts for the life of the process
            let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
            match plotters::style::register_font(FONT, FontStyle::Normal, bytes) {
                Ok(()) => {
                    tracing::info!(font = %path.display(), "Chart font registered");
                    true
                }
                Err(_) => {
                    tracing::warn!(font = %path.display(), "Unusable chart font");
                    false
                }
            }
        }
        Err(e) => {
            tracing::warn!(font = %path.display(), "Cannot read chart font: {e}");
            false
        }
    }
}

fn canvas_size(chart: &Chart, theme: &ChartTheme) -> (u32, u32) {
    let width = theme.width.max(64);
    let height = match &chart.data {
        ChartData::Table { headers, rows } => {
            let lines = visible_rows(rows, headers.len(), theme.max_table_rows).len() as u32 + 2;
            lines * TABLE_ROW_HEIGHT + 2 * theme.margin + 8
        }
        _ => theme.height,
    };
    (width, height.max(64))
}

fn encode_png(width: u32, height: u32, buffer: Vec<u8>) -> Result<Vec<u8>> {
    let image = image::RgbImage::from_raw(width, height, buffer)
        .context("Frame buffer does not match the canvas size")?;
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .context("Failed to encode PNG")?;
    Ok(out.into_inner())
}

fn rgb(c: [u8; 3]) -> RGBColor {
    RGBColor(c[0], c[1], c[2])
}

fn lerp(a: [u8; 3], b: [u8; 3], t: f64) -> [u8; 3] {
    let mix = |x: u8, y: u8| (f64::from(x) + (f64::from(y) - f64::from(x)) * t).round() as u8;
    [mix(a[0], b[0]), mix(a[1], b[1]), mix(a[2], b[2])]
}

fn value_at(series: &ChartSeries, index: usize) -> f64 {
    series
        .values
        .get(index)
        .copied()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Items `0..n` centred on integer positions.
fn category_axis(n: usize) -> Range<f64> {
    -0.5..(n.max(1) as f64 - 0.5)
}

/// Axis anchored at zero with headroom above the largest value.
fn value_axis(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((0.0_f64, 0.0_f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if hi - lo <= f64::EPSILON {
        return 0.0..1.0;
    }
    let pad = (hi - lo) * 0.08;
    (if lo < 0.0 { lo - pad } else { 0.0 })..(hi + pad)
}

/// Axis spanning the data with a small margin on both sides.
fn data_axis(values: &[f64]) -> Range<f64> {
    let (lo, hi) = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() || !hi.is_finite() {
        return 0.0..1.0;
    }
    if hi - lo <= f64::EPSILON {
        return (lo - 0.5)..(hi + 0.5);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad)..(hi + pad)
}

fn category_label(names: Option<&[String]>, v: f64) -> String {
    match names {
        Some(names) => {
            let idx = v.round();
            if (v - idx).abs() > 1e-6 || idx < 0.0 {
                return String::new();
            }
            names
                .get(idx as usize)
                .map(|n| truncate(n, MAX_LABEL_CHARS))
                .unwrap_or_default()
        }
        None => {
            if v.abs() >= 1000.0 {
                format!("{v:.0}")
            } else {
                format!("{v:.1}")
            }
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_owned();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn visible_rows(rows: &[Vec<String>], width: usize, max_rows: usize) -> Vec<Vec<String>> {
    if rows.len() <= max_rows {
        return rows.to_vec();
    }
    let mut shown: Vec<Vec<String>> = rows.iter().take(max_rows).cloned().collect();
    let mut marker = vec![String::new(); width.max(1)];
    if let Some(first) = marker.first_mut() {
        *first = format!("… {} more rows", rows.len() - max_rows);
    }
    shown.push(marker);
    shown
}

/// `(lower edge, upper edge, count)` per bin over the finite values.
pub(crate) fn histogram_counts(values: &[f64], bins: usize) -> Vec<(f64, f64, usize)> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let Some(lo) = finite.iter().copied().reduce(f64::min) else {
        return Vec::new();
    };
    let hi = finite.iter().copied().fold(lo, f64::max);
    let bins = bins.max(1);
    let step = if hi > lo { (hi - lo) / bins as f64 } else { 1.0 };

    let mut counts = vec![0usize; bins];
    for v in &finite {
        let idx = (((v - lo) / step).floor() as usize).min(bins - 1);
        if let Some(slot) = counts.get_mut(idx) {
            *slot += 1;
        }
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, c)| (lo + i as f64 * step, lo + (i + 1) as f64 * step, c))
        .collect()
}

/// Five-number summary with Tukey whiskers.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BoxStats {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
    pub outliers: Vec<f64>,
}

impl BoxStats {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        let sorted = Float64Chunked::from_vec(PlSmallStr::EMPTY, finite).sort(false);
        let quartile = |q: f64| sorted.quantile(q, QuantileMethod::Linear).ok().flatten();
        let (q1, median, q3) = (quartile(0.25)?, sorted.median()?, quartile(0.75)?);

        let iqr = q3 - q1;
        let (fence_lo, fence_hi) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);
        let (inside, outliers): (Vec<f64>, Vec<f64>) = sorted
            .into_no_null_iter()
            .partition(|v| *v >= fence_lo && *v <= fence_hi);
        Some(Self {
            q1,
            median,
            q3,
            lower: inside.first().copied().unwrap_or(q1),
            upper: inside.last().copied().unwrap_or(q3),
            outliers,
        })
    }
}
