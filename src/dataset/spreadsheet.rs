//! Spreadsheet ingestion through calamine.
//!
//! Only the first worksheet is read. Exports from the hospital information
//! system often put a title block above the table, so the header row is a
//! configurable offset. Excel date cells are rendered as ISO dates and left
//! for the validator to type.

use calamine::{Data, Reader as _, open_workbook_auto};
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::HashSet;
use std::path::Path;

use crate::error::{GurneyError, Result};

/// Reads the first worksheet of `path` with labels at `header_row`.
pub fn load_sheet(path: &Path, header_row: usize) -> Result<DataFrame> {
    let mut workbook = open_workbook_auto(path)?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| GurneyError::DataProcessing(format!("{} has no worksheets", path.display())))?;
    let range = workbook.worksheet_range(&sheet)?;

    let mut rows = range.rows().skip(header_row);
    let header = rows.next().ok_or_else(|| {
        GurneyError::DataProcessing(format!(
            "Worksheet '{sheet}' has no header at row {header_row}"
        ))
    })?;
    let labels = unique_labels(header);
    let body: Vec<&[Data]> = rows.filter(|r| r.iter().any(|c| !is_blank(c))).collect();

    tracing::debug!(sheet = %sheet, rows = body.len(), "Reading worksheet");
    cells_to_frame(&labels, &body)
}

pub(crate) fn cells_to_frame(labels: &[String], body: &[&[Data]]) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(labels.len());
    for (idx, label) in labels.iter().enumerate() {
        let cells: Vec<Option<&Data>> = body.iter().map(|row| row.get(idx)).collect();
        let numeric = cells
            .iter()
            .flatten()
            .filter(|c| !is_blank(c))
            .all(|c| matches!(c, Data::Int(_) | Data::Float(_)));

        let column = if numeric {
            let values: Vec<Option<f64>> = cells.iter().map(|c| c.and_then(cell_number)).collect();
            Column::new(label.as_str().into(), values)
        } else {
            let values: Vec<Option<String>> = cells.iter().map(|c| c.and_then(cell_text)).collect();
            Column::new(label.as_str().into(), values)
        };
        columns.push(column);
    }
    Ok(DataFrame::new(columns)?)
}

fn unique_labels(header: &[Data]) -> Vec<String> {
    let mut seen = HashSet::new();
    header
        .iter()
        .enumerate()
        .map(|(idx, cell)| {
            let base = cell_text(cell).unwrap_or_else(|| format!("column_{}", idx + 1));
            let mut label = base.clone();
            let mut n = 1;
            while !seen.insert(label.clone()) {
                label = format!("{base}_{n}");
                n += 1;
            }
            label
        })
        .collect()
}

fn is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn cell_number(cell: &Data) -> Option<f64> {
    match cell {
        Data::Int(v) => Some(*v as f64),
        Data::Float(v) => Some(*v),
        _ => None,
    }
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_owned())
        }
        Data::DateTime(dt) => serial_to_date(dt.as_f64()).map(|d| d.format("%Y-%m-%d").to_string()),
        Data::Float(v) if v.fract() == 0.0 => Some(format!("{v:.0}")),
        other => Some(other.to_string()),
    }
}

/// Excel serial day numbers count from 1899-12-30.
fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    base.checked_add_signed(chrono::Duration::days(serial.floor() as i64))
}
