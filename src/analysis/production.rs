//! Year-over-year discharge production.
//!
//! Every stage looks at the same [`YearWindow`]: the latest discharge year
//! through its latest month, against the same months of the year before.
//! Rows dated outside the window, or without a discharge date, are left out.
//! A dataset without any dated row skips every stage.
//!
//! Column names of the comparative tables carry the compared years, e.g.
//! `egresos_2023` and `egresos_2024`.

use std::collections::{HashMap, HashSet};

use polars::prelude::*;

use super::analyzer::{Analyzer, Stage, StageOutput};
use super::ops::{self, YearWindow};
use super::AnalyzerKind;
use crate::archive::naming::sanitize_segment;
use crate::charts::{Chart, ChartData, ChartSeries};
use crate::error::Result;
use crate::schema::{Field, ValidatedDataset};

pub struct ProductionAnalyzer;

static STAGES: [Stage; 9] = [
    Stage::new(
        "motivo_egreso",
        &[Field::DischargeDate, Field::DischargeReason],
        discharge_reason_tables,
    ),
    Stage::new(
        "tipo_ingreso",
        &[Field::DischargeDate, Field::AdmissionType],
        admission_type_tables,
    ),
    Stage::new("sexo", &[Field::DischargeDate, Field::Sex], sex_tables),
    Stage::new(
        "comparativo_hospital",
        &[Field::DischargeDate, Field::Hospital],
        hospital_comparison,
    ),
    Stage::new(
        "barras_motivo_egreso_comparativo",
        &[Field::DischargeDate, Field::DischargeReason],
        discharge_reason_bars,
    ),
    Stage::new(
        "barras_tipo_ingreso_comparativo",
        &[Field::DischargeDate, Field::AdmissionType],
        admission_type_bars,
    ),
    Stage::new(
        "barras_sexo_comparativo",
        &[Field::DischargeDate, Field::Sex],
        sex_bars,
    ),
    Stage::new(
        "evolucion_egresos",
        &[Field::DischargeDate, Field::Hospital],
        hospital_evolution,
    ),
    Stage::new(
        "egresos_mensuales",
        &[Field::DischargeDate],
        monthly_discharges,
    ),
];

impl Analyzer for ProductionAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Production
    }

    fn stages(&self) -> &'static [Stage] {
        &STAGES
    }
}

const YEAR: &str = "anio";
const MONTH: &str = "mes";
const HOSPITAL: &str = "hospital";
const DISCHARGES: &str = "egresos";

/// Rows inside the comparison window, with `anio` and `mes` of the discharge
/// plus the requested fields under their keys.
struct Windowed {
    window: YearWindow,
    frame: LazyFrame,
}

impl Windowed {
    fn of(ds: &ValidatedDataset, fields: &[(Field, &str)]) -> Result<Option<Self>> {
        let dates = ds.dates(Field::DischargeDate)?;
        let Some(window) = YearWindow::from_dates(&dates) else {
            tracing::info!(dataset = ds.name(), "No dated discharges; skipping production stage");
            return Ok(None);
        };

        let date = ds.col(Field::DischargeDate)?;
        let mut columns = vec![
            date.clone().dt().year().cast(DataType::Int32).alias(YEAR),
            date.dt().month().cast(DataType::UInt32).alias(MONTH),
        ];
        for (field, key) in fields {
            columns.push(ds.col(*field)?.alias(*key));
        }
        let frame = ds
            .lazy()
            .select(columns)
            .filter(window.contains(col(YEAR), col(MONTH)));
        Ok(Some(Self { window, frame }))
    }

    fn title_suffix(&self) -> String {
        format!(
            "({} vs {}, hasta mes {})",
            self.window.previous_year(),
            self.window.current_year,
            self.window.through_month
        )
    }
}

/// Counts keyed by `(anio, mes)` from a [`ops::count_by`] result.
fn month_counts(counts: &DataFrame) -> Result<HashMap<(i32, u32), u64>> {
    let years = counts.column(YEAR)?.as_materialized_series().i32()?;
    let months = counts.column(MONTH)?.as_materialized_series().u32()?;
    let n = counts.column(ops::FREQUENCY)?.as_materialized_series().u64()?;
    Ok(years
        .into_iter()
        .zip(months)
        .zip(n)
        .filter_map(|((y, m), n)| Some(((y?, m?), n?)))
        .collect())
}

/// `{table}_por_anio_mes` counts plus the overall frequency table.
fn category_tables(
    ds: &ValidatedDataset,
    field: Field,
    key: &str,
    by_month: &str,
    totals: &str,
) -> Result<Option<StageOutput>> {
    let Some(win) = Windowed::of(ds, &[(field, key)])? else {
        return Ok(None);
    };
    let monthly = ops::count_by(win.frame.clone(), &[YEAR, MONTH, key])?;
    if monthly.height() == 0 {
        return Ok(None);
    }
    let values = win.frame.select([col(key)]).collect()?;
    let overall = ops::value_counts(values.column(key)?.as_materialized_series())?;

    Ok(Some(
        StageOutput::new()
            .table(by_month, monthly)
            .table(totals, overall),
    ))
}

fn discharge_reason_tables(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    category_tables(
        ds,
        Field::DischargeReason,
        "motivo_egreso",
        "conteo_motivo_egreso_por_anio_mes",
        "conteo_motivo_egreso",
    )
}

fn admission_type_tables(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    category_tables(
        ds,
        Field::AdmissionType,
        "tipo_ingreso",
        "distribucion_tipo_ingreso_por_anio_mes",
        "distribucion_tipo_ingreso",
    )
}

fn sex_tables(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    category_tables(
        ds,
        Field::Sex,
        "sexo",
        "distribucion_sexo_por_anio_mes",
        "distribucion_sexo",
    )
}

/// Grouped bars: one category per value, one series per compared year.
fn category_bars(
    ds: &ValidatedDataset,
    field: Field,
    name: &str,
    title: &str,
    axis: &str,
) -> Result<Option<StageOutput>> {
    const VALUE: &str = "valor";
    let Some(win) = Windowed::of(ds, &[(field, VALUE)])? else {
        return Ok(None);
    };
    let frame = win
        .frame
        .clone()
        .select([col(YEAR).cast(DataType::String), col(VALUE)]);
    let crosstab = ops::Crosstab::new(frame.clone(), YEAR, VALUE)?;
    if crosstab.is_empty() {
        return Ok(None);
    }

    let values = frame.select([col(VALUE)]).collect()?;
    let categories = ops::strings(
        &ops::value_counts(values.column(VALUE)?.as_materialized_series())?,
        VALUE,
    )?;
    let years: Vec<String> = win.window.years().iter().map(i32::to_string).collect();
    let series = years
        .iter()
        .zip(crosstab.matrix(&years, &categories)?)
        .map(|(year, counts)| {
            ChartSeries::new(year.clone(), counts.into_iter().map(|n| n as f64).collect())
        })
        .collect();

    let chart = Chart::new(
        format!("{title} {}", win.title_suffix()),
        ChartData::Bar { categories, series },
    )
    .labels(axis, "Frecuencia");
    Ok(Some(StageOutput::new().chart(name, chart)))
}

fn discharge_reason_bars(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    category_bars(
        ds,
        Field::DischargeReason,
        "barras_motivo_egreso_comparativo",
        "Frecuencia por Motivo de Egreso",
        "Motivo de Egreso",
    )
}

fn admission_type_bars(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    category_bars(
        ds,
        Field::AdmissionType,
        "barras_tipo_ingreso_comparativo",
        "Distribución por Tipo de Ingreso",
        "Tipo de Ingreso",
    )
}

fn sex_bars(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    category_bars(
        ds,
        Field::Sex,
        "barras_sexo_comparativo",
        "Distribución por Sexo",
        "Sexo",
    )
}

/// Averaged column and the field it averages, when the dataset has it.
const METRICS: [(&str, Field); 3] = [
    ("peso_grd_medio", Field::DrgWeight),
    ("estancia_media", Field::LengthOfStay),
    ("edad_media", Field::Age),
];

fn hospital_comparison(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    let metrics: Vec<&str> = METRICS
        .iter()
        .filter(|(_, field)| ds.has(*field))
        .map(|(name, _)| *name)
        .collect();
    let mut fields = vec![(Field::Hospital, HOSPITAL)];
    fields.extend(
        METRICS
            .iter()
            .filter(|(_, field)| ds.has(*field))
            .map(|(name, field)| (*field, *name)),
    );
    let Some(win) = Windowed::of(ds, &fields)? else {
        return Ok(None);
    };

    let mut aggs = vec![len().cast(DataType::UInt64).alias(DISCHARGES)];
    aggs.extend(metrics.iter().map(|name| col(*name).mean().alias(*name)));
    let stats = ops::present(win.frame, &[HOSPITAL])
        .group_by([col(YEAR), col(HOSPITAL)])
        .agg(aggs)
        .sort_by_exprs([col(YEAR), col(HOSPITAL)], SortMultipleOptions::default())
        .collect()?;
    if stats.height() == 0 {
        return Ok(None);
    }

    let of_year = |year: i32| stats.clone().lazy().filter(col(YEAR).eq(lit(year)));
    let [prev_year, curr_year] = win.window.years();

    let mut comparison = stats
        .clone()
        .lazy()
        .select([col(HOSPITAL).unique().sort(SortOptions::default())]);
    for year in [prev_year, curr_year] {
        let mut renamed = vec![
            col(HOSPITAL),
            col(DISCHARGES).alias(format!("{DISCHARGES}_{year}")),
        ];
        renamed.extend(metrics.iter().map(|name| col(*name).alias(format!("{name}_{year}"))));
        comparison = comparison.join(
            of_year(year).select(renamed),
            [col(HOSPITAL)],
            [col(HOSPITAL)],
            JoinArgs::new(JoinType::Left),
        );
    }
    let (previous, current) = (
        format!("{DISCHARGES}_{prev_year}"),
        format!("{DISCHARGES}_{curr_year}"),
    );
    let comparison = comparison
        .with_columns([
            col(previous.as_str()).fill_null(lit(0u64)),
            col(current.as_str()).fill_null(lit(0u64)),
        ])
        .with_column(
            ops::pct_change(col(previous.as_str()), col(current.as_str()))
                .alias("variacion_egresos_pct"),
        )
        .collect()?;

    Ok(Some(
        StageOutput::new()
            .table("comparativo_hospital", comparison)
            .table("hospitales_anio_anterior", of_year(prev_year).collect()?)
            .table("hospitales_anio_actual", of_year(curr_year).collect()?),
    ))
}

/// One line chart per hospital: monthly discharges of both compared years.
fn hospital_evolution(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    let Some(win) = Windowed::of(ds, &[(Field::Hospital, HOSPITAL)])? else {
        return Ok(None);
    };
    let counts = ops::count_by(win.frame.clone(), &[HOSPITAL, YEAR, MONTH])?;
    if counts.height() == 0 {
        return Ok(None);
    }

    let mut hospitals = ops::strings(&counts, HOSPITAL)?;
    hospitals.dedup();
    let months: Vec<u32> = win.window.months().collect();
    let mut output = StageOutput::new();
    let mut used = HashSet::new();
    for hospital in hospitals {
        let by_month = month_counts(
            &counts
                .clone()
                .lazy()
                .filter(col(HOSPITAL).eq(lit(hospital.as_str())))
                .collect()?,
        )?;
        let series = win
            .window
            .years()
            .iter()
            .map(|year| {
                ChartSeries::new(
                    year.to_string(),
                    months
                        .iter()
                        .map(|m| by_month.get(&(*year, *m)).copied().unwrap_or(0) as f64)
                        .collect(),
                )
            })
            .collect();
        let chart = Chart::new(
            format!("Evolución de Egresos - {hospital} {}", win.title_suffix()),
            ChartData::Line {
                x_labels: months.iter().map(u32::to_string).collect(),
                series,
            },
        )
        .labels("Mes", "Egresos");

        let base = format!("evolucion_egresos_{}", sanitize_segment(&hospital));
        let mut name = base.clone();
        let mut n = 1;
        while !used.insert(name.clone()) {
            name = format!("{base}_{n}");
            n += 1;
        }
        output = output.chart(name, chart);
    }
    Ok(Some(output))
}

fn monthly_discharges(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    let Some(win) = Windowed::of(ds, &[])? else {
        return Ok(None);
    };
    let counts = month_counts(&ops::count_by(win.frame.clone(), &[YEAR, MONTH])?)?;

    let months: Vec<u32> = win.window.months().collect();
    let per_year = |year: i32| -> Vec<u64> {
        months
            .iter()
            .map(|m| counts.get(&(year, *m)).copied().unwrap_or(0))
            .collect()
    };
    let [prev_year, curr_year] = win.window.years();
    let previous = per_year(prev_year);
    let current = per_year(curr_year);
    let (prev_col, curr_col) = (
        format!("{DISCHARGES}_{prev_year}"),
        format!("{DISCHARGES}_{curr_year}"),
    );

    let table = ops::table(vec![
        Column::new(MONTH.into(), months.clone()),
        Column::new(prev_col.as_str().into(), previous.clone()),
        Column::new(curr_col.as_str().into(), current.clone()),
    ])?
    .lazy()
    .with_column(
        ops::pct_change(col(prev_col.as_str()), col(curr_col.as_str())).alias("variacion_pct"),
    )
    .collect()?;

    let as_f64 = |v: &[u64]| v.iter().map(|n| *n as f64).collect::<Vec<_>>();
    let chart = Chart::new(
        format!("Egresos Mensuales {}", win.title_suffix()),
        ChartData::Bar {
            categories: months.iter().map(u32::to_string).collect(),
            series: vec![
                ChartSeries::new(prev_year.to_string(), as_f64(&previous)),
                ChartSeries::new(curr_year.to_string(), as_f64(&current)),
            ],
        },
    )
    .labels("Mes", "Egresos");

    Ok(Some(
        StageOutput::new()
            .table("egresos_mensuales_comparativo", table)
            .chart("egresos_mensuales_comparativo", chart),
    ))
}
