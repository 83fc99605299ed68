//! Cohorts by age group, sex and admission month.

use polars::prelude::LazyFrame;

use super::analyzer::{Analyzer, Stage, StageOutput};
use super::ops::{self, Order};
use super::AnalyzerKind;
use crate::charts::{Chart, ChartData, ChartSeries};
use crate::error::Result;
use crate::schema::{Field, ValidatedDataset};

pub struct CohortAnalyzer;

/// Most frequent diagnoses kept as heatmap columns.
const HEATMAP_COLUMNS: usize = 25;

const ADMISSION_MONTH: &str = "mes_ingreso";

static STAGES: [Stage; 5] = [
    Stage::new(
        "diagnosticos_por_grupo_etario",
        &[Field::Age, Field::PrimaryDiagnosis],
        diagnoses_by_age_group,
    ),
    Stage::new(
        "heatmap_diagnosticos_etario",
        &[Field::Age, Field::PrimaryDiagnosis],
        diagnoses_heatmap,
    ),
    Stage::new(
        "ingresos_por_mes",
        &[Field::AdmissionDate, Field::AmountDue],
        mean_amount_by_month,
    ),
    Stage::new(
        "linea_ingresos_mensuales",
        &[Field::AdmissionDate, Field::AmountDue],
        monthly_income_line,
    ),
    Stage::new(
        "egresos_por_grupo_etario_y_sexo",
        &[Field::Age, Field::Sex],
        discharges_by_age_and_sex,
    ),
];

impl Analyzer for CohortAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Cohort
    }

    fn stages(&self) -> &'static [Stage] {
        &STAGES
    }
}

fn diagnoses_by_age_group(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    let crosstab = ops::by_age_group(ds, Field::PrimaryDiagnosis, "diagnostico")?;
    if crosstab.is_empty() {
        return Ok(None);
    }
    let table = crosstab.pivot(&ops::age_rows())?;
    Ok(Some(
        StageOutput::new().table("diagnosticos_por_grupo_etario", table),
    ))
}

fn diagnoses_heatmap(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    let crosstab = ops::by_age_group(ds, Field::PrimaryDiagnosis, "diagnostico")?;
    if crosstab.is_empty() {
        return Ok(None);
    }

    let top = ops::field_counts(ds, Field::PrimaryDiagnosis, "diagnostico")?.head(Some(HEATMAP_COLUMNS));
    let mut columns = ops::strings(&top, "diagnostico")?;
    columns.sort();

    let rows = ops::age_rows();
    let values = crosstab
        .matrix(&rows, &columns)?
        .into_iter()
        .map(|counts| counts.into_iter().map(|n| n as f64).collect())
        .collect();

    let chart = Chart::new(
        "Heatmap de Diagnósticos por Grupo Etario",
        ChartData::Heatmap {
            rows,
            columns,
            values,
        },
    )
    .labels("Diagnóstico", "Grupo Etario");
    Ok(Some(
        StageOutput::new().chart("heatmap_diagnosticos_etario", chart),
    ))
}

fn admission_month_amounts(ds: &ValidatedDataset, value: &str) -> Result<LazyFrame> {
    Ok(ds.lazy().select([
        ops::month_key(ds.col(Field::AdmissionDate)?).alias(ADMISSION_MONTH),
        ds.col(Field::AmountDue)?.alias(value),
    ]))
}

fn mean_amount_by_month(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    let frame = admission_month_amounts(ds, "valor_a_pagar_promedio")?;
    let table = ops::group_mean(frame, ADMISSION_MONTH, "valor_a_pagar_promedio", Order::Key)?;
    if table.height() == 0 {
        return Ok(None);
    }
    Ok(Some(StageOutput::new().table("ingresos_por_mes", table)))
}

fn monthly_income_line(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    let frame = admission_month_amounts(ds, "ingresos")?;
    let sums = ops::group_sum(frame, ADMISSION_MONTH, "ingresos", Order::Key)?;
    if sums.height() == 0 {
        return Ok(None);
    }
    let chart = Chart::new(
        "Línea de Ingresos Mensuales",
        ChartData::Line {
            x_labels: ops::strings(&sums, ADMISSION_MONTH)?,
            series: vec![ChartSeries::new(
                "Ingresos Totales",
                ops::floats(&sums, "ingresos")?,
            )],
        },
    )
    .labels("Mes de Ingreso", "Ingresos Totales");
    Ok(Some(StageOutput::new().chart("linea_ingresos_mensuales", chart)))
}

fn discharges_by_age_and_sex(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    let crosstab = ops::by_age_group(ds, Field::Sex, "sexo")?;
    if crosstab.is_empty() {
        return Ok(None);
    }

    let rows = ops::age_rows();
    let table = crosstab.pivot(&rows)?;

    let sexes = crosstab.column_keys()?;
    let matrix = crosstab.matrix(&rows, &sexes)?;
    let series = sexes
        .into_iter()
        .enumerate()
        .map(|(i, sex)| {
            let values = matrix
                .iter()
                .map(|counts| counts.get(i).copied().unwrap_or(0) as f64)
                .collect();
            ChartSeries::new(sex, values)
        })
        .collect();

    let chart = Chart::new(
        "Egresos por Grupo Etario y Sexo",
        ChartData::StackedBar {
            categories: rows,
            series,
        },
    )
    .labels("Grupo Etario", "Egresos");

    Ok(Some(
        StageOutput::new()
            .table("egresos_por_grupo_etario_y_sexo", table)
            .chart("barras_egresos_por_grupo_etario_y_sexo", chart),
    ))
}
