//! Clinical management: length of stay by diagnosis, admission type and
//! insurance, diagnosis frequencies by age group and the most frequent
//! diagnoses.

use super::analyzer::{Analyzer, Stage, StageOutput};
use super::ops::{self, Order};
use super::AnalyzerKind;
use crate::charts::{Chart, ChartData, ChartSeries};
use crate::error::Result;
use crate::schema::{Field, ValidatedDataset};

pub struct ClinicalAnalyzer;

/// Diagnoses shown in the top-diagnoses table and chart.
pub const TOP_DIAGNOSES: usize = 10;

const MEAN_STAY: &str = "estancia_promedio";

static STAGES: [Stage; 6] = [
    Stage::new(
        "estancia_promedio_por_diagnostico",
        &[Field::LengthOfStay, Field::PrimaryDiagnosis],
        stay_by_diagnosis,
    ),
    Stage::new(
        "estancia_promedio_por_tipo_ingreso",
        &[Field::AdmissionType, Field::LengthOfStay],
        stay_by_admission_type,
    ),
    Stage::new(
        "frecuencia_diagnosticos_por_edad",
        &[Field::Age, Field::PrimaryDiagnosis],
        diagnoses_by_age,
    ),
    Stage::new(
        "boxplot_estancia_por_prevision",
        &[Field::LengthOfStay, Field::Insurance],
        stay_by_insurance,
    ),
    Stage::new(
        "scatter_peso_vs_estancia",
        &[Field::DrgWeight, Field::LengthOfStay],
        weight_vs_stay,
    ),
    Stage::new("top_diagnosticos", &[Field::PrimaryDiagnosis], top_diagnoses),
];

impl Analyzer for ClinicalAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Clinical
    }

    fn stages(&self) -> &'static [Stage] {
        &STAGES
    }
}

fn mean_stay_by(
    ds: &ValidatedDataset,
    field: Field,
    key: &str,
    name: &str,
) -> Result<Option<StageOutput>> {
    let frame = ds.lazy().select([
        ds.col(field)?.alias(key),
        ds.col(Field::LengthOfStay)?.alias(MEAN_STAY),
    ]);
    let table = ops::group_mean(frame, key, MEAN_STAY, Order::LargestFirst)?;
    if table.height() == 0 {
        return Ok(None);
    }
    Ok(Some(StageOutput::new().table(name, table)))
}

fn stay_by_diagnosis(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    mean_stay_by(
        ds,
        Field::PrimaryDiagnosis,
        "diagnostico",
        "estancia_promedio_por_diagnostico",
    )
}

fn stay_by_admission_type(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    mean_stay_by(
        ds,
        Field::AdmissionType,
        "tipo_ingreso",
        "estancia_promedio_por_tipo_ingreso",
    )
}

fn diagnoses_by_age(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    let crosstab = ops::by_age_group(ds, Field::PrimaryDiagnosis, "diagnostico")?;
    if crosstab.is_empty() {
        return Ok(None);
    }
    let table = crosstab.pivot(&ops::age_rows())?;
    Ok(Some(
        StageOutput::new().table("frecuencia_diagnosticos_por_edad", table),
    ))
}

fn stay_by_insurance(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    let frame = ds.lazy().select([
        ds.col(Field::Insurance)?.alias("prevision"),
        ds.col(Field::LengthOfStay)?.alias("estancia"),
    ]);
    let groups = ops::group_values(frame, "prevision", "estancia")?;
    if groups.is_empty() {
        return Ok(None);
    }

    let chart = Chart::new(
        "Distribución de Estancia por Previsión",
        ChartData::BoxPlot {
            groups: groups
                .into_iter()
                .map(|(k, v)| ChartSeries::new(k, v))
                .collect(),
        },
    )
    .labels("Previsión", "Estancia del Episodio");
    Ok(Some(
        StageOutput::new().chart("boxplot_estancia_por_prevision", chart),
    ))
}

fn weight_vs_stay(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    let frame = ds.lazy().select([
        ds.col(Field::DrgWeight)?.alias("peso"),
        ds.col(Field::LengthOfStay)?.alias("estancia"),
    ]);
    let points = ops::points(frame, "peso", "estancia")?;
    if points.is_empty() {
        return Ok(None);
    }
    let chart = Chart::new(
        "Relación entre Peso GRD y Estancia del Episodio",
        ChartData::Scatter { points },
    )
    .labels("Peso GRD", "Estancia del Episodio");
    Ok(Some(StageOutput::new().chart("scatter_peso_vs_estancia", chart)))
}

fn top_diagnoses(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    let table = ops::field_counts(ds, Field::PrimaryDiagnosis, "diagnostico")?.head(Some(TOP_DIAGNOSES));
    if table.height() == 0 {
        return Ok(None);
    }

    let chart = Chart::new(
        format!("Top {TOP_DIAGNOSES} Diagnósticos"),
        ChartData::HorizontalBar {
            categories: ops::strings(&table, "diagnostico")?,
            values: ops::floats(&table, ops::FREQUENCY)?,
        },
    )
    .labels("Egresos", "Diagnóstico");

    Ok(Some(
        StageOutput::new()
            .table("top_diagnosticos", table)
            .chart("barras_top_diagnosticos", chart),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::schema::validate;
    use polars::prelude::*;

    fn dataset(diagnoses: Vec<String>) -> ValidatedDataset {
        let n = diagnoses.len();
        let frame = df!(
            "Fecha Egreso" => vec!["2024-03-01"; n],
            "Edad en Años" => (0..n).map(|i| (i * 7 % 90) as f64).collect::<Vec<_>>(),
            "DG01 principal (descripcion)" => diagnoses,
            "Valor a Pagar" => vec![100.0; n],
            "Estancia del episodio" => (0..n).map(|i| (i % 5) as f64).collect::<Vec<_>>(),
        )
        .expect("frame");
        validate(&Dataset::from_frame("clinico", frame)).expect("valid")
    }

    #[test]
    fn test_top_diagnoses_capped() -> anyhow::Result<()> {
        let diagnoses: Vec<String> = (0..30).map(|i| format!("D{:02}", i % 15)).collect();
        let output = top_diagnoses(&dataset(diagnoses))?.expect("top");
        assert_eq!(output.tables[0].1.height(), TOP_DIAGNOSES);
        assert_eq!(output.charts[0].0, "barras_top_diagnosticos");
        Ok(())
    }

    #[test]
    fn test_diagnoses_by_age_is_wide() -> anyhow::Result<()> {
        let diagnoses = vec!["A00".to_owned(), "B20".to_owned(), "A00".to_owned()];
        let output = diagnoses_by_age(&dataset(diagnoses))?.expect("crosstab");
        let table = &output.tables[0].1;
        assert_eq!(table.height(), 3);
        assert_eq!(table.width(), 3);
        // ages 0, 7, 14: all in the youngest group
        let a00 = table.column("A00")?.as_materialized_series().u64()?.get(0);
        assert_eq!(a00, Some(2));
        Ok(())
    }

    #[test]
    fn test_stages_without_optional_fields() {
        let ds = dataset(vec!["A00".to_owned()]);
        // no admission type, insurance or GRD weight
        assert_eq!(ClinicalAnalyzer.planned_steps(&ds), 3);
    }
}
