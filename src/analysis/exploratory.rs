//! First look at a dataset: a descriptive summary of every column and the
//! distributions of age, discharge reason and activity type.

use super::analyzer::{Analyzer, Stage, StageOutput};
use super::ops;
use super::AnalyzerKind;
use crate::charts::{Chart, ChartData, ChartSeries};
use crate::error::Result;
use crate::schema::{Field, ValidatedDataset};

pub struct ExploratoryAnalyzer;

static STAGES: [Stage; 4] = [
    Stage::new("resumen_estadistico", &[], summary),
    Stage::new("histograma_edad", &[Field::Age], age_histogram),
    Stage::new("motivo_egreso", &[Field::DischargeReason], discharge_reasons),
    Stage::new("tipo_actividad", &[Field::ActivityType], activity_types),
];

const AGE_BINS: usize = 20;

impl Analyzer for ExploratoryAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Exploratory
    }

    fn stages(&self) -> &'static [Stage] {
        &STAGES
    }
}

fn summary(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    let table = ops::describe(ds.frame())?;
    Ok(Some(StageOutput::new().table("resumen_estadistico", table)))
}

fn age_histogram(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    let ages: Vec<f64> = ds.numbers(Field::Age)?.into_iter().flatten().collect();
    if ages.is_empty() {
        return Ok(None);
    }
    let chart = Chart::new(
        "Histograma de Edad",
        ChartData::Histogram {
            values: ages,
            bins: AGE_BINS,
        },
    )
    .labels("Edad", "Frecuencia");
    Ok(Some(StageOutput::new().chart("histograma_edad", chart)))
}

fn discharge_reasons(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    frequency(
        ds,
        Field::DischargeReason,
        "motivo_egreso",
        "Frecuencia por Motivo de Egreso",
        "Motivo de Egreso",
    )
}

fn activity_types(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    frequency(
        ds,
        Field::ActivityType,
        "tipo_actividad",
        "Distribución por Tipo de Actividad",
        "Tipo de Actividad",
    )
}

/// `frecuencia_{key}` table plus `barras_{key}` chart.
fn frequency(
    ds: &ValidatedDataset,
    field: Field,
    key: &str,
    title: &str,
    axis: &str,
) -> Result<Option<StageOutput>> {
    let table = ops::field_counts(ds, field, key)?;
    if table.height() == 0 {
        return Ok(None);
    }

    let chart = Chart::new(
        title,
        ChartData::Bar {
            categories: ops::strings(&table, key)?,
            series: vec![ChartSeries::new(
                "Frecuencia",
                ops::floats(&table, ops::FREQUENCY)?,
            )],
        },
    )
    .labels(axis, "Frecuencia");

    Ok(Some(
        StageOutput::new()
            .table(format!("frecuencia_{key}"), table)
            .chart(format!("barras_{key}"), chart),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::schema::validate;
    use polars::prelude::*;

    fn dataset() -> ValidatedDataset {
        let frame = df!(
            "Fecha Egreso" => ["2024-01-01", "2024-01-02", "2024-01-03"],
            "Edad en Años" => [5.0, 40.0, 77.0],
            "DG01 principal (descripcion)" => ["A00", "A00", "B20"],
            "Valor a Pagar" => [100.0, 200.0, 300.0],
            "Motivo Egreso (descripción)" => ["Alta", "Alta", "Traslado"],
        )
        .expect("frame");
        validate(&Dataset::from_frame("exploratorio", frame)).expect("valid")
    }

    #[test]
    fn test_frequency_stage_builds_table_and_chart() -> anyhow::Result<()> {
        let output = discharge_reasons(&dataset())?.expect("reasons present");
        let (name, table) = &output.tables[0];
        assert_eq!(name, "frecuencia_motivo_egreso");
        assert_eq!(table.height(), 2);
        let top = table.column("motivo_egreso")?.as_materialized_series().str()?.get(0);
        assert_eq!(top, Some("Alta"));
        assert_eq!(output.charts[0].0, "barras_motivo_egreso");
        Ok(())
    }

    #[test]
    fn test_summary_has_one_row_per_column() -> anyhow::Result<()> {
        let ds = dataset();
        let output = summary(&ds)?.expect("summary");
        assert_eq!(output.tables[0].1.height(), ds.frame().width());
        Ok(())
    }

    #[test]
    fn test_planned_steps_without_activity_type() {
        assert_eq!(ExploratoryAnalyzer.declared_steps(), 4);
        assert_eq!(ExploratoryAnalyzer.planned_steps(&dataset()), 3);
    }
}
