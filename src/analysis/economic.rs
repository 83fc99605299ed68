//! Amounts billed against base prices, cost per bed day and monthly billing.

use polars::prelude::{LazyFrame, col, lit, when};

use super::analyzer::{Analyzer, Stage, StageOutput};
use super::ops::{self, Order};
use super::AnalyzerKind;
use crate::charts::{Chart, ChartData, ChartSeries};
use crate::error::Result;
use crate::schema::{Field, ValidatedDataset};

pub struct EconomicAnalyzer;

const ACTIVITY: &str = "tipo_actividad";
const COST_PER_DAY: &str = "costo_por_dia";

static STAGES: [Stage; 6] = [
    Stage::new(
        "comparacion_valores",
        &[Field::BasePrice, Field::AmountDue],
        value_comparison,
    ),
    Stage::new(
        "desviacion_promedio_por_diagnostico",
        &[Field::PrimaryDiagnosis, Field::BasePrice, Field::AmountDue],
        deviation_by_diagnosis,
    ),
    Stage::new(
        "costo_promedio_por_dia",
        &[Field::AmountDue, Field::LengthOfStay, Field::ActivityType],
        mean_cost_per_day,
    ),
    Stage::new(
        "scatter_valores",
        &[Field::BasePrice, Field::AmountDue],
        value_scatter,
    ),
    Stage::new(
        "boxplot_costo_por_dia",
        &[Field::AmountDue, Field::LengthOfStay, Field::ActivityType],
        cost_per_day_boxplot,
    ),
    Stage::new(
        "valor_mensual",
        &[Field::DischargeDate, Field::AmountDue],
        monthly_amount,
    ),
];

impl Analyzer for EconomicAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Economic
    }

    fn stages(&self) -> &'static [Stage] {
        &STAGES
    }
}

fn value_comparison(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    let table = ops::table(vec![
        ops::text_column(
            "estadistico",
            ["media", "desv_std", "min", "max"].map(str::to_owned).to_vec(),
        ),
        ops::optional_number_column(
            "valor_precio_base",
            ops::spread(&ds.series(Field::BasePrice)?)?.to_vec(),
        ),
        ops::optional_number_column(
            "valor_a_pagar",
            ops::spread(&ds.series(Field::AmountDue)?)?.to_vec(),
        ),
    ])?;
    Ok(Some(StageOutput::new().table("comparacion_valores", table)))
}

fn deviation_by_diagnosis(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    let frame = ds.lazy().select([
        ds.col(Field::PrimaryDiagnosis)?.alias("diagnostico"),
        (ds.col(Field::AmountDue)? - ds.col(Field::BasePrice)?).alias("desviacion_promedio"),
    ]);
    let table = ops::group_mean(frame, "diagnostico", "desviacion_promedio", Order::LargestFirst)?;
    if table.height() == 0 {
        return Ok(None);
    }
    Ok(Some(
        StageOutput::new().table("desviacion_promedio_por_diagnostico", table),
    ))
}

/// Activity type and amount due per bed day; a stay of zero days counts as
/// one. Rows without a finite cost are dropped.
fn cost_per_day(ds: &ValidatedDataset) -> Result<LazyFrame> {
    let stay = ds.col(Field::LengthOfStay)?;
    let days = when(stay.clone().eq(lit(0.0)))
        .then(lit(1.0))
        .otherwise(stay);
    Ok(ds
        .lazy()
        .select([
            ds.col(Field::ActivityType)?.alias(ACTIVITY),
            (ds.col(Field::AmountDue)? / days).alias(COST_PER_DAY),
        ])
        .filter(ops::is_finite(col(COST_PER_DAY))))
}

fn mean_cost_per_day(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    let table = ops::group_mean(cost_per_day(ds)?, ACTIVITY, COST_PER_DAY, Order::LargestFirst)?;
    if table.height() == 0 {
        return Ok(None);
    }
    Ok(Some(StageOutput::new().table("costo_promedio_por_dia", table)))
}

fn value_scatter(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    let frame = ds.lazy().select([
        ds.col(Field::BasePrice)?.alias("precio_base"),
        ds.col(Field::AmountDue)?.alias("valor_a_pagar"),
    ]);
    let points = ops::points(frame, "precio_base", "valor_a_pagar")?;
    if points.is_empty() {
        return Ok(None);
    }

    let chart = Chart::new("Valor a Pagar vs Precio Base", ChartData::Scatter { points })
        .labels("Valor Precio Base", "Valor a Pagar");
    Ok(Some(StageOutput::new().chart("scatter_valores", chart)))
}

fn cost_per_day_boxplot(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    let groups = ops::group_values(cost_per_day(ds)?, ACTIVITY, COST_PER_DAY)?;
    if groups.is_empty() {
        return Ok(None);
    }

    let chart = Chart::new(
        "Costo por Día según Tipo de Actividad",
        ChartData::BoxPlot {
            groups: groups
                .into_iter()
                .map(|(k, v)| ChartSeries::new(k, v))
                .collect(),
        },
    )
    .labels("Tipo de Actividad", "Costo por Día");
    Ok(Some(StageOutput::new().chart("boxplot_costo_por_dia", chart)))
}

fn monthly_amount(ds: &ValidatedDataset) -> Result<Option<StageOutput>> {
    let frame = ds.lazy().select([
        ops::month_key(ds.col(Field::DischargeDate)?).alias("mes"),
        ds.col(Field::AmountDue)?.alias("valor_a_pagar"),
    ]);
    let table = ops::group_sum(frame, "mes", "valor_a_pagar", Order::Key)?;
    if table.height() == 0 {
        return Ok(None);
    }

    let chart = Chart::new(
        "Valor a Pagar por Mes de Egreso",
        ChartData::Bar {
            categories: ops::strings(&table, "mes")?,
            series: vec![ChartSeries::new(
                "Valor a Pagar",
                ops::floats(&table, "valor_a_pagar")?,
            )],
        },
    )
    .labels("Mes", "Valor a Pagar");

    Ok(Some(
        StageOutput::new()
            .table("valor_a_pagar_mensual", table)
            .chart("barras_valor_a_pagar_mensual", chart),
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
            "Fecha Egreso" => ["2024-01-10", "2024-01-20", "2024-02-05"],
            "Edad en Años" => [30.0, 50.0, 70.0],
            "DG01 principal (descripcion)" => ["A00", "A00", "B20"],
            "Valor a Pagar" => [1000.0, 3000.0, 500.0],
            "Valor Precio Base" => [800.0, 2000.0, 600.0],
            "Estancia del episodio" => [0.0, 3.0, 5.0],
            "Tipo Actividad" => ["Hospitalizado", "Hospitalizado", "CMA"],
        )
        .expect("frame");
        validate(&Dataset::from_frame("economico", frame)).expect("valid")
    }

    #[test]
    fn test_zero_day_stay_counts_as_one_day() -> anyhow::Result<()> {
        let costs = cost_per_day(&dataset())?.collect()?;
        assert_eq!(ops::floats(&costs, COST_PER_DAY)?, vec![1000.0, 1000.0, 100.0]);
        Ok(())
    }

    #[test]
    fn test_value_comparison_reports_spread() -> anyhow::Result<()> {
        let output = value_comparison(&dataset())?.expect("comparison");
        let due = output.tables[0].1.column("valor_a_pagar")?.as_materialized_series().f64()?.clone();
        assert_eq!(due.get(0), Some(1500.0));
        assert!(due.get(1).is_some_and(|std| (std - 1322.8756).abs() < 1e-3));
        assert_eq!(due.get(2), Some(500.0));
        assert_eq!(due.get(3), Some(3000.0));
        Ok(())
    }

    #[test]
    fn test_deviation_sorted_descending() -> anyhow::Result<()> {
        let output = deviation_by_diagnosis(&dataset())?.expect("deviation");
        let table = &output.tables[0].1;
        let keys = table.column("diagnostico")?.as_materialized_series().str()?.get(0);
        let values = table.column("desviacion_promedio")?.as_materialized_series().f64()?.get(0);
        assert_eq!(keys, Some("A00"));
        assert_eq!(values, Some(600.0));
        Ok(())
    }

    #[test]
    fn test_monthly_amount_sums_by_month() -> anyhow::Result<()> {
        let output = monthly_amount(&dataset())?.expect("monthly");
        let table = &output.tables[0].1;
        assert_eq!(table.height(), 2);
        let january = table.column("valor_a_pagar")?.as_materialized_series().f64()?.get(0);
        assert_eq!(january, Some(4000.0));
        Ok(())
    }

    #[test]
    fn test_every_stage_runnable() {
        assert_eq!(EconomicAnalyzer.planned_steps(&dataset()), 6);
    }
}
