//! Aggregation helpers shared by the analyzers.
//!
//! Stages build a lazy selection over a
//! [`ValidatedDataset`](crate::schema::ValidatedDataset), naming each column
//! after the table key it becomes, and hand it to the group-bys here. Nulls
//! are filtered out before grouping, never treated as zero.

use chrono::{Datelike as _, NaiveDate};
use polars::prelude::*;
use std::collections::HashMap;

use crate::error::Result;
use crate::schema::{Field, ValidatedDataset};

/// Age group labels in bin order.
pub const AGE_GROUPS: [&str; 3] = ["0-18", "19-59", "60+"];

pub const AGE_GROUP: &str = "grupo_etario";

/// Count column of frequency tables.
pub const FREQUENCY: &str = "frecuencia";

pub fn age_rows() -> Vec<String> {
    AGE_GROUPS.map(str::to_owned).to_vec()
}

/// Half-open bins `[0, 19)`, `[19, 60)`, `[60, ∞)`. Negative or non-finite
/// ages have no group.
pub fn age_group(age: Expr) -> Expr {
    let valid = age.clone().gt_eq(lit(0.0)).and(is_finite(age.clone()));
    when(valid.clone().and(age.clone().lt(lit(19.0))))
        .then(lit(AGE_GROUPS[0]))
        .when(valid.clone().and(age.lt(lit(60.0))))
        .then(lit(AGE_GROUPS[1]))
        .when(valid)
        .then(lit(AGE_GROUPS[2]))
        .otherwise(lit(NULL).cast(DataType::String))
}

pub fn is_finite(value: Expr) -> Expr {
    value
        .clone()
        .gt(lit(f64::NEG_INFINITY))
        .and(value.lt(lit(f64::INFINITY)))
}

/// `YYYY-MM` of a date column.
pub fn month_key(date: Expr) -> Expr {
    date.dt().strftime("%Y-%m")
}

/// Relative change in percent; a zero baseline yields `0.0`.
pub fn pct_change(previous: Expr, current: Expr) -> Expr {
    let previous = previous.cast(DataType::Float64);
    when(previous.clone().eq(lit(0.0)))
        .then(lit(0.0))
        .otherwise((current.cast(DataType::Float64) - previous.clone()) / previous * lit(100.0))
}

/// Keeps rows where every one of `columns` is present.
pub fn present(frame: LazyFrame, columns: &[&str]) -> LazyFrame {
    columns
        .iter()
        .fold(frame, |frame, c| frame.filter(col(*c).is_not_null()))
}

/// Occurrences of each present value, most frequent first, ties by value.
/// The result has the series' name as key column plus [`FREQUENCY`].
pub fn value_counts(values: &Series) -> Result<DataFrame> {
    let name = values.name().clone();
    let counts = values
        .drop_nulls()
        .value_counts(false, false, FREQUENCY.into(), false)?;
    Ok(counts
        .lazy()
        .with_column(col(FREQUENCY).cast(DataType::UInt64))
        .sort_by_exprs(
            [col(FREQUENCY), col(name)],
            SortMultipleOptions::default().with_order_descending_multi([true, false]),
        )
        .collect()?)
}

/// Value counts of `field`, keyed as `key`.
pub fn field_counts(ds: &ValidatedDataset, field: Field, key: &str) -> Result<DataFrame> {
    value_counts(&ds.series(field)?.with_name(key.into()))
}

/// Row count per combination of `keys`, in key order.
pub fn count_by(frame: LazyFrame, keys: &[&str]) -> Result<DataFrame> {
    let by: Vec<Expr> = keys.iter().map(|k| col(*k)).collect();
    Ok(present(frame, keys)
        .group_by(by.clone())
        .agg([len().cast(DataType::UInt64).alias(FREQUENCY)])
        .sort_by_exprs(by, SortMultipleOptions::default())
        .collect()?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Ascending keys.
    Key,
    /// Largest aggregate first, ties by key.
    LargestFirst,
}

/// Mean of `value` per `key`.
pub fn group_mean(frame: LazyFrame, key: &str, value: &str, order: Order) -> Result<DataFrame> {
    aggregate(frame, key, value, col(value).mean(), order)
}

/// Sum of `value` per `key`.
pub fn group_sum(frame: LazyFrame, key: &str, value: &str, order: Order) -> Result<DataFrame> {
    aggregate(frame, key, value, col(value).sum(), order)
}

fn aggregate(frame: LazyFrame, key: &str, value: &str, agg: Expr, order: Order) -> Result<DataFrame> {
    let grouped = present(frame, &[key, value])
        .group_by([col(key)])
        .agg([agg.alias(value)]);
    let sorted = match order {
        Order::Key => grouped.sort_by_exprs([col(key)], SortMultipleOptions::default()),
        Order::LargestFirst => grouped.sort_by_exprs(
            [col(value), col(key)],
            SortMultipleOptions::default().with_order_descending_multi([true, false]),
        ),
    };
    Ok(sorted.collect()?)
}

/// Present values of `value` collected per `key`, keys ascending.
pub fn group_values(frame: LazyFrame, key: &str, value: &str) -> Result<Vec<(String, Vec<f64>)>> {
    let grouped = present(frame, &[key, value])
        .group_by([col(key)])
        .agg([col(value).cast(DataType::Float64)])
        .sort_by_exprs([col(key)], SortMultipleOptions::default())
        .collect()?;

    let keys = strings(&grouped, key)?;
    let lists = grouped.column(value)?.as_materialized_series().list()?;
    let mut groups = Vec::with_capacity(keys.len());
    for (key, values) in keys.into_iter().zip(lists) {
        let values = match values {
            Some(series) => series.f64()?.into_iter().flatten().collect(),
            None => Vec::new(),
        };
        groups.push((key, values));
    }
    Ok(groups)
}

/// `(x, y)` pairs of the rows where both are present.
pub fn points(frame: LazyFrame, x: &str, y: &str) -> Result<Vec<(f64, f64)>> {
    let rows = present(frame, &[x, y]).collect()?;
    Ok(floats(&rows, x)?.into_iter().zip(floats(&rows, y)?).collect())
}

/// Mean, sample standard deviation, minimum and maximum of the present values.
pub fn spread(values: &Series) -> Result<[Option<f64>; 4]> {
    let floats = values.cast(&DataType::Float64)?;
    let ca = floats.f64()?;
    Ok([ca.mean(), ca.std(1), ca.min(), ca.max()])
}

/// Text values of `name`; nulls read as empty.
pub fn strings(frame: &DataFrame, name: &str) -> Result<Vec<String>> {
    let text = frame.column(name)?.as_materialized_series().cast(&DataType::String)?;
    Ok(text
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or_default().to_owned())
        .collect())
}

/// Numeric values of `name` as floats; nulls read as zero.
pub fn floats(frame: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let values = frame.column(name)?.as_materialized_series().cast(&DataType::Float64)?;
    Ok(values.f64()?.into_iter().map(Option::unwrap_or_default).collect())
}

/// Co-occurrence counts of two key columns, kept in long form
/// (`row`, `column`, [`FREQUENCY`]).
#[derive(Debug, Clone)]
pub struct Crosstab {
    counts: DataFrame,
    row: String,
    column: String,
}

impl Crosstab {
    pub fn new(frame: LazyFrame, row: &str, column: &str) -> Result<Self> {
        Ok(Self {
            counts: count_by(frame, &[row, column])?,
            row: row.to_owned(),
            column: column.to_owned(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.counts.height() == 0
    }

    /// Distinct column keys, ascending.
    pub fn column_keys(&self) -> Result<Vec<String>> {
        let keys = self
            .counts
            .column(&self.column)?
            .as_materialized_series()
            .unique()?
            .sort(SortOptions::default())?;
        Ok(keys.str()?.into_iter().flatten().map(str::to_owned).collect())
    }

    /// Counts laid out as `rows` × `columns`; pairs that never occur are zero.
    pub fn matrix(&self, rows: &[String], columns: &[String]) -> Result<Vec<Vec<u64>>> {
        let row_keys = self.counts.column(&self.row)?.as_materialized_series().str()?;
        let column_keys = self.counts.column(&self.column)?.as_materialized_series().str()?;
        let counts = self.counts.column(FREQUENCY)?.as_materialized_series().u64()?;
        let lookup: HashMap<(&str, &str), u64> = row_keys
            .into_iter()
            .zip(column_keys)
            .zip(counts)
            .filter_map(|((r, c), n)| Some(((r?, c?), n?)))
            .collect();

        Ok(rows
            .iter()
            .map(|r| {
                columns
                    .iter()
                    .map(|c| lookup.get(&(r.as_str(), c.as_str())).copied().unwrap_or(0))
                    .collect()
            })
            .collect())
    }

    /// Wide table: one row per entry of `rows`, one count column per column key.
    pub fn pivot(&self, rows: &[String]) -> Result<DataFrame> {
        let keys = self.column_keys()?;
        let matrix = self.matrix(rows, &keys)?;
        let mut columns = vec![Column::new(self.row.as_str().into(), rows.to_vec())];
        for (i, key) in keys.iter().enumerate() {
            let counts: Vec<u64> = matrix
                .iter()
                .map(|r| r.get(i).copied().unwrap_or(0))
                .collect();
            columns.push(Column::new(key.as_str().into(), counts));
        }
        Ok(DataFrame::new(columns)?)
    }
}

/// Crosstab of age group against `field`, keyed as `key`.
pub fn by_age_group(ds: &ValidatedDataset, field: Field, key: &str) -> Result<Crosstab> {
    let frame = ds.lazy().select([
        age_group(ds.col(Field::Age)?).alias(AGE_GROUP),
        ds.col(field)?.alias(key),
    ]);
    Crosstab::new(frame, AGE_GROUP, key)
}

/// Calendar window comparing the latest year to date against the same months
/// of the year before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearWindow {
    pub current_year: i32,
    pub through_month: u32,
}

impl YearWindow {
    /// Window ending at the latest present date; `None` without dates.
    pub fn from_dates(dates: &[Option<NaiveDate>]) -> Option<Self> {
        let latest = dates.iter().flatten().max()?;
        Some(Self {
            current_year: latest.year(),
            through_month: latest.month(),
        })
    }

    pub fn previous_year(&self) -> i32 {
        self.current_year - 1
    }

    /// Compared years, previous first.
    pub fn years(&self) -> [i32; 2] {
        [self.previous_year(), self.current_year]
    }

    /// Whether a `(year, month)` row falls in the window.
    pub fn contains(&self, year: Expr, month: Expr) -> Expr {
        month.lt_eq(lit(self.through_month)).and(
            year.clone()
                .eq(lit(self.current_year))
                .or(year.eq(lit(self.previous_year()))),
        )
    }

    pub fn months(&self) -> std::ops::RangeInclusive<u32> {
        1..=self.through_month
    }
}

pub fn text_column(name: &str, values: Vec<String>) -> Column {
    Column::new(name.into(), values)
}

pub fn number_column(name: &str, values: Vec<f64>) -> Column {
    Column::new(name.into(), values)
}

pub fn optional_number_column(name: &str, values: Vec<Option<f64>>) -> Column {
    Column::new(name.into(), values)
}

pub fn table(columns: Vec<Column>) -> Result<DataFrame> {
    Ok(DataFrame::new(columns)?)
}

/// Per-column summary: count, nulls, mean, std, min, max, distinct values and
/// the most frequent value. Numeric statistics are null for other columns.
pub fn describe(frame: &DataFrame) -> Result<DataFrame> {
    let mut names = Vec::new();
    let mut counts = Vec::new();
    let mut nulls = Vec::new();
    let mut stats: [Vec<Option<f64>>; 4] = Default::default();
    let mut uniques = Vec::new();
    let mut tops: Vec<Option<String>> = Vec::new();

    for column in frame.get_columns() {
        let series = column.as_materialized_series();
        names.push(series.name().to_string());
        counts.push((series.len() - series.null_count()) as u64);
        nulls.push(series.null_count() as u64);

        let values = if series.dtype().is_primitive_numeric() {
            spread(series)?
        } else {
            [None; 4]
        };
        for (stat, value) in stats.iter_mut().zip(values) {
            stat.push(value);
        }

        let present = series.drop_nulls();
        uniques.push(present.n_unique()? as u64);
        let text = present.cast(&DataType::String)?;
        let top = value_counts(&text)?;
        tops.push(strings(&top, text.name())?.into_iter().next());
    }

    let [means, stds, mins, maxs] = stats;
    table(vec![
        Column::new("columna".into(), names),
        Column::new("conteo".into(), counts),
        Column::new("nulos".into(), nulls),
        Column::new("media".into(), means),
        Column::new("desv_std".into(), stds),
        Column::new("min".into(), mins),
        Column::new("max".into(), maxs),
        Column::new("unicos".into(), uniques),
        Column::new("top".into(), tops),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn test_age_bins_are_half_open() -> anyhow::Result<()> {
        let ages = df!("edad" => [Some(0.0), Some(18.9), Some(19.0), Some(59.99), Some(60.0), Some(-1.0), Some(f64::NAN), None])?;
        let groups = ages
            .lazy()
            .select([age_group(col("edad")).alias(AGE_GROUP)])
            .collect()?;
        let groups: Vec<Option<String>> = groups
            .column(AGE_GROUP)?
            .as_materialized_series()
            .str()?
            .into_iter()
            .map(|g| g.map(str::to_owned))
            .collect();
        let expected = [
            Some("0-18"),
            Some("0-18"),
            Some("19-59"),
            Some("19-59"),
            Some("60+"),
            None,
            None,
            None,
        ];
        assert_eq!(groups, expected.map(|g| g.map(str::to_owned)).to_vec());
        Ok(())
    }

    fn changes(previous: Vec<f64>, current: Vec<f64>) -> anyhow::Result<Vec<f64>> {
        let frame = df!("previo" => previous, "actual" => current)?
            .lazy()
            .select([pct_change(col("previo"), col("actual")).alias("cambio")])
            .collect()?;
        Ok(floats(&frame, "cambio")?)
    }

    #[test]
    fn test_pct_change_with_zero_baseline() -> anyhow::Result<()> {
        let changes = changes(vec![0.0, 0.0, 40.0, 50.0], vec![25.0, 0.0, 50.0, 40.0])?;
        assert_eq!(changes.get(..2), Some(&[0.0, 0.0][..]));
        assert!((changes[2] - 25.0).abs() < 1e-9);
        assert!((changes[3] + 20.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_value_counts_order() -> anyhow::Result<()> {
        let values = Series::new("clave".into(), [Some("B"), Some("A"), None, Some("B"), Some("C")]);
        let counts = value_counts(&values)?;
        assert_eq!(strings(&counts, "clave")?, vec!["B", "A", "C"]);
        assert_eq!(floats(&counts, FREQUENCY)?, vec![2.0, 1.0, 1.0]);
        Ok(())
    }

    #[test]
    fn test_group_mean_skips_nulls() -> anyhow::Result<()> {
        let frame = df!(
            "clave" => [Some("x"), Some("x"), None, Some("y"), Some("z")],
            "valor" => [Some(2.0), Some(4.0), Some(100.0), None, Some(9.0)],
        )?;
        let by_key = group_mean(frame.clone().lazy(), "clave", "valor", Order::Key)?;
        assert_eq!(strings(&by_key, "clave")?, vec!["x", "z"]);
        assert_eq!(floats(&by_key, "valor")?, vec![3.0, 9.0]);

        let largest = group_mean(frame.lazy(), "clave", "valor", Order::LargestFirst)?;
        assert_eq!(strings(&largest, "clave")?, vec!["z", "x"]);
        Ok(())
    }

    #[test]
    fn test_group_values_collects_present_values() -> anyhow::Result<()> {
        let frame = df!(
            "clave" => [Some("b"), Some("a"), Some("b"), None],
            "valor" => [Some(1.0), Some(2.0), None, Some(4.0)],
        )?;
        let groups = group_values(frame.lazy(), "clave", "valor")?;
        assert_eq!(
            groups,
            vec![("a".to_owned(), vec![2.0]), ("b".to_owned(), vec![1.0])]
        );
        Ok(())
    }

    #[test]
    fn test_crosstab_pivots_with_zero_fill() -> anyhow::Result<()> {
        let frame = df!(
            AGE_GROUP => [Some("0-18"), Some("0-18"), Some("60+"), None],
            "sexo" => [Some("F"), Some("F"), Some("M"), Some("M")],
        )?;
        let crosstab = Crosstab::new(frame.lazy(), AGE_GROUP, "sexo")?;
        assert_eq!(crosstab.column_keys()?, vec!["F", "M"]);
        assert_eq!(
            crosstab.matrix(&age_rows(), &["F".to_owned(), "M".to_owned()])?,
            vec![vec![2, 0], vec![0, 0], vec![0, 1]]
        );

        let wide = crosstab.pivot(&age_rows())?;
        assert_eq!(wide.shape(), (3, 3));
        assert_eq!(wide.column("M")?.as_materialized_series().u64()?.get(2), Some(1));
        Ok(())
    }

    #[test]
    fn test_year_window_compares_same_months() -> anyhow::Result<()> {
        let dates = vec![date(2023, 11, 2), date(2024, 3, 15), None, date(2022, 1, 1)];
        let window = YearWindow::from_dates(&dates).expect("dates present");
        assert_eq!(window.current_year, 2024);
        assert_eq!(window.through_month, 3);
        assert_eq!(window.years(), [2023, 2024]);
        assert!(YearWindow::from_dates(&[None]).is_none());

        let rows = df!(
            "anio" => [2024, 2023, 2023, 2022],
            "mes" => [2u32, 3, 11, 1],
        )?
        .lazy()
        .filter(window.contains(col("anio"), col("mes")))
        .collect()?;
        assert_eq!(floats(&rows, "anio")?, vec![2024.0, 2023.0]);
        Ok(())
    }

    #[test]
    fn test_describe_mixes_numeric_and_text() -> anyhow::Result<()> {
        let frame = df!(
            "Edad" => [Some(10.0), Some(30.0), None],
            "Sexo" => [Some("F"), Some("F"), Some("M")],
        )?;
        let summary = describe(&frame)?;
        assert_eq!(summary.height(), 2);

        let media = summary.column("media")?.as_materialized_series().f64()?.get(0);
        assert_eq!(media, Some(20.0));
        let nulos = summary.column("nulos")?.as_materialized_series().u64()?.get(0);
        assert_eq!(nulos, Some(1));
        let unicos = summary.column("unicos")?.as_materialized_series().u64()?;
        assert_eq!(unicos.get(0), Some(2));
        assert_eq!(unicos.get(1), Some(2));
        let top = summary.column("top")?.as_materialized_series().str()?.get(1);
        assert_eq!(top, Some("F"));
        Ok(())
    }

    proptest! {
        #[test]
        fn prop_pct_change_sign_follows_direction(prev in 1.0f64..1e6, curr in 0.0f64..1e6) {
            let change = changes(vec![prev], vec![curr]).expect("evaluates");
            prop_assert_eq!(change[0] > 0.0, curr > prev);
        }
    }
}
