//! Schema dialects and dataset validation.
//!
//! Discharge exports come in more than one column layout. Each layout is a
//! [`Dialect`]: a mapping from canonical [`Field`]s to the column labels that
//! layout uses. [`validate`] picks the dialect a dataset satisfies, resolves
//! every field it can, and coerces date and numeric columns so analyzers can
//! rely on their types.
//!
//! Resolution rules:
//! - a dialect matches when all of its required labels are present;
//! - among matches the dialect with the larger required set wins, then the
//!   one with higher priority (newer export format first);
//! - optional fields resolve through the matched dialect's label first, then
//!   through any other dialect's label for the same field.

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::dataset::Dataset;
use crate::error::{GurneyError, Result};

/// Canonical concept a column may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    DischargeDate,
    AdmissionDate,
    Age,
    PrimaryDiagnosis,
    AmountDue,
    BasePrice,
    Hospital,
    DischargeReason,
    AdmissionType,
    ActivityType,
    Insurance,
    Sex,
    DrgWeight,
    LengthOfStay,
    EpisodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticType {
    Date,
    Numeric,
    Text,
}

impl Field {
    pub fn semantic(self) -> SemanticType {
        match self {
            Self::DischargeDate | Self::AdmissionDate => SemanticType::Date,
            Self::Age
            | Self::AmountDue
            | Self::BasePrice
            | Self::DrgWeight
            | Self::LengthOfStay => SemanticType::Numeric,
            Self::PrimaryDiagnosis
            | Self::Hospital
            | Self::DischargeReason
            | Self::AdmissionType
            | Self::ActivityType
            | Self::Insurance
            | Self::Sex
            | Self::EpisodeId => SemanticType::Text,
        }
    }
}

/// A recognized column layout.
#[derive(Debug)]
pub struct Dialect {
    pub name: &'static str,
    /// Lower value wins ties between equally specific matches.
    pub priority: u8,
    pub required: &'static [(Field, &'static str)],
    pub optional: &'static [(Field, &'static str)],
}

impl Dialect {
    pub fn label_for(&self, field: Field) -> Option<&'static str> {
        self.required
            .iter()
            .chain(self.optional)
            .find(|(f, _)| *f == field)
            .map(|(_, label)| *label)
    }

    fn missing(&self, present: &HashSet<&str>) -> Vec<String> {
        self.required
            .iter()
            .filter(|(_, label)| !present.contains(label))
            .map(|(_, label)| (*label).to_owned())
            .collect()
    }
}

/// Discharge-centric export (current format).
pub const DISCHARGE_DIALECT: Dialect = Dialect {
    name: "egresos",
    priority: 0,
    required: &[
        (Field::DischargeDate, "Fecha de egreso completa"),
        (Field::Age, "Edad en años"),
        (Field::PrimaryDiagnosis, "Diag 01 Principal (cod+des)"),
        (Field::AmountDue, "Valor a Pagar"),
        (Field::Hospital, "Hospital de Egreso (Descripción)"),
    ],
    optional: &[
        (Field::AdmissionDate, "Fecha de ingreso completa"),
        (Field::BasePrice, "Valor Precio Base"),
        (Field::DischargeReason, "Motivo Egreso (Descripción)"),
        (Field::AdmissionType, "Tipo Ingreso (Descripción)"),
        (Field::ActivityType, "Tipo Actividad (Descripción)"),
        (Field::Insurance, "Prevision (Desc)"),
        (Field::Sex, "Sexo (Desc)"),
        (Field::DrgWeight, "Peso GRD"),
        (Field::LengthOfStay, "Estancia del Episodio"),
        (Field::EpisodeId, "Episodio"),
    ],
};

/// Episode-centric export (older format).
pub const EPISODE_DIALECT: Dialect = Dialect {
    name: "episodios",
    priority: 1,
    required: &[
        (Field::DischargeDate, "Fecha Egreso"),
        (Field::Age, "Edad en Años"),
        (Field::PrimaryDiagnosis, "DG01 principal (descripcion)"),
        (Field::AmountDue, "Valor a Pagar"),
    ],
    optional: &[
        (Field::Hospital, "Hospital (Descripción)"),
        (Field::AdmissionDate, "Fecha Ingreso"),
        (Field::BasePrice, "Valor Precio Base"),
        (Field::DischargeReason, "Motivo Egreso (descripción)"),
        (Field::AdmissionType, "Tipo Ingreso"),
        (Field::ActivityType, "Tipo Actividad"),
        (Field::Insurance, "Previsión"),
        (Field::Sex, "Sexo"),
        (Field::DrgWeight, "Peso GRD medio"),
        (Field::LengthOfStay, "Estancia del episodio"),
        (Field::EpisodeId, "Episodio CMBD"),
    ],
};

/// Every recognized dialect, highest priority first.
pub static DIALECTS: [&Dialect; 2] = [&DISCHARGE_DIALECT, &EPISODE_DIALECT];

/// Values that were present in the source but could not be read as the
/// field's type. They become nulls and drop out of aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataCoercionWarning {
    pub column: String,
    pub field: Field,
    pub count: usize,
}

/// A dataset that passed validation: typed columns plus the field resolution.
#[derive(Debug, Clone)]
pub struct ValidatedDataset {
    name: String,
    frame: DataFrame,
    dialect: &'static str,
    resolved: BTreeMap<Field, String>,
    coercions: Vec<DataCoercionWarning>,
}

impl ValidatedDataset {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn dialect(&self) -> &'static str {
        self.dialect
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// Column label backing `field`, if the dataset carries it.
    pub fn column_for(&self, field: Field) -> Option<&str> {
        self.resolved.get(&field).map(String::as_str)
    }

    pub fn has(&self, field: Field) -> bool {
        self.resolved.contains_key(&field)
    }

    pub fn has_all(&self, fields: &[Field]) -> bool {
        fields.iter().all(|f| self.has(*f))
    }

    pub fn coercions(&self) -> &[DataCoercionWarning] {
        &self.coercions
    }

    /// Numeric values of `field` (nulls preserved).
    pub fn numbers(&self, field: Field) -> Result<Vec<Option<f64>>> {
        let series = self.series(field)?;
        let ca = series.f64()?;
        Ok(ca.into_iter().collect())
    }

    /// Calendar dates of `field` (nulls preserved).
    pub fn dates(&self, field: Field) -> Result<Vec<Option<NaiveDate>>> {
        let series = self.series(field)?;
        let days = series.cast(&DataType::Int32)?;
        let ca = days.i32()?;
        Ok(ca.into_iter().map(|d| d.and_then(days_to_date)).collect())
    }

    /// Typed column backing `field`, under its source label.
    pub fn series(&self, field: Field) -> Result<Series> {
        Ok(self.frame.column(self.label(field)?)?.as_materialized_series().clone())
    }

    /// Column expression for `field`, for lazy queries over [`Self::lazy`].
    pub fn col(&self, field: Field) -> Result<Expr> {
        Ok(col(self.label(field)?))
    }

    pub fn lazy(&self) -> LazyFrame {
        self.frame.clone().lazy()
    }

    fn label(&self, field: Field) -> Result<&str> {
        self.column_for(field).ok_or_else(|| {
            GurneyError::DataProcessing(format!("Field {field:?} is not present in this dataset"))
        })
    }
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn days_to_date(days: i32) -> Option<NaiveDate> {
    epoch().checked_add_signed(chrono::Duration::days(i64::from(days)))
}

fn date_to_days(date: NaiveDate) -> Option<i32> {
    i32::try_from(date.signed_duration_since(epoch()).num_days()).ok()
}

/// Picks the dialect `labels` satisfy, or explains the closest miss.
pub fn match_dialect<'a>(labels: impl IntoIterator<Item = &'a str>) -> Result<&'static Dialect> {
    let present: HashSet<&str> = labels.into_iter().collect();

    let mut matches: Vec<&'static Dialect> = DIALECTS
        .iter()
        .copied()
        .filter(|d| d.missing(&present).is_empty())
        .collect();
    matches.sort_by(|a, b| {
        b.required
            .len()
            .cmp(&a.required.len())
            .then(a.priority.cmp(&b.priority))
    });
    if let Some(best) = matches.first().copied() {
        return Ok(best);
    }

    let closest = DIALECTS
        .iter()
        .copied()
        .map(|d| (d, d.missing(&present)))
        .min_by(|(a, ma), (b, mb)| ma.len().cmp(&mb.len()).then(a.priority.cmp(&b.priority)));

    match closest {
        Some((dialect, missing)) => Err(GurneyError::Schema {
            dialect: dialect.name.to_owned(),
            missing,
        }),
        None => Err(GurneyError::Config("No schema dialects configured".to_owned())),
    }
}

/// Validates `dataset` against the known dialects and coerces typed fields.
///
/// The input dataset is not modified; the returned value owns a coerced copy.
///
/// # Errors
///
/// [`GurneyError::Schema`] when no dialect's required columns are all present.
pub fn validate(dataset: &Dataset) -> Result<ValidatedDataset> {
    let frame = dataset.frame();
    let labels: Vec<String> = frame
        .get_column_names()
        .into_iter()
        .map(|n| n.to_string())
        .collect();

    let dialect = match_dialect(labels.iter().map(String::as_str))?;
    let present: HashSet<&str> = labels.iter().map(String::as_str).collect();
    let resolved = resolve_fields(dialect, &present);

    let mut coerced = frame.clone();
    let mut coercions = Vec::new();
    for (field, label) in &resolved {
        let count = coerce_column(&mut coerced, label, field.semantic())?;
        if count > 0 {
            tracing::warn!(
                column = %label,
                count,
                "Values could not be read as {:?}; treating them as missing",
                field.semantic()
            );
            coercions.push(DataCoercionWarning {
                column: label.clone(),
                field: *field,
                count,
            });
        }
    }

    tracing::info!(
        dataset = dataset.name(),
        dialect = dialect.name,
        rows = coerced.height(),
        fields = resolved.len(),
        "Dataset validated"
    );

    Ok(ValidatedDataset {
        name: dataset.name().to_owned(),
        frame: coerced,
        dialect: dialect.name,
        resolved,
        coercions,
    })
}

fn resolve_fields(dialect: &Dialect, present: &HashSet<&str>) -> BTreeMap<Field, String> {
    let mut resolved = BTreeMap::new();
    for (field, label) in dialect.required.iter().chain(dialect.optional) {
        if present.contains(label) {
            resolved.insert(*field, (*label).to_owned());
        }
    }

    // Columns renamed between export revisions still count
    for other in DIALECTS.iter().filter(|d| d.name != dialect.name) {
        for (field, label) in other.required.iter().chain(other.optional) {
            if !resolved.contains_key(field) && present.contains(label) {
                resolved.insert(*field, (*label).to_owned());
            }
        }
    }
    resolved
}

/// Replaces `label` with its typed version and returns how many present
/// values were lost in the conversion.
fn coerce_column(frame: &mut DataFrame, label: &str, kind: SemanticType) -> Result<usize> {
    let series = frame.column(label)?.as_materialized_series().clone();
    let before = series.null_count();

    let mut typed = match kind {
        SemanticType::Date => coerce_dates(&series)?,
        SemanticType::Numeric => coerce_numbers(&series)?,
        SemanticType::Text => normalize_texts(&series)?,
    };
    typed.rename(label.into());

    // Blank text is missing, not lost
    let lost = match kind {
        SemanticType::Text => 0,
        SemanticType::Date | SemanticType::Numeric => typed.null_count().saturating_sub(before),
    };
    frame.replace(label, typed)?;
    Ok(lost)
}

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
];

/// Parses the date formats seen in discharge exports.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS.iter().find_map(|fmt| {
                chrono::NaiveDateTime::parse_from_str(raw, fmt)
                    .ok()
                    .map(|dt| dt.date())
            })
        })
}

/// Trims text values; blank ones become nulls.
fn normalize_texts(series: &Series) -> Result<Series> {
    let text = series.cast(&DataType::String)?;
    let trimmed: StringChunked = text
        .str()?
        .into_iter()
        .map(|v| v.map(str::trim).filter(|s| !s.is_empty()))
        .collect();
    Ok(trimmed.into_series())
}

fn coerce_dates(series: &Series) -> Result<Series> {
    match series.dtype() {
        DataType::Date => Ok(series.clone()),
        DataType::Datetime(_, _) => Ok(series.cast(&DataType::Date)?),
        _ => {
            let text = series.cast(&DataType::String)?;
            let days: Vec<Option<i32>> = text
                .str()?
                .into_iter()
                .map(|v| v.and_then(parse_date).and_then(date_to_days))
                .collect();
            Ok(Series::new(series.name().clone(), days).cast(&DataType::Date)?)
        }
    }
}

/// Reads plain and locale-formatted amounts: `1234.5`, `1.234,5`, `$ 1234`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '$')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    if let Ok(v) = cleaned.parse::<f64>() {
        return Some(v);
    }
    if cleaned.contains(',') {
        let normalized = cleaned.replace('.', "").replace(',', ".");
        return normalized.parse::<f64>().ok();
    }
    None
}

fn coerce_numbers(series: &Series) -> Result<Series> {
    let dtype = series.dtype();
    if dtype.is_primitive_numeric() || dtype.is_bool() {
        return Ok(series.cast(&DataType::Float64)?);
    }
    let text = series.cast(&DataType::String)?;
    let values: Vec<Option<f64>> = text
        .str()?
        .into_iter()
        .map(|v| v.and_then(parse_number).filter(|x| x.is_finite()))
        .collect();
    Ok(Series::new(series.name().clone(), values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(columns: Vec<Column>) -> Dataset {
        Dataset::from_frame("test", DataFrame::new(columns).expect("valid frame"))
    }

    fn discharge_columns() -> Vec<Column> {
        vec![
            Column::new("Fecha de egreso completa".into(), ["2023-01-05", "05/02/2023"]),
            Column::new("Edad en años".into(), [34.0, 71.0]),
            Column::new("Diag 01 Principal (cod+des)".into(), ["A00", "B01"]),
            Column::new("Valor a Pagar".into(), ["1000", "2.500,5"]),
            Column::new("Hospital de Egreso (Descripción)".into(), ["H1", "H2"]),
        ]
    }

    #[test]
    fn test_prefers_more_specific_dialect() {
        let mut labels: Vec<&str> = DISCHARGE_DIALECT.required.iter().map(|(_, l)| *l).collect();
        labels.extend(EPISODE_DIALECT.required.iter().map(|(_, l)| *l));
        let dialect = match_dialect(labels).expect("both dialects match");
        assert_eq!(dialect.name, "egresos");
    }

    #[test]
    fn test_reports_exactly_the_missing_label() {
        for (_, dropped) in EPISODE_DIALECT.required {
            let labels = EPISODE_DIALECT
                .required
                .iter()
                .map(|(_, l)| *l)
                .filter(|l| l != dropped);
            match match_dialect(labels) {
                Err(GurneyError::Schema { dialect, missing }) => {
                    assert_eq!(dialect, "episodios");
                    assert_eq!(missing, vec![(*dropped).to_owned()]);
                }
                other => panic!("expected schema error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_validate_coerces_dates_and_numbers() -> anyhow::Result<()> {
        let validated = validate(&dataset(discharge_columns()))?;
        assert_eq!(validated.dialect(), "egresos");

        let dates = validated.dates(Field::DischargeDate)?;
        assert_eq!(dates[0], NaiveDate::from_ymd_opt(2023, 1, 5));
        assert_eq!(dates[1], NaiveDate::from_ymd_opt(2023, 2, 5));

        let amounts = validated.numbers(Field::AmountDue)?;
        assert_eq!(amounts, vec![Some(1000.0), Some(2500.5)]);
        assert!(validated.coercions().is_empty());
        Ok(())
    }

    #[test]
    fn test_malformed_dates_become_null_and_are_counted() -> anyhow::Result<()> {
        let mut columns = discharge_columns();
        columns[0] = Column::new("Fecha de egreso completa".into(), ["2023-01-05", "not a date"]);
        let validated = validate(&dataset(columns))?;

        let dates = validated.dates(Field::DischargeDate)?;
        assert!(dates[1].is_none());
        assert_eq!(
            validated.coercions(),
            &[DataCoercionWarning {
                column: "Fecha de egreso completa".to_owned(),
                field: Field::DischargeDate,
                count: 1,
            }]
        );
        Ok(())
    }

    #[test]
    fn test_optional_field_resolves_through_other_dialect_label() -> anyhow::Result<()> {
        let mut columns = discharge_columns();
        columns.push(Column::new("Sexo".into(), ["F", "M"]));
        let validated = validate(&dataset(columns))?;
        assert_eq!(validated.column_for(Field::Sex), Some("Sexo"));
        assert!(!validated.has(Field::Insurance));
        Ok(())
    }

    #[test]
    fn test_blank_text_is_missing_not_lost() -> anyhow::Result<()> {
        let mut columns = discharge_columns();
        columns[4] = Column::new("Hospital de Egreso (Descripción)".into(), ["  H1 ", "   "]);
        let validated = validate(&dataset(columns))?;
        let hospitals = validated.series(Field::Hospital)?;
        assert_eq!(hospitals.str()?.get(0), Some("H1"));
        assert_eq!(hospitals.null_count(), 1);
        assert!(validated.coercions().is_empty());
        Ok(())
    }

    #[test]
    fn test_validate_leaves_input_untouched() -> anyhow::Result<()> {
        let ds = dataset(discharge_columns());
        let _validated = validate(&ds)?;
        let original = ds.frame().column("Valor a Pagar")?;
        assert_eq!(original.dtype(), &DataType::String);
        Ok(())
    }

    #[test]
    fn test_parse_number_variants() {
        assert_eq!(parse_number(" 12.5 "), Some(12.5));
        assert_eq!(parse_number("$ 1.234,5"), Some(1234.5));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number(""), None);
    }
}
