mod common;

use common::{episodes, maximal_discharges, minimal_episodes, without};
use gurney::error::GurneyError;
use gurney::schema::{self, Field};

#[test]
fn test_fixtures_pick_their_dialect() -> anyhow::Result<()> {
    let discharges = schema::validate(&maximal_discharges())?;
    assert_eq!(discharges.dialect(), "egresos");
    assert_eq!(discharges.column_for(Field::DrgWeight), Some("Peso GRD"));

    let episodes = schema::validate(&episodes())?;
    assert_eq!(episodes.dialect(), "episodios");
    assert_eq!(episodes.column_for(Field::Hospital), Some("Hospital (Descripción)"));
    assert!(!episodes.has(Field::Insurance));

    let minimal = schema::validate(&minimal_episodes())?;
    assert!(!minimal.has(Field::Hospital));
    Ok(())
}

#[test]
fn test_single_missing_label_is_reported_exactly() {
    let err = schema::validate(&without(&maximal_discharges(), "Valor a Pagar"))
        .expect_err("amount due is required");
    let GurneyError::Schema { dialect, missing } = err else {
        panic!("expected a schema error, got {err}");
    };
    assert_eq!(dialect, "egresos");
    assert_eq!(missing, vec!["Valor a Pagar".to_owned()]);
}

#[test]
fn test_validation_leaves_input_untouched() -> anyhow::Result<()> {
    let dataset = episodes();
    let validated = schema::validate(&dataset)?;
    assert_eq!(
        dataset.frame().column("Fecha Egreso")?.dtype(),
        &polars::prelude::DataType::String
    );
    assert_eq!(
        validated.frame().column("Fecha Egreso")?.dtype(),
        &polars::prelude::DataType::Date
    );
    Ok(())
}
