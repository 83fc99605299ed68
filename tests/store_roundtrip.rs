//! Blobs come back from the record store byte for byte.

use chrono::NaiveDate;
use gurney::store::{RecordKind, RecordStore};
use proptest::prelude::*;

fn stamp() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 30)
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .expect("valid timestamp")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_blob_roundtrip(
        blob in proptest::collection::vec(any::<u8>(), 0..16_384),
        owner in 1i64..1_000,
        report in any::<bool>(),
    ) {
        let kind = if report { RecordKind::Report } else { RecordKind::Analysis };
        let mut store = RecordStore::open_in_memory().expect("in-memory store");
        let id = store.store(kind, owner, "blob", stamp(), &blob).expect("store");

        prop_assert_eq!(store.fetch(kind, id).expect("fetch"), blob.clone());
        let listed = store.list_for_owner(kind, owner).expect("list");
        prop_assert_eq!(listed.len(), 1);
        prop_assert_eq!(listed[0].size_bytes, blob.len() as u64);
    }
}

#[test]
fn test_multi_megabyte_blob_survives_reopen() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("gurney.db");
    let blob: Vec<u8> = (0..6 * 1024 * 1024u32).map(|i| (i % 251) as u8).collect();

    let id = {
        let mut store = RecordStore::open(&path)?;
        store.store(RecordKind::Analysis, 1, "grande.zip", stamp(), &blob)?
    };

    let store = RecordStore::open(&path)?;
    let fetched = store.fetch(RecordKind::Analysis, id)?;
    assert_eq!(fetched.len(), blob.len());
    assert!(fetched == blob, "blob changed in storage");
    Ok(())
}

#[test]
fn test_empty_blob() -> anyhow::Result<()> {
    let mut store = RecordStore::open_in_memory()?;
    let id = store.store(RecordKind::Report, 2, "vacio.pdf", stamp(), &[])?;
    assert!(store.fetch(RecordKind::Report, id)?.is_empty());
    Ok(())
}
