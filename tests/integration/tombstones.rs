//! Deletes and empty values

use tidkv::{TombstoneEncoding, VersionedStore};

use crate::common::*;

#[tokio::test]
async fn empty_value_survives_commit() {
    let db = test_db();
    db.update(|txn| Box::pin(async move { txn.set("k", Vec::<u8>::new()) }))
        .await
        .unwrap();

    let value = db
        .view(|txn| Box::pin(async move { txn.get("k").await }))
        .await
        .unwrap();
    assert_eq!(value, Some(Vec::new()));
}

#[tokio::test]
async fn removed_key_reads_absent_and_keeps_version() {
    let db = test_db();
    db.update(|txn| Box::pin(async move { txn.set("k", "v") }))
        .await
        .unwrap();
    db.update(|txn| Box::pin(async move { txn.remove("k") }))
        .await
        .unwrap();

    let value = db
        .view(|txn| Box::pin(async move { txn.get("k").await }))
        .await
        .unwrap();
    assert_eq!(value, None);
    assert_eq!(db.store().get("k").await.unwrap(), None);
    assert_eq!(db.store().get("k:tid").await.unwrap(), Some(b"2".to_vec()));
}

#[tokio::test]
async fn removed_key_conflicts_with_older_snapshot() {
    let db = test_db();
    db.update(|txn| Box::pin(async move { txn.set("k", "v") }))
        .await
        .unwrap();

    let mut reader = db.begin(false).await.unwrap();
    db.update(|txn| Box::pin(async move { txn.remove("k") }))
        .await
        .unwrap();

    let err = reader.get("k").await.unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(err.stale_value(), None);
}

#[tokio::test]
async fn legacy_encoding_treats_empty_value_as_delete() {
    let config = DatabaseConfig::default().with_tombstones(TombstoneEncoding::EmptyValue);
    let db = Database::with_config(MemoryStore::new(), config).unwrap();

    db.update(|txn| {
        Box::pin(async move {
            txn.set("kept", "v")?;
            txn.set("blank", Vec::<u8>::new())
        })
    })
    .await
    .unwrap();

    let dump = db.store().dump();
    assert_eq!(dump.get("kept"), Some(&b"v".to_vec()));
    assert_eq!(dump.get("blank"), None);
    assert!(!db.commit_script().source().is_empty());
}
