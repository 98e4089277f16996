//! Begin, rollback, close

use tidkv::{TransactionState, VersionedStore};

use crate::common::*;

#[tokio::test]
async fn rollback_twice_and_after_commit() {
    let db = test_db();

    let mut txn = db.begin(true).await.unwrap();
    txn.set("k", "v").unwrap();
    txn.rollback().unwrap();
    txn.rollback().unwrap();
    assert_eq!(txn.state(), TransactionState::RolledBack);
    assert!(matches!(txn.get("k").await, Err(Error::TransactionClosed)));

    let mut txn = db.begin(true).await.unwrap();
    txn.set("k", "v").unwrap();
    assert_eq!(txn.commit().await.unwrap(), Some(1));
    txn.rollback().unwrap();
    assert_eq!(db.store().get("k").await.unwrap(), Some(b"v".to_vec()));
}

#[tokio::test]
async fn config_file_drives_database() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join(tidkv::CONFIG_FILE_NAME);
    std::fs::write(&path, "marker_key = \"txn_counter\"\n").unwrap();

    let config = DatabaseConfig::from_file(&path).unwrap();
    let db = Database::with_config(MemoryStore::new(), config).unwrap();
    db.update(|txn| Box::pin(async move { txn.set("k", "v") }))
        .await
        .unwrap();

    assert_eq!(
        db.store().get("txn_counter").await.unwrap(),
        Some(b"1".to_vec())
    );
    assert!(matches!(
        db.view(|txn| Box::pin(async move { txn.get("txn_counter").await }))
            .await,
        Err(Error::InvalidKey(_))
    ));
}

#[tokio::test]
async fn begin_after_close_is_store_error() {
    let db = test_db();
    db.close().await.unwrap();

    assert!(matches!(db.begin(false).await, Err(Error::Store(_))));
    assert!(matches!(db.current_tid().await, Err(Error::Store(_))));
}
