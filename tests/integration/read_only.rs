//! Read-only transactions

use tidkv::{PendingOperations, VersionedStore};

use crate::common::*;

#[tokio::test]
async fn view_set_returns_read_only_error() {
    let db = test_db();

    let err = db
        .view(|txn| Box::pin(async move { txn.set("k", "v") }))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ReadOnlyTx));
    assert_eq!(err.to_string(), "transaction is not writable");
    assert_eq!(db.store().get("k").await.unwrap(), None);
    assert!(db.store().dump().is_empty());
}

#[tokio::test]
async fn read_only_begin_reads_committed_data() {
    let db = test_db();
    db.update(|txn| Box::pin(async move { txn.set("k", "v") }))
        .await
        .unwrap();

    let mut txn = db.begin(false).await.unwrap();
    assert!(!txn.is_writable());
    assert_eq!(txn.get("k").await.unwrap(), Some(b"v".to_vec()));
    assert_eq!(txn.pending(), PendingOperations::default());
    assert_eq!(txn.commit().await.unwrap(), None);
}
