//! Multi-key commits are all-or-nothing for readers

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::common::*;

const ROUNDS: u32 = 50;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_see_half_a_commit() {
    let db = test_db();
    db.update(|txn| {
        Box::pin(async move {
            txn.set("a", encode_u32(0))?;
            txn.set("b", encode_u32(0))
        })
    })
    .await
    .unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let consistent_reads = Arc::new(AtomicUsize::new(0));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let db = db.clone();
            let done = Arc::clone(&done);
            let consistent_reads = Arc::clone(&consistent_reads);
            tokio::spawn(async move {
                let mut seen = 0;
                while seen == 0 || !done.load(Ordering::Acquire) {
                    let pair = db
                        .view(|txn| {
                            Box::pin(async move {
                                let a = read_u32(txn, "a").await?;
                                tokio::task::yield_now().await;
                                let b = read_u32(txn, "b").await?;
                                Ok((a, b))
                            })
                        })
                        .await;
                    match pair {
                        Ok((a, b)) => {
                            assert_eq!(a, b, "observed a partial commit");
                            seen += 1;
                        }
                        Err(e) => assert!(e.is_conflict(), "unexpected error: {e}"),
                    }
                }
                consistent_reads.fetch_add(seen, Ordering::Relaxed);
            })
        })
        .collect();

    for i in 1..=ROUNDS {
        db.update(move |txn| {
            Box::pin(async move {
                txn.set("a", encode_u32(i))?;
                tokio::task::yield_now().await;
                txn.set("b", encode_u32(i))
            })
        })
        .await
        .unwrap();
    }
    done.store(true, Ordering::Release);

    for reader in readers {
        reader.await.unwrap();
    }
    assert!(consistent_reads.load(Ordering::Relaxed) > 0);

    let (a, b) = db
        .view(|txn| {
            Box::pin(async move { Ok((read_u32(txn, "a").await?, read_u32(txn, "b").await?)) })
        })
        .await
        .unwrap();
    assert_eq!((a, b), (ROUNDS, ROUNDS));
}

#[tokio::test]
async fn conflicting_commit_applies_nothing() {
    let db = test_db();

    let mut loser = db.begin(true).await.unwrap();
    loser.get("a").await.unwrap();
    loser.set("a", "loser").unwrap();
    loser.set("b", "loser").unwrap();

    db.update(|txn| Box::pin(async move { txn.set("a", "winner") }))
        .await
        .unwrap();

    assert!(loser.commit().await.unwrap_err().is_conflict());

    let dump = db.store().dump();
    assert_eq!(dump.get("a"), Some(&b"winner".to_vec()));
    assert_eq!(dump.get("b"), None);
    assert_eq!(dump.get("b:tid"), None);
}
