//! Concurrent read-modify-write on one counter
//!
//! 100 transactions each read a big-endian u32, add one and commit. Losers
//! retry from scratch. Lost updates would leave the counter below 100.

use std::time::Duration;

use futures::future::join_all;
use rand::Rng;
use tidkv::VersionedStore;

use crate::common::*;

const WRITERS: u32 = 100;

/// One increment, retried by hand until it commits
async fn increment_until_committed(db: Database<MemoryStore>) -> usize {
    let mut conflicts = 0;
    loop {
        let mut txn = db.begin(true).await.unwrap();
        let result = async {
            let n = read_u32(&mut txn, "counter").await?;
            txn.set("counter", encode_u32(n + 1))?;
            txn.commit().await
        }
        .await;

        match result {
            Ok(_) => return conflicts,
            Err(e) if e.is_conflict() => {
                txn.rollback().unwrap();
                conflicts += 1;
                let pause = rand::thread_rng().gen_range(0..10u64);
                tokio::time::sleep(Duration::from_millis(pause)).await;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hundred_concurrent_increments_end_at_hundred() {
    let db = test_db();

    let handles: Vec<_> = (0..WRITERS)
        .map(|_| tokio::spawn(increment_until_committed(db.clone())))
        .collect();

    let conflicts: usize = join_all(handles)
        .await
        .into_iter()
        .map(|outcome| outcome.unwrap())
        .sum();
    tracing::debug!(conflicts, "all increments committed");

    let total = db
        .view(|txn| Box::pin(async move { read_u32(txn, "counter").await }))
        .await
        .unwrap();
    assert_eq!(total, WRITERS);

    // One tid per successful commit
    assert_eq!(db.current_tid().await.unwrap(), u64::from(WRITERS));
    assert_eq!(
        db.store().get("counter:tid").await.unwrap(),
        Some(WRITERS.to_string().into_bytes())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hundred_concurrent_retrying_updates_end_at_hundred() {
    let db = test_db();
    let retry = RetryConfig::new()
        .with_max_retries(10_000)
        .with_base_delay_ms(1)
        .with_max_delay_ms(10);

    let handles: Vec<_> = (0..WRITERS)
        .map(|_| {
            let db = db.clone();
            let retry = retry.clone();
            tokio::spawn(async move {
                db.update_with_retry(retry, |txn| {
                    Box::pin(async move {
                        let n = read_u32(txn, "counter").await?;
                        txn.set("counter", encode_u32(n + 1))
                    })
                })
                .await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let total = db
        .view(|txn| Box::pin(async move { read_u32(txn, "counter").await }))
        .await
        .unwrap();
    assert_eq!(total, WRITERS);
}
