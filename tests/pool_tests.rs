//! Tests for the bounded resource pools
//!
//! These tests verify the pool's core contract:
//! - At most `capacity` resources are out at any time
//! - Acquisition fails with PoolTimeout when the wait budget runs out
//! - Dropping a guard returns the resource for the next waiter
//! - Concurrent churn never loses or duplicates a resource

use tsrelay::engine::{MemoryEngine, StorageEngine};
use tsrelay::pool::{OperationClass, ResourcePool};
use tsrelay::Error;

use std::sync::Arc;
use std::time::Duration;

fn pool(capacity: usize, timeout: Duration) -> Arc<ResourcePool> {
    let engine = MemoryEngine::new();
    ResourcePool::new(&engine, OperationClass::Write, capacity, timeout).expect("pool")
}

#[tokio::test]
async fn acquisition_is_bounded_by_capacity() {
    let pool = pool(2, Duration::from_secs(5));
    assert_eq!(pool.capacity(), 2);
    assert_eq!(pool.idle_count(), 2);

    let first = pool.acquire().await.expect("first acquire");
    let second = pool.acquire().await.expect("second acquire");
    assert_eq!(pool.idle_count(), 0);

    // The pool is exhausted; a zero wait budget must fail immediately.
    let third = pool.acquire_timeout(Duration::ZERO).await;
    assert!(
        matches!(third, Err(Error::PoolTimeout { .. })),
        "exhausted pool should time out"
    );

    drop(first);
    let replacement = pool.acquire_timeout(Duration::from_secs(5)).await;
    assert!(replacement.is_ok(), "released resource should be reusable");

    drop(second);
    drop(replacement);
    assert_eq!(pool.idle_count(), 2, "all resources should be back");
}

#[tokio::test]
async fn timeout_error_names_the_operation_class() {
    let pool = pool(1, Duration::ZERO);
    let _held = pool.acquire_timeout(Duration::from_secs(1)).await.unwrap();

    let err = pool.acquire().await.unwrap_err();
    match err {
        Error::PoolTimeout { class, .. } => assert_eq!(class, "write"),
        other => panic!("expected PoolTimeout, got {}", other),
    }
}

#[tokio::test]
async fn resources_keep_distinct_identities() {
    let pool = pool(3, Duration::from_secs(1));
    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    let c = pool.acquire().await.unwrap();

    let mut ids = vec![a.id(), b.id(), c.id()];
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3, "each resource carries its own id");
}

#[tokio::test]
async fn concurrent_churn_returns_every_resource() {
    let engine = MemoryEngine::new();
    {
        let mut conn = engine.connect().unwrap();
        conn.execute(
            "CREATE TABLE \"churn\" (date timestamp, value float64) \
             PARTITION BY RANGE(date) timescale interval '1d' retention '7d' autopart;",
        )
        .unwrap();
    }
    let pool =
        ResourcePool::new(&engine, OperationClass::Read, 3, Duration::from_secs(30)).unwrap();

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let pool = pool.clone();
        tasks.push(tokio::spawn(async move {
            let mut resource = pool.acquire().await.expect("acquire under churn");
            let rows = resource
                .connection()
                .query("SELECT count(*) FROM \"churn\"")
                .expect("query through pooled connection");
            assert_eq!(rows.cell_as_text(0, 0), "0");
        }));
    }
    for task in tasks {
        task.await.expect("task");
    }

    assert_eq!(pool.idle_count(), 3, "no resource may leak under churn");
}

#[tokio::test]
async fn drain_empties_the_idle_list() {
    let pool = pool(2, Duration::ZERO);
    pool.drain();
    assert_eq!(pool.idle_count(), 0);
    assert!(pool.acquire_timeout(Duration::ZERO).await.is_err());
}
