mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chainsync_common::error::{StorageError, SyncError};
use chainsync_common::traits::{BlockStore, CounterStore, BLOCK_COUNTER};
use chainsync_node::{EndConditions, FileEventLogger, StatefulSyncer};
use common::{chain, id, ChainSource, FaultyStore, Harness};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn tip_watched(h: &Harness) -> (Arc<FaultyStore>, Arc<StatefulSyncer>) {
    let store = FaultyStore::new(h.storage.clone());
    let source = ChainSource::new(chain(0, 5, "a", "a"));
    let syncer = h.syncer(source, store.clone(), Arc::new(FileEventLogger::disabled()));
    (store, Arc::new(syncer))
}

#[tokio::test(start_paused = true)]
async fn test_tip_loop_tolerates_errors_until_at_tip() {
    let h = Harness::new();
    let (store, syncer) = tip_watched(&h);
    store.script_tip(vec![
        Err(SyncError::Storage(StorageError::HeadBlockNotFound)),
        Err(StorageError::Database("unavailable".to_string()).into()),
        Ok(false),
        Ok(true),
    ]);

    let started = Instant::now();
    syncer.end_at_tip_loop(60, Duration::from_secs(10)).await;

    assert!(syncer.is_cancelled());
    assert_eq!(store.tip_calls.load(Ordering::SeqCst), 4);
    assert_eq!(started.elapsed(), Duration::from_secs(40));
}

#[tokio::test(start_paused = true)]
async fn test_tip_loop_runs_until_cancelled_externally() {
    let h = Harness::new();
    let (store, syncer) = tip_watched(&h);

    let watchdog = {
        let syncer = syncer.clone();
        tokio::spawn(async move { syncer.end_at_tip_loop(60, Duration::from_secs(10)).await })
    };

    tokio::time::sleep(Duration::from_secs(95)).await;
    assert!(!watchdog.is_finished());
    assert!(!syncer.is_cancelled());
    assert_eq!(store.tip_calls.load(Ordering::SeqCst), 9);

    syncer.cancel();
    watchdog.await.unwrap();
    assert_eq!(store.tip_calls.load(Ordering::SeqCst), 9);
}

#[tokio::test(start_paused = true)]
async fn test_duration_loop_cancels_after_duration() {
    let h = Harness::new();
    let (_, syncer) = tip_watched(&h);

    let started = Instant::now();
    syncer.end_duration_loop(Duration::from_secs(5)).await;

    assert!(syncer.is_cancelled());
    assert_eq!(started.elapsed(), Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_duration_loop_returns_when_already_cancelled() {
    let h = Harness::new();
    let (_, syncer) = tip_watched(&h);
    syncer.cancel();

    let started = Instant::now();
    syncer.end_duration_loop(Duration::from_secs(3600)).await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(syncer.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_sync_stops_on_duration() {
    let h = Harness::new();
    let (_, syncer) = tip_watched(&h);

    let conditions = EndConditions {
        duration_secs: Some(30),
        ..EndConditions::default()
    };
    let watchdogs = syncer.spawn_end_conditions(&conditions);
    assert_eq!(watchdogs.len(), 1);

    syncer.sync(-1, -1).await.unwrap();

    for watchdog in watchdogs {
        watchdog.await.unwrap();
    }
    assert!(syncer.is_cancelled());
    assert_eq!(h.storage.get_head_block_identifier().await.unwrap(), id(5, "a"));
    assert_eq!(h.counters.get(BLOCK_COUNTER).await.unwrap(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_sync_stops_at_tip() {
    let h = Harness::new();
    let (store, syncer) = tip_watched(&h);
    store.script_tip(vec![Ok(false), Ok(true)]);

    let conditions = EndConditions {
        tip_delay_secs: Some(60),
        tip_poll_interval_secs: 5,
        duration_secs: None,
    };
    let watchdogs = syncer.spawn_end_conditions(&conditions);

    syncer.sync(-1, -1).await.unwrap();

    for watchdog in watchdogs {
        watchdog.await.unwrap();
    }
    assert_eq!(store.tip_calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.counters.get(BLOCK_COUNTER).await.unwrap(), 6);
}

#[tokio::test]
async fn test_parent_token_cancels_syncer_but_not_the_reverse() {
    let h = Harness::new();
    let source = ChainSource::new(chain(0, 5, "a", "a"));

    let parent = CancellationToken::new();
    let first = h
        .syncer(source.clone(), h.storage.clone(), Arc::new(FileEventLogger::disabled()))
        .with_parent_token(&parent);
    first.cancel();
    assert!(first.is_cancelled());
    assert!(!parent.is_cancelled());

    let second = h
        .syncer(source, h.storage.clone(), Arc::new(FileEventLogger::disabled()))
        .with_parent_token(&parent);
    parent.cancel();
    assert!(second.is_cancelled());
    assert!(second.cancellation_token().is_cancelled());
}
