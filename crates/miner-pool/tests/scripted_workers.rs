//! Pool behaviour against scripted workers
//!
//! Time-dependent tests run with a paused clock; the scripted workers are
//! plain tokio tasks so auto-advance stays deterministic.

use miner_pool::{PoolConfig, PoolError, SessionPool, TimeoutPolicy};
use miner_protocol::{Command, SessionId, SubsetId, SubsetRef};
use miner_test_utils::{ScriptedSpawner, WorkerScript};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const A: SessionId = SessionId(1);
const B: SessionId = SessionId(2);

fn fast_timeouts(policy: TimeoutPolicy) -> PoolConfig {
    PoolConfig::default()
        .with_request_grace(Duration::from_secs(1))
        .with_sweep_interval(Duration::from_millis(100))
        .with_timeout_policy(policy)
}

#[tokio::test]
async fn concurrent_sends_resolve_with_their_own_result() {
    let spawner = Arc::new(ScriptedSpawner::new(WorkerScript::Echo));
    let pool = SessionPool::new(PoolConfig::default(), spawner).unwrap();
    pool.create_session(A).await.unwrap();

    let sends = (0..50u64).map(|i| {
        pool.send(
            A,
            Command::GetSubset(SubsetRef {
                subset_id: SubsetId(i),
            }),
        )
    });
    let results = futures::future::join_all(sends).await;

    for (i, result) in results.into_iter().enumerate() {
        let value = result.unwrap();
        assert_eq!(value["cmd"], "GET_SUBSET");
        assert_eq!(value["content"]["subsetId"], i as u64);
    }
    let stats = pool.stats();
    assert_eq!(stats.pending_requests, 0);
    assert_eq!(stats.requests_sent, 50);
}

#[tokio::test]
async fn sessions_are_isolated() {
    let spawner = Arc::new(ScriptedSpawner::new(WorkerScript::Echo));
    let pool = SessionPool::new(PoolConfig::default(), spawner.clone()).unwrap();
    pool.create_session(A).await.unwrap();
    pool.create_session(B).await.unwrap();
    pool.create_session(B).await.unwrap();
    assert_eq!(spawner.spawned(), 2);

    let (a, b) = tokio::join!(pool.send(A, Command::GetDataset), pool.send(B, Command::GetDataset));
    assert_eq!(a.unwrap()["sessionId"], 1);
    assert_eq!(b.unwrap()["sessionId"], 2);
}

#[tokio::test(start_paused = true)]
async fn no_retry_times_out_after_one_grace_period() {
    let spawner = Arc::new(ScriptedSpawner::new(WorkerScript::Silent));
    let pool = SessionPool::start(fast_timeouts(TimeoutPolicy::NoRetry), spawner).unwrap();
    pool.create_session(A).await.unwrap();

    let started = Instant::now();
    let err = pool.send(A, Command::Init).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, PoolError::Timeout { .. }));
    assert!(err.is_retryable());
    assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(2));
    let stats = pool.stats();
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.pending_requests, 0);
}

#[tokio::test(start_paused = true)]
async fn extend_deadline_spends_every_retry_first() {
    let spawner = Arc::new(ScriptedSpawner::new(WorkerScript::Silent));
    let config = fast_timeouts(TimeoutPolicy::ExtendDeadline).with_max_retries(3);
    let pool = SessionPool::start(config, spawner).unwrap();
    pool.create_session(A).await.unwrap();

    let started = Instant::now();
    let err = pool.send(A, Command::Init).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, PoolError::Timeout { .. }));
    assert!(elapsed >= Duration::from_secs(4), "timed out after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "timed out after {elapsed:?}");
    assert_eq!(pool.stats().timeouts, 1);
}

#[tokio::test(start_paused = true)]
async fn late_response_is_dropped() {
    let spawner = Arc::new(ScriptedSpawner::new(WorkerScript::Delayed(Duration::from_secs(3))));
    let pool = SessionPool::start(fast_timeouts(TimeoutPolicy::NoRetry), spawner).unwrap();
    pool.create_session(A).await.unwrap();

    let err = pool.send(A, Command::GetSubsets).await.unwrap_err();
    assert!(matches!(err, PoolError::Timeout { .. }));

    tokio::time::sleep(Duration::from_secs(5)).await;
    let stats = pool.stats();
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.pending_requests, 0);
    assert!(pool.has_session(A));
}

#[tokio::test(start_paused = true)]
async fn every_nth_send_sweeps() {
    let spawner = Arc::new(ScriptedSpawner::new(WorkerScript::Silent));
    let config = PoolConfig::default()
        .with_request_grace(Duration::from_secs(1))
        .with_timeout_policy(TimeoutPolicy::NoRetry)
        .with_sweep_every(2);
    let pool = Arc::new(SessionPool::new(config, spawner).unwrap());
    pool.create_session(A).await.unwrap();

    let first = tokio::spawn({
        let pool = Arc::clone(&pool);
        async move { pool.send(A, Command::Init).await }
    });
    while pool.stats().pending_requests == 0 {
        tokio::task::yield_now().await;
    }
    tokio::time::advance(Duration::from_secs(2)).await;

    let _second = tokio::spawn({
        let pool = Arc::clone(&pool);
        async move { pool.send(A, Command::GetDataset).await }
    });
    let err = first.await.unwrap().unwrap_err();
    assert!(matches!(err, PoolError::Timeout { request_id: 1 }));
}

#[tokio::test(start_paused = true)]
async fn idle_sessions_get_exactly_one_shutdown() {
    let spawner = Arc::new(ScriptedSpawner::new(WorkerScript::Echo));
    let config = PoolConfig::default()
        .with_process_max_age(Duration::from_secs(1))
        .with_reap_interval(Duration::from_millis(500));
    let pool = SessionPool::start(config, spawner.clone()).unwrap();
    pool.create_session(A).await.unwrap();
    pool.create_session(B).await.unwrap();

    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(300)).await;
        pool.send(B, Command::Init).await.unwrap();
    }

    assert_eq!(spawner.count(A, "SHUTDOWN"), 1);
    assert!(!pool.has_session(A));
    assert_eq!(spawner.count(B, "SHUTDOWN"), 0);
    assert!(pool.has_session(B));
    assert_eq!(pool.stats().reaped, 1);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(spawner.count(A, "SHUTDOWN"), 1);
}

#[tokio::test(start_paused = true)]
async fn manual_reap_skips_sessions_already_reaping() {
    let spawner = Arc::new(ScriptedSpawner::new(WorkerScript::Silent));
    let config = PoolConfig::default().with_process_max_age(Duration::from_secs(1));
    let pool = SessionPool::new(config, spawner.clone()).unwrap();
    pool.create_session(A).await.unwrap();

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(pool.reap_idle(), vec![A]);
    assert!(pool.reap_idle().is_empty());
    tokio::task::yield_now().await;
}

#[tokio::test(start_paused = true)]
async fn crashed_worker_is_deregistered_and_its_requests_time_out() {
    let spawner = Arc::new(ScriptedSpawner::new(WorkerScript::CrashAfter(1)));
    let pool = SessionPool::start(fast_timeouts(TimeoutPolicy::NoRetry), spawner.clone()).unwrap();
    pool.create_session(A).await.unwrap();

    pool.send(A, Command::Init).await.unwrap();
    let started = Instant::now();
    let err = pool.send(A, Command::GetDataset).await.unwrap_err();
    assert!(matches!(err, PoolError::Timeout { request_id: 2 }));
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(!pool.has_session(A));
    let stats = pool.stats();
    assert_eq!(stats.pending_requests, 0);
    assert_eq!(stats.timeouts, 1);

    let err = pool.send(A, Command::GetDataset).await.unwrap_err();
    assert_eq!(err, PoolError::SessionNotFound(A));

    pool.create_session(A).await.unwrap();
    assert_eq!(spawner.spawned(), 2);
    pool.send(A, Command::Init).await.unwrap();
}

#[tokio::test]
async fn fail_fast_rejects_pending_requests_of_a_crashed_worker() {
    let spawner = Arc::new(ScriptedSpawner::new(WorkerScript::CrashAfter(1)));
    let config = PoolConfig::default().with_fail_pending_on_disconnect(true);
    let pool = SessionPool::new(config, spawner).unwrap();
    pool.create_session(A).await.unwrap();

    pool.send(A, Command::Init).await.unwrap();
    let err = pool.send(A, Command::GetDataset).await.unwrap_err();
    assert_eq!(err, PoolError::WorkerDisconnected(A));
    assert!(!pool.has_session(A));
    assert_eq!(pool.stats().pending_requests, 0);
    assert_eq!(pool.stats().timeouts, 0);
}

#[tokio::test]
async fn close_all_shuts_down_every_session() {
    let spawner = Arc::new(ScriptedSpawner::new(WorkerScript::Echo));
    let pool = SessionPool::start(PoolConfig::default(), spawner.clone()).unwrap();
    for id in 1..=3 {
        pool.create_session(SessionId(id)).await.unwrap();
    }

    let outcomes = pool.close_all().await;
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|(_, outcome)| outcome.is_ok()));
    for id in 1..=3 {
        assert_eq!(spawner.count(SessionId(id), "SHUTDOWN"), 1);
    }
    assert!(pool.session_ids().is_empty());
}

#[tokio::test]
async fn close_session_waits_for_exit() {
    let spawner = Arc::new(ScriptedSpawner::new(WorkerScript::Echo));
    let pool = SessionPool::new(PoolConfig::default(), spawner).unwrap();
    pool.create_session(A).await.unwrap();

    pool.close_session(A).await.unwrap();
    assert!(!pool.has_session(A));
    assert_eq!(
        pool.close_session(A).await.unwrap_err(),
        PoolError::SessionNotFound(A)
    );
}

#[tokio::test(start_paused = true)]
async fn worker_ignoring_shutdown_is_dropped_after_the_wait() {
    let spawner = Arc::new(ScriptedSpawner::new(WorkerScript::IgnoreShutdown));
    let config = PoolConfig::default().with_shutdown_timeout(Duration::from_secs(2));
    let pool = SessionPool::new(config, spawner.clone()).unwrap();
    pool.create_session(A).await.unwrap();

    let started = Instant::now();
    let err = pool.close_session(A).await.unwrap_err();
    assert_eq!(err, PoolError::ShutdownTimeout { session_id: A });
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert!(!pool.has_session(A));
    assert_eq!(spawner.count(A, "SHUTDOWN"), 1);
}
