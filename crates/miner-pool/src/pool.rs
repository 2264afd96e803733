//! Session pool
//!
//! Multiplexes many isolated session workers behind one command surface:
//! - Worker lifecycle (create, close, idle reap)
//! - Request correlation through the [`PendingTable`]
//! - Timeout sweeps and pool statistics
//!
//! Handles live in a `DashMap` keyed by session id. Each worker has a
//! response-reader task that settles pending requests and deregisters the
//! handle once the worker's response stream ends.

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::pending::{PendingTable, SweepOutcome};
use crate::transport::{WorkerChannel, WorkerSpawner};
use dashmap::DashMap;
use miner_protocol::{Command, RequestEnvelope, ResponseEnvelope, SessionId};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};

/// Pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Registered workers
    pub live_sessions: usize,
    /// Requests awaiting a response
    pub pending_requests: usize,
    /// Requests written to workers since start
    pub requests_sent: u64,
    /// Requests rejected with a timeout since start
    pub timeouts: u64,
    /// Idle sessions sent `SHUTDOWN` by the reaper since start
    pub reaped: u64,
}

/// Registered worker of one session
#[derive(Debug)]
struct WorkerHandle {
    generation: u64,
    requests: mpsc::Sender<RequestEnvelope>,
    connected: AtomicBool,
    last_call_at: Mutex<Instant>,
    reaping: AtomicBool,
    exited: watch::Receiver<bool>,
}

impl WorkerHandle {
    fn touch(&self) {
        *self.last_call_at.lock() = Instant::now();
    }

    fn idle_for(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(*self.last_call_at.lock())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
struct PoolInner {
    config: PoolConfig,
    spawner: Arc<dyn WorkerSpawner>,
    handles: DashMap<SessionId, Arc<WorkerHandle>>,
    pending: PendingTable,
    spawn_lock: tokio::sync::Mutex<()>,
    next_request_id: AtomicU64,
    next_generation: AtomicU64,
    requests_sent: AtomicU64,
    timeouts: AtomicU64,
    reaped: AtomicU64,
}

impl PoolInner {
    fn sweep(&self) -> SweepOutcome {
        let outcome = self.pending.sweep(
            Instant::now(),
            self.config.request_grace(),
            self.config.timeout_policy,
        );
        if outcome.expired > 0 {
            self.timeouts
                .fetch_add(outcome.expired as u64, Ordering::Relaxed);
        }
        if outcome != SweepOutcome::default() {
            debug!(
                extended = outcome.extended,
                expired = outcome.expired,
                "timeout sweep"
            );
        }
        outcome
    }

    async fn send(&self, session_id: SessionId, command: Command) -> Result<Value, PoolError> {
        let handle = self
            .handles
            .get(&session_id)
            .map(|h| Arc::clone(h.value()))
            .ok_or(PoolError::SessionNotFound(session_id))?;
        if !handle.is_connected() {
            return Err(PoolError::WorkerDisconnected(session_id));
        }

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let reply = self
            .pending
            .insert(request_id, session_id, self.config.max_retries);
        handle.touch();

        let sent = self.requests_sent.fetch_add(1, Ordering::Relaxed) + 1;
        if self.config.sweep_every > 0 && sent % self.config.sweep_every == 0 {
            self.sweep();
        }

        debug!(session_id = %session_id, request_id, cmd = command.name(), "sending request");
        if handle
            .requests
            .send(RequestEnvelope::new(request_id, command))
            .await
            .is_err()
        {
            self.pending.remove(request_id);
            handle.connected.store(false, Ordering::Release);
            return Err(PoolError::WorkerDisconnected(session_id));
        }

        reply
            .await
            .unwrap_or(Err(PoolError::WorkerDisconnected(session_id)))
    }

    fn route(&self, session_id: SessionId, response: ResponseEnvelope) {
        let request_id = response.request_id;
        if self.pending.resolve(response) {
            debug!(session_id = %session_id, request_id, "response routed");
        } else {
            debug!(session_id = %session_id, request_id, "unmatched response dropped");
        }
    }

    fn disconnected(&self, session_id: SessionId, generation: u64) {
        if let Some(handle) = self.handles.get(&session_id) {
            if handle.generation == generation {
                handle.connected.store(false, Ordering::Release);
            }
        }
        self.handles
            .remove_if(&session_id, |_, h| h.generation == generation);
        if self.config.fail_pending_on_disconnect {
            let failed = self.pending.fail_session(session_id);
            info!(session_id = %session_id, failed_requests = failed, "worker disconnected");
        } else {
            let pending = self.pending.count_session(session_id);
            info!(
                session_id = %session_id,
                pending_requests = pending,
                "worker disconnected, pending requests left to time out"
            );
        }
    }
}

/// Pool of session workers
#[derive(Debug)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionPool {
    /// Pool without background timers
    ///
    /// Sweeps and reaps only happen through [`Self::sweep_timeouts`],
    /// [`Self::reap_idle`] and the opportunistic sweep in [`Self::send`].
    ///
    /// # Errors
    /// - `PoolError::Config` if the configuration is invalid
    pub fn new(config: PoolConfig, spawner: Arc<dyn WorkerSpawner>) -> Result<Self, PoolError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(PoolInner {
                config,
                spawner,
                handles: DashMap::new(),
                pending: PendingTable::new(),
                spawn_lock: tokio::sync::Mutex::new(()),
                next_request_id: AtomicU64::new(1),
                next_generation: AtomicU64::new(1),
                requests_sent: AtomicU64::new(0),
                timeouts: AtomicU64::new(0),
                reaped: AtomicU64::new(0),
            }),
            timers: Mutex::new(Vec::new()),
        })
    }

    /// Pool with the periodic sweep and reap timers running
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    /// - `PoolError::Config` if the configuration is invalid
    pub fn start(config: PoolConfig, spawner: Arc<dyn WorkerSpawner>) -> Result<Self, PoolError> {
        let pool = Self::new(config, spawner)?;
        let sweep = tokio::spawn(sweep_loop(Arc::downgrade(&pool.inner)));
        let reap = tokio::spawn(reap_loop(Arc::downgrade(&pool.inner)));
        pool.timers.lock().extend([sweep, reap]);
        info!("session pool started");
        Ok(pool)
    }

    /// Pool configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Start a worker for `session_id` unless one is registered
    ///
    /// # Errors
    /// - `PoolError::Spawn` if the worker cannot be started
    pub async fn create_session(&self, session_id: SessionId) -> Result<(), PoolError> {
        let _guard = self.inner.spawn_lock.lock().await;
        if self
            .inner
            .handles
            .get(&session_id)
            .is_some_and(|h| h.is_connected())
        {
            return Ok(());
        }

        let WorkerChannel {
            requests,
            responses,
        } = self
            .inner
            .spawner
            .spawn(session_id, self.inner.config.channel_capacity)
            .await?;
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let (exit_tx, exit_rx) = watch::channel(false);

        self.inner.handles.insert(
            session_id,
            Arc::new(WorkerHandle {
                generation,
                requests,
                connected: AtomicBool::new(true),
                last_call_at: Mutex::new(Instant::now()),
                reaping: AtomicBool::new(false),
                exited: exit_rx,
            }),
        );

        let inner = Arc::clone(&self.inner);
        let span = tracing::info_span!("session", session_id = %session_id);
        tokio::spawn(
            async move {
                read_loop(&inner, session_id, generation, responses).await;
                let _ = exit_tx.send(true);
            }
            .instrument(span),
        );

        info!(session_id = %session_id, generation, "session created");
        Ok(())
    }

    /// Send a command and await its correlated response
    ///
    /// # Errors
    /// - `PoolError::SessionNotFound` if no worker is registered
    /// - `PoolError::WorkerDisconnected` if the worker is gone
    /// - `PoolError::Timeout` once the request's deadline is exhausted
    /// - The worker's own error, classified by its wire kind
    pub async fn send(&self, session_id: SessionId, command: Command) -> Result<Value, PoolError> {
        self.inner.send(session_id, command).await
    }

    /// Send `SHUTDOWN` and wait for the worker to exit
    ///
    /// # Errors
    /// - `PoolError::SessionNotFound` if no worker is registered
    /// - `PoolError::ShutdownTimeout` if the worker outlives the shutdown wait
    /// - The worker's error if it rejected the shutdown
    pub async fn close_session(&self, session_id: SessionId) -> Result<(), PoolError> {
        close(&self.inner, session_id).await
    }

    /// Shut down every session and stop the timers
    ///
    /// Sessions close concurrently; every outcome is collected.
    pub async fn close_all(&self) -> Vec<(SessionId, Result<(), PoolError>)> {
        for timer in self.timers.lock().drain(..) {
            timer.abort();
        }
        let ids = self.session_ids();
        let outcomes = futures::future::join_all(ids.iter().map(|&id| close(&self.inner, id))).await;
        let results: Vec<(SessionId, Result<(), PoolError>)> = ids.into_iter().zip(outcomes).collect();
        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        info!(sessions = results.len(), failed, "session pool closed");
        results
    }

    /// Run the timeout sweep now
    pub fn sweep_timeouts(&self) -> SweepOutcome {
        self.inner.sweep()
    }

    /// Send `SHUTDOWN` to every session idle for longer than the maximum age
    ///
    /// Returns the sessions signalled by this call. A session is signalled
    /// at most once; its handle goes away when the worker exits.
    pub fn reap_idle(&self) -> Vec<SessionId> {
        reap(&self.inner)
    }

    /// Current statistics
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            live_sessions: self.inner.handles.len(),
            pending_requests: self.inner.pending.len(),
            requests_sent: self.inner.requests_sent.load(Ordering::Relaxed),
            timeouts: self.inner.timeouts.load(Ordering::Relaxed),
            reaped: self.inner.reaped.load(Ordering::Relaxed),
        }
    }

    /// Whether a worker is registered for `session_id`
    #[must_use]
    pub fn has_session(&self, session_id: SessionId) -> bool {
        self.inner.handles.contains_key(&session_id)
    }

    /// Registered session ids, ascending
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.inner.handles.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }
}

impl Drop for SessionPool {
    fn drop(&mut self) {
        for timer in self.timers.get_mut().drain(..) {
            timer.abort();
        }
    }
}

async fn read_loop(
    inner: &PoolInner,
    session_id: SessionId,
    generation: u64,
    mut responses: mpsc::Receiver<ResponseEnvelope>,
) {
    while let Some(response) = responses.recv().await {
        inner.route(session_id, response);
    }
    inner.disconnected(session_id, generation);
}

async fn close(inner: &PoolInner, session_id: SessionId) -> Result<(), PoolError> {
    let handle = inner
        .handles
        .get(&session_id)
        .map(|h| Arc::clone(h.value()))
        .ok_or(PoolError::SessionNotFound(session_id))?;
    let exit = wait_for_exit(handle.exited.clone());
    tokio::pin!(exit);

    // A worker dying before it answers leaves the SHUTDOWN request to the sweep
    let answer = tokio::select! {
        answer = inner.send(session_id, Command::Shutdown) => Some(answer),
        () = exit.as_mut() => None,
    };
    let exited = match answer {
        None => true,
        Some(Ok(_) | Err(PoolError::WorkerDisconnected(_))) => {
            tokio::time::timeout(inner.config.shutdown_timeout(), exit.as_mut())
                .await
                .is_ok()
        }
        Some(Err(err)) => return Err(err),
    };

    if exited {
        info!(session_id = %session_id, "session closed");
        Ok(())
    } else {
        warn!(session_id = %session_id, "worker did not exit after SHUTDOWN");
        inner
            .handles
            .remove_if(&session_id, |_, h| h.generation == handle.generation);
        Err(PoolError::ShutdownTimeout { session_id })
    }
}

async fn wait_for_exit(mut exited: watch::Receiver<bool>) {
    // A dropped sender also means the reader task is gone
    let _ = exited.wait_for(|done| *done).await;
}

fn reap(inner: &Arc<PoolInner>) -> Vec<SessionId> {
    let now = Instant::now();
    let max_age = inner.config.process_max_age();
    let idle: Vec<SessionId> = inner
        .handles
        .iter()
        .filter(|e| e.value().idle_for(now) > max_age)
        .filter(|e| !e.value().reaping.swap(true, Ordering::AcqRel))
        .map(|e| *e.key())
        .collect();

    for &session_id in &idle {
        inner.reaped.fetch_add(1, Ordering::Relaxed);
        info!(session_id = %session_id, "reaping idle session");
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            if let Err(err) = inner.send(session_id, Command::Shutdown).await {
                warn!(session_id = %session_id, %err, "idle shutdown failed");
            }
        });
    }
    idle
}

async fn sweep_loop(inner: Weak<PoolInner>) {
    let period = match inner.upgrade() {
        Some(inner) => inner.config.sweep_interval(),
        None => return,
    };
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else { break };
        inner.sweep();
    }
}

async fn reap_loop(inner: Weak<PoolInner>) {
    let period = match inner.upgrade() {
        Some(inner) => inner.config.reap_interval(),
        None => return,
    };
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else { break };
        reap(&inner);
    }
}
