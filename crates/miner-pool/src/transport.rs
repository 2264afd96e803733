//! Worker spawners
//!
//! A [`WorkerSpawner`] starts one worker per session and hands back a
//! [`WorkerChannel`]. The pool only ever sees envelopes; whether they cross
//! a process boundary or a thread boundary is the spawner's business.
//! The response side closing means the worker is gone.

use crate::error::PoolError;
use async_trait::async_trait;
use miner_protocol::codec::{decode_response, encode_line};
use miner_protocol::{CodecError, RequestEnvelope, ResponseEnvelope, SessionId};
use miner_session::LocalWorker;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Envelope channels of one running worker
#[derive(Debug)]
pub struct WorkerChannel {
    /// Requests into the worker
    pub requests: mpsc::Sender<RequestEnvelope>,
    /// Responses out of the worker; closes when the worker exits
    pub responses: mpsc::Receiver<ResponseEnvelope>,
}

impl From<LocalWorker> for WorkerChannel {
    fn from(worker: LocalWorker) -> Self {
        Self {
            requests: worker.requests,
            responses: worker.responses,
        }
    }
}

/// Starts session workers
#[async_trait]
pub trait WorkerSpawner: Send + Sync + std::fmt::Debug {
    /// Start a worker for `session_id`
    ///
    /// # Errors
    /// - `PoolError::Spawn` if the worker cannot be started
    async fn spawn(&self, session_id: SessionId, capacity: usize) -> Result<WorkerChannel, PoolError>;
}

/// One OS process per session running the worker binary
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    worker_path: PathBuf,
    args: Vec<String>,
}

impl ProcessSpawner {
    /// Spawner for the given executable
    #[inline]
    #[must_use]
    pub fn new(worker_path: impl Into<PathBuf>) -> Self {
        Self {
            worker_path: worker_path.into(),
            args: Vec::new(),
        }
    }

    /// Extra arguments passed to every worker
    #[inline]
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Worker executable
    #[inline]
    #[must_use]
    pub fn worker_path(&self) -> &PathBuf {
        &self.worker_path
    }
}

#[async_trait]
impl WorkerSpawner for ProcessSpawner {
    async fn spawn(&self, session_id: SessionId, capacity: usize) -> Result<WorkerChannel, PoolError> {
        let mut child = Command::new(&self.worker_path)
            .arg("--session")
            .arg(session_id.to_string())
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PoolError::Spawn(format!("{}: {e}", self.worker_path.display())))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PoolError::Spawn("worker stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PoolError::Spawn("worker stdout not captured".to_string()))?;

        let pid = child.id();
        let (request_tx, request_rx) = mpsc::channel(capacity.max(1));
        let (response_tx, response_rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(write_requests(session_id, stdin, request_rx));
        tokio::spawn(read_responses(session_id, child, stdout, response_tx));

        info!(session_id = %session_id, pid = ?pid, "worker process started");
        Ok(WorkerChannel {
            requests: request_tx,
            responses: response_rx,
        })
    }
}

async fn write_requests(
    session_id: SessionId,
    mut stdin: ChildStdin,
    mut requests: mpsc::Receiver<RequestEnvelope>,
) {
    while let Some(request) = requests.recv().await {
        let line = match encode_line(&request) {
            Ok(line) => line,
            Err(err) => {
                warn!(session_id = %session_id, request_id = request.request_id, %err, "request not encodable");
                continue;
            }
        };
        if let Err(err) = stdin.write_all(line.as_bytes()).await {
            warn!(session_id = %session_id, %err, "worker stdin closed");
            break;
        }
        if let Err(err) = stdin.flush().await {
            warn!(session_id = %session_id, %err, "worker stdin closed");
            break;
        }
    }
    debug!(session_id = %session_id, "request writer finished");
}

async fn read_responses(
    session_id: SessionId,
    mut child: Child,
    stdout: ChildStdout,
    responses: mpsc::Sender<ResponseEnvelope>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match decode_response(&line) {
                Ok(response) => {
                    if responses.send(response).await.is_err() {
                        break;
                    }
                }
                Err(CodecError::Empty) => {}
                Err(err) => warn!(session_id = %session_id, %err, "undecodable worker output"),
            },
            Ok(None) => break,
            Err(err) => {
                warn!(session_id = %session_id, %err, "worker stdout failed");
                break;
            }
        }
    }
    match child.wait().await {
        Ok(status) => info!(session_id = %session_id, %status, "worker process exited"),
        Err(err) => warn!(session_id = %session_id, %err, "failed to reap worker process"),
    }
}

/// One blocking thread per session inside the current process
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSpawner;

impl LocalSpawner {
    /// In-process spawner
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WorkerSpawner for LocalSpawner {
    async fn spawn(&self, session_id: SessionId, capacity: usize) -> Result<WorkerChannel, PoolError> {
        let worker = miner_session::spawn_local(session_id, capacity)
            .map_err(|e| PoolError::Spawn(e.to_string()))?;
        debug!(session_id = %session_id, "worker thread started");
        Ok(worker.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miner_protocol::Command as WorkerCommand;

    #[tokio::test]
    async fn missing_executable_is_a_spawn_error() {
        let spawner = ProcessSpawner::new("/nonexistent/miner-worker");
        let err = spawner.spawn(SessionId(1), 4).await.unwrap_err();
        assert!(matches!(err, PoolError::Spawn(_)));
    }

    #[tokio::test]
    async fn local_worker_answers() {
        let mut channel = LocalSpawner::new().spawn(SessionId(3), 4).await.unwrap();
        channel
            .requests
            .send(RequestEnvelope::new(1, WorkerCommand::Init))
            .await
            .unwrap();
        let response = channel.responses.recv().await.unwrap();
        assert_eq!(response.request_id, 1);
        assert!(!response.is_error());
    }
}
