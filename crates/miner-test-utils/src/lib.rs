//! Testing utilities for the Miner workspace
//!
//! Shared fixtures (dataset files, bootstraps) and a scripted worker
//! spawner for exercising the pool without real sessions.

#![allow(missing_docs)]

use async_trait::async_trait;
use miner_pool::{PoolError, WorkerChannel, WorkerSpawner};
use miner_protocol::{
    Command, DatasetBootstrap, DatasetInfo, FieldDescriptor, FieldType, FileInfo, Processing,
    RequestEnvelope, ResponseEnvelope, SessionId,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

// ------------------------------------------------------------------
// Dataset fixtures
// ------------------------------------------------------------------

/// A source file in its own temporary directory
#[derive(Debug)]
pub struct FixtureDataset {
    pub dir: TempDir,
    pub source: PathBuf,
    pub fields: Vec<FieldDescriptor>,
}

impl FixtureDataset {
    /// Bootstrap payload storing the dataset under `<dir>/db-<id>`
    pub fn bootstrap(&self, id: u64) -> DatasetBootstrap {
        bootstrap(
            id,
            self.dir.path().join(format!("db-{id}")),
            &self.source,
            self.fields.clone(),
        )
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

pub fn bootstrap(
    id: u64,
    dbpath: PathBuf,
    source: &Path,
    fields: Vec<FieldDescriptor>,
) -> DatasetBootstrap {
    DatasetBootstrap {
        dataset: DatasetInfo {
            id: SessionId(id),
            name: format!("dataset {id}"),
            description: None,
            created: None,
            dbpath,
            processing: Processing::default(),
        },
        file: FileInfo {
            filepath: Some(source.to_path_buf()),
            delimiter: ",".to_string(),
            fields,
        },
    }
}

pub fn write_csv(dir: &Path, name: &str, header: &str, rows: &[String]) -> PathBuf {
    let path = dir.join(name);
    let mut text = String::from(header);
    text.push('\n');
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    fs::write(&path, text).unwrap();
    path
}

/// Ten rows with one field of every type
pub fn all_types_dataset() -> FixtureDataset {
    let dir = tempfile::tempdir().unwrap();
    let genres = ["drama", "comedy", "drama", "horror", "comedy"];
    let topics = ["science/physics", "science/biology", "arts/music", "arts/film", "science/physics"];
    let rows: Vec<String> = (0..10)
        .map(|i| {
            format!(
                "\"story {i}, about {}\",{},{},{},2021-0{}-1{} 10:00:00",
                genres[i % 5],
                i * 10,
                genres[i % 5],
                topics[i % 5],
                1 + i % 9,
                i % 10,
            )
        })
        .collect();
    let source = write_csv(dir.path(), "all_types.csv", "title,score,genre,topic,published", &rows);
    FixtureDataset {
        dir,
        source,
        fields: vec![
            FieldDescriptor::new("title", FieldType::Text),
            FieldDescriptor::new("score", FieldType::Number),
            FieldDescriptor::new("genre", FieldType::Class),
            FieldDescriptor::new("topic", FieldType::Category),
            FieldDescriptor::new("published", FieldType::Datetime),
        ],
    }
}

/// `n` one-field documents: even rows about "foo", odd rows about "bar"
pub fn foo_bar_corpus(n: usize) -> FixtureDataset {
    let dir = tempfile::tempdir().unwrap();
    let rows: Vec<String> = (0..n)
        .map(|i| {
            if i % 2 == 0 {
                format!("foo alpha{i}")
            } else {
                format!("bar beta{i}")
            }
        })
        .collect();
    let source = write_csv(dir.path(), "corpus.csv", "text", &rows);
    FixtureDataset {
        dir,
        source,
        fields: vec![FieldDescriptor::new("text", FieldType::Text)],
    }
}

// ------------------------------------------------------------------
// Scripted workers
// ------------------------------------------------------------------

/// How a scripted worker answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerScript {
    /// Answer every request with its own body plus `sessionId`
    Echo,
    /// Answer only `SHUTDOWN`
    Silent,
    /// Answer after the given delay; `SHUTDOWN` is answered at once
    Delayed(Duration),
    /// Answer the first `n` requests, then exit without answering
    CrashAfter(usize),
    /// Answer everything but keep running after `SHUTDOWN`
    IgnoreShutdown,
}

/// Spawner whose workers are tokio tasks following a [`WorkerScript`]
#[derive(Debug, Clone)]
pub struct ScriptedSpawner {
    script: WorkerScript,
    received: Arc<Mutex<Vec<(SessionId, String)>>>,
    spawned: Arc<AtomicUsize>,
}

impl ScriptedSpawner {
    pub fn new(script: WorkerScript) -> Self {
        Self {
            script,
            received: Arc::new(Mutex::new(Vec::new())),
            spawned: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every `(session, command name)` received so far
    pub fn received(&self) -> Vec<(SessionId, String)> {
        self.received.lock().clone()
    }

    pub fn count(&self, session_id: SessionId, cmd: &str) -> usize {
        self.received
            .lock()
            .iter()
            .filter(|(s, c)| *s == session_id && c == cmd)
            .count()
    }

    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerSpawner for ScriptedSpawner {
    async fn spawn(&self, session_id: SessionId, capacity: usize) -> Result<WorkerChannel, PoolError> {
        let (request_tx, request_rx) = mpsc::channel(capacity);
        let (response_tx, response_rx) = mpsc::channel(capacity);
        self.spawned.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(run_script(
            session_id,
            self.script,
            Arc::clone(&self.received),
            request_rx,
            response_tx,
        ));
        Ok(WorkerChannel {
            requests: request_tx,
            responses: response_rx,
        })
    }
}

pub fn echo(session_id: SessionId, request: &RequestEnvelope) -> ResponseEnvelope {
    let mut body: Value = serde_json::to_value(&request.body).unwrap_or(Value::Null);
    body["sessionId"] = json!(session_id);
    ResponseEnvelope::success(request.request_id, body)
}

async fn run_script(
    session_id: SessionId,
    script: WorkerScript,
    received: Arc<Mutex<Vec<(SessionId, String)>>>,
    mut requests: mpsc::Receiver<RequestEnvelope>,
    responses: mpsc::Sender<ResponseEnvelope>,
) {
    let mut handled = 0;
    while let Some(request) = requests.recv().await {
        received
            .lock()
            .push((session_id, request.body.name().to_string()));
        let shutdown = matches!(request.body, Command::Shutdown);
        if let WorkerScript::CrashAfter(n) = script {
            if handled >= n {
                return;
            }
        }
        handled += 1;

        let response = echo(session_id, &request);
        match script {
            WorkerScript::Silent if !shutdown => continue,
            WorkerScript::Delayed(delay) if !shutdown => {
                let responses = responses.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = responses.send(response).await;
                });
            }
            _ => {
                if responses.send(response).await.is_err() {
                    return;
                }
            }
        }
        if shutdown && script != WorkerScript::IgnoreShutdown {
            return;
        }
    }
}
