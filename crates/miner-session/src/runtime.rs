//! Command dispatch
//!
//! [`WorkerRuntime`] turns one request envelope into one response envelope.
//! Errors never escape: every failure, including a panicking command,
//! becomes an `{error, kind}` response and the runtime stays usable.

use crate::error::SessionError;
use crate::session::Session;
use miner_protocol::{Command, ErrorKind, RequestEnvelope, ResponseEnvelope};
use serde_json::{json, Value};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, info_span, warn};

/// Response to one request plus whether the worker should stop
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    /// Response to send back
    pub response: ResponseEnvelope,
    /// Set after `SHUTDOWN`
    pub shutdown: bool,
}

/// Per-worker dispatcher holding at most one attached session
#[derive(Debug, Default)]
pub struct WorkerRuntime {
    session: Option<Session>,
}

impl WorkerRuntime {
    /// Runtime with no dataset attached
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attached session, if any
    #[inline]
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Execute one request
    pub fn handle(&mut self, request: RequestEnvelope) -> Dispatch {
        let RequestEnvelope { request_id, body } = request;
        let span = info_span!("command", request_id, cmd = body.name());
        let _enter = span.enter();

        let shutdown = matches!(body, Command::Shutdown);
        let response = match guarded(|| self.execute(body)) {
            Ok(results) => {
                debug!("command succeeded");
                ResponseEnvelope::success(request_id, results)
            }
            Err(err) => {
                let kind = err.kind();
                if kind == ErrorKind::Internal {
                    error!(%err, "command failed");
                } else {
                    warn!(%err, ?kind, "command rejected");
                }
                ResponseEnvelope::failure(request_id, kind, err.to_string())
            }
        };
        Dispatch { response, shutdown }
    }

    /// Close the attached session, if any
    ///
    /// # Errors
    /// - `SessionError::Graph` if the final snapshot cannot be written
    pub fn close(&mut self) -> Result<(), SessionError> {
        match self.session.take() {
            Some(session) => session.close(),
            None => Ok(()),
        }
    }

    fn execute(&mut self, command: Command) -> Result<Value, SessionError> {
        match command {
            Command::Init => Ok(json!({ "initialized": true, "version": crate::VERSION })),
            Command::Shutdown => {
                self.close()?;
                Ok(json!({ "shutdown": true }))
            }
            Command::CreateDataset(bootstrap) => {
                self.close()?;
                let session = self.session.insert(Session::create(bootstrap)?);
                Ok(session.dataset())
            }
            Command::OpenDataset(bootstrap) => {
                self.close()?;
                let session = self.session.insert(Session::open(bootstrap)?);
                Ok(session.dataset())
            }
            command => {
                let session = self.session.as_mut().ok_or(SessionError::NotInitialized)?;
                dispatch(session, command)
            }
        }
    }
}

/// Run a command, turning a panic into an internal error
fn guarded<F>(command: F) -> Result<Value, SessionError>
where
    F: FnOnce() -> Result<Value, SessionError>,
{
    panic::catch_unwind(AssertUnwindSafe(command)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(SessionError::Internal(format!("command panicked: {message}")))
    })
}

fn dispatch(session: &mut Session, command: Command) -> Result<Value, SessionError> {
    match command {
        Command::GetDataset => Ok(session.dataset()),
        Command::UpdateDataset(update) => Ok(session.update_dataset(update)),
        Command::GetSubsets => Ok(session.subsets()),
        Command::GetSubset(r) => session.subset(r.subset_id),
        Command::UpdateSubset(update) => session.update_subset(update),
        Command::DeleteSubset(r) => session.delete_subset(r.subset_id),
        Command::DownloadSubset(r) => session.download_subset(r.subset_id),
        Command::GetMethods => Ok(session.methods()),
        Command::GetMethod(r) => session.method(r.method_id),
        Command::CreateMethod(create) => session.create_method(create),
        Command::UpdateMethod(update) => session.update_method(update),
        Command::DeleteMethod(r) => session.delete_method(r.method_id),
        Command::GetDocuments(query) => session.documents(&query),
        Command::GetDocument(r) => session.document(r.document_id),
        Command::UpdateDocument(update) => session.update_document(update),
        Command::Init
        | Command::Shutdown
        | Command::CreateDataset(_)
        | Command::OpenDataset(_) => Err(SessionError::Internal(
            "lifecycle command reached session dispatch".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miner_protocol::{SubsetId, SubsetRef};

    #[test]
    fn init_answers_without_session() {
        let mut runtime = WorkerRuntime::new();
        let dispatch = runtime.handle(RequestEnvelope::new(1, Command::Init));
        assert!(!dispatch.shutdown);
        assert_eq!(dispatch.response.request_id, 1);
        assert_eq!(dispatch.response.results.unwrap()["initialized"], true);
    }

    #[test]
    fn commands_before_bootstrap_are_rejected() {
        let mut runtime = WorkerRuntime::new();
        let dispatch = runtime.handle(RequestEnvelope::new(
            7,
            Command::GetSubset(SubsetRef {
                subset_id: SubsetId::ROOT,
            }),
        ));
        assert!(dispatch.response.is_error());
        assert_eq!(dispatch.response.kind, Some(ErrorKind::Validation));
        assert_eq!(dispatch.response.request_id, 7);
    }

    #[test]
    fn panics_become_internal_errors() {
        let err = guarded(|| panic!("index out of bounds")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("index out of bounds"));

        let ok = guarded(|| Ok(json!({"fine": true}))).unwrap();
        assert_eq!(ok["fine"], true);
    }

    #[test]
    fn shutdown_without_session_stops() {
        let mut runtime = WorkerRuntime::new();
        let dispatch = runtime.handle(RequestEnvelope::new(2, Command::Shutdown));
        assert!(dispatch.shutdown);
        assert!(!dispatch.response.is_error());
    }
}
