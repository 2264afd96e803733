//! Worker loops
//!
//! Two ways to host a [`WorkerRuntime`]:
//! - [`run_stdio`]: JSON lines over a reader/writer pair, used by the
//!   `miner-worker` process
//! - [`spawn_local`]: a dedicated thread fed through channels, used when
//!   sessions run inside the control-plane process
//!
//! Both handle one request at a time, in arrival order.

use crate::error::WorkerError;
use crate::runtime::{Dispatch, WorkerRuntime};
use miner_protocol::codec::{decode_request, encode_line, peek_request_id};
use miner_protocol::{CodecError, ErrorKind, RequestEnvelope, ResponseEnvelope, SessionId};
use std::future::Future;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Serve requests from `reader` until `SHUTDOWN`, end of input or `shutdown`
///
/// Commands run on the blocking pool one at a time; the next line is read
/// and `shutdown` is polled only after the current command has answered.
/// A panicking command is answered with an internal error and the session
/// stays attached. Undecodable lines are answered with a validation error
/// carrying whatever request id could be recovered (0 otherwise).
///
/// # Errors
/// - `WorkerError::Io` if the streams fail
/// - `WorkerError::Session` if the session cannot be closed on exit
pub async fn run_stdio<R, W, F>(reader: R, mut writer: W, shutdown: F) -> Result<(), WorkerError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    F: Future<Output = ()>,
{
    let mut lines = reader.lines();
    let mut runtime = WorkerRuntime::new();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            biased;
            () = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            info!("input closed");
            break;
        };

        let dispatch = match decode_request(&line) {
            Ok(request) => {
                let owned = std::mem::take(&mut runtime);
                let (returned, dispatch) = tokio::task::spawn_blocking(move || {
                    let mut runtime = owned;
                    let dispatch = runtime.handle(request);
                    (runtime, dispatch)
                })
                .await
                .map_err(|e| WorkerError::Task(e.to_string()))?;
                runtime = returned;
                dispatch
            }
            Err(CodecError::Empty) => continue,
            Err(err) => {
                let request_id = peek_request_id(&line).unwrap_or(0);
                warn!(request_id, %err, "undecodable request");
                Dispatch {
                    response: ResponseEnvelope::failure(request_id, ErrorKind::Validation, err.to_string()),
                    shutdown: false,
                }
            }
        };

        writer
            .write_all(encode_line(&dispatch.response)?.as_bytes())
            .await?;
        writer.flush().await?;
        if dispatch.shutdown {
            info!("worker stopped by SHUTDOWN");
            return Ok(());
        }
    }

    runtime.close()?;
    Ok(())
}

/// Channels of an in-process worker
#[derive(Debug)]
pub struct LocalWorker {
    /// Requests into the worker
    pub requests: mpsc::Sender<RequestEnvelope>,
    /// Responses out of the worker; closes when the worker exits
    pub responses: mpsc::Receiver<ResponseEnvelope>,
}

/// Start a session worker on its own thread
///
/// The thread exits after `SHUTDOWN`, when the request sender is dropped,
/// or when the response receiver is gone. The owner observes the exit as
/// the response channel closing.
///
/// # Errors
/// Returns the OS error if the thread cannot be spawned.
pub fn spawn_local(session_id: SessionId, capacity: usize) -> io::Result<LocalWorker> {
    let (request_tx, mut request_rx) = mpsc::channel::<RequestEnvelope>(capacity.max(1));
    let (response_tx, response_rx) = mpsc::channel::<ResponseEnvelope>(capacity.max(1));

    std::thread::Builder::new()
        .name(format!("miner-session-{session_id}"))
        .spawn(move || {
            let span = tracing::info_span!("worker", session_id = %session_id);
            let _enter = span.enter();
            let mut runtime = WorkerRuntime::new();

            while let Some(request) = request_rx.blocking_recv() {
                let dispatch = runtime.handle(request);
                if response_tx.blocking_send(dispatch.response).is_err() {
                    warn!("response channel closed");
                    break;
                }
                if dispatch.shutdown {
                    info!("worker stopped by SHUTDOWN");
                    return;
                }
            }
            if let Err(err) = runtime.close() {
                error!(%err, "failed to close session");
            }
        })?;

    Ok(LocalWorker {
        requests: request_tx,
        responses: response_rx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use miner_protocol::codec::decode_response;
    use miner_protocol::Command;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn stdio_answers_and_stops_on_shutdown() {
        let (client, server) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let worker = tokio::spawn(run_stdio(
            BufReader::new(server_read),
            server_write,
            std::future::pending::<()>(),
        ));

        let (client_read, mut client_write) = tokio::io::split(client);
        let mut responses = BufReader::new(client_read).lines();

        client_write
            .write_all(encode_line(&RequestEnvelope::new(1, Command::Init)).unwrap().as_bytes())
            .await
            .unwrap();
        client_write.write_all(b"{\"requestId\": 2, \"body\": {\"cmd\": \"NOPE\"}}\n").await.unwrap();
        client_write
            .write_all(encode_line(&RequestEnvelope::new(3, Command::Shutdown)).unwrap().as_bytes())
            .await
            .unwrap();

        let first = decode_response(&responses.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first.request_id, 1);
        assert!(!first.is_error());

        let second = decode_response(&responses.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(second.request_id, 2);
        assert_eq!(second.kind, Some(ErrorKind::Validation));

        let third = decode_response(&responses.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(third.request_id, 3);

        worker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stdio_exits_on_end_of_input() {
        let input: &[u8] = b"";
        let mut output = Vec::new();
        run_stdio(BufReader::new(input), &mut output, std::future::pending::<()>())
            .await
            .unwrap();
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn local_worker_round_trip() {
        let mut worker = spawn_local(SessionId(9), 4).unwrap();
        worker
            .requests
            .send(RequestEnvelope::new(5, Command::Init))
            .await
            .unwrap();
        let response = worker.responses.recv().await.unwrap();
        assert_eq!(response.request_id, 5);

        worker
            .requests
            .send(RequestEnvelope::new(6, Command::Shutdown))
            .await
            .unwrap();
        assert_eq!(worker.responses.recv().await.unwrap().request_id, 6);
        assert!(worker.responses.recv().await.is_none());
    }
}
