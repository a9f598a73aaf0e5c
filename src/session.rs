//! Request/response correlation over a line-delimited JSON-RPC stream.
//!
//! A [`Session`] splits its stream in two. The write half stays with the
//! session and is used by [`Session::call`]; the read half moves into a
//! background task that routes every incoming line: responses go to the
//! waiting caller, notifications go to the [`NotificationSink`], and
//! anything undecodable is logged and dropped.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::BytesMut;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::protocol::{Framer, Message};

/// Receiver for server-pushed messages.
///
/// Called from the session's reader task, so it must return promptly.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, method: &str, params: &Value);
}

impl<F> NotificationSink for F
where
    F: Fn(&str, &Value) + Send + Sync,
{
    fn notify(&self, method: &str, params: &Value) {
        self(method, params)
    }
}

/// Sink that writes every notification to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, method: &str, params: &Value) {
        info!("[server push] Method {:?} params {}", method, params);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    Local,
    Remote,
}

impl CloseReason {
    fn error(self) -> ClientError {
        match self {
            CloseReason::Local => ClientError::SessionClosed,
            CloseReason::Remote => ClientError::ConnectionClosed,
        }
    }
}

type Waiter = oneshot::Sender<Result<Value>>;

#[derive(Default)]
struct PendingState {
    closed: Option<CloseReason>,
    waiters: HashMap<u64, Waiter>,
}

/// Calls awaiting a response, keyed by request id
#[derive(Default)]
struct PendingCalls {
    state: Mutex<PendingState>,
}

impl PendingCalls {
    fn lock(&self) -> MutexGuard<'_, PendingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, id: u64, waiter: Waiter) -> Result<()> {
        let mut state = self.lock();
        if let Some(reason) = state.closed {
            return Err(reason.error());
        }
        state.waiters.insert(id, waiter);
        Ok(())
    }

    /// Hand `outcome` to the caller waiting on `id`. Returns false if nobody is waiting.
    fn resolve(&self, id: u64, outcome: Result<Value>) -> bool {
        let waiter = self.lock().waiters.remove(&id);
        match waiter {
            Some(waiter) => {
                // The caller may have given up already.
                let _ = waiter.send(outcome);
                true
            }
            None => false,
        }
    }

    fn forget(&self, id: u64) {
        self.lock().waiters.remove(&id);
    }

    /// Refuse new calls and fail every outstanding one. The first reason wins.
    fn close(&self, reason: CloseReason) {
        let (reason, waiters): (CloseReason, Vec<Waiter>) = {
            let mut state = self.lock();
            let reason = *state.closed.get_or_insert(reason);
            (reason, state.waiters.drain().map(|(_, waiter)| waiter).collect())
        };
        if !waiters.is_empty() {
            debug!("Failing {} outstanding calls: {:?}", waiters.len(), reason);
        }
        for waiter in waiters {
            let _ = waiter.send(Err(reason.error()));
        }
    }

    fn len(&self) -> usize {
        self.lock().waiters.len()
    }
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// JSON-RPC session over one byte stream
pub struct Session {
    writer: AsyncMutex<Option<BoxedWriter>>,
    pending: Arc<PendingCalls>,
    next_id: AtomicU64,
    reader: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Session {
    /// Start a session on `stream`. Must be called from within a tokio runtime.
    pub fn open<S>(stream: S, sink: Arc<dyn NotificationSink>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let pending = Arc::new(PendingCalls::default());
        let reader = tokio::spawn(read_loop(read_half, Arc::clone(&pending), sink));

        Session {
            writer: AsyncMutex::new(Some(Box::new(write_half))),
            pending,
            next_id: AtomicU64::new(1),
            reader: Mutex::new(Some(reader)),
            closed: AtomicBool::new(false),
        }
    }

    /// Send one request and wait for its response.
    ///
    /// Resolves with the server's result, with [`ClientError::Rpc`] if the
    /// server answered with an error, or with [`ClientError::Cancelled`] if
    /// `lifetime` is cancelled first. Nothing is sent when `lifetime` is
    /// already cancelled. Once writing has started the whole line is written,
    /// so the stream stays usable for later calls.
    pub async fn call(
        &self,
        method: &str,
        params: Value,
        lifetime: &CancellationToken,
    ) -> Result<Value> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::SessionClosed);
        }
        if lifetime.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = Framer::frame(Message::new_request(id, method, params).to_json()?.as_bytes());

        let (tx, rx) = oneshot::channel();
        self.pending.register(id, tx)?;
        debug!("Sending request id={} method={}", id, method);

        if let Err(e) = self.write_frame(&frame).await {
            self.pending.forget(id);
            return Err(e);
        }

        let outcome = tokio::select! {
            biased;
            _ = lifetime.cancelled() => {
                debug!("Request id={} cancelled", id);
                Err(ClientError::Cancelled)
            }
            outcome = rx => outcome.unwrap_or(Err(ClientError::ConnectionClosed)),
        };

        if outcome.is_err() {
            self.pending.forget(id);
        }
        outcome
    }

    async fn write_frame(&self, frame: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(ClientError::SessionClosed)?;
        writer.write_all(frame).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Close the session. Outstanding calls fail with [`ClientError::SessionClosed`].
    ///
    /// Only the first call does any work.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("Session already closed");
            return Ok(());
        }

        self.stop_reader();
        self.pending.close(CloseReason::Local);

        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            match writer.shutdown().await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotConnected => {
                    debug!("Peer already gone at shutdown: {}", e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of calls still waiting for a response
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    fn stop_reader(&self) {
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(reader) = reader {
            reader.abort();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_reader();
        self.pending.close(CloseReason::Local);
    }
}

async fn read_loop<R>(mut reader: R, pending: Arc<PendingCalls>, sink: Arc<dyn NotificationSink>)
where
    R: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::with_capacity(4096);

    'read: loop {
        loop {
            match Framer::extract_message(&mut buffer) {
                Ok(Some(line)) => dispatch(&line, &pending, sink.as_ref()),
                Ok(None) => break,
                Err(e) => {
                    warn!("Closing session: {}", e);
                    break 'read;
                }
            }
        }

        match reader.read_buf(&mut buffer).await {
            Ok(0) => {
                debug!("Server closed the connection");
                break;
            }
            Ok(n) => debug!("Read {} bytes", n),
            Err(e) => {
                warn!("Read failed: {}", e);
                break;
            }
        }
    }

    pending.close(CloseReason::Remote);
}

fn dispatch(line: &[u8], pending: &PendingCalls, sink: &dyn NotificationSink) {
    let text = match std::str::from_utf8(line) {
        Ok(text) => text,
        Err(e) => {
            warn!("Dropping non UTF-8 message: {}", e);
            return;
        }
    };

    let message = match Message::from_json(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Dropping undecodable message: {} - Raw: {}", e, text);
            return;
        }
    };

    match message {
        Message::Response { id, result } => {
            if !pending.resolve(id, Ok(result)) {
                warn!("No pending call for response id={}", id);
            }
        }
        Message::Error {
            id: Some(id),
            code,
            message,
            ..
        } => {
            if !pending.resolve(id, Err(ClientError::rpc(code, message))) {
                warn!("No pending call for error id={}", id);
            }
        }
        Message::Error {
            id: None,
            code,
            message,
            ..
        } => {
            warn!("Uncorrelated error from server: {} {}", code, message);
        }
        Message::Notification { method, params } => sink.notify(&method, &params),
        Message::Request { id, method, .. } => {
            warn!("Ignoring server call {} id={}", method, id);
        }
    }
}
