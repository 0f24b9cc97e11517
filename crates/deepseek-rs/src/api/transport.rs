//! HTTP transport seam for the completion client.
//!
//! One [`Connection`] is opened per attempt and used exactly once: write the
//! request, then read the response. Every connection hands out a
//! [`CloseHandle`] that another thread may use to tear it down abruptly; the
//! pending [`Connection::read_response`] then fails with
//! [`TransportFault::Closed`] (or whatever I/O error the close provokes).
//!
//! [`ReqwestTransport`] is the production implementation. Tests substitute
//! scripted transports through the same traits.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{AbortHandle, JoinHandle};
use tracing::trace;

/// Boxed future returned by [`Connection`] methods. Boxing keeps the traits
/// dyn-compatible.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransportFault>> + Send + 'a>>;

/// Per-attempt limits. Not cumulative across retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptTimeouts {
    pub connect: Duration,
    pub read: Duration,
}

/// A fully built HTTP POST.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Status and body of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Structured category of a transmission fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFault {
    /// Connect or read deadline elapsed.
    Timeout(String),
    /// Could not establish a connection (DNS, refused, unreachable).
    Connect(String),
    /// TLS handshake or certificate failure.
    Tls(String),
    /// The connection was torn down through its [`CloseHandle`].
    Closed,
    /// Anything else.
    Other(String),
}

impl TransportFault {
    /// The fault's underlying message text.
    pub fn message(&self) -> &str {
        match self {
            TransportFault::Timeout(m)
            | TransportFault::Connect(m)
            | TransportFault::Tls(m)
            | TransportFault::Other(m) => m,
            TransportFault::Closed => "connection closed",
        }
    }
}

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportFault::Timeout(m) => write!(f, "timed out: {m}"),
            TransportFault::Connect(m) => write!(f, "connect failed: {m}"),
            TransportFault::Tls(m) => write!(f, "TLS failure: {m}"),
            TransportFault::Closed => write!(f, "connection closed"),
            TransportFault::Other(m) => write!(f, "{m}"),
        }
    }
}

impl std::error::Error for TransportFault {}

/// Abruptly closes a live connection. Must be safe to call from any thread,
/// more than once, and after the connection has already finished.
pub trait CloseHandle: Send + Sync {
    fn close(&self);
}

/// One connect-write-read cycle.
pub trait Connection: Send {
    /// Transmit the request.
    fn write<'a>(&'a mut self, request: &'a HttpRequest) -> TransportFuture<'a, ()>;

    /// Wait for the status line and read the body.
    fn read_response(&mut self) -> TransportFuture<'_, HttpResponse>;

    /// Handle that tears this connection down from another thread.
    fn close_handle(&self) -> Arc<dyn CloseHandle>;
}

/// Opens fresh connections to the completion endpoint.
pub trait Transport: Send + Sync {
    fn open(&self, timeouts: AttemptTimeouts) -> Result<Box<dyn Connection>, TransportFault>;
}

// ── reqwest ────────────────────────────────────────────────────────

/// Production transport backed by `reqwest`.
///
/// Each attempt builds its own client with the attempt's timeouts and idle
/// pooling disabled, so no socket is shared between attempts. Must be used
/// from within a tokio runtime.
#[derive(Debug, Default, Clone)]
pub struct ReqwestTransport;

impl ReqwestTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for ReqwestTransport {
    fn open(&self, timeouts: AttemptTimeouts) -> Result<Box<dyn Connection>, TransportFault> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .read_timeout(timeouts.read)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| TransportFault::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Box::new(ReqwestConnection {
            client,
            in_flight: None,
            closer: Arc::new(AbortCloser::default()),
        }))
    }
}

/// The exchange runs as a spawned task; aborting the task drops the socket.
struct ReqwestConnection {
    client: reqwest::Client,
    in_flight: Option<JoinHandle<Result<HttpResponse, TransportFault>>>,
    closer: Arc<AbortCloser>,
}

impl Connection for ReqwestConnection {
    fn write<'a>(&'a mut self, request: &'a HttpRequest) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let mut builder = self.client.post(&request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            let pending = builder.body(request.body.clone());
            trace!("Request payload size: {} bytes", request.body.len());

            let handle = tokio::spawn(async move {
                let resp = pending.send().await.map_err(fault_from_reqwest)?;
                let status = resp.status().as_u16();
                let body = resp.text().await.map_err(fault_from_reqwest)?;
                Ok(HttpResponse { status, body })
            });
            self.closer.arm(handle.abort_handle());
            self.in_flight = Some(handle);
            Ok(())
        })
    }

    fn read_response(&mut self) -> TransportFuture<'_, HttpResponse> {
        Box::pin(async move {
            let handle = self
                .in_flight
                .take()
                .ok_or_else(|| TransportFault::Other("no request written".to_string()))?;
            match handle.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(TransportFault::Closed),
                Err(e) => Err(TransportFault::Other(format!("request task failed: {e}"))),
            }
        })
    }

    fn close_handle(&self) -> Arc<dyn CloseHandle> {
        self.closer.clone()
    }
}

impl Drop for ReqwestConnection {
    fn drop(&mut self) {
        // An exchange that was written but never read dies with its connection.
        if let Some(task) = &self.in_flight {
            task.abort();
        }
    }
}

/// Close handle for [`ReqwestConnection`]. A close that arrives before the
/// request task exists is remembered and applied when it is armed.
#[derive(Default)]
struct AbortCloser {
    state: std::sync::Mutex<CloserState>,
}

#[derive(Default)]
struct CloserState {
    task: Option<AbortHandle>,
    closed: bool,
}

impl AbortCloser {
    fn arm(&self, task: AbortHandle) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.closed {
            task.abort();
        }
        state.task = Some(task);
    }
}

impl CloseHandle for AbortCloser {
    fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.closed = true;
        if let Some(task) = &state.task {
            task.abort();
        }
    }
}

/// Map a reqwest error onto a fault category, keeping the full source chain
/// in the message (reqwest's own `Display` hides the underlying cause).
fn fault_from_reqwest(e: reqwest::Error) -> TransportFault {
    let message = error_chain(&e);
    if e.is_timeout() {
        TransportFault::Timeout(message)
    } else if e.is_connect() {
        let lower = message.to_lowercase();
        if ["certificate", "tls", "ssl", "handshake"]
            .iter()
            .any(|p| lower.contains(p))
        {
            TransportFault::Tls(message)
        } else {
            TransportFault::Connect(message)
        }
    } else {
        TransportFault::Other(message)
    }
}

fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
