//! The cancellable, retrying completion client.
//!
//! [`CompletionClient::send`] runs one chat turn to completion on the calling
//! thread: up to [`RetryPolicy::max_attempts`](crate::api::RetryPolicy)
//! strictly sequential attempts, each on a fresh connection, with linear
//! backoff between them. [`CompletionClient::cancel`] may be called from any
//! other thread at any time and never blocks.
//!
//! # Cancellation
//!
//! Cancellation is cooperative. `cancel()` raises a flag, wakes any backoff
//! sleep, and schedules an abrupt close of the live connection on a separate
//! thread. The in-flight `send` observes the flag right after writing the
//! request, whenever the transport reports a fault, and before starting
//! another attempt. Faults provoked by the forced close are reported as
//! [`FailureKind::Cancelled`], never as transport errors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::ChatRequest;
use crate::api::retry::{AttemptEvent, Step};
use crate::api::transport::{CloseHandle, HttpRequest, ReqwestTransport, Transport};
use crate::config::ClientConfig;
use crate::outcome::{FailureKind, Outcome};

/// Blocking chat-completions client with bounded retries and cancellation.
///
/// Share it between the sending thread and the cancelling thread with an
/// [`Arc`]. Only one `send` may be in flight per instance.
///
/// ```ignore
/// use std::sync::Arc;
/// use deepseek_rs::CompletionClient;
///
/// let client = Arc::new(CompletionClient::new(api_key));
/// let worker = {
///     let client = client.clone();
///     std::thread::spawn(move || client.send("Explain ownership in one line."))
/// };
/// // ... later, from the UI thread:
/// client.cancel();
/// println!("{}", worker.join().unwrap());
/// ```
pub struct CompletionClient {
    api_key: String,
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    cancelled: AtomicBool,
    /// Close handle of the current attempt's connection, if one is live.
    active: Mutex<Option<Arc<dyn CloseHandle>>>,
    /// Wakes a backoff sleep on cancel.
    wake: Notify,
}

impl CompletionClient {
    /// Create a client for the default DeepSeek endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_config(api_key, ClientConfig::default())
    }

    /// Create a client with custom settings and the reqwest transport.
    pub fn with_config(api_key: impl Into<String>, config: ClientConfig) -> Self {
        Self::with_transport(api_key, config, Arc::new(ReqwestTransport::new()))
    }

    /// Create a client over an arbitrary transport.
    pub fn with_transport(
        api_key: impl Into<String>,
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            config,
            transport,
            cancelled: AtomicBool::new(false),
            active: Mutex::new(None),
            wake: Notify::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Whether an attempt currently holds a live connection.
    pub fn is_in_flight(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Send `message` and block until the turn completes.
    ///
    /// Call from a worker thread, never from the UI thread and never from
    /// inside an async runtime (use [`send_async`](Self::send_async) there).
    pub fn send(&self, message: &str) -> Outcome {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Outcome::Failure {
                kind: FailureKind::Transport,
                detail: "send() called from inside an async runtime; use send_async()"
                    .to_string(),
            };
        }
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                return Outcome::Failure {
                    kind: FailureKind::Transport,
                    detail: format!("Error: failed to start I/O runtime: {e}"),
                };
            }
        };
        runtime.block_on(self.send_async(message))
    }

    /// Async form of [`send`](Self::send). Same state machine, same outcome.
    pub async fn send_async(&self, message: &str) -> Outcome {
        self.cancelled.store(false, Ordering::SeqCst);

        let request = ChatRequest::new(message);
        let http = self.build_http_request(&request);
        let max_attempts = self.config.retry.max_attempts;
        debug!(
            "Chat request: model={}, message={} chars, max_attempts={}",
            self.config.model,
            request.message().chars().count(),
            max_attempts,
        );

        let start = Instant::now();
        for attempt in 1..=max_attempts {
            if attempt > 1 && self.is_cancelled() {
                return Outcome::failure(FailureKind::Cancelled);
            }

            let Some(event) = self.run_attempt(&http).await else {
                debug!("Request cancelled after write (attempt {attempt}/{max_attempts})");
                return Outcome::failure(FailureKind::Cancelled);
            };
            let summary = event.to_string();

            match self.config.retry.classify(attempt, event, self.is_cancelled()) {
                Step::Finish(outcome) => {
                    debug!(
                        "Chat outcome after {attempt} attempt(s) in {:.1}s: {summary} -> {:?}",
                        start.elapsed().as_secs_f64(),
                        outcome.kind(),
                    );
                    return outcome;
                }
                Step::Retry { backoff } => {
                    warn!(
                        "Transient API error (attempt {attempt}/{max_attempts}): {summary}. \
                         Retrying in {backoff:?}..."
                    );
                    if let Err(kind) = self.backoff(backoff).await {
                        return Outcome::failure(kind);
                    }
                }
            }
        }

        Outcome::failure(FailureKind::AllAttemptsFailed)
    }

    /// Abort the in-flight `send`, if any. Never blocks.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();

        let handle = self
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let Some(handle) = handle else {
            return;
        };

        debug!("Cancelling in-flight request");
        let closer = handle.clone();
        let spawned = std::thread::Builder::new()
            .name("deepseek-cancel".to_string())
            .spawn(move || closer.close());
        if let Err(e) = spawned {
            warn!("Failed to spawn close thread ({e}); closing inline");
            handle.close();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn build_http_request(&self, request: &ChatRequest) -> HttpRequest {
        HttpRequest {
            url: self.config.endpoint.clone(),
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                (
                    "Authorization".to_string(),
                    format!("Bearer {}", self.api_key),
                ),
                ("User-Agent".to_string(), self.config.user_agent.clone()),
            ],
            body: request.to_json(&self.config.model),
        }
    }

    /// One connect-write-read cycle. `None` means cancelled right after the
    /// write, with no response read.
    async fn run_attempt(&self, request: &HttpRequest) -> Option<AttemptEvent> {
        let mut conn = match self.transport.open(self.config.attempt_timeouts()) {
            Ok(conn) => conn,
            Err(fault) => return Some(AttemptEvent::Fault(fault)),
        };
        let _live = LiveConnection::register(&self.active, conn.close_handle());

        if let Err(fault) = conn.write(request).await {
            return Some(AttemptEvent::Fault(fault));
        }
        if self.is_cancelled() {
            // A cancel that landed before the handle was registered scheduled
            // no close, so tear the connection down here.
            conn.close_handle().close();
            return None;
        }

        let read_start = Instant::now();
        let event = match conn.read_response().await {
            Ok(resp) => {
                debug!(
                    "LLM response: HTTP {} in {:.1}s ({} bytes)",
                    resp.status,
                    read_start.elapsed().as_secs_f64(),
                    resp.body.len()
                );
                AttemptEvent::Response(resp)
            }
            Err(fault) => AttemptEvent::Fault(fault),
        };
        Some(event)
    }

    /// Sleep between attempts. Woken early by `cancel()`, which ends the turn
    /// as `Cancelled`; a wake with the flag clear ends it as `Interrupted`.
    async fn backoff(&self, delay: Duration) -> Result<(), FailureKind> {
        let woken = self.wake.notified();
        tokio::pin!(woken);
        woken.as_mut().enable();

        if self.is_cancelled() {
            return Err(FailureKind::Cancelled);
        }
        tokio::select! {
            () = tokio::time::sleep(delay) => Ok(()),
            () = &mut woken => {
                if self.is_cancelled() {
                    debug!("Backoff cancelled");
                    Err(FailureKind::Cancelled)
                } else {
                    debug!("Backoff interrupted");
                    Err(FailureKind::Interrupted)
                }
            }
        }
    }
}

/// Keeps the attempt's close handle visible to `cancel()` and clears it when
/// the attempt ends, however it ends.
struct LiveConnection<'a> {
    slot: &'a Mutex<Option<Arc<dyn CloseHandle>>>,
}

impl<'a> LiveConnection<'a> {
    fn register(
        slot: &'a Mutex<Option<Arc<dyn CloseHandle>>>,
        handle: Arc<dyn CloseHandle>,
    ) -> Self {
        *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Self { slot }
    }
}

impl Drop for LiveConnection<'_> {
    fn drop(&mut self) {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}
