//! Integration tests for the reqwest transport.
//!
//! These tests start a stub HTTP server on a random port and drive a real
//! `CompletionClient` against it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use deepseek_rs::api::retry::RetryPolicy;
use deepseek_rs::{ClientConfig, CompletionClient, FailureKind, Outcome};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

/// What the stub does with one connection.
#[derive(Clone)]
enum Reply {
    Status(u16, &'static str),
    /// Read the request, then never answer.
    Silent,
}

#[derive(Default)]
struct Captured {
    requests: Mutex<Vec<String>>,
    connections: AtomicUsize,
}

/// Helper: spawn a stub server on port 0 that answers connections in order.
async fn spawn_stub(replies: Vec<Reply>) -> (String, Arc<Captured>) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured = Arc::new(Captured::default());

    let state = captured.clone();
    tokio::spawn(async move {
        let mut replies = replies.into_iter();
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            state.connections.fetch_add(1, Ordering::SeqCst);
            let reply = replies.next().unwrap_or(Reply::Status(500, "exhausted"));
            let state = state.clone();
            tokio::spawn(async move { serve(stream, reply, &state).await });
        }
    });

    (format!("http://{addr}/chat/completions"), captured)
}

async fn serve(mut stream: TcpStream, reply: Reply, state: &Captured) {
    let Some(request) = read_request(&mut stream).await else {
        return;
    };
    state.requests.lock().unwrap().push(request);

    match reply {
        Reply::Status(status, body) => {
            let response = format!(
                "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
        Reply::Silent => {
            // Hold the socket open until the client gives up.
            let mut sink = [0u8; 64];
            while let Ok(n) = stream.read(&mut sink).await {
                if n == 0 {
                    break;
                }
            }
        }
    }
}

/// Read one request (headers plus `Content-Length` body) as text.
async fn read_request(stream: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                return Some(text);
            }
        }
    }
}

fn fast_config(endpoint: &str) -> ClientConfig {
    ClientConfig::default()
        .with_endpoint(endpoint)
        .with_retry(RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(10),
            timeout_backoff_base: Duration::from_millis(10),
        })
}

/// Run a blocking `send` on its own thread, as the chat window would.
///
/// The result comes back over a channel so no runtime worker blocks on it.
fn spawn_send(client: Arc<CompletionClient>, message: &str) -> oneshot::Receiver<Outcome> {
    let message = message.to_string();
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let _ = tx.send(client.send(&message));
    });
    rx
}

async fn send_on_worker(client: Arc<CompletionClient>, message: &str) -> Outcome {
    spawn_send(client, message).await.unwrap()
}

const OK_BODY: &str = r#"{"id":"1","choices":[{"index":0,"message":{"role":"assistant","content":"Hello from \"stub\""},"finish_reason":"stop"}]}"#;

// ── Tests ──────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn posts_headers_and_body_then_decodes_reply() {
    let (endpoint, captured) = spawn_stub(vec![Reply::Status(200, OK_BODY)]).await;
    let client = Arc::new(CompletionClient::with_config("sk-live", fast_config(&endpoint)));

    let outcome = send_on_worker(client, "why\n\"rust\"?").await;
    assert_eq!(outcome, Outcome::success("Hello from \"stub\""));

    let requests = captured.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let raw = &requests[0];
    let lower = raw.to_lowercase();
    assert!(raw.starts_with("POST /chat/completions HTTP/1.1"), "{raw}");
    assert!(lower.contains("content-type: application/json"), "{raw}");
    assert!(lower.contains("authorization: bearer sk-live"), "{raw}");
    assert!(lower.contains("user-agent: deepseek-rs/"), "{raw}");
    assert!(
        raw.ends_with(r#"{"model": "deepseek-chat", "messages": [{"role": "user", "content": "why\n\"rust\"?"}]}"#),
        "{raw}"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn retries_server_errors_on_fresh_connections() {
    let (endpoint, captured) = spawn_stub(vec![
        Reply::Status(500, "{}"),
        Reply::Status(503, "{}"),
        Reply::Status(200, OK_BODY),
    ])
    .await;
    let client = Arc::new(CompletionClient::with_config("sk-live", fast_config(&endpoint)));

    let outcome = send_on_worker(client, "hello").await;
    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(captured.connections.load(Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn rate_limit_is_a_single_request() {
    let (endpoint, captured) = spawn_stub(vec![
        Reply::Status(429, r#"{"error":"rate"}"#),
        Reply::Status(200, OK_BODY),
    ])
    .await;
    let client = Arc::new(CompletionClient::with_config("sk-live", fast_config(&endpoint)));

    let outcome = send_on_worker(client, "hello").await;
    assert_eq!(outcome.kind(), Some(FailureKind::RateLimited));
    assert_eq!(captured.requests.lock().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_content_is_reported_with_body() {
    let body = r#"{"error":{"message":"Model Not Exist"}}"#;
    let (endpoint, _captured) = spawn_stub(vec![Reply::Status(200, body)]).await;
    let client = Arc::new(CompletionClient::with_config("sk-live", fast_config(&endpoint)));

    let outcome = send_on_worker(client, "hello").await;
    assert_eq!(outcome.kind(), Some(FailureKind::MalformedResponse));
    assert!(outcome.message().contains(body), "{outcome}");
}

#[tokio::test(flavor = "multi_thread")]
async fn read_timeout_is_retried_then_surfaced() {
    let (endpoint, captured) =
        spawn_stub(vec![Reply::Silent, Reply::Silent, Reply::Silent]).await;
    let config = fast_config(&endpoint)
        .with_timeouts(Duration::from_secs(5), Duration::from_millis(200));
    let client = Arc::new(CompletionClient::with_config("sk-live", config));

    let outcome = send_on_worker(client, "hello").await;
    assert_eq!(outcome.kind(), Some(FailureKind::Timeout), "{outcome:?}");
    assert_eq!(captured.connections.load(Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_while_waiting_for_status() {
    let (endpoint, captured) = spawn_stub(vec![Reply::Silent, Reply::Status(200, OK_BODY)]).await;
    let client = Arc::new(CompletionClient::with_config("sk-live", fast_config(&endpoint)));

    let pending = spawn_send(client.clone(), "hello");

    // Wait until the stub has the request, then cancel from this thread.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while captured.requests.lock().unwrap().is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "request never arrived");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    client.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(10), pending)
        .await
        .expect("cancel did not stop the request")
        .unwrap();
    assert_eq!(outcome.kind(), Some(FailureKind::Cancelled));
    assert_eq!(captured.connections.load(Ordering::SeqCst), 1);
    assert!(!client.is_in_flight());
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_endpoint_is_a_connectivity_failure() {
    // Bind then drop to get a port with nothing listening.
    let port = {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let endpoint = format!("http://127.0.0.1:{port}/chat/completions");
    let client = Arc::new(CompletionClient::with_config("sk-live", fast_config(&endpoint)));

    let outcome = send_on_worker(client, "hello").await;
    assert_eq!(outcome.kind(), Some(FailureKind::Transport), "{outcome:?}");
    assert!(outcome.message().contains("internet connection"), "{outcome}");
}
