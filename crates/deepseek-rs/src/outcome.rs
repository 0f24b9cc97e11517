//! The single result type handed back to the chat window.
//!
//! Every path through [`CompletionClient::send`](crate::CompletionClient::send)
//! ends in an [`Outcome`]. Failures carry a [`FailureKind`] for programmatic
//! handling and a user-facing sentence for display; nothing is raised across
//! the client boundary.

use std::fmt;

use crate::api::codec::DecodeError;
use crate::api::transport::TransportFault;

/// Category of a failed `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Aborted through `cancel()`.
    Cancelled,
    /// HTTP 429. Never retried.
    RateLimited,
    /// HTTP 5xx on every attempt.
    ServerUnavailable { status: u16 },
    /// Any other non-200 status. Never retried.
    HttpError { status: u16 },
    /// Connect or read deadline elapsed on every attempt.
    Timeout,
    /// A backoff sleep was woken early.
    Interrupted,
    /// Any other transmission fault, after retries.
    Transport,
    /// 200 OK but the reply text could not be located.
    MalformedResponse,
    /// The attempt loop ran out without a decision.
    AllAttemptsFailed,
}

/// Result of one `send` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success { text: String },
    Failure { kind: FailureKind, detail: String },
}

impl Outcome {
    pub fn success(text: impl Into<String>) -> Self {
        Outcome::Success { text: text.into() }
    }

    /// A failure with the default sentence for `kind`.
    pub fn failure(kind: FailureKind) -> Self {
        let detail = match kind {
            FailureKind::Cancelled => "Request cancelled by the user.".to_string(),
            FailureKind::RateLimited => {
                "Rate limit reached. Please wait a moment before sending again.".to_string()
            }
            FailureKind::ServerUnavailable { status } => format!(
                "The DeepSeek servers are unavailable right now (HTTP {status}). Please try again later."
            ),
            FailureKind::HttpError { status } => {
                format!("The API rejected the request (HTTP {status}).")
            }
            FailureKind::Timeout => {
                "The request timed out. The server may be busy; please try again.".to_string()
            }
            FailureKind::Interrupted => "The request was interrupted.".to_string(),
            FailureKind::Transport => "Unable to reach the DeepSeek API.".to_string(),
            FailureKind::MalformedResponse => "Unexpected response from the API.".to_string(),
            FailureKind::AllAttemptsFailed => {
                "All attempts to reach the API failed. Please try again.".to_string()
            }
        };
        Outcome::Failure { kind, detail }
    }

    /// A `Transport` failure whose sentence comes from [`describe_fault`].
    pub fn transport(fault: &TransportFault) -> Self {
        Outcome::Failure {
            kind: FailureKind::Transport,
            detail: describe_fault(fault),
        }
    }

    /// A `MalformedResponse` failure carrying the decoder's message.
    pub fn malformed(err: &DecodeError) -> Self {
        Outcome::Failure {
            kind: FailureKind::MalformedResponse,
            detail: err.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// Failure category, or `None` on success.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Failure { kind, .. } => Some(*kind),
        }
    }

    /// The string shown to the user: reply text or error sentence.
    pub fn message(&self) -> &str {
        match self {
            Outcome::Success { text } => text,
            Outcome::Failure { detail, .. } => detail,
        }
    }

    pub fn into_message(self) -> String {
        match self {
            Outcome::Success { text } => text,
            Outcome::Failure { detail, .. } => detail,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

// ── Fault classification ───────────────────────────────────────────

const CONNECTIVITY: &str =
    "Could not connect to the DeepSeek API. Check your internet connection.";
const TLS: &str =
    "Secure connection to the API failed. Check your system date and time and certificates.";
const TIMED_OUT: &str = "The connection timed out. Please try again.";
const UNAUTHORIZED: &str = "Invalid API key. Check the key in your settings.";
const PAYMENT_REQUIRED: &str = "Insufficient account balance. Top up your DeepSeek account.";
const RATE_LIMITED: &str = "Rate limit reached. Please wait a moment before sending again.";

/// Turn a final, non-retried transport fault into a user-facing sentence.
///
/// Uses the fault's category first and only falls back to matching the
/// message text when the transport could not say more. With no match the raw
/// message is passed through.
pub fn describe_fault(fault: &TransportFault) -> String {
    match fault {
        TransportFault::Connect(_) => CONNECTIVITY.to_string(),
        TransportFault::Tls(_) => TLS.to_string(),
        TransportFault::Timeout(_) => TIMED_OUT.to_string(),
        TransportFault::Closed => format!("Error: {}", fault.message()),
        TransportFault::Other(message) => describe_message(message),
    }
}

fn describe_message(message: &str) -> String {
    let lower = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&[
        "unknown host",
        "unknownhost",
        "dns error",
        "failed to lookup",
        "connection refused",
        "network is unreachable",
        "no route to host",
    ]) {
        CONNECTIVITY.to_string()
    } else if has(&["ssl", "tls", "certificate", "handshake"]) {
        TLS.to_string()
    } else if has(&["timed out", "timeout"]) {
        TIMED_OUT.to_string()
    } else if has(&["401", "unauthorized"]) {
        UNAUTHORIZED.to_string()
    } else if has(&["402", "payment required", "insufficient balance"]) {
        PAYMENT_REQUIRED.to_string()
    } else if has(&["429", "too many requests"]) {
        RATE_LIMITED.to_string()
    } else {
        format!("Error: {message}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_message_is_the_reply() {
        let out = Outcome::success("hi there");
        assert!(out.is_success());
        assert_eq!(out.kind(), None);
        assert_eq!(out.message(), "hi there");
        assert_eq!(out.to_string(), "hi there");
    }

    #[test]
    fn status_codes_appear_in_http_failures() {
        let out = Outcome::failure(FailureKind::HttpError { status: 404 });
        assert!(out.message().contains("404"));
        let out = Outcome::failure(FailureKind::ServerUnavailable { status: 503 });
        assert!(out.message().contains("503"));
        assert_eq!(
            out.kind(),
            Some(FailureKind::ServerUnavailable { status: 503 })
        );
    }

    #[test]
    fn malformed_carries_body() {
        let err = DecodeError::MissingMarker {
            body: "{\"oops\":1}".into(),
        };
        let out = Outcome::malformed(&err);
        assert_eq!(out.kind(), Some(FailureKind::MalformedResponse));
        assert!(out.message().contains("{\"oops\":1}"));
    }

    #[test]
    fn structured_faults_map_without_text_matching() {
        assert_eq!(
            describe_fault(&TransportFault::Connect("anything".into())),
            CONNECTIVITY
        );
        assert_eq!(describe_fault(&TransportFault::Tls("x".into())), TLS);
        assert_eq!(
            describe_fault(&TransportFault::Timeout("x".into())),
            TIMED_OUT
        );
    }

    #[test]
    fn message_buckets() {
        let cases = [
            ("dns error: failed to lookup address", CONNECTIVITY),
            ("Connection refused (os error 111)", CONNECTIVITY),
            ("SSL routines: wrong version number", TLS),
            ("invalid peer certificate: Expired", TLS),
            ("operation timed out", TIMED_OUT),
            ("server said 401 Unauthorized", UNAUTHORIZED),
            ("HTTP 402 Payment Required", PAYMENT_REQUIRED),
            ("HTTP 429 Too Many Requests", RATE_LIMITED),
        ];
        for (message, expected) in cases {
            assert_eq!(
                describe_fault(&TransportFault::Other(message.into())),
                expected,
                "{message}"
            );
        }
    }

    #[test]
    fn unmatched_message_passes_through() {
        assert_eq!(
            describe_fault(&TransportFault::Other("connection reset by peer".into())),
            "Error: connection reset by peer"
        );
    }
}
