//! API interaction layer: wire codec, HTTP transport, and retry policy.
//!
//! These modules handle everything between [`CompletionClient`](crate::CompletionClient)
//! and the DeepSeek API:
//!
//! - [`codec`]: hand-rolled request escaping and the `"content":"` scanner
//!   that pulls the reply text out of a response body.
//! - [`transport`]: the [`Transport`] / [`Connection`] seam, typed
//!   [`TransportFault`]s, and the reqwest-backed production transport.
//! - [`retry`]: [`RetryPolicy`] and its pure `classify` decision function
//!   (linear backoff, 429 and 4xx never retried).

pub mod codec;
pub mod retry;
pub mod transport;

// Re-export commonly used items at the module level.
pub use codec::{DecodeError, decode_content, escape_json, unescape_json};
pub use retry::{AttemptEvent, RetryPolicy, Step};
pub use transport::{
    AttemptTimeouts, CloseHandle, Connection, HttpRequest, HttpResponse, ReqwestTransport,
    Transport, TransportFault, TransportFuture,
};
