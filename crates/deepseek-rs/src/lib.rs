//! Cancellable, retrying client for the DeepSeek chat completions API.
//!
//! `deepseek-rs` sends one user message to the
//! [DeepSeek](https://api.deepseek.com/) completions endpoint and returns one
//! reply. The core abstraction is the [`CompletionClient`]: a blocking
//! [`send`](CompletionClient::send) meant for a worker thread, and a
//! non-blocking [`cancel`](CompletionClient::cancel) callable from any other
//! thread (typically the one driving the UI).
//!
//! # Getting started
//!
//! ```ignore
//! use std::sync::Arc;
//! use deepseek_rs::prelude::*;
//!
//! let api_key = api_key_from_env().expect("DEEPSEEK_API_KEY not set");
//! let client = Arc::new(CompletionClient::new(api_key));
//!
//! let worker = {
//!     let client = client.clone();
//!     std::thread::spawn(move || client.send("Summarize the borrow checker."))
//! };
//!
//! match worker.join().unwrap() {
//!     Outcome::Success { text } => println!("{text}"),
//!     failure => eprintln!("{failure}"),
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Send and cancel:** [`CompletionClient`] in [`client`].
//! - **Interpret the result:** [`Outcome`] and [`FailureKind`] in [`outcome`];
//!   [`Outcome::message`] is the sentence to show the user.
//! - **Tune endpoint, model, timeouts, retries:** [`ClientConfig`] in
//!   [`config`], including the optional JSON settings file.
//! - **Retry rules:** [`RetryPolicy`](api::retry::RetryPolicy) and its pure
//!   `classify` function in [`api::retry`].
//! - **Wire format:** [`api::codec`] (body encoding, `"content":"` scanner).
//! - **Plug in another HTTP stack or a test double:** the
//!   [`Transport`](api::transport::Transport) trait in [`api::transport`].
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`CompletionClient`]: attempt loop, backoff, cancellation |
//! | [`api`] | Wire codec, transport seam, retry policy |
//! | [`outcome`] | [`Outcome`], [`FailureKind`], friendly fault messages |
//! | [`config`] | [`ClientConfig`], settings file, API key helpers |

pub mod api;
pub mod client;
pub mod config;
pub mod outcome;
pub mod prelude;

pub use client::CompletionClient;
pub use config::{API_KEY_ENV, ClientConfig, api_key_from_env, has_api_key};
pub use outcome::{FailureKind, Outcome};

use api::codec::escape_json;

// ── Constants ──────────────────────────────────────────────────────

pub const DEEPSEEK_URL: &str = "https://api.deepseek.com/chat/completions";

/// Default model for all chat turns.
pub const DEFAULT_MODEL: &str = "deepseek-chat";

/// Client identification sent as `User-Agent`.
pub const USER_AGENT: &str = concat!("deepseek-rs/", env!("CARGO_PKG_VERSION"));

// ── Request types ──────────────────────────────────────────────────

/// One user message, fixed for the lifetime of a `send` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    message: String,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Encode as a chat completion request body for `model`.
    pub fn to_json(&self, model: &str) -> String {
        format!(
            r#"{{"model": "{}", "messages": [{{"role": "user", "content": "{}"}}]}}"#,
            escape_json(model),
            escape_json(&self.message)
        )
    }
}
