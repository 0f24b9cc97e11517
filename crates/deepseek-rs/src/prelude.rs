//! Convenience re-exports for common `deepseek-rs` types.
//!
//! ```ignore
//! use deepseek_rs::prelude::*;
//! ```
//!
//! Pulls in the client, its config, and the outcome types. Transport and
//! codec internals are left out; import those from [`crate::api`] directly.

pub use crate::api::retry::RetryPolicy;
pub use crate::client::CompletionClient;
pub use crate::config::{API_KEY_ENV, ClientConfig, api_key_from_env, has_api_key};
pub use crate::outcome::{FailureKind, Outcome};
pub use crate::{ChatRequest, DEEPSEEK_URL, DEFAULT_MODEL};
