//! Bounded retry with linear backoff.
//!
//! Retries 5xx responses and transport faults up to [`RetryPolicy::max_attempts`]
//! total attempts, sleeping `base × attempt` between them. Timeouts use their
//! own, longer base. Never retries 429, other non-200 statuses, or a 200 whose
//! body cannot be decoded.
//!
//! [`RetryPolicy::classify`] is a pure decision function so the policy can be
//! tested without any networking.

use std::fmt;
use std::time::Duration;

use crate::api::codec::decode_content;
use crate::api::transport::{HttpResponse, TransportFault};
use crate::outcome::{FailureKind, Outcome};

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per `send`, including the first.
    pub max_attempts: u32,
    /// Backoff unit after a 5xx or a generic transport fault.
    pub backoff_base: Duration,
    /// Backoff unit after a connect/read timeout.
    pub timeout_backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(2000),
            timeout_backoff_base: Duration::from_millis(3000),
        }
    }
}

/// What an attempt produced.
#[derive(Debug)]
pub enum AttemptEvent {
    Response(HttpResponse),
    Fault(TransportFault),
}

impl fmt::Display for AttemptEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptEvent::Response(resp) => write!(f, "HTTP {}", resp.status),
            AttemptEvent::Fault(fault) => write!(f, "{fault}"),
        }
    }
}

/// What to do after an attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    /// Sleep for `backoff`, then start the next attempt.
    Retry { backoff: Duration },
    /// Stop and return this outcome.
    Finish(Outcome),
}

impl RetryPolicy {
    /// Create a policy with the given number of attempts and default backoff.
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Delay after a failed `attempt` (1-indexed).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_base * attempt
    }

    /// Delay after a timed-out `attempt` (1-indexed).
    pub fn timeout_backoff_for(&self, attempt: u32) -> Duration {
        self.timeout_backoff_base * attempt
    }

    fn has_attempts_left(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Decide the fate of `attempt` (1-indexed).
    ///
    /// `cancelled` is the client's cancellation flag as read after the
    /// attempt; it overrides every fault classification.
    pub fn classify(&self, attempt: u32, event: AttemptEvent, cancelled: bool) -> Step {
        match event {
            AttemptEvent::Response(resp) => self.classify_status(attempt, resp),
            AttemptEvent::Fault(_) if cancelled => {
                Step::Finish(Outcome::failure(FailureKind::Cancelled))
            }
            AttemptEvent::Fault(TransportFault::Timeout(_)) => {
                if self.has_attempts_left(attempt) {
                    Step::Retry {
                        backoff: self.timeout_backoff_for(attempt),
                    }
                } else {
                    Step::Finish(Outcome::failure(FailureKind::Timeout))
                }
            }
            AttemptEvent::Fault(fault) => {
                if self.has_attempts_left(attempt) {
                    Step::Retry {
                        backoff: self.backoff_for(attempt),
                    }
                } else {
                    Step::Finish(Outcome::transport(&fault))
                }
            }
        }
    }

    fn classify_status(&self, attempt: u32, resp: HttpResponse) -> Step {
        match resp.status {
            200 => Step::Finish(match decode_content(&resp.body) {
                Ok(text) => Outcome::success(text),
                Err(e) => Outcome::malformed(&e),
            }),
            429 => Step::Finish(Outcome::failure(FailureKind::RateLimited)),
            status if status >= 500 => {
                if self.has_attempts_left(attempt) {
                    Step::Retry {
                        backoff: self.backoff_for(attempt),
                    }
                } else {
                    Step::Finish(Outcome::failure(FailureKind::ServerUnavailable { status }))
                }
            }
            status => Step::Finish(Outcome::failure(FailureKind::HttpError { status })),
        }
    }
}
