//! Optimistic chat-send reconciliation
//!
//! A sent message is shown immediately as a pending bubble, then reconciled
//! against the message log the UI polls from the backend. The log is eventually
//! consistent: a poll may land before or after the send request completes, so
//! the reconciler compares against the log length captured at send time
//! instead of assuming the next poll reflects the send.
//!
//! Resolution paths for a send:
//! - echo: the last log entry is the user's own pending text (pending clears,
//!   still waiting for the agent)
//! - response: the last entry is from a non-user agent and the log grew past
//!   the send-time length (waiting and pending clear)
//! - rollback: the send request itself failed
//! - watchdog: nothing happened for [`RESPONSE_TIMEOUT`]; waiting clears but
//!   the pending bubble stays so the user still sees what was sent

use std::time::{Duration, Instant};

use crate::error::SendError;
use crate::state::Message;

/// How long a send may go unanswered before the exchange is abandoned.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

/// Handle for one in-flight send.
///
/// Failure callbacks carry the ticket back so that a late failure for an old
/// send can't roll back a newer one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendTicket {
    generation: u64,
    text: String,
}

impl SendTicket {
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// What a log update did to the reconciliation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutcome {
    Unchanged,
    /// Our own message showed up in the log
    Echoed,
    /// An agent answered after our send
    Answered,
}

#[derive(Debug, Default)]
pub struct ChatReconciler {
    waiting: bool,
    pending: Option<String>,
    sent_at_count: usize,
    deadline: Option<Instant>,
    generation: u64,
}

impl ChatReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    pub fn sent_at_count(&self) -> usize {
        self.sent_at_count
    }

    pub fn can_send(&self) -> bool {
        !self.waiting
    }

    /// Record a send. `log_len` is the length of the log as currently shown.
    ///
    /// The returned ticket holds the trimmed text the caller must put on the
    /// wire. A previous pending bubble left behind by the watchdog is replaced.
    pub fn begin_send(
        &mut self,
        text: &str,
        log_len: usize,
        now: Instant,
    ) -> Result<SendTicket, SendError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SendError::Empty);
        }
        if self.waiting {
            return Err(SendError::Busy);
        }

        self.generation += 1;
        self.sent_at_count = log_len;
        self.pending = Some(text.to_string());
        self.waiting = true;
        self.deadline = Some(now + RESPONSE_TIMEOUT);

        tracing::debug!(generation = self.generation, log_len, "chat send started");

        Ok(SendTicket {
            generation: self.generation,
            text: text.to_string(),
        })
    }

    /// Roll back after the send request failed at the transport level.
    ///
    /// Returns `false` when the ticket is stale (the watchdog already gave up
    /// on it and a newer send is in flight) and nothing was touched.
    pub fn send_failed(&mut self, ticket: &SendTicket) -> bool {
        if ticket.generation != self.generation || !self.waiting {
            return false;
        }

        self.waiting = false;
        self.pending = None;
        self.deadline = None;
        tracing::debug!(generation = ticket.generation, "chat send rolled back");
        true
    }

    /// Reconcile against a freshly polled log.
    ///
    /// Calling this again with the same log after resolution is a no-op.
    pub fn on_log_updated(&mut self, log: &[Message]) -> LogOutcome {
        let Some(last) = log.last() else {
            return LogOutcome::Unchanged;
        };

        if last.agent.is_user() {
            if self.pending.as_deref() == Some(last.content.as_str()) {
                self.pending = None;
                return LogOutcome::Echoed;
            }
            return LogOutcome::Unchanged;
        }

        if log.len() > self.sent_at_count && (self.waiting || self.pending.is_some()) {
            self.waiting = false;
            self.pending = None;
            self.deadline = None;
            return LogOutcome::Answered;
        }

        LogOutcome::Unchanged
    }

    /// Fire the watchdog if its deadline has passed.
    ///
    /// Returns `true` exactly once per send, and only if the send was still
    /// waiting when the deadline hit.
    pub fn poll_timeout(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                if self.waiting {
                    self.waiting = false;
                    tracing::warn!(generation = self.generation, "no response within timeout, giving up");
                    return true;
                }
                false
            }
            _ => false,
        }
    }

    /// Forget everything, e.g. after the server-side log was reset.
    pub fn clear(&mut self) {
        self.waiting = false;
        self.pending = None;
        self.deadline = None;
        self.sent_at_count = 0;
    }
}
