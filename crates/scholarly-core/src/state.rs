//! UI-agnostic conversation state types
//!
//! This module contains the wire-level data structures that the backend hands
//! out when a chat surface is polled. They don't depend on any UI framework.

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// A conversation participant, as tagged by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Agent {
    User,
    System,
    ResearchAdvisor,
    PaperAdvisor,
    #[serde(other)]
    Other,
}

impl Agent {
    pub fn is_user(&self) -> bool {
        matches!(self, Agent::User)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Agent::User => "You",
            Agent::System => "System",
            Agent::ResearchAdvisor => "Research Advisor",
            Agent::PaperAdvisor => "Paper Advisor",
            Agent::Other => "Agent",
        }
    }
}

/// Message flavour, only used for styling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Message,
    Error,
    PhaseReady,
    PhaseComplete,
    #[serde(other)]
    Other,
}

/// One entry of a server-side message log. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub agent: Agent,
    pub content: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
}

impl Message {
    pub fn new(agent: Agent, content: impl Into<String>) -> Self {
        Self {
            agent,
            content: content.into(),
            timestamp: Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            kind: MessageKind::Message,
        }
    }

    /// Local wall-clock time of the message, or an empty string when the
    /// timestamp can't be parsed.
    pub fn time_label(&self) -> String {
        format_timestamp(&self.timestamp)
    }
}

/// State of one chat surface as returned by a poll
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    #[serde(default)]
    pub status: String,
    /// Only reported by the research & experiment process
    #[serde(default)]
    pub current_phase: Option<String>,
    /// Only reported by the paper writing process
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub artifact: String,
}

/// Format an ISO-8601 timestamp as local `HH:MM`.
///
/// The backend writes naive UTC timestamps (`2025-01-02T03:04:05.123456`),
/// but offsets are accepted too. Anything unparseable yields `""`.
pub fn format_timestamp(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Local).format("%H:%M").to_string();
    }

    match NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(naive) => naive.and_utc().with_timezone(&Local).format("%H:%M").to_string(),
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_backend_message() {
        let json = r#"{"type":"phase_ready","agent":"system","content":"ready","timestamp":"2025-03-01T10:20:30.123456"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.agent, Agent::System);
        assert_eq!(msg.kind, MessageKind::PhaseReady);
        assert_eq!(msg.content, "ready");
    }

    #[test]
    fn test_unknown_agent_is_not_user() {
        let json = r#"{"agent":"journal_writer","content":"draft"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.agent, Agent::Other);
        assert!(!msg.agent.is_user());
        assert_eq!(msg.kind, MessageKind::Message);
        assert_eq!(msg.timestamp, "");
    }

    #[test]
    fn test_format_naive_timestamp() {
        let label = format_timestamp("2025-03-01T10:20:30.123456");
        assert_eq!(label.len(), 5);
        assert_eq!(&label[2..3], ":");
    }

    #[test]
    fn test_format_rfc3339_timestamp() {
        let label = format_timestamp("2025-03-01T10:20:30+00:00");
        assert_eq!(label.len(), 5);
    }

    #[test]
    fn test_malformed_timestamp_is_empty() {
        assert_eq!(format_timestamp("yesterday-ish"), "");
        assert_eq!(format_timestamp(""), "");
        assert_eq!(format_timestamp("2025-13-45T99:99:99"), "");
    }

    #[test]
    fn test_new_message_timestamp_round_trips_through_formatter() {
        let msg = Message::new(Agent::User, "hi");
        assert!(!msg.time_label().is_empty());
    }

    #[test]
    fn test_snapshot_defaults_missing_fields() {
        let json = r#"{"status":"active","messages":[]}"#;
        let snap: ProcessSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.artifact, "");
        assert!(snap.current_phase.is_none());
        assert!(!snap.is_locked);
    }
}
