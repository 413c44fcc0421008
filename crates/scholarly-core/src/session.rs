//! One chat surface: a project's research or paper-writing conversation.
//!
//! The session owns the last polled snapshot and the reconciler for that
//! surface, and decides how often the surface should be polled. Network calls
//! are either made directly (`send`, `refresh`) or, for a UI loop that must not
//! block, split into `begin_send`/`finish_send` and `apply_snapshot` so the
//! caller can run them on spawned tasks.

use std::time::{Duration, Instant};

use anyhow::Result;

use crate::api::ResearchBackend;
use crate::error::SendError;
use crate::project::ChatProcess;
use crate::reconcile::{ChatReconciler, LogOutcome, SendTicket};
use crate::state::{Message, ProcessSnapshot};

pub const WAITING_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// A send that has been recorded locally and must now go over the wire
#[derive(Debug, Clone)]
pub struct OutboundChat {
    pub ticket: SendTicket,
    pub project_id: String,
    pub process: ChatProcess,
}

impl OutboundChat {
    pub fn content(&self) -> &str {
        self.ticket.text()
    }
}

#[derive(Debug)]
pub struct ChatSession {
    project_id: String,
    process: ChatProcess,
    snapshot: ProcessSnapshot,
    loaded: bool,
    reconciler: ChatReconciler,
    last_poll: Option<Instant>,
}

impl ChatSession {
    pub fn new(project_id: &str, process: ChatProcess) -> Self {
        Self {
            project_id: project_id.to_string(),
            process,
            snapshot: ProcessSnapshot::default(),
            loaded: false,
            reconciler: ChatReconciler::new(),
            last_poll: None,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn process(&self) -> ChatProcess {
        self.process
    }

    pub fn is_for(&self, project_id: &str, process: ChatProcess) -> bool {
        self.project_id == project_id && self.process == process
    }

    pub fn messages(&self) -> &[Message] {
        &self.snapshot.messages
    }

    pub fn snapshot(&self) -> &ProcessSnapshot {
        &self.snapshot
    }

    /// Whether at least one poll has completed
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_waiting(&self) -> bool {
        self.reconciler.is_waiting()
    }

    pub fn can_send(&self) -> bool {
        self.reconciler.can_send() && !self.snapshot.is_locked
    }

    /// Pending text to draw as an unconfirmed bubble, if the log hasn't
    /// echoed it yet.
    pub fn display_pending(&self) -> Option<&str> {
        self.reconciler.pending()
    }

    pub fn poll_interval(&self) -> Duration {
        if self.is_waiting() {
            WAITING_POLL_INTERVAL
        } else {
            IDLE_POLL_INTERVAL
        }
    }

    pub fn poll_due(&self, now: Instant) -> bool {
        match self.last_poll {
            None => true,
            Some(last) => now.duration_since(last) >= self.poll_interval(),
        }
    }

    pub fn mark_polled(&mut self, now: Instant) {
        self.last_poll = Some(now);
    }

    /// Force the next `poll_due` to fire, e.g. after a start or reset.
    pub fn invalidate(&mut self) {
        self.last_poll = None;
    }

    pub fn apply_snapshot(&mut self, snapshot: ProcessSnapshot) -> LogOutcome {
        let outcome = self.reconciler.on_log_updated(&snapshot.messages);
        if outcome != LogOutcome::Unchanged {
            tracing::debug!(
                project = %self.project_id,
                process = self.process.slug(),
                messages = snapshot.messages.len(),
                ?outcome,
                "chat log reconciled"
            );
        }
        self.snapshot = snapshot;
        self.loaded = true;
        outcome
    }

    pub fn begin_send(&mut self, text: &str, now: Instant) -> Result<OutboundChat, SendError> {
        if self.snapshot.is_locked {
            return Err(SendError::Locked);
        }
        let ticket = self
            .reconciler
            .begin_send(text, self.snapshot.messages.len(), now)?;
        // Poll quickly from here on so the echo shows up soon
        self.invalidate();
        Ok(OutboundChat {
            ticket,
            project_id: self.project_id.clone(),
            process: self.process,
        })
    }

    /// Settle a send once the request has finished. Errors roll back.
    pub fn finish_send(&mut self, outbound: &OutboundChat, result: &Result<()>) {
        if let Err(e) = result {
            tracing::warn!(project = %self.project_id, process = self.process.slug(), "chat send failed: {:#}", e);
            self.reconciler.send_failed(&outbound.ticket);
        }
    }

    /// Run the watchdog; `true` when the pending exchange was just abandoned.
    pub fn tick(&mut self, now: Instant) -> bool {
        self.reconciler.poll_timeout(now)
    }

    /// The server-side log was wiped, so local reconciliation state is moot.
    pub fn reset_local(&mut self) {
        self.reconciler.clear();
        self.snapshot = ProcessSnapshot::default();
        self.loaded = false;
        self.invalidate();
    }

    /// Send and wait for the request to finish. The response itself arrives
    /// through a later `refresh`.
    pub async fn send(
        &mut self,
        backend: &dyn ResearchBackend,
        text: &str,
        model: Option<&str>,
    ) -> Result<()> {
        let outbound = self.begin_send(text, Instant::now())?;
        let result = backend
            .send_chat(&outbound.project_id, outbound.process, outbound.content(), model)
            .await;
        self.finish_send(&outbound, &result);
        result
    }

    pub async fn refresh(&mut self, backend: &dyn ResearchBackend) -> Result<LogOutcome> {
        let now = Instant::now();
        self.mark_polled(now);
        let snapshot = backend.process_state(&self.project_id, self.process).await?;
        Ok(self.apply_snapshot(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Agent;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// In-memory backend: appends the user message on send, and an agent
    /// reply only when told to.
    #[derive(Default)]
    struct FakeBackend {
        log: Mutex<Vec<Message>>,
        fail_sends: bool,
        sent_models: Mutex<Vec<Option<String>>>,
    }

    impl FakeBackend {
        fn reply(&self, agent: Agent, text: &str) {
            self.log.lock().unwrap().push(Message::new(agent, text));
        }
    }

    #[async_trait]
    impl ResearchBackend for FakeBackend {
        async fn process_state(&self, _project_id: &str, _process: ChatProcess) -> Result<ProcessSnapshot> {
            Ok(ProcessSnapshot {
                status: "active".to_string(),
                messages: self.log.lock().unwrap().clone(),
                ..ProcessSnapshot::default()
            })
        }

        async fn send_chat(
            &self,
            _project_id: &str,
            _process: ChatProcess,
            content: &str,
            model: Option<&str>,
        ) -> Result<()> {
            if self.fail_sends {
                anyhow::bail!("connection refused");
            }
            self.sent_models.lock().unwrap().push(model.map(str::to_string));
            self.reply(Agent::User, content);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_round_trip_through_backend() {
        let backend = FakeBackend::default();
        backend.reply(Agent::ResearchAdvisor, "welcome");

        let mut session = ChatSession::new("p1", ChatProcess::ResearchExperiment);
        session.refresh(&backend).await.unwrap();
        assert_eq!(session.messages().len(), 1);

        session.send(&backend, "hello", Some("gemini-2.5-pro")).await.unwrap();
        assert!(session.is_waiting());
        assert_eq!(session.display_pending(), Some("hello"));
        assert_eq!(session.poll_interval(), WAITING_POLL_INTERVAL);

        assert_eq!(session.refresh(&backend).await.unwrap(), LogOutcome::Echoed);
        assert_eq!(session.display_pending(), None);
        assert!(session.is_waiting());

        backend.reply(Agent::ResearchAdvisor, "tell me more");
        assert_eq!(session.refresh(&backend).await.unwrap(), LogOutcome::Answered);
        assert!(!session.is_waiting());
        assert_eq!(session.poll_interval(), IDLE_POLL_INTERVAL);

        assert_eq!(session.refresh(&backend).await.unwrap(), LogOutcome::Unchanged);
        assert_eq!(
            backend.sent_models.lock().unwrap().as_slice(),
            &[Some("gemini-2.5-pro".to_string())]
        );
    }

    #[tokio::test]
    async fn test_transport_failure_rolls_back() {
        let backend = FakeBackend {
            fail_sends: true,
            ..FakeBackend::default()
        };
        let mut session = ChatSession::new("p1", ChatProcess::PaperWriting);

        let err = session.send(&backend, "x", None).await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
        assert!(!session.is_waiting());
        assert_eq!(session.display_pending(), None);
        assert!(session.can_send());
    }

    #[tokio::test]
    async fn test_refuses_send_while_waiting() {
        let backend = FakeBackend::default();
        let mut session = ChatSession::new("p1", ChatProcess::ResearchExperiment);
        session.send(&backend, "one", None).await.unwrap();

        let err = session.send(&backend, "two", None).await.unwrap_err();
        assert_eq!(err.downcast_ref::<SendError>(), Some(&SendError::Busy));
        assert_eq!(backend.log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_watchdog_through_session() {
        let start = Instant::now();
        let mut session = ChatSession::new("p1", ChatProcess::ResearchExperiment);
        let outbound = session.begin_send("x", start).unwrap();
        assert_eq!(outbound.content(), "x");

        assert!(!session.tick(start + Duration::from_secs(30)));
        assert!(session.tick(start + Duration::from_secs(60)));
        assert!(!session.tick(start + Duration::from_secs(61)));
        assert!(!session.is_waiting());
        assert_eq!(session.display_pending(), Some("x"));
        assert!(session.begin_send("y", start + Duration::from_secs(61)).is_ok());
    }

    #[test]
    fn test_late_failure_after_timeout_is_ignored() {
        let start = Instant::now();
        let mut session = ChatSession::new("p1", ChatProcess::ResearchExperiment);
        let old = session.begin_send("old", start).unwrap();
        session.tick(start + Duration::from_secs(60));
        let _new = session.begin_send("new", start + Duration::from_secs(61)).unwrap();

        session.finish_send(&old, &Err(anyhow::anyhow!("timed out")));
        assert!(session.is_waiting());
        assert_eq!(session.display_pending(), Some("new"));
    }

    #[test]
    fn test_poll_schedule() {
        let start = Instant::now();
        let mut session = ChatSession::new("p1", ChatProcess::ResearchExperiment);
        assert!(session.poll_due(start));

        session.mark_polled(start);
        assert!(!session.poll_due(start + Duration::from_secs(9)));
        assert!(session.poll_due(start + IDLE_POLL_INTERVAL));

        session.begin_send("x", start).unwrap();
        assert!(session.poll_due(start));
        session.mark_polled(start);
        assert!(!session.poll_due(start + Duration::from_secs(1)));
        assert!(session.poll_due(start + WAITING_POLL_INTERVAL));
    }

    #[test]
    fn test_locked_surface_refuses_send() {
        let mut session = ChatSession::new("p1", ChatProcess::PaperWriting);
        session.apply_snapshot(ProcessSnapshot {
            status: "locked".to_string(),
            is_locked: true,
            ..ProcessSnapshot::default()
        });
        assert!(!session.can_send());
        assert_eq!(
            session.begin_send("draft", Instant::now()).unwrap_err(),
            SendError::Locked
        );
    }

    #[test]
    fn test_reset_local_clears_state() {
        let mut session = ChatSession::new("p1", ChatProcess::ResearchExperiment);
        session.apply_snapshot(ProcessSnapshot {
            messages: vec![Message::new(Agent::System, "hi")],
            ..ProcessSnapshot::default()
        });
        session.begin_send("x", Instant::now()).unwrap();
        session.reset_local();
        assert!(!session.is_loaded());
        assert!(session.messages().is_empty());
        assert!(session.can_send());
    }
}
