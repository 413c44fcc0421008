use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tokio::task::JoinHandle;

use scholarly_core::api::ResetResponse;
use scholarly_core::project::CompletePhaseResponse;
use scholarly_core::{
    available_models, AddToOrganizationResponse, AutoSearchRequest, AutoSearchResponse, ChatProcess,
    ChatSession, LogOutcome, OutboundChat, PaperEntry, Phase, ProcessKind, ProcessSnapshot,
    ProjectSummary, ProjectTree, ResearchBackend, ResearchClient, ResetOptions, SearchRequest,
    SearchResponse, SendError, Settings, TreeRow,
};

/// How often the project list is refetched when nothing else triggers it
const PROJECTS_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
/// How long a status line stays in the footer
const STATUS_TTL: Duration = Duration::from_secs(8);
/// Step for `<` / `>` split adjustments
pub const SPLIT_STEP: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Welcome,
    Chat,
    Literature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Sidebar,
    Chat,
    Artifact,
    Input,
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Single-line text field with a character cursor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextInput {
    pub text: String,
    pub cursor: usize,
}

impl TextInput {
    pub fn with_text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            cursor: text.chars().count(),
        }
    }

    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.text, self.cursor);
        self.text.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.text.chars().count() {
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.text.chars().count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.text.chars().count();
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

pub enum Modal {
    NewProject(TextInput),
    Rename { project_id: String, input: TextInput },
    ConfirmReset { process: ChatProcess, options: ResetOptions, selected: usize },
    ConfirmDelete { project_id: String, topic: String },
    SearchQuery(TextInput),
    ModelPicker,
}

pub struct StatusLine {
    pub text: String,
    pub is_error: bool,
    since: Instant,
}

/// Read-only paper list for one of the literature processes
pub struct PaperView {
    pub project_id: String,
    pub kind: ProcessKind,
    pub papers: Vec<PaperEntry>,
    pub state: ListState,
    pub loaded: bool,
}

enum ActionOutcome {
    Created(ProjectSummary),
    Renamed,
    Deleted(String),
    Started,
    Reset(ResetResponse),
    PhaseSwitched(Phase),
    /// The refreshed project comes along so unlocks show up right away
    Completed(CompletePhaseResponse, Option<ProjectSummary>),
    Searched(SearchResponse),
    AutoSearched(AutoSearchResponse),
    AddedToOrganization(AddToOrganizationResponse),
}

struct ActionTask {
    label: &'static str,
    handle: JoinHandle<Result<ActionOutcome>>,
}

struct SendTask {
    outbound: OutboundChat,
    handle: JoinHandle<Result<()>>,
}

struct PollTask {
    project_id: String,
    process: ChatProcess,
    handle: JoinHandle<Result<ProcessSnapshot>>,
}

struct PapersTask {
    project_id: String,
    kind: ProcessKind,
    handle: JoinHandle<Result<Vec<PaperEntry>>>,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,
    pub focus: FocusPane,

    // Backend and persisted preferences
    pub client: ResearchClient,
    pub settings: Settings,

    // Sidebar
    pub tree: ProjectTree,
    pub tree_state: ListState,
    pub projects_loaded: bool,

    // Main area
    pub session: Option<ChatSession>,
    pub papers: Option<PaperView>,
    pub input: TextInput,
    pub chat_scroll: u16,
    pub chat_max_scroll: u16,
    pub follow_chat: bool,
    pub artifact_scroll: u16,

    // Popups
    pub modal: Option<Modal>,
    pub model_picker_state: ListState,

    // Footer
    pub status: Option<StatusLine>,
    pub animation_frame: u8,

    // Panel areas for mouse hit-testing (updated during render)
    pub sidebar_area: Option<Rect>,
    pub chat_area: Option<Rect>,
    pub artifact_area: Option<Rect>,

    // Background work
    send_task: Option<SendTask>,
    // Sends abandoned after the watchdog; collected so late failures surface
    stale_sends: Vec<SendTask>,
    poll_task: Option<PollTask>,
    papers_task: Option<PapersTask>,
    projects_task: Option<JoinHandle<Result<Vec<ProjectSummary>>>>,
    action_task: Option<ActionTask>,
    last_projects_refresh: Option<Instant>,
    select_after_refresh: Option<String>,
    auto_started: Option<(String, ChatProcess)>,
}

impl App {
    pub fn new() -> Result<Self> {
        Self::with_settings(Settings::load())
    }

    pub fn with_settings(settings: Settings) -> Result<Self> {
        let client = ResearchClient::new(&settings.server_url())?;
        tracing::info!(server = client.base_url(), "using research backend");

        let focus = if settings.sidebar_collapsed {
            FocusPane::Chat
        } else {
            FocusPane::Sidebar
        };

        Ok(Self {
            should_quit: false,
            screen: Screen::Welcome,
            input_mode: InputMode::Normal,
            focus,

            client,
            settings,

            tree: ProjectTree::new(),
            tree_state: ListState::default(),
            projects_loaded: false,

            session: None,
            papers: None,
            input: TextInput::default(),
            chat_scroll: 0,
            chat_max_scroll: 0,
            follow_chat: true,
            artifact_scroll: 0,

            modal: None,
            model_picker_state: ListState::default(),

            status: None,
            animation_frame: 0,

            sidebar_area: None,
            chat_area: None,
            artifact_area: None,

            send_task: None,
            stale_sends: Vec::new(),
            poll_task: None,
            papers_task: None,
            projects_task: None,
            action_task: None,
            last_projects_refresh: None,
            select_after_refresh: None,
            auto_started: None,
        })
    }

    // ---------------------------------------------------------------------
    // Status line
    // ---------------------------------------------------------------------

    pub fn set_status(&mut self, text: impl Into<String>) {
        self.status = Some(StatusLine {
            text: text.into(),
            is_error: false,
            since: Instant::now(),
        });
    }

    pub fn set_error(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::warn!("{}", text);
        self.status = Some(StatusLine {
            text,
            is_error: true,
            since: Instant::now(),
        });
    }

    // ---------------------------------------------------------------------
    // Derived state for rendering
    // ---------------------------------------------------------------------

    /// Project shown in the main area, or the one selected in the sidebar
    pub fn active_project(&self) -> Option<&ProjectSummary> {
        let id = self
            .session
            .as_ref()
            .map(|s| s.project_id())
            .or_else(|| self.papers.as_ref().map(|p| p.project_id.as_str()));

        match id {
            Some(id) => self.tree.project(id),
            None => self.tree.selected_project(),
        }
    }

    pub fn current_phase(&self) -> Option<Phase> {
        let session = self.session.as_ref()?;
        if session.process() != ChatProcess::ResearchExperiment {
            return None;
        }
        session
            .snapshot()
            .current_phase
            .as_deref()
            .and_then(Phase::from_str)
            .or_else(|| self.active_project().map(|p| p.current_phase()))
    }

    pub fn is_busy(&self) -> bool {
        self.action_task.is_some()
    }

    /// A chat request is still on the wire
    pub fn send_in_flight(&self) -> bool {
        self.send_task.is_some()
    }

    pub fn sidebar_visible(&self) -> bool {
        !self.settings.sidebar_collapsed
    }

    // ---------------------------------------------------------------------
    // Preferences
    // ---------------------------------------------------------------------

    pub fn adjust_split(&mut self, delta: f32) {
        let ratio = self.settings.split_ratio + delta;
        if let Err(e) = self.settings.set_split_ratio(ratio) {
            tracing::warn!("could not save split ratio: {:#}", e);
        }
    }

    pub fn toggle_sidebar(&mut self) {
        let collapsed = !self.settings.sidebar_collapsed;
        if let Err(e) = self.settings.set_sidebar_collapsed(collapsed) {
            tracing::warn!("could not save sidebar state: {:#}", e);
        }
        if collapsed && self.focus == FocusPane::Sidebar {
            self.focus = FocusPane::Chat;
        }
    }

    pub fn open_model_picker(&mut self) {
        let models = available_models();
        let current = models
            .iter()
            .position(|m| *m == self.settings.selected_model)
            .unwrap_or(0);
        self.model_picker_state.select(Some(current));
        self.modal = Some(Modal::ModelPicker);
    }

    pub fn model_picker_nav(&mut self, down: bool) {
        let len = available_models().len();
        let i = self.model_picker_state.selected().unwrap_or(0);
        let next = if down { (i + 1).min(len - 1) } else { i.saturating_sub(1) };
        self.model_picker_state.select(Some(next));
    }

    pub fn confirm_model_picker(&mut self) {
        if let Some(i) = self.model_picker_state.selected() {
            if let Some(model) = available_models().get(i) {
                if let Err(e) = self.settings.set_selected_model(model) {
                    tracing::warn!("could not save model: {:#}", e);
                }
                self.set_status(format!("Model: {}", model));
            }
        }
        self.modal = None;
    }

    /// Cycle focus through the visible panes
    pub fn cycle_focus(&mut self) {
        let mut order = Vec::new();
        if self.sidebar_visible() {
            order.push(FocusPane::Sidebar);
        }
        match self.screen {
            Screen::Chat => order.extend([FocusPane::Chat, FocusPane::Artifact, FocusPane::Input]),
            Screen::Literature => order.push(FocusPane::Chat),
            Screen::Welcome => {}
        }
        if order.is_empty() {
            return;
        }
        let pos = order.iter().position(|f| *f == self.focus).map(|p| p + 1).unwrap_or(0);
        self.focus = order[pos % order.len()];
    }

    // ---------------------------------------------------------------------
    // Sidebar
    // ---------------------------------------------------------------------

    pub fn sync_tree_state(&mut self) {
        if self.tree.rows().is_empty() {
            self.tree_state.select(None);
        } else {
            self.tree_state.select(Some(self.tree.selected()));
        }
    }

    pub fn tree_down(&mut self) {
        self.tree.select_next();
        self.sync_tree_state();
    }

    pub fn tree_up(&mut self) {
        self.tree.select_prev();
        self.sync_tree_state();
    }

    pub fn tree_collapse(&mut self) {
        self.tree.collapse_selected();
        self.sync_tree_state();
    }

    /// Enter on the sidebar: expand/collapse a project or open a process.
    pub fn open_selected(&mut self) {
        match self.tree.selected_row() {
            Some(TreeRow::Project { .. }) => {
                self.tree.toggle_selected();
                self.sync_tree_state();
            }
            Some(TreeRow::Process { project, kind, locked }) => {
                let Some(summary) = self.tree.projects().get(project) else {
                    return;
                };
                let project_id = summary.project_id.clone();
                if locked {
                    let hint = summary.unlock_hint(kind).unwrap_or_default();
                    self.set_error(format!("{} is locked. {}", kind.display_name(), hint));
                    return;
                }
                match kind.as_chat() {
                    Some(process) => self.open_chat(&project_id, process),
                    None => self.open_papers(&project_id, kind),
                }
            }
            None => {}
        }
    }

    pub fn open_chat(&mut self, project_id: &str, process: ChatProcess) {
        let already_open = self
            .session
            .as_ref()
            .is_some_and(|s| s.is_for(project_id, process));
        if !already_open {
            if self.session.as_ref().is_some_and(|s| s.is_waiting()) {
                tracing::info!("leaving a chat while a response is pending");
            }
            self.session = Some(ChatSession::new(project_id, process));
            self.input.clear();
            self.chat_scroll = 0;
            self.artifact_scroll = 0;
            self.follow_chat = true;
        }
        self.papers = None;
        self.screen = Screen::Chat;
        self.focus = FocusPane::Input;
        self.input_mode = InputMode::Editing;
        self.remember_project(project_id);
    }

    pub fn open_papers(&mut self, project_id: &str, kind: ProcessKind) {
        self.session = None;
        self.papers = Some(PaperView {
            project_id: project_id.to_string(),
            kind,
            papers: Vec::new(),
            state: ListState::default(),
            loaded: false,
        });
        self.screen = Screen::Literature;
        self.focus = FocusPane::Chat;
        self.input_mode = InputMode::Normal;
        self.remember_project(project_id);
        self.reload_papers();
    }

    /// Refetch the paper list that is on screen
    pub fn reload_papers(&mut self) {
        let Some(view) = self.papers.as_ref() else {
            return;
        };
        let client = self.client.clone();
        let id = view.project_id.clone();
        let kind = view.kind;
        let handle = tokio::spawn(async move {
            match kind {
                ProcessKind::LiteratureSearch => client.searched_papers(&id).await,
                _ => client.organized_papers(&id).await,
            }
        });
        self.papers_task = Some(PapersTask {
            project_id: view.project_id.clone(),
            kind,
            handle,
        });
    }

    pub fn papers_nav(&mut self, down: bool) {
        if let Some(view) = self.papers.as_mut() {
            if view.papers.is_empty() {
                return;
            }
            let i = view.state.selected().unwrap_or(0);
            let next = if down {
                (i + 1).min(view.papers.len() - 1)
            } else {
                i.saturating_sub(1)
            };
            view.state.select(Some(next));
        }
    }

    pub fn selected_paper(&self) -> Option<&PaperEntry> {
        let view = self.papers.as_ref()?;
        view.state.selected().and_then(|i| view.papers.get(i))
    }

    /// Project id of an open literature search view
    fn search_view(&self) -> Option<String> {
        self.papers
            .as_ref()
            .filter(|v| v.kind == ProcessKind::LiteratureSearch)
            .map(|v| v.project_id.clone())
    }

    pub fn open_search_query(&mut self) {
        if self.search_view().is_some() {
            self.modal = Some(Modal::SearchQuery(TextInput::default()));
        }
    }

    pub fn search_literature(&mut self, query: &str) {
        let Some(id) = self.search_view() else {
            return;
        };
        let request = SearchRequest::new(query);
        if request.query.is_empty() {
            return;
        }
        let client = self.client.clone();
        self.spawn_action("Searching papers", async move {
            client.search_papers(&id, &request).await.map(ActionOutcome::Searched)
        });
    }

    /// Search with queries the backend derives from the research artifacts
    pub fn auto_search_literature(&mut self) {
        let Some(id) = self.search_view() else {
            return;
        };
        let client = self.client.clone();
        self.spawn_action("Auto-searching papers", async move {
            client
                .auto_search(&id, &AutoSearchRequest::default())
                .await
                .map(ActionOutcome::AutoSearched)
        });
    }

    pub fn add_selected_to_organization(&mut self) {
        let Some(id) = self.search_view() else {
            return;
        };
        let Some(paper_id) = self.selected_paper().map(|p| p.id.clone()) else {
            self.set_status("No paper selected");
            return;
        };
        let client = self.client.clone();
        self.spawn_action("Adding to organization", async move {
            client
                .add_to_organization(&id, &paper_id)
                .await
                .map(ActionOutcome::AddedToOrganization)
        });
    }

    fn remember_project(&mut self, project_id: &str) {
        if let Err(e) = self.settings.set_last_project(Some(project_id)) {
            tracing::warn!("could not save last project: {:#}", e);
        }
    }

    // ---------------------------------------------------------------------
    // Chat
    // ---------------------------------------------------------------------

    /// Send whatever is in the input box on the active chat surface.
    pub fn submit_input(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match session.begin_send(&self.input.text, Instant::now()) {
            Ok(outbound) => {
                self.input.clear();
                self.follow_chat = true;

                let client = self.client.clone();
                let model = self.settings.selected_model.clone();
                let request = outbound.clone();
                let handle = tokio::spawn(async move {
                    client
                        .send_chat(&request.project_id, request.process, request.content(), Some(&model))
                        .await
                });
                self.track_send(outbound, handle);
            }
            Err(SendError::Empty) => {}
            Err(e) => self.set_error(e.to_string()),
        }
    }

    /// A send still on the wire here was given up on by the watchdog; keep
    /// its handle so its outcome is still collected.
    fn track_send(&mut self, outbound: OutboundChat, handle: JoinHandle<Result<()>>) {
        if let Some(previous) = self.send_task.take() {
            tracing::info!(
                project = %previous.outbound.project_id,
                "previous send still in flight, tracking it separately"
            );
            self.stale_sends.push(previous);
        }
        self.send_task = Some(SendTask { outbound, handle });
    }

    pub fn scroll_chat(&mut self, delta: i32) {
        let next = (self.chat_scroll as i32 + delta).clamp(0, self.chat_max_scroll as i32) as u16;
        self.chat_scroll = next;
        self.follow_chat = next >= self.chat_max_scroll;
    }

    pub fn scroll_artifact(&mut self, delta: i32) {
        self.artifact_scroll = (self.artifact_scroll as i32 + delta).max(0) as u16;
    }

    pub fn chat_to_bottom(&mut self) {
        self.follow_chat = true;
        self.chat_scroll = self.chat_max_scroll;
    }

    // ---------------------------------------------------------------------
    // Actions (one at a time)
    // ---------------------------------------------------------------------

    fn spawn_action<F>(&mut self, label: &'static str, future: F)
    where
        F: Future<Output = Result<ActionOutcome>> + Send + 'static,
    {
        if self.action_task.is_some() {
            self.set_error("Another action is still running");
            return;
        }
        self.set_status(format!("{}...", label));
        self.action_task = Some(ActionTask {
            label,
            handle: tokio::spawn(future),
        });
    }

    pub fn create_project(&mut self, topic: &str) {
        let topic = topic.trim().to_string();
        if topic.is_empty() {
            return;
        }
        let client = self.client.clone();
        self.spawn_action("Creating project", async move {
            client.create_project(&topic).await.map(ActionOutcome::Created)
        });
    }

    pub fn rename_project(&mut self, project_id: &str, topic: &str) {
        let topic = topic.trim().to_string();
        if topic.is_empty() {
            return;
        }
        let client = self.client.clone();
        let id = project_id.to_string();
        self.spawn_action("Renaming project", async move {
            client.rename_project(&id, &topic).await.map(|_| ActionOutcome::Renamed)
        });
    }

    pub fn delete_project(&mut self, project_id: &str) {
        let client = self.client.clone();
        let id = project_id.to_string();
        self.spawn_action("Deleting project", async move {
            client.delete_project(&id).await.map(|_| ActionOutcome::Deleted(id))
        });
    }

    pub fn start_process(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let client = self.client.clone();
        let id = session.project_id().to_string();
        let process = session.process();
        self.spawn_action("Starting", async move {
            client.start_process(&id, process).await.map(|_| ActionOutcome::Started)
        });
    }

    pub fn reset_process(&mut self, process: ChatProcess, options: ResetOptions) {
        let Some(id) = self.session.as_ref().map(|s| s.project_id().to_string()) else {
            return;
        };
        if !options.reset_messages && !options.reset_artifact {
            self.set_status("Nothing to reset");
            return;
        }
        let client = self.client.clone();
        self.spawn_action("Resetting", async move {
            client.reset_process(&id, process, options).await.map(ActionOutcome::Reset)
        });
    }

    pub fn switch_phase(&mut self) {
        let Some((id, waiting)) = self.research_session() else {
            return;
        };
        if waiting {
            self.set_error("Wait for the current response before switching phase");
            return;
        }
        let target = self.current_phase().unwrap_or(Phase::ResearchDefinition).other();
        let client = self.client.clone();
        self.spawn_action("Switching phase", async move {
            client.switch_phase(&id, target).await.map(|_| ActionOutcome::PhaseSwitched(target))
        });
    }

    pub fn complete_phase(&mut self) {
        let Some((id, _)) = self.research_session() else {
            return;
        };
        let done = match (self.current_phase(), self.active_project()) {
            (Some(phase), Some(project)) if project.is_phase_complete(phase) => Some(phase),
            _ => None,
        };
        if let Some(phase) = done {
            self.set_status(format!("{} is already complete", phase.display_name()));
            return;
        }
        let client = self.client.clone();
        self.spawn_action("Completing phase", async move {
            let response = client.complete_phase(&id).await?;
            let project = match client.project_status(&id).await {
                Ok(project) => Some(project),
                Err(e) => {
                    tracing::warn!("could not refresh project after completing a phase: {:#}", e);
                    None
                }
            };
            Ok::<_, anyhow::Error>(ActionOutcome::Completed(response, project))
        });
    }

    /// Project id and waiting flag of an open research & experiment chat
    fn research_session(&self) -> Option<(String, bool)> {
        self.session
            .as_ref()
            .filter(|s| s.process() == ChatProcess::ResearchExperiment)
            .map(|s| (s.project_id().to_string(), s.is_waiting()))
    }

    pub fn refresh_projects(&mut self) {
        if self.projects_task.is_some() {
            return;
        }
        let client = self.client.clone();
        self.projects_task = Some(tokio::spawn(async move { client.list_projects().await }));
        self.last_projects_refresh = Some(Instant::now());
    }

    // ---------------------------------------------------------------------
    // Event loop housekeeping
    // ---------------------------------------------------------------------

    /// Called on every tick: collect finished tasks, run the watchdog, and
    /// schedule polls.
    pub async fn on_tick(&mut self) {
        let now = Instant::now();

        if self.session.as_ref().is_some_and(|s| s.is_waiting()) || self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }

        self.collect_send().await;
        self.collect_poll().await;
        self.collect_projects().await;
        self.collect_papers().await;
        self.collect_action().await;

        if let Some(session) = self.session.as_mut() {
            if session.tick(now) {
                self.set_error("No response after 60s. You can send again.");
            }
        }

        self.schedule_poll(now);

        let projects_due = self
            .last_projects_refresh
            .map_or(true, |last| now.duration_since(last) >= PROJECTS_REFRESH_INTERVAL);
        if projects_due {
            self.refresh_projects();
        }

        if self.status.as_ref().is_some_and(|s| now.duration_since(s.since) >= STATUS_TTL) {
            self.status = None;
        }
    }

    fn schedule_poll(&mut self, now: Instant) {
        if self.poll_task.is_some() {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.poll_due(now) {
            return;
        }
        session.mark_polled(now);

        let client = self.client.clone();
        let project_id = session.project_id().to_string();
        let process = session.process();
        let id = project_id.clone();
        let handle = tokio::spawn(async move { client.process_state(&id, process).await });
        self.poll_task = Some(PollTask {
            project_id,
            process,
            handle,
        });
    }

    async fn collect_send(&mut self) {
        let mut i = 0;
        while i < self.stale_sends.len() {
            if self.stale_sends[i].handle.is_finished() {
                let task = self.stale_sends.swap_remove(i);
                let result = join(task.handle).await;
                self.finish_send(&task.outbound, result, "An earlier message failed to send");
            } else {
                i += 1;
            }
        }

        let Some(task) = self.send_task.take() else {
            return;
        };
        if !task.handle.is_finished() {
            self.send_task = Some(task);
            return;
        }

        let result = join(task.handle).await;
        self.finish_send(&task.outbound, result, "Send failed");
    }

    /// The session's generation check keeps an old failure from rolling back
    /// a newer exchange.
    fn finish_send(&mut self, outbound: &OutboundChat, result: Result<()>, context: &str) {
        if let Some(session) = self.session.as_mut() {
            if session.is_for(&outbound.project_id, outbound.process) {
                session.finish_send(outbound, &result);
            }
        }
        if let Err(e) = result {
            self.set_error(format!("{}: {:#}", context, e));
        }
    }

    /// Forget the poll in flight. Its result would predate a reset or phase
    /// switch that already finished.
    fn drop_poll(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.handle.abort();
        }
    }

    async fn collect_poll(&mut self) {
        let Some(task) = self.poll_task.take() else {
            return;
        };
        if !task.handle.is_finished() {
            self.poll_task = Some(task);
            return;
        }

        let result = join(task.handle).await;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.is_for(&task.project_id, task.process) {
            // The user moved on; stale result
            return;
        }

        match result {
            Ok(snapshot) => {
                let first_load = !session.is_loaded();
                let empty = snapshot.messages.is_empty();
                if session.apply_snapshot(snapshot) == LogOutcome::Answered {
                    self.follow_chat = true;
                }
                let key = (task.project_id.clone(), task.process);
                if first_load && empty && self.auto_started.as_ref() != Some(&key) {
                    self.auto_started = Some(key);
                    self.start_process();
                }
            }
            Err(e) => self.set_error(format!("Refresh failed: {:#}", e)),
        }
    }

    async fn collect_projects(&mut self) {
        let Some(handle) = self.projects_task.take() else {
            return;
        };
        if !handle.is_finished() {
            self.projects_task = Some(handle);
            return;
        }

        match join(handle).await {
            Ok(projects) => {
                let first_load = !self.projects_loaded;
                self.tree.set_projects(projects);
                self.projects_loaded = true;

                if let Some(id) = self.select_after_refresh.take() {
                    if self.tree.select(&id, Some(ProcessKind::ResearchExperiment)) {
                        self.open_chat(&id, ChatProcess::ResearchExperiment);
                    }
                } else if first_load {
                    if let Some(last) = self.settings.last_project.clone() {
                        self.tree.select(&last, None);
                    }
                }
                self.sync_tree_state();
            }
            Err(e) => self.set_error(format!("Could not load projects: {:#}", e)),
        }
    }

    async fn collect_papers(&mut self) {
        let Some(task) = self.papers_task.take() else {
            return;
        };
        if !task.handle.is_finished() {
            self.papers_task = Some(task);
            return;
        }

        let result = join(task.handle).await;
        let Some(view) = self.papers.as_mut() else {
            return;
        };
        if view.project_id != task.project_id || view.kind != task.kind {
            return;
        }
        match result {
            Ok(papers) => {
                view.state.select(if papers.is_empty() { None } else { Some(0) });
                view.papers = papers;
                view.loaded = true;
            }
            Err(e) => self.set_error(format!("Could not load papers: {:#}", e)),
        }
    }

    async fn collect_action(&mut self) {
        let Some(task) = self.action_task.take() else {
            return;
        };
        if !task.handle.is_finished() {
            self.action_task = Some(task);
            return;
        }

        let outcome = match join(task.handle).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.set_error(format!("{} failed: {:#}", task.label, e));
                return;
            }
        };

        match outcome {
            ActionOutcome::Created(project) => {
                self.set_status(format!("Created \"{}\"", project.topic));
                self.select_after_refresh = Some(project.project_id);
            }
            ActionOutcome::Renamed => self.set_status("Project renamed"),
            ActionOutcome::Deleted(id) => {
                if self.session.as_ref().is_some_and(|s| s.project_id() == id)
                    || self.papers.as_ref().is_some_and(|p| p.project_id == id)
                {
                    self.session = None;
                    self.papers = None;
                    self.screen = Screen::Welcome;
                    self.focus = FocusPane::Sidebar;
                    self.input_mode = InputMode::Normal;
                }
                if self.settings.last_project.as_deref() == Some(id.as_str()) {
                    if let Err(e) = self.settings.set_last_project(None) {
                        tracing::warn!("could not save last project: {:#}", e);
                    }
                }
                self.set_status("Project deleted");
            }
            ActionOutcome::Started => {
                if let Some(session) = self.session.as_mut() {
                    session.invalidate();
                }
            }
            ActionOutcome::Reset(response) => {
                self.drop_poll();
                if let Some(session) = self.session.as_mut() {
                    session.reset_local();
                    // Don't greet again right after an explicit reset
                    self.auto_started = Some((session.project_id().to_string(), session.process()));
                }
                self.chat_scroll = 0;
                self.artifact_scroll = 0;
                self.set_status(response.message);
            }
            ActionOutcome::PhaseSwitched(phase) => {
                self.drop_poll();
                if let Some(session) = self.session.as_mut() {
                    session.invalidate();
                }
                self.artifact_scroll = 0;
                self.set_status(format!("Switched to {}", phase.display_name()));
            }
            ActionOutcome::Completed(response, project) => {
                if let Some(unlocked) = response.unlocked_process.as_deref() {
                    tracing::info!(unlocked, "processes unlocked");
                }
                if let Some(project) = project {
                    self.tree.update_project(project);
                    self.sync_tree_state();
                }
                if let Some(session) = self.session.as_mut() {
                    session.invalidate();
                }
                self.set_status(response.message);
            }
            ActionOutcome::Searched(response) => {
                self.set_status(format!(
                    "Found {} papers for \"{}\"",
                    response.total_found, response.query
                ));
                self.reload_papers();
            }
            ActionOutcome::AutoSearched(response) => {
                self.set_status(format!(
                    "Found {} papers from {} generated queries",
                    response.total_found,
                    response.queries_generated.len()
                ));
                self.reload_papers();
            }
            ActionOutcome::AddedToOrganization(response) => {
                if response.message.is_empty() {
                    self.set_status(format!("Added as {}", response.organization_paper_id));
                } else {
                    self.set_status(response.message);
                }
            }
        }

        // Every action can change titles, flags or locks
        self.refresh_projects();
    }
}

async fn join<T>(handle: JoinHandle<Result<T>>) -> Result<T> {
    match handle.await {
        Ok(result) => result,
        Err(e) => Err(anyhow!("background task failed: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scholarly_core::project::ProcessMap;
    use scholarly_core::{Agent, Message, RESPONSE_TIMEOUT};
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    fn test_app(dir: &TempDir) -> App {
        let mut settings = Settings::load_from(&dir.path().join("settings.json"));
        // Nothing listens on the discard port, so requests fail fast
        settings.server_url = Some("http://127.0.0.1:9".to_string());
        App::with_settings(settings).unwrap()
    }

    /// A task that has already produced `value`
    async fn ready<T: Send + 'static>(value: Result<T>) -> JoinHandle<Result<T>> {
        let handle = tokio::spawn(async move { value });
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }
        handle
    }

    fn poll(process: ChatProcess, handle: JoinHandle<Result<ProcessSnapshot>>) -> PollTask {
        PollTask {
            project_id: "p1".to_string(),
            process,
            handle,
        }
    }

    fn log(contents: &[&str]) -> ProcessSnapshot {
        ProcessSnapshot {
            messages: contents
                .iter()
                .map(|c| Message::new(Agent::ResearchAdvisor, *c))
                .collect(),
            ..ProcessSnapshot::default()
        }
    }

    fn action(label: &'static str, handle: JoinHandle<Result<ActionOutcome>>) -> ActionTask {
        ActionTask { label, handle }
    }

    fn project(id: &str, unlocked: bool) -> ProjectSummary {
        ProjectSummary {
            project_id: id.to_string(),
            topic: format!("topic {}", id),
            created_at: String::new(),
            updated_at: String::new(),
            research_definition_complete: unlocked,
            experiment_design_complete: unlocked,
            processes: ProcessMap::default(),
        }
    }

    #[test]
    fn test_text_input_editing_is_utf8_safe() {
        let mut input = TextInput::default();
        for c in "héllo".chars() {
            input.insert(c);
        }
        input.left();
        input.left();
        input.backspace();
        assert_eq!(input.text, "hélo");
        input.home();
        input.delete();
        assert_eq!(input.text, "élo");
        input.end();
        input.insert('!');
        assert_eq!(input.text, "élo!");
        assert_eq!(input.cursor, 4);
    }

    #[test]
    fn test_with_text_places_cursor_at_end() {
        let input = TextInput::with_text("연구 주제");
        assert_eq!(input.cursor, 5);
        assert!(!input.is_blank());
        assert!(TextInput::with_text("   ").is_blank());
    }

    #[test]
    fn test_split_adjustments_persist_and_clamp() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        for _ in 0..20 {
            app.adjust_split(SPLIT_STEP);
        }
        assert!((app.settings.split_ratio - 0.8).abs() < 1e-6);

        let reloaded = Settings::load_from(&dir.path().join("settings.json"));
        assert!((reloaded.split_ratio - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_toggle_sidebar_moves_focus() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        assert_eq!(app.focus, FocusPane::Sidebar);
        app.toggle_sidebar();
        assert!(!app.sidebar_visible());
        assert_eq!(app.focus, FocusPane::Chat);
    }

    #[test]
    fn test_locked_process_does_not_open() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        app.tree.set_projects(vec![project("p1", false)]);
        app.tree.select("p1", Some(ProcessKind::PaperWriting));

        app.open_selected();
        assert!(app.session.is_none());
        assert_eq!(app.screen, Screen::Welcome);
        let status = app.status.as_ref().unwrap();
        assert!(status.is_error);
        assert!(status.text.contains("Paper Writing is locked"));
    }

    #[test]
    fn test_model_picker_selects_and_persists() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        app.open_model_picker();
        app.model_picker_nav(true);
        app.model_picker_nav(true);
        app.model_picker_nav(true);
        app.confirm_model_picker();
        assert!(app.modal.is_none());
        assert_eq!(app.settings.selected_model, "gemini-2.5-flash");
    }

    #[tokio::test]
    async fn test_send_failure_rolls_back_on_tick() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        app.tree.set_projects(vec![project("p1", false)]);
        app.tree.select("p1", Some(ProcessKind::ResearchExperiment));
        app.open_selected();
        assert_eq!(app.screen, Screen::Chat);

        app.input = TextInput::with_text("hello");
        app.submit_input();
        assert!(app.input.text.is_empty());
        let session = app.session.as_ref().unwrap();
        assert!(session.is_waiting());
        assert_eq!(session.display_pending(), Some("hello"));

        for _ in 0..200 {
            if app.send_task.is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            app.collect_send().await;
        }

        let session = app.session.as_ref().unwrap();
        assert!(!session.is_waiting());
        assert_eq!(session.display_pending(), None);
        assert!(app.status.as_ref().unwrap().text.starts_with("Send failed"));
    }

    #[tokio::test]
    async fn test_silent_server_does_not_block_polling() {
        // Accepts connections and never answers
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        app.client =
            ResearchClient::with_timeout(&format!("http://{}", addr), Duration::from_millis(200)).unwrap();
        app.tree.set_projects(vec![project("p1", false)]);
        app.open_chat("p1", ChatProcess::ResearchExperiment);

        app.on_tick().await;
        assert!(app.poll_task.is_some());
        assert!(app.projects_task.is_some());

        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            app.on_tick().await;
            if app.poll_task.is_none() && app.projects_task.is_none() {
                break;
            }
        }
        assert!(app.poll_task.is_none());
        assert!(app.projects_task.is_none());
        assert!(app.status.as_ref().unwrap().is_error);

        // The slot is free again, so the next due poll goes out
        app.session.as_mut().unwrap().invalidate();
        app.on_tick().await;
        assert!(app.poll_task.is_some());
    }

    #[tokio::test]
    async fn test_poll_for_previous_surface_is_dropped() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        app.tree.set_projects(vec![project("p1", true)]);
        app.open_chat("p1", ChatProcess::ResearchExperiment);
        app.poll_task = Some(poll(
            ChatProcess::ResearchExperiment,
            ready(Ok(log(&["research log"]))).await,
        ));

        app.open_chat("p1", ChatProcess::PaperWriting);
        app.collect_poll().await;

        assert!(app.poll_task.is_none());
        let session = app.session.as_ref().unwrap();
        assert!(session.is_for("p1", ChatProcess::PaperWriting));
        assert!(!session.is_loaded());
        assert!(session.messages().is_empty());
        assert!(!app.is_busy());
    }

    #[tokio::test]
    async fn test_one_poll_in_flight_per_session() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        app.tree.set_projects(vec![project("p1", false)]);
        app.open_chat("p1", ChatProcess::ResearchExperiment);
        app.poll_task = Some(poll(
            ChatProcess::ResearchExperiment,
            tokio::spawn(std::future::pending()),
        ));

        let now = Instant::now();
        assert!(app.session.as_ref().unwrap().poll_due(now));
        app.schedule_poll(now);
        app.collect_poll().await;
        // Nothing new was scheduled; the pending poll is still the one tracked
        assert!(app.session.as_ref().unwrap().poll_due(now));
        assert!(app.poll_task.is_some());

        app.poll_task = Some(poll(ChatProcess::ResearchExperiment, ready(Ok(log(&["hi"]))).await));
        app.collect_poll().await;
        assert_eq!(app.session.as_ref().unwrap().messages().len(), 1);

        app.schedule_poll(now);
        assert!(app.poll_task.is_some());
        assert!(!app.session.as_ref().unwrap().poll_due(now));
    }

    #[tokio::test]
    async fn test_empty_first_log_starts_once() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        app.tree.set_projects(vec![project("p1", false)]);
        app.open_chat("p1", ChatProcess::ResearchExperiment);

        app.poll_task = Some(poll(ChatProcess::ResearchExperiment, ready(Ok(log(&[]))).await));
        app.collect_poll().await;
        assert_eq!(app.action_task.as_ref().map(|t| t.label), Some("Starting"));
        app.action_task.take().unwrap().handle.abort();

        // Still empty on the next poll
        app.poll_task = Some(poll(ChatProcess::ResearchExperiment, ready(Ok(log(&[]))).await));
        app.collect_poll().await;
        assert!(!app.is_busy());

        // Coming back to the same surface
        app.open_chat("p1", ChatProcess::PaperWriting);
        app.open_chat("p1", ChatProcess::ResearchExperiment);
        app.poll_task = Some(poll(ChatProcess::ResearchExperiment, ready(Ok(log(&[]))).await));
        app.collect_poll().await;
        assert!(!app.is_busy());
    }

    #[tokio::test]
    async fn test_reset_discards_poll_started_before_it() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        app.tree.set_projects(vec![project("p1", false)]);
        app.open_chat("p1", ChatProcess::ResearchExperiment);
        app.session.as_mut().unwrap().apply_snapshot(log(&["old question", "old answer"]));

        app.poll_task = Some(poll(
            ChatProcess::ResearchExperiment,
            ready(Ok(log(&["old question", "old answer"]))).await,
        ));
        let reset = ResetResponse {
            success: true,
            message: "Process reset".to_string(),
        };
        app.action_task = Some(action("Resetting", ready(Ok(ActionOutcome::Reset(reset))).await));

        app.collect_action().await;
        assert!(app.poll_task.is_none());
        app.collect_poll().await;

        let session = app.session.as_ref().unwrap();
        assert!(session.messages().is_empty());
        assert!(!session.is_loaded());
        assert_eq!(app.status.as_ref().unwrap().text, "Process reset");

        // The empty log after a reset is not greeted again
        app.poll_task = Some(poll(ChatProcess::ResearchExperiment, ready(Ok(log(&[]))).await));
        app.collect_poll().await;
        assert!(app.session.as_ref().unwrap().is_loaded());
        assert!(!app.is_busy());
    }

    #[tokio::test]
    async fn test_completed_phase_unlocks_sidebar_immediately() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        app.tree.set_projects(vec![project("p1", false)]);
        app.tree.select("p1", Some(ProcessKind::LiteratureSearch));
        app.sync_tree_state();

        let response = CompletePhaseResponse {
            success: true,
            message: "Experiment Design completed".to_string(),
            unlocked_process: Some("literature_search".to_string()),
        };
        app.action_task = Some(action(
            "Completing phase",
            ready(Ok(ActionOutcome::Completed(response, Some(project("p1", true))))).await,
        ));
        app.collect_action().await;

        assert_eq!(
            app.tree.selected_row(),
            Some(TreeRow::Process { project: 0, kind: ProcessKind::LiteratureSearch, locked: false })
        );
        assert_eq!(app.status.as_ref().unwrap().text, "Experiment Design completed");
    }

    #[tokio::test]
    async fn test_search_reloads_paper_list() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        app.open_papers("p1", ProcessKind::LiteratureSearch);
        app.papers_task = None;

        let response = SearchResponse {
            query: "sleep".to_string(),
            total_found: 3,
            papers: Vec::new(),
            sources_searched: vec!["arxiv".to_string()],
        };
        app.action_task = Some(action("Searching papers", ready(Ok(ActionOutcome::Searched(response))).await));
        app.collect_action().await;

        assert!(app.papers_task.is_some());
        assert_eq!(app.status.as_ref().unwrap().text, "Found 3 papers for \"sleep\"");
    }

    #[tokio::test]
    async fn test_add_to_organization_needs_a_selection() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        app.open_papers("p1", ProcessKind::LiteratureSearch);

        app.add_selected_to_organization();
        assert!(!app.is_busy());
        assert_eq!(app.status.as_ref().unwrap().text, "No paper selected");

        let view = app.papers.as_mut().unwrap();
        view.papers.push(PaperEntry {
            id: "search_001".to_string(),
            title: "Sleep and recall".to_string(),
            authors: vec!["Kim".to_string()],
            year: Some(2024),
            source: "arxiv".to_string(),
            status: "found".to_string(),
            r#abstract: String::new(),
        });
        view.state.select(Some(0));

        app.add_selected_to_organization();
        assert_eq!(app.action_task.as_ref().map(|t| t.label), Some("Adding to organization"));
    }

    #[tokio::test]
    async fn test_abandoned_send_failure_is_reported_without_rollback() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        app.tree.set_projects(vec![project("p1", false)]);
        app.open_chat("p1", ChatProcess::ResearchExperiment);

        let start = Instant::now();
        let session = app.session.as_mut().unwrap();
        session.apply_snapshot(log(&[]));
        let first = session.begin_send("first", start).unwrap();
        let (fail_first, first_result) = tokio::sync::oneshot::channel::<Result<()>>();
        app.track_send(first, tokio::spawn(async move { first_result.await.unwrap_or(Ok(())) }));

        // Watchdog gives up, user sends again while the first is still on the wire
        assert!(app.session.as_mut().unwrap().tick(start + RESPONSE_TIMEOUT));
        let second = app
            .session
            .as_mut()
            .unwrap()
            .begin_send("second", start + RESPONSE_TIMEOUT)
            .unwrap();
        app.track_send(second, tokio::spawn(std::future::pending()));
        assert_eq!(app.stale_sends.len(), 1);

        fail_first.send(Err(anyhow!("connection reset"))).unwrap();
        for _ in 0..100 {
            app.collect_send().await;
            if app.stale_sends.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert!(app.stale_sends.is_empty());
        assert!(app.send_in_flight());
        let session = app.session.as_ref().unwrap();
        assert!(session.is_waiting());
        assert_eq!(session.display_pending(), Some("second"));
        let status = app.status.as_ref().unwrap();
        assert!(status.is_error);
        assert!(status.text.starts_with("An earlier message failed to send"));
    }
}
