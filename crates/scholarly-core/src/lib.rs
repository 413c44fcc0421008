pub mod api;
pub mod error;
pub mod project;
pub mod reconcile;
pub mod session;
pub mod settings;
pub mod state;
pub mod tree;

// Re-export main types for convenience
pub use api::{
    AddToOrganizationResponse, AutoSearchRequest, AutoSearchResponse, ResearchBackend, ResearchClient, ResetOptions,
    SearchRequest, SearchResponse, REQUEST_TIMEOUT,
};
pub use error::{ApiError, SendError};
pub use project::{ChatProcess, PaperEntry, Phase, ProcessKind, ProjectSummary};
pub use reconcile::{ChatReconciler, LogOutcome, SendTicket, RESPONSE_TIMEOUT};
pub use session::{ChatSession, OutboundChat};
pub use settings::{available_models, Settings};
pub use state::{format_timestamp, Agent, Message, MessageKind, ProcessSnapshot};
pub use tree::{ProjectTree, TreeRow};
