use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::project::{ChatProcess, CompletePhaseResponse, PaperEntry, Phase, ProjectSummary};
use crate::state::ProcessSnapshot;

/// Upper bound for one request. Shorter than the chat watchdog so a hung
/// poll frees its slot before the user is told to resend.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Searches fan out to several paper sources and may ask the LLM for
/// queries first.
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(180);

/// The two calls a chat surface needs. Split out so sessions can be driven
/// against something other than a live server.
#[async_trait]
pub trait ResearchBackend: Send + Sync {
    async fn process_state(&self, project_id: &str, process: ChatProcess) -> Result<ProcessSnapshot>;

    async fn send_chat(
        &self,
        project_id: &str,
        process: ChatProcess,
        content: &str,
        model: Option<&str>,
    ) -> Result<()>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Serialize)]
struct CreateProjectRequest<'a> {
    topic: &'a str,
    target_journal: &'a str,
}

#[derive(Serialize)]
struct RenameRequest<'a> {
    topic: &'a str,
}

#[derive(Serialize)]
struct SwitchPhaseRequest<'a> {
    phase: &'a str,
}

/// What a process reset should clear
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResetOptions {
    pub reset_messages: bool,
    pub reset_artifact: bool,
}

impl Default for ResetOptions {
    fn default() -> Self {
        Self {
            reset_messages: true,
            reset_artifact: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetResponse {
    pub success: bool,
    pub message: String,
}

/// Body of `POST .../literature-search/search`
#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub sources: Vec<String>,
    pub year_start: i32,
    pub year_end: i32,
    pub limit: u32,
}

impl SearchRequest {
    pub fn new(query: &str) -> Self {
        Self {
            query: query.trim().to_string(),
            sources: default_sources(),
            year_start: 2022,
            year_end: 2026,
            limit: 10,
        }
    }
}

/// Body of `POST .../literature-search/auto-search`. Queries come from the
/// research definition and experiment design artifacts.
#[derive(Debug, Clone, Serialize)]
pub struct AutoSearchRequest {
    pub sources: Vec<String>,
    pub year_start: i32,
    pub year_end: i32,
    pub limit_per_query: u32,
}

impl Default for AutoSearchRequest {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            year_start: 2020,
            year_end: 2026,
            limit_per_query: 5,
        }
    }
}

fn default_sources() -> Vec<String> {
    vec!["semantic_scholar".to_string(), "arxiv".to_string()]
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub total_found: usize,
    #[serde(default)]
    pub papers: Vec<PaperEntry>,
    #[serde(default)]
    pub sources_searched: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutoSearchResponse {
    #[serde(default)]
    pub queries_generated: Vec<String>,
    #[serde(default)]
    pub total_found: usize,
    #[serde(default)]
    pub papers: Vec<PaperEntry>,
    #[serde(default)]
    pub sources_searched: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddToOrganizationResponse {
    pub success: bool,
    pub paper_id: String,
    pub organization_paper_id: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Deserialize)]
struct PaperListResponse {
    #[serde(default)]
    papers: Vec<PaperEntry>,
    #[serde(default)]
    searched_papers: Vec<PaperEntry>,
}

#[derive(Clone)]
pub struct ResearchClient {
    client: Client,
    base_url: String,
}

impl ResearchClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn v3(&self, path: &str) -> String {
        format!("{}/api/research/v3{}", self.base_url, path)
    }

    fn process_url(&self, project_id: &str, slug: &str, action: &str) -> String {
        self.v3(&format!("/{}/process/{}{}", project_id, slug, action))
    }

    pub async fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        let response = self.client.get(self.v3("")).send().await?;
        let response = check(response, None).await?;
        Ok(response.json().await?)
    }

    pub async fn create_project(&self, topic: &str) -> Result<ProjectSummary> {
        let request = CreateProjectRequest {
            topic,
            target_journal: "",
        };
        let response = self
            .client
            .post(self.v3("/create"))
            .json(&request)
            .send()
            .await?;
        let response = check(response, None).await?;
        Ok(response.json().await?)
    }

    pub async fn project_status(&self, project_id: &str) -> Result<ProjectSummary> {
        let response = self
            .client
            .get(self.v3(&format!("/{}/status", project_id)))
            .send()
            .await?;
        let response = check(response, Some(project_id)).await?;
        Ok(response.json().await?)
    }

    pub async fn rename_project(&self, project_id: &str, topic: &str) -> Result<()> {
        let response = self
            .client
            .patch(self.v3(&format!("/{}/rename", project_id)))
            .json(&RenameRequest { topic: topic.trim() })
            .send()
            .await?;
        check(response, Some(project_id)).await?;
        Ok(())
    }

    pub async fn delete_project(&self, project_id: &str) -> Result<()> {
        let url = format!("{}/api/research/{}", self.base_url, project_id);
        let response = self.client.delete(&url).send().await?;
        check(response, Some(project_id)).await?;
        Ok(())
    }

    /// Ask the process agent for its opening message
    pub async fn start_process(&self, project_id: &str, process: ChatProcess) -> Result<()> {
        let response = self
            .client
            .post(self.process_url(project_id, process.slug(), "/start"))
            .send()
            .await?;
        check(response, Some(project_id)).await?;
        Ok(())
    }

    pub async fn reset_process(
        &self,
        project_id: &str,
        process: ChatProcess,
        options: ResetOptions,
    ) -> Result<ResetResponse> {
        let response = self
            .client
            .post(self.process_url(project_id, process.slug(), "/reset"))
            .json(&options)
            .send()
            .await?;
        let response = check(response, Some(project_id)).await?;
        Ok(response.json().await?)
    }

    pub async fn switch_phase(&self, project_id: &str, phase: Phase) -> Result<()> {
        let response = self
            .client
            .post(self.process_url(project_id, ChatProcess::ResearchExperiment.slug(), "/switch-phase"))
            .json(&SwitchPhaseRequest { phase: phase.as_str() })
            .send()
            .await?;
        check(response, Some(project_id)).await?;
        Ok(())
    }

    /// Mark the current research phase complete. One-way on the server side.
    pub async fn complete_phase(&self, project_id: &str) -> Result<CompletePhaseResponse> {
        let response = self
            .client
            .post(self.process_url(project_id, ChatProcess::ResearchExperiment.slug(), "/complete"))
            .send()
            .await?;
        let response = check(response, Some(project_id)).await?;
        Ok(response.json().await?)
    }

    pub async fn organized_papers(&self, project_id: &str) -> Result<Vec<PaperEntry>> {
        let response = self
            .client
            .get(self.process_url(project_id, "literature-organization", ""))
            .send()
            .await?;
        let response = check(response, Some(project_id)).await?;
        let list: PaperListResponse = response.json().await?;
        Ok(list.papers)
    }

    pub async fn searched_papers(&self, project_id: &str) -> Result<Vec<PaperEntry>> {
        let response = self
            .client
            .get(self.process_url(project_id, "literature-search", ""))
            .send()
            .await?;
        let response = check(response, Some(project_id)).await?;
        let list: PaperListResponse = response.json().await?;
        Ok(list.searched_papers)
    }

    /// Run a keyword search. The server replaces the project's searched
    /// papers with the results.
    pub async fn search_papers(&self, project_id: &str, request: &SearchRequest) -> Result<SearchResponse> {
        let response = self
            .client
            .post(self.process_url(project_id, "literature-search", "/search"))
            .timeout(SEARCH_TIMEOUT)
            .json(request)
            .send()
            .await?;
        let response = check(response, Some(project_id)).await?;
        Ok(response.json().await?)
    }

    pub async fn auto_search(&self, project_id: &str, request: &AutoSearchRequest) -> Result<AutoSearchResponse> {
        let response = self
            .client
            .post(self.process_url(project_id, "literature-search", "/auto-search"))
            .timeout(SEARCH_TIMEOUT)
            .json(request)
            .send()
            .await?;
        let response = check(response, Some(project_id)).await?;
        Ok(response.json().await?)
    }

    /// Copy a searched paper into literature organization
    pub async fn add_to_organization(&self, project_id: &str, paper_id: &str) -> Result<AddToOrganizationResponse> {
        let response = self
            .client
            .post(self.process_url(
                project_id,
                "literature-search",
                &format!("/add-to-organization/{}", paper_id),
            ))
            .send()
            .await?;
        let response = check(response, Some(project_id)).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ResearchBackend for ResearchClient {
    async fn process_state(&self, project_id: &str, process: ChatProcess) -> Result<ProcessSnapshot> {
        let response = self
            .client
            .get(self.process_url(project_id, process.slug(), ""))
            .send()
            .await?;
        let response = check(response, Some(project_id)).await?;
        Ok(response.json().await?)
    }

    async fn send_chat(
        &self,
        project_id: &str,
        process: ChatProcess,
        content: &str,
        model: Option<&str>,
    ) -> Result<()> {
        let response = self
            .client
            .post(self.process_url(project_id, process.slug(), "/chat"))
            .json(&ChatRequest { content, model })
            .send()
            .await?;
        check(response, Some(project_id)).await?;
        Ok(())
    }
}

/// Turn a non-2xx response into an [`ApiError`].
async fn check(response: Response, project_id: Option<&str>) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::NOT_FOUND {
        if let Some(id) = project_id {
            return Err(ApiError::ProjectNotFound(id.to_string()).into());
        }
    }

    let body = response.text().await.unwrap_or_default();
    Err(ApiError::from_response(status, &body).into())
}
