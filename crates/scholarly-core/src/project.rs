//! Projects, their four processes, and the unlock rules between them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessKind {
    ResearchExperiment,
    LiteratureOrganization,
    LiteratureSearch,
    PaperWriting,
}

impl ProcessKind {
    pub fn all() -> [ProcessKind; 4] {
        [
            ProcessKind::ResearchExperiment,
            ProcessKind::LiteratureOrganization,
            ProcessKind::LiteratureSearch,
            ProcessKind::PaperWriting,
        ]
    }

    /// Path segment used by the backend routes
    pub fn slug(&self) -> &'static str {
        match self {
            ProcessKind::ResearchExperiment => "research-experiment",
            ProcessKind::LiteratureOrganization => "literature-organization",
            ProcessKind::LiteratureSearch => "literature-search",
            ProcessKind::PaperWriting => "paper-writing",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProcessKind::ResearchExperiment => "Research & Experiment",
            ProcessKind::LiteratureOrganization => "Literature Organization",
            ProcessKind::LiteratureSearch => "Literature Search",
            ProcessKind::PaperWriting => "Paper Writing",
        }
    }

    pub fn as_chat(&self) -> Option<ChatProcess> {
        match self {
            ProcessKind::ResearchExperiment => Some(ChatProcess::ResearchExperiment),
            ProcessKind::PaperWriting => Some(ChatProcess::PaperWriting),
            _ => None,
        }
    }
}

/// The conversational processes, the only ones with a message log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatProcess {
    ResearchExperiment,
    PaperWriting,
}

impl ChatProcess {
    pub fn kind(&self) -> ProcessKind {
        match self {
            ChatProcess::ResearchExperiment => ProcessKind::ResearchExperiment,
            ChatProcess::PaperWriting => ProcessKind::PaperWriting,
        }
    }

    pub fn slug(&self) -> &'static str {
        self.kind().slug()
    }

    pub fn display_name(&self) -> &'static str {
        self.kind().display_name()
    }
}

/// Sub-phases of the research & experiment process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ResearchDefinition,
    ExperimentDesign,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::ResearchDefinition => "research_definition",
            Phase::ExperimentDesign => "experiment_design",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "research_definition" => Some(Phase::ResearchDefinition),
            "experiment_design" => Some(Phase::ExperimentDesign),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Phase::ResearchDefinition => "Research Definition",
            Phase::ExperimentDesign => "Experiment Design",
        }
    }

    pub fn other(&self) -> Phase {
        match self {
            Phase::ResearchDefinition => Phase::ExperimentDesign,
            Phase::ExperimentDesign => Phase::ResearchDefinition,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub current_phase: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessMap {
    #[serde(default)]
    pub research_experiment: ProcessInfo,
    #[serde(default)]
    pub literature_organization: ProcessInfo,
    #[serde(default)]
    pub literature_search: ProcessInfo,
    #[serde(default)]
    pub paper_writing: ProcessInfo,
}

/// A project as listed by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub project_id: String,
    pub topic: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub research_definition_complete: bool,
    #[serde(default)]
    pub experiment_design_complete: bool,
    #[serde(default)]
    pub processes: ProcessMap,
}

impl ProjectSummary {
    /// Literature search and paper writing need both research definition and
    /// experiment design completed; the other two are always open.
    pub fn is_accessible(&self, kind: ProcessKind) -> bool {
        match kind {
            ProcessKind::ResearchExperiment | ProcessKind::LiteratureOrganization => true,
            ProcessKind::LiteratureSearch | ProcessKind::PaperWriting => {
                self.research_definition_complete && self.experiment_design_complete
            }
        }
    }

    /// What still has to be completed before `kind` unlocks.
    pub fn unlock_hint(&self, kind: ProcessKind) -> Option<String> {
        if self.is_accessible(kind) {
            return None;
        }

        let mut missing = Vec::new();
        if !self.research_definition_complete {
            missing.push(Phase::ResearchDefinition.display_name());
        }
        if !self.experiment_design_complete {
            missing.push(Phase::ExperimentDesign.display_name());
        }
        Some(format!("Complete {} to unlock", missing.join(" and ")))
    }

    pub fn current_phase(&self) -> Phase {
        self.processes
            .research_experiment
            .current_phase
            .as_deref()
            .and_then(Phase::from_str)
            .unwrap_or(Phase::ResearchDefinition)
    }

    pub fn is_phase_complete(&self, phase: Phase) -> bool {
        match phase {
            Phase::ResearchDefinition => self.research_definition_complete,
            Phase::ExperimentDesign => self.experiment_design_complete,
        }
    }
}

/// Result of completing the current research phase
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompletePhaseResponse {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub unlocked_process: Option<String>,
}

/// A paper from one of the literature processes
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaperEntry {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub r#abstract: String,
}

impl PaperEntry {
    /// "Smith, Jones et al. (2024)"
    pub fn byline(&self) -> String {
        let authors = match self.authors.len() {
            0 => "Unknown authors".to_string(),
            1 | 2 => self.authors.join(", "),
            _ => format!("{}, {} et al.", self.authors[0], self.authors[1]),
        };
        match self.year {
            Some(year) => format!("{} ({})", authors, year),
            None => authors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(rd: bool, ed: bool) -> ProjectSummary {
        ProjectSummary {
            project_id: "p1".to_string(),
            topic: "Lung CT screening".to_string(),
            created_at: String::new(),
            updated_at: String::new(),
            research_definition_complete: rd,
            experiment_design_complete: ed,
            processes: ProcessMap::default(),
        }
    }

    #[test]
    fn test_fresh_project_gating() {
        let p = project(false, false);
        assert!(p.is_accessible(ProcessKind::ResearchExperiment));
        assert!(p.is_accessible(ProcessKind::LiteratureOrganization));
        assert!(!p.is_accessible(ProcessKind::LiteratureSearch));
        assert!(!p.is_accessible(ProcessKind::PaperWriting));
        assert_eq!(
            p.unlock_hint(ProcessKind::PaperWriting).as_deref(),
            Some("Complete Research Definition and Experiment Design to unlock")
        );
    }

    #[test]
    fn test_one_flag_is_not_enough() {
        let p = project(true, false);
        assert!(!p.is_accessible(ProcessKind::PaperWriting));
        assert_eq!(
            p.unlock_hint(ProcessKind::LiteratureSearch).as_deref(),
            Some("Complete Experiment Design to unlock")
        );
        assert!(!project(false, true).is_accessible(ProcessKind::LiteratureSearch));
    }

    #[test]
    fn test_both_flags_unlock() {
        let p = project(true, true);
        for kind in ProcessKind::all() {
            assert!(p.is_accessible(kind));
            assert!(p.unlock_hint(kind).is_none());
        }
    }

    #[test]
    fn test_deserialize_listing_with_missing_fields() {
        let json = r#"{
            "project_id": "abc",
            "topic": "Topic",
            "research_definition_complete": true,
            "processes": {"research_experiment": {"status": "active", "current_phase": "experiment_design"}}
        }"#;
        let p: ProjectSummary = serde_json::from_str(json).unwrap();
        assert_eq!(p.current_phase(), Phase::ExperimentDesign);
        assert!(!p.experiment_design_complete);
        assert_eq!(p.processes.paper_writing.status, "");
    }

    #[test]
    fn test_chat_processes() {
        assert_eq!(ProcessKind::PaperWriting.as_chat(), Some(ChatProcess::PaperWriting));
        assert_eq!(ProcessKind::LiteratureSearch.as_chat(), None);
        assert_eq!(ChatProcess::ResearchExperiment.slug(), "research-experiment");
    }

    #[test]
    fn test_paper_byline() {
        let mut paper = PaperEntry {
            id: "paper_001".to_string(),
            title: "A study".to_string(),
            authors: vec!["Kim".into(), "Lee".into(), "Park".into()],
            year: Some(2024),
            source: "arXiv".to_string(),
            status: "completed".to_string(),
            r#abstract: String::new(),
        };
        assert_eq!(paper.byline(), "Kim, Lee et al. (2024)");
        paper.authors.truncate(1);
        paper.year = None;
        assert_eq!(paper.byline(), "Kim");
    }
}
