//! Sidebar model: projects, each expandable into its four processes.

use std::collections::HashSet;

use crate::project::{ProcessKind, ProjectSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeRow {
    Project { index: usize, expanded: bool },
    Process { project: usize, kind: ProcessKind, locked: bool },
}

#[derive(Debug, Default)]
pub struct ProjectTree {
    projects: Vec<ProjectSummary>,
    expanded: HashSet<String>,
    selected: usize,
}

impl ProjectTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn projects(&self) -> &[ProjectSummary] {
        &self.projects
    }

    pub fn project(&self, project_id: &str) -> Option<&ProjectSummary> {
        self.projects.iter().find(|p| p.project_id == project_id)
    }

    /// Replace the project list, keeping the selection on the same row
    /// (same project, same process) when it still exists.
    pub fn set_projects(&mut self, projects: Vec<ProjectSummary>) {
        let anchor = self.selected_key();

        self.projects = projects;
        let ids: HashSet<&str> = self.projects.iter().map(|p| p.project_id.as_str()).collect();
        self.expanded.retain(|id| ids.contains(id.as_str()));

        self.selected = anchor
            .and_then(|(id, kind)| self.position_of(&id, kind))
            .unwrap_or(0);
        self.clamp_selection();
    }

    /// Swap in a fresh copy of one project. Returns false when the project
    /// is not listed.
    pub fn update_project(&mut self, project: ProjectSummary) -> bool {
        match self.projects.iter_mut().find(|p| p.project_id == project.project_id) {
            Some(slot) => {
                *slot = project;
                true
            }
            None => false,
        }
    }

    pub fn rows(&self) -> Vec<TreeRow> {
        let mut rows = Vec::new();
        for (index, project) in self.projects.iter().enumerate() {
            let expanded = self.expanded.contains(&project.project_id);
            rows.push(TreeRow::Project { index, expanded });
            if expanded {
                for kind in ProcessKind::all() {
                    rows.push(TreeRow::Process {
                        project: index,
                        kind,
                        locked: !project.is_accessible(kind),
                    });
                }
            }
        }
        rows
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn selected_row(&self) -> Option<TreeRow> {
        self.rows().get(self.selected).copied()
    }

    /// Project owning the selected row
    pub fn selected_project(&self) -> Option<&ProjectSummary> {
        match self.selected_row()? {
            TreeRow::Project { index, .. } => self.projects.get(index),
            TreeRow::Process { project, .. } => self.projects.get(project),
        }
    }

    pub fn select_next(&mut self) {
        let len = self.rows().len();
        if len > 0 {
            self.selected = (self.selected + 1).min(len - 1);
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    /// Move the selection to a project/process pair, expanding as needed.
    pub fn select(&mut self, project_id: &str, kind: Option<ProcessKind>) -> bool {
        if kind.is_some() {
            self.expanded.insert(project_id.to_string());
        }
        match self.position_of(project_id, kind) {
            Some(pos) => {
                self.selected = pos;
                true
            }
            None => false,
        }
    }

    pub fn toggle_selected(&mut self) {
        if let Some(TreeRow::Project { index, expanded }) = self.selected_row() {
            let id = self.projects[index].project_id.clone();
            if expanded {
                self.expanded.remove(&id);
            } else {
                self.expanded.insert(id);
            }
        }
    }

    /// Collapse the selected project, or the parent of the selected process.
    pub fn collapse_selected(&mut self) {
        if let Some(project) = self.selected_project() {
            let id = project.project_id.clone();
            self.expanded.remove(&id);
            if let Some(pos) = self.position_of(&id, None) {
                self.selected = pos;
            }
        }
    }

    fn selected_key(&self) -> Option<(String, Option<ProcessKind>)> {
        match self.selected_row()? {
            TreeRow::Project { index, .. } => Some((self.projects[index].project_id.clone(), None)),
            TreeRow::Process { project, kind, .. } => {
                Some((self.projects[project].project_id.clone(), Some(kind)))
            }
        }
    }

    fn position_of(&self, project_id: &str, kind: Option<ProcessKind>) -> Option<usize> {
        self.rows().iter().position(|row| match (*row, kind) {
            (TreeRow::Project { index, .. }, None) => self.projects[index].project_id == project_id,
            (TreeRow::Process { project, kind: k, .. }, Some(want)) => {
                k == want && self.projects[project].project_id == project_id
            }
            _ => false,
        })
    }

    fn clamp_selection(&mut self) {
        let len = self.rows().len();
        self.selected = if len == 0 { 0 } else { self.selected.min(len - 1) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ProcessMap;

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
    fn test_collapsed_projects_show_one_row_each() {
        let mut tree = ProjectTree::new();
        tree.set_projects(vec![project("a", false), project("b", false)]);
        assert_eq!(tree.rows().len(), 2);
        assert_eq!(tree.selected_project().unwrap().project_id, "a");
    }

    #[test]
    fn test_expand_shows_processes_with_locks() {
        let mut tree = ProjectTree::new();
        tree.set_projects(vec![project("a", false)]);
        tree.toggle_selected();

        let rows = tree.rows();
        assert_eq!(rows.len(), 5);
        assert_eq!(
            rows[4],
            TreeRow::Process { project: 0, kind: ProcessKind::PaperWriting, locked: true }
        );
        assert_eq!(
            rows[2],
            TreeRow::Process { project: 0, kind: ProcessKind::LiteratureOrganization, locked: false }
        );
    }

    #[test]
    fn test_refresh_keeps_selection_and_updates_locks() {
        let mut tree = ProjectTree::new();
        tree.set_projects(vec![project("a", false), project("b", false)]);
        assert!(tree.select("b", Some(ProcessKind::PaperWriting)));

        tree.set_projects(vec![project("new", false), project("a", false), project("b", true)]);
        assert_eq!(
            tree.selected_row(),
            Some(TreeRow::Process { project: 2, kind: ProcessKind::PaperWriting, locked: false })
        );
    }

    #[test]
    fn test_update_project_unlocks_in_place() {
        let mut tree = ProjectTree::new();
        tree.set_projects(vec![project("a", false), project("b", false)]);
        tree.select("b", Some(ProcessKind::LiteratureSearch));
        assert_eq!(
            tree.selected_row(),
            Some(TreeRow::Process { project: 1, kind: ProcessKind::LiteratureSearch, locked: true })
        );

        assert!(tree.update_project(project("b", true)));
        assert_eq!(
            tree.selected_row(),
            Some(TreeRow::Process { project: 1, kind: ProcessKind::LiteratureSearch, locked: false })
        );
        assert!(!tree.update_project(project("missing", true)));
        assert_eq!(tree.projects().len(), 2);
    }

    #[test]
    fn test_refresh_drops_deleted_selection() {
        let mut tree = ProjectTree::new();
        tree.set_projects(vec![project("a", false), project("b", false)]);
        tree.select("b", None);
        tree.set_projects(vec![project("a", false)]);
        assert_eq!(tree.selected(), 0);
        assert_eq!(tree.selected_project().unwrap().project_id, "a");
    }

    #[test]
    fn test_navigation_bounds() {
        let mut tree = ProjectTree::new();
        tree.select_next();
        assert_eq!(tree.selected(), 0);

        tree.set_projects(vec![project("a", false), project("b", false)]);
        tree.select_prev();
        assert_eq!(tree.selected(), 0);
        tree.select_next();
        tree.select_next();
        assert_eq!(tree.selected(), 1);
    }

    #[test]
    fn test_collapse_from_process_row() {
        let mut tree = ProjectTree::new();
        tree.set_projects(vec![project("a", true), project("b", true)]);
        tree.select("b", Some(ProcessKind::LiteratureSearch));
        tree.collapse_selected();
        assert_eq!(tree.rows().len(), 2);
        assert_eq!(tree.selected_row(), Some(TreeRow::Project { index: 1, expanded: false }));
    }
}
