use nexus_api::types::{Run, RunStatus, Stage};

/// Tracks which run the operator is looking at across run-list refreshes.
///
/// The list arrives newest-first from the backend. Selection is sticky:
/// a manual choice survives refreshes and run completion. The one thing
/// that overrides it is a run the operator has not seen before arriving
/// at the head of the list already running — a freshly triggered pipeline
/// always pulls focus.
#[derive(Debug, Default, Clone)]
pub struct RunSelector {
    selected: Option<String>,
    latest_seen: Option<String>,
}

impl RunSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile the selection against a fresh run list.
    pub fn observe(&mut self, runs: &[Run]) {
        // Drop a selection whose run vanished from the backend.
        if let Some(id) = &self.selected {
            if !runs.iter().any(|r| r.id == *id) {
                self.selected = None;
            }
        }

        if let Some(newest) = runs.first() {
            let is_new = self.latest_seen.as_deref() != Some(newest.id.as_str());
            if is_new && newest.status == RunStatus::Running {
                self.selected = Some(newest.id.clone());
            }
            self.latest_seen = Some(newest.id.clone());
        } else {
            self.latest_seen = None;
        }

        if self.selected.is_none() {
            self.selected = runs.first().map(|r| r.id.clone());
        }
    }

    /// Manual selection. No validation against the list; a bogus id is
    /// dropped on the next [`observe`](Self::observe).
    pub fn select(&mut self, id: impl Into<String>) {
        self.selected = Some(id.into());
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected_run<'a>(&self, runs: &'a [Run]) -> Option<&'a Run> {
        let id = self.selected.as_deref()?;
        runs.iter().find(|r| r.id == id)
    }
}

/// The run the review panel should show: the first run sitting in human
/// review with proposals attached, falling back to the newest run.
pub fn review_run(runs: &[Run]) -> Option<&Run> {
    runs.iter()
        .find(|r| r.current_stage == Some(Stage::HumanReview) && !r.diffs.is_empty())
        .or_else(|| runs.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_api::types::{DiffItem, DiffStatus};
    use serde_json::Value;

    fn run(id: &str, status: RunStatus) -> Run {
        Run {
            id: id.to_string(),
            name: format!("Sync: {id}"),
            status,
            current_stage: None,
            sources: vec![],
            nodes: vec![],
            diffs: vec![],
            created_at: None,
        }
    }

    fn diff(id: &str) -> DiffItem {
        DiffItem {
            id: id.to_string(),
            title: String::new(),
            description: String::new(),
            platform: String::new(),
            author: String::new(),
            timestamp: String::new(),
            changes: vec![],
            status: DiffStatus::Pending,
            proposal: Value::Null,
            execution_result: None,
            old_state: None,
        }
    }

    #[test]
    fn defaults_to_newest_run() {
        let mut sel = RunSelector::new();
        sel.observe(&[run("b", RunStatus::Completed), run("a", RunStatus::Completed)]);
        assert_eq!(sel.selected(), Some("b"));
    }

    #[test]
    fn fresh_running_run_pulls_focus() {
        let mut sel = RunSelector::new();
        sel.observe(&[run("a", RunStatus::Running)]);
        assert_eq!(sel.selected(), Some("a"));

        // A new run appears at the head, already running.
        sel.observe(&[run("b", RunStatus::Running), run("a", RunStatus::Completed)]);
        assert_eq!(sel.selected(), Some("b"));
    }

    #[test]
    fn manual_selection_survives_completion_and_refreshes() {
        let mut sel = RunSelector::new();
        sel.observe(&[run("b", RunStatus::Completed), run("a", RunStatus::Running)]);
        sel.select("a");

        sel.observe(&[run("b", RunStatus::Completed), run("a", RunStatus::Completed)]);
        assert_eq!(sel.selected(), Some("a"));
    }

    #[test]
    fn known_head_does_not_steal_focus_when_it_starts_running() {
        let mut sel = RunSelector::new();
        sel.observe(&[run("b", RunStatus::Pending), run("a", RunStatus::Completed)]);
        sel.select("a");

        // Same head run transitions to running; the operator already saw
        // it, so their choice stands.
        sel.observe(&[run("b", RunStatus::Running), run("a", RunStatus::Completed)]);
        assert_eq!(sel.selected(), Some("a"));
    }

    #[test]
    fn vanished_selection_falls_back_to_newest() {
        let mut sel = RunSelector::new();
        sel.observe(&[run("a", RunStatus::Completed)]);
        sel.select("a");

        sel.observe(&[run("b", RunStatus::Completed)]);
        assert_eq!(sel.selected(), Some("b"));
    }

    #[test]
    fn empty_list_clears_everything() {
        let mut sel = RunSelector::new();
        sel.observe(&[run("a", RunStatus::Running)]);
        sel.observe(&[]);
        assert_eq!(sel.selected(), None);
        assert!(sel.selected_run(&[]).is_none());
    }

    #[test]
    fn review_prefers_human_review_with_proposals() {
        let mut with_diffs = run("b", RunStatus::Running);
        with_diffs.current_stage = Some(Stage::HumanReview);
        with_diffs.diffs.push(diff("d1"));

        let mut empty_review = run("c", RunStatus::Running);
        empty_review.current_stage = Some(Stage::HumanReview);

        let runs = vec![run("a", RunStatus::Completed), empty_review, with_diffs];
        assert_eq!(review_run(&runs).unwrap().id, "b");

        let no_review = vec![run("a", RunStatus::Completed), run("z", RunStatus::Pending)];
        assert_eq!(review_run(&no_review).unwrap().id, "a");
    }
}
