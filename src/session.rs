use std::ops::RangeInclusive;

use anyhow::{Context, Result};

use crate::analysis::{AnalysisOutput, ModifiedLineSet};
use crate::conflicts::ConflictList;
use crate::context::PullRequestKey;
use crate::disclosure::{Boundary, Direction, Disclosure};
use crate::error::NavigationError;
use crate::graph::{self, GraphData};
use crate::line_index::LineIndex;
use crate::navigation::{ActiveConflict, Navigator};
use crate::resolver::ResolveMode;
use crate::view::{RenderedDiff, RowHandle};

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub mode: ResolveMode,
    pub dedup_by_kind: bool,
    pub context_lines: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewStatus {
    /// The analysis carried no diff.
    NoAnalysis,
    /// Diff present, nothing to navigate.
    NoConflicts,
    Ready,
}

/// Everything shown for one pull request. Built from a single analysis response and
/// thrown away when another pull request (or a reload) replaces it.
#[derive(Debug)]
pub struct Session {
    pub key: PullRequestKey,
    mode: ResolveMode,
    diff: RenderedDiff,
    index: LineIndex,
    disclosure: Disclosure,
    navigator: Navigator,
    conflicts: ConflictList,
    modified: Vec<ModifiedLineSet>,
}

impl Session {
    pub fn from_analysis(key: PullRequestKey, output: &AnalysisOutput, options: SessionOptions) -> Result<Self> {
        let mut diff = RenderedDiff::parse(output.diff_text())
            .with_context(|| format!("parse diff of {key}"))?;
        let modified = output.modified_lines().to_vec();
        diff.apply_modified_lines(&modified);

        let mut disclosure = Disclosure::new(options.context_lines);
        disclosure.initialize(&mut diff);

        let conflicts = ConflictList::load(output.conflicts(), &diff, options.dedup_by_kind);
        tracing::info!(
            pr = %key,
            files = diff.sections().len(),
            conflicts = conflicts.len(),
            "view ready"
        );
        Ok(Session {
            key,
            mode: options.mode,
            diff,
            index: LineIndex::new(),
            disclosure,
            navigator: Navigator::new(),
            conflicts,
            modified,
        })
    }

    pub fn status(&self) -> ViewStatus {
        if self.diff.is_empty() {
            ViewStatus::NoAnalysis
        } else if self.conflicts.is_empty() {
            ViewStatus::NoConflicts
        } else {
            ViewStatus::Ready
        }
    }

    pub fn diff(&self) -> &RenderedDiff {
        &self.diff
    }

    pub fn disclosure(&self) -> &Disclosure {
        &self.disclosure
    }

    pub fn conflicts(&self) -> &ConflictList {
        &self.conflicts
    }

    pub fn active(&self) -> Option<&ActiveConflict> {
        self.navigator.active()
    }

    pub fn mode(&self) -> ResolveMode {
        self.mode
    }

    /// Switches resolution mode and re-applies the current selection under it.
    pub fn set_mode(&mut self, mode: ResolveMode) -> Result<Option<RowHandle>, NavigationError> {
        self.mode = mode;
        self.select(self.conflicts.selected())
    }

    /// Moves the selection. Returns the row to scroll to; errors are also recorded on the entry.
    pub fn select(&mut self, idx: Option<usize>) -> Result<Option<RowHandle>, NavigationError> {
        let Some(entry) = self.conflicts.select(idx) else {
            self.navigator.clear(&mut self.diff);
            return Ok(None);
        };
        let record = entry.record.clone();
        let Some(idx) = self.conflicts.selected() else {
            return Ok(None);
        };
        tracing::debug!(idx, label = %record.label, mode = %self.mode, "select conflict");

        match self.navigator.select(
            &record,
            self.mode,
            &self.modified,
            &mut self.diff,
            &mut self.index,
        ) {
            Ok(active) => {
                let rows: Vec<RowHandle> = active.endpoints.iter().map(|e| e.row).collect();
                let scroll_to = active.scroll_to;
                for row in rows {
                    self.disclosure.reveal_row(&mut self.diff, row);
                }
                self.conflicts.set_error(idx, None);
                Ok(Some(scroll_to))
            }
            Err(err) => {
                tracing::warn!(idx, %err, "conflict cannot be shown");
                self.conflicts.set_error(idx, Some(err.clone()));
                Err(err)
            }
        }
    }

    /// Follows the link from one endpoint of the active conflict to its counterpart.
    pub fn jump_from(&mut self, row: RowHandle) -> Option<RowHandle> {
        let target = self.navigator.jump_from(&mut self.diff, row)?;
        self.disclosure.reveal_row(&mut self.diff, target);
        Some(target)
    }

    pub fn expand(&mut self, file: usize, boundary: Boundary) -> Option<RangeInclusive<usize>> {
        match boundary.direction {
            Direction::Up => self.disclosure.expand_up(&mut self.diff, file, boundary.anchor),
            Direction::Down => self
                .disclosure
                .expand_down(&mut self.diff, file, boundary.anchor),
        }
    }

    pub fn toggle_viewed(&mut self, file: usize) -> bool {
        self.disclosure.toggle_viewed(file)
    }

    pub fn graph(&self, idx: usize) -> Result<GraphData, NavigationError> {
        let Some(entry) = self.conflicts.get(idx) else {
            return Ok(GraphData::default());
        };
        graph::build(&entry.record, &self.diff, &self.modified)
    }

    /// Locates the diff row behind a graph node label and makes it visible.
    pub fn goto_graph_node(&mut self, label: &str) -> Result<RowHandle, NavigationError> {
        let (file, line) = graph::node_target(label).ok_or_else(|| NavigationError::DiffNotFound {
            file: label.to_string(),
        })?;
        let row = self.index.line_element(&mut self.diff, &file, line)?;
        self.disclosure.reveal_row(&mut self.diff, row);
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{DiffAccessor, Style};

    fn diff_text() -> String {
        let mut text = String::from(
            "diff --git a/src/main/java/app/Main.java b/src/main/java/app/Main.java\n\
             --- a/src/main/java/app/Main.java\n\
             +++ b/src/main/java/app/Main.java\n\
             @@ -1,40 +1,41 @@\n",
        );
        for n in 1..=41 {
            if n == 5 {
                text.push_str("+added\n");
            } else {
                text.push_str(&format!(" line {n}\n"));
            }
        }
        text
    }

    fn output() -> AnalysisOutput {
        let json = serde_json::json!({
            "owner": "octo",
            "repository": "demo",
            "pull_number": 1,
            "diff": diff_text(),
            "data": {"modifiedLines": [{"file": "src/main/java/app/Main.java", "leftAdded": [5]}]},
            "events": [
                {
                    "type": "OA INTER",
                    "label": "late",
                    "body": {
                        "description": "<x>",
                        "interference": [
                            {"type": "declaration", "location": {"file": "src/main/java/app/Main.java", "class": "app.Main", "method": "m", "line": 5}},
                            {"type": "override", "location": {"file": "src/main/java/app/Main.java", "class": "app.Main", "method": "m", "line": 35}}
                        ]
                    }
                },
                {
                    "type": "DF INTRA",
                    "label": "broken",
                    "body": {
                        "description": "",
                        "interference": [
                            {"type": "source", "location": {"file": "src/main/java/app/Main.java", "class": "app.Main", "method": "m", "line": 2}},
                            {"type": "sink", "location": {"file": "src/main/java/app/Other.java", "class": "app.Other", "method": "m", "line": 3}}
                        ]
                    }
                }
            ]
        });
        serde_json::from_value(json).unwrap()
    }

    fn session() -> Session {
        Session::from_analysis(
            PullRequestKey::new("octo", "demo", 1),
            &output(),
            SessionOptions {
                mode: ResolveMode::Shallow,
                dedup_by_kind: true,
                context_lines: 3,
            },
        )
        .unwrap()
    }

    #[test]
    fn selection_reveals_collapsed_endpoint() {
        let mut s = session();
        assert_eq!(s.status(), ViewStatus::Ready);
        // Sorted by first line: "broken" (2) before "late" (5).
        assert_eq!(s.conflicts().get(0).unwrap().record.label, "broken");

        let far = s.diff().row_at(0, 35).unwrap();
        assert!(!s.disclosure().is_visible(s.diff(), far));

        let scroll = s.select(Some(1)).unwrap().unwrap();
        assert_eq!(s.diff().row(scroll).unwrap().new_line, Some(5));
        assert!(s.disclosure().is_visible(s.diff(), far));
        assert!(s.diff().row(scroll).unwrap().has(Style::Active));

        assert_eq!(s.jump_from(scroll), Some(far));
        assert_eq!(s.jump_from(far), Some(scroll));
    }

    #[test]
    fn failing_selection_marks_entry_and_keeps_others_usable() {
        let mut s = session();
        let err = s.select(Some(0)).unwrap_err();
        assert_eq!(
            err,
            NavigationError::DiffNotFound {
                file: "src/main/java/app/Other.java".to_string()
            }
        );
        assert_eq!(s.conflicts().get(0).unwrap().error, Some(err));
        assert!(s.active().is_none());

        assert!(s.select(Some(1)).is_ok());
        assert!(s.active().is_some());

        s.select(None).unwrap();
        assert!(s.active().is_none());
        assert!(s.diff().rows(0).iter().all(|r| !r.has(Style::Active)));
    }

    #[test]
    fn graph_and_node_navigation() {
        let mut s = session();
        let g = s.graph(1).unwrap();
        assert_eq!(g.nodes.len(), 2);
        assert_eq!(g.nodes[1].label, "Main:35");

        let row = s.goto_graph_node(&g.nodes[1].label).unwrap();
        assert_eq!(s.diff().row(row).unwrap().new_line, Some(35));
        assert!(s.disclosure().is_visible(s.diff(), row));
        assert!(s.goto_graph_node("nonsense").is_err());
    }

    #[test]
    fn empty_diff_reports_no_analysis() {
        let out: AnalysisOutput = serde_json::from_str("{}").unwrap();
        let s = Session::from_analysis(
            PullRequestKey::new("o", "r", 1),
            &out,
            SessionOptions {
                mode: ResolveMode::Deep,
                dedup_by_kind: false,
                context_lines: 3,
            },
        )
        .unwrap();
        assert_eq!(s.status(), ViewStatus::NoAnalysis);
    }
}
