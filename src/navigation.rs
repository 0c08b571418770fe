use smallvec::SmallVec;

use crate::analysis::{Branch, ConflictRecord, Endpoint, InterferenceNode, ModifiedLineSet, class_to_path};
use crate::error::NavigationError;
use crate::line_index::LineIndex;
use crate::resolver::{self, ResolveMode, ResolvedLocation};
use crate::view::{DiffAccessor, EditKind, RowHandle, Style, edit_kind_of, path_matches};

pub const SOURCE_MARKER: &str = "→";
pub const SINK_MARKER: &str = "←";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveEndpoint {
    pub endpoint: Endpoint,
    pub row: RowHandle,
    pub file: String,
    pub line: u32,
    pub side: Option<Branch>,
    pub edit: EditKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveConflict {
    pub endpoints: SmallVec<[ActiveEndpoint; 3]>,
    /// Row the view scrolls to on selection.
    pub scroll_to: RowHandle,
    links: SmallVec<[(RowHandle, RowHandle); 3]>,
}

impl ActiveConflict {
    pub fn contains(&self, row: RowHandle) -> bool {
        self.endpoints.iter().any(|e| e.row == row)
    }

    pub fn endpoint(&self, endpoint: Endpoint) -> Option<&ActiveEndpoint> {
        self.endpoints.iter().find(|e| e.endpoint == endpoint)
    }

    /// Where activating `row` jumps to.
    pub fn link_target(&self, row: RowHandle) -> Option<RowHandle> {
        self.links.iter().find(|(from, _)| *from == row).map(|(_, to)| *to)
    }
}

#[derive(Debug)]
struct Applied {
    row: RowHandle,
    styles: SmallVec<[Style; 2]>,
    /// Side styles set before the selection, with their original positions.
    masked: SmallVec<[(usize, Style); 1]>,
    prior_gutter: Option<Option<String>>,
}

/// Owns the highlight state of the selected conflict and undoes it on the next selection.
#[derive(Debug, Default)]
pub struct Navigator {
    active: Option<ActiveConflict>,
    applied: Vec<Applied>,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&ActiveConflict> {
        self.active.as_ref()
    }

    /// Removes every style and marker put on the diff by the last selection. Safe to call twice.
    pub fn clear(&mut self, diff: &mut impl DiffAccessor) {
        for applied in self.applied.drain(..).rev() {
            let Some(row) = diff.row_mut(applied.row) else {
                continue;
            };
            for style in applied.styles {
                row.remove_style(style);
            }
            for (pos, style) in applied.masked {
                let pos = pos.min(row.styles.len());
                row.styles.insert(pos, style);
            }
            if let Some(gutter) = applied.prior_gutter {
                row.gutter = gutter;
            }
        }
        self.active = None;
    }

    /// Clears the previous selection, then resolves, locates and highlights every endpoint
    /// of `record`. Nothing is styled unless all endpoints are found.
    pub fn select(
        &mut self,
        record: &ConflictRecord,
        mode: ResolveMode,
        modified: &[ModifiedLineSet],
        diff: &mut impl DiffAccessor,
        index: &mut LineIndex,
    ) -> Result<&ActiveConflict, NavigationError> {
        self.clear(diff);

        let resolution = resolver::resolve(record, mode, diff)?;
        let mut endpoints: SmallVec<[ActiveEndpoint; 3]> = SmallVec::new();
        for resolved in resolution.endpoints() {
            let loc = &resolved.location;
            let row = index.line_element(diff, &loc.file, loc.line)?;
            let node = &record.chain[resolved.index];
            endpoints.push(ActiveEndpoint {
                endpoint: resolved.endpoint,
                row,
                file: loc.file.clone(),
                line: loc.line,
                side: side_of(node, loc, modified),
                edit: edit_kind_of(diff.styles_of(row)),
            });
        }

        for ep in &endpoints {
            let colour = match ep.side {
                Some(branch) => {
                    self.mask_sides(diff, ep.row);
                    Style::Side(branch, ep.edit)
                }
                None => Style::Highlight,
            };
            let marker = match ep.endpoint {
                Endpoint::First | Endpoint::Source1 | Endpoint::Source2 => SOURCE_MARKER,
                Endpoint::Last | Endpoint::Confluence => SINK_MARKER,
            };
            self.style_row(diff, ep.row, &[colour, Style::Active], Some(marker));
        }

        let links = links_for(&endpoints);
        let scroll_to = endpoints[0].row;
        tracing::debug!(
            label = %record.label,
            endpoints = endpoints.len(),
            "conflict highlighted"
        );
        Ok(&*self.active.insert(ActiveConflict {
            endpoints,
            scroll_to,
            links,
        }))
    }

    /// Follows the reciprocal link from an endpoint row and highlights the other end.
    /// The selection itself is left alone.
    pub fn jump_from(&mut self, diff: &mut impl DiffAccessor, row: RowHandle) -> Option<RowHandle> {
        let target = self.active.as_ref()?.link_target(row)?;
        self.style_row(diff, target, &[Style::Highlight], None);
        Some(target)
    }

    fn applied_for(&mut self, handle: RowHandle) -> &mut Applied {
        let pos = match self.applied.iter().position(|a| a.row == handle) {
            Some(pos) => pos,
            None => {
                self.applied.push(Applied {
                    row: handle,
                    styles: SmallVec::new(),
                    masked: SmallVec::new(),
                    prior_gutter: None,
                });
                self.applied.len() - 1
            }
        };
        &mut self.applied[pos]
    }

    /// Takes pre-existing side colours off `handle` so the endpoint's own side shows.
    fn mask_sides(&mut self, diff: &mut impl DiffAccessor, handle: RowHandle) {
        let Some(row) = diff.row_mut(handle) else {
            return;
        };
        let applied = self.applied_for(handle);
        let mut pos = 0;
        while pos < row.styles.len() {
            let style = row.styles[pos];
            if matches!(style, Style::Side(..)) && !applied.styles.contains(&style) {
                row.styles.remove(pos);
                applied.masked.push((pos + applied.masked.len(), style));
            } else {
                pos += 1;
            }
        }
    }

    fn style_row(
        &mut self,
        diff: &mut impl DiffAccessor,
        handle: RowHandle,
        styles: &[Style],
        marker: Option<&str>,
    ) {
        let Some(row) = diff.row_mut(handle) else {
            return;
        };
        let applied = self.applied_for(handle);
        for &style in styles {
            if row.add_style(style) {
                applied.styles.push(style);
            }
        }
        if let Some(marker) = marker {
            if applied.prior_gutter.is_none() {
                applied.prior_gutter = Some(row.gutter.take());
            }
            row.gutter = Some(marker.to_string());
        }
    }
}

/// The branch tag on the node wins; otherwise the innermost call site (or the resolved
/// location when there is no stack) is looked up in the modified line sets.
pub fn side_of(
    node: &InterferenceNode,
    resolved: &ResolvedLocation,
    modified: &[ModifiedLineSet],
) -> Option<Branch> {
    if node.branch.is_some() {
        return node.branch;
    }
    let (file, line) = match node.frames().first() {
        Some(frame) => (class_to_path(&frame.class), frame.line),
        None => (resolved.file.clone(), resolved.line),
    };
    modified
        .iter()
        .filter(|set| path_matches(&set.file.replace('\\', "/"), &file))
        .find_map(|set| set.side_of(line))
}

fn links_for(endpoints: &[ActiveEndpoint]) -> SmallVec<[(RowHandle, RowHandle); 3]> {
    let row = |e: Endpoint| endpoints.iter().find(|a| a.endpoint == e).map(|a| a.row);
    let mut links = SmallVec::new();
    if let (Some(first), Some(last)) = (row(Endpoint::First), row(Endpoint::Last)) {
        links.push((first, last));
        links.push((last, first));
    }
    if let (Some(s1), Some(s2), Some(c)) = (
        row(Endpoint::Source1),
        row(Endpoint::Source2),
        row(Endpoint::Confluence),
    ) {
        links.push((s1, c));
        links.push((s2, c));
        links.push((c, s1));
    }
    links
}
