use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use crate::view::{DiffAccessor, RowHandle};

pub const DEFAULT_CONTEXT_LINES: usize = 3;
pub const MIN_CONTEXT_LINES: usize = 0;
pub const MAX_CONTEXT_LINES: usize = 20;

pub fn clamp_context_lines(value: usize) -> usize {
    value.clamp(MIN_CONTEXT_LINES, MAX_CONTEXT_LINES)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    /// Sits above `anchor` and reveals the rows right above it.
    Up,
    /// Sits below `anchor` and reveals the rows right below it.
    Down,
}

/// An expand control next to a collapsed run. `anchor` is the visible row the control
/// is attached to; an `Up` control on a fully collapsed file uses the row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Boundary {
    pub anchor: usize,
    pub direction: Direction,
}

impl Boundary {
    pub fn up(anchor: usize) -> Self {
        Boundary {
            anchor,
            direction: Direction::Up,
        }
    }

    pub fn down(anchor: usize) -> Self {
        Boundary {
            anchor,
            direction: Direction::Down,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct FileState {
    boundaries: BTreeSet<Boundary>,
    viewed: bool,
}

/// Which rows of each file are shown, and the expand controls around the collapsed runs.
#[derive(Debug, Clone)]
pub struct Disclosure {
    context: usize,
    files: Vec<FileState>,
}

impl Disclosure {
    pub fn new(context: usize) -> Self {
        Disclosure {
            context: clamp_context_lines(context),
            files: Vec::new(),
        }
    }

    pub fn context(&self) -> usize {
        self.context
    }

    fn step(&self) -> usize {
        (2 * self.context).max(1)
    }

    /// Shows every row within `context` rows of a change and collapses the rest.
    /// Running it again starts over from the same state.
    pub fn initialize(&mut self, diff: &mut impl DiffAccessor) {
        let n = self.context;
        self.files = vec![FileState::default(); diff.file_count()];
        for file in 0..diff.file_count() {
            let rows = diff.rows_mut(file);
            let len = rows.len();
            let mut shown = vec![false; len];
            for idx in 0..len {
                if rows[idx].is_change() {
                    let end = (idx + n).min(len - 1);
                    for s in &mut shown[idx.saturating_sub(n)..=end] {
                        *s = true;
                    }
                }
            }
            for (row, shown) in rows.iter_mut().zip(shown) {
                row.hidden = !shown;
            }
            self.rebuild(diff, file);
        }
    }

    /// Re-derives the controls of `file` from its rows' hidden flags.
    fn rebuild(&mut self, diff: &impl DiffAccessor, file: usize) {
        let boundaries = derive_boundaries(diff, file);
        if let Some(state) = self.files.get_mut(file) {
            state.boundaries = boundaries;
        }
    }

    pub fn boundaries(&self, file: usize) -> impl Iterator<Item = Boundary> + '_ {
        self.files
            .get(file)
            .into_iter()
            .flat_map(|s| s.boundaries.iter().copied())
    }

    pub fn has_control(&self, file: usize, boundary: Boundary) -> bool {
        self.files
            .get(file)
            .is_some_and(|s| s.boundaries.contains(&boundary))
    }

    pub fn control_count(&self, file: usize) -> usize {
        self.files.get(file).map_or(0, |s| s.boundaries.len())
    }

    /// Reveals up to `2 * context` rows above the `Up` control at `anchor`. When the
    /// revealed span reaches the previous visible row the gap closes and both of its
    /// controls go away; otherwise the control moves up to the new edge.
    pub fn expand_up(
        &mut self,
        diff: &mut impl DiffAccessor,
        file: usize,
        anchor: usize,
    ) -> Option<RangeInclusive<usize>> {
        if !self.has_control(file, Boundary::up(anchor)) || anchor == 0 {
            tracing::debug!(file, anchor, "no expand-up control");
            return None;
        }
        let rows = diff.rows_mut(file);
        let anchor = anchor.min(rows.len());
        let mut lo = anchor - 1;
        while lo > 0 && rows[lo - 1].hidden {
            lo -= 1;
        }

        let target = anchor.saturating_sub(self.step());
        let state = &mut self.files[file];
        state.boundaries.remove(&Boundary::up(anchor));
        let revealed = if target <= lo {
            if lo > 0 {
                state.boundaries.remove(&Boundary::down(lo - 1));
            }
            lo..=anchor - 1
        } else {
            state.boundaries.insert(Boundary::up(target));
            target..=anchor - 1
        };
        for row in &mut rows[revealed.clone()] {
            row.hidden = false;
        }
        tracing::debug!(file, ?revealed, "expanded up");
        Some(revealed)
    }

    /// Mirror of [`Disclosure::expand_up`] for the `Down` control at `anchor`.
    pub fn expand_down(
        &mut self,
        diff: &mut impl DiffAccessor,
        file: usize,
        anchor: usize,
    ) -> Option<RangeInclusive<usize>> {
        let rows = diff.rows_mut(file);
        if !self.has_control(file, Boundary::down(anchor)) || anchor + 1 >= rows.len() {
            tracing::debug!(file, anchor, "no expand-down control");
            return None;
        }
        let len = rows.len();
        let mut hi = anchor + 1;
        while hi + 1 < len && rows[hi + 1].hidden {
            hi += 1;
        }

        let target = anchor + self.step();
        let state = &mut self.files[file];
        state.boundaries.remove(&Boundary::down(anchor));
        let revealed = if target >= hi {
            state.boundaries.remove(&Boundary::up(hi + 1));
            anchor + 1..=hi
        } else {
            state.boundaries.insert(Boundary::down(target));
            anchor + 1..=target
        };
        for row in &mut rows[revealed.clone()] {
            row.hidden = false;
        }
        tracing::debug!(file, ?revealed, "expanded down");
        Some(revealed)
    }

    /// Makes a navigation target visible along with its context window.
    pub fn reveal_row(&mut self, diff: &mut impl DiffAccessor, handle: RowHandle) {
        let n = self.context;
        let rows = diff.rows_mut(handle.file);
        if handle.row >= rows.len() {
            return;
        }
        let end = (handle.row + n).min(rows.len() - 1);
        let mut changed = false;
        for row in &mut rows[handle.row.saturating_sub(n)..=end] {
            changed |= row.hidden;
            row.hidden = false;
        }
        if let Some(state) = self.files.get_mut(handle.file) {
            state.viewed = false;
        }
        if changed {
            self.rebuild(diff, handle.file);
        }
    }

    pub fn is_viewed(&self, file: usize) -> bool {
        self.files.get(file).is_some_and(|s| s.viewed)
    }

    /// Hides or restores the whole file body; the row windowing underneath is untouched.
    pub fn toggle_viewed(&mut self, file: usize) -> bool {
        match self.files.get_mut(file) {
            Some(state) => {
                state.viewed = !state.viewed;
                state.viewed
            }
            None => false,
        }
    }

    pub fn is_visible(&self, diff: &impl DiffAccessor, handle: RowHandle) -> bool {
        !self.is_viewed(handle.file) && diff.row(handle).is_some_and(|r| !r.hidden)
    }

    pub fn visible_rows(&self, diff: &impl DiffAccessor, file: usize) -> Vec<usize> {
        if self.is_viewed(file) {
            return Vec::new();
        }
        diff.rows(file)
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.hidden)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Maximal runs of hidden rows, as inclusive index ranges.
pub fn collapsed_runs(diff: &impl DiffAccessor, file: usize) -> Vec<RangeInclusive<usize>> {
    let rows = diff.rows(file);
    let mut runs = Vec::new();
    let mut start = None;
    for (idx, row) in rows.iter().enumerate() {
        match (row.hidden, start) {
            (true, None) => start = Some(idx),
            (false, Some(s)) => {
                runs.push(s..=idx - 1);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push(s..=rows.len() - 1);
    }
    runs
}

fn derive_boundaries(diff: &impl DiffAccessor, file: usize) -> BTreeSet<Boundary> {
    let len = diff.rows(file).len();
    let mut out = BTreeSet::new();
    for run in collapsed_runs(diff, file) {
        let (a, b) = (*run.start(), *run.end());
        if a > 0 {
            out.insert(Boundary::down(a - 1));
        }
        if b + 1 < len || a == 0 {
            out.insert(Boundary::up(b + 1));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::RenderedDiff;
    use crate::view::tests::numbered_diff;

    fn visible_lines(d: &Disclosure, diff: &RenderedDiff) -> Vec<u32> {
        d.visible_rows(diff, 0)
            .into_iter()
            .filter_map(|i| diff.rows(0)[i].new_line)
            .collect()
    }

    fn assert_controls_consistent(d: &Disclosure, diff: &RenderedDiff) {
        let current: BTreeSet<Boundary> = d.boundaries(0).collect();
        assert_eq!(current, derive_boundaries(diff, 0));
    }

    #[test]
    fn initial_window_around_changes() {
        let mut diff = numbered_diff("A.java", 50, &[10, 30]);
        let mut d = Disclosure::new(3);
        d.initialize(&mut diff);

        let expected: Vec<u32> = (7..=13).chain(27..=33).collect();
        assert_eq!(visible_lines(&d, &diff), expected);

        // Lines 1-6, 14-26 and 34-50 stay collapsed.
        assert_eq!(collapsed_runs(&diff, 0), vec![0..=5, 13..=25, 33..=49]);
        let controls: Vec<Boundary> = d.boundaries(0).collect();
        assert_eq!(
            controls,
            vec![
                Boundary::up(6),
                Boundary::down(12),
                Boundary::up(26),
                Boundary::down(32),
            ]
        );
    }

    #[test]
    fn initialize_is_idempotent() {
        let mut diff = numbered_diff("A.java", 50, &[10, 30]);
        let mut d = Disclosure::new(3);
        d.initialize(&mut diff);
        d.expand_up(&mut diff, 0, 26).unwrap();
        d.initialize(&mut diff);
        assert_eq!(visible_lines(&d, &diff).len(), 14);
        assert_eq!(d.control_count(0), 4);
    }

    #[test]
    fn expand_up_moves_control_then_merges() {
        let mut diff = numbered_diff("A.java", 50, &[10, 30]);
        let mut d = Disclosure::new(3);
        d.initialize(&mut diff);
        let before = d.visible_rows(&diff, 0);

        assert_eq!(d.expand_up(&mut diff, 0, 26), Some(20..=25));
        let after = d.visible_rows(&diff, 0);
        assert!(before.iter().all(|r| after.contains(r)));
        assert!(after.len() > before.len());
        assert!(d.has_control(0, Boundary::up(20)));
        assert!(!d.has_control(0, Boundary::up(26)));
        assert_controls_consistent(&d, &diff);

        // Rows 13..=19 are left; 20 - 6 = 14 does not reach 13, so one more step.
        assert_eq!(d.expand_up(&mut diff, 0, 20), Some(14..=19));
        assert_eq!(d.expand_up(&mut diff, 0, 14), Some(13..=13));
        assert!(!d.has_control(0, Boundary::down(12)));
        assert_eq!(d.control_count(0), 2);
        assert_controls_consistent(&d, &diff);
    }

    #[test]
    fn expand_down_merges_when_span_reaches_next_run() {
        let mut diff = numbered_diff("A.java", 30, &[5, 18]);
        let mut d = Disclosure::new(3);
        d.initialize(&mut diff);
        assert_eq!(collapsed_runs(&diff, 0), vec![0..=0, 8..=13, 21..=29]);
        assert_eq!(d.expand_down(&mut diff, 0, 7), Some(8..=13));
        assert!(!d.has_control(0, Boundary::up(14)));
        assert_controls_consistent(&d, &diff);
    }

    #[test]
    fn expanding_past_file_edges_removes_controls() {
        let mut diff = numbered_diff("A.java", 12, &[6]);
        let mut d = Disclosure::new(1);
        d.initialize(&mut diff);
        assert_eq!(collapsed_runs(&diff, 0), vec![0..=3, 7..=11]);

        assert_eq!(d.expand_down(&mut diff, 0, 6), Some(7..=8));
        assert_eq!(d.expand_down(&mut diff, 0, 8), Some(9..=10));
        assert_eq!(d.expand_down(&mut diff, 0, 10), Some(11..=11));
        assert!(d.boundaries(0).all(|b| b.direction == Direction::Up));

        assert_eq!(d.expand_up(&mut diff, 0, 4), Some(2..=3));
        assert_eq!(d.expand_up(&mut diff, 0, 2), Some(0..=1));
        assert_eq!(d.control_count(0), 0);
        assert!(collapsed_runs(&diff, 0).is_empty());
        assert_eq!(d.expand_up(&mut diff, 0, 2), None);
    }

    #[test]
    fn file_without_changes_gets_a_single_control() {
        let mut diff = numbered_diff("A.java", 4, &[]);
        let mut d = Disclosure::new(3);
        d.initialize(&mut diff);
        assert_eq!(d.boundaries(0).collect::<Vec<_>>(), vec![Boundary::up(4)]);
        assert_eq!(d.expand_up(&mut diff, 0, 4), Some(0..=3));
        assert_eq!(d.control_count(0), 0);
    }

    #[test]
    fn zero_context_still_expands() {
        let mut diff = numbered_diff("A.java", 5, &[3]);
        let mut d = Disclosure::new(0);
        d.initialize(&mut diff);
        assert_eq!(visible_lines(&d, &diff), vec![3]);
        assert_eq!(d.expand_down(&mut diff, 0, 2), Some(3..=3));
    }

    #[test]
    fn viewed_toggle_restores_windowing() {
        let mut diff = numbered_diff("A.java", 50, &[10, 30]);
        let mut d = Disclosure::new(3);
        d.initialize(&mut diff);
        d.expand_up(&mut diff, 0, 26).unwrap();
        let before = d.visible_rows(&diff, 0);
        let controls: Vec<Boundary> = d.boundaries(0).collect();

        assert!(d.toggle_viewed(0));
        assert!(d.visible_rows(&diff, 0).is_empty());
        assert!(!d.is_visible(&diff, RowHandle { file: 0, row: 9 }));
        assert!(!d.toggle_viewed(0));
        assert_eq!(d.visible_rows(&diff, 0), before);
        assert_eq!(d.boundaries(0).collect::<Vec<_>>(), controls);
    }

    #[test]
    fn reveal_row_opens_collapsed_target() {
        let mut diff = numbered_diff("A.java", 50, &[10]);
        let mut d = Disclosure::new(3);
        d.initialize(&mut diff);
        d.toggle_viewed(0);
        let target = RowHandle { file: 0, row: 39 };
        d.reveal_row(&mut diff, target);
        assert!(d.is_visible(&diff, target));
        assert!(!d.is_viewed(0));
        assert_eq!(collapsed_runs(&diff, 0), vec![0..=5, 13..=35, 43..=49]);
        assert_controls_consistent(&d, &diff);
    }

    #[test]
    fn clamps_context() {
        assert_eq!(Disclosure::new(99).context(), MAX_CONTEXT_LINES);
        assert_eq!(clamp_context_lines(DEFAULT_CONTEXT_LINES), 3);
    }
}
