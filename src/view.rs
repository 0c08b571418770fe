use anyhow::Result;
use smallvec::SmallVec;

use crate::analysis::{Branch, ModifiedLineSet};
use crate::diff::{self, FileDiff, Kind};

/// Edit kind of a row as far as colouring is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditKind {
    Insertion,
    Deletion,
    Unmodified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Style {
    Insertion,
    Deletion,
    /// Part of a removal run immediately replaced by an addition run.
    Changed,
    /// Merge side responsible for the row.
    Side(Branch, EditKind),
    Highlight,
    /// Row belongs to the currently selected conflict.
    Active,
}

pub type StyleSet = SmallVec<[Style; 4]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowHandle {
    pub file: usize,
    pub row: usize,
}

#[derive(Debug, Clone)]
pub struct Row {
    pub kind: Kind,
    pub old_line: Option<u32>,
    pub new_line: Option<u32>,
    pub text: String,
    pub styles: StyleSet,
    pub hidden: bool,
    /// Stable `file:line` identifier, assigned by the line index on first lookup.
    pub id: Option<String>,
    /// Replaces the old-side line number in the gutter while set.
    pub gutter: Option<String>,
}

impl Row {
    fn from_line(line: diff::Line) -> Self {
        let mut styles = StyleSet::new();
        match line.kind {
            Kind::Add => styles.push(Style::Insertion),
            Kind::Remove => styles.push(Style::Deletion),
            Kind::HunkHeader | Kind::Context => {}
        }
        Row {
            kind: line.kind,
            old_line: line.old_line,
            new_line: line.new_line,
            text: line.text,
            styles,
            hidden: false,
            id: None,
            gutter: None,
        }
    }

    pub fn has(&self, style: Style) -> bool {
        self.styles.contains(&style)
    }

    pub fn add_style(&mut self, style: Style) -> bool {
        if self.has(style) {
            return false;
        }
        self.styles.push(style);
        true
    }

    pub fn remove_style(&mut self, style: Style) {
        self.styles.retain(|s| *s != style);
    }

    /// Rows carrying an insertion or deletion marker drive the disclosure window.
    pub fn is_change(&self) -> bool {
        self.has(Style::Insertion) || self.has(Style::Deletion)
    }

    pub fn edit_kind(&self) -> EditKind {
        edit_kind_of(&self.styles)
    }

    pub fn old_label(&self) -> String {
        match (&self.gutter, self.old_line) {
            (Some(marker), _) => marker.clone(),
            (None, Some(n)) => n.to_string(),
            (None, None) => String::new(),
        }
    }

    pub fn side(&self) -> Option<(Branch, EditKind)> {
        self.styles.iter().find_map(|s| match s {
            Style::Side(branch, kind) => Some((*branch, *kind)),
            _ => None,
        })
    }
}

/// Changed rows count as insertions for colouring.
pub fn edit_kind_of(styles: &[Style]) -> EditKind {
    if styles.contains(&Style::Insertion) || styles.contains(&Style::Changed) {
        EditKind::Insertion
    } else if styles.contains(&Style::Deletion) {
        EditKind::Deletion
    } else {
        EditKind::Unmodified
    }
}

/// `display` names the same file as `path` when it ends with it on a path-segment boundary.
pub fn path_matches(display: &str, path: &str) -> bool {
    let display = display.trim();
    let path = path.trim().trim_start_matches("./");
    if path.is_empty() {
        return false;
    }
    display == path
        || display
            .strip_suffix(path)
            .is_some_and(|prefix| prefix.ends_with('/'))
}

/// Read/write access to a rendered diff: one section per file, each a sequence of rows.
pub trait DiffAccessor {
    fn list_files(&self) -> Vec<&str>;
    fn rows(&self, file: usize) -> &[Row];
    fn rows_mut(&mut self, file: usize) -> &mut [Row];

    fn file_count(&self) -> usize {
        self.list_files().len()
    }

    fn file_name(&self, file: usize) -> Option<&str> {
        self.list_files().get(file).copied()
    }

    fn find_file(&self, path: &str) -> Option<usize> {
        self.list_files()
            .iter()
            .position(|name| path_matches(name, path))
    }

    /// First row of `file` whose new-side line number is `line`.
    fn row_at(&self, file: usize, line: u32) -> Option<RowHandle> {
        self.rows(file)
            .iter()
            .position(|r| r.new_line == Some(line))
            .map(|row| RowHandle { file, row })
    }

    fn row(&self, handle: RowHandle) -> Option<&Row> {
        self.rows(handle.file).get(handle.row)
    }

    fn row_mut(&mut self, handle: RowHandle) -> Option<&mut Row> {
        self.rows_mut(handle.file).get_mut(handle.row)
    }

    fn styles_of(&self, handle: RowHandle) -> &[Style] {
        self.row(handle).map(|r| r.styles.as_slice()).unwrap_or(&[])
    }
}

#[derive(Debug, Clone)]
pub struct FileSection {
    pub name: String,
    pub rows: Vec<Row>,
}

/// In-memory rendering of a unified diff.
#[derive(Debug, Clone, Default)]
pub struct RenderedDiff {
    files: Vec<FileSection>,
    names: Vec<String>,
}

impl RenderedDiff {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(Self::from_files(diff::parse_unified(text)?))
    }

    pub fn from_files(files: Vec<FileDiff>) -> Self {
        let files: Vec<FileSection> = files
            .into_iter()
            .map(|f| {
                let name = f.display_name().to_string();
                let mut rows: Vec<Row> = f.lines.into_iter().map(Row::from_line).collect();
                mark_changed_runs(&mut rows);
                FileSection { name, rows }
            })
            .collect();
        let names = files.iter().map(|f| f.name.clone()).collect();
        RenderedDiff { files, names }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn sections(&self) -> &[FileSection] {
        &self.files
    }

    /// Attributes changed rows to the merge side that introduced them.
    /// Insertions are keyed by new-side number, deletions by old-side number.
    pub fn apply_modified_lines(&mut self, sets: &[ModifiedLineSet]) {
        for set in sets {
            let Some(file) = self.find_file(&set.file) else {
                tracing::debug!(file = %set.file, "modified lines for a file outside the diff");
                continue;
            };
            for row in &mut self.files[file].rows {
                let side = if row.has(Style::Insertion) {
                    row.new_line
                        .and_then(|n| set.added_by(n))
                        .map(|b| Style::Side(b, EditKind::Insertion))
                } else if row.has(Style::Deletion) {
                    row.old_line
                        .and_then(|n| set.removed_by(n))
                        .map(|b| Style::Side(b, EditKind::Deletion))
                } else {
                    None
                };
                if let Some(style) = side {
                    row.add_style(style);
                }
            }
        }
    }
}

fn mark_changed_runs(rows: &mut [Row]) {
    let mut i = 0;
    while i < rows.len() {
        if rows[i].kind != Kind::Remove {
            i += 1;
            continue;
        }
        let start = i;
        while i < rows.len() && rows[i].kind == Kind::Remove {
            i += 1;
        }
        let mid = i;
        while i < rows.len() && rows[i].kind == Kind::Add {
            i += 1;
        }
        if i > mid {
            for row in &mut rows[start..i] {
                row.add_style(Style::Changed);
            }
        }
    }
}

impl DiffAccessor for RenderedDiff {
    fn list_files(&self) -> Vec<&str> {
        self.names.iter().map(String::as_str).collect()
    }

    fn rows(&self, file: usize) -> &[Row] {
        self.files.get(file).map(|f| f.rows.as_slice()).unwrap_or(&[])
    }

    fn rows_mut(&mut self, file: usize) -> &mut [Row] {
        match self.files.get_mut(file) {
            Some(f) => f.rows.as_mut_slice(),
            None => &mut [],
        }
    }

    fn file_count(&self) -> usize {
        self.files.len()
    }

    fn file_name(&self, file: usize) -> Option<&str> {
        self.names.get(file).map(String::as_str)
    }
}
