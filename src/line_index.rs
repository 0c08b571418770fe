use std::collections::HashMap;

use crate::error::NavigationError;
use crate::view::{DiffAccessor, RowHandle};

pub fn row_id(file: &str, line: u32) -> String {
    format!("{file}:{line}")
}

/// Memoised `(file, line)` to row lookups. Rows are tagged with `file:line` on first hit.
#[derive(Debug, Default)]
pub struct LineIndex {
    by_id: HashMap<String, RowHandle>,
}

impl LineIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line_element(
        &mut self,
        diff: &mut impl DiffAccessor,
        file: &str,
        line: u32,
    ) -> Result<RowHandle, NavigationError> {
        let id = row_id(file, line);
        if let Some(&handle) = self.by_id.get(&id) {
            if diff.row(handle).and_then(|r| r.id.as_deref()) == Some(id.as_str()) {
                return Ok(handle);
            }
            self.by_id.remove(&id);
        }

        let section = diff
            .find_file(file)
            .ok_or_else(|| NavigationError::DiffNotFound {
                file: file.to_string(),
            })?;
        let handle = diff
            .row_at(section, line)
            .ok_or_else(|| NavigationError::LineNotFound {
                file: file.to_string(),
                line,
            })?;

        if let Some(row) = diff.row_mut(handle) {
            // A row reached through two spellings of the same path keeps its first id.
            if row.id.is_none() {
                row.id = Some(id.clone());
            }
        }
        self.by_id.insert(id, handle);
        Ok(handle)
    }

    pub fn get(&self, file: &str, line: u32) -> Option<RowHandle> {
        self.by_id.get(&row_id(file, line)).copied()
    }

    /// Forgets every mapping; required whenever the diff is replaced.
    pub fn invalidate(&mut self) {
        self.by_id.clear();
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
