use crate::analysis::{ConflictKind, ConflictRecord, InterferenceNode};
use crate::error::NavigationError;
use crate::graph::class_name;
use crate::resolver::{self, ResolveMode};
use crate::view::DiffAccessor;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DedupKey {
    kind: Option<ConflictKind>,
    first: (String, u32),
    last: (String, u32),
}

fn dedup_key(record: &ConflictRecord, by_kind: bool) -> DedupKey {
    let end = |n: &InterferenceNode| (n.location.file.clone(), n.location.line);
    DedupKey {
        kind: by_kind.then_some(record.kind),
        first: end(record.first()),
        last: end(record.last()),
    }
}

/// Keeps the first record of every `(kind, first endpoint, last endpoint)` group, in order.
/// With `by_kind` off, records of different kinds at the same endpoints collapse too.
pub fn dedup(records: Vec<ConflictRecord>, by_kind: bool) -> Vec<ConflictRecord> {
    let mut seen = std::collections::HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(dedup_key(r, by_kind)))
        .collect()
}

/// Stable sort by first endpoint line, then last endpoint line.
pub fn sort(records: &mut [ConflictRecord]) {
    records.sort_by_key(|r| (r.first().location.line, r.last().location.line));
}

/// `label (kind)`.
pub fn title(record: &ConflictRecord) -> String {
    format!("{} ({})", record.label, record.kind)
}

/// `Class:line → Class:line`, when the first endpoint has a known location.
pub fn route(record: &ConflictRecord) -> Option<String> {
    if record.first().location.is_unknown() {
        return None;
    }
    let end = |n: &InterferenceNode| {
        let class = if n.location.class.is_empty() {
            class_name(&n.location.file).to_string()
        } else {
            n.location.class.clone()
        };
        format!("{class}:{}", n.location.line)
    };
    Some(format!("{} → {}", end(record.first()), end(record.last())))
}

#[derive(Debug, Clone)]
pub struct ConflictEntry {
    pub record: ConflictRecord,
    /// Shown next to the entry when the conflict could not be mapped onto the diff.
    pub error: Option<NavigationError>,
}

#[derive(Debug, Clone, Default)]
pub struct ConflictList {
    entries: Vec<ConflictEntry>,
    selected: Option<usize>,
}

impl ConflictList {
    pub fn new(records: Vec<ConflictRecord>, by_kind: bool) -> Self {
        let mut records = dedup(records, by_kind);
        sort(&mut records);
        ConflictList {
            entries: records
                .into_iter()
                .map(|record| ConflictEntry {
                    record,
                    error: None,
                })
                .collect(),
            selected: None,
        }
    }

    /// Fills in unknown endpoints from their innermost call site before dedup and sort,
    /// so both see real file/line pairs. Records that cannot be resolved keep their
    /// reported locations and carry the error.
    pub fn load(records: Vec<ConflictRecord>, diff: &impl DiffAccessor, by_kind: bool) -> Self {
        let mut failures = Vec::new();
        let records: Vec<ConflictRecord> = records
            .into_iter()
            .map(|record| {
                if !record.has_unknown_endpoint() {
                    return record;
                }
                match resolver::resolved(&record, ResolveMode::Shallow, diff) {
                    Ok(resolved) => resolved,
                    Err(err) => {
                        tracing::warn!(label = %record.label, %err, "conflict has no usable location");
                        failures.push((record.clone(), err));
                        record
                    }
                }
            })
            .collect();

        let mut list = Self::new(records, by_kind);
        for entry in &mut list.entries {
            if let Some((_, err)) = failures.iter().find(|(r, _)| *r == entry.record) {
                entry.error = Some(err.clone());
            }
        }
        list
    }

    pub fn entries(&self) -> &[ConflictEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&ConflictEntry> {
        self.entries.get(idx)
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_entry(&self) -> Option<&ConflictEntry> {
        self.selected.and_then(|i| self.entries.get(i))
    }

    /// Out-of-range indices select nothing.
    pub fn select(&mut self, idx: Option<usize>) -> Option<&ConflictEntry> {
        self.selected = idx.filter(|&i| i < self.entries.len());
        self.selected_entry()
    }

    pub fn set_error(&mut self, idx: usize, error: Option<NavigationError>) {
        if let Some(entry) = self.entries.get_mut(idx) {
            entry.error = error;
        }
    }
}
