use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::analysis::{ConflictRecord, Endpoint, InterferenceNode};
use crate::error::NavigationError;
use crate::view::{DiffAccessor, path_matches};

/// How far down the call stack an endpoint is chased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveMode {
    /// The reported location, or the innermost call site when it is unknown.
    #[default]
    Shallow,
    /// The outermost call site that is part of the diff.
    Deep,
}

impl FromStr for ResolveMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shallow" => Ok(ResolveMode::Shallow),
            "deep" => Ok(ResolveMode::Deep),
            other => Err(format!("unknown view mode {other:?} (expected shallow or deep)")),
        }
    }
}

impl fmt::Display for ResolveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveMode::Shallow => f.write_str("shallow"),
            ResolveMode::Deep => f.write_str("deep"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    pub file: String,
    pub class: String,
    pub method: String,
    pub line: u32,
    /// Stack frame the location was taken from, `None` for the reported location.
    pub frame: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub endpoint: Endpoint,
    pub index: usize,
    pub location: ResolvedLocation,
}

/// Resolved locations for every navigable endpoint of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub mode: ResolveMode,
    endpoints: SmallVec<[ResolvedEndpoint; 3]>,
}

impl Resolution {
    pub fn endpoints(&self) -> &[ResolvedEndpoint] {
        &self.endpoints
    }

    pub fn location(&self, endpoint: Endpoint) -> Option<&ResolvedLocation> {
        self.endpoints
            .iter()
            .find(|e| e.endpoint == endpoint)
            .map(|e| &e.location)
    }

    /// Overwrites the resolved endpoints' file, class and line on `record`.
    pub fn apply_to(&self, record: &mut ConflictRecord) {
        for resolved in &self.endpoints {
            let Some(node) = record.chain.get_mut(resolved.index) else {
                continue;
            };
            node.location.file = resolved.location.file.clone();
            node.location.class = resolved.location.class.clone();
            node.location.line = resolved.location.line;
        }
    }
}

pub fn resolve_node(
    node: &InterferenceNode,
    endpoint: Endpoint,
    mode: ResolveMode,
    files: &[&str],
) -> Result<ResolvedLocation, NavigationError> {
    let frames = node.frames();
    let reported = || ResolvedLocation {
        file: node.location.normalized_file(),
        class: node.location.class.clone(),
        method: node.location.method.clone(),
        line: node.location.line,
        frame: None,
    };
    let from_frame = |idx: usize| {
        let frame = &frames[idx];
        ResolvedLocation {
            file: frame.file_path(),
            class: frame.class.clone(),
            method: frame.method.clone(),
            line: frame.line,
            frame: Some(idx),
        }
    };

    if frames.is_empty() {
        if node.location.is_unknown() {
            return Err(NavigationError::InvalidStackTrace {
                endpoint: endpoint.to_string(),
            });
        }
        return Ok(reported());
    }

    match mode {
        ResolveMode::Shallow if !node.location.is_unknown() => Ok(reported()),
        ResolveMode::Shallow => Ok(from_frame(0)),
        ResolveMode::Deep => {
            let hit = (0..frames.len()).rev().find(|&idx| {
                let path = frames[idx].file_path();
                files.iter().any(|name| path_matches(name, &path))
            });
            Ok(from_frame(hit.unwrap_or(0)))
        }
    }
}

/// Resolves every endpoint of `record` against the files of `diff` without touching the record.
pub fn resolve(
    record: &ConflictRecord,
    mode: ResolveMode,
    diff: &impl DiffAccessor,
) -> Result<Resolution, NavigationError> {
    let files = diff.list_files();
    let mut endpoints = SmallVec::new();
    for &endpoint in record.endpoints() {
        let index = record.endpoint_index(endpoint);
        let location = resolve_node(&record.chain[index], endpoint, mode, &files)?;
        endpoints.push(ResolvedEndpoint {
            endpoint,
            index,
            location,
        });
    }
    Ok(Resolution { mode, endpoints })
}

/// Copy of `record` with its endpoints resolved.
pub fn resolved(
    record: &ConflictRecord,
    mode: ResolveMode,
    diff: &impl DiffAccessor,
) -> Result<ConflictRecord, NavigationError> {
    let resolution = resolve(record, mode, diff)?;
    let mut copy = record.clone();
    resolution.apply_to(&mut copy);
    Ok(copy)
}
