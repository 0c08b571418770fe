use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ModelError;

/// File name the analysis emits when it could not map a node to a source file.
pub const UNKNOWN_FILE: &str = "UNKNOWN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Branch {
    #[serde(rename = "L")]
    Left,
    #[serde(rename = "R")]
    Right,
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::Left => f.write_str("left"),
            Branch::Right => f.write_str("right"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Intra,
    Inter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictKind {
    ObjectAssignment(Scope),
    DataFlow(Scope),
    Conflict,
    Confluence(Scope),
}

impl ConflictKind {
    /// Parses the upstream type tag (`"OA INTER"`, `"DF INTRA"`, `"CONFLICT"`, `"CONFLUENCE INTER"`, ...).
    pub fn parse(tag: &str) -> Result<Self, ModelError> {
        let upper = tag.trim().to_ascii_uppercase().replace(['-', '_'], " ");
        let scope = if upper.contains("INTER") && !upper.contains("INTRA") {
            Scope::Inter
        } else {
            Scope::Intra
        };

        if upper.starts_with("CONFLUENCE") {
            Ok(ConflictKind::Confluence(scope))
        } else if upper.starts_with("OA") {
            Ok(ConflictKind::ObjectAssignment(scope))
        } else if upper.starts_with("DF") || upper.starts_with("DATAFLOW") {
            Ok(ConflictKind::DataFlow(scope))
        } else if upper.starts_with("CONFLICT") {
            Ok(ConflictKind::Conflict)
        } else {
            Err(ModelError::UnknownKind(tag.to_string()))
        }
    }

    pub fn is_confluence(self) -> bool {
        matches!(self, ConflictKind::Confluence(_))
    }

    pub fn min_chain_len(self) -> usize {
        if self.is_confluence() { 3 } else { 2 }
    }

    /// Short tag used on the conflict-relationship edge of the graph.
    pub fn edge_label(self) -> &'static str {
        match self {
            ConflictKind::ObjectAssignment(_) => "OA",
            ConflictKind::DataFlow(_) => "DF",
            ConflictKind::Conflict => "Conflict",
            ConflictKind::Confluence(_) => "CF",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = |s: &Scope| match s {
            Scope::Intra => "INTRA",
            Scope::Inter => "INTER",
        };
        match self {
            ConflictKind::ObjectAssignment(s) => write!(f, "OA {}", scope(s)),
            ConflictKind::DataFlow(s) => write!(f, "DF {}", scope(s)),
            ConflictKind::Conflict => f.write_str("CONFLICT"),
            ConflictKind::Confluence(s) => write!(f, "CONFLUENCE {}", scope(s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Source,
    Sink,
    Declaration,
    Override,
    Source1,
    Source2,
    Confluence,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub method: String,
    #[serde(deserialize_with = "lenient_line")]
    pub line: u32,
}

/// The analysis reports unmapped lines as negative numbers.
fn lenient_line<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let n = i64::deserialize(deserializer)?;
    Ok(u32::try_from(n).unwrap_or(0))
}

impl Location {
    pub fn is_unknown(&self) -> bool {
        self.file == UNKNOWN_FILE
    }

    /// File path with Windows separators normalised.
    pub fn normalized_file(&self) -> String {
        self.file.replace('\\', "/")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub class: String,
    #[serde(default)]
    pub method: String,
    #[serde(deserialize_with = "lenient_line")]
    pub line: u32,
}

impl Frame {
    pub fn file_path(&self) -> String {
        class_to_path(&self.class)
    }
}

/// `a.b.C` (or `a.b.C$Inner`) to `a/b/C.java`.
pub fn class_to_path(class: &str) -> String {
    let outer = class.split('$').next().unwrap_or(class);
    format!("{}.java", outer.replace('.', "/"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterferenceNode {
    #[serde(rename = "type")]
    pub role: NodeRole,
    #[serde(default)]
    pub branch: Option<Branch>,
    #[serde(default)]
    pub text: String,
    pub location: Location,
    #[serde(default, rename = "stackTrace", skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<Vec<Frame>>,
}

impl InterferenceNode {
    pub fn frames(&self) -> &[Frame] {
        self.stack_trace.as_deref().unwrap_or(&[])
    }
}

/// Navigable endpoint of a conflict record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    First,
    Last,
    Source1,
    Source2,
    Confluence,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Endpoint::First => "first endpoint",
            Endpoint::Last => "last endpoint",
            Endpoint::Source1 => "source1",
            Endpoint::Source2 => "source2",
            Endpoint::Confluence => "confluence",
        };
        f.write_str(s)
    }
}

const PAIR_ENDPOINTS: [Endpoint; 2] = [Endpoint::First, Endpoint::Last];
const CONFLUENCE_ENDPOINTS: [Endpoint; 3] = [Endpoint::Source1, Endpoint::Source2, Endpoint::Confluence];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRecord {
    pub kind: ConflictKind,
    pub label: String,
    pub description: String,
    pub chain: Vec<InterferenceNode>,
}

/// Variable names embedded in a description as `<name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variables {
    pub assigned: String,
    pub used: String,
}

impl ConflictRecord {
    pub fn endpoints(&self) -> &'static [Endpoint] {
        if self.kind.is_confluence() {
            &CONFLUENCE_ENDPOINTS
        } else {
            &PAIR_ENDPOINTS
        }
    }

    pub fn endpoint_index(&self, endpoint: Endpoint) -> usize {
        let last = self.chain.len().saturating_sub(1);
        let tagged = |role: NodeRole| self.chain.iter().position(|n| n.role == role);
        match endpoint {
            Endpoint::First => 0,
            Endpoint::Last => last,
            Endpoint::Source1 => tagged(NodeRole::Source1).unwrap_or(0),
            Endpoint::Source2 => tagged(NodeRole::Source2).unwrap_or(1.min(last)),
            Endpoint::Confluence => tagged(NodeRole::Confluence).unwrap_or(last),
        }
    }

    pub fn endpoint(&self, endpoint: Endpoint) -> &InterferenceNode {
        &self.chain[self.endpoint_index(endpoint)]
    }

    pub fn first(&self) -> &InterferenceNode {
        self.endpoint(Endpoint::First)
    }

    pub fn last(&self) -> &InterferenceNode {
        self.endpoint(Endpoint::Last)
    }

    pub fn has_unknown_endpoint(&self) -> bool {
        self.endpoints()
            .iter()
            .any(|e| self.endpoint(*e).location.is_unknown())
    }

    /// Extracts `<name>` annotations from the description. The first is the assigned
    /// variable; the second (when present and not `unknown`) the used one.
    pub fn variables(&self) -> Option<Variables> {
        let mut names = Vec::new();
        let mut rest = self.description.as_str();
        while let Some(start) = rest.find('<') {
            let after = &rest[start + 1..];
            let Some(end) = after.find('>') else {
                break;
            };
            let name = after[..end].trim();
            let is_identifier = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '.'));
            // JVM constructor markers are not variables.
            if is_identifier && name != "init" && name != "clinit" {
                names.push(name.to_string());
            }
            rest = &after[end + 1..];
        }

        let mut names = names.into_iter();
        let assigned = names.next()?;
        let used = names
            .next()
            .filter(|n| n != "unknown")
            .unwrap_or_else(|| assigned.clone());
        Some(Variables { assigned, used })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawConflict {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub label: String,
    pub body: RawConflictBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawConflictBody {
    #[serde(default)]
    pub description: String,
    pub interference: Vec<InterferenceNode>,
}

impl TryFrom<RawConflict> for ConflictRecord {
    type Error = ModelError;

    fn try_from(raw: RawConflict) -> Result<Self, Self::Error> {
        let kind = ConflictKind::parse(&raw.kind)?;
        let len = raw.body.interference.len();
        if len < kind.min_chain_len() {
            return Err(ModelError::ShortChain {
                kind: raw.kind,
                len,
            });
        }
        Ok(ConflictRecord {
            kind,
            label: raw.label,
            description: raw.body.description,
            chain: raw.body.interference,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifiedLineSet {
    pub file: String,
    #[serde(default)]
    pub left_added: BTreeSet<u32>,
    #[serde(default)]
    pub left_removed: BTreeSet<u32>,
    #[serde(default)]
    pub right_added: BTreeSet<u32>,
    #[serde(default)]
    pub right_removed: BTreeSet<u32>,
}

impl ModifiedLineSet {
    pub fn side_of(&self, line: u32) -> Option<Branch> {
        if self.left_added.contains(&line) || self.left_removed.contains(&line) {
            Some(Branch::Left)
        } else if self.right_added.contains(&line) || self.right_removed.contains(&line) {
            Some(Branch::Right)
        } else {
            None
        }
    }

    pub fn added_by(&self, line: u32) -> Option<Branch> {
        if self.left_added.contains(&line) {
            Some(Branch::Left)
        } else if self.right_added.contains(&line) {
            Some(Branch::Right)
        } else {
            None
        }
    }

    pub fn removed_by(&self, line: u32) -> Option<Branch> {
        if self.left_removed.contains(&line) {
            Some(Branch::Left)
        } else if self.right_removed.contains(&line) {
            Some(Branch::Right)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisData {
    #[serde(default)]
    pub modified_lines: Vec<ModifiedLineSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutput {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub pull_number: u64,
    #[serde(default)]
    pub data: AnalysisData,
    #[serde(default)]
    pub events: Vec<RawConflict>,
    #[serde(default)]
    pub diff: String,
}

impl AnalysisOutput {
    pub fn diff_text(&self) -> &str {
        if !self.diff.is_empty() {
            return &self.diff;
        }
        self.data.diff.as_deref().unwrap_or("")
    }

    pub fn modified_lines(&self) -> &[ModifiedLineSet] {
        &self.data.modified_lines
    }

    /// Typed conflict records; events with an unsupported kind or a truncated chain are skipped.
    pub fn conflicts(&self) -> Vec<ConflictRecord> {
        self.events
            .iter()
            .cloned()
            .filter_map(|raw| match ConflictRecord::try_from(raw) {
                Ok(record) => Some(record),
                Err(err) => {
                    tracing::warn!(%err, "skipping analysis event");
                    None
                }
            })
            .collect()
    }
}
