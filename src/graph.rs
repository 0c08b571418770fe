use serde::Serialize;

use crate::analysis::{Branch, ConflictKind, ConflictRecord, Endpoint, ModifiedLineSet};
use crate::error::NavigationError;
use crate::navigation::side_of;
use crate::resolver::{self, Resolution, ResolveMode, ResolvedLocation};
use crate::view::DiffAccessor;

pub const NODE_SIZE: u32 = 15;
pub const NODE_COLOR: &str = "#FA4F40";
pub const LEFT_COLOR: &str = "#2DA44E";
pub const RIGHT_COLOR: &str = "#8250DF";
pub const TARGET_COLOR: &str = "#808080";
pub const EDGE_SIZE: u32 = 4;
pub const EDGE_COLOR_CALL: &str = "#000000";
pub const EDGE_COLOR_PRECEDES: &str = "#FACC4F";
pub const EDGE_COLOR_CONFLICT: &str = "#4F80FA";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelSide {
    Top,
    Bottom,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub method: String,
    pub color: &'static str,
    pub size: u32,
    pub position: Position,
    pub label_side: LabelSide,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub color: &'static str,
    pub label: &'static str,
    pub size: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphData {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl GraphData {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edges_labelled<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edges.iter().filter(move |e| e.label == label)
    }
}

/// `a/b/C.java` to `C`; other paths keep their last segment.
pub fn class_name(file: &str) -> &str {
    let base = file.rsplit('/').next().unwrap_or(file);
    base.strip_suffix(".java").unwrap_or(base)
}

/// `<a.B: void run(int)>` to `run(int)`; bare names get `()`.
pub fn method_name(signature: &str) -> String {
    let last = signature
        .split_whitespace()
        .last()
        .unwrap_or("")
        .trim_end_matches('>');
    if last.contains('(') {
        last.to_string()
    } else {
        format!("{last}()")
    }
}

/// Diff location a graph node label points to: `Class:line` becomes `Class.java` and `line`.
pub fn node_target(label: &str) -> Option<(String, u32)> {
    let head = label.split_whitespace().next()?;
    let (file, line) = head.rsplit_once(':')?;
    let line = line.parse().ok()?;
    let file = if file.ends_with(".java") {
        file.to_string()
    } else {
        format!("{file}.java")
    };
    Some((file, line))
}

#[derive(Debug, Clone)]
struct Point {
    label: String,
    method: String,
    color: &'static str,
}

impl Point {
    fn new(loc: &ResolvedLocation, color: &'static str) -> Self {
        Point {
            label: format!("{}:{}", class_name(&loc.file), loc.line),
            method: if loc.method.is_empty() {
                String::new()
            } else {
                method_name(&loc.method)
            },
            color,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Link {
    Precedes,
    Call,
    Kind(ConflictKind),
}

#[derive(Default)]
struct Builder {
    data: GraphData,
}

impl Builder {
    fn node(&mut self, point: &Point, x: f32, y: f32, label_side: LabelSide) -> usize {
        let id = self.data.nodes.len();
        self.data.nodes.push(GraphNode {
            id: id.to_string(),
            label: point.label.clone(),
            method: point.method.clone(),
            color: point.color,
            size: NODE_SIZE,
            position: Position { x, y },
            label_side,
            message: None,
        });
        id
    }

    fn edge(&mut self, from: usize, to: usize, link: Link) {
        let (color, label) = match link {
            Link::Precedes => (EDGE_COLOR_PRECEDES, "Precedes"),
            Link::Call => (EDGE_COLOR_CALL, "Call"),
            Link::Kind(kind) => (EDGE_COLOR_CONFLICT, kind.edge_label()),
        };
        self.data.edges.push(GraphEdge {
            from: from.to_string(),
            to: to.to_string(),
            color,
            label,
            size: EDGE_SIZE,
        });
    }
}

fn side_color(side: Option<Branch>) -> &'static str {
    match side {
        Some(Branch::Left) => LEFT_COLOR,
        Some(Branch::Right) => RIGHT_COLOR,
        None => NODE_COLOR,
    }
}

/// Logical graph of a conflict. `L`/`R` are the lines directly edited by each side (deep
/// resolution), `LC`/`RC` the lines involved in the conflict (shallow resolution); a pair
/// that coincides collapses into one node.
pub fn build(
    record: &ConflictRecord,
    diff: &impl DiffAccessor,
    modified: &[ModifiedLineSet],
) -> Result<GraphData, NavigationError> {
    let deep = resolver::resolve(record, ResolveMode::Deep, diff)?;
    let shallow = resolver::resolve(record, ResolveMode::Shallow, diff)?;

    let (left, right) = if record.kind.is_confluence() {
        (Endpoint::Source1, Endpoint::Source2)
    } else {
        (Endpoint::First, Endpoint::Last)
    };
    let point = |res: &Resolution, endpoint: Endpoint| -> Option<Point> {
        let loc = res.location(endpoint)?;
        let node = record.endpoint(endpoint);
        Some(Point::new(loc, side_color(side_of(node, loc, modified))))
    };
    let (Some(l), Some(r), Some(lc), Some(rc)) = (
        point(&deep, left),
        point(&deep, right),
        point(&shallow, left),
        point(&shallow, right),
    ) else {
        return Ok(GraphData::default());
    };

    let mut data = if record.kind.is_confluence() {
        let Some(target) = shallow.location(Endpoint::Confluence) else {
            return Ok(GraphData::default());
        };
        confluence_shape(&l, &r, &lc, &rc, &Point::new(target, TARGET_COLOR), record.kind)
    } else {
        pair_shape(&l, &r, &lc, &rc, record.kind)
    };

    if let Some(vars) = record.variables() {
        let conflict_label = record.kind.edge_label();
        let ends = data
            .edges
            .iter()
            .find(|e| e.label == conflict_label)
            .map(|e| (e.from.clone(), e.to.clone()));
        if let Some((from, to)) = ends {
            for node in &mut data.nodes {
                if node.id == from {
                    node.message = Some(format!("assigns {}", vars.assigned));
                } else if node.id == to {
                    node.message = Some(format!("uses {}", vars.used));
                }
            }
        }
    }
    Ok(data)
}

fn pair_shape(l: &Point, r: &Point, lc: &Point, rc: &Point, kind: ConflictKind) -> GraphData {
    let mut g = Builder::default();
    let left_same = l.label == lc.label;
    let right_same = r.label == rc.label;
    let edge = Link::Kind(kind);

    match (left_same, right_same) {
        (true, true) => {
            let nl = g.node(l, 0.0, 0.0, LabelSide::Top);
            let nr = g.node(r, 1.0, 0.0, LabelSide::Right);
            g.edge(nl, nr, edge);
        }
        (true, false) => {
            let nl = g.node(l, 0.0, 0.0, LabelSide::Top);
            let nr = g.node(r, 0.0, -1.0, LabelSide::Bottom);
            let nrc = g.node(rc, 1.0, -1.0, LabelSide::Right);
            g.edge(nl, nr, Link::Precedes);
            g.edge(nl, nrc, edge);
            g.edge(nr, nrc, Link::Call);
        }
        (false, true) => {
            let nl = g.node(l, 0.0, 0.0, LabelSide::Top);
            let nr = g.node(r, 0.0, -1.0, LabelSide::Bottom);
            let nlc = g.node(lc, 1.0, 0.0, LabelSide::Right);
            g.edge(nl, nr, Link::Precedes);
            g.edge(nl, nlc, Link::Call);
            g.edge(nlc, nr, edge);
        }
        (false, false) => {
            let nl = g.node(l, 0.0, 0.0, LabelSide::Top);
            let nr = g.node(r, 0.0, -1.0, LabelSide::Bottom);
            let nlc = g.node(lc, 1.0, 0.0, LabelSide::Right);
            let nrc = g.node(rc, 1.0, -1.0, LabelSide::Right);
            g.edge(nl, nr, Link::Precedes);
            g.edge(nl, nlc, Link::Call);
            g.edge(nr, nrc, Link::Call);
            g.edge(nlc, nrc, edge);
        }
    }
    g.data
}

fn confluence_shape(
    l: &Point,
    r: &Point,
    lc: &Point,
    rc: &Point,
    target: &Point,
    kind: ConflictKind,
) -> GraphData {
    let mut g = Builder::default();
    let cf = Link::Kind(kind);
    let nl = g.node(l, 0.0, 0.0, LabelSide::Top);
    let nr = g.node(r, 0.0, -1.0, LabelSide::Bottom);
    g.edge(nl, nr, Link::Precedes);

    let left_same = l.label == lc.label;
    let right_same = r.label == rc.label;
    let column = if left_same && right_same { 1.0 } else { 2.0 };

    let left_end = if left_same {
        nl
    } else {
        let n = g.node(lc, 1.0, 0.0, LabelSide::Right);
        g.edge(nl, n, Link::Call);
        n
    };
    let right_end = if right_same {
        nr
    } else {
        let n = g.node(rc, 1.0, -1.0, LabelSide::Right);
        g.edge(nr, n, Link::Call);
        n
    };
    if !left_same && !right_same {
        g.edge(left_end, right_end, Link::Precedes);
    }

    let nt = g.node(target, column, -0.5, LabelSide::Right);
    g.edge(left_end, nt, cf);
    g.edge(right_end, nt, cf);
    g.data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::{frame, node, record};
    use crate::analysis::{Scope, UNKNOWN_FILE};
    use crate::view::tests::numbered_diff;

    fn labels(edges: &[GraphEdge]) -> Vec<(&str, &str, &str)> {
        edges
            .iter()
            .map(|e| (e.from.as_str(), e.to.as_str(), e.label))
            .collect()
    }

    /// Endpoint whose innermost frame is `inner` and outermost (in the diff) is `outer`.
    fn traced(inner: (&str, u32), outer: (&str, u32)) -> crate::analysis::InterferenceNode {
        let mut n = node(UNKNOWN_FILE, 0);
        n.stack_trace = Some(vec![frame(inner.0, inner.1), frame(outer.0, outer.1)]);
        n
    }

    #[test]
    fn label_helpers() {
        assert_eq!(class_name("src/main/java/a/Main.java"), "Main");
        assert_eq!(class_name("docs/README.md"), "README.md");
        assert_eq!(method_name("<a.B: void run(int)>"), "run(int)");
        assert_eq!(method_name("main"), "main()");
        assert_eq!(method_name("main()"), "main()");
        assert_eq!(node_target("Main:12 extra"), Some(("Main.java".to_string(), 12)));
        assert_eq!(node_target("Main.java:3"), Some(("Main.java".to_string(), 3)));
        assert_eq!(node_target("Main"), None);
    }

    #[test]
    fn coinciding_pair_has_two_nodes() {
        let diff = numbered_diff("src/Main.java", 30, &[]);
        let rec = record(
            ConflictKind::ObjectAssignment(Scope::Intra),
            vec![node("src/Main.java", 3), node("src/Main.java", 9)],
        );
        let g = build(&rec, &diff, &[]).unwrap();
        assert_eq!(g.nodes.len(), 2);
        assert_eq!(g.nodes[0].label, "Main:3");
        assert_eq!(g.nodes[0].color, NODE_COLOR);
        assert_eq!(labels(&g.edges), vec![("0", "1", "OA")]);
    }

    #[test]
    fn divergent_pair_has_four_nodes() {
        let diff = numbered_diff("src/main/java/app/Main.java", 60, &[]);
        let rec = record(
            ConflictKind::DataFlow(Scope::Inter),
            vec![
                traced(("lib.Store", 4), ("app.Main", 20)),
                traced(("lib.Store", 8), ("app.Main", 40)),
            ],
        );
        let g = build(&rec, &diff, &[]).unwrap();
        let node_labels: Vec<&str> = g.nodes.iter().map(|n| n.label.as_str()).collect();
        assert_eq!(node_labels, vec!["Main:20", "Main:40", "Store:4", "Store:8"]);
        assert_eq!(
            labels(&g.edges),
            vec![
                ("0", "1", "Precedes"),
                ("0", "2", "Call"),
                ("1", "3", "Call"),
                ("2", "3", "DF"),
            ]
        );
        assert_eq!(g.node("3").unwrap().label_side, LabelSide::Right);
    }

    #[test]
    fn right_only_divergence_has_three_nodes() {
        let diff = numbered_diff("src/main/java/app/Main.java", 60, &[]);
        let rec = record(
            ConflictKind::Conflict,
            vec![
                node("src/main/java/app/Main.java", 5),
                traced(("lib.Store", 8), ("app.Main", 40)),
            ],
        );
        let g = build(&rec, &diff, &[]).unwrap();
        assert_eq!(g.nodes.len(), 3);
        assert_eq!(
            labels(&g.edges),
            vec![("0", "1", "Precedes"), ("0", "2", "Conflict"), ("1", "2", "Call")]
        );
    }

    #[test]
    fn confluence_shapes() {
        let diff = numbered_diff("src/main/java/app/Main.java", 60, &[]);
        let target = node("src/main/java/app/Main.java", 50);
        let three = record(
            ConflictKind::Confluence(Scope::Intra),
            vec![
                node("src/main/java/app/Main.java", 5),
                node("src/main/java/app/Main.java", 6),
                target.clone(),
            ],
        );
        let g = build(&three, &diff, &[]).unwrap();
        assert_eq!(g.nodes.len(), 3);
        assert_eq!(g.nodes[2].color, TARGET_COLOR);
        assert_eq!(
            labels(&g.edges),
            vec![("0", "1", "Precedes"), ("0", "2", "CF"), ("1", "2", "CF")]
        );

        let five = record(
            ConflictKind::Confluence(Scope::Inter),
            vec![
                traced(("lib.A", 1), ("app.Main", 10)),
                traced(("lib.B", 2), ("app.Main", 20)),
                target,
            ],
        );
        let g = build(&five, &diff, &[]).unwrap();
        assert_eq!(g.nodes.len(), 5);
        assert_eq!(g.edges_labelled("CF").count(), 2);
        assert_eq!(g.edges_labelled("Precedes").count(), 2);
        assert_eq!(g.edges_labelled("Call").count(), 2);
        assert_eq!(g.nodes[4].position, Position { x: 2.0, y: -0.5 });
    }

    #[test]
    fn variables_and_side_colours_annotate_nodes() {
        let diff = numbered_diff("src/Main.java", 30, &[]);
        let mut left = node("src/Main.java", 3);
        left.branch = Some(Branch::Left);
        let mut right = node("src/Main.java", 9);
        right.branch = Some(Branch::Right);
        let mut rec = record(ConflictKind::ObjectAssignment(Scope::Inter), vec![left, right]);
        rec.description = "<total> overwritten".to_string();

        let g = build(&rec, &diff, &[]).unwrap();
        assert_eq!(g.nodes[0].color, LEFT_COLOR);
        assert_eq!(g.nodes[1].color, RIGHT_COLOR);
        assert_eq!(g.nodes[0].message.as_deref(), Some("assigns total"));
        assert_eq!(g.nodes[1].message.as_deref(), Some("uses total"));

        let json = serde_json::to_value(&g).unwrap();
        assert_eq!(json["nodes"][0]["labelSide"], "top");
        assert_eq!(json["nodes"][0]["position"]["x"], 0.0);
        assert_eq!(json["edges"][0]["from"], "0");
    }

    #[test]
    fn unresolvable_endpoint_is_an_error() {
        let diff = numbered_diff("A.java", 3, &[]);
        let rec = record(
            ConflictKind::Conflict,
            vec![node(UNKNOWN_FILE, 0), node("A.java", 1)],
        );
        assert!(matches!(
            build(&rec, &diff, &[]),
            Err(NavigationError::InvalidStackTrace { .. })
        ));
    }
}
