use anyhow::{Context, Result, bail};

use crate::config::{AppConfig, GraphCli};
use crate::graph::GraphData;
use crate::session::Session;

pub fn run(config: &AppConfig, cli: GraphCli) -> Result<()> {
  let session = crate::list_cmd::load_session(config, &cli.pull)?;
  let graph = graph_for(&session, cli.conflict)?;
  let json = serde_json::to_string_pretty(&graph).context("encode graph")?;
  println!("{json}");
  Ok(())
}

fn graph_for(session: &Session, idx: usize) -> Result<GraphData> {
  let count = session.conflicts().len();
  if idx >= count {
    bail!("{} has {count} conflict(s); no conflict #{idx}", session.key);
  }
  session
    .graph(idx)
    .with_context(|| format!("build graph for conflict #{idx} of {}", session.key))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::analysis::AnalysisOutput;
  use crate::context::PullRequestKey;
  use crate::resolver::ResolveMode;
  use crate::session::SessionOptions;

  #[test]
  fn builds_graph_for_listed_conflict() {
    let output: AnalysisOutput = serde_json::from_value(serde_json::json!({
      "diff": "--- a/src/a/Main.java\n+++ b/src/a/Main.java\n@@ -1,2 +1,2 @@\n one\n-two\n+TWO\n",
      "events": [
        {"type": "CONFLICT", "label": "c", "body": {"interference": [
          {"type": "source", "location": {"file": "src/a/Main.java", "class": "a.Main", "line": 1}},
          {"type": "sink", "location": {"file": "src/a/Main.java", "class": "a.Main", "line": 2}}
        ]}}
      ]
    }))
    .unwrap();
    let session = Session::from_analysis(
      PullRequestKey::new("o", "r", 1),
      &output,
      SessionOptions {
        mode: ResolveMode::Deep,
        dedup_by_kind: true,
        context_lines: 3,
      },
    )
    .unwrap();

    let graph = graph_for(&session, 0).unwrap();
    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.edges[0].label, "Conflict");

    let err = graph_for(&session, 3).unwrap_err();
    assert_eq!(err.to_string(), "o/r#1 has 1 conflict(s); no conflict #3");
  }
}
