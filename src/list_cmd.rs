use std::fmt::Write as _;

use anyhow::{Context, Result};

use crate::config::{AppConfig, ListCli};
use crate::conflicts;
use crate::context::PullRequestKey;
use crate::service::{self, AnalysisClient};
use crate::session::{Session, ViewStatus};

pub fn run(config: &AppConfig, cli: ListCli) -> Result<()> {
  let mut session = load_session(config, &cli.pull)?;
  print!("{}", render(&mut session));
  Ok(())
}

/// Fetches the analysis of `key` and builds its view.
pub(crate) fn load_session(config: &AppConfig, key: &PullRequestKey) -> Result<Session> {
  let options = config.session_options()?;
  let client = AnalysisClient::new(config.analysis_api.clone());
  let output = service::block_on(client.analysis(key))?
    .with_context(|| format!("fetch analysis for {key} from {}", client.base()))?;
  Session::from_analysis(key.clone(), &output, options)
}

/// One line per conflict, in list order, followed by its error when the conflict cannot be
/// placed on the diff under the session's view mode.
pub(crate) fn render(session: &mut Session) -> String {
  let mut out = String::new();
  match session.status() {
    ViewStatus::NoAnalysis => {
      let _ = writeln!(out, "No analysis found for {}.", session.key);
      return out;
    }
    ViewStatus::NoConflicts => {
      let _ = writeln!(out, "No dependencies found for {}.", session.key);
      return out;
    }
    ViewStatus::Ready => {}
  }

  let _ = writeln!(
    out,
    "{}: {} conflict(s), {} view",
    session.key,
    session.conflicts().len(),
    session.mode()
  );
  for idx in 0..session.conflicts().len() {
    // Selecting records the error on the entry.
    let _ = session.select(Some(idx));
    let Some(entry) = session.conflicts().get(idx) else {
      continue;
    };
    let _ = write!(out, "{idx:>3}  {}", conflicts::title(&entry.record));
    if let Some(route) = conflicts::route(&entry.record) {
      let _ = write!(out, "  {route}");
    }
    out.push('\n');
    if let Some(err) = &entry.error {
      let _ = writeln!(out, "     ! {err}");
    }
  }
  let _ = session.select(None);
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::analysis::AnalysisOutput;
  use crate::resolver::ResolveMode;
  use crate::session::SessionOptions;

  fn session(json: serde_json::Value) -> Session {
    let output: AnalysisOutput = serde_json::from_value(json).unwrap();
    Session::from_analysis(
      PullRequestKey::new("octo", "demo", 9),
      &output,
      SessionOptions {
        mode: ResolveMode::Shallow,
        dedup_by_kind: true,
        context_lines: 3,
      },
    )
    .unwrap()
  }

  #[test]
  fn renders_conflicts_with_errors() {
    let diff = "--- a/src/a/Main.java\n+++ b/src/a/Main.java\n@@ -1,3 +1,3 @@\n one\n-two\n+TWO\n three\n";
    let mut s = session(serde_json::json!({
      "diff": diff,
      "events": [
        {"type": "OA INTRA", "label": "Override", "body": {"interference": [
          {"type": "declaration", "location": {"file": "src/a/Main.java", "class": "a.Main", "line": 1}},
          {"type": "override", "location": {"file": "src/a/Main.java", "class": "a.Main", "line": 2}}
        ]}},
        {"type": "DF INTRA", "label": "Flow", "body": {"interference": [
          {"type": "source", "location": {"file": "src/a/Main.java", "class": "a.Main", "line": 3}},
          {"type": "sink", "location": {"file": "src/a/Main.java", "class": "a.Main", "line": 40}}
        ]}}
      ]
    }));
    let text = render(&mut s);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "octo/demo#9: 2 conflict(s), shallow view");
    assert_eq!(lines[1], "  0  Override (OA INTRA)  a.Main:1 → a.Main:2");
    assert_eq!(lines[2], "  1  Flow (DF INTRA)  a.Main:3 → a.Main:40");
    assert_eq!(lines[3], "     ! line 40 not found in file src/a/Main.java");
    assert!(s.active().is_none());
  }

  #[test]
  fn renders_empty_states() {
    let mut s = session(serde_json::json!({}));
    assert_eq!(render(&mut s), "No analysis found for octo/demo#9.\n");

    let mut s = session(serde_json::json!({"diff": "--- a/A.java\n+++ b/A.java\n@@ -1 +1 @@\n-a\n+b\n"}));
    assert_eq!(render(&mut s), "No dependencies found for octo/demo#9.\n");
  }
}
