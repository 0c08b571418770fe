use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};

use crate::analysis::AnalysisOutput;
use crate::config::AppConfig;
use crate::context::{PullRequestKey, StaleGuard, Ticket};
use crate::disclosure::{Boundary, Direction};
use crate::error::ServiceError;
use crate::graph::GraphData;
use crate::resolver::ResolveMode;
use crate::service::AnalysisClient;
use crate::session::{Session, SessionOptions, ViewStatus};
use crate::view::{DiffAccessor, RowHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Focus {
  Conflicts,
  Diff,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LoadState {
  Loading,
  Failed(String),
  Loaded,
}

/// One line of the diff pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DisplayRow {
  File { file: usize },
  Control { file: usize, boundary: Boundary },
  Row(RowHandle),
}

#[derive(Debug, Clone)]
pub(crate) struct GraphPopup {
  pub(crate) conflict: usize,
  pub(crate) data: GraphData,
  pub(crate) selected: usize,
}

type FetchResult = (Ticket, Result<AnalysisOutput, ServiceError>);

/// Analysis requests run on their own thread so the terminal stays responsive; results
/// come back tagged with the ticket they were requested under.
struct Fetcher {
  requests: Sender<Ticket>,
  results: Receiver<FetchResult>,
}

impl Fetcher {
  fn spawn(client: AnalysisClient) -> Result<Self> {
    let (request_tx, request_rx) = mpsc::channel::<Ticket>();
    let (result_tx, result_rx) = mpsc::channel::<FetchResult>();
    let runtime = tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context("build tokio runtime")?;

    std::thread::Builder::new()
      .name("mergelens-fetch".to_string())
      .spawn(move || {
        while let Ok(ticket) = request_rx.recv() {
          let result = runtime.block_on(client.analysis(&ticket.key));
          if result_tx.send((ticket, result)).is_err() {
            break;
          }
        }
      })
      .context("spawn fetch thread")?;

    Ok(Self {
      requests: request_tx,
      results: result_rx,
    })
  }

  fn request(&self, ticket: Ticket) {
    if self.requests.send(ticket).is_err() {
      tracing::error!("fetch thread is gone");
    }
  }
}

pub fn run(config: &AppConfig, pulls: Vec<PullRequestKey>) -> Result<()> {
  if pulls.is_empty() {
    bail!("no pull request given; pass owner/repo#N or a GitHub pull-request URL");
  }
  let options = config.session_options()?;
  let fetcher = Fetcher::spawn(AnalysisClient::new(config.analysis_api.clone()))?;

  let mut ui = crate::ui::Ui::new()?;
  let mut app = App::new(pulls, options, fetcher);
  let res = app.run_loop(&mut ui);

  ui.restore().ok();
  res
}

/// Lays out the diff pane: a header per file, then its visible rows with the expand
/// controls placed next to the rows they are anchored to.
pub(crate) fn display_rows(session: &Session) -> Vec<DisplayRow> {
  let diff = session.diff();
  let disclosure = session.disclosure();
  let mut out = Vec::new();
  for (file, section) in diff.sections().iter().enumerate() {
    out.push(DisplayRow::File { file });
    if disclosure.is_viewed(file) {
      continue;
    }
    let owned: Vec<Boundary> = disclosure.boundaries(file).collect();
    let controls: &[Boundary] = &owned;
    let control_rows = move |anchor: usize, direction: Direction| {
      controls
        .iter()
        .filter(move |b| b.anchor == anchor && b.direction == direction)
        .map(move |&boundary| DisplayRow::Control { file, boundary })
    };
    for (idx, row) in section.rows.iter().enumerate() {
      out.extend(control_rows(idx, Direction::Up));
      if !row.hidden {
        out.push(DisplayRow::Row(RowHandle { file, row: idx }));
      }
      out.extend(control_rows(idx, Direction::Down));
    }
    out.extend(control_rows(section.rows.len(), Direction::Up));
  }
  out
}

pub(crate) struct App {
  options: SessionOptions,
  pulls: Vec<PullRequestKey>,
  pull_idx: usize,
  guard: StaleGuard,
  fetcher: Fetcher,
  load: LoadState,
  session: Option<Session>,
  display: Vec<DisplayRow>,
  focus: Focus,
  list_cursor: usize,
  list_scroll: usize,
  diff_cursor: usize,
  diff_scroll: usize,
  list_viewport: usize,
  diff_viewport: usize,
  graph: Option<GraphPopup>,
  show_help: bool,
  status: String,
}

impl App {
  fn new(pulls: Vec<PullRequestKey>, options: SessionOptions, fetcher: Fetcher) -> Self {
    let mut app = Self {
      options,
      pulls,
      pull_idx: 0,
      guard: StaleGuard::new(),
      fetcher,
      load: LoadState::Loading,
      session: None,
      display: Vec::new(),
      focus: Focus::Conflicts,
      list_cursor: 0,
      list_scroll: 0,
      diff_cursor: 0,
      diff_scroll: 0,
      list_viewport: 1,
      diff_viewport: 1,
      graph: None,
      show_help: false,
      status: String::new(),
    };
    app.open_pull(0);
    app
  }

  fn run_loop(&mut self, ui: &mut crate::ui::Ui) -> Result<()> {
    let tick_rate = Duration::from_millis(33);

    loop {
      self.poll_fetches();

      let size = ui.terminal.size().context("read terminal size")?;
      let rects = crate::ui::layout(ratatui::layout::Rect {
        x: 0,
        y: 0,
        width: size.width,
        height: size.height,
      });
      // Conflict entries take up to three lines each.
      self.list_viewport = (rects.conflicts.height.saturating_sub(2) / 3).max(1) as usize;
      self.diff_viewport = rects.diff.height.saturating_sub(2).max(1) as usize;
      self.ensure_list_visible();
      self.ensure_diff_visible();

      ui.terminal
        .draw(|f| {
          crate::ui::draw(
            f,
            crate::ui::DrawState {
              focus: self.focus,
              pulls: &self.pulls,
              pull_idx: self.pull_idx,
              load: &self.load,
              session: self.session.as_ref(),
              display: &self.display,
              list_cursor: self.list_cursor,
              list_scroll: self.list_scroll,
              diff_cursor: self.diff_cursor,
              diff_scroll: self.diff_scroll,
              graph: self.graph.as_ref(),
              status: &self.status,
              show_help: self.show_help,
            },
          )
        })
        .context("draw ui")?;

      if crossterm::event::poll(tick_rate).context("poll events")? {
        if let Event::Key(key) = crossterm::event::read().context("read event")? {
          if self.handle_key(key)? {
            break;
          }
        }
      }
    }

    Ok(())
  }

  fn poll_fetches(&mut self) {
    while let Ok((ticket, result)) = self.fetcher.results.try_recv() {
      self.apply_fetch(ticket, result);
    }
  }

  fn open_pull(&mut self, idx: usize) {
    let Some(key) = self.pulls.get(idx).cloned() else {
      return;
    };
    self.pull_idx = idx;
    self.session = None;
    self.display.clear();
    self.graph = None;
    self.load = LoadState::Loading;
    self.list_cursor = 0;
    self.list_scroll = 0;
    self.diff_cursor = 0;
    self.diff_scroll = 0;
    self.status = format!("Loading {key}");
    let ticket = self.guard.begin(key);
    self.fetcher.request(ticket);
  }

  fn apply_fetch(&mut self, ticket: Ticket, result: Result<AnalysisOutput, ServiceError>) {
    let Some(result) = self.guard.accept(&ticket, result) else {
      return;
    };
    let output = match result {
      Ok(output) => output,
      Err(err) => {
        tracing::warn!(pr = %ticket.key, %err, "analysis fetch failed");
        self.load = LoadState::Failed(err.to_string());
        self.status = format!("Could not load {}", ticket.key);
        return;
      }
    };
    match Session::from_analysis(ticket.key.clone(), &output, self.options) {
      Ok(session) => {
        self.status = match session.status() {
          ViewStatus::NoAnalysis => format!("No analysis found for {}", ticket.key),
          ViewStatus::NoConflicts => format!("No dependencies found for {}", ticket.key),
          ViewStatus::Ready => format!("{}: {} conflict(s)", ticket.key, session.conflicts().len()),
        };
        self.session = Some(session);
        self.load = LoadState::Loaded;
        self.refresh_display();
      }
      Err(err) => {
        tracing::warn!(pr = %ticket.key, error = ?err, "analysis unusable");
        self.load = LoadState::Failed(format!("{err:#}"));
      }
    }
  }

  fn refresh_display(&mut self) {
    self.display = self.session.as_ref().map(display_rows).unwrap_or_default();
    self.diff_cursor = self.diff_cursor.min(self.display.len().saturating_sub(1));
  }

  fn conflict_count(&self) -> usize {
    self.session.as_ref().map_or(0, |s| s.conflicts().len())
  }

  fn focus_row(&mut self, handle: RowHandle) {
    if let Some(pos) = self.display.iter().position(|d| *d == DisplayRow::Row(handle)) {
      self.diff_cursor = pos;
      self.diff_scroll = pos.saturating_sub(self.diff_viewport / 2);
    }
  }

  fn ensure_list_visible(&mut self) {
    if self.list_cursor < self.list_scroll {
      self.list_scroll = self.list_cursor;
    } else if self.list_cursor >= self.list_scroll + self.list_viewport {
      self.list_scroll = self.list_cursor + 1 - self.list_viewport;
    }
  }

  fn ensure_diff_visible(&mut self) {
    if self.diff_cursor < self.diff_scroll {
      self.diff_scroll = self.diff_cursor;
    } else if self.diff_cursor >= self.diff_scroll + self.diff_viewport {
      self.diff_scroll = self.diff_cursor + 1 - self.diff_viewport;
    }
  }

  fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
    let no_ctrl_alt =
      !key.modifiers.contains(KeyModifiers::CONTROL) && !key.modifiers.contains(KeyModifiers::ALT);
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      return Ok(true);
    }
    if !no_ctrl_alt {
      return Ok(false);
    }

    if self.show_help {
      // While help is open, treat most keys as inert.
      if matches!(key.code, KeyCode::Esc | KeyCode::Char('?')) {
        self.show_help = false;
      }
      return Ok(false);
    }

    if self.graph.is_some() {
      return Ok(self.handle_graph_key(key));
    }

    match key.code {
      KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(true),
      KeyCode::Char('?') => self.show_help = true,
      KeyCode::Tab | KeyCode::BackTab => {
        self.focus = match self.focus {
          Focus::Conflicts => Focus::Diff,
          Focus::Diff => Focus::Conflicts,
        };
      }
      KeyCode::Esc => self.clear_selection(),
      KeyCode::Char('r') => self.open_pull(self.pull_idx),
      KeyCode::Char(']') => {
        if self.pulls.len() > 1 {
          self.open_pull((self.pull_idx + 1) % self.pulls.len());
        }
      }
      KeyCode::Char('[') => {
        if self.pulls.len() > 1 {
          self.open_pull((self.pull_idx + self.pulls.len() - 1) % self.pulls.len());
        }
      }
      KeyCode::Char('m') => self.toggle_mode(),
      KeyCode::Char('g') => self.open_graph(),
      _ => match self.focus {
        Focus::Conflicts => self.handle_list_key(key),
        Focus::Diff => self.handle_diff_key(key),
      },
    }
    Ok(false)
  }

  fn handle_list_key(&mut self, key: KeyEvent) {
    let count = self.conflict_count();
    match key.code {
      KeyCode::Down | KeyCode::Char('j') => {
        if self.list_cursor + 1 < count {
          self.list_cursor += 1;
        }
      }
      KeyCode::Up | KeyCode::Char('k') => self.list_cursor = self.list_cursor.saturating_sub(1),
      KeyCode::Home => self.list_cursor = 0,
      KeyCode::End => self.list_cursor = count.saturating_sub(1),
      KeyCode::Enter | KeyCode::Char(' ') => self.select_conflict(self.list_cursor),
      _ => {}
    }
  }

  fn handle_diff_key(&mut self, key: KeyEvent) {
    let last = self.display.len().saturating_sub(1);
    match key.code {
      KeyCode::Down | KeyCode::Char('j') => self.diff_cursor = (self.diff_cursor + 1).min(last),
      KeyCode::Up | KeyCode::Char('k') => self.diff_cursor = self.diff_cursor.saturating_sub(1),
      KeyCode::PageDown => self.diff_cursor = (self.diff_cursor + self.diff_viewport).min(last),
      KeyCode::PageUp => self.diff_cursor = self.diff_cursor.saturating_sub(self.diff_viewport),
      KeyCode::Home => self.diff_cursor = 0,
      KeyCode::End => self.diff_cursor = last,
      KeyCode::Enter | KeyCode::Char(' ') => self.activate_diff_row(),
      KeyCode::Char('v') => self.toggle_viewed_at_cursor(),
      _ => {}
    }
  }

  fn handle_graph_key(&mut self, key: KeyEvent) -> bool {
    let Some(popup) = self.graph.as_mut() else {
      return false;
    };
    match key.code {
      KeyCode::Char('q') => return true,
      KeyCode::Esc | KeyCode::Char('g') => self.graph = None,
      KeyCode::Down | KeyCode::Char('j') => {
        if popup.selected + 1 < popup.data.nodes.len() {
          popup.selected += 1;
        }
      }
      KeyCode::Up | KeyCode::Char('k') => popup.selected = popup.selected.saturating_sub(1),
      KeyCode::Enter => {
        if let Some(node) = popup.data.nodes.get(popup.selected) {
          let label = node.label.clone();
          self.goto_graph_node(&label);
        }
      }
      _ => {}
    }
    false
  }

  fn select_conflict(&mut self, idx: usize) {
    let result = match self.session.as_mut() {
      Some(session) => session.select(Some(idx)),
      None => return,
    };
    self.refresh_display();
    match result {
      Ok(Some(target)) => {
        self.focus_row(target);
        self.focus = Focus::Diff;
        self.status = format!("Conflict #{idx}");
      }
      Ok(None) => {}
      Err(err) => self.status = err.to_string(),
    }
  }

  fn clear_selection(&mut self) {
    if let Some(session) = self.session.as_mut() {
      // Clearing cannot fail.
      let _ = session.select(None);
    }
    self.refresh_display();
    self.status.clear();
  }

  fn toggle_mode(&mut self) {
    let result = match self.session.as_mut() {
      Some(session) => {
        let next = match session.mode() {
          ResolveMode::Shallow => ResolveMode::Deep,
          ResolveMode::Deep => ResolveMode::Shallow,
        };
        self.options.mode = next;
        session.set_mode(next)
      }
      None => return,
    };
    self.refresh_display();
    match result {
      Ok(target) => {
        if let Some(target) = target {
          self.focus_row(target);
        }
        self.status = format!("{} view", self.options.mode);
      }
      Err(err) => self.status = err.to_string(),
    }
  }

  fn activate_diff_row(&mut self) {
    let Some(&row) = self.display.get(self.diff_cursor) else {
      return;
    };
    let Some(session) = self.session.as_mut() else {
      return;
    };
    match row {
      DisplayRow::File { file } => {
        session.toggle_viewed(file);
        self.refresh_display();
        if let Some(pos) = self.display.iter().position(|d| *d == DisplayRow::File { file }) {
          self.diff_cursor = pos;
        }
      }
      DisplayRow::Control { file, boundary } => {
        let revealed = session.expand(file, boundary);
        self.refresh_display();
        match revealed {
          Some(range) => {
            tracing::debug!(file, ?boundary, ?range, "expanded");
            let first = match boundary.direction {
              Direction::Up => *range.end(),
              Direction::Down => *range.start(),
            };
            self.focus_row(RowHandle { file, row: first });
          }
          None => self.status = "Nothing to expand".to_string(),
        }
      }
      DisplayRow::Row(handle) => match session.jump_from(handle) {
        Some(target) => {
          self.refresh_display();
          self.focus_row(target);
        }
        None => self.status = "Not an endpoint of the selected conflict".to_string(),
      },
    }
  }

  fn toggle_viewed_at_cursor(&mut self) {
    let file = match self.display.get(self.diff_cursor) {
      Some(DisplayRow::File { file }) | Some(DisplayRow::Control { file, .. }) => *file,
      Some(DisplayRow::Row(handle)) => handle.file,
      None => return,
    };
    let Some(session) = self.session.as_mut() else {
      return;
    };
    let viewed = session.toggle_viewed(file);
    let name = session.diff().file_name(file).unwrap_or_default().to_string();
    self.refresh_display();
    if let Some(pos) = self.display.iter().position(|d| *d == DisplayRow::File { file }) {
      self.diff_cursor = pos;
    }
    self.status = if viewed {
      format!("{name} marked viewed")
    } else {
      format!("{name} unmarked")
    };
  }

  fn open_graph(&mut self) {
    let Some(session) = self.session.as_ref() else {
      return;
    };
    let idx = session.conflicts().selected().unwrap_or(self.list_cursor);
    if idx >= session.conflicts().len() {
      self.status = "No conflict to graph".to_string();
      return;
    }
    match session.graph(idx) {
      Ok(data) if data.nodes.is_empty() => self.status = "Nothing to graph".to_string(),
      Ok(data) => {
        self.graph = Some(GraphPopup {
          conflict: idx,
          data,
          selected: 0,
        })
      }
      Err(err) => self.status = err.to_string(),
    }
  }

  fn goto_graph_node(&mut self, label: &str) {
    let result = match self.session.as_mut() {
      Some(session) => session.goto_graph_node(label),
      None => return,
    };
    match result {
      Ok(target) => {
        self.graph = None;
        self.refresh_display();
        self.focus_row(target);
        self.focus = Focus::Diff;
        self.status = format!("Jumped to {label}");
      }
      Err(err) => self.status = err.to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  impl Fetcher {
    fn detached() -> (Self, Receiver<Ticket>, Sender<FetchResult>) {
      let (request_tx, request_rx) = mpsc::channel();
      let (result_tx, result_rx) = mpsc::channel();
      (
        Self {
          requests: request_tx,
          results: result_rx,
        },
        request_rx,
        result_tx,
      )
    }
  }

  fn output() -> AnalysisOutput {
    let mut diff = String::from("--- a/src/app/Main.java\n+++ b/src/app/Main.java\n@@ -1,30 +1,30 @@\n");
    for n in 1..=30 {
      if n == 4 {
        diff.push_str("-old\n+new\n");
      } else {
        diff.push_str(&format!(" line {n}\n"));
      }
    }
    serde_json::from_value(serde_json::json!({
      "diff": diff,
      "events": [
        {"type": "OA INTRA", "label": "Override", "body": {"interference": [
          {"type": "declaration", "location": {"file": "src/app/Main.java", "class": "app.Main", "line": 4}},
          {"type": "override", "location": {"file": "src/app/Main.java", "class": "app.Main", "line": 25}}
        ]}}
      ]
    }))
    .unwrap()
  }

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn options() -> SessionOptions {
    SessionOptions {
      mode: ResolveMode::Shallow,
      dedup_by_kind: true,
      context_lines: 2,
    }
  }

  fn loaded_app() -> App {
    let (fetcher, requests, _results) = Fetcher::detached();
    let mut app = App::new(vec![PullRequestKey::new("octo", "demo", 1)], options(), fetcher);
    let ticket = requests.try_recv().unwrap();
    app.apply_fetch(ticket, Ok(output()));
    app
  }

  #[test]
  fn display_rows_place_controls_around_collapsed_runs() {
    let app = loaded_app();
    assert_eq!(app.load, LoadState::Loaded);
    let d = &app.display;
    assert_eq!(d[0], DisplayRow::File { file: 0 });
    // Hunk header and line 1 are hidden; rows 2..=7 (lines 2..5 around the change) show.
    assert_eq!(
      d[1],
      DisplayRow::Control {
        file: 0,
        boundary: Boundary::up(2)
      }
    );
    assert_eq!(d[2], DisplayRow::Row(RowHandle { file: 0, row: 2 }));
    let last = *d.last().unwrap();
    assert!(matches!(
      last,
      DisplayRow::Control {
        boundary: Boundary {
          direction: Direction::Down,
          ..
        },
        ..
      }
    ));
  }

  #[test]
  fn stale_results_are_ignored() {
    let (fetcher, requests, _results) = Fetcher::detached();
    let pulls = vec![PullRequestKey::new("o", "r", 1), PullRequestKey::new("o", "r", 2)];
    let mut app = App::new(pulls, options(), fetcher);
    let first = requests.try_recv().unwrap();

    app.handle_key(key(KeyCode::Char(']'))).unwrap();
    let second = requests.try_recv().unwrap();
    assert_eq!(second.key.pull_number, 2);

    app.apply_fetch(first, Ok(output()));
    assert!(app.session.is_none());
    assert_eq!(app.load, LoadState::Loading);

    app.apply_fetch(
      second,
      Err(ServiceError::Status {
        status: 502,
        body: "down".to_string(),
      }),
    );
    assert!(matches!(app.load, LoadState::Failed(_)));
  }

  #[test]
  fn select_jump_expand_and_graph_flow() {
    let mut app = loaded_app();
    app.diff_viewport = 10;

    app.handle_key(key(KeyCode::Enter)).unwrap();
    assert_eq!(app.focus, Focus::Diff);
    let session = app.session.as_ref().unwrap();
    let first = session.active().unwrap().scroll_to;
    assert_eq!(app.display[app.diff_cursor], DisplayRow::Row(first));

    // The far endpoint became visible through the selection; jump there and back.
    app.handle_key(key(KeyCode::Enter)).unwrap();
    let DisplayRow::Row(far) = app.display[app.diff_cursor] else {
      panic!("cursor should sit on a row");
    };
    assert_eq!(app.session.as_ref().unwrap().diff().row(far).unwrap().new_line, Some(25));
    app.handle_key(key(KeyCode::Enter)).unwrap();
    assert_eq!(app.display[app.diff_cursor], DisplayRow::Row(first));

    // Expanding the top control reveals the hidden head of the file.
    let before = app.display.len();
    app.diff_cursor = 1;
    app.handle_key(key(KeyCode::Enter)).unwrap();
    assert!(app.display.len() > before);

    app.handle_key(key(KeyCode::Char('g'))).unwrap();
    let popup = app.graph.as_ref().unwrap();
    assert_eq!(popup.conflict, 0);
    assert_eq!(popup.data.nodes[1].label, "Main:25");
    app.handle_key(key(KeyCode::Char('j'))).unwrap();
    app.handle_key(key(KeyCode::Enter)).unwrap();
    assert!(app.graph.is_none());
    assert_eq!(app.display[app.diff_cursor], DisplayRow::Row(far));

    app.handle_key(key(KeyCode::Esc)).unwrap();
    assert!(app.session.as_ref().unwrap().active().is_none());
    assert!(app.handle_key(key(KeyCode::Char('q'))).unwrap());
  }

  #[test]
  fn viewed_files_collapse_to_their_header() {
    let mut app = loaded_app();
    app.focus = Focus::Diff;
    app.diff_cursor = 3;
    app.handle_key(key(KeyCode::Char('v'))).unwrap();
    assert_eq!(app.display, vec![DisplayRow::File { file: 0 }]);
    assert_eq!(app.status, "src/app/Main.java marked viewed");
    app.handle_key(key(KeyCode::Enter)).unwrap();
    assert!(app.display.len() > 1);
  }
}
