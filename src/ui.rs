use std::io::{Stdout, stdout};

use anyhow::{Context, Result};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::analysis::Branch;
use crate::app::{DisplayRow, Focus, GraphPopup, LoadState};
use crate::conflicts;
use crate::context::PullRequestKey;
use crate::diff::Kind;
use crate::disclosure;
use crate::session::{Session, ViewStatus};
use crate::view::{self, DiffAccessor, Row};

const LEFT_BG: Color = Color::Rgb(0x1b, 0x3a, 0x26);
const RIGHT_BG: Color = Color::Rgb(0x33, 0x22, 0x4a);
const HIGHLIGHT_BG: Color = Color::Rgb(0x4a, 0x42, 0x14);

pub struct Ui {
    pub terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl Ui {
    pub fn new() -> Result<Self> {
        enable_raw_mode().context("enable raw mode")?;
        execute!(stdout(), EnterAlternateScreen).context("enter alt screen")?;
        let backend = CrosstermBackend::new(stdout());
        let terminal = Terminal::new(backend).context("create terminal")?;
        Ok(Self { terminal })
    }

    pub fn restore(&mut self) -> Result<()> {
        disable_raw_mode().ok();
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen).ok();
        self.terminal.show_cursor().ok();
        Ok(())
    }
}

pub struct DrawState<'a> {
    pub focus: Focus,
    pub pulls: &'a [PullRequestKey],
    pub pull_idx: usize,
    pub load: &'a LoadState,
    pub session: Option<&'a Session>,

    pub display: &'a [DisplayRow],
    pub list_cursor: usize,
    pub list_scroll: usize,
    pub diff_cursor: usize,
    pub diff_scroll: usize,

    pub graph: Option<&'a GraphPopup>,
    pub status: &'a str,
    pub show_help: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Rects {
    pub conflicts: Rect,
    pub diff: Rect,
    pub footer: Rect,
}

pub fn layout(area: Rect) -> Rects {
    let [main, footer] = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .areas(area);
    let [conflicts, diff] = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(48), Constraint::Min(1)])
        .areas(main);
    Rects {
        conflicts,
        diff,
        footer,
    }
}

pub fn draw(f: &mut ratatui::Frame, s: DrawState<'_>) {
    let outer = f.area();
    let rects = layout(outer);

    draw_conflicts(f, rects.conflicts, &s);
    draw_diff(f, rects.diff, &s);
    draw_footer(f, rects.footer, &s);

    if let (Some(popup), Some(session)) = (s.graph, s.session) {
        draw_graph(f, outer, popup, session);
    }
    if s.show_help {
        draw_help(f, outer);
    }
}

fn pane_block(title: String, focused: bool) -> Block<'static> {
    let mut block = Block::default().borders(Borders::ALL).title(title);
    if focused {
        block = block.border_style(Style::default().fg(Color::Cyan));
    }
    block
}

fn draw_conflicts(f: &mut ratatui::Frame, area: Rect, s: &DrawState<'_>) {
    let focused = s.focus == Focus::Conflicts;
    let Some(session) = s.session else {
        let block = pane_block("Dependencies".to_string(), focused);
        f.render_widget(Paragraph::new(load_message(s)).block(block), area);
        return;
    };

    let list = session.conflicts();
    let block = pane_block(format!("Dependencies ({})", list.len()), focused);
    if list.is_empty() {
        let text = match session.status() {
            ViewStatus::NoAnalysis => "No analysis found.",
            _ => "No dependencies found.",
        };
        f.render_widget(Paragraph::new(text).block(block), area);
        return;
    }

    let width = area.width.saturating_sub(4) as usize;
    let items = list
        .entries()
        .iter()
        .enumerate()
        .skip(s.list_scroll)
        .map(|(idx, entry)| {
            let active = list.selected() == Some(idx);
            let marker = if active { "● " } else { "  " };
            let mut lines = vec![Line::from(vec![
                Span::styled(marker, Style::default().fg(Color::Yellow)),
                Span::raw(truncate(&conflicts::title(&entry.record), width.saturating_sub(2))),
            ])];
            if let Some(route) = conflicts::route(&entry.record) {
                lines.push(Line::from(Span::styled(
                    format!("  {}", truncate(&route, width.saturating_sub(2))),
                    Style::default().fg(Color::DarkGray),
                )));
            }
            if let Some(err) = &entry.error {
                lines.push(Line::from(Span::styled(
                    format!("  ! {}", truncate(&err.to_string(), width.saturating_sub(4))),
                    Style::default().fg(Color::Red),
                )));
            }
            ListItem::new(Text::from(lines))
        })
        .collect::<Vec<_>>();

    let mut highlight = Style::default();
    if focused {
        highlight = highlight.add_modifier(Modifier::REVERSED);
    }
    let widget = List::new(items).block(block).highlight_style(highlight);
    let mut state = ListState::default();
    state.select(Some(s.list_cursor.saturating_sub(s.list_scroll)));
    f.render_stateful_widget(widget, area, &mut state);
}

fn load_message(s: &DrawState<'_>) -> Text<'static> {
    let key = s
        .pulls
        .get(s.pull_idx)
        .map(|k| k.to_string())
        .unwrap_or_default();
    match s.load {
        LoadState::Loading => Text::raw(format!("Loading analysis for {key}…")),
        LoadState::Failed(msg) => Text::from(vec![
            Line::from(format!("Could not load analysis for {key}:")),
            Line::from(Span::styled(msg.clone(), Style::default().fg(Color::Red))),
            Line::from(""),
            Line::from("Press r to retry."),
        ]),
        LoadState::Loaded => Text::raw(""),
    }
}

fn draw_diff(f: &mut ratatui::Frame, area: Rect, s: &DrawState<'_>) {
    let focused = s.focus == Focus::Diff;
    let Some(session) = s.session else {
        f.render_widget(Paragraph::new("").block(pane_block("Diff".to_string(), focused)), area);
        return;
    };
    let diff = session.diff();
    let title = format!("Diff ({} view)", session.mode());
    let block = pane_block(title, focused);
    if diff.is_empty() {
        f.render_widget(Paragraph::new("No analysis found.").block(block), area);
        return;
    }

    let height = area.height.saturating_sub(2).max(1) as usize;
    let end = (s.diff_scroll + height).min(s.display.len());
    let start = s.diff_scroll.min(end);
    let mut rendered = Vec::with_capacity(end - start);
    for (offset, item) in s.display[start..end].iter().enumerate() {
        let mut line = match *item {
            DisplayRow::File { file } => file_header(session, file),
            DisplayRow::Control { boundary, .. } => control_line(boundary),
            DisplayRow::Row(handle) => match diff.row(handle) {
                Some(row) => diff_line(row),
                None => Line::from(""),
            },
        };
        if focused && start + offset == s.diff_cursor {
            line = line.patch_style(Style::default().add_modifier(Modifier::REVERSED));
        }
        rendered.push(line);
    }

    f.render_widget(Paragraph::new(Text::from(rendered)).block(block), area);
}

fn file_header(session: &Session, file: usize) -> Line<'static> {
    let name = session.diff().file_name(file).unwrap_or_default().to_string();
    let (arrow, suffix) = if session.disclosure().is_viewed(file) {
        ("▸", "  (viewed)")
    } else {
        ("▾", "")
    };
    Line::from(Span::styled(
        format!("{arrow} {name}{suffix}"),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    ))
}

fn control_line(boundary: disclosure::Boundary) -> Line<'static> {
    let text = match boundary.direction {
        disclosure::Direction::Up => "          ↑ expand",
        disclosure::Direction::Down => "          ↓ expand",
    };
    Line::from(Span::styled(
        text,
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    ))
}

fn diff_line(row: &Row) -> Line<'static> {
    if row.kind == Kind::HunkHeader {
        return Line::from(Span::styled(row.text.clone(), Style::default().fg(Color::Cyan)));
    }
    let sign = match row.kind {
        Kind::Add => '+',
        Kind::Remove => '-',
        Kind::Context | Kind::HunkHeader => ' ',
    };
    let new = row.new_line.map(|n| n.to_string()).unwrap_or_default();
    let gutter_style = if row.gutter.is_some() {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Line::from(vec![
        Span::styled(format!("{:>4} {:>4} ", row.old_label(), new), gutter_style),
        Span::styled(format!("{sign}{}", row.text), row_style(row)),
    ])
}

fn row_style(row: &Row) -> Style {
    let mut style = Style::default();
    match row.kind {
        Kind::Add => style = style.fg(Color::Green),
        Kind::Remove => style = style.fg(Color::Red),
        Kind::Context | Kind::HunkHeader => {}
    }
    if let Some((branch, _)) = row.side() {
        style = style.bg(match branch {
            Branch::Left => LEFT_BG,
            Branch::Right => RIGHT_BG,
        });
    }
    if row.has(view::Style::Highlight) {
        style = style.bg(HIGHLIGHT_BG);
    }
    if row.has(view::Style::Active) {
        style = style.add_modifier(Modifier::BOLD);
    }
    style
}

fn draw_footer(f: &mut ratatui::Frame, area: Rect, s: &DrawState<'_>) {
    let pull = s
        .pulls
        .get(s.pull_idx)
        .map(|k| k.to_string())
        .unwrap_or_default();
    let mut left = format!(
        "{pull} ({}/{})  Tab focus  Enter select/expand/jump  g graph  m mode  v viewed  r reload  [ ] PR  ? help  q quit",
        s.pull_idx + 1,
        s.pulls.len()
    );
    if !s.status.is_empty() {
        left.push_str("  |  ");
        left.push_str(s.status);
    }

    let para = Paragraph::new(left)
        .style(Style::default().fg(Color::Gray))
        .alignment(Alignment::Left);
    f.render_widget(para, area);
}

fn draw_graph(f: &mut ratatui::Frame, area: Rect, popup: &GraphPopup, session: &Session) {
    let title = session
        .conflicts()
        .get(popup.conflict)
        .map(|e| format!("Graph: {}", conflicts::title(&e.record)))
        .unwrap_or_else(|| "Graph".to_string());

    let mut lines = vec![Line::from(Span::styled(
        "Nodes",
        Style::default().add_modifier(Modifier::BOLD),
    ))];
    for (idx, node) in popup.data.nodes.iter().enumerate() {
        let mut spans = vec![
            Span::styled("● ", Style::default().fg(hex_color(node.color))),
            Span::raw(format!("{:<3} {}", node.id, node.label)),
        ];
        if !node.method.is_empty() {
            spans.push(Span::styled(
                format!("  {}", node.method),
                Style::default().fg(Color::DarkGray),
            ));
        }
        if let Some(message) = &node.message {
            spans.push(Span::styled(
                format!("  {message}"),
                Style::default().fg(Color::Yellow),
            ));
        }
        let mut line = Line::from(spans);
        if idx == popup.selected {
            line = line.patch_style(Style::default().add_modifier(Modifier::REVERSED));
        }
        lines.push(line);
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Edges",
        Style::default().add_modifier(Modifier::BOLD),
    )));
    for edge in &popup.data.edges {
        lines.push(Line::from(vec![
            Span::raw(format!("{} → {}  ", edge.from, edge.to)),
            Span::styled(edge.label, Style::default().fg(hex_color(edge.color))),
        ]));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Enter go to node  Esc close",
        Style::default().fg(Color::DarkGray),
    )));

    let rect = centered_rect(70, 70, area);
    f.render_widget(Clear, rect);
    let block = Block::default().borders(Borders::ALL).title(title);
    let para = Paragraph::new(Text::from(lines)).block(block).wrap(Wrap { trim: false });
    f.render_widget(para, rect);
}

fn draw_help(f: &mut ratatui::Frame, area: Rect) {
    let help = Text::from(vec![
        Line::from("Dependencies"),
        Line::from("  Up/Down   Move through the conflict list"),
        Line::from("  Enter     Select conflict and scroll to its first endpoint"),
        Line::from("  Esc       Clear the selection"),
        Line::from("  g         Graph of the selected conflict"),
        Line::from("  m         Switch between shallow and deep resolution"),
        Line::from(""),
        Line::from("Diff"),
        Line::from("  Enter     Expand control / jump to the other endpoint / collapse file"),
        Line::from("  v         Toggle viewed for the current file"),
        Line::from("  PgUp/Dn   Scroll"),
        Line::from(""),
        Line::from("Other"),
        Line::from("  Tab       Switch focus (dependencies/diff)"),
        Line::from("  [ ]       Previous / next pull request"),
        Line::from("  r         Reload analysis"),
        Line::from("  ?         Toggle this help"),
        Line::from("  q         Quit"),
    ]);

    let popup = centered_rect(76, 80, area);
    f.render_widget(Clear, popup);
    let block = Block::default().borders(Borders::ALL).title("Help");
    let para = Paragraph::new(help).block(block).wrap(Wrap { trim: false });
    f.render_widget(para, popup);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

/// `#RRGGBB` to a terminal colour.
fn hex_color(hex: &str) -> Color {
    let digits = hex.trim_start_matches('#');
    let channel = |i: usize| {
        digits
            .get(i..i + 2)
            .and_then(|c| u8::from_str_radix(c, 16).ok())
    };
    match (digits.len(), channel(0), channel(2), channel(4)) {
        (6, Some(r), Some(g), Some(b)) => Color::Rgb(r, g, b),
        _ => Color::White,
    }
}

/// Cuts `s` to at most `width` display columns, marking the cut with `…`.
fn truncate(s: &str, width: usize) -> String {
    if s.width() <= width {
        return s.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in s.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    out
}
