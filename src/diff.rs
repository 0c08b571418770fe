use anyhow::{Context, Result, bail};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    HunkHeader,
    Context,
    Add,
    Remove,
}

#[derive(Debug, Clone)]
pub struct Line {
    pub kind: Kind,
    pub text: String,
    pub old_line: Option<u32>,
    pub new_line: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct FileDiff {
    pub old_path: Option<String>,
    pub new_path: Option<String>,
    pub lines: Vec<Line>,
}

impl FileDiff {
    /// Name shown in the file header: the new path, or the old one for deletions.
    pub fn display_name(&self) -> &str {
        self.new_path
            .as_deref()
            .or(self.old_path.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy)]
struct HunkHeader {
    before_start: u32,
    before_len: u32,
    after_start: u32,
    after_len: u32,
}

/// Splits `git diff` style unified diff text into per-file sections.
pub fn parse_unified(text: &str) -> Result<Vec<FileDiff>> {
    let mut files: Vec<FileDiff> = Vec::new();
    let mut current: Option<FileDiff> = None;
    let mut old_line = 0u32;
    let mut new_line = 0u32;
    // Rows still owed to the current hunk on each side.
    let mut old_left = 0u32;
    let mut new_left = 0u32;
    let mut in_hunk = false;

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim_end_matches('\r');

        if let Some(rest) = line.strip_prefix("diff --git ") {
            if let Some(done) = current.take() {
                files.push(done);
            }
            let (old, new) = split_git_header(rest);
            current = Some(FileDiff {
                old_path: old,
                new_path: new,
                lines: Vec::new(),
            });
            in_hunk = false;
            continue;
        }

        if in_hunk && old_left == 0 && new_left == 0 {
            in_hunk = false;
        }

        if !in_hunk || current.is_none() {
            if let Some(path) = line.strip_prefix("--- ") {
                // Plain unified diffs have no `diff --git` line; `---` starts the section.
                let fresh = current.as_ref().is_none_or(|c| !c.lines.is_empty());
                if fresh {
                    if let Some(done) = current.take() {
                        files.push(done);
                    }
                    current = Some(FileDiff::default());
                }
                if let Some(c) = current.as_mut() {
                    c.old_path = strip_side_prefix(path, "a/");
                }
                continue;
            }
            if let Some(path) = line.strip_prefix("+++ ") {
                if let Some(c) = current.as_mut() {
                    c.new_path = strip_side_prefix(path, "b/");
                }
                continue;
            }
        }

        if line.starts_with("@@") {
            let header = parse_hunk_header(line)
                .with_context(|| format!("parse hunk header on line {}", idx + 1))?;
            let Some(c) = current.as_mut() else {
                bail!("hunk header before any file header on line {}", idx + 1);
            };
            c.lines.push(Line {
                kind: Kind::HunkHeader,
                text: line.to_string(),
                old_line: None,
                new_line: None,
            });
            old_line = header.before_start;
            new_line = header.after_start;
            old_left = header.before_len;
            new_left = header.after_len;
            in_hunk = true;
            continue;
        }

        if !in_hunk {
            // index/mode/rename/similarity/binary metadata.
            continue;
        }
        let Some(c) = current.as_mut() else {
            continue;
        };

        match line.chars().next() {
            Some('+') => {
                c.lines.push(Line {
                    kind: Kind::Add,
                    text: line[1..].to_string(),
                    old_line: None,
                    new_line: Some(new_line),
                });
                new_line += 1;
                new_left = new_left.saturating_sub(1);
            }
            Some('-') => {
                c.lines.push(Line {
                    kind: Kind::Remove,
                    text: line[1..].to_string(),
                    old_line: Some(old_line),
                    new_line: None,
                });
                old_line += 1;
                old_left = old_left.saturating_sub(1);
            }
            Some('\\') => {}
            Some(' ') | None => {
                c.lines.push(Line {
                    kind: Kind::Context,
                    text: line.get(1..).unwrap_or("").to_string(),
                    old_line: Some(old_line),
                    new_line: Some(new_line),
                });
                old_line += 1;
                new_line += 1;
                old_left = old_left.saturating_sub(1);
                new_left = new_left.saturating_sub(1);
            }
            Some(_) => {
                in_hunk = false;
            }
        }
    }

    if let Some(done) = current.take() {
        files.push(done);
    }
    Ok(files)
}

fn split_git_header(rest: &str) -> (Option<String>, Option<String>) {
    match rest.split_once(" b/") {
        Some((old, new)) => (
            strip_side_prefix(old, "a/"),
            Some(new.to_string()),
        ),
        None => (None, None),
    }
}

fn strip_side_prefix(path: &str, prefix: &str) -> Option<String> {
    let path = path.split('\t').next().unwrap_or(path).trim();
    if path == "/dev/null" {
        return None;
    }
    Some(path.strip_prefix(prefix).unwrap_or(path).to_string())
}

fn parse_hunk_header(line: &str) -> Result<HunkHeader> {
    let body = line
        .strip_prefix("@@ ")
        .and_then(|s| s.split(" @@").next())
        .context("missing @@ markers")?;
    let mut parts = body.split_whitespace();
    let before = parts.next().and_then(|p| p.strip_prefix('-')).context("missing old range")?;
    let after = parts.next().and_then(|p| p.strip_prefix('+')).context("missing new range")?;
    let (before_start, before_len) = parse_range(before)?;
    let (after_start, after_len) = parse_range(after)?;
    Ok(HunkHeader {
        before_start,
        before_len,
        after_start,
        after_len,
    })
}

/// `start[,len]`; a missing length means one line.
fn parse_range(range: &str) -> Result<(u32, u32)> {
    let (start, len) = match range.split_once(',') {
        Some((start, len)) => (start, Some(len)),
        None => (range, None),
    };
    let start = start
        .parse::<u32>()
        .with_context(|| format!("invalid range start {start:?}"))?;
    let len = match len {
        Some(len) => len
            .parse::<u32>()
            .with_context(|| format!("invalid range length {len:?}"))?,
        None => 1,
    };
    Ok((start, len))
}
