use std::fmt;
use std::str::FromStr;

use crate::error::ContextError;

const GITHUB_PREFIXES: [&str; 2] = ["https://github.com/", "http://github.com/"];

/// Identifies one pull request; every fetch is keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PullRequestKey {
    pub owner: String,
    pub repository: String,
    pub pull_number: u64,
}

impl PullRequestKey {
    pub fn new(owner: impl Into<String>, repository: impl Into<String>, pull_number: u64) -> Self {
        PullRequestKey {
            owner: owner.into(),
            repository: repository.into(),
            pull_number,
        }
    }

    /// `https://github.com/<owner>/<repo>/pull/<n>`, optionally followed by a tab path,
    /// query or fragment.
    pub fn from_url(url: &str) -> Option<Self> {
        let rest = GITHUB_PREFIXES
            .iter()
            .find_map(|p| url.strip_prefix(p))?;
        let mut parts = rest.split('/');
        let owner = parts.next().filter(|s| valid_name(s))?;
        let repository = parts.next().filter(|s| valid_name(s))?;
        if parts.next()? != "pull" {
            return None;
        }
        let number = parts.next()?;
        let digits: &str = number
            .split(['?', '#'])
            .next()
            .filter(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()))?;
        Some(Self::new(owner, repository, digits.parse().ok()?))
    }

    /// `owner/repo#N`.
    pub fn from_short(input: &str) -> Option<Self> {
        let (repo, number) = input.split_once('#')?;
        let (owner, repository) = repo.split_once('/')?;
        if !valid_name(owner) || !valid_name(repository) {
            return None;
        }
        Some(Self::new(owner, repository, number.parse().ok()?))
    }
}

fn valid_name(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl FromStr for PullRequestKey {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::from_url(s)
            .or_else(|| Self::from_short(s))
            .ok_or_else(|| ContextError::InvalidPullRequest(s.to_string()))
    }
}

impl fmt::Display for PullRequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repository, self.pull_number)
    }
}

/// Handed out when a fetch starts; results are applied only while it is still current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    pub key: PullRequestKey,
}

/// Tracks which pull request the view currently shows so late fetch results can be dropped.
#[derive(Debug, Default)]
pub struct StaleGuard {
    generation: u64,
    current: Option<PullRequestKey>,
}

impl StaleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, key: PullRequestKey) -> Ticket {
        self.generation += 1;
        self.current = Some(key.clone());
        Ticket {
            generation: self.generation,
            key,
        }
    }

    pub fn current(&self) -> Option<&PullRequestKey> {
        self.current.as_ref()
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        ticket.generation == self.generation && self.current.as_ref() == Some(&ticket.key)
    }

    /// `value` if `ticket` is still current; otherwise it is dropped.
    pub fn accept<T>(&self, ticket: &Ticket, value: T) -> Option<T> {
        if self.is_current(ticket) {
            Some(value)
        } else {
            tracing::debug!(pr = %ticket.key, "discarding stale result");
            None
        }
    }
}
