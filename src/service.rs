use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use reqwest::{Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::analysis::AnalysisOutput;
use crate::context::PullRequestKey;
use crate::error::ServiceError;
use crate::settings::SettingsData;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    Updated,
}

#[derive(Serialize)]
struct SettingsEnvelope<'a> {
    settings: &'a SettingsData,
}

/// Client for the analysis service: analysis results, per-PR settings and repository registration.
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    base: String,
    client: reqwest::Client,
}

impl AnalysisClient {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self {
            base,
            client: reqwest::Client::new(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn pr_query(key: &PullRequestKey) -> [(&'static str, String); 3] {
        [
            ("owner", key.owner.clone()),
            ("repo", key.repository.clone()),
            ("pull_number", key.pull_number.to_string()),
        ]
    }

    pub async fn analysis(&self, key: &PullRequestKey) -> Result<AnalysisOutput, ServiceError> {
        tracing::info!(pr = %key, "fetching analysis");
        let response = self
            .client
            .get(format!("{}/analysis", self.base))
            .query(&Self::pr_query(key))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let output: AnalysisOutput = decode(ensure_success(response).await?).await?;
        tracing::info!(pr = %key, events = output.events.len(), "analysis received");
        Ok(output)
    }

    /// `None` when nothing is stored for the pull request yet.
    pub async fn settings(&self, key: &PullRequestKey) -> Result<Option<SettingsData>, ServiceError> {
        let response = self
            .client
            .get(format!("{}/settings", self.base))
            .query(&Self::pr_query(key))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(ensure_success(response).await?).await
    }

    /// Updates the stored settings when some exist, creates them otherwise.
    pub async fn save_settings(
        &self,
        key: &PullRequestKey,
        settings: &SettingsData,
    ) -> Result<SaveOutcome, ServiceError> {
        let exists = match self.settings(key).await {
            Ok(found) => found.is_some(),
            Err(err) => {
                tracing::debug!(%err, "settings lookup failed; creating");
                false
            }
        };
        let url = format!("{}/settings", self.base);
        let request = if exists {
            self.client.put(url)
        } else {
            self.client.post(url)
        };
        let response = request
            .query(&Self::pr_query(key))
            .json(&SettingsEnvelope { settings })
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        ensure_success(response).await?;
        let outcome = if exists {
            SaveOutcome::Updated
        } else {
            SaveOutcome::Created
        };
        tracing::info!(pr = %key, ?outcome, "settings saved");
        Ok(outcome)
    }

    pub async fn is_repo_registered(&self, owner: &str, repo: &str) -> Result<bool, ServiceError> {
        let response = self
            .client
            .get(format!("{}/repos", self.base))
            .query(&[("owner", owner), ("repo", repo)])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        Ok(response.status().is_success())
    }
}

/// Drives `future` on a fresh current-thread runtime; the non-interactive commands run one
/// request sequence each.
pub fn block_on<F: Future>(future: F) -> anyhow::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    Ok(runtime.block_on(future))
}

async fn ensure_success(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ServiceError> {
    let text = response.text().await?;
    Ok(serde_json::from_str(&text)?)
}
