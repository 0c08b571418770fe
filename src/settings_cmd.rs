use anyhow::{Context, Result, bail};

use crate::config::{AppConfig, SettingsAction, SettingsCli};
use crate::context::PullRequestKey;
use crate::service::{self, AnalysisClient, SaveOutcome};
use crate::settings::SettingsData;

pub fn run(config: &AppConfig, cli: SettingsCli) -> Result<()> {
  let client = AnalysisClient::new(config.analysis_api.clone());
  match cli.action {
    SettingsAction::Get { pull } => {
      let stored = service::block_on(client.settings(&pull))?
        .with_context(|| format!("read settings for {pull}"))?;
      let (settings, note) = match stored {
        Some(s) => (s, None),
        None => (SettingsData::for_key(&pull), Some("no settings stored; showing defaults")),
      };
      if let Some(note) = note {
        eprintln!("{pull}: {note}");
      }
      println!(
        "{}",
        serde_json::to_string_pretty(&settings).context("encode settings")?
      );
      Ok(())
    }
    SettingsAction::Set {
      pull,
      main_class,
      main_method,
      base_class,
    } => {
      let outcome = service::block_on(save(
        &client,
        &pull,
        Overrides {
          main_class,
          main_method,
          base_class,
        },
      ))??;
      match outcome {
        SaveOutcome::Created => println!("Created settings for {pull}."),
        SaveOutcome::Updated => println!("Updated settings for {pull}."),
      }
      Ok(())
    }
  }
}

#[derive(Debug, Default)]
struct Overrides {
  main_class: Option<String>,
  main_method: Option<String>,
  base_class: Option<String>,
}

impl Overrides {
  /// Layers the flags over `current`; blanks fall back to the defaults.
  fn apply(self, mut current: SettingsData) -> SettingsData {
    if let Some(class) = self.main_class {
      current.main_class = class;
    }
    if let Some(method) = self.main_method {
      current.main_method = method;
    }
    if let Some(base) = self.base_class {
      current.base_class = Some(base);
    }
    current.normalized()
  }
}

async fn save(client: &AnalysisClient, key: &PullRequestKey, overrides: Overrides) -> Result<SaveOutcome> {
  let registered = client
    .is_repo_registered(&key.owner, &key.repository)
    .await
    .context("check repository registration")?;
  if !registered {
    bail!(
      "{}/{} is not registered with the analysis service at {}",
      key.owner,
      key.repository,
      client.base()
    );
  }

  let current = match client.settings(key).await {
    Ok(Some(found)) => found,
    Ok(None) => SettingsData::for_key(key),
    Err(err) => {
      tracing::warn!(pr = %key, %err, "could not read stored settings; starting from defaults");
      SettingsData::for_key(key)
    }
  };
  let settings = overrides.apply(current).stamped(key);
  client
    .save_settings(key, &settings)
    .await
    .with_context(|| format!("save settings for {key}"))
}
