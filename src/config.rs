use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use confique::Config as _;
use confique::Layer as _;

use crate::context::PullRequestKey;
use crate::disclosure::clamp_context_lines;
use crate::resolver::ResolveMode;
use crate::session::SessionOptions;

#[derive(confique::Config, Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the analysis service.
    #[config(default = "http://localhost:4000", env = "MERGELENS_ANALYSIS_API")]
    pub analysis_api: String,
    /// `shallow` or `deep`.
    #[config(default = "shallow", env = "MERGELENS_VIEW_MODE")]
    pub view_mode: String,
    #[config(default = true, env = "MERGELENS_DEDUP_BY_KIND")]
    pub dedup_by_kind: bool,
    #[config(default = 3, env = "MERGELENS_CONTEXT_LINES")]
    pub context_lines: usize,
}

impl AppConfig {
    pub fn view_mode(&self) -> Result<ResolveMode> {
        self.view_mode
            .parse::<ResolveMode>()
            .map_err(|e| anyhow::anyhow!(e))
            .context("read view_mode")
    }

    pub fn session_options(&self) -> Result<SessionOptions> {
        Ok(SessionOptions {
            mode: self.view_mode()?,
            dedup_by_kind: self.dedup_by_kind,
            context_lines: clamp_context_lines(self.context_lines),
        })
    }
}

#[derive(Parser)]
#[command(
    name = "mergelens",
    version,
    about = "Browse semantic merge-conflict dependencies on pull-request diffs."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Command>,

    /// Pull requests to open (owner/repo#N or a GitHub pull-request URL).
    pub pulls: Vec<PullRequestKey>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Optional path to a config file to load in addition to the standard locations.
    #[arg(long = "config-file", global = true)]
    pub config_file: Option<PathBuf>,

    /// Base URL of the analysis service.
    #[arg(long = "api", global = true)]
    pub analysis_api: Option<String>,

    /// Endpoint resolution: shallow (reported lines) or deep (outermost call site in the diff).
    #[arg(long = "view-mode", global = true)]
    pub view_mode: Option<ResolveMode>,

    /// Treat same-endpoint conflicts of different kinds as distinct (true/false).
    #[arg(
        long = "dedup-by-kind",
        global = true,
        value_parser = clap::builder::BoolishValueParser::new(),
        default_missing_value = "true",
        num_args = 0..=1
    )]
    pub dedup_by_kind: Option<bool>,

    /// Unchanged lines kept visible around each change (0-20).
    #[arg(long = "context", global = true)]
    pub context_lines: Option<usize>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Interactive dependencies view (default).
    Review(ReviewCli),
    /// Print the conflicts of a pull request.
    List(ListCli),
    /// Print the logical graph of one conflict as JSON.
    Graph(GraphCli),
    /// Read or write the analysis settings of a pull request.
    Settings(SettingsCli),
}

#[derive(Args, Debug, Clone)]
pub struct ReviewCli {
    #[arg(required = true)]
    pub pulls: Vec<PullRequestKey>,
}

#[derive(Args, Debug, Clone)]
pub struct ListCli {
    pub pull: PullRequestKey,
}

#[derive(Args, Debug, Clone)]
pub struct GraphCli {
    pub pull: PullRequestKey,

    /// Position of the conflict in `list` output.
    #[arg(long = "conflict", short = 'c')]
    pub conflict: usize,
}

#[derive(Args, Debug, Clone)]
pub struct SettingsCli {
    #[command(subcommand)]
    pub action: SettingsAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SettingsAction {
    Get {
        pull: PullRequestKey,
    },
    Set {
        pull: PullRequestKey,

        #[arg(long = "main-class")]
        main_class: Option<String>,

        #[arg(long = "main-method")]
        main_method: Option<String>,

        /// Pass an empty value to clear it.
        #[arg(long = "base-class")]
        base_class: Option<String>,
    },
}

pub fn load_config(global: &GlobalArgs) -> Result<AppConfig> {
    let cwd = std::env::current_dir().ok();
    load_config_from(global, cwd.as_deref(), dirs::config_dir().as_deref())
}

fn load_config_from(
    global: &GlobalArgs,
    cwd: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<AppConfig> {
    let mut cli_layer = <AppConfig as confique::Config>::Layer::empty();
    cli_layer.analysis_api = global.analysis_api.clone();
    cli_layer.view_mode = global.view_mode.map(|m| m.to_string());
    cli_layer.dedup_by_kind = global.dedup_by_kind;
    cli_layer.context_lines = global.context_lines;

    let mut builder = AppConfig::builder().preloaded(cli_layer).env();
    if let Some(path) = &global.config_file {
        builder = builder.file(path);
    }

    if let Some(cwd) = cwd {
        let local_root = cwd.join(".config");
        builder = add_if_exists(builder, local_root.join("mergelens.toml"));
        builder = add_if_exists(builder, local_root.join("mergelens").join("config.toml"));
    }

    if let Some(dir) = config_dir {
        builder = add_if_exists(builder, dir.join("mergelens").join("config.toml"));
    }

    let config = builder.load().context("load mergelens config")?;
    config.view_mode()?;
    Ok(config)
}

fn add_if_exists(
    mut builder: confique::Builder<AppConfig>,
    path: impl AsRef<Path>,
) -> confique::Builder<AppConfig> {
    let path = path.as_ref();
    if path.exists() {
        builder = builder.file(path);
    }
    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn write(path: &Path, body: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_apply_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&GlobalArgs::default(), Some(dir.path()), None).unwrap();
        assert_eq!(config.analysis_api, "http://localhost:4000");
        let options = config.session_options().unwrap();
        assert_eq!(options.mode, ResolveMode::Shallow);
        assert!(options.dedup_by_kind);
        assert_eq!(options.context_lines, 3);
    }

    #[test]
    fn local_files_override_user_config_and_cli_overrides_both() {
        let cwd = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        write(
            &home.path().join("mergelens").join("config.toml"),
            "analysis_api = \"http://user:1\"\ncontext_lines = 7\n",
        );
        write(
            &cwd.path().join(".config").join("mergelens.toml"),
            "analysis_api = \"http://local:2\"\nview_mode = \"deep\"\n",
        );

        let config = load_config_from(&GlobalArgs::default(), Some(cwd.path()), Some(home.path())).unwrap();
        assert_eq!(config.analysis_api, "http://local:2");
        assert_eq!(config.context_lines, 7);
        assert_eq!(config.view_mode().unwrap(), ResolveMode::Deep);

        let global = GlobalArgs {
            analysis_api: Some("http://flag:3".to_string()),
            view_mode: Some(ResolveMode::Shallow),
            dedup_by_kind: Some(false),
            context_lines: Some(99),
            ..GlobalArgs::default()
        };
        let config = load_config_from(&global, Some(cwd.path()), Some(home.path())).unwrap();
        assert_eq!(config.analysis_api, "http://flag:3");
        let options = config.session_options().unwrap();
        assert_eq!(options.mode, ResolveMode::Shallow);
        assert!(!options.dedup_by_kind);
        assert_eq!(options.context_lines, 20);
    }

    #[test]
    fn explicit_config_file_beats_standard_locations() {
        let cwd = tempfile::tempdir().unwrap();
        write(
            &cwd.path().join(".config").join("mergelens").join("config.toml"),
            "dedup_by_kind = true\n",
        );
        let extra = cwd.path().join("extra.toml");
        write(&extra, "dedup_by_kind = false\n");

        let global = GlobalArgs {
            config_file: Some(extra),
            ..GlobalArgs::default()
        };
        let config = load_config_from(&global, Some(cwd.path()), None).unwrap();
        assert!(!config.dedup_by_kind);
    }

    #[test]
    fn rejects_unknown_view_mode() {
        let cwd = tempfile::tempdir().unwrap();
        write(&cwd.path().join(".config").join("mergelens.toml"), "view_mode = \"wide\"\n");
        assert!(load_config_from(&GlobalArgs::default(), Some(cwd.path()), None).is_err());
    }

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from(["mergelens", "octo/demo#4", "https://github.com/octo/demo/pull/5"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.pulls.len(), 2);
        assert_eq!(cli.pulls[1].pull_number, 5);

        let cli = Cli::try_parse_from(["mergelens", "graph", "octo/demo#4", "--conflict", "2", "--view-mode", "deep"]).unwrap();
        match cli.command {
            Some(Command::Graph(g)) => assert_eq!(g.conflict, 2),
            _ => panic!("expected graph"),
        }
        assert_eq!(cli.global.view_mode, Some(ResolveMode::Deep));

        let cli = Cli::try_parse_from([
            "mergelens", "settings", "set", "octo/demo#4", "--main-class", "a.Main",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Settings(SettingsCli {
                action: SettingsAction::Set { main_class, base_class, .. },
            })) => {
                assert_eq!(main_class.as_deref(), Some("a.Main"));
                assert_eq!(base_class, None);
            }
            _ => panic!("expected settings set"),
        }

        assert!(Cli::try_parse_from(["mergelens", "list", "not-a-pr"]).is_err());
    }
}
