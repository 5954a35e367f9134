//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no I/O happens here.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use errsight_core::types::Tier;

/// errsight -- tiered error log analysis.
///
/// Use `errsight <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "errsight", version, about, long_about = None)]
pub struct Cli {
    /// Path to errsight.toml. Defaults to ./errsight.toml when present,
    /// built-in defaults otherwise.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze a log file (or stdin) and print enriched entries.
    Analyze(AnalyzeArgs),

    /// Manage pattern rules.
    Rules(RulesArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- analyze ----

/// Analyze raw log text.
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Log file to read; `-` or omitted reads stdin.
    pub input: Option<PathBuf>,

    /// API key (falls back to the ERRSIGHT_API_KEY environment variable).
    #[arg(short, long)]
    pub key: Option<String>,

    /// Requested tier; never raises the tier granted to the key.
    #[arg(short, long)]
    pub tier: Option<Tier>,

    /// Project root used for code, history and environment context.
    #[arg(long)]
    pub project_root: Option<PathBuf>,

    /// Pattern rule directory (overrides `analyzer.rule_dir`).
    #[arg(long)]
    pub rules: Option<PathBuf>,
}

// ---- rules ----

/// Manage pattern rules.
#[derive(Args, Debug)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub action: RulesAction,
}

#[derive(Subcommand, Debug)]
pub enum RulesAction {
    /// List rules from the configured rule directory (or the built-in catalog).
    List {
        /// Rule directory (overrides `analyzer.rule_dir`).
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Filter by status (enabled, disabled).
        #[arg(long)]
        status: Option<String>,
    },
    /// Validate rule files and report per-file results.
    Validate {
        /// Directory containing YAML rule files.
        path: PathBuf,
    },
}

// ---- config ----

/// Manage errsight configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, analyzer, tiers, keys).
        #[arg(long)]
        section: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_analyze_defaults() {
        let cli = Cli::try_parse_from(["errsight", "analyze"]).expect("parse succeeded");
        match cli.command {
            Commands::Analyze(args) => {
                assert!(args.input.is_none(), "input should default to stdin");
                assert!(args.key.is_none());
                assert!(args.tier.is_none());
            }
            _ => panic!("expected Analyze command"),
        }
        assert_eq!(cli.output, OutputFormat::Text);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_parse_analyze_full() {
        let cli = Cli::try_parse_from([
            "errsight",
            "analyze",
            "app.log",
            "--key",
            "sk-123",
            "--tier",
            "pro",
            "--project-root",
            "/srv/app",
            "--output",
            "json",
        ])
        .expect("parse succeeded");
        match cli.command {
            Commands::Analyze(args) => {
                assert_eq!(args.input, Some(PathBuf::from("app.log")));
                assert_eq!(args.key.as_deref(), Some("sk-123"));
                assert_eq!(args.tier, Some(Tier::Pro));
                assert_eq!(args.project_root, Some(PathBuf::from("/srv/app")));
            }
            _ => panic!("expected Analyze command"),
        }
        assert_eq!(cli.output, OutputFormat::Json);
    }

    #[test]
    fn test_cli_parse_analyze_invalid_tier_fails() {
        let args = Cli::try_parse_from(["errsight", "analyze", "--tier", "platinum"]);
        assert!(args.is_err(), "unknown tier should be rejected");
    }

    #[test]
    fn test_cli_parse_rules_list() {
        let cli = Cli::try_parse_from(["errsight", "rules", "list", "--status", "enabled"])
            .expect("parse succeeded");
        match cli.command {
            Commands::Rules(rules_args) => match rules_args.action {
                RulesAction::List { dir, status } => {
                    assert!(dir.is_none());
                    assert_eq!(status.as_deref(), Some("enabled"));
                }
                _ => panic!("expected List action"),
            },
            _ => panic!("expected Rules command"),
        }
    }

    #[test]
    fn test_cli_parse_rules_validate_requires_path() {
        assert!(Cli::try_parse_from(["errsight", "rules", "validate"]).is_err());

        let cli = Cli::try_parse_from(["errsight", "rules", "validate", "/custom/rules"])
            .expect("parse succeeded");
        match cli.command {
            Commands::Rules(rules_args) => match rules_args.action {
                RulesAction::Validate { path } => {
                    assert_eq!(path, PathBuf::from("/custom/rules"));
                }
                _ => panic!("expected Validate action"),
            },
            _ => panic!("expected Rules command"),
        }
    }

    #[test]
    fn test_cli_parse_config_show_section() {
        let cli = Cli::try_parse_from([
            "errsight",
            "config",
            "show",
            "--section",
            "analyzer",
            "-c",
            "/etc/errsight.toml",
        ])
        .expect("parse succeeded");
        assert_eq!(cli.config, Some(PathBuf::from("/etc/errsight.toml")));
        match cli.command {
            Commands::Config(config_args) => match config_args.action {
                ConfigAction::Show { section } => {
                    assert_eq!(section.as_deref(), Some("analyzer"));
                }
                _ => panic!("expected Show action"),
            },
            _ => panic!("expected Config command"),
        }
    }

    #[test]
    fn test_cli_parse_log_level() {
        let cli = Cli::try_parse_from(["errsight", "--log-level", "debug", "config", "validate"])
            .expect("parse succeeded");
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_cli_parse_missing_command_fails() {
        assert!(Cli::try_parse_from(["errsight"]).is_err());
    }

    #[test]
    fn test_cli_verify_command_structure() {
        Cli::command().debug_assert();

        let cmd = Cli::command();
        assert_eq!(cmd.get_name(), "errsight");
        let subcommands: Vec<_> = cmd.get_subcommands().map(|s| s.get_name()).collect();
        for expected in ["analyze", "rules", "config"] {
            assert!(
                subcommands.contains(&expected),
                "should have '{expected}' subcommand"
            );
        }
    }
}
