//! `errsight config` command handler

use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;

use errsight_core::config::ErrsightConfig;
use errsight_core::error::ErrsightError;
use errsight_core::types::TierPolicy;

use super::LoadedConfig;
use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `config` command.
///
/// Takes the raw load result so `validate` can report a broken file instead of failing early.
pub fn execute(
    args: ConfigArgs,
    loaded: Result<&LoadedConfig, &ErrsightError>,
    source_hint: &str,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => {
            let report = validation_report(loaded, source_hint);
            writer.render(&report)?;
            if !report.valid {
                return Err(CliError::Config("configuration is invalid".to_owned()));
            }
            Ok(())
        }
        ConfigAction::Show { section } => {
            let loaded = loaded.map_err(|e| CliError::Config(e.to_string()))?;
            let report = show_report(loaded, section.as_deref())?;
            writer.render(&report)
        }
    }
}

pub fn validation_report(
    loaded: Result<&LoadedConfig, &ErrsightError>,
    source_hint: &str,
) -> ConfigValidationReport {
    match loaded {
        Ok(loaded) => ConfigValidationReport {
            source: loaded.source.clone(),
            valid: true,
            errors: Vec::new(),
        },
        Err(e) => ConfigValidationReport {
            source: source_hint.to_owned(),
            valid: false,
            errors: vec![e.to_string()],
        },
    }
}

/// Build the effective configuration display with API keys redacted.
///
/// `tiers` shows effective policies (defaults merged with overrides).
pub fn show_report(loaded: &LoadedConfig, section: Option<&str>) -> Result<ConfigReport, CliError> {
    let mut config = loaded.config.clone();
    redact_keys(&mut config);

    let config_toml = match section {
        None => to_toml(&config)?,
        Some("general") => to_toml(&config.general)?,
        Some("analyzer") => to_toml(&config.analyzer)?,
        Some("tiers") => {
            let policies: BTreeMap<String, TierPolicy> = config
                .tiers
                .policies()
                .into_iter()
                .map(|p| (p.tier.to_string(), p))
                .collect();
            to_toml(&policies)?
        }
        Some("keys") => {
            #[derive(Serialize)]
            struct Keys<'a> {
                keys: &'a [errsight_core::config::ApiKeyConfig],
            }
            to_toml(&Keys { keys: &config.keys })?
        }
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {other} (expected: general, analyzer, tiers, keys)"
            )));
        }
    };

    Ok(ConfigReport {
        source: loaded.source.clone(),
        section: section.map(str::to_owned),
        config_toml,
    })
}

fn to_toml<T: Serialize>(value: &T) -> Result<String, CliError> {
    toml::to_string_pretty(value)
        .map_err(|e| CliError::Command(format!("failed to serialize configuration: {e}")))
}

/// Replace API keys with a short prefix.
fn redact_keys(config: &mut ErrsightConfig) {
    for entry in &mut config.keys {
        entry.key = redact_key(&entry.key);
    }
}

fn redact_key(key: &str) -> String {
    const VISIBLE: usize = 4;
    match key.char_indices().nth(VISIBLE) {
        Some((idx, _)) => format!("{}***", &key[..idx]),
        None => "***".to_owned(),
    }
}

/// Configuration display report.
///
/// `config_toml` is text-only; JSON output carries the source and section.
#[derive(Serialize)]
pub struct ConfigReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(ref section) = self.section {
            let section_label = format!("[{section}]");
            writeln!(
                w,
                "Configuration {} (source: {})",
                section_label.bold(),
                self.source
            )?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }

        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;

        Ok(())
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    /// Empty when valid
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use errsight_core::config::ApiKeyConfig;
    use errsight_core::error::ConfigError;
    use errsight_core::types::Tier;

    fn loaded() -> LoadedConfig {
        let mut config = ErrsightConfig::default();
        config.keys.push(ApiKeyConfig {
            key: "sk-live-0123456789".to_owned(),
            tier: Tier::Team,
            label: "ci".to_owned(),
        });
        config.tiers.pro.daily_quota = Some(7);
        LoadedConfig {
            config,
            source: "errsight.toml".to_owned(),
        }
    }

    #[test]
    fn test_redact_key() {
        assert_eq!(redact_key("sk-live-0123456789"), "sk-l***");
        assert_eq!(redact_key("abc"), "***");
    }

    #[test]
    fn test_show_full_config_redacts_keys() {
        let report = show_report(&loaded(), None).unwrap();
        assert!(report.config_toml.contains("[general]"));
        assert!(report.config_toml.contains("sk-l***"));
        assert!(!report.config_toml.contains("0123456789"));
    }

    #[test]
    fn test_show_tiers_section_merges_defaults() {
        let report = show_report(&loaded(), Some("tiers")).unwrap();
        assert_eq!(report.section.as_deref(), Some("tiers"));
        assert!(report.config_toml.contains("[pro]"));
        assert!(report.config_toml.contains("daily_quota = 7"));
        assert!(report.config_toml.contains("[scale]"));
    }

    #[test]
    fn test_show_unknown_section() {
        let err = show_report(&loaded(), Some("quota")).err().unwrap();
        assert!(err.to_string().contains("unknown section"));
    }

    #[test]
    fn test_validation_report_invalid() {
        let err = ErrsightError::Config(ConfigError::ParseFailed {
            reason: "expected `]`".to_owned(),
        });
        let report = validation_report(Err(&err), "bad.toml");
        assert!(!report.valid);
        assert_eq!(report.source, "bad.toml");

        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("INVALID"));
        assert!(output.contains("expected `]`"));
    }

    #[test]
    fn test_validation_report_valid() {
        let loaded = loaded();
        let report = validation_report(Ok(&loaded), "ignored");
        assert!(report.valid);
        assert_eq!(report.source, "errsight.toml");
    }
}
