//! `errsight rules` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use errsight_analyzer::rule::{BUILTIN_RULES, RuleStatus};
use errsight_analyzer::{PatternRule, RuleLoader};
use errsight_core::types::Tier;

use super::LoadedConfig;
use crate::cli::{RulesAction, RulesArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `rules` command.
pub async fn execute(
    args: RulesArgs,
    loaded: &LoadedConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        RulesAction::List { dir, status } => {
            let dir = dir
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| loaded.config.analyzer.rule_dir.clone());
            let report = list_rules(&dir, status.as_deref()).await?;
            writer.render(&report)
        }
        RulesAction::Validate { path } => {
            let report = validate_rules(&path).await?;
            writer.render(&report)?;
            if report.invalid > 0 {
                return Err(CliError::Rule(format!(
                    "{} invalid rule file(s)",
                    report.invalid
                )));
            }
            Ok(())
        }
    }
}

/// Build the rule listing in evaluation order (priority descending, then registration).
///
/// An empty `rule_dir` lists the built-in catalog.
pub async fn list_rules(
    rule_dir: &str,
    status_filter: Option<&str>,
) -> Result<RuleListReport, CliError> {
    let status_filter = status_filter.map(parse_status).transpose()?;

    let (source, mut rules) = if rule_dir.trim().is_empty() {
        (
            "<builtin>".to_owned(),
            RuleLoader::parse_yaml(BUILTIN_RULES, "<builtin>")?,
        )
    } else {
        info!(rule_dir, "loading pattern rules");
        (rule_dir.to_owned(), RuleLoader::load_directory(rule_dir).await?)
    };

    rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    let rules: Vec<RuleEntry> = rules
        .into_iter()
        .filter(|r| status_filter.is_none_or(|s| r.status == s))
        .map(RuleEntry::from)
        .collect();

    Ok(RuleListReport {
        source,
        total: rules.len(),
        rules,
    })
}

/// Validate every rule file in `path`, one result per file.
pub async fn validate_rules(path: &Path) -> Result<RuleValidationReport, CliError> {
    info!(path = %path.display(), "validating pattern rules");

    let reports = RuleLoader::validate_directory(path).await?;
    let mut report = RuleValidationReport {
        path: path.display().to_string(),
        total_files: reports.len(),
        valid: 0,
        invalid: 0,
        rules: 0,
        errors: Vec::new(),
    };

    for file in reports {
        match file.result {
            Ok(count) => {
                report.valid += 1;
                report.rules += count;
            }
            Err(e) => {
                report.invalid += 1;
                report.errors.push(RuleFileError {
                    file: file.path.display().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}

fn parse_status(raw: &str) -> Result<RuleStatus, CliError> {
    match raw.to_ascii_lowercase().as_str() {
        "enabled" => Ok(RuleStatus::Enabled),
        "disabled" => Ok(RuleStatus::Disabled),
        other => Err(CliError::Command(format!(
            "unknown rule status: {other} (expected: enabled, disabled)"
        ))),
    }
}

#[derive(Debug, Serialize)]
pub struct RuleListReport {
    pub source: String,
    pub total: usize,
    pub rules: Vec<RuleEntry>,
}

#[derive(Debug, Serialize)]
pub struct RuleEntry {
    pub id: String,
    pub signature: String,
    pub priority: i32,
    pub required_tier: Tier,
    pub status: RuleStatus,
    pub tags: Vec<String>,
}

impl From<PatternRule> for RuleEntry {
    fn from(rule: PatternRule) -> Self {
        Self {
            id: rule.id,
            signature: rule.signature,
            priority: rule.priority,
            required_tier: rule.required_tier,
            status: rule.status,
            tags: rule.tags,
        }
    }
}

impl Render for RuleListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Pattern Rules ({} total, source: {})",
            self.total.to_string().bold(),
            self.source
        )?;
        writeln!(w)?;
        writeln!(
            w,
            "{:<28} {:<32} {:>8} {:<12} {:<10} Tags",
            "ID", "Signature", "Priority", "Tier", "Status"
        )?;
        writeln!(w, "{}", "-".repeat(100))?;

        for r in &self.rules {
            let status = match r.status {
                RuleStatus::Enabled => "enabled".green(),
                RuleStatus::Disabled => "disabled".yellow(),
            };
            writeln!(
                w,
                "{:<28} {:<32} {:>8} {:<12} {:<10} {}",
                r.id,
                r.signature,
                r.priority,
                r.required_tier.badge(),
                status,
                r.tags.join(", ")
            )?;
        }

        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct RuleValidationReport {
    pub path: String,
    pub total_files: usize,
    pub valid: usize,
    pub invalid: usize,
    /// Rules loaded from the valid files
    pub rules: usize,
    pub errors: Vec<RuleFileError>,
}

#[derive(Debug, Serialize)]
pub struct RuleFileError {
    pub file: String,
    pub error: String,
}

impl Render for RuleValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Rule Validation: {}", self.path.bold())?;
        writeln!(
            w,
            "  Files: {} total, {} valid, {} invalid ({} rules)",
            self.total_files,
            self.valid.to_string().green(),
            if self.invalid > 0 {
                self.invalid.to_string().red()
            } else {
                self.invalid.to_string().normal()
            },
            self.rules
        )?;

        if !self.errors.is_empty() {
            writeln!(w)?;
            writeln!(w, "Errors:")?;
            for e in &self.errors {
                writeln!(w, "  {}: {}", e.file.red(), e.error)?;
            }
        }

        Ok(())
    }
}
