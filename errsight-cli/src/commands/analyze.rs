//! `errsight analyze` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use errsight_analyzer::{
    AnalysisRequest, AnalysisResponse, AnalyzerConfig, ProcessingResult, ProcessorBuilder,
};
use errsight_core::types::Tier;

use super::LoadedConfig;
use crate::cli::AnalyzeArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Environment variable consulted when `--key` is not given.
pub const API_KEY_ENV: &str = "ERRSIGHT_API_KEY";

/// Execute the `analyze` command.
pub async fn execute(
    args: AnalyzeArgs,
    loaded: &LoadedConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let text = read_input(args.input.as_deref()).await?;
    let api_key = args
        .key
        .clone()
        .or_else(|| std::env::var(API_KEY_ENV).ok())
        .unwrap_or_default();
    let config = analyzer_config(&args, loaded, &api_key);

    info!(
        source = %loaded.source,
        bytes = text.len(),
        project_root = %config.project_root,
        "analyzing log input"
    );

    let processor = ProcessorBuilder::new().config(config).build().await?;
    let mut request = AnalysisRequest::new(text, api_key);
    if let Some(tier) = args.tier {
        request = request.with_tier_hint(tier);
    }

    let result = processor.process(request).await?;
    writer.render(&AnalyzeReport::from_result(&result))
}

/// Derive the analyzer config from the loaded config and command-line overrides.
///
/// A local run with no key and no key table falls back to anonymous core tier.
pub fn analyzer_config(args: &AnalyzeArgs, loaded: &LoadedConfig, api_key: &str) -> AnalyzerConfig {
    let mut config = AnalyzerConfig::from_core(&loaded.config);
    if let Some(root) = &args.project_root {
        config.project_root = root.display().to_string();
    }
    if let Some(dir) = &args.rules {
        config.rule_dir = dir.display().to_string();
    }
    if api_key.is_empty() && config.anonymous_tier.is_none() && config.keys.is_empty() {
        debug!("no API keys configured, running anonymously at core tier");
        config.anonymous_tier = Some(Tier::Core);
    }
    config
}

/// Read the whole input from a file, or stdin for `None` / `-`.
///
/// Invalid UTF-8 is replaced rather than rejected.
pub async fn read_input(path: Option<&Path>) -> Result<String, CliError> {
    let bytes = match path {
        Some(path) if path != Path::new("-") => tokio::fs::read(path).await.map_err(|e| {
            CliError::Command(format!("failed to read {}: {e}", path.display()))
        })?,
        _ => {
            let mut buf = Vec::new();
            tokio::io::stdin().read_to_end(&mut buf).await?;
            buf
        }
    };
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Analysis output.
///
/// JSON carries the response wire format; text uses the per-entry text rendering.
#[derive(Serialize)]
pub struct AnalyzeReport {
    pub request_id: String,
    #[serde(flatten)]
    pub response: AnalysisResponse,
    #[serde(skip)]
    pub text: String,
}

impl AnalyzeReport {
    pub fn from_result(result: &ProcessingResult) -> Self {
        Self {
            request_id: result.request_id.to_string(),
            response: result.to_response(),
            text: result.to_text(),
        }
    }
}

impl Render for AnalyzeReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if self.response.entries.is_empty() {
            writeln!(w, "No log entries found.")?;
        } else {
            writeln!(w, "{}", self.text)?;
        }

        writeln!(w)?;
        let summary = format!(
            "{} entries | tier {} | {} ms",
            self.response.entries.len(),
            self.response.tier_used.badge(),
            self.response.processing_time
        );
        write!(w, "{}", summary.dimmed())?;
        if self.response.truncated {
            write!(w, " | {}", "truncated: request time budget exhausted".yellow())?;
        }
        writeln!(w)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use errsight_core::config::{ApiKeyConfig, ErrsightConfig};
    use std::path::PathBuf;

    fn args() -> AnalyzeArgs {
        AnalyzeArgs {
            input: None,
            key: None,
            tier: None,
            project_root: None,
            rules: None,
        }
    }

    fn loaded(config: ErrsightConfig) -> LoadedConfig {
        LoadedConfig {
            config,
            source: "<test>".to_owned(),
        }
    }

    #[test]
    fn test_keyless_local_run_is_anonymous_core() {
        let config = analyzer_config(&args(), &loaded(ErrsightConfig::default()), "");
        assert_eq!(config.anonymous_tier, Some(Tier::Core));
    }

    #[test]
    fn test_configured_keys_disable_anonymous_fallback() {
        let mut core = ErrsightConfig::default();
        core.keys.push(ApiKeyConfig {
            key: "sk-1".to_owned(),
            tier: Tier::Pro,
            label: "ci".to_owned(),
        });
        let config = analyzer_config(&args(), &loaded(core), "");
        assert_eq!(config.anonymous_tier, None);
    }

    #[test]
    fn test_overrides_apply() {
        let mut a = args();
        a.project_root = Some(PathBuf::from("/srv/app"));
        a.rules = Some(PathBuf::from("/etc/errsight/rules"));
        let config = analyzer_config(&a, &loaded(ErrsightConfig::default()), "sk-1");
        assert_eq!(config.project_root, "/srv/app");
        assert_eq!(config.rule_dir, "/etc/errsight/rules");
        assert_eq!(config.anonymous_tier, None);
    }

    #[tokio::test]
    async fn test_read_input_replaces_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, b"ERROR: bad \xff byte").unwrap();

        let text = read_input(Some(&path)).await.unwrap();
        assert!(text.starts_with("ERROR: bad "));
        assert!(text.contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn test_read_input_missing_file() {
        let err = read_input(Some(Path::new("/nonexistent/app.log")))
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Command(_)));
    }

    #[tokio::test]
    async fn test_report_renders_entries_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = args();
        a.project_root = Some(dir.path().to_path_buf());
        let config = analyzer_config(&a, &loaded(ErrsightConfig::default()), "");
        let processor = ProcessorBuilder::new().config(config).build().await.unwrap();
        let result = processor
            .process(AnalysisRequest::new(
                "2025-01-01 12:00:00 ERROR: Database connection failed",
                "",
            ))
            .await
            .unwrap();

        let report = AnalyzeReport::from_result(&result);
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("Database connection failed"));
        assert!(output.contains("1 entries"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["tier_used"], "core");
        assert!(json.get("text").is_none());
        assert_eq!(json["entries"].as_array().map(Vec::len), Some(1));
    }
}
