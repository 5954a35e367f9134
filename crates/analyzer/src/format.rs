//! 출력 렌더링
//!
//! [`Formatter::render`]는 엔트리, 분류 결과, 컨텍스트를 티어에 맞는 출력으로
//! 변환합니다. 같은 입력에 대해 항상 같은 결과를 내는 순수 함수입니다.
//!
//! 구조화 형식(serde)과 사람용 텍스트 형식을 함께 생성합니다.
//! 컨텍스트 필드는 항상 code → history → environment 순서로 렌더링됩니다.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::SecondsFormat;
use serde::Serialize;

use errsight_core::types::{Feature, FeatureMask, Level, LogEntry, Tier};

use crate::context::{
    CodeSnippet, CommitInfo, ContextBundle, EnvironmentFacts, LocationRef, primary_location,
};
use crate::rule::MatchResult;

/// `{file}` 자리표시자의 기본값
const UNKNOWN_FILE: &str = "<unknown>";
/// `{line}` 자리표시자의 기본값
const UNKNOWN_LINE: &str = "?";

/// 렌더링된 엔트리
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedEntry {
    /// 티어 배지 (`[CORE]`, `[PRO]`, ...)
    pub badge: String,
    pub index: usize,
    /// 입력에서의 시작 줄 (1부터)
    pub line: usize,
    /// RFC 3339 (UTC, 초 단위)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub level: Level,
    /// 심각도 표시 접두어
    pub prefix: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// 규칙이 매칭되었지만 이 티어에서 노출되지 않음
    pub suppressed: bool,
    /// 규칙 설명 (ADVANCED_PATTERNS)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// 정규식 이름 캡처 (ADVANCED_PATTERNS)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub captures: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeSnippet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<CommitInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentFacts>,
    /// 텍스트 형식
    #[serde(skip)]
    pub text: String,
}

/// 출력 렌더러
pub struct Formatter;

impl Formatter {
    /// 엔트리 하나를 렌더링합니다.
    ///
    /// `features`가 허용하지 않는 컨텍스트 필드는 번들에 있어도 출력하지 않습니다.
    pub fn render(
        entry: &LogEntry,
        matched: &MatchResult,
        context: Option<&ContextBundle>,
        tier: Tier,
        features: FeatureMask,
    ) -> RenderedEntry {
        let suppressed = matched.is_suppressed(tier, features);
        let visible_rule = matched.rule.as_ref().filter(|_| !suppressed);
        let advanced = features.has(Feature::AdvancedPatterns);

        let signature = visible_rule.map(|rule| rule.signature.clone());
        let suggestion = visible_rule
            .filter(|rule| rule.required_tier <= tier && !rule.suggestion.is_empty())
            .map(|rule| {
                let location = primary_location(entry);
                render_template(&rule.suggestion, |name| {
                    placeholder(name, entry, &rule.signature, location.as_ref(), matched)
                })
            });
        let explanation = visible_rule
            .filter(|rule| advanced && !rule.description.is_empty())
            .map(|rule| rule.description.clone());
        let captures = if advanced && visible_rule.is_some() {
            matched.captures.clone()
        } else {
            BTreeMap::new()
        };

        let code = context
            .and_then(|c| c.code.clone())
            .filter(|_| features.has(Feature::ContextCode));
        let history = context
            .and_then(|c| c.history.clone())
            .filter(|_| features.has(Feature::ContextHistory));
        let environment = context
            .and_then(|c| c.environment.clone())
            .filter(|_| features.has(Feature::ContextEnv));

        let mut rendered = RenderedEntry {
            badge: tier.badge().to_owned(),
            index: entry.index,
            line: entry.line,
            timestamp: entry
                .timestamp
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
            level: entry.level,
            prefix: severity_prefix(entry.level),
            message: entry.message.clone(),
            stack: entry.stack.clone(),
            signature,
            suggestion,
            suppressed,
            explanation,
            captures,
            code,
            history,
            environment,
            text: String::new(),
        };
        rendered.text = render_text(&rendered);
        rendered
    }
}

/// 심각도별 표시 접두어
pub fn severity_prefix(level: Level) -> String {
    let marker = match level {
        Level::Fatal => "!!",
        Level::Error => "x",
        Level::Warn => "!",
        Level::Info => "i",
        Level::Debug => "-",
        Level::Trace => ".",
        Level::Unknown => "?",
    };
    format!("{marker} {}", level.as_str())
}

fn placeholder(
    name: &str,
    entry: &LogEntry,
    signature: &str,
    location: Option<&LocationRef>,
    matched: &MatchResult,
) -> Option<String> {
    match name {
        "message" => Some(entry.message.clone()),
        "level" => Some(entry.level.as_str().to_owned()),
        "signature" => Some(signature.to_owned()),
        "file" => Some(
            location
                .map(|l| l.path.clone())
                .unwrap_or_else(|| UNKNOWN_FILE.to_owned()),
        ),
        "line" => Some(
            location
                .map(|l| l.line.to_string())
                .unwrap_or_else(|| UNKNOWN_LINE.to_owned()),
        ),
        other => matched.captures.get(other).cloned(),
    }
}

/// `{name}` 자리표시자를 치환합니다.
///
/// 값이 없는 자리표시자와 짝이 맞지 않는 중괄호는 그대로 남깁니다.
pub fn render_template(template: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let name_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        let closed = name_len > 0 && after[name_len..].starts_with('}');
        if closed {
            let name = &after[..name_len];
            match lookup(name) {
                Some(value) => out.push_str(&value),
                None => {
                    out.push('{');
                    out.push_str(name);
                    out.push('}');
                }
            }
            rest = &after[name_len + 1..];
        } else {
            out.push('{');
            rest = after;
        }
    }
    out.push_str(rest);
    out
}

fn render_text(entry: &RenderedEntry) -> String {
    let mut out = String::new();
    out.push_str(&entry.badge);
    if let Some(ts) = &entry.timestamp {
        let _ = write!(out, " {ts}");
    }
    let _ = write!(out, " {} {}", entry.prefix, entry.message);

    if let Some(signature) = &entry.signature {
        let _ = write!(out, "\n  signature: {signature}");
    }
    if entry.suppressed {
        out.push_str("\n  note: matched a pattern that is not available on this tier");
    }
    if let Some(suggestion) = &entry.suggestion {
        let _ = write!(out, "\n  suggestion: {suggestion}");
    }
    if let Some(explanation) = &entry.explanation {
        let _ = write!(out, "\n  explanation: {explanation}");
    }
    if !entry.captures.is_empty() {
        let pairs: Vec<String> = entry
            .captures
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        let _ = write!(out, "\n  captures: {}", pairs.join(", "));
    }
    if let Some(stack) = &entry.stack {
        out.push_str("\n  stack:");
        for line in stack.lines() {
            let _ = write!(out, "\n    {line}");
        }
    }
    if let Some(code) = &entry.code {
        let _ = write!(
            out,
            "\n  code: {}:{}-{}",
            code.path, code.start_line, code.end_line
        );
        for line in code.render_lines().lines() {
            let _ = write!(out, "\n    {line}");
        }
    }
    if let Some(history) = &entry.history {
        out.push_str("\n  history:");
        for commit in history {
            let _ = write!(
                out,
                "\n    {} {} {}: {}",
                commit.id,
                commit.timestamp.format("%Y-%m-%d"),
                commit.author,
                commit.message
            );
        }
    }
    if let Some(environment) = &entry.environment {
        let _ = write!(out, "\n  environment: {}", environment.summary());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SnippetLine;
    use crate::rule::{MatchField, PatternRule, Predicate, RuleStatus};
    use chrono::{TimeZone, Utc};

    fn entry() -> LogEntry {
        LogEntry {
            index: 0,
            line: 1,
            raw: "2025-01-01 12:00:00 ERROR: KeyError: 'user_id'".to_owned(),
            timestamp: Some(Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()),
            level: Level::Error,
            message: "KeyError: 'user_id'".to_owned(),
            stack: Some("  File \"app/views.py\", line 42, in handler".to_owned()),
        }
    }

    fn rule(required_tier: Tier, advanced: bool) -> PatternRule {
        PatternRule {
            id: "python-key-error".to_owned(),
            signature: "python_key_error".to_owned(),
            description: "A dictionary lookup used a missing key.".to_owned(),
            priority: 75,
            required_tier,
            advanced,
            status: RuleStatus::Enabled,
            predicates: vec![Predicate::Contains {
                field: MatchField::Any,
                value: "KeyError".to_owned(),
            }],
            suggestion: "Key {key} missing at {file}:{line} ({unknown})".to_owned(),
            tags: vec![],
        }
    }

    fn matched(required_tier: Tier, advanced: bool) -> MatchResult {
        MatchResult {
            entry_index: 0,
            rule: Some(rule(required_tier, advanced)),
            captures: BTreeMap::from([("key".to_owned(), "'user_id'".to_owned())]),
        }
    }

    fn bundle() -> ContextBundle {
        ContextBundle {
            code: Some(CodeSnippet {
                path: "app/views.py".to_owned(),
                start_line: 41,
                end_line: 43,
                focus_line: 42,
                lines: vec![
                    SnippetLine { number: 41, text: "def handler():".to_owned() },
                    SnippetLine { number: 42, text: "    users[user_id]".to_owned() },
                    SnippetLine { number: 43, text: "".to_owned() },
                ],
            }),
            history: Some(vec![CommitInfo {
                id: "abc1234".to_owned(),
                author: "dev".to_owned(),
                timestamp: Utc.with_ymd_and_hms(2024, 12, 30, 9, 0, 0).unwrap(),
                message: "refactor handler".to_owned(),
            }]),
            environment: None,
        }
    }

    #[test]
    fn template_substitution() {
        let rendered = Formatter::render(
            &entry(),
            &matched(Tier::Core, false),
            None,
            Tier::Core,
            FeatureMask::NONE,
        );
        assert_eq!(
            rendered.suggestion.as_deref(),
            Some("Key 'user_id' missing at app/views.py:42 ({unknown})")
        );
        assert_eq!(rendered.badge, "[CORE]");
        assert_eq!(rendered.timestamp.as_deref(), Some("2025-01-01T12:00:00Z"));
        assert_eq!(rendered.prefix, "x ERROR");
        assert!(rendered.text.starts_with("[CORE] 2025-01-01T12:00:00Z x ERROR KeyError"));
    }

    #[test]
    fn template_without_location() {
        let out = render_template("at {file}:{line} {", |name| match name {
            "file" => Some(UNKNOWN_FILE.to_owned()),
            "line" => Some(UNKNOWN_LINE.to_owned()),
            _ => None,
        });
        assert_eq!(out, "at <unknown>:? {");
        assert_eq!(render_template("{} {a-b} {{x}}", |_| None), "{} {a-b} {{x}}");
    }

    #[test]
    fn suppressed_rule_renders_unenhanced() {
        let rendered = Formatter::render(
            &entry(),
            &matched(Tier::Team, false),
            None,
            Tier::Pro,
            FeatureMask::ALL,
        );
        assert!(rendered.suppressed);
        assert!(rendered.signature.is_none());
        assert!(rendered.suggestion.is_none());
        assert!(rendered.captures.is_empty());
        assert!(rendered.text.contains("not available on this tier"));
    }

    #[test]
    fn advanced_fields_require_feature() {
        let plain = Formatter::render(
            &entry(),
            &matched(Tier::Core, false),
            None,
            Tier::Enterprise,
            FeatureMask::CONTEXT_CODE,
        );
        assert!(plain.explanation.is_none());
        assert!(plain.captures.is_empty());

        let advanced = Formatter::render(
            &entry(),
            &matched(Tier::Core, false),
            None,
            Tier::Enterprise,
            FeatureMask::ALL,
        );
        assert!(advanced.explanation.is_some());
        assert_eq!(advanced.captures["key"], "'user_id'");
    }

    #[test]
    fn context_fields_follow_mask_and_order() {
        let bundle = bundle();
        let code_only = Formatter::render(
            &entry(),
            &MatchResult::unclassified(0),
            Some(&bundle),
            Tier::Pro,
            FeatureMask::CONTEXT_CODE,
        );
        assert!(code_only.code.is_some());
        assert!(code_only.history.is_none());

        let both = Formatter::render(
            &entry(),
            &MatchResult::unclassified(0),
            Some(&bundle),
            Tier::Team,
            FeatureMask::CONTEXT_CODE.union(FeatureMask::CONTEXT_HISTORY),
        );
        let code_pos = both.text.find("code:").unwrap();
        let history_pos = both.text.find("history:").unwrap();
        assert!(code_pos < history_pos);

        let json = serde_json::to_string(&both).unwrap();
        assert!(json.find("\"code\"").unwrap() < json.find("\"history\"").unwrap());
        assert!(!json.contains("\"text\""));
    }

    #[test]
    fn render_is_deterministic() {
        let bundle = bundle();
        let a = Formatter::render(
            &entry(),
            &matched(Tier::Core, false),
            Some(&bundle),
            Tier::Scale,
            FeatureMask::ALL,
        );
        let b = Formatter::render(
            &entry(),
            &matched(Tier::Core, false),
            Some(&bundle),
            Tier::Scale,
            FeatureMask::ALL,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_level_has_marker() {
        assert_eq!(severity_prefix(Level::Unknown), "? UNKNOWN");
        assert_eq!(severity_prefix(Level::Fatal), "!! FATAL");
    }
}
