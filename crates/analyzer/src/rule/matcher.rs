//! 규칙 매칭 로직 -- 조건 평가 및 정규식 사전 컴파일
//!
//! [`CompiledRule`]은 규칙 로딩 시 정규식을 한 번만 컴파일하고, `contains` 값을
//! 소문자로 정규화해 둡니다. 매칭 대상 텍스트는 [`MatchInput`]으로 엔트리당 한 번
//! 준비되며 필드별 `max_match_bytes`로 잘립니다.

use std::collections::BTreeMap;

use regex::Regex;

use errsight_core::types::{Level, LogEntry};

use super::types::{MatchField, PatternRule, Predicate};
use crate::error::AnalyzerError;

/// 컴파일된 조건
#[derive(Debug, Clone)]
enum CompiledPredicate {
    Contains { field: MatchField, needle: String },
    Regex { field: MatchField, regex: Regex },
    Level(Level),
}

/// 컴파일된 규칙
#[derive(Debug, Clone)]
pub struct CompiledRule {
    rule: PatternRule,
    predicates: Vec<CompiledPredicate>,
}

impl CompiledRule {
    /// 규칙을 검증하고 정규식을 컴파일합니다.
    pub fn compile(rule: PatternRule) -> Result<Self, AnalyzerError> {
        rule.validate()?;

        let mut predicates = Vec::with_capacity(rule.predicates.len());
        for (idx, predicate) in rule.predicates.iter().enumerate() {
            let compiled = match predicate {
                Predicate::Contains { field, value } => CompiledPredicate::Contains {
                    field: *field,
                    needle: value.to_lowercase(),
                },
                Predicate::Regex { field, pattern } => {
                    let regex =
                        Regex::new(pattern).map_err(|e| AnalyzerError::RuleValidation {
                            rule_id: rule.id.clone(),
                            reason: format!("invalid regex in match[{idx}]: {e}"),
                        })?;
                    CompiledPredicate::Regex {
                        field: *field,
                        regex,
                    }
                }
                Predicate::Level { equals } => CompiledPredicate::Level(*equals),
            };
            predicates.push(compiled);
        }

        Ok(Self { rule, predicates })
    }

    /// 원본 규칙
    pub fn rule(&self) -> &PatternRule {
        &self.rule
    }

    /// 모든 조건이 만족하면 수집된 이름 캡처를 반환합니다.
    ///
    /// 조건은 AND 결합이며 순서대로 평가됩니다. 같은 이름의 캡처는 뒤의 조건이 덮어씁니다.
    pub fn evaluate(&self, input: &MatchInput<'_>) -> Option<BTreeMap<String, String>> {
        let mut captures = BTreeMap::new();

        for predicate in &self.predicates {
            let matched = match predicate {
                CompiledPredicate::Contains { field, needle } => {
                    input.lowered(*field).contains(needle.as_str())
                }
                CompiledPredicate::Regex { field, regex } => {
                    match regex.captures(input.text(*field)) {
                        Some(caps) => {
                            for name in regex.capture_names().flatten() {
                                if let Some(m) = caps.name(name) {
                                    captures.insert(name.to_owned(), m.as_str().to_owned());
                                }
                            }
                            true
                        }
                        None => false,
                    }
                }
                CompiledPredicate::Level(level) => input.level == *level,
            };

            if !matched {
                return None;
            }
        }

        Some(captures)
    }
}

/// 엔트리당 한 번 준비되는 매칭 대상 텍스트
#[derive(Debug)]
pub struct MatchInput<'a> {
    level: Level,
    message: &'a str,
    stack: &'a str,
    any: String,
    message_lower: String,
    stack_lower: String,
    any_lower: String,
}

impl<'a> MatchInput<'a> {
    /// 엔트리에서 매칭 대상을 준비합니다. 각 필드는 `max_bytes`로 잘립니다.
    pub fn new(entry: &'a LogEntry, max_bytes: usize) -> Self {
        let message = truncate_at_boundary(&entry.message, max_bytes);
        let stack = entry
            .stack
            .as_deref()
            .map(|s| truncate_at_boundary(s, max_bytes))
            .unwrap_or_default();
        let any = if stack.is_empty() {
            message.to_owned()
        } else {
            format!("{message}\n{stack}")
        };
        Self {
            level: entry.level,
            message,
            stack,
            message_lower: message.to_lowercase(),
            stack_lower: stack.to_lowercase(),
            any_lower: any.to_lowercase(),
            any,
        }
    }

    fn text(&self, field: MatchField) -> &str {
        match field {
            MatchField::Message => self.message,
            MatchField::Stack => self.stack,
            MatchField::Any => &self.any,
        }
    }

    fn lowered(&self, field: MatchField) -> &str {
        match field {
            MatchField::Message => &self.message_lower,
            MatchField::Stack => &self.stack_lower,
            MatchField::Any => &self.any_lower,
        }
    }
}

/// UTF-8 경계를 지키며 최대 `max_bytes`까지 자릅니다.
pub fn truncate_at_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::super::types::RuleStatus;
    use super::*;
    use errsight_core::types::Tier;

    fn entry(level: Level, message: &str, stack: Option<&str>) -> LogEntry {
        LogEntry {
            index: 0,
            line: 1,
            raw: message.to_owned(),
            timestamp: None,
            level,
            message: message.to_owned(),
            stack: stack.map(str::to_owned),
        }
    }

    fn rule(predicates: Vec<Predicate>) -> PatternRule {
        PatternRule {
            id: "test".to_owned(),
            signature: "test_signature".to_owned(),
            description: String::new(),
            priority: 0,
            required_tier: Tier::Core,
            advanced: false,
            status: RuleStatus::Enabled,
            predicates,
            suggestion: String::new(),
            tags: vec![],
        }
    }

    fn contains(field: MatchField, value: &str) -> Predicate {
        Predicate::Contains {
            field,
            value: value.to_owned(),
        }
    }

    #[test]
    fn contains_is_case_insensitive() {
        let compiled = CompiledRule::compile(rule(vec![contains(
            MatchField::Message,
            "CONNECTION FAILED",
        )]))
        .unwrap();
        let e = entry(Level::Error, "Database connection failed", None);
        assert!(compiled.evaluate(&MatchInput::new(&e, 1024)).is_some());
    }

    #[test]
    fn predicates_are_anded() {
        let compiled = CompiledRule::compile(rule(vec![
            contains(MatchField::Any, "timeout"),
            Predicate::Level {
                equals: Level::Error,
            },
        ]))
        .unwrap();
        let warn = entry(Level::Warn, "read timeout", None);
        let error = entry(Level::Error, "read timeout", None);
        assert!(compiled.evaluate(&MatchInput::new(&warn, 1024)).is_none());
        assert!(compiled.evaluate(&MatchInput::new(&error, 1024)).is_some());
    }

    #[test]
    fn field_targeting() {
        let compiled =
            CompiledRule::compile(rule(vec![contains(MatchField::Stack, "KeyError")])).unwrap();
        let in_message = entry(Level::Error, "KeyError raised", None);
        let in_stack = entry(Level::Error, "failed", Some("KeyError: 'id'"));
        assert!(compiled.evaluate(&MatchInput::new(&in_message, 1024)).is_none());
        assert!(compiled.evaluate(&MatchInput::new(&in_stack, 1024)).is_some());
    }

    #[test]
    fn regex_named_captures_are_collected() {
        let compiled = CompiledRule::compile(rule(vec![Predicate::Regex {
            field: MatchField::Any,
            pattern: r"KeyError: '(?P<key>[^']+)'".to_owned(),
        }]))
        .unwrap();
        let e = entry(Level::Error, "failed", Some("KeyError: 'user_id'"));
        let captures = compiled.evaluate(&MatchInput::new(&e, 1024)).unwrap();
        assert_eq!(captures.get("key").map(String::as_str), Some("user_id"));
    }

    #[test]
    fn invalid_regex_fails_compile() {
        let err = CompiledRule::compile(rule(vec![Predicate::Regex {
            field: MatchField::Any,
            pattern: "(unclosed".to_owned(),
        }]))
        .unwrap_err();
        assert!(matches!(err, AnalyzerError::RuleValidation { .. }));
    }

    #[test]
    fn matching_is_bounded_by_max_bytes() {
        let compiled =
            CompiledRule::compile(rule(vec![contains(MatchField::Message, "needle")])).unwrap();
        let long = format!("{}needle", "x".repeat(100));
        let e = entry(Level::Error, &long, None);
        assert!(compiled.evaluate(&MatchInput::new(&e, 50)).is_none());
        assert!(compiled.evaluate(&MatchInput::new(&e, 200)).is_some());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "가나다";
        assert_eq!(truncate_at_boundary(text, 4), "가");
        assert_eq!(truncate_at_boundary(text, 100), text);
        assert_eq!(truncate_at_boundary(text, 0), "");
    }
}
