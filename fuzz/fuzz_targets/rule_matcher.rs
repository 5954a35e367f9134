#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use errsight_analyzer::rule::matcher::{CompiledRule, MatchInput};
use errsight_analyzer::rule::{MatchField, PatternRule, Predicate, RuleStatus};
use errsight_core::types::{Level, LogEntry, Tier};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// 규칙 조건 목록 (최대 8개로 제한)
    predicates: Vec<FuzzPredicate>,
    message: String,
    stack: Option<String>,
    /// 필드당 매칭 바이트 상한
    max_bytes: u16,
}

#[derive(Arbitrary, Debug)]
enum FuzzPredicate {
    Contains(FuzzField, String),
    Regex(FuzzField, String),
    Level(FuzzLevel),
}

#[derive(Arbitrary, Debug, Clone, Copy)]
enum FuzzField {
    Message,
    Stack,
    Any,
}

#[derive(Arbitrary, Debug, Clone, Copy)]
enum FuzzLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl From<FuzzField> for MatchField {
    fn from(field: FuzzField) -> Self {
        match field {
            FuzzField::Message => MatchField::Message,
            FuzzField::Stack => MatchField::Stack,
            FuzzField::Any => MatchField::Any,
        }
    }
}

impl From<FuzzLevel> for Level {
    fn from(level: FuzzLevel) -> Self {
        match level {
            FuzzLevel::Debug => Level::Debug,
            FuzzLevel::Info => Level::Info,
            FuzzLevel::Warn => Level::Warn,
            FuzzLevel::Error => Level::Error,
            FuzzLevel::Fatal => Level::Fatal,
        }
    }
}

fuzz_target!(|input: FuzzInput| {
    let predicates: Vec<Predicate> = input
        .predicates
        .into_iter()
        .take(8)
        .map(|p| match p {
            FuzzPredicate::Contains(field, value) => Predicate::Contains {
                field: field.into(),
                value,
            },
            FuzzPredicate::Regex(field, pattern) => Predicate::Regex {
                field: field.into(),
                pattern,
            },
            FuzzPredicate::Level(level) => Predicate::Level {
                equals: level.into(),
            },
        })
        .collect();

    let rule = PatternRule {
        id: "fuzz-rule".to_owned(),
        signature: "fuzz".to_owned(),
        description: String::new(),
        priority: 0,
        required_tier: Tier::Core,
        advanced: false,
        status: RuleStatus::Enabled,
        predicates,
        suggestion: String::new(),
        tags: Vec::new(),
    };

    // 컴파일 실패는 크래시가 아님
    let Ok(compiled) = CompiledRule::compile(rule) else {
        return;
    };

    let entry = LogEntry {
        index: 0,
        line: 1,
        raw: input.message.clone(),
        timestamp: None,
        level: Level::Error,
        message: input.message,
        stack: input.stack,
    };

    let match_input = MatchInput::new(&entry, usize::from(input.max_bytes));
    let _ = compiled.evaluate(&match_input);
});
