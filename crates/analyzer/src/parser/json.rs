//! JSON 라인 헤더 파서
//!
//! 한 줄짜리 JSON 객체 로그를 엔트리 헤더로 인식합니다.
//! 로그 라이브러리마다 필드 이름이 다르므로 후보 이름 목록을 순서대로 시도합니다.
//!
//! # 지원 형식
//! - tracing/serde_json: `{"timestamp":..., "level":"ERROR", "message":...}`
//! - bunyan/pino: `{"time":..., "level":50, "msg":...}` (숫자 레벨)
//! - 중첩 필드는 dot notation으로 접근 (`error.stack`)

use errsight_core::types::Level;

use super::header::{HeaderMatch, parse_timestamp};

/// JSON 로그 필드 매핑 설정
///
/// 각 목록은 앞에서부터 시도되며 처음 발견된 값을 사용합니다.
#[derive(Debug, Clone)]
pub struct JsonFieldMapping {
    /// 타임스탬프 필드 후보
    pub timestamp_fields: Vec<String>,
    /// 레벨 필드 후보
    pub level_fields: Vec<String>,
    /// 메시지 필드 후보
    pub message_fields: Vec<String>,
    /// 스택 트레이스 필드 후보
    pub stack_fields: Vec<String>,
}

impl Default for JsonFieldMapping {
    fn default() -> Self {
        fn owned(names: &[&str]) -> Vec<String> {
            names.iter().map(|s| (*s).to_owned()).collect()
        }
        Self {
            timestamp_fields: owned(&["timestamp", "time", "ts", "@timestamp"]),
            level_fields: owned(&["level", "severity", "lvl", "levelname"]),
            message_fields: owned(&["message", "msg", "fields.message"]),
            stack_fields: owned(&["stack", "stack_trace", "exception", "traceback", "error.stack"]),
        }
    }
}

/// JSON 라인 파서
#[derive(Debug, Clone, Default)]
pub struct JsonLineParser {
    mapping: JsonFieldMapping,
}

impl JsonLineParser {
    /// 커스텀 필드 매핑으로 새 파서를 생성합니다.
    pub fn new(mapping: JsonFieldMapping) -> Self {
        Self { mapping }
    }

    /// 줄이 레벨을 가진 JSON 객체이면 헤더로 해석합니다.
    pub fn match_line(&self, line: &str) -> Option<HeaderMatch> {
        let trimmed = line.trim();
        if !trimmed.starts_with('{') || !trimmed.ends_with('}') {
            return None;
        }
        let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
        if !value.is_object() {
            return None;
        }

        let level = self
            .mapping
            .level_fields
            .iter()
            .find_map(|field| lookup(&value, field))
            .and_then(level_from_value)?;

        let message = self
            .mapping
            .message_fields
            .iter()
            .find_map(|field| extract_string(&value, field))
            .unwrap_or_default();

        let timestamp = self
            .mapping
            .timestamp_fields
            .iter()
            .find_map(|field| extract_string(&value, field))
            .and_then(|ts| parse_timestamp(&ts));

        let stack = self
            .mapping
            .stack_fields
            .iter()
            .find_map(|field| extract_string(&value, field))
            .filter(|s| !s.trim().is_empty());

        Some(HeaderMatch {
            timestamp,
            level,
            message,
            stack,
        })
    }
}

/// dot notation으로 중첩 값을 찾습니다 (예: "error.stack").
fn lookup<'a>(value: &'a serde_json::Value, field: &str) -> Option<&'a serde_json::Value> {
    field
        .split('.')
        .try_fold(value, |current, part| current.get(part))
}

fn extract_string(value: &serde_json::Value, field: &str) -> Option<String> {
    match lookup(value, field)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// 문자열 레벨 또는 bunyan/pino 숫자 레벨을 변환합니다.
fn level_from_value(value: &serde_json::Value) -> Option<Level> {
    match value {
        serde_json::Value::String(s) => Level::from_str_loose(s),
        serde_json::Value::Number(n) => match n.as_u64()? {
            0..=10 => Some(Level::Trace),
            11..=20 => Some(Level::Debug),
            21..=30 => Some(Level::Info),
            31..=40 => Some(Level::Warn),
            41..=50 => Some(Level::Error),
            _ => Some(Level::Fatal),
        },
        _ => None,
    }
}
