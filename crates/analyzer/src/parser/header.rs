//! 엔트리 헤더 형식
//!
//! [`HeaderFormat`]은 새 로그 엔트리의 시작 줄을 인식하는 정규식입니다.
//! 정규식은 `ts`, `level`, `msg` 이름 그룹을 사용하며 `ts`는 선택입니다.
//! `level` 그룹이 알려진 레벨(별칭 포함)로 해석되지 않으면 헤더로 보지 않습니다.

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

use errsight_core::types::Level;

use crate::error::AnalyzerError;

/// 헤더 줄에서 추출한 값
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderMatch {
    /// 타임스탬프 (UTC)
    pub timestamp: Option<DateTime<Utc>>,
    /// 심각도
    pub level: Level,
    /// 헤더 줄의 메시지 부분
    pub message: String,
    /// 헤더가 직접 가진 스택 (JSON 로그의 `stack` 필드 등)
    pub stack: Option<String>,
}

/// 정규식 기반 헤더 형식
#[derive(Debug, Clone)]
pub struct HeaderFormat {
    name: String,
    regex: Regex,
}

impl HeaderFormat {
    /// 새 헤더 형식을 생성합니다.
    ///
    /// 정규식에 `level`과 `msg` 이름 그룹이 없으면 에러를 반환합니다.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, AnalyzerError> {
        let name = name.into();
        let regex = Regex::new(pattern)?;
        let groups: Vec<&str> = regex.capture_names().flatten().collect();
        for required in ["level", "msg"] {
            if !groups.contains(&required) {
                return Err(AnalyzerError::Config {
                    field: format!("header_format.{name}"),
                    reason: format!("pattern must define a named group '{required}'"),
                });
            }
        }
        Ok(Self { name, regex })
    }

    /// 형식 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `YYYY-MM-DD HH:MM:SS[.,fff][Z|+hh:mm] LEVEL[:] message`
    pub fn iso_timestamp() -> Result<Self, AnalyzerError> {
        Self::new(
            "iso",
            r"^(?P<ts>\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d{1,9})?(?:Z|[+-]\d{2}:?\d{2})?)\s+\[?(?P<level>[A-Za-z]+)\]?:?(?:\s+|$)(?P<msg>.*)$",
        )
    }

    /// Python logging `%(asctime)s - %(name)s - %(levelname)s - %(message)s`
    pub fn iso_dashed() -> Result<Self, AnalyzerError> {
        Self::new(
            "iso-dashed",
            r"^(?P<ts>\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d{1,9})?)\s+-\s+(?:[\w.\-]+\s+-\s+)?(?P<level>[A-Za-z]+)\s+-\s+(?P<msg>.*)$",
        )
    }

    /// `[timestamp] [LEVEL] message` / `[timestamp] LEVEL: message`
    pub fn bracketed() -> Result<Self, AnalyzerError> {
        Self::new(
            "bracketed",
            r"^\[(?P<ts>[^\]]+)\]\s*\[?(?P<level>[A-Za-z]+)\]?:?(?:\s+|$)(?P<msg>.*)$",
        )
    }

    /// `LEVEL: message` / `LEVEL:logger:message`
    pub fn level_prefix() -> Result<Self, AnalyzerError> {
        Self::new(
            "level-prefix",
            r"^(?P<level>[A-Za-z]+):(?:[\w.\-]+:)?\s*(?P<msg>.*)$",
        )
    }

    /// 기본 헤더 형식 목록 (시도 순서대로)
    ///
    /// 컴파일에 실패한 형식은 경고 로그를 남기고 제외합니다.
    pub fn defaults() -> Vec<Self> {
        [
            Self::iso_timestamp(),
            Self::iso_dashed(),
            Self::bracketed(),
            Self::level_prefix(),
        ]
        .into_iter()
        .filter_map(|format| match format {
            Ok(format) => Some(format),
            Err(e) => {
                tracing::warn!(error = %e, "built-in header format skipped");
                None
            }
        })
        .collect()
    }

    /// 줄이 이 형식의 헤더이면 추출 결과를 반환합니다.
    pub fn match_line(&self, line: &str) -> Option<HeaderMatch> {
        let caps = self.regex.captures(line)?;
        let level = Level::from_str_loose(caps.name("level")?.as_str())?;
        let timestamp = caps
            .name("ts")
            .and_then(|ts| parse_timestamp(ts.as_str()));
        let message = caps
            .name("msg")
            .map(|m| m.as_str().trim_end().to_owned())
            .unwrap_or_default();
        Some(HeaderMatch {
            timestamp,
            level,
            message,
            stack: None,
        })
    }
}

/// 흔한 로그 타임스탬프 문자열을 UTC로 파싱합니다.
///
/// 오프셋이 없으면 UTC로 간주합니다. 해석할 수 없으면 `None`입니다.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let normalized = raw.trim().replacen(' ', "T", 1).replace(',', ".");

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    // Apache/nginx 스타일: 15/Jan/2025:10:00:00 +0000
    if let Ok(dt) = DateTime::parse_from_str(raw.trim(), "%d/%b/%Y:%H:%M:%S %z") {
        return Some(dt.with_timezone(&Utc));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn builtin_formats_compile() {
        let names: Vec<String> = HeaderFormat::defaults()
            .iter()
            .map(|f| f.name().to_owned())
            .collect();
        assert_eq!(names, ["iso", "iso-dashed", "bracketed", "level-prefix"]);
    }

    #[test]
    fn iso_header_with_colon() {
        let m = HeaderFormat::iso_timestamp()
            .unwrap()
            .match_line("2025-01-01 12:00:00 ERROR: Database connection failed")
            .unwrap();
        assert_eq!(m.level, Level::Error);
        assert_eq!(m.message, "Database connection failed");
        assert_eq!(
            m.timestamp,
            Some(Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn iso_header_with_millis_and_offset() {
        let m = HeaderFormat::iso_timestamp()
            .unwrap()
            .match_line("2025-03-04T05:06:07,250+02:00 WARNING disk almost full")
            .unwrap();
        assert_eq!(m.level, Level::Warn);
        assert_eq!(
            m.timestamp,
            Some(Utc.with_ymd_and_hms(2025, 3, 4, 3, 6, 7).unwrap() + chrono::Duration::milliseconds(250))
        );
    }

    #[test]
    fn iso_header_requires_known_level() {
        assert!(
            HeaderFormat::iso_timestamp()
                .unwrap()
                .match_line("2025-01-01 12:00:00 Starting server")
                .is_none()
        );
    }

    #[test]
    fn iso_dashed_python_format() {
        let m = HeaderFormat::iso_dashed()
            .unwrap()
            .match_line("2025-01-01 12:00:00,123 - app.db - CRITICAL - pool exhausted")
            .unwrap();
        assert_eq!(m.level, Level::Fatal);
        assert_eq!(m.message, "pool exhausted");
    }

    #[test]
    fn bracketed_header() {
        let m = HeaderFormat::bracketed()
            .unwrap()
            .match_line("[2025-01-01 12:00:00] [error] upstream timed out")
            .unwrap();
        assert_eq!(m.level, Level::Error);
        assert_eq!(m.message, "upstream timed out");
        assert!(m.timestamp.is_some());
    }

    #[test]
    fn level_prefix_with_logger() {
        let m = HeaderFormat::level_prefix()
            .unwrap()
            .match_line("ERROR:app.db:Connection refused: localhost:5432")
            .unwrap();
        assert_eq!(m.level, Level::Error);
        assert_eq!(m.message, "Connection refused: localhost:5432");
        assert_eq!(m.timestamp, None);
    }

    #[test]
    fn level_prefix_rejects_exception_names() {
        let format = HeaderFormat::level_prefix().unwrap();
        assert!(format.match_line("KeyError: 'user_id'").is_none());
        assert!(format.match_line("Traceback (most recent call last):").is_none());
    }

    #[test]
    fn custom_format_requires_named_groups() {
        let err = HeaderFormat::new("broken", r"^(?P<level>\w+) ").unwrap_err();
        assert!(err.to_string().contains("msg"));
    }

    #[test]
    fn parse_timestamp_variants() {
        assert!(parse_timestamp("2025-01-01T12:00:00Z").is_some());
        assert!(parse_timestamp("2025-01-01 12:00:00.123").is_some());
        assert!(parse_timestamp("2025-01-01T12:00:00+0900").is_some());
        assert!(parse_timestamp("15/Jan/2025:10:00:00 +0000").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
