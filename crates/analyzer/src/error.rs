//! 분석기 에러 타입
//!
//! [`AnalyzerError`]는 분석 파이프라인에서 발생하는 모든 에러를 표현합니다.
//! `From<AnalyzerError> for ErrsightError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.
//!
//! 요청 경로의 에러(`Auth`, `QuotaExceeded`, `InputTooLarge`, `Internal`)는
//! 호출자에게 그대로 노출되며, 시작 시점 에러(`RuleLoad`, `RuleValidation`, `Config`)는
//! 카탈로그/설정 구성 단계에서만 발생합니다.

use chrono::{DateTime, SecondsFormat, Utc};
use errsight_core::error::{ConfigError, ErrsightError, PipelineError, PolicyError, RuleError};

/// 분석기 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    /// API 키가 없거나 알 수 없음
    #[error("unauthorized: {0}")]
    Auth(String),

    /// 일일 쿼터 소진
    #[error("daily quota of {limit} requests exceeded, resets at {}", .reset_at.to_rfc3339_opts(SecondsFormat::Secs, true))]
    QuotaExceeded {
        /// 티어의 일일 쿼터
        limit: u64,
        /// 다음 쿼터 윈도우 시작 시각 (다음 UTC 자정)
        reset_at: DateTime<Utc>,
    },

    /// 입력이 티어의 최대 크기를 초과
    #[error("input too large: {size} bytes (max: {max})")]
    InputTooLarge {
        /// 입력 크기 (바이트)
        size: usize,
        /// 티어의 최대 입력 크기 (바이트)
        max: usize,
    },

    /// 예기치 못한 내부 오류 (세부 내용은 로그에만 남김)
    #[error("internal error: {0}")]
    Internal(String),

    /// 규칙 파일 로딩 실패
    #[error("rule load error: {path}: {reason}")]
    RuleLoad {
        /// 규칙 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 규칙 유효성 검증 실패
    #[error("rule validation error: rule '{rule_id}': {reason}")]
    RuleValidation {
        /// 문제가 된 규칙 ID
        rule_id: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl AnalyzerError {
    /// 호출자에게 돌려줄 메시지
    ///
    /// `Internal`은 세부 내용을 숨기고 일반 메시지만 반환합니다.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) | Self::Io(_) | Self::Regex(_) => {
                "internal error while processing the request".to_owned()
            }
            other => other.to_string(),
        }
    }

    /// 메트릭 `result` 레이블 값
    pub fn result_label(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth_error",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::InputTooLarge { .. } => "input_too_large",
            _ => "internal_error",
        }
    }
}

impl From<AnalyzerError> for ErrsightError {
    fn from(err: AnalyzerError) -> Self {
        match err {
            AnalyzerError::Auth(reason) => PolicyError::Unauthorized(reason).into(),
            AnalyzerError::QuotaExceeded { limit, reset_at } => PolicyError::QuotaExceeded {
                limit,
                reset_at: reset_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            }
            .into(),
            AnalyzerError::InputTooLarge { size, max } => {
                PolicyError::InputTooLarge { size, max }.into()
            }
            AnalyzerError::RuleLoad { path, reason } => {
                RuleError::Load(format!("{path}: {reason}")).into()
            }
            AnalyzerError::RuleValidation { rule_id, reason } => {
                RuleError::Invalid(format!("{rule_id}: {reason}")).into()
            }
            AnalyzerError::Regex(e) => RuleError::Invalid(e.to_string()).into(),
            AnalyzerError::Config { field, reason } => {
                ConfigError::InvalidValue { field, reason }.into()
            }
            AnalyzerError::Io(e) => ErrsightError::Io(e),
            AnalyzerError::Internal(reason) => PipelineError::Internal(reason).into(),
        }
    }
}

/// 컨텍스트 하위 추출 실패
///
/// 요청 밖으로 전파되지 않습니다. 추출기는 이 에러를 debug 로그로 남기고
/// 해당 필드를 비워 둡니다.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// 참조 경로가 프로젝트 루트 밖을 가리킴
    #[error("path '{0}' escapes the project root")]
    OutsideRoot(String),

    /// 참조 줄이 파일 범위를 벗어남
    #[error("line {line} is out of range for '{path}' ({total} lines)")]
    LineOutOfRange {
        path: String,
        line: usize,
        total: usize,
    },

    /// 버전 관리 백엔드 없음 또는 조회 실패
    #[error("history unavailable: {0}")]
    History(String),

    /// 시간 예산 초과
    #[error("{source_name} extraction timed out after {budget_ms}ms")]
    Timeout {
        source_name: &'static str,
        budget_ms: u64,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
