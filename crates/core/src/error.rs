//! 에러 타입 -- 도메인별 에러 정의

/// errsight 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum ErrsightError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 분석 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 패턴 카탈로그 에러
    #[error("rule error: {0}")]
    Rule(#[from] RuleError),

    /// 티어 정책 에러 (인증, 쿼터, 입력 크기)
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 예기치 못한 내부 오류
    #[error("internal error: {0}")]
    Internal(String),
}

/// 패턴 카탈로그 에러
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// 규칙 소스 로딩 실패
    #[error("rule load failed: {0}")]
    Load(String),

    /// 규칙 정의가 유효하지 않음
    #[error("invalid rule: {0}")]
    Invalid(String),
}

/// 티어 정책 에러
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// API 키가 없거나 알 수 없음
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// 일일 쿼터 소진
    #[error("daily quota of {limit} requests exceeded, resets at {reset_at}")]
    QuotaExceeded { limit: u64, reset_at: String },

    /// 티어의 최대 입력 크기 초과
    #[error("input too large: {size} bytes (max: {max})")]
    InputTooLarge { size: usize, max: usize },
}
