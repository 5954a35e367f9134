//! 설정 관리 -- errsight.toml 파싱 및 런타임 설정
//!
//! [`ErrsightConfig`]는 모든 컴포넌트의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`ERRSIGHT_ANALYZER_PROJECT_ROOT=/srv/app` 형식)
//! 3. 설정 파일 (`errsight.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), errsight_core::error::ErrsightError> {
//! use errsight_core::config::ErrsightConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = ErrsightConfig::load("errsight.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = ErrsightConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, ErrsightError};
use crate::types::{FeatureMask, Tier, TierPolicy};

/// errsight 통합 설정
///
/// `errsight.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrsightConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 분석 파이프라인 설정
    #[serde(default)]
    pub analyzer: AnalyzerSection,
    /// 티어별 정책 오버라이드
    #[serde(default)]
    pub tiers: TiersConfig,
    /// 등록된 API 키
    #[serde(default)]
    pub keys: Vec<ApiKeyConfig>,
}

impl ErrsightConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ErrsightError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ErrsightError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ErrsightError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                ErrsightError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, ErrsightError> {
        toml::from_str(toml_str).map_err(|e| {
            ErrsightError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `ERRSIGHT_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "ERRSIGHT_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "ERRSIGHT_GENERAL_LOG_FORMAT");

        // Analyzer
        override_string(&mut self.analyzer.rule_dir, "ERRSIGHT_ANALYZER_RULE_DIR");
        override_string(
            &mut self.analyzer.project_root,
            "ERRSIGHT_ANALYZER_PROJECT_ROOT",
        );
        override_usize(
            &mut self.analyzer.snippet_radius,
            "ERRSIGHT_ANALYZER_SNIPPET_RADIUS",
        );
        override_usize(
            &mut self.analyzer.history_depth,
            "ERRSIGHT_ANALYZER_HISTORY_DEPTH",
        );
        override_u64(
            &mut self.analyzer.extraction_budget_ms,
            "ERRSIGHT_ANALYZER_EXTRACTION_BUDGET_MS",
        );
        override_u64(
            &mut self.analyzer.request_budget_ms,
            "ERRSIGHT_ANALYZER_REQUEST_BUDGET_MS",
        );
        override_usize(
            &mut self.analyzer.max_match_bytes,
            "ERRSIGHT_ANALYZER_MAX_MATCH_BYTES",
        );
        override_usize(
            &mut self.analyzer.max_dependencies,
            "ERRSIGHT_ANALYZER_MAX_DEPENDENCIES",
        );
        override_tier(
            &mut self.analyzer.anonymous_tier,
            "ERRSIGHT_ANALYZER_ANONYMOUS_TIER",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ErrsightError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        self.analyzer.validate()?;

        // 티어 단조성: 상위 티어는 하위 티어의 기능을 모두 포함해야 함
        let policies = self.tiers.policies();
        for pair in policies.windows(2) {
            let (lower, higher) = (&pair[0], &pair[1]);
            if !higher.features.contains(lower.features) {
                return Err(invalid(
                    &format!("tiers.{}.features", higher.tier),
                    format!(
                        "must include every feature of lower tier '{}' ({})",
                        lower.tier, lower.features
                    ),
                ));
            }
        }
        for policy in &policies {
            if policy.max_input_bytes == 0 {
                return Err(invalid(
                    &format!("tiers.{}.max_input_bytes", policy.tier),
                    "must be greater than 0".to_owned(),
                ));
            }
        }

        let mut seen = HashSet::new();
        for (idx, key) in self.keys.iter().enumerate() {
            if key.key.trim().is_empty() {
                return Err(invalid(
                    &format!("keys[{idx}].key"),
                    "api key must not be empty".to_owned(),
                ));
            }
            if !seen.insert(key.key.as_str()) {
                return Err(invalid(
                    &format!("keys[{idx}].key"),
                    "duplicate api key".to_owned(),
                ));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> ErrsightError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 분석 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerSection {
    /// YAML 규칙 디렉토리 (비어 있으면 내장 카탈로그 사용)
    pub rule_dir: String,
    /// 코드/이력/환경 컨텍스트를 읽을 프로젝트 루트
    pub project_root: String,
    /// 코드 스니펫 반경 (줄 수, 실패 줄 기준 ±)
    pub snippet_radius: usize,
    /// 조회할 최근 변경 이력 수
    pub history_depth: usize,
    /// 엔트리당 컨텍스트 추출 시간 예산 (밀리초)
    pub extraction_budget_ms: u64,
    /// 요청당 전체 처리 시간 예산 (밀리초)
    pub request_budget_ms: u64,
    /// 패턴 매칭에 사용하는 필드당 최대 바이트
    pub max_match_bytes: usize,
    /// 환경 정보에 포함할 최대 의존성 수
    pub max_dependencies: usize,
    /// 빈 API 키로 로컬 실행할 때 적용할 티어 (없으면 인증 필요)
    pub anonymous_tier: Option<Tier>,
}

impl Default for AnalyzerSection {
    fn default() -> Self {
        Self {
            rule_dir: String::new(),
            project_root: ".".to_owned(),
            snippet_radius: 5,
            history_depth: 3,
            extraction_budget_ms: 200,
            request_budget_ms: 5_000,
            max_match_bytes: 16 * 1024,
            max_dependencies: 50,
            anonymous_tier: None,
        }
    }
}

impl AnalyzerSection {
    fn validate(&self) -> Result<(), ErrsightError> {
        const MAX_SNIPPET_RADIUS: usize = 50;
        const MAX_HISTORY_DEPTH: usize = 20;

        if self.project_root.is_empty() {
            return Err(invalid(
                "analyzer.project_root",
                "must not be empty".to_owned(),
            ));
        }
        if self.snippet_radius > MAX_SNIPPET_RADIUS {
            return Err(invalid(
                "analyzer.snippet_radius",
                format!("must be 0-{MAX_SNIPPET_RADIUS}"),
            ));
        }
        if self.history_depth == 0 || self.history_depth > MAX_HISTORY_DEPTH {
            return Err(invalid(
                "analyzer.history_depth",
                format!("must be 1-{MAX_HISTORY_DEPTH}"),
            ));
        }
        if self.extraction_budget_ms == 0 {
            return Err(invalid(
                "analyzer.extraction_budget_ms",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.request_budget_ms < self.extraction_budget_ms {
            return Err(invalid(
                "analyzer.request_budget_ms",
                "must be at least extraction_budget_ms".to_owned(),
            ));
        }
        if self.max_match_bytes == 0 {
            return Err(invalid(
                "analyzer.max_match_bytes",
                "must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }
}

/// 티어별 정책 오버라이드
///
/// 지정하지 않은 값은 [`TierPolicy::default_for`]의 기본값을 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TiersConfig {
    pub core: TierOverride,
    pub pro: TierOverride,
    pub team: TierOverride,
    pub enterprise: TierOverride,
    pub scale: TierOverride,
}

impl TiersConfig {
    /// 기본값과 병합된 티어 정책을 반환합니다.
    pub fn policy(&self, tier: Tier) -> TierPolicy {
        let overrides = match tier {
            Tier::Core => &self.core,
            Tier::Pro => &self.pro,
            Tier::Team => &self.team,
            Tier::Enterprise => &self.enterprise,
            Tier::Scale => &self.scale,
        };
        let mut policy = TierPolicy::default_for(tier);
        if let Some(quota) = overrides.daily_quota {
            policy.daily_quota = quota;
        }
        if let Some(max) = overrides.max_input_bytes {
            policy.max_input_bytes = max;
        }
        if let Some(features) = overrides.features {
            policy.features = features;
        }
        policy
    }

    /// 낮은 티어부터 정렬된 전체 정책 목록
    pub fn policies(&self) -> Vec<TierPolicy> {
        Tier::ALL.into_iter().map(|tier| self.policy(tier)).collect()
    }
}

/// 단일 티어 오버라이드
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TierOverride {
    /// 일일 요청 쿼터
    pub daily_quota: Option<u64>,
    /// 최대 입력 크기 (바이트)
    pub max_input_bytes: Option<usize>,
    /// 허용 기능 목록
    pub features: Option<FeatureMask>,
}

/// API 키 등록 정보
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    /// API 키 문자열
    pub key: String,
    /// 키에 부여된 티어
    pub tier: Tier,
    /// 사람이 읽을 수 있는 이름 (로그용)
    #[serde(default)]
    pub label: String,
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_tier(target: &mut Option<Tier>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        if val.trim().is_empty() || val.eq_ignore_ascii_case("none") {
            *target = None;
            return;
        }
        match Tier::from_str_loose(&val) {
            Some(tier) => *target = Some(tier),
            None => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse tier from env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Feature;

    #[test]
    fn default_config_has_sane_values() {
        let config = ErrsightConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.analyzer.snippet_radius, 5);
        assert_eq!(config.analyzer.history_depth, 3);
        assert_eq!(config.analyzer.extraction_budget_ms, 200);
        assert!(config.keys.is_empty());
    }

    #[test]
    fn default_config_passes_validation() {
        ErrsightConfig::default().validate().unwrap();
    }

    #[test]
    fn from_str_empty_toml_uses_defaults() {
        let config = ErrsightConfig::parse("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.analyzer.project_root, ".");
    }

    #[test]
    fn from_str_full_toml() {
        let toml = r#"
[general]
log_level = "debug"
log_format = "pretty"

[analyzer]
rule_dir = "/etc/errsight/rules"
project_root = "/srv/app"
snippet_radius = 3
history_depth = 2
extraction_budget_ms = 150
request_budget_ms = 2000
anonymous_tier = "pro"

[tiers.core]
daily_quota = 10

[tiers.pro]
daily_quota = 500
max_input_bytes = 1048576
features = ["context-code", "context-env"]

[[keys]]
key = "sk-core-1"
tier = "core"
label = "free user"

[[keys]]
key = "sk-pro-1"
tier = "pro"
"#;
        let config = ErrsightConfig::parse(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.general.log_format, "pretty");
        assert_eq!(config.analyzer.anonymous_tier, Some(Tier::Pro));
        assert_eq!(config.keys.len(), 2);
        assert_eq!(config.keys[1].tier, Tier::Pro);

        let core = config.tiers.policy(Tier::Core);
        assert_eq!(core.daily_quota, 10);
        // 지정하지 않은 값은 기본값 유지
        assert_eq!(core.max_input_bytes, 64 * 1024);

        let pro = config.tiers.policy(Tier::Pro);
        assert!(pro.allows(Feature::ContextEnv));
        assert!(!pro.allows(Feature::ContextHistory));
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let err = ErrsightConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            ErrsightError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = ErrsightConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_non_monotonic_tiers() {
        let mut config = ErrsightConfig::default();
        config.tiers.core.features = Some(FeatureMask::CONTEXT_ENV);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("tiers.pro.features"));
    }

    #[test]
    fn validate_rejects_duplicate_keys() {
        let mut config = ErrsightConfig::default();
        for _ in 0..2 {
            config.keys.push(ApiKeyConfig {
                key: "same".to_owned(),
                tier: Tier::Core,
                label: String::new(),
            });
        }
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn validate_rejects_zero_history_depth() {
        let mut config = ErrsightConfig::default();
        config.analyzer.history_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_request_budget_below_extraction_budget() {
        let mut config = ErrsightConfig::default();
        config.analyzer.request_budget_ms = 50;
        config.analyzer.extraction_budget_ms = 200;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("request_budget_ms"));
    }

    #[test]
    fn env_override_string() {
        let mut val = "original".to_owned();
        // SAFETY: 테스트는 고유한 키만 사용하므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_ERRSIGHT_STR", "overridden") };
        override_string(&mut val, "TEST_ERRSIGHT_STR");
        assert_eq!(val, "overridden");
        unsafe { std::env::remove_var("TEST_ERRSIGHT_STR") };
    }

    #[test]
    fn env_override_usize_invalid_keeps_original() {
        let mut val = 5usize;
        // SAFETY: 테스트는 고유한 키만 사용하므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_ERRSIGHT_USIZE_BAD", "five") };
        override_usize(&mut val, "TEST_ERRSIGHT_USIZE_BAD");
        assert_eq!(val, 5);
        unsafe { std::env::remove_var("TEST_ERRSIGHT_USIZE_BAD") };
    }

    #[test]
    fn env_override_tier() {
        let mut val = None;
        // SAFETY: 테스트는 고유한 키만 사용하므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_ERRSIGHT_TIER", "Team") };
        override_tier(&mut val, "TEST_ERRSIGHT_TIER");
        assert_eq!(val, Some(Tier::Team));

        unsafe { std::env::set_var("TEST_ERRSIGHT_TIER", "none") };
        override_tier(&mut val, "TEST_ERRSIGHT_TIER");
        assert_eq!(val, None);
        unsafe { std::env::remove_var("TEST_ERRSIGHT_TIER") };
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = 42u64;
        override_u64(&mut val, "TEST_ERRSIGHT_NONEXISTENT_12345");
        assert_eq!(val, 42);
    }

    #[test]
    fn config_serialize_roundtrip() {
        let mut config = ErrsightConfig::default();
        config.tiers.team.daily_quota = Some(77);
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = ErrsightConfig::parse(&toml_str).unwrap();
        assert_eq!(parsed.tiers.policy(Tier::Team).daily_quota, 77);
        assert_eq!(parsed.analyzer.snippet_radius, config.analyzer.snippet_radius);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = ErrsightConfig::from_file("/nonexistent/path/errsight.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ErrsightError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
