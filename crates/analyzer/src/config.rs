//! 분석기 설정
//!
//! [`AnalyzerConfig`]는 core의 [`ErrsightConfig`](errsight_core::config::ErrsightConfig)에서
//! 분석기에 필요한 값(`[analyzer]`, `[tiers.*]`, `[[keys]]`)을 모은 것입니다.
//!
//! # 사용 예시
//! ```ignore
//! use errsight_core::config::ErrsightConfig;
//! use errsight_analyzer::config::AnalyzerConfig;
//!
//! let core_config = ErrsightConfig::default();
//! let config = AnalyzerConfig::from_core(&core_config);
//! ```

use std::time::Duration;

use errsight_core::config::{ApiKeyConfig, ErrsightConfig};
use errsight_core::types::{Tier, TierPolicy};

use crate::context::ContextOptions;
use crate::error::AnalyzerError;

/// 분석기 설정
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// YAML 규칙 디렉토리 (비어 있으면 내장 카탈로그)
    pub rule_dir: String,
    /// 컨텍스트를 읽을 프로젝트 루트
    pub project_root: String,
    /// 스니펫 반경 (±줄 수)
    pub snippet_radius: usize,
    /// 최근 커밋 조회 수
    pub history_depth: usize,
    /// 엔트리당 컨텍스트 추출 예산 (밀리초)
    pub extraction_budget_ms: u64,
    /// 요청당 처리 예산 (밀리초)
    pub request_budget_ms: u64,
    /// 필드당 매칭 대상 최대 바이트
    pub max_match_bytes: usize,
    /// 환경 정보의 최대 의존성 수
    pub max_dependencies: usize,
    /// 빈 키 요청에 적용할 티어
    pub anonymous_tier: Option<Tier>,
    /// 티어별 정책 (티어 오름차순)
    pub policies: Vec<TierPolicy>,
    /// API 키 테이블
    pub keys: Vec<ApiKeyConfig>,
}

impl Default for AnalyzerConfig {
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
            policies: Tier::ALL.iter().map(|&t| TierPolicy::default_for(t)).collect(),
            keys: Vec::new(),
        }
    }
}

impl AnalyzerConfig {
    /// core 설정에서 분석기 설정을 생성합니다.
    pub fn from_core(core: &ErrsightConfig) -> Self {
        let section = &core.analyzer;
        Self {
            rule_dir: section.rule_dir.clone(),
            project_root: section.project_root.clone(),
            snippet_radius: section.snippet_radius,
            history_depth: section.history_depth,
            extraction_budget_ms: section.extraction_budget_ms,
            request_budget_ms: section.request_budget_ms,
            max_match_bytes: section.max_match_bytes,
            max_dependencies: section.max_dependencies,
            anonymous_tier: section.anonymous_tier,
            policies: core.tiers.policies(),
            keys: core.keys.clone(),
        }
    }

    pub fn extraction_budget(&self) -> Duration {
        Duration::from_millis(self.extraction_budget_ms)
    }

    pub fn request_budget(&self) -> Duration {
        Duration::from_millis(self.request_budget_ms)
    }

    /// 컨텍스트 추출기 설정
    pub fn context_options(&self) -> ContextOptions {
        ContextOptions {
            snippet_radius: self.snippet_radius,
            history_depth: self.history_depth,
            extraction_budget: self.extraction_budget(),
            max_dependencies: self.max_dependencies,
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), AnalyzerError> {
        const MAX_SNIPPET_RADIUS: usize = 50;
        const MAX_HISTORY_DEPTH: usize = 20;

        if self.project_root.is_empty() {
            return Err(config_err("project_root", "must not be empty".to_owned()));
        }
        if self.snippet_radius > MAX_SNIPPET_RADIUS {
            return Err(config_err(
                "snippet_radius",
                format!("must be 0-{MAX_SNIPPET_RADIUS}"),
            ));
        }
        if self.history_depth == 0 || self.history_depth > MAX_HISTORY_DEPTH {
            return Err(config_err(
                "history_depth",
                format!("must be 1-{MAX_HISTORY_DEPTH}"),
            ));
        }
        if self.extraction_budget_ms == 0 {
            return Err(config_err(
                "extraction_budget_ms",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.request_budget_ms < self.extraction_budget_ms {
            return Err(config_err(
                "request_budget_ms",
                "must be at least extraction_budget_ms".to_owned(),
            ));
        }
        if self.max_match_bytes == 0 {
            return Err(config_err(
                "max_match_bytes",
                "must be greater than 0".to_owned(),
            ));
        }

        let mut policies = self.policies.clone();
        policies.sort_by_key(|p| p.tier);
        for pair in policies.windows(2) {
            if pair[0].tier == pair[1].tier {
                return Err(config_err(
                    "policies",
                    format!("duplicate policy for tier '{}'", pair[0].tier),
                ));
            }
            if !pair[1].features.contains(pair[0].features) {
                return Err(config_err(
                    "policies",
                    format!(
                        "tier '{}' must include every feature of tier '{}'",
                        pair[1].tier, pair[0].tier
                    ),
                ));
            }
        }
        if let Some(policy) = policies.iter().find(|p| p.max_input_bytes == 0) {
            return Err(config_err(
                "policies",
                format!("tier '{}' max_input_bytes must be greater than 0", policy.tier),
            ));
        }

        Ok(())
    }
}

fn config_err(field: &str, reason: String) -> AnalyzerError {
    AnalyzerError::Config {
        field: field.to_owned(),
        reason,
    }
}

/// 분석기 설정 빌더
#[derive(Default)]
pub struct AnalyzerConfigBuilder {
    config: AnalyzerConfig,
}

impl AnalyzerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.rule_dir = dir.into();
        self
    }

    pub fn project_root(mut self, root: impl Into<String>) -> Self {
        self.config.project_root = root.into();
        self
    }

    pub fn snippet_radius(mut self, radius: usize) -> Self {
        self.config.snippet_radius = radius;
        self
    }

    pub fn history_depth(mut self, depth: usize) -> Self {
        self.config.history_depth = depth;
        self
    }

    pub fn extraction_budget_ms(mut self, ms: u64) -> Self {
        self.config.extraction_budget_ms = ms;
        self
    }

    pub fn request_budget_ms(mut self, ms: u64) -> Self {
        self.config.request_budget_ms = ms;
        self
    }

    pub fn max_match_bytes(mut self, bytes: usize) -> Self {
        self.config.max_match_bytes = bytes;
        self
    }

    pub fn anonymous_tier(mut self, tier: Option<Tier>) -> Self {
        self.config.anonymous_tier = tier;
        self
    }

    /// 티어 정책 하나를 교체합니다.
    pub fn policy(mut self, policy: TierPolicy) -> Self {
        match self.config.policies.iter_mut().find(|p| p.tier == policy.tier) {
            Some(existing) => *existing = policy,
            None => self.config.policies.push(policy),
        }
        self
    }

    /// API 키를 추가합니다.
    pub fn key(mut self, key: impl Into<String>, tier: Tier) -> Self {
        let key = key.into();
        self.config.keys.push(ApiKeyConfig {
            label: format!("key-{}", self.config.keys.len()),
            key,
            tier,
        });
        self
    }

    /// 설정을 검증하고 `AnalyzerConfig`를 생성합니다.
    pub fn build(self) -> Result<AnalyzerConfig, AnalyzerError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
