//! 패턴 카탈로그 -- YAML 기반 에러 시그니처 분류
//!
//! 규칙 기반(감사 가능한) 분류기입니다. 각 규칙은 AND로 결합된 조건 목록과
//! 우선순위, 시그니처 이름, 제안 템플릿, 필요 티어를 가집니다.
//!
//! # 규칙 형식
//! ```yaml
//! id: python-key-error
//! signature: python_key_error
//! priority: 60
//! match:
//!   - regex: "KeyError: '(?P<key>[^']+)'"
//! suggestion: "Key '{key}' is missing; use dict.get() or check the producer."
//! ```
//!
//! # 아키텍처
//! - [`PatternCatalog`]: 불변 스냅샷, `classify`
//! - [`CatalogHandle`]: 스냅샷 원자적 교체
//! - [`loader`]: YAML 파일 로딩 및 유효성 검증
//! - [`matcher`]: 조건 매칭 로직 (contains, regex, level)
//! - [`types`]: 규칙 데이터 구조 정의

pub mod catalog;
pub mod loader;
pub mod matcher;
pub mod types;

pub use catalog::{BUILTIN_RULES, CatalogHandle, PatternCatalog};
pub use loader::{FileReport, RuleLoader};
pub use matcher::CompiledRule;
pub use types::{MatchField, PatternRule, Predicate, RuleStatus};

use std::collections::BTreeMap;

use errsight_core::types::{Feature, FeatureMask, Tier};

/// 분류 결과
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// 분류한 엔트리의 순번
    pub entry_index: usize,
    /// 승리한 규칙 (없으면 unclassified)
    pub rule: Option<PatternRule>,
    /// 정규식 조건의 이름 캡처
    pub captures: BTreeMap<String, String>,
}

impl MatchResult {
    /// 규칙이 매칭되지 않은 결과
    pub fn unclassified(entry_index: usize) -> Self {
        Self {
            entry_index,
            rule: None,
            captures: BTreeMap::new(),
        }
    }

    pub fn is_classified(&self) -> bool {
        self.rule.is_some()
    }

    pub fn rule_id(&self) -> Option<&str> {
        self.rule.as_ref().map(|rule| rule.id.as_str())
    }

    /// 매칭은 되었지만 요청 티어에서 노출할 수 없는지 판별합니다.
    ///
    /// 규칙의 필요 티어가 요청 티어보다 높거나, 확장 패턴 규칙인데
    /// ADVANCED_PATTERNS 기능이 없으면 억제됩니다.
    pub fn is_suppressed(&self, tier: Tier, features: FeatureMask) -> bool {
        self.rule.as_ref().is_some_and(|rule| {
            rule.required_tier > tier
                || (rule.advanced && !features.has(Feature::AdvancedPatterns))
        })
    }
}
