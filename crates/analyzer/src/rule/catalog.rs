//! 패턴 카탈로그 -- 불변 규칙 스냅샷과 원자적 교체 핸들
//!
//! [`PatternCatalog`]은 구성 이후 변경되지 않습니다. 규칙은 우선순위 내림차순,
//! 같은 우선순위에서는 등록 순서대로 정렬되어 보관되며 첫 번째로 모든 조건을
//! 만족한 규칙이 승리합니다.
//!
//! [`CatalogHandle`]은 `Arc<PatternCatalog>` 스냅샷을 통째로 교체합니다.
//! 요청은 시작 시 스냅샷 하나를 잡고 끝날 때까지 그것만 사용합니다.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, RwLock};

use errsight_core::metrics as m;
use errsight_core::types::LogEntry;

use super::loader::RuleLoader;
use super::matcher::{CompiledRule, MatchInput};
use super::types::PatternRule;
use super::MatchResult;
use crate::error::AnalyzerError;

/// 내장 기본 카탈로그 (YAML)
pub const BUILTIN_RULES: &str = include_str!("../../rules/default.yml");

/// 내장 카탈로그 소스 이름
const BUILTIN_SOURCE: &str = "<builtin>";

/// 불변 패턴 카탈로그
#[derive(Debug)]
pub struct PatternCatalog {
    /// 평가 순서로 정렬된 규칙
    rules: Vec<CompiledRule>,
    /// 필드당 매칭 최대 바이트
    max_match_bytes: usize,
    /// 규칙 소스 (디렉토리 경로 또는 `<builtin>`)
    source: String,
}

impl PatternCatalog {
    /// 규칙 목록에서 카탈로그를 구성합니다.
    ///
    /// 입력 순서가 등록 순서입니다. 비활성 규칙은 제외되며,
    /// 중복 ID나 컴파일할 수 없는 규칙이 있으면 에러를 반환합니다.
    pub fn new(
        rules: Vec<PatternRule>,
        max_match_bytes: usize,
        source: impl Into<String>,
    ) -> Result<Self, AnalyzerError> {
        let mut seen = HashSet::new();
        let mut compiled = Vec::with_capacity(rules.len());

        for rule in rules {
            if !seen.insert(rule.id.clone()) {
                return Err(AnalyzerError::RuleValidation {
                    rule_id: rule.id,
                    reason: "duplicate rule id".to_owned(),
                });
            }
            if !rule.is_enabled() {
                tracing::debug!(rule_id = %rule.id, "rule disabled, skipping");
                continue;
            }
            compiled.push(CompiledRule::compile(rule)?);
        }

        // 안정 정렬: 같은 우선순위는 등록 순서 유지
        compiled.sort_by(|a, b| b.rule().priority.cmp(&a.rule().priority));

        Ok(Self {
            rules: compiled,
            max_match_bytes,
            source: source.into(),
        })
    }

    /// 빈 카탈로그 (모든 엔트리가 unclassified)
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            max_match_bytes: 16 * 1024,
            source: String::new(),
        }
    }

    /// 내장 기본 카탈로그를 구성합니다.
    pub fn builtin(max_match_bytes: usize) -> Result<Self, AnalyzerError> {
        let rules = RuleLoader::parse_yaml(BUILTIN_RULES, BUILTIN_SOURCE)?;
        Self::new(rules, max_match_bytes, BUILTIN_SOURCE)
    }

    /// 규칙 디렉토리에서 카탈로그를 구성합니다.
    pub async fn from_dir(
        dir: impl AsRef<Path>,
        max_match_bytes: usize,
    ) -> Result<Self, AnalyzerError> {
        let dir = dir.as_ref();
        let rules = RuleLoader::load_directory(dir).await?;
        Self::new(rules, max_match_bytes, dir.display().to_string())
    }

    /// 규칙 디렉토리에서 카탈로그를 구성합니다. 실패한 파일이 하나라도 있으면 에러입니다.
    pub async fn from_dir_strict(
        dir: impl AsRef<Path>,
        max_match_bytes: usize,
    ) -> Result<Self, AnalyzerError> {
        let dir = dir.as_ref();
        let rules = RuleLoader::load_directory_strict(dir).await?;
        Self::new(rules, max_match_bytes, dir.display().to_string())
    }

    /// `rule_dir`가 비어 있으면 내장 카탈로그를, 아니면 디렉토리 카탈로그를 구성합니다.
    pub async fn load(rule_dir: &str, max_match_bytes: usize) -> Result<Self, AnalyzerError> {
        if rule_dir.trim().is_empty() {
            Self::builtin(max_match_bytes)
        } else {
            Self::from_dir(rule_dir, max_match_bytes).await
        }
    }

    /// [`load`](Self::load)와 같지만 디렉토리의 모든 파일이 유효해야 합니다.
    pub async fn load_strict(rule_dir: &str, max_match_bytes: usize) -> Result<Self, AnalyzerError> {
        if rule_dir.trim().is_empty() {
            Self::builtin(max_match_bytes)
        } else {
            Self::from_dir_strict(rule_dir, max_match_bytes).await
        }
    }

    /// 활성 규칙 수
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 규칙 소스
    pub fn source(&self) -> &str {
        &self.source
    }

    /// 평가 순서대로 규칙을 순회합니다.
    pub fn rules(&self) -> impl Iterator<Item = &PatternRule> {
        self.rules.iter().map(CompiledRule::rule)
    }

    /// ID로 규칙을 찾습니다.
    pub fn get(&self, id: &str) -> Option<&PatternRule> {
        self.rules().find(|rule| rule.id == id)
    }

    /// 엔트리를 분류합니다.
    ///
    /// 같은 카탈로그와 엔트리에 대해 항상 같은 결과를 반환합니다.
    pub fn classify(&self, entry: &LogEntry) -> MatchResult {
        let input = MatchInput::new(entry, self.max_match_bytes);

        for compiled in &self.rules {
            if let Some(captures) = compiled.evaluate(&input) {
                let rule = compiled.rule();
                tracing::debug!(
                    entry = entry.index,
                    rule_id = %rule.id,
                    signature = %rule.signature,
                    "entry classified"
                );
                metrics::counter!(m::CATALOG_RULE_MATCHES_TOTAL).increment(1);
                return MatchResult {
                    entry_index: entry.index,
                    rule: Some(rule.clone()),
                    captures,
                };
            }
        }

        metrics::counter!(m::CATALOG_UNCLASSIFIED_TOTAL).increment(1);
        MatchResult::unclassified(entry.index)
    }
}

/// 원자적으로 교체 가능한 카탈로그 참조
#[derive(Debug)]
pub struct CatalogHandle {
    current: RwLock<Arc<PatternCatalog>>,
}

impl CatalogHandle {
    /// 초기 카탈로그로 핸들을 생성합니다.
    pub fn new(catalog: PatternCatalog) -> Self {
        metrics::gauge!(m::CATALOG_RULES_LOADED).set(catalog.len() as f64);
        Self {
            current: RwLock::new(Arc::new(catalog)),
        }
    }

    /// 현재 스냅샷을 반환합니다.
    pub fn snapshot(&self) -> Arc<PatternCatalog> {
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// 스냅샷을 통째로 교체하고 이전 스냅샷을 반환합니다.
    ///
    /// 이미 스냅샷을 잡은 요청은 이전 카탈로그로 끝까지 처리됩니다.
    pub fn swap(&self, catalog: PatternCatalog) -> Arc<PatternCatalog> {
        let rules = catalog.len();
        let next = Arc::new(catalog);
        let previous = {
            let mut guard = self
                .current
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::replace(&mut *guard, next)
        };
        metrics::gauge!(m::CATALOG_RULES_LOADED).set(rules as f64);
        metrics::counter!(m::CATALOG_RELOADS_TOTAL).increment(1);
        tracing::info!(
            rules,
            previous_rules = previous.len(),
            "pattern catalog swapped"
        );
        previous
    }

    /// 규칙 소스를 다시 읽어 스냅샷을 교체합니다.
    ///
    /// 규칙 파일 중 하나라도 로드할 수 없으면 현재 스냅샷을 유지하고 에러를 반환합니다.
    pub async fn reload(&self, rule_dir: &str, max_match_bytes: usize) -> Result<usize, AnalyzerError> {
        let catalog = match PatternCatalog::load_strict(rule_dir, max_match_bytes).await {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::warn!(rule_dir, error = %e, "catalog reload rejected, keeping current snapshot");
                return Err(e);
            }
        };
        let count = catalog.len();
        self.swap(catalog);
        Ok(count)
    }
}
