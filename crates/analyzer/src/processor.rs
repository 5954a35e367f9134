//! 요청 처리 오케스트레이션 -- 인증/쿼터/파싱/분류/컨텍스트/렌더링의 전체 흐름
//!
//! [`Processor::process`]는 요청 하나를 다음 순서로 처리합니다.
//!
//! 1. API 키 인증
//! 2. 입력 크기 검사 (파싱 전)
//! 3. 쿼터 소비 (소진 시 다음 UTC 자정을 담은 `QuotaExceeded`)
//! 4. 엔트리 파싱
//! 5. 엔트리마다 분류, 컨텍스트 추출(티어가 허용할 때), 렌더링
//! 6. 경과 시간과 함께 결과 조립
//!
//! 요청당 시간 예산이 소진되면 그때까지 처리한 엔트리만 담고
//! `truncated = true`로 반환합니다. 요청 간에 공유되는 가변 상태는
//! 쿼터 저장소와 카탈로그 스냅샷 참조뿐입니다.
//!
//! # 내부 아키텍처
//! ```text
//! AnalysisRequest -> TierPolicyEngine -> EntryParser -> PatternCatalog
//!                                                    -> ContextExtractor -> Formatter
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info};
use uuid::Uuid;

use errsight_core::metrics as m;
use errsight_core::types::{FeatureMask, LogEntry, Tier};

use crate::config::AnalyzerConfig;
use crate::context::{ContextBundle, ContextExtractor, GitHistory, HistoryProvider};
use crate::error::AnalyzerError;
use crate::format::{Formatter, RenderedEntry};
use crate::parser::EntryParser;
use crate::rule::{CatalogHandle, MatchResult, PatternCatalog};
use crate::tier::{InMemoryQuotaStore, QuotaStore, TierPolicyEngine, reset_at};

/// 컨텍스트 관련 기능 전체
const CONTEXT_FEATURES: FeatureMask = FeatureMask::CONTEXT_CODE
    .union(FeatureMask::CONTEXT_HISTORY)
    .union(FeatureMask::CONTEXT_ENV);

/// 분석 요청
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    /// 원시 로그 텍스트
    pub text: String,
    /// API 키 (익명 티어가 설정된 경우 빈 문자열 허용)
    pub api_key: String,
    /// 호출자가 선언한 티어 (인증된 티어 이하일 때만 적용)
    pub tier_hint: Option<Tier>,
}

impl AnalysisRequest {
    pub fn new(text: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            api_key: api_key.into(),
            tier_hint: None,
        }
    }

    pub fn with_tier_hint(mut self, tier: Tier) -> Self {
        self.tier_hint = Some(tier);
        self
    }
}

/// 처리된 엔트리 하나
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedEntry {
    pub entry: LogEntry,
    pub match_result: MatchResult,
    /// 티어 기능 마스크가 컨텍스트를 허용할 때만 존재 (매칭 억제와 무관)
    pub context: Option<ContextBundle>,
    pub rendered: RenderedEntry,
}

impl ProcessedEntry {
    pub fn suppressed(&self) -> bool {
        self.rendered.suppressed
    }
}

/// 요청 처리 결과
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    /// 로그 상관관계용 요청 ID
    pub request_id: Uuid,
    /// 입력 순서대로 처리된 엔트리
    pub entries: Vec<ProcessedEntry>,
    /// 전체 처리 시간
    pub duration: Duration,
    /// 적용된 티어
    pub tier_used: Tier,
    /// 시간 예산 소진으로 일부 엔트리만 처리됨
    pub truncated: bool,
}

/// 응답 와이어 형식
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResponse {
    pub success: bool,
    pub entries: Vec<RenderedEntry>,
    pub tier_used: Tier,
    /// 처리 시간 (밀리초)
    pub processing_time: u64,
    pub truncated: bool,
}

impl ProcessingResult {
    /// 응답 형식으로 변환합니다.
    pub fn to_response(&self) -> AnalysisResponse {
        AnalysisResponse {
            success: true,
            entries: self.entries.iter().map(|e| e.rendered.clone()).collect(),
            tier_used: self.tier_used,
            processing_time: u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX),
            truncated: self.truncated,
        }
    }

    /// 엔트리 텍스트 형식을 빈 줄로 이어 붙입니다.
    pub fn to_text(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.rendered.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// 분석 요청 처리기
///
/// 요청 간 상태를 갖지 않으므로 `Arc`로 공유하여 여러 요청을 동시에 처리할 수 있습니다.
pub struct Processor<H: HistoryProvider = GitHistory, S: QuotaStore = InMemoryQuotaStore> {
    config: AnalyzerConfig,
    parser: EntryParser,
    catalog: Arc<CatalogHandle>,
    context: ContextExtractor<H>,
    policy: TierPolicyEngine<S>,
}

impl<H: HistoryProvider, S: QuotaStore> Processor<H, S> {
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn parser(&self) -> &EntryParser {
        &self.parser
    }

    /// 카탈로그 핸들 (리로드용)
    pub fn catalog(&self) -> &Arc<CatalogHandle> {
        &self.catalog
    }

    pub fn context_extractor(&self) -> &ContextExtractor<H> {
        &self.context
    }

    pub fn policy_engine(&self) -> &TierPolicyEngine<S> {
        &self.policy
    }

    /// 요청 하나를 처리합니다.
    ///
    /// # Errors
    ///
    /// - `AnalyzerError::Auth`: 키 인증 실패
    /// - `AnalyzerError::InputTooLarge`: 입력이 티어 최대 크기 초과 (파싱하지 않음)
    /// - `AnalyzerError::QuotaExceeded`: 일일 쿼터 소진
    /// - `AnalyzerError::Internal`: 쿼터 저장소 오류 등 내부 장애
    pub async fn process(
        &self,
        request: AnalysisRequest,
    ) -> Result<ProcessingResult, AnalyzerError> {
        let started = Instant::now();
        let request_id = Uuid::new_v4();

        let outcome = self.run(&request, request_id, started).await;
        let elapsed = started.elapsed();
        metrics::histogram!(m::ANALYZER_PROCESSING_DURATION_SECONDS).record(elapsed.as_secs_f64());

        match &outcome {
            Ok(result) => {
                metrics::counter!(
                    m::ANALYZER_REQUESTS_TOTAL,
                    m::LABEL_RESULT => "success",
                    m::LABEL_TIER => result.tier_used.as_str()
                )
                .increment(1);
                if result.truncated {
                    metrics::counter!(m::ANALYZER_TRUNCATED_TOTAL).increment(1);
                }
                info!(
                    request_id = %request_id,
                    tier = %result.tier_used,
                    entries = result.entries.len(),
                    truncated = result.truncated,
                    duration_ms = elapsed.as_millis() as u64,
                    "request processed"
                );
            }
            Err(e) => {
                metrics::counter!(
                    m::ANALYZER_REQUESTS_TOTAL,
                    m::LABEL_RESULT => e.result_label(),
                    m::LABEL_TIER => "none"
                )
                .increment(1);
                match e {
                    AnalyzerError::Internal(_) => {
                        error!(request_id = %request_id, error = %e, "request failed");
                    }
                    _ => debug!(request_id = %request_id, error = %e, "request rejected"),
                }
            }
        }
        outcome
    }

    async fn run(
        &self,
        request: &AnalysisRequest,
        request_id: Uuid,
        started: Instant,
    ) -> Result<ProcessingResult, AnalyzerError> {
        let deadline = started + self.config.request_budget();

        let authorized = self.policy.authorize(&request.api_key)?;

        let size = request.text.len();
        if size > authorized.max_input_bytes {
            return Err(AnalyzerError::InputTooLarge {
                size,
                max: authorized.max_input_bytes,
            });
        }

        if !self.policy.consume(&request.api_key).await? {
            return Err(AnalyzerError::QuotaExceeded {
                limit: authorized.daily_quota,
                reset_at: reset_at(Utc::now()),
            });
        }

        let tier = self.policy.resolve_tier(authorized.tier, request.tier_hint);
        let features = self.policy.policy(tier).features;

        let entries = self.parser.parse(&request.text);
        let catalog = self.catalog.snapshot();
        debug!(
            request_id = %request_id,
            tier = %tier,
            features = %features,
            entries = entries.len(),
            catalog = catalog.source(),
            "request accepted"
        );

        let mut processed = Vec::with_capacity(entries.len());
        let mut truncated = false;
        for entry in entries {
            let now = Instant::now();
            if now >= deadline {
                truncated = true;
                debug!(
                    request_id = %request_id,
                    processed = processed.len(),
                    "request budget exhausted"
                );
                break;
            }
            processed.push(
                self.process_entry(entry, &catalog, tier, features, deadline - now)
                    .await,
            );
        }

        Ok(ProcessingResult {
            request_id,
            entries: processed,
            duration: started.elapsed(),
            tier_used: tier,
            truncated,
        })
    }

    async fn process_entry(
        &self,
        entry: LogEntry,
        catalog: &PatternCatalog,
        tier: Tier,
        features: FeatureMask,
        remaining: Duration,
    ) -> ProcessedEntry {
        let match_result = catalog.classify(&entry);
        let suppressed = match_result.is_suppressed(tier, features);
        if suppressed {
            metrics::counter!(m::CATALOG_SUPPRESSED_TOTAL).increment(1);
            debug!(
                entry = entry.index,
                rule = match_result.rule_id().unwrap_or("-"),
                tier = %tier,
                "match suppressed for tier"
            );
        }

        let context_features = features.intersection(CONTEXT_FEATURES);
        let context = if context_features.is_empty() {
            None
        } else {
            Some(
                self.context
                    .extract(&entry, &match_result, context_features, remaining)
                    .await,
            )
        };

        let rendered = Formatter::render(&entry, &match_result, context.as_ref(), tier, features);
        metrics::counter!(m::ANALYZER_ENTRIES_PROCESSED_TOTAL, m::LABEL_LEVEL => entry.level.as_str())
            .increment(1);

        ProcessedEntry {
            entry,
            match_result,
            context,
            rendered,
        }
    }
}

/// 처리기 빌더
pub struct ProcessorBuilder {
    config: AnalyzerConfig,
    parser: Option<EntryParser>,
    catalog: Option<Arc<CatalogHandle>>,
}

impl ProcessorBuilder {
    pub fn new() -> Self {
        Self {
            config: AnalyzerConfig::default(),
            parser: None,
            catalog: None,
        }
    }

    /// 분석기 설정을 지정합니다.
    pub fn config(mut self, config: AnalyzerConfig) -> Self {
        self.config = config;
        self
    }

    /// 엔트리 파서를 지정합니다 (기본: 내장 형식 전체).
    pub fn parser(mut self, parser: EntryParser) -> Self {
        self.parser = Some(parser);
        self
    }

    /// 카탈로그 핸들을 지정합니다.
    ///
    /// 지정하지 않으면 `rule_dir`(비어 있으면 내장 카탈로그)에서 로드합니다.
    pub fn catalog(mut self, catalog: Arc<CatalogHandle>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// `git` 이력과 인메모리 쿼터 저장소로 처리기를 생성합니다.
    pub async fn build(self) -> Result<Processor, AnalyzerError> {
        self.build_with(GitHistory::new(), InMemoryQuotaStore::new())
            .await
    }

    /// 이력 백엔드와 쿼터 저장소를 지정하여 처리기를 생성합니다.
    pub async fn build_with<H: HistoryProvider, S: QuotaStore>(
        self,
        history: H,
        store: S,
    ) -> Result<Processor<H, S>, AnalyzerError> {
        self.config.validate()?;
        let config = self.config;

        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => {
                let catalog = PatternCatalog::load(&config.rule_dir, config.max_match_bytes).await?;
                Arc::new(CatalogHandle::new(catalog))
            }
        };

        let context =
            ContextExtractor::with_history(&config.project_root, config.context_options(), history)
                .map_err(|e| AnalyzerError::Config {
                    field: "project_root".to_owned(),
                    reason: format!("'{}': {e}", config.project_root),
                })?;

        let policy = TierPolicyEngine::with_store(
            config.policies.iter().cloned(),
            &config.keys,
            config.anonymous_tier,
            store,
        );

        info!(
            rules = catalog.snapshot().len(),
            keys = policy.key_count(),
            project_root = %context.root().display(),
            "processor initialized"
        );

        Ok(Processor {
            parser: self.parser.unwrap_or_default(),
            catalog,
            context,
            policy,
            config,
        })
    }
}

impl Default for ProcessorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
