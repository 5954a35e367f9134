//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 분석기는 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `errsight_`
//! - 컴포넌트명: `analyzer_`, `catalog_`, `quota_`, `context_`
//! - 접미어: `_total` (counter), `_seconds` (histogram), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(errsight_core::metrics::ANALYZER_ENTRIES_PROCESSED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 결과 레이블 키 (success, auth_error, quota_exceeded, input_too_large, internal_error)
pub const LABEL_RESULT: &str = "result";

/// 티어 레이블 키 (core, pro, team, enterprise, scale)
pub const LABEL_TIER: &str = "tier";

/// 컨텍스트 소스 레이블 키 (code, history, env)
pub const LABEL_SOURCE: &str = "source";

/// 로그 레벨 레이블 키
pub const LABEL_LEVEL: &str = "level";

// ─── Analyzer 메트릭 ────────────────────────────────────────────────

/// Analyzer: 처리한 요청 수 (counter, labels: result, tier)
pub const ANALYZER_REQUESTS_TOTAL: &str = "errsight_analyzer_requests_total";

/// Analyzer: 처리한 로그 엔트리 수 (counter, label: level)
pub const ANALYZER_ENTRIES_PROCESSED_TOTAL: &str = "errsight_analyzer_entries_processed_total";

/// Analyzer: 시간 예산 초과로 잘린 요청 수 (counter)
pub const ANALYZER_TRUNCATED_TOTAL: &str = "errsight_analyzer_truncated_total";

/// Analyzer: 요청 처리 지연 시간 (histogram, 초)
pub const ANALYZER_PROCESSING_DURATION_SECONDS: &str =
    "errsight_analyzer_processing_duration_seconds";

// ─── Catalog 메트릭 ─────────────────────────────────────────────────

/// Catalog: 규칙 매칭 수 (counter)
pub const CATALOG_RULE_MATCHES_TOTAL: &str = "errsight_catalog_rule_matches_total";

/// Catalog: 분류되지 않은 엔트리 수 (counter)
pub const CATALOG_UNCLASSIFIED_TOTAL: &str = "errsight_catalog_unclassified_total";

/// Catalog: 티어 제한으로 억제된 매칭 수 (counter)
pub const CATALOG_SUPPRESSED_TOTAL: &str = "errsight_catalog_suppressed_total";

/// Catalog: 현재 스냅샷의 규칙 수 (gauge)
pub const CATALOG_RULES_LOADED: &str = "errsight_catalog_rules_loaded";

/// Catalog: 스냅샷 교체 횟수 (counter)
pub const CATALOG_RELOADS_TOTAL: &str = "errsight_catalog_reloads_total";

// ─── Quota 메트릭 ───────────────────────────────────────────────────

/// Quota: 쿼터 소진으로 거부된 요청 수 (counter, label: tier)
pub const QUOTA_REJECTIONS_TOTAL: &str = "errsight_quota_rejections_total";

/// Quota: 저장소 일시 오류로 재시도한 횟수 (counter)
pub const QUOTA_STORE_RETRIES_TOTAL: &str = "errsight_quota_store_retries_total";

// ─── Context 메트릭 ─────────────────────────────────────────────────

/// Context: 실패하거나 시간 초과된 하위 추출 수 (counter, label: source)
pub const CONTEXT_EXTRACTION_FAILURES_TOTAL: &str = "errsight_context_extraction_failures_total";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 요청 처리 지연 시간 히스토그램 버킷 (초)
///
/// 1ms ~ 10s 범위
pub const PROCESSING_DURATION_BUCKETS: [f64; 9] =
    [0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 10.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        ANALYZER_REQUESTS_TOTAL,
        "Total number of analysis requests by result and tier"
    );
    describe_counter!(
        ANALYZER_ENTRIES_PROCESSED_TOTAL,
        "Total number of log entries parsed, classified and rendered"
    );
    describe_counter!(
        ANALYZER_TRUNCATED_TOTAL,
        "Total number of requests returned as partial results after the time budget ran out"
    );
    describe_histogram!(
        ANALYZER_PROCESSING_DURATION_SECONDS,
        "Time to process a single analysis request in seconds"
    );

    describe_counter!(
        CATALOG_RULE_MATCHES_TOTAL,
        "Total number of entries classified by a pattern rule"
    );
    describe_counter!(
        CATALOG_UNCLASSIFIED_TOTAL,
        "Total number of entries no pattern rule matched"
    );
    describe_counter!(
        CATALOG_SUPPRESSED_TOTAL,
        "Total number of matches hidden because the rule requires a higher tier"
    );
    describe_gauge!(
        CATALOG_RULES_LOADED,
        "Number of rules in the active catalog snapshot"
    );
    describe_counter!(
        CATALOG_RELOADS_TOTAL,
        "Total number of catalog snapshot swaps"
    );

    describe_counter!(
        QUOTA_REJECTIONS_TOTAL,
        "Total number of requests refused because the daily quota was exhausted"
    );
    describe_counter!(
        QUOTA_STORE_RETRIES_TOTAL,
        "Total number of quota store operations retried after a transient error"
    );

    describe_counter!(
        CONTEXT_EXTRACTION_FAILURES_TOTAL,
        "Total number of context sub-extractions that failed or timed out"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        ANALYZER_REQUESTS_TOTAL,
        ANALYZER_ENTRIES_PROCESSED_TOTAL,
        ANALYZER_TRUNCATED_TOTAL,
        ANALYZER_PROCESSING_DURATION_SECONDS,
        CATALOG_RULE_MATCHES_TOTAL,
        CATALOG_UNCLASSIFIED_TOTAL,
        CATALOG_SUPPRESSED_TOTAL,
        CATALOG_RULES_LOADED,
        CATALOG_RELOADS_TOTAL,
        QUOTA_REJECTIONS_TOTAL,
        QUOTA_STORE_RETRIES_TOTAL,
        CONTEXT_EXTRACTION_FAILURES_TOTAL,
    ];

    #[test]
    fn all_metrics_start_with_errsight_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("errsight_"),
                "Metric '{}' does not start with 'errsight_' prefix",
                name
            );
        }
    }

    #[test]
    fn describe_all_does_not_panic() {
        describe_all();
    }

    #[test]
    fn label_keys_are_lowercase() {
        for label in [LABEL_RESULT, LABEL_TIER, LABEL_SOURCE, LABEL_LEVEL] {
            assert_eq!(label.to_lowercase(), label);
        }
    }

    #[test]
    fn processing_duration_buckets_are_sorted() {
        let buckets = PROCESSING_DURATION_BUCKETS;
        for i in 1..buckets.len() {
            assert!(buckets[i] > buckets[i - 1]);
        }
    }
}
