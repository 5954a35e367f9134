//! 티어 정책 엔진 -- API 키 인증, 일일 쿼터, 기능 게이팅
//!
//! 요청 처리 전에 키를 티어 정책으로 해석하고 쿼터를 소비합니다.
//! 호출자가 선언한 티어 힌트는 인증된 티어 이하일 때만 적용되며,
//! 쿼터와 입력 크기 제한은 항상 인증된 티어의 정책을 따릅니다.
//!
//! # 아키텍처
//! - [`TierPolicyEngine`]: 키 → 정책 해석, 티어 힌트 처리, 쿼터 소비
//! - [`quota`]: [`QuotaStore`] trait과 인메모리 구현

pub mod quota;

pub use quota::{InMemoryQuotaStore, QuotaCounter, QuotaStore, QuotaStoreError};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use tracing::{debug, warn};

use errsight_core::config::ApiKeyConfig;
use errsight_core::metrics as m;
use errsight_core::types::{Tier, TierPolicy};

use crate::error::AnalyzerError;

/// 빈 키로 들어온 익명 요청의 쿼터 식별자
const ANONYMOUS_QUOTA_KEY: &str = "<anonymous>";

/// 인증된 키 정보
#[derive(Debug, Clone)]
struct KeyGrant {
    tier: Tier,
    label: String,
}

/// 티어 정책 엔진
///
/// 키 테이블과 티어 정책은 생성 후 변경되지 않습니다. 공유 가변 상태는
/// 쿼터 저장소뿐입니다.
pub struct TierPolicyEngine<S: QuotaStore = InMemoryQuotaStore> {
    policies: BTreeMap<Tier, TierPolicy>,
    keys: HashMap<String, KeyGrant>,
    anonymous_tier: Option<Tier>,
    store: Arc<S>,
}

impl TierPolicyEngine<InMemoryQuotaStore> {
    /// 인메모리 쿼터 저장소로 엔진을 생성합니다.
    pub fn new(
        policies: impl IntoIterator<Item = TierPolicy>,
        keys: &[ApiKeyConfig],
        anonymous_tier: Option<Tier>,
    ) -> Self {
        Self::with_store(policies, keys, anonymous_tier, InMemoryQuotaStore::new())
    }
}

impl<S: QuotaStore> TierPolicyEngine<S> {
    /// 지정한 쿼터 저장소로 엔진을 생성합니다.
    ///
    /// 정책이 없는 티어는 [`TierPolicy::default_for`]로 채웁니다.
    pub fn with_store(
        policies: impl IntoIterator<Item = TierPolicy>,
        keys: &[ApiKeyConfig],
        anonymous_tier: Option<Tier>,
        store: S,
    ) -> Self {
        let mut table: BTreeMap<Tier, TierPolicy> = Tier::ALL
            .iter()
            .map(|&tier| (tier, TierPolicy::default_for(tier)))
            .collect();
        for policy in policies {
            table.insert(policy.tier, policy);
        }

        let mut grants = HashMap::with_capacity(keys.len());
        for key in keys {
            if key.key.is_empty() {
                warn!(label = %key.label, "ignoring API key entry with empty key");
                continue;
            }
            if grants
                .insert(
                    key.key.clone(),
                    KeyGrant {
                        tier: key.tier,
                        label: key.label.clone(),
                    },
                )
                .is_some()
            {
                warn!(label = %key.label, "duplicate API key entry, last one wins");
            }
        }

        Self {
            policies: table,
            keys: grants,
            anonymous_tier,
            store: Arc::new(store),
        }
    }

    /// 티어의 정책
    pub fn policy(&self, tier: Tier) -> TierPolicy {
        self.policies
            .get(&tier)
            .cloned()
            .unwrap_or_else(|| TierPolicy::default_for(tier))
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// 등록된 키 수
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// 키를 인증하여 해당 티어의 정책을 반환합니다.
    ///
    /// 빈 키는 익명 티어가 설정된 경우에만 허용됩니다.
    ///
    /// # Errors
    ///
    /// 알 수 없는 키이거나 빈 키인데 익명 티어가 없으면 `AnalyzerError::Auth`.
    pub fn authorize(&self, key: &str) -> Result<TierPolicy, AnalyzerError> {
        if key.is_empty() {
            return match self.anonymous_tier {
                Some(tier) => {
                    debug!(tier = %tier, "anonymous request authorized");
                    Ok(self.policy(tier))
                }
                None => Err(AnalyzerError::Auth("missing API key".to_owned())),
            };
        }

        match self.keys.get(key) {
            Some(grant) => {
                debug!(tier = %grant.tier, label = %grant.label, "API key authorized");
                Ok(self.policy(grant.tier))
            }
            None => Err(AnalyzerError::Auth("unknown API key".to_owned())),
        }
    }

    /// 적용할 티어를 결정합니다.
    ///
    /// 힌트가 인증된 티어 이하일 때만 힌트를 따릅니다.
    pub fn resolve_tier(&self, authorized: Tier, hint: Option<Tier>) -> Tier {
        match hint {
            Some(hint) if hint <= authorized => hint,
            Some(hint) => {
                debug!(
                    authorized = %authorized,
                    hint = %hint,
                    "tier hint above authorized tier ignored"
                );
                authorized
            }
            None => authorized,
        }
    }

    /// 현재 시각 기준으로 쿼터를 1 소비합니다.
    ///
    /// # Errors
    ///
    /// - `AnalyzerError::Auth`: 인증 실패
    /// - `AnalyzerError::Internal`: 저장소 오류 (일시 오류는 한 번 재시도 후)
    pub async fn consume(&self, key: &str) -> Result<bool, AnalyzerError> {
        self.consume_at(key, Utc::now()).await
    }

    /// 지정한 시각 기준으로 쿼터를 1 소비합니다.
    pub async fn consume_at(&self, key: &str, now: DateTime<Utc>) -> Result<bool, AnalyzerError> {
        let policy = self.authorize(key)?;
        let quota_key = quota_key(key);

        let granted = match self
            .store
            .try_consume(quota_key, policy.daily_quota, now)
            .await
        {
            Ok(granted) => granted,
            Err(e) if e.is_transient() => {
                debug!(error = %e, "retrying quota store operation");
                metrics::counter!(m::QUOTA_STORE_RETRIES_TOTAL).increment(1);
                self.store
                    .try_consume(quota_key, policy.daily_quota, now)
                    .await
                    .map_err(|e| AnalyzerError::Internal(format!("quota store: {e}")))?
            }
            Err(e) => return Err(AnalyzerError::Internal(format!("quota store: {e}"))),
        };

        if !granted {
            metrics::counter!(m::QUOTA_REJECTIONS_TOTAL, m::LABEL_TIER => policy.tier.as_str())
                .increment(1);
        }
        Ok(granted)
    }

    /// 현재 윈도우에서 키에 남은 요청 수
    pub async fn remaining(&self, key: &str) -> Result<u64, AnalyzerError> {
        self.remaining_at(key, Utc::now()).await
    }

    pub async fn remaining_at(&self, key: &str, now: DateTime<Utc>) -> Result<u64, AnalyzerError> {
        let policy = self.authorize(key)?;
        self.store
            .remaining(quota_key(key), policy.daily_quota, now)
            .await
            .map_err(|e| AnalyzerError::Internal(format!("quota store: {e}")))
    }

    /// 지난 윈도우의 카운터를 정리합니다.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, AnalyzerError> {
        let purged = self
            .store
            .purge_expired(now)
            .await
            .map_err(|e| AnalyzerError::Internal(format!("quota store: {e}")))?;
        if purged > 0 {
            debug!(purged, "expired quota counters purged");
        }
        Ok(purged)
    }
}

/// `now` 다음의 UTC 자정 (쿼터 윈도우 리셋 시각)
pub fn reset_at(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .succ_opt()
        .map(|day| day.and_time(NaiveTime::MIN).and_utc())
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn quota_key(key: &str) -> &str {
    if key.is_empty() { ANONYMOUS_QUOTA_KEY } else { key }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use errsight_core::types::FeatureMask;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn keys() -> Vec<ApiKeyConfig> {
        vec![
            ApiKeyConfig {
                key: "core-key".to_owned(),
                tier: Tier::Core,
                label: "core".to_owned(),
            },
            ApiKeyConfig {
                key: "pro-key".to_owned(),
                tier: Tier::Pro,
                label: "pro".to_owned(),
            },
        ]
    }

    fn engine_with_quota(quota: u64) -> TierPolicyEngine {
        let policies = Tier::ALL.iter().map(|&tier| TierPolicy {
            daily_quota: quota,
            ..TierPolicy::default_for(tier)
        });
        TierPolicyEngine::new(policies, &keys(), None)
    }

    #[test]
    fn authorize_known_and_unknown_keys() {
        let engine = engine_with_quota(10);
        assert_eq!(engine.authorize("pro-key").unwrap().tier, Tier::Pro);
        assert!(matches!(engine.authorize("nope"), Err(AnalyzerError::Auth(_))));
        assert!(matches!(engine.authorize(""), Err(AnalyzerError::Auth(_))));
    }

    #[test]
    fn anonymous_tier_only_for_empty_key() {
        let engine = TierPolicyEngine::new(Vec::<TierPolicy>::new(), &keys(), Some(Tier::Core));
        assert_eq!(engine.authorize("").unwrap().tier, Tier::Core);
        assert!(engine.authorize("unknown").is_err());
    }

    #[test]
    fn missing_policies_use_defaults() {
        let engine = TierPolicyEngine::new(Vec::<TierPolicy>::new(), &keys(), None);
        assert_eq!(engine.policy(Tier::Team), TierPolicy::default_for(Tier::Team));
        assert_eq!(engine.key_count(), 2);
    }

    #[test]
    fn tier_hint_can_only_downgrade() {
        let engine = engine_with_quota(10);
        assert_eq!(engine.resolve_tier(Tier::Pro, Some(Tier::Core)), Tier::Core);
        assert_eq!(engine.resolve_tier(Tier::Pro, Some(Tier::Scale)), Tier::Pro);
        assert_eq!(engine.resolve_tier(Tier::Pro, None), Tier::Pro);
    }

    #[test]
    fn reset_is_next_utc_midnight() {
        let now = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(
            reset_at(now),
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
        );
        let midnight = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(
            reset_at(midnight),
            Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn consume_stops_at_quota() {
        let engine = engine_with_quota(2);
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap();
        assert!(engine.consume_at("core-key", now).await.unwrap());
        assert!(engine.consume_at("core-key", now).await.unwrap());
        assert!(!engine.consume_at("core-key", now).await.unwrap());
        assert_eq!(engine.remaining_at("core-key", now).await.unwrap(), 0);
        assert_eq!(engine.remaining_at("pro-key", now).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn consume_rejects_unknown_key() {
        let engine = engine_with_quota(2);
        assert!(matches!(
            engine.consume("bogus").await,
            Err(AnalyzerError::Auth(_))
        ));
    }

    /// 처음 `failures`번은 지정한 에러를 반환하는 저장소
    struct FlakyStore {
        failures: usize,
        transient: bool,
        calls: AtomicUsize,
    }

    impl QuotaStore for FlakyStore {
        async fn try_consume(
            &self,
            _key: &str,
            _limit: u64,
            _now: DateTime<Utc>,
        ) -> Result<bool, QuotaStoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                if self.transient {
                    return Err(QuotaStoreError::Transient("busy".to_owned()));
                }
                return Err(QuotaStoreError::Unavailable("down".to_owned()));
            }
            Ok(true)
        }

        async fn remaining(
            &self,
            _key: &str,
            limit: u64,
            _now: DateTime<Utc>,
        ) -> Result<u64, QuotaStoreError> {
            Ok(limit)
        }

        async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize, QuotaStoreError> {
            Ok(0)
        }
    }

    fn flaky_engine(failures: usize, transient: bool) -> TierPolicyEngine<FlakyStore> {
        TierPolicyEngine::with_store(
            Vec::<TierPolicy>::new(),
            &keys(),
            None,
            FlakyStore {
                failures,
                transient,
                calls: AtomicUsize::new(0),
            },
        )
    }

    #[tokio::test]
    async fn transient_error_retried_once() {
        let engine = flaky_engine(1, true);
        assert!(engine.consume("core-key").await.unwrap());
        assert_eq!(engine.store().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn repeated_transient_error_is_internal() {
        let engine = flaky_engine(2, true);
        assert!(matches!(
            engine.consume("core-key").await,
            Err(AnalyzerError::Internal(_))
        ));
        assert_eq!(engine.store().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_error_not_retried() {
        let engine = flaky_engine(1, false);
        assert!(engine.consume("core-key").await.is_err());
        assert_eq!(engine.store().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn effective_features_follow_resolved_tier() {
        let engine = engine_with_quota(10);
        let authorized = engine.authorize("pro-key").unwrap();
        let tier = engine.resolve_tier(authorized.tier, Some(Tier::Core));
        assert_eq!(engine.policy(tier).features, FeatureMask::NONE);
    }
}
