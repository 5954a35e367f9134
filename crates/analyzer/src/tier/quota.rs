//! 일일 쿼터 저장소
//!
//! [`QuotaStore`] trait은 키별 일일 카운터 저장소를 추상화합니다.
//! [`InMemoryQuotaStore`]는 샤딩된 동시성 맵(`DashMap`)을 사용하며,
//! 엔트리 잠금 안에서 검사와 증가를 한 번에 수행합니다.
//!
//! 카운터는 UTC 날짜 단위 윈도우를 가지며, 지난 윈도우의 카운터는 접근 시
//! 지연 초기화되거나 [`QuotaStore::purge_expired`]로 정리됩니다.

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;

/// 쿼터 저장소 에러
#[derive(Debug, Clone, thiserror::Error)]
pub enum QuotaStoreError {
    /// 재시도로 해결될 수 있는 일시적 오류
    #[error("transient quota store error: {0}")]
    Transient(String),

    /// 저장소를 사용할 수 없음
    #[error("quota store unavailable: {0}")]
    Unavailable(String),
}

impl QuotaStoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// 키별 일일 카운터 저장소
pub trait QuotaStore: Send + Sync + 'static {
    /// 현재 윈도우의 사용량이 `limit` 미만이면 1 증가시키고 `true`를 반환합니다.
    ///
    /// 한도에 도달했으면 아무것도 바꾸지 않고 `false`를 반환합니다.
    /// 검사와 증가는 같은 키의 다른 호출과 원자적으로 직렬화되어야 합니다.
    fn try_consume(
        &self,
        key: &str,
        limit: u64,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, QuotaStoreError>> + Send;

    /// 현재 윈도우에서 남은 요청 수
    fn remaining(
        &self,
        key: &str,
        limit: u64,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, QuotaStoreError>> + Send;

    /// 지난 윈도우의 카운터를 삭제하고 삭제한 수를 반환합니다.
    fn purge_expired(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<usize, QuotaStoreError>> + Send;
}

/// 한 키의 일일 사용량
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaCounter {
    /// 카운터가 속한 UTC 날짜
    pub window: NaiveDate,
    /// 사용한 요청 수
    pub used: u64,
}

impl QuotaCounter {
    fn roll(&mut self, window: NaiveDate) {
        if self.window != window {
            self.window = window;
            self.used = 0;
        }
    }
}

/// 프로세스 내 쿼터 저장소
#[derive(Debug, Default)]
pub struct InMemoryQuotaStore {
    counters: DashMap<String, QuotaCounter>,
}

impl InMemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 추적 중인 키 수
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// 키의 현재 카운터 (윈도우 경과 여부와 무관하게 저장된 값)
    pub fn counter(&self, key: &str) -> Option<QuotaCounter> {
        self.counters.get(key).map(|c| *c)
    }

    fn consume_at(&self, key: &str, limit: u64, now: DateTime<Utc>) -> bool {
        let window = now.date_naive();
        // entry()가 샤드 쓰기 잠금을 잡고 있는 동안 검사와 증가를 수행
        let mut counter = self
            .counters
            .entry(key.to_owned())
            .or_insert(QuotaCounter { window, used: 0 });
        counter.roll(window);
        if counter.used >= limit {
            return false;
        }
        counter.used += 1;
        true
    }

    fn remaining_at(&self, key: &str, limit: u64, now: DateTime<Utc>) -> u64 {
        let window = now.date_naive();
        match self.counters.get(key) {
            Some(counter) if counter.window == window => limit.saturating_sub(counter.used),
            _ => limit,
        }
    }

    fn purge_at(&self, now: DateTime<Utc>) -> usize {
        let window = now.date_naive();
        let before = self.counters.len();
        self.counters.retain(|_, counter| counter.window >= window);
        before.saturating_sub(self.counters.len())
    }
}

impl QuotaStore for InMemoryQuotaStore {
    async fn try_consume(
        &self,
        key: &str,
        limit: u64,
        now: DateTime<Utc>,
    ) -> Result<bool, QuotaStoreError> {
        Ok(self.consume_at(key, limit, now))
    }

    async fn remaining(
        &self,
        key: &str,
        limit: u64,
        now: DateTime<Utc>,
    ) -> Result<u64, QuotaStoreError> {
        Ok(self.remaining_at(key, limit, now))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, QuotaStoreError> {
        Ok(self.purge_at(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn consume_until_limit() {
        let store = InMemoryQuotaStore::new();
        for _ in 0..3 {
            assert!(store.try_consume("k", 3, at(1, 10)).await.unwrap());
        }
        assert!(!store.try_consume("k", 3, at(1, 11)).await.unwrap());
        // 거부는 카운터를 바꾸지 않음
        assert_eq!(store.counter("k").unwrap().used, 3);
        assert_eq!(store.remaining("k", 3, at(1, 12)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn window_resets_lazily_next_day() {
        let store = InMemoryQuotaStore::new();
        assert!(store.try_consume("k", 1, at(1, 23)).await.unwrap());
        assert!(!store.try_consume("k", 1, at(1, 23)).await.unwrap());
        assert_eq!(store.remaining("k", 1, at(2, 0)).await.unwrap(), 1);
        assert!(store.try_consume("k", 1, at(2, 0)).await.unwrap());
        assert_eq!(store.counter("k").unwrap().window, at(2, 0).date_naive());
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let store = InMemoryQuotaStore::new();
        assert!(store.try_consume("a", 1, at(1, 0)).await.unwrap());
        assert!(store.try_consume("b", 1, at(1, 0)).await.unwrap());
        assert!(!store.try_consume("a", 1, at(1, 0)).await.unwrap());
    }

    #[tokio::test]
    async fn zero_limit_never_consumes() {
        let store = InMemoryQuotaStore::new();
        assert!(!store.try_consume("k", 0, at(1, 0)).await.unwrap());
    }

    #[tokio::test]
    async fn purge_removes_past_windows() {
        let store = InMemoryQuotaStore::new();
        store.try_consume("old", 5, at(1, 0)).await.unwrap();
        store.try_consume("new", 5, at(2, 0)).await.unwrap();
        assert_eq!(store.purge_expired(at(2, 1)).await.unwrap(), 1);
        assert!(store.counter("old").is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_consumers_never_exceed_limit() {
        let store = Arc::new(InMemoryQuotaStore::new());
        let now = at(5, 12);
        let mut handles = Vec::new();
        for _ in 0..64 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.try_consume("shared", 10, now).await.unwrap()
            }));
        }
        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 10);
        assert_eq!(store.counter("shared").unwrap().used, 10);
    }
}
