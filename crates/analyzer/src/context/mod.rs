//! 컨텍스트 추출 -- 코드 스니펫, 변경 이력, 실행 환경
//!
//! 티어의 기능 마스크가 허용하는 소스만 수집합니다. 각 하위 추출은 독립적으로
//! 동시에 실행되며, 엔트리당 추출 예산과 요청의 남은 예산 중 작은 값으로
//! 제한됩니다. 실패하거나 시간 초과된 소스는 해당 필드만 비워 두고
//! 다른 소스에는 영향을 주지 않습니다.
//!
//! # 아키텍처
//! - [`location`]: 스택/메시지에서 `file:line` 참조 추출
//! - [`snippet`]: 프로젝트 루트에 묶인 소스 읽기
//! - [`history`]: [`HistoryProvider`] trait과 `git` 구현
//! - [`env`]: 런타임/플랫폼/의존성 요약 (추출기당 한 번 수집 후 캐시)

pub mod env;
pub mod history;
pub mod location;
pub mod snippet;

pub use env::{Dependency, EnvironmentFacts};
pub use history::{CommitInfo, GitHistory, HistoryProvider};
pub use location::{LocationRef, find_locations, primary_location};
pub use snippet::{CodeSnippet, SnippetLine, SnippetReader};

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::debug;

use errsight_core::metrics as m;
use errsight_core::types::{Feature, FeatureMask, LogEntry};

use crate::error::ContextError;
use crate::rule::MatchResult;

/// 엔트리 하나에 대해 수집한 컨텍스트
///
/// 필드 순서(code, history, environment)는 렌더링 순서와 같습니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextBundle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeSnippet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<CommitInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentFacts>,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.code.is_none() && self.history.is_none() && self.environment.is_none()
    }
}

/// 추출기 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOptions {
    /// 참조 줄 위아래로 읽을 줄 수
    pub snippet_radius: usize,
    /// 조회할 최근 커밋 수
    pub history_depth: usize,
    /// 엔트리당 하위 추출 시간 예산
    pub extraction_budget: Duration,
    /// 환경 정보에 담을 최대 의존성 수
    pub max_dependencies: usize,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            snippet_radius: 5,
            history_depth: 3,
            extraction_budget: Duration::from_millis(200),
            max_dependencies: 50,
        }
    }
}

/// 컨텍스트 추출기
///
/// 프로젝트 루트는 생성 시 한 번 정규화되며, 이후 모든 파일 접근은
/// 이 루트 안으로 제한됩니다.
pub struct ContextExtractor<H: HistoryProvider = GitHistory> {
    snippets: SnippetReader,
    history: Arc<H>,
    options: ContextOptions,
    environment: OnceCell<EnvironmentFacts>,
}

impl ContextExtractor<GitHistory> {
    /// `git` 이력 백엔드로 추출기를 생성합니다.
    ///
    /// # Errors
    ///
    /// 프로젝트 루트를 정규화할 수 없으면 `ContextError::Io`를 반환합니다.
    pub fn new(root: impl AsRef<Path>, options: ContextOptions) -> Result<Self, ContextError> {
        Self::with_history(root, options, GitHistory::new())
    }
}

impl<H: HistoryProvider> ContextExtractor<H> {
    /// 지정한 이력 백엔드로 추출기를 생성합니다.
    pub fn with_history(
        root: impl AsRef<Path>,
        options: ContextOptions,
        history: H,
    ) -> Result<Self, ContextError> {
        let root = std::fs::canonicalize(root.as_ref())?;
        Ok(Self {
            snippets: SnippetReader::new(root, options.snippet_radius),
            history: Arc::new(history),
            options,
            environment: OnceCell::new(),
        })
    }

    pub fn root(&self) -> &Path {
        self.snippets.root()
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    /// 기능 마스크가 허용하는 컨텍스트를 수집합니다.
    ///
    /// 실패는 흡수되어 해당 필드가 `None`이 됩니다.
    pub async fn extract(
        &self,
        entry: &LogEntry,
        matched: &MatchResult,
        features: FeatureMask,
        remaining: Duration,
    ) -> ContextBundle {
        let want_code = features.has(Feature::ContextCode);
        let want_history = features.has(Feature::ContextHistory);
        let want_env = features.has(Feature::ContextEnv);
        if !(want_code || want_history || want_env) {
            return ContextBundle::default();
        }

        let budget = self.options.extraction_budget.min(remaining);
        let locations = if want_code || want_history {
            find_locations(entry)
        } else {
            Vec::new()
        };

        let code = async {
            if !want_code {
                return None;
            }
            bounded("code", budget, self.read_code(&locations))
                .await
                .flatten()
        };
        let history = async {
            if !want_history {
                return None;
            }
            bounded("history", budget, self.read_history(&locations))
                .await
                .flatten()
        };
        let environment = async {
            if !want_env {
                return None;
            }
            bounded("env", budget, async {
                Ok::<_, ContextError>(self.environment().await.clone())
            })
            .await
        };

        let (code, history, environment) = tokio::join!(code, history, environment);

        debug!(
            entry = entry.index,
            rule = matched.rule_id().unwrap_or("-"),
            code = code.is_some(),
            history = history.is_some(),
            environment = environment.is_some(),
            "context extracted"
        );

        ContextBundle {
            code,
            history,
            environment,
        }
    }

    /// 캐시된 환경 정보 (처음 호출 시 수집)
    pub async fn environment(&self) -> &EnvironmentFacts {
        self.environment
            .get_or_init(|| env::collect(self.snippets.root(), self.options.max_dependencies))
            .await
    }

    /// 참조 후보를 순서대로 시도하여 처음 읽히는 스니펫을 반환합니다.
    async fn read_code(
        &self,
        locations: &[LocationRef],
    ) -> Result<Option<CodeSnippet>, ContextError> {
        let mut last_err = None;
        for location in locations {
            match self.snippets.read(location).await {
                Ok(snippet) => return Ok(Some(snippet)),
                Err(e) => {
                    debug!(path = %location.path, line = location.line, error = %e, "snippet candidate skipped");
                    last_err = Some(e);
                }
            }
        }
        last_err.map_or(Ok(None), Err)
    }

    async fn read_history(
        &self,
        locations: &[LocationRef],
    ) -> Result<Option<Vec<CommitInfo>>, ContextError> {
        let Some(file) = self.first_resolvable(locations).await else {
            return Ok(None);
        };
        let commits = self
            .history
            .recent_commits(self.snippets.root(), &file, self.options.history_depth)
            .await?;
        Ok((!commits.is_empty()).then_some(commits))
    }

    async fn first_resolvable(&self, locations: &[LocationRef]) -> Option<PathBuf> {
        for location in locations {
            if let Ok(path) = self.snippets.resolve(&location.path).await {
                return Some(path);
            }
        }
        None
    }
}

/// 하위 추출 하나를 시간 예산으로 감쌉니다.
///
/// 실패와 시간 초과는 debug 로그와 메트릭으로만 남기고 `None`을 반환합니다.
async fn bounded<T>(
    source: &'static str,
    budget: Duration,
    fut: impl Future<Output = Result<T, ContextError>>,
) -> Option<T> {
    let err = match tokio::time::timeout(budget, fut).await {
        Ok(Ok(value)) => return Some(value),
        Ok(Err(e)) => e,
        Err(_) => ContextError::Timeout {
            source_name: source,
            budget_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
        },
    };
    debug!(source, error = %err, "context extraction failed");
    metrics::counter!(m::CONTEXT_EXTRACTION_FAILURES_TOTAL, m::LABEL_SOURCE => source)
        .increment(1);
    None
}
