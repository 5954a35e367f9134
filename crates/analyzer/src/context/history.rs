//! 변경 이력 조회
//!
//! [`HistoryProvider`] trait으로 버전 관리 백엔드를 추상화합니다.
//! 기본 구현 [`GitHistory`]는 `git` 프로세스를 실행합니다.
//! 자식 프로세스는 `kill_on_drop`으로 생성되므로 시간 초과로 future가
//! 취소되면 함께 종료됩니다.

use std::future::Future;
use std::path::Path;
use std::process::Stdio;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::process::Command;
use tracing::debug;

use crate::error::ContextError;

/// 필드 구분자 (US)
const FIELD_SEP: char = '\u{1f}';
/// 레코드 구분자 (RS)
const RECORD_SEP: char = '\u{1e}';

/// 커밋 요약
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    /// 짧은 커밋 ID
    pub id: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    /// 커밋 메시지 첫 줄
    pub message: String,
}

/// 버전 관리 이력 백엔드
///
/// 테스트에서는 고정 이력을 돌려주는 구현으로 교체할 수 있습니다.
pub trait HistoryProvider: Send + Sync + 'static {
    /// `file`을 변경한 최근 커밋을 최대 `depth`개 반환합니다.
    ///
    /// # Errors
    ///
    /// - `ContextError::History`: 작업 트리가 아니거나 백엔드 실행 실패
    fn recent_commits(
        &self,
        root: &Path,
        file: &Path,
        depth: usize,
    ) -> impl Future<Output = Result<Vec<CommitInfo>, ContextError>> + Send;
}

/// `git log` 기반 이력 조회
#[derive(Debug, Clone, Default)]
pub struct GitHistory {
    binary: Option<String>,
}

impl GitHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// `git` 대신 사용할 실행 파일을 지정합니다.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: Some(binary.into()),
        }
    }

    fn command(&self, root: &Path) -> Command {
        let mut cmd = Command::new(self.binary.as_deref().unwrap_or("git"));
        cmd.current_dir(root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, root: &Path, args: &[&str]) -> Result<String, ContextError> {
        let output = self
            .command(root)
            .args(args)
            .output()
            .await
            .map_err(|e| ContextError::History(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ContextError::History(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl HistoryProvider for GitHistory {
    async fn recent_commits(
        &self,
        root: &Path,
        file: &Path,
        depth: usize,
    ) -> Result<Vec<CommitInfo>, ContextError> {
        if depth == 0 {
            return Ok(Vec::new());
        }

        let inside = self.run(root, &["rev-parse", "--is-inside-work-tree"]).await?;
        if inside.trim() != "true" {
            return Err(ContextError::History("not a git work tree".to_owned()));
        }

        let relative = file.strip_prefix(root).unwrap_or(file);
        let relative = relative.to_string_lossy();
        let depth_arg = format!("-n{depth}");
        let format_arg = "--format=%h%x1f%an%x1f%aI%x1f%s%x1e";
        let stdout = self
            .run(
                root,
                &["log", &depth_arg, format_arg, "--no-color", "--", &relative],
            )
            .await?;

        let commits = parse_log(&stdout);
        debug!(file = %relative, commits = commits.len(), "history collected");
        Ok(commits)
    }
}

/// `%h US %an US %aI US %s RS` 형식 출력을 파싱합니다.
///
/// 형식이 맞지 않는 레코드는 건너뜁니다.
pub fn parse_log(output: &str) -> Vec<CommitInfo> {
    output
        .split(RECORD_SEP)
        .filter_map(|record| {
            let record = record.trim_matches(|c: char| c == '\n' || c == '\r');
            if record.is_empty() {
                return None;
            }
            let mut fields = record.splitn(4, FIELD_SEP);
            let id = fields.next()?.to_owned();
            let author = fields.next()?.to_owned();
            let timestamp = DateTime::parse_from_rfc3339(fields.next()?)
                .ok()?
                .with_timezone(&Utc);
            let message = fields.next()?.to_owned();
            Some(CommitInfo {
                id,
                author,
                timestamp,
                message,
            })
        })
        .collect()
}
