//! 코드 스니펫 읽기
//!
//! 위치 참조를 프로젝트 루트 안에서만 해석하고, 참조 줄 주변 ±radius 줄을 읽습니다.
//! 정규화(canonicalize)된 경로가 루트를 벗어나면 [`ContextError::OutsideRoot`]를 반환합니다.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use super::location::LocationRef;
use crate::error::ContextError;

/// 스니펫으로 읽을 파일의 최대 크기 (4MB)
const MAX_SOURCE_FILE_SIZE: u64 = 4 * 1024 * 1024;

/// 스니펫의 한 줄
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnippetLine {
    pub number: usize,
    pub text: String,
}

/// 참조 위치 주변의 소스 코드
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeSnippet {
    /// 프로젝트 루트 기준 상대 경로
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    /// 참조된 줄
    pub focus_line: usize,
    pub lines: Vec<SnippetLine>,
}

impl CodeSnippet {
    /// 줄 번호를 붙인 텍스트 (참조 줄은 `>` 표시)
    pub fn render_lines(&self) -> String {
        let width = self.end_line.to_string().len();
        self.lines
            .iter()
            .map(|line| {
                let marker = if line.number == self.focus_line { '>' } else { ' ' };
                format!("{marker} {:>width$} | {}", line.number, line.text)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 루트에 묶인 스니펫 리더
#[derive(Debug, Clone)]
pub struct SnippetReader {
    root: PathBuf,
    radius: usize,
}

impl SnippetReader {
    /// `root`는 이미 정규화된 경로여야 합니다.
    pub fn new(root: PathBuf, radius: usize) -> Self {
        Self { root, radius }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 참조 경로를 루트 안의 실제 경로로 해석합니다.
    pub async fn resolve(&self, reference: &str) -> Result<PathBuf, ContextError> {
        let candidate = Path::new(reference);
        let joined = if candidate.is_absolute() {
            if !candidate.starts_with(&self.root) {
                return Err(ContextError::OutsideRoot(reference.to_owned()));
            }
            candidate.to_path_buf()
        } else {
            // 정규화 전에 상위 디렉터리로 나가는 참조를 먼저 걸러냄
            if escapes_lexically(candidate) {
                return Err(ContextError::OutsideRoot(reference.to_owned()));
            }
            self.root.join(candidate)
        };

        let canonical = tokio::fs::canonicalize(&joined).await?;
        if !canonical.starts_with(&self.root) {
            return Err(ContextError::OutsideRoot(reference.to_owned()));
        }
        Ok(canonical)
    }

    /// 위치 주변의 스니펫을 읽습니다.
    pub async fn read(&self, location: &LocationRef) -> Result<CodeSnippet, ContextError> {
        let path = self.resolve(&location.path).await?;

        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() || metadata.len() > MAX_SOURCE_FILE_SIZE {
            return Err(ContextError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("'{}' is not a readable source file", location.path),
            )));
        }

        let bytes = tokio::fs::read(&path).await?;
        let content = String::from_utf8_lossy(&bytes);
        let total = content.lines().count();
        if location.line == 0 || location.line > total {
            return Err(ContextError::LineOutOfRange {
                path: location.path.clone(),
                line: location.line,
                total,
            });
        }

        let start_line = location.line.saturating_sub(self.radius).max(1);
        let end_line = (location.line + self.radius).min(total);
        let lines = content
            .lines()
            .enumerate()
            .skip(start_line - 1)
            .take(end_line - start_line + 1)
            .map(|(idx, text)| SnippetLine {
                number: idx + 1,
                text: text.to_owned(),
            })
            .collect();

        let relative = path
            .strip_prefix(&self.root)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| location.path.clone());

        Ok(CodeSnippet {
            path: relative,
            start_line,
            end_line,
            focus_line: location.line,
            lines,
        })
    }
}

/// `..` 성분이 루트 위로 올라가는지 검사합니다.
fn escapes_lexically(path: &Path) -> bool {
    let mut depth: usize = 0;
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if depth == 0 {
                    return true;
                }
                depth -= 1;
            }
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return true,
        }
    }
    false
}
