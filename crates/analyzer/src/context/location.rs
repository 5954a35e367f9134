//! 파일 위치 참조 추출
//!
//! 스택(없으면 메시지)에서 `file:line` 참조를 찾아 실패 순서대로 반환합니다.
//!
//! - Python: `File "app/views.py", line 42` (마지막 프레임이 가장 안쪽)
//! - JVM/JS: `at fn (src/app.js:12:5)`, `at com.acme.Svc.run(Svc.java:27)` (첫 프레임이 가장 안쪽)
//! - 일반: `src/main.rs:10:5`

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use errsight_core::types::LogEntry;

/// 텍스트에서 찾은 파일 위치
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LocationRef {
    /// 참조된 경로 (텍스트 그대로)
    pub path: String,
    /// 1부터 시작하는 줄 번호
    pub line: usize,
    /// 열 번호 (있는 경우)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
}

static PYTHON_FRAME_RE: OnceLock<Option<Regex>> = OnceLock::new();
static AT_FRAME_RE: OnceLock<Option<Regex>> = OnceLock::new();
static GENERIC_REF_RE: OnceLock<Option<Regex>> = OnceLock::new();

/// 패턴을 한 번만 컴파일합니다. 실패하면 경고를 남기고 해당 패턴의 스캔을 건너뜁니다.
fn compiled(
    cell: &'static OnceLock<Option<Regex>>,
    name: &str,
    pattern: &str,
) -> Option<&'static Regex> {
    cell.get_or_init(|| match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::warn!(pattern = name, error = %e, "location pattern disabled");
            None
        }
    })
    .as_ref()
}

fn python_frame_re() -> Option<&'static Regex> {
    compiled(
        &PYTHON_FRAME_RE,
        "python-frame",
        r#"File "(?P<path>[^"]+)", line (?P<line>\d+)"#,
    )
}

fn at_frame_re() -> Option<&'static Regex> {
    compiled(
        &AT_FRAME_RE,
        "at-frame",
        r"(?m)^\s*at\s+(?:[^(\n]*\()?(?P<path>[^\s():]+):(?P<line>\d+)(?::(?P<col>\d+))?",
    )
}

fn generic_ref_re() -> Option<&'static Regex> {
    compiled(
        &GENERIC_REF_RE,
        "generic",
        concat!(
            r"(?P<path>[\w./\-]*[\w\-]\.",
            r"(?:py|rs|js|mjs|cjs|jsx|ts|tsx|java|kt|scala|go|rb|php|cs|c|cc|cpp|h|hpp|swift|ex|exs|lua|sh|vue|dart))",
            r":(?P<line>\d+)(?::(?P<col>\d+))?\b",
        ),
    )
}

/// 엔트리의 위치 참조를 실패 순서(가장 안쪽 프레임 먼저)로 반환합니다.
///
/// 스택에서 아무것도 찾지 못하면 메시지를 다시 검사합니다.
pub fn find_locations(entry: &LogEntry) -> Vec<LocationRef> {
    let refs = scan(entry.location_text());
    if refs.is_empty() && entry.stack.is_some() {
        return scan(&entry.message);
    }
    refs
}

/// 가장 안쪽 위치 참조
pub fn primary_location(entry: &LogEntry) -> Option<LocationRef> {
    find_locations(entry).into_iter().next()
}

/// 텍스트에서 위치 참조를 추출합니다.
pub fn scan(text: &str) -> Vec<LocationRef> {
    let mut seen = HashSet::new();
    let mut refs = Vec::new();
    let mut push = |r: LocationRef, refs: &mut Vec<LocationRef>| {
        if r.line > 0 && seen.insert((r.path.clone(), r.line)) {
            refs.push(r);
        }
    };

    // Python traceback: 마지막 프레임이 실패 지점
    if let Some(re) = python_frame_re() {
        let python: Vec<LocationRef> = re
            .captures_iter(text)
            .filter_map(|caps| to_ref(&caps))
            .collect();
        for r in python.into_iter().rev() {
            push(r, &mut refs);
        }
    }

    for re in [at_frame_re(), generic_ref_re()].into_iter().flatten() {
        for caps in re.captures_iter(text) {
            if let Some(r) = to_ref(&caps) {
                push(r, &mut refs);
            }
        }
    }

    refs
}

fn to_ref(caps: &regex::Captures<'_>) -> Option<LocationRef> {
    let path = caps.name("path")?.as_str().to_owned();
    let line = caps.name("line")?.as_str().parse().ok()?;
    let column = caps.name("col").and_then(|c| c.as_str().parse().ok());
    Some(LocationRef { path, line, column })
}
