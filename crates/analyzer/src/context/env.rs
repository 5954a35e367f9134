//! 실행 환경 정보 수집
//!
//! 플랫폼, 프로젝트가 선언한 런타임, 매니페스트의 의존성 요약을 모읍니다.
//! 개별 파일을 읽지 못해도 실패하지 않고 해당 항목만 비워 둡니다.

use std::path::Path;

use serde::Serialize;
use tracing::debug;

/// 매니페스트 파일의 최대 크기 (1MB)
const MAX_MANIFEST_SIZE: u64 = 1024 * 1024;

/// 선언된 의존성
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// 발견된 매니페스트 파일 이름
    pub source: String,
}

/// 환경 정보
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentFacts {
    /// `os/arch`
    pub platform: String,
    /// 프로젝트가 선언한 런타임 (예: `python 3.12`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    pub dependencies: Vec<Dependency>,
    /// 상한 때문에 잘린 의존성 수
    pub dependencies_omitted: usize,
}

impl EnvironmentFacts {
    /// 한 줄 요약
    pub fn summary(&self) -> String {
        let mut out = format!("platform {}", self.platform);
        if let Some(runtime) = &self.runtime {
            out.push_str(&format!(", runtime {runtime}"));
        }
        if !self.dependencies.is_empty() {
            let names: Vec<String> = self
                .dependencies
                .iter()
                .map(|d| match &d.version {
                    Some(v) => format!("{} {}", d.name, v),
                    None => d.name.clone(),
                })
                .collect();
            out.push_str(&format!(", dependencies: {}", names.join(", ")));
            if self.dependencies_omitted > 0 {
                out.push_str(&format!(" (+{} more)", self.dependencies_omitted));
            }
        }
        out
    }
}

/// 프로젝트 루트에서 환경 정보를 수집합니다.
pub async fn collect(root: &Path, max_dependencies: usize) -> EnvironmentFacts {
    let platform = format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH);
    let runtime = detect_runtime(root).await;

    let mut dependencies = Vec::new();
    for (name, parse) in MANIFESTS {
        if let Some(content) = read_small(&root.join(name)).await {
            dependencies.extend(parse(&content).into_iter().map(|(dep, version)| Dependency {
                name: dep,
                version,
                source: (*name).to_owned(),
            }));
        }
    }

    let dependencies_omitted = dependencies.len().saturating_sub(max_dependencies);
    dependencies.truncate(max_dependencies);

    debug!(
        platform = %platform,
        runtime = ?runtime,
        dependencies = dependencies.len(),
        "environment facts collected"
    );

    EnvironmentFacts {
        platform,
        runtime,
        dependencies,
        dependencies_omitted,
    }
}

type ManifestParser = fn(&str) -> Vec<(String, Option<String>)>;

const MANIFESTS: &[(&str, ManifestParser)] = &[
    ("Cargo.toml", parse_cargo_toml),
    ("package.json", parse_package_json),
    ("requirements.txt", parse_requirements),
    ("pyproject.toml", parse_pyproject),
    ("go.mod", parse_go_mod),
];

async fn read_small(path: &Path) -> Option<String> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    if !metadata.is_file() || metadata.len() > MAX_MANIFEST_SIZE {
        return None;
    }
    tokio::fs::read_to_string(path).await.ok()
}

async fn detect_runtime(root: &Path) -> Option<String> {
    for name in ["rust-toolchain.toml", "rust-toolchain"] {
        if let Some(content) = read_small(&root.join(name)).await {
            if let Some(channel) = parse_rust_toolchain(&content) {
                return Some(format!("rust {channel}"));
            }
        }
    }
    if let Some(content) = read_small(&root.join(".python-version")).await {
        return first_line(&content).map(|v| format!("python {v}"));
    }
    if let Some(content) = read_small(&root.join(".nvmrc")).await {
        return first_line(&content).map(|v| format!("node {}", v.trim_start_matches('v')));
    }
    if let Some(content) = read_small(&root.join("go.mod")).await {
        return content
            .lines()
            .find_map(|l| l.trim().strip_prefix("go "))
            .map(|v| format!("go {}", v.trim()));
    }
    None
}

fn first_line(content: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_owned)
}

fn parse_rust_toolchain(content: &str) -> Option<String> {
    match content.parse::<toml::Table>() {
        Ok(table) => table
            .get("toolchain")
            .and_then(|t| t.get("channel"))
            .and_then(|c| c.as_str())
            .map(str::to_owned),
        // 구형 rust-toolchain 파일은 채널 이름만 담음
        Err(_) => first_line(content),
    }
}

fn toml_table_deps(table: Option<&toml::Value>) -> Vec<(String, Option<String>)> {
    let Some(table) = table.and_then(|v| v.as_table()) else {
        return Vec::new();
    };
    table
        .iter()
        .map(|(name, spec)| {
            let version = match spec {
                toml::Value::String(v) => Some(v.clone()),
                toml::Value::Table(t) => t.get("version").and_then(|v| v.as_str()).map(str::to_owned),
                _ => None,
            };
            (name.clone(), version)
        })
        .collect()
}

fn parse_cargo_toml(content: &str) -> Vec<(String, Option<String>)> {
    let Ok(table) = content.parse::<toml::Table>() else {
        return Vec::new();
    };
    let mut deps = toml_table_deps(table.get("dependencies"));
    if deps.is_empty() {
        deps = toml_table_deps(table.get("workspace").and_then(|w| w.get("dependencies")));
    }
    deps
}

fn parse_package_json(content: &str) -> Vec<(String, Option<String>)> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(content) else {
        return Vec::new();
    };
    value
        .get("dependencies")
        .and_then(|d| d.as_object())
        .map(|deps| {
            deps.iter()
                .map(|(name, v)| (name.clone(), v.as_str().map(str::to_owned)))
                .collect()
        })
        .unwrap_or_default()
}

/// `name==1.0`, `name>=2`, `name` 형식의 요구사항을 분리합니다.
fn split_requirement(spec: &str) -> Option<(String, Option<String>)> {
    let spec = spec.split(';').next()?.trim();
    if spec.is_empty() || spec.starts_with('-') || spec.starts_with('#') {
        return None;
    }
    match spec.find(|c: char| matches!(c, '=' | '<' | '>' | '~' | '!' | ' ' | '[')) {
        Some(pos) => {
            let name = spec[..pos].trim().to_owned();
            let rest = spec[pos..].trim();
            let version = (!rest.is_empty() && !rest.starts_with('[')).then(|| rest.to_owned());
            (!name.is_empty()).then_some((name, version))
        }
        None => Some((spec.to_owned(), None)),
    }
}

fn parse_requirements(content: &str) -> Vec<(String, Option<String>)> {
    content
        .lines()
        .map(|l| l.split(" #").next().unwrap_or(l))
        .filter_map(split_requirement)
        .collect()
}

fn parse_pyproject(content: &str) -> Vec<(String, Option<String>)> {
    let Ok(table) = content.parse::<toml::Table>() else {
        return Vec::new();
    };
    if let Some(list) = table
        .get("project")
        .and_then(|p| p.get("dependencies"))
        .and_then(|d| d.as_array())
    {
        return list
            .iter()
            .filter_map(|v| v.as_str())
            .filter_map(split_requirement)
            .collect();
    }
    // poetry
    toml_table_deps(
        table
            .get("tool")
            .and_then(|t| t.get("poetry"))
            .and_then(|p| p.get("dependencies")),
    )
    .into_iter()
    .filter(|(name, _)| name != "python")
    .collect()
}

fn parse_go_mod(content: &str) -> Vec<(String, Option<String>)> {
    let mut deps = Vec::new();
    let mut in_block = false;
    for line in content.lines() {
        let line = line.split("//").next().unwrap_or(line).trim();
        if line == "require (" {
            in_block = true;
            continue;
        }
        if in_block && line == ")" {
            in_block = false;
            continue;
        }
        let spec = if in_block {
            line
        } else if let Some(rest) = line.strip_prefix("require ") {
            rest.trim()
        } else {
            continue;
        };
        let mut parts = spec.split_whitespace();
        if let Some(name) = parts.next() {
            deps.push((name.to_owned(), parts.next().map(str::to_owned)));
        }
    }
    deps
}
