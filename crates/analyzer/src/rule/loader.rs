//! 규칙 파일 로더 -- YAML 규칙 파일을 디스크에서 로드합니다.
//!
//! 규칙 디렉토리 내의 `.yml`/`.yaml` 파일을 파일 이름 순으로 스캔합니다.
//! 한 파일은 단일 규칙, 규칙 목록, `rules:` 키를 가진 카탈로그 문서 중 하나이며
//! `---`로 구분된 여러 문서를 담을 수 있습니다.
//! 시작 시 로딩([`RuleLoader::load_directory`])은 개별 파일 파싱 실패를 경고 로그로 남기고
//! 건너뛰며, 재로딩([`RuleLoader::load_directory_strict`])은 실패 하나로 전체를 거부합니다.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::AnalyzerError;

use super::matcher::CompiledRule;
use super::types::PatternRule;

/// 규칙 파일 최대 크기
const MAX_RULE_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB
/// 디렉토리당 최대 규칙 수
const MAX_RULES_COUNT: usize = 10_000;

/// 파일 단위 검증 결과
#[derive(Debug)]
pub struct FileReport {
    /// 규칙 파일 경로
    pub path: PathBuf,
    /// 로드된 규칙 수 또는 실패 사유
    pub result: Result<usize, AnalyzerError>,
}

/// 규칙 파일 로더
pub struct RuleLoader;

impl RuleLoader {
    /// 디렉토리에서 모든 YAML 규칙을 로드합니다.
    ///
    /// 파일 이름 순, 파일 안에서는 문서 순서로 등록 순서가 정해집니다.
    /// 개별 파일 로딩 실패와 중복 ID는 경고 로그를 남기고 건너뜁니다.
    ///
    /// # Errors
    /// - 디렉토리를 읽을 수 없는 경우
    /// - 규칙 수가 `MAX_RULES_COUNT`를 초과하는 경우
    pub async fn load_directory(
        dir: impl AsRef<Path>,
    ) -> Result<Vec<PatternRule>, AnalyzerError> {
        let dir = dir.as_ref();
        let files = Self::rule_files(dir).await?;

        let mut rules = Vec::new();
        let mut seen_ids = HashSet::new();

        for path in files {
            let loaded = match Self::load_file(&path).await {
                Ok(loaded) => loaded,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to load rule file, skipping"
                    );
                    continue;
                }
            };

            for rule in loaded {
                if !seen_ids.insert(rule.id.clone()) {
                    tracing::warn!(
                        rule_id = %rule.id,
                        path = %path.display(),
                        "duplicate rule id, skipping"
                    );
                    continue;
                }
                rules.push(rule);
            }

            if rules.len() > MAX_RULES_COUNT {
                return Err(AnalyzerError::RuleLoad {
                    path: dir.display().to_string(),
                    reason: format!("too many rules: max {MAX_RULES_COUNT}"),
                });
            }
        }

        tracing::info!(
            dir = %dir.display(),
            count = rules.len(),
            "loaded pattern rules"
        );

        Ok(rules)
    }

    /// 디렉토리에서 모든 YAML 규칙을 로드하되, 하나라도 실패하면 전체를 실패시킵니다.
    ///
    /// 실행 중 카탈로그 교체처럼 일부 규칙만 빠진 카탈로그를 허용할 수 없는 경로에서 사용합니다.
    ///
    /// # Errors
    /// - 디렉토리를 읽을 수 없는 경우
    /// - 어떤 파일이든 로드/검증에 실패하거나 규칙 ID가 중복된 경우
    /// - 규칙 수가 `MAX_RULES_COUNT`를 초과하는 경우
    pub async fn load_directory_strict(
        dir: impl AsRef<Path>,
    ) -> Result<Vec<PatternRule>, AnalyzerError> {
        let dir = dir.as_ref();
        let files = Self::rule_files(dir).await?;

        let mut rules = Vec::new();
        let mut seen_ids = HashSet::new();

        for path in files {
            for rule in Self::load_file(&path).await? {
                if !seen_ids.insert(rule.id.clone()) {
                    return Err(AnalyzerError::RuleValidation {
                        rule_id: rule.id,
                        reason: format!("duplicate rule id in {}", path.display()),
                    });
                }
                rules.push(rule);
            }

            if rules.len() > MAX_RULES_COUNT {
                return Err(AnalyzerError::RuleLoad {
                    path: dir.display().to_string(),
                    reason: format!("too many rules: max {MAX_RULES_COUNT}"),
                });
            }
        }

        Ok(rules)
    }

    /// 디렉토리의 모든 규칙 파일을 검증하고 파일별 결과를 반환합니다.
    ///
    /// [`load_directory`](Self::load_directory)와 달리 실패한 파일을 건너뛰지 않고 보고합니다.
    pub async fn validate_directory(
        dir: impl AsRef<Path>,
    ) -> Result<Vec<FileReport>, AnalyzerError> {
        let files = Self::rule_files(dir.as_ref()).await?;
        let mut reports = Vec::with_capacity(files.len());
        let mut seen_ids = HashSet::new();

        for path in files {
            let result = Self::load_file(&path).await.and_then(|rules| {
                for rule in &rules {
                    if !seen_ids.insert(rule.id.clone()) {
                        return Err(AnalyzerError::RuleValidation {
                            rule_id: rule.id.clone(),
                            reason: "duplicate rule id".to_owned(),
                        });
                    }
                }
                Ok(rules.len())
            });
            reports.push(FileReport { path, result });
        }

        Ok(reports)
    }

    /// 디렉토리의 `.yml`/`.yaml` 파일 목록을 이름 순으로 반환합니다.
    async fn rule_files(dir: &Path) -> Result<Vec<PathBuf>, AnalyzerError> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| AnalyzerError::RuleLoad {
                path: dir.display().to_string(),
                reason: format!("failed to read directory: {e}"),
            })?;

        let mut files = Vec::new();
        while let Some(entry) =
            entries
                .next_entry()
                .await
                .map_err(|e| AnalyzerError::RuleLoad {
                    path: dir.display().to_string(),
                    reason: format!("failed to read directory entry: {e}"),
                })?
        {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml");
            if is_yaml {
                files.push(path);
            }
        }

        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    /// 단일 YAML 파일에서 규칙을 로드합니다.
    pub async fn load_file(path: impl AsRef<Path>) -> Result<Vec<PatternRule>, AnalyzerError> {
        let path = path.as_ref();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| AnalyzerError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("failed to read file metadata: {e}"),
            })?;

        if metadata.len() > MAX_RULE_FILE_SIZE {
            return Err(AnalyzerError::RuleLoad {
                path: path.display().to_string(),
                reason: format!(
                    "file too large: {} bytes (max: {MAX_RULE_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| AnalyzerError::RuleLoad {
                    path: path.display().to_string(),
                    reason: format!("failed to read file: {e}"),
                })?;

        Self::parse_yaml(&content, &path.display().to_string())
    }

    /// YAML 문자열을 파싱하여 규칙 목록을 생성합니다.
    ///
    /// 각 규칙은 유효성 검증과 정규식 컴파일 검사를 거칩니다.
    pub fn parse_yaml(yaml_str: &str, source: &str) -> Result<Vec<PatternRule>, AnalyzerError> {
        let mut rules = Vec::new();

        for document in serde_yaml::Deserializer::from_str(yaml_str) {
            let value = serde_yaml::Value::deserialize(document).map_err(|e| yaml_error(source, e))?;
            rules.extend(Self::rules_from_value(value, source)?);
        }

        // 검증 + 정규식 컴파일 확인
        for rule in &rules {
            CompiledRule::compile(rule.clone())?;
        }

        Ok(rules)
    }

    fn rules_from_value(
        value: serde_yaml::Value,
        source: &str,
    ) -> Result<Vec<PatternRule>, AnalyzerError> {
        let is_catalog = value
            .as_mapping()
            .is_some_and(|map| map.contains_key("rules"));

        match value {
            serde_yaml::Value::Null => Ok(Vec::new()),
            serde_yaml::Value::Sequence(_) => {
                serde_yaml::from_value(value).map_err(|e| yaml_error(source, e))
            }
            serde_yaml::Value::Mapping(_) if is_catalog => {
                #[derive(Deserialize)]
                struct CatalogDocument {
                    rules: Vec<PatternRule>,
                }
                let doc: CatalogDocument =
                    serde_yaml::from_value(value).map_err(|e| yaml_error(source, e))?;
                Ok(doc.rules)
            }
            serde_yaml::Value::Mapping(_) => {
                let rule: PatternRule =
                    serde_yaml::from_value(value).map_err(|e| yaml_error(source, e))?;
                Ok(vec![rule])
            }
            _ => Err(AnalyzerError::RuleLoad {
                path: source.to_owned(),
                reason: "expected a rule mapping, a rule list or a catalog document".to_owned(),
            }),
        }
    }
}

fn yaml_error(source: &str, e: serde_yaml::Error) -> AnalyzerError {
    AnalyzerError::RuleLoad {
        path: source.to_owned(),
        reason: format!("YAML parse error: {e}"),
    }
}
