//! 패턴 규칙 데이터 타입
//!
//! YAML 규칙 파일에서 역직렬화되는 구조체들을 정의합니다.

use serde::{Deserialize, Serialize};

use errsight_core::types::{Level, Tier};

use crate::error::AnalyzerError;

/// 규칙 ID 최대 길이
const MAX_RULE_ID_LEN: usize = 256;

/// 패턴 규칙 -- 이름 붙은 에러 시그니처 하나에 대응합니다.
///
/// # YAML 스키마
/// ```yaml
/// id: db-connection-failure
/// signature: database_connection_failure
/// description: The application could not open a connection to its database.
/// priority: 100
/// required_tier: core
/// match:
///   - contains: "connection"
///   - regex: '(?i)(?P<db>postgres|mysql|mongo)\w*'
///     field: any
///   - level: ERROR
/// suggestion: "Check that {db} is reachable from this host."
/// tags: [database, network]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRule {
    /// 규칙 고유 ID
    pub id: String,
    /// 시그니처 이름 (분류 결과로 노출)
    pub signature: String,
    /// 규칙 설명 (ADVANCED_PATTERNS에서 explanation으로 노출)
    #[serde(default)]
    pub description: String,
    /// 우선순위 (높을수록 먼저 평가)
    #[serde(default)]
    pub priority: i32,
    /// 제안/설명을 보기 위해 필요한 최소 티어
    #[serde(default)]
    pub required_tier: Tier,
    /// 확장 패턴 규칙 여부 (ADVANCED_PATTERNS 기능이 있어야 노출)
    #[serde(default)]
    pub advanced: bool,
    /// 규칙 상태
    #[serde(default)]
    pub status: RuleStatus,
    /// 매칭 조건 (AND 결합, 순서대로 평가)
    #[serde(rename = "match")]
    pub predicates: Vec<Predicate>,
    /// 수정 제안 템플릿
    #[serde(default)]
    pub suggestion: String,
    /// 분류 태그
    #[serde(default)]
    pub tags: Vec<String>,
}

impl PatternRule {
    /// 규칙의 유효성을 검증합니다.
    ///
    /// 정규식 컴파일 검증은 매처가 수행합니다.
    pub fn validate(&self) -> Result<(), AnalyzerError> {
        if self.id.trim().is_empty() {
            return Err(invalid("(empty)", "rule id must not be empty"));
        }
        if self.id.len() > MAX_RULE_ID_LEN {
            return Err(invalid(
                &self.id,
                &format!("rule id must not exceed {MAX_RULE_ID_LEN} characters"),
            ));
        }
        if self.signature.trim().is_empty() {
            return Err(invalid(&self.id, "signature must not be empty"));
        }
        if self.predicates.is_empty() {
            return Err(invalid(&self.id, "rule must have at least one predicate"));
        }
        for (idx, predicate) in self.predicates.iter().enumerate() {
            match predicate {
                Predicate::Contains { value, .. } if value.is_empty() => {
                    return Err(invalid(
                        &self.id,
                        &format!("match[{idx}]: contains value must not be empty"),
                    ));
                }
                Predicate::Regex { pattern, .. } if pattern.is_empty() => {
                    return Err(invalid(
                        &self.id,
                        &format!("match[{idx}]: regex pattern must not be empty"),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// 활성 규칙 여부
    pub fn is_enabled(&self) -> bool {
        self.status == RuleStatus::Enabled
    }
}

fn invalid(rule_id: &str, reason: &str) -> AnalyzerError {
    AnalyzerError::RuleValidation {
        rule_id: rule_id.to_owned(),
        reason: reason.to_owned(),
    }
}

/// 규칙 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    /// 활성화 (기본값)
    #[default]
    Enabled,
    /// 비활성화 (카탈로그 구성 시 제외)
    Disabled,
}

/// 매칭 대상 필드
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchField {
    /// 메시지
    Message,
    /// 스택 블록
    Stack,
    /// 메시지와 스택 모두 (기본값)
    #[default]
    Any,
}

/// 매칭 조건
///
/// YAML에서는 `contains`, `regex`, `level` 중 정확히 하나의 키를 가진 매핑으로 표현합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PredicateSpec", into = "PredicateSpec")]
pub enum Predicate {
    /// 대소문자 구분 없는 부분 문자열 포함
    Contains { field: MatchField, value: String },
    /// 정규식 (이름 그룹은 캡처로 수집)
    Regex { field: MatchField, pattern: String },
    /// 레벨 일치
    Level { equals: Level },
}

/// [`Predicate`]의 YAML 표현
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredicateSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<MatchField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl TryFrom<PredicateSpec> for Predicate {
    type Error = String;

    fn try_from(spec: PredicateSpec) -> Result<Self, Self::Error> {
        let field = spec.field.unwrap_or_default();
        match (spec.contains, spec.regex, spec.level) {
            (Some(value), None, None) => Ok(Self::Contains { field, value }),
            (None, Some(pattern), None) => Ok(Self::Regex { field, pattern }),
            (None, None, Some(level)) => {
                if spec.field.is_some() {
                    return Err("'field' is not allowed on a level predicate".to_owned());
                }
                Level::from_str_loose(&level)
                    .or_else(|| level.eq_ignore_ascii_case("unknown").then_some(Level::Unknown))
                    .map(|equals| Self::Level { equals })
                    .ok_or_else(|| format!("unknown level '{level}'"))
            }
            _ => Err("predicate must have exactly one of 'contains', 'regex', 'level'".to_owned()),
        }
    }
}

impl From<Predicate> for PredicateSpec {
    fn from(predicate: Predicate) -> Self {
        match predicate {
            Predicate::Contains { field, value } => Self {
                field: Some(field),
                contains: Some(value),
                ..Self::default()
            },
            Predicate::Regex { field, pattern } => Self {
                field: Some(field),
                regex: Some(pattern),
                ..Self::default()
            },
            Predicate::Level { equals } => Self {
                level: Some(equals.as_str().to_owned()),
                ..Self::default()
            },
        }
    }
}
