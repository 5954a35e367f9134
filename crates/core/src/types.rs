//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입
//!
//! 파서, 패턴 매처, 컨텍스트 추출기, 포매터가 공유하는 데이터 구조를 정의합니다.

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 로그 엔트리
///
/// 원시 입력에서 추출한 하나의 논리적 로그 레코드입니다.
/// 여러 줄(스택 트레이스 포함)에 걸칠 수 있으며, 파싱 이후에는 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// 입력 내 엔트리 순번 (0부터)
    pub index: usize,
    /// 엔트리가 시작하는 입력 줄 번호 (1부터)
    pub line: usize,
    /// 엔트리에 해당하는 원본 텍스트
    pub raw: String,
    /// 헤더에서 파싱한 타임스탬프 (UTC)
    pub timestamp: Option<DateTime<Utc>>,
    /// 심각도 레벨
    pub level: Level,
    /// 메시지 본문
    pub message: String,
    /// 스택 트레이스 / traceback 블록
    pub stack: Option<String>,
}

impl LogEntry {
    /// 스택 블록이 있으면 스택을, 없으면 메시지를 반환합니다.
    ///
    /// 파일 위치 참조를 찾을 때 사용합니다.
    pub fn location_text(&self) -> &str {
        self.stack.as_deref().unwrap_or(&self.message)
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// 로그 심각도 레벨
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    /// 헤더를 인식하지 못한 엔트리
    #[default]
    Unknown,
}

impl Level {
    /// 문자열에서 레벨을 파싱합니다.
    ///
    /// 대소문자를 구분하지 않으며 흔히 쓰이는 별칭(WARNING, CRITICAL 등)을 허용합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" | "verbose" | "finest" => Some(Self::Trace),
            "debug" | "fine" => Some(Self::Debug),
            "info" | "information" | "notice" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" | "err" | "severe" => Some(Self::Error),
            "fatal" | "critical" | "crit" | "panic" | "emerg" | "emergency" | "alert" => {
                Some(Self::Fatal)
            }
            _ => None,
        }
    }

    /// 정규화된 대문자 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 서비스 티어
///
/// `Ord` 구현은 선언 순서를 따릅니다 (`Core < Pro < Team < Enterprise < Scale`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Core,
    Pro,
    Team,
    Enterprise,
    Scale,
}

impl Tier {
    /// 낮은 티어부터 정렬된 전체 티어 목록
    pub const ALL: [Tier; 5] = [
        Tier::Core,
        Tier::Pro,
        Tier::Team,
        Tier::Enterprise,
        Tier::Scale,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Pro => "pro",
            Self::Team => "team",
            Self::Enterprise => "enterprise",
            Self::Scale => "scale",
        }
    }

    /// 렌더링 결과에 붙는 티어 배지
    pub fn badge(&self) -> &'static str {
        match self {
            Self::Core => "[CORE]",
            Self::Pro => "[PRO]",
            Self::Team => "[TEAM]",
            Self::Enterprise => "[ENTERPRISE]",
            Self::Scale => "[SCALE]",
        }
    }

    /// 문자열에서 티어를 파싱합니다. 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_loose(s).ok_or_else(|| {
            format!("unknown tier '{s}', expected one of: core, pro, team, enterprise, scale")
        })
    }
}

/// 티어별로 허용되는 개별 기능
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Feature {
    /// 실패 위치 주변 소스 코드
    ContextCode,
    /// 해당 파일의 최근 변경 이력
    ContextHistory,
    /// 런타임/플랫폼/의존성 정보
    ContextEnv,
    /// 규칙 설명과 정규식 캡처를 포함한 확장 패턴 출력
    AdvancedPatterns,
}

impl Feature {
    pub const ALL: [Feature; 4] = [
        Feature::ContextCode,
        Feature::ContextHistory,
        Feature::ContextEnv,
        Feature::AdvancedPatterns,
    ];

    const fn bit(self) -> u8 {
        match self {
            Self::ContextCode => 0b0001,
            Self::ContextHistory => 0b0010,
            Self::ContextEnv => 0b0100,
            Self::AdvancedPatterns => 0b1000,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContextCode => "context-code",
            Self::ContextHistory => "context-history",
            Self::ContextEnv => "context-env",
            Self::AdvancedPatterns => "advanced-patterns",
        }
    }
}

/// 기능 비트셋
///
/// 요청당 한 번 [`TierPolicy`]에서 결정되어 컨텍스트 추출기와 포매터로 전달됩니다.
/// 설정 파일에서는 기능 이름 목록(`["context-code", "context-env"]`)으로 표현합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Feature>", into = "Vec<Feature>")]
pub struct FeatureMask(u8);

impl FeatureMask {
    pub const NONE: Self = Self(0);
    pub const CONTEXT_CODE: Self = Self(Feature::ContextCode.bit());
    pub const CONTEXT_HISTORY: Self = Self(Feature::ContextHistory.bit());
    pub const CONTEXT_ENV: Self = Self(Feature::ContextEnv.bit());
    pub const ADVANCED_PATTERNS: Self = Self(Feature::AdvancedPatterns.bit());
    pub const ALL: Self = Self(0b1111);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// `other`의 모든 비트가 포함되어 있는지 확인합니다.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn has(self, feature: Feature) -> bool {
        self.0 & feature.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// 켜져 있는 기능 목록 (고정 순서)
    pub fn features(self) -> Vec<Feature> {
        Feature::ALL
            .into_iter()
            .filter(|feature| self.has(*feature))
            .collect()
    }
}

impl BitOr for FeatureMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl From<Feature> for FeatureMask {
    fn from(feature: Feature) -> Self {
        Self(feature.bit())
    }
}

impl From<Vec<Feature>> for FeatureMask {
    fn from(features: Vec<Feature>) -> Self {
        features
            .into_iter()
            .fold(Self::NONE, |mask, feature| mask | feature.into())
    }
}

impl From<FeatureMask> for Vec<Feature> {
    fn from(mask: FeatureMask) -> Self {
        mask.features()
    }
}

impl fmt::Display for FeatureMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.features().iter().map(Feature::as_str).collect();
        f.write_str(&names.join(","))
    }
}

/// 티어 정책
///
/// 티어의 일일 쿼터, 최대 입력 크기, 허용 기능을 묶습니다.
/// 구체적인 수치는 비즈니스 설정이므로 `[tiers.<name>]` 섹션에서 덮어쓸 수 있습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPolicy {
    /// 티어
    pub tier: Tier,
    /// 일일 요청 쿼터 (UTC 자정 기준)
    pub daily_quota: u64,
    /// 요청당 최대 입력 크기 (바이트)
    pub max_input_bytes: usize,
    /// 허용 기능
    pub features: FeatureMask,
}

impl TierPolicy {
    /// 설정이 없을 때 사용하는 티어별 기본 정책
    pub fn default_for(tier: Tier) -> Self {
        let (daily_quota, max_input_bytes, features) = match tier {
            Tier::Core => (50, 64 * 1024, FeatureMask::NONE),
            Tier::Pro => (1_000, 512 * 1024, FeatureMask::CONTEXT_CODE),
            Tier::Team => (
                5_000,
                1024 * 1024,
                FeatureMask::CONTEXT_CODE | FeatureMask::CONTEXT_HISTORY,
            ),
            Tier::Enterprise => (20_000, 5 * 1024 * 1024, FeatureMask::ALL),
            Tier::Scale => (100_000, 10 * 1024 * 1024, FeatureMask::ALL),
        };
        Self {
            tier,
            daily_quota,
            max_input_bytes,
            features,
        }
    }

    pub fn allows(&self, feature: Feature) -> bool {
        self.features.has(feature)
    }
}
