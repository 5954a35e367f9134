#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`parser`]: 원시 텍스트를 [`LogEntry`](errsight_core::types::LogEntry) 목록으로 분할
//! - [`rule`]: YAML 패턴 카탈로그와 우선순위 기반 분류
//! - [`context`]: 코드 스니펫, 변경 이력, 실행 환경 추출
//! - [`tier`]: API 키 인증, 일일 쿼터, 티어 힌트 처리
//! - [`format`]: 티어별 출력 렌더링 (구조화/텍스트)
//! - [`processor`]: 요청 단위 오케스트레이션
//! - [`config`]: 분석기 설정 (core 설정에서 파생)
//! - [`error`]: 도메인 에러 타입

pub mod config;
pub mod context;
pub mod error;
pub mod format;
pub mod parser;
pub mod processor;
pub mod rule;
pub mod tier;

// --- 주요 타입 re-export ---

// 처리기
pub use processor::{
    AnalysisRequest, AnalysisResponse, ProcessedEntry, ProcessingResult, Processor,
    ProcessorBuilder,
};

// 설정
pub use config::{AnalyzerConfig, AnalyzerConfigBuilder};

// 에러
pub use error::{AnalyzerError, ContextError};

// 파서
pub use parser::{EntryParser, HeaderFormat, JsonLineParser};

// 패턴 카탈로그
pub use rule::{CatalogHandle, MatchResult, PatternCatalog, PatternRule, RuleLoader};

// 컨텍스트
pub use context::{ContextBundle, ContextExtractor, ContextOptions, GitHistory, HistoryProvider};

// 티어 정책
pub use tier::{InMemoryQuotaStore, QuotaStore, TierPolicyEngine};

// 렌더링
pub use format::{Formatter, RenderedEntry};
