//! CLI-specific error types and exit code mapping

use errsight_analyzer::AnalyzerError;
use errsight_core::error::ErrsightError;

/// CLI-specific error type.
///
/// `exit_code()` maps each variant to a stable process exit code.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (input read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from errsight-core.
    #[error("{0}")]
    Core(#[from] ErrsightError),

    /// Analysis request or pipeline setup failed.
    #[error("{0}")]
    Analyzer(#[from] AnalyzerError),

    /// Rule files failed validation.
    #[error("rule error: {0}")]
    Rule(String),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                  |
    /// |------|------------------------------------------|
    /// | 0    | Success                                  |
    /// | 1    | General / command / internal error       |
    /// | 2    | Configuration error                      |
    /// | 3    | Missing or unknown API key               |
    /// | 4    | Daily quota exceeded                     |
    /// | 5    | Input larger than the tier allows        |
    /// | 6    | Rule load or validation error            |
    /// | 10   | IO error                                 |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(ErrsightError::Config(_)) => 2,
            Self::Analyzer(err) => match err {
                AnalyzerError::Auth(_) => 3,
                AnalyzerError::QuotaExceeded { .. } => 4,
                AnalyzerError::InputTooLarge { .. } => 5,
                AnalyzerError::RuleLoad { .. }
                | AnalyzerError::RuleValidation { .. }
                | AnalyzerError::Regex(_) => 6,
                AnalyzerError::Config { .. } => 2,
                AnalyzerError::Io(_) => 10,
                AnalyzerError::Internal(_) => 1,
            },
            Self::Rule(_) | Self::Core(ErrsightError::Rule(_)) => 6,
            Self::Io(_) | Self::Core(ErrsightError::Io(_)) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }

    /// Message shown to the user on stderr.
    ///
    /// Internal analyzer faults are reported generically; details go to the log.
    pub fn user_message(&self) -> String {
        match self {
            Self::Analyzer(err) => err.public_message(),
            other => other.to_string(),
        }
    }
}
