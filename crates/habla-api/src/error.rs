//! Error types for the Habla API crate.
//!
//! This module defines the error hierarchy for configuration loading,
//! vocabulary loading, and calls to the generative language model.

use std::path::PathBuf;

/// A specialized `Result` type for Habla API operations.
pub type Result<T> = std::result::Result<T, HablaError>;

/// Errors that can occur while serving vocabulary and validating sentences.
///
/// Variants carry actionable suggestions where the user can fix the cause.
#[derive(Debug, thiserror::Error)]
pub enum HablaError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your habla.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Vocabulary Errors
    // ========================================================================
    /// The vocabulary directory could not be read.
    #[error("Cannot read vocabulary directory '{path}': {message}\n\nSuggestion: Check the 'vocabularyDir' field in habla.json")]
    VocabularyDirUnreadable {
        /// Path to the directory.
        path: PathBuf,
        /// Description of the read failure.
        message: String,
    },

    /// A vocabulary definition file is not valid YAML or misses fields.
    #[error("Invalid vocabulary file '{path}': {message}")]
    VocabularyParseError {
        /// Path to the definition file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    // ========================================================================
    // Model Errors
    // ========================================================================
    /// The generative language model call failed.
    #[error("Model API error ({kind}): {message}\n\nSuggestion: {suggestion}")]
    ModelApiError {
        /// The kind of failure.
        kind: ModelErrorKind,
        /// Detailed error message.
        message: String,
        /// Actionable suggestion for the operator.
        suggestion: String,
    },
}

/// Categories of model API errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelErrorKind {
    /// No API key is configured.
    NotConfigured,
    /// Authentication failure (invalid or expired API key).
    Authentication,
    /// Rate limit exceeded.
    RateLimit,
    /// Server error (5xx responses).
    Server,
    /// Network connectivity issues or timeouts.
    Network,
    /// The model replied with something that is not the requested JSON.
    MalformedResponse,
    /// Other unclassified errors.
    Other,
}

impl std::fmt::Display for ModelErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "not_configured"),
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Server => write!(f, "server"),
            Self::Network => write!(f, "network"),
            Self::MalformedResponse => write!(f, "malformed_response"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl ModelErrorKind {
    /// Returns a suggestion message for this error kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::NotConfigured => "Set GOOGLE_GENERATIVE_AI_API_KEY in the environment or a .env file",
            Self::Authentication => "Check your API key",
            Self::RateLimit => "Wait before submitting more sentences",
            Self::Server => "Try again later; the model service may be having issues",
            Self::Network => "Check your network connection",
            Self::MalformedResponse => "Try again; the model did not return the expected JSON",
            Self::Other => "Check the model provider's status page",
        }
    }

    /// Classifies an HTTP status returned by the model API.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }
}

impl HablaError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `VocabularyDirUnreadable` error.
    #[must_use]
    pub fn vocabulary_dir(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::VocabularyDirUnreadable {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `VocabularyParseError`.
    #[must_use]
    pub fn vocabulary_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::VocabularyParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ModelApiError` with the suggestion for its kind.
    #[must_use]
    pub fn model(kind: ModelErrorKind, message: impl Into<String>) -> Self {
        let suggestion = kind.suggestion().to_string();
        Self::ModelApiError {
            kind,
            message: message.into(),
            suggestion,
        }
    }

    /// Returns the model error kind, if this is a model error.
    #[must_use]
    pub const fn model_kind(&self) -> Option<ModelErrorKind> {
        match self {
            Self::ModelApiError { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for HablaError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() || err.is_connect() || err.is_request() {
            ModelErrorKind::Network
        } else if err.is_decode() {
            ModelErrorKind::MalformedResponse
        } else if let Some(status) = err.status() {
            ModelErrorKind::from_status(status.as_u16())
        } else {
            ModelErrorKind::Other
        };
        Self::model(kind, err.to_string())
    }
}
