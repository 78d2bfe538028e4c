//! Error types for the sentence game.

/// A specialized `Result` type for game operations.
pub type Result<T> = std::result::Result<T, GameError>;

/// Errors raised while playing the sentence game.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// The event is not allowed in the current phase.
    #[error("Invalid game transition: cannot {event} while {phase}")]
    InvalidTransition {
        /// The phase the session was in.
        phase: String,
        /// The rejected event.
        event: String,
    },

    /// A game was opened for a list without words.
    #[error("Vocabulary list '{id}' has no words\n\nSuggestion: Add entries under spec.data in its definition file")]
    EmptyList {
        /// The list id.
        id: String,
    },

    /// The server has no vocabulary list with this id.
    #[error("Vocabulary list '{id}' not found\n\nSuggestion: Run `habla lists` to see the available ids")]
    ListNotFound {
        /// The requested list id.
        id: String,
    },

    /// The server answered with an unexpected status.
    #[error("Server returned HTTP {status} for {url}: {message}")]
    ServerStatus {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Message from the response body, if any.
        message: String,
    },

    /// The configured server URL cannot address the API.
    #[error("Invalid server URL '{url}': {message}\n\nSuggestion: Use a URL such as http://127.0.0.1:3000 for serverUrl or --server")]
    InvalidServerUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        message: String,
    },

    /// The server could not be reached or replied with invalid JSON.
    #[error("HTTP error: {0}\n\nSuggestion: Check that `habla serve` is running and serverUrl points at it")]
    Http(#[from] reqwest::Error),
}

impl GameError {
    /// Creates a new `InvalidTransition` error.
    #[must_use]
    pub fn invalid_transition(phase: impl std::fmt::Display, event: impl std::fmt::Display) -> Self {
        Self::InvalidTransition {
            phase: phase.to_string(),
            event: event.to_string(),
        }
    }

    /// Returns `true` if the game can continue after this error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }
}

/// Errors from the platform speech capabilities.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpeechError {
    /// No speech recognizer is available.
    #[error("Speech recognition is not supported here; type your sentence instead")]
    Unsupported,

    /// The recognizer could not be started.
    #[error("Speech recognition error: {0}")]
    Recognition(String),
}
