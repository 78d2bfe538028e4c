//! Habla API
//!
//! Loads vocabulary lists, validates learner sentences with a generative
//! language model, and serves both over HTTP.

pub mod api;
pub mod config;
pub mod error;
pub mod validation;
pub mod vocabulary;

pub use api::{
    create_router, AppState, ContextResponse, DataResponse, ErrorResponse,
    GenerateContextRequest, ValidateAnswerRequest, ValidateSentenceRequest,
};
pub use config::{Config, SpeechConfig, API_KEY_ENV, CONFIG_FILE_NAME};
pub use error::{HablaError, ModelErrorKind, Result};
pub use validation::{
    AnswerFeedback, ContextGenerator, GeminiClient, SentenceFeedback, ValidationService,
};
pub use vocabulary::{ListSummary, VocabularyList, VocabularySpec, VocabularyStore, WordPair, VOCABULARY_TYPE};
