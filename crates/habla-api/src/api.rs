//! HTTP API endpoints for the Habla server.
//!
//! # Endpoints
//!
//! - `GET /api/languages` - Summaries of every loaded vocabulary file
//! - `GET /api/languages/:id` - One vocabulary list
//! - `POST /api/validate-sentence` - Judge a sentence using a target word
//! - `POST /api/validate-answer` - Judge an answer to a follow-up question
//! - `POST /api/generate-context` - Generate an example sentence for a card
//!
//! # Example
//!
//! ```no_run
//! use habla_api::{create_router, AppState, Config, GeminiClient, VocabularyStore};
//!
//! # async fn example() {
//! let config = Config::default();
//! let vocabulary = VocabularyStore::load_dir_or_empty(&config.vocabulary_dir);
//! let client = GeminiClient::from_env(&config).unwrap();
//! let state = AppState::with_model(config, vocabulary, client);
//!
//! let router = create_router(state);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//! axum::serve(listener, router).await.unwrap();
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, info};

use crate::{
    AnswerFeedback, Config, ContextGenerator, GeminiClient, ListSummary, SentenceFeedback,
    ValidationService, VocabularyList, VocabularyStore,
};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Envelope for successful list responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataResponse<T> {
    /// The payload.
    pub data: T,
}

/// Request body for `POST /api/validate-sentence`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateSentenceRequest {
    /// The word the sentence must use.
    pub target_word: Option<String>,
    /// The learner's sentence.
    pub user_sentence: Option<String>,
}

/// Request body for `POST /api/validate-answer`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidateAnswerRequest {
    /// The follow-up question that was asked.
    pub question: Option<String>,
    /// The learner's answer.
    pub answer: Option<String>,
}

/// Request body for `POST /api/generate-context`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateContextRequest {
    /// English term.
    pub english: Option<String>,
    /// Spanish term.
    pub spanish: Option<String>,
}

/// Response body for `POST /api/generate-context`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextResponse {
    /// Example sentence with its translation.
    pub context: String,
}

/// Error response body returned on failure.
///
/// Validation endpoints add a safe negative judgment so clients reading
/// `valid` keep working.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub message: String,
    /// Always `false` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    /// Default sentence rationale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Default answer feedback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl ErrorResponse {
    fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            valid: None,
            reason: None,
            feedback: None,
        }
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
///
/// Everything is immutable after startup and shared across request tasks.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Vocabulary lists loaded at startup.
    pub vocabulary: Arc<VocabularyStore>,
    /// Judges sentences and answers.
    pub validator: Arc<dyn ValidationService>,
    /// Generates example sentences.
    pub context: Arc<dyn ContextGenerator>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("lists", &self.vocabulary.len())
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Creates a new `AppState` from its collaborators.
    #[must_use]
    pub fn new(
        config: Config,
        vocabulary: VocabularyStore,
        validator: Arc<dyn ValidationService>,
        context: Arc<dyn ContextGenerator>,
    ) -> Self {
        Self {
            config,
            vocabulary: Arc::new(vocabulary),
            validator,
            context,
        }
    }

    /// Creates a new `AppState` backed by one model client.
    #[must_use]
    pub fn with_model(config: Config, vocabulary: VocabularyStore, client: GeminiClient) -> Self {
        let client = Arc::new(client);
        Self::new(config, vocabulary, client.clone(), client)
    }
}

// ============================================================================
// API Error Type
// ============================================================================

const SENTENCE_FIELDS_MISSING: &str = "Missing targetWord or userSentence";
const ANSWER_FIELDS_MISSING: &str = "Missing question or answer";
const CONTEXT_FIELDS_MISSING: &str = "Missing english or spanish term";

/// Internal error type for API handlers.
#[derive(Debug)]
enum ApiError {
    /// Missing or empty request fields, or an unparseable body.
    BadRequest(&'static str),
    /// No vocabulary list with this id.
    NotFound,
    /// The route exists but not for this method.
    MethodNotAllowed,
    /// The sentence could not be judged.
    SentenceValidation,
    /// The answer could not be judged.
    AnswerValidation,
    /// The example sentence could not be generated.
    ContextGeneration,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, ErrorResponse::message(message)),
            Self::NotFound => (StatusCode::NOT_FOUND, ErrorResponse::message("not found")),
            Self::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                ErrorResponse::message("Method not allowed"),
            ),
            Self::SentenceValidation => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    valid: Some(false),
                    reason: Some("Failed to validate.".to_string()),
                    ..ErrorResponse::message("Internal server error")
                },
            ),
            Self::AnswerValidation => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    valid: Some(false),
                    feedback: Some("Failed to validate answer.".to_string()),
                    ..ErrorResponse::message("Internal server error")
                },
            ),
            Self::ContextGeneration => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::message("Failed to generate context"),
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// Returns the trimmed field if it is present and not blank.
fn required(field: Option<&String>) -> Option<&str> {
    field.map(|s| s.trim()).filter(|s| !s.is_empty())
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints.
///
/// The router carries:
/// - All API routes under `/api`
/// - JSON 405 responses for unsupported methods
/// - CORS middleware (allow all origins)
/// - Tracing middleware for request logging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route(
            "/languages",
            get(handle_list_languages).fallback(method_not_allowed),
        )
        .route(
            "/languages/:id",
            get(handle_get_language).fallback(method_not_allowed),
        )
        .route(
            "/validate-sentence",
            post(handle_validate_sentence).fallback(method_not_allowed),
        )
        .route(
            "/validate-answer",
            post(handle_validate_answer).fallback(method_not_allowed),
        )
        .route(
            "/generate-context",
            post(handle_generate_context).fallback(method_not_allowed),
        );

    Router::new()
        .nest("/api", api_routes)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Handler for `GET /api/languages`.
async fn handle_list_languages(
    State(state): State<Arc<AppState>>,
) -> Json<DataResponse<Vec<ListSummary>>> {
    Json(DataResponse {
        data: state.vocabulary.summaries().to_vec(),
    })
}

/// Handler for `GET /api/languages/:id`.
///
/// Only files of type `vocabulary` are addressable.
async fn handle_get_language(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<VocabularyList>>, ApiError> {
    let list = state.vocabulary.get(&id).ok_or_else(|| {
        debug!(id = %id, "Unknown vocabulary list");
        ApiError::NotFound
    })?;

    Ok(Json(DataResponse {
        data: list.as_ref().clone(),
    }))
}

/// Handler for `POST /api/validate-sentence`.
async fn handle_validate_sentence(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ValidateSentenceRequest>, JsonRejection>,
) -> Result<Json<SentenceFeedback>, ApiError> {
    let Json(request) = payload.map_err(|_| ApiError::BadRequest(SENTENCE_FIELDS_MISSING))?;
    let (Some(target_word), Some(sentence)) = (
        required(request.target_word.as_ref()),
        required(request.user_sentence.as_ref()),
    ) else {
        return Err(ApiError::BadRequest(SENTENCE_FIELDS_MISSING));
    };

    info!(target_word, sentence_len = sentence.len(), "Validating sentence");

    let feedback = state
        .validator
        .validate_sentence(target_word, sentence)
        .await
        .map_err(|e| {
            error!(error = %e, "Sentence validation failed");
            ApiError::SentenceValidation
        })?;

    info!(
        valid = feedback.valid,
        follow_up = feedback.follow_up().is_some(),
        "Sentence validated"
    );
    Ok(Json(feedback))
}

/// Handler for `POST /api/validate-answer`.
async fn handle_validate_answer(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ValidateAnswerRequest>, JsonRejection>,
) -> Result<Json<AnswerFeedback>, ApiError> {
    let Json(request) = payload.map_err(|_| ApiError::BadRequest(ANSWER_FIELDS_MISSING))?;
    let (Some(question), Some(answer)) = (
        required(request.question.as_ref()),
        required(request.answer.as_ref()),
    ) else {
        return Err(ApiError::BadRequest(ANSWER_FIELDS_MISSING));
    };

    info!(answer_len = answer.len(), "Validating follow-up answer");

    let feedback = state
        .validator
        .validate_answer(question, answer)
        .await
        .map_err(|e| {
            error!(error = %e, "Answer validation failed");
            ApiError::AnswerValidation
        })?;

    info!(valid = feedback.valid, "Answer validated");
    Ok(Json(feedback))
}

/// Handler for `POST /api/generate-context`.
async fn handle_generate_context(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GenerateContextRequest>, JsonRejection>,
) -> Result<Json<ContextResponse>, ApiError> {
    let Json(request) = payload.map_err(|_| ApiError::BadRequest(CONTEXT_FIELDS_MISSING))?;
    let (Some(english), Some(spanish)) = (
        required(request.english.as_ref()),
        required(request.spanish.as_ref()),
    ) else {
        return Err(ApiError::BadRequest(CONTEXT_FIELDS_MISSING));
    };

    let context = state
        .context
        .generate_context(english, spanish)
        .await
        .map_err(|e| {
            error!(error = %e, english, spanish, "Context generation failed");
            ApiError::ContextGeneration
        })?;

    Ok(Json(ContextResponse { context }))
}

// ============================================================================
// Tests
// ============================================================================
