//! Sentence validation contract and the generative-model client behind it.
//!
//! [`ValidationService`] is the contract the sentence game depends on. The
//! server implements it with [`GeminiClient`], which prompts a Google
//! generative language model and parses its JSON reply. Calls are made
//! once; there is no retry.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{Config, API_KEY_ENV};
use crate::error::{HablaError, ModelErrorKind, Result};

/// Judgment on a sentence that should use a target word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentenceFeedback {
    /// Whether the sentence uses the word correctly and is grammatical.
    pub valid: bool,
    /// Explanation in English.
    #[serde(default)]
    pub reason: String,
    /// Optional comprehension question about the sentence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_question: Option<String>,
}

impl SentenceFeedback {
    /// Creates feedback without a follow-up question.
    #[must_use]
    pub fn new(valid: bool, reason: impl Into<String>) -> Self {
        Self {
            valid,
            reason: reason.into(),
            follow_up_question: None,
        }
    }

    /// Adds a follow-up question.
    #[must_use]
    pub fn with_follow_up(mut self, question: impl Into<String>) -> Self {
        self.follow_up_question = Some(question.into());
        self
    }

    /// The follow-up question, if one was given and is not blank.
    #[must_use]
    pub fn follow_up(&self) -> Option<&str> {
        self.follow_up_question
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }

    /// Drops a blank follow-up question.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.follow_up().is_none() {
            self.follow_up_question = None;
        }
        self
    }
}

/// Judgment on an answer to a follow-up question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerFeedback {
    /// Whether the answer is a correct, grammatical response.
    pub valid: bool,
    /// Explanation in English.
    #[serde(default)]
    pub feedback: String,
}

impl AnswerFeedback {
    /// Creates answer feedback.
    #[must_use]
    pub fn new(valid: bool, feedback: impl Into<String>) -> Self {
        Self {
            valid,
            feedback: feedback.into(),
        }
    }
}

/// Judges learner sentences and follow-up answers.
#[async_trait]
pub trait ValidationService: Send + Sync {
    /// Judges whether `user_sentence` correctly uses `target_word`.
    async fn validate_sentence(
        &self,
        target_word: &str,
        user_sentence: &str,
    ) -> Result<SentenceFeedback>;

    /// Judges whether `answer` is a correct response to `question`.
    async fn validate_answer(&self, question: &str, answer: &str) -> Result<AnswerFeedback>;
}

/// Produces example sentences for flashcards.
#[async_trait]
pub trait ContextGenerator: Send + Sync {
    /// Returns a short example sentence using `spanish`, with translation.
    async fn generate_context(&self, english: &str, spanish: &str) -> Result<String>;
}

// ============================================================================
// Prompts
// ============================================================================

/// Quotes user text as a JSON string literal so it cannot break the prompt.
fn quote(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

/// Builds the prompt that judges a sentence.
#[must_use]
pub fn sentence_prompt(target_word: &str, user_sentence: &str) -> String {
    [
        format!("Analyze this Spanish sentence: {}.", quote(user_sentence)),
        format!(
            "Does it use the word {} (or a valid conjugation or variation of it) correctly, and is it grammatically correct Spanish?",
            quote(target_word)
        ),
        "If the sentence is valid, also write one short comprehension question in Spanish about it that the learner can answer.".to_string(),
        r#"Respond ONLY with a JSON object in this format: { "valid": boolean, "reason": "explanation in English", "followUpQuestion": "question in Spanish, omitted when invalid" }"#.to_string(),
    ]
    .join("\n")
}

/// Builds the prompt that judges a follow-up answer.
#[must_use]
pub fn answer_prompt(question: &str, answer: &str) -> String {
    [
        format!("The learner was asked this question in Spanish: {}.", quote(question)),
        format!("They answered: {}.", quote(answer)),
        "Is this a grammatically correct and relevant answer in Spanish?".to_string(),
        r#"Respond ONLY with a JSON object in this format: { "valid": boolean, "feedback": "explanation in English" }"#.to_string(),
    ]
    .join("\n")
}

/// Builds the prompt that generates an example sentence.
#[must_use]
pub fn context_prompt(english: &str, spanish: &str) -> String {
    format!(
        "Write one simple, short Spanish sentence using the word {} (meaning {}) followed by its English translation, formatted as \"Spanish sentence. (English translation)\". Keep it easy for a beginner.",
        quote(spanish),
        quote(english)
    )
}

// ============================================================================
// Reply parsing
// ============================================================================

static CODE_FENCE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").ok());

/// Removes a markdown code fence wrapped around a model reply.
#[must_use]
pub fn strip_code_fence(text: &str) -> &str {
    CODE_FENCE
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map_or_else(|| text.trim(), |m| m.as_str())
}

/// Parses a model reply into `T`, tolerating a surrounding code fence.
///
/// # Errors
///
/// Returns a `MalformedResponse` model error if the reply is not the
/// expected JSON object.
pub fn parse_model_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(strip_code_fence(text)).map_err(|e| {
        HablaError::model(
            ModelErrorKind::MalformedResponse,
            format!("cannot parse model reply as JSON: {e}"),
        )
    })
}

// ============================================================================
// Gemini client
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GenerateContentResponse {
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content.parts.iter().map(|p| p.text.as_str()).collect();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

/// Client for the Google generative language `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    validation_model: String,
    context_model: String,
}

impl GeminiClient {
    /// Creates a client from configuration and an optional API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config, api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(u64::from(config.request_timeout_secs)))
            .build()?;

        Ok(Self {
            http,
            api_url: config.model_api_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            validation_model: config.validation_model.clone(),
            context_model: config.context_model.clone(),
        })
    }

    /// Creates a client reading the API key from the environment.
    pub fn from_env(config: &Config) -> Result<Self> {
        Self::new(config, std::env::var(API_KEY_ENV).ok())
    }

    /// Returns `true` if an API key is available.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Sends `prompt` to `model` and returns the reply text.
    async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            HablaError::model(
                ModelErrorKind::NotConfigured,
                format!("{API_KEY_ENV} is not set"),
            )
        })?;

        let url = format!("{}/models/{model}:generateContent", self.api_url);
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        debug!(model, prompt_len = prompt.len(), "Calling model");
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(model, status = status.as_u16(), "Model request failed");
            return Err(HablaError::model(
                ModelErrorKind::from_status(status.as_u16()),
                format!("HTTP {status}: {}", truncate(&detail, 300)),
            ));
        }

        let reply: GenerateContentResponse = response.json().await?;
        reply.text().ok_or_else(|| {
            HablaError::model(ModelErrorKind::MalformedResponse, "model returned no text")
        })
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(idx, _)| &text[..idx])
}

#[async_trait]
impl ValidationService for GeminiClient {
    async fn validate_sentence(
        &self,
        target_word: &str,
        user_sentence: &str,
    ) -> Result<SentenceFeedback> {
        let reply = self
            .generate(&self.validation_model, &sentence_prompt(target_word, user_sentence))
            .await?;
        parse_model_json::<SentenceFeedback>(&reply).map(SentenceFeedback::normalized)
    }

    async fn validate_answer(&self, question: &str, answer: &str) -> Result<AnswerFeedback> {
        let reply = self
            .generate(&self.validation_model, &answer_prompt(question, answer))
            .await?;
        parse_model_json(&reply)
    }
}

#[async_trait]
impl ContextGenerator for GeminiClient {
    async fn generate_context(&self, english: &str, spanish: &str) -> Result<String> {
        self.generate(&self.context_model, &context_prompt(english, spanish))
            .await
    }
}
