//! HTTP client for a running Habla server.
//!
//! [`ApiClient`] fetches vocabulary lists and implements
//! [`ValidationService`] by calling the server's validation endpoints, so
//! the game never holds a model API key itself.

use std::time::Duration;

use async_trait::async_trait;
use habla_api::{
    AnswerFeedback, Config, ContextGenerator, ContextResponse, DataResponse, ErrorResponse,
    GenerateContextRequest, HablaError, ListSummary, ModelErrorKind, SentenceFeedback,
    ValidateAnswerRequest, ValidateSentenceRequest, ValidationService, VocabularyList,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::error::{GameError, Result};

/// Client for the `/api` endpoints of a Habla server.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: reqwest::Url,
}

impl ApiClient {
    /// Creates a client for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `GameError::InvalidServerUrl` if `base_url` is not an
    /// http(s) URL, or an HTTP error if the client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let raw = base_url.into();
        let base = reqwest::Url::parse(&raw).map_err(|e| GameError::InvalidServerUrl {
            url: raw.clone(),
            message: e.to_string(),
        })?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(GameError::InvalidServerUrl {
                url: raw,
                message: "expected an http:// or https:// URL".to_string(),
            });
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base })
    }

    /// Creates a client for `config.server_url`.
    ///
    /// The timeout leaves room for the server's own model call.
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = Duration::from_secs(u64::from(config.request_timeout_secs) + 5);
        Self::new(&config.server_url, timeout)
    }

    /// The server base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    /// Builds `{base}/api/{segments...}`, percent-encoding each segment.
    fn url(&self, segments: &[&str]) -> reqwest::Url {
        let mut url = self.base.clone();
        // checked in `new`: the base URL has a path
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("api").extend(segments);
        }
        url
    }

    /// Lists every vocabulary file the server loaded.
    pub async fn list_languages(&self) -> Result<Vec<ListSummary>> {
        let url = self.url(&["languages"]);
        let response = self.http.get(url.clone()).send().await?;
        let body: DataResponse<Vec<ListSummary>> = read_json(url.as_str(), response).await?;
        Ok(body.data)
    }

    /// Fetches one vocabulary list.
    ///
    /// # Errors
    ///
    /// Returns `GameError::ListNotFound` if the server has no such list.
    pub async fn get_language(&self, id: &str) -> Result<VocabularyList> {
        let url = self.url(&["languages", id]);
        let response = self.http.get(url.clone()).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(GameError::ListNotFound { id: id.to_string() });
        }
        let body: DataResponse<VocabularyList> = read_json(url.as_str(), response).await?;
        debug!(id, cards = body.data.len(), "Fetched vocabulary list");
        Ok(body.data)
    }

    /// Posts `body` to `path` for a validation endpoint.
    ///
    /// Any failure, including a non-2xx status with a default payload, is
    /// reported as an error so the game applies its own failure feedback.
    async fn post_validation<B, T>(&self, path: &str, body: &B) -> habla_api::Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = self.url(&[path]);
        let response = self.http.post(url.clone()).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorResponse>()
                .await
                .map_or_else(|_| status.to_string(), |e| e.message);
            return Err(HablaError::model(
                ModelErrorKind::from_status(status.as_u16()),
                format!("{url} returned {status}: {message}"),
            ));
        }

        Ok(response.json().await?)
    }
}

async fn read_json<T: DeserializeOwned>(url: &str, response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let message = response
            .json::<ErrorResponse>()
            .await
            .map(|e| e.message)
            .unwrap_or_default();
        return Err(GameError::ServerStatus {
            url: url.to_string(),
            status: status.as_u16(),
            message,
        });
    }
    Ok(response.json().await?)
}

#[async_trait]
impl ValidationService for ApiClient {
    async fn validate_sentence(
        &self,
        target_word: &str,
        user_sentence: &str,
    ) -> habla_api::Result<SentenceFeedback> {
        let body = ValidateSentenceRequest {
            target_word: Some(target_word.to_string()),
            user_sentence: Some(user_sentence.to_string()),
        };
        self.post_validation("validate-sentence", &body).await
    }

    async fn validate_answer(
        &self,
        question: &str,
        answer: &str,
    ) -> habla_api::Result<AnswerFeedback> {
        let body = ValidateAnswerRequest {
            question: Some(question.to_string()),
            answer: Some(answer.to_string()),
        };
        self.post_validation("validate-answer", &body).await
    }
}

#[async_trait]
impl ContextGenerator for ApiClient {
    async fn generate_context(&self, english: &str, spanish: &str) -> habla_api::Result<String> {
        let body = GenerateContextRequest {
            english: Some(english.to_string()),
            spanish: Some(spanish.to_string()),
        };
        let response: ContextResponse = self.post_validation("generate-context", &body).await?;
        Ok(response.context)
    }
}
