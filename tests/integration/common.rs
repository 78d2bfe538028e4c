//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use habla_api::{
    create_router, AnswerFeedback, AppState, Config, ContextGenerator, HablaError,
    ModelErrorKind, SentenceFeedback, ValidationService, VocabularyStore,
};

/// Path to the integration fixtures.
pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

/// Loads the fixture vocabulary directory.
pub fn fixture_store() -> VocabularyStore {
    VocabularyStore::load_dir(fixture_path().join("vocabulary"))
        .expect("Failed to load fixture vocabulary")
}

/// Helper to find an available port for testing.
pub fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// Spawns the test server and returns its base URL.
pub async fn spawn_test_server(state: AppState) -> (String, tokio::task::JoinHandle<()>) {
    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");

    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://{addr}"), handle)
}

/// Spawns a server over the fixture vocabulary backed by `validator`.
pub async fn spawn_with(validator: Arc<StubValidator>) -> (String, tokio::task::JoinHandle<()>) {
    let state = AppState::new(
        Config::default(),
        fixture_store(),
        validator.clone(),
        validator,
    );
    spawn_test_server(state).await
}

/// How the stub validator answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Valid sentences, no follow-up question.
    Plain,
    /// Valid sentences with a follow-up question about the word.
    FollowUp,
    /// Every call fails like an unreachable model.
    Failing,
}

/// Deterministic stand-in for the model client.
///
/// A sentence is valid when it contains the target word.
pub struct StubValidator {
    mode: Mode,
    calls: AtomicUsize,
}

impl StubValidator {
    pub fn new(mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> habla_api::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.mode == Mode::Failing {
            return Err(HablaError::model(ModelErrorKind::Network, "model unreachable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ValidationService for StubValidator {
    async fn validate_sentence(
        &self,
        target_word: &str,
        user_sentence: &str,
    ) -> habla_api::Result<SentenceFeedback> {
        self.check()?;
        if !user_sentence.to_lowercase().contains(&target_word.to_lowercase()) {
            return Ok(SentenceFeedback::new(
                false,
                format!("The sentence does not use \"{target_word}\"."),
            ));
        }

        let feedback = SentenceFeedback::new(true, "ok");
        Ok(match self.mode {
            Mode::FollowUp => feedback.with_follow_up(format!("¿De qué color es el {target_word}?")),
            Mode::Plain | Mode::Failing => feedback,
        })
    }

    async fn validate_answer(
        &self,
        _question: &str,
        answer: &str,
    ) -> habla_api::Result<AnswerFeedback> {
        self.check()?;
        Ok(AnswerFeedback::new(
            answer.starts_with("Es "),
            "Correct color.",
        ))
    }
}

#[async_trait]
impl ContextGenerator for StubValidator {
    async fn generate_context(&self, english: &str, spanish: &str) -> habla_api::Result<String> {
        self.check()?;
        Ok(format!("Tengo un {spanish}. (I have a {english}.)"))
    }
}
