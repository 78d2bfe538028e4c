//! Integration tests for the HTTP API over a real listening server.
//!
//! The server serves the fixture vocabulary directory and validates with a
//! deterministic stub in place of the model client.

mod common;

use std::path::PathBuf;

use common::{fixture_path, fixture_store, spawn_with, Mode, StubValidator};
use habla_api::{Config, ListSummary};
use serde_json::{json, Value};

async fn get_json(url: &str) -> (u16, Value) {
    let response = reqwest::get(url).await.expect("Request failed");
    let status = response.status().as_u16();
    (status, response.json().await.expect("Invalid JSON"))
}

async fn post_json(url: &str, body: &Value) -> (u16, Value) {
    let response = reqwest::Client::new()
        .post(url)
        .json(body)
        .send()
        .await
        .expect("Request failed");
    let status = response.status().as_u16();
    (status, response.json().await.expect("Invalid JSON"))
}

// ============================================================================
// Vocabulary loading
// ============================================================================

/// Tests that the fixture directory loads, skipping the broken file.
#[test]
fn test_fixture_vocabulary_loads() {
    let store = fixture_store();

    let files: Vec<_> = store.summaries().iter().map(|s| s.file.as_str()).collect();
    assert_eq!(files, ["01-animals.yaml", "02-food.yaml", "03-verbs.yml"]);
    assert_eq!(store.len(), 2, "Only vocabulary lists are addressable");

    let animals = store.get("1").expect("Numeric id should load as a string");
    assert_eq!(animals.len(), 3);
    assert!(animals.words()[2].context.is_some());
    assert!(store.get("verbs").is_none());
}

/// Tests that the sample config loads successfully.
#[test]
fn test_sample_config_loads() {
    let config_path = fixture_path().join("habla.json");
    let config = Config::load_from_file(&config_path).expect("Failed to load config");

    assert_eq!(config.vocabulary_dir, "fixtures/vocabulary");
    assert_eq!(config.request_timeout_secs, 10);
    assert_eq!(config.speech.language, "es-MX");
    assert!(!config.speech.enabled);
    assert_eq!(config.speech.synthesizer, "espeak-ng");
    assert_eq!(config.context_model, "gemini-1.5-flash");
}

/// Tests that a missing vocabulary directory yields an empty store.
#[test]
fn test_missing_vocabulary_dir_is_empty() {
    let store = habla_api::VocabularyStore::load_dir_or_empty(PathBuf::from(
        "/nonexistent/habla/vocabulary",
    ));
    assert!(store.is_empty());
    assert!(store.summaries().is_empty());
}

// ============================================================================
// Language endpoints
// ============================================================================

/// Every listed vocabulary id resolves to a list with `numCards` words.
#[tokio::test]
async fn test_every_listed_id_matches_card_count() {
    let (base, _handle) = spawn_with(StubValidator::new(Mode::Plain)).await;

    let (status, body) = get_json(&format!("{base}/api/languages")).await;
    assert_eq!(status, 200);
    let summaries: Vec<ListSummary> =
        serde_json::from_value(body["data"].clone()).expect("Invalid summaries");
    assert_eq!(summaries.len(), 3);

    for summary in summaries.iter().filter(|s| s.kind == "vocabulary") {
        let (status, body) = get_json(&format!("{base}/api/languages/{}", summary.id)).await;
        assert_eq!(status, 200, "List {} should resolve", summary.id);
        assert_eq!(
            body["data"]["spec"]["data"].as_array().map(Vec::len),
            Some(summary.num_cards),
            "Card count mismatch for {}",
            summary.id
        );
    }
}

#[tokio::test]
async fn test_unknown_and_non_vocabulary_ids_are_not_found() {
    let (base, _handle) = spawn_with(StubValidator::new(Mode::Plain)).await;

    for id in ["missing", "verbs", "broken"] {
        let (status, body) = get_json(&format!("{base}/api/languages/{id}")).await;
        assert_eq!(status, 404, "{id} should not resolve");
        assert_eq!(body, json!({"message": "not found"}));
    }
}

// ============================================================================
// Validation endpoints
// ============================================================================

#[tokio::test]
async fn test_validate_sentence_round_trip() {
    let validator = StubValidator::new(Mode::FollowUp);
    let (base, _handle) = spawn_with(validator.clone()).await;

    let (status, body) = post_json(
        &format!("{base}/api/validate-sentence"),
        &json!({"targetWord": "perro", "userSentence": "El perro corre."}),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(
        body,
        json!({
            "valid": true,
            "reason": "ok",
            "followUpQuestion": "¿De qué color es el perro?"
        })
    );
    assert_eq!(validator.calls(), 1);
}

#[tokio::test]
async fn test_validate_sentence_bad_requests_skip_the_model() {
    let validator = StubValidator::new(Mode::Plain);
    let (base, _handle) = spawn_with(validator.clone()).await;
    let url = format!("{base}/api/validate-sentence");

    for body in [
        json!({}),
        json!({"targetWord": "perro"}),
        json!({"targetWord": "", "userSentence": "El perro corre."}),
    ] {
        let (status, reply) = post_json(&url, &body).await;
        assert_eq!(status, 400, "Body {body} should be rejected");
        assert_eq!(reply["message"], "Missing targetWord or userSentence");
    }

    let response = reqwest::Client::new()
        .post(&url)
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status().as_u16(), 400);

    assert_eq!(validator.calls(), 0);
}

#[tokio::test]
async fn test_validation_endpoints_reject_other_methods() {
    let (base, _handle) = spawn_with(StubValidator::new(Mode::Plain)).await;

    for path in ["validate-sentence", "validate-answer", "generate-context"] {
        let (status, body) = get_json(&format!("{base}/api/{path}")).await;
        assert_eq!(status, 405, "GET {path} should be rejected");
        assert_eq!(body, json!({"message": "Method not allowed"}));
    }
}

#[tokio::test]
async fn test_model_failure_returns_safe_defaults() {
    let (base, _handle) = spawn_with(StubValidator::new(Mode::Failing)).await;

    let (status, body) = post_json(
        &format!("{base}/api/validate-sentence"),
        &json!({"targetWord": "gato", "userSentence": "El gato duerme."}),
    )
    .await;
    assert_eq!(status, 500);
    assert_eq!(body["valid"], false);
    assert_eq!(body["reason"], "Failed to validate.");
    assert!(
        !body.to_string().contains("unreachable"),
        "Raw model errors must not leak"
    );

    let (status, body) = post_json(
        &format!("{base}/api/validate-answer"),
        &json!({"question": "¿Qué?", "answer": "Nada."}),
    )
    .await;
    assert_eq!(status, 500);
    assert_eq!(body["feedback"], "Failed to validate answer.");
}

#[tokio::test]
async fn test_validate_answer_and_context() {
    let (base, _handle) = spawn_with(StubValidator::new(Mode::Plain)).await;

    let (status, body) = post_json(
        &format!("{base}/api/validate-answer"),
        &json!({"question": "¿De qué color es el perro?", "answer": "Es marrón."}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"valid": true, "feedback": "Correct color."}));

    let (status, body) = post_json(
        &format!("{base}/api/generate-context"),
        &json!({"english": "bread", "spanish": "pan"}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"context": "Tengo un pan. (I have a bread.)"}));

    let (status, body) = post_json(
        &format!("{base}/api/generate-context"),
        &json!({"spanish": "pan"}),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["message"], "Missing english or spanish term");
}
