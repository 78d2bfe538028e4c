//! Integration tests for the sentence game played against a real server.
//!
//! The game talks to the server only through `ApiClient`, exactly as the
//! `habla play` command does.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{spawn_with, Mode, StubValidator};
use habla_api::ContextGenerator;
use habla_game::{
    verdict, ApiClient, GameError, Phase, SentenceGameController, SilentOutput,
    UnavailableCapture,
};

fn client(base: &str) -> Arc<ApiClient> {
    Arc::new(ApiClient::new(base, Duration::from_secs(5)).expect("Failed to build client"))
}

async fn open_game(client: &Arc<ApiClient>, id: &str) -> SentenceGameController {
    let list = client.get_language(id).await.expect("Failed to fetch list");
    SentenceGameController::new(
        Arc::new(list),
        client.clone(),
        Box::new(UnavailableCapture),
        Arc::new(SilentOutput),
        "es-ES",
    )
    .expect("Failed to open game")
}

#[tokio::test]
async fn test_client_lists_and_fetches() {
    let (base, _handle) = spawn_with(StubValidator::new(Mode::Plain)).await;
    let client = client(&base);

    let summaries = client.list_languages().await.expect("Failed to list");
    let ids: Vec<_> = summaries.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, ["1", "food", "verbs"]);

    let food = client.get_language("food").await.expect("Failed to fetch");
    assert_eq!(food.name, "Food");
    assert_eq!(food.words()[0].target_text(), "manzana");

    let err = client.get_language("verbs").await.unwrap_err();
    assert!(matches!(err, GameError::ListNotFound { id } if id == "verbs"));
}

/// "perro" is accepted without a question, then the game moves to "gato".
#[tokio::test]
async fn test_scenario_without_follow_up() {
    let (base, _handle) = spawn_with(StubValidator::new(Mode::Plain)).await;
    let mut game = open_game(&client(&base), "1").await;

    assert_eq!(game.session().phase(), Phase::Playing);
    assert_eq!(game.session().prompt(), "perro");

    game.edit_transcript("El perro corre.").unwrap();
    game.submit().await.unwrap();

    assert_eq!(game.session().phase(), Phase::Result);
    let feedback = game.session().sentence_feedback().unwrap();
    assert_eq!(verdict(feedback.valid), "Correct!");

    game.next_word().unwrap();
    assert_eq!(game.session().index(), 1);
    assert_eq!(game.session().phase(), Phase::Playing);
    assert_eq!(game.session().prompt(), "gato");
    assert_eq!(game.session().transcript(), "");
}

/// "perro" is accepted with a question, which is then answered.
#[tokio::test]
async fn test_scenario_with_follow_up() {
    let (base, _handle) = spawn_with(StubValidator::new(Mode::FollowUp)).await;
    let mut game = open_game(&client(&base), "1").await;

    game.edit_transcript("El perro corre.").unwrap();
    game.submit().await.unwrap();

    assert_eq!(game.session().phase(), Phase::AnsweringFollowup);
    assert_eq!(game.session().transcript(), "");
    assert_eq!(game.session().prompt(), "¿De qué color es el perro?");

    game.edit_transcript("Es marrón.").unwrap();
    game.submit().await.unwrap();

    assert_eq!(game.session().phase(), Phase::Result);
    assert_eq!(game.session().sentence_feedback().unwrap().reason, "ok");
    let answer = game.session().answer_feedback().unwrap();
    assert!(answer.valid);
    assert_eq!(answer.feedback, "Correct color.");
}

#[tokio::test]
async fn test_invalid_sentence_skips_question() {
    let (base, _handle) = spawn_with(StubValidator::new(Mode::FollowUp)).await;
    let mut game = open_game(&client(&base), "1").await;

    game.edit_transcript("El gato corre.").unwrap();
    game.submit().await.unwrap();

    assert_eq!(game.session().phase(), Phase::Result);
    assert!(!game.session().sentence_feedback().unwrap().valid);
    assert!(game.session().answer_feedback().is_none());
}

#[tokio::test]
async fn test_server_failure_becomes_error_feedback() {
    let (base, _handle) = spawn_with(StubValidator::new(Mode::Failing)).await;
    let mut game = open_game(&client(&base), "food").await;

    game.edit_transcript("Como una manzana.").unwrap();
    game.submit().await.unwrap();

    let feedback = game.session().sentence_feedback().unwrap();
    assert!(!feedback.valid);
    assert_eq!(feedback.reason, "Error validating.");
    assert_eq!(game.session().phase(), Phase::Result);
}

#[tokio::test]
async fn test_empty_sentence_is_rejected_by_server() {
    let validator = StubValidator::new(Mode::Plain);
    let (base, _handle) = spawn_with(validator.clone()).await;
    let mut game = open_game(&client(&base), "food").await;

    game.submit().await.unwrap();

    assert_eq!(
        game.session().sentence_feedback().unwrap().reason,
        "Error validating."
    );
    assert_eq!(validator.calls(), 0);
}

#[tokio::test]
async fn test_wraps_around_the_list() {
    let (base, _handle) = spawn_with(StubValidator::new(Mode::Plain)).await;
    let mut game = open_game(&client(&base), "food").await;

    for word in ["manzana", "pan", "manzana"] {
        assert_eq!(game.session().prompt(), word);
        game.edit_transcript(format!("Quiero {word}.")).unwrap();
        game.submit().await.unwrap();
        game.next_word().unwrap();
    }
    assert_eq!(game.session().index(), 1);
}

#[tokio::test]
async fn test_context_through_client() {
    let (base, _handle) = spawn_with(StubValidator::new(Mode::Plain)).await;
    let client = client(&base);

    let context = client
        .generate_context("apple", "manzana")
        .await
        .expect("Failed to generate context");
    assert_eq!(context, "Tengo un manzana. (I have a apple.)");
}
