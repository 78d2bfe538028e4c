//! Drives a [`GameSession`] against real collaborators.
//!
//! The controller feeds learner actions and recognizer output into the
//! session and carries out the effects it returns: starting and stopping
//! speech capture, speaking follow-up questions, and awaiting validation
//! calls whose outcome is fed back as the next event.

use std::sync::Arc;

use habla_api::{ValidationService, VocabularyList};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::session::{Effect, GameEvent, GameSession, RecognitionEvent, ValidationRequest};
use crate::speech::{SpeechCapture, SpeechOutput};

/// The sentence game bound to a validation service and speech adapters.
pub struct SentenceGameController {
    session: GameSession,
    validator: Arc<dyn ValidationService>,
    capture: Box<dyn SpeechCapture>,
    output: Arc<dyn SpeechOutput>,
    language: String,
    warnings: Vec<String>,
}

impl std::fmt::Debug for SentenceGameController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentenceGameController")
            .field("session", &self.session)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

impl SentenceGameController {
    /// Opens a game on `list`.
    ///
    /// # Errors
    ///
    /// Returns `GameError::EmptyList` if the list has no words.
    pub fn new(
        list: Arc<VocabularyList>,
        validator: Arc<dyn ValidationService>,
        capture: Box<dyn SpeechCapture>,
        output: Arc<dyn SpeechOutput>,
        language: impl Into<String>,
    ) -> Result<Self> {
        let session = GameSession::new(list)?;
        info!(
            list = %session.list().id,
            words = session.list().len(),
            "Sentence game opened"
        );

        Ok(Self {
            session,
            validator,
            capture,
            output,
            language: language.into(),
            warnings: Vec::new(),
        })
    }

    /// The current game state.
    #[must_use]
    pub const fn session(&self) -> &GameSession {
        &self.session
    }

    /// Warnings raised since the last call, oldest first.
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    /// Replaces the transcript with typed text.
    pub fn edit_transcript(&mut self, text: impl Into<String>) -> Result<()> {
        self.dispatch(GameEvent::EditTranscript(text.into()))
    }

    /// Turns the microphone on, or off if it is on.
    pub fn toggle_capture(&mut self) -> Result<()> {
        if self.session.is_listening() {
            self.dispatch(GameEvent::StopCapture)
        } else {
            self.dispatch(GameEvent::StartCapture)
        }
    }

    /// Feeds recognizer output into the game.
    pub fn recognition(&mut self, event: RecognitionEvent) -> Result<()> {
        self.dispatch(GameEvent::Recognition(event))
    }

    /// Moves on to the next word.
    pub fn next_word(&mut self) -> Result<()> {
        self.dispatch(GameEvent::NextWord)
    }

    /// Submits the transcript and waits for its validation.
    ///
    /// A failed validation call is not an error here; the session records
    /// failure feedback and lands in the result phase.
    ///
    /// # Errors
    ///
    /// Returns `GameError::InvalidTransition` if nothing can be submitted
    /// in the current phase.
    pub async fn submit(&mut self) -> Result<()> {
        let effects = self.session.handle(GameEvent::Submit)?;
        let mut pending = self.run_local(effects);

        while let Some(request) = pending.pop() {
            let event = self.validate(request).await;
            let effects = self.session.handle(event)?;
            pending.extend(self.run_local(effects));
        }
        Ok(())
    }

    fn dispatch(&mut self, event: GameEvent) -> Result<()> {
        let effects = self.session.handle(event)?;
        // only Submit yields validation requests
        let _ = self.run_local(effects);
        Ok(())
    }

    /// Carries out local effects and returns the validation requests.
    fn run_local(&mut self, effects: Vec<Effect>) -> Vec<ValidationRequest> {
        let mut queue = std::collections::VecDeque::from(effects);
        let mut requests = Vec::new();

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::StartCapture => {
                    if self.capture.is_active() {
                        debug!("Recognizer already running");
                        continue;
                    }
                    if let Err(e) = self.capture.start(&self.language) {
                        // CaptureFailed is accepted in every phase
                        if let Ok(more) = self.session.handle(GameEvent::CaptureFailed(e.to_string())) {
                            queue.extend(more);
                        }
                    }
                }
                Effect::StopCapture => self.capture.stop(),
                Effect::Speak(text) => self.output.speak(&text, &self.language),
                Effect::Warn(message) => {
                    warn!(warning = %message, "Game warning");
                    self.warnings.push(message);
                }
                Effect::Validate(request) => requests.push(request),
            }
        }
        requests
    }

    async fn validate(&self, request: ValidationRequest) -> GameEvent {
        match request {
            ValidationRequest::Sentence {
                challenge,
                target_word,
                sentence,
            } => match self.validator.validate_sentence(&target_word, &sentence).await {
                Ok(feedback) => {
                    info!(challenge, valid = feedback.valid, "Sentence checked");
                    GameEvent::SentenceChecked {
                        challenge,
                        feedback,
                    }
                }
                Err(e) => {
                    warn!(challenge, error = %e, "Sentence check failed");
                    GameEvent::SentenceCheckFailed { challenge }
                }
            },
            ValidationRequest::Answer {
                challenge,
                question,
                answer,
            } => match self.validator.validate_answer(&question, &answer).await {
                Ok(feedback) => {
                    info!(challenge, valid = feedback.valid, "Answer checked");
                    GameEvent::AnswerChecked {
                        challenge,
                        feedback,
                    }
                }
                Err(e) => {
                    warn!(challenge, error = %e, "Answer check failed");
                    GameEvent::AnswerCheckFailed { challenge }
                }
            },
        }
    }
}
