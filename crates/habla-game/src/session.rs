//! Sentence game state machine.
//!
//! A [`GameSession`] walks through the words of one vocabulary list. For
//! each word the learner writes (or speaks) a sentence using it, the
//! sentence is validated remotely, and a valid sentence may be followed by
//! a comprehension question.
//!
//! The session never performs I/O. [`GameSession::handle`] applies a
//! [`GameEvent`] and returns the [`Effect`]s the caller must carry out,
//! which keeps every transition directly testable.
//!
//! ```text
//! playing ──submit──▶ validating ──invalid / no question / failure──▶ result
//!                         │                                              ▲
//!                         └──valid + question──▶ answering_followup      │
//!                                                    │                   │
//!                                                  submit                │
//!                                                    ▼                   │
//!                                              validating_answer ────────┘
//! result ──next word──▶ playing
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use habla_api::{AnswerFeedback, SentenceFeedback, VocabularyList, WordPair};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GameError, Result};

/// Rationale stored when a sentence could not be validated.
pub const SENTENCE_CHECK_FAILED: &str = "Error validating.";

/// Feedback stored when an answer could not be validated.
pub const ANSWER_CHECK_FAILED: &str = "Error validating answer.";

// ============================================================================
// Phase
// ============================================================================

/// The phase of the current challenge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for the learner's sentence.
    #[default]
    Playing,
    /// The sentence is being validated.
    Validating,
    /// Waiting for the answer to a follow-up question.
    AnsweringFollowup,
    /// The answer is being validated.
    ValidatingAnswer,
    /// Feedback is shown; only "next word" is allowed.
    Result,
}

impl Phase {
    /// Returns `true` if the learner may edit the transcript or use the microphone.
    #[must_use]
    pub const fn accepts_input(&self) -> bool {
        matches!(self, Self::Playing | Self::AnsweringFollowup)
    }

    /// Returns `true` while a validation call is in flight.
    #[must_use]
    pub const fn is_validating(&self) -> bool {
        matches!(self, Self::Validating | Self::ValidatingAnswer)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Playing => write!(f, "playing"),
            Self::Validating => write!(f, "validating"),
            Self::AnsweringFollowup => write!(f, "answering_followup"),
            Self::ValidatingAnswer => write!(f, "validating_answer"),
            Self::Result => write!(f, "result"),
        }
    }
}

// ============================================================================
// Events and effects
// ============================================================================

/// Output of a speech recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Provisional text; overwrites the visible transcript.
    Interim(String),
    /// Settled text; replaces the transcript.
    Final(String),
    /// The recognizer failed.
    Error(String),
    /// The recognizer stopped on its own.
    Ended,
}

/// Something that happened to the game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// The learner typed a new transcript.
    EditTranscript(String),
    /// The learner turned the microphone on.
    StartCapture,
    /// The learner turned the microphone off.
    StopCapture,
    /// The capture adapter could not start.
    CaptureFailed(String),
    /// The recognizer produced output.
    Recognition(RecognitionEvent),
    /// The learner submitted the transcript.
    Submit,
    /// The sentence validation call returned.
    SentenceChecked {
        /// Challenge the call was issued for.
        challenge: u64,
        /// The judgment.
        feedback: SentenceFeedback,
    },
    /// The sentence validation call failed.
    SentenceCheckFailed {
        /// Challenge the call was issued for.
        challenge: u64,
    },
    /// The answer validation call returned.
    AnswerChecked {
        /// Challenge the call was issued for.
        challenge: u64,
        /// The judgment.
        feedback: AnswerFeedback,
    },
    /// The answer validation call failed.
    AnswerCheckFailed {
        /// Challenge the call was issued for.
        challenge: u64,
    },
    /// The learner moved on to the next word.
    NextWord,
}

impl std::fmt::Display for GameEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::EditTranscript(_) => "edit the transcript",
            Self::StartCapture => "start listening",
            Self::StopCapture => "stop listening",
            Self::CaptureFailed(_) => "report a capture failure",
            Self::Recognition(_) => "receive recognized speech",
            Self::Submit => "submit",
            Self::SentenceChecked { .. } | Self::SentenceCheckFailed { .. } => {
                "receive a sentence check"
            }
            Self::AnswerChecked { .. } | Self::AnswerCheckFailed { .. } => {
                "receive an answer check"
            }
            Self::NextWord => "move to the next word",
        };
        f.write_str(name)
    }
}

/// A remote validation call to issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationRequest {
    /// Judge a sentence using the target word.
    Sentence {
        /// Challenge the call belongs to.
        challenge: u64,
        /// Spanish text of the current word.
        target_word: String,
        /// The learner's sentence.
        sentence: String,
    },
    /// Judge an answer to the follow-up question.
    Answer {
        /// Challenge the call belongs to.
        challenge: u64,
        /// The follow-up question.
        question: String,
        /// The learner's answer.
        answer: String,
    },
}

/// Work the session asks its driver to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Start the speech recognizer.
    StartCapture,
    /// Stop the speech recognizer.
    StopCapture,
    /// Issue a validation call and feed the outcome back.
    Validate(ValidationRequest),
    /// Read text aloud.
    Speak(String),
    /// Show a non-fatal warning.
    Warn(String),
}

// ============================================================================
// GameSession
// ============================================================================

/// One learner playing through one vocabulary list.
#[derive(Debug, Clone)]
pub struct GameSession {
    list: Arc<VocabularyList>,
    index: usize,
    transcript: String,
    phase: Phase,
    sentence_feedback: Option<SentenceFeedback>,
    answer_feedback: Option<AnswerFeedback>,
    listening: bool,
    challenge: u64,
    started_at: DateTime<Utc>,
}

impl GameSession {
    /// Opens a game on the first word of `list`.
    ///
    /// # Errors
    ///
    /// Returns `GameError::EmptyList` if the list has no words.
    pub fn new(list: Arc<VocabularyList>) -> Result<Self> {
        if list.is_empty() {
            return Err(GameError::EmptyList {
                id: list.id.clone(),
            });
        }

        Ok(Self {
            list,
            index: 0,
            transcript: String::new(),
            phase: Phase::Playing,
            sentence_feedback: None,
            answer_feedback: None,
            listening: false,
            challenge: 0,
            started_at: Utc::now(),
        })
    }

    /// The list being played.
    #[must_use]
    pub fn list(&self) -> &VocabularyList {
        &self.list
    }

    /// Index of the current word.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// The current word.
    #[must_use]
    pub fn current_word(&self) -> &WordPair {
        // index < len holds from construction and wrap-around
        &self.list.words()[self.index]
    }

    /// Spanish text the sentence must use.
    #[must_use]
    pub fn target_word(&self) -> &str {
        self.current_word().target_text()
    }

    /// The current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// The current transcript.
    #[must_use]
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Latest sentence judgment.
    #[must_use]
    pub const fn sentence_feedback(&self) -> Option<&SentenceFeedback> {
        self.sentence_feedback.as_ref()
    }

    /// Latest answer judgment.
    #[must_use]
    pub const fn answer_feedback(&self) -> Option<&AnswerFeedback> {
        self.answer_feedback.as_ref()
    }

    /// The follow-up question of the current challenge, if any.
    #[must_use]
    pub fn follow_up_question(&self) -> Option<&str> {
        self.sentence_feedback
            .as_ref()
            .filter(|f| f.valid)
            .and_then(SentenceFeedback::follow_up)
    }

    /// Whether the speech recognizer is running.
    #[must_use]
    pub const fn is_listening(&self) -> bool {
        self.listening
    }

    /// Number of the current challenge.
    #[must_use]
    pub const fn challenge(&self) -> u64 {
        self.challenge
    }

    /// When the game was opened.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Text shown as the challenge prompt.
    ///
    /// The target word, or the follow-up question once the learner is
    /// answering it or has answered it.
    #[must_use]
    pub fn prompt(&self) -> &str {
        let on_question = match self.phase {
            Phase::AnsweringFollowup | Phase::ValidatingAnswer => true,
            Phase::Result => self.answer_feedback.is_some(),
            Phase::Playing | Phase::Validating => false,
        };

        if on_question {
            if let Some(question) = self.follow_up_question() {
                return question;
            }
        }
        self.target_word()
    }

    fn reject(&self, event: &GameEvent) -> GameError {
        GameError::invalid_transition(self.phase, event)
    }

    /// Returns `true` if a result for `challenge` is still awaited in `phase`.
    fn awaits(&self, challenge: u64, phase: Phase) -> bool {
        let current = challenge == self.challenge && self.phase == phase;
        if !current {
            debug!(
                challenge,
                current_challenge = self.challenge,
                phase = %self.phase,
                "Ignoring stale validation result"
            );
        }
        current
    }

    /// Applies `event` and returns the effects to carry out, in order.
    ///
    /// Validation results for an earlier challenge, or that arrive in a
    /// phase not waiting for them, are ignored.
    ///
    /// # Errors
    ///
    /// Returns `GameError::InvalidTransition` if the learner triggers
    /// something the current phase does not allow. The session is left
    /// unchanged.
    pub fn handle(&mut self, event: GameEvent) -> Result<Vec<Effect>> {
        let effects = match event {
            GameEvent::EditTranscript(text) => {
                if !self.phase.accepts_input() {
                    return Err(self.reject(&GameEvent::EditTranscript(text)));
                }
                self.transcript = text;
                Vec::new()
            }

            GameEvent::StartCapture => {
                if !self.phase.accepts_input() {
                    return Err(self.reject(&GameEvent::StartCapture));
                }
                if self.listening {
                    return Ok(Vec::new());
                }
                self.listening = true;
                self.transcript.clear();
                vec![Effect::StartCapture]
            }

            GameEvent::StopCapture => self.stop_capture(),

            GameEvent::CaptureFailed(message) => {
                self.listening = false;
                vec![Effect::Warn(message)]
            }

            GameEvent::Recognition(recognition) => self.recognize(recognition),

            GameEvent::Submit => self.submit()?,

            GameEvent::SentenceChecked {
                challenge,
                feedback,
            } => {
                if !self.awaits(challenge, Phase::Validating) {
                    return Ok(Vec::new());
                }
                self.apply_sentence_feedback(feedback.normalized())
            }

            GameEvent::SentenceCheckFailed { challenge } => {
                if !self.awaits(challenge, Phase::Validating) {
                    return Ok(Vec::new());
                }
                self.apply_sentence_feedback(SentenceFeedback::new(false, SENTENCE_CHECK_FAILED))
            }

            GameEvent::AnswerChecked {
                challenge,
                feedback,
            } => {
                if !self.awaits(challenge, Phase::ValidatingAnswer) {
                    return Ok(Vec::new());
                }
                self.answer_feedback = Some(feedback);
                self.phase = Phase::Result;
                Vec::new()
            }

            GameEvent::AnswerCheckFailed { challenge } => {
                if !self.awaits(challenge, Phase::ValidatingAnswer) {
                    return Ok(Vec::new());
                }
                self.answer_feedback = Some(AnswerFeedback::new(false, ANSWER_CHECK_FAILED));
                self.phase = Phase::Result;
                Vec::new()
            }

            GameEvent::NextWord => {
                if self.phase != Phase::Result {
                    return Err(self.reject(&GameEvent::NextWord));
                }
                self.index = (self.index + 1) % self.list.len();
                self.challenge += 1;
                self.transcript.clear();
                self.sentence_feedback = None;
                self.answer_feedback = None;
                self.phase = Phase::Playing;
                self.stop_capture()
            }
        };

        Ok(effects)
    }

    fn stop_capture(&mut self) -> Vec<Effect> {
        if self.listening {
            self.listening = false;
            vec![Effect::StopCapture]
        } else {
            Vec::new()
        }
    }

    fn recognize(&mut self, event: RecognitionEvent) -> Vec<Effect> {
        if !self.listening || !self.phase.accepts_input() {
            debug!(phase = %self.phase, "Dropping recognition event");
            return Vec::new();
        }

        match event {
            RecognitionEvent::Interim(text) | RecognitionEvent::Final(text) => {
                self.transcript = text;
                Vec::new()
            }
            RecognitionEvent::Error(message) => {
                let mut effects = self.stop_capture();
                effects.push(Effect::Warn(format!("Speech recognition error: {message}")));
                effects
            }
            RecognitionEvent::Ended => {
                self.listening = false;
                Vec::new()
            }
        }
    }

    fn submit(&mut self) -> Result<Vec<Effect>> {
        let request = match self.phase {
            Phase::Playing => ValidationRequest::Sentence {
                challenge: self.challenge,
                target_word: self.target_word().to_string(),
                sentence: self.transcript.clone(),
            },
            Phase::AnsweringFollowup => ValidationRequest::Answer {
                challenge: self.challenge,
                question: self.follow_up_question().unwrap_or_default().to_string(),
                answer: self.transcript.clone(),
            },
            Phase::Validating | Phase::ValidatingAnswer | Phase::Result => {
                return Err(self.reject(&GameEvent::Submit));
            }
        };

        let mut effects = self.stop_capture();
        self.phase = match request {
            ValidationRequest::Sentence { .. } => Phase::Validating,
            ValidationRequest::Answer { .. } => Phase::ValidatingAnswer,
        };
        effects.push(Effect::Validate(request));
        Ok(effects)
    }

    fn apply_sentence_feedback(&mut self, feedback: SentenceFeedback) -> Vec<Effect> {
        let question = feedback
            .follow_up()
            .filter(|_| feedback.valid)
            .map(ToString::to_string);
        self.sentence_feedback = Some(feedback);

        match question {
            Some(question) => {
                self.transcript.clear();
                self.phase = Phase::AnsweringFollowup;
                vec![Effect::Speak(question)]
            }
            None => {
                self.phase = Phase::Result;
                Vec::new()
            }
        }
    }
}

/// Headline shown for a judgment.
#[must_use]
pub const fn verdict(valid: bool) -> &'static str {
    if valid {
        "Correct!"
    } else {
        "Incorrect"
    }
}
