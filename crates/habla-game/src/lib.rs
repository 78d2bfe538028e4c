//! Habla sentence game
//!
//! The per-word sentence challenge: state machine, speech adapters, the
//! controller binding them together, and a client for the Habla server.
//!
//! The `whisper` feature adds a microphone recognizer built on `cpal` and
//! `whisper-rs`.

pub mod client;
pub mod controller;
pub mod error;
pub mod listen;
pub mod session;
pub mod speech;
#[cfg(feature = "whisper")]
pub mod whisper;

pub use client::ApiClient;
pub use controller::SentenceGameController;
pub use error::{GameError, Result, SpeechError};
pub use listen::{
    resample_to_16k, to_mono, AudioChunk, AudioSource, Segment, StreamingCapture, Transcriber,
    UtteranceTracker, SAMPLE_RATE,
};
pub use session::{
    verdict, Effect, GameEvent, GameSession, Phase, RecognitionEvent, ValidationRequest,
    ANSWER_CHECK_FAILED, SENTENCE_CHECK_FAILED,
};
pub use speech::{
    parse_voices, select_voice, CommandSynthesizer, SilentOutput, SpeechCapture, SpeechOutput,
    UnavailableCapture, Voice,
};
#[cfg(feature = "whisper")]
pub use whisper::{MicrophoneSource, WhisperTranscriber};
