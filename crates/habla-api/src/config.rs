//! Configuration types for Habla.
//!
//! Configuration is read from `habla.json`. Every field has a default, so
//! a missing file or an empty object yields a usable configuration. The
//! model API key is never stored here; it comes from the environment.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HablaError, Result};

/// The default config file name.
pub const CONFIG_FILE_NAME: &str = "habla.json";

/// Environment variable holding the model API key.
pub const API_KEY_ENV: &str = "GOOGLE_GENERATIVE_AI_API_KEY";

fn default_vocabulary_dir() -> String {
    "data".to_string()
}

fn default_validation_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_context_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_model_api_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

const fn default_request_timeout() -> u32 {
    30
}

fn default_server_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_speech_language() -> String {
    "es-ES".to_string()
}

fn default_synthesizer() -> String {
    "espeak-ng".to_string()
}

const fn default_true() -> bool {
    true
}

/// Main configuration for the Habla server and terminal game.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Directory holding the vocabulary definition files.
    #[serde(default = "default_vocabulary_dir")]
    pub vocabulary_dir: String,

    /// Model used to validate sentences and follow-up answers.
    #[serde(default = "default_validation_model")]
    pub validation_model: String,

    /// Model used to generate example sentences.
    #[serde(default = "default_context_model")]
    pub context_model: String,

    /// Base URL of the generative language API.
    #[serde(default = "default_model_api_url")]
    pub model_api_url: String,

    /// Timeout for a single model request in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u32,

    /// Base URL of a running Habla server, used by the terminal game.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Speech input/output settings for the game.
    #[serde(default)]
    pub speech: SpeechConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vocabulary_dir: default_vocabulary_dir(),
            validation_model: default_validation_model(),
            context_model: default_context_model(),
            model_api_url: default_model_api_url(),
            request_timeout_secs: default_request_timeout(),
            server_url: default_server_url(),
            speech: SpeechConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `habla.json`; returns the default configuration if absent.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            HablaError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `habla.json` inside a specific directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `HablaError::ConfigParseError` if the file cannot be read or
    /// is not valid JSON, and `HablaError::ConfigValidationError` if a value
    /// is out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(HablaError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| HablaError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `HablaError::ConfigValidationError` if any check fails.
    pub fn validate(&self) -> Result<()> {
        if self.vocabulary_dir.trim().is_empty() {
            return Err(HablaError::config_validation(
                "vocabularyDir must not be empty",
                "Point vocabularyDir at the directory holding your vocabulary .yaml files",
            ));
        }

        if self.validation_model.trim().is_empty() || self.context_model.trim().is_empty() {
            return Err(HablaError::config_validation(
                "validationModel and contextModel must not be empty",
                "Use a model name such as \"gemini-2.5-flash\" in your habla.json",
            ));
        }

        if !self.model_api_url.starts_with("http://") && !self.model_api_url.starts_with("https://")
        {
            return Err(HablaError::config_validation(
                format!("modelApiUrl '{}' is not an http(s) URL", self.model_api_url),
                "Set modelApiUrl to https://generativelanguage.googleapis.com/v1beta",
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(HablaError::config_validation(
                "requestTimeoutSecs must be greater than 0",
                "Set requestTimeoutSecs to at least 1 second in your habla.json",
            ));
        }

        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            return Err(HablaError::config_validation(
                format!("serverUrl '{}' is not an http(s) URL", self.server_url),
                "Set serverUrl to the address `habla serve` listens on, e.g. http://127.0.0.1:3000",
            ));
        }

        if !is_language_tag(&self.speech.language) {
            return Err(HablaError::config_validation(
                format!("speech.language '{}' is not a language tag", self.speech.language),
                "Use a BCP 47 tag such as \"es-ES\" for speech.language",
            ));
        }

        Ok(())
    }
}

/// Speech settings for the sentence game.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    /// Spoken language tag used for recognition and synthesis.
    #[serde(default = "default_speech_language")]
    pub language: String,

    /// Command-line synthesizer used to speak follow-up questions.
    #[serde(default = "default_synthesizer")]
    pub synthesizer: String,

    /// Whether speech output is attempted at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Path to a GGML Whisper model used for speech recognition.
    ///
    /// Without it the game only accepts typed sentences.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recognition_model: Option<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            language: default_speech_language(),
            synthesizer: default_synthesizer(),
            enabled: default_true(),
            recognition_model: None,
        }
    }
}

/// Loose BCP 47 check: alphabetic primary subtag, alphanumeric subtags.
fn is_language_tag(tag: &str) -> bool {
    let mut parts = tag.split('-');
    let primary_ok = parts
        .next()
        .is_some_and(|p| (2..=3).contains(&p.len()) && p.chars().all(|c| c.is_ascii_alphabetic()));
    primary_ok && parts.all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_alphanumeric()))
}
