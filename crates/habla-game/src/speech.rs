//! Speech capability adapters.
//!
//! Recognition and synthesis depend on what the platform offers, so the
//! game only talks to them through [`SpeechCapture`] and [`SpeechOutput`].
//! Each has a "not available" implementation that lets the game run with
//! typed input and no audio.

use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use crate::error::SpeechError;

// ============================================================================
// Capture
// ============================================================================

/// Continuous speech-to-text with interim results.
///
/// Recognized text reaches the game as
/// [`RecognitionEvent`](crate::session::RecognitionEvent)s fed to the
/// controller by whoever owns the recognizer.
pub trait SpeechCapture: Send {
    /// Starts recognizing speech in `language` (a tag such as `es-ES`).
    ///
    /// # Errors
    ///
    /// Returns `SpeechError::Unsupported` if no recognizer is available.
    fn start(&mut self, language: &str) -> Result<(), SpeechError>;

    /// Stops recognizing. Does nothing if not started.
    fn stop(&mut self);

    /// Whether the recognizer is running.
    fn is_active(&self) -> bool;
}

/// Capture for platforms without a recognizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableCapture;

impl SpeechCapture for UnavailableCapture {
    fn start(&mut self, language: &str) -> Result<(), SpeechError> {
        debug!(language, "Speech capture requested but unavailable");
        Err(SpeechError::Unsupported)
    }

    fn stop(&mut self) {}

    fn is_active(&self) -> bool {
        false
    }
}

// ============================================================================
// Output
// ============================================================================

/// Best-effort text-to-speech.
pub trait SpeechOutput: Send + Sync {
    /// Reads `text` aloud in `language`. Never blocks on playback and never
    /// fails; problems are logged.
    fn speak(&self, text: &str, language: &str);
}

/// Output that says nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentOutput;

impl SpeechOutput for SilentOutput {
    fn speak(&self, text: &str, language: &str) {
        debug!(language, text_len = text.len(), "Speech output disabled");
    }
}

/// A voice offered by the synthesizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    /// Language tag, e.g. `es` or `es-419`.
    pub language: String,
    /// Display name.
    pub name: String,
}

/// Parses the voice table printed by `espeak-ng --voices`.
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  es              --/M      Spanish_(Spain)    roa/es
/// ```
#[must_use]
pub fn parse_voices(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .filter(|line| !line.trim_start().starts_with("Pty"))
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let _priority = columns.next()?;
            let language = columns.next()?;
            let _age_gender = columns.next()?;
            let name = columns.next()?;
            Some(Voice {
                language: language.to_string(),
                name: name.to_string(),
            })
        })
        .collect()
}

/// Picks the voice for `language`.
///
/// Prefers a voice whose tag starts with the full requested tag, then one
/// sharing the primary subtag. `None` means the default voice.
#[must_use]
pub fn select_voice<'a>(voices: &'a [Voice], language: &str) -> Option<&'a Voice> {
    let wanted = language.to_ascii_lowercase();
    let primary = wanted.split('-').next().unwrap_or_default();

    let by_full_tag = voices
        .iter()
        .find(|v| v.language.to_ascii_lowercase().starts_with(&wanted));
    by_full_tag.or_else(|| {
        voices.iter().find(|v| {
            let tag = v.language.to_ascii_lowercase();
            tag == primary || tag.starts_with(&format!("{primary}-"))
        })
    })
}

/// Speaks through a command-line synthesizer such as `espeak-ng`.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    program: String,
    voices: Vec<Voice>,
    available: bool,
}

impl CommandSynthesizer {
    /// Runs `program --voices` to find the installed voices.
    ///
    /// If the program cannot run, the synthesizer is marked unavailable and
    /// every `speak` call becomes a logged no-op.
    #[must_use]
    pub fn discover(program: impl Into<String>) -> Self {
        let program = program.into();
        match Command::new(&program).arg("--voices").output() {
            Ok(output) if output.status.success() => {
                let voices = parse_voices(&String::from_utf8_lossy(&output.stdout));
                info!(program = %program, voices = voices.len(), "Speech synthesizer ready");
                Self::with_voices(program, voices)
            }
            Ok(output) => {
                warn!(program = %program, status = %output.status, "Speech synthesizer failed to list voices");
                Self::with_voices(program, Vec::new())
            }
            Err(e) => {
                warn!(program = %program, error = %e, "Speech synthesizer not available");
                Self {
                    program,
                    voices: Vec::new(),
                    available: false,
                }
            }
        }
    }

    /// Creates a synthesizer with a known voice list.
    #[must_use]
    pub fn with_voices(program: impl Into<String>, voices: Vec<Voice>) -> Self {
        Self {
            program: program.into(),
            voices,
            available: true,
        }
    }

    /// Whether the program could be run.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.available
    }

    /// Arguments passed to the program to speak `text` in `language`.
    ///
    /// The text always follows `--` so it is never read as an option.
    #[must_use]
    pub fn command_args(&self, text: &str, language: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(4);
        if let Some(voice) = select_voice(&self.voices, language) {
            args.push("-v".to_string());
            args.push(voice.language.clone());
        }
        args.push("--".to_string());
        args.push(text.to_string());
        args
    }
}

impl SpeechOutput for CommandSynthesizer {
    fn speak(&self, text: &str, language: &str) {
        if !self.available || text.trim().is_empty() {
            debug!(program = %self.program, "Skipping speech output");
            return;
        }

        let spawned = Command::new(&self.program)
            .args(self.command_args(text, language))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(mut child) => {
                // reap in the background; playback is never awaited
                std::thread::spawn(move || child.wait());
            }
            Err(e) => warn!(program = %self.program, error = %e, "Failed to start speech synthesizer"),
        }
    }
}
