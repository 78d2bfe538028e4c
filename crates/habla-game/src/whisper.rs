//! Microphone capture via `cpal` and transcription via `whisper-rs`.
//!
//! Enabled with the `whisper` feature. Build a recognizer with
//! `StreamingCapture::new(MicrophoneSource, WhisperTranscriber::load(path)?, events)`.

use std::path::Path;
use std::sync::mpsc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::error::SpeechError;
use crate::listen::{AudioChunk, AudioSource, Transcriber, SAMPLE_RATE};

/// Whisper warns on inputs under one second, so shorter audio is padded.
const MIN_SAMPLES: usize = SAMPLE_RATE as usize;

/// The default input device of the default audio host.
#[derive(Debug, Clone, Copy, Default)]
pub struct MicrophoneSource;

impl AudioSource for MicrophoneSource {
    type Stream = cpal::Stream;

    fn open(&self, chunks: mpsc::Sender<AudioChunk>) -> Result<cpal::Stream, String> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| "no input device found".to_string())?;
        let supported = device
            .default_input_config()
            .map_err(|e| format!("failed to query default input config: {e}"))?;

        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let sample_rate = config.sample_rate.0;
        let channels = config.channels;
        let on_error = |err: cpal::StreamError| error!(error = %err, "Audio stream error");

        // send errors mean the recognizer is gone; the stream is about to drop
        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let _ = chunks.send(AudioChunk {
                        samples: data.to_vec(),
                        sample_rate,
                        channels,
                    });
                },
                on_error,
                None,
            ),
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let _ = chunks.send(AudioChunk {
                        samples: data
                            .iter()
                            .map(|&s| f32::from(s) / f32::from(i16::MAX))
                            .collect(),
                        sample_rate,
                        channels,
                    });
                },
                on_error,
                None,
            ),
            other => return Err(format!("unsupported sample format {other:?}")),
        }
        .map_err(|e| format!("failed to build input stream: {e}"))?;

        stream
            .play()
            .map_err(|e| format!("failed to start audio stream: {e}"))?;
        info!(sample_rate, channels, "Microphone open");
        Ok(stream)
    }
}

/// Transcriber backed by a GGML Whisper model.
pub struct WhisperTranscriber {
    ctx: WhisperContext,
    threads: i32,
}

impl std::fmt::Debug for WhisperTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperTranscriber")
            .field("threads", &self.threads)
            .finish_non_exhaustive()
    }
}

impl WhisperTranscriber {
    /// Loads the model at `model_path`.
    ///
    /// # Errors
    ///
    /// Returns `SpeechError::Recognition` if the file is missing or cannot
    /// be loaded.
    pub fn load(model_path: impl AsRef<Path>) -> Result<Self, SpeechError> {
        let path = model_path.as_ref();
        if !path.exists() {
            return Err(SpeechError::Recognition(format!(
                "model not found: {}",
                path.display()
            )));
        }
        let path_str = path.to_str().ok_or_else(|| {
            SpeechError::Recognition(format!(
                "model path is not valid UTF-8: {}",
                path.display()
            ))
        })?;

        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| SpeechError::Recognition(format!("failed to load model: {e}")))?;

        let threads = std::thread::available_parallelism()
            .map_or(4, |n| n.get().min(8));
        info!(model = %path.display(), threads, "Whisper model loaded");

        Ok(Self {
            ctx,
            threads: i32::try_from(threads).unwrap_or(4),
        })
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, audio: &[f32], language: &str) -> Result<String, String> {
        let mut samples = audio.to_vec();
        if samples.len() < MIN_SAMPLES {
            samples.resize(MIN_SAMPLES, 0.0);
        }

        // Whisper takes the primary subtag: "es" for "es-ES"
        let primary = language.split('-').next().filter(|p| !p.is_empty());

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(primary);
        params.set_n_threads(self.threads);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_special(false);
        params.set_print_timestamps(false);

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| format!("failed to create whisper state: {e}"))?;
        state
            .full(params, &samples)
            .map_err(|e| format!("transcription failed: {e}"))?;

        let segments = state
            .full_n_segments()
            .map_err(|e| format!("transcription failed: {e}"))?;
        let mut text = String::new();
        for i in 0..segments {
            let segment = state
                .full_get_segment_text(i)
                .map_err(|e| format!("segment {i}: {e}"))?;
            text.push_str(&segment);
        }
        Ok(text.trim().to_string())
    }
}
