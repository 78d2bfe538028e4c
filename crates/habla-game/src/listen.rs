//! Streaming speech recognition.
//!
//! [`StreamingCapture`] implements [`SpeechCapture`] on top of an
//! [`AudioSource`] and a [`Transcriber`]. A worker thread reads audio,
//! converts it to 16 kHz mono and cuts it into utterances at pauses. The
//! utterance in progress is transcribed again about once a second and sent
//! as [`RecognitionEvent::Interim`]; a finished utterance is sent as
//! [`RecognitionEvent::Final`]. Events go out over a tokio channel so the
//! game loop can `select!` on them next to keyboard input.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::error::SpeechError;
use crate::session::RecognitionEvent;
use crate::speech::SpeechCapture;

/// Sample rate expected by transcribers.
pub const SAMPLE_RATE: u32 = 16_000;

/// RMS level above which a chunk counts as speech.
const SPEECH_THRESHOLD: f32 = 0.01;

/// Silence that ends an utterance (0.8 s).
const END_OF_UTTERANCE: usize = 12_800;

/// New audio between two interim transcriptions (1 s).
const INTERIM_STEP: usize = 16_000;

/// Longest utterance before it is cut (25 s).
const MAX_UTTERANCE: usize = 400_000;

/// How often the worker checks for a stop request while no audio arrives.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// Audio
// ============================================================================

/// One buffer of interleaved `f32` samples in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Interleaved samples.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
}

/// Something that streams audio, such as a microphone.
pub trait AudioSource: Send + Sync + 'static {
    /// Handle that keeps the stream running until dropped.
    ///
    /// It is created and dropped on the recognizer thread, so it need not
    /// be `Send`.
    type Stream;

    /// Starts streaming chunks into `chunks`.
    ///
    /// Dropping the sender ends the stream.
    ///
    /// # Errors
    ///
    /// Returns a message if the device cannot be opened.
    fn open(&self, chunks: mpsc::Sender<AudioChunk>) -> Result<Self::Stream, String>;
}

/// Speech-to-text over 16 kHz mono audio.
pub trait Transcriber: Send + Sync + 'static {
    /// Returns the text spoken in `audio`, in `language` (a tag such as `es-ES`).
    ///
    /// # Errors
    ///
    /// Returns a message if transcription fails.
    fn transcribe(&self, audio: &[f32], language: &str) -> Result<String, String>;
}

/// Averages interleaved channels down to mono.
#[must_use]
pub fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = usize::from(n);
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / f32::from(channels))
                .collect()
        }
    }
}

/// Resamples mono audio to 16 kHz with linear interpolation.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn resample_to_16k(samples: &[f32], source_rate: u32) -> Vec<f32> {
    if source_rate == SAMPLE_RATE || source_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(source_rate) / f64::from(SAMPLE_RATE);
    let out_len = ((samples.len() as f64) / ratio).floor() as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let position = i as f64 * ratio;
            let index = position.floor() as usize;
            let frac = (position - index as f64) as f32;
            let a = samples[index.min(last)];
            let b = samples[(index + 1).min(last)];
            a + (b - a) * frac
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

// ============================================================================
// Utterances
// ============================================================================

/// What the tracker wants transcribed after a chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Nothing yet.
    Pending,
    /// The utterance so far, for an interim result.
    Interim(Vec<f32>),
    /// A finished utterance.
    Final(Vec<f32>),
}

/// Splits a 16 kHz stream into utterances separated by silence.
///
/// Silence before the first loud chunk is discarded. Interim snapshots are
/// only taken while the learner is speaking.
#[derive(Debug, Default)]
pub struct UtteranceTracker {
    buffer: Vec<f32>,
    heard_speech: bool,
    trailing_silence: usize,
    last_interim: usize,
}

impl UtteranceTracker {
    /// Adds a chunk and says what, if anything, should be transcribed.
    pub fn push(&mut self, chunk: &AudioChunk) -> Segment {
        let mono = resample_to_16k(&to_mono(&chunk.samples, chunk.channels), chunk.sample_rate);
        if mono.is_empty() {
            return Segment::Pending;
        }

        let loud = rms(&mono) >= SPEECH_THRESHOLD;
        if !self.heard_speech {
            if !loud {
                return Segment::Pending;
            }
            self.heard_speech = true;
        }

        self.buffer.extend_from_slice(&mono);
        if loud {
            self.trailing_silence = 0;
        } else {
            self.trailing_silence += mono.len();
        }

        if self.trailing_silence >= END_OF_UTTERANCE || self.buffer.len() >= MAX_UTTERANCE {
            return Segment::Final(self.take());
        }
        if loud && self.buffer.len() - self.last_interim >= INTERIM_STEP {
            self.last_interim = self.buffer.len();
            return Segment::Interim(self.buffer.clone());
        }
        Segment::Pending
    }

    /// Hands out the unfinished utterance when the stream ends.
    pub fn finish(&mut self) -> Option<Vec<f32>> {
        if self.heard_speech {
            Some(self.take())
        } else {
            None
        }
    }

    fn take(&mut self) -> Vec<f32> {
        self.heard_speech = false;
        self.trailing_silence = 0;
        self.last_interim = 0;
        std::mem::take(&mut self.buffer)
    }
}

// ============================================================================
// StreamingCapture
// ============================================================================

struct Running {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Continuous recognizer that reports to a channel.
pub struct StreamingCapture<S: AudioSource, T: Transcriber> {
    source: Arc<S>,
    transcriber: Arc<T>,
    events: UnboundedSender<RecognitionEvent>,
    running: Option<Running>,
}

impl<S: AudioSource, T: Transcriber> std::fmt::Debug for StreamingCapture<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingCapture")
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl<S: AudioSource, T: Transcriber> StreamingCapture<S, T> {
    /// Creates a stopped recognizer that will send its events to `events`.
    pub fn new(source: S, transcriber: T, events: UnboundedSender<RecognitionEvent>) -> Self {
        Self {
            source: Arc::new(source),
            transcriber: Arc::new(transcriber),
            events,
            running: None,
        }
    }
}

impl<S: AudioSource, T: Transcriber> SpeechCapture for StreamingCapture<S, T> {
    fn start(&mut self, language: &str) -> Result<(), SpeechError> {
        if self.is_active() {
            return Ok(());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let worker = Worker {
            source: Arc::clone(&self.source),
            transcriber: Arc::clone(&self.transcriber),
            events: self.events.clone(),
            stop: Arc::clone(&stop),
            language: language.to_string(),
        };

        let thread = std::thread::Builder::new()
            .name("habla-recognizer".to_string())
            .spawn(move || worker.run())
            .map_err(|e| SpeechError::Recognition(format!("cannot start recognizer: {e}")))?;

        info!(language, "Speech recognition started");
        self.running = Some(Running { stop, thread });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            // the worker notices within one poll interval and exits silently
            running.stop.store(true, Ordering::SeqCst);
            debug!("Speech recognition stopped");
        }
    }

    fn is_active(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.thread.is_finished())
    }
}

impl<S: AudioSource, T: Transcriber> Drop for StreamingCapture<S, T> {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker<S, T> {
    source: Arc<S>,
    transcriber: Arc<T>,
    events: UnboundedSender<RecognitionEvent>,
    stop: Arc<AtomicBool>,
    language: String,
}

impl<S: AudioSource, T: Transcriber> Worker<S, T> {
    fn run(self) {
        let (tx, rx) = mpsc::channel();
        let _stream = match self.source.open(tx) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Cannot open audio source");
                self.emit(RecognitionEvent::Error(e));
                return;
            }
        };

        let mut tracker = UtteranceTracker::default();
        let mut settled = String::new();

        while !self.stopped() {
            let segment = match rx.recv_timeout(POLL_INTERVAL) {
                Ok(chunk) => tracker.push(&chunk),
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    if let Some(audio) = tracker.finish() {
                        if !self.settle(&audio, &mut settled) {
                            return;
                        }
                    }
                    self.emit(RecognitionEvent::Ended);
                    return;
                }
            };

            let ok = match segment {
                Segment::Pending => true,
                Segment::Interim(audio) => match self.transcribe(&audio) {
                    Some(text) if !text.is_empty() => {
                        self.emit(RecognitionEvent::Interim(join(&settled, &text)));
                        true
                    }
                    Some(_) => true,
                    None => false,
                },
                Segment::Final(audio) => self.settle(&audio, &mut settled),
            };
            if !ok {
                return;
            }
        }
    }

    /// Transcribes a finished utterance and appends it to `settled`.
    fn settle(&self, audio: &[f32], settled: &mut String) -> bool {
        match self.transcribe(audio) {
            Some(text) => {
                if !text.is_empty() {
                    *settled = join(settled, &text);
                    self.emit(RecognitionEvent::Final(settled.clone()));
                }
                true
            }
            None => false,
        }
    }

    /// `None` after reporting a transcription error.
    fn transcribe(&self, audio: &[f32]) -> Option<String> {
        match self.transcriber.transcribe(audio, &self.language) {
            Ok(text) => Some(text.trim().to_string()),
            Err(e) => {
                warn!(error = %e, samples = audio.len(), "Transcription failed");
                self.emit(RecognitionEvent::Error(e));
                None
            }
        }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn emit(&self, event: RecognitionEvent) {
        if self.stopped() {
            return;
        }
        if self.events.send(event).is_err() {
            debug!("Recognition events receiver dropped");
            self.stop.store(true, Ordering::SeqCst);
        }
    }
}

fn join(settled: &str, text: &str) -> String {
    if settled.is_empty() {
        text.to_string()
    } else {
        format!("{settled} {text}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use tokio::sync::mpsc::unbounded_channel;

    use super::*;

    const HALF_SECOND: usize = 8_000;

    fn loud() -> AudioChunk {
        AudioChunk {
            samples: vec![0.2; HALF_SECOND],
            sample_rate: SAMPLE_RATE,
            channels: 1,
        }
    }

    fn quiet() -> AudioChunk {
        AudioChunk {
            samples: vec![0.0; HALF_SECOND],
            sample_rate: SAMPLE_RATE,
            channels: 1,
        }
    }

    /// Plays a fixed recording, then ends the stream.
    struct Recording(Vec<AudioChunk>);

    impl AudioSource for Recording {
        type Stream = ();

        fn open(&self, chunks: mpsc::Sender<AudioChunk>) -> Result<(), String> {
            for chunk in &self.0 {
                chunks.send(chunk.clone()).unwrap();
            }
            Ok(())
        }
    }

    /// A microphone that cannot be opened.
    struct NoDevice;

    impl AudioSource for NoDevice {
        type Stream = ();

        fn open(&self, _chunks: mpsc::Sender<AudioChunk>) -> Result<(), String> {
            Err("no input device found".to_string())
        }
    }

    /// A microphone that keeps streaming until stopped.
    struct OpenMicrophone;

    impl AudioSource for OpenMicrophone {
        type Stream = mpsc::Sender<AudioChunk>;

        fn open(&self, chunks: mpsc::Sender<AudioChunk>) -> Result<Self::Stream, String> {
            Ok(chunks)
        }
    }

    /// Replies in order and records what it was asked.
    #[derive(Default)]
    struct ScriptedTranscriber {
        replies: Mutex<VecDeque<Result<String, String>>>,
        requests: Arc<Mutex<Vec<(usize, String)>>>,
    }

    impl ScriptedTranscriber {
        fn new(replies: &[Result<&str, &str>]) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                requests: Arc::default(),
            }
        }
    }

    impl Transcriber for ScriptedTranscriber {
        fn transcribe(&self, audio: &[f32], language: &str) -> Result<String, String> {
            self.requests
                .lock()
                .unwrap()
                .push((audio.len(), language.to_string()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    async fn events_until_end(
        rx: &mut tokio::sync::mpsc::UnboundedReceiver<RecognitionEvent>,
    ) -> Vec<RecognitionEvent> {
        let mut events = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            let done = matches!(event, RecognitionEvent::Ended | RecognitionEvent::Error(_));
            events.push(event);
            if done {
                return events;
            }
        }
    }

    #[test]
    fn test_to_mono_averages_channels() {
        let mono = to_mono(&[0.5, -0.5, 0.2, 0.4], 2);
        assert_eq!(mono.len(), 2);
        assert!(mono[0].abs() < 1e-6);
        assert!((mono[1] - 0.3).abs() < 1e-6);
        assert_eq!(to_mono(&[0.1, 0.2], 1), vec![0.1, 0.2]);
        assert!(to_mono(&[0.1, 0.2], 0).is_empty());
    }

    #[test]
    fn test_resample_to_16k() {
        let same = vec![0.1; 160];
        assert_eq!(resample_to_16k(&same, SAMPLE_RATE), same);

        let high = vec![0.5; 480];
        let low = resample_to_16k(&high, 48_000);
        assert_eq!(low.len(), 160);
        assert!(low.iter().all(|s| (s - 0.5).abs() < 1e-6));

        assert!(resample_to_16k(&[], 44_100).is_empty());
    }

    #[test]
    fn test_tracker_skips_leading_silence() {
        let mut tracker = UtteranceTracker::default();

        for _ in 0..10 {
            assert_eq!(tracker.push(&quiet()), Segment::Pending);
        }
        assert!(tracker.finish().is_none());
    }

    #[test]
    fn test_tracker_interim_then_final_at_pause() {
        let mut tracker = UtteranceTracker::default();

        assert_eq!(tracker.push(&loud()), Segment::Pending);
        assert!(matches!(tracker.push(&loud()), Segment::Interim(a) if a.len() == 16_000));
        assert_eq!(tracker.push(&loud()), Segment::Pending);
        assert_eq!(tracker.push(&quiet()), Segment::Pending);
        assert!(matches!(tracker.push(&quiet()), Segment::Final(a) if a.len() == 40_000));

        // a new utterance starts from scratch
        assert_eq!(tracker.push(&quiet()), Segment::Pending);
        assert!(tracker.finish().is_none());
    }

    #[test]
    fn test_tracker_resamples_stereo_input() {
        let mut tracker = UtteranceTracker::default();
        let chunk = AudioChunk {
            samples: vec![0.2; 96_000],
            sample_rate: 48_000,
            channels: 2,
        };

        assert!(matches!(tracker.push(&chunk), Segment::Interim(a) if a.len() == 16_000));
    }

    #[test]
    fn test_tracker_flushes_unfinished_speech() {
        let mut tracker = UtteranceTracker::default();
        tracker.push(&loud());

        assert_eq!(tracker.finish().map(|a| a.len()), Some(HALF_SECOND));
        assert!(tracker.finish().is_none());
    }

    #[tokio::test]
    async fn test_streams_interim_and_final_results() {
        let recording = Recording(vec![loud(), loud(), loud(), quiet(), quiet()]);
        let transcriber = ScriptedTranscriber::new(&[Ok("El perro"), Ok(" El perro corre. ")]);
        let requests = Arc::clone(&transcriber.requests);
        let (tx, mut rx) = unbounded_channel();
        let mut capture = StreamingCapture::new(recording, transcriber, tx);

        capture.start("es-ES").unwrap();
        let events = events_until_end(&mut rx).await;

        assert_eq!(
            events,
            vec![
                RecognitionEvent::Interim("El perro".to_string()),
                RecognitionEvent::Final("El perro corre.".to_string()),
                RecognitionEvent::Ended,
            ]
        );
        assert_eq!(
            requests.lock().unwrap().as_slice(),
            [(16_000, "es-ES".to_string()), (40_000, "es-ES".to_string())]
        );
    }

    #[tokio::test]
    async fn test_utterances_accumulate_and_tail_is_flushed() {
        let recording = Recording(vec![loud(), quiet(), quiet(), loud()]);
        let transcriber = ScriptedTranscriber::new(&[Ok("Tengo un perro."), Ok("Es marrón.")]);
        let (tx, mut rx) = unbounded_channel();
        let mut capture = StreamingCapture::new(recording, transcriber, tx);

        capture.start("es-ES").unwrap();
        let events = events_until_end(&mut rx).await;

        assert_eq!(
            events,
            vec![
                RecognitionEvent::Final("Tengo un perro.".to_string()),
                RecognitionEvent::Final("Tengo un perro. Es marrón.".to_string()),
                RecognitionEvent::Ended,
            ]
        );
    }

    #[tokio::test]
    async fn test_device_failure_is_reported_as_event() {
        let (tx, mut rx) = unbounded_channel();
        let mut capture = StreamingCapture::new(NoDevice, ScriptedTranscriber::default(), tx);

        capture.start("es-ES").unwrap();

        assert_eq!(
            events_until_end(&mut rx).await,
            vec![RecognitionEvent::Error("no input device found".to_string())]
        );
    }

    #[tokio::test]
    async fn test_transcription_failure_is_reported_as_event() {
        let recording = Recording(vec![loud(), loud()]);
        let transcriber = ScriptedTranscriber::new(&[Err("model crashed")]);
        let (tx, mut rx) = unbounded_channel();
        let mut capture = StreamingCapture::new(recording, transcriber, tx);

        capture.start("es-ES").unwrap();

        assert_eq!(
            events_until_end(&mut rx).await,
            vec![RecognitionEvent::Error("model crashed".to_string())]
        );
    }

    #[tokio::test]
    async fn test_stop_silences_the_worker() {
        let (tx, mut rx) = unbounded_channel();
        let mut capture =
            StreamingCapture::new(OpenMicrophone, ScriptedTranscriber::default(), tx);

        capture.start("es-ES").unwrap();
        assert!(capture.is_active());
        capture.start("es-ES").unwrap();

        capture.stop();
        assert!(!capture.is_active());

        let next = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(next.is_err(), "No events after stop");
    }
}
