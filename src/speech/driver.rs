//! Sequential speech playback over an injectable synthesizer
//!
//! The platform synthesizer is callback-based and global; everything here
//! talks to it through the [`Synthesizer`] trait so playback is testable
//! without one. Cancellation is cooperative: every playback run holds a
//! generation token, and any continuation that observes a newer generation
//! becomes a no-op.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use super::chunker::{speech_text, split_into_chunks};

/// Keep-alive period; long-running sessions get a pause/resume nudge so the
/// platform does not auto-suspend them.
const KEEPALIVE_PERIOD: Duration = Duration::from_secs(5);

/// Delay before retrying a chunk whose utterance was interrupted.
const RETRY_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    /// The platform cut the utterance off; the same chunk is worth one retry.
    #[error("utterance interrupted")]
    Interrupted,

    #[error("synthesis failed: {0}")]
    Failed(String),
}

/// Minimal surface of a platform speech synthesizer.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Speak one utterance to completion (resolves when the utterance ends).
    async fn speak(&self, text: &str, language: &str) -> Result<(), SynthesisError>;

    /// Drop any in-flight and pending utterances immediately.
    fn cancel(&self);

    fn pause(&self);

    fn resume(&self);
}

/// Drives chunked, strictly sequential playback of one message at a time.
pub struct PlaybackDriver {
    synth: Arc<dyn Synthesizer>,
    language: String,
    chunk_size: usize,
    generation: Arc<AtomicU64>,
    /// Transcript index of the message currently playing, -1 when idle.
    playing: Arc<AtomicI64>,
    hidden: AtomicBool,
}

impl PlaybackDriver {
    pub fn new(synth: Arc<dyn Synthesizer>, language: &str, chunk_size: usize) -> Self {
        Self {
            synth,
            language: language.to_string(),
            chunk_size,
            generation: Arc::new(AtomicU64::new(0)),
            playing: Arc::new(AtomicI64::new(-1)),
            hidden: AtomicBool::new(false),
        }
    }

    /// Begin playback of a message's display text. Any current playback is
    /// stopped first.
    pub fn play(&self, index: usize, display_text: &str) -> JoinHandle<()> {
        self.stop();

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.playing.store(index as i64, Ordering::SeqCst);

        let chunks = split_into_chunks(&speech_text(display_text), self.chunk_size);
        tracing::debug!(index, chunks = chunks.len(), "starting playback");

        let synth = Arc::clone(&self.synth);
        let language = self.language.clone();
        let generations = Arc::clone(&self.generation);
        let playing = Arc::clone(&self.playing);

        tokio::spawn(async move {
            run_playback(&*synth, &language, chunks, &generations, generation).await;
            // Only the run that is still current clears the playing marker.
            if generations.load(Ordering::SeqCst) == generation {
                playing.store(-1, Ordering::SeqCst);
            }
        })
    }

    /// Cancel playback immediately; stale continuations become no-ops.
    pub fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.playing.store(-1, Ordering::SeqCst);
        self.synth.cancel();
    }

    /// Transcript index of the currently playing message, if any.
    pub fn current(&self) -> Option<usize> {
        match self.playing.load(Ordering::SeqCst) {
            index if index >= 0 => Some(index as usize),
            _ => None,
        }
    }

    /// Mirror of the UI visibility state: hidden pauses, visible resumes.
    pub fn set_hidden(&self, hidden: bool) {
        let was = self.hidden.swap(hidden, Ordering::SeqCst);
        if was == hidden || self.current().is_none() {
            return;
        }
        if hidden {
            self.synth.pause();
        } else {
            self.synth.resume();
        }
    }
}

async fn run_playback(
    synth: &dyn Synthesizer,
    language: &str,
    chunks: Vec<String>,
    generations: &AtomicU64,
    generation: u64,
) {
    for chunk in &chunks {
        if generations.load(Ordering::SeqCst) != generation {
            return;
        }

        match speak_with_keepalive(synth, chunk, language).await {
            Ok(()) => {}
            Err(SynthesisError::Interrupted) => {
                tokio::time::sleep(RETRY_DELAY).await;
                if generations.load(Ordering::SeqCst) != generation {
                    return;
                }
                // Clear whatever the platform left queued, then retry the
                // same chunk once; give up on it after that.
                synth.cancel();
                if let Err(err) = speak_with_keepalive(synth, chunk, language).await {
                    tracing::warn!(error = %err, "retry failed, skipping chunk");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "skipping chunk");
            }
        }
    }
}

/// Speak one chunk while nudging the synthesizer with a periodic
/// pause/resume cycle so long utterance queues are not auto-suspended.
async fn speak_with_keepalive(
    synth: &dyn Synthesizer,
    chunk: &str,
    language: &str,
) -> Result<(), SynthesisError> {
    let start = tokio::time::Instant::now();
    let mut keepalive = tokio::time::interval_at(start + KEEPALIVE_PERIOD, KEEPALIVE_PERIOD);

    let speak = synth.speak(chunk, language);
    tokio::pin!(speak);

    loop {
        tokio::select! {
            result = &mut speak => return result,
            _ = keepalive.tick() => {
                synth.pause();
                synth.resume();
            }
        }
    }
}
