//! Speech playback: text chunking and the sequential playback driver

pub mod chunker;
pub mod driver;

pub use chunker::{speech_text, split_into_chunks};
pub use driver::{PlaybackDriver, SynthesisError, Synthesizer};
