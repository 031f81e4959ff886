//! DigiYatra Assistant console
//!
//! A terminal console and streaming chat client for the hosted DigiYatra
//! Assistant API. The heart of the crate is the streaming pipeline in
//! [`stream`]: server-sent-event frames are decoded, classified, scrubbed of
//! the inline `<interact>` clarification sub-language, and reconciled into
//! the single in-progress bot message. Around it sit the HTTP [`client`],
//! the [`speech`] playback driver, and the [`console`] REPL.

pub mod client;
pub mod config;
pub mod console;
pub mod conversation;
pub mod speech;
pub mod stream;
