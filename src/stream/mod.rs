//! The streaming-chat core
//!
//! A chat request is answered with a server-sent-event stream. Bytes flow
//! through four stages, each usable and testable on its own:
//!
//! 1. [`decoder::FrameDecoder`]: buffers partial network chunks into
//!    complete `data: <json>` records,
//! 2. [`event`]: parses each record and classifies it into a closed set of
//!    event kinds,
//! 3. [`interact::InteractScanner`]: extracts the inline
//!    `<interact>` clarification sub-language out of token text,
//! 4. [`reconciler::Reconciler`]: merges everything into the single open
//!    bot message of the conversation.

pub mod decoder;
pub mod event;
pub mod interact;
pub mod reconciler;

pub use decoder::FrameDecoder;
pub use event::{parse_record, StreamEvent};
pub use interact::{clean_response, InteractScanner};
pub use reconciler::Reconciler;
