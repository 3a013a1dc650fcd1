//! Engine-side modules - playback state, dispatch, options, logging
//!
//! Everything under here runs on (or marshals work onto) the engine
//! thread; the client-facing surface lives at the crate root.

pub mod command;
pub mod dispatch;
pub mod engine;
pub mod log;
pub mod options;
pub mod ring;

// Re-exports for convenience
pub use command::Command;
pub use dispatch::DispatchQueue;
pub use log::{LogHub, LogLevel};
pub use options::OptionStore;
pub use ring::EventRing;
