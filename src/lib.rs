//! KINO - Embeddable media player engine
//!
//! One long-running playback engine per context, driven concurrently
//! by any number of client threads over an in-process message
//! interface. Create a [`Client`], set options, [`initialize`]
//! the engine, then send commands and consume events:
//!
//! ```no_run
//! use kino::{Client, EventKind};
//!
//! let mut client = Client::create().unwrap();
//! client.initialize().unwrap();
//! client.command(&["loadfile", "test.mkv"]).unwrap();
//!
//! loop {
//!     let event = client.wait_event(10.0);
//!     println!("event: {}", event.kind.name());
//!     if event.kind == EventKind::Shutdown {
//!         break;
//!     }
//! }
//! ```
//!
//! [`initialize`]: Client::initialize

// Engine internals (dispatch, playback state, options, log hub)
pub mod core;

// Client-facing surface
pub mod client;
pub mod error;
pub mod events;
mod registry;

// Re-export the public surface
pub use client::{Client, MAX_EVENTS};
pub use error::{client_api_version, error_string, Error, CLIENT_API_VERSION};
pub use events::{
    event_name, Event, EventData, EventKind, Format, LogMessage, PropertyEvent,
    ScriptInputDispatch, EVENT_KIND_COUNT,
};
