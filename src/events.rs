// Event model for the client API.
//
// Every notification a client can observe is an Event record: a kind,
// an optional reply correlation id, an error code (for Error events)
// and a payload variant owned by the record. Clients receive events
// from their private ring via `Client::wait_event`.

use serde::Serialize;

/// Number of distinct event kinds. Kind ids are `0..EVENT_KIND_COUNT`.
pub const EVENT_KIND_COUNT: u32 = 16;

/// Kinds of events delivered to clients.
///
/// The discriminants are part of the wire contract shared with
/// language bindings; they must never be renumbered. Serialized
/// kinds use the same names as [`EventKind::name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u32)]
pub enum EventKind {
    /// Returned by `wait_event` on timeout or spurious wakeup. Never
    /// queued in the ring.
    None = 0,
    /// Successful completion of an asynchronous request.
    Ok = 1,
    /// Failed completion of an asynchronous request; the event's
    /// `error` field carries the code.
    Error = 2,
    /// The engine is shutting down; the client should destroy itself.
    Shutdown = 3,
    /// A log message from the client's log tap.
    LogMessage = 4,
    /// One playback loop iteration passed. High-frequency; disabled in
    /// the default event mask.
    Tick = 5,
    /// Reply to an asynchronous property read.
    Property = 6,
    /// A new file is about to be played.
    StartFile = 7,
    /// Playback of the current file ended.
    EndFile = 8,
    /// Playback of the current file actually started.
    PlaybackStart = 9,
    /// The set of tracks changed.
    TracksChanged = 10,
    /// A different track was selected.
    TrackSwitched = 11,
    /// The engine entered idle mode (no file playing).
    Idle = 12,
    /// Playback was paused.
    Pause = 13,
    /// Playback was unpaused.
    Unpause = 14,
    /// A scripting client was asked to dispatch an input binding.
    ScriptInputDispatch = 15,
}

impl EventKind {
    /// Map a raw kind id back to a kind. Returns `None` for ids this
    /// version does not know.
    pub fn from_id(id: u32) -> Option<EventKind> {
        Some(match id {
            0 => EventKind::None,
            1 => EventKind::Ok,
            2 => EventKind::Error,
            3 => EventKind::Shutdown,
            4 => EventKind::LogMessage,
            5 => EventKind::Tick,
            6 => EventKind::Property,
            7 => EventKind::StartFile,
            8 => EventKind::EndFile,
            9 => EventKind::PlaybackStart,
            10 => EventKind::TracksChanged,
            11 => EventKind::TrackSwitched,
            12 => EventKind::Idle,
            13 => EventKind::Pause,
            14 => EventKind::Unpause,
            15 => EventKind::ScriptInputDispatch,
            _ => return None,
        })
    }

    /// Raw kind id.
    #[inline]
    pub fn id(self) -> u32 {
        self as u32
    }

    /// Bit of this kind in an event mask.
    #[inline]
    pub fn mask_bit(self) -> u64 {
        1u64 << (self as u32)
    }

    /// Stable name of this kind.
    pub fn name(self) -> &'static str {
        match self {
            EventKind::None => "none",
            EventKind::Ok => "ok",
            EventKind::Error => "error",
            EventKind::Shutdown => "shutdown",
            EventKind::LogMessage => "log-message",
            EventKind::Tick => "tick",
            EventKind::Property => "property",
            EventKind::StartFile => "start-file",
            EventKind::EndFile => "end-file",
            EventKind::PlaybackStart => "playback-start",
            EventKind::TracksChanged => "tracks-changed",
            EventKind::TrackSwitched => "track-switched",
            EventKind::Idle => "idle",
            EventKind::Pause => "pause",
            EventKind::Unpause => "unpause",
            EventKind::ScriptInputDispatch => "script-input-dispatch",
        }
    }
}

/// Stable name for a raw event kind id, `None` if unknown.
pub fn event_name(id: u32) -> Option<&'static str> {
    EventKind::from_id(id).map(EventKind::name)
}

/// Default per-client event mask: everything enabled except Tick,
/// which is high-frequency and opt-in.
pub fn default_event_mask() -> u64 {
    !0u64 & !EventKind::Tick.mask_bit()
}

/// Data formats for property values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Format {
    /// The raw value formatted as a plain string.
    String,
    /// The value formatted for display (e.g. times as `hh:mm:ss`).
    OsdString,
}

/// Payload of a [`EventKind::LogMessage`] event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogMessage {
    /// The log scope the message came from (usually a client name or
    /// an engine subsystem).
    pub prefix: String,
    /// Level name, one of the names accepted by
    /// `request_log_messages`.
    pub level: &'static str,
    /// The message text, without a trailing newline.
    pub text: String,
}

/// Payload of a [`EventKind::Property`] event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyEvent {
    /// Name of the property this reply is for.
    pub name: String,
    /// Format the value was requested in.
    pub format: Format,
    /// The value. `None` when the read failed (the event's `error`
    /// field then says why).
    pub data: Option<String>,
}

/// Payload of a [`EventKind::ScriptInputDispatch`] event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptInputDispatch {
    /// Opaque argument from the binding definition.
    pub arg0: i32,
    /// Type of the binding ("keyup_follows" or "press").
    pub kind: String,
}

/// Event payload, determined by the event kind.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventData {
    /// No payload.
    #[default]
    None,
    LogMessage(LogMessage),
    Property(PropertyEvent),
    ScriptInputDispatch(ScriptInputDispatch),
}

/// One event record as delivered to a client.
///
/// The record owns its payload; dropping the event drops the payload.
/// Events serialize to JSON for embedders that mirror the stream into
/// logs or status endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Kind of the event.
    pub kind: EventKind,
    /// For replies to asynchronous requests, the reply id returned at
    /// submission. `0` for unsolicited events.
    pub reply_id: u64,
    /// Error code, nonzero only for [`EventKind::Error`] events.
    pub error: i32,
    /// Payload, owned by this record.
    pub data: EventData,
}

impl Event {
    /// Unsolicited event of the given kind with a payload.
    pub fn new(kind: EventKind, data: EventData) -> Event {
        Event { kind, reply_id: 0, error: 0, data }
    }

    /// Plain event with no payload.
    pub fn bare(kind: EventKind) -> Event {
        Event::new(kind, EventData::None)
    }
}

impl Default for Event {
    fn default() -> Event {
        Event::bare(EventKind::None)
    }
}
