//! Engine core: playback state machine and its thread loop.
//!
//! One `EngineCore` exists per engine context. It is owned by the
//! playback thread; every mutation from outside arrives as a closure
//! through the dispatch queue, so playback state needs no lock of its
//! own. The shared, thread-safe pieces (dispatch queue, log hub,
//! client registry, option store) live in [`Shared`].
//!
//! Playback here is a timing model, not media I/O: a loaded file has
//! a path, tracks and a clock position advanced by wall time and the
//! speed multiplier. That is all the client API core needs from the
//! player side.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::core::command::{Command, LoadMode, SeekMode};
use crate::core::dispatch::DispatchQueue;
use crate::core::log::{LogHub, LogLevel};
use crate::core::options::OptionStore;
use crate::events::{EventData, EventKind, Format, ScriptInputDispatch};
use crate::registry::ClientRegistry;

/// Process timeout while a file is actively playing; this is also the
/// Tick cadence.
const ACTIVE_STEP: Duration = Duration::from_millis(10);
/// Process timeout while idle or paused.
const IDLE_STEP: Duration = Duration::from_millis(200);

/// Nominal frame duration used by `frame-step`.
const FRAME_TIME: f64 = 1.0 / 24.0;

/// State shared between all client threads and the engine thread.
pub(crate) struct Shared {
    pub dispatch: DispatchQueue<EngineCore>,
    pub log: LogHub,
    pub registry: ClientRegistry,
    pub options: Mutex<OptionStore>,
    /// Set once by `initialize`; guards every dispatch-based call.
    pub initialized: AtomicBool,
}

impl Shared {
    pub fn new() -> Arc<Shared> {
        Arc::new(Shared {
            dispatch: DispatchQueue::new(),
            log: LogHub::new(),
            registry: ClientRegistry::new(),
            options: Mutex::new(OptionStore::new()),
            initialized: AtomicBool::new(false),
        })
    }
}

/// Property access outcome, engine side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PropertyError {
    /// Generic failure (bad value, access failed).
    Error,
    /// The property exists but has no value right now.
    Unavailable,
    /// The property cannot be written.
    NotImplemented,
    /// No property with that name.
    Unknown,
}

/// The file currently being played.
#[derive(Debug)]
struct PlayingFile {
    path: String,
    /// Clock position in seconds, advanced by wall time * speed.
    position: f64,
    /// Total length; `None` until known (and for this model, never).
    duration: Option<f64>,
    /// Track kinds, in track order.
    tracks: Vec<&'static str>,
}

/// Playback state machine, owned by the engine thread.
pub struct EngineCore {
    pub(crate) shared: Arc<Shared>,
    quit: bool,
    playlist: Vec<String>,
    current: Option<PlayingFile>,
    pause: bool,
    /// Last pause state that was broadcast; used for edge detection.
    pause_broadcast: bool,
    /// Idle event was broadcast for the current idle phase.
    idle_active: bool,
    idle_opt: bool,
    volume: f64,
    speed: f64,
    start_opt: f64,
    title: String,
    last_step: Instant,
}

impl EngineCore {
    /// Build the core from the option store. Runs on the initializing
    /// client's thread, before the playback thread exists.
    pub(crate) fn new(shared: Arc<Shared>) -> EngineCore {
        let (idle_opt, pause, volume, speed, start_opt, title) = {
            let opts = shared.options.lock().unwrap();
            (
                opts.get_flag("idle"),
                opts.get_flag("pause"),
                opts.get_f64("volume").unwrap_or(100.0),
                opts.get_f64("speed").unwrap_or(1.0),
                opts.get_f64("start").unwrap_or(0.0),
                opts.get("title").unwrap_or("").to_string(),
            )
        };
        EngineCore {
            shared,
            quit: false,
            playlist: Vec::new(),
            current: None,
            pause,
            pause_broadcast: pause,
            idle_active: false,
            idle_opt,
            volume,
            speed,
            start_opt,
            title,
            last_step: Instant::now(),
        }
    }

    fn log(&self, level: LogLevel, text: &str) {
        self.shared.log.log("core", level, text);
    }

    fn broadcast(&self, kind: EventKind) {
        self.shared.registry.broadcast(kind, EventData::None);
    }

    // ===== Command execution (engine thread) =====

    pub(crate) fn run_command(&mut self, cmd: Command) {
        match cmd {
            Command::LoadFile { path, mode } => match mode {
                LoadMode::Replace => {
                    self.finish_current();
                    self.playlist.clear();
                    self.begin_file(path);
                }
                LoadMode::Append => {
                    if self.current.is_none() && self.playlist.is_empty() {
                        self.begin_file(path);
                    } else {
                        self.playlist.push(path);
                    }
                }
            },
            Command::Stop => {
                self.finish_current();
                self.playlist.clear();
            }
            Command::Seek { target, mode } => match &mut self.current {
                Some(file) => {
                    file.position = match mode {
                        SeekMode::Absolute => target.max(0.0),
                        SeekMode::Relative => (file.position + target).max(0.0),
                    };
                }
                None => self.log(LogLevel::Error, "seek: no file playing"),
            },
            Command::PlaylistNext => {
                if self.current.is_some() || !self.playlist.is_empty() {
                    self.finish_current();
                    if !self.playlist.is_empty() {
                        let next = self.playlist.remove(0);
                        self.begin_file(next);
                    }
                } else {
                    self.log(LogLevel::Error, "playlist-next: no next file");
                }
            }
            Command::FrameStep => {
                if let Some(file) = &mut self.current {
                    self.pause = true;
                    file.position += FRAME_TIME;
                } else {
                    self.log(LogLevel::Error, "frame-step: no file playing");
                }
            }
            Command::ScriptDispatch { client, arg0 } => {
                let data = EventData::ScriptInputDispatch(ScriptInputDispatch {
                    arg0,
                    kind: "press".to_string(),
                });
                if self
                    .shared
                    .registry
                    .send_event_to(&client, EventKind::ScriptInputDispatch, data)
                    .is_err()
                {
                    self.log(
                        LogLevel::Warn,
                        &format!("script-dispatch: no client named '{}'", client),
                    );
                }
            }
            Command::Quit => {
                self.log(LogLevel::Info, "quit requested");
                self.quit = true;
            }
            Command::Ignore => {}
        }
    }

    fn begin_file(&mut self, path: String) {
        self.log(LogLevel::Info, &format!("Playing: {}", path));
        self.broadcast(EventKind::StartFile);
        let tracks = vec!["video", "audio"];
        self.log(LogLevel::V, &format!("Tracks: {}", tracks.join(", ")));
        self.current = Some(PlayingFile {
            path,
            position: self.start_opt,
            duration: None,
            tracks,
        });
        self.idle_active = false;
        self.broadcast(EventKind::TracksChanged);
        self.broadcast(EventKind::PlaybackStart);
    }

    fn finish_current(&mut self) {
        if let Some(file) = self.current.take() {
            self.log(LogLevel::Info, &format!("Finished: {}", file.path));
            self.broadcast(EventKind::EndFile);
        }
    }

    // ===== Playback step (engine thread, between dispatch drains) =====

    /// How long the next dispatch drain may block.
    pub(crate) fn process_timeout(&self) -> Duration {
        if self.current.is_some() && !self.pause {
            ACTIVE_STEP
        } else {
            IDLE_STEP
        }
    }

    pub(crate) fn wants_quit(&self) -> bool {
        self.quit
    }

    /// Advance the playback model by one iteration and emit the
    /// events that fall out of it.
    pub(crate) fn step(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_step).as_secs_f64();
        self.last_step = now;

        if self.pause != self.pause_broadcast {
            self.pause_broadcast = self.pause;
            self.broadcast(if self.pause {
                EventKind::Pause
            } else {
                EventKind::Unpause
            });
        }

        let mut ended = false;
        if let Some(file) = &mut self.current {
            if !self.pause {
                file.position += dt * self.speed;
                if let Some(duration) = file.duration {
                    ended = file.position >= duration;
                }
            }
        }
        if ended {
            self.finish_current();
            if !self.playlist.is_empty() {
                let next = self.playlist.remove(0);
                self.begin_file(next);
            }
        }

        if self.current.is_some() {
            self.broadcast(EventKind::Tick);
        } else if self.playlist.is_empty() && !self.idle_active {
            if self.idle_opt {
                self.log(LogLevel::V, "entering idle mode");
                self.broadcast(EventKind::Idle);
                self.idle_active = true;
            } else {
                self.log(LogLevel::Info, "no files to play, exiting");
                self.quit = true;
            }
        }
    }

    // ===== Property access (engine thread) =====

    pub(crate) fn get_property(
        &self,
        name: &str,
        format: Format,
    ) -> Result<String, PropertyError> {
        let value = match name {
            "pause" => flag_str(self.pause).to_string(),
            "idle" => flag_str(self.idle_opt).to_string(),
            "volume" => fmt_num(self.volume),
            "speed" => fmt_num(self.speed),
            "title" => self.title.clone(),
            "path" => self.with_file(|f| f.path.clone())?,
            "filename" => self.with_file(|f| {
                Path::new(&f.path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| f.path.clone())
            })?,
            "media-title" => {
                if !self.title.is_empty() {
                    self.title.clone()
                } else {
                    self.get_property("filename", Format::String)?
                }
            }
            "time-pos" => {
                let pos = self.with_file(|f| f.position)?;
                return Ok(match format {
                    Format::String => fmt_num(pos),
                    Format::OsdString => fmt_time(pos),
                });
            }
            "duration" => {
                let duration = self
                    .with_file(|f| f.duration)?
                    .ok_or(PropertyError::Unavailable)?;
                return Ok(match format {
                    Format::String => fmt_num(duration),
                    Format::OsdString => fmt_time(duration),
                });
            }
            "playlist-count" => {
                fmt_num((self.playlist.len() + usize::from(self.current.is_some())) as f64)
            }
            "track-list/count" => {
                fmt_num(self.current.as_ref().map_or(0, |f| f.tracks.len()) as f64)
            }
            _ => return Err(PropertyError::Unknown),
        };
        Ok(value)
    }

    pub(crate) fn set_property(&mut self, name: &str, value: &str) -> Result<(), PropertyError> {
        match name {
            "pause" => self.pause = parse_flag(value)?,
            "idle" => self.idle_opt = parse_flag(value)?,
            "volume" => self.volume = parse_range(value, 0.0, 130.0)?,
            "speed" => self.speed = parse_range(value, 0.01, 100.0)?,
            "title" => self.title = value.to_string(),
            "time-pos" => {
                let target: f64 = value.parse().map_err(|_| PropertyError::Error)?;
                let file = self.current.as_mut().ok_or(PropertyError::Unavailable)?;
                file.position = target.max(0.0);
            }
            "path" | "filename" | "media-title" | "duration" | "playlist-count"
            | "track-list/count" => return Err(PropertyError::NotImplemented),
            _ => return Err(PropertyError::Unknown),
        }
        Ok(())
    }

    fn with_file<T>(&self, f: impl FnOnce(&PlayingFile) -> T) -> Result<T, PropertyError> {
        self.current.as_ref().map(f).ok_or(PropertyError::Unavailable)
    }
}

fn flag_str(v: bool) -> &'static str {
    if v {
        "yes"
    } else {
        "no"
    }
}

fn parse_flag(value: &str) -> Result<bool, PropertyError> {
    match value {
        "yes" => Ok(true),
        "no" => Ok(false),
        _ => Err(PropertyError::Error),
    }
}

fn parse_range(value: &str, min: f64, max: f64) -> Result<f64, PropertyError> {
    let num: f64 = value.parse().map_err(|_| PropertyError::Error)?;
    if !num.is_finite() || num < min || num > max {
        return Err(PropertyError::Error);
    }
    Ok(num)
}

/// Numbers without a trailing fraction print as integers.
fn fmt_num(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{:.0}", v)
    } else {
        format!("{}", v)
    }
}

/// OSD time formatting, `hh:mm:ss`.
fn fmt_time(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}

/// Body of the playback thread: serve the dispatch queue and step the
/// playback model until quit, then shut clients down and wait for the
/// last one to go before the context is dropped.
pub(crate) fn play_files(mut core: EngineCore) {
    let shared = Arc::clone(&core.shared);
    shared.dispatch.attach();
    shared.log.log("core", LogLevel::V, "playback thread started");

    while !core.wants_quit() {
        let timeout = core.process_timeout();
        shared.dispatch.process(&mut core, timeout);
        core.step();
    }

    shared.log.log("core", LogLevel::Info, "shutting down");
    shared.registry.shutdown_all();
    while shared.registry.num_clients() > 0 {
        shared.dispatch.process(&mut core, Duration::from_millis(100));
    }
    shared.dispatch.detach();
    shared.log.log("core", LogLevel::V, "playback thread exiting");
}
