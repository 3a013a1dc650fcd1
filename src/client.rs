//! Client handles: the public surface of the engine.
//!
//! A [`Client`] is one observer/controller of a single engine
//! context. Each client owns a private event ring, a monotonically
//! increasing reply-id space for its asynchronous requests, an event
//! mask, and optionally a log tap. Any number of clients can drive
//! one engine from their own threads.
//!
//! # Thread safety
//!
//! All methods take `&self` and are safe to call from any thread,
//! except [`wait_event`](Client::wait_event) which takes `&mut self`:
//! there must be at most one waiting thread per client, and the
//! exclusive borrow enforces that at compile time.
//!
//! # Request model
//!
//! Synchronous calls block on the dispatch queue until the engine
//! thread ran the request and return its status directly.
//! Asynchronous calls reserve a slot in the event ring first, so the
//! reply can never be dropped, then return a positive reply id; the
//! outcome arrives later as an Ok/Error/Property event carrying that
//! id. Validation errors (engine not initialized, malformed command,
//! reservation exhausted) are reported synchronously and never touch
//! the ring.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::core::command::Command;
use crate::core::engine::{play_files, EngineCore, PropertyError, Shared};
use crate::core::log::{LogBuffer, LogLevel};
use crate::core::options::OptionError;
use crate::core::ring::EventRing;
use crate::error::Error;
use crate::events::{
    default_event_mask, Event, EventData, EventKind, Format, LogMessage, PropertyEvent,
};

/// Capacity of each client's event ring, in records. Also the bound
/// on a client's outstanding asynchronous requests.
pub const MAX_EVENTS: usize = 1000;

/// Capacity of a client's log tap, in messages.
const LOG_BUFFER_SIZE: usize = 1000;

struct ClientState {
    event_mask: u64,
    queued_wakeup: bool,
    shutdown: bool,
    /// "Too many events queued" was already logged once.
    choke_warning: bool,
    wakeup_cb: Option<Box<dyn Fn() + Send>>,
    next_reply_id: u64,
    /// Ring slots promised to outstanding async requests.
    reserved_events: usize,
    ring: EventRing,
    messages: Option<Arc<LogBuffer>>,
}

/// Shared per-client state; the handle and the engine both hold it.
pub(crate) struct ClientInner {
    name: String,
    shared: Arc<Shared>,
    state: Mutex<ClientState>,
    wakeup: Condvar,
}

impl ClientInner {
    pub(crate) fn new(shared: Arc<Shared>, name: String, max_events: usize) -> Arc<ClientInner> {
        Arc::new(ClientInner {
            name,
            shared,
            state: Mutex::new(ClientState {
                event_mask: default_event_mask(),
                queued_wakeup: false,
                shutdown: false,
                choke_warning: false,
                wakeup_cb: None,
                next_reply_id: 0,
                reserved_events: 0,
                ring: EventRing::new(max_events),
                messages: None,
            }),
            wakeup: Condvar::new(),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Signal the waiting thread and fire the wakeup callback. Runs
    /// with the handle lock held.
    fn signal_wakeup(&self, st: &ClientState) {
        self.wakeup.notify_all();
        if let Some(cb) = &st.wakeup_cb {
            cb();
        }
    }

    /// Queue an unsolicited event, respecting the event mask and the
    /// reply reservations. Returns false if the ring had no free
    /// unreserved slot and the event was dropped (dropped for this
    /// client only; the engine never blocks on it).
    pub(crate) fn send_event(&self, event: Event) -> bool {
        let mut st = self.state.lock().unwrap();
        if st.event_mask & event.kind.mask_bit() == 0 {
            return true;
        }
        if st.ring.available() > st.reserved_events {
            st.ring.push(event);
            self.signal_wakeup(&st);
            true
        } else {
            if !st.choke_warning {
                st.choke_warning = true;
                self.shared
                    .log
                    .log(&self.name, LogLevel::Error, "Too many events queued.");
            }
            false
        }
    }

    /// Claim a ring slot and a reply id for an async request, so the
    /// reply can be delivered even if the ring congests afterwards.
    pub(crate) fn reserve_reply(&self) -> Result<u64, Error> {
        let mut st = self.state.lock().unwrap();
        if st.reserved_events >= st.ring.capacity() {
            return Err(Error::EventBufferFull);
        }
        st.reserved_events += 1;
        st.next_reply_id += 1;
        Ok(st.next_reply_id)
    }

    /// Deliver a reply into a previously reserved slot. Never drops.
    pub(crate) fn send_reply(&self, reply_id: u64, mut event: Event) {
        let mut st = self.state.lock().unwrap();
        assert!(st.reserved_events > 0, "reply without reservation");
        st.reserved_events -= 1;
        event.reply_id = reply_id;
        st.ring.push(event);
        self.signal_wakeup(&st);
    }

    pub(crate) fn send_error_reply(&self, reply_id: u64, err: Error) {
        let mut event = Event::bare(EventKind::Error);
        event.error = err.code();
        self.send_reply(reply_id, event);
    }

    /// Turn a request status into an Ok or Error reply.
    pub(crate) fn status_reply(&self, reply_id: u64, status: Result<(), Error>) {
        match status {
            Ok(()) => self.send_reply(reply_id, Event::bare(EventKind::Ok)),
            Err(err) => self.send_error_reply(reply_id, err),
        }
    }

    /// Engine teardown reached this client.
    pub(crate) fn set_shutdown(&self) {
        let mut st = self.state.lock().unwrap();
        st.shutdown = true;
        self.signal_wakeup(&st);
    }

    /// Drop buffered events and the log tap. Called by the registry
    /// while removing this client.
    pub(crate) fn teardown(&self) {
        let mut st = self.state.lock().unwrap();
        st.ring.clear();
        st.messages = None;
    }

    #[cfg(test)]
    pub(crate) fn pop_event(&self) -> Option<Event> {
        self.state.lock().unwrap().ring.pop()
    }
}

/// A handle on the engine, as held by one embedder thread.
///
/// Dropping the handle destroys the client: it is removed from the
/// engine's registry, buffered events are discarded and the log tap
/// is closed. The engine itself keeps running until it quits and the
/// last client is gone.
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Create a fresh engine context and its first client, named
    /// "main". Embedder-friendly defaults are applied: idle mode on,
    /// no terminal, no on-screen controller.
    pub fn create() -> Result<Client, Error> {
        let shared = Shared::new();
        let inner = shared.registry.register(&shared, "main", MAX_EVENTS)?;
        let client = Client { inner };
        let _ = client.set_option_string("idle", "yes");
        let _ = client.set_option_string("terminal", "no");
        let _ = client.set_option_string("osc", "no");
        Ok(client)
    }

    /// Register another client on the same engine. On a name
    /// collision a numeric suffix (2..) is appended.
    pub fn create_client(&self, name: &str) -> Result<Client, Error> {
        let shared = &self.inner.shared;
        let inner = shared.registry.register(shared, name, MAX_EVENTS)?;
        Ok(Client { inner })
    }

    /// The unique name of this client.
    pub fn client_name(&self) -> &str {
        self.inner.name()
    }

    /// Start the engine: apply the configuration and spawn the
    /// detached playback thread. May be called once per context;
    /// later calls fail with InvalidParameter.
    pub fn initialize(&self) -> Result<(), Error> {
        let shared = &self.inner.shared;
        if shared
            .initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::InvalidParameter);
        }
        let core = EngineCore::new(Arc::clone(shared));
        let spawned = thread::Builder::new()
            .name("kino-playback".into())
            .spawn(move || play_files(core));
        if spawned.is_err() {
            shared.initialized.store(false, Ordering::SeqCst);
            return Err(Error::Nomem);
        }
        Ok(())
    }

    /// Destroy this client. Equivalent to dropping the handle.
    pub fn destroy(self) {
        drop(self);
    }

    // ===== Event loop =====

    /// Wait up to `timeout` seconds for the next event.
    ///
    /// Returns, in priority order: the oldest buffered event; a
    /// Shutdown event if the engine is tearing down; a LogMessage
    /// event if the log tap has one; a None event if a wakeup was
    /// queued or the timeout expired. A non-positive timeout polls
    /// without blocking.
    pub fn wait_event(&mut self, timeout: f64) -> Event {
        let timeout = if timeout.is_finite() { timeout.max(0.0) } else { 0.0 };
        let deadline = Instant::now() + Duration::from_secs_f64(timeout.min(1e9));

        let mut st = self.inner.state.lock().unwrap();
        let event = loop {
            if let Some(event) = st.ring.pop() {
                break event;
            }
            if st.shutdown {
                break Event::bare(EventKind::Shutdown);
            }
            if let Some(tap) = &st.messages {
                // The tap is polled, not signalled; new messages are
                // picked up when something else wakes the client or
                // the timeout expires.
                if let Some(msg) = tap.try_read() {
                    break Event::new(
                        EventKind::LogMessage,
                        EventData::LogMessage(LogMessage {
                            prefix: msg.prefix,
                            level: msg.level.name(),
                            text: msg.text,
                        }),
                    );
                }
            }
            if st.queued_wakeup {
                break Event::bare(EventKind::None);
            }
            if timeout <= 0.0 {
                break Event::bare(EventKind::None);
            }
            let now = Instant::now();
            if now >= deadline {
                break Event::bare(EventKind::None);
            }
            let (guard, _) = self.inner.wakeup.wait_timeout(st, deadline - now).unwrap();
            st = guard;
        };
        st.queued_wakeup = false;
        event
    }

    /// Make the current or next `wait_event` return immediately with
    /// a None event.
    pub fn wakeup(&self) {
        let mut st = self.inner.state.lock().unwrap();
        st.queued_wakeup = true;
        self.inner.signal_wakeup(&st);
    }

    /// Install a callback fired whenever a new event or wakeup is
    /// queued for this client.
    ///
    /// The callback runs with the client's internal lock held, from
    /// whatever thread produced the event. It must return quickly,
    /// must not block, and must not call back into this API; its only
    /// legitimate job is to nudge the thread that calls `wait_event`.
    pub fn set_wakeup_callback(&self, cb: impl Fn() + Send + 'static) {
        let mut st = self.inner.state.lock().unwrap();
        st.wakeup_cb = Some(Box::new(cb));
    }

    /// Enable or disable delivery of one event kind.
    ///
    /// Disabling a kind does not retract events of that kind already
    /// buffered in the ring; they will still be returned.
    pub fn request_event(&self, kind: EventKind, enable: bool) {
        let mut st = self.inner.state.lock().unwrap();
        if enable {
            st.event_mask |= kind.mask_bit();
        } else {
            st.event_mask &= !kind.mask_bit();
        }
    }

    /// Subscribe to engine log messages at `min_level` or more
    /// severe; they arrive as LogMessage events. `"no"` unsubscribes.
    /// Changing the level discards messages buffered so far.
    pub fn request_log_messages(&self, min_level: &str) -> Result<(), Error> {
        let level = if min_level == "no" {
            None
        } else {
            Some(LogLevel::from_name(min_level).ok_or(Error::InvalidParameter)?)
        };

        let mut st = self.inner.state.lock().unwrap();
        if st.messages.as_ref().map(|tap| tap.level()) != level {
            st.messages =
                level.map(|lv| self.inner.shared.log.new_buffer(LOG_BUFFER_SIZE, lv));
        }
        Ok(())
    }

    /// Cooperatively pause the engine thread at its next safe point.
    /// Reentrant; every call needs a matching [`resume`](Self::resume).
    pub fn suspend(&self) {
        self.inner.shared.dispatch.suspend();
    }

    /// Undo one [`suspend`](Self::suspend). Unbalanced calls are a
    /// fatal programmer error.
    pub fn resume(&self) {
        self.inner.shared.dispatch.resume();
    }

    // ===== Request runners =====

    fn check_initialized(&self) -> Result<(), Error> {
        if self.inner.shared.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Uninitialized)
        }
    }

    fn parse_command(&self, parsed: Result<Command, String>) -> Result<Command, Error> {
        parsed.map_err(|msg| {
            self.inner
                .shared
                .log
                .log(&self.inner.name, LogLevel::Error, &msg);
            Error::InvalidParameter
        })
    }

    /// Run a command on the engine thread and wait for it.
    pub fn command(&self, args: &[&str]) -> Result<(), Error> {
        self.check_initialized()?;
        let cmd = self.parse_command(Command::parse(args))?;
        self.run_command_sync(cmd)
    }

    /// Like [`command`](Self::command), but parsed from one line.
    pub fn command_string(&self, line: &str) -> Result<(), Error> {
        self.check_initialized()?;
        let cmd = self.parse_command(Command::parse_str(line))?;
        self.run_command_sync(cmd)
    }

    fn run_command_sync(&self, cmd: Command) -> Result<(), Error> {
        self.inner
            .shared
            .dispatch
            .run(move |core| core.run_command(cmd))
            .ok_or(Error::Uninitialized)
    }

    /// Run a command asynchronously. Returns the reply id; completion
    /// arrives as an Ok or Error event carrying it.
    pub fn command_async(&self, args: &[&str]) -> Result<u64, Error> {
        self.check_initialized()?;
        let cmd = self.parse_command(Command::parse(args))?;
        let reply_id = self.inner.reserve_reply()?;
        let inner = Arc::clone(&self.inner);
        self.inner.shared.dispatch.enqueue(move |core| {
            core.run_command(cmd);
            inner.status_reply(reply_id, Ok(()));
        });
        Ok(reply_id)
    }

    /// Set a property on the engine thread and wait for the result.
    /// Only [`Format::String`] values can be written.
    pub fn set_property(&self, name: &str, format: Format, value: &str) -> Result<(), Error> {
        self.check_initialized()?;
        if format != Format::String {
            return Err(Error::InvalidParameter);
        }
        let name = name.to_string();
        let value = value.to_string();
        self.inner
            .shared
            .dispatch
            .run(move |core| core.set_property(&name, &value))
            .ok_or(Error::Uninitialized)?
            .map_err(translate_property_error)
    }

    pub fn set_property_string(&self, name: &str, value: &str) -> Result<(), Error> {
        self.set_property(name, Format::String, value)
    }

    /// Asynchronous property write; the status arrives as an Ok or
    /// Error event carrying the returned reply id.
    pub fn set_property_async(
        &self,
        name: &str,
        format: Format,
        value: &str,
    ) -> Result<u64, Error> {
        self.check_initialized()?;
        if format != Format::String {
            return Err(Error::InvalidParameter);
        }
        let reply_id = self.inner.reserve_reply()?;
        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        let value = value.to_string();
        self.inner.shared.dispatch.enqueue(move |core| {
            let status = core
                .set_property(&name, &value)
                .map_err(translate_property_error);
            inner.status_reply(reply_id, status);
        });
        Ok(reply_id)
    }

    /// Read a property on the engine thread.
    pub fn get_property(&self, name: &str, format: Format) -> Result<String, Error> {
        self.check_initialized()?;
        let name = name.to_string();
        self.inner
            .shared
            .dispatch
            .run(move |core| core.get_property(&name, format))
            .ok_or(Error::Uninitialized)?
            .map_err(translate_property_error)
    }

    /// Property value as a plain string, `None` on any error.
    pub fn get_property_string(&self, name: &str) -> Option<String> {
        self.get_property(name, Format::String).ok()
    }

    /// Property value formatted for display, `None` on any error.
    pub fn get_property_osd_string(&self, name: &str) -> Option<String> {
        self.get_property(name, Format::OsdString).ok()
    }

    /// Asynchronous property read. On success the reply is a Property
    /// event whose payload carries the name, format and value; on
    /// failure an Error event.
    pub fn get_property_async(&self, name: &str, format: Format) -> Result<u64, Error> {
        self.check_initialized()?;
        let reply_id = self.inner.reserve_reply()?;
        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        self.inner.shared.dispatch.enqueue(move |core| {
            match core.get_property(&name, format) {
                Ok(value) => inner.send_reply(
                    reply_id,
                    Event::new(
                        EventKind::Property,
                        EventData::Property(PropertyEvent {
                            name,
                            format,
                            data: Some(value),
                        }),
                    ),
                ),
                Err(err) => inner.send_error_reply(reply_id, translate_property_error(err)),
            }
        });
        Ok(reply_id)
    }

    /// Set an option. Before [`initialize`](Self::initialize) this
    /// writes the configuration store directly (string values only);
    /// afterwards it behaves like [`set_property`](Self::set_property).
    pub fn set_option(&self, name: &str, format: Format, value: &str) -> Result<(), Error> {
        if self.inner.shared.initialized.load(Ordering::SeqCst) {
            return self.set_property(name, format, value);
        }
        if format != Format::String {
            return Err(Error::InvalidParameter);
        }
        let mut opts = self.inner.shared.options.lock().unwrap();
        opts.set(name, value).map_err(|err| match err {
            OptionError::Unknown => Error::NotFound,
            OptionError::MissingParam | OptionError::Invalid | OptionError::OutOfRange => {
                Error::InvalidParameter
            }
        })
    }

    pub fn set_option_string(&self, name: &str, value: &str) -> Result<(), Error> {
        self.set_option(name, Format::String, value)
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Arc<ClientInner> {
        &self.inner
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.inner.shared.registry.remove(&self.inner);
        // Let the engine loop notice the changed client count.
        self.inner.shared.dispatch.interrupt();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("name", &self.inner.name())
            .finish()
    }
}

fn translate_property_error(err: PropertyError) -> Error {
    match err {
        PropertyError::Error | PropertyError::NotImplemented => Error::Property,
        PropertyError::Unavailable => Error::PropertyUnavailable,
        PropertyError::Unknown => Error::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventData;

    /// Pump wait_event until an event of `kind` arrives.
    fn wait_for_kind(client: &mut Client, kind: EventKind, secs: f64) -> Option<Event> {
        wait_for(client, secs, |ev| ev.kind == kind)
    }

    fn wait_for(
        client: &mut Client,
        secs: f64,
        pred: impl Fn(&Event) -> bool,
    ) -> Option<Event> {
        let deadline = Instant::now() + Duration::from_secs_f64(secs);
        while Instant::now() < deadline {
            let ev = client.wait_event(0.1);
            if ev.kind != EventKind::None && pred(&ev) {
                return Some(ev);
            }
        }
        None
    }

    /// Drain events for a fixed interval.
    fn collect_for(client: &mut Client, secs: f64) -> Vec<Event> {
        let deadline = Instant::now() + Duration::from_secs_f64(secs);
        let mut events = Vec::new();
        while Instant::now() < deadline {
            let ev = client.wait_event(0.05);
            if ev.kind != EventKind::None {
                events.push(ev);
            }
        }
        events
    }

    #[test]
    fn test_create_names_first_client_main() {
        let client = Client::create().unwrap();
        assert_eq!(client.client_name(), "main");
        assert_eq!(client.inner().shared.registry.num_clients(), 1);
    }

    #[test]
    fn test_client_names_and_registry_count() {
        let main = Client::create().unwrap();
        let a = main.create_client("A").unwrap();
        let a2 = main.create_client("A").unwrap();
        assert_eq!(a.client_name(), "A");
        assert_eq!(a2.client_name(), "A2");

        let registry_count = {
            let shared = Arc::clone(&main.inner().shared);
            a.destroy();
            a2.destroy();
            main.destroy();
            shared.registry.num_clients()
        };
        assert_eq!(registry_count, 0);
    }

    #[test]
    fn test_uninitialized_requests_fail_synchronously() {
        let client = Client::create().unwrap();
        assert_eq!(client.command(&["stop"]), Err(Error::Uninitialized));
        assert_eq!(client.command_async(&["stop"]), Err(Error::Uninitialized));
        assert_eq!(
            client.get_property("pause", Format::String),
            Err(Error::Uninitialized)
        );
        assert_eq!(
            client.set_property_string("pause", "yes"),
            Err(Error::Uninitialized)
        );
    }

    #[test]
    fn test_initialize_only_once() {
        let client = Client::create().unwrap();
        client.initialize().unwrap();
        assert_eq!(client.initialize(), Err(Error::InvalidParameter));
        let _ = client.command(&["quit"]);
    }

    #[test]
    fn test_malformed_command_is_invalid_parameter() {
        let client = Client::create().unwrap();
        client.initialize().unwrap();
        assert_eq!(client.command(&["transmogrify"]), Err(Error::InvalidParameter));
        assert_eq!(client.command(&[]), Err(Error::InvalidParameter));
        assert_eq!(client.command_string(""), Err(Error::InvalidParameter));
        assert_eq!(
            client.command_async(&["seek", "soon"]),
            Err(Error::InvalidParameter)
        );
        let _ = client.command(&["quit"]);
    }

    #[test]
    fn test_command_async_reply_from_second_thread() {
        let mut client = Client::create().unwrap();
        client.initialize().unwrap();

        let mut reply_id = 0;
        thread::scope(|s| {
            reply_id = s
                .spawn(|| client.command_async(&["loadfile", "x.mkv"]).unwrap())
                .join()
                .unwrap();
        });
        assert!(reply_id > 0);

        let reply = wait_for(&mut client, 5.0, |ev| ev.reply_id == reply_id)
            .expect("no reply for async command");
        assert_eq!(reply.kind, EventKind::Ok);
        assert_eq!(reply.error, 0);

        let _ = client.command(&["quit"]);
    }

    #[test]
    fn test_reply_ids_monotonic_from_one() {
        let client = Client::create().unwrap();
        client.initialize().unwrap();
        let sub = client.create_client("ids").unwrap();

        let first = sub.command_async(&["ignore"]).unwrap();
        let second = sub.command_async(&["ignore"]).unwrap();
        let third = sub.set_property_async("pause", Format::String, "no").unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(third, 3);

        let _ = client.command(&["quit"]);
    }

    #[test]
    fn test_reservation_exhaustion_and_recovery() {
        let client = Client::create().unwrap();
        client.initialize().unwrap();

        // A private client with a tiny ring to make exhaustion cheap.
        let shared = Arc::clone(&client.inner().shared);
        let inner = shared.registry.register(&shared, "small", 4).unwrap();
        let small = Client { inner };

        let ids: Vec<u64> = (0..4)
            .map(|_| small.inner().reserve_reply().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);

        // The fifth submission is refused before touching the queue.
        assert_eq!(
            small.command_async(&["ignore"]),
            Err(Error::EventBufferFull)
        );
        assert_eq!(
            small.inner().reserve_reply(),
            Err(Error::EventBufferFull)
        );

        // Satisfying one outstanding reply frees a slot.
        small.inner().status_reply(ids[0], Ok(()));
        let next = small.command_async(&["ignore"]).unwrap();
        assert_eq!(next, 5);

        let _ = client.command(&["quit"]);
    }

    #[test]
    fn test_tick_is_opt_in() {
        let mut client = Client::create().unwrap();
        client.initialize().unwrap();
        client.command(&["loadfile", "x.mkv"]).unwrap();

        // Default mask: plenty of loop iterations, no Tick events.
        let events = collect_for(&mut client, 0.5);
        assert!(events.iter().all(|ev| ev.kind != EventKind::Tick));
        // And with nothing left buffered the wait times out with None.
        assert_eq!(client.wait_event(0.1).kind, EventKind::None);

        client.request_event(EventKind::Tick, true);
        assert!(wait_for_kind(&mut client, EventKind::Tick, 2.0).is_some());

        client.request_event(EventKind::Tick, false);
        let _ = client.command(&["quit"]);
    }

    #[test]
    fn test_event_mask_gate() {
        let mut client = Client::create().unwrap();
        client.request_event(EventKind::StartFile, false);
        client.initialize().unwrap();
        client.command(&["loadfile", "x.mkv"]).unwrap();

        let events = collect_for(&mut client, 0.5);
        assert!(events.iter().all(|ev| ev.kind != EventKind::StartFile));

        // The rest of the load sequence still arrives, in order.
        let tracks = events
            .iter()
            .position(|ev| ev.kind == EventKind::TracksChanged)
            .expect("no tracks-changed");
        let playback = events
            .iter()
            .position(|ev| ev.kind == EventKind::PlaybackStart)
            .expect("no playback-start");
        assert!(tracks < playback);

        let _ = client.command(&["quit"]);
    }

    #[test]
    fn test_load_sequence_order() {
        let mut client = Client::create().unwrap();
        client.initialize().unwrap();
        client.command(&["loadfile", "x.mkv"]).unwrap();

        let events = collect_for(&mut client, 0.5);
        let kinds: Vec<EventKind> = events
            .iter()
            .map(|ev| ev.kind)
            .filter(|k| {
                matches!(
                    k,
                    EventKind::StartFile | EventKind::TracksChanged | EventKind::PlaybackStart
                )
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::StartFile,
                EventKind::TracksChanged,
                EventKind::PlaybackStart
            ]
        );

        let _ = client.command(&["quit"]);
    }

    #[test]
    fn test_broadcast_drop_and_choke_warning_once() {
        // No engine needed: fan out directly through the registry.
        let client = Client::create().unwrap();
        let shared = Arc::clone(&client.inner().shared);

        // A tap to observe the one-shot choke warning.
        let tap = shared.log.new_buffer(16, LogLevel::Error);

        let ok_a = client.create_client("a").unwrap();
        let ok_b = client.create_client("b").unwrap();
        let victim = Client {
            inner: shared.registry.register(&shared, "victim", 1).unwrap(),
        };

        for _ in 0..3 {
            shared.registry.broadcast(EventKind::Idle, EventData::None);
        }

        // Healthy clients (ring capacity 1000) saw every broadcast...
        for ok in [&ok_a, &ok_b] {
            for _ in 0..3 {
                assert_eq!(ok.inner().pop_event().unwrap().kind, EventKind::Idle);
            }
        }
        // ...the victim kept only the first, and warned exactly once.
        assert_eq!(victim.inner().pop_event().unwrap().kind, EventKind::Idle);
        assert!(victim.inner().pop_event().is_none());

        let chokes: Vec<_> = std::iter::from_fn(|| tap.try_read())
            .filter(|rec| rec.text == "Too many events queued.")
            .collect();
        assert_eq!(chokes.len(), 1);
        assert_eq!(chokes[0].prefix, "victim");
    }

    #[test]
    fn test_send_reply_never_drops_under_full_ring() {
        let client = Client::create().unwrap();
        let shared = Arc::clone(&client.inner().shared);
        let inner = shared.registry.register(&shared, "tight", 2).unwrap();

        // Reserve both slots, then congest with broadcasts.
        let r1 = inner.reserve_reply().unwrap();
        let r2 = inner.reserve_reply().unwrap();
        shared.registry.broadcast(EventKind::Idle, EventData::None);

        // The unsolicited event was dropped (all capacity reserved)...
        assert!(inner.pop_event().is_none());
        // ...but both replies still land.
        inner.status_reply(r1, Ok(()));
        inner.status_reply(r2, Err(Error::NotFound));
        let ev1 = inner.pop_event().unwrap();
        let ev2 = inner.pop_event().unwrap();
        assert_eq!((ev1.kind, ev1.reply_id), (EventKind::Ok, r1));
        assert_eq!((ev2.kind, ev2.reply_id), (EventKind::Error, r2));
        assert_eq!(ev2.error, Error::NotFound.code());
    }

    #[test]
    fn test_wakeup_and_callback() {
        let mut client = Client::create().unwrap();

        let (tx, rx) = crossbeam_channel::unbounded();
        client.set_wakeup_callback(move || {
            let _ = tx.send(());
        });

        client.wakeup();
        assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());

        // The queued wakeup turns a long wait into an immediate None.
        let start = Instant::now();
        let ev = client.wait_event(10.0);
        assert_eq!(ev.kind, EventKind::None);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_wait_event_nonblocking_poll() {
        let mut client = Client::create().unwrap();
        let start = Instant::now();
        assert_eq!(client.wait_event(0.0).kind, EventKind::None);
        assert_eq!(client.wait_event(-1.0).kind, EventKind::None);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_properties_sync_roundtrip() {
        let client = Client::create().unwrap();
        client.initialize().unwrap();

        client.set_property_string("pause", "yes").unwrap();
        assert_eq!(client.get_property_string("pause").unwrap(), "yes");

        assert_eq!(
            client.set_property("pause", Format::OsdString, "yes"),
            Err(Error::InvalidParameter)
        );
        assert_eq!(
            client.set_property_string("pause", "maybe"),
            Err(Error::Property)
        );
        assert_eq!(
            client.get_property("bogus", Format::String),
            Err(Error::NotFound)
        );
        assert_eq!(
            client.get_property("time-pos", Format::String),
            Err(Error::PropertyUnavailable)
        );
        assert_eq!(client.get_property_string("bogus"), None);

        let _ = client.command(&["quit"]);
    }

    #[test]
    fn test_get_property_async_success_and_error() {
        let mut client = Client::create().unwrap();
        client.initialize().unwrap();
        client.command(&["loadfile", "dir/movie.mkv"]).unwrap();

        let ok_id = client.get_property_async("path", Format::String).unwrap();
        let reply = wait_for(&mut client, 5.0, |ev| ev.reply_id == ok_id).unwrap();
        assert_eq!(reply.kind, EventKind::Property);
        match reply.data {
            EventData::Property(prop) => {
                assert_eq!(prop.name, "path");
                assert_eq!(prop.format, Format::String);
                assert_eq!(prop.data.as_deref(), Some("dir/movie.mkv"));
            }
            other => panic!("wrong payload: {:?}", other),
        }

        let bad_id = client.get_property_async("bogus", Format::String).unwrap();
        let reply = wait_for(&mut client, 5.0, |ev| ev.reply_id == bad_id).unwrap();
        assert_eq!(reply.kind, EventKind::Error);
        assert_eq!(reply.error, Error::NotFound.code());

        let _ = client.command(&["quit"]);
    }

    #[test]
    fn test_set_option_before_and_after_initialize() {
        let client = Client::create().unwrap();

        client.set_option_string("volume", "50").unwrap();
        assert_eq!(
            client.set_option_string("volume", "not-a-number"),
            Err(Error::InvalidParameter)
        );
        assert_eq!(
            client.set_option_string("brightness", "1"),
            Err(Error::NotFound)
        );
        assert_eq!(
            client.set_option("volume", Format::OsdString, "50"),
            Err(Error::InvalidParameter)
        );

        client.initialize().unwrap();
        assert_eq!(client.get_property_string("volume").unwrap(), "50");

        // After initialize, options are routed as property writes.
        client.set_option_string("volume", "60").unwrap();
        assert_eq!(client.get_property_string("volume").unwrap(), "60");
        assert_eq!(
            client.set_option_string("bogus", "1"),
            Err(Error::NotFound)
        );

        let _ = client.command(&["quit"]);
    }

    #[test]
    fn test_log_message_events() {
        let mut client = Client::create().unwrap();
        assert_eq!(
            client.request_log_messages("loudly"),
            Err(Error::InvalidParameter)
        );
        client.request_log_messages("info").unwrap();
        client.initialize().unwrap();
        client.command(&["loadfile", "x.mkv"]).unwrap();

        let msg = wait_for(&mut client, 5.0, |ev| {
            matches!(
                &ev.data,
                EventData::LogMessage(m) if m.text.contains("Playing:")
            )
        })
        .expect("no log message event");
        assert_eq!(msg.kind, EventKind::LogMessage);
        match msg.data {
            EventData::LogMessage(m) => {
                assert_eq!(m.prefix, "core");
                assert_eq!(m.level, "info");
            }
            _ => unreachable!(),
        }

        client.request_log_messages("no").unwrap();
        let _ = client.command(&["quit"]);
    }

    #[test]
    fn test_script_dispatch_targets_one_client() {
        let mut main = Client::create().unwrap();
        main.initialize().unwrap();
        let mut scripty = main.create_client("scripty").unwrap();

        main.command(&["script-dispatch", "scripty", "7"]).unwrap();

        let ev = wait_for_kind(&mut scripty, EventKind::ScriptInputDispatch, 5.0)
            .expect("dispatch event not delivered");
        match ev.data {
            EventData::ScriptInputDispatch(d) => {
                assert_eq!(d.arg0, 7);
                assert_eq!(d.kind, "press");
            }
            other => panic!("wrong payload: {:?}", other),
        }
        // The sender never sees a targeted event.
        let leaked = collect_for(&mut main, 0.2)
            .into_iter()
            .any(|ev| ev.kind == EventKind::ScriptInputDispatch);
        assert!(!leaked);

        // Unknown targets are logged engine-side, not an API error.
        main.command(&["script-dispatch", "ghost", "1"]).unwrap();

        let _ = main.command(&["quit"]);
    }

    #[test]
    fn test_suspend_freezes_playback() {
        let client = Client::create().unwrap();
        client.initialize().unwrap();
        client.command(&["loadfile", "x.mkv"]).unwrap();

        client.suspend();
        client.suspend();
        client.resume();
        // One resume is not enough.
        assert!(client.inner().shared.dispatch.suspended());

        // Dispatch still served at the safe point; position frozen.
        let p1 = client.get_property_string("time-pos").unwrap();
        thread::sleep(Duration::from_millis(80));
        let p2 = client.get_property_string("time-pos").unwrap();
        assert_eq!(p1, p2);

        client.resume();
        assert!(!client.inner().shared.dispatch.suspended());

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            thread::sleep(Duration::from_millis(30));
            let now = client.get_property_string("time-pos").unwrap();
            if now != p2 {
                break;
            }
            assert!(Instant::now() < deadline, "position did not advance");
        }

        let _ = client.command(&["quit"]);
    }

    #[test]
    fn test_shutdown_is_sticky() {
        let mut client = Client::create().unwrap();
        client.initialize().unwrap();
        client.command(&["quit"]).unwrap();

        assert!(wait_for_kind(&mut client, EventKind::Shutdown, 5.0).is_some());
        // Once shutting down, every wait returns Shutdown again.
        assert_eq!(client.wait_event(0.0).kind, EventKind::Shutdown);
        assert_eq!(client.wait_event(0.1).kind, EventKind::Shutdown);
    }

    #[test]
    fn test_shutdown_reaches_all_clients() {
        let mut main = Client::create().unwrap();
        main.initialize().unwrap();
        let mut side = main.create_client("side").unwrap();

        main.command(&["quit"]).unwrap();
        assert!(wait_for_kind(&mut main, EventKind::Shutdown, 5.0).is_some());
        assert!(wait_for_kind(&mut side, EventKind::Shutdown, 5.0).is_some());
    }

    #[test]
    fn test_pause_unpause_events() {
        let mut client = Client::create().unwrap();
        client.initialize().unwrap();
        client.command(&["loadfile", "x.mkv"]).unwrap();

        client.set_property_string("pause", "yes").unwrap();
        assert!(wait_for_kind(&mut client, EventKind::Pause, 5.0).is_some());

        client.set_property_string("pause", "no").unwrap();
        assert!(wait_for_kind(&mut client, EventKind::Unpause, 5.0).is_some());

        let _ = client.command(&["quit"]);
    }

    #[test]
    fn test_stop_emits_end_file_then_idle() {
        let mut client = Client::create().unwrap();
        client.initialize().unwrap();
        client.command(&["loadfile", "x.mkv"]).unwrap();
        assert!(wait_for_kind(&mut client, EventKind::PlaybackStart, 5.0).is_some());

        client.command(&["stop"]).unwrap();
        assert!(wait_for_kind(&mut client, EventKind::EndFile, 5.0).is_some());
        assert!(wait_for_kind(&mut client, EventKind::Idle, 5.0).is_some());

        let _ = client.command(&["quit"]);
    }
}
