//! Client registry: the per-engine table of live client handles.
//!
//! All fan-out goes through here. The registry lock is the coarsest
//! lock in the crate and is always taken before any handle lock,
//! never the other way around; `send_event` takes the handle lock
//! while the registry lock is held, which is the allowed nesting.

use std::sync::{Arc, Mutex};

use crate::client::ClientInner;
use crate::core::engine::Shared;
use crate::error::Error;
use crate::events::{Event, EventData, EventKind};

/// Highest numeric suffix tried when resolving a name collision.
const MAX_NAME_SUFFIX: u32 = 1000;

/// Table of live clients of one engine context.
#[derive(Default)]
pub(crate) struct ClientRegistry {
    clients: Mutex<Vec<Arc<ClientInner>>>,
}

impl ClientRegistry {
    pub fn new() -> ClientRegistry {
        ClientRegistry::default()
    }

    /// Number of live clients.
    pub fn num_clients(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    /// Create a handle and register it atomically with its unique
    /// name. On collision a numeric suffix 2..1000 is appended; when
    /// all are taken the client cannot be created.
    pub fn register(
        &self,
        shared: &Arc<Shared>,
        name: &str,
        max_events: usize,
    ) -> Result<Arc<ClientInner>, Error> {
        let mut clients = self.clients.lock().unwrap();

        let taken = |n: &str| clients.iter().any(|c| c.name() == n);
        let unique = if !taken(name) {
            name.to_string()
        } else {
            (2..MAX_NAME_SUFFIX)
                .map(|n| format!("{}{}", name, n))
                .find(|candidate| !taken(candidate))
                .ok_or(Error::Nomem)?
        };

        let client = ClientInner::new(Arc::clone(shared), unique, max_events);
        clients.push(Arc::clone(&client));
        Ok(client)
    }

    /// Remove a handle: drop it from the table, drain its ring and
    /// close its log tap. No-op if it was already removed.
    pub fn remove(&self, target: &Arc<ClientInner>) {
        let mut clients = self.clients.lock().unwrap();
        if let Some(pos) = clients.iter().position(|c| Arc::ptr_eq(c, target)) {
            clients.remove(pos);
            target.teardown();
        }
    }

    /// Deliver an event to every registered client, subject to each
    /// client's event mask. The payload is cloned per recipient; the
    /// producer's `data` is dropped exactly once when this returns,
    /// regardless of how many clients saw it.
    pub fn broadcast(&self, kind: EventKind, data: EventData) {
        let clients = self.clients.lock().unwrap();
        for client in clients.iter() {
            client.send_event(Event::new(kind, data.clone()));
        }
    }

    /// Deliver an event to the named client only. `Ok(true)` means
    /// delivered, `Ok(false)` means the client's ring was full.
    pub fn send_event_to(
        &self,
        name: &str,
        kind: EventKind,
        data: EventData,
    ) -> Result<bool, Error> {
        let clients = self.clients.lock().unwrap();
        let client = clients
            .iter()
            .find(|c| c.name() == name)
            .ok_or(Error::NotFound)?;
        Ok(client.send_event(Event::new(kind, data)))
    }

    /// Engine teardown: flag every client as shut down and wake its
    /// waiters. `wait_event` returns Shutdown from here on.
    pub fn shutdown_all(&self) {
        let clients = self.clients.lock().unwrap();
        for client in clients.iter() {
            client.set_shutdown();
        }
    }
}
