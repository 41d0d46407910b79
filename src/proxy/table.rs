//! Connection table
//!
//! Maps each identity to the event queue and task of its connection. The
//! map is a `DashMap`, so the demultiplexer and finishing connection tasks
//! can touch it concurrently without a global lock.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::tcp::Event;
use crate::wire::Identity;

/// Live connection as seen by the demultiplexer
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique across the table's lifetime, so a finishing task never
    /// removes a newer connection that reused its identity
    pub id: u64,
    pub events: mpsc::Sender<Event>,
    pub task: JoinHandle<()>,
}

/// Connections by identity
#[derive(Debug)]
pub struct ConnectionTable {
    connections: DashMap<Identity, ConnectionHandle>,
    max_connections: usize,
    next_id: AtomicU64,
}

impl ConnectionTable {
    #[must_use]
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: DashMap::new(),
            max_connections,
            next_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() >= self.max_connections
    }

    #[must_use]
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    #[must_use]
    pub fn contains(&self, identity: &Identity) -> bool {
        self.connections.contains_key(identity)
    }

    /// Event queue of the connection for `identity`
    #[must_use]
    pub fn sender(&self, identity: &Identity) -> Option<mpsc::Sender<Event>> {
        self.connections.get(identity).map(|handle| handle.events.clone())
    }

    /// Insert the connection built by `start` unless `identity` is taken
    ///
    /// `start` receives the new connection id and runs while the entry is
    /// reserved. Returns false, without calling `start`, if the identity is
    /// already present.
    pub fn insert_with<F>(&self, identity: Identity, start: F) -> bool
    where
        F: FnOnce(u64) -> (mpsc::Sender<Event>, JoinHandle<()>),
    {
        match self.connections.entry(identity) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let (events, task) = start(id);
                entry.insert(ConnectionHandle { id, events, task });
                true
            }
        }
    }

    /// Remove the entry for `identity` if it still belongs to connection `id`
    pub fn remove(&self, identity: &Identity, id: u64) -> bool {
        self.connections
            .remove_if(identity, |_, handle| handle.id == id)
            .is_some()
    }

    /// Every tracked identity
    #[must_use]
    pub fn identities(&self) -> Vec<Identity> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }

    /// Abort and forget every connection, returning how many there were
    pub fn abort_all(&self) -> usize {
        let mut aborted = 0;
        for identity in self.identities() {
            if let Some((_, handle)) = self.connections.remove(&identity) {
                handle.task.abort();
                aborted += 1;
            }
        }
        aborted
    }
}
