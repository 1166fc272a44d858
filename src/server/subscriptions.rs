//! Subscription bookkeeping
//!
//! Listener sets, per-client subscription records, and multicast slot
//! counters. All of this state is owned exclusively by the dispatch task,
//! so it needs no locking; the table enforces the reference-counting rule
//! that gives buffers their lifetime (a buffer lives exactly as long as its
//! listener set is non-empty).

use std::collections::{HashMap, HashSet};

use crate::proto::constants::{MAX_BUFFERS_PER_CLIENT, MAX_CLIENTS};
use crate::store::{LocalKey, RemoteKey};

/// Result of removing a listener from a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Removal {
    /// The key had no listener set at all
    Unknown,
    /// Listeners remain after the removal
    Remaining,
    /// The removed listener was the last one; the buffer should be freed
    Empty,
}

/// Everything one client has subscribed to, for bulk teardown
#[derive(Debug, Default)]
pub(crate) struct ClientRecord {
    pub local: HashSet<LocalKey>,
    pub remote: HashSet<RemoteKey>,
}

/// Listener and slot bookkeeping for one server
pub(crate) struct SubscriptionTable {
    local_listeners: HashMap<LocalKey, HashSet<u8>>,
    remote_listeners: HashMap<RemoteKey, HashSet<u8>>,
    clients: HashMap<u8, ClientRecord>,
    /// Multicast slots consumed per client
    slots: [u8; MAX_CLIENTS as usize],
}

impl SubscriptionTable {
    pub(crate) fn new() -> Self {
        Self {
            local_listeners: HashMap::new(),
            remote_listeners: HashMap::new(),
            clients: HashMap::new(),
            slots: [0; MAX_CLIENTS as usize],
        }
    }

    /// Record a client's interest in a local buffer
    pub(crate) fn add_local(&mut self, key: &LocalKey, client_id: u8) {
        self.local_listeners
            .entry(key.clone())
            .or_default()
            .insert(client_id);
        self.clients
            .entry(client_id)
            .or_default()
            .local
            .insert(key.clone());
    }

    /// Record a client's interest in a remote buffer
    pub(crate) fn add_remote(&mut self, key: &RemoteKey, client_id: u8) {
        self.remote_listeners
            .entry(key.clone())
            .or_default()
            .insert(client_id);
        self.clients
            .entry(client_id)
            .or_default()
            .remote
            .insert(key.clone());
    }

    /// Drop a client's interest in a local buffer
    pub(crate) fn remove_local(&mut self, key: &LocalKey, client_id: u8) -> Removal {
        if let Some(record) = self.clients.get_mut(&client_id) {
            record.local.remove(key);
        }
        let Some(listeners) = self.local_listeners.get_mut(key) else {
            return Removal::Unknown;
        };
        listeners.remove(&client_id);
        if listeners.is_empty() {
            self.local_listeners.remove(key);
            Removal::Empty
        } else {
            Removal::Remaining
        }
    }

    /// Drop a client's interest in a remote buffer
    pub(crate) fn remove_remote(&mut self, key: &RemoteKey, client_id: u8) -> Removal {
        if let Some(record) = self.clients.get_mut(&client_id) {
            record.remote.remove(key);
        }
        let Some(listeners) = self.remote_listeners.get_mut(key) else {
            return Removal::Unknown;
        };
        listeners.remove(&client_id);
        if listeners.is_empty() {
            self.remote_listeners.remove(key);
            Removal::Empty
        } else {
            Removal::Remaining
        }
    }

    /// Take a client's whole subscription record and reset its slots
    pub(crate) fn take_client(&mut self, client_id: u8) -> ClientRecord {
        self.slots[client_id as usize % MAX_CLIENTS as usize] = 0;
        self.clients.remove(&client_id).unwrap_or_default()
    }

    /// Next free multicast slot for a client, without consuming it
    pub(crate) fn available_slot(&self, client_id: u8) -> Option<u8> {
        let used = self.slots[client_id as usize % MAX_CLIENTS as usize];
        (used < MAX_BUFFERS_PER_CLIENT).then_some(used)
    }

    /// Consume the slot returned by [`available_slot`]
    pub(crate) fn take_slot(&mut self, client_id: u8) {
        self.slots[client_id as usize % MAX_CLIENTS as usize] += 1;
    }

    #[cfg(test)]
    pub(crate) fn local_listener_count(&self, key: &LocalKey) -> usize {
        self.local_listeners.get(key).map_or(0, HashSet::len)
    }

    #[cfg(test)]
    pub(crate) fn remote_listener_count(&self, key: &RemoteKey) -> usize {
        self.remote_listeners.get(key).map_or(0, HashSet::len)
    }
}
