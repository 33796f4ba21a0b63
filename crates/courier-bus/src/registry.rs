//! [`ComponentRegistry`] – the shared table of running components.
//!
//! Maps a component name to a [`MailboxHandle`] for its mailbox.  Entries
//! are added while components start up and are never removed; components are
//! expected to live as long as the process.
//!
//! The registry is cloned into every component.  All clones share the same
//! table, and registration takes the write lock so two components can never
//! claim the same name.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use courier_types::{CourierError, Envelope};
use tracing::{debug, trace};

use crate::mailbox::{Mailbox, MailboxHandle};

/// Shared name → mailbox table.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    entries: Arc<RwLock<HashMap<String, MailboxHandle>>>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `handle` under `name`.
    ///
    /// Fails with [`CourierError::DuplicateComponent`] if `name` is taken;
    /// the existing entry is left in place.
    pub fn register(&self, name: &str, handle: MailboxHandle) -> Result<(), CourierError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(name) {
            return Err(CourierError::DuplicateComponent(name.to_string()));
        }
        entries.insert(name.to_string(), handle);
        debug!(component = name, "component registered");
        Ok(())
    }

    /// Create a mailbox for `name` and register its handle in one step.
    pub fn open_mailbox(&self, name: &str) -> Result<Mailbox, CourierError> {
        let (mailbox, handle) = Mailbox::new(name);
        self.register(name, handle)?;
        Ok(mailbox)
    }

    /// Enqueue `envelope` in the mailbox registered under `name`.
    pub fn send(&self, name: &str, envelope: Envelope) -> Result<(), CourierError> {
        let handle = self.handle(name)?;
        trace!(
            from = envelope.sender(),
            to = name,
            kind = %envelope.kind(),
            "routing envelope"
        );
        handle.deliver(envelope)
    }

    /// Clone of the send handle registered under `name`.
    pub fn handle(&self, name: &str) -> Result<MailboxHandle, CourierError> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| CourierError::UnknownComponent(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Names of all registered components, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
