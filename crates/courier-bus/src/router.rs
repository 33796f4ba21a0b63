//! Reply routing.
//!
//! Incoming user messages do not always get answered by the component that
//! produced them: a stream listener may only be able to read, so its replies
//! have to go out through a separate REST client.  The [`RoutingTable`]
//! records, for every originator, which component sends the answer.
//!
//! | Originator | Responder |
//! |---|---|
//! | `TwitterStreams` | `TwitterRest` |
//! | `Telegram` | `Telegram` |

use std::collections::BTreeMap;

use courier_types::CourierError;
use serde::{Deserialize, Serialize};

use crate::registry::ComponentRegistry;

/// Static originator → responder mapping, loaded once at start-up.
///
/// Serializes as a plain table, e.g. in TOML:
///
/// ```toml
/// [routes]
/// TwitterStreams = "TwitterRest"
/// Telegram = "Telegram"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingTable(BTreeMap<String, String>);

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the responder for `originator`.
    pub fn with_route(mut self, originator: impl Into<String>, responder: impl Into<String>) -> Self {
        self.0.insert(originator.into(), responder.into());
        self
    }

    pub fn insert(&mut self, originator: impl Into<String>, responder: impl Into<String>) {
        self.0.insert(originator.into(), responder.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(originator, responder)` pairs in originator order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Resolves the responder for a message originator.
#[derive(Debug, Clone, Default)]
pub struct Router {
    table: RoutingTable,
}

impl Router {
    pub fn new(table: RoutingTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Name of the component that should receive replies to messages from
    /// `sender`.
    ///
    /// Fails with [`CourierError::UnroutableSender`] when `sender` has no
    /// entry.
    pub fn resolve_responder(&self, sender: &str) -> Result<&str, CourierError> {
        self.table
            .0
            .get(sender)
            .map(String::as_str)
            .ok_or_else(|| CourierError::UnroutableSender(sender.to_string()))
    }

    /// Check that every responder named in the table is registered.
    ///
    /// Returns [`CourierError::UnknownComponent`] for the first responder
    /// (in originator order) that is missing from `registry`.
    pub fn validate(&self, registry: &ComponentRegistry) -> Result<(), CourierError> {
        for (_, responder) in self.table.iter() {
            if !registry.contains(responder) {
                return Err(CourierError::UnknownComponent(responder.to_string()));
            }
        }
        Ok(())
    }
}
