//! `courier-bus` – the in-process message fabric.
//!
//! Moves [`Envelope`][courier_types::Envelope]s between independently
//! running components without caring about what they mean.
//!
//! # Modules
//!
//! - [`mailbox`] – [`Mailbox`] / [`MailboxHandle`]: a per-component,
//!   unbounded FIFO queue with blocking and cancellable receive.
//! - [`registry`] – [`ComponentRegistry`]: the shared name → mailbox table
//!   components register into at start-up.
//! - [`router`] – [`RoutingTable`] / [`Router`]: decides which component
//!   receives the reply to a given originator's message.
//! - [`component`] – the [`Component`] trait every worker implements, and the
//!   [`ComponentContext`] it is handed when started.

pub mod component;
pub mod mailbox;
pub mod registry;
pub mod router;

pub use component::{Component, ComponentContext};
pub use mailbox::{Mailbox, MailboxHandle};
pub use registry::ComponentRegistry;
pub use router::{Router, RoutingTable};
