//! Per-component mailbox.
//!
//! A [`Mailbox`] is owned by exactly one component; any number of other
//! components may hold a cloned [`MailboxHandle`] to push envelopes into it.
//! The queue is unbounded, so [`MailboxHandle::deliver`] never waits on the
//! receiver, and envelopes from one sender are always received in the order
//! they were delivered.
//!
//! Built on [`tokio::sync::mpsc::unbounded_channel`].

use courier_types::{CourierError, Envelope};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The receiving end, held by the owning component.
#[derive(Debug)]
pub struct Mailbox {
    owner: String,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

/// The sending end.  Cheap to clone; every clone feeds the same queue.
#[derive(Debug, Clone)]
pub struct MailboxHandle {
    owner: String,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl Mailbox {
    /// Create a mailbox for `owner`, returning it together with its first
    /// send handle.
    pub fn new(owner: impl Into<String>) -> (Self, MailboxHandle) {
        let owner = owner.into();
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Mailbox {
                owner: owner.clone(),
                rx,
            },
            MailboxHandle { owner, tx },
        )
    }

    /// Name of the component this mailbox belongs to.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Wait until an envelope is available and return the oldest one.
    ///
    /// Returns `None` only once every [`MailboxHandle`] has been dropped.
    /// While the mailbox is registered in a
    /// [`ComponentRegistry`][crate::ComponentRegistry] a handle is always
    /// alive, so this waits indefinitely; use [`Mailbox::receive_until`] when
    /// the caller must be stoppable.
    pub async fn receive(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Like [`Mailbox::receive`], but gives up and returns `None` as soon as
    /// `cancel` fires.
    pub async fn receive_until(&mut self, cancel: &CancellationToken) -> Option<Envelope> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            envelope = self.rx.recv() => envelope,
        }
    }

    /// Blocking receive for components running on a plain OS thread.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context.
    pub fn blocking_receive(&mut self) -> Option<Envelope> {
        self.rx.blocking_recv()
    }

    /// Take every envelope that is already queued without waiting.
    pub fn try_drain(&mut self) -> Vec<Envelope> {
        let mut items = Vec::new();
        while let Ok(envelope) = self.rx.try_recv() {
            items.push(envelope);
        }
        items
    }
}

impl MailboxHandle {
    /// Name of the component whose mailbox this handle feeds.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Enqueue `envelope`.
    ///
    /// Fails with [`CourierError::MailboxClosed`] if the owning component has
    /// dropped its [`Mailbox`].
    pub fn deliver(&self, envelope: Envelope) -> Result<(), CourierError> {
        self.tx
            .send(envelope)
            .map_err(|_| CourierError::MailboxClosed(self.owner.clone()))
    }

    /// `true` once the owning [`Mailbox`] has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
