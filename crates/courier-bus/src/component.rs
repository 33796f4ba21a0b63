//! The worker component pattern.
//!
//! The core never speaks to Telegram, Twitter, or a GPS feed directly.  Each
//! of those is a [`Component`]: it owns a mailbox, translates its external
//! events into [`Envelope`]s for the orchestrator, and delivers whatever the
//! orchestrator sends back to it.
//!
//! # Contract
//!
//! * `name` – the unique name the component registers under.  It is also the
//!   `sender` of every envelope the component produces, and therefore the key
//!   the [`Router`][crate::Router] looks up.
//! * `run` – the component's main loop.  It must return promptly once
//!   [`ComponentContext::cancel`] fires.

use async_trait::async_trait;
use courier_types::{CourierError, Envelope, Message};
use tokio_util::sync::CancellationToken;

use crate::mailbox::Mailbox;
use crate::registry::ComponentRegistry;

/// Every worker started by the orchestrator implements this trait.
#[async_trait]
pub trait Component: Send {
    /// Unique name the component registers under.
    fn name(&self) -> &str;

    /// Run until cancelled or until the external source is exhausted.
    async fn run(self: Box<Self>, ctx: ComponentContext) -> Result<(), CourierError>;
}

/// Everything a running component needs to take part in the bus.
pub struct ComponentContext {
    name: String,
    /// The component's own mailbox.
    pub mailbox: Mailbox,
    /// Shared registry, for sending to other components.
    pub registry: ComponentRegistry,
    /// Fires when the process is shutting down.
    pub cancel: CancellationToken,
}

impl ComponentContext {
    pub fn new(
        name: impl Into<String>,
        mailbox: Mailbox,
        registry: ComponentRegistry,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name: name.into(),
            mailbox,
            registry,
            cancel,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wrap `message` in an envelope from this component and send it to
    /// `target`.
    pub fn send(&self, target: &str, message: Message) -> Result<(), CourierError> {
        self.registry.send(target, Envelope::new(self.name.clone(), message))
    }

    /// Forward an envelope that was built elsewhere (e.g. decoded from an
    /// external protocol) to `target` unchanged.
    pub fn forward(&self, target: &str, envelope: Envelope) -> Result<(), CourierError> {
        self.registry.send(target, envelope)
    }

    /// Wait for the next envelope addressed to this component, or `None`
    /// once shutdown has been requested.
    pub async fn receive(&mut self) -> Option<Envelope> {
        self.mailbox.receive_until(&self.cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Component for Echo {
        fn name(&self) -> &str {
            "Echo"
        }

        async fn run(self: Box<Self>, mut ctx: ComponentContext) -> Result<(), CourierError> {
            while let Some(envelope) = ctx.receive().await {
                ctx.send(envelope.sender(), envelope.message().clone())?;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn component_replies_through_its_context() {
        let registry = ComponentRegistry::new();
        let mut main = registry.open_mailbox("Main").unwrap();
        let echo_box = registry.open_mailbox("Echo").unwrap();
        let cancel = CancellationToken::new();

        let component: Box<dyn Component> = Box::new(Echo);
        let name = component.name().to_string();
        let ctx = ComponentContext::new(name, echo_box, registry.clone(), cancel.clone());
        let task = tokio::spawn(component.run(ctx));

        registry
            .send("Echo", Envelope::new("Main", Message::user_message("x", "hi")))
            .unwrap();
        let reply = main.receive().await.unwrap();
        assert_eq!(reply.sender(), "Echo");
        assert_eq!(reply.message(), &Message::user_message("x", "hi"));

        cancel.cancel();
        task.await.unwrap().unwrap();
    }
}
