//! [`Orchestrator`] – the main receive loop.
//!
//! Owns the orchestrator's own mailbox and starts every worker component.
//! Each turn of the loop takes one envelope and handles it to completion
//! before the next one is taken:
//!
//! | Kind | Handling |
//! |---|---|
//! | `THREAD_STARTED` | logged |
//! | `USER_MESSAGE` | responder resolved via the [`Router`], text run through the [`DispatchEngine`], reply (if any) sent to the responder |
//! | `LOCATION_UPDATE` | applied to the [`LocationTracker`]; no reply |
//!
//! An error while handling one envelope is logged and the envelope dropped;
//! it never stops the loop.

use std::sync::Arc;

use courier_bus::{Component, ComponentContext, ComponentRegistry, Mailbox, Router};
use courier_memory::{LocationTracker, UpdateOutcome};
use courier_types::{CourierError, Envelope, Message};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatch::DispatchEngine;

/// Default identity the orchestrator registers and sends replies under.
pub const MAIN: &str = "Main";

/// Configuration bundle for [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Name of the orchestrator's own mailbox and `sender` of its replies.
    pub identity: String,
    /// User location updates are recorded for.
    pub tracked_user: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            identity: MAIN.to_string(),
            tracked_user: "Enfors".to_string(),
        }
    }
}

/// The root component.
///
/// # Example
///
/// ```rust,no_run
/// # async fn demo() -> Result<(), courier_types::CourierError> {
/// use std::sync::Arc;
/// use courier_bus::{ComponentRegistry, Router, RoutingTable};
/// use courier_memory::{LocationTracker, MemoryLocationLog};
/// use courier_runtime::dispatch::{DispatchEngine, RuleSet};
/// use courier_runtime::orchestrator::{Orchestrator, OrchestratorConfig};
///
/// let tracker = Arc::new(LocationTracker::new(Box::new(MemoryLocationLog::new())));
/// let orchestrator = Orchestrator::new(
///     OrchestratorConfig::default(),
///     ComponentRegistry::new(),
///     Router::new(RoutingTable::new().with_route("Telegram", "Telegram")),
///     tracker,
///     DispatchEngine::new(RuleSet::new()),
/// )?;
/// orchestrator.run().await;
/// # Ok(())
/// # }
/// ```
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: ComponentRegistry,
    router: Router,
    tracker: Arc<LocationTracker>,
    engine: DispatchEngine,
    mailbox: Mailbox,
    cancel: CancellationToken,
    workers: JoinSet<()>,
}

impl Orchestrator {
    /// Register the orchestrator's mailbox under `config.identity`.
    ///
    /// # Errors
    ///
    /// [`CourierError::DuplicateComponent`] if the identity is already
    /// registered.
    pub fn new(
        config: OrchestratorConfig,
        registry: ComponentRegistry,
        router: Router,
        tracker: Arc<LocationTracker>,
        engine: DispatchEngine,
    ) -> Result<Self, CourierError> {
        let mailbox = registry.open_mailbox(&config.identity)?;
        Ok(Self {
            config,
            registry,
            router,
            tracker,
            engine,
            mailbox,
            cancel: CancellationToken::new(),
            workers: JoinSet::new(),
        })
    }

    pub fn identity(&self) -> &str {
        &self.config.identity
    }

    /// Shared registry handle (e.g. for components started elsewhere).
    pub fn registry(&self) -> ComponentRegistry {
        self.registry.clone()
    }

    /// Token that stops the loop and every spawned component when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn tracker(&self) -> Arc<LocationTracker> {
        Arc::clone(&self.tracker)
    }

    /// Check that every configured responder has been registered.
    pub fn validate_routes(&self) -> Result<(), CourierError> {
        self.router.validate(&self.registry)
    }

    /// Register `component`, announce it, and start it on its own task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`CourierError::DuplicateComponent`] if the component's name is taken.
    pub fn spawn_component(&mut self, component: Box<dyn Component>) -> Result<(), CourierError> {
        let name = component.name().to_string();
        let mailbox = self.registry.open_mailbox(&name)?;
        let ctx = ComponentContext::new(
            name.clone(),
            mailbox,
            self.registry.clone(),
            self.cancel.child_token(),
        );
        ctx.send(&self.config.identity, Message::ThreadStarted)?;

        self.workers.spawn(async move {
            match component.run(ctx).await {
                Ok(()) => debug!(component = %name, "component finished"),
                Err(e) => warn!(component = %name, error = %e, "component failed"),
            }
        });
        Ok(())
    }

    /// Receive and handle envelopes until cancelled, then stop and join all
    /// spawned components.
    pub async fn run(mut self) {
        info!(identity = %self.config.identity, "orchestrator running");
        while let Some(envelope) = self.mailbox.receive_until(&self.cancel).await {
            if let Err(e) = self.handle_envelope(&envelope) {
                warn!(
                    sender = envelope.sender(),
                    kind = %envelope.kind(),
                    error = %e,
                    "dropping envelope"
                );
            }
        }

        info!("orchestrator shutting down");
        self.cancel.cancel();
        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "component task panicked");
            }
        }
    }

    /// Handle a single envelope.
    pub fn handle_envelope(&self, envelope: &Envelope) -> Result<(), CourierError> {
        match envelope.message() {
            Message::ThreadStarted => {
                info!(component = envelope.sender(), "thread started");
                Ok(())
            }
            Message::UserMessage { user, text } => {
                self.handle_user_message(envelope.sender(), user, text)
            }
            Message::LocationUpdate { location, arrived } => {
                let outcome =
                    self.tracker
                        .handle_update(&self.config.tracked_user, location, *arrived)?;
                if outcome == UpdateOutcome::Discarded {
                    debug!(location = %location, "stale departure ignored");
                }
                Ok(())
            }
        }
    }

    fn handle_user_message(&self, sender: &str, user: &str, text: &str) -> Result<(), CourierError> {
        // Resolve first so an unroutable message triggers no handler.
        let responder = self.router.resolve_responder(sender)?;
        debug!(sender, user, responder, "user message");

        let Some(reply) = self.engine.dispatch(text) else {
            return Ok(());
        };
        self.registry.send(
            responder,
            Envelope::new(self.config.identity.clone(), Message::user_message(user, reply)),
        )
    }
}
