//! `courier-runtime` – decides what to do with each message.
//!
//! # Modules
//!
//! - [`dispatch`] – [`DispatchEngine`][dispatch::DispatchEngine]: matches
//!   lower-cased text against an ordered [`RuleSet`][dispatch::RuleSet] of
//!   prefix-anchored patterns and resolves the winning rule to a fixed or
//!   computed reply.
//! - [`responders`] – the built-in reply handlers (outbound IP, location
//!   lookup, system status, text-driven location updates) and
//!   [`standard_rules`][responders::standard_rules], the bot's default rule
//!   set.
//! - [`orchestrator`] – [`Orchestrator`][orchestrator::Orchestrator]: owns the
//!   main mailbox, starts worker components, and routes each envelope to the
//!   location tracker or the dispatch engine.
//! - [`console`] – [`ConsoleComponent`][console::ConsoleComponent]: a
//!   terminal adapter for talking to the bot locally.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber with optional OTLP export.

pub mod console;
pub mod dispatch;
pub mod orchestrator;
pub mod responders;
pub mod telemetry;

pub use console::{CONSOLE, ConsoleComponent};
pub use dispatch::{Action, DEFAULT_REPLY, DispatchEngine, MatchPolicy, ReplyHandler, Rule, RuleSet};
pub use orchestrator::{MAIN, Orchestrator, OrchestratorConfig};
pub use responders::{ResponderSettings, standard_rules};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
