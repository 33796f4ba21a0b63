//! [`DispatchEngine`] – pattern-matched reply selection.
//!
//! Incoming text is lower-cased and tested against an ordered [`RuleSet`].
//! Every pattern is anchored at the start of the text but need not consume
//! all of it, so `ping` matches `"ping?"` and `"pinging"` alike.
//!
//! # Match policy
//!
//! Under [`MatchPolicy::LastMatch`] (the default) the engine walks the whole
//! rule set and the *last* matching rule decides the reply.  Handlers of
//! every matching rule run, in order, even when a later rule overrides their
//! result.  [`MatchPolicy::FirstMatch`] stops at the first matching rule
//! instead.
//!
//! When no rule matches the engine answers with the default reply.  A handler
//! may decline to answer by returning `None`, in which case nothing is sent.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use courier_types::CourierError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Reply sent when no rule matches.
pub const DEFAULT_REPLY: &str = "I'm afraid I don't understand.";

// ─────────────────────────────────────────────────────────────────────────────
// Handlers and actions
// ─────────────────────────────────────────────────────────────────────────────

/// Computes a reply from the original (not lower-cased) message text.
///
/// Returning `None` means "send nothing".
pub trait ReplyHandler: Send + Sync {
    fn reply(&self, text: &str) -> Option<String>;
}

impl<F> ReplyHandler for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn reply(&self, text: &str) -> Option<String> {
        self(text)
    }
}

/// What a matching rule produces.
#[derive(Clone)]
pub enum Action {
    /// A fixed reply.
    Reply(String),
    /// A reply computed by a handler.
    Handler(Arc<dyn ReplyHandler>),
}

impl Action {
    fn resolve(&self, original: &str) -> Option<String> {
        match self {
            Action::Reply(text) => Some(text.clone()),
            Action::Handler(handler) => handler.reply(original),
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Reply(text) => f.debug_tuple("Reply").field(text).finish(),
            Action::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RuleSet
// ─────────────────────────────────────────────────────────────────────────────

/// A compiled pattern and the action it triggers.
#[derive(Debug, Clone)]
pub struct Rule {
    source: String,
    pattern: Regex,
    action: Action,
}

impl Rule {
    /// Compile `pattern` so that it only matches at the start of the text.
    pub fn new(pattern: &str, action: Action) -> Result<Self, CourierError> {
        let anchored = Regex::new(&format!("^(?:{pattern})")).map_err(|e| {
            CourierError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            source: pattern.to_string(),
            pattern: anchored,
            action,
        })
    }

    /// The pattern as written, before anchoring.
    pub fn pattern(&self) -> &str {
        &self.source
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn matches(&self, normalized: &str) -> bool {
        self.pattern.is_match(normalized)
    }
}

/// Ordered collection of [`Rule`]s.  Insertion order is evaluation order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, rule: Rule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    /// Append a rule answering `pattern` with fixed `reply` text.
    pub fn add_reply(
        &mut self,
        pattern: &str,
        reply: impl Into<String>,
    ) -> Result<&mut Self, CourierError> {
        let rule = Rule::new(pattern, Action::Reply(reply.into()))?;
        Ok(self.push(rule))
    }

    /// Append a rule answering `pattern` with whatever `handler` computes.
    pub fn add_handler(
        &mut self,
        pattern: &str,
        handler: Arc<dyn ReplyHandler>,
    ) -> Result<&mut Self, CourierError> {
        let rule = Rule::new(pattern, Action::Handler(handler))?;
        Ok(self.push(rule))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Match policy
// ─────────────────────────────────────────────────────────────────────────────

/// Which matching rule decides the reply when several match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Every match overwrites the previous one; the last match wins.
    #[default]
    LastMatch,
    /// Evaluation stops at the first match.
    FirstMatch,
}

impl FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last_match" | "last" => Ok(MatchPolicy::LastMatch),
            "first_match" | "first" => Ok(MatchPolicy::FirstMatch),
            other => Err(format!("unknown match policy `{other}`")),
        }
    }
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchPolicy::LastMatch => write!(f, "last_match"),
            MatchPolicy::FirstMatch => write!(f, "first_match"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DispatchEngine
// ─────────────────────────────────────────────────────────────────────────────

/// Picks the reply for a message.
///
/// # Example
///
/// ```
/// use courier_runtime::dispatch::{DispatchEngine, RuleSet, DEFAULT_REPLY};
///
/// let mut rules = RuleSet::new();
/// rules.add_reply("ping", "Pong.").unwrap();
/// let engine = DispatchEngine::new(rules);
///
/// assert_eq!(engine.dispatch("Ping").as_deref(), Some("Pong."));
/// assert_eq!(engine.dispatch("hello").as_deref(), Some(DEFAULT_REPLY));
/// ```
#[derive(Debug, Clone)]
pub struct DispatchEngine {
    rules: RuleSet,
    policy: MatchPolicy,
    default_reply: String,
}

impl DispatchEngine {
    /// Engine with [`MatchPolicy::LastMatch`] and [`DEFAULT_REPLY`].
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules,
            policy: MatchPolicy::default(),
            default_reply: DEFAULT_REPLY.to_string(),
        }
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_default_reply(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Reply to `text`, or `None` if the deciding handler declined to answer.
    pub fn dispatch(&self, text: &str) -> Option<String> {
        let normalized = text.to_lowercase();
        // Outer `None`: nothing matched yet.
        let mut candidate: Option<Option<String>> = None;

        for rule in self.rules.iter() {
            if !rule.matches(&normalized) {
                continue;
            }
            trace!(pattern = rule.pattern(), "rule matched");
            candidate = Some(rule.action().resolve(text));
            if self.policy == MatchPolicy::FirstMatch {
                break;
            }
        }

        candidate.unwrap_or_else(|| Some(self.default_reply.clone()))
    }
}
