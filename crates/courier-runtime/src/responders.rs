//! Built-in reply handlers and the standard rule set.
//!
//! | Pattern | Reply |
//! |---|---|
//! | `ip`, `what.* ip .*`, `what.*address.*` | [`OutboundIp`] |
//! | `ping` | `Pong.` |
//! | `.*good morning.*` (and afternoon / evening / night) | matching greeting |
//! | `thank.*` | `You're welcome.` |
//! | `test` | `I am up and running.` |
//! | `locationupdate .*` | [`TextLocationUpdate`] (no reply) |
//! | `locate` | [`Locate`] |
//! | `syscond` | [`SystemStatus`] |

use std::net::UdpSocket;
use std::process::Command;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use courier_memory::LocationTracker;
use courier_types::{CourierError, LocationEvent, LocationRecord};
use tracing::warn;

use crate::dispatch::{ReplyHandler, RuleSet};

/// Settings for the handlers in [`standard_rules`].
#[derive(Debug, Clone)]
pub struct ResponderSettings {
    /// User the location history is kept for.
    pub tracked_user: String,
    /// Remote address used to discover the outbound interface.
    pub ip_probe_addr: String,
    /// Program and arguments printing the system status.
    pub status_command: Vec<String>,
}

impl Default for ResponderSettings {
    fn default() -> Self {
        Self {
            tracked_user: "Enfors".to_string(),
            ip_probe_addr: "gmail.com:80".to_string(),
            status_command: vec![
                "syscond".to_string(),
                "status".to_string(),
                "-n".to_string(),
            ],
        }
    }
}

/// The bot's standard rule set, in evaluation order.
pub fn standard_rules(
    tracker: Arc<LocationTracker>,
    settings: &ResponderSettings,
) -> Result<RuleSet, CourierError> {
    let ip: Arc<dyn ReplyHandler> = Arc::new(OutboundIp::new(settings.ip_probe_addr.clone()));

    let mut rules = RuleSet::new();
    rules
        .add_handler("ip", ip.clone())?
        .add_handler("what.* ip .*", ip.clone())?
        .add_handler("what.*address.*", ip)?
        .add_reply("ping", "Pong.")?
        .add_reply(".*good morning.*", "Good morning!")?
        .add_reply(".*good afternoon.*", "Good afternoon!")?
        .add_reply(".*good evening.*", "Good evening!")?
        .add_reply(".*good night.*", "Good night!")?
        .add_reply("thank.*", "You're welcome.")?
        .add_reply("test", "I am up and running.")?
        .add_handler(
            "locationupdate .*",
            Arc::new(TextLocationUpdate::new(
                tracker.clone(),
                settings.tracked_user.clone(),
            )),
        )?
        .add_handler("locate", Arc::new(Locate::new(tracker)))?
        .add_handler(
            "syscond",
            Arc::new(SystemStatus::new(settings.status_command.clone())),
        )?;
    Ok(rules)
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound IP
// ─────────────────────────────────────────────────────────────────────────────

/// Reports the local address of the interface used to reach `probe_addr`.
///
/// Connecting a UDP socket sends no packets; it only makes the OS pick a
/// route, which is enough to learn the local address.
#[derive(Debug, Clone)]
pub struct OutboundIp {
    probe_addr: String,
}

impl OutboundIp {
    pub fn new(probe_addr: impl Into<String>) -> Self {
        Self {
            probe_addr: probe_addr.into(),
        }
    }

    fn lookup(&self) -> std::io::Result<std::net::IpAddr> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(&self.probe_addr)?;
        Ok(socket.local_addr()?.ip())
    }
}

impl ReplyHandler for OutboundIp {
    fn reply(&self, _text: &str) -> Option<String> {
        match self.lookup() {
            Ok(ip) => Some(format!("I'm currently running on IP address {ip}.")),
            Err(e) => {
                warn!(probe = %self.probe_addr, error = %e, "outbound IP lookup failed");
                Some("I couldn't work out my IP address right now.".to_string())
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Location
// ─────────────────────────────────────────────────────────────────────────────

/// Answers with the most recent location record.
pub struct Locate {
    tracker: Arc<LocationTracker>,
}

impl Locate {
    pub fn new(tracker: Arc<LocationTracker>) -> Self {
        Self { tracker }
    }
}

impl ReplyHandler for Locate {
    fn reply(&self, _text: &str) -> Option<String> {
        match self.tracker.most_recent_event() {
            Ok(record) => Some(describe_record(&record, Utc::now())),
            Err(CourierError::NoHistory) => {
                Some("Their whereabouts are currently unknown.".to_string())
            }
            Err(e) => {
                warn!(error = %e, "location lookup failed");
                Some("I can't look up the location history right now.".to_string())
            }
        }
    }
}

/// Applies `locationupdate <arrived|left> <location>` commands typed as
/// text.  Never replies.
pub struct TextLocationUpdate {
    tracker: Arc<LocationTracker>,
    user: String,
}

impl TextLocationUpdate {
    pub fn new(tracker: Arc<LocationTracker>, user: impl Into<String>) -> Self {
        Self {
            tracker,
            user: user.into(),
        }
    }
}

/// Split `locationupdate <event> <location>`; the location keeps its case.
fn parse_location_command(text: &str) -> Option<(bool, &str)> {
    let mut parts = text.trim().splitn(3, char::is_whitespace);
    let _command = parts.next()?;
    let arrived = match parts.next()?.to_lowercase().as_str() {
        "arrived" | "arrive" => true,
        "left" | "leave" => false,
        _ => return None,
    };
    let location = parts.next()?.trim();
    (!location.is_empty()).then_some((arrived, location))
}

impl ReplyHandler for TextLocationUpdate {
    fn reply(&self, text: &str) -> Option<String> {
        match parse_location_command(text) {
            Some((arrived, location)) => {
                if let Err(e) = self.tracker.handle_update(&self.user, location, arrived) {
                    warn!(error = %e, "text location update failed");
                }
            }
            None => warn!(text, "unparseable location update"),
        }
        None
    }
}

/// `"<user> arrived at <location> <elapsed>."` or
/// `"<user> left <location> <elapsed>."`.
pub fn describe_record(record: &LocationRecord, now: DateTime<Utc>) -> String {
    let elapsed = describe_elapsed(record.timestamp, now);
    match record.event {
        LocationEvent::Arrived => format!(
            "{} arrived at {} {}.",
            record.user, record.location, elapsed
        ),
        LocationEvent::Left => format!("{} left {} {}.", record.user, record.location, elapsed),
    }
}

/// Coarse, human-readable age of `then` relative to `now`.
pub fn describe_elapsed(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    if then > now {
        return "in the future".to_string();
    }
    let total_minutes = (now - then).num_minutes();
    let days = total_minutes / (60 * 24);
    let hours = total_minutes / 60;
    let minutes = total_minutes;

    if days > 0 {
        let hours = hours - days * 24;
        format!(
            "{days} {}, {hours} {} ago",
            plural("day", days),
            plural("hour", hours)
        )
    } else if hours > 0 {
        let minutes = minutes - hours * 60;
        format!(
            "{hours} {}, {minutes} {} ago",
            plural("hour", hours),
            plural("minute", minutes)
        )
    } else if minutes > 0 {
        format!("{minutes} {} ago", plural("minute", minutes))
    } else {
        "just now".to_string()
    }
}

fn plural(word: &str, n: i64) -> String {
    if n == 1 {
        word.to_string()
    } else {
        format!("{word}s")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// System status
// ─────────────────────────────────────────────────────────────────────────────

/// Runs a status command and replies with its standard output.
#[derive(Debug, Clone)]
pub struct SystemStatus {
    command: Vec<String>,
}

impl SystemStatus {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl ReplyHandler for SystemStatus {
    fn reply(&self, _text: &str) -> Option<String> {
        let Some((program, args)) = self.command.split_first() else {
            return Some("No status command is configured.".to_string());
        };
        match Command::new(program).args(args).output() {
            Ok(output) => Some(String::from_utf8_lossy(&output.stdout).into_owned()),
            Err(e) => {
                warn!(program = %program, error = %e, "status command failed");
                Some(format!("Couldn't run `{program}`."))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DEFAULT_REPLY, DispatchEngine};
    use chrono::{Duration, TimeZone};
    use courier_memory::MemoryLocationLog;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 3, 1, h, m, 0).unwrap()
    }

    fn tracker() -> Arc<LocationTracker> {
        Arc::new(LocationTracker::new(Box::new(MemoryLocationLog::new())))
    }

    fn settings() -> ResponderSettings {
        ResponderSettings {
            tracked_user: "Enfors".to_string(),
            ip_probe_addr: "127.0.0.1:9".to_string(),
            status_command: vec!["echo".to_string(), "all systems nominal".to_string()],
        }
    }

    #[test]
    fn elapsed_just_now() {
        assert_eq!(describe_elapsed(at(8, 0), at(8, 0)), "just now");
        let then = at(8, 0);
        assert_eq!(describe_elapsed(then, then + Duration::seconds(59)), "just now");
    }

    #[test]
    fn elapsed_minutes() {
        assert_eq!(describe_elapsed(at(8, 0), at(8, 1)), "1 minute ago");
        assert_eq!(describe_elapsed(at(8, 0), at(8, 45)), "45 minutes ago");
    }

    #[test]
    fn elapsed_hours_and_minutes() {
        assert_eq!(describe_elapsed(at(8, 0), at(9, 0)), "1 hour, 0 minutes ago");
        assert_eq!(describe_elapsed(at(8, 0), at(10, 1)), "2 hours, 1 minute ago");
    }

    #[test]
    fn elapsed_days_and_hours() {
        let then = at(8, 0);
        assert_eq!(
            describe_elapsed(then, then + Duration::hours(25)),
            "1 day, 1 hour ago"
        );
        assert_eq!(
            describe_elapsed(then, then + Duration::days(3) + Duration::minutes(30)),
            "3 days, 0 hours ago"
        );
    }

    #[test]
    fn elapsed_in_the_future() {
        assert_eq!(describe_elapsed(at(9, 0), at(8, 0)), "in the future");
    }

    #[test]
    fn record_description_depends_on_event() {
        let mut record = LocationRecord {
            user: "Enfors".to_string(),
            location: "Home".to_string(),
            event: LocationEvent::Arrived,
            timestamp: at(8, 0),
        };
        assert_eq!(
            describe_record(&record, at(8, 5)),
            "Enfors arrived at Home 5 minutes ago."
        );
        record.event = LocationEvent::Left;
        assert_eq!(describe_record(&record, at(8, 0)), "Enfors left Home just now.");
    }

    #[test]
    fn location_command_parsing() {
        assert_eq!(
            parse_location_command("LocationUpdate arrived Central Station"),
            Some((true, "Central Station"))
        );
        assert_eq!(parse_location_command("locationupdate left Work"), Some((false, "Work")));
        assert_eq!(parse_location_command("locationupdate wandered Work"), None);
        assert_eq!(parse_location_command("locationupdate arrived "), None);
    }

    #[test]
    fn standard_rules_answer_ping_and_greetings() {
        let engine = DispatchEngine::new(standard_rules(tracker(), &settings()).unwrap());
        assert_eq!(engine.dispatch("Ping").as_deref(), Some("Pong."));
        assert_eq!(engine.dispatch("Good evening, bot").as_deref(), Some("Good evening!"));
        assert_eq!(engine.dispatch("thanks!").as_deref(), Some("You're welcome."));
        assert_eq!(engine.dispatch("test").as_deref(), Some("I am up and running."));
        assert_eq!(engine.dispatch("who are you").as_deref(), Some(DEFAULT_REPLY));
    }

    #[test]
    fn locate_without_history_says_unknown() {
        let engine = DispatchEngine::new(standard_rules(tracker(), &settings()).unwrap());
        let reply = engine.dispatch("Locate").unwrap();
        assert!(reply.contains("unknown"), "got {reply}");
    }

    #[test]
    fn text_update_then_locate() {
        let t = tracker();
        let engine = DispatchEngine::new(standard_rules(t.clone(), &settings()).unwrap());

        assert_eq!(engine.dispatch("LocationUpdate arrived Home"), None);
        assert_eq!(t.history().unwrap().len(), 1);
        assert!(t.state().is_present);

        let reply = engine.dispatch("locate").unwrap();
        assert_eq!(reply, "Enfors arrived at Home just now.");
    }

    #[test]
    fn ip_rules_report_an_address() {
        let engine = DispatchEngine::new(standard_rules(tracker(), &settings()).unwrap());
        let reply = engine.dispatch("What is your IP address?").unwrap();
        assert!(reply.contains("IP address"), "got {reply}");
    }

    #[cfg(unix)]
    #[test]
    fn syscond_runs_the_configured_command() {
        let engine = DispatchEngine::new(standard_rules(tracker(), &settings()).unwrap());
        let reply = engine.dispatch("syscond").unwrap();
        assert_eq!(reply.trim(), "all systems nominal");
    }

    #[test]
    fn missing_status_program_is_reported() {
        let handler = SystemStatus::new(vec!["definitely-not-a-real-program-xyz".to_string()]);
        let reply = handler.reply("syscond").unwrap();
        assert!(reply.contains("definitely-not-a-real-program-xyz"));
    }

    #[test]
    fn empty_status_command_is_reported() {
        let handler = SystemStatus::new(Vec::new());
        assert!(handler.reply("syscond").unwrap().contains("No status command"));
    }
}
