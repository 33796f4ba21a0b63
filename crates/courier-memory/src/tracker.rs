//! [`LocationTracker`] – arrival/departure state machine.
//!
//! Location feeds report movement as two notifications: "left A" and
//! "arrived at B".  They do not always arrive in that order; the departure
//! from A frequently shows up *after* the arrival at B.  Applied naively, that
//! late departure would mark the user as absent even though they just
//! arrived somewhere.
//!
//! The tracker therefore applies these rules:
//!
//! * An arrival is always accepted.  It becomes the current location and the
//!   user is marked present.
//! * A departure is accepted only if the user is not currently present, or
//!   if it is a departure from the current location.  Any other departure is
//!   stale and is dropped without touching the state or the history.
//!
//! State and log are guarded by one lock.  The log append happens before the
//! state is committed, so a failed append leaves the state exactly as it was.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use courier_types::{CourierError, LocationEvent, LocationRecord};
use tracing::{debug, info};

use crate::log::LocationLog;

/// The current whereabouts, as of the last accepted event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationState {
    /// Last location the user arrived at (kept after departure).
    pub current_location: Option<String>,
    /// `true` if the last accepted event was an arrival.
    pub is_present: bool,
}

/// Result of feeding one update into the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The update was applied and this record appended to the history.
    Accepted(LocationRecord),
    /// The update was a stale departure and was ignored.
    Discarded,
}

struct TrackerInner {
    state: LocationState,
    log: Box<dyn LocationLog>,
}

/// Thread-safe location state machine over a [`LocationLog`].
///
/// # Example
///
/// ```
/// use courier_memory::{LocationTracker, MemoryLocationLog, UpdateOutcome};
///
/// let tracker = LocationTracker::new(Box::new(MemoryLocationLog::new()));
/// tracker.handle_update("Enfors", "Home", true).unwrap();
///
/// // A late departure from somewhere else is ignored.
/// let outcome = tracker.handle_update("Enfors", "Work", false).unwrap();
/// assert_eq!(outcome, UpdateOutcome::Discarded);
/// assert!(tracker.state().is_present);
/// ```
pub struct LocationTracker {
    inner: Mutex<TrackerInner>,
}

impl LocationTracker {
    /// Start with an unknown location, regardless of what `log` contains.
    pub fn new(log: Box<dyn LocationLog>) -> Self {
        Self {
            inner: Mutex::new(TrackerInner {
                state: LocationState::default(),
                log,
            }),
        }
    }

    /// Start from the most recent record already in `log`, so a restarted
    /// process keeps deduplicating against the last known location.
    pub fn restore(log: Box<dyn LocationLog>) -> Result<Self, CourierError> {
        let last = log.most_recent().map_err(persistence)?;
        let state = match last {
            Some(record) => {
                info!(
                    location = %record.location,
                    event = %record.event,
                    "restored location state from history"
                );
                LocationState {
                    current_location: Some(record.location),
                    is_present: record.event == LocationEvent::Arrived,
                }
            }
            None => LocationState::default(),
        };
        Ok(Self {
            inner: Mutex::new(TrackerInner { state, log }),
        })
    }

    /// Apply an arrival (`arrived == true`) or departure at the current time.
    pub fn handle_update(
        &self,
        user: &str,
        location: &str,
        arrived: bool,
    ) -> Result<UpdateOutcome, CourierError> {
        self.handle_update_at(user, location, arrived, Utc::now())
    }

    /// Apply an update stamped with `now`.
    pub fn handle_update_at(
        &self,
        user: &str,
        location: &str,
        arrived: bool,
        now: DateTime<Utc>,
    ) -> Result<UpdateOutcome, CourierError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let (event, next) = if arrived {
            (
                LocationEvent::Arrived,
                LocationState {
                    current_location: Some(location.to_string()),
                    is_present: true,
                },
            )
        } else {
            let at_current = inner.state.current_location.as_deref() == Some(location);
            if inner.state.is_present && !at_current {
                debug!(
                    location,
                    current = ?inner.state.current_location,
                    "discarding stale departure"
                );
                return Ok(UpdateOutcome::Discarded);
            }
            (
                LocationEvent::Left,
                LocationState {
                    current_location: inner.state.current_location.clone(),
                    is_present: false,
                },
            )
        };

        let record = LocationRecord {
            user: user.to_string(),
            location: location.to_string(),
            event,
            timestamp: now,
        };
        inner.log.append(&record).map_err(persistence)?;
        inner.state = next;

        info!(user, location, event = %event, "location updated");
        Ok(UpdateOutcome::Accepted(record))
    }

    /// The last record in the history.
    ///
    /// Fails with [`CourierError::NoHistory`] when nothing has been logged.
    pub fn most_recent_event(&self) -> Result<LocationRecord, CourierError> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .log
            .most_recent()
            .map_err(persistence)?
            .ok_or(CourierError::NoHistory)
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> LocationState {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
            .clone()
    }

    /// Full history in append order.
    pub fn history(&self) -> Result<Vec<LocationRecord>, CourierError> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.log.records().map_err(persistence)
    }
}

fn persistence(e: crate::log::LocationLogError) -> CourierError {
    CourierError::PersistenceFailure(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{LocationLogError, MemoryLocationLog, SqliteLocationLog};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn tracker() -> LocationTracker {
        LocationTracker::new(Box::new(MemoryLocationLog::new()))
    }

    fn present_at(location: &str) -> LocationState {
        LocationState {
            current_location: Some(location.to_string()),
            is_present: true,
        }
    }

    /// A log whose appends can be made to fail on demand.
    struct FlakyLog {
        inner: MemoryLocationLog,
        failing: Arc<AtomicBool>,
    }

    impl LocationLog for FlakyLog {
        fn append(&mut self, record: &LocationRecord) -> Result<(), LocationLogError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(LocationLogError::Corrupt("disk full".to_string()));
            }
            self.inner.append(record)
        }

        fn most_recent(&self) -> Result<Option<LocationRecord>, LocationLogError> {
            self.inner.most_recent()
        }

        fn records(&self) -> Result<Vec<LocationRecord>, LocationLogError> {
            self.inner.records()
        }
    }

    #[test]
    fn arrive_then_leave_same_place_records_both() {
        let t = tracker();
        t.handle_update("u", "Home", true).unwrap();
        let outcome = t.handle_update("u", "Home", false).unwrap();

        assert!(matches!(outcome, UpdateOutcome::Accepted(ref r) if r.event == LocationEvent::Left));
        assert_eq!(t.history().unwrap().len(), 2);
        assert!(!t.state().is_present);
    }

    #[test]
    fn stale_departure_is_discarded() {
        let t = tracker();
        t.handle_update("u", "Home", true).unwrap();
        let outcome = t.handle_update("u", "Work", false).unwrap();

        assert_eq!(outcome, UpdateOutcome::Discarded);
        assert_eq!(t.history().unwrap().len(), 1);
        assert_eq!(t.state(), present_at("Home"));
    }

    #[test]
    fn arrival_is_unconditional() {
        let t = tracker();
        t.handle_update("u", "Home", true).unwrap();
        t.handle_update("u", "Home", true).unwrap();
        t.handle_update("u", "Work", true).unwrap();

        assert_eq!(t.history().unwrap().len(), 3);
        assert_eq!(t.state(), present_at("Work"));
    }

    #[test]
    fn departure_while_absent_is_accepted() {
        let t = tracker();
        let outcome = t.handle_update("u", "Gym", false).unwrap();
        assert!(matches!(outcome, UpdateOutcome::Accepted(_)));
        assert!(!t.state().is_present);
        assert_eq!(t.state().current_location, None);

        t.handle_update("u", "Home", true).unwrap();
        t.handle_update("u", "Home", false).unwrap();
        // Already absent: a second departure from anywhere is logged.
        let outcome = t.handle_update("u", "Work", false).unwrap();
        assert!(matches!(outcome, UpdateOutcome::Accepted(_)));
        assert_eq!(t.history().unwrap().len(), 4);
    }

    #[test]
    fn out_of_order_movement_keeps_new_location() {
        let t = tracker();
        t.handle_update("u", "Home", true).unwrap();
        // Moving Home -> Work, but "arrived Work" beats "left Home".
        t.handle_update("u", "Work", true).unwrap();
        t.handle_update("u", "Home", false).unwrap();

        assert_eq!(t.state(), present_at("Work"));
        let last = t.most_recent_event().unwrap();
        assert_eq!(last.location, "Work");
        assert_eq!(last.event, LocationEvent::Arrived);
    }

    #[test]
    fn most_recent_event_on_empty_history_fails() {
        let t = tracker();
        assert_eq!(t.most_recent_event().unwrap_err(), CourierError::NoHistory);
    }

    #[test]
    fn failed_append_leaves_state_untouched() {
        let failing = Arc::new(AtomicBool::new(false));
        let t = LocationTracker::new(Box::new(FlakyLog {
            inner: MemoryLocationLog::new(),
            failing: failing.clone(),
        }));
        t.handle_update("u", "Home", true).unwrap();

        failing.store(true, Ordering::SeqCst);
        let err = t.handle_update("u", "Work", true).unwrap_err();
        assert!(matches!(err, CourierError::PersistenceFailure(_)));
        assert_eq!(t.state(), present_at("Home"));

        let err = t.handle_update("u", "Home", false).unwrap_err();
        assert!(matches!(err, CourierError::PersistenceFailure(_)));
        assert!(t.state().is_present);
        assert_eq!(t.history().unwrap().len(), 1);
    }

    #[test]
    fn restore_resumes_from_last_record() {
        let mut log = SqliteLocationLog::open_in_memory().unwrap();
        let seed = tracker();
        seed.handle_update("u", "Home", true).unwrap();
        for record in seed.history().unwrap() {
            log.append(&record).unwrap();
        }

        let t = LocationTracker::restore(Box::new(log)).unwrap();
        assert_eq!(t.state(), present_at("Home"));
        // Stale departure is still recognised after the restart.
        assert_eq!(
            t.handle_update("u", "Work", false).unwrap(),
            UpdateOutcome::Discarded
        );
    }

    #[test]
    fn restore_from_empty_log_is_unknown() {
        let t = LocationTracker::restore(Box::new(MemoryLocationLog::new())).unwrap();
        assert_eq!(t.state(), LocationState::default());
    }

    #[test]
    fn concurrent_updates_all_land_in_history() {
        let t = Arc::new(tracker());
        let workers: Vec<_> = (0..4)
            .map(|i| {
                let t = t.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        t.handle_update("u", &format!("Place{i}"), true).unwrap();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(t.history().unwrap().len(), 100);
        assert!(t.state().is_present);
    }
}
