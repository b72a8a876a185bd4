//! Status transition and notification debouncing engine.
//!
//! Given the previously persisted status of an entity and a fresh check
//! result, decides what to notify and what to persist. The same rule set
//! drives endpoint checks and the host liveness watchdog.

mod watchdog;

pub use watchdog::*;

use chrono::{DateTime, Utc};

use crate::db::{DbError, Endpoint, StatusEvent, Store};
use crate::notify::{self, Notifier};
use crate::probe::CheckOutcome;

/// Minimum seconds between two repeat-failure notifications for the
/// same entity. Shared by endpoints and hosts.
pub const NOTIFY_COOLDOWN_SECS: i64 = 3600;

/// The kind of notification a transition produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Down,
    Recovered,
}

/// Outcome of evaluating one transition: what to send, and the value
/// `last_notified_down_at` must take afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub notice: Option<Notice>,
    pub notified_down_at: Option<DateTime<Utc>>,
}

/// Evaluate the debounce rule for one transition.
///
/// `prev_failing` must come from the state persisted *before* this
/// check's result is applied, so an overlapping evaluation is detected
/// by the store-level guard rather than silently double-notified.
pub fn decide(
    prev_failing: bool,
    last_notified_down_at: Option<DateTime<Utc>>,
    new_failing: bool,
    now: DateTime<Utc>,
) -> Decision {
    match (prev_failing, new_failing) {
        // First failure after a healthy (or pending) state.
        (false, true) => Decision {
            notice: Some(Notice::Down),
            notified_down_at: Some(now),
        },
        // Still failing: re-notify only once the cooldown has elapsed.
        (true, true) => {
            let due = last_notified_down_at
                .map_or(true, |t| (now - t).num_seconds() > NOTIFY_COOLDOWN_SECS);
            if due {
                Decision {
                    notice: Some(Notice::Down),
                    notified_down_at: Some(now),
                }
            } else {
                Decision {
                    notice: None,
                    notified_down_at: last_notified_down_at,
                }
            }
        }
        // Recovery clears the notified marker unconditionally.
        (true, false) => Decision {
            notice: Some(Notice::Recovered),
            notified_down_at: None,
        },
        (false, false) => Decision {
            notice: None,
            notified_down_at: last_notified_down_at,
        },
    }
}

/// Apply one check result to an endpoint: append the status event,
/// advance the persisted status fields, and dispatch any notification.
///
/// The event is appended unconditionally (one per check). The status
/// update is guarded on the previously-read fields; if a concurrent
/// evaluation advanced them first, the notification is dropped so an
/// overlapping scheduler run cannot notify twice. Returns the notice
/// that was actually dispatched.
pub fn apply_outcome(
    store: &Store,
    notifier: &Notifier,
    endpoint: &Endpoint,
    outcome: &CheckOutcome,
    now: DateTime<Utc>,
) -> Result<Option<Notice>, DbError> {
    store.add_status_event(&StatusEvent {
        endpoint_id: endpoint.id.clone(),
        time: now,
        status: outcome.status,
        status_code: outcome.status_code,
        response_time_ms: outcome.response_time_ms,
    })?;

    let decision = decide(
        endpoint.last_status.is_failing(),
        endpoint.last_notified_down_at,
        outcome.status.is_failing(),
        now,
    );

    let won = store.apply_check_result(
        endpoint,
        outcome.status,
        outcome.status_code,
        outcome.response_time_ms,
        now,
        decision.notified_down_at,
    )?;
    if !won {
        tracing::debug!(
            "Endpoint {}: concurrent evaluation already applied, dropping notification",
            endpoint.name
        );
        return Ok(None);
    }

    if let Some(notice) = decision.notice {
        let text = match notice {
            Notice::Down => notify::endpoint_down_message(endpoint, outcome),
            Notice::Recovered => notify::endpoint_recovered_message(endpoint),
        };
        tracing::info!("Endpoint {}: {:?} -> {}", endpoint.name, notice, outcome.status);
        notifier.dispatch(text);
        return Ok(Some(notice));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CheckStatus;
    use std::sync::Arc;
    use chrono::Duration;
    use tempfile::NamedTempFile;

    fn outcome(status: CheckStatus, code: Option<u16>) -> CheckOutcome {
        CheckOutcome {
            status,
            status_code: code,
            response_time_ms: 5,
        }
    }

    #[test]
    fn test_first_failure_notifies() {
        let now = Utc::now();
        let decision = decide(false, None, true, now);
        assert_eq!(decision.notice, Some(Notice::Down));
        assert_eq!(decision.notified_down_at, Some(now));
    }

    #[test]
    fn test_repeat_failure_respects_cooldown() {
        let t0 = Utc::now();

        // Within the cooldown: silent, marker untouched.
        let at_30m = t0 + Duration::seconds(1800);
        let decision = decide(true, Some(t0), true, at_30m);
        assert_eq!(decision.notice, None);
        assert_eq!(decision.notified_down_at, Some(t0));

        // Exactly at the boundary still counts as within.
        let at_1h = t0 + Duration::seconds(NOTIFY_COOLDOWN_SECS);
        assert_eq!(decide(true, Some(t0), true, at_1h).notice, None);

        // Past the cooldown: notify again and refresh the marker.
        let at_3700 = t0 + Duration::seconds(3700);
        let decision = decide(true, Some(t0), true, at_3700);
        assert_eq!(decision.notice, Some(Notice::Down));
        assert_eq!(decision.notified_down_at, Some(at_3700));
    }

    #[test]
    fn test_repeat_failure_with_no_marker_notifies() {
        let now = Utc::now();
        let decision = decide(true, None, true, now);
        assert_eq!(decision.notice, Some(Notice::Down));
        assert_eq!(decision.notified_down_at, Some(now));
    }

    #[test]
    fn test_recovery_always_notifies_and_clears() {
        let now = Utc::now();
        // Regardless of how recently the down notice fired.
        let decision = decide(true, Some(now - Duration::seconds(10)), false, now);
        assert_eq!(decision.notice, Some(Notice::Recovered));
        assert_eq!(decision.notified_down_at, None);
    }

    #[test]
    fn test_healthy_stays_silent() {
        let now = Utc::now();
        let decision = decide(false, None, false, now);
        assert_eq!(decision.notice, None);
        assert_eq!(decision.notified_down_at, None);
    }

    #[tokio::test]
    async fn test_scenario_up_up_down() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let notifier = Notifier::new(Arc::new(store.clone()));
        let endpoint = store.add_endpoint("E", "https://e.test").unwrap();

        let t0 = Utc::now();
        let mut notices = Vec::new();
        for (i, (status, code)) in [
            (CheckStatus::Up, Some(200)),
            (CheckStatus::Up, Some(200)),
            (CheckStatus::Down, Some(500)),
        ]
        .into_iter()
        .enumerate()
        {
            let current = store.get_endpoint(&endpoint.id).unwrap();
            let sent = apply_outcome(
                &store,
                &notifier,
                &current,
                &outcome(status, code),
                t0 + Duration::seconds(i as i64),
            )
            .unwrap();
            notices.extend(sent);
        }

        // Exactly one down notification, three events, DOWN persisted.
        assert_eq!(notices, vec![Notice::Down]);
        let events = store
            .get_status_events_since(&endpoint.id, t0 - Duration::hours(1))
            .unwrap();
        assert_eq!(events.len(), 3);
        let final_state = store.get_endpoint(&endpoint.id).unwrap();
        assert_eq!(final_state.last_status, CheckStatus::Down);
        assert!(final_state.last_notified_down_at.is_some());
    }

    #[tokio::test]
    async fn test_scenario_cooldown_suppression() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let notifier = Notifier::new(Arc::new(store.clone()));
        let endpoint = store.add_endpoint("E", "https://e.test").unwrap();

        let t0 = Utc::now();
        let down = outcome(CheckStatus::Down, Some(500));

        let current = store.get_endpoint(&endpoint.id).unwrap();
        let first = apply_outcome(&store, &notifier, &current, &down, t0).unwrap();
        assert_eq!(first, Some(Notice::Down));

        // Still down 30 minutes later: suppressed.
        let current = store.get_endpoint(&endpoint.id).unwrap();
        let second =
            apply_outcome(&store, &notifier, &current, &down, t0 + Duration::seconds(1800))
                .unwrap();
        assert_eq!(second, None);
        assert_eq!(
            store.get_endpoint(&endpoint.id).unwrap().last_notified_down_at,
            Some(t0)
        );

        // Past the cooldown: fires again and refreshes the marker.
        let t_late = t0 + Duration::seconds(3700);
        let current = store.get_endpoint(&endpoint.id).unwrap();
        let third = apply_outcome(&store, &notifier, &current, &down, t_late).unwrap();
        assert_eq!(third, Some(Notice::Down));
        assert_eq!(
            store.get_endpoint(&endpoint.id).unwrap().last_notified_down_at,
            Some(t_late)
        );
    }

    #[tokio::test]
    async fn test_scenario_recovery() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let notifier = Notifier::new(Arc::new(store.clone()));
        let endpoint = store.add_endpoint("E", "https://e.test").unwrap();

        let t0 = Utc::now();
        let current = store.get_endpoint(&endpoint.id).unwrap();
        apply_outcome(&store, &notifier, &current, &outcome(CheckStatus::Down, Some(500)), t0)
            .unwrap();

        let current = store.get_endpoint(&endpoint.id).unwrap();
        let sent = apply_outcome(
            &store,
            &notifier,
            &current,
            &outcome(CheckStatus::Up, Some(200)),
            t0 + Duration::seconds(60),
        )
        .unwrap();

        assert_eq!(sent, Some(Notice::Recovered));
        let final_state = store.get_endpoint(&endpoint.id).unwrap();
        assert_eq!(final_state.last_status, CheckStatus::Up);
        assert_eq!(final_state.last_notified_down_at, None);
    }

    #[tokio::test]
    async fn test_concurrent_loser_drops_notification() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let notifier = Notifier::new(Arc::new(store.clone()));
        let endpoint = store.add_endpoint("E", "https://e.test").unwrap();

        // Two evaluations read the same pre-check state.
        let stale_view = store.get_endpoint(&endpoint.id).unwrap();
        let t0 = Utc::now();
        let down = outcome(CheckStatus::Down, Some(500));

        let first = apply_outcome(&store, &notifier, &stale_view, &down, t0).unwrap();
        assert_eq!(first, Some(Notice::Down));

        // The overlapping evaluation loses the guard and stays silent.
        let second = apply_outcome(
            &store,
            &notifier,
            &stale_view,
            &down,
            t0 + Duration::seconds(1),
        )
        .unwrap();
        assert_eq!(second, None);

        // Both checks still produced their event rows.
        let events = store
            .get_status_events_since(&endpoint.id, t0 - Duration::hours(1))
            .unwrap();
        assert_eq!(events.len(), 2);
    }
}
