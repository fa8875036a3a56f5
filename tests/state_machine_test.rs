use std::time::Duration;

use momo_gateway::tracker::RequestStatus;
use momo_gateway::workers::retry_scheduler::backoff_delay;

#[test]
fn pending_can_move_to_submitted_or_failed() {
    assert!(RequestStatus::Pending.can_transition_to(RequestStatus::Submitted));
    assert!(RequestStatus::Pending.can_transition_to(RequestStatus::Failed));
    assert!(!RequestStatus::Pending.can_transition_to(RequestStatus::Succeeded));
}

#[test]
fn submitted_can_only_settle() {
    assert!(RequestStatus::Submitted.can_transition_to(RequestStatus::Succeeded));
    assert!(RequestStatus::Submitted.can_transition_to(RequestStatus::Failed));
    assert!(!RequestStatus::Submitted.can_transition_to(RequestStatus::Pending));
}

#[test]
fn terminal_states_admit_no_transitions() {
    for terminal in [RequestStatus::Succeeded, RequestStatus::Failed] {
        assert!(terminal.is_terminal());
        for next in [
            RequestStatus::Pending,
            RequestStatus::Submitted,
            RequestStatus::Succeeded,
            RequestStatus::Failed,
        ] {
            assert!(!terminal.can_transition_to(next));
        }
    }
}

#[test]
fn status_survives_database_round_trip() {
    for status in [
        RequestStatus::Pending,
        RequestStatus::Submitted,
        RequestStatus::Succeeded,
        RequestStatus::Failed,
    ] {
        let stored = status.as_db_status();
        assert_eq!(RequestStatus::from_db_status(stored), Some(status));
    }
}

#[test]
fn unknown_database_status_is_rejected() {
    assert_eq!(RequestStatus::from_db_status("cancelled"), None);
    assert_eq!(RequestStatus::from_db_status(""), None);
}

#[test]
fn backoff_doubles_per_attempt() {
    let base = Duration::from_secs(30);
    let cap = Duration::from_secs(900);

    assert_eq!(backoff_delay(1, base, cap), Duration::from_secs(30));
    assert_eq!(backoff_delay(2, base, cap), Duration::from_secs(60));
    assert_eq!(backoff_delay(3, base, cap), Duration::from_secs(120));
    assert_eq!(backoff_delay(4, base, cap), Duration::from_secs(240));
}

#[test]
fn backoff_is_capped() {
    let base = Duration::from_secs(30);
    let cap = Duration::from_secs(900);

    assert_eq!(backoff_delay(6, base, cap), cap);
    assert_eq!(backoff_delay(40, base, cap), cap);
}
