use serde::{Deserialize, Serialize};

/// Lifecycle of a payment request. Transitions are monotonic; a terminal
/// record never moves again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Submitted,
    Succeeded,
    Failed,
}

impl RequestStatus {
    pub fn as_db_status(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Submitted => "submitted",
            RequestStatus::Succeeded => "succeeded",
            RequestStatus::Failed => "failed",
        }
    }

    pub fn from_db_status(status: &str) -> Option<Self> {
        match status {
            "pending" => Some(RequestStatus::Pending),
            "submitted" => Some(RequestStatus::Submitted),
            "succeeded" => Some(RequestStatus::Succeeded),
            "failed" => Some(RequestStatus::Failed),
            _ => None,
        }
    }

    pub fn valid_transitions(&self) -> Vec<RequestStatus> {
        match self {
            // Pending can fail directly: cancellation, permanent provider
            // rejection, or the retry ceiling.
            RequestStatus::Pending => vec![RequestStatus::Submitted, RequestStatus::Failed],
            RequestStatus::Submitted => vec![RequestStatus::Succeeded, RequestStatus::Failed],
            RequestStatus::Succeeded | RequestStatus::Failed => vec![],
        }
    }

    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Succeeded | RequestStatus::Failed)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_db_status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_submit_or_fail() {
        assert!(RequestStatus::Pending.can_transition_to(RequestStatus::Submitted));
        assert!(RequestStatus::Pending.can_transition_to(RequestStatus::Failed));
        assert!(!RequestStatus::Pending.can_transition_to(RequestStatus::Succeeded));
    }

    #[test]
    fn submitted_resolves_to_either_terminal() {
        assert!(RequestStatus::Submitted.can_transition_to(RequestStatus::Succeeded));
        assert!(RequestStatus::Submitted.can_transition_to(RequestStatus::Failed));
        assert!(!RequestStatus::Submitted.can_transition_to(RequestStatus::Pending));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        assert!(RequestStatus::Succeeded.valid_transitions().is_empty());
        assert!(RequestStatus::Failed.valid_transitions().is_empty());
        assert!(RequestStatus::Succeeded.is_terminal());
        assert!(RequestStatus::Failed.is_terminal());
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(!RequestStatus::Submitted.is_terminal());
    }

    #[test]
    fn db_status_round_trips() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Submitted,
            RequestStatus::Succeeded,
            RequestStatus::Failed,
        ] {
            assert_eq!(
                RequestStatus::from_db_status(status.as_db_status()),
                Some(status)
            );
        }
        assert_eq!(RequestStatus::from_db_status("unknown"), None);
    }
}
