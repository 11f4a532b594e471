//! Lifecycle of one top-level call.
//!
//! ```text
//! Idle -> Calling -> Cached ----------> Completed
//!                 -> NetworkInFlight -> Completed
//!                                   \-> Retrying -> Calling
//!                                   \-> Failed
//! ```
//!
//! Phases are reported as structured log fields by the retry and caching
//! layers. `Failed` and `Completed` are terminal.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallPhase {
    Idle,
    Calling,
    Cached,
    NetworkInFlight,
    Completed,
    Retrying,
    Failed,
}

impl CallPhase {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: CallPhase) -> bool {
        use CallPhase::*;
        matches!(
            (self, next),
            (Idle, Calling)
                | (Calling, Cached)
                | (Calling, NetworkInFlight)
                | (Calling, Retrying)
                | (Calling, Failed)
                | (Cached, Completed)
                | (NetworkInFlight, Completed)
                | (NetworkInFlight, Retrying)
                | (NetworkInFlight, Failed)
                | (Retrying, Calling)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CallPhase::Completed | CallPhase::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallPhase::Idle => "idle",
            CallPhase::Calling => "calling",
            CallPhase::Cached => "cached",
            CallPhase::NetworkInFlight => "network_in_flight",
            CallPhase::Completed => "completed",
            CallPhase::Retrying => "retrying",
            CallPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::CallPhase::*;

    #[test]
    fn retry_loop_is_legal() {
        let path = [Idle, Calling, NetworkInFlight, Retrying, Calling, Cached, Completed];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn terminal_phases_do_not_advance() {
        for next in [Idle, Calling, Cached, NetworkInFlight, Completed, Retrying, Failed] {
            assert!(!Failed.can_transition_to(next));
            assert!(!Completed.can_transition_to(next));
        }
        assert!(Failed.is_terminal());
        assert!(Completed.is_terminal());
    }

    #[test]
    fn cached_results_are_not_retried() {
        assert!(!Cached.can_transition_to(Retrying));
    }
}
