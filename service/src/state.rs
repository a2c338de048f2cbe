//! Service state definitions.

use std::fmt;

/// Service operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Service is running and accepting requests.
    Running,
    /// A rollback failed; the storage session can no longer be trusted and
    /// every request is refused.
    Poisoned,
}

impl ServiceState {
    /// Check if the service is accepting new requests.
    pub fn accepts_requests(&self) -> bool {
        matches!(self, ServiceState::Running)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Running => f.write_str("running"),
            ServiceState::Poisoned => f.write_str("poisoned"),
        }
    }
}
