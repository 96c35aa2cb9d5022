use serde::{Deserialize, Serialize};

/// Lifecycle of one host's trust record for a peer identity.
///
/// Each side of a relationship holds its own independent record; the two
/// can drift (one side connected, the other still requested) and no
/// reconciliation protocol exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// A peer asked us; awaiting local accept or decline.
    Pending,
    /// We asked a peer; awaiting their acknowledgement.
    Requested,
    /// Trust established in this direction.
    Connected,
    /// Terminal local rejection.  No outbound transitions.
    Declined,
}

impl ConnectionStatus {
    /// Whether this status may move to `next`.
    ///
    /// Deletion is not a transition; a `Connected` record is removed
    /// outright rather than moved to another state.
    pub fn can_transition_to(self, next: ConnectionStatus) -> bool {
        use ConnectionStatus::*;
        matches!(
            (self, next),
            (Pending, Connected) | (Pending, Declined) | (Requested, Connected)
        )
    }

    /// Trust-on-first-use guard: only a connection we initiated and that is
    /// still awaiting acknowledgement adopts the public key claimed in an
    /// ack at face value.  First key sighting is authoritative; every later
    /// envelope from the peer must verify against the stored key.
    pub fn adopts_key_on_first_sight(self) -> bool {
        matches!(self, ConnectionStatus::Requested)
    }

    /// Only a connected peer's key is authoritative for signature checks.
    pub fn trusts_signatures(self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionStatus::Pending => "pending",
            ConnectionStatus::Requested => "requested",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Declined => "declined",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionStatus::*;

    #[test]
    fn test_pending_reaches_only_connected_or_declined() {
        assert!(Pending.can_transition_to(Connected));
        assert!(Pending.can_transition_to(Declined));
        assert!(!Pending.can_transition_to(Requested));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn test_declined_is_terminal() {
        for next in [Pending, Requested, Connected, Declined] {
            assert!(!Declined.can_transition_to(next));
        }
    }

    #[test]
    fn test_requested_upgrades_to_connected() {
        assert!(Requested.can_transition_to(Connected));
        assert!(!Requested.can_transition_to(Declined));
    }

    #[test]
    fn test_key_adoption_guard() {
        assert!(Requested.adopts_key_on_first_sight());
        assert!(!Pending.adopts_key_on_first_sight());
        assert!(!Connected.adopts_key_on_first_sight());
        assert!(!Declined.adopts_key_on_first_sight());
    }

    #[test]
    fn test_serde_wire_form() {
        let s = serde_json::to_string(&Connected).unwrap();
        assert_eq!(s, "\"connected\"");
    }
}
