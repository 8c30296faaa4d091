//! Identifiers and values shared by the proposer, its collaborators and the
//! wire messages.

use serde::{Deserialize, Serialize};
use std::{fmt, net::SocketAddr};
use uuid::Uuid;

/// Namespace used to derive service ids from service type names.
const GRID_SERVICE_NAMESPACE: Uuid = Uuid::from_u128(0x8c5e_4a1d_2b7f_4e39_9d06_31f2_a7c4_b810);

/// Ballot number. Ballot 0 means "nothing proposed yet"; every ballot a
/// session puts on the wire is at least 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct BallotId(pub u64);

impl BallotId {
    pub const ZERO: Self = Self(0);

    /// The ballot right after this one, or `None` once the ballot space is
    /// exhausted.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for BallotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ballot({})", self.0)
    }
}

/// Correlation id of a proposal. Stable for a given service type, so every
/// proposer in the cluster competing for the same service slot uses the same
/// id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceId(pub Uuid);

impl ServiceId {
    pub fn for_service_type(service_type: &str) -> Self {
        Self(Uuid::new_v5(&GRID_SERVICE_NAMESPACE, service_type.as_bytes()))
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Control address of an acceptor node. Also the identity under which its
/// replies are tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AcceptorAddr(pub SocketAddr);

impl fmt::Display for AcceptorAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<SocketAddr> for AcceptorAddr {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

/// Address acceptors reply to. Carried by every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplyTo(pub SocketAddr);

impl Default for ReplyTo {
    fn default() -> Self {
        Self(SocketAddr::from(([127, 0, 0, 1], 0)))
    }
}

impl fmt::Display for ReplyTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The value being proposed: the address pair the winning node will serve on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposedValue {
    pub control_uri: String,
    pub data_uri: String,
}

impl ProposedValue {
    pub fn new(control_uri: impl Into<String>, data_uri: impl Into<String>) -> Self {
        Self {
            control_uri: control_uri.into(),
            data_uri: data_uri.into(),
        }
    }
}

/// What a session learned once a quorum accepted its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consensus {
    pub correlation_id: ServiceId,
    pub ballot_id: BallotId,
    pub value: ProposedValue,
    pub acceptors: Vec<AcceptorAddr>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_id_is_deterministic_per_service_type() {
        let a = ServiceId::for_service_type("MassTransit.Grid.Tests.SimpleGridService");
        let b = ServiceId::for_service_type("MassTransit.Grid.Tests.SimpleGridService");
        let c = ServiceId::for_service_type("MassTransit.Grid.Tests.OtherGridService");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn ballot_ordering() {
        assert!(BallotId::ZERO < BallotId(1));
        assert_eq!(BallotId(41).next(), Some(BallotId(42)));
        assert_eq!(BallotId(u64::MAX).next(), None);
        assert_eq!(BallotId(3).to_string(), "ballot(3)");
    }
}
