use std::{
    collections::HashSet,
    sync::{PoisonError, RwLock},
};

use tracing::debug;

use crate::types::{AcceptorAddr, ServiceId};

/// Enumerates the nodes currently able to act as acceptors for a service.
///
/// The result is a snapshot: a proposer uses it for one Prepare phase and
/// asks again on the next one.
pub trait AcceptorDirectory: Send + Sync {
    fn active_acceptors_for(&self, service_id: ServiceId) -> Vec<AcceptorAddr>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceNode {
    pub service_id: ServiceId,
    pub control_addr: AcceptorAddr,
    pub state: NodeState,
}

/// In-memory registry of grid service nodes.
#[derive(Debug, Default)]
pub struct NodeDirectory {
    nodes: RwLock<Vec<ServiceNode>>,
}

impl NodeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node, or updates its state if it is already known.
    pub fn upsert(&self, service_id: ServiceId, control_addr: AcceptorAddr, state: NodeState) {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);

        match nodes
            .iter_mut()
            .find(|node| node.service_id == service_id && node.control_addr == control_addr)
        {
            Some(node) => node.state = state,
            None => nodes.push(ServiceNode {
                service_id,
                control_addr,
                state,
            }),
        }

        debug!(%service_id, acceptor = %control_addr, ?state, "node updated");
    }

    pub fn activate(&self, service_id: ServiceId, control_addr: AcceptorAddr) {
        self.upsert(service_id, control_addr, NodeState::Active);
    }

    pub fn deactivate(&self, service_id: ServiceId, control_addr: AcceptorAddr) {
        self.upsert(service_id, control_addr, NodeState::Inactive);
    }

    pub fn remove(&self, service_id: ServiceId, control_addr: AcceptorAddr) {
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|node| !(node.service_id == service_id && node.control_addr == control_addr));
    }
}

impl AcceptorDirectory for NodeDirectory {
    fn active_acceptors_for(&self, service_id: ServiceId) -> Vec<AcceptorAddr> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);

        unique_in_order(
            nodes
                .iter()
                .filter(|node| node.service_id == service_id && node.state == NodeState::Active)
                .map(|node| node.control_addr),
        )
    }
}

/// Drops repeated addresses, keeping the first occurrence of each.
pub fn unique_in_order(addrs: impl IntoIterator<Item = AcceptorAddr>) -> Vec<AcceptorAddr> {
    let mut seen = HashSet::new();
    addrs.into_iter().filter(|addr| seen.insert(*addr)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn addr(port: u16) -> AcceptorAddr {
        AcceptorAddr(SocketAddr::from(([10, 0, 0, 1], port)))
    }

    #[test]
    fn only_active_nodes_of_the_service_are_returned_in_order() {
        let grid = ServiceId::for_service_type("grid");
        let other = ServiceId::for_service_type("other");
        let directory = NodeDirectory::new();

        directory.activate(grid, addr(3));
        directory.activate(grid, addr(1));
        directory.deactivate(grid, addr(2));
        directory.activate(other, addr(4));

        assert_eq!(directory.active_acceptors_for(grid), vec![addr(3), addr(1)]);
        assert_eq!(directory.active_acceptors_for(other), vec![addr(4)]);
    }

    #[test]
    fn membership_changes_are_visible_on_the_next_query() {
        let grid = ServiceId::for_service_type("grid");
        let directory = NodeDirectory::new();
        directory.activate(grid, addr(1));
        directory.activate(grid, addr(2));

        let before = directory.active_acceptors_for(grid);
        directory.deactivate(grid, addr(1));
        directory.activate(grid, addr(5));
        directory.remove(grid, addr(2));

        assert_eq!(before, vec![addr(1), addr(2)]);
        assert_eq!(directory.active_acceptors_for(grid), vec![addr(5)]);
    }

    #[test]
    fn upsert_does_not_duplicate_nodes() {
        let grid = ServiceId::for_service_type("grid");
        let directory = NodeDirectory::new();
        directory.activate(grid, addr(1));
        directory.activate(grid, addr(1));

        assert_eq!(directory.active_acceptors_for(grid), vec![addr(1)]);
    }

    #[test]
    fn unique_in_order_keeps_first_occurrence() {
        assert_eq!(
            unique_in_order([addr(2), addr(1), addr(2), addr(3), addr(1)]),
            vec![addr(2), addr(1), addr(3)]
        );
    }
}
