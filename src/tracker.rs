use std::collections::HashSet;

use crate::types::AcceptorAddr;

/// Set of acceptors that answered a given ballot. Duplicate deliveries are
/// no-ops.
#[derive(Debug, Clone, Default)]
pub struct ResponseTracker {
    responders: HashSet<AcceptorAddr>,
}

impl ResponseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `responder` was not recorded yet.
    pub fn add(&mut self, responder: AcceptorAddr) -> bool {
        self.responders.insert(responder)
    }

    pub fn contains(&self, responder: &AcceptorAddr) -> bool {
        self.responders.contains(responder)
    }

    pub fn len(&self) -> usize {
        self.responders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responders.is_empty()
    }

    pub fn clear(&mut self) {
        self.responders.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &AcceptorAddr> {
        self.responders.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn addr(port: u16) -> AcceptorAddr {
        AcceptorAddr(SocketAddr::from(([10, 0, 0, 1], port)))
    }

    #[test]
    fn duplicate_responders_are_counted_once() {
        let mut tracker = ResponseTracker::new();

        assert!(tracker.add(addr(1)));
        assert!(tracker.add(addr(2)));
        assert!(!tracker.add(addr(1)));
        assert!(!tracker.add(addr(2)));

        assert_eq!(tracker.len(), 2);
        assert!(tracker.contains(&addr(1)));
        assert!(!tracker.contains(&addr(3)));
    }

    #[test]
    fn clear_forgets_everyone() {
        let mut tracker = ResponseTracker::new();
        tracker.add(addr(1));
        tracker.add(addr(2));

        tracker.clear();

        assert!(tracker.is_empty());
        assert!(tracker.add(addr(1)));
    }
}
