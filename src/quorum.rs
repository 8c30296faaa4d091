/// Majority of `acceptors`.
pub fn quorum(acceptors: usize) -> usize {
    acceptors / 2 + 1
}

pub fn is_quorum(count: usize, acceptors: usize) -> bool {
    count >= quorum(acceptors)
}
