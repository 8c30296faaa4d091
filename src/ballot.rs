use std::cmp;

use crate::config::RetryBallot;
use crate::types::BallotId;

/// Ballot bookkeeping for one proposer session.
#[derive(Debug, Clone, Default)]
pub struct BallotState {
    /// The highest ballot this session has ever proposed. Never decreases.
    highest_ballot_id: BallotId,

    /// The ballot currently in flight.
    proposed_ballot_id: BallotId,

    /// Distinct rejections received for `proposed_ballot_id`.
    rejected_count: usize,

    /// The largest ballot reported by an acceptor that rejected this round.
    highest_rejected_ballot_id: BallotId,
}

impl BallotState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bookkeeping whose first round proposes a ballot above `floor`.
    pub fn starting_after(floor: BallotId) -> Self {
        Self {
            highest_ballot_id: floor,
            highest_rejected_ballot_id: floor,
            ..Self::default()
        }
    }

    pub fn highest(&self) -> BallotId {
        self.highest_ballot_id
    }

    pub fn proposed(&self) -> BallotId {
        self.proposed_ballot_id
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected_count
    }

    pub fn highest_rejected(&self) -> BallotId {
        self.highest_rejected_ballot_id
    }

    /// Starts a new round and returns its ballot, which is always strictly
    /// greater than every ballot proposed before.
    ///
    /// Returns `None`, leaving the state untouched, when no such ballot
    /// exists.
    pub fn begin_round(&mut self, strategy: RetryBallot) -> Option<BallotId> {
        let base = match strategy {
            RetryBallot::OwnHistory => self.highest_ballot_id,
            RetryBallot::ObservedMax => {
                cmp::max(self.highest_ballot_id, self.highest_rejected_ballot_id)
            }
        };

        self.proposed_ballot_id = base.next()?;
        self.highest_ballot_id = self.proposed_ballot_id;
        self.rejected_count = 0;
        self.highest_rejected_ballot_id = self.highest_ballot_id;

        Some(self.proposed_ballot_id)
    }

    /// Records one more distinct rejection and returns the new count.
    pub fn record_rejection(&mut self, value_ballot_id: BallotId) -> usize {
        self.highest_rejected_ballot_id =
            cmp::max(self.highest_rejected_ballot_id, value_ballot_id);
        self.rejected_count += 1;
        self.rejected_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_are_strictly_increasing() {
        let mut ballot = BallotState::new();
        assert_eq!(ballot.proposed(), BallotId::ZERO);

        assert_eq!(ballot.begin_round(RetryBallot::OwnHistory), Some(BallotId(1)));
        assert_eq!(ballot.begin_round(RetryBallot::OwnHistory), Some(BallotId(2)));
        assert_eq!(ballot.begin_round(RetryBallot::ObservedMax), Some(BallotId(3)));
        assert_eq!(ballot.highest(), BallotId(3));
    }

    #[test]
    fn begin_round_resets_rejections() {
        let mut ballot = BallotState::new();
        ballot.begin_round(RetryBallot::ObservedMax);
        ballot.record_rejection(BallotId(9));
        ballot.record_rejection(BallotId(4));
        assert_eq!(ballot.rejected_count(), 2);
        assert_eq!(ballot.highest_rejected(), BallotId(9));

        ballot.begin_round(RetryBallot::ObservedMax);

        assert_eq!(ballot.rejected_count(), 0);
        assert_eq!(ballot.highest_rejected(), ballot.highest());
    }

    #[test]
    fn observed_max_jumps_past_rejecting_acceptors() {
        let mut ballot = BallotState::new();
        ballot.begin_round(RetryBallot::ObservedMax);
        ballot.record_rejection(BallotId(7));

        assert_eq!(ballot.begin_round(RetryBallot::ObservedMax), Some(BallotId(8)));
    }

    #[test]
    fn own_history_ignores_rejecting_acceptors() {
        let mut ballot = BallotState::new();
        ballot.begin_round(RetryBallot::OwnHistory);
        ballot.record_rejection(BallotId(7));

        assert_eq!(ballot.begin_round(RetryBallot::OwnHistory), Some(BallotId(2)));
    }

    #[test]
    fn lower_rejection_ballots_do_not_lower_the_maximum() {
        let mut ballot = BallotState::new();
        ballot.begin_round(RetryBallot::ObservedMax);
        ballot.begin_round(RetryBallot::ObservedMax);
        ballot.record_rejection(BallotId(1));

        assert_eq!(ballot.highest_rejected(), BallotId(2));
        assert_eq!(ballot.begin_round(RetryBallot::ObservedMax), Some(BallotId(3)));
    }

    #[test]
    fn exhausted_ballot_space_starts_no_round() {
        let mut ballot = BallotState::new();
        ballot.begin_round(RetryBallot::ObservedMax);
        ballot.record_rejection(BallotId(u64::MAX));

        assert_eq!(ballot.begin_round(RetryBallot::ObservedMax), None);
        assert_eq!(ballot.proposed(), BallotId(1));
        assert_eq!(ballot.highest(), BallotId(1));
        assert_eq!(ballot.rejected_count(), 1);

        // The last ballot is still reachable.
        let mut ballot = BallotState::new();
        ballot.begin_round(RetryBallot::ObservedMax);
        ballot.record_rejection(BallotId(u64::MAX - 1));
        assert_eq!(
            ballot.begin_round(RetryBallot::ObservedMax),
            Some(BallotId(u64::MAX))
        );
    }

    #[test]
    fn starting_after_a_floor() {
        let mut ballot = BallotState::starting_after(BallotId(4));
        assert_eq!(ballot.proposed(), BallotId::ZERO);
        assert_eq!(ballot.begin_round(RetryBallot::OwnHistory), Some(BallotId(5)));

        let mut ballot = BallotState::starting_after(BallotId(4));
        assert_eq!(ballot.begin_round(RetryBallot::ObservedMax), Some(BallotId(5)));
    }
}
