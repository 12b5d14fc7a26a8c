use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{
    db::{election::Election, voter::Voter},
    mongodb::Id,
};
use crate::store::VoteStore;

use super::VotingBooth;

/// Whether a voter may currently vote in an election.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Eligibility {
    Eligible,
    AlreadyVoted,
    VoterNotFound,
    ElectionNotFound,
    /// The election exists but is not accepting votes right now.
    ElectionClosed,
}

impl Eligibility {
    /// `Ok` if eligible, otherwise the error explaining why not.
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Eligible => Ok(()),
            Self::AlreadyVoted => Err(Error::Conflict(
                "Voter has already voted in this election".to_string(),
            )),
            Self::VoterNotFound => Err(Error::not_found("No voter profile for this account")),
            Self::ElectionNotFound => Err(Error::not_found("Election")),
            Self::ElectionClosed => Err(Error::ValidationFailed(
                "Election is not open for voting".to_string(),
            )),
        }
    }
}

impl VotingBooth {
    /// Decide whether the account's voter may vote in the given election.
    ///
    /// Reads only, so this is safe to call any number of times. Store failures
    /// are returned as errors rather than folded into an [`Eligibility`].
    pub async fn check_eligibility(&self, account_id: Id, election_id: Id) -> Result<Eligibility> {
        let voter = match self.store.voter_for_account(account_id).await? {
            Some(voter) => voter,
            None => return Ok(Eligibility::VoterNotFound),
        };
        let election = match self.store.election(election_id).await? {
            Some(election) => election,
            None => return Ok(Eligibility::ElectionNotFound),
        };
        assess(&*self.store, &voter, &election, Utc::now()).await
    }
}

/// Eligibility of a resolved voter in a resolved election at `now`.
///
/// The voted flag and the vote itself are both consulted.
pub(super) async fn assess(
    store: &dyn VoteStore,
    voter: &Voter,
    election: &Election,
    now: DateTime<Utc>,
) -> Result<Eligibility> {
    if !election.is_open_at(now) {
        return Ok(Eligibility::ElectionClosed);
    }
    if voter.has_voted_in(election.id) {
        return Ok(Eligibility::AlreadyVoted);
    }
    if store.vote_of(voter.id, election.id).await?.is_some() {
        return Ok(Eligibility::AlreadyVoted);
    }
    Ok(Eligibility::Eligible)
}

#[cfg(test)]
mod tests {
    use crate::model::{
        db::{election::NewElection, vote::NewVote},
        mongodb::Id,
    };
    use crate::voting::testing::Fixture;

    use super::*;

    #[rocket::async_test]
    async fn missing_voter_and_election() {
        let fixture = Fixture::new();
        let booth = &fixture.booth;
        assert_eq!(
            booth.check_eligibility(Id::new(), fixture.election.id).await.unwrap(),
            Eligibility::VoterNotFound
        );
        assert_eq!(
            booth.check_eligibility(fixture.account_id(), Id::new()).await.unwrap(),
            Eligibility::ElectionNotFound
        );
        // Voter is checked first.
        assert_eq!(
            booth.check_eligibility(Id::new(), Id::new()).await.unwrap(),
            Eligibility::VoterNotFound
        );
    }

    #[rocket::async_test]
    async fn window_is_enforced() {
        let fixture = Fixture::new();
        for election in [NewElection::future_example(), NewElection::past_example()] {
            let election = fixture.store.insert_election(election);
            assert_eq!(
                fixture
                    .booth
                    .check_eligibility(fixture.account_id(), election.id)
                    .await
                    .unwrap(),
                Eligibility::ElectionClosed
            );
        }
    }

    #[rocket::async_test]
    async fn window_is_half_open() {
        let fixture = Fixture::new();
        let election = &fixture.election;
        let store = fixture.booth.store();
        let at_start = assess(store, &fixture.voter, election, election.start_time)
            .await
            .unwrap();
        let at_end = assess(store, &fixture.voter, election, election.end_time)
            .await
            .unwrap();
        assert_eq!(at_start, Eligibility::Eligible);
        assert_eq!(at_end, Eligibility::ElectionClosed);
    }

    #[rocket::async_test]
    async fn either_flag_or_vote_means_already_voted() {
        let fixture = Fixture::new();
        let election_id = fixture.election.id;
        let now = Utc::now();

        let mut flagged = fixture.voter.clone();
        flagged.voted.insert(election_id, true);
        assert_eq!(
            assess(fixture.booth.store(), &flagged, &fixture.election, now)
                .await
                .unwrap(),
            Eligibility::AlreadyVoted
        );

        // A stored vote without the flag, as the store would never produce it.
        let mut txn = fixture
            .store
            .begin_vote(fixture.voter.id, election_id)
            .await
            .unwrap();
        txn.insert_vote(&NewVote::example(fixture.voter.id, election_id, fixture.candidate_id()))
            .await
            .unwrap();
        txn.commit().await.unwrap();
        assert_eq!(
            assess(fixture.booth.store(), &fixture.voter, &fixture.election, now)
                .await
                .unwrap(),
            Eligibility::AlreadyVoted
        );
    }

    #[test]
    fn errors_for_ineligibility() {
        assert!(Eligibility::Eligible.into_result().is_ok());
        assert!(matches!(
            Eligibility::AlreadyVoted.into_result(),
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            Eligibility::ElectionNotFound.into_result(),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            Eligibility::ElectionClosed.into_result(),
            Err(Error::ValidationFailed(_))
        ));
    }
}
