use chrono::Utc;
use rocket::tokio;

use crate::error::{Error, Result};
use crate::model::{
    common::VoteToken,
    db::{
        candidate::Candidate,
        election::Election,
        vote::{NewVote, Vote},
        voter::Voter,
    },
    mongodb::Id,
};
use crate::notify::{self, VoteConfirmation};
use crate::store::VoteTransaction;

use super::{eligibility::assess, Eligibility, VotingBooth};

/// The result of one attempt to cast a vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The vote was recorded, along with the voter's flag for the election.
    Committed(Vote),
    AlreadyVoted,
    /// The candidate does not exist or stands in a different election.
    InvalidCandidate,
    /// Nothing was recorded and the attempt may be retried.
    Failed,
    VoterNotFound,
    ElectionNotFound,
    ElectionClosed,
}

impl CommitOutcome {
    /// The committed vote, or the error to report.
    pub fn into_result(self) -> Result<Vote> {
        match self {
            Self::Committed(vote) => Ok(vote),
            Self::AlreadyVoted => Err(Error::Conflict(
                "Voter has already voted in this election".to_string(),
            )),
            Self::InvalidCandidate => Err(Error::ValidationFailed(
                "Candidate does not stand in this election".to_string(),
            )),
            Self::Failed => Err(Error::TransientFailure(
                "Vote was not recorded, please try again".to_string(),
            )),
            Self::VoterNotFound => Err(Error::not_found("No voter profile for this account")),
            Self::ElectionNotFound => Err(Error::not_found("Election")),
            Self::ElectionClosed => Err(Error::ValidationFailed(
                "Election is not open for voting".to_string(),
            )),
        }
    }

    /// The outcome for a voter found ineligible before any write.
    fn refused(eligibility: Eligibility) -> Option<Self> {
        match eligibility {
            Eligibility::Eligible => None,
            Eligibility::AlreadyVoted => Some(Self::AlreadyVoted),
            Eligibility::VoterNotFound => Some(Self::VoterNotFound),
            Eligibility::ElectionNotFound => Some(Self::ElectionNotFound),
            Eligibility::ElectionClosed => Some(Self::ElectionClosed),
        }
    }
}

impl VotingBooth {
    /// Cast the account's vote for `candidate_id` in `election_id`.
    ///
    /// The vote and the voter's flag for the election are written in one
    /// transaction, bounded by the commit timeout; either both are recorded or
    /// neither is. A confirmation is dispatched once the commit succeeds, and
    /// its fate has no bearing on the outcome.
    pub async fn commit_vote(
        &self,
        account_id: Id,
        election_id: Id,
        candidate_id: Id,
        vote_token: VoteToken,
    ) -> CommitOutcome {
        match self
            .try_commit_vote(account_id, election_id, candidate_id, vote_token)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Vote by account {account_id} in election {election_id} failed: {e}");
                CommitOutcome::Failed
            }
        }
    }

    async fn try_commit_vote(
        &self,
        account_id: Id,
        election_id: Id,
        candidate_id: Id,
        vote_token: VoteToken,
    ) -> Result<CommitOutcome> {
        // Preconditions, before anything is written.
        let voter = match self.store.voter_for_account(account_id).await? {
            Some(voter) => voter,
            None => return Ok(CommitOutcome::VoterNotFound),
        };
        let election = match self.store.election(election_id).await? {
            Some(election) => election,
            None => return Ok(CommitOutcome::ElectionNotFound),
        };
        let candidate = match self.store.candidate(candidate_id).await? {
            Some(candidate) if candidate.stands_in(election_id) => candidate,
            _ => return Ok(CommitOutcome::InvalidCandidate),
        };
        let eligibility = assess(&*self.store, &voter, &election, Utc::now()).await?;
        if let Some(outcome) = CommitOutcome::refused(eligibility) {
            return Ok(outcome);
        }

        let vote = NewVote {
            election_id,
            candidate_id,
            voter_id: voter.id,
            vote_token,
            voted_at: Utc::now(),
        };
        // Timing out drops the transaction, which rolls it back.
        let vote_id = match tokio::time::timeout(self.commit_timeout, self.record(&vote)).await {
            Ok(Ok(id)) => id,
            Ok(Err(Error::Conflict(msg))) => {
                debug!("Lost the race to vote for voter {}: {msg}", voter.id);
                return Ok(CommitOutcome::AlreadyVoted);
            }
            Ok(Err(e)) => {
                warn!("Vote for voter {} in election {election_id} rolled back: {e}", voter.id);
                return Ok(CommitOutcome::Failed);
            }
            Err(_) => {
                warn!(
                    "Vote for voter {} in election {election_id} timed out after {:?}, rolled back",
                    voter.id, self.commit_timeout
                );
                return Ok(CommitOutcome::Failed);
            }
        };
        let vote = Vote { id: vote_id, vote };
        info!("Recorded vote {} in election {election_id}", vote.id);

        self.confirm(&voter, &election, candidate, &vote);
        Ok(CommitOutcome::Committed(vote))
    }

    /// Run the vote transaction to completion.
    async fn record(&self, vote: &NewVote) -> Result<Id> {
        let mut txn = self.store.begin_vote(vote.voter_id, vote.election_id).await?;
        let id = match stage(txn.as_mut(), vote).await {
            Ok(id) => id,
            Err(e) => {
                if let Err(abort_err) = txn.abort().await {
                    warn!("Failed to abort vote transaction: {abort_err}");
                }
                return Err(e);
            }
        };
        txn.commit().await?;
        Ok(id)
    }

    /// Send the voter a confirmation on a detached task.
    fn confirm(&self, voter: &Voter, election: &Election, candidate: Candidate, vote: &Vote) {
        let store = self.store.clone();
        let notifier = self.notifier.clone();
        let timeout = self.notify_timeout;
        let recipient = voter.sms.clone();
        let election_name = election.name.clone();
        let vote_id = vote.id;
        let vote_token = vote.vote_token.clone();
        let voted_at = vote.voted_at;

        // Detached: the outcome is only logged.
        tokio::spawn(async move {
            let party = match store.party(candidate.party_id).await {
                Ok(party) => party,
                Err(e) => {
                    warn!("Could not look up party {}: {e}", candidate.party_id);
                    None
                }
            };
            let confirmation = VoteConfirmation {
                recipient,
                election_name,
                candidate: candidate.describe(party.as_ref()),
                vote_token,
                voted_at,
            };
            match notify::deliver(&*notifier, &confirmation, timeout).await {
                Ok(()) => debug!("Sent confirmation of vote {vote_id}"),
                Err(e) => warn!("Vote {vote_id} is recorded but its confirmation was not sent: {e}"),
            }
        });
    }
}

async fn stage(txn: &mut dyn VoteTransaction, vote: &NewVote) -> Result<Id> {
    let id = txn.insert_vote(vote).await?;
    txn.mark_voted().await?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use mongodb::{bson::doc, Database};

    use crate::model::{
        db::{
            candidate::NewCandidate,
            election::NewElection,
            party::NewParty,
            voter::NewVoter,
        },
        mongodb::Coll,
    };
    use crate::notify::testing::{FailingNotifier, HangingNotifier, RecordingNotifier};
    use crate::notify::LogNotifier;
    use crate::store::{insert_doc, FailPoint, MongoStore, VoteStore};
    use crate::voting::testing::Fixture;

    use super::*;

    async fn cast(fixture: &Fixture, candidate_id: Id) -> CommitOutcome {
        fixture
            .booth
            .commit_vote(
                fixture.account_id(),
                fixture.election.id,
                candidate_id,
                VoteToken::generate(),
            )
            .await
    }

    fn flag_set(fixture: &Fixture) -> bool {
        fixture
            .store
            .voter(fixture.voter.id)
            .unwrap()
            .has_voted_in(fixture.election.id)
    }

    fn count(fixture: &Fixture) -> usize {
        fixture.store.vote_count(fixture.voter.id, fixture.election.id)
    }

    #[rocket::async_test]
    async fn commit_records_vote_and_flag() {
        let fixture = Fixture::new();
        let token = VoteToken::generate();
        let outcome = fixture
            .booth
            .commit_vote(
                fixture.account_id(),
                fixture.election.id,
                fixture.candidate_id(),
                token.clone(),
            )
            .await;

        let vote = outcome.into_result().unwrap();
        assert_eq!(vote.voter_id, fixture.voter.id);
        assert_eq!(vote.election_id, fixture.election.id);
        assert_eq!(vote.candidate_id, fixture.candidate_id());
        assert_eq!(vote.vote_token, token);
        let stored = fixture
            .store
            .vote_of(fixture.voter.id, fixture.election.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, vote);
        assert!(flag_set(&fixture));
    }

    #[rocket::async_test]
    async fn second_commit_is_already_voted() {
        let fixture = Fixture::new();
        assert!(matches!(
            cast(&fixture, fixture.candidate_id()).await,
            CommitOutcome::Committed(_)
        ));
        assert_eq!(
            cast(&fixture, fixture.candidates[1].id).await,
            CommitOutcome::AlreadyVoted
        );
        assert_eq!(count(&fixture), 1);
    }

    #[rocket::async_test]
    async fn eligibility_before_and_after() {
        let fixture = Fixture::new();
        let check = || {
            fixture
                .booth
                .check_eligibility(fixture.account_id(), fixture.election.id)
        };
        assert_eq!(check().await.unwrap(), Eligibility::Eligible);
        cast(&fixture, fixture.candidate_id()).await.into_result().unwrap();
        assert_eq!(check().await.unwrap(), Eligibility::AlreadyVoted);
    }

    #[rocket::async_test]
    async fn candidate_from_another_election_is_invalid() {
        let fixture = Fixture::new();
        let (_, stranger) = fixture.add_election();
        assert_eq!(cast(&fixture, stranger.id).await, CommitOutcome::InvalidCandidate);
        assert_eq!(cast(&fixture, Id::new()).await, CommitOutcome::InvalidCandidate);
        assert_eq!(count(&fixture), 0);
        assert!(!flag_set(&fixture));
    }

    #[rocket::async_test]
    async fn preconditions_are_typed() {
        let fixture = Fixture::new();
        let booth = &fixture.booth;
        let token = VoteToken::generate;

        let outcome = booth
            .commit_vote(Id::new(), fixture.election.id, fixture.candidate_id(), token())
            .await;
        assert_eq!(outcome, CommitOutcome::VoterNotFound);

        let outcome = booth
            .commit_vote(fixture.account_id(), Id::new(), fixture.candidate_id(), token())
            .await;
        assert_eq!(outcome, CommitOutcome::ElectionNotFound);

        let closed = fixture.store.insert_election(NewElection::past_example());
        let candidate = fixture.store.insert_candidate(crate::model::db::candidate::NewCandidate {
            name: "Late Larry".to_string(),
            party_id: fixture.party.id,
            election_id: closed.id,
        });
        let outcome = booth
            .commit_vote(fixture.account_id(), closed.id, candidate.id, token())
            .await;
        assert_eq!(outcome, CommitOutcome::ElectionClosed);
        assert_eq!(fixture.store.vote_count(fixture.voter.id, closed.id), 0);
    }

    #[rocket::async_test]
    async fn store_failure_leaves_nothing_behind() {
        for point in [FailPoint::InsertVote, FailPoint::MarkVoted, FailPoint::Commit] {
            let fixture = Fixture::new();
            fixture.store.inject_failure(point, 1);

            assert_eq!(
                cast(&fixture, fixture.candidate_id()).await,
                CommitOutcome::Failed,
                "{point:?}"
            );
            assert_eq!(count(&fixture), 0, "{point:?}");
            assert!(!flag_set(&fixture), "{point:?}");

            // Retrying is safe.
            assert!(matches!(
                cast(&fixture, fixture.candidate_id()).await,
                CommitOutcome::Committed(_)
            ));
            assert_eq!(count(&fixture), 1);
        }
    }

    #[rocket::async_test]
    async fn timeout_rolls_back_and_retry_succeeds() {
        let fixture = Fixture::build(Arc::new(LogNotifier), 1, Duration::from_millis(50));
        fixture.store.set_commit_delay(Some(Duration::from_millis(500)));

        assert_eq!(cast(&fixture, fixture.candidate_id()).await, CommitOutcome::Failed);
        assert_eq!(count(&fixture), 0);
        assert!(!flag_set(&fixture));

        fixture.store.set_commit_delay(None);
        assert!(matches!(
            cast(&fixture, fixture.candidate_id()).await,
            CommitOutcome::Committed(_)
        ));
        assert_eq!(count(&fixture), 1);
        assert!(flag_set(&fixture));
    }

    #[rocket::async_test]
    async fn notification_failure_does_not_undo_commit() {
        for notifier in [
            Arc::new(FailingNotifier) as Arc<dyn crate::notify::Notifier>,
            Arc::new(HangingNotifier) as Arc<dyn crate::notify::Notifier>,
        ] {
            let fixture = Fixture::with_notifier(notifier);
            let started = std::time::Instant::now();
            assert!(matches!(
                cast(&fixture, fixture.candidate_id()).await,
                CommitOutcome::Committed(_)
            ));
            // The commit does not wait for the notifier.
            assert!(started.elapsed() < Duration::from_secs(1));
            assert_eq!(count(&fixture), 1);
            assert!(flag_set(&fixture));
        }
    }

    #[rocket::async_test]
    async fn confirmation_describes_the_vote() {
        let recorder = Arc::new(RecordingNotifier::default());
        let fixture = Fixture::with_notifier(recorder.clone());
        let vote = cast(&fixture, fixture.candidate_id())
            .await
            .into_result()
            .unwrap();

        // Delivery happens on its own task.
        let mut sent = Vec::new();
        for _ in 0..50 {
            sent = recorder.sent.lock().unwrap().clone();
            if !sent.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sent.len(), 1);
        let confirmation = &sent[0];
        assert_eq!(confirmation.recipient, fixture.voter.sms);
        assert_eq!(confirmation.election_name, fixture.election.name);
        assert_eq!(confirmation.candidate, "Candidate 0 (Green Party)");
        assert_eq!(confirmation.vote_token, vote.vote_token);
    }

    #[rocket::async_test]
    async fn concurrent_commits_record_one_vote() {
        let fixture = Fixture::build(Arc::new(LogNotifier), 50, Duration::from_secs(5));
        let handles: Vec<_> = fixture
            .candidates
            .iter()
            .map(|candidate| {
                let booth = fixture.booth.clone();
                let (account_id, election_id, candidate_id) =
                    (fixture.account_id(), fixture.election.id, candidate.id);
                tokio::spawn(async move {
                    booth
                        .commit_vote(account_id, election_id, candidate_id, VoteToken::generate())
                        .await
                })
            })
            .collect();

        let mut committed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                CommitOutcome::Committed(_) => committed += 1,
                CommitOutcome::AlreadyVoted | CommitOutcome::Failed => {}
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(committed, 1);
        assert_eq!(count(&fixture), 1);
        assert!(flag_set(&fixture));
    }

    #[rocket::async_test]
    async fn voting_in_one_election_leaves_others_open() {
        let fixture = Fixture::new();
        let (other, other_candidate) = fixture.add_election();
        cast(&fixture, fixture.candidate_id()).await.into_result().unwrap();

        assert_eq!(
            fixture
                .booth
                .check_eligibility(fixture.account_id(), other.id)
                .await
                .unwrap(),
            Eligibility::Eligible
        );
        let outcome = fixture
            .booth
            .commit_vote(
                fixture.account_id(),
                other.id,
                other_candidate.id,
                VoteToken::generate(),
            )
            .await;
        assert!(matches!(outcome, CommitOutcome::Committed(_)));
        assert_eq!(fixture.store.vote_count(fixture.voter.id, other.id), 1);
        assert_eq!(count(&fixture), 1);
    }

    fn mongo_booth(store: MongoStore) -> VotingBooth {
        VotingBooth::new(
            Arc::new(store),
            Arc::new(LogNotifier),
            Duration::from_secs(10),
            Duration::from_millis(100),
        )
    }

    /// Insert an election with `n` candidates from one party.
    async fn seed_election(db: &Database, election: NewElection, n: usize) -> (Id, Vec<Id>) {
        let election_id = insert_doc(db, &election).await;
        let party_id = insert_doc(
            db,
            &NewParty {
                name: "Whigs".to_string(),
                election_id,
            },
        )
        .await;
        let mut candidates = Vec::new();
        for i in 0..n {
            let candidate = NewCandidate {
                name: format!("Candidate {i}"),
                party_id,
                election_id,
            };
            candidates.push(insert_doc(db, &candidate).await);
        }
        (election_id, candidates)
    }

    #[backend_test]
    async fn concurrent_commits_against_mongodb_record_one_vote(store: MongoStore, db: Database) {
        let (election_id, candidates) =
            seed_election(&db, NewElection::current_example(), 20).await;
        let voter = NewVoter::example();
        insert_doc(&db, &voter).await;
        let booth = mongo_booth(store);

        let handles: Vec<_> = candidates
            .into_iter()
            .map(|candidate_id| {
                let booth = booth.clone();
                let account_id = voter.account_id;
                tokio::spawn(async move {
                    booth
                        .commit_vote(account_id, election_id, candidate_id, VoteToken::generate())
                        .await
                })
            })
            .collect();

        let mut committed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                CommitOutcome::Committed(_) => committed += 1,
                CommitOutcome::AlreadyVoted | CommitOutcome::Failed => {}
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(committed, 1);

        let votes = Coll::<Vote>::from_db(&db)
            .count_documents(doc! { "election_id": election_id }, None)
            .await
            .unwrap();
        assert_eq!(votes, 1);
        let stored = booth
            .store()
            .voter_for_account(voter.account_id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.has_voted_in(election_id));
    }

    #[backend_test]
    async fn parallel_votes_in_different_elections_against_mongodb(
        store: MongoStore,
        db: Database,
    ) {
        let (first, first_candidates) =
            seed_election(&db, NewElection::current_example(), 1).await;
        let (second, second_candidates) =
            seed_election(&db, NewElection::current_example2(), 1).await;
        let voter = NewVoter::example();
        insert_doc(&db, &voter).await;
        let booth = mongo_booth(store);

        let ballots = [(first, first_candidates[0]), (second, second_candidates[0])];
        let handles: Vec<_> = ballots
            .iter()
            .map(|&(election_id, candidate_id)| {
                let booth = booth.clone();
                let account_id = voter.account_id;
                tokio::spawn(async move {
                    booth
                        .commit_vote(account_id, election_id, candidate_id, VoteToken::generate())
                        .await
                })
            })
            .collect();

        // Both flags share the voter document, so one side may lose a write
        // conflict. It must then be retryable.
        for (handle, &(election_id, candidate_id)) in handles.into_iter().zip(&ballots) {
            match handle.await.unwrap() {
                CommitOutcome::Committed(_) => {}
                CommitOutcome::Failed => {
                    let retry = booth
                        .commit_vote(
                            voter.account_id,
                            election_id,
                            candidate_id,
                            VoteToken::generate(),
                        )
                        .await;
                    assert!(matches!(retry, CommitOutcome::Committed(_)), "{retry:?}");
                }
                other => panic!("unexpected outcome {other:?}"),
            }
        }

        let stored = booth
            .store()
            .voter_for_account(voter.account_id)
            .await
            .unwrap()
            .unwrap();
        for (election_id, _) in ballots {
            assert!(stored.has_voted_in(election_id));
            assert!(booth.store().vote_of(stored.id, election_id).await.unwrap().is_some());
        }
    }
}
