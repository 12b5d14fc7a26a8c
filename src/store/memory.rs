use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rocket::tokio::{
    self,
    sync::{Mutex as AsyncMutex, OwnedMutexGuard},
};

use crate::error::{Error, Result};
use crate::model::{
    db::{
        candidate::{Candidate, NewCandidate},
        election::{Election, NewElection},
        party::{NewParty, Party},
        vote::{NewVote, Vote},
        voter::{NewVoter, Voter},
    },
    mongodb::Id,
};

use super::{VoteStore, VoteTransaction};

/// Steps of a vote transaction at which a failure can be injected.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FailPoint {
    InsertVote,
    MarkVoted,
    Commit,
}

/// An in-process store for development and tests.
///
/// There is no native multi-document constraint enforcement here, so each
/// vote transaction holds a mutex keyed by `(voter, election)` from the moment
/// it begins until it commits or is dropped. Uniqueness is checked again when
/// the staged writes are applied, under the table lock.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    tables: Mutex<Tables>,
    ballot_locks: Mutex<HashMap<(Id, Id), Arc<AsyncMutex<()>>>>,
    faults: Mutex<Faults>,
}

#[derive(Default)]
struct Tables {
    elections: HashMap<Id, Election>,
    parties: HashMap<Id, Party>,
    candidates: HashMap<Id, Candidate>,
    voters: HashMap<Id, Voter>,
    votes: HashMap<Id, Vote>,
}

impl Tables {
    fn vote_of(&self, voter_id: Id, election_id: Id) -> Option<&Vote> {
        self.votes
            .values()
            .find(|v| v.voter_id == voter_id && v.election_id == election_id)
    }
}

#[derive(Default)]
struct Faults {
    remaining: HashMap<FailPoint, usize>,
    commit_delay: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        lock(&self.inner.tables)
    }

    pub fn insert_election(&self, election: NewElection) -> Election {
        let election = Election {
            id: Id::new(),
            election,
        };
        self.tables()
            .elections
            .insert(election.id, election.clone());
        election
    }

    pub fn insert_party(&self, party: NewParty) -> Party {
        let party = Party {
            id: Id::new(),
            party,
        };
        self.tables().parties.insert(party.id, party.clone());
        party
    }

    pub fn insert_candidate(&self, candidate: NewCandidate) -> Candidate {
        let candidate = Candidate {
            id: Id::new(),
            candidate,
        };
        self.tables()
            .candidates
            .insert(candidate.id, candidate.clone());
        candidate
    }

    pub fn insert_voter(&self, voter: NewVoter) -> Voter {
        let voter = Voter {
            id: Id::new(),
            voter,
        };
        self.tables().voters.insert(voter.id, voter.clone());
        voter
    }

    /// The voter with the given ID, as currently stored.
    pub fn voter(&self, voter_id: Id) -> Option<Voter> {
        self.tables().voters.get(&voter_id).cloned()
    }

    /// How many votes are stored for the given voter and election.
    pub fn vote_count(&self, voter_id: Id, election_id: Id) -> usize {
        self.tables()
            .votes
            .values()
            .filter(|v| v.voter_id == voter_id && v.election_id == election_id)
            .count()
    }

    /// Make the next `times` transactions reaching `point` fail there.
    pub fn inject_failure(&self, point: FailPoint, times: usize) {
        *lock(&self.inner.faults)
            .remaining
            .entry(point)
            .or_default() += times;
    }

    /// Make every commit wait this long before applying its writes.
    pub fn set_commit_delay(&self, delay: Option<Duration>) {
        lock(&self.inner.faults).commit_delay = delay;
    }

    fn take_failure(&self, point: FailPoint) -> Result<()> {
        let mut faults = lock(&self.inner.faults);
        match faults.remaining.get_mut(&point) {
            Some(n) if *n > 0 => {
                *n -= 1;
                Err(Error::TransientFailure(format!("Injected failure at {point:?}")))
            }
            _ => Ok(()),
        }
    }

    fn commit_delay(&self) -> Option<Duration> {
        lock(&self.inner.faults).commit_delay
    }

    fn ballot_lock(&self, voter_id: Id, election_id: Id) -> Arc<AsyncMutex<()>> {
        lock(&self.inner.ballot_locks)
            .entry((voter_id, election_id))
            .or_default()
            .clone()
    }

    /// Forget the ballot lock for `key` if `holders` is its only remaining
    /// reference outside the map.
    fn release_ballot_lock(&self, key: (Id, Id), holders: usize) {
        let mut locks = lock(&self.inner.ballot_locks);
        if locks
            .get(&key)
            .map_or(false, |mutex| Arc::strong_count(mutex) == holders + 1)
        {
            locks.remove(&key);
        }
    }

    #[cfg(test)]
    fn ballot_lock_count(&self) -> usize {
        lock(&self.inner.ballot_locks).len()
    }
}

/// Lock a table mutex. Critical sections never panic part-way through a
/// write, so a poisoned lock still holds consistent data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[rocket::async_trait]
impl VoteStore for MemoryStore {
    async fn voter_for_account(&self, account_id: Id) -> Result<Option<Voter>> {
        Ok(self
            .tables()
            .voters
            .values()
            .find(|v| v.account_id == account_id)
            .cloned())
    }

    async fn election(&self, election_id: Id) -> Result<Option<Election>> {
        Ok(self.tables().elections.get(&election_id).cloned())
    }

    async fn candidate(&self, candidate_id: Id) -> Result<Option<Candidate>> {
        Ok(self.tables().candidates.get(&candidate_id).cloned())
    }

    async fn candidates_in(&self, election_id: Id) -> Result<Vec<Candidate>> {
        let mut candidates: Vec<_> = self
            .tables()
            .candidates
            .values()
            .filter(|c| c.stands_in(election_id))
            .cloned()
            .collect();
        candidates.sort_by_key(|c| c.id);
        Ok(candidates)
    }

    async fn party(&self, party_id: Id) -> Result<Option<Party>> {
        Ok(self.tables().parties.get(&party_id).cloned())
    }

    async fn vote_of(&self, voter_id: Id, election_id: Id) -> Result<Option<Vote>> {
        Ok(self.tables().vote_of(voter_id, election_id).cloned())
    }

    async fn begin_vote(&self, voter_id: Id, election_id: Id) -> Result<Box<dyn VoteTransaction>> {
        let guard = self
            .ballot_lock(voter_id, election_id)
            .lock_owned()
            .await;
        Ok(Box::new(MemoryVoteTransaction {
            store: self.clone(),
            voter_id,
            election_id,
            staged_vote: None,
            staged_flag: false,
            _guard: guard,
        }))
    }
}

/// Writes are staged in the transaction and only touch the tables on commit,
/// so dropping it at any point is a rollback.
struct MemoryVoteTransaction {
    store: MemoryStore,
    voter_id: Id,
    election_id: Id,
    staged_vote: Option<Vote>,
    staged_flag: bool,
    _guard: OwnedMutexGuard<()>,
}

impl MemoryVoteTransaction {
    fn conflict(&self) -> Error {
        Error::Conflict(format!(
            "Voter {} has already voted in election {}",
            self.voter_id, self.election_id
        ))
    }
}

impl Drop for MemoryVoteTransaction {
    fn drop(&mut self) {
        // Our guard is still held here, and waiters hold clones of their own.
        self.store
            .release_ballot_lock((self.voter_id, self.election_id), 1);
    }
}

#[rocket::async_trait]
impl VoteTransaction for MemoryVoteTransaction {
    async fn insert_vote(&mut self, vote: &NewVote) -> Result<Id> {
        self.store.take_failure(FailPoint::InsertVote)?;
        if vote.voter_id != self.voter_id || vote.election_id != self.election_id {
            return Err(Error::Unexpected(
                "Vote does not belong to this transaction".to_string(),
            ));
        }
        let exists = self
            .store
            .tables()
            .vote_of(self.voter_id, self.election_id)
            .is_some();
        if exists || self.staged_vote.is_some() {
            return Err(self.conflict());
        }
        let id = Id::new();
        self.staged_vote = Some(Vote {
            id,
            vote: vote.clone(),
        });
        Ok(id)
    }

    async fn mark_voted(&mut self) -> Result<()> {
        self.store.take_failure(FailPoint::MarkVoted)?;
        let already = match self.store.tables().voters.get(&self.voter_id) {
            Some(voter) => voter.has_voted_in(self.election_id),
            None => return Err(Error::not_found(format!("Voter {}", self.voter_id))),
        };
        if already || self.staged_flag {
            return Err(self.conflict());
        }
        self.staged_flag = true;
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        if let Some(delay) = self.store.commit_delay() {
            tokio::time::sleep(delay).await;
        }
        self.store.take_failure(FailPoint::Commit)?;

        let store = self.store.clone();
        let mut tables = store.tables();
        // Constraint checks and both writes happen under one lock, so readers
        // see either neither write or both.
        if tables.vote_of(self.voter_id, self.election_id).is_some() {
            return Err(self.conflict());
        }
        let voter = match tables.voters.get_mut(&self.voter_id) {
            Some(voter) => voter,
            None => return Err(Error::not_found(format!("Voter {}", self.voter_id))),
        };
        if self.staged_flag {
            if voter.has_voted_in(self.election_id) {
                return Err(self.conflict());
            }
            voter.voted.insert(self.election_id, true);
        }
        if let Some(vote) = self.staged_vote.take() {
            tables.votes.insert(vote.id, vote);
        }
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
