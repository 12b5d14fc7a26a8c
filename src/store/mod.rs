//! The durable store behind vote casting.
//!
//! [`VoteStore`] is the read side (directory lookups and vote existence) plus
//! the entry point to a [`VoteTransaction`], the scoped write that records a
//! vote and the voter's per-election flag together.

use std::sync::Arc;

use crate::error::Result;
use crate::model::{
    db::{
        candidate::Candidate,
        election::Election,
        party::Party,
        vote::{NewVote, Vote},
        voter::Voter,
    },
    mongodb::Id,
};

mod memory;
mod mongo;

pub use memory::{FailPoint, MemoryStore};
pub use mongo::MongoStore;
#[cfg(test)]
pub(crate) use mongo::testing::insert as insert_doc;

/// The store as held in managed state.
pub type SharedStore = Arc<dyn VoteStore>;

/// Lookups and transactional vote writes against the durable store.
///
/// Implementations must not cache anything across calls: every read reflects
/// the store as it is now.
#[rocket::async_trait]
pub trait VoteStore: Send + Sync {
    /// The voter profile belonging to the given account, if any.
    async fn voter_for_account(&self, account_id: Id) -> Result<Option<Voter>>;

    async fn election(&self, election_id: Id) -> Result<Option<Election>>;

    async fn candidate(&self, candidate_id: Id) -> Result<Option<Candidate>>;

    /// All candidates standing in the given election.
    async fn candidates_in(&self, election_id: Id) -> Result<Vec<Candidate>>;

    async fn party(&self, party_id: Id) -> Result<Option<Party>>;

    /// The vote the given voter cast in the given election, if any.
    async fn vote_of(&self, voter_id: Id, election_id: Id) -> Result<Option<Vote>>;

    /// Begin the transaction recording `voter_id`'s vote in `election_id`.
    async fn begin_vote(&self, voter_id: Id, election_id: Id) -> Result<Box<dyn VoteTransaction>>;
}

/// A scoped transaction recording one voter's vote in one election.
///
/// Nothing staged is visible to any reader until [`commit`](Self::commit)
/// succeeds, and then both writes become visible together. Dropping the
/// transaction without committing rolls it back.
#[rocket::async_trait]
pub trait VoteTransaction: Send {
    /// Stage the vote. Fails with [`Error::Conflict`](crate::error::Error::Conflict)
    /// if the store already holds a vote for this voter and election.
    async fn insert_vote(&mut self, vote: &NewVote) -> Result<Id>;

    /// Stage setting the voter's flag for this election. Fails with
    /// [`Error::Conflict`](crate::error::Error::Conflict) if it is already set.
    async fn mark_voted(&mut self) -> Result<()>;

    /// Make the staged writes durable and visible, atomically.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard the staged writes.
    async fn abort(self: Box<Self>) -> Result<()>;
}
