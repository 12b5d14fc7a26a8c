//! Vote casting: the eligibility gate and the vote commit protocol.

use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    db::{candidate::Candidate, election::Election, party::Party},
    mongodb::Id,
};
use crate::notify::SharedNotifier;
use crate::store::{SharedStore, VoteStore};

mod commit;
mod eligibility;

pub use commit::CommitOutcome;
pub use eligibility::Eligibility;

/// Everything needed to check eligibility and cast votes, held in managed state.
///
/// Holds no state of its own besides its collaborators, so every decision is
/// made against the store as it is at the time of the call.
#[derive(Clone)]
pub struct VotingBooth {
    store: SharedStore,
    notifier: SharedNotifier,
    commit_timeout: Duration,
    notify_timeout: Duration,
}

impl VotingBooth {
    pub fn new(
        store: SharedStore,
        notifier: SharedNotifier,
        commit_timeout: Duration,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            commit_timeout,
            notify_timeout,
        }
    }

    pub fn from_config(store: SharedStore, notifier: SharedNotifier, config: &Config) -> Self {
        Self::new(
            store,
            notifier,
            config.commit_timeout(),
            config.notify_timeout(),
        )
    }

    pub fn store(&self) -> &dyn VoteStore {
        &*self.store
    }

    /// The ballot for the given election, if the account may currently vote in it.
    pub async fn ballot(&self, account_id: Id, election_id: Id) -> Result<Ballot> {
        self.check_eligibility(account_id, election_id)
            .await?
            .into_result()?;

        let election = self
            .store
            .election(election_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Election {election_id}")))?;
        let mut candidates = Vec::new();
        for candidate in self.store.candidates_in(election_id).await? {
            let party = self.store.party(candidate.party_id).await?;
            candidates.push(BallotEntry { candidate, party });
        }

        Ok(Ballot {
            election,
            candidates,
        })
    }
}

/// An election and the candidates standing in it.
#[derive(Debug, Clone)]
pub struct Ballot {
    pub election: Election,
    pub candidates: Vec<BallotEntry>,
}

#[derive(Debug, Clone)]
pub struct BallotEntry {
    pub candidate: Candidate,
    /// `None` if the candidate's party does not resolve.
    pub party: Option<Party>,
}

impl BallotEntry {
    pub fn description(&self) -> String {
        self.candidate.describe(self.party.as_ref())
    }
}
