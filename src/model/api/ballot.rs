use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::db::candidate::INDEPENDENT;
use crate::voting::{Ballot, BallotEntry};

use super::id::ApiId;

/// An API-friendly ballot: the election being voted in and the candidates to choose from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotDescription {
    pub election_id: ApiId,
    pub name: String,
    pub description: String,
    /// Votes are accepted until this instant.
    pub end_time: DateTime<Utc>,
    pub candidates: Vec<BallotCandidate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotCandidate {
    /// Submit this to vote for the candidate.
    pub id: ApiId,
    pub name: String,
    pub party: String,
}

impl From<BallotEntry> for BallotCandidate {
    fn from(entry: BallotEntry) -> Self {
        Self {
            id: entry.candidate.id.into(),
            party: entry
                .party
                .map(|party| party.party.name)
                .unwrap_or_else(|| INDEPENDENT.to_string()),
            name: entry.candidate.candidate.name,
        }
    }
}

impl From<Ballot> for BallotDescription {
    fn from(ballot: Ballot) -> Self {
        let election = ballot.election;
        Self {
            election_id: election.id.into(),
            name: election.election.name,
            description: election.election.description,
            end_time: election.election.end_time,
            candidates: ballot.candidates.into_iter().map(Into::into).collect(),
        }
    }
}
