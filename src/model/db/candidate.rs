use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::model::{db::party::Party, mongodb::Id};

/// Shown in place of a party name when the candidate's party cannot be found.
pub const INDEPENDENT: &str = "Independent";

/// Core candidate data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateCore {
    pub name: String,
    /// Foreign Key party ID.
    pub party_id: Id,
    /// Foreign Key election ID.
    pub election_id: Id,
}

impl CandidateCore {
    /// Human-readable description, e.g. `"Jane Doe (Green Party)"`.
    pub fn describe(&self, party: Option<&Party>) -> String {
        let party_name = party.map(|p| p.name.as_str()).unwrap_or(INDEPENDENT);
        format!("{} ({})", self.name, party_name)
    }
}

/// A candidate without an ID.
pub type NewCandidate = CandidateCore;

/// A candidate from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub candidate: CandidateCore,
}

impl Candidate {
    /// Does this candidate stand in the given election?
    pub fn stands_in(&self, election_id: Id) -> bool {
        self.election_id == election_id
    }
}

impl Deref for Candidate {
    type Target = CandidateCore;

    fn deref(&self) -> &Self::Target {
        &self.candidate
    }
}
