use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::model::{
    api::sms::Sms,
    mongodb::{serde_id_map, Id},
};

/// Name of the per-election voted flags within a voter document.
pub const VOTED_FIELD: &str = "voted";

/// Core voter user data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterCore {
    /// The authenticated account this voter profile belongs to.
    pub account_id: Id,
    pub name: String,
    /// Where vote confirmations are sent.
    pub sms: Sms,
    /// Maps election IDs to whether the voter has voted in that election.
    /// Only ever written by the vote commit, in the same transaction as the vote.
    #[serde(default, with = "serde_id_map")]
    pub voted: HashMap<Id, bool>,
}

impl VoterCore {
    /// Create a voter who has not yet voted anywhere.
    pub fn new(account_id: Id, name: impl Into<String>, sms: Sms) -> Self {
        Self {
            account_id,
            name: name.into(),
            sms,
            voted: HashMap::new(),
        }
    }

    /// Has this voter voted in the given election?
    pub fn has_voted_in(&self, election_id: Id) -> bool {
        self.voted.get(&election_id).copied().unwrap_or(false)
    }

    /// Path of the voted flag for the given election, for use in update documents.
    pub fn voted_flag_path(election_id: Id) -> String {
        format!("{VOTED_FIELD}.{election_id}")
    }
}

/// A voter without an ID.
pub type NewVoter = VoterCore;

/// A voter user from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub voter: VoterCore,
}

impl Deref for Voter {
    type Target = VoterCore;

    fn deref(&self) -> &Self::Target {
        &self.voter
    }
}

impl DerefMut for Voter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.voter
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl VoterCore {
        pub fn example() -> Self {
            Self::new(Id::new(), "Ada Lovelace", Sms::example())
        }
    }
}
