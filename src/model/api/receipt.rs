use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{common::VoteToken, db::vote::Vote};

use super::id::ApiId;

/// A request to vote for a candidate. The vote token is always generated by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoteRequest {
    pub candidate_id: ApiId,
}

/// Proof of a recorded vote, returned to the voter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub vote_id: ApiId,
    pub vote_token: VoteToken,
    pub voted_at: DateTime<Utc>,
}

impl From<Vote> for VoteReceipt {
    fn from(vote: Vote) -> Self {
        Self {
            vote_id: vote.id.into(),
            vote_token: vote.vote.vote_token,
            voted_at: vote.vote.voted_at,
        }
    }
}
