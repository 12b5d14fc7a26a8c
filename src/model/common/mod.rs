//! Types shared between the database and API representations.

mod vote_token;

pub use vote_token::{VoteToken, VOTE_TOKEN_BYTES};
