use std::fmt::{Display, Formatter};

use data_encoding::HEXUPPER;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

/// Number of random bytes in a vote token.
pub const VOTE_TOKEN_BYTES: usize = 16;

/// An opaque audit identifier recorded alongside a vote.
///
/// Tokens are always generated by the server for each commit attempt. They
/// identify a vote for correlation purposes only and grant nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoteToken(String);

impl VoteToken {
    /// Generate a fresh token from the thread-local CSPRNG.
    pub fn generate() -> Self {
        Self::generate_with(rand::thread_rng())
    }

    /// Generate a fresh token from the given CSPRNG.
    pub fn generate_with(mut rng: impl RngCore + CryptoRng) -> Self {
        let mut bytes = [0_u8; VOTE_TOKEN_BYTES];
        rng.fill_bytes(&mut bytes);
        Self(HEXUPPER.encode(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for VoteToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
