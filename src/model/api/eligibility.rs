use serde::Serialize;

use crate::voting::Eligibility;

/// Response body of an eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EligibilityStatus {
    pub status: Eligibility,
}

impl From<Eligibility> for EligibilityStatus {
    fn from(status: Eligibility) -> Self {
        Self { status }
    }
}
