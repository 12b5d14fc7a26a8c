use std::{ops::Deref, str::FromStr};

use phonenumber::{Mode, PhoneNumber};
use serde::{Deserialize, Serialize};

/// A voter's SMS number, the address their vote confirmation is sent to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sms {
    inner: PhoneNumber,
}

impl Deref for Sms {
    type Target = PhoneNumber;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Sms {
    /// The number in E.164 format, as expected by SNS.
    pub fn e164(&self) -> String {
        self.inner.format().mode(Mode::E164).to_string()
    }
}

impl FromStr for Sms {
    type Err = phonenumber::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Sms {
            inner: s.parse::<PhoneNumber>()?,
        })
    }
}

impl TryFrom<String> for Sms {
    type Error = phonenumber::ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Sms> for String {
    fn from(sms: Sms) -> Self {
        sms.e164()
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Sms {
        pub fn example() -> Self {
            "+441234567890".parse().unwrap()
        }
    }
}
