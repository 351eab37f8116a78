use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Serialize, Deserialize};
use uuid::Uuid;

/// Store-assigned identity of a poll, option or vote row.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(pub Uuid);
impl Id {
    pub const fn nil() -> Id {
        Id(Uuid::nil())
    }
    pub fn new() -> Id {
        Id(Uuid::new_v4())
    }
}
impl Default for Id {
    fn default() -> Self {
        Id::nil()
    }
}
impl Display for Id {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl From<Uuid> for Id {
    fn from(value: Uuid) -> Self {
        Id(value)
    }
}
impl FromStr for Id {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Id)
    }
}


/// Opaque wallet address supplied by the identity provider.
///
/// Never interpreted beyond trimming; two voters are the same voter exactly
/// when their addresses compare equal.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoterId(String);
impl VoterId {
    /// Longest address the `voter_address` and `creator` columns hold.
    pub const MAX_LENGTH: usize = 100;

    /// Returns `None` for a blank or over-long address, which callers treat
    /// as "not connected". Length is counted in characters, as VARCHAR does.
    pub fn parse(address: &str) -> Option<VoterId> {
        let address = address.trim();
        if address.is_empty() || address.chars().count() > Self::MAX_LENGTH {
            None
        } else {
            Some(VoterId(String::from(address)))
        }
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl Display for VoterId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl PartialEq<&str> for VoterId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
