use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// Lifecycle of a poll relative to its voting window.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    Upcoming,
    Active,
    Ended,
}

impl PollStatus {
    /// Derives the status from the wall clock. Both window bounds are inclusive.
    pub fn derive(now: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) -> PollStatus {
        if now < start {
            PollStatus::Upcoming
        } else if now <= end {
            PollStatus::Active
        } else {
            PollStatus::Ended
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            PollStatus::Upcoming => "upcoming",
            PollStatus::Active => "active",
            PollStatus::Ended => "ended",
        }
    }
}

impl Display for PollStatus {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PollStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "upcoming" => Ok(PollStatus::Upcoming),
            "active" => Ok(PollStatus::Active),
            "ended" => Ok(PollStatus::Ended),
            other => Err(format!("unknown poll status '{other}'")),
        }
    }
}
