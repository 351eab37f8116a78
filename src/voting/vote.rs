use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Serialize, Deserialize};

use super::id::{Id, VoterId};

const RECEIPT_HEX_DIGITS: usize = 64;

/// One voter's choice on one poll. Never mutated once stored.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: Id,
    pub poll_id: Id,
    pub option_id: Id,
    pub voter: VoterId,
    pub transaction_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Display for Vote {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "({} on {}: {})", self.voter, self.poll_id, self.option_id)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewVote {
    pub poll_id: Id,
    pub option_id: Id,
    pub voter: VoterId,
    pub transaction_hash: Option<String>,
}

impl NewVote {
    pub fn new(poll_id: Id, option_id: Id, voter: VoterId) -> NewVote {
        NewVote {
            poll_id,
            option_id,
            voter,
            transaction_hash: Some(receipt_marker(&mut rand::thread_rng())),
        }
    }
}

/// Returned to the voter once their vote is stored.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteReceipt {
    pub vote_id: Id,
    pub poll_id: Id,
    pub option_id: Id,
    pub transaction_hash: String,
    pub cast_at: DateTime<Utc>,
}

impl VoteReceipt {
    /// Abbreviated marker for notifications, e.g. `0x1a2b3c4d...`.
    pub fn short_hash(&self) -> &str {
        let end = self.transaction_hash.len().min(10);
        &self.transaction_hash[..end]
    }
}

impl From<Vote> for VoteReceipt {
    fn from(vote: Vote) -> Self {
        VoteReceipt {
            vote_id: vote.id,
            poll_id: vote.poll_id,
            option_id: vote.option_id,
            transaction_hash: vote.transaction_hash.unwrap_or_default(),
            cast_at: vote.created_at,
        }
    }
}

/// Stand-in for an on-chain transaction hash: `0x` and 64 random hex digits.
pub fn receipt_marker<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut marker = String::with_capacity(2 + RECEIPT_HEX_DIGITS);
    marker.push_str("0x");
    for _ in 0..RECEIPT_HEX_DIGITS {
        let digit = rng.gen_range(0..16u32);
        marker.push(char::from_digit(digit, 16).unwrap_or('0'));
    }
    marker
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use rand::{rngs::StdRng, SeedableRng};
    use super::*;

    #[test]
    fn marker_shape() {
        let marker = receipt_marker(&mut StdRng::seed_from_u64(7));
        assert_eq!(marker.len(), 66);
        assert!(marker.starts_with("0x"));
        assert!(marker[2..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn markers_do_not_repeat() {
        let mut rng = rand::thread_rng();
        let markers: HashSet<String> = (0..1000).map(|_| receipt_marker(&mut rng)).collect();
        assert_eq!(markers.len(), 1000);
    }

    #[test]
    fn receipt_short_hash() {
        let vote = Vote {
            id: Id::new(),
            poll_id: Id::new(),
            option_id: Id::new(),
            voter: VoterId::parse("0xabc").unwrap(),
            transaction_hash: Some(String::from("0x0123456789abcdef")),
            created_at: Utc::now(),
        };
        let receipt = VoteReceipt::from(vote);
        assert_eq!(receipt.short_hash(), "0x01234567");
    }
}
