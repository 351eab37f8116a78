use std::collections::BTreeSet;

use serde::Serialize;

use super::id::{Id, VoterId};
use super::poll::Poll;
use super::vote::Vote;

const CREATED_POLL_POINTS: u64 = 10;
const VOTE_POINTS: u64 = 5;

/// Per-voter activity summary.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub voter: VoterId,
    pub created_polls: Vec<Poll>,
    pub voted_polls: Vec<Poll>,
    pub votes_cast_count: usize,
    /// Percent of opened polls the voter took part in, 0..=100.
    pub participation_rate: u32,
    pub reputation_score: u64,
}

impl Dashboard {
    /// `opened_polls` is the number of polls that are active or ended at the time of computation.
    pub fn compute(
        voter: VoterId,
        created_polls: Vec<Poll>,
        votes: &[Vote],
        voted_polls: Vec<Poll>,
        opened_polls: usize,
    ) -> Dashboard {
        let votes_cast_count = votes.iter().filter(|v| v.voter == voter).count();
        let distinct: BTreeSet<Id> = votes.iter()
            .filter(|v| v.voter == voter)
            .map(|v| v.poll_id)
            .collect();

        let participation_rate = participation_rate(distinct.len(), opened_polls);
        let reputation_score = reputation_score(created_polls.len(), votes_cast_count, participation_rate);

        Dashboard {
            voter,
            created_polls,
            voted_polls,
            votes_cast_count,
            participation_rate,
            reputation_score,
        }
    }
}

pub fn participation_rate(polls_voted: usize, opened_polls: usize) -> u32 {
    if opened_polls == 0 {
        return 0;
    }
    ((polls_voted * 100 / opened_polls) as u32).min(100)
}

pub fn reputation_score(polls_created: usize, votes_cast: usize, participation_rate: u32) -> u64 {
    CREATED_POLL_POINTS * polls_created as u64
        + VOTE_POINTS * votes_cast as u64
        + participation_rate as u64
}
