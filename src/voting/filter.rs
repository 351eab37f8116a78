use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use super::id::VoterId;
use super::poll::Poll;
use super::status::PollStatus;

/// Client-side predicate over a poll snapshot. Unset fields match everything.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct PollFilter {
    pub search: Option<String>,
    pub status: Option<PollStatus>,
    pub category: Option<String>,
    pub creator: Option<VoterId>,
}

impl PollFilter {
    pub fn by_creator(creator: VoterId) -> PollFilter {
        PollFilter { creator: Some(creator), ..Default::default() }
    }

    pub fn matches(&self, poll: &Poll, now: DateTime<Utc>) -> bool {
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            if !poll.title.to_lowercase().contains(&search.to_lowercase()) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if poll.status(now) != status {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if !poll.category.eq_ignore_ascii_case(category.trim()) {
                return false;
            }
        }
        if let Some(creator) = &self.creator {
            if &poll.creator != creator {
                return false;
            }
        }
        true
    }

    pub fn apply<'a, I>(&self, polls: I, now: DateTime<Utc>) -> Vec<Poll>
    where
        I: IntoIterator<Item = &'a Poll>,
    {
        polls.into_iter()
            .filter(|p| self.matches(p, now))
            .cloned()
            .collect()
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseStats {
    pub total: usize,
    pub upcoming: usize,
    pub active: usize,
    pub ended: usize,
}

impl BrowseStats {
    pub fn collect<'a, I>(polls: I, now: DateTime<Utc>) -> BrowseStats
    where
        I: IntoIterator<Item = &'a Poll>,
    {
        polls.into_iter().fold(BrowseStats::default(), |mut stats, poll| {
            stats.total += 1;
            match poll.status(now) {
                PollStatus::Upcoming => stats.upcoming += 1,
                PollStatus::Active => stats.active += 1,
                PollStatus::Ended => stats.ended += 1,
            }
            stats
        })
    }

    /// Polls whose window has opened at some point.
    pub fn opened(&self) -> usize {
        self.active + self.ended
    }
}
