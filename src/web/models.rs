//! JSON shapes served by the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::service::{CacheState, PollCache, PollDetails};
use crate::voting::{
    Dashboard, Id, Poll, PollFilter, PollStatus, PollTally, TimeRemaining, Vote, VoterId,
};

/// A poll with its status derived at response time.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollView {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub creator: VoterId,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_public: bool,
    pub is_transparent: bool,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub status: PollStatus,
    pub time_remaining: Option<TimeRemaining>,
}

impl PollView {
    pub fn new(poll: Poll, now: DateTime<Utc>) -> PollView {
        let status = poll.status(now);
        let time_remaining = poll.time_remaining(now);
        PollView {
            id: poll.id,
            title: poll.title,
            description: poll.description,
            creator: poll.creator,
            start_date: poll.start_date,
            end_date: poll.end_date,
            is_public: poll.is_public,
            is_transparent: poll.is_transparent,
            category: poll.category,
            created_at: poll.created_at,
            status,
            time_remaining,
        }
    }

    pub fn list(polls: Vec<Poll>, now: DateTime<Utc>) -> Vec<PollView> {
        polls.into_iter().map(|p| PollView::new(p, now)).collect()
    }
}

#[derive(Debug, Serialize)]
pub struct PollDetailsView {
    pub poll: PollView,
    pub tally: PollTally,
    /// Leading options, several on a tie. Empty while counts are hidden.
    pub leaders: Vec<Id>,
}

impl PollDetailsView {
    pub fn new(details: PollDetails) -> PollDetailsView {
        let PollDetails { poll, status, time_remaining, tally } = details;
        let mut poll = PollView::new(poll, tally.evaluated_at);
        poll.status = status;
        poll.time_remaining = time_remaining;
        PollDetailsView { poll, leaders: tally.leaders(), tally }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub voter: VoterId,
    pub created_polls: Vec<PollView>,
    pub voted_polls: Vec<PollView>,
    pub votes_cast_count: usize,
    pub participation_rate: u32,
    pub reputation_score: u64,
}

impl DashboardView {
    pub fn new(dashboard: Dashboard, now: DateTime<Utc>) -> DashboardView {
        DashboardView {
            voter: dashboard.voter,
            created_polls: PollView::list(dashboard.created_polls, now),
            voted_polls: PollView::list(dashboard.voted_polls, now),
            votes_cast_count: dashboard.votes_cast_count,
            participation_rate: dashboard.participation_rate,
            reputation_score: dashboard.reputation_score,
        }
    }
}

/// Query string of the browse endpoint. `status=all` or an empty value means no status filter.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub creator: Option<String>,
}

impl TryFrom<ListQuery> for PollFilter {
    type Error = ApiError;
    fn try_from(query: ListQuery) -> Result<Self, Self::Error> {
        let status = match query.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) if s.eq_ignore_ascii_case("all") => None,
            Some(s) => Some(s.parse::<PollStatus>().map_err(|err| {
                ApiError::new(warp::http::StatusCode::BAD_REQUEST, "invalid_filter", err)
            })?),
        };
        let category = query.category.filter(|c| !c.trim().is_empty() && !c.eq_ignore_ascii_case("all"));
        Ok(PollFilter {
            search: query.search,
            status,
            category,
            creator: query.creator.as_deref().and_then(VoterId::parse),
        })
    }
}

/// How long a dashboard long-poll may wait for a change, in seconds.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WaitQuery {
    pub wait: Option<u64>,
}

impl WaitQuery {
    pub const MAX_WAIT_SECS: u64 = 25;

    pub fn max() -> std::time::Duration {
        std::time::Duration::from_secs(Self::MAX_WAIT_SECS)
    }

    pub fn duration(&self) -> std::time::Duration {
        let secs = self.wait.unwrap_or(Self::MAX_WAIT_SECS).min(Self::MAX_WAIT_SECS);
        std::time::Duration::from_secs(secs)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteRequest {
    pub option_id: Id,
}

#[derive(Debug, Serialize)]
pub struct CreatedPoll {
    pub id: Id,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthView {
    pub cache: CacheState,
    pub polls: usize,
    pub subscribed: bool,
    pub last_error: Option<String>,
}

impl HealthView {
    pub fn new(cache: &PollCache) -> HealthView {
        HealthView {
            cache: cache.state(),
            polls: cache.len(),
            subscribed: cache.is_subscribed(),
            last_error: cache.last_error(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteLookup {
    pub has_voted: bool,
    pub vote: Option<Vote>,
}

impl From<Option<Vote>> for VoteLookup {
    fn from(vote: Option<Vote>) -> Self {
        VoteLookup { has_voted: vote.is_some(), vote }
    }
}
