//! Persistence port. Implementations: [`memory::InMemoryStore`] and the
//! Postgres adapter in `web::db`.

pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::voting::{Id, NewPoll, NewPollOption, NewVote, Poll, PollOption, Vote, VoterId};

pub use memory::InMemoryStore;

/// One vote per voter per poll.
pub const VOTE_UNIQUENESS: &str = "votes(poll_id, voter_address)";
/// Option positions are unique within a poll.
pub const OPTION_POSITION_UNIQUENESS: &str = "poll_options(poll_id, position)";

#[async_trait]
pub trait PollStore: Send + Sync {
    /// All polls, newest first.
    async fn list_polls(&self) -> Result<Vec<Poll>, StoreError>;

    async fn get_poll(&self, id: Id) -> Result<Option<Poll>, StoreError>;

    /// Polls created by `creator`, newest first.
    async fn polls_by_creator(&self, creator: &VoterId) -> Result<Vec<Poll>, StoreError>;

    /// Polls whose id is in `ids`, newest first. Unknown ids are skipped.
    async fn polls_by_ids(&self, ids: &[Id]) -> Result<Vec<Poll>, StoreError>;

    async fn insert_poll(&self, poll: NewPoll) -> Result<Poll, StoreError>;

    /// Removes a poll together with its options and votes.
    async fn delete_poll(&self, id: Id) -> Result<(), StoreError>;

    /// Inserts the whole batch or nothing.
    async fn insert_options(&self, options: Vec<NewPollOption>) -> Result<Vec<PollOption>, StoreError>;

    /// Options of a poll in display order.
    async fn options_for_poll(&self, poll_id: Id) -> Result<Vec<PollOption>, StoreError>;

    /// Number of votes per option of a poll. Options without votes may be absent.
    async fn vote_counts(&self, poll_id: Id) -> Result<HashMap<Id, u64>, StoreError>;

    async fn find_vote(&self, poll_id: Id, voter: &VoterId) -> Result<Option<Vote>, StoreError>;

    async fn votes_by_voter(&self, voter: &VoterId) -> Result<Vec<Vote>, StoreError>;

    /// Fails with [`StoreError::Conflict`] if `voter` already has a vote on the poll,
    /// and with [`StoreError::NotFound`] if the option is not part of the poll.
    async fn insert_vote(&self, vote: NewVote) -> Result<Vote, StoreError>;
}
