use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use super::PollStore;
use crate::clock::Clock;
use crate::error::StoreError;
use crate::feed::{BroadcastFeed, ChangeEvent, ChangeKind, Table};
use crate::voting::{Id, NewPoll, NewPollOption, NewVote, Poll, PollOption, Vote, VoterId};

use super::{OPTION_POSITION_UNIQUENESS, VOTE_UNIQUENESS};

/// Store operations that can be made to fail on demand.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Operation {
    ListPolls,
    GetPoll,
    PollsByCreator,
    PollsByIds,
    InsertPoll,
    DeletePoll,
    InsertOptions,
    OptionsForPoll,
    VoteCounts,
    FindVote,
    VotesByVoter,
    InsertVote,
}

#[derive(Default)]
struct Tables {
    // insertion order; listing sorts by creation time
    polls: Vec<Poll>,
    options: Vec<PollOption>,
    votes: Vec<Vote>,
}

/// Store kept in process memory, with the same constraints the SQL schema declares.
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    faults: Mutex<HashMap<Operation, usize>>,
    feed: Arc<BroadcastFeed>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    pub fn new(feed: Arc<BroadcastFeed>, clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            faults: Mutex::new(HashMap::new()),
            feed,
            clock,
        }
    }

    /// Makes the next `times` calls of `operation` fail as unavailable.
    pub fn fail_next(&self, operation: Operation, times: usize) {
        let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        faults.insert(operation, times);
    }

    pub fn vote_count(&self) -> usize {
        self.tables().votes.len()
    }

    pub fn poll_count(&self) -> usize {
        self.tables().polls.len()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Yields once so that concurrent callers interleave the way remote calls do.
    async fn enter(&self, operation: Operation) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        match faults.get_mut(&operation) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                debug!(?operation, "Injected store failure");
                Err(StoreError::Unavailable(format!("injected failure in {operation:?}")))
            }
            _ => Ok(()),
        }
    }

    fn newest_first(mut polls: Vec<Poll>) -> Vec<Poll> {
        // stable sort over reversed insertion order keeps later inserts first on ties
        polls.reverse();
        polls.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        polls
    }
}

#[async_trait]
impl PollStore for InMemoryStore {
    async fn list_polls(&self) -> Result<Vec<Poll>, StoreError> {
        self.enter(Operation::ListPolls).await?;
        let polls = self.tables().polls.clone();
        Ok(Self::newest_first(polls))
    }

    async fn get_poll(&self, id: Id) -> Result<Option<Poll>, StoreError> {
        self.enter(Operation::GetPoll).await?;
        Ok(self.tables().polls.iter().find(|p| p.id == id).cloned())
    }

    async fn polls_by_creator(&self, creator: &VoterId) -> Result<Vec<Poll>, StoreError> {
        self.enter(Operation::PollsByCreator).await?;
        let polls = self.tables().polls.iter()
            .filter(|p| &p.creator == creator)
            .cloned()
            .collect();
        Ok(Self::newest_first(polls))
    }

    async fn polls_by_ids(&self, ids: &[Id]) -> Result<Vec<Poll>, StoreError> {
        self.enter(Operation::PollsByIds).await?;
        let polls = self.tables().polls.iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect();
        Ok(Self::newest_first(polls))
    }

    async fn insert_poll(&self, poll: NewPoll) -> Result<Poll, StoreError> {
        self.enter(Operation::InsertPoll).await?;
        let NewPoll {
            title,
            description,
            creator,
            start_date,
            end_date,
            is_public,
            is_transparent,
            category,
            status,
        } = poll;
        if start_date > end_date {
            return Err(StoreError::Unavailable(String::from("check constraint violated on polls(start_date, end_date)")));
        }
        let poll = Poll {
            id: Id::new(),
            title,
            description,
            creator,
            start_date,
            end_date,
            is_public,
            is_transparent,
            category,
            created_at: self.clock.now(),
            stored_status: status,
        };
        self.tables().polls.push(poll.clone());
        self.feed.publish(ChangeEvent::new(Table::Polls, ChangeKind::Insert));
        Ok(poll)
    }

    async fn delete_poll(&self, id: Id) -> Result<(), StoreError> {
        self.enter(Operation::DeletePoll).await?;
        {
            let mut tables = self.tables();
            let before = tables.polls.len();
            tables.polls.retain(|p| p.id != id);
            if tables.polls.len() == before {
                return Err(StoreError::NotFound("poll"));
            }
            tables.options.retain(|o| o.poll_id != id);
            tables.votes.retain(|v| v.poll_id != id);
        }
        self.feed.publish(ChangeEvent::new(Table::Polls, ChangeKind::Delete));
        Ok(())
    }

    async fn insert_options(&self, options: Vec<NewPollOption>) -> Result<Vec<PollOption>, StoreError> {
        self.enter(Operation::InsertOptions).await?;
        let inserted: Vec<PollOption> = {
            let mut tables = self.tables();
            for option in &options {
                if !tables.polls.iter().any(|p| p.id == option.poll_id) {
                    return Err(StoreError::NotFound("poll"));
                }
                let taken = tables.options.iter()
                    .any(|o| o.poll_id == option.poll_id && o.position == option.position);
                if taken {
                    return Err(StoreError::Conflict(OPTION_POSITION_UNIQUENESS));
                }
            }
            let inserted: Vec<PollOption> = options.into_iter()
                .map(|o| PollOption { id: Id::new(), poll_id: o.poll_id, position: o.position, text: o.text })
                .collect();
            tables.options.extend(inserted.iter().cloned());
            inserted
        };
        self.feed.publish(ChangeEvent::new(Table::PollOptions, ChangeKind::Insert));
        Ok(inserted)
    }

    async fn options_for_poll(&self, poll_id: Id) -> Result<Vec<PollOption>, StoreError> {
        self.enter(Operation::OptionsForPoll).await?;
        let mut options: Vec<PollOption> = self.tables().options.iter()
            .filter(|o| o.poll_id == poll_id)
            .cloned()
            .collect();
        options.sort_by_key(|o| o.position);
        Ok(options)
    }

    async fn vote_counts(&self, poll_id: Id) -> Result<HashMap<Id, u64>, StoreError> {
        self.enter(Operation::VoteCounts).await?;
        let mut counts = HashMap::new();
        for vote in self.tables().votes.iter().filter(|v| v.poll_id == poll_id) {
            *counts.entry(vote.option_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn find_vote(&self, poll_id: Id, voter: &VoterId) -> Result<Option<Vote>, StoreError> {
        self.enter(Operation::FindVote).await?;
        Ok(self.tables().votes.iter()
            .find(|v| v.poll_id == poll_id && &v.voter == voter)
            .cloned())
    }

    async fn votes_by_voter(&self, voter: &VoterId) -> Result<Vec<Vote>, StoreError> {
        self.enter(Operation::VotesByVoter).await?;
        Ok(self.tables().votes.iter()
            .filter(|v| &v.voter == voter)
            .cloned()
            .collect())
    }

    async fn insert_vote(&self, vote: NewVote) -> Result<Vote, StoreError> {
        self.enter(Operation::InsertVote).await?;
        let vote = {
            // check and insert under one lock, like a unique index
            let mut tables = self.tables();
            let option_in_poll = tables.options.iter()
                .any(|o| o.id == vote.option_id && o.poll_id == vote.poll_id);
            if !option_in_poll {
                return Err(StoreError::NotFound("poll option"));
            }
            let duplicate = tables.votes.iter()
                .any(|v| v.poll_id == vote.poll_id && v.voter == vote.voter);
            if duplicate {
                return Err(StoreError::Conflict(VOTE_UNIQUENESS));
            }
            let vote = Vote {
                id: Id::new(),
                poll_id: vote.poll_id,
                option_id: vote.option_id,
                voter: vote.voter,
                transaction_hash: vote.transaction_hash,
                created_at: self.clock.now(),
            };
            tables.votes.push(vote.clone());
            vote
        };
        self.feed.publish(ChangeEvent::new(Table::Votes, ChangeKind::Insert));
        Ok(vote)
    }
}
