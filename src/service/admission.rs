use std::sync::Arc;

use tracing::{debug, info, warn};

use super::cache::PollCache;
use crate::clock::Clock;
use crate::error::{StoreError, VoteError};
use crate::identity::IdentitySource;
use crate::store::{PollStore, VOTE_UNIQUENESS};
use crate::voting::{Id, NewVote, PollStatus, VoteReceipt};

/// Admits at most one vote per (poll, voter).
///
/// The duplicate pre-check only spares a write in the common case. The
/// guarantee comes from the store's unique index on (poll, voter): when two
/// admissions race past the pre-check, the losing insert fails with a
/// conflict and is reported as [`VoteError::AlreadyVoted`].
pub struct VoteAdmission {
    store: Arc<dyn PollStore>,
    cache: Arc<PollCache>,
    clock: Arc<dyn Clock>,
}

impl VoteAdmission {
    pub fn new(store: Arc<dyn PollStore>, cache: Arc<PollCache>, clock: Arc<dyn Clock>) -> Self {
        Self { store, cache, clock }
    }

    pub async fn cast_vote(
        &self,
        identity: &dyn IdentitySource,
        poll_id: Id,
        option_id: Id,
    ) -> Result<VoteReceipt, VoteError> {
        let voter = identity.current_voter_id().ok_or(VoteError::Unauthenticated)?;

        if self.store.find_vote(poll_id, &voter).await.map_err(unavailable)?.is_some() {
            debug!(poll_id = %poll_id, voter = %voter, "Vote rejected, already voted");
            return Err(VoteError::AlreadyVoted);
        }

        let poll = self.store.get_poll(poll_id).await
            .map_err(unavailable)?
            .ok_or(VoteError::UnknownPoll(poll_id))?;
        let status = poll.status(self.clock.now());
        if status != PollStatus::Active {
            debug!(poll_id = %poll_id, %status, "Vote rejected, poll not open");
            return Err(VoteError::PollNotOpen { poll_id, status });
        }

        let options = self.store.options_for_poll(poll_id).await.map_err(unavailable)?;
        if !options.iter().any(|o| o.id == option_id) {
            return Err(VoteError::UnknownOption { poll_id, option_id });
        }

        let vote = match self.store.insert_vote(NewVote::new(poll_id, option_id, voter.clone())).await {
            Ok(vote) => vote,
            Err(StoreError::Conflict(VOTE_UNIQUENESS)) => {
                info!(poll_id = %poll_id, voter = %voter, "Concurrent duplicate vote rejected by store");
                return Err(VoteError::AlreadyVoted);
            }
            Err(StoreError::NotFound("poll")) => return Err(VoteError::UnknownPoll(poll_id)),
            Err(StoreError::NotFound(_)) => return Err(VoteError::UnknownOption { poll_id, option_id }),
            Err(err) => return Err(unavailable(err)),
        };

        let receipt = VoteReceipt::from(vote);
        info!(poll_id = %poll_id, voter = %voter, tx = receipt.short_hash(), "Vote cast");

        // the vote stands even if the cache cannot catch up yet
        if let Err(err) = self.cache.refresh().await {
            warn!(error = %err, "Cache refresh after vote failed");
        }
        Ok(receipt)
    }
}

fn unavailable(err: StoreError) -> VoteError {
    VoteError::StoreUnavailable(err.to_string())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::clock::ManualClock;
    use crate::feed::BroadcastFeed;
    use crate::identity::{FixedIdentity, WalletSession};
    use crate::store::memory::{InMemoryStore, Operation};
    use crate::voting::{NewPoll, NewPollOption, Poll, PollOption, VoterId};

    struct Fixture {
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        cache: Arc<PollCache>,
        admission: Arc<VoteAdmission>,
    }

    fn fixture() -> Fixture {
        let feed = Arc::new(BroadcastFeed::new());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap()));
        let store = Arc::new(InMemoryStore::new(feed.clone(), clock.clone()));
        let cache = Arc::new(PollCache::new(store.clone(), feed, clock.clone()));
        let admission = Arc::new(VoteAdmission::new(store.clone(), cache.clone(), clock.clone()));
        Fixture { store, clock, cache, admission }
    }

    async fn open_poll(f: &Fixture, start_in_hours: i64) -> (Poll, Vec<PollOption>) {
        let start = f.clock.now() + Duration::hours(start_in_hours);
        let poll = f.store.insert_poll(NewPoll {
            title: String::from("Should we implement gasless voting?"),
            description: String::from("d"),
            creator: VoterId::parse("0xcreator").unwrap(),
            start_date: start,
            end_date: start + Duration::hours(1),
            is_public: true,
            is_transparent: true,
            category: String::from("Governance"),
            status: PollStatus::Active,
        }).await.unwrap();
        let options = f.store
            .insert_options(NewPollOption::batch(poll.id, vec![String::from("Yes"), String::from("No")]))
            .await
            .unwrap();
        (poll, options)
    }

    fn voter(address: &str) -> FixedIdentity {
        FixedIdentity::from_header(Some(address))
    }

    #[tokio::test]
    async fn requires_identity() {
        let f = fixture();
        let (poll, options) = open_poll(&f, 0).await;
        let result = f.admission.cast_vote(&WalletSession::new(), poll.id, options[0].id).await;
        assert_eq!(result, Err(VoteError::Unauthenticated));
        assert_eq!(f.store.vote_count(), 0);
    }

    #[tokio::test]
    async fn second_vote_rejected() {
        let f = fixture();
        let (poll, options) = open_poll(&f, 0).await;
        let alice = voter("0xalice");

        let receipt = f.admission.cast_vote(&alice, poll.id, options[0].id).await.unwrap();
        assert_eq!(receipt.poll_id, poll.id);
        assert!(receipt.transaction_hash.starts_with("0x"));

        let again = f.admission.cast_vote(&alice, poll.id, options[1].id).await;
        assert_eq!(again, Err(VoteError::AlreadyVoted));
        assert_eq!(f.store.vote_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_votes_admit_exactly_one() {
        let f = fixture();
        let (poll, options) = open_poll(&f, 0).await;

        let attempts: Vec<_> = (0..16).map(|i| {
            let admission = f.admission.clone();
            let option_id = options[i % 2].id;
            tokio::spawn(async move {
                admission.cast_vote(&voter("0xalice"), poll.id, option_id).await
            })
        }).collect();
        let mut results: Vec<Result<VoteReceipt, VoteError>> = vec![];
        for attempt in attempts {
            results.push(attempt.await.unwrap());
        }

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().filter(|r| r.is_err()).all(|r| r == &Err(VoteError::AlreadyVoted)));
        assert_eq!(f.store.vote_count(), 1);
    }

    #[tokio::test]
    async fn racing_pre_checks_resolved_by_store() {
        let f = fixture();
        let (poll, options) = open_poll(&f, 0).await;
        let (first, second) = (voter("0xalice"), voter("0xalice"));

        // both admissions pass the pre-check before either inserts
        let (a, b) = tokio::join!(
            f.admission.cast_vote(&first, poll.id, options[0].id),
            f.admission.cast_vote(&second, poll.id, options[1].id),
        );
        assert!(a.is_ok());
        assert_eq!(b, Err(VoteError::AlreadyVoted));
        assert_eq!(f.store.vote_count(), 1);
    }

    #[tokio::test]
    async fn window_policy() {
        let f = fixture();
        let (poll, options) = open_poll(&f, 1).await;
        assert_eq!(f.cache.refresh().await, Ok(()));

        let early = f.admission.cast_vote(&voter("0xa"), poll.id, options[0].id).await;
        assert_eq!(early, Err(VoteError::PollNotOpen { poll_id: poll.id, status: PollStatus::Upcoming }));

        f.clock.advance(Duration::minutes(90));
        assert!(f.admission.cast_vote(&voter("0xa"), poll.id, options[0].id).await.is_ok());

        f.clock.advance(Duration::hours(1));
        let late = f.admission.cast_vote(&voter("0xb"), poll.id, options[0].id).await;
        assert_eq!(late, Err(VoteError::PollNotOpen { poll_id: poll.id, status: PollStatus::Ended }));
        assert_eq!(f.store.vote_count(), 1);
    }

    #[tokio::test]
    async fn option_must_belong_to_poll() {
        let f = fixture();
        let (poll, _) = open_poll(&f, 0).await;
        let (_, other) = open_poll(&f, 0).await;
        let result = f.admission.cast_vote(&voter("0xa"), poll.id, other[0].id).await;
        assert_eq!(result, Err(VoteError::UnknownOption { poll_id: poll.id, option_id: other[0].id }));

        let missing = Id::new();
        let result = f.admission.cast_vote(&voter("0xa"), missing, other[0].id).await;
        assert_eq!(result, Err(VoteError::UnknownPoll(missing)));
    }

    #[tokio::test]
    async fn transient_failure_is_retryable() {
        let f = fixture();
        let (poll, options) = open_poll(&f, 0).await;
        f.store.fail_next(Operation::InsertVote, 1);

        let first = f.admission.cast_vote(&voter("0xa"), poll.id, options[0].id).await;
        assert!(matches!(first, Err(VoteError::StoreUnavailable(_))));
        assert_eq!(f.store.vote_count(), 0);

        assert!(f.admission.cast_vote(&voter("0xa"), poll.id, options[0].id).await.is_ok());
        assert_eq!(f.store.vote_count(), 1);
    }

    #[tokio::test]
    async fn vote_stands_when_refresh_fails() {
        let f = fixture();
        let (poll, options) = open_poll(&f, 0).await;
        f.store.fail_next(Operation::ListPolls, 1);
        assert!(f.admission.cast_vote(&voter("0xa"), poll.id, options[0].id).await.is_ok());
        assert_eq!(f.store.vote_count(), 1);
    }

    #[tokio::test]
    async fn success_refreshes_cache() {
        let f = fixture();
        let (poll, options) = open_poll(&f, 0).await;
        assert!(f.cache.is_empty());
        f.admission.cast_vote(&voter("0xa"), poll.id, options[0].id).await.unwrap();
        assert_eq!(f.cache.get(poll.id).map(|p| p.id), Some(poll.id));
    }
}
