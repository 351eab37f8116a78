//! Read models assembled from several independent queries.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::cache::PollCache;
use crate::clock::Clock;
use crate::error::ReadError;
use crate::identity::IdentitySource;
use crate::store::PollStore;
use crate::voting::{Dashboard, Id, Poll, PollStatus, PollTally, TimeRemaining, Vote, VoterId};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollDetails {
    pub poll: Poll,
    pub status: PollStatus,
    pub time_remaining: Option<TimeRemaining>,
    pub tally: PollTally,
}

pub struct Aggregator {
    store: Arc<dyn PollStore>,
    cache: Arc<PollCache>,
    clock: Arc<dyn Clock>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn PollStore>, cache: Arc<PollCache>, clock: Arc<dyn Clock>) -> Self {
        Self { store, cache, clock }
    }

    /// Activity summary for `voter`.
    ///
    /// Voted polls take two sequential queries: the voter's votes, then the
    /// polls those votes reference.
    pub async fn dashboard(&self, voter: &VoterId) -> Result<Dashboard, ReadError> {
        let created = self.store.polls_by_creator(voter).await?;
        let votes = self.store.votes_by_voter(voter).await?;

        let poll_ids: Vec<Id> = votes.iter()
            .map(|v| v.poll_id)
            .collect::<BTreeSet<Id>>()
            .into_iter()
            .collect();
        let voted = if poll_ids.is_empty() {
            vec![]
        } else {
            self.store.polls_by_ids(&poll_ids).await?
        };

        let opened = self.cache.stats().opened();
        debug!(voter = %voter, created = created.len(), votes = votes.len(), "Dashboard computed");
        Ok(Dashboard::compute(voter.clone(), created, &votes, voted, opened))
    }

    pub async fn poll_details(&self, poll_id: Id) -> Result<PollDetails, ReadError> {
        let poll = self.store.get_poll(poll_id).await?.ok_or(ReadError::UnknownPoll(poll_id))?;
        let options = self.store.options_for_poll(poll_id).await?;
        let counts = self.store.vote_counts(poll_id).await?;

        let now = self.clock.now();
        Ok(PollDetails {
            status: poll.status(now),
            time_remaining: poll.time_remaining(now),
            tally: PollTally::evaluate(&poll, &options, &counts, now),
            poll,
        })
    }

    /// The vote `voter` cast on a poll, if any.
    pub async fn vote_of(&self, poll_id: Id, voter: &VoterId) -> Result<Option<Vote>, ReadError> {
        Ok(self.store.find_vote(poll_id, voter).await?)
    }

    /// Keeps a dashboard for the connected voter up to date.
    ///
    /// Recomputes when the identity changes or the poll cache grows; `None`
    /// while no wallet is connected.
    pub fn watch(self: &Arc<Self>, identity: Arc<dyn IdentitySource>) -> DashboardWatch {
        let (sender, receiver) = watch::channel(None);
        let aggregator = self.clone();
        let task = tokio::spawn(async move {
            let mut identity_rx = identity.changes();
            let mut cache_rx = aggregator.cache.changes();
            let mut last_size = cache_rx.borrow_and_update().polls.len();

            loop {
                let voter = identity_rx.borrow_and_update().clone();
                match voter {
                    None => {
                        sender.send_replace(None);
                    }
                    Some(voter) => match aggregator.dashboard(&voter).await {
                        Ok(dashboard) => {
                            sender.send_replace(Some(dashboard));
                        }
                        // keep showing the previous dashboard
                        Err(err) => warn!(voter = %voter, error = %err, "Dashboard refresh failed"),
                    },
                }

                loop {
                    tokio::select! {
                        changed = identity_rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                            break;
                        }
                        changed = cache_rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                            let size = cache_rx.borrow_and_update().polls.len();
                            let grew = size > last_size;
                            last_size = size;
                            if grew {
                                break;
                            }
                        }
                    }
                }
            }
        });
        DashboardWatch { receiver, task }
    }
}

/// Live dashboard. Dropping it stops the updates.
pub struct DashboardWatch {
    receiver: watch::Receiver<Option<Dashboard>>,
    task: JoinHandle<()>,
}

impl DashboardWatch {
    pub fn current(&self) -> Option<Dashboard> {
        self.receiver.borrow().clone()
    }

    pub fn receiver(&self) -> watch::Receiver<Option<Dashboard>> {
        self.receiver.clone()
    }
}

impl Drop for DashboardWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::clock::ManualClock;
    use crate::feed::BroadcastFeed;
    use crate::identity::{FixedIdentity, WalletSession};
    use crate::service::{PollCreator, VoteAdmission};
    use crate::store::memory::{InMemoryStore, Operation};
    use crate::voting::UnvalidatedCreatePollSettings;

    struct Fixture {
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        cache: Arc<PollCache>,
        creator: PollCreator,
        admission: VoteAdmission,
        aggregator: Arc<Aggregator>,
    }

    fn fixture() -> Fixture {
        let feed = Arc::new(BroadcastFeed::new());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap()));
        let store = Arc::new(InMemoryStore::new(feed.clone(), clock.clone()));
        let cache = Arc::new(PollCache::new(store.clone(), feed, clock.clone()));
        Fixture {
            creator: PollCreator::new(store.clone(), cache.clone(), clock.clone()),
            admission: VoteAdmission::new(store.clone(), cache.clone(), clock.clone()),
            aggregator: Arc::new(Aggregator::new(store.clone(), cache.clone(), clock.clone())),
            store,
            clock,
            cache,
        }
    }

    fn open_settings(f: &Fixture, title: &str, transparent: bool) -> UnvalidatedCreatePollSettings {
        UnvalidatedCreatePollSettings {
            title: String::from(title),
            description: String::from("d"),
            options: vec![String::from("Yes"), String::from("No")],
            end_date: Some(f.clock.now() + Duration::days(1)),
            is_transparent: Some(transparent),
            ..Default::default()
        }
    }

    fn identity(address: &str) -> FixedIdentity {
        FixedIdentity::from_header(Some(address))
    }

    #[tokio::test]
    async fn creator_and_voter_dashboards() {
        let f = fixture();
        let a = identity("0xa");
        let b = identity("0xb");

        let poll_id = f.creator.create_poll(&a, open_settings(&f, "P", true)).await.unwrap();
        let yes = f.store.options_for_poll(poll_id).await.unwrap()[0].id;
        f.admission.cast_vote(&b, poll_id, yes).await.unwrap();

        let dash_b = f.aggregator.dashboard(&VoterId::parse("0xb").unwrap()).await.unwrap();
        assert_eq!(dash_b.votes_cast_count, 1);
        assert_eq!(dash_b.voted_polls.iter().map(|p| p.id).collect::<Vec<_>>(), vec![poll_id]);
        assert_eq!(dash_b.participation_rate, 100);

        let dash_a = f.aggregator.dashboard(&VoterId::parse("0xa").unwrap()).await.unwrap();
        assert!(dash_a.created_polls.iter().any(|p| p.id == poll_id));
        assert_eq!(dash_a.votes_cast_count, 0);
    }

    #[tokio::test]
    async fn votes_cast_matches_vote_rows() {
        let f = fixture();
        let creator = identity("0xc");
        let voters = ["0x1", "0x2", "0x3"];
        for round in 0..3 {
            let id = f.creator.create_poll(&creator, open_settings(&f, &format!("P{round}"), true)).await.unwrap();
            let option = f.store.options_for_poll(id).await.unwrap()[round % 2].id;
            for voter in &voters[..=round] {
                f.admission.cast_vote(&identity(voter), id, option).await.unwrap();
            }
        }
        for (i, voter) in voters.iter().enumerate() {
            let voter = VoterId::parse(voter).unwrap();
            let rows = f.store.votes_by_voter(&voter).await.unwrap().len();
            let dash = f.aggregator.dashboard(&voter).await.unwrap();
            assert_eq!(dash.votes_cast_count, rows);
            assert_eq!(dash.votes_cast_count, 3 - i);
        }
    }

    #[tokio::test]
    async fn dashboard_store_failure() {
        let f = fixture();
        f.store.fail_next(Operation::VotesByVoter, 1);
        let result = f.aggregator.dashboard(&VoterId::parse("0xa").unwrap()).await;
        assert!(matches!(result, Err(ReadError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn details_with_tally() {
        let f = fixture();
        let poll_id = f.creator.create_poll(&identity("0xa"), open_settings(&f, "P", true)).await.unwrap();
        let options = f.store.options_for_poll(poll_id).await.unwrap();
        f.admission.cast_vote(&identity("0x1"), poll_id, options[0].id).await.unwrap();
        f.admission.cast_vote(&identity("0x2"), poll_id, options[0].id).await.unwrap();
        f.admission.cast_vote(&identity("0x3"), poll_id, options[1].id).await.unwrap();

        let details = f.aggregator.poll_details(poll_id).await.unwrap();
        assert_eq!(details.status, PollStatus::Active);
        assert_eq!(details.tally.total_votes, Some(3));
        assert_eq!(details.tally.options[0].votes, Some(2));
        assert_eq!(details.time_remaining.map(|t| t.days), Some(1));

        let vote = f.aggregator.vote_of(poll_id, &VoterId::parse("0x3").unwrap()).await.unwrap();
        assert_eq!(vote.map(|v| v.option_id), Some(options[1].id));

        let missing = Id::new();
        assert_eq!(f.aggregator.poll_details(missing).await.err(), Some(ReadError::UnknownPoll(missing)));
    }

    #[tokio::test]
    async fn anonymous_details_hide_counts() {
        let f = fixture();
        let poll_id = f.creator.create_poll(&identity("0xa"), open_settings(&f, "P", false)).await.unwrap();
        let details = f.aggregator.poll_details(poll_id).await.unwrap();
        assert!(details.tally.hidden);
        assert_eq!(details.tally.total_votes, None);
    }

    async fn next_dashboard(
        rx: &mut watch::Receiver<Option<Dashboard>>,
        ready: impl Fn(&Option<Dashboard>) -> bool,
    ) -> Option<Dashboard> {
        tokio::time::timeout(StdDuration::from_secs(5), async {
            loop {
                {
                    let current = rx.borrow_and_update();
                    if ready(&current) {
                        return current.clone();
                    }
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("dashboard did not update")
    }

    #[tokio::test]
    async fn watch_follows_identity_and_cache_growth() {
        let f = fixture();
        f.cache.initialize().await.unwrap();
        let wallet = Arc::new(WalletSession::new());
        let watch = f.aggregator.watch(wallet.clone());
        let mut rx = watch.receiver();

        assert_eq!(next_dashboard(&mut rx, |d| d.is_none()).await, None);

        wallet.connect("0xa");
        let dash = next_dashboard(&mut rx, |d| d.is_some()).await.unwrap();
        assert!(dash.created_polls.is_empty());

        // creating a poll grows the cache, which recomputes the dashboard
        f.creator.create_poll(wallet.as_ref(), open_settings(&f, "P", true)).await.unwrap();
        let dash = next_dashboard(&mut rx, |d| d.as_ref().is_some_and(|d| d.created_polls.len() == 1)).await;
        assert_eq!(dash.unwrap().reputation_score, 10);

        wallet.disconnect();
        assert_eq!(next_dashboard(&mut rx, |d| d.is_none()).await, None);
        assert_eq!(watch.current(), None);
    }
}
