//! Poll services wired over one store, feed and clock.

mod admission;
mod aggregation;
mod cache;
mod creation;

use std::sync::Arc;

use tracing::{info, warn};

pub use admission::VoteAdmission;
pub use aggregation::{Aggregator, DashboardWatch, PollDetails};
pub use cache::{CacheState, PollCache, Snapshot};
pub use creation::PollCreator;

use crate::clock::Clock;
use crate::error::{CreateError, ReadError, VoteError};
use crate::feed::ChangeFeed;
use crate::identity::IdentitySource;
use crate::store::PollStore;
use crate::voting::{Dashboard, Id, UnvalidatedCreatePollSettings, VoteReceipt};

/// Built once at startup and shared by reference with every consumer.
pub struct PollService {
    cache: Arc<PollCache>,
    admission: VoteAdmission,
    creator: PollCreator,
    aggregator: Arc<Aggregator>,
    clock: Arc<dyn Clock>,
}

impl PollService {
    pub fn new(store: Arc<dyn PollStore>, feed: Arc<dyn ChangeFeed>, clock: Arc<dyn Clock>) -> Self {
        let cache = Arc::new(PollCache::new(store.clone(), feed, clock.clone()));
        Self {
            admission: VoteAdmission::new(store.clone(), cache.clone(), clock.clone()),
            creator: PollCreator::new(store.clone(), cache.clone(), clock.clone()),
            aggregator: Arc::new(Aggregator::new(store, cache.clone(), clock.clone())),
            cache,
            clock,
        }
    }

    /// Loads the cache and subscribes it to the change feed.
    ///
    /// A failed first load is not fatal; the next feed event or refresh retries.
    pub async fn start(&self) {
        if let Err(err) = self.cache.initialize().await {
            warn!(error = %err, "Initial poll load failed");
        }
        self.cache.subscribe();
        info!(polls = self.cache.len(), "Poll service started");
    }

    pub fn shutdown(&self) {
        self.cache.teardown();
    }

    pub fn cache(&self) -> &Arc<PollCache> {
        &self.cache
    }

    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn session(self: &Arc<Self>, identity: Arc<dyn IdentitySource>) -> Session {
        Session { service: self.clone(), identity }
    }
}

/// The service as seen by one connected (or anonymous) client.
pub struct Session {
    service: Arc<PollService>,
    identity: Arc<dyn IdentitySource>,
}

impl Session {
    pub async fn cast_vote(&self, poll_id: Id, option_id: Id) -> Result<VoteReceipt, VoteError> {
        self.service.admission.cast_vote(self.identity.as_ref(), poll_id, option_id).await
    }

    pub async fn create_poll(&self, settings: UnvalidatedCreatePollSettings) -> Result<Id, CreateError> {
        self.service.creator.create_poll(self.identity.as_ref(), settings).await
    }

    /// Dashboard of the connected voter, `None` when no wallet is connected.
    pub async fn dashboard(&self) -> Result<Option<Dashboard>, ReadError> {
        match self.identity.current_voter_id() {
            Some(voter) => self.service.aggregator.dashboard(&voter).await.map(Some),
            None => Ok(None),
        }
    }

    pub fn watch_dashboard(&self) -> DashboardWatch {
        self.service.aggregator.watch(self.identity.clone())
    }
}
