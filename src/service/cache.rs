//! In-memory poll list kept in step with the store.
//!
//! Consistency is eventual and by full refresh: every change notification on
//! the `polls` table re-reads the whole table instead of patching the cached
//! list from a partial payload.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::ReadError;
use crate::feed::{ChangeFeed, Table};
use crate::store::PollStore;
use crate::voting::{BrowseStats, Id, Poll, PollFilter, VoterId};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    Loading,
    Ready,
    Error,
}

/// Complete view of the cache at one instant. Replaced whole, never edited in place.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub state: CacheState,
    pub polls: Arc<Vec<Poll>>,
    pub last_error: Option<String>,
    /// Sequence number of the refresh that produced `polls`.
    seq: u64,
}

impl Snapshot {
    fn empty() -> Self {
        Snapshot {
            state: CacheState::Loading,
            polls: Arc::new(Vec::new()),
            last_error: None,
            seq: 0,
        }
    }
}

pub struct PollCache {
    store: Arc<dyn PollStore>,
    feed: Arc<dyn ChangeFeed>,
    clock: Arc<dyn Clock>,
    snapshot: watch::Sender<Snapshot>,
    next_seq: AtomicU64,
    in_flight: AtomicUsize,
    torn_down: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl PollCache {
    pub fn new(store: Arc<dyn PollStore>, feed: Arc<dyn ChangeFeed>, clock: Arc<dyn Clock>) -> Self {
        let (snapshot, _) = watch::channel(Snapshot::empty());
        Self {
            store,
            feed,
            clock,
            snapshot,
            next_seq: AtomicU64::new(1),
            in_flight: AtomicUsize::new(0),
            torn_down: AtomicBool::new(false),
            listener: Mutex::new(None),
        }
    }

    /// Loads the full poll list. Always resolves the cache to `Ready` or `Error`.
    ///
    /// On failure the previously loaded polls stay visible. A refresh that
    /// finishes after a newer one, or after teardown, is discarded.
    pub async fn initialize(&self) -> Result<(), ReadError> {
        if self.torn_down.load(Ordering::Acquire) {
            return Ok(());
        }
        let seq = self.next_seq.fetch_add(1, Ordering::AcqRel);
        let mut pending = PendingRefresh::start(self, seq);
        self.snapshot.send_if_modified(|snap| {
            if snap.state == CacheState::Loading {
                return false;
            }
            snap.state = CacheState::Loading;
            true
        });

        let result = self.store.list_polls().await;
        pending.settle();

        if self.torn_down.load(Ordering::Acquire) {
            debug!(seq, "Discarding poll refresh after teardown");
            return Ok(());
        }

        match result {
            Ok(polls) => {
                let count = polls.len();
                let applied = self.snapshot.send_if_modified(|snap| {
                    if seq < snap.seq {
                        return false;
                    }
                    *snap = Snapshot {
                        state: CacheState::Ready,
                        polls: Arc::new(polls),
                        last_error: None,
                        seq,
                    };
                    true
                });
                if applied {
                    debug!(seq, count, "Poll cache refreshed");
                } else {
                    debug!(seq, "Discarding stale poll refresh");
                }
                Ok(())
            }
            Err(err) => {
                warn!(seq, error = %err, "Failed to load polls");
                let message = err.to_string();
                self.snapshot.send_if_modified(|snap| {
                    if seq < snap.seq {
                        return false;
                    }
                    snap.state = CacheState::Error;
                    snap.last_error = Some(message);
                    snap.seq = seq;
                    true
                });
                Err(ReadError::from(err))
            }
        }
    }

    /// Same as a change notification, for use right after a local write.
    pub async fn refresh(&self) -> Result<(), ReadError> {
        self.initialize().await
    }

    /// Starts re-loading on every change to the `polls` table. Calling it again is a no-op.
    pub fn subscribe(self: &Arc<Self>) {
        if self.torn_down.load(Ordering::Acquire) {
            warn!("Poll cache already torn down, not subscribing");
            return;
        }
        let mut listener = self.listener.lock().unwrap_or_else(|e| e.into_inner());
        if listener.is_some() {
            return;
        }

        let mut subscription = self.feed.subscribe(Table::Polls);
        let cache: Weak<PollCache> = Arc::downgrade(self);
        *listener = Some(tokio::spawn(async move {
            while subscription.recv().await.is_some() {
                // one refresh covers everything queued so far
                let coalesced = subscription.drain();
                let Some(cache) = cache.upgrade() else { break };
                if cache.torn_down.load(Ordering::Acquire) {
                    break;
                }
                debug!(coalesced, "Polls changed, refreshing cache");
                // failures already leave the cache in the Error state
                let _ = cache.initialize().await;
            }
            subscription.unsubscribe();
        }));
        info!("Poll cache subscribed to change feed");
    }

    /// Detaches from the change feed. Idempotent; in-flight refreshes are discarded.
    pub fn teardown(&self) {
        let first = !self.torn_down.swap(true, Ordering::AcqRel);
        let listener = self.listener.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(listener) = listener {
            listener.abort();
        }
        if first {
            info!("Poll cache torn down");
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.listener.lock()
            .map(|l| l.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    pub fn state(&self) -> CacheState {
        self.snapshot.borrow().state
    }

    pub fn last_error(&self) -> Option<String> {
        self.snapshot.borrow().last_error.clone()
    }

    /// Notified whenever a new snapshot is installed.
    pub fn changes(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.subscribe()
    }

    /// Copy of the cached polls, newest first.
    pub fn list(&self) -> Vec<Poll> {
        self.snapshot.borrow().polls.as_ref().clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot.borrow().polls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: Id) -> Option<Poll> {
        self.snapshot.borrow().polls.iter().find(|p| p.id == id).cloned()
    }

    pub fn by_creator(&self, creator: &VoterId) -> Vec<Poll> {
        self.filter(&PollFilter::by_creator(creator.clone()))
    }

    pub fn filter(&self, filter: &PollFilter) -> Vec<Poll> {
        let polls = self.snapshot.borrow().polls.clone();
        filter.apply(polls.iter(), self.clock.now())
    }

    pub fn stats(&self) -> BrowseStats {
        let polls = self.snapshot.borrow().polls.clone();
        BrowseStats::collect(polls.iter(), self.clock.now())
    }
}

/// Marks one refresh as in flight. If the refresh future is dropped before the
/// store answers and no other refresh is still running, the cache falls back to
/// its last settled state instead of staying in `Loading`.
struct PendingRefresh<'a> {
    cache: &'a PollCache,
    seq: u64,
    settled: bool,
}

impl<'a> PendingRefresh<'a> {
    fn start(cache: &'a PollCache, seq: u64) -> Self {
        cache.in_flight.fetch_add(1, Ordering::AcqRel);
        PendingRefresh { cache, seq, settled: false }
    }

    fn settle(&mut self) {
        self.settled = true;
    }
}

impl Drop for PendingRefresh<'_> {
    fn drop(&mut self) {
        let last = self.cache.in_flight.fetch_sub(1, Ordering::AcqRel) == 1;
        if self.settled || !last {
            return;
        }
        let seq = self.seq;
        let restored = self.cache.snapshot.send_if_modified(|snap| {
            if snap.state != CacheState::Loading || seq < snap.seq {
                return false;
            }
            if snap.seq == 0 {
                // nothing was ever loaded
                snap.state = CacheState::Error;
                snap.last_error = Some(String::from("poll refresh cancelled before completing"));
            } else if snap.last_error.is_some() {
                snap.state = CacheState::Error;
            } else {
                snap.state = CacheState::Ready;
            }
            true
        });
        if restored {
            debug!(seq, "Poll refresh cancelled, restored last settled state");
        }
    }
}

impl Drop for PollCache {
    fn drop(&mut self) {
        if let Ok(mut listener) = self.listener.lock() {
            if let Some(listener) = listener.take() {
                listener.abort();
            }
        }
    }
}
