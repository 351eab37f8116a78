//! Table-level change notifications.
//!
//! Events carry no row payload. A subscriber that sees an event is expected to
//! re-query whatever it caches.

use std::fmt::{self, Display, Formatter};

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

pub const DEFAULT_FEED_CAPACITY: usize = 256;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Table {
    Polls,
    PollOptions,
    Votes,
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match self {
            Table::Polls => "polls",
            Table::PollOptions => "poll_options",
            Table::Votes => "votes",
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub const fn new(table: Table, kind: ChangeKind) -> Self {
        Self { table, kind }
    }
}

pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self, table: Table) -> Subscription;
}

/// Handle on a table's change stream. Dropping it unsubscribes.
pub struct Subscription {
    table: Table,
    receiver: Option<broadcast::Receiver<ChangeEvent>>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.receiver.is_some()
    }

    /// Waits for the next change to this table.
    ///
    /// Returns `None` once unsubscribed or the feed is gone. Missed events
    /// collapse into a single one: a lagging subscriber still learns that
    /// something changed.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.recv().await {
                Ok(event) if event.table == self.table => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => {
                    warn!(table = %self.table, missed, "Change feed subscriber lagged");
                    return Some(ChangeEvent::new(self.table, ChangeKind::Update));
                }
                Err(RecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }

    /// Discards events already queued for this table, returning how many there were.
    pub fn drain(&mut self) -> usize {
        let Some(receiver) = self.receiver.as_mut() else {
            return 0;
        };
        let mut drained = 0;
        loop {
            match receiver.try_recv() {
                Ok(event) if event.table == self.table => drained += 1,
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(_)) => drained += 1,
                Err(_) => return drained,
            }
        }
    }

    /// Idempotent.
    pub fn unsubscribe(&mut self) {
        if self.receiver.take().is_some() {
            debug!(table = %self.table, "Change feed subscription dropped");
        }
    }
}

/// In-process feed on a broadcast channel. Stores publish after every write.
pub struct BroadcastFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl BroadcastFeed {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_FEED_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Returns the number of subscribers notified.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(table = %event.table, kind = ?event.kind, receivers, "Change published");
                receivers
            }
            // nobody listening
            Err(_) => 0,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed for BroadcastFeed {
    fn subscribe(&self, table: Table) -> Subscription {
        debug!(table = %table, "New change feed subscription");
        Subscription {
            table,
            receiver: Some(self.sender.subscribe()),
        }
    }
}
