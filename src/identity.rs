//! Wallet identity as seen by the core: the connected address, or nobody.

use tokio::sync::watch;

use crate::voting::VoterId;

pub trait IdentitySource: Send + Sync {
    fn current_voter_id(&self) -> Option<VoterId>;

    /// Notified on connect, disconnect and account switch.
    fn changes(&self) -> watch::Receiver<Option<VoterId>>;
}

/// Identity fixed for the lifetime of one request.
pub struct FixedIdentity {
    voter: watch::Sender<Option<VoterId>>,
}

impl FixedIdentity {
    pub fn new(voter: Option<VoterId>) -> Self {
        let (voter, _) = watch::channel(voter);
        Self { voter }
    }

    pub fn from_header(address: Option<&str>) -> Self {
        Self::new(address.and_then(VoterId::parse))
    }
}

impl IdentitySource for FixedIdentity {
    fn current_voter_id(&self) -> Option<VoterId> {
        self.voter.borrow().clone()
    }

    fn changes(&self) -> watch::Receiver<Option<VoterId>> {
        self.voter.subscribe()
    }
}

#[cfg(test)]
pub use wallet::WalletSession;
