use std::sync::Arc;

use tracing::{error, info, warn};

use super::cache::PollCache;
use crate::clock::Clock;
use crate::error::{CreateError, StoreError};
use crate::identity::IdentitySource;
use crate::store::PollStore;
use crate::voting::{CreatePollSettings, Id, NewPoll, NewPollOption, UnvalidatedCreatePollSettings};

/// Creates a poll row and then its option rows.
///
/// The two inserts are separate writes. If the options fail, the poll is
/// deleted again so no option-less poll is left behind, and the caller gets
/// [`CreateError::PartialFailure`] saying whether that worked.
pub struct PollCreator {
    store: Arc<dyn PollStore>,
    cache: Arc<PollCache>,
    clock: Arc<dyn Clock>,
}

impl PollCreator {
    pub fn new(store: Arc<dyn PollStore>, cache: Arc<PollCache>, clock: Arc<dyn Clock>) -> Self {
        Self { store, cache, clock }
    }

    pub async fn create_poll(
        &self,
        identity: &dyn IdentitySource,
        settings: UnvalidatedCreatePollSettings,
    ) -> Result<Id, CreateError> {
        let creator = identity.current_voter_id().ok_or(CreateError::Unauthenticated)?;

        let now = self.clock.now();
        let settings = CreatePollSettings::try_from((settings, now))?;
        let (new_poll, options) = NewPoll::from(&creator, now, settings);

        let poll = self.store.insert_poll(new_poll).await.map_err(unavailable)?;
        let poll_id = poll.id;

        if let Err(err) = self.store.insert_options(NewPollOption::batch(poll_id, options)).await {
            warn!(poll_id = %poll_id, error = %err, "Failed to insert poll options, removing poll");
            let rolled_back = match self.store.delete_poll(poll_id).await {
                Ok(()) => true,
                Err(StoreError::NotFound(_)) => true,
                Err(delete_err) => {
                    error!(poll_id = %poll_id, error = %delete_err, "Poll left without options");
                    false
                }
            };
            self.refresh_cache().await;
            return Err(CreateError::PartialFailure { poll_id, rolled_back });
        }

        info!(poll_id = %poll_id, creator = %creator, title = %poll.title, "Poll created");
        self.refresh_cache().await;
        Ok(poll_id)
    }

    async fn refresh_cache(&self) {
        if let Err(err) = self.cache.refresh().await {
            warn!(error = %err, "Cache refresh after poll creation failed");
        }
    }
}

fn unavailable(err: StoreError) -> CreateError {
    CreateError::StoreUnavailable(err.to_string())
}
