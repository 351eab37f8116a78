pub mod models;
pub mod schema;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DbError};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::feed::{BroadcastFeed, ChangeEvent, ChangeKind, Table};
use crate::store::{PollStore, OPTION_POSITION_UNIQUENESS, VOTE_UNIQUENESS};
use crate::voting::{self, Id, VoterId};

type PgPool = Pool<ConnectionManager<PgConnection>>;
type PgPooled = PooledConnection<ConnectionManager<PgConnection>>;

/// Postgres-backed store. Queries run on the blocking pool; every committed
/// write is announced on the in-process feed.
pub struct PgStore {
    pool: PgPool,
    feed: Arc<BroadcastFeed>,
}

impl PgStore {
    pub fn connect(database_url: &str, pool_size: u32, feed: Arc<BroadcastFeed>) -> Result<Self, StoreError> {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        info!(pool_size, "Connected to Postgres");
        Ok(Self { pool, feed })
    }

    async fn run<T, F>(&self, query: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgPooled) -> Result<T, StoreError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|err| StoreError::Unavailable(err.to_string()))?;
            query(&mut conn)
        })
        .await
        .map_err(|err| StoreError::Unavailable(format!("query task failed: {err}")))?
    }

    fn publish(&self, table: Table, kind: ChangeKind) {
        self.feed.publish(ChangeEvent::new(table, kind));
    }
}

/// Maps driver errors onto the store taxonomy by constraint.
///
/// Constraint names are the ones Postgres generates for the migration's
/// inline `UNIQUE` and `REFERENCES` clauses.
fn store_error(err: DbError) -> StoreError {
    match err {
        DbError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            match info.constraint_name() {
                Some("votes_poll_id_voter_address_key") => StoreError::Conflict(VOTE_UNIQUENESS),
                Some("poll_options_poll_id_position_key") => StoreError::Conflict(OPTION_POSITION_UNIQUENESS),
                name => {
                    debug!(constraint = ?name, "Unexpected unique violation");
                    StoreError::Conflict("unique constraint")
                }
            }
        }
        DbError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
            match info.constraint_name() {
                Some("votes_poll_id_fkey") | Some("poll_options_poll_id_fkey") => StoreError::NotFound("poll"),
                Some("votes_poll_id_option_id_fkey") => StoreError::NotFound("poll option"),
                _ => StoreError::Unavailable(info.message().to_string()),
            }
        }
        DbError::NotFound => StoreError::NotFound("row"),
        other => StoreError::Unavailable(other.to_string()),
    }
}

fn to_polls(rows: Vec<models::Poll>) -> Result<Vec<voting::Poll>, StoreError> {
    rows.into_iter().map(voting::Poll::try_from).collect()
}

fn to_votes(rows: Vec<models::Vote>) -> Result<Vec<voting::Vote>, StoreError> {
    rows.into_iter().map(voting::Vote::try_from).collect()
}

#[async_trait]
impl PollStore for PgStore {
    async fn list_polls(&self) -> Result<Vec<voting::Poll>, StoreError> {
        self.run(|conn| {
            let rows = schema::polls::table
                .order(schema::polls::created_at.desc())
                .select(models::Poll::as_select())
                .load(conn)
                .map_err(store_error)?;
            to_polls(rows)
        }).await
    }

    async fn get_poll(&self, id: Id) -> Result<Option<voting::Poll>, StoreError> {
        self.run(move |conn| {
            let row = schema::polls::table
                .find(id.0)
                .select(models::Poll::as_select())
                .first(conn)
                .optional()
                .map_err(store_error)?;
            row.map(voting::Poll::try_from).transpose()
        }).await
    }

    async fn polls_by_creator(&self, creator: &VoterId) -> Result<Vec<voting::Poll>, StoreError> {
        let creator = creator.to_string();
        self.run(move |conn| {
            let rows = schema::polls::table
                .filter(schema::polls::creator_address.eq(creator))
                .order(schema::polls::created_at.desc())
                .select(models::Poll::as_select())
                .load(conn)
                .map_err(store_error)?;
            to_polls(rows)
        }).await
    }

    async fn polls_by_ids(&self, ids: &[Id]) -> Result<Vec<voting::Poll>, StoreError> {
        let ids: Vec<uuid::Uuid> = ids.iter().map(|id| id.0).collect();
        self.run(move |conn| {
            let rows = schema::polls::table
                .filter(schema::polls::id.eq_any(ids))
                .order(schema::polls::created_at.desc())
                .select(models::Poll::as_select())
                .load(conn)
                .map_err(store_error)?;
            to_polls(rows)
        }).await
    }

    async fn insert_poll(&self, poll: voting::NewPoll) -> Result<voting::Poll, StoreError> {
        let row = models::NewPoll::from(poll);
        let poll = self.run(move |conn| {
            let inserted = diesel::insert_into(schema::polls::table)
                .values(&row)
                .returning(models::Poll::as_returning())
                .get_result(conn)
                .map_err(store_error)?;
            voting::Poll::try_from(inserted)
        }).await?;
        debug!(poll = %poll.id, "Inserted poll");
        self.publish(Table::Polls, ChangeKind::Insert);
        Ok(poll)
    }

    async fn delete_poll(&self, id: Id) -> Result<(), StoreError> {
        let deleted = self.run(move |conn| {
            diesel::delete(schema::polls::table.find(id.0))
                .execute(conn)
                .map_err(store_error)
        }).await?;
        if deleted == 0 {
            return Err(StoreError::NotFound("poll"));
        }
        self.publish(Table::Polls, ChangeKind::Delete);
        Ok(())
    }

    async fn insert_options(&self, options: Vec<voting::NewPollOption>) -> Result<Vec<voting::PollOption>, StoreError> {
        let rows: Vec<models::NewPollOption> = options.into_iter().map(models::NewPollOption::from).collect();
        let inserted = self.run(move |conn| {
            // a single multi-row insert is atomic
            diesel::insert_into(schema::poll_options::table)
                .values(&rows)
                .returning(models::PollOption::as_returning())
                .get_results(conn)
                .map_err(store_error)
        }).await?;
        self.publish(Table::PollOptions, ChangeKind::Insert);
        let mut options: Vec<voting::PollOption> = inserted.into_iter().map(voting::PollOption::from).collect();
        options.sort_by_key(|o| o.position);
        Ok(options)
    }

    async fn options_for_poll(&self, poll_id: Id) -> Result<Vec<voting::PollOption>, StoreError> {
        self.run(move |conn| {
            let rows = schema::poll_options::table
                .filter(schema::poll_options::poll_id.eq(poll_id.0))
                .order(schema::poll_options::position)
                .select(models::PollOption::as_select())
                .load(conn)
                .map_err(store_error)?;
            Ok(rows.into_iter().map(voting::PollOption::from).collect())
        }).await
    }

    async fn vote_counts(&self, poll_id: Id) -> Result<HashMap<Id, u64>, StoreError> {
        self.run(move |conn| {
            let rows: Vec<(uuid::Uuid, i64)> = schema::votes::table
                .filter(schema::votes::poll_id.eq(poll_id.0))
                .group_by(schema::votes::option_id)
                .select((schema::votes::option_id, diesel::dsl::count_star()))
                .load(conn)
                .map_err(store_error)?;
            Ok(rows.into_iter()
                .map(|(option_id, count)| (Id(option_id), count.max(0) as u64))
                .collect())
        }).await
    }

    async fn find_vote(&self, poll_id: Id, voter: &VoterId) -> Result<Option<voting::Vote>, StoreError> {
        let voter = voter.to_string();
        self.run(move |conn| {
            let row = schema::votes::table
                .filter(schema::votes::poll_id.eq(poll_id.0))
                .filter(schema::votes::voter_address.eq(voter))
                .select(models::Vote::as_select())
                .first(conn)
                .optional()
                .map_err(store_error)?;
            row.map(voting::Vote::try_from).transpose()
        }).await
    }

    async fn votes_by_voter(&self, voter: &VoterId) -> Result<Vec<voting::Vote>, StoreError> {
        let voter = voter.to_string();
        self.run(move |conn| {
            let rows = schema::votes::table
                .filter(schema::votes::voter_address.eq(voter))
                .order(schema::votes::created_at.desc())
                .select(models::Vote::as_select())
                .load(conn)
                .map_err(store_error)?;
            to_votes(rows)
        }).await
    }

    async fn insert_vote(&self, vote: voting::NewVote) -> Result<voting::Vote, StoreError> {
        let row = models::NewVote::from(vote);
        let vote = self.run(move |conn| {
            let inserted = diesel::insert_into(schema::votes::table)
                .values(&row)
                .returning(models::Vote::as_returning())
                .get_result(conn)
                .map_err(store_error)?;
            voting::Vote::try_from(inserted)
        }).await?;
        debug!(vote = %vote.id, poll = %vote.poll_id, "Inserted vote");
        self.publish(Table::Votes, ChangeKind::Insert);
        Ok(vote)
    }
}
