use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::error::StoreError;
use crate::voting;
use super::schema;

#[derive(Identifiable, Queryable, Selectable)]
#[diesel(table_name = schema::polls)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Poll {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub creator_address: String,

    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    pub is_public: bool,
    pub is_transparent: bool,
    pub status: String,
    pub category: String,

    pub created_at: NaiveDateTime,
}

impl TryFrom<Poll> for voting::Poll {
    type Error = StoreError;
    fn try_from(Poll {
        id,
        title,
        description,
        creator_address,
        start_date,
        end_date,
        is_public,
        is_transparent,
        status,
        category,
        created_at,
    }: Poll) -> Result<Self, Self::Error> {
        let creator = voting::VoterId::parse(&creator_address)
            .ok_or_else(|| StoreError::Unavailable(format!("poll {id} has a blank creator")))?;
        let stored_status = status.parse()
            .map_err(|err| StoreError::Unavailable(format!("poll {id}: {err}")))?;

        Ok(voting::Poll {
            id: voting::Id(id),
            title,
            description,
            creator,
            start_date: start_date.and_utc(),
            end_date: end_date.and_utc(),
            is_public,
            is_transparent,
            category,
            created_at: created_at.and_utc(),
            stored_status,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = schema::polls)]
pub struct NewPoll {
    pub title: String,
    pub description: String,
    pub creator_address: String,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    pub is_public: bool,
    pub is_transparent: bool,
    pub status: String,
    pub category: String,
}

impl From<voting::NewPoll> for NewPoll {
    fn from(voting::NewPoll {
        title,
        description,
        creator,
        start_date,
        end_date,
        is_public,
        is_transparent,
        category,
        status,
    }: voting::NewPoll) -> Self {
        Self {
            title,
            description,
            creator_address: creator.to_string(),
            start_date: start_date.naive_utc(),
            end_date: end_date.naive_utc(),
            is_public,
            is_transparent,
            status: status.to_string(),
            category,
        }
    }
}

#[derive(Associations, Identifiable, Queryable, Selectable)]
#[diesel(table_name = schema::poll_options)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(belongs_to(Poll))]
pub struct PollOption {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub position: i32,
    pub option_text: String,
}

impl From<PollOption> for voting::PollOption {
    fn from(value: PollOption) -> Self {
        voting::PollOption {
            id: voting::Id(value.id),
            poll_id: voting::Id(value.poll_id),
            position: value.position.max(0) as u32,
            text: value.option_text,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = schema::poll_options)]
pub struct NewPollOption {
    pub poll_id: Uuid,
    pub position: i32,
    pub option_text: String,
}

impl From<voting::NewPollOption> for NewPollOption {
    fn from(value: voting::NewPollOption) -> Self {
        Self {
            poll_id: value.poll_id.0,
            position: value.position as i32,
            option_text: value.text,
        }
    }
}

#[derive(Associations, Identifiable, Queryable, Selectable)]
#[diesel(table_name = schema::votes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(belongs_to(Poll))]
pub struct Vote {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub option_id: Uuid,
    pub voter_address: String,
    pub transaction_hash: Option<String>,
    pub created_at: NaiveDateTime,
}

impl TryFrom<Vote> for voting::Vote {
    type Error = StoreError;
    fn try_from(value: Vote) -> Result<Self, Self::Error> {
        let voter = voting::VoterId::parse(&value.voter_address)
            .ok_or_else(|| StoreError::Unavailable(format!("vote {} has a blank voter", value.id)))?;
        Ok(voting::Vote {
            id: voting::Id(value.id),
            poll_id: voting::Id(value.poll_id),
            option_id: voting::Id(value.option_id),
            voter,
            transaction_hash: value.transaction_hash,
            created_at: value.created_at.and_utc(),
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = schema::votes)]
pub struct NewVote {
    pub poll_id: Uuid,
    pub option_id: Uuid,
    pub voter_address: String,
    pub transaction_hash: Option<String>,
}

impl From<voting::NewVote> for NewVote {
    fn from(value: voting::NewVote) -> Self {
        Self {
            poll_id: value.poll_id.0,
            option_id: value.option_id.0,
            voter_address: value.voter.to_string(),
            transaction_hash: value.transaction_hash,
        }
    }
}
