use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use warp::http::StatusCode;
use warp::reply::{self, Reply, Response};

use crate::voting::{Id, PollStatus};

/// Rejected poll input. Raised before any store call is made.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("Validation error: {message}")]
pub struct ValidationError {
    message: String,
}

pub fn poll_title_invalid_size(limits: RangeInclusive<usize>, len: usize) -> ValidationError {
    ValidationError {
        message: format!("poll's title must be between {} and {} characters, got {len}", limits.start(), limits.end()),
    }
}

pub fn poll_description_missing() -> ValidationError {
    ValidationError {
        message: String::from("poll must have a description"),
    }
}

pub fn poll_category_invalid_size(limits: RangeInclusive<usize>, len: usize) -> ValidationError {
    ValidationError {
        message: format!("poll's category must be between {} and {} characters, got {len}", limits.start(), limits.end()),
    }
}

pub fn poll_option_limit_exceeded(limits: RangeInclusive<usize>, count: usize) -> ValidationError {
    ValidationError {
        message: format!("poll must have between {} and {} options, got {count}", limits.start(), limits.end()),
    }
}

pub fn poll_option_invalid_size(index: usize, limits: RangeInclusive<usize>, len: usize) -> ValidationError {
    ValidationError {
        message: format!("option {index} must be between {} and {} characters, got {len}", limits.start(), limits.end()),
    }
}

pub fn poll_option_duplicate(first: usize, second: usize) -> ValidationError {
    ValidationError {
        message: format!("options {first} and {second} have the same text"),
    }
}

pub fn poll_window_inverted(start: &DateTime<Utc>, end: &DateTime<Utc>) -> ValidationError {
    ValidationError {
        message: format!("poll cannot end before it starts, starts {start}, ends {end}"),
    }
}

pub fn poll_end_missing() -> ValidationError {
    ValidationError {
        message: String::from("poll must have an end date"),
    }
}

pub fn poll_already_ended(end: &DateTime<Utc>, now: &DateTime<Utc>) -> ValidationError {
    ValidationError {
        message: format!("poll cannot end in the past, ends {end}, now {now}"),
    }
}


/// Failure reported by a store adapter. Transport details are flattened to text.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("uniqueness constraint violated on {0}")]
    Conflict(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum VoteError {
    #[error("no wallet connected")]
    Unauthenticated,
    #[error("voter has already voted on this poll")]
    AlreadyVoted,
    #[error("poll {0} does not exist")]
    UnknownPoll(Id),
    #[error("option {option_id} does not belong to poll {poll_id}")]
    UnknownOption { poll_id: Id, option_id: Id },
    #[error("poll {poll_id} is {status}, votes are only accepted while active")]
    PollNotOpen { poll_id: Id, status: PollStatus },
    #[error("{0}")]
    StoreUnavailable(String),
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum CreateError {
    #[error("no wallet connected")]
    Unauthenticated,
    #[error(transparent)]
    MalformedSpec(#[from] ValidationError),
    #[error("poll {poll_id} was created but its options were not (rolled back: {rolled_back})")]
    PartialFailure { poll_id: Id, rolled_back: bool },
    #[error("{0}")]
    StoreUnavailable(String),
}

/// Failure of a read path: cache refresh, poll details or dashboard.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ReadError {
    #[error("poll {0} does not exist")]
    UnknownPoll(Id),
    #[error("{0}")]
    StoreUnavailable(String),
}

impl From<StoreError> for ReadError {
    fn from(value: StoreError) -> Self {
        ReadError::StoreUnavailable(value.to_string())
    }
}


#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

/// Error as presented over HTTP: a status, a stable machine code and a message.
#[derive(Debug)]
pub struct ApiError {
    pub code: StatusCode,
    pub kind: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(code: StatusCode, kind: &'static str, message: impl Into<String>) -> ApiError {
        ApiError { code, kind, message: message.into() }
    }

    pub fn unauthenticated() -> ApiError {
        ApiError::new(StatusCode::UNAUTHORIZED, "unauthenticated", "connect a wallet first")
    }
}

impl Reply for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody { error: self.kind, message: self.message };
        reply::with_status(reply::json(&body), self.code).into_response()
    }
}

impl From<VoteError> for ApiError {
    fn from(value: VoteError) -> Self {
        let message = value.to_string();
        match value {
            VoteError::Unauthenticated => ApiError::unauthenticated(),
            VoteError::AlreadyVoted => ApiError::new(StatusCode::CONFLICT, "already_voted", message),
            VoteError::UnknownPoll(_) => ApiError::new(StatusCode::NOT_FOUND, "unknown_poll", message),
            VoteError::UnknownOption { .. } => ApiError::new(StatusCode::BAD_REQUEST, "unknown_option", message),
            VoteError::PollNotOpen { .. } => ApiError::new(StatusCode::CONFLICT, "poll_closed", message),
            VoteError::StoreUnavailable(_) => ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", message),
        }
    }
}

impl From<CreateError> for ApiError {
    fn from(value: CreateError) -> Self {
        let message = value.to_string();
        match value {
            CreateError::Unauthenticated => ApiError::unauthenticated(),
            CreateError::MalformedSpec(_) => ApiError::new(StatusCode::BAD_REQUEST, "malformed_spec", message),
            CreateError::PartialFailure { .. } => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "partial_failure", message),
            CreateError::StoreUnavailable(_) => ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", message),
        }
    }
}

impl From<ReadError> for ApiError {
    fn from(value: ReadError) -> Self {
        let message = value.to_string();
        match value {
            ReadError::UnknownPoll(_) => ApiError::new(StatusCode::NOT_FOUND, "unknown_poll", message),
            ReadError::StoreUnavailable(_) => ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_errors_map_to_distinct_statuses() {
        assert_eq!(ApiError::from(VoteError::Unauthenticated).code, StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::from(VoteError::AlreadyVoted).code, StatusCode::CONFLICT);
        assert_eq!(ApiError::from(VoteError::AlreadyVoted).kind, "already_voted");
        assert_eq!(
            ApiError::from(VoteError::StoreUnavailable(String::from("timeout"))).code,
            StatusCode::SERVICE_UNAVAILABLE,
        );
        let closed = VoteError::PollNotOpen { poll_id: Id::nil(), status: PollStatus::Ended };
        assert_eq!(ApiError::from(closed).kind, "poll_closed");
    }

    #[test]
    fn malformed_spec_is_bad_request() {
        let err = CreateError::from(poll_option_limit_exceeded(2..=10, 1));
        let api = ApiError::from(err);
        assert_eq!(api.code, StatusCode::BAD_REQUEST);
        assert!(api.message.contains("between 2 and 10 options, got 1"));
    }
}
