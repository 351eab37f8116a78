use std::sync::Arc;

use uuid::Uuid;
use warp::http::StatusCode;
use warp::reply::{self, Reply, Response};

use crate::error::ApiError;
use crate::identity::FixedIdentity;
use crate::service::PollService;
use crate::voting::Id;
use super::models::CastVoteRequest;

pub async fn cast(
    service: Arc<PollService>,
    poll_id: Uuid,
    address: Option<String>,
    request: CastVoteRequest,
) -> Response {
    let session = service.session(Arc::new(FixedIdentity::from_header(address.as_deref())));
    match session.cast_vote(Id(poll_id), request.option_id).await {
        Err(err) => ApiError::from(err).into_response(),
        Ok(receipt) => reply::with_status(reply::json(&receipt), StatusCode::CREATED).into_response(),
    }
}
