use std::sync::Arc;

use uuid::Uuid;
use warp::http::StatusCode;
use warp::reply::{self, Reply, Response};

use crate::error::ApiError;
use crate::identity::FixedIdentity;
use crate::service::{CacheState, PollService};
use crate::voting::{Id, PollFilter, UnvalidatedCreatePollSettings};
use super::models::{CreatedPoll, HealthView, ListQuery, PollDetailsView, PollView};

pub async fn list(service: Arc<PollService>, query: ListQuery) -> Response {
    let filter = match PollFilter::try_from(query) {
        Err(err) => { return err.into_response(); },
        Ok(f) => f,
    };
    let polls = service.cache().filter(&filter);
    reply::json(&PollView::list(polls, service.clock().now())).into_response()
}

pub async fn stats(service: Arc<PollService>) -> Response {
    reply::json(&service.cache().stats()).into_response()
}

pub async fn health(service: Arc<PollService>) -> Response {
    let health = HealthView::new(service.cache());
    let code = match health.cache {
        CacheState::Error => StatusCode::SERVICE_UNAVAILABLE,
        CacheState::Loading | CacheState::Ready => StatusCode::OK,
    };
    reply::with_status(reply::json(&health), code).into_response()
}

pub async fn get(service: Arc<PollService>, id: Uuid) -> Response {
    match service.aggregator().poll_details(Id(id)).await {
        Err(err) => ApiError::from(err).into_response(),
        Ok(details) => reply::json(&PollDetailsView::new(details)).into_response(),
    }
}

pub async fn create(
    service: Arc<PollService>,
    address: Option<String>,
    settings: UnvalidatedCreatePollSettings,
) -> Response {
    let session = service.session(Arc::new(FixedIdentity::from_header(address.as_deref())));
    match session.create_poll(settings).await {
        Err(err) => ApiError::from(err).into_response(),
        Ok(id) => reply::with_status(reply::json(&CreatedPoll { id }), StatusCode::CREATED).into_response(),
    }
}
