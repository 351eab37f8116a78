use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;
use warp::http::StatusCode;
use warp::reply::{self, Reply, Response};

use crate::error::ApiError;
use crate::identity::FixedIdentity;
use crate::service::PollService;
use crate::voting::{Id, VoterId};
use super::models::{DashboardView, PollView, VoteLookup, WaitQuery};

fn voter(address: &str) -> Result<VoterId, ApiError> {
    VoterId::parse(address)
        .ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "invalid_voter", "voter address must be 1 to 100 characters"))
}

pub async fn dashboard(service: Arc<PollService>, address: String) -> Response {
    let voter = match voter(&address) {
        Err(err) => { return err.into_response(); },
        Ok(v) => v,
    };
    let session = service.session(Arc::new(FixedIdentity::new(Some(voter))));
    match session.dashboard().await {
        Err(err) => ApiError::from(err).into_response(),
        Ok(None) => ApiError::unauthenticated().into_response(),
        Ok(Some(dashboard)) => reply::json(&DashboardView::new(dashboard, service.clock().now())).into_response(),
    }
}

/// Long-poll: answers with the dashboard once it changes, or with the
/// current one when the wait runs out.
pub async fn next_dashboard(service: Arc<PollService>, address: String, query: WaitQuery) -> Response {
    let voter = match voter(&address) {
        Err(err) => { return err.into_response(); },
        Ok(v) => v,
    };
    let watch = service.session(Arc::new(FixedIdentity::new(Some(voter)))).watch_dashboard();
    let mut receiver = watch.receiver();
    let loaded = matches!(
        tokio::time::timeout(WaitQuery::max(), receiver.wait_for(Option::is_some)).await,
        Ok(Ok(_))
    );
    if loaded && tokio::time::timeout(query.duration(), receiver.changed()).await.is_err() {
        debug!(voter = %address, "Dashboard long-poll timed out");
    }
    match watch.current() {
        None => ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", "dashboard could not be loaded")
            .into_response(),
        Some(dashboard) => reply::json(&DashboardView::new(dashboard, service.clock().now())).into_response(),
    }
}

pub async fn created_polls(service: Arc<PollService>, address: String) -> Response {
    let voter = match voter(&address) {
        Err(err) => { return err.into_response(); },
        Ok(v) => v,
    };
    let polls = service.cache().by_creator(&voter);
    reply::json(&PollView::list(polls, service.clock().now())).into_response()
}

pub async fn vote(service: Arc<PollService>, address: String, poll_id: Uuid) -> Response {
    let voter = match voter(&address) {
        Err(err) => { return err.into_response(); },
        Ok(v) => v,
    };
    match service.aggregator().vote_of(Id(poll_id), &voter).await {
        Err(err) => ApiError::from(err).into_response(),
        Ok(vote) => reply::json(&VoteLookup::from(vote)).into_response(),
    }
}
