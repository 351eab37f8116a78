pub mod db;
mod models;
mod poll_api;
mod vote_api;
mod voter_api;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;
use warp::{Filter, Rejection, Reply};

use crate::service::PollService;

pub const VOTER_HEADER: &str = "x-voter-address";
const MAX_BODY_BYTES: u64 = 64 * 1024;

fn with_service(
    service: Arc<PollService>,
) -> impl Filter<Extract = (Arc<PollService>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || service.clone())
}

pub fn routes(service: Arc<PollService>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let list_polls = warp::get()
        .and(warp::path!("api" / "polls"))
        .and(with_service(service.clone()))
        .and(warp::query::<models::ListQuery>())
        .then(poll_api::list);

    let poll_stats = warp::get()
        .and(warp::path!("api" / "polls" / "stats"))
        .and(with_service(service.clone()))
        .then(poll_api::stats);

    let health = warp::get()
        .and(warp::path!("api" / "health"))
        .and(with_service(service.clone()))
        .then(poll_api::health);

    let get_poll = warp::get()
        .and(warp::path!("api" / "polls" / Uuid))
        .and(with_service(service.clone()))
        .then(|id: Uuid, service: Arc<PollService>| poll_api::get(service, id));

    let create_poll = warp::post()
        .and(warp::path!("api" / "polls"))
        .and(with_service(service.clone()))
        .and(warp::header::optional::<String>(VOTER_HEADER))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .then(poll_api::create);

    let cast_vote = warp::post()
        .and(warp::path!("api" / "polls" / Uuid / "votes"))
        .and(with_service(service.clone()))
        .and(warp::header::optional::<String>(VOTER_HEADER))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .then(|poll_id: Uuid, service: Arc<PollService>, address: Option<String>, request: models::CastVoteRequest| {
            vote_api::cast(service, poll_id, address, request)
        });

    let dashboard = warp::get()
        .and(warp::path!("api" / "voters" / String / "dashboard"))
        .and(with_service(service.clone()))
        .then(|address: String, service: Arc<PollService>| voter_api::dashboard(service, address));

    let next_dashboard = warp::get()
        .and(warp::path!("api" / "voters" / String / "dashboard" / "next"))
        .and(with_service(service.clone()))
        .and(warp::query::<models::WaitQuery>())
        .then(|address: String, service: Arc<PollService>, query: models::WaitQuery| {
            voter_api::next_dashboard(service, address, query)
        });

    let created_polls = warp::get()
        .and(warp::path!("api" / "voters" / String / "polls"))
        .and(with_service(service.clone()))
        .then(|address: String, service: Arc<PollService>| voter_api::created_polls(service, address));

    let voter_vote = warp::get()
        .and(warp::path!("api" / "voters" / String / "votes" / Uuid))
        .and(with_service(service))
        .then(|address: String, poll_id: Uuid, service: Arc<PollService>| voter_api::vote(service, address, poll_id));

    poll_stats
        .or(list_polls)
        .or(get_poll)
        .or(create_poll)
        .or(cast_vote)
        .or(dashboard)
        .or(next_dashboard)
        .or(created_polls)
        .or(voter_vote)
        .or(health)
        .with(warp::trace::request())
}

pub async fn serve<F>(service: Arc<PollService>, addr: SocketAddr, shutdown: F) -> Result<(), warp::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (bound, server) = warp::serve(routes(service)).try_bind_with_graceful_shutdown(addr, shutdown)?;
    info!(addr = %bound, "Listening");
    server.await;
    Ok(())
}
