use std::convert::Infallible;

use warp::{Filter, Reply};
use wxproxy_weather::ApiName;

use crate::error_mapping::handle_rejection;
use crate::handlers;
use crate::params::RawQuery;
use crate::state::SharedState;

fn with_state(state: SharedState) -> impl Filter<Extract = (SharedState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn query() -> impl Filter<Extract = (RawQuery,), Error = warp::Rejection> + Clone {
    warp::query::<RawQuery>()
}

/// `GET /weather/<name>` for one of the fixed APIs.
fn weather_route(
    api: ApiName,
    state: SharedState,
) -> impl Filter<Extract = (warp::reply::Response,), Error = warp::Rejection> + Clone {
    warp::path(api.as_str())
        .and(warp::path::end())
        .and(warp::get())
        .and(query())
        .and(with_state(state))
        .then(move |query: RawQuery, state: SharedState| handlers::weather(api, query, state))
}

/// All routes, with rejections rendered as JSON and each request traced.
pub fn routes(state: SharedState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health = warp::path!("health")
        .and(warp::get())
        .and(with_state(state.clone()))
        .then(handlers::health);

    let hello = warp::path!("hello").and(warp::get()).then(handlers::hello);

    let db_test = warp::path!("db" / "test-connection")
        .and(warp::get())
        .and(with_state(state.clone()))
        .then(handlers::test_connection);

    let generic = warp::path!("api" / String)
        .and(warp::get())
        .and(query())
        .and(with_state(state.clone()))
        .then(handlers::generic);

    let fixed = weather_route(ApiName::Current, state.clone())
        .or(weather_route(ApiName::Forecast, state.clone()))
        .unify()
        .or(weather_route(ApiName::History, state.clone()))
        .unify()
        .or(weather_route(ApiName::Marine, state.clone()))
        .unify()
        .or(weather_route(ApiName::Search, state.clone()))
        .unify()
        .or(weather_route(ApiName::Ip, state.clone()))
        .unify()
        .or(weather_route(ApiName::Timezone, state.clone()))
        .unify()
        .or(weather_route(ApiName::Astronomy, state.clone()))
        .unify()
        .or(weather_route(ApiName::Future, state))
        .unify()
        .boxed();

    let weather = warp::path("weather").and(fixed.or(generic).unify());

    health
        .or(hello)
        .or(db_test)
        .or(weather)
        .recover(handle_rejection)
        .with(warp::trace::request())
}
