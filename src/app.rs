use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::{warn, Level};

use crate::auth::require_api_key;
use crate::config::AccessPolicy;
use crate::constants::{API_KEY_HEADER, HEALTH_PATH, MAX_BODY_BYTES};
use crate::handlers;
use crate::rate_limit::enforce_rate_limit;
use crate::state::AppState;

/// Builds the service router. `api_prefix` must already be normalized
/// (leading `/`, no trailing `/`, or empty).
pub fn build_router(state: AppState, api_prefix: &str) -> Router {
    let cors = cors_layer(&state.policy);

    // Route layers wrap outside-in in reverse order: the limiter runs first,
    // so callers without a valid key are throttled as well.
    let convert_routes: Router<AppState> = Router::new()
        .route(&format!("{api_prefix}/convert"), post(handlers::convert::convert))
        .route_layer(from_fn_with_state(state.clone(), require_api_key))
        .route_layer(from_fn_with_state(state.clone(), enforce_rate_limit));

    let mut health_routes: Router<AppState> =
        Router::new().route(HEALTH_PATH, get(handlers::health::health));
    let prefixed_health = format!("{api_prefix}/health");
    if prefixed_health != HEALTH_PATH {
        health_routes = health_routes.route(&prefixed_health, get(handlers::health::health));
    }

    Router::new()
        .merge(health_routes)
        .merge(convert_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
}

fn cors_layer(policy: &AccessPolicy) -> CorsLayer {
    let origins: Vec<HeaderValue> = policy
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring unusable CORS origin");
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(API_KEY_HEADER),
        ])
}
