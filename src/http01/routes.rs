use crate::error::Error;
use crate::http01::http_error::HttpError;
use crate::http01::resources::CHALLENGE_PATH_PREFIX;
use crate::http01::server::AppState;
use crate::http01::INDEX;
use axum::extract::State;
use axum::http::{header, Method, Uri};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

pub(super) fn new(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .fallback(challenge)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.request_timeout))
        .with_state(state)
}

#[allow(clippy::unused_async)]
async fn index() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, TEXT_PLAIN)], INDEX)
}

#[allow(clippy::unused_async)]
async fn challenge(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
) -> Result<impl IntoResponse, HttpError> {
    let path = uri.path();
    if method != Method::GET || !path.starts_with(CHALLENGE_PATH_PREFIX) {
        tracing::debug!("no route for {method} {path}");
        return Err(Error::ResourceNotFound(path.to_string()).into());
    }

    match state.resources.lookup(path) {
        Ok(resource) => {
            tracing::info!("serving HTTP-01 validation for {path}");
            Ok((
                [(header::CONTENT_TYPE, TEXT_PLAIN)],
                resource.validation().to_string(),
            ))
        }
        Err(err) => {
            tracing::info!("no HTTP-01 resource to serve for {path}");
            Err(err.into())
        }
    }
}
