//! HTTP status endpoint

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use std::net::SocketAddr;
use std::sync::Arc;

use fitsync::{ActivityStore, RECENT_ACTIVITY_LIMIT, recent_activities};

const SERVER_NAME: &str = concat!("stride/", env!("CARGO_PKG_VERSION"));
const X_ENDPOINT: HeaderName = HeaderName::from_static("x-endpoint");

type SharedStore = Arc<dyn ActivityStore>;

/// Internal errors rendered as a bare 500
struct AppError(anyhow::Error);

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        log::error!("request failed: {:#}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::SERVER, SERVER_NAME)],
            Json(serde_json::json!({ "error": "internal_error" })),
        )
            .into_response()
    }
}

pub fn routes(store: SharedStore) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/activities.json", get(activities))
        .with_state(store)
}

async fn index() -> impl IntoResponse {
    (StatusCode::OK, [(header::SERVER, SERVER_NAME)])
}

async fn activities(State(store): State<SharedStore>) -> Result<Response, AppError> {
    let recent =
        tokio::task::spawn_blocking(move || recent_activities(store.as_ref(), RECENT_ACTIVITY_LIMIT))
            .await??;
    log::info!("/activities.json rendering {}", recent.len());

    Ok((
        StatusCode::OK,
        [
            (header::SERVER, SERVER_NAME),
            (X_ENDPOINT, "activities.json"),
        ],
        Json(recent),
    )
        .into_response())
}

/// Serve the status endpoint until the process is stopped
pub async fn serve(store: SharedStore, host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    println!("== start server ==");
    println!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, routes(store)).await?;
    Ok(())
}
