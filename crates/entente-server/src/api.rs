use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use entente_store::Datastore;

use crate::config::ServerConfig;
use crate::dispatch::TaskDispatcher;
use crate::signer::UrlSigner;
use crate::{federation, local, workers};

/// Shared handler state.  Every collaborator the engine talks to -- the
/// datastore, the task dispatcher, the URL signer, the outbound HTTP
/// client -- is an explicit dependency here, never a global.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Datastore>,
    pub dispatcher: Arc<dyn TaskDispatcher>,
    pub signer: Arc<dyn UrlSigner>,
    pub http: reqwest::Client,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        // federation endpoints, called by peer hosts
        .route("/api/request-connection", post(federation::request_connection))
        .route(
            "/api/acknowledge-connection",
            post(federation::acknowledge_connection),
        )
        .route("/api/retrieve-posts", post(federation::retrieve_posts))
        .route("/api/post-notify", post(federation::post_notify))
        .route("/api/comment-created", post(federation::comment_created))
        .route("/api/retrieve-comments", post(federation::retrieve_comments))
        // worker endpoints, called by the task dispatcher
        .route("/worker/request-connection", post(workers::request_connection))
        .route("/worker/ack-connection", post(workers::ack_connection))
        .route("/worker/post-created", post(workers::post_created))
        .route("/worker/post-notify", post(workers::post_notify))
        .route("/worker/comment-created", post(workers::comment_created))
        // local endpoints, called by this host's own frontend
        .route("/local/profiles", post(local::create_profile))
        .route(
            "/local/{handle}/posts",
            get(local::get_posts).post(local::create_post),
        )
        .route("/local/{handle}/connections", get(local::get_connections))
        .route(
            "/local/{handle}/request-connection",
            post(local::request_connection),
        )
        .route(
            "/local/{handle}/manage-connection",
            post(local::manage_connection),
        )
        .route(
            "/local/{handle}/connection-posts/{connection_id}",
            get(local::connection_posts),
        )
        .route(
            "/local/{handle}/posts/{post_id}/comments",
            post(local::add_comment),
        )
        .route(
            "/local/{handle}/mark-post-read/{post_id}",
            post(local::mark_post_read),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
