//! fileops-api — local HTTP status API for the fileops daemon.

pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handlers::handle_status))
        .route(
            "/sessions",
            get(handlers::handle_sessions).delete(handlers::handle_session_close),
        )
        .route("/daemon/shutdown", post(handlers::handle_shutdown))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

/// Serve on an already bound listener.
pub async fn serve_on(listener: TcpListener, state: ApiState) -> anyhow::Result<()> {
    let mut shutdown = state.shutdown_tx.subscribe();
    tracing::info!(addr = %listener.local_addr()?, "API listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;
    Ok(())
}
