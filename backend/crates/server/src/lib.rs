//! `readinglife_server`
//!
//! HTTP front end of Reading Life: routes requests for book review posts to the handlers, serves
//! the uploaded cover images and manages the lifecycle of the shared storage.
use crate::config::ServerConfig;
use crate::handlers::{add_comment, create_post, delete_post, get_post, list_posts, update_post};
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use readinglife_core::database::queries::Db;
use readinglife_core::image_store::ImageStore;
use readinglife_core::urls::PUBLIC_IMAGE_PREFIX;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Environment based configuration
pub mod config;
/// Error types and their HTTP representation
pub mod errors;
/// Multipart form parsing
pub mod form;
/// Endpoint handlers
pub mod handlers;
/// Signal handling for graceful shutdown
pub mod shutdown;
/// Shared application state
pub mod state;

/// Build the application router over `state`.
#[allow(
    clippy::missing_inline_in_public_items,
    reason = "Called once at start of program"
)]
pub fn router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let cors = match &config.cors_origin {
        // Only a matching request origin is echoed back
        Some(origin) => CorsLayer::new()
            .allow_origin(AllowOrigin::list([origin.clone()]))
            .allow_methods(Any)
            .allow_headers(Any),
        // No origin configured, stay permissive for local development
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    let images = ServeDir::new(state.images.dir());

    Router::new()
        .route("/", get(list_posts))
        .route("/create", post(create_post))
        .route("/comment/{book_name}", post(add_comment))
        .route(
            "/{book_name}",
            get(get_post).put(update_post).delete(delete_post),
        )
        .nest_service(PUBLIC_IMAGE_PREFIX, images)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Open the storage described by `config` and serve until a shutdown signal arrives.
/// # Errors
/// Fails if the storage cannot be opened, the address cannot be bound or the server fails.
#[allow(
    clippy::missing_inline_in_public_items,
    reason = "Called once at start of program"
)]
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr).await?;
    serve(listener, config, shutdown::shutdown_signal()).await
}

/// Serve on an already bound `listener` until `shutdown` resolves, then drain in-flight
/// requests and close the database pool.
/// # Errors
/// Fails if the storage cannot be opened or the server fails.
#[allow(
    clippy::missing_inline_in_public_items,
    reason = "Called once at start of program"
)]
pub async fn serve<F>(listener: TcpListener, config: ServerConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let images = ImageStore::open(&config.image_dir).await?;
    let db = Db::init(&config.database_path).await?;
    let state = Arc::new(AppState::new(db, images, config.backend_url.clone()));
    let app = router(Arc::clone(&state), &config);

    tracing::info!("Reading Life listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    state.db.close().await;
    tracing::info!("Server stopped, database closed");
    Ok(())
}
