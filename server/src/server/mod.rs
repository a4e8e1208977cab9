//! HTTP surface
//!
//! Handlers translate JSON/multipart requests into store, oracle and paint
//! calls; every module error is mapped to an [`ApiError`].

pub mod error;
pub mod routes;
pub mod state;
pub mod types;
pub mod upload;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiErrorResponse, ApiJson};
pub use routes::api_routes;
pub use state::AppState;

/// Full application router with tracing and permissive CORS
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    api_routes(state.max_upload_size)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
