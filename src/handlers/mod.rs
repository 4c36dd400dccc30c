mod service_info;
mod slice;

pub use service_info::service_info;
pub use slice::{get_slice, post_slice};

use crate::slicing::GencodeMap;
use crate::storage::Storage;
use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub gencode: Arc<GencodeMap>,
    /// Uncompressed bytes per output BGZF block
    pub block_size: usize,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // ids may contain `/` for files in subdirectories
        .route("/slice/*id", get(get_slice).post(post_slice))
        .route("/", get(service_info))
        .route("/service-info", get(service_info))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
