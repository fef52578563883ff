pub mod dirs;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod model;
pub mod passwords;
pub mod server;
pub mod store;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: lifecycle::ShareLifecycle,
}

pub use server::{build_router, run, ServerConfig};
