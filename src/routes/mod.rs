//! Host-facing HTTP surface (EMBP gateway).
//!
//! Sibling modules each export a subrouter; this gateway merges them and binds
//! the shared [`CoordinatorHandle`] state so `main.rs` only deals with a
//! single [`Router`].

use axum::Router;

use crate::coordinator::CoordinatorHandle;

mod health;
mod status;
mod upload;

// ---

pub fn router(handle: CoordinatorHandle) -> Router {
    // ---
    Router::new()
        .merge(status::router())
        .merge(upload::router())
        .merge(health::router())
        .with_state(handle)
}
