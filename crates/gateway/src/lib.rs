//! HTTP gateway for the session manager.
//!
//! Exposes the session lifecycle over a small JSON API guarded by a static
//! token, and wires the production stack (sidecar transport, file
//! credentials, webhook dispatcher) in [`server::start_gateway`].

pub mod auth_middleware;
pub mod response;
pub mod server;
pub mod session_routes;
pub mod state;

pub use {
    server::{build_gateway_app, start_gateway},
    state::AppState,
};
