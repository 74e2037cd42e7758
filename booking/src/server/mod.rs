//! HTTP server for the booking service.
//!
//! - Application state shared by the handlers
//! - Router with every endpoint, correlation ids and request tracing

pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
