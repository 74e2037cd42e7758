//! Axum integration for the studio booking platform.
//!
//! This crate is the HTTP shell around the booking engines:
//!
//! - [`AppError`]: maps [`studio_core::error::BookingError`] onto status codes
//!   and a stable JSON error body
//! - [`CallerIdentity`]: the authenticated caller forwarded by the auth
//!   boundary in front of the service
//! - [`correlation_id_layer`]: per-request correlation IDs in spans and
//!   response headers
//! - [`handlers::health_check`]: liveness probe
//!
//! # Request Flow
//!
//! 1. **HTTP Request** arrives at an Axum handler
//! 2. **Extract** the caller and the JSON body
//! 3. **Call** the engine operation
//! 4. **Map** the tagged result to an HTTP response

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{CallerIdentity, CorrelationId, USER_ID_HEADER, USER_ROLE_HEADER};
pub use middleware::{CORRELATION_ID_HEADER, CorrelationIdExt, correlation_id_layer};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
