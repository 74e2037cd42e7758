//! HTTP handlers.
//!
//! Each handler extracts the caller and the request, calls one engine
//! operation and maps the result. Business logic stays in the engines.

pub mod payments;
pub mod purchases;
pub mod reservations;
