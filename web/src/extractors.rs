//! Custom Axum extractors.
//!
//! - `CallerIdentity`: the authenticated caller forwarded by the auth boundary
//! - `CorrelationId`: extract or generate request correlation IDs
//!
//! # Examples
//!
//! ```ignore
//! use studio_web::extractors::{CallerIdentity, CorrelationId};
//!
//! async fn handler(
//!     caller: CallerIdentity,
//!     correlation_id: CorrelationId,
//! ) -> Result<Json<Response>, AppError> {
//!     tracing::info!(
//!         correlation_id = %correlation_id.0,
//!         user_id = %caller.user_id,
//!         "Processing request"
//!     );
//!     Ok(Json(response))
//! }
//! ```

use crate::error::AppError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use std::ops::Deref;
use studio_core::types::{Caller, Role, UserId};
use uuid::Uuid;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Header carrying the authenticated user's role.
pub const USER_ROLE_HEADER: &str = "X-User-Role";

/// Authenticated caller.
///
/// Authentication happens upstream: the proxy in front of the service
/// verifies credentials and forwards the identity in [`USER_ID_HEADER`] and
/// [`USER_ROLE_HEADER`]. The identity is trusted as is. A missing role means
/// [`Role::Member`]; a missing or malformed user id is rejected with 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity(pub Caller);

impl Deref for CallerIdentity {
    type Target = Caller;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("Missing caller identity"))?
            .parse::<UserId>()
            .map_err(|_| AppError::unauthorized("Malformed caller identity"))?;

        let role = match parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            Some(raw) => raw.parse::<Role>().map_err(AppError::unauthorized)?,
            None => Role::Member,
        };

        Ok(Self(Caller { user_id, role }))
    }
}

/// Correlation ID for request tracing.
///
/// Reads the ID stored by the correlation middleware, then the
/// `X-Correlation-ID` header, and generates a new UUID v4 otherwise.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Uuid>() {
            return Ok(Self(*id));
        }

        let correlation_id = parts
            .headers
            .get(crate::middleware::CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}
