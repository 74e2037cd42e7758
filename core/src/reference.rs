//! External reference metadata attached to gateway payments.
//!
//! Checkout serializes a [`PaymentReference`] into the gateway's free-form
//! `external_reference` field; the confirmation protocol parses it back once,
//! at the boundary, before dispatching on the variant.

use crate::types::{Money, PackageId, SessionId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What a captured payment pays for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentReference {
    /// A one-off class booking
    #[serde(rename_all = "camelCase")]
    SingleClass {
        /// Who booked
        user_id: UserId,
        /// Session booked
        session_id: SessionId,
        /// Price charged
        single_class_price: Money,
        /// Label shown on the checkout page
        #[serde(default, skip_serializing_if = "Option::is_none")]
        class_session_name: Option<String>,
    },
    /// A credit package purchase
    #[serde(rename_all = "camelCase")]
    Package {
        /// Buyer
        user_id: UserId,
        /// Package bought
        package_id: PackageId,
    },
}

/// Failure to decode an external reference.
#[derive(Error, Debug)]
pub enum ReferenceError {
    /// The gateway returned no reference at all.
    #[error("external reference is missing")]
    Missing,

    /// The reference is not a valid tagged payload.
    #[error("malformed external reference: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl PaymentReference {
    /// Parses the gateway's `external_reference` string.
    ///
    /// # Errors
    ///
    /// Returns [`ReferenceError::Missing`] for empty input and
    /// [`ReferenceError::Malformed`] when the JSON does not match any variant.
    pub fn parse(raw: &str) -> Result<Self, ReferenceError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ReferenceError::Missing);
        }
        Ok(serde_json::from_str(raw)?)
    }

    /// Encodes the reference for the gateway.
    ///
    /// # Errors
    ///
    /// Returns [`ReferenceError::Malformed`] if serialization fails.
    pub fn encode(&self) -> Result<String, ReferenceError> {
        Ok(serde_json::to_string(self)?)
    }

    /// The user the payment belongs to
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        match self {
            Self::SingleClass { user_id, .. } | Self::Package { user_id, .. } => *user_id,
        }
    }

    /// Short variant name for logs and metrics labels
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SingleClass { .. } => "single_class",
            Self::Package { .. } => "package",
        }
    }
}
