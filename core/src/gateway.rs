//! Payment gateway contract.
//!
//! The core depends on exactly two gateway operations: creating a payment
//! intent (checkout) and fetching a payment's authoritative status. An
//! `approved` status is the only trust signal.

use crate::types::{ExternalPaymentId, Money};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors returned by a gateway client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Network failure before a response arrived.
    #[error("Payment gateway unreachable: {0}")]
    Unreachable(String),

    /// Non-success HTTP status.
    #[error("Payment gateway returned {status}: {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body, truncated by the client
        body: String,
    },

    /// Response could not be decoded.
    #[error("Invalid payment gateway response: {0}")]
    InvalidResponse(String),

    /// The request exceeded the configured timeout.
    #[error("Payment gateway timed out")]
    Timeout,
}

/// One line of a checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutItem {
    /// Merchant-side item id
    pub id: String,
    /// Title shown to the payer
    pub title: String,
    /// Quantity
    pub quantity: u32,
    /// Unit price
    pub unit_price: Money,
    /// ISO currency code
    pub currency: String,
}

/// Where the gateway sends the payer's browser after checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnUrls {
    /// Approved payments
    pub success: String,
    /// Rejected payments
    pub failure: String,
    /// Payments still in process
    pub pending: String,
}

/// Input of [`PaymentGateway::create_payment_intent`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntentRequest {
    /// Items to charge
    pub items: Vec<CheckoutItem>,
    /// Browser return targets
    pub return_urls: ReturnUrls,
    /// Webhook target, if notifications are enabled
    pub notification_url: Option<String>,
    /// Encoded `PaymentReference`
    pub external_reference: String,
    /// Text on the payer's card statement
    pub statement_descriptor: Option<String>,
}

/// A created checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Gateway preference id
    pub id: String,
    /// URL the payer must be sent to
    pub redirect_url: String,
}

/// Payment status as reported by the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayPaymentStatus {
    /// Money captured
    Approved,
    /// Still in process
    Pending,
    /// Declined
    Rejected,
    /// Anything else (`refunded`, `cancelled`, ...)
    Other(String),
}

impl GatewayPaymentStatus {
    /// Maps the gateway's status string.
    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status {
            "approved" => Self::Approved,
            "pending" | "in_process" | "authorized" => Self::Pending,
            "rejected" => Self::Rejected,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether the money was captured
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

/// Authoritative payment record fetched from the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayPayment {
    /// Gateway payment id
    pub id: ExternalPaymentId,
    /// Current status
    pub status: GatewayPaymentStatus,
    /// Raw external reference set at checkout
    pub external_reference: Option<String>,
}

/// Boxed future returned by gateway operations.
pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, GatewayError>> + Send + 'a>>;

/// Client for the external payment gateway.
///
/// Uses boxed futures so it can be shared as `Arc<dyn PaymentGateway>`.
pub trait PaymentGateway: Send + Sync {
    /// Creates a payment intent (checkout preference).
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] when the gateway is unreachable or rejects
    /// the request.
    fn create_payment_intent(
        &self,
        request: PaymentIntentRequest,
    ) -> GatewayFuture<'_, CheckoutSession>;

    /// Fetches the authoritative status of a payment.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] when the gateway is unreachable, does not
    /// know the payment, or answers with an undecodable body.
    fn get_payment<'a>(&'a self, id: &'a ExternalPaymentId) -> GatewayFuture<'a, GatewayPayment>;
}
