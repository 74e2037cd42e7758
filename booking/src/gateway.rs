//! MercadoPago client.
//!
//! Checkout uses the Checkout Pro "preferences" API; confirmation reads
//! payments back through `/v1/payments/{id}`.

use crate::config::GatewayConfig;
use reqwest::{Client, Response};
use serde::{Deserialize, Deserializer, Serialize};
use studio_core::gateway::{
    CheckoutSession, GatewayError, GatewayFuture, GatewayPayment, GatewayPaymentStatus,
    PaymentGateway, PaymentIntentRequest,
};
use studio_core::types::ExternalPaymentId;

const MAX_ERROR_BODY: usize = 512;

/// MercadoPago API client
#[derive(Clone)]
pub struct MercadoPagoClient {
    client: Client,
    api_url: String,
    access_token: String,
    sandbox: bool,
}

impl std::fmt::Debug for MercadoPagoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MercadoPagoClient")
            .field("api_url", &self.api_url)
            .field("sandbox", &self.sandbox)
            .finish_non_exhaustive()
    }
}

impl MercadoPagoClient {
    /// Create a client from configuration
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Unreachable` if the HTTP client cannot be built
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            sandbox: config.sandbox,
        })
    }

    /// Create a checkout preference
    ///
    /// # Errors
    ///
    /// Returns errors for network failures, non-success statuses, or
    /// unparseable responses
    pub async fn create_preference(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let body = PreferenceRequest::from_intent(request);
        let response = self
            .client
            .post(format!("{}/checkout/preferences", self.api_url))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let preference: PreferenceResponse = decode(response).await?;
        let redirect_url = if self.sandbox {
            preference.sandbox_init_point.or(preference.init_point)
        } else {
            preference.init_point
        }
        .ok_or_else(|| GatewayError::InvalidResponse("preference without init point".to_string()))?;

        tracing::debug!(preference_id = %preference.id, "Checkout preference created");
        Ok(CheckoutSession {
            id: preference.id,
            redirect_url,
        })
    }

    /// Fetch a payment's authoritative status
    ///
    /// # Errors
    ///
    /// Returns errors for network failures, non-success statuses (404 for
    /// unknown payments), or unparseable responses
    pub async fn payment(&self, id: &ExternalPaymentId) -> Result<GatewayPayment, GatewayError> {
        let response = self
            .client
            .get(format!("{}/v1/payments/{id}", self.api_url))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(transport_error)?;

        let payment: PaymentResponse = decode(response).await?;
        Ok(GatewayPayment {
            id: ExternalPaymentId::new(payment.id),
            status: GatewayPaymentStatus::parse(&payment.status),
            external_reference: payment.external_reference.filter(|r| !r.is_empty()),
        })
    }
}

impl PaymentGateway for MercadoPagoClient {
    fn create_payment_intent(
        &self,
        request: PaymentIntentRequest,
    ) -> GatewayFuture<'_, CheckoutSession> {
        Box::pin(async move { self.create_preference(&request).await })
    }

    fn get_payment<'a>(&'a self, id: &'a ExternalPaymentId) -> GatewayFuture<'a, GatewayPayment> {
        Box::pin(self.payment(id))
    }
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Unreachable(err.to_string())
    }
}

async fn decode<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GatewayError::Api {
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY).collect(),
        });
    }

    response.json::<T>().await.map_err(|e| {
        if e.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::InvalidResponse(e.to_string())
        }
    })
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Serialize)]
struct PreferenceRequest<'a> {
    items: Vec<PreferenceItem<'a>>,
    back_urls: BackUrls<'a>,
    auto_return: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification_url: Option<&'a str>,
    external_reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    statement_descriptor: Option<&'a str>,
    binary_mode: bool,
    payment_methods: PaymentMethods,
}

#[derive(Debug, Serialize)]
struct PreferenceItem<'a> {
    id: &'a str,
    title: &'a str,
    quantity: u32,
    unit_price: f64,
    currency_id: &'a str,
}

#[derive(Debug, Serialize)]
struct BackUrls<'a> {
    success: &'a str,
    failure: &'a str,
    pending: &'a str,
}

#[derive(Debug, Serialize)]
struct PaymentMethods {
    installments: u32,
}

impl<'a> PreferenceRequest<'a> {
    fn from_intent(request: &'a PaymentIntentRequest) -> Self {
        Self {
            items: request
                .items
                .iter()
                .map(|item| PreferenceItem {
                    id: &item.id,
                    title: &item.title,
                    quantity: item.quantity,
                    unit_price: item.unit_price.as_units_f64(),
                    currency_id: &item.currency,
                })
                .collect(),
            back_urls: BackUrls {
                success: &request.return_urls.success,
                failure: &request.return_urls.failure,
                pending: &request.return_urls.pending,
            },
            auto_return: "approved",
            notification_url: request.notification_url.as_deref(),
            external_reference: &request.external_reference,
            statement_descriptor: request.statement_descriptor.as_deref(),
            binary_mode: true,
            payment_methods: PaymentMethods { installments: 1 },
        }
    }
}

#[derive(Debug, Deserialize)]
struct PreferenceResponse {
    id: String,
    #[serde(default)]
    init_point: Option<String>,
    #[serde(default)]
    sandbox_init_point: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    #[serde(deserialize_with = "id_string")]
    id: String,
    status: String,
    #[serde(default)]
    external_reference: Option<String>,
}

/// Payment ids are numbers in the payments API.
fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("unexpected payment id {other}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use studio_core::gateway::{CheckoutItem, ReturnUrls};
    use studio_core::types::Money;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(api_url: &str, sandbox: bool) -> GatewayConfig {
        GatewayConfig {
            api_url: api_url.to_string(),
            access_token: "TEST-token".to_string(),
            timeout: Duration::from_secs(2),
            sandbox,
            notification_url: Some("https://studio.test/api/payments/webhook".to_string()),
            success_url: "https://studio.test/api/payments/success".to_string(),
            failure_url: "https://studio.test/api/payments/failure".to_string(),
            pending_url: "https://studio.test/api/payments/pending".to_string(),
            statement_descriptor: "PILATES STUDIO".to_string(),
        }
    }

    fn intent() -> PaymentIntentRequest {
        PaymentIntentRequest {
            items: vec![CheckoutItem {
                id: "pkg-10".to_string(),
                title: "10 Classes".to_string(),
                quantity: 1,
                unit_price: Money::from_cents(120_050),
                currency: "MXN".to_string(),
            }],
            return_urls: ReturnUrls {
                success: "https://studio.test/api/payments/success".to_string(),
                failure: "https://studio.test/api/payments/failure".to_string(),
                pending: "https://studio.test/api/payments/pending".to_string(),
            },
            notification_url: Some("https://studio.test/api/payments/webhook".to_string()),
            external_reference: r#"{"type":"package"}"#.to_string(),
            statement_descriptor: Some("PILATES STUDIO".to_string()),
        }
    }

    #[test]
    fn preference_body_matches_the_api() {
        let request = intent();
        let json = serde_json::to_value(PreferenceRequest::from_intent(&request)).unwrap();

        assert_eq!(json["items"][0]["unit_price"], 1200.5);
        assert_eq!(json["items"][0]["currency_id"], "MXN");
        assert_eq!(json["back_urls"]["failure"], "https://studio.test/api/payments/failure");
        assert_eq!(json["auto_return"], "approved");
        assert_eq!(json["binary_mode"], true);
        assert_eq!(json["payment_methods"]["installments"], 1);
        assert_eq!(json["external_reference"], r#"{"type":"package"}"#);
    }

    #[test]
    fn debug_hides_the_token() {
        let client = MercadoPagoClient::new(&config("https://api.test", false)).unwrap();
        assert!(!format!("{client:?}").contains("TEST-token"));
    }

    #[tokio::test]
    async fn sandbox_prefers_the_sandbox_init_point() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/checkout/preferences"))
            .and(header("authorization", "Bearer TEST-token"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "pref-1",
                "init_point": "https://mp.test/live",
                "sandbox_init_point": "https://mp.test/sandbox"
            })))
            .mount(&server)
            .await;

        let sandbox = MercadoPagoClient::new(&config(&server.uri(), true)).unwrap();
        let live = MercadoPagoClient::new(&config(&server.uri(), false)).unwrap();

        let session = sandbox.create_payment_intent(intent()).await.unwrap();
        assert_eq!(session.id, "pref-1");
        assert_eq!(session.redirect_url, "https://mp.test/sandbox");

        let session = live.create_payment_intent(intent()).await.unwrap();
        assert_eq!(session.redirect_url, "https://mp.test/live");
    }

    #[tokio::test]
    async fn reads_numeric_payment_ids() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/payments/1319162193"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 1_319_162_193_u64,
                "status": "approved",
                "external_reference": "{\"type\":\"package\"}"
            })))
            .mount(&server)
            .await;

        let client = MercadoPagoClient::new(&config(&server.uri(), false)).unwrap();
        let payment = client
            .get_payment(&ExternalPaymentId::new("1319162193"))
            .await
            .unwrap();

        assert_eq!(payment.id, ExternalPaymentId::new("1319162193"));
        assert!(payment.status.is_approved());
        assert_eq!(payment.external_reference.as_deref(), Some("{\"type\":\"package\"}"));
    }

    #[tokio::test]
    async fn api_errors_keep_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/payments/42"))
            .respond_with(ResponseTemplate::new(404).set_body_string("payment not found"))
            .mount(&server)
            .await;

        let client = MercadoPagoClient::new(&config(&server.uri(), false)).unwrap();
        let err = client
            .get_payment(&ExternalPaymentId::new("42"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            GatewayError::Api {
                status: 404,
                body: "payment not found".to_string()
            }
        );
    }

    #[tokio::test]
    async fn garbage_responses_are_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/payments/7"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = MercadoPagoClient::new(&config(&server.uri(), false)).unwrap();
        let err = client
            .get_payment(&ExternalPaymentId::new("7"))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::InvalidResponse(_)));
    }
}
