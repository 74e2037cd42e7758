//! Configuration management for the booking service.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Business rules are plain values handed to the engine constructors; no
//! engine reads the environment on its own.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use studio_core::types::Money;
use studio_postgres::PostgresConfig;
use studio_runtime::RetryPolicy;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// `PostgreSQL` connection pool
    pub postgres: PostgresConfig,
    /// HTTP and metrics listeners
    pub server: ServerConfig,
    /// Payment gateway client and checkout settings
    pub gateway: GatewayConfig,
    /// Pages the payer's browser lands on after checkout
    pub frontend: FrontendConfig,
    /// Business rules passed into the engines
    pub rules: BusinessRules,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Metrics server host (for Prometheus scraping)
    pub metrics_host: String,
    /// Metrics server port
    pub metrics_port: u16,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// Address of the HTTP listener.
    ///
    /// # Errors
    ///
    /// Returns an error if `host:port` is not a socket address.
    pub fn http_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    /// Address of the Prometheus listener.
    ///
    /// # Errors
    ///
    /// Returns an error if `metrics_host:metrics_port` is not a socket address.
    pub fn metrics_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.metrics_host, self.metrics_port).parse()
    }
}

/// Payment gateway configuration
#[derive(Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// REST API base URL
    pub api_url: String,
    /// Bearer token
    pub access_token: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Prefer the sandbox checkout URL
    pub sandbox: bool,
    /// Webhook target registered with every checkout
    pub notification_url: Option<String>,
    /// Redirect target for approved payments
    pub success_url: String,
    /// Redirect target for rejected payments
    pub failure_url: String,
    /// Redirect target for payments still in process
    pub pending_url: String,
    /// Text on the payer's card statement
    pub statement_descriptor: String,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_url", &self.api_url)
            .field("access_token", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("sandbox", &self.sandbox)
            .field("notification_url", &self.notification_url)
            .field("success_url", &self.success_url)
            .field("failure_url", &self.failure_url)
            .field("pending_url", &self.pending_url)
            .field("statement_descriptor", &self.statement_descriptor)
            .finish()
    }
}

/// Frontend pages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontendConfig {
    /// Shown after a confirmed payment
    pub success_page: String,
    /// Shown after a rejected payment
    pub failure_page: String,
    /// Shown while a payment is in process
    pub pending_page: String,
    /// Shown when a captured payment could not be applied
    pub error_page: String,
}

/// Rules for buying packages.
///
/// With the defaults a user may hold exactly one active package, and a paid
/// package is always granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchaseRules {
    /// Users may hold several active packages
    pub allow_multiple_active: bool,
    /// Allow buying when fewer than this percentage of credits remain
    pub low_credits_threshold_percent: Option<u8>,
    /// Allow buying when fewer than this many days remain before expiry
    pub near_expiry_threshold_days: Option<u32>,
    /// Skip the active-package check for purchases the gateway already charged
    pub skip_active_check_on_payment: bool,
}

impl Default for PurchaseRules {
    fn default() -> Self {
        Self {
            allow_multiple_active: false,
            low_credits_threshold_percent: None,
            near_expiry_threshold_days: None,
            skip_active_check_on_payment: true,
        }
    }
}

/// Rules for booking sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationRules {
    /// Price of a class paid without a package
    pub single_class_price: Money,
}

impl Default for ReservationRules {
    fn default() -> Self {
        Self {
            single_class_price: Money::from_cents(15_000),
        }
    }
}

/// Rules for payment confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRules {
    /// Webhook event ids the gateway uses for connectivity tests
    pub test_event_ids: Vec<String>,
    /// Payment ids the gateway uses for connectivity tests
    pub test_payment_ids: Vec<String>,
    /// Confirm redirect returns against the gateway before applying them
    pub verify_redirect_with_gateway: bool,
    /// ISO currency of every checkout
    pub currency: String,
}

impl Default for PaymentRules {
    fn default() -> Self {
        Self {
            test_event_ids: vec!["123456".to_string()],
            test_payment_ids: vec!["1234157574".to_string()],
            verify_redirect_with_gateway: true,
            currency: "MXN".to_string(),
        }
    }
}

/// All business rules
#[derive(Debug, Clone, Default)]
pub struct BusinessRules {
    /// Package purchase rules
    pub purchase: PurchaseRules,
    /// Booking rules
    pub reservation: ReservationRules,
    /// Confirmation rules
    pub payment: PaymentRules,
    /// Retry budget for transactions that lose a write race
    pub retry: RetryPolicy,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Missing or unparsable values fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    #[must_use]
    #[allow(clippy::too_many_lines)] // Config loading is naturally long but simple
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());
        let flag = |key: &str, default: bool| {
            lookup(key)
                .and_then(|s| parse_bool(&s))
                .unwrap_or(default)
        };
        let list = |key: &str, default: &[String]| {
            lookup(key).map_or_else(
                || default.to_vec(),
                |s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(ToString::to_string)
                        .collect()
                },
            )
        };

        let pg_defaults = PostgresConfig::default();
        let postgres = PostgresConfig {
            url: var("DATABASE_URL", &pg_defaults.url),
            max_connections: parsed("DATABASE_MAX_CONNECTIONS")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(pg_defaults.max_connections),
            min_connections: parsed("DATABASE_MIN_CONNECTIONS")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(pg_defaults.min_connections),
            connect_timeout: parsed("DATABASE_CONNECT_TIMEOUT")
                .map_or(pg_defaults.connect_timeout, Duration::from_secs),
            statement_timeout: parsed("DATABASE_STATEMENT_TIMEOUT")
                .map_or(pg_defaults.statement_timeout, Duration::from_secs),
            idle_timeout: parsed("DATABASE_IDLE_TIMEOUT")
                .map_or(pg_defaults.idle_timeout, Duration::from_secs),
        };

        let server = ServerConfig {
            host: var("HOST", "0.0.0.0"),
            port: parsed("PORT")
                .and_then(|n| u16::try_from(n).ok())
                .unwrap_or(8080),
            metrics_host: var("METRICS_HOST", "0.0.0.0"),
            metrics_port: parsed("METRICS_PORT")
                .and_then(|n| u16::try_from(n).ok())
                .unwrap_or(9090),
            shutdown_timeout: Duration::from_secs(parsed("SHUTDOWN_TIMEOUT").unwrap_or(30)),
        };

        let public_url = var("PUBLIC_URL", "http://localhost:8080");
        let public_url = public_url.trim_end_matches('/');
        let gateway = GatewayConfig {
            api_url: var("MP_API_URL", "https://api.mercadopago.com"),
            access_token: var("MP_ACCESS_TOKEN", ""),
            timeout: Duration::from_secs(parsed("MP_TIMEOUT").unwrap_or(30)),
            sandbox: flag("MP_SANDBOX", true),
            notification_url: Some(
                lookup("MP_NOTIFICATION_URL")
                    .unwrap_or_else(|| format!("{public_url}/api/payments/webhook")),
            )
            .filter(|url| !url.is_empty()),
            success_url: format!("{public_url}/api/payments/success"),
            failure_url: format!("{public_url}/api/payments/failure"),
            pending_url: format!("{public_url}/api/payments/pending"),
            statement_descriptor: var("MP_STATEMENT_DESCRIPTOR", "PILATES STUDIO"),
        };

        let frontend_url = var("FRONTEND_URL", "http://localhost:3000");
        let frontend_url = frontend_url.trim_end_matches('/');
        let frontend = FrontendConfig {
            success_page: format!("{frontend_url}/interfaces/success.html"),
            failure_page: format!("{frontend_url}/interfaces/failure.html"),
            pending_page: format!("{frontend_url}/interfaces/pending.html"),
            error_page: format!("{frontend_url}/interfaces/error.html"),
        };

        let purchase_defaults = PurchaseRules::default();
        let payment_defaults = PaymentRules::default();
        let retry_defaults = RetryPolicy::default();
        let rules = BusinessRules {
            purchase: PurchaseRules {
                allow_multiple_active: flag(
                    "ALLOW_MULTIPLE_ACTIVE_PACKAGES",
                    purchase_defaults.allow_multiple_active,
                ),
                low_credits_threshold_percent: parsed("LOW_CREDITS_THRESHOLD_PERCENT")
                    .and_then(|n| u8::try_from(n).ok())
                    .filter(|p| *p <= 100),
                near_expiry_threshold_days: parsed("NEAR_EXPIRY_THRESHOLD_DAYS")
                    .and_then(|n| u32::try_from(n).ok()),
                skip_active_check_on_payment: flag(
                    "SKIP_ACTIVE_CHECK_ON_PAYMENT",
                    purchase_defaults.skip_active_check_on_payment,
                ),
            },
            reservation: ReservationRules {
                single_class_price: parsed("SINGLE_CLASS_PRICE_CENTS")
                    .filter(|cents| *cents > 0)
                    .map_or(ReservationRules::default().single_class_price, Money::from_cents),
            },
            payment: PaymentRules {
                test_event_ids: list("PAYMENT_TEST_EVENT_IDS", &payment_defaults.test_event_ids),
                test_payment_ids: list(
                    "PAYMENT_TEST_PAYMENT_IDS",
                    &payment_defaults.test_payment_ids,
                ),
                verify_redirect_with_gateway: flag(
                    "VERIFY_REDIRECT_WITH_GATEWAY",
                    payment_defaults.verify_redirect_with_gateway,
                ),
                currency: var("PAYMENT_CURRENCY", &payment_defaults.currency),
            },
            retry: RetryPolicy::builder()
                .max_retries(
                    parsed("TRANSACTION_MAX_RETRIES")
                        .and_then(|n| usize::try_from(n).ok())
                        .unwrap_or(retry_defaults.max_retries),
                )
                .initial_delay(
                    parsed("TRANSACTION_RETRY_DELAY_MS")
                        .map_or(retry_defaults.initial_delay, Duration::from_millis),
                )
                .max_delay(
                    parsed("TRANSACTION_RETRY_MAX_DELAY_MS")
                        .map_or(retry_defaults.max_delay, Duration::from_millis),
                )
                .multiplier(retry_defaults.multiplier)
                .build(),
        };

        Self {
            postgres,
            server,
            gateway,
            frontend,
            rules,
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_the_simple_existence_rule() {
        let config = config_from(&[]);

        assert_eq!(config.rules.purchase, PurchaseRules::default());
        assert!(!config.rules.purchase.allow_multiple_active);
        assert!(config.rules.purchase.skip_active_check_on_payment);
        assert_eq!(config.rules.reservation.single_class_price.cents(), 15_000);
        assert_eq!(config.rules.payment.test_event_ids, vec!["123456".to_string()]);
        assert_eq!(config.rules.retry.max_retries, 3);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.gateway.statement_descriptor, "PILATES STUDIO");
    }

    #[test]
    fn urls_are_derived_from_public_and_frontend_base() {
        let config = config_from(&[
            ("PUBLIC_URL", "https://api.studio.test/"),
            ("FRONTEND_URL", "https://studio.test"),
        ]);

        assert_eq!(
            config.gateway.notification_url.as_deref(),
            Some("https://api.studio.test/api/payments/webhook")
        );
        assert_eq!(
            config.gateway.success_url,
            "https://api.studio.test/api/payments/success"
        );
        assert_eq!(
            config.frontend.failure_page,
            "https://studio.test/interfaces/failure.html"
        );
    }

    #[test]
    fn business_rules_from_variables() {
        let config = config_from(&[
            ("ALLOW_MULTIPLE_ACTIVE_PACKAGES", "true"),
            ("LOW_CREDITS_THRESHOLD_PERCENT", "20"),
            ("NEAR_EXPIRY_THRESHOLD_DAYS", "7"),
            ("SINGLE_CLASS_PRICE_CENTS", "20000"),
            ("PAYMENT_TEST_EVENT_IDS", "1, 2 ,"),
            ("TRANSACTION_MAX_RETRIES", "5"),
        ]);

        let purchase = config.rules.purchase;
        assert!(purchase.allow_multiple_active);
        assert_eq!(purchase.low_credits_threshold_percent, Some(20));
        assert_eq!(purchase.near_expiry_threshold_days, Some(7));
        assert_eq!(config.rules.reservation.single_class_price.cents(), 20_000);
        assert_eq!(config.rules.payment.test_event_ids, vec!["1", "2"]);
        assert_eq!(config.rules.retry.max_retries, 5);
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let config = config_from(&[
            ("PORT", "not-a-port"),
            ("LOW_CREDITS_THRESHOLD_PERCENT", "250"),
            ("MP_SANDBOX", "maybe"),
            ("MP_NOTIFICATION_URL", ""),
        ]);

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.rules.purchase.low_credits_threshold_percent, None);
        assert!(config.gateway.sandbox);
        assert_eq!(config.gateway.notification_url, None);
    }

    #[test]
    fn access_token_is_not_printed() {
        let config = config_from(&[("MP_ACCESS_TOKEN", "APP_USR-secret")]);
        assert!(!format!("{:?}", config.gateway).contains("secret"));
    }
}
