//! Payment confirmation protocol.
//!
//! A captured payment reaches the service twice: once when the payer's
//! browser returns from checkout ([`PaymentConfirmation::on_redirect_return`])
//! and once, at least, through the gateway webhook
//! ([`PaymentConfirmation::on_webhook_notification`]). Either may come first,
//! either may repeat, and both may run at the same time.
//!
//! Both paths end in the same transactional step. Under the user's lock it
//! checks whether this payment id was already applied, and only when it was
//! not does it create the reservation or purchase and record the payment as
//! applied. The record outlives a later cancellation of the seat. The payment
//! id is the idempotency key; its primary key turns a lost race into a
//! retryable conflict whose retry finds the winner's record.
//!
//! Money that was captured but could not be applied (sold-out session,
//! unknown package, a second charge for a seat already held) never surfaces
//! as an error to the payer or the gateway. It is recorded in the
//! [`ReconciliationLog`] instead.

use crate::config::{BusinessRules, PaymentRules, PurchaseRules};
use crate::metrics;
use crate::purchase::{PurchaseOptions, create_purchase_in};
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use studio_core::environment::Clock;
use studio_core::error::BookingError;
use studio_core::gateway::{GatewayError, GatewayPayment, GatewayPaymentStatus, PaymentGateway};
use studio_core::reconciliation::{
    NotificationChannel, ReconciliationEntry, ReconciliationLog, ReconciliationReason,
};
use studio_core::reference::PaymentReference;
use studio_core::store::{BookingStore, BookingTx};
use studio_core::types::{ExternalPaymentId, Purchase, Reservation};
use studio_runtime::{RetryPolicy, retry_with_predicate};

/// Effect of an approved payment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Confirmation {
    /// A single-class seat was taken
    ReservationCreated(Reservation),
    /// A package purchase was recorded
    PurchaseCreated(Purchase),
    /// This payment had already been applied
    AlreadyProcessed,
    /// The payer already held the seat through another payment
    DuplicateCharge(Reservation),
}

impl Confirmation {
    /// Metrics label
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::ReservationCreated(_) | Self::PurchaseCreated(_) => "applied",
            Self::AlreadyProcessed => "already_processed",
            Self::DuplicateCharge(_) => "duplicate_charge",
        }
    }
}

/// Query parameters the gateway appends to the return URL.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct RedirectReturn {
    /// Gateway payment id
    pub payment_id: Option<String>,
    /// Older name of `payment_id`
    pub collection_id: Option<String>,
    /// Payment status
    pub status: Option<String>,
    /// Older name of `status`
    pub collection_status: Option<String>,
    /// Reference set at checkout
    pub external_reference: Option<String>,
}

impl RedirectReturn {
    /// Whether the browser reports an approved payment
    #[must_use]
    pub fn is_approved(&self) -> bool {
        [&self.status, &self.collection_status]
            .into_iter()
            .any(|s| s.as_deref() == Some("approved"))
    }

    /// The payment id, under either name
    #[must_use]
    pub fn payment_id(&self) -> Option<ExternalPaymentId> {
        self.payment_id
            .as_deref()
            .or(self.collection_id.as_deref())
            .map(str::trim)
            .filter(|id| !id.is_empty() && *id != "null")
            .map(ExternalPaymentId::new)
    }
}

/// Outcome of a redirect return.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RedirectOutcome {
    /// The payment's effect exists (now or from an earlier notification)
    Confirmed(Confirmation),
    /// The payment was not approved; nothing changed
    NotApproved,
    /// Approval could not be established yet; the webhook will settle it
    Pending,
    /// Money was captured but not applied; recorded for reconciliation
    Reconciliation(ReconciliationReason),
}

/// Gateway webhook body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct WebhookNotification {
    /// Event id
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    /// Event type (`payment`, `merchant_order`, ...)
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Event action (`payment.created`, `payment.updated`, ...)
    #[serde(default)]
    pub action: Option<String>,
    /// Event payload
    #[serde(default)]
    pub data: Option<WebhookData>,
}

/// Payload of a [`WebhookNotification`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct WebhookData {
    /// Resource id; the payment id for payment events
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
}

impl WebhookNotification {
    fn payment_id(&self) -> Option<ExternalPaymentId> {
        self.data
            .as_ref()
            .and_then(|data| data.id.as_deref())
            .filter(|id| !id.is_empty())
            .map(ExternalPaymentId::new)
    }
}

/// How a webhook was handled. The gateway is acknowledged in every case.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookAck {
    /// Gateway connectivity test
    TestEvent,
    /// Not actionable
    Ignored(&'static str),
    /// The gateway could not be asked for the payment status
    LookupFailed,
    /// The payment is not approved
    NotApproved,
    /// The payment's effect exists
    Confirmed(Confirmation),
    /// Money was captured but not applied; recorded for reconciliation
    Reconciliation(ReconciliationReason),
}

impl WebhookAck {
    /// Metrics label
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::TestEvent => "test_event",
            Self::Ignored(_) => "ignored",
            Self::LookupFailed => "lookup_failed",
            Self::NotApproved => "not_approved",
            Self::Confirmed(confirmation) => confirmation.label(),
            Self::Reconciliation(_) => "reconciliation",
        }
    }
}

enum Settlement {
    Confirmed(Confirmation),
    Reconciliation(ReconciliationReason),
}

/// Applies approved payments exactly once.
pub struct PaymentConfirmation<S> {
    store: Arc<S>,
    gateway: Arc<dyn PaymentGateway>,
    reconciliation: Arc<dyn ReconciliationLog>,
    clock: Arc<dyn Clock>,
    purchase_rules: PurchaseRules,
    payment_rules: PaymentRules,
    retry: RetryPolicy,
}

impl<S: BookingStore> PaymentConfirmation<S> {
    /// Create the protocol handler.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        gateway: Arc<dyn PaymentGateway>,
        reconciliation: Arc<dyn ReconciliationLog>,
        clock: Arc<dyn Clock>,
        rules: BusinessRules,
    ) -> Self {
        Self {
            store,
            gateway,
            reconciliation,
            clock,
            purchase_rules: rules.purchase,
            payment_rules: rules.payment,
            retry: rules.retry,
        }
    }

    /// Handles the payer's browser returning from checkout.
    ///
    /// A non-approved return changes nothing. An approved one is checked
    /// against the gateway (unless disabled) and then applied.
    #[tracing::instrument(skip_all, fields(payment_id = ?ret.payment_id()))]
    pub async fn on_redirect_return(&self, ret: &RedirectReturn) -> RedirectOutcome {
        let channel = NotificationChannel::Redirect;
        let outcome = self.redirect_outcome(ret).await;

        let label = match &outcome {
            RedirectOutcome::Confirmed(confirmation) => confirmation.label(),
            RedirectOutcome::NotApproved => "not_approved",
            RedirectOutcome::Pending => "pending",
            RedirectOutcome::Reconciliation(_) => "reconciliation",
        };
        metrics::record_notification(channel, label);
        outcome
    }

    async fn redirect_outcome(&self, ret: &RedirectReturn) -> RedirectOutcome {
        let channel = NotificationChannel::Redirect;
        if !ret.is_approved() {
            tracing::info!(status = ?ret.status, "Payment not approved on return");
            return RedirectOutcome::NotApproved;
        }
        let Some(payment_id) = ret.payment_id() else {
            tracing::warn!("Approved return without a payment id");
            return RedirectOutcome::Pending;
        };

        let raw_reference = if self.payment_rules.verify_redirect_with_gateway {
            match self.fetch_payment(&payment_id).await {
                Ok(payment) if payment.status.is_approved() => payment
                    .external_reference
                    .or_else(|| ret.external_reference.clone()),
                Ok(payment) if payment.status == GatewayPaymentStatus::Pending => {
                    return RedirectOutcome::Pending;
                }
                Ok(payment) => {
                    tracing::warn!(status = ?payment.status, "Return reported approval the gateway does not confirm");
                    return RedirectOutcome::NotApproved;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Could not verify payment, leaving it to the webhook");
                    return RedirectOutcome::Pending;
                }
            }
        } else {
            ret.external_reference.clone()
        };

        let Some(reference) = self.decode_reference(channel, &payment_id, raw_reference.as_deref())
        else {
            return RedirectOutcome::Reconciliation(ReconciliationReason::ProcessingError);
        };

        match self.settle(channel, &payment_id, reference).await {
            Settlement::Confirmed(confirmation) => RedirectOutcome::Confirmed(confirmation),
            Settlement::Reconciliation(reason) => RedirectOutcome::Reconciliation(reason),
        }
    }

    /// Handles a gateway notification.
    ///
    /// Never fails: the gateway redelivers anything that is not acknowledged,
    /// so every internal problem is logged (and, for captured money,
    /// recorded for reconciliation) instead of returned.
    #[tracing::instrument(skip_all, fields(event_id = ?notification.id, kind = ?notification.kind))]
    pub async fn on_webhook_notification(&self, notification: &WebhookNotification) -> WebhookAck {
        let ack = self.webhook_ack(notification).await;
        metrics::record_notification(NotificationChannel::Webhook, ack.label());
        tracing::debug!(outcome = ack.label(), "Webhook acknowledged");
        ack
    }

    async fn webhook_ack(&self, notification: &WebhookNotification) -> WebhookAck {
        let channel = NotificationChannel::Webhook;
        let payment_id = notification.payment_id();

        let is_test_event = notification
            .id
            .as_ref()
            .is_some_and(|id| self.payment_rules.test_event_ids.contains(id));
        let is_test_payment = payment_id
            .as_ref()
            .is_some_and(|id| self.payment_rules.test_payment_ids.iter().any(|t| t == id.as_str()));
        if is_test_event || is_test_payment {
            tracing::info!("Test notification accepted");
            return WebhookAck::TestEvent;
        }

        if notification.kind.as_deref() != Some("payment") {
            return WebhookAck::Ignored("not a payment event");
        }
        let Some(payment_id) = payment_id else {
            return WebhookAck::Ignored("missing payment id");
        };

        let payment = match self.fetch_payment(&payment_id).await {
            Ok(payment) => payment,
            Err(err) => {
                tracing::error!(%payment_id, error = %err, "Payment lookup failed");
                return WebhookAck::LookupFailed;
            }
        };
        if !payment.status.is_approved() {
            tracing::info!(%payment_id, status = ?payment.status, "Payment not approved");
            return WebhookAck::NotApproved;
        }

        let Some(reference) =
            self.decode_reference(channel, &payment_id, payment.external_reference.as_deref())
        else {
            return WebhookAck::Ignored("malformed external reference");
        };

        match self.settle(channel, &payment_id, reference).await {
            Settlement::Confirmed(confirmation) => WebhookAck::Confirmed(confirmation),
            Settlement::Reconciliation(reason) => WebhookAck::Reconciliation(reason),
        }
    }

    /// Authoritative payment status, retrying network failures.
    async fn fetch_payment(
        &self,
        payment_id: &ExternalPaymentId,
    ) -> Result<GatewayPayment, GatewayError> {
        retry_with_predicate(
            &self.retry,
            "get_payment",
            || self.gateway.get_payment(payment_id),
            |err| matches!(err, GatewayError::Unreachable(_) | GatewayError::Timeout),
        )
        .await
    }

    fn decode_reference(
        &self,
        channel: NotificationChannel,
        payment_id: &ExternalPaymentId,
        raw: Option<&str>,
    ) -> Option<PaymentReference> {
        match PaymentReference::parse(raw.unwrap_or_default()) {
            Ok(reference) => Some(reference),
            Err(err) => {
                tracing::warn!(%payment_id, error = %err, "Approved payment with unusable reference");
                self.record(channel, payment_id, None, ReconciliationReason::ProcessingError, err.to_string());
                None
            }
        }
    }

    async fn settle(
        &self,
        channel: NotificationChannel,
        payment_id: &ExternalPaymentId,
        reference: PaymentReference,
    ) -> Settlement {
        match self.confirm(payment_id, &reference).await {
            Ok(Confirmation::DuplicateCharge(existing)) => {
                tracing::warn!(
                    %payment_id,
                    reservation_id = %existing.id,
                    "Seat already paid by another payment"
                );
                self.record(
                    channel,
                    payment_id,
                    Some(reference),
                    ReconciliationReason::DuplicateCharge,
                    format!("reservation {} already completed", existing.id),
                );
                Settlement::Confirmed(Confirmation::DuplicateCharge(existing))
            }
            Ok(Confirmation::ReservationCreated(reservation)) => {
                metrics::record_reservation("confirmed_by_payment");
                tracing::info!(%payment_id, reservation_id = %reservation.id, %channel, "Single class confirmed");
                Settlement::Confirmed(Confirmation::ReservationCreated(reservation))
            }
            Ok(Confirmation::PurchaseCreated(purchase)) => {
                metrics::record_purchase("created");
                tracing::info!(%payment_id, purchase_id = %purchase.id, %channel, "Package purchase confirmed");
                Settlement::Confirmed(Confirmation::PurchaseCreated(purchase))
            }
            Ok(Confirmation::AlreadyProcessed) => {
                tracing::debug!(%payment_id, %channel, "Payment already applied");
                Settlement::Confirmed(Confirmation::AlreadyProcessed)
            }
            Err(err) => {
                let reason = match &err {
                    BookingError::SessionFull => ReconciliationReason::SessionFull,
                    BookingError::SessionNotFound(_) => ReconciliationReason::SessionNotFound,
                    BookingError::PackageNotFound(_) => ReconciliationReason::PackageNotFound,
                    BookingError::AlreadyActivePackage(_) => ReconciliationReason::PurchaseRejected,
                    _ => ReconciliationReason::ProcessingError,
                };
                tracing::error!(%payment_id, %channel, error = %err, "Captured payment could not be applied");
                self.record(channel, payment_id, Some(reference), reason, err.to_string());
                Settlement::Reconciliation(reason)
            }
        }
    }

    fn record(
        &self,
        channel: NotificationChannel,
        payment_id: &ExternalPaymentId,
        reference: Option<PaymentReference>,
        reason: ReconciliationReason,
        detail: String,
    ) {
        self.reconciliation.record(ReconciliationEntry {
            payment_id: payment_id.clone(),
            channel,
            reference,
            reason,
            detail,
            recorded_at: self.clock.now(),
        });
    }

    /// Applies an approved payment once.
    ///
    /// # Errors
    ///
    /// Business-rule failures ([`BookingError::SessionFull`],
    /// [`BookingError::SessionNotFound`], [`BookingError::PackageNotFound`],
    /// [`BookingError::AlreadyActivePackage`]) and store errors that outlived
    /// the retry budget.
    pub async fn confirm(
        &self,
        payment_id: &ExternalPaymentId,
        reference: &PaymentReference,
    ) -> Result<Confirmation, BookingError> {
        retry_with_predicate(
            &self.retry,
            "confirm_payment",
            || self.try_confirm(payment_id, reference),
            BookingError::is_transient,
        )
        .await
    }

    async fn try_confirm(
        &self,
        payment_id: &ExternalPaymentId,
        reference: &PaymentReference,
    ) -> Result<Confirmation, BookingError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        tx.lock_user(reference.user_id()).await?;

        if tx.payment_applied(payment_id).await? {
            return Ok(Confirmation::AlreadyProcessed);
        }

        match reference {
            PaymentReference::SingleClass {
                user_id,
                session_id,
                single_class_price,
                ..
            } => {
                if tx.reservation_by_payment(payment_id).await?.is_some() {
                    return Ok(Confirmation::AlreadyProcessed);
                }
                if let Some(existing) = tx.completed_reservation(*user_id, *session_id).await? {
                    return Ok(Confirmation::DuplicateCharge(existing));
                }

                let session = tx
                    .session_for_update(*session_id)
                    .await?
                    .ok_or(BookingError::SessionNotFound(*session_id))?;
                if session.is_full() {
                    return Err(BookingError::SessionFull);
                }

                tx.delete_pending_reservations(*user_id, *session_id).await?;
                let reservation = Reservation::with_single_payment(
                    *user_id,
                    *session_id,
                    *single_class_price,
                    payment_id.clone(),
                    now,
                );
                tx.insert_reservation(&reservation).await?;
                if !tx.try_reserve_seat(*session_id).await? {
                    return Err(BookingError::SessionFull);
                }
                tx.record_applied_payment(payment_id, now).await?;
                tx.commit().await?;

                Ok(Confirmation::ReservationCreated(reservation))
            }
            PaymentReference::Package {
                user_id,
                package_id,
            } => {
                let options = PurchaseOptions {
                    allow_multiple_active: false,
                    skip_active_check: self.purchase_rules.skip_active_check_on_payment,
                };
                let outcome = create_purchase_in(
                    &mut tx,
                    &self.purchase_rules,
                    now,
                    *user_id,
                    package_id,
                    Some(payment_id),
                    options,
                )
                .await?;
                if outcome.already_processed {
                    return Ok(Confirmation::AlreadyProcessed);
                }
                tx.commit().await?;

                Ok(Confirmation::PurchaseCreated(outcome.purchase))
            }
        }
    }
}

/// Accepts ids sent either as JSON strings or as numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
