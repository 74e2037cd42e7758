//! Purchase endpoints.
//!
//! - `POST /api/purchases`: record a purchase by hand (admin)
//! - `GET /api/purchases/eligibility`: may the caller buy a package
//! - `GET /api/purchases/active`: the caller's active package
//! - `PUT /api/purchases/:id/expire`: end a purchase now (admin)

use crate::eligibility::Eligibility;
use crate::purchase::PurchaseOptions;
use crate::server::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use studio_core::store::BookingStore;
use studio_core::types::{ExternalPaymentId, PackageId, Purchase, PurchaseId, UserId};
use studio_web::{AppError, CallerIdentity, WebResult};
use uuid::Uuid;

/// Manual purchase, e.g. for a package paid at the front desk.
#[derive(Debug, Deserialize)]
pub struct CreatePurchaseRequest {
    /// Who receives the package
    pub user_id: UserId,
    /// Catalog package
    pub package_id: PackageId,
    /// Gateway payment that paid for it, if any
    #[serde(default)]
    pub payment_id: Option<String>,
    /// Allow a second active package
    #[serde(default)]
    pub allow_multiple_active: bool,
    /// Skip the active package check entirely
    #[serde(default)]
    pub skip_active_check: bool,
}

/// A purchase and whether it already existed.
#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    /// The purchase
    pub purchase: Purchase,
    /// The payment id had already produced this purchase
    pub already_processed: bool,
}

/// The caller's active purchase.
#[derive(Debug, Serialize)]
pub struct ActivePurchaseResponse {
    /// `None` when the caller holds no active package
    pub purchase: Option<Purchase>,
}

/// Record a purchase by hand. Admin only.
///
/// # Errors
///
/// 403 for non-admins, 404 for unknown packages, 409 when the user already
/// holds an active package and the options do not allow another.
pub async fn create_purchase<S: BookingStore + 'static>(
    caller: CallerIdentity,
    State(state): State<AppState<S>>,
    Json(request): Json<CreatePurchaseRequest>,
) -> WebResult<(StatusCode, Json<PurchaseResponse>)> {
    if !caller.is_admin() {
        return Err(AppError::forbidden("Only administrators can record purchases"));
    }

    let payment_id = request
        .payment_id
        .filter(|id| !id.trim().is_empty())
        .map(ExternalPaymentId::new);
    let options = PurchaseOptions {
        allow_multiple_active: request.allow_multiple_active,
        skip_active_check: request.skip_active_check,
    };

    let outcome = state
        .purchases
        .create_purchase(
            request.user_id,
            &request.package_id,
            payment_id.as_ref(),
            options,
        )
        .await?;

    let status = if outcome.already_processed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(PurchaseResponse {
            purchase: outcome.purchase,
            already_processed: outcome.already_processed,
        }),
    ))
}

/// Whether the caller may buy a package now.
///
/// # Errors
///
/// 5xx when the store fails.
pub async fn eligibility<S: BookingStore + 'static>(
    caller: CallerIdentity,
    State(state): State<AppState<S>>,
) -> WebResult<Json<Eligibility>> {
    Ok(Json(state.purchases.can_purchase(caller.user_id).await?))
}

/// The caller's active package.
///
/// # Errors
///
/// 5xx when the store fails.
pub async fn active_purchase<S: BookingStore + 'static>(
    caller: CallerIdentity,
    State(state): State<AppState<S>>,
) -> WebResult<Json<ActivePurchaseResponse>> {
    let purchase = state.purchases.active_purchase(caller.user_id).await?;
    Ok(Json(ActivePurchaseResponse { purchase }))
}

/// End a purchase's validity now. Admin only.
///
/// # Errors
///
/// 403 for non-admins, 404 for unknown purchases.
pub async fn expire_purchase<S: BookingStore + 'static>(
    caller: CallerIdentity,
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> WebResult<Json<Purchase>> {
    let purchase = state
        .purchases
        .expire_purchase(PurchaseId::from_uuid(id), &caller)
        .await?;
    Ok(Json(purchase))
}
