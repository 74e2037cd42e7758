//! Reconciliation log backed by structured logging.

use crate::metrics;
use studio_core::reconciliation::{ReconciliationEntry, ReconciliationLog};

/// Writes every entry as an `error` event on the `reconciliation` target and
/// counts it.
///
/// Operators route the target to wherever manual follow-up happens; the entry
/// carries everything needed to refund or apply the payment by hand.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReconciliationLog;

impl ReconciliationLog for TracingReconciliationLog {
    fn record(&self, entry: ReconciliationEntry) {
        metrics::record_reconciliation(entry.reason);

        let reference = entry
            .reference
            .as_ref()
            .and_then(|reference| reference.encode().ok())
            .unwrap_or_default();
        tracing::error!(
            target: "reconciliation",
            payment_id = %entry.payment_id,
            channel = %entry.channel,
            reason = entry.reason.as_str(),
            reference = %reference,
            detail = %entry.detail,
            recorded_at = %entry.recorded_at,
            "Captured payment needs manual reconciliation"
        );
    }
}
