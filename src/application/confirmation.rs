use chrono::Utc;
use tracing::{error, info, warn};

use super::dispatcher::SideEffectDispatcher;
use crate::domain::order::ConfirmOutcome;
use crate::domain::ports::{OrderStore, OrderStoreArc};
use crate::domain::psp::PaymentNotification;
use crate::error::{PaymentError, Result};

/// What the receiver did with a notification.
///
/// Everything here was parsed and evaluated, so the HTTP ingress
/// acknowledges all of these with 200; only a conflict surfaces as an error
/// (and even that is acknowledged, since a PSP retry cannot resolve it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// First confirmation: the order is now paid and side effects ran.
    Applied,
    /// Replay of an already-applied confirmation. No-op.
    Duplicate,
    /// A failure notification moved the order to `failed`.
    FailureRecorded,
    /// Event type this engine deliberately does not handle.
    Ignored,
    /// Correlation matched no live charge (never issued here, or stale).
    UnknownCharge,
    /// Order exists but can no longer accept a confirmation (e.g. expired
    /// before the PSP reported completion). Needs manual reconciliation.
    Unconfirmable,
}

/// The webhook receiver core: one state-machine transition per inbound PSP
/// notification, with the guard executed as an atomic conditional update in
/// the order store.
pub struct ConfirmationEngine {
    orders: OrderStoreArc,
    dispatcher: SideEffectDispatcher,
}

impl ConfirmationEngine {
    pub fn new(orders: OrderStoreArc, dispatcher: SideEffectDispatcher) -> Self {
        Self { orders, dispatcher }
    }

    pub async fn handle(&self, notification: PaymentNotification) -> Result<Disposition> {
        match notification {
            PaymentNotification::Ignored { event } => {
                info!(%event, "ignoring notification");
                Ok(Disposition::Ignored)
            }

            PaymentNotification::ChargeFailed { charge_ref } => {
                match self.orders.mark_failed(&charge_ref).await? {
                    None => {
                        warn!(%charge_ref, "failure notification for unknown or stale charge");
                        Ok(Disposition::UnknownCharge)
                    }
                    Some(true) => {
                        info!(%charge_ref, "order marked failed");
                        Ok(Disposition::FailureRecorded)
                    }
                    // Already paid or already terminal; nothing to record.
                    Some(false) => Ok(Disposition::Ignored),
                }
            }

            PaymentNotification::ChargeCompleted {
                charge_ref,
                transaction_ref,
            } => {
                let now = Utc::now();
                match self
                    .orders
                    .confirm_payment(&charge_ref, &transaction_ref, now)
                    .await?
                {
                    None => {
                        warn!(
                            %charge_ref,
                            %transaction_ref,
                            "completed notification for unknown or stale charge"
                        );
                        Ok(Disposition::UnknownCharge)
                    }
                    Some((order, ConfirmOutcome::Applied)) => {
                        info!(order_id = %order.id, %transaction_ref, "order paid");
                        if let Err(err) = self.dispatcher.on_order_paid(&order).await {
                            // The paid state is already durable; a failed
                            // side effect is an operator problem, not a
                            // reason to make the PSP retry.
                            error!(
                                order_id = %order.id,
                                %transaction_ref,
                                %err,
                                "post-payment side effects incomplete"
                            );
                        }
                        Ok(Disposition::Applied)
                    }
                    Some((order, ConfirmOutcome::Duplicate)) => {
                        info!(order_id = %order.id, %transaction_ref, "duplicate confirmation");
                        Ok(Disposition::Duplicate)
                    }
                    Some((order, ConfirmOutcome::Conflict { existing })) => {
                        error!(
                            order_id = %order.id,
                            existing = %existing,
                            incoming = %transaction_ref,
                            "conflicting confirmation; existing payment left untouched"
                        );
                        Err(PaymentError::ConflictingConfirmation {
                            order_id: order.id.as_uuid(),
                            existing: existing.to_string(),
                            incoming: transaction_ref.to_string(),
                        })
                    }
                    Some((order, ConfirmOutcome::Unconfirmable(status))) => {
                        error!(
                            order_id = %order.id,
                            %status,
                            %transaction_ref,
                            "confirmation for unconfirmable order; manual reconciliation required"
                        );
                        Ok(Disposition::Unconfirmable)
                    }
                }
            }
        }
    }
}
