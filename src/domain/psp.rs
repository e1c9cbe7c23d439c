use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::{Amount, ChargeRef, OrderId, TransactionRef};

/// Request to create a fixed-amount charge at the PSP.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeRequest {
    pub order_id: OrderId,
    pub amount: Amount,
    pub description: String,
}

/// A charge as created at the PSP.
#[derive(Debug, Clone, PartialEq)]
pub struct PspCharge {
    pub charge_ref: ChargeRef,
    pub presentation: Presentation,
}

/// Provider-specific payload the client needs to complete the payment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Presentation {
    /// Instant bank transfer: EMV copy-paste code plus a scannable code image.
    Pix {
        copy_paste_code: String,
        qr_code_url: String,
    },
    /// Hosted card checkout: redirect the client to the PSP page.
    CardCheckout { checkout_url: String },
}

/// A PSP push notification, normalized by the provider adapter that parsed
/// it. Correlation is always by `ChargeRef` embedded at issue time; order
/// identifiers from the webhook body are never trusted.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentNotification {
    ChargeCompleted {
        charge_ref: ChargeRef,
        transaction_ref: TransactionRef,
    },
    ChargeFailed {
        charge_ref: ChargeRef,
    },
    /// Parsed fine, deliberately not handled (refunds, in-progress events).
    Ignored {
        event: String,
    },
}

/// Purchase analytics record. Keyed by the transaction reference so that
/// replays collapse downstream.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PurchaseEvent {
    pub transaction_ref: TransactionRef,
    pub order_id: OrderId,
    pub amount: Decimal,
    pub coupon_ref: Option<String>,
    pub paid_at: DateTime<Utc>,
}
