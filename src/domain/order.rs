use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::psp::Presentation;
use crate::error::PaymentError;

/// Opaque order identifier, fixed at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for OrderId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for OrderId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// PSP-assigned charge identifier. Valid only for the amount and provider
/// that were current when the charge was created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChargeRef(String);

impl ChargeRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChargeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Globally unique PSP transaction identifier, set once on confirmation.
/// Doubles as the idempotency key for the post-payment side effects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionRef(String);

impl TransactionRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A positive monetary value.
///
/// Wrapper around `rust_decimal::Decimal`; construction enforces the
/// amount > 0 rule so an invalid amount can never reach the PSP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, PaymentError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PaymentError::InvalidAmount(format!(
                "amount must be positive, got {value}"
            )))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Pix,
    Card,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Pix => f.write_str("pix"),
            PaymentMethod::Card => f.write_str("card"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pix" => Ok(PaymentMethod::Pix),
            "card" => Ok(PaymentMethod::Card),
            other => Err(PaymentError::MalformedPayload(format!(
                "unknown payment method: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Draft,
    PendingPayment,
    Paid,
    /// Paid, delivery deferred by the downstream scheduler.
    Scheduled,
    Failed,
    Expired,
}

impl OrderStatus {
    /// Terminal for this engine; the downstream delivery process may still
    /// move `Paid` onwards.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid | OrderStatus::Scheduled | OrderStatus::Failed | OrderStatus::Expired
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Draft => "draft",
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::Paid => "paid",
            OrderStatus::Scheduled => "scheduled",
            OrderStatus::Failed => "failed",
            OrderStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// The charge currently bound to an order: a fixed-amount PSP instrument
/// plus everything needed to return it unchanged on an idempotent re-issue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChargeBinding {
    pub charge_ref: ChargeRef,
    pub method: PaymentMethod,
    pub amount: Amount,
    pub discount: Option<Amount>,
    pub presentation: Presentation,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of applying a payment confirmation to an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// First confirmation: the order transitioned to paid.
    Applied,
    /// Same transaction reported again. Harmless PSP retry.
    Duplicate,
    /// A different transaction already paid this order.
    Conflict { existing: TransactionRef },
    /// The order is in a state that cannot accept a confirmation.
    Unconfirmable(OrderStatus),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: OrderId,
    pub description: String,
    /// Current price. Fixed at charge-issue time; changing it invalidates
    /// the charge binding.
    pub amount: Amount,
    pub status: OrderStatus,
    pub charge: Option<ChargeBinding>,
    pub transaction_ref: Option<TransactionRef>,
    pub coupon_ref: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        amount: Amount,
        description: impl Into<String>,
        coupon_ref: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            description: description.into(),
            amount,
            status: OrderStatus::Draft,
            charge: None,
            transaction_ref: None,
            coupon_ref,
            paid_at: None,
            created_at: now,
        }
    }

    pub fn charge_ref(&self) -> Option<&ChargeRef> {
        self.charge.as_ref().map(|b| &b.charge_ref)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.charge.as_ref().map(|b| b.expires_at)
    }

    /// The existing binding, if it is still usable as-is: same amount, same
    /// provider, not expired, order still awaiting payment.
    pub fn live_binding(
        &self,
        amount: Amount,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Option<&ChargeBinding> {
        if self.status != OrderStatus::PendingPayment {
            return None;
        }
        self.charge
            .as_ref()
            .filter(|b| b.amount == amount && b.method == method && b.expires_at > now)
    }

    /// Terminal-success shape as observed by the poller: paid with a
    /// transaction, or scheduled (deferred delivery) with both the payment
    /// timestamp and the transaction set.
    pub fn is_settled(&self) -> bool {
        match self.status {
            OrderStatus::Paid => self.transaction_ref.is_some(),
            OrderStatus::Scheduled => self.paid_at.is_some() && self.transaction_ref.is_some(),
            _ => false,
        }
    }

    /// The `pending_payment -> paid` transition. Pure; callers must hold
    /// the store's write guard so the check and the write are one step.
    pub fn apply_confirmation(
        &mut self,
        transaction_ref: &TransactionRef,
        now: DateTime<Utc>,
    ) -> ConfirmOutcome {
        match self.status {
            OrderStatus::PendingPayment if self.paid_at.is_none() => {
                self.status = OrderStatus::Paid;
                self.paid_at = Some(now);
                self.transaction_ref = Some(transaction_ref.clone());
                ConfirmOutcome::Applied
            }
            OrderStatus::Paid | OrderStatus::Scheduled => match &self.transaction_ref {
                Some(existing) if existing == transaction_ref => ConfirmOutcome::Duplicate,
                Some(existing) => ConfirmOutcome::Conflict {
                    existing: existing.clone(),
                },
                None => ConfirmOutcome::Unconfirmable(self.status),
            },
            status => ConfirmOutcome::Unconfirmable(status),
        }
    }

    /// The `pending_payment -> failed` transition. Returns whether it
    /// applied; paid and terminal orders are left untouched.
    pub fn apply_failure(&mut self) -> bool {
        if self.status == OrderStatus::PendingPayment && self.paid_at.is_none() {
            self.status = OrderStatus::Failed;
            true
        } else {
            false
        }
    }

    /// The `pending_payment -> expired` transition, guarded by the charge
    /// validity window.
    pub fn expire_if_overdue(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != OrderStatus::PendingPayment || self.paid_at.is_some() {
            return false;
        }
        match self.expires_at() {
            Some(at) if at <= now => {
                self.status = OrderStatus::Expired;
                true
            }
            _ => false,
        }
    }
}
