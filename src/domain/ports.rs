use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::coupon::Coupon;
use super::order::{
    ChargeBinding, ChargeRef, ConfirmOutcome, Order, OrderId, PaymentMethod, TransactionRef,
};
use super::psp::{ChargeRequest, PaymentNotification, PspCharge, PurchaseEvent};
use crate::error::Result;

/// Durable record of orders and their lifecycle. The single shared mutable
/// resource of the engine: every mutation is one conditional update executed
/// under the store's write guard, never a separate read/check/write.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: Order) -> Result<()>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>>;

    /// Correlates a charge reference back to its order. A charge cleared by
    /// re-issuance no longer resolves.
    async fn find_by_charge(&self, charge_ref: &ChargeRef) -> Result<Option<Order>>;

    /// Atomically replaces the order's charge binding and moves it to
    /// `pending_payment`. Any previous binding is discarded in the same
    /// update, so a stale charge reference never survives an amount change.
    ///
    /// Fails with `IllegalTransition` if the order reached a terminal state
    /// in the meantime.
    async fn bind_charge(&self, id: OrderId, binding: ChargeBinding) -> Result<Order>;

    /// The `pending_payment -> paid` compare-and-swap, correlated by charge
    /// reference. Returns `None` when no order matches the charge; otherwise
    /// the post-transition order and what happened.
    async fn confirm_payment(
        &self,
        charge_ref: &ChargeRef,
        transaction_ref: &TransactionRef,
        now: DateTime<Utc>,
    ) -> Result<Option<(Order, ConfirmOutcome)>>;

    /// The guarded `pending_payment -> failed` transition. Returns `None`
    /// for an unknown charge, otherwise whether the transition applied.
    async fn mark_failed(&self, charge_ref: &ChargeRef) -> Result<Option<bool>>;

    /// Expires every pending order whose charge validity window has passed.
    /// Returns the ids that transitioned.
    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<OrderId>>;
}

#[async_trait]
pub trait CouponStore: Send + Sync {
    async fn upsert(&self, coupon: Coupon) -> Result<()>;

    async fn get(&self, code: &str) -> Result<Option<Coupon>>;

    /// Atomically records a redemption for `order_id` and increments the
    /// usage counter. Returns `false` when the order was already counted.
    async fn redeem(&self, code: &str, order_id: OrderId) -> Result<bool>;
}

/// A PSP integration: creates fixed-amount charges and parses its own
/// webhook payloads into normalized notifications.
#[async_trait]
pub trait ChargeProvider: Send + Sync {
    fn method(&self) -> PaymentMethod;

    async fn create_charge(&self, req: &ChargeRequest) -> Result<PspCharge>;

    /// Parses one webhook delivery. PIX deliveries may batch several
    /// payments, hence the list; a malformed payload is an error (the only
    /// case the ingress answers with a non-2xx).
    fn parse_webhook(&self, body: &[u8]) -> Result<Vec<PaymentNotification>>;
}

/// Fire-and-forget purchase analytics.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record_purchase(&self, event: PurchaseEvent) -> Result<()>;
}

/// Hand-off point to the downstream delivery process.
#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    async fn enqueue(&self, order_id: OrderId) -> Result<()>;
}

pub type OrderStoreArc = Arc<dyn OrderStore>;
pub type CouponStoreArc = Arc<dyn CouponStore>;
pub type ChargeProviderArc = Arc<dyn ChargeProvider>;
pub type AnalyticsSinkArc = Arc<dyn AnalyticsSink>;
pub type DeliveryQueueArc = Arc<dyn DeliveryQueue>;
