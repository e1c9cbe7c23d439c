use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::coupon::Coupon;
use crate::domain::order::{
    ChargeBinding, ChargeRef, ConfirmOutcome, Order, OrderId, OrderStatus, TransactionRef,
};
use crate::domain::ports::{CouponStore, DeliveryQueue, OrderStore};
use crate::error::{PaymentError, Result};

#[derive(Default)]
struct OrdersInner {
    orders: HashMap<OrderId, Order>,
    by_charge: HashMap<ChargeRef, OrderId>,
}

/// Thread-safe in-memory order store.
///
/// The charge index and the order map live under one `RwLock`, and every
/// conditional transition runs while holding the write guard, which makes it
/// the compare-and-swap the webhook race requires.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    inner: Arc<RwLock<OrdersInner>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(binding) = &order.charge {
            inner.by_charge.insert(binding.charge_ref.clone(), order.id);
        }
        inner.orders.insert(order.id, order);
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let inner = self.inner.read().await;
        Ok(inner.orders.get(&id).cloned())
    }

    async fn find_by_charge(&self, charge_ref: &ChargeRef) -> Result<Option<Order>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_charge
            .get(charge_ref)
            .and_then(|id| inner.orders.get(id))
            .cloned())
    }

    async fn bind_charge(&self, id: OrderId, binding: ChargeBinding) -> Result<Order> {
        let mut inner = self.inner.write().await;
        let OrdersInner { orders, by_charge } = &mut *inner;
        let order = orders
            .get_mut(&id)
            .ok_or(PaymentError::OrderNotFound(id.as_uuid()))?;
        if order.status.is_terminal() || order.paid_at.is_some() {
            return Err(PaymentError::IllegalTransition {
                order_id: id.as_uuid(),
                status: order.status.to_string(),
            });
        }
        if let Some(old) = &order.charge {
            by_charge.remove(&old.charge_ref);
        }
        by_charge.insert(binding.charge_ref.clone(), id);
        order.amount = binding.amount;
        order.status = OrderStatus::PendingPayment;
        order.charge = Some(binding);
        Ok(order.clone())
    }

    async fn confirm_payment(
        &self,
        charge_ref: &ChargeRef,
        transaction_ref: &TransactionRef,
        now: DateTime<Utc>,
    ) -> Result<Option<(Order, ConfirmOutcome)>> {
        let mut inner = self.inner.write().await;
        let OrdersInner { orders, by_charge } = &mut *inner;
        let Some(id) = by_charge.get(charge_ref).copied() else {
            return Ok(None);
        };
        let Some(order) = orders.get_mut(&id) else {
            return Ok(None);
        };
        let outcome = order.apply_confirmation(transaction_ref, now);
        Ok(Some((order.clone(), outcome)))
    }

    async fn mark_failed(&self, charge_ref: &ChargeRef) -> Result<Option<bool>> {
        let mut inner = self.inner.write().await;
        let OrdersInner { orders, by_charge } = &mut *inner;
        let Some(id) = by_charge.get(charge_ref).copied() else {
            return Ok(None);
        };
        let Some(order) = orders.get_mut(&id) else {
            return Ok(None);
        };
        Ok(Some(order.apply_failure()))
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<OrderId>> {
        let mut inner = self.inner.write().await;
        let mut expired = Vec::new();
        for (id, order) in inner.orders.iter_mut() {
            if order.expire_if_overdue(now) {
                expired.push(*id);
            }
        }
        Ok(expired)
    }
}

/// Thread-safe in-memory coupon store.
#[derive(Default, Clone)]
pub struct InMemoryCouponStore {
    coupons: Arc<RwLock<HashMap<String, Coupon>>>,
}

impl InMemoryCouponStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CouponStore for InMemoryCouponStore {
    async fn upsert(&self, coupon: Coupon) -> Result<()> {
        let mut coupons = self.coupons.write().await;
        coupons.insert(coupon.code.clone(), coupon);
        Ok(())
    }

    async fn get(&self, code: &str) -> Result<Option<Coupon>> {
        let coupons = self.coupons.read().await;
        Ok(coupons.get(code).cloned())
    }

    async fn redeem(&self, code: &str, order_id: OrderId) -> Result<bool> {
        let mut coupons = self.coupons.write().await;
        let coupon = coupons
            .get_mut(code)
            .ok_or_else(|| PaymentError::CouponNotFound(code.to_string()))?;
        Ok(coupon.redeem(order_id))
    }
}

#[derive(Default)]
struct QueueInner {
    pending: Vec<OrderId>,
    seen: HashSet<OrderId>,
}

/// In-memory delivery hand-off queue, deduplicated by order id.
#[derive(Default, Clone)]
pub struct InMemoryDeliveryQueue {
    inner: Arc<RwLock<QueueInner>>,
}

impl InMemoryDeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes everything currently eligible for delivery.
    pub async fn drain(&self) -> Vec<OrderId> {
        let mut inner = self.inner.write().await;
        std::mem::take(&mut inner.pending)
    }

    pub async fn pending(&self) -> Vec<OrderId> {
        let inner = self.inner.read().await;
        inner.pending.clone()
    }
}

#[async_trait]
impl DeliveryQueue for InMemoryDeliveryQueue {
    async fn enqueue(&self, order_id: OrderId) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.seen.insert(order_id) {
            inner.pending.push(order_id);
        }
        Ok(())
    }
}
