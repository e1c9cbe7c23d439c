use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::order::OrderId;

/// A discount coupon with a usage counter.
///
/// Redemptions are recorded per order so that replayed payment confirmations
/// can never increment `used_count` twice for the same order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Coupon {
    pub code: String,
    pub max_uses: Option<u32>,
    pub used_count: u32,
    pub redeemed_orders: HashSet<OrderId>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    pub fn new(
        code: impl Into<String>,
        max_uses: Option<u32>,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            code: code.into(),
            max_uses,
            used_count: 0,
            redeemed_orders: HashSet::new(),
            expires_at,
            created_at: now,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_uses.is_some_and(|max| self.used_count >= max)
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_exhausted() && self.expires_at.is_none_or(|at| at > now)
    }

    /// Records a redemption for `order`. Returns `false` if this order was
    /// already counted.
    pub fn redeem(&mut self, order: OrderId) -> bool {
        if !self.redeemed_orders.insert(order) {
            return false;
        }
        self.used_count += 1;
        true
    }
}
