use tracing::{debug, error, info, warn};

use crate::domain::order::Order;
use crate::domain::ports::{
    AnalyticsSink, AnalyticsSinkArc, CouponStore, CouponStoreArc, DeliveryQueue,
    DeliveryQueueArc,
};
use crate::domain::psp::PurchaseEvent;
use crate::error::{PaymentError, Result};

/// Runs the post-payment side effects: coupon usage increment, purchase
/// analytics, delivery eligibility.
///
/// Invoked from the `Applied` arm of the paid transition, so it runs once
/// per confirmed order; the `paidAt` write is the durable dispatched marker.
/// Every effect is also individually idempotent (coupon redemptions are
/// recorded per order, analytics are keyed by transaction reference, the
/// delivery queue dedupes), so a re-run cannot double-count.
pub struct SideEffectDispatcher {
    coupons: CouponStoreArc,
    analytics: AnalyticsSinkArc,
    delivery: DeliveryQueueArc,
}

impl SideEffectDispatcher {
    pub fn new(
        coupons: CouponStoreArc,
        analytics: AnalyticsSinkArc,
        delivery: DeliveryQueueArc,
    ) -> Self {
        Self {
            coupons,
            analytics,
            delivery,
        }
    }

    pub async fn on_order_paid(&self, order: &Order) -> Result<()> {
        let (Some(paid_at), Some(transaction_ref)) =
            (order.paid_at, order.transaction_ref.as_ref())
        else {
            return Err(PaymentError::Storage(format!(
                "order {} dispatched without payment evidence",
                order.id
            )));
        };

        // Effects are fault-isolated: one failing never blocks the others,
        // and none of them can un-pay the order.
        let mut first_failure = None;

        if let Some(code) = &order.coupon_ref {
            match self.coupons.redeem(code, order.id).await {
                Ok(true) => info!(order_id = %order.id, coupon = %code, "coupon usage recorded"),
                Ok(false) => {
                    debug!(order_id = %order.id, coupon = %code, "coupon already recorded")
                }
                Err(PaymentError::CouponNotFound(_)) => {
                    warn!(order_id = %order.id, coupon = %code, "coupon vanished before redemption")
                }
                Err(err) => {
                    error!(order_id = %order.id, coupon = %code, %err, "coupon increment failed");
                    first_failure.get_or_insert(err);
                }
            }
        }

        let event = PurchaseEvent {
            transaction_ref: transaction_ref.clone(),
            order_id: order.id,
            amount: order.amount.value(),
            coupon_ref: order.coupon_ref.clone(),
            paid_at,
        };
        if let Err(err) = self.analytics.record_purchase(event).await {
            // Fire-and-forget by contract; losing an event is never fatal.
            warn!(order_id = %order.id, %transaction_ref, %err, "purchase analytics dropped");
        }

        if let Err(err) = self.delivery.enqueue(order.id).await {
            error!(order_id = %order.id, %err, "delivery hand-off failed");
            first_failure.get_or_insert(err);
        }

        match first_failure {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}
