mod common;

use chrono::Utc;
use common::{completed, seed_coupon, stack, submit_order};
use rust_decimal_macros::dec;

use confirma::application::confirmation::Disposition;
use confirma::domain::order::{ChargeRef, OrderStatus, PaymentMethod};
use confirma::domain::ports::{CouponStore, OrderStore};
use confirma::domain::psp::PaymentNotification;
use confirma::error::PaymentError;

#[tokio::test]
async fn test_scenario_a_webhook_confirms_order() {
    let stack = stack();
    let id = submit_order(&stack, dec!(5.00), None).await;
    let issued = stack
        .issuer
        .issue(id, dec!(5.00), PaymentMethod::Pix, "note", None)
        .await
        .unwrap();

    let disposition = stack
        .confirmations
        .handle(completed(&issued.charge_ref, "E-T1"))
        .await
        .unwrap();
    assert_eq!(disposition, Disposition::Applied);

    let order = stack.orders.get(id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert!(order.paid_at.is_some());
    assert_eq!(order.transaction_ref.unwrap().as_str(), "E-T1");

    // Paid orders become eligible for the downstream delivery process.
    assert_eq!(stack.delivery.drain().await, vec![id]);
}

#[tokio::test]
async fn test_scenario_b_duplicate_delivery_is_noop() {
    let stack = stack();
    seed_coupon(&stack, "WELCOME10").await;
    let id = submit_order(&stack, dec!(4.00), Some("WELCOME10")).await;
    let issued = stack
        .issuer
        .issue(id, dec!(4.00), PaymentMethod::Pix, "note", Some(dec!(1.00)))
        .await
        .unwrap();

    let first = stack
        .confirmations
        .handle(completed(&issued.charge_ref, "E-T1"))
        .await
        .unwrap();
    let second = stack
        .confirmations
        .handle(completed(&issued.charge_ref, "E-T1"))
        .await
        .unwrap();

    assert_eq!(first, Disposition::Applied);
    assert_eq!(second, Disposition::Duplicate);

    // Exactly one paidAt write, one coupon increment, one analytics event.
    let order = stack.orders.get(id).await.unwrap().unwrap();
    let coupon = stack.coupons.get("WELCOME10").await.unwrap().unwrap();
    assert_eq!(coupon.used_count, 1);
    assert!(coupon.redeemed_orders.contains(&order.id));
    let events = stack.analytics.events.lock().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].transaction_ref.as_str(), "E-T1");
    assert_eq!(events[0].coupon_ref.as_deref(), Some("WELCOME10"));
}

#[tokio::test]
async fn test_scenario_c_late_webhook_for_stale_charge_is_rejected() {
    let stack = stack();
    let id = submit_order(&stack, dec!(5.00), None).await;

    let stale = stack
        .issuer
        .issue(id, dec!(5.00), PaymentMethod::Pix, "note", None)
        .await
        .unwrap();
    let fresh = stack
        .issuer
        .issue(id, dec!(4.00), PaymentMethod::Pix, "note", Some(dec!(1.00)))
        .await
        .unwrap();

    // The PSP reports completion of the invalidated instrument.
    let disposition = stack
        .confirmations
        .handle(completed(&stale.charge_ref, "E-LATE"))
        .await
        .unwrap();
    assert_eq!(disposition, Disposition::UnknownCharge);

    let order = stack.orders.get(id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::PendingPayment);
    assert!(order.paid_at.is_none());

    // The current instrument still confirms normally.
    let disposition = stack
        .confirmations
        .handle(completed(&fresh.charge_ref, "E-T2"))
        .await
        .unwrap();
    assert_eq!(disposition, Disposition::Applied);
    let order = stack.orders.get(id).await.unwrap().unwrap();
    assert_eq!(order.amount.value(), dec!(4.00));
    assert_eq!(order.transaction_ref.unwrap().as_str(), "E-T2");
}

#[tokio::test]
async fn test_conflicting_confirmation_never_mutates() {
    let stack = stack();
    let id = submit_order(&stack, dec!(5.00), None).await;
    let issued = stack
        .issuer
        .issue(id, dec!(5.00), PaymentMethod::Pix, "note", None)
        .await
        .unwrap();

    stack
        .confirmations
        .handle(completed(&issued.charge_ref, "E-T1"))
        .await
        .unwrap();
    let before = stack.orders.get(id).await.unwrap().unwrap();

    let err = stack
        .confirmations
        .handle(completed(&issued.charge_ref, "E-OTHER"))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::ConflictingConfirmation { .. }));

    let after = stack.orders.get(id).await.unwrap().unwrap();
    assert_eq!(after.paid_at, before.paid_at);
    assert_eq!(after.transaction_ref, before.transaction_ref);
}

#[tokio::test]
async fn test_failure_notification_is_guarded() {
    let stack = stack();
    let id = submit_order(&stack, dec!(5.00), None).await;
    let issued = stack
        .issuer
        .issue(id, dec!(5.00), PaymentMethod::Card, "note", None)
        .await
        .unwrap();

    let failed = PaymentNotification::ChargeFailed {
        charge_ref: issued.charge_ref.clone(),
    };
    assert_eq!(
        stack.confirmations.handle(failed.clone()).await.unwrap(),
        Disposition::FailureRecorded
    );
    assert_eq!(
        stack.orders.get(id).await.unwrap().unwrap().status,
        OrderStatus::Failed
    );

    // Replayed failure: nothing left to record.
    assert_eq!(
        stack.confirmations.handle(failed).await.unwrap(),
        Disposition::Ignored
    );

    // A completion after the terminal failure needs an operator, not a write.
    assert_eq!(
        stack
            .confirmations
            .handle(completed(&issued.charge_ref, "E-T1"))
            .await
            .unwrap(),
        Disposition::Unconfirmable
    );
    let order = stack.orders.get(id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Failed);
    assert!(order.paid_at.is_none());
}

#[tokio::test]
async fn test_failure_after_payment_is_ignored() {
    let stack = stack();
    let id = submit_order(&stack, dec!(5.00), None).await;
    let issued = stack
        .issuer
        .issue(id, dec!(5.00), PaymentMethod::Card, "note", None)
        .await
        .unwrap();

    stack
        .confirmations
        .handle(completed(&issued.charge_ref, "E-T1"))
        .await
        .unwrap();
    let disposition = stack
        .confirmations
        .handle(PaymentNotification::ChargeFailed {
            charge_ref: issued.charge_ref.clone(),
        })
        .await
        .unwrap();
    assert_eq!(disposition, Disposition::Ignored);
    assert_eq!(
        stack.orders.get(id).await.unwrap().unwrap().status,
        OrderStatus::Paid
    );
}

#[tokio::test]
async fn test_unknown_charge_is_acknowledged() {
    let stack = stack();
    let disposition = stack
        .confirmations
        .handle(completed(&ChargeRef::new("never-issued"), "E-T1"))
        .await
        .unwrap();
    assert_eq!(disposition, Disposition::UnknownCharge);
}

#[tokio::test]
async fn test_unhandled_event_is_ignored() {
    let stack = stack();
    let disposition = stack
        .confirmations
        .handle(PaymentNotification::Ignored {
            event: "charge.refunded".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(disposition, Disposition::Ignored);
}

#[tokio::test]
async fn test_expired_order_rejects_late_completion() {
    let stack = stack();
    let id = submit_order(&stack, dec!(5.00), None).await;
    let issued = stack
        .issuer
        .issue(id, dec!(5.00), PaymentMethod::Pix, "note", None)
        .await
        .unwrap();

    // Server-side sweep, as if 16 minutes had passed.
    let late = Utc::now() + chrono::Duration::minutes(16);
    assert_eq!(stack.orders.expire_overdue(late).await.unwrap(), vec![id]);

    let disposition = stack
        .confirmations
        .handle(completed(&issued.charge_ref, "E-T1"))
        .await
        .unwrap();
    assert_eq!(disposition, Disposition::Unconfirmable);

    let order = stack.orders.get(id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Expired);
    assert!(order.paid_at.is_none());
    assert!(stack.delivery.drain().await.is_empty());
}
