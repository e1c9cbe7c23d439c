use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

use confirma::application::confirmation::ConfirmationEngine;
use confirma::application::dispatcher::SideEffectDispatcher;
use confirma::application::issuer::ChargeIssuer;
use confirma::domain::coupon::Coupon;
use confirma::domain::order::{Amount, ChargeRef, Order, OrderId, PaymentMethod, TransactionRef};
use confirma::domain::ports::{
    AnalyticsSink, ChargeProvider, ChargeProviderArc, CouponStore, OrderStoreArc,
};
use confirma::domain::psp::{
    ChargeRequest, PaymentNotification, Presentation, PspCharge, PurchaseEvent,
};
use confirma::error::{PaymentError, Result};
use confirma::infrastructure::in_memory::{
    InMemoryCouponStore, InMemoryDeliveryQueue, InMemoryOrderStore,
};

/// Scripted PSP double: hands out sequential charge refs, counts calls and
/// can be toggled into an outage. Webhook bodies use a flat json shape:
/// `{"event": "completed", "chargeRef": "...", "transactionRef": "..."}`.
pub struct ScriptedProvider {
    method: PaymentMethod,
    counter: AtomicUsize,
    unavailable: AtomicBool,
}

impl ScriptedProvider {
    pub fn new(method: PaymentMethod) -> Arc<Self> {
        Arc::new(Self {
            method,
            counter: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
        })
    }

    pub fn set_unavailable(&self, on: bool) {
        self.unavailable.store(on, Ordering::SeqCst);
    }

    pub fn charges_created(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScriptedEvent {
    event: String,
    charge_ref: Option<String>,
    transaction_ref: Option<String>,
}

#[async_trait]
impl ChargeProvider for ScriptedProvider {
    fn method(&self) -> PaymentMethod {
        self.method
    }

    async fn create_charge(&self, _req: &ChargeRequest) -> Result<PspCharge> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PaymentError::ProviderUnavailable("scripted outage".into()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let charge_ref = ChargeRef::new(format!("{}-chg-{n}", self.method));
        let presentation = match self.method {
            PaymentMethod::Pix => Presentation::Pix {
                copy_paste_code: format!("00020126{n:04}"),
                qr_code_url: format!("https://psp.test/qr/{n}"),
            },
            PaymentMethod::Card => Presentation::CardCheckout {
                checkout_url: format!("https://psp.test/checkout/{n}"),
            },
        };
        Ok(PspCharge {
            charge_ref,
            presentation,
        })
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<Vec<PaymentNotification>> {
        let event: ScriptedEvent = serde_json::from_slice(body)
            .map_err(|err| PaymentError::MalformedPayload(err.to_string()))?;
        let charge_ref = |field: Option<String>| {
            field
                .map(ChargeRef::new)
                .ok_or_else(|| PaymentError::MalformedPayload("missing chargeRef".into()))
        };
        let notification = match event.event.as_str() {
            "completed" => PaymentNotification::ChargeCompleted {
                charge_ref: charge_ref(event.charge_ref)?,
                transaction_ref: event
                    .transaction_ref
                    .map(TransactionRef::new)
                    .ok_or_else(|| {
                        PaymentError::MalformedPayload("missing transactionRef".into())
                    })?,
            },
            "failed" => PaymentNotification::ChargeFailed {
                charge_ref: charge_ref(event.charge_ref)?,
            },
            other => PaymentNotification::Ignored {
                event: other.to_string(),
            },
        };
        Ok(vec![notification])
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<PurchaseEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl AnalyticsSink for RecordingSink {
    async fn record_purchase(&self, event: PurchaseEvent) -> Result<()> {
        self.events.lock().await.push(event);
        Ok(())
    }
}

/// The full engine wired over in-memory adapters and scripted providers.
pub struct TestStack {
    pub orders: Arc<InMemoryOrderStore>,
    pub coupons: Arc<InMemoryCouponStore>,
    pub delivery: Arc<InMemoryDeliveryQueue>,
    pub analytics: Arc<RecordingSink>,
    pub pix: Arc<ScriptedProvider>,
    pub card: Arc<ScriptedProvider>,
    pub issuer: Arc<ChargeIssuer>,
    pub confirmations: Arc<ConfirmationEngine>,
}

pub fn stack() -> TestStack {
    let orders = Arc::new(InMemoryOrderStore::new());
    let coupons = Arc::new(InMemoryCouponStore::new());
    let delivery = Arc::new(InMemoryDeliveryQueue::new());
    let analytics = RecordingSink::new();
    let pix = ScriptedProvider::new(PaymentMethod::Pix);
    let card = ScriptedProvider::new(PaymentMethod::Card);

    let orders_port: OrderStoreArc = orders.clone();
    let providers: Vec<ChargeProviderArc> = vec![pix.clone(), card.clone()];

    let dispatcher =
        SideEffectDispatcher::new(coupons.clone(), analytics.clone(), delivery.clone());
    let confirmations = Arc::new(ConfirmationEngine::new(orders_port.clone(), dispatcher));
    let issuer = Arc::new(ChargeIssuer::new(
        orders_port,
        providers,
        Duration::minutes(15),
    ));

    TestStack {
        orders,
        coupons,
        delivery,
        analytics,
        pix,
        card,
        issuer,
        confirmations,
    }
}

pub async fn submit_order(stack: &TestStack, amount: Decimal, coupon: Option<&str>) -> OrderId {
    use confirma::domain::ports::OrderStore;
    let order = Order::new(
        Amount::new(amount).unwrap(),
        "anonymous note",
        coupon.map(String::from),
        Utc::now(),
    );
    let id = order.id;
    stack.orders.insert(order).await.unwrap();
    id
}

pub async fn seed_coupon(stack: &TestStack, code: &str) {
    stack
        .coupons
        .upsert(Coupon::new(code, None, None, Utc::now()))
        .await
        .unwrap();
}

pub fn completed(charge_ref: &ChargeRef, transaction_ref: &str) -> PaymentNotification {
    PaymentNotification::ChargeCompleted {
        charge_ref: charge_ref.clone(),
        transaction_ref: TransactionRef::new(transaction_ref),
    }
}
