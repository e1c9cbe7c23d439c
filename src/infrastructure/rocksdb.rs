use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamilyDescriptor, DB, IteratorMode, Options};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::coupon::Coupon;
use crate::domain::order::{
    ChargeBinding, ChargeRef, ConfirmOutcome, Order, OrderId, OrderStatus, TransactionRef,
};
use crate::domain::ports::{CouponStore, OrderStore};
use crate::error::{PaymentError, Result};

/// Column Family for order records.
pub const CF_ORDERS: &str = "orders";
/// Column Family for coupons.
pub const CF_COUPONS: &str = "coupons";
/// Column Family mapping chargeRef -> orderId.
pub const CF_CHARGE_INDEX: &str = "charge_index";

/// Persistent store over RocksDB.
///
/// Orders and coupons are serde_json values in separate column families,
/// with a charge index for webhook correlation. A store-level write mutex
/// serializes every read-modify-write, so the conditional transitions keep
/// their compare-and-swap semantics.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = vec![
            ColumnFamilyDescriptor::new(CF_ORDERS, Options::default()),
            ColumnFamilyDescriptor::new(CF_COUPONS, Options::default()),
            ColumnFamilyDescriptor::new(CF_CHARGE_INDEX, Options::default()),
        ];
        let db = DB::open_cf_descriptors(&opts, path, cfs)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PaymentError::Storage(format!("column family {name} not found")))
    }

    fn read_order(&self, id: OrderId) -> Result<Option<Order>> {
        let cf = self.cf(CF_ORDERS)?;
        match self.db.get_cf(cf, id.to_string())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_order(&self, order: &Order) -> Result<()> {
        let cf = self.cf(CF_ORDERS)?;
        self.db
            .put_cf(cf, order.id.to_string(), serde_json::to_vec(order)?)?;
        Ok(())
    }

    fn read_order_by_charge(&self, charge_ref: &ChargeRef) -> Result<Option<Order>> {
        let index = self.cf(CF_CHARGE_INDEX)?;
        let Some(id_bytes) = self.db.get_cf(index, charge_ref.as_str())? else {
            return Ok(None);
        };
        let id = String::from_utf8_lossy(&id_bytes)
            .parse::<OrderId>()
            .map_err(|err| PaymentError::Storage(format!("corrupt charge index: {err}")))?;
        self.read_order(id)
    }
}

#[async_trait]
impl OrderStore for RocksDbStore {
    async fn insert(&self, order: Order) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if let Some(binding) = &order.charge {
            let index = self.cf(CF_CHARGE_INDEX)?;
            self.db
                .put_cf(index, binding.charge_ref.as_str(), order.id.to_string())?;
        }
        self.write_order(&order)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        self.read_order(id)
    }

    async fn find_by_charge(&self, charge_ref: &ChargeRef) -> Result<Option<Order>> {
        self.read_order_by_charge(charge_ref)
    }

    async fn bind_charge(&self, id: OrderId, binding: ChargeBinding) -> Result<Order> {
        let _guard = self.write_lock.lock().await;
        let mut order = self
            .read_order(id)?
            .ok_or(PaymentError::OrderNotFound(id.as_uuid()))?;
        if order.status.is_terminal() || order.paid_at.is_some() {
            return Err(PaymentError::IllegalTransition {
                order_id: id.as_uuid(),
                status: order.status.to_string(),
            });
        }

        let index = self.cf(CF_CHARGE_INDEX)?;
        if let Some(old) = &order.charge {
            self.db.delete_cf(index, old.charge_ref.as_str())?;
        }
        self.db
            .put_cf(index, binding.charge_ref.as_str(), id.to_string())?;

        order.amount = binding.amount;
        order.status = OrderStatus::PendingPayment;
        order.charge = Some(binding);
        self.write_order(&order)?;
        Ok(order)
    }

    async fn confirm_payment(
        &self,
        charge_ref: &ChargeRef,
        transaction_ref: &TransactionRef,
        now: DateTime<Utc>,
    ) -> Result<Option<(Order, ConfirmOutcome)>> {
        let _guard = self.write_lock.lock().await;
        let Some(mut order) = self.read_order_by_charge(charge_ref)? else {
            return Ok(None);
        };
        let outcome = order.apply_confirmation(transaction_ref, now);
        if outcome == ConfirmOutcome::Applied {
            self.write_order(&order)?;
        }
        Ok(Some((order, outcome)))
    }

    async fn mark_failed(&self, charge_ref: &ChargeRef) -> Result<Option<bool>> {
        let _guard = self.write_lock.lock().await;
        let Some(mut order) = self.read_order_by_charge(charge_ref)? else {
            return Ok(None);
        };
        let applied = order.apply_failure();
        if applied {
            self.write_order(&order)?;
        }
        Ok(Some(applied))
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<OrderId>> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_ORDERS)?;
        let mut expired = Vec::new();
        for entry in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = entry?;
            let mut order: Order = serde_json::from_slice(&value)?;
            if order.expire_if_overdue(now) {
                self.write_order(&order)?;
                expired.push(order.id);
            }
        }
        Ok(expired)
    }
}

#[async_trait]
impl CouponStore for RocksDbStore {
    async fn upsert(&self, coupon: Coupon) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_COUPONS)?;
        self.db
            .put_cf(cf, coupon.code.as_bytes(), serde_json::to_vec(&coupon)?)?;
        Ok(())
    }

    async fn get(&self, code: &str) -> Result<Option<Coupon>> {
        let cf = self.cf(CF_COUPONS)?;
        match self.db.get_cf(cf, code.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn redeem(&self, code: &str, order_id: OrderId) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_COUPONS)?;
        let bytes = self
            .db
            .get_cf(cf, code.as_bytes())?
            .ok_or_else(|| PaymentError::CouponNotFound(code.to_string()))?;
        let mut coupon: Coupon = serde_json::from_slice(&bytes)?;
        let newly = coupon.redeem(order_id);
        if newly {
            self.db
                .put_cf(cf, code.as_bytes(), serde_json::to_vec(&coupon)?)?;
        }
        Ok(newly)
    }
}
