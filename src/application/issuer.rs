use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::info;

use crate::domain::order::{
    Amount, ChargeBinding, ChargeRef, OrderId, OrderStatus, PaymentMethod,
};
use crate::domain::ports::{ChargeProvider, ChargeProviderArc, OrderStore, OrderStoreArc};
use crate::domain::psp::{ChargeRequest, Presentation};
use crate::error::{PaymentError, Result};

/// Charges are valid for 15 minutes from issuance.
pub const DEFAULT_CHARGE_WINDOW_MINUTES: i64 = 15;

/// What the client needs to present a charge for payment.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedCharge {
    pub charge_ref: ChargeRef,
    pub presentation: Presentation,
    pub expires_at: DateTime<Utc>,
}

impl IssuedCharge {
    fn from_binding(binding: &ChargeBinding) -> Self {
        Self {
            charge_ref: binding.charge_ref.clone(),
            presentation: binding.presentation.clone(),
            expires_at: binding.expires_at,
        }
    }
}

/// Creates PSP charges bound to an order and a fixed amount.
///
/// Safe to call repeatedly for the same `(order, amount, method)`: a live
/// binding is returned unchanged instead of creating a duplicate PSP charge.
/// A changed amount or provider discards the old binding and issues fresh.
pub struct ChargeIssuer {
    orders: OrderStoreArc,
    providers: HashMap<PaymentMethod, ChargeProviderArc>,
    charge_window: Duration,
}

impl ChargeIssuer {
    pub fn new(
        orders: OrderStoreArc,
        providers: impl IntoIterator<Item = ChargeProviderArc>,
        charge_window: Duration,
    ) -> Self {
        let providers = providers
            .into_iter()
            .map(|p| (p.method(), p))
            .collect();
        Self {
            orders,
            providers,
            charge_window,
        }
    }

    pub async fn issue(
        &self,
        order_id: OrderId,
        amount: Decimal,
        method: PaymentMethod,
        description: &str,
        discount: Option<Decimal>,
    ) -> Result<IssuedCharge> {
        let amount = Amount::new(amount)?;
        let discount = discount.map(Amount::new).transpose()?;

        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or(PaymentError::OrderNotFound(order_id.as_uuid()))?;

        match order.status {
            OrderStatus::Draft | OrderStatus::PendingPayment => {}
            status => {
                return Err(PaymentError::IllegalTransition {
                    order_id: order_id.as_uuid(),
                    status: status.to_string(),
                });
            }
        }

        let now = Utc::now();
        if let Some(live) = order.live_binding(amount, method, now) {
            return Ok(IssuedCharge::from_binding(live));
        }

        if let Some(stale) = order.charge_ref() {
            // Fixed-amount instrument no longer matches; it is discarded,
            // never reused.
            info!(%order_id, charge_ref = %stale, "discarding stale charge binding");
        }

        let provider = self.providers.get(&method).ok_or_else(|| {
            PaymentError::ProviderUnavailable(format!("no provider configured for {method}"))
        })?;

        let request = ChargeRequest {
            order_id,
            amount,
            description: description.to_string(),
        };
        let psp_charge = provider.create_charge(&request).await?;

        let binding = ChargeBinding {
            charge_ref: psp_charge.charge_ref,
            method,
            amount,
            discount,
            presentation: psp_charge.presentation,
            issued_at: now,
            expires_at: now + self.charge_window,
        };
        let issued = IssuedCharge::from_binding(&binding);
        self.orders.bind_charge(order_id, binding).await?;

        info!(
            %order_id,
            charge_ref = %issued.charge_ref,
            %method,
            amount = %amount,
            expires_at = %issued.expires_at,
            "charge issued"
        );
        Ok(issued)
    }
}
