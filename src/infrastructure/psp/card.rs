use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::json;

use super::{http_client, transport_error};
use crate::domain::order::{ChargeRef, PaymentMethod, TransactionRef};
use crate::domain::ports::ChargeProvider;
use crate::domain::psp::{ChargeRequest, PaymentNotification, Presentation, PspCharge};
use crate::error::{PaymentError, Result};

/// Hosted card checkout provider.
///
/// A charge is a checkout session; the session id is the charge reference
/// and the client is redirected to the PSP-hosted payment page. Webhooks
/// are typed events; only session completion and async payment failure are
/// acted on.
pub struct CardProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CardProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }
}

#[derive(Deserialize)]
struct CheckoutSessionResponse {
    id: String,
    url: String,
}

#[derive(Deserialize)]
struct CardEvent {
    #[serde(rename = "type")]
    kind: String,
    data: CardEventData,
}

#[derive(Deserialize)]
struct CardEventData {
    object: CardEventObject,
}

#[derive(Deserialize)]
struct CardEventObject {
    id: String,
    payment_intent: Option<String>,
}

#[async_trait]
impl ChargeProvider for CardProvider {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Card
    }

    async fn create_charge(&self, req: &ChargeRequest) -> Result<PspCharge> {
        let cents = (req.amount.value() * Decimal::from(100))
            .trunc()
            .to_i64()
            .ok_or_else(|| {
                PaymentError::InvalidAmount(format!("{} out of range", req.amount))
            })?;

        let url = format!("{}/v1/checkout/sessions", self.base_url);
        let body = json!({
            "amount_total": cents,
            "currency": "brl",
            "description": req.description,
            "metadata": { "order_id": req.order_id.to_string() },
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(PaymentError::ProviderUnavailable(format!(
                "card psp answered {status}"
            )));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PaymentError::ProviderRejected(format!(
                "card psp answered {status}: {detail}"
            )));
        }

        let session: CheckoutSessionResponse = response
            .json()
            .await
            .map_err(|err| PaymentError::ProviderUnavailable(err.to_string()))?;

        Ok(PspCharge {
            charge_ref: ChargeRef::new(session.id),
            presentation: Presentation::CardCheckout {
                checkout_url: session.url,
            },
        })
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<Vec<PaymentNotification>> {
        let event: CardEvent = serde_json::from_slice(body)
            .map_err(|err| PaymentError::MalformedPayload(err.to_string()))?;

        let notification = match event.kind.as_str() {
            "checkout.session.completed" => {
                let transaction_ref = event.data.object.payment_intent.ok_or_else(|| {
                    PaymentError::MalformedPayload(
                        "completed session without payment_intent".to_string(),
                    )
                })?;
                PaymentNotification::ChargeCompleted {
                    charge_ref: ChargeRef::new(event.data.object.id),
                    transaction_ref: TransactionRef::new(transaction_ref),
                }
            }
            "checkout.session.async_payment_failed" => PaymentNotification::ChargeFailed {
                charge_ref: ChargeRef::new(event.data.object.id),
            },
            other => PaymentNotification::Ignored {
                event: other.to_string(),
            },
        };
        Ok(vec![notification])
    }
}
