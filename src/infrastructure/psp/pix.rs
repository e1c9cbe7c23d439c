use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{http_client, transport_error};
use crate::domain::order::{ChargeRef, PaymentMethod, TransactionRef};
use crate::domain::ports::ChargeProvider;
use crate::domain::psp::{ChargeRequest, PaymentNotification, Presentation, PspCharge};
use crate::error::{PaymentError, Result};

/// PIX instant-transfer provider.
///
/// Charges are immediate `cob` objects; the merchant-generated `txid` is the
/// charge reference and the correlation identifier persisted at issue time.
/// Webhook deliveries carry a `pix` array whose `endToEndId` is the globally
/// unique transaction reference.
pub struct PixProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl PixProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    /// txid: 32 alphanumeric chars, fresh per issuance so a re-issued charge
    /// never collides with the stale one.
    fn new_txid() -> String {
        Uuid::new_v4().simple().to_string()
    }
}

#[derive(Deserialize)]
struct PixChargeResponse {
    txid: String,
    #[serde(rename = "pixCopiaECola")]
    copy_paste_code: String,
    location: String,
}

#[derive(Deserialize)]
struct PixWebhookBody {
    #[serde(default)]
    pix: Vec<PixWebhookItem>,
}

#[derive(Deserialize)]
struct PixWebhookItem {
    txid: String,
    #[serde(rename = "endToEndId")]
    end_to_end_id: String,
}

#[async_trait]
impl ChargeProvider for PixProvider {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Pix
    }

    async fn create_charge(&self, req: &ChargeRequest) -> Result<PspCharge> {
        let txid = Self::new_txid();
        let url = format!("{}/v2/cob/{}", self.base_url, txid);
        let body = json!({
            "calendario": { "expiracao": 900 },
            "valor": { "original": format!("{:.2}", req.amount.value()) },
            "solicitacaoPagador": req.description,
            "infoAdicionais": [
                { "nome": "pedido", "valor": req.order_id.to_string() }
            ],
        });

        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(PaymentError::ProviderUnavailable(format!(
                "pix psp answered {status}"
            )));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PaymentError::ProviderRejected(format!(
                "pix psp answered {status}: {detail}"
            )));
        }

        let created: PixChargeResponse = response
            .json()
            .await
            .map_err(|err| PaymentError::ProviderUnavailable(err.to_string()))?;

        Ok(PspCharge {
            charge_ref: ChargeRef::new(created.txid),
            presentation: Presentation::Pix {
                copy_paste_code: created.copy_paste_code,
                qr_code_url: created.location,
            },
        })
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<Vec<PaymentNotification>> {
        let parsed: PixWebhookBody = serde_json::from_slice(body)
            .map_err(|err| PaymentError::MalformedPayload(err.to_string()))?;

        if parsed.pix.is_empty() {
            // Parsed fine but carries no payment (e.g. a registration ping).
            return Ok(vec![PaymentNotification::Ignored {
                event: "pix.empty".to_string(),
            }]);
        }

        Ok(parsed
            .pix
            .into_iter()
            .map(|item| PaymentNotification::ChargeCompleted {
                charge_ref: ChargeRef::new(item.txid),
                transaction_ref: TransactionRef::new(item.end_to_end_id),
            })
            .collect())
    }
}
