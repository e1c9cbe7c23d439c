use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, PaymentError>;

#[derive(Error, Debug)]
pub enum PaymentError {
    /// The PSP could not be reached or answered with a server error.
    /// Retryable by the caller with backoff.
    #[error("payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The PSP rejected the charge request outright. Fatal to this attempt.
    #[error("payment provider rejected the charge: {0}")]
    ProviderRejected(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A confirmation arrived for an order already paid under a different
    /// transaction. The existing state is never overwritten.
    #[error("order {order_id} already paid as {existing}, refusing confirmation {incoming}")]
    ConflictingConfirmation {
        order_id: Uuid,
        existing: String,
        incoming: String,
    },

    #[error("order {0} not found")]
    OrderNotFound(Uuid),

    /// A webhook correlation identifier matched no live charge: either it
    /// was never issued here, or a price change invalidated it (stale).
    /// Logged and acknowledged, never retried by the PSP.
    #[error("no order matches charge {0} (unknown or stale)")]
    UnknownCharge(String),

    #[error("order {order_id} is {status}, operation requires a pre-payment state")]
    IllegalTransition { order_id: Uuid, status: String },

    #[error("coupon {0} not found")]
    CouponNotFound(String),

    #[error("malformed provider payload: {0}")]
    MalformedPayload(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(String),
}

impl PaymentError {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::ProviderUnavailable(_))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for PaymentError {
    fn from(err: rocksdb::Error) -> Self {
        PaymentError::Storage(err.to_string())
    }
}
