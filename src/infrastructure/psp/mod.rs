pub mod card;
pub mod pix;

use std::time::Duration;

use crate::error::PaymentError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// PSP round-trips never hang the engine: bounded connect and total
/// timeouts on every provider client.
pub(crate) fn http_client() -> Result<reqwest::Client, PaymentError> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|err| PaymentError::ProviderUnavailable(err.to_string()))
}

pub(crate) fn transport_error(err: reqwest::Error) -> PaymentError {
    PaymentError::ProviderUnavailable(err.to_string())
}
