//! One-shot loaders for views that show a single resource.

use shared::{
    domain::CustomerId,
    protocol::{CustomerRecord, CustomerSummary, Envelope},
};
use tracing::warn;

use crate::{
    customer_client::CustomerApi,
    error::{ClientError, ClientResult},
};

pub const LIST_FAILED_MESSAGE: &str = "Failed to fetch customers";
pub const SUMMARY_FAILED_MESSAGE: &str = "Failed to fetch customer summary";
pub const CUSTOMER_NOT_FOUND_MESSAGE: &str = "Customer not found";

/// Unwraps a successful envelope. A `success: false` envelope, or one with
/// no data, becomes [`ClientError::Rejected`] carrying the server message or
/// `fallback` when that message is blank.
pub fn require_data<T>(envelope: Envelope<T>, fallback: &str) -> ClientResult<T> {
    let message = envelope.message.clone();
    envelope.into_data().ok_or_else(|| ClientError::Rejected {
        message: if message.trim().is_empty() {
            fallback.to_string()
        } else {
            message
        },
    })
}

pub async fn fetch_summary<A>(api: &A) -> ClientResult<CustomerSummary>
where
    A: CustomerApi + ?Sized,
{
    let result = api
        .summary()
        .await
        .and_then(|envelope| require_data(envelope, SUMMARY_FAILED_MESSAGE));
    if let Err(err) = &result {
        warn!(error = %err, "summary fetch failed");
    }
    result
}

/// Loads one customer. A blank id issues no request and yields `None`.
pub async fn fetch_customer<A>(api: &A, id: &CustomerId) -> ClientResult<Option<CustomerRecord>>
where
    A: CustomerApi + ?Sized,
{
    if id.as_str().trim().is_empty() {
        return Ok(None);
    }
    let envelope = api.get(id).await?;
    require_data(envelope, CUSTOMER_NOT_FOUND_MESSAGE).map(Some)
}

#[cfg(test)]
#[path = "tests/loaders_tests.rs"]
mod tests;
