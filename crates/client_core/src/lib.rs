pub mod credentials;
pub mod customer_client;
pub mod error;
pub mod import;
pub mod loaders;
pub mod query;
pub mod transport;
pub mod validation;

pub use credentials::{CredentialProvider, NoCredentials, StaticToken, TokenStore};
pub use customer_client::{CustomerApi, CustomerClient, ImportUpload};
pub use error::{ClientError, ClientResult};
pub use import::{ImportOrchestrator, ImportPhase, TrackedImport};
pub use loaders::{fetch_customer, fetch_summary};
pub use query::{clamp_page, FetchOutcome, ListView, QueryController, QueryEvent, QueryState};
pub use transport::{HttpTransport, TransportConfig};
pub use validation::CustomerForm;

/// Shown when a failure carries no usable message of its own.
pub const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error occurred";

/// Message to display for a failed operation, falling back to `fallback`
/// when the error text is blank.
pub fn display_message(err: &ClientError, fallback: &str) -> String {
    let message = err.to_string();
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
