use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use shared::{
    domain::{CustomerId, ImportId},
    protocol::{
        CreateCustomerRequest, CustomerListing, CustomerRecord, CustomerSummary, Envelope,
        ImportHandle, ImportJobSnapshot, ImportOptions, ListRequest, UpdateCustomerRequest,
    },
};
use tracing::{debug, info};
use urlencoding::encode;

use crate::{
    error::{ClientError, ClientResult},
    transport::HttpTransport,
    validation::{validate_create, validate_update},
};

const CUSTOMERS_PATH: &str = "customers";
const CSV_FIELD: &str = "csvFile";
const CSV_MIME: &str = "text/csv";

/// A CSV file staged for import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ImportUpload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|err| {
            ClientError::client(format!("failed to read '{}': {err}", path.display()))
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "import.csv".to_string());
        Ok(Self { file_name, bytes })
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Customer endpoints. Every call yields the server's envelope as-is; a
/// `success: false` envelope is not an `Err` at this layer.
#[async_trait]
pub trait CustomerApi: Send + Sync {
    async fn list(&self, request: &ListRequest) -> ClientResult<Envelope<CustomerListing>>;
    async fn get(&self, id: &CustomerId) -> ClientResult<Envelope<CustomerRecord>>;
    async fn create(
        &self,
        request: &CreateCustomerRequest,
    ) -> ClientResult<Envelope<CustomerRecord>>;
    async fn update(
        &self,
        id: &CustomerId,
        request: &UpdateCustomerRequest,
    ) -> ClientResult<Envelope<CustomerRecord>>;
    async fn delete(&self, id: &CustomerId) -> ClientResult<Envelope<CustomerRecord>>;
    async fn summary(&self) -> ClientResult<Envelope<CustomerSummary>>;
    async fn import_csv(
        &self,
        upload: ImportUpload,
        options: &ImportOptions,
    ) -> ClientResult<Envelope<ImportHandle>>;
    async fn import_status(&self, id: &ImportId) -> ClientResult<Envelope<ImportJobSnapshot>>;
    async fn cancel_import(&self, id: &ImportId) -> ClientResult<Envelope<serde_json::Value>>;
    async fn active_imports(&self) -> ClientResult<Envelope<Vec<ImportJobSnapshot>>>;
}

pub struct CustomerClient {
    transport: HttpTransport,
}

impl CustomerClient {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }
}

fn customer_path(id: &CustomerId) -> String {
    format!("{CUSTOMERS_PATH}/{}", encode(id.as_str()))
}

fn import_path(action: &str, id: &ImportId) -> String {
    format!("{CUSTOMERS_PATH}/import/{action}/{}", encode(id.as_str()))
}

#[async_trait]
impl CustomerApi for CustomerClient {
    async fn list(&self, request: &ListRequest) -> ClientResult<Envelope<CustomerListing>> {
        debug!(
            page = request.page,
            size = request.size,
            filters = request.filters.len(),
            "listing customers"
        );
        self.transport
            .get(CUSTOMERS_PATH, &request.query_pairs())
            .await
    }

    async fn get(&self, id: &CustomerId) -> ClientResult<Envelope<CustomerRecord>> {
        self.transport.get(&customer_path(id), &[]).await
    }

    async fn create(
        &self,
        request: &CreateCustomerRequest,
    ) -> ClientResult<Envelope<CustomerRecord>> {
        validate_create(request)?;
        self.transport.post(CUSTOMERS_PATH, request).await
    }

    async fn update(
        &self,
        id: &CustomerId,
        request: &UpdateCustomerRequest,
    ) -> ClientResult<Envelope<CustomerRecord>> {
        validate_update(request)?;
        self.transport.put(&customer_path(id), request).await
    }

    async fn delete(&self, id: &CustomerId) -> ClientResult<Envelope<CustomerRecord>> {
        // The server may answer with the removed record, `null`, or an ack
        // object; only a full record is surfaced.
        let envelope: Envelope<serde_json::Value> =
            self.transport.delete(&customer_path(id)).await?;
        let data = envelope
            .data
            .and_then(|value| serde_json::from_value::<CustomerRecord>(value).ok());
        Ok(Envelope {
            success: envelope.success,
            message: envelope.message,
            data,
        })
    }

    async fn summary(&self) -> ClientResult<Envelope<CustomerSummary>> {
        self.transport
            .get(&format!("{CUSTOMERS_PATH}/summary"), &[])
            .await
    }

    async fn import_csv(
        &self,
        upload: ImportUpload,
        options: &ImportOptions,
    ) -> ClientResult<Envelope<ImportHandle>> {
        let size = upload.bytes.len();
        let part = Part::bytes(upload.bytes)
            .file_name(upload.file_name.clone())
            .mime_str(CSV_MIME)
            .map_err(|err| ClientError::client(format!("invalid csv part: {err}")))?;
        let mut form = Form::new().part(CSV_FIELD, part);
        for (name, value) in options.form_fields() {
            form = form.text(name, value);
        }

        info!(file = %upload.file_name, bytes = size, "submitting csv import");
        self.transport
            .upload(&format!("{CUSTOMERS_PATH}/import/csv"), form)
            .await
    }

    async fn import_status(&self, id: &ImportId) -> ClientResult<Envelope<ImportJobSnapshot>> {
        self.transport
            .get(&import_path("status", id), &[])
            .await
    }

    async fn cancel_import(&self, id: &ImportId) -> ClientResult<Envelope<serde_json::Value>> {
        self.transport
            .post_empty(&import_path("cancel", id))
            .await
    }

    async fn active_imports(&self) -> ClientResult<Envelope<Vec<ImportJobSnapshot>>> {
        self.transport
            .get(&format!("{CUSTOMERS_PATH}/import/active"), &[])
            .await
    }
}

#[cfg(test)]
#[path = "tests/customer_client_tests.rs"]
mod tests;
