use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use reqwest::{multipart::Form, Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::{
    credentials::CredentialProvider,
    error::{ClientError, ClientResult},
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Uploads may block on server-side processing of the whole file.
pub const DEFAULT_IMPORT_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub import_timeout: Duration,
}

impl TransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_import_timeout(mut self, timeout: Duration) -> Self {
        self.import_timeout = timeout;
        self
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            import_timeout: DEFAULT_IMPORT_TIMEOUT,
        }
    }
}

/// Authenticated JSON-over-HTTP client rooted at `<base_url>/api`.
///
/// Every failure comes back as a classified [`ClientError`]; nothing is
/// retried.
#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
    api_base: String,
    import_timeout: Duration,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpTransport {
    pub fn new(
        config: TransportConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> ClientResult<Self> {
        let base = Url::parse(config.base_url.trim()).map_err(|err| {
            ClientError::client(format!("invalid base url '{}': {err}", config.base_url))
        })?;
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| ClientError::client(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            api_base: format!("{}/api", base.as_str().trim_end_matches('/')),
            import_timeout: config.import_timeout,
            credentials,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    fn prepare(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match self.credentials.bearer_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        query: &[(String, String)],
    ) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut builder = self.prepare(method.clone(), path);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.execute(method, path, builder).await
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> ClientResult<T> {
        self.request::<T, ()>(Method::GET, path, None, query).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::POST, path, Some(body), &[]).await
    }

    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.request::<T, ()>(Method::POST, path, None, &[]).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::PUT, path, Some(body), &[]).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.request::<T, ()>(Method::DELETE, path, None, &[]).await
    }

    /// Multipart POST using the extended import timeout.
    pub async fn upload<T: DeserializeOwned>(&self, path: &str, form: Form) -> ClientResult<T> {
        let builder = self
            .prepare(Method::POST, path)
            .multipart(form)
            .timeout(self.import_timeout);
        self.execute(Method::POST, path, builder).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        builder: RequestBuilder,
    ) -> ClientResult<T> {
        let started = Instant::now();
        let response = builder.send().await.map_err(|err| {
            warn!(%method, path, error = %err, "request failed without a response");
            classify_send_error(err)
        })?;

        let status = response.status();
        debug!(
            %method,
            path,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "response received"
        );

        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(server_error(status.as_u16(), &body));
        }

        // A body cut short by a timeout or reset is a transport failure; only
        // bytes that arrived intact but do not decode are a client error.
        let body = response.bytes().await.map_err(|err| {
            warn!(%method, path, error = %err, "response body was not received");
            ClientError::network(err.to_string())
        })?;
        serde_json::from_slice::<T>(&body)
            .map_err(|err| ClientError::client(format!("invalid response body from {path}: {err}")))
    }
}

fn classify_send_error(err: reqwest::Error) -> ClientError {
    if err.is_builder() {
        ClientError::client(err.to_string())
    } else {
        ClientError::network(err.to_string())
    }
}

/// Prefers the server-supplied `message`, falling back to the status line.
pub(crate) fn server_error(status: u16, body: &[u8]) -> ClientError {
    let message = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("HTTP Error {status}"));
    ClientError::Server { status, message }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
