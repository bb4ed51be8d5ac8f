//! HTTP client for the session endpoints
//!
//! Three operations share one `request` primitive that encodes parameters,
//! attaches the bearer credential, executes the call and decodes the JSON
//! body. Failures are translated into `Error::InvalidUrl` (bad base URL),
//! `Error::Transport` (no response), `Error::Server` (non-2xx) or
//! `Error::Decode` (body does not match the expected type). Nothing is retried here; the caller decides.

use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::constants::{
    API_BASE_URL, COMPLETE_PATH, FORM_CONTENT_TYPE, LIST_ACCOUNTS_PATH, SYNCHRONIZE_PATH,
};
use crate::encoder::{self, Params, Value};
use crate::error::{Error, Result};
use crate::models::{AccountList, Manifest, Session, SynchronizePayload};
use crate::secret::Secret;

/// Boxed future returned by `SessionApi` methods, keeping the trait
/// dyn-compatible (`Arc<dyn SessionApi>`).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The remote operations one flow needs.
///
/// `ApiClient` is the HTTP implementation; the paginator and the flow
/// orchestrator only see this trait.
pub trait SessionApi: Send + Sync {
    /// Create the hosted auth manifest. `return_url` is where the hosted
    /// flow sends the user when it finishes outside the web surface.
    fn synchronize<'a>(
        &'a self,
        client_secret: &'a Secret,
        return_url: &'a Url,
    ) -> BoxFuture<'a, Result<Manifest>>;

    /// Complete the session after the hosted flow redirected back. The
    /// returned account page may be partial.
    fn complete_session<'a>(&'a self, client_secret: &'a Secret) -> BoxFuture<'a, Result<Session>>;

    /// Fetch the page of accounts after `starting_after` (or the first page).
    fn list_accounts<'a>(
        &'a self,
        client_secret: &'a Secret,
        starting_after: Option<&'a str>,
    ) -> BoxFuture<'a, Result<AccountList>>;
}

/// Session API client authenticated with a publishable key.
///
/// Holds no per-flow state, so one client can serve any number of
/// sequential or independent flows.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    publishable_key: Secret,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("publishable_key", &self.publishable_key)
            .finish()
    }
}

impl ApiClient {
    /// Client against the production API.
    pub fn new(publishable_key: Secret) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: API_BASE_URL.to_string(),
            publishable_key,
        }
    }

    /// Override the API base URL (staging, tests). A trailing `/` is ignored.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Use a preconfigured `reqwest::Client` (timeouts, proxies).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST the synchronize endpoint and return its manifest.
    pub async fn synchronize(&self, client_secret: &Secret, return_url: &Url) -> Result<Manifest> {
        let mobile = encoder::params([
            ("fullscreen", Value::from(true)),
            ("app_return_url", Value::from(return_url)),
        ]);
        let params = encoder::params([
            ("client_secret", Value::from(client_secret.expose())),
            ("mobile", Value::from(mobile)),
        ]);
        let payload: SynchronizePayload = self
            .request(Method::POST, SYNCHRONIZE_PATH, &params)
            .await?;
        Ok(payload.manifest)
    }

    /// POST the complete endpoint.
    pub async fn complete_session(&self, client_secret: &Secret) -> Result<Session> {
        let params = encoder::params([("client_secret", client_secret.expose())]);
        self.request(Method::POST, COMPLETE_PATH, &params).await
    }

    /// GET one page of accounts, optionally after the given cursor.
    pub async fn list_accounts(
        &self,
        client_secret: &Secret,
        starting_after: Option<&str>,
    ) -> Result<AccountList> {
        let mut params = encoder::params([("client_secret", client_secret.expose())]);
        if let Some(cursor) = starting_after {
            params.insert("starting_after".to_string(), Value::from(cursor));
        }
        self.request(Method::GET, LIST_ACCOUNTS_PATH, &params).await
    }

    /// Shared request primitive.
    ///
    /// GET carries the parameters in the query string, everything else in a
    /// form-encoded body.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &Params,
    ) -> Result<T> {
        let started = Instant::now();
        let result = self.execute(method.clone(), path, params).await;
        record_request(path, &result, started.elapsed().as_secs_f64());

        let body = result?;
        serde_json::from_str::<T>(&body).map_err(|e| {
            warn!(endpoint = path, error = %e, "response did not match expected schema");
            Error::Decode(format!("{path}: {e}"))
        })
    }

    /// Send the request and return the raw body of a 2xx response.
    async fn execute(&self, method: Method, path: &str, params: &Params) -> Result<String> {
        let encoded = encoder::encode(params);
        let endpoint = format!("{}/{}", self.base_url, path);
        let mut url =
            Url::parse(&endpoint).map_err(|e| Error::InvalidUrl(format!("{endpoint}: {e}")))?;

        let mut builder = if method == Method::GET {
            if !encoded.is_empty() {
                url.set_query(Some(&encoded));
            }
            self.http.request(method.clone(), url)
        } else {
            self.http
                .request(method.clone(), url)
                .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
                .body(encoded)
        };
        builder = builder.header(AUTHORIZATION, self.publishable_key.bearer());

        debug!(endpoint = path, %method, "sending session API request");

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Transport(format!("{path}: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("{path}: reading body: {e}")))?;

        debug!(endpoint = path, status = status.as_u16(), bytes = body.len(), "session API response");

        if !status.is_success() {
            return Err(Error::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

impl SessionApi for ApiClient {
    fn synchronize<'a>(
        &'a self,
        client_secret: &'a Secret,
        return_url: &'a Url,
    ) -> BoxFuture<'a, Result<Manifest>> {
        Box::pin(ApiClient::synchronize(self, client_secret, return_url))
    }

    fn complete_session<'a>(&'a self, client_secret: &'a Secret) -> BoxFuture<'a, Result<Session>> {
        Box::pin(ApiClient::complete_session(self, client_secret))
    }

    fn list_accounts<'a>(
        &'a self,
        client_secret: &'a Secret,
        starting_after: Option<&'a str>,
    ) -> BoxFuture<'a, Result<AccountList>> {
        Box::pin(ApiClient::list_accounts(self, client_secret, starting_after))
    }
}

/// Record a finished request in the metrics facade. Decode failures are
/// counted later by the caller's error, so only the transport outcome shows here.
fn record_request(path: &str, result: &Result<String>, duration_secs: f64) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::counter!(
        "connections_api_requests_total",
        "endpoint" => path.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("connections_api_request_duration_seconds", "endpoint" => path.to_string())
        .record(duration_secs);
}
