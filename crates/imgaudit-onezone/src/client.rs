//! Onezone automation REST client.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, LOCATION};
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::error::{OnezoneError, Result};

/// Default timeout for requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Onezone domain of a default development deployment.
pub const DEFAULT_DOMAIN: &str = "dev-onezone.default.svc.cluster.local";

/// REST API path under the Onezone domain.
const API_PATH: &str = "api/v3/onezone/";

/// Client for the subset of the Onezone automation API used to recompute
/// lambda checksums.
///
/// # Example
///
/// ```no_run
/// use imgaudit_onezone::OnezoneClient;
///
/// # async fn example() -> imgaudit_onezone::Result<()> {
/// let client = OnezoneClient::builder()
///     .domain("onezone.example.org")
///     .token("secret")
///     .build()?;
///
/// let inventory = client.create_inventory("scratch").await?;
/// client.remove_inventory(&inventory).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct OnezoneClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl OnezoneClient {
    /// Create a new client builder.
    pub fn builder() -> OnezoneClientBuilder {
        OnezoneClientBuilder::new()
    }

    /// Get the API base URL.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Automation inventories
    // ─────────────────────────────────────────────────────────────────────────

    /// Create an automation inventory owned by the current user; returns its id.
    pub async fn create_inventory(&self, name: &str) -> Result<String> {
        let response = self
            .post("user/atm_inventories", &json!({ "name": name }))
            .await?;
        let id = location_id(&response, "POST /user/atm_inventories")?;
        debug!(%id, name, "created automation inventory");
        Ok(id)
    }

    /// Remove an automation inventory.
    pub async fn remove_inventory(&self, inventory_id: &str) -> Result<()> {
        self.delete(&format!("user/atm_inventories/{}", inventory_id))
            .await?;
        debug!(%inventory_id, "removed automation inventory");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lambdas
    // ─────────────────────────────────────────────────────────────────────────

    /// Upload a lambda revision dump into an inventory; returns the new lambda id.
    pub async fn upload_lambda(&self, inventory_id: &str, revision_dump: &Value) -> Result<String> {
        let mut body = revision_dump.clone();
        let object = body.as_object_mut().ok_or_else(|| {
            OnezoneError::DumpFormat("lambda revision dump is not an object".to_string())
        })?;
        object.insert("atmInventoryId".to_string(), json!(inventory_id));

        let response = self.post("atm_lambdas", &body).await?;
        let id = location_id(&response, "POST /atm_lambdas")?;
        debug!(lambda_id = %id, %inventory_id, "uploaded lambda revision");
        Ok(id)
    }

    /// Dump a lambda back to JSON, including the given revision.
    pub async fn dump_lambda(&self, lambda_id: &str, revision_number: u64) -> Result<Value> {
        let response = self
            .post(
                &format!("atm_lambdas/{}/dump", lambda_id),
                &json!({ "includeRevision": revision_number }),
            )
            .await?;
        Ok(response.json().await?)
    }

    /// Unlink a lambda from an inventory.
    pub async fn unlink_lambda(&self, lambda_id: &str, inventory_id: &str) -> Result<()> {
        self.delete(&format!(
            "atm_lambdas/{}/atm_inventories/{}",
            lambda_id, inventory_id
        ))
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal HTTP methods
    // ─────────────────────────────────────────────────────────────────────────

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.inner.base_url.join(path.trim_start_matches('/'))?)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response> {
        let url = self.url(path)?;
        let response = self
            .inner
            .http
            .post(url)
            .body(body.to_string())
            .timeout(self.inner.timeout)
            .send()
            .await?;
        check_status(response).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let url = self.url(path)?;
        let response = self
            .inner
            .http
            .delete(url)
            .timeout(self.inner.timeout)
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }
}

/// Pass successful responses through; turn the rest into [`OnezoneError::Api`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    // Onezone errors look like {"error": {"id": ..., "description": ...}}.
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|body| {
            body.pointer("/error/description")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            if text.is_empty() {
                format!("HTTP {}", status.as_u16())
            } else {
                text
            }
        });

    Err(OnezoneError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Last path segment of the `Location` header.
fn location_id(response: &reqwest::Response, request: &str) -> Result<String> {
    response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|location| location.trim_end_matches('/').rsplit('/').next())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| OnezoneError::MissingLocation(request.to_string()))
}

/// Builder for [`OnezoneClient`].
#[derive(Debug)]
pub struct OnezoneClientBuilder {
    domain: String,
    base_url: Option<String>,
    token: Option<String>,
    accept_invalid_certs: bool,
    timeout: Duration,
}

impl OnezoneClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            domain: DEFAULT_DOMAIN.to_string(),
            base_url: None,
            token: None,
            accept_invalid_certs: true,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the Onezone domain; the API lives at `https://<domain>/api/v3/onezone`.
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Use an explicit API base URL instead of deriving it from the domain.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the REST access token.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Accept self-signed or otherwise invalid TLS certificates.
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<OnezoneClient> {
        let token = self
            .token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| OnezoneError::Config("access token is required".to_string()))?;

        let mut base_url = match self.base_url {
            Some(url) => Url::parse(&url)?,
            None => Url::parse(&format!("https://{}/", self.domain))?.join(API_PATH)?,
        };
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut token = HeaderValue::from_str(&token)
            .map_err(|_| OnezoneError::Config("invalid access token".to_string()))?;
        token.set_sensitive(true);
        headers.insert(HeaderName::from_static("x-auth-token"), token);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(format!("imgaudit/{}", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .build()?;

        Ok(OnezoneClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                timeout: self.timeout,
            }),
        })
    }
}

impl Default for OnezoneClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
