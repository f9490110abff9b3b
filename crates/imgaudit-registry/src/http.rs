//! Manifest probe speaking the Registry HTTP API v2.
//!
//! A probe issues `HEAD /v2/<repository>/manifests/<reference>`. When the
//! registry answers 401 with a bearer challenge, an anonymous pull token is
//! requested from the advertised realm and the manifest request is sent once
//! more with it. Registries that require credentials are reported as
//! unauthorized.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use imgaudit_core::{ManifestProbe, ManifestStatus};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, WWW_AUTHENTICATE};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{RegistryError, Result};
use crate::reference::ImageReference;

/// Default timeout for registry requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Manifest media types accepted from the registry.
const MANIFEST_ACCEPT: &str = "application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.docker.distribution.manifest.list.v2+json, \
     application/vnd.oci.image.manifest.v1+json, \
     application/vnd.oci.image.index.v1+json";

/// Parameters of a `WWW-Authenticate: Bearer ...` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerChallenge {
    pub realm: String,
    pub service: Option<String>,
    pub scope: Option<String>,
}

/// Parse a bearer challenge header.
///
/// Returns `None` for other schemes or when no realm is given.
pub fn parse_bearer_challenge(header: &str) -> Option<BearerChallenge> {
    let (scheme, params) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let mut realm = None;
    let mut service = None;
    let mut scope = None;

    let mut rest = params.trim();
    while !rest.is_empty() {
        let (key, after) = rest.split_once('=')?;
        let after = after.trim_start();

        // Quoted values may contain commas (e.g. "repository:a:pull,push").
        let (value, remainder) = match after.strip_prefix('"') {
            Some(quoted) => {
                let end = quoted.find('"')?;
                (&quoted[..end], &quoted[end + 1..])
            }
            None => match after.find(',') {
                Some(i) => (after[..i].trim(), &after[i..]),
                None => (after.trim(), ""),
            },
        };

        match key.trim().to_ascii_lowercase().as_str() {
            "realm" => realm = Some(value.to_string()),
            "service" => service = Some(value.to_string()),
            "scope" => scope = Some(value.to_string()),
            _ => {}
        }

        rest = remainder.trim_start().trim_start_matches(',').trim_start();
    }

    Some(BearerChallenge {
        realm: realm?,
        service,
        scope,
    })
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// Registry API probe.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone)]
pub struct HttpRegistryProbe {
    inner: Arc<ProbeInner>,
}

struct ProbeInner {
    http: reqwest::Client,
    mirror: Option<Url>,
    timeout: Duration,
}

impl HttpRegistryProbe {
    /// Create a new probe builder.
    pub fn builder() -> HttpRegistryProbeBuilder {
        HttpRegistryProbeBuilder::new()
    }

    /// Mirror all requests are sent to, if configured.
    pub fn mirror(&self) -> Option<&Url> {
        self.inner.mirror.as_ref()
    }

    /// Check that the manifest of `reference` exists.
    pub async fn check(&self, reference: &str) -> Result<()> {
        let image = ImageReference::parse(reference)?;
        let url = self.manifest_url(&image)?;

        debug!(%url, "querying manifest");
        let response = self.head_manifest(url.clone(), None).await?;

        let response = if response.status() == StatusCode::UNAUTHORIZED {
            let challenge = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_bearer_challenge)
                .ok_or(RegistryError::Unauthorized(401))?;
            let token = self.fetch_token(&challenge, image.repository()).await?;
            self.head_manifest(url, Some(&token)).await?
        } else {
            response
        };

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(RegistryError::NotFound(reference.to_string())),
            status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                Err(RegistryError::Unauthorized(status.as_u16()))
            }
            status => Err(RegistryError::Status(status.as_u16())),
        }
    }

    fn manifest_url(&self, image: &ImageReference) -> Result<Url> {
        let base = match &self.inner.mirror {
            Some(mirror) => mirror.clone(),
            None => {
                let host = image.api_host();
                let scheme = if is_local(host) { "http" } else { "https" };
                Url::parse(&format!("{}://{}/", scheme, host))?
            }
        };

        Ok(base.join(&format!(
            "v2/{}/manifests/{}",
            image.repository(),
            image.manifest_reference()
        ))?)
    }

    async fn head_manifest(&self, url: Url, token: Option<&str>) -> Result<reqwest::Response> {
        let mut request = self
            .inner
            .http
            .head(url)
            .header(ACCEPT, MANIFEST_ACCEPT)
            .timeout(self.inner.timeout);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }

    async fn fetch_token(&self, challenge: &BearerChallenge, repository: &str) -> Result<String> {
        let default_scope = format!("repository:{}:pull", repository);
        let mut url = Url::parse(&challenge.realm)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(ref service) = challenge.service {
                query.append_pair("service", service);
            }
            query.append_pair("scope", challenge.scope.as_deref().unwrap_or(&default_scope));
        }

        debug!(realm = %challenge.realm, "requesting anonymous registry token");
        let response = self
            .inner
            .http
            .get(url)
            .timeout(self.inner.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RegistryError::Token(format!(
                "token endpoint returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let body: TokenResponse = response.json().await?;
        body.token
            .or(body.access_token)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| RegistryError::Token("response carried no token".to_string()))
    }
}

fn is_local(host: &str) -> bool {
    let name = host.split(':').next().unwrap_or(host);
    name == "localhost" || name == "127.0.0.1"
}

#[async_trait]
impl ManifestProbe for HttpRegistryProbe {
    fn name(&self) -> &str {
        "http"
    }

    async fn manifest_status(&self, reference: &str) -> ManifestStatus {
        match self.check(reference).await {
            Ok(()) => ManifestStatus::Published,
            Err(e) => ManifestStatus::Unconfirmed {
                reason: e.to_string(),
            },
        }
    }
}

/// Builder for [`HttpRegistryProbe`].
#[derive(Debug)]
pub struct HttpRegistryProbeBuilder {
    timeout: Duration,
    mirror: Option<String>,
    user_agent: Option<String>,
}

impl HttpRegistryProbeBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            mirror: None,
            user_agent: None,
        }
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send every request to this registry instead of the one named in the
    /// reference.
    pub fn mirror(mut self, url: impl Into<String>) -> Self {
        self.mirror = Some(url.into());
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the probe.
    pub fn build(self) -> Result<HttpRegistryProbe> {
        let mirror = match self.mirror {
            Some(mirror) => {
                let mut url = Url::parse(&mirror)?;
                if !url.path().ends_with('/') {
                    url.set_path(&format!("{}/", url.path()));
                }
                Some(url)
            }
            None => None,
        };

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("imgaudit/{}", env!("CARGO_PKG_VERSION")));

        let http = reqwest::Client::builder().user_agent(user_agent).build()?;

        Ok(HttpRegistryProbe {
            inner: Arc::new(ProbeInner {
                http,
                mirror,
                timeout: self.timeout,
            }),
        })
    }
}

impl Default for HttpRegistryProbeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
