//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [scan]                   # where workflow dumps live and how images are named
//! [registry]               # dev/public prefixes and manifest probing
//! [onezone]                # checksum recalculation endpoint
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default dev registry prefix.
pub const DEFAULT_DEV_PREFIX: &str = "docker.onedata.org";

/// Default public namespace prefix.
pub const DEFAULT_PUBLIC_PREFIX: &str = "onedata";

/// Default directory holding workflow dumps.
pub const DEFAULT_WORKFLOW_ROOT: &str = "workflows";

/// Default Onezone domain (one-env development deployment).
pub const DEFAULT_ONEZONE_DOMAIN: &str = "dev-onezone.default.svc.cluster.local";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImgauditConfig {
    /// Workflow scanning settings.
    pub scan: Option<ScanConfig>,

    /// Registry prefixes and probing.
    pub registry: Option<RegistryConfig>,

    /// Onezone REST settings.
    pub onezone: Option<OnezoneConfig>,
}

impl ImgauditConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Config with every section populated with defaults.
    pub fn with_defaults() -> Self {
        Self {
            scan: Some(ScanConfig::default()),
            registry: Some(RegistryConfig::default()),
            onezone: Some(OnezoneConfig::default()),
        }
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: ImgauditConfig) {
        if other.scan.is_some() {
            self.scan = other.scan;
        }

        if other.registry.is_some() {
            self.registry = other.registry;
        }

        if other.onezone.is_some() {
            self.onezone = other.onezone;
        }
    }

    /// Effective scan settings.
    pub fn scan(&self) -> ScanConfig {
        self.scan.clone().unwrap_or_default()
    }

    /// Effective registry settings.
    pub fn registry(&self) -> RegistryConfig {
        self.registry.clone().unwrap_or_default()
    }

    /// Effective Onezone settings.
    pub fn onezone(&self) -> OnezoneConfig {
        self.onezone.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scan
// ─────────────────────────────────────────────────────────────────────────────

/// Workflow scanning configuration.
///
/// ```toml
/// [scan]
/// root = "workflows"
/// extension = "json"
/// image_key = "dockerImage"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Directory scanned recursively for workflow dumps.
    pub root: PathBuf,
    /// File extension of workflow dumps (without the dot).
    pub extension: String,
    /// Object key whose string values name container images.
    pub image_key: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_WORKFLOW_ROOT),
            extension: "json".to_string(),
            image_key: "dockerImage".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// How manifest existence is checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// `docker manifest inspect`.
    #[default]
    Docker,
    /// Registry HTTP API v2.
    Http,
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeKind::Docker => write!(f, "docker"),
            ProbeKind::Http => write!(f, "http"),
        }
    }
}

impl FromStr for ProbeKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Ok(ProbeKind::Docker),
            "http" => Ok(ProbeKind::Http),
            other => Err(format!(
                "unknown probe '{}' (expected 'docker' or 'http')",
                other
            )),
        }
    }
}

/// Registry configuration.
///
/// ```toml
/// [registry]
/// dev_prefix = "docker.onedata.org"
/// public_prefix = "onedata"
/// probe = "docker"
/// docker_bin = "docker"
/// concurrency = 4
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Prefix of images pushed to the development registry.
    pub dev_prefix: String,
    /// Prefix of images published in the public namespace.
    pub public_prefix: String,
    /// Manifest probe used by `assert-published`.
    pub probe: ProbeKind,
    /// Docker CLI binary used by the `docker` probe.
    pub docker_bin: String,
    /// Per-query timeout in seconds (unset = no timeout).
    pub timeout_secs: Option<u64>,
    /// Maximum number of concurrent manifest queries.
    pub concurrency: usize,
    /// Base URL all HTTP probe requests are routed to (registry mirror).
    pub mirror: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            dev_prefix: DEFAULT_DEV_PREFIX.to_string(),
            public_prefix: DEFAULT_PUBLIC_PREFIX.to_string(),
            probe: ProbeKind::Docker,
            docker_bin: "docker".to_string(),
            timeout_secs: None,
            concurrency: 4,
            mirror: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Onezone
// ─────────────────────────────────────────────────────────────────────────────

/// Onezone REST configuration used by checksum recalculation.
///
/// ```toml
/// [onezone]
/// domain = "dev-onezone.default.svc.cluster.local"
/// accept_invalid_certs = true
/// timeout_secs = 60
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnezoneConfig {
    /// Onezone domain.
    pub domain: String,
    /// Accept self-signed certificates (development deployments).
    pub accept_invalid_certs: bool,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for OnezoneConfig {
    fn default() -> Self {
        Self {
            domain: DEFAULT_ONEZONE_DOMAIN.to_string(),
            accept_invalid_certs: true,
            timeout_secs: 60,
        }
    }
}
