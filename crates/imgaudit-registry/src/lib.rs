//! Manifest probes for the publication assertion.
//!
//! Two ways of asking "does this image exist on its registry?":
//!
//! - [`DockerCliProbe`]: `docker manifest inspect <reference>`, relying on the
//!   operator's docker login state
//! - [`HttpRegistryProbe`]: the Registry HTTP API v2 with anonymous bearer
//!   tokens, no docker daemon or CLI needed
//!
//! Both implement [`imgaudit_core::ManifestProbe`] and issue exactly one
//! manifest query per call.

pub mod docker;
pub mod error;
pub mod http;
pub mod reference;

pub use docker::DockerCliProbe;
pub use error::{RegistryError, Result};
pub use http::{
    BearerChallenge, HttpRegistryProbe, HttpRegistryProbeBuilder, parse_bearer_challenge,
};
pub use reference::{DOCKER_HUB, ImageReference};

use std::time::Duration;

use imgaudit_config::{ProbeKind, RegistryConfig};
use imgaudit_core::ManifestProbe;

/// Build the probe selected by the registry configuration.
pub fn build_probe(config: &RegistryConfig) -> Result<Box<dyn ManifestProbe>> {
    let timeout = config.timeout_secs.map(Duration::from_secs);
    match config.probe {
        ProbeKind::Docker => Ok(Box::new(
            DockerCliProbe::new(&config.docker_bin).with_timeout(timeout),
        )),
        ProbeKind::Http => {
            let mut builder = HttpRegistryProbe::builder();
            if let Some(timeout) = timeout {
                builder = builder.timeout(timeout);
            }
            if let Some(ref mirror) = config.mirror {
                builder = builder.mirror(mirror);
            }
            Ok(Box::new(builder.build()?))
        }
    }
}
