//! Manifest lookup against the upstream model registry

use async_trait::async_trait;
use honeypot_core::{HoneypotError, HoneypotResult, Layer, ModelName};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const MANIFEST_ACCEPT: &str = "application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.oci.image.manifest.v1+json";

/// Resolves a model reference to its layer list
#[async_trait]
pub trait ManifestFetcher: Send + Sync {
    /// Fetch the layers of `name`; any failure means the model is unknown
    async fn fetch(&self, name: &ModelName) -> HoneypotResult<Vec<Layer>>;
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    layers: Vec<ManifestLayer>,
}

#[derive(Debug, Deserialize)]
struct ManifestLayer {
    digest: String,
    size: u64,
    #[serde(rename = "mediaType", default)]
    media_type: String,
}

/// Parse a registry manifest document into layers
pub fn parse_manifest(body: &[u8]) -> HoneypotResult<Vec<Layer>> {
    let manifest: Manifest = serde_json::from_slice(body)
        .map_err(|e| HoneypotError::Upstream(format!("invalid manifest: {}", e)))?;
    Ok(manifest
        .layers
        .into_iter()
        .map(|l| Layer::new(l.digest, l.size, l.media_type))
        .collect())
}

/// HTTP client for the registry's `/v2/<repo>/manifests/<tag>` endpoint
pub struct RegistryClient {
    client: reqwest::Client,
    base_url: String,
}

impl RegistryClient {
    /// Create a client for the registry at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> HoneypotResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HoneypotError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Manifest URL for a model reference
    pub fn manifest_url(&self, name: &ModelName) -> String {
        format!(
            "{}/v2/{}/manifests/{}",
            self.base_url,
            name.repository(),
            name.tag
        )
    }
}

#[async_trait]
impl ManifestFetcher for RegistryClient {
    async fn fetch(&self, name: &ModelName) -> HoneypotResult<Vec<Layer>> {
        let url = self.manifest_url(name);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, MANIFEST_ACCEPT)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "Manifest fetch error");
                HoneypotError::Upstream(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            debug!(url = %url, status = %status, "Manifest not available");
            return Err(HoneypotError::Upstream(format!("status {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| HoneypotError::Upstream(e.to_string()))?;
        let layers = parse_manifest(&body)?;

        debug!(url = %url, layers = layers.len(), "Fetched manifest");
        Ok(layers)
    }
}
