//! Fake model records, layers and name handling

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Tag assumed when a model reference carries none
pub const DEFAULT_TAG: &str = "latest";

/// Media type reported for model weight layers
pub const MODEL_LAYER_MEDIA_TYPE: &str = "application/vnd.ollama.image.model";

/// One content-addressed unit of a model manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    /// Content identifier (e.g., "sha256:6a0746a1...")
    pub digest: String,
    /// Declared size in bytes
    pub size: u64,
    /// Media type of the blob
    #[serde(rename = "mediaType", default)]
    pub media_type: String,
}

impl Layer {
    pub fn new(digest: impl Into<String>, size: u64, media_type: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
            size,
            media_type: media_type.into(),
        }
    }
}

/// Descriptive block attached to every model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelDetails {
    #[serde(alias = "model_format")]
    pub format: String,
    #[serde(alias = "model_family")]
    pub family: String,
    #[serde(alias = "model_families")]
    pub families: Vec<String>,
    #[serde(alias = "model_type")]
    pub parameter_size: String,
    #[serde(alias = "file_type")]
    pub quantization_level: String,
    pub architecture: String,
}

impl ModelDetails {
    /// Plausible details for a freshly pulled model, guessed from its name
    pub fn derive(name: &ModelName) -> Self {
        let base = name.name.rsplit('/').next().unwrap_or(&name.name);
        let family: String = base
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_lowercase();
        let family = if family.is_empty() {
            base.to_lowercase()
        } else {
            family
        };

        Self {
            format: "gguf".to_string(),
            families: vec![family.clone()],
            parameter_size: parameter_size_from_tag(&name.tag).unwrap_or_default(),
            quantization_level: "Q4_K_M".to_string(),
            architecture: family.clone(),
            family,
        }
    }
}

/// Reads a parameter count such as `8b` or `0.5b-instruct` out of a tag
fn parameter_size_from_tag(tag: &str) -> Option<String> {
    let head = tag.split('-').next()?;
    let unit = head.chars().last()?;
    let number = &head[..head.len() - unit.len_utf8()];
    if number.is_empty() || !matches!(unit, 'b' | 'B' | 'm' | 'M') {
        return None;
    }
    number.parse::<f64>().ok()?;
    Some(format!("{}{}", number, unit.to_ascii_uppercase()))
}

/// A fake installed model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRecord {
    /// Normalized `name:tag` identifier
    pub name: String,
    /// Last modification time (RFC 3339)
    #[serde(default)]
    pub modified_at: String,
    /// Total size in bytes; sum of the layer sizes
    #[serde(default)]
    pub size: u64,
    /// Content digest
    #[serde(default)]
    pub digest: String,
    /// Details block
    #[serde(default)]
    pub details: ModelDetails,
    /// Ordered layers
    #[serde(default)]
    pub layers: Vec<Layer>,
}

impl ModelRecord {
    /// Build a record from pulled layers.
    ///
    /// The digest is the first layer's digest rather than a hash of the manifest.
    pub fn from_layers(name: &ModelName, layers: Vec<Layer>, modified_at: DateTime<Utc>) -> Self {
        let digest = layers
            .first()
            .map(|layer| layer.digest.clone())
            .unwrap_or_default();
        Self {
            name: name.full(),
            modified_at: modified_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
            size: layers.iter().map(|layer| layer.size).sum(),
            digest,
            details: ModelDetails::derive(name),
            layers,
        }
    }

    /// Sum of the layer sizes
    pub fn layers_size(&self) -> u64 {
        self.layers.iter().map(|layer| layer.size).sum()
    }

    /// Whether `size` agrees with the layer list
    pub fn is_consistent(&self) -> bool {
        self.layers.is_empty() || self.size == self.layers_size()
    }
}

/// A model reference split into name and tag
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelName {
    pub name: String,
    pub tag: String,
}

impl ModelName {
    /// Parse a reference, defaulting the tag to `latest`
    pub fn parse(reference: &str) -> Self {
        let reference = reference.trim();
        match reference.split_once(':') {
            Some((name, tag)) if !tag.is_empty() => Self {
                name: name.to_string(),
                tag: tag.to_string(),
            },
            Some((name, _)) => Self {
                name: name.to_string(),
                tag: DEFAULT_TAG.to_string(),
            },
            None => Self {
                name: reference.to_string(),
                tag: DEFAULT_TAG.to_string(),
            },
        }
    }

    /// Normalized `name:tag` form used as registry key
    pub fn full(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }

    /// Repository path on the upstream registry; bare names live under `library/`
    pub fn repository(&self) -> String {
        if self.name.contains('/') {
            self.name.clone()
        } else {
            format!("library/{}", self.name)
        }
    }
}

impl std::fmt::Display for ModelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

/// Normalize a model reference to its `name:tag` key
pub fn normalize_model_name(reference: &str) -> String {
    ModelName::parse(reference).full()
}
