//! Canned response corpus

use honeypot_core::{HoneypotError, HoneypotResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// One candidate reply and how many times its body is repeated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseTemplate {
    pub text: String,
    pub repeat_min: u32,
    pub repeat_max: u32,
}

/// Read-only set of reply templates, loaded once at startup
#[derive(Debug, Clone, Default)]
pub struct ResponseCorpus {
    templates: Vec<ResponseTemplate>,
}

impl ResponseCorpus {
    /// Corpus with no templates; fabrication falls back to a sentinel
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a corpus from templates, rejecting inverted repeat ranges
    pub fn from_templates(templates: Vec<ResponseTemplate>) -> HoneypotResult<Self> {
        if let Some(bad) = templates.iter().find(|t| t.repeat_min > t.repeat_max) {
            return Err(HoneypotError::Load(format!(
                "repeat_min {} exceeds repeat_max {}",
                bad.repeat_min, bad.repeat_max
            )));
        }
        Ok(Self { templates })
    }

    /// Load `response.json`: a JSON array of templates
    pub fn load(path: &Path) -> HoneypotResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HoneypotError::Load(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let templates: Vec<ResponseTemplate> = serde_json::from_str(&content).map_err(|e| {
            HoneypotError::Load(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        let corpus = Self::from_templates(templates)?;
        info!(
            path = %path.display(),
            templates = corpus.len(),
            "Loaded response corpus"
        );
        Ok(corpus)
    }

    pub fn templates(&self) -> &[ResponseTemplate] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("response.json");
        std::fs::write(
            &path,
            r#"[{"text": "hi ", "repeat_min": 2, "repeat_max": 2},
                {"text": "Sure! ", "repeat_min": 1, "repeat_max": 5}]"#,
        )
        .unwrap();

        let corpus = ResponseCorpus::load(&path).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.templates()[0].text, "hi ");
    }

    #[test]
    fn test_missing_corpus_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ResponseCorpus::load(&dir.path().join("response.json")).unwrap_err();
        assert!(matches!(err, HoneypotError::Load(_)));
    }

    #[test]
    fn test_malformed_corpus_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("response.json");
        std::fs::write(&path, r#"{"text": "not an array"}"#).unwrap();
        assert!(matches!(
            ResponseCorpus::load(&path),
            Err(HoneypotError::Load(_))
        ));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let result = ResponseCorpus::from_templates(vec![ResponseTemplate {
            text: "x".to_string(),
            repeat_min: 3,
            repeat_max: 1,
        }]);
        assert!(matches!(result, Err(HoneypotError::Load(_))));
    }
}
