//! Fake completion text

use rand::Rng;
use std::sync::Arc;

use crate::corpus::ResponseCorpus;

/// Reply used when no templates were loaded
pub const EMPTY_CORPUS_TEXT: &str = "no responses loaded";

/// Builds fake reply text from the canned corpus
#[derive(Debug, Clone)]
pub struct TextFabricator {
    corpus: Arc<ResponseCorpus>,
}

impl TextFabricator {
    pub fn new(corpus: Arc<ResponseCorpus>) -> Self {
        Self { corpus }
    }

    /// Pick a template uniformly, then repeat its body a uniform number of
    /// times within the template's inclusive range.
    pub fn fabricate<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let templates = self.corpus.templates();
        if templates.is_empty() {
            return EMPTY_CORPUS_TEXT.to_string();
        }

        let template = &templates[rng.gen_range(0..templates.len())];
        let repeat = rng.gen_range(template.repeat_min..=template.repeat_max);
        template.text.repeat(repeat as usize)
    }

    pub fn corpus(&self) -> &ResponseCorpus {
        &self.corpus
    }
}

/// Split `text` into pieces of `size` characters; only the last may be shorter.
///
/// Empty input yields a single empty chunk. A zero `size` keeps the text whole.
pub fn chunk(text: &str, size: usize) -> Vec<&str> {
    if text.is_empty() || size == 0 {
        return vec![text];
    }

    let mut chunks = Vec::with_capacity(text.len() / size + 1);
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == size {
            chunks.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    chunks.push(&text[start..]);
    chunks
}
