//! Draft cache for resumed runs
//!
//! Keys are blake3 hashes of everything that shaped a draft, so a run repeated
//! with identical inputs after a cancellation reuses finished sections.

use super::document::SectionDraft;
use crate::length::SectionSpec;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

/// Content hash identifying one generation request
pub fn cache_key(prompt: &str, spec: Option<&SectionSpec>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(prompt.as_bytes());
    if let Some(spec) = spec {
        hasher.update(
            format!(
                "\0{}\0{}\0{}\0{}",
                spec.name, spec.min_chars, spec.max_chars, spec.order
            )
            .as_bytes(),
        );
    }
    hasher.finalize().to_hex().to_string()
}

#[derive(Debug, Default)]
pub struct DraftCache {
    sections: Mutex<HashMap<String, SectionDraft>>,
    rationales: Mutex<HashMap<String, String>>,
}

impl DraftCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section(&self, key: &str) -> Option<SectionDraft> {
        let hit = self.sections.lock().get(key).cloned();
        if hit.is_some() {
            debug!("Draft cache hit for section {}", &key[..key.len().min(12)]);
        }
        hit
    }

    pub fn store_section(&self, key: String, draft: SectionDraft) {
        self.sections.lock().insert(key, draft);
    }

    pub fn rationale(&self, key: &str) -> Option<String> {
        self.rationales.lock().get(key).cloned()
    }

    pub fn store_rationale(&self, key: String, rationale: String) {
        self.rationales.lock().insert(key, rationale);
    }

    pub fn len(&self) -> usize {
        self.sections.lock().len() + self.rationales.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.sections.lock().clear();
        self.rationales.lock().clear();
    }
}
