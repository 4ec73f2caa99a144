//! Counsel configuration
//!
//! Every field has a default, so an empty TOML file is a valid configuration.

use crate::error::{CounselError, Result};
use crate::length::PageLayout;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounselConfig {
    /// Parameters passed to every generator call
    pub generation: GenerationSettings,

    /// Orchestrator limits
    pub conversation: ConversationSettings,

    /// Page layout used for character budgets
    pub layout: PageLayout,

    /// Quality gate thresholds
    pub quality: QualitySettings,

    /// Report composition
    pub composer: ComposerSettings,

    /// Persisted transcript and run records
    pub storage: StorageSettings,
}

impl CounselConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the conversation round limit
    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.conversation.max_rounds = max_rounds;
        self
    }

    /// Set the report page target
    pub fn with_target_pages(mut self, pages: f64) -> Self {
        self.composer.target_pages = pages;
        self
    }

    /// Set the generator timeout
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.generation.timeout_secs = secs;
        self
    }

    /// Set the page layout
    pub fn with_layout(mut self, layout: PageLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Set how many sections may be generated at once
    pub fn with_max_concurrent_sections(mut self, max: usize) -> Self {
        self.composer.max_concurrent_sections = max;
        self
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CounselError::InvalidConfig(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values no run could use
    pub fn validate(&self) -> Result<()> {
        let generation = &self.generation;
        if generation.max_tokens == 0 {
            return Err(CounselError::InvalidConfig(
                "generation.max_tokens must be positive".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&generation.temperature) {
            return Err(CounselError::InvalidConfig(format!(
                "generation.temperature {} outside [0, 2]",
                generation.temperature
            )));
        }
        if !(generation.top_p > 0.0 && generation.top_p <= 1.0) {
            return Err(CounselError::InvalidConfig(format!(
                "generation.top_p {} outside (0, 1]",
                generation.top_p
            )));
        }
        if generation.timeout_secs == 0 {
            return Err(CounselError::InvalidConfig(
                "generation.timeout_secs must be positive".to_string(),
            ));
        }

        let conversation = &self.conversation;
        if conversation.max_rounds == 0 {
            return Err(CounselError::InvalidConfig(
                "conversation.max_rounds must be at least 1".to_string(),
            ));
        }
        if !(conversation.summary_pages.is_finite() && conversation.summary_pages > 0.0) {
            return Err(CounselError::InvalidConfig(
                "conversation.summary_pages must be positive".to_string(),
            ));
        }
        if !(1..=2).contains(&conversation.questions_per_turn) {
            return Err(CounselError::InvalidConfig(
                "conversation.questions_per_turn must be 1 or 2".to_string(),
            ));
        }

        self.layout.validate()?;

        if self.quality.min_sentence_chars == 0 {
            return Err(CounselError::InvalidConfig(
                "quality.min_sentence_chars must be positive".to_string(),
            ));
        }

        let composer = &self.composer;
        if !(composer.target_pages.is_finite() && composer.target_pages > 0.0) {
            return Err(CounselError::InvalidConfig(
                "composer.target_pages must be positive".to_string(),
            ));
        }
        if composer.max_concurrent_sections == 0 {
            return Err(CounselError::InvalidConfig(
                "composer.max_concurrent_sections must be at least 1".to_string(),
            ));
        }

        if self.storage.keep_records == 0 {
            return Err(CounselError::InvalidConfig(
                "storage.keep_records must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Generator call parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    /// Per-call timeout; a timed-out call counts as one failed attempt
    pub timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_tokens: 3500,
            temperature: 0.6,
            top_p: 0.9,
            timeout_secs: 60,
        }
    }
}

/// Orchestrator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationSettings {
    pub max_rounds: u32,
    /// Page budget for the transcript summary fed to each turn
    pub summary_pages: f64,
    /// Questions the admissions officer may ask per turn
    pub questions_per_turn: usize,
    /// Most recent visible messages considered by the summary
    pub max_summary_messages: usize,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            max_rounds: 10,
            summary_pages: 0.5,
            questions_per_turn: 2,
            max_summary_messages: 8,
        }
    }
}

/// Quality gate thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualitySettings {
    /// Sentences with fewer non-whitespace characters count as short
    pub min_sentence_chars: usize,
    /// Verification annotations allowed across a whole document
    pub placeholder_allowance: usize,
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            min_sentence_chars: 12,
            placeholder_allowance: 3,
        }
    }
}

/// Composer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerSettings {
    pub target_pages: f64,
    pub max_concurrent_sections: usize,
    /// Optional per-section weight overrides, keyed by section name
    pub section_weights: Option<HashMap<String, f64>>,
}

impl Default for ComposerSettings {
    fn default() -> Self {
        Self {
            target_pages: 15.0,
            max_concurrent_sections: 3,
            section_weights: None,
        }
    }
}

/// Persistence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Append-only JSONL transcript log
    pub transcript_path: String,
    /// JSON array of recent run summaries
    pub summary_path: String,
    pub keep_records: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            transcript_path: "counsel_transcript.jsonl".to_string(),
            summary_path: "counsel_runs.json".to_string(),
            keep_records: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = CounselConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.generation.max_tokens, 3500);
        assert_eq!(config.conversation.max_rounds, 10);
        assert_eq!(config.quality.placeholder_allowance, 3);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: CounselConfig = toml::from_str(
            r#"
            [conversation]
            max_rounds = 4

            [layout]
            paper = "letter"
            font_size_pt = 12.0
            "#,
        )
        .unwrap();

        assert_eq!(config.conversation.max_rounds, 4);
        assert_eq!(config.conversation.summary_pages, 0.5);
        assert_eq!(config.layout.font_size_pt, 12.0);
        assert_eq!(config.composer.target_pages, 15.0);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("counsel.toml");

        let config = CounselConfig::new()
            .with_max_rounds(6)
            .with_target_pages(12.0);
        config.to_file(&path).unwrap();

        let loaded = CounselConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_validate_rejects_nonsense() {
        assert!(CounselConfig::new().with_max_rounds(0).validate().is_err());
        assert!(CounselConfig::new()
            .with_target_pages(-1.0)
            .validate()
            .is_err());
        assert!(CounselConfig::new()
            .with_max_concurrent_sections(0)
            .validate()
            .is_err());

        let mut config = CounselConfig::new();
        config.generation.top_p = 0.0;
        assert!(matches!(
            config.validate(),
            Err(CounselError::InvalidConfig(_))
        ));
    }
}
