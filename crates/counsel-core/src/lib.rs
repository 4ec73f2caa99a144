//! Counsel Core - conversation orchestration and report composition for
//! school admissions counselling
//!
//! Counsel turns intake data about a family and a shortlist of schools into a
//! long-form counselling report. A simulated advisory conversation gathers the
//! facts, a deterministic matcher ranks the schools, and the composer writes
//! each report section under a length budget and a style gate.
//!
//! # Architecture
//!
//! Data flows one way, leaf components first:
//!
//! 1. **Scoring Engine** (`scoring`): weighted four-dimension match percentages and ranks
//! 2. **Length Controller** (`length`): page target to per-section character bands
//! 3. **Quality Gate** (`quality`): detect, repair and score generated prose
//! 4. **Conversation Orchestrator** (`conversation`): role turns, gap tracking, stopping rules
//! 5. **Report Composer** (`composer`): per-section generation with one bounded retry
//!
//! Text generation sits behind the [`TextGenerator`] trait; the core never
//! talks to a model directly.
//!
//! # Quick Start
//!
//! ```
//! use counsel_core::length::LengthController;
//! use counsel_core::quality;
//! use counsel_core::composer::SectionKind;
//!
//! // Split a 15 page report across the six chapters
//! let specs = LengthController::default()
//!     .allocate(15.0, &SectionKind::names(), None)
//!     .unwrap();
//! assert_eq!(specs.len(), 6);
//! assert!(specs[2].target_chars > specs[0].target_chars);
//!
//! // Gate a draft
//! let report = quality::validate("**Liam** reads widely and loves debate.");
//! assert!(report.passed());
//! assert_eq!(report.clean_text, "Liam reads widely and loves debate.");
//! ```

#![deny(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod composer;
pub mod config;
pub mod conversation;
pub mod error;
pub mod generation;
pub mod journal;
pub mod length;
pub mod quality;
pub mod scoring;

// Re-export commonly used types for convenience
pub use composer::{ReportComposer, ReportDocument, RunSummary, SectionDraft, SectionKind};
pub use config::CounselConfig;
pub use conversation::{
    ConversationOrchestrator, ConversationState, ConversationStatus, IntakeProfile, Message, Role,
};
pub use error::{CounselError, GenerationError, Result};
pub use generation::{GenerationParams, TextGenerator};
pub use journal::{RunRecordStore, TranscriptJournal};
pub use length::{LengthController, PageLayout, SectionSpec};
pub use quality::{QualityGate, ValidationReport, ViolationKind};
pub use scoring::{MatchResult, SchoolCandidate, SchoolFacts};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
