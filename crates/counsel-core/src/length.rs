//! Length Controller - page targets to per-section character budgets
//!
//! Converts a page target into a total character budget using the configured
//! page layout, then splits it across the report's sections. Each section gets
//! a ±15% tolerance band because generated prose never lands on an exact count.
//!
//! Pure and deterministic: no I/O, no clocks.

use crate::error::{CounselError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Width of the tolerance band around each section budget
pub const BUDGET_TOLERANCE: f64 = 0.15;

/// Default share of the document per chapter.
///
/// The matching chapter is the analytically densest and gets the largest share.
pub const DEFAULT_SECTION_PROPORTIONS: [(&str, f64); 6] = [
    ("Family and Student Background", 0.20),
    ("School Positioning", 0.13),
    ("Student-School Matching", 0.27),
    ("Academic and Extracurricular Preparation", 0.20),
    ("Application Process and Strategy", 0.17),
    ("Post-Admission Guidance", 0.03),
];

/// Paper sizes the layout understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperSize {
    A4,
    Letter,
}

impl PaperSize {
    /// Page dimensions in points (width, height)
    pub fn dimensions_pt(&self) -> (f64, f64) {
        match self {
            PaperSize::A4 => (595.0, 842.0),
            PaperSize::Letter => (612.0, 792.0),
        }
    }
}

/// Typesetting assumptions used to turn pages into characters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageLayout {
    pub paper: PaperSize,
    /// Body font size in points
    pub font_size_pt: f64,
    /// Line height as a multiple of the font size
    pub line_spacing: f64,
    /// Margin on every edge, in points
    pub margin_pt: f64,
    /// Average glyph advance in ems (1.0 for full-width CJK text)
    pub glyph_width_em: f64,
    /// Fraction of the typeset area carrying body text; headings, tables and
    /// paragraph spacing take the rest
    pub text_density: f64,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            paper: PaperSize::A4,
            font_size_pt: 11.0,
            line_spacing: 1.25,
            margin_pt: 72.0,
            glyph_width_em: 1.0,
            text_density: 0.4,
        }
    }
}

impl PageLayout {
    /// Characters of body text expected on one page
    pub fn chars_per_page(&self) -> f64 {
        let (width, height) = self.paper.dimensions_pt();
        let usable_width = (width - 2.0 * self.margin_pt).max(0.0);
        let usable_height = (height - 2.0 * self.margin_pt).max(0.0);

        let per_line = (usable_width / (self.font_size_pt * self.glyph_width_em)).floor();
        let lines = (usable_height / (self.font_size_pt * self.line_spacing)).floor();

        (per_line * lines * self.text_density).round().max(1.0)
    }

    /// Reject layouts that cannot produce a positive page capacity
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("font_size_pt", self.font_size_pt),
            ("line_spacing", self.line_spacing),
            ("glyph_width_em", self.glyph_width_em),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(CounselError::InvalidConfig(format!(
                    "layout.{} must be positive, got {}",
                    field, value
                )));
            }
        }

        if !(self.text_density > 0.0 && self.text_density <= 1.0) {
            return Err(CounselError::InvalidConfig(format!(
                "layout.text_density must be in (0, 1], got {}",
                self.text_density
            )));
        }

        let (width, height) = self.paper.dimensions_pt();
        if self.margin_pt < 0.0 || 2.0 * self.margin_pt >= width.min(height) {
            return Err(CounselError::InvalidConfig(format!(
                "layout.margin_pt {} leaves no printable area",
                self.margin_pt
            )));
        }

        Ok(())
    }
}

/// Budget for one report section; the ordered list forms the table of contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSpec {
    pub name: String,
    pub min_chars: usize,
    pub max_chars: usize,
    /// Centre of the band
    pub target_chars: usize,
    pub order: usize,
}

impl SectionSpec {
    /// Whether a character count lands inside the band
    pub fn accepts(&self, char_count: usize) -> bool {
        (self.min_chars..=self.max_chars).contains(&char_count)
    }

    /// Signed distance to the band: positive means too long, negative too short
    pub fn deviation(&self, char_count: usize) -> i64 {
        if char_count < self.min_chars {
            char_count as i64 - self.min_chars as i64
        } else if char_count > self.max_chars {
            char_count as i64 - self.max_chars as i64
        } else {
            0
        }
    }
}

/// Length controller
#[derive(Debug, Clone, Default)]
pub struct LengthController {
    layout: PageLayout,
}

impl LengthController {
    pub fn new(layout: PageLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    /// Total character budget for a page target
    pub fn total_chars(&self, target_pages: f64) -> f64 {
        target_pages * self.layout.chars_per_page()
    }

    /// Estimated page count for a body of text of `chars` characters
    pub fn estimate_pages(&self, chars: usize) -> f64 {
        chars as f64 / self.layout.chars_per_page()
    }

    /// Split a page target across sections.
    ///
    /// With a `weights_hint`, listed sections use the hinted weight and the
    /// rest fall back to their default share. Unknown section names get an
    /// equal share. Weights are renormalised so the band centres sum to the
    /// total budget.
    pub fn allocate<S: AsRef<str>>(
        &self,
        target_pages: f64,
        section_names: &[S],
        weights_hint: Option<&HashMap<String, f64>>,
    ) -> Result<Vec<SectionSpec>> {
        if !target_pages.is_finite() || target_pages <= 0.0 {
            return Err(CounselError::InvalidTarget(format!(
                "target_pages must be positive, got {}",
                target_pages
            )));
        }
        if section_names.is_empty() {
            return Err(CounselError::InvalidTarget(
                "section list is empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for name in section_names {
            if !seen.insert(name.as_ref()) {
                return Err(CounselError::InvalidTarget(format!(
                    "duplicate section name '{}'",
                    name.as_ref()
                )));
            }
        }

        let equal_share = 1.0 / section_names.len() as f64;
        let mut weights = Vec::with_capacity(section_names.len());
        for name in section_names {
            let name = name.as_ref();
            let hinted = weights_hint.and_then(|hint| hint.get(name).copied());
            let weight = match hinted {
                Some(w) if !w.is_finite() || w < 0.0 => {
                    return Err(CounselError::InvalidTarget(format!(
                        "weight hint for '{}' must be a non-negative number, got {}",
                        name, w
                    )));
                }
                Some(w) => w,
                None => default_proportion(name).unwrap_or(equal_share),
            };
            weights.push(weight);
        }

        let weight_sum: f64 = weights.iter().sum();
        if weight_sum <= 0.0 {
            return Err(CounselError::InvalidTarget(
                "section weights sum to zero".to_string(),
            ));
        }

        let total = self.total_chars(target_pages);
        let specs = section_names
            .iter()
            .zip(weights)
            .enumerate()
            .map(|(order, (name, weight))| {
                let budget = total * weight / weight_sum;
                SectionSpec {
                    name: name.as_ref().to_string(),
                    min_chars: (budget * (1.0 - BUDGET_TOLERANCE)).round() as usize,
                    max_chars: (budget * (1.0 + BUDGET_TOLERANCE)).round() as usize,
                    target_chars: budget.round() as usize,
                    order,
                }
            })
            .collect();

        Ok(specs)
    }
}

/// Default share for a chapter name, matched case-insensitively
pub fn default_proportion(name: &str) -> Option<f64> {
    DEFAULT_SECTION_PROPORTIONS
        .iter()
        .find(|(section, _)| section.eq_ignore_ascii_case(name.trim()))
        .map(|(_, share)| *share)
}

/// Characters that count toward a budget: everything except whitespace
pub fn content_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

/// Word count where each CJK ideograph is one word and Latin runs are words
pub fn word_count(text: &str) -> usize {
    let mut count = 0;
    let mut in_word = false;

    for c in text.chars() {
        if is_cjk(c) {
            count += 1;
            in_word = false;
        } else if c.is_alphanumeric() {
            if !in_word {
                count += 1;
                in_word = true;
            }
        } else if c != '\'' && c != '-' {
            in_word = false;
        }
    }

    count
}

pub(crate) fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF | 0x20000..=0x2A6DF)
}
