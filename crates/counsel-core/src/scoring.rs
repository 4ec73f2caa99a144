//! Scoring Engine - weighted multi-criteria school matching
//!
//! Ranks candidate schools by a weighted composite of four fixed dimensions.
//! The engine is pure: identical inputs always produce identical rankings, so
//! the composer can retry sections without re-deriving scores.
//!
//! ```
//! use counsel_core::scoring::{rank, SchoolCandidate};
//!
//! let school = SchoolCandidate::new("Upper Canada College")
//!     .with_scores([5, 4, 5, 4]);
//! let results = rank(&[school]).unwrap();
//! assert_eq!(results[0].rank, 1);
//! assert!((results[0].match_percentage - 91.0).abs() < 1e-9);
//! ```

use crate::error::{CounselError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Allowed drift of a weight vector from 1.0
pub const WEIGHT_EPSILON: f64 = 1e-6;

/// Scores are integers in this range
pub const SCORE_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

/// Scoring dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Academic,
    Activities,
    Culture,
    Personality,
}

impl Dimension {
    /// Every dimension, in canonical order
    pub const ALL: [Dimension; 4] = [
        Dimension::Academic,
        Dimension::Activities,
        Dimension::Culture,
        Dimension::Personality,
    ];

    /// Human-readable label used in prompts and rationales
    pub fn label(&self) -> &'static str {
        match self {
            Dimension::Academic => "academic fit",
            Dimension::Activities => "activities and resources",
            Dimension::Culture => "culture and values",
            Dimension::Personality => "personality and atmosphere",
        }
    }
}

/// Default weight vector (academic 0.35, activities 0.25, culture 0.20, personality 0.20)
pub fn default_weights() -> BTreeMap<Dimension, f64> {
    BTreeMap::from([
        (Dimension::Academic, 0.35),
        (Dimension::Activities, 0.25),
        (Dimension::Culture, 0.20),
        (Dimension::Personality, 0.20),
    ])
}

/// Published facts about a school
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchoolFacts {
    #[serde(rename = "type")]
    pub school_type: String,
    pub class_size: Option<u32>,
    /// e.g. "8:1"
    pub student_teacher_ratio: Option<String>,
    /// Annual tuition in the school's currency
    pub tuition: Option<u64>,
    pub location: String,
    pub signature_programs: Vec<String>,
}

/// A school under consideration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolCandidate {
    pub name: String,
    #[serde(default)]
    pub facts: SchoolFacts,
    pub scores: BTreeMap<Dimension, u8>,
    #[serde(default = "default_weights")]
    pub weights: BTreeMap<Dimension, f64>,
}

impl SchoolCandidate {
    /// Candidate with neutral scores and default weights
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            facts: SchoolFacts::default(),
            scores: Dimension::ALL.iter().map(|d| (*d, 3)).collect(),
            weights: default_weights(),
        }
    }

    /// Set scores in canonical order (academic, activities, culture, personality)
    pub fn with_scores(mut self, scores: [u8; 4]) -> Self {
        self.scores = Dimension::ALL.iter().copied().zip(scores).collect();
        self
    }

    /// Set weights in canonical order
    pub fn with_weights(mut self, weights: [f64; 4]) -> Self {
        self.weights = Dimension::ALL.iter().copied().zip(weights).collect();
        self
    }

    pub fn with_facts(mut self, facts: SchoolFacts) -> Self {
        self.facts = facts;
        self
    }

    /// Check weights and scores against the scoring preconditions
    pub fn validate(&self) -> Result<()> {
        let mut weight_sum = 0.0;
        for dimension in Dimension::ALL {
            let weight = self.weights.get(&dimension).copied().ok_or_else(|| {
                CounselError::InvalidWeight {
                    school: self.name.clone(),
                    reason: format!("missing weight for {:?}", dimension),
                }
            })?;
            if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
                return Err(CounselError::InvalidWeight {
                    school: self.name.clone(),
                    reason: format!("{:?} weight {} outside [0, 1]", dimension, weight),
                });
            }
            weight_sum += weight;

            let score = self.scores.get(&dimension).copied().ok_or_else(|| {
                CounselError::InvalidScore {
                    school: self.name.clone(),
                    reason: format!("missing score for {:?}", dimension),
                }
            })?;
            if !SCORE_RANGE.contains(&score) {
                return Err(CounselError::InvalidScore {
                    school: self.name.clone(),
                    reason: format!("{:?} score {} outside [1, 5]", dimension, score),
                });
            }
        }

        if (weight_sum - 1.0).abs() > WEIGHT_EPSILON {
            return Err(CounselError::InvalidWeight {
                school: self.name.clone(),
                reason: format!("weights sum to {}, expected 1.0", weight_sum),
            });
        }

        Ok(())
    }

    fn score(&self, dimension: Dimension) -> u8 {
        self.scores.get(&dimension).copied().unwrap_or(0)
    }

    fn weight(&self, dimension: Dimension) -> f64 {
        self.weights.get(&dimension).copied().unwrap_or(0.0)
    }
}

/// One dimension's share of a school's composite
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionContribution {
    pub dimension: Dimension,
    pub score: u8,
    pub weight: f64,
    /// weight × score
    pub product: f64,
}

/// Ranked outcome for one school. Derived; rebuilt rather than edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub school: SchoolCandidate,
    pub match_percentage: f64,
    /// 1 is the best match
    pub rank: usize,
    pub rationale: String,
    /// The two dimensions with the highest weight × score, in descending order
    pub top_contributors: Vec<DimensionContribution>,
}

impl MatchResult {
    /// A copy of this result carrying a different rationale
    pub fn with_rationale(&self, rationale: impl Into<String>) -> Self {
        Self {
            rationale: rationale.into(),
            ..self.clone()
        }
    }
}

/// Composite match percentage: Σ score × weight × 20, clamped to [0, 100]
pub fn match_percentage(school: &SchoolCandidate) -> f64 {
    let composite: f64 = Dimension::ALL
        .iter()
        .map(|d| school.score(*d) as f64 * school.weight(*d))
        .sum();
    (composite * 20.0).clamp(0.0, 100.0)
}

/// Per-dimension contributions sorted by product, highest first
pub fn contributions(school: &SchoolCandidate) -> Vec<DimensionContribution> {
    let mut parts: Vec<DimensionContribution> = Dimension::ALL
        .iter()
        .map(|d| {
            let score = school.score(*d);
            let weight = school.weight(*d);
            DimensionContribution {
                dimension: *d,
                score,
                weight,
                product: score as f64 * weight,
            }
        })
        .collect();

    parts.sort_by(|a, b| {
        b.product
            .partial_cmp(&a.product)
            .unwrap_or(Ordering::Equal)
            .then(a.dimension.cmp(&b.dimension))
    });
    parts
}

/// Rank schools by match percentage.
///
/// Ties are broken by higher academic score, then by name. Fails on the first
/// school whose weights or scores violate the preconditions.
pub fn rank(schools: &[SchoolCandidate]) -> Result<Vec<MatchResult>> {
    for school in schools {
        school.validate()?;
    }

    let mut scored: Vec<(&SchoolCandidate, f64)> =
        schools.iter().map(|s| (s, match_percentage(s))).collect();

    scored.sort_by(|(a, pa), (b, pb)| {
        // Compare at a fixed precision so float noise never decides a tie
        quantize(*pb)
            .cmp(&quantize(*pa))
            .then(b.score(Dimension::Academic).cmp(&a.score(Dimension::Academic)))
            .then(a.name.cmp(&b.name))
    });

    let results = scored
        .into_iter()
        .enumerate()
        .map(|(index, (school, percentage))| {
            let top_contributors: Vec<DimensionContribution> =
                contributions(school).into_iter().take(2).collect();
            let mut result = MatchResult {
                school: school.clone(),
                match_percentage: percentage,
                rank: index + 1,
                rationale: String::new(),
                top_contributors,
            };
            result.rationale = fallback_rationale(&result);
            result
        })
        .collect();

    Ok(results)
}

fn quantize(percentage: f64) -> i64 {
    (percentage * 1_000.0).round() as i64
}

/// Grounding facts handed to the generator when writing a rationale
pub fn rationale_prompt(result: &MatchResult) -> String {
    let mut prompt = format!(
        "Write a two-sentence recommendation rationale for {} (rank {}, match {:.1}%).\n",
        result.school.name, result.rank, result.match_percentage
    );
    prompt.push_str("Ground the rationale in these contributing dimensions, strongest first:\n");
    for part in &result.top_contributors {
        prompt.push_str(&format!(
            "{}: score {}/5, weight {:.2}, contribution {:.2}\n",
            part.dimension.label(),
            part.score,
            part.weight,
            part.product
        ));
    }

    let facts = &result.school.facts;
    if !facts.signature_programs.is_empty() {
        prompt.push_str(&format!(
            "Signature programs: {}\n",
            facts.signature_programs.join(", ")
        ));
    }
    prompt.push_str("Plain prose only. No lists, no Markdown, no placeholders.");
    prompt
}

/// Deterministic rationale used when generation is unavailable
pub fn fallback_rationale(result: &MatchResult) -> String {
    let mut parts = Vec::new();

    if let Some(first) = result.top_contributors.first() {
        if first.score >= 4 {
            parts.push(format!(
                "{} stands out for {} ({}/5)",
                result.school.name,
                first.dimension.label(),
                first.score
            ));
        } else {
            parts.push(format!(
                "{} is led by {} ({}/5)",
                result.school.name,
                first.dimension.label(),
                first.score
            ));
        }
    }
    if let Some(second) = result.top_contributors.get(1) {
        parts.push(format!(
            "with {} adding {:.2} to the composite",
            second.dimension.label(),
            second.product
        ));
    }

    let total: u32 = result.school.scores.values().map(|s| *s as u32).sum();
    let band = if total >= 16 {
        "an excellent overall fit"
    } else if total >= 12 {
        "a good overall fit"
    } else {
        "a fit with room to grow"
    };

    format!(
        "{}, making it {} at {:.0}%.",
        parts.join(" "),
        band,
        result.match_percentage
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn school(name: &str, scores: [u8; 4]) -> SchoolCandidate {
        SchoolCandidate::new(name)
            .with_weights([0.35, 0.25, 0.2, 0.2])
            .with_scores(scores)
    }

    #[test]
    fn test_scenario_percentage() {
        let ucc = school("Upper Canada College", [5, 4, 5, 4]);
        assert!((match_percentage(&ucc) - 91.0).abs() < 1e-9);
    }

    #[test]
    fn test_boundary_scores() {
        assert!((match_percentage(&school("low", [1, 1, 1, 1])) - 20.0).abs() < 1e-9);
        assert!((match_percentage(&school("high", [5, 5, 5, 5])) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_rank_orders_descending() {
        let results = rank(&[
            school("Havergal", [4, 4, 4, 4]),
            school("UCC", [5, 4, 5, 4]),
            school("SAC", [3, 3, 3, 3]),
        ])
        .unwrap();

        let names: Vec<&str> = results.iter().map(|r| r.school.name.as_str()).collect();
        assert_eq!(names, vec!["UCC", "Havergal", "SAC"]);
        let ranks: Vec<usize> = results.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn test_tie_breaks_on_academic_then_name() {
        // Same composite (4.0 × 20), different academic scores
        let a = SchoolCandidate::new("Alpha")
            .with_weights([0.25, 0.25, 0.25, 0.25])
            .with_scores([3, 5, 4, 4]);
        let b = SchoolCandidate::new("Beta")
            .with_weights([0.25, 0.25, 0.25, 0.25])
            .with_scores([5, 3, 4, 4]);
        let results = rank(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(results[0].school.name, "Beta");

        let c = SchoolCandidate::new("Charlie")
            .with_weights([0.25, 0.25, 0.25, 0.25])
            .with_scores([5, 3, 4, 4]);
        let results = rank(&[c, b]).unwrap();
        assert_eq!(results[0].school.name, "Beta");
        assert_eq!(results[1].school.name, "Charlie");
    }

    #[test]
    fn test_rejects_bad_weights() {
        let bad = SchoolCandidate::new("Bad").with_weights([0.5, 0.5, 0.5, 0.5]);
        assert!(matches!(rank(&[bad]), Err(CounselError::InvalidWeight { .. })));

        let mut missing = SchoolCandidate::new("Missing");
        missing.weights.remove(&Dimension::Culture);
        assert!(matches!(
            rank(&[missing]),
            Err(CounselError::InvalidWeight { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_scores() {
        let zero = SchoolCandidate::new("Zero").with_scores([0, 3, 3, 3]);
        assert!(matches!(rank(&[zero]), Err(CounselError::InvalidScore { .. })));

        let six = SchoolCandidate::new("Six").with_scores([3, 3, 6, 3]);
        assert!(matches!(rank(&[six]), Err(CounselError::InvalidScore { .. })));
    }

    #[test]
    fn test_top_contributors() {
        let ucc = school("UCC", [5, 4, 5, 4]);
        let top: Vec<Dimension> = contributions(&ucc)
            .into_iter()
            .take(2)
            .map(|c| c.dimension)
            .collect();
        // 1.75 academic, then activities and culture tie at 1.0; canonical order wins
        assert_eq!(top, vec![Dimension::Academic, Dimension::Activities]);
    }

    #[test]
    fn test_rationale_prompt_is_grounded() {
        let results = rank(&[school("UCC", [5, 4, 5, 4])]).unwrap();
        let prompt = rationale_prompt(&results[0]);
        assert!(prompt.contains("academic fit: score 5/5"));
        assert!(prompt.contains("activities and resources: score 4/5"));
        assert!(!results[0].rationale.is_empty());
    }

    #[test]
    fn test_with_rationale_leaves_original() {
        let results = rank(&[school("UCC", [5, 4, 5, 4])]).unwrap();
        let updated = results[0].with_rationale("Strong STEM programme.");
        assert_eq!(updated.rationale, "Strong STEM programme.");
        assert_ne!(results[0].rationale, updated.rationale);
        assert_eq!(updated.rank, results[0].rank);
    }

    #[test]
    fn test_deserialize_with_default_weights() {
        let json = r#"{
            "name": "Havergal College",
            "facts": {"type": "girls day/boarding", "location": "Toronto", "class_size": 18},
            "scores": {"academic": 4, "activities": 5, "culture": 4, "personality": 4}
        }"#;
        let candidate: SchoolCandidate = serde_json::from_str(json).unwrap();
        assert_eq!(candidate.weights, default_weights());
        assert_eq!(candidate.facts.class_size, Some(18));
        assert!(candidate.validate().is_ok());
    }
}
