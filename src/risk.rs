//! Deterministic risk analysis for incident reports.
//!
//! Scores free-text report content against a weighted indicator lexicon.
//! The same input always produces the same assessment, and every point in
//! the score is attributable to a matched term or the documented sentiment
//! adjustment, so an assessment can be audited after the fact.
//!
//! Scoring:
//! - each matched indicator term contributes its severity-group weight once;
//! - terms from more than one severity group co-occurring adds
//!   [`ESCALATION_BONUS`];
//! - each negative-sentiment word adds [`SENTIMENT_POINTS_PER_HIT`], capped
//!   at [`SENTIMENT_POINTS_CAP`];
//! - the total is clamped to 0–100 and mapped to a level by the
//!   `*_THRESHOLD` constants.

use serde::{Deserialize, Serialize};

/// Coarse risk level derived from the numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "moderate" => Ok(RiskLevel::Moderate),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            _ => Err(format!("invalid risk level: {s}")),
        }
    }
}

/// Result of analyzing one report body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// 0–100.
    pub score: u8,
    pub level: RiskLevel,
    /// Matched indicator terms, ordered by first occurrence, de-duplicated.
    pub keywords: Vec<String>,
    /// -1.0 (entirely negative) to 0.0 (neutral).
    pub sentiment: f64,
    pub summary: String,
}

/// Score → level thresholds.
pub const CRITICAL_THRESHOLD: u8 = 75;
pub const HIGH_THRESHOLD: u8 = 50;
pub const MODERATE_THRESHOLD: u8 = 25;

/// Added once when matched terms span more than one severity group.
pub const ESCALATION_BONUS: u32 = 10;
pub const SENTIMENT_POINTS_PER_HIT: u32 = 5;
pub const SENTIMENT_POINTS_CAP: u32 = 15;

const CRITICAL_WEIGHT: u32 = 30;
const HIGH_WEIGHT: u32 = 18;
const MODERATE_WEIGHT: u32 = 9;

/// Immediate-danger indicators.  Single words are matched as word stems
/// ("strangl" matches "strangled"); phrases are matched as substrings.
const CRITICAL_TERMS: &[&str] = &[
    "gun",
    "knife",
    "weapon",
    "strangl",
    "chok",
    "kill",
    "suffocat",
    "threatened to kill",
    "going to kill",
];

const HIGH_TERMS: &[&str] = &[
    "hit",
    "punch",
    "beat",
    "kick",
    "slam",
    "bruise",
    "bleed",
    "injur",
    "stalk",
    "followed me",
    "broke in",
    "won't let me leave",
];

const MODERATE_TERMS: &[&str] = &[
    "yell",
    "scream",
    "threat",
    "shove",
    "push",
    "grab",
    "control",
    "isolat",
    "monitor",
    "jealous",
    "took my phone",
];

const NEGATIVE_SENTIMENT_TERMS: &[&str] = &[
    "afraid", "scared", "terrified", "fear", "helpless", "trapped", "hopeless",
    "unsafe", "panic", "desperate",
];

/// Words of the lowercased text with their byte offsets.
///
/// Offsets index the lowercased text, the same string phrase matches search,
/// so positions from both are directly comparable.  Lowercasing can change
/// byte lengths (e.g. 'İ'), which would skew ordering if offsets mixed the
/// original and lowered forms.
fn tokenize(lowered: &str) -> Vec<(usize, String)> {
    let mut words = Vec::new();
    let mut start = None;
    for (i, c) in lowered.char_indices() {
        if c.is_alphanumeric() || c == '\'' {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(s) = start.take() {
            words.push((s, lowered[s..i].to_string()));
        }
    }
    if let Some(s) = start {
        words.push((s, lowered[s..].to_string()));
    }
    words
}

/// First occurrence of `term` in the text, if any.
///
/// Phrases (terms containing a space) match as substrings of the lowercased
/// text; single terms match any word that starts with them.
fn find_term(lowered: &str, words: &[(usize, String)], term: &str) -> Option<usize> {
    if term.contains(' ') {
        lowered.find(term)
    } else {
        words
            .iter()
            .find(|(_, w)| w.starts_with(term))
            .map(|(pos, _)| *pos)
    }
}

/// Analyze report content.  Deterministic: same input, same output.
pub fn analyze(content: &str) -> RiskAssessment {
    let lowered = content.to_lowercase();
    let words = tokenize(&lowered);

    let groups: [(&[&str], u32); 3] = [
        (CRITICAL_TERMS, CRITICAL_WEIGHT),
        (HIGH_TERMS, HIGH_WEIGHT),
        (MODERATE_TERMS, MODERATE_WEIGHT),
    ];

    let mut matched: Vec<(usize, &str)> = Vec::new();
    let mut points: u32 = 0;
    let mut groups_hit = 0u32;
    let mut group_counts = [0u32; 3];

    for (gi, (terms, weight)) in groups.iter().enumerate() {
        let mut hit_in_group = false;
        for term in terms.iter() {
            if let Some(pos) = find_term(&lowered, &words, term) {
                matched.push((pos, term));
                points += weight;
                group_counts[gi] += 1;
                hit_in_group = true;
            }
        }
        if hit_in_group {
            groups_hit += 1;
        }
    }

    if groups_hit > 1 {
        points += ESCALATION_BONUS;
    }

    let negative_hits = NEGATIVE_SENTIMENT_TERMS
        .iter()
        .filter(|t| find_term(&lowered, &words, t).is_some())
        .count() as u32;
    points += (negative_hits * SENTIMENT_POINTS_PER_HIT).min(SENTIMENT_POINTS_CAP);

    let total_words = words.len().max(1);
    let sentiment = -((negative_hits as f64) / (total_words as f64)).min(1.0);

    let score = points.min(100) as u8;
    let level = if score >= CRITICAL_THRESHOLD {
        RiskLevel::Critical
    } else if score >= HIGH_THRESHOLD {
        RiskLevel::High
    } else if score >= MODERATE_THRESHOLD {
        RiskLevel::Moderate
    } else {
        RiskLevel::Low
    };

    matched.sort_by_key(|(pos, _)| *pos);
    let mut keywords: Vec<String> = Vec::new();
    for (_, term) in &matched {
        if !keywords.iter().any(|k| k == term) {
            keywords.push(term.to_string());
        }
    }

    let summary = format!(
        "{} critical, {} high, {} moderate indicator(s); {} negative sentiment term(s)",
        group_counts[0], group_counts[1], group_counts[2], negative_hits
    );

    RiskAssessment {
        score,
        level,
        keywords,
        sentiment,
        summary,
    }
}
