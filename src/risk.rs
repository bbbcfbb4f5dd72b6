//! Deterministic weighted risk scorer.
//!
//! A pure function of a case's reference snapshot — patient-submitted text
//! never participates. All applicable rules fire additively; only the
//! hospitalization-outcome rule is skipped when the fatal-outcome rule
//! already matched, and the two age rules are mutually exclusive.

use serde::{Deserialize, Serialize};

use crate::models::enums::RiskTier;
use crate::models::FieldMap;
use crate::reconcile::columns;

/// Reaction-description substrings scoring +3 each.
pub const HIGH_RISK_REACTIONS: &[&str] = &[
    "fatal",
    "death",
    "anaphylaxis",
    "severe",
    "life threatening",
    "hospitalization",
    "disability",
    "congenital anomaly",
    "cardiac",
    "respiratory failure",
    "liver failure",
    "kidney failure",
    "shock",
];

/// Suspect-drug substrings scoring +2 each.
pub const HIGH_RISK_DRUGS: &[&str] = &[
    "warfarin",
    "insulin",
    "digoxin",
    "lithium",
    "chemotherapy",
    "immunosuppressant",
    "steroid",
    "anticoagulant",
];

/// Score at or above which a case is HIGH_RISK.
pub const HIGH_RISK_THRESHOLD: i64 = 5;
/// Score at or above which a case is MEDIUM_RISK.
pub const MEDIUM_RISK_THRESHOLD: i64 = 3;

/// Outcome of one classification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskScore {
    pub tier: RiskTier,
    pub score: i64,
    pub rationale: Vec<String>,
}

/// Classify a case's reference snapshot.
///
/// Deterministic: identical snapshots always produce identical score, tier,
/// and rationale ordering. An unparseable age counts as 0 and receives
/// neither age bonus, so the pediatric rule requires a parsed age strictly
/// between 0 and 18.
pub fn classify(reference: &FieldMap) -> RiskScore {
    let get_lower =
        |column: &str| reference.get(column).map(|v| v.to_lowercase()).unwrap_or_default();

    let reaction = get_lower(columns::REACTION);
    let outcome = get_lower(columns::OUTCOME);
    let serious = get_lower(columns::SERIOUS);
    let suspect_drug = get_lower(columns::SUSPECT_DRUG);
    let age = parse_age(reference.get(columns::AGE).map(String::as_str).unwrap_or(""));

    let mut score: i64 = 0;
    let mut rationale = Vec::new();

    for indicator in HIGH_RISK_REACTIONS {
        if reaction.contains(indicator) {
            score += 3;
            rationale.push(format!("High-risk reaction: '{indicator}'"));
        }
    }

    for drug in HIGH_RISK_DRUGS {
        if suspect_drug.contains(drug) {
            score += 2;
            rationale.push(format!("High-risk drug: '{drug}'"));
        }
    }

    if outcome.contains("fatal") || outcome.contains("death") {
        score += 4;
        rationale.push("Fatal outcome".to_string());
    } else if outcome.contains("hospitaliz") {
        score += 2;
        rationale.push("Hospitalization required".to_string());
    }

    if serious == "y" {
        score += 2;
        rationale.push("Marked as serious".to_string());
    }

    if age > 65.0 {
        score += 1;
        rationale.push("Elderly patient (>65)".to_string());
    } else if age > 0.0 && age < 18.0 {
        score += 1;
        rationale.push("Pediatric patient (<18)".to_string());
    }

    let tier = if score >= HIGH_RISK_THRESHOLD {
        RiskTier::HighRisk
    } else if score >= MEDIUM_RISK_THRESHOLD {
        RiskTier::MediumRisk
    } else {
        RiskTier::LowRisk
    };

    if rationale.is_empty() {
        rationale.push("No significant risk factors identified".to_string());
    }

    RiskScore { tier, score, rationale }
}

/// Age parse failure is treated as age 0, so neither age bonus applies.
fn parse_age(raw: &str) -> f64 {
    raw.trim().parse::<f64>().unwrap_or(0.0)
}
