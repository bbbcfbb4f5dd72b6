use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::RiskTier;

/// Deterministic risk classification of one case's reference snapshot.
///
/// Written only by the workflow completion transition. Recomputation on an
/// already-completed case overwrites with an identical result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub case_id: String,
    pub tier: RiskTier,
    pub score: i64,
    /// Human-readable strings for every rule that fired, in rule order.
    pub rationale: Vec<String>,
    pub assessed_at: DateTime<Utc>,
}
