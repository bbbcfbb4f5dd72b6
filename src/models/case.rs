use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::CaseStatus;

/// Field map of one tabular row, keyed by column name. BTreeMap keeps the
/// serialized snapshot byte-stable across runs.
pub type FieldMap = BTreeMap<String, String>;

/// One adverse-drug-reaction case under reconciliation and follow-up.
///
/// Both snapshots are captured at ingestion and replaced wholesale when the
/// same case_id is ingested again. `reference_data` is the sole ground truth
/// for expected answers and risk scoring; patient answers never feed back
/// into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    pub case_id: String,
    pub patient_initials: String,
    pub contact_no: String,
    pub missing_fields: Vec<MissingFieldEntry>,
    pub questions: Vec<FollowUpQuestion>,
    pub reference_data: FieldMap,
    pub reported_data: FieldMap,
    pub status: CaseStatus,
    pub completion_percentage: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One field the reported row failed to provide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingFieldEntry {
    pub field_name: String,
    /// Raw value found in the reported row (empty or whitespace).
    pub reported_value: String,
    /// Value the reference row holds for the same column.
    pub reference_value: String,
}

/// A request for the value of one specific missing field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpQuestion {
    pub field_name: String,
    pub question: String,
    /// Copied from the reference value at creation time.
    pub expected_answer: String,
}
