use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ResponseStatus;

/// One follow-up answer slot. Exactly one row exists per (case_id,
/// field_name) pair; the row moves Pending → Submitted once and never back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientResponse {
    pub id: Uuid,
    pub case_id: String,
    pub field_name: String,
    pub question: String,
    pub expected_answer: String,
    pub patient_answer: Option<String>,
    pub status: ResponseStatus,
    pub responded_at: Option<DateTime<Utc>>,
}

impl PatientResponse {
    /// Fresh pending slot for a newly generated question.
    pub fn pending(case_id: &str, field_name: &str, question: &str, expected_answer: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            case_id: case_id.to_string(),
            field_name: field_name.to_string(),
            question: question.to_string(),
            expected_answer: expected_answer.to_string(),
            patient_answer: None,
            status: ResponseStatus::Pending,
            responded_at: None,
        }
    }
}
