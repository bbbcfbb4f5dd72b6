use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::StoreError;
use crate::models::enums::ResponseStatus;
use crate::models::PatientResponse;

use super::case::parse_timestamp;

/// Aggregated answer counts for one case, always computed live from the
/// responses table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaseProgress {
    pub total: i64,
    pub answered: i64,
    pub pending: i64,
}

impl CaseProgress {
    /// answered/total×100, with an empty question set defined as 0%.
    pub fn completion_percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.answered as f64 / self.total as f64 * 100.0
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.pending == 0
    }
}

/// Create the response row for (case_id, field_name) only if none exists.
/// An existing row — answered or not — is left untouched, so re-ingestion
/// never discards submitted answers. Returns whether a row was inserted.
pub fn ensure_response(conn: &Connection, resp: &PatientResponse) -> Result<bool, StoreError> {
    let inserted = conn.execute(
        "INSERT INTO responses (id, case_id, field_name, question, expected_answer,
         patient_answer, status, responded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, NULL, 'pending', NULL)
         ON CONFLICT(case_id, field_name) DO NOTHING",
        params![
            resp.id.to_string(),
            resp.case_id,
            resp.field_name,
            resp.question,
            resp.expected_answer,
        ],
    )?;
    Ok(inserted > 0)
}

pub fn get_response(conn: &Connection, id: &Uuid) -> Result<Option<PatientResponse>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, case_id, field_name, question, expected_answer, patient_answer, status, responded_at
         FROM responses WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id.to_string()], response_row);

    match result {
        Ok(row) => Ok(Some(response_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Pending responses for one case, ordered by field name ascending. The id
/// tiebreak keeps the order stable should two rows ever share a field name
/// prefix collation.
pub fn pending_responses_for_case(
    conn: &Connection,
    case_id: &str,
) -> Result<Vec<PatientResponse>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, case_id, field_name, question, expected_answer, patient_answer, status, responded_at
         FROM responses WHERE case_id = ?1 AND status = 'pending'
         ORDER BY field_name ASC, id ASC",
    )?;

    let rows = stmt.query_map(params![case_id], response_row)?;

    let mut responses = Vec::new();
    for row in rows {
        responses.push(response_from_row(row?)?);
    }
    Ok(responses)
}

/// Record a submitted answer: Pending → Submitted, terminal for the row.
/// Returns the case_id of the updated row, or NotFound if the id does not
/// resolve.
pub fn record_answer(
    conn: &Connection,
    id: &Uuid,
    answer: &str,
    responded_at: DateTime<Utc>,
) -> Result<String, StoreError> {
    let case_id: String = conn
        .query_row(
            "SELECT case_id FROM responses WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Err(StoreError::NotFound {
                entity_type: "PatientResponse".into(),
                id: id.to_string(),
            }),
            other => Err(other.into()),
        })?;

    conn.execute(
        "UPDATE responses SET patient_answer = ?2, status = 'submitted', responded_at = ?3
         WHERE id = ?1",
        params![id.to_string(), answer, responded_at.to_rfc3339()],
    )?;
    Ok(case_id)
}

/// Live progress aggregate for one case.
pub fn case_progress(conn: &Connection, case_id: &str) -> Result<CaseProgress, StoreError> {
    let progress = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'submitted' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0)
         FROM responses WHERE case_id = ?1",
        params![case_id],
        |row| {
            Ok(CaseProgress {
                total: row.get(0)?,
                answered: row.get(1)?,
                pending: row.get(2)?,
            })
        },
    )?;
    Ok(progress)
}

struct ResponseRow {
    id: String,
    case_id: String,
    field_name: String,
    question: String,
    expected_answer: String,
    patient_answer: Option<String>,
    status: String,
    responded_at: Option<String>,
}

fn response_row(row: &rusqlite::Row<'_>) -> Result<ResponseRow, rusqlite::Error> {
    Ok(ResponseRow {
        id: row.get(0)?,
        case_id: row.get(1)?,
        field_name: row.get(2)?,
        question: row.get(3)?,
        expected_answer: row.get(4)?,
        patient_answer: row.get(5)?,
        status: row.get(6)?,
        responded_at: row.get(7)?,
    })
}

fn response_from_row(row: ResponseRow) -> Result<PatientResponse, StoreError> {
    Ok(PatientResponse {
        id: Uuid::parse_str(&row.id).map_err(|e| StoreError::MalformedJson {
            column: "responses.id".into(),
            reason: e.to_string(),
        })?,
        case_id: row.case_id,
        field_name: row.field_name,
        question: row.question,
        expected_answer: row.expected_answer,
        patient_answer: row.patient_answer,
        status: ResponseStatus::from_str(&row.status)?,
        responded_at: row.responded_at.as_deref().map(parse_timestamp),
    })
}
