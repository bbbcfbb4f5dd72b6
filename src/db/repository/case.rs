use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::db::StoreError;
use crate::models::enums::CaseStatus;
use crate::models::{CaseRecord, FieldMap, FollowUpQuestion, MissingFieldEntry};

/// Insert a new case aggregate, or replace the stored snapshots and question
/// list when the case_id already exists. Re-ingestion resets status to
/// pending and completion to 0; created_at is preserved on update.
pub fn upsert_case(conn: &Connection, case: &CaseRecord) -> Result<(), StoreError> {
    let exists: bool = conn
        .query_row(
            "SELECT 1 FROM cases WHERE case_id = ?1",
            params![case.case_id],
            |_| Ok(()),
        )
        .map(|_| true)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(false),
            other => Err(other),
        })?;

    if exists {
        conn.execute(
            "UPDATE cases SET patient_initials = ?2, contact_no = ?3, missing_fields = ?4,
             questions = ?5, reference_data = ?6, reported_data = ?7,
             status = 'pending', completion_percentage = 0, updated_at = ?8
             WHERE case_id = ?1",
            params![
                case.case_id,
                case.patient_initials,
                case.contact_no,
                to_json("missing_fields", &case.missing_fields)?,
                to_json("questions", &case.questions)?,
                to_json("reference_data", &case.reference_data)?,
                to_json("reported_data", &case.reported_data)?,
                case.updated_at.to_rfc3339(),
            ],
        )?;
    } else {
        conn.execute(
            "INSERT INTO cases (case_id, patient_initials, contact_no, missing_fields, questions,
             reference_data, reported_data, status, completion_percentage, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', 0, ?8, ?9)",
            params![
                case.case_id,
                case.patient_initials,
                case.contact_no,
                to_json("missing_fields", &case.missing_fields)?,
                to_json("questions", &case.questions)?,
                to_json("reference_data", &case.reference_data)?,
                to_json("reported_data", &case.reported_data)?,
                case.created_at.to_rfc3339(),
                case.updated_at.to_rfc3339(),
            ],
        )?;
    }
    Ok(())
}

pub fn get_case(conn: &Connection, case_id: &str) -> Result<Option<CaseRecord>, StoreError> {
    query_one_case(conn, "SELECT case_id, patient_initials, contact_no, missing_fields, questions,
         reference_data, reported_data, status, completion_percentage, created_at, updated_at
         FROM cases WHERE case_id = ?1", case_id)
}

/// Lookup by the patient-facing contact identifier (PHN).
pub fn get_case_by_contact(conn: &Connection, contact_no: &str) -> Result<Option<CaseRecord>, StoreError> {
    query_one_case(conn, "SELECT case_id, patient_initials, contact_no, missing_fields, questions,
         reference_data, reported_data, status, completion_percentage, created_at, updated_at
         FROM cases WHERE contact_no = ?1 ORDER BY case_id LIMIT 1", contact_no)
}

/// Persist recomputed progress metadata. The stored values are display
/// metadata only; live progress always comes from aggregating responses.
pub fn set_case_progress(
    conn: &Connection,
    case_id: &str,
    completion_percentage: f64,
    status: CaseStatus,
) -> Result<(), StoreError> {
    let changed = conn.execute(
        "UPDATE cases SET completion_percentage = ?2, status = ?3, updated_at = ?4
         WHERE case_id = ?1",
        params![
            case_id,
            completion_percentage,
            status.as_str(),
            Utc::now().to_rfc3339(),
        ],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound {
            entity_type: "Case".into(),
            id: case_id.into(),
        });
    }
    Ok(())
}

fn query_one_case(conn: &Connection, sql: &str, key: &str) -> Result<Option<CaseRecord>, StoreError> {
    let mut stmt = conn.prepare(sql)?;

    let result = stmt.query_row(params![key], |row| {
        Ok(CaseRow {
            case_id: row.get(0)?,
            patient_initials: row.get(1)?,
            contact_no: row.get(2)?,
            missing_fields: row.get(3)?,
            questions: row.get(4)?,
            reference_data: row.get(5)?,
            reported_data: row.get(6)?,
            status: row.get(7)?,
            completion_percentage: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    });

    match result {
        Ok(row) => Ok(Some(case_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

struct CaseRow {
    case_id: String,
    patient_initials: String,
    contact_no: String,
    missing_fields: String,
    questions: String,
    reference_data: String,
    reported_data: String,
    status: String,
    completion_percentage: f64,
    created_at: String,
    updated_at: String,
}

fn case_from_row(row: CaseRow) -> Result<CaseRecord, StoreError> {
    Ok(CaseRecord {
        case_id: row.case_id,
        patient_initials: row.patient_initials,
        contact_no: row.contact_no,
        missing_fields: from_json::<Vec<MissingFieldEntry>>("missing_fields", &row.missing_fields)?,
        questions: from_json::<Vec<FollowUpQuestion>>("questions", &row.questions)?,
        reference_data: from_json::<FieldMap>("reference_data", &row.reference_data)?,
        reported_data: from_json::<FieldMap>("reported_data", &row.reported_data)?,
        status: CaseStatus::from_str(&row.status)?,
        completion_percentage: row.completion_percentage,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    })
}

pub(crate) fn to_json<T: serde::Serialize>(column: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::MalformedJson {
        column: column.into(),
        reason: e.to_string(),
    })
}

pub(crate) fn from_json<T: serde::de::DeserializeOwned>(
    column: &str,
    raw: &str,
) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::MalformedJson {
        column: column.into(),
        reason: e.to_string(),
    })
}

pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_default()
}
