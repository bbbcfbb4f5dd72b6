use std::str::FromStr;

use rusqlite::{params, Connection};

use crate::db::StoreError;
use crate::models::enums::RiskTier;
use crate::models::RiskAssessment;

use super::case::{from_json, parse_timestamp, to_json};

/// Write the assessment for a case, overwriting any previous one. The
/// classifier is a pure function of the reference snapshot, so an overwrite
/// on re-completion stores an identical result.
pub fn upsert_assessment(conn: &Connection, assessment: &RiskAssessment) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO assessments (case_id, tier, score, rationale, assessed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(case_id) DO UPDATE SET
             tier = excluded.tier,
             score = excluded.score,
             rationale = excluded.rationale,
             assessed_at = excluded.assessed_at",
        params![
            assessment.case_id,
            assessment.tier.as_str(),
            assessment.score,
            to_json("rationale", &assessment.rationale)?,
            assessment.assessed_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_assessment(conn: &Connection, case_id: &str) -> Result<Option<RiskAssessment>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT case_id, tier, score, rationale, assessed_at FROM assessments WHERE case_id = ?1",
    )?;

    let result = stmt.query_row(params![case_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    });

    match result {
        Ok((case_id, tier, score, rationale, assessed_at)) => Ok(Some(RiskAssessment {
            case_id,
            tier: RiskTier::from_str(&tier)?,
            score,
            rationale: from_json("rationale", &rationale)?,
            assessed_at: parse_timestamp(&assessed_at),
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
