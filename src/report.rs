//! Cross-case reporting — derived, read-only aggregation over persisted
//! workflow state.

use std::str::FromStr;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::StoreError;
use crate::models::enums::RiskTier;

/// One row of the administrative all-patients listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientOverview {
    pub contact_no: String,
    pub patient_initials: String,
    pub case_id: String,
    pub total_questions: i64,
    pub answered: i64,
    pub pending: i64,
    pub completion_percentage: f64,
    pub risk_tier: RiskTier,
}

/// Aggregate statistics across every case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverallSummary {
    pub total_cases: usize,
    pub completed_cases: usize,
    pub pending_cases: usize,
    pub total_questions: i64,
    pub total_answered: i64,
    pub overall_completion_percentage: f64,
    pub high_risk_cases: usize,
    pub medium_risk_cases: usize,
    pub low_risk_cases: usize,
}

/// Every case with live progress, ordered by patient initials.
pub fn all_patients(conn: &Connection) -> Result<Vec<PatientOverview>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT c.contact_no, c.patient_initials, c.case_id,
                COUNT(r.id),
                COALESCE(SUM(CASE WHEN r.status = 'submitted' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN r.status = 'pending' THEN 1 ELSE 0 END), 0),
                a.tier
         FROM cases c
         LEFT JOIN responses r ON r.case_id = c.case_id
         LEFT JOIN assessments a ON a.case_id = c.case_id
         GROUP BY c.case_id, c.patient_initials, c.contact_no, a.tier
         ORDER BY c.patient_initials ASC, c.case_id ASC",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, i64>(5)?,
            row.get::<_, Option<String>>(6)?,
        ))
    })?;

    let mut patients = Vec::new();
    for row in rows {
        let (contact_no, patient_initials, case_id, total, answered, pending, tier) = row?;
        let completion_percentage = if total == 0 {
            0.0
        } else {
            answered as f64 / total as f64 * 100.0
        };
        patients.push(PatientOverview {
            contact_no,
            patient_initials,
            case_id,
            total_questions: total,
            answered,
            pending,
            completion_percentage,
            risk_tier: match tier {
                Some(t) => RiskTier::from_str(&t)?,
                None => RiskTier::NotAssessed,
            },
        });
    }
    Ok(patients)
}

/// Roll the per-case listing up into overall statistics.
pub fn overall_summary(conn: &Connection) -> Result<OverallSummary, StoreError> {
    let patients = all_patients(conn)?;

    let mut summary = OverallSummary {
        total_cases: patients.len(),
        ..Default::default()
    };

    for patient in &patients {
        summary.total_questions += patient.total_questions;
        summary.total_answered += patient.answered;
        if patient.total_questions > 0 && patient.pending == 0 {
            summary.completed_cases += 1;
        }
        match patient.risk_tier {
            RiskTier::HighRisk => summary.high_risk_cases += 1,
            RiskTier::MediumRisk => summary.medium_risk_cases += 1,
            RiskTier::LowRisk => summary.low_risk_cases += 1,
            RiskTier::NotAssessed => {}
        }
    }

    summary.pending_cases = summary.total_cases - summary.completed_cases;
    summary.overall_completion_percentage = if summary.total_questions == 0 {
        0.0
    } else {
        summary.total_answered as f64 / summary.total_questions as f64 * 100.0
    };
    Ok(summary)
}
