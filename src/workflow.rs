//! Follow-up workflow state machine — patient-facing operations over the
//! persisted case aggregates.
//!
//! Per-response lifecycle: Pending → Submitted, terminal. Progress is always
//! aggregated live from response rows, never read from the cached case
//! metadata. When a submission drives the pending count to zero, the risk
//! classifier runs synchronously inside the same case-scoped transaction and
//! its result is persisted before the call returns.

use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::db::repository::{
    case_progress, get_assessment, get_case, get_case_by_contact, pending_responses_for_case,
    record_answer, set_case_progress, upsert_assessment, CaseProgress,
};
use crate::db::StoreError;
use crate::models::enums::{CaseStatus, RiskTier};
use crate::models::{PatientResponse, RiskAssessment};
use crate::risk;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("No patient found for contact {0}")]
    PatientNotFound(String),

    #[error("No response found with id {0}")]
    ResponseNotFound(Uuid),

    #[error("Answer text must not be empty")]
    EmptyAnswer,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Live view of one case for the portal: identity, progress, and the stored
/// assessment if the workflow has completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSummary {
    pub case_id: String,
    pub patient_initials: String,
    pub contact_no: String,
    pub total_questions: i64,
    pub answered: i64,
    pub pending: i64,
    pub completion_percentage: f64,
    pub risk_tier: RiskTier,
    pub assessment: Option<RiskAssessment>,
}

/// Result of one answer submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub response_id: Uuid,
    pub case_id: String,
    pub total_questions: i64,
    pub answered: i64,
    pub pending: i64,
    pub completion_percentage: f64,
    pub completed: bool,
    /// Present exactly when this submission completed the case (or the case
    /// was already complete and the result was idempotently recomputed).
    pub assessment: Option<RiskAssessment>,
}

/// Login-by-contact: resolve a patient's case and report live progress.
pub fn lookup(conn: &Connection, contact_no: &str) -> Result<CaseSummary, WorkflowError> {
    let case = get_case_by_contact(conn, contact_no)?
        .ok_or_else(|| WorkflowError::PatientNotFound(contact_no.to_string()))?;
    summarize(conn, &case.case_id)
}

/// Live summary for a known case id.
pub fn summarize(conn: &Connection, case_id: &str) -> Result<CaseSummary, WorkflowError> {
    let case = get_case(conn, case_id)?.ok_or_else(|| WorkflowError::PatientNotFound(case_id.to_string()))?;
    let progress = case_progress(conn, case_id)?;
    let assessment = get_assessment(conn, case_id)?;

    Ok(CaseSummary {
        case_id: case.case_id,
        patient_initials: case.patient_initials,
        contact_no: case.contact_no,
        total_questions: progress.total,
        answered: progress.answered,
        pending: progress.pending,
        completion_percentage: progress.completion_percentage(),
        risk_tier: assessment.as_ref().map(|a| a.tier).unwrap_or(RiskTier::NotAssessed),
        assessment,
    })
}

/// Pending questions for a patient, ordered by field name ascending.
pub fn pending_questions(
    conn: &Connection,
    contact_no: &str,
) -> Result<Vec<PatientResponse>, WorkflowError> {
    let case = get_case_by_contact(conn, contact_no)?
        .ok_or_else(|| WorkflowError::PatientNotFound(contact_no.to_string()))?;
    Ok(pending_responses_for_case(conn, &case.case_id)?)
}

/// Record a patient's answer for one response row.
///
/// Fails with [`WorkflowError::ResponseNotFound`] without mutating anything
/// when the id does not resolve, and rejects empty answer text — only
/// completeness is checked, never correctness. The whole record-answer,
/// recompute-progress, conditionally-classify sequence runs in one IMMEDIATE
/// transaction, so concurrent submissions against the same case serialize
/// and the classifier never sees intermediate state.
pub fn submit_answer(
    conn: &mut Connection,
    response_id: &Uuid,
    answer: &str,
) -> Result<SubmissionOutcome, WorkflowError> {
    if answer.trim().is_empty() {
        return Err(WorkflowError::EmptyAnswer);
    }

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(StoreError::from)?;

    let case_id = match record_answer(&tx, response_id, answer, Utc::now()) {
        Ok(case_id) => case_id,
        Err(StoreError::NotFound { .. }) => {
            return Err(WorkflowError::ResponseNotFound(*response_id));
        }
        Err(e) => return Err(e.into()),
    };

    let progress = case_progress(&tx, &case_id)?;
    let completed = progress.is_complete();

    let assessment = if completed {
        Some(classify_case(&tx, &case_id, &progress)?)
    } else {
        set_case_progress(
            &tx,
            &case_id,
            progress.completion_percentage(),
            CaseStatus::Pending,
        )?;
        None
    };

    tx.commit().map_err(StoreError::from)?;

    if let Some(a) = &assessment {
        tracing::info!(
            case_id = %case_id,
            tier = a.tier.as_str(),
            score = a.score,
            "Case completed, risk assessment stored"
        );
    }

    Ok(SubmissionOutcome {
        response_id: *response_id,
        case_id,
        total_questions: progress.total,
        answered: progress.answered,
        pending: progress.pending,
        completion_percentage: progress.completion_percentage(),
        completed,
        assessment,
    })
}

/// Run the classifier over the case's reference snapshot and persist the
/// result. Pure function of the snapshot, so recomputation on an already
/// completed case overwrites with an identical assessment.
fn classify_case(
    conn: &Connection,
    case_id: &str,
    progress: &CaseProgress,
) -> Result<RiskAssessment, StoreError> {
    let case = get_case(conn, case_id)?.ok_or_else(|| StoreError::NotFound {
        entity_type: "Case".into(),
        id: case_id.into(),
    })?;

    let scored = risk::classify(&case.reference_data);
    let assessment = RiskAssessment {
        case_id: case_id.to_string(),
        tier: scored.tier,
        score: scored.score,
        rationale: scored.rationale,
        assessed_at: Utc::now(),
    };
    upsert_assessment(conn, &assessment)?;
    set_case_progress(conn, case_id, progress.completion_percentage(), CaseStatus::Completed)?;
    Ok(assessment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::ingest::run_ingestion;
    use crate::questions::TemplateQuestionSource;
    use crate::reconcile::{columns, Dataset};

    /// Reference row is deliberately risky: serious(+2) + elderly(+1) = 3.
    fn ingest_one_case(conn: &mut Connection) {
        let cols = vec![
            columns::CASE_ID,
            columns::CONTACT_NO,
            columns::PATIENT_INITIALS,
            columns::AGE,
            columns::OUTCOME,
            columns::SERIOUS,
        ];
        let mut reference = Dataset::new(cols.clone());
        reference.push_row(vec![
            (columns::CASE_ID, "C-100"),
            (columns::CONTACT_NO, "555-0001"),
            (columns::PATIENT_INITIALS, "AB"),
            (columns::AGE, "70"),
            (columns::OUTCOME, "Recovered"),
            (columns::SERIOUS, "Y"),
        ]);
        let mut reported = Dataset::new(cols);
        reported.push_row(vec![
            (columns::CASE_ID, "C-100"),
            (columns::CONTACT_NO, "555-0001"),
            (columns::PATIENT_INITIALS, "AB"),
            (columns::AGE, "70"),
            (columns::OUTCOME, ""),
            (columns::SERIOUS, ""),
        ]);

        let source = TemplateQuestionSource::new();
        run_ingestion(conn, &source, "en", &reference, &reported).unwrap();
    }

    #[test]
    fn lookup_reports_live_progress() {
        let mut conn = open_memory_database().unwrap();
        ingest_one_case(&mut conn);

        let summary = lookup(&conn, "555-0001").unwrap();
        assert_eq!(summary.case_id, "C-100");
        assert_eq!(summary.total_questions, 2);
        assert_eq!(summary.pending, 2);
        assert_eq!(summary.completion_percentage, 0.0);
        assert_eq!(summary.risk_tier, RiskTier::NotAssessed);
        assert!(summary.assessment.is_none());
    }

    #[test]
    fn lookup_unknown_contact_fails() {
        let conn = open_memory_database().unwrap();
        let err = lookup(&conn, "000").unwrap_err();
        assert!(matches!(err, WorkflowError::PatientNotFound(_)));
    }

    #[test]
    fn pending_questions_ordered_by_field() {
        let mut conn = open_memory_database().unwrap();
        ingest_one_case(&mut conn);

        let pending = pending_questions(&conn, "555-0001").unwrap();
        let fields: Vec<&str> = pending.iter().map(|r| r.field_name.as_str()).collect();
        assert_eq!(fields, vec![columns::OUTCOME, columns::SERIOUS]);
    }

    #[test]
    fn submit_unknown_response_mutates_nothing() {
        let mut conn = open_memory_database().unwrap();
        ingest_one_case(&mut conn);

        let err = submit_answer(&mut conn, &Uuid::new_v4(), "whatever").unwrap_err();
        assert!(matches!(err, WorkflowError::ResponseNotFound(_)));

        let summary = lookup(&conn, "555-0001").unwrap();
        assert_eq!(summary.answered, 0);
    }

    #[test]
    fn empty_answer_rejected() {
        let mut conn = open_memory_database().unwrap();
        ingest_one_case(&mut conn);
        let pending = pending_questions(&conn, "555-0001").unwrap();

        let err = submit_answer(&mut conn, &pending[0].id, "   ").unwrap_err();
        assert!(matches!(err, WorkflowError::EmptyAnswer));
        assert_eq!(lookup(&conn, "555-0001").unwrap().answered, 0);
    }

    #[test]
    fn answers_are_accepted_without_correctness_check() {
        let mut conn = open_memory_database().unwrap();
        ingest_one_case(&mut conn);
        let pending = pending_questions(&conn, "555-0001").unwrap();

        // Wrong on purpose; submission is data collection, not a quiz
        let outcome = submit_answer(&mut conn, &pending[0].id, "not the expected value").unwrap();
        assert_eq!(outcome.answered, 1);
        assert_eq!(outcome.completion_percentage, 50.0);
        assert!(!outcome.completed);
        assert!(outcome.assessment.is_none());
    }

    #[test]
    fn last_answer_completes_and_classifies_once() {
        let mut conn = open_memory_database().unwrap();
        ingest_one_case(&mut conn);
        let pending = pending_questions(&conn, "555-0001").unwrap();

        submit_answer(&mut conn, &pending[0].id, "Recovered").unwrap();
        let last = submit_answer(&mut conn, &pending[1].id, "Y").unwrap();

        assert!(last.completed);
        assert_eq!(last.completion_percentage, 100.0);
        let assessment = last.assessment.unwrap();
        // serious(+2) + elderly(+1) = 3 → MEDIUM
        assert_eq!(assessment.score, 3);
        assert_eq!(assessment.tier, RiskTier::MediumRisk);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM assessments", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);

        let summary = lookup(&conn, "555-0001").unwrap();
        assert_eq!(summary.risk_tier, RiskTier::MediumRisk);
        assert_eq!(summary.completion_percentage, 100.0);
    }

    #[test]
    fn resubmission_after_completion_is_idempotent() {
        let mut conn = open_memory_database().unwrap();
        ingest_one_case(&mut conn);
        let pending = pending_questions(&conn, "555-0001").unwrap();
        submit_answer(&mut conn, &pending[0].id, "Recovered").unwrap();
        let first = submit_answer(&mut conn, &pending[1].id, "Y").unwrap();

        let again = submit_answer(&mut conn, &pending[1].id, "Y").unwrap();
        assert!(again.completed);
        assert_eq!(again.completion_percentage, 100.0);

        let a = first.assessment.unwrap();
        let b = again.assessment.unwrap();
        assert_eq!(a.tier, b.tier);
        assert_eq!(a.score, b.score);
        assert_eq!(a.rationale, b.rationale);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM assessments", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1, "overwritten, not duplicated");
    }
}
