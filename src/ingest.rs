//! Ingestion orchestration: reconcile the two datasets, generate question
//! text, and persist one case aggregate plus its response rows per matched
//! row.
//!
//! The external question call is finished (and its failure absorbed) before
//! the first database write, so ingestion never fails because the remote
//! capability is unreachable. All writes belonging to one case commit as a
//! single transaction — a failure rolls back the whole case, never leaving
//! orphaned question or response rows.

use chrono::Utc;
use rusqlite::Connection;
use thiserror::Error;
use tracing;

use crate::db::repository::{ensure_response, upsert_case};
use crate::db::StoreError;
use crate::models::enums::CaseStatus;
use crate::models::{CaseRecord, PatientResponse};
use crate::questions::QuestionSource;
use crate::reconcile::{Dataset, ReconciliationEngine, ReconciliationResult, UnmatchedRow};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What one ingestion run did.
#[derive(Debug, Clone, Default)]
pub struct IngestionReport {
    pub cases_stored: usize,
    pub questions_generated: usize,
    /// Response rows newly created; fields already carrying a row (answered
    /// or not) are preserved untouched.
    pub responses_created: usize,
    pub unmatched: Vec<UnmatchedRow>,
}

/// Full ingestion run: reconcile, generate questions, persist.
pub fn run_ingestion(
    conn: &mut Connection,
    source: &dyn QuestionSource,
    language: &str,
    reference: &Dataset,
    reported: &Dataset,
) -> Result<IngestionReport, IngestError> {
    let engine = ReconciliationEngine::new(source, language);
    let reconciled = engine.reconcile(reference, reported);

    let mut report = store_results(conn, &reconciled.results)?;
    report.unmatched = reconciled.warnings;

    tracing::info!(
        cases = report.cases_stored,
        questions = report.questions_generated,
        new_responses = report.responses_created,
        unmatched = report.unmatched.len(),
        "Ingestion run complete"
    );
    Ok(report)
}

/// Persist reconciliation results, one transaction per case.
pub fn store_results(
    conn: &mut Connection,
    results: &[ReconciliationResult],
) -> Result<IngestionReport, IngestError> {
    let mut report = IngestionReport::default();

    for result in results {
        let tx = conn.transaction().map_err(StoreError::from)?;

        let now = Utc::now();
        let case = CaseRecord {
            case_id: result.case_id.clone(),
            patient_initials: result.patient_initials.clone(),
            contact_no: result.contact_no.clone(),
            missing_fields: result.missing_fields.clone(),
            questions: result.questions.clone(),
            reference_data: result.reference_data.clone(),
            reported_data: result.reported_data.clone(),
            status: CaseStatus::Pending,
            completion_percentage: 0.0,
            created_at: now,
            updated_at: now,
        };
        upsert_case(&tx, &case)?;

        for question in &result.questions {
            let response = PatientResponse::pending(
                &result.case_id,
                &question.field_name,
                &question.question,
                &question.expected_answer,
            );
            if ensure_response(&tx, &response)? {
                report.responses_created += 1;
            }
        }

        tx.commit().map_err(StoreError::from)?;
        report.cases_stored += 1;
        report.questions_generated += result.questions.len();
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::db::repository::{
        case_progress, get_case, pending_responses_for_case, record_answer,
    };
    use crate::db::open_memory_database;
    use crate::questions::TemplateQuestionSource;
    use crate::reconcile::columns;

    fn datasets() -> (Dataset, Dataset) {
        let cols = vec![
            columns::CASE_ID,
            columns::CONTACT_NO,
            columns::PATIENT_INITIALS,
            columns::OUTCOME,
            columns::SERIOUS,
        ];
        let mut reference = Dataset::new(cols.clone());
        reference.push_row(vec![
            (columns::CASE_ID, "C-100"),
            (columns::CONTACT_NO, "555-0001"),
            (columns::PATIENT_INITIALS, "AB"),
            (columns::OUTCOME, "Recovered"),
            (columns::SERIOUS, "N"),
        ]);

        let mut reported = Dataset::new(cols);
        reported.push_row(vec![
            (columns::CASE_ID, "C-100"),
            (columns::CONTACT_NO, "555-0001"),
            (columns::PATIENT_INITIALS, "AB"),
            (columns::OUTCOME, ""),
            (columns::SERIOUS, ""),
        ]);
        (reference, reported)
    }

    #[test]
    fn ingestion_persists_case_and_responses() {
        let mut conn = open_memory_database().unwrap();
        let (reference, reported) = datasets();
        let source = TemplateQuestionSource::new();

        let report = run_ingestion(&mut conn, &source, "en", &reference, &reported).unwrap();
        assert_eq!(report.cases_stored, 1);
        assert_eq!(report.questions_generated, 2);
        assert_eq!(report.responses_created, 2);
        assert!(report.unmatched.is_empty());

        let case = get_case(&conn, "C-100").unwrap().unwrap();
        assert_eq!(case.questions.len(), 2);
        assert_eq!(case.status, CaseStatus::Pending);

        let pending = pending_responses_for_case(&conn, "C-100").unwrap();
        assert_eq!(pending.len(), 2);
    }

    #[test]
    fn reingestion_creates_no_duplicate_rows() {
        let mut conn = open_memory_database().unwrap();
        let (reference, reported) = datasets();
        let source = TemplateQuestionSource::new();

        run_ingestion(&mut conn, &source, "en", &reference, &reported).unwrap();
        let second = run_ingestion(&mut conn, &source, "en", &reference, &reported).unwrap();

        assert_eq!(second.cases_stored, 1);
        assert_eq!(second.responses_created, 0);
        assert_eq!(case_progress(&conn, "C-100").unwrap().total, 2);
    }

    #[test]
    fn reingestion_preserves_submitted_answers() {
        let mut conn = open_memory_database().unwrap();
        let (reference, reported) = datasets();
        let source = TemplateQuestionSource::new();

        run_ingestion(&mut conn, &source, "en", &reference, &reported).unwrap();
        let pending = pending_responses_for_case(&conn, "C-100").unwrap();
        record_answer(&conn, &pending[0].id, "Recovered", Utc::now()).unwrap();

        run_ingestion(&mut conn, &source, "en", &reference, &reported).unwrap();

        let progress = case_progress(&conn, "C-100").unwrap();
        assert_eq!(progress.answered, 1);
        assert_eq!(progress.pending, 1);
        // The case metadata was reset but live progress keeps the answer
        let case = get_case(&conn, "C-100").unwrap().unwrap();
        assert_eq!(case.status, CaseStatus::Pending);
        assert_eq!(case.completion_percentage, 0.0);
        assert_eq!(progress.completion_percentage(), 50.0);
    }

    #[test]
    fn unmatched_rows_surface_in_report() {
        let mut conn = open_memory_database().unwrap();
        let (reference, mut reported) = datasets();
        reported.push_row(vec![
            (columns::CASE_ID, "C-404"),
            (columns::CONTACT_NO, "555-0404"),
        ]);
        let source = TemplateQuestionSource::new();

        let report = run_ingestion(&mut conn, &source, "en", &reference, &reported).unwrap();
        assert_eq!(report.cases_stored, 1);
        assert_eq!(report.unmatched.len(), 1);
        assert_eq!(report.unmatched[0].case_id, "C-404");
    }
}
