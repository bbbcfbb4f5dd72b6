//! Reconciliation engine — matches reference case rows against incomplete
//! patient-reported rows and derives the missing-field diff per case.
//!
//! Matching is key-based only: a reported row pairs with the first reference
//! row sharing its case id OR contact number. Unmatched rows are recorded as
//! warnings and skipped; the batch always continues. Identical inputs always
//! produce identical diffs — rows are walked in order and columns in the
//! dataset's declared column order.

use serde::{Deserialize, Serialize};

use crate::models::{FieldMap, FollowUpQuestion, MissingFieldEntry};
use crate::questions::{resolve_questions, QuestionSource};

/// Column names of the adverse-drug-reaction ingestion format. Matched as
/// literal strings against dataset columns, never inferred by type.
pub mod columns {
    pub const CASE_ID: &str = "Case ID";
    pub const CONTACT_NO: &str = "Contact no";
    pub const PATIENT_INITIALS: &str = "Patient Initials";
    pub const AGE: &str = "Age (years)";
    pub const SEX: &str = "Sex";
    pub const REACTION: &str = "Describe Reaction(s)";
    pub const REACTION_ONSET: &str = "Reaction Onset Date";
    pub const SUSPECT_DRUG: &str = "Suspect Drug";
    pub const OUTCOME: &str = "Outcome";
    pub const SERIOUS: &str = "Serious (Y/N)";
    pub const DAILY_DOSE: &str = "Daily Dose";
    pub const INDICATION: &str = "Indication";
    pub const THERAPY_START: &str = "Therapy Start Date";
    pub const THERAPY_END: &str = "Therapy End Date";
    pub const THERAPY_DURATION: &str = "Therapy Duration";
    pub const ABATED_AFTER_STOPPING: &str = "Abated After Stopping";
    pub const RECHALLENGE: &str = "Rechallenge Result";
    pub const CONCOMITANT_DRUG_1: &str = "Concomitant Drug 1";
    pub const CONCOMITANT_DRUG_2: &str = "Concomitant Drug 2";
    pub const MEDICAL_HISTORY: &str = "Medical History";
}

/// An in-memory tabular dataset. Construction from Excel/CSV uploads is the
/// ingestion collaborator's job; the engine only sees columns and rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    /// Declared column order; drives deterministic diff iteration.
    pub columns: Vec<String>,
    pub rows: Vec<FieldMap>,
}

impl Dataset {
    pub fn new<S: Into<String>>(columns: Vec<S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row<K: Into<String>, V: Into<String>>(&mut self, cells: Vec<(K, V)>) {
        self.rows
            .push(cells.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
    }

    fn value<'a>(&self, row: &'a FieldMap, column: &str) -> &'a str {
        row.get(column).map(String::as_str).unwrap_or("")
    }
}

/// One matched reported row with its diff and generated questions, plus both
/// full snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub case_id: String,
    pub patient_initials: String,
    pub contact_no: String,
    pub missing_fields: Vec<MissingFieldEntry>,
    pub questions: Vec<FollowUpQuestion>,
    pub reference_data: FieldMap,
    pub reported_data: FieldMap,
}

/// A reported row no reference row matched. Non-fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedRow {
    pub row_index: usize,
    pub case_id: String,
    pub contact_no: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub results: Vec<ReconciliationResult>,
    pub warnings: Vec<UnmatchedRow>,
}

impl ReconciliationReport {
    pub fn total_missing_fields(&self) -> usize {
        self.results.iter().map(|r| r.missing_fields.len()).sum()
    }
}

/// The reconciliation engine, parameterized by an injectable question
/// strategy ({remote, template} both satisfy [`QuestionSource`]).
pub struct ReconciliationEngine<'a> {
    source: &'a dyn QuestionSource,
    language: String,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(source: &'a dyn QuestionSource, language: &str) -> Self {
        Self {
            source,
            language: language.to_string(),
        }
    }

    /// Compare every reported row against the reference dataset.
    pub fn reconcile(&self, reference: &Dataset, reported: &Dataset) -> ReconciliationReport {
        let mut report = ReconciliationReport::default();

        for (row_index, reported_row) in reported.rows.iter().enumerate() {
            let case_key = reported.value(reported_row, columns::CASE_ID);
            let contact_key = reported.value(reported_row, columns::CONTACT_NO);

            let Some(reference_row) = self.find_match(reference, case_key, contact_key) else {
                tracing::warn!(
                    row_index,
                    case_id = case_key,
                    contact_no = contact_key,
                    "No reference match for reported row, skipping"
                );
                report.warnings.push(UnmatchedRow {
                    row_index,
                    case_id: case_key.to_string(),
                    contact_no: contact_key.to_string(),
                });
                continue;
            };

            report
                .results
                .push(self.diff_row(reported, reported_row, reference_row));
        }

        report
    }

    fn find_match<'d>(
        &self,
        reference: &'d Dataset,
        case_key: &str,
        contact_key: &str,
    ) -> Option<&'d FieldMap> {
        reference.rows.iter().find(|row| {
            let case = reference.value(row, columns::CASE_ID);
            let contact = reference.value(row, columns::CONTACT_NO);
            (!case_key.trim().is_empty() && case == case_key)
                || (!contact_key.trim().is_empty() && contact == contact_key)
        })
    }

    fn diff_row(
        &self,
        reported: &Dataset,
        reported_row: &FieldMap,
        reference_row: &FieldMap,
    ) -> ReconciliationResult {
        let mut missing_fields = Vec::new();

        for column in &reported.columns {
            let reported_value = reported.value(reported_row, column);
            if is_missing(reported_value) {
                missing_fields.push(MissingFieldEntry {
                    field_name: column.clone(),
                    reported_value: reported_value.to_string(),
                    reference_value: reference_row
                        .get(column)
                        .cloned()
                        .unwrap_or_default(),
                });
            }
        }

        // The reference row is ground truth for identity and expected answers
        let patient_initials = reference_row
            .get(columns::PATIENT_INITIALS)
            .cloned()
            .unwrap_or_default();
        let contact_no = reference_row
            .get(columns::CONTACT_NO)
            .cloned()
            .unwrap_or_default();
        let case_id = reference_row
            .get(columns::CASE_ID)
            .cloned()
            .unwrap_or_default();

        let missing_names: Vec<String> =
            missing_fields.iter().map(|m| m.field_name.clone()).collect();
        let question_texts = resolve_questions(
            self.source,
            &patient_initials,
            &contact_no,
            &missing_names,
            &self.language,
        );

        let questions = missing_fields
            .iter()
            .map(|m| FollowUpQuestion {
                field_name: m.field_name.clone(),
                // resolve_questions guarantees coverage of every requested field
                question: question_texts.get(&m.field_name).cloned().unwrap_or_default(),
                expected_answer: m.reference_value.clone(),
            })
            .collect();

        ReconciliationResult {
            case_id,
            patient_initials,
            contact_no,
            missing_fields,
            questions,
            reference_data: reference_row.clone(),
            reported_data: reported_row.clone(),
        }
    }
}

/// A value counts as missing when it is absent, empty, or whitespace-only.
fn is_missing(value: &str) -> bool {
    value.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questions::TemplateQuestionSource;

    fn reference_dataset() -> Dataset {
        let mut ds = Dataset::new(vec![
            columns::CASE_ID,
            columns::CONTACT_NO,
            columns::PATIENT_INITIALS,
            columns::AGE,
            columns::OUTCOME,
        ]);
        ds.push_row(vec![
            (columns::CASE_ID, "C-100"),
            (columns::CONTACT_NO, "555-0001"),
            (columns::PATIENT_INITIALS, "AB"),
            (columns::AGE, "70"),
            (columns::OUTCOME, "Recovered"),
        ]);
        ds
    }

    fn reported_dataset() -> Dataset {
        let mut ds = Dataset::new(vec![
            columns::CASE_ID,
            columns::CONTACT_NO,
            columns::PATIENT_INITIALS,
            columns::AGE,
            columns::OUTCOME,
        ]);
        ds.push_row(vec![
            (columns::CASE_ID, "C-100"),
            (columns::CONTACT_NO, "555-0001"),
            (columns::PATIENT_INITIALS, "AB"),
            (columns::AGE, "   "),
            (columns::OUTCOME, ""),
        ]);
        ds
    }

    #[test]
    fn detects_empty_and_whitespace_fields() {
        let source = TemplateQuestionSource::new();
        let engine = ReconciliationEngine::new(&source, "en");
        let report = engine.reconcile(&reference_dataset(), &reported_dataset());

        assert_eq!(report.results.len(), 1);
        assert!(report.warnings.is_empty());

        let result = &report.results[0];
        let names: Vec<&str> = result
            .missing_fields
            .iter()
            .map(|m| m.field_name.as_str())
            .collect();
        assert_eq!(names, vec![columns::AGE, columns::OUTCOME]);
        assert_eq!(result.missing_fields[0].reference_value, "70");
        assert_eq!(result.questions.len(), 2);
        assert_eq!(result.questions[1].expected_answer, "Recovered");
        assert!(!result.questions[0].question.is_empty());
    }

    #[test]
    fn matches_by_contact_when_case_id_absent() {
        let mut reported = reported_dataset();
        reported.rows[0].insert(columns::CASE_ID.to_string(), String::new());

        let source = TemplateQuestionSource::new();
        let engine = ReconciliationEngine::new(&source, "en");
        let report = engine.reconcile(&reference_dataset(), &reported);

        assert_eq!(report.results.len(), 1);
        // Identity comes from the reference row
        assert_eq!(report.results[0].case_id, "C-100");
    }

    #[test]
    fn unmatched_row_is_warning_not_fatal() {
        let mut reported = reported_dataset();
        reported.push_row(vec![
            (columns::CASE_ID, "C-999"),
            (columns::CONTACT_NO, "555-9999"),
            (columns::PATIENT_INITIALS, "ZZ"),
        ]);

        let source = TemplateQuestionSource::new();
        let engine = ReconciliationEngine::new(&source, "en");
        let report = engine.reconcile(&reference_dataset(), &reported);

        assert_eq!(report.results.len(), 1);
        assert_eq!(
            report.warnings,
            vec![UnmatchedRow {
                row_index: 1,
                case_id: "C-999".to_string(),
                contact_no: "555-9999".to_string(),
            }]
        );
    }

    #[test]
    fn empty_keys_never_match() {
        let mut reference = reference_dataset();
        reference.rows[0].insert(columns::CASE_ID.to_string(), String::new());
        reference.rows[0].insert(columns::CONTACT_NO.to_string(), String::new());

        let mut reported = reported_dataset();
        reported.rows[0].insert(columns::CASE_ID.to_string(), String::new());
        reported.rows[0].insert(columns::CONTACT_NO.to_string(), String::new());

        let source = TemplateQuestionSource::new();
        let engine = ReconciliationEngine::new(&source, "en");
        let report = engine.reconcile(&reference, &reported);
        assert!(report.results.is_empty());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn identical_inputs_yield_identical_diffs() {
        let source = TemplateQuestionSource::new();
        let engine = ReconciliationEngine::new(&source, "en");
        let a = engine.reconcile(&reference_dataset(), &reported_dataset());
        let b = engine.reconcile(&reference_dataset(), &reported_dataset());

        assert_eq!(a.results[0].missing_fields, b.results[0].missing_fields);
        assert_eq!(a.results[0].questions, b.results[0].questions);
        assert_eq!(a.total_missing_fields(), b.total_missing_fields());
    }
}
