//! Question generation strategies for missing case fields.
//!
//! Two interchangeable [`QuestionSource`] strategies exist: a remote
//! chat-completions client and a deterministic local template source.
//! Whatever the strategy, [`resolve_questions`] guarantees that every
//! requested field ends up with a non-empty question — remote failures are
//! absorbed here and never reach the ingestion path.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config;
use crate::reconcile::columns;

/// Errors from the remote question strategy. Callers of
/// [`resolve_questions`] never see these; they exist for logging and for
/// direct users of a strategy.
#[derive(Debug, Error)]
pub enum QuestionError {
    #[error("Question endpoint is not configured")]
    NotConfigured,

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Question endpoint returned status {status}: {body}")]
    Endpoint { status: u16, body: String },

    #[error("Failed to parse question response: {0}")]
    ResponseParsing(String),
}

/// Maps a set of missing field names to question text for one patient.
pub trait QuestionSource {
    fn generate(
        &self,
        patient_initials: &str,
        contact_no: &str,
        missing_fields: &[String],
        language: &str,
    ) -> Result<BTreeMap<String, String>, QuestionError>;
}

/// The deterministic template used whenever a primary strategy errors,
/// omits a field, or returns an unusable value for it.
pub fn fallback_question(field_name: &str, patient_initials: &str, contact_no: &str) -> String {
    format!("Please provide the {field_name} for patient {patient_initials} (PHN: {contact_no})")
}

/// Run a strategy and guarantee coverage: every requested field receives a
/// non-empty question, substituting the fallback template wherever the
/// strategy failed entirely, skipped a field, or produced an empty string.
pub fn resolve_questions(
    source: &dyn QuestionSource,
    patient_initials: &str,
    contact_no: &str,
    missing_fields: &[String],
    language: &str,
) -> BTreeMap<String, String> {
    let generated = match source.generate(patient_initials, contact_no, missing_fields, language) {
        Ok(map) => map,
        Err(e) => {
            tracing::warn!(error = %e, "Question generation failed, using fallback templates");
            BTreeMap::new()
        }
    };

    missing_fields
        .iter()
        .map(|field| {
            let text = generated
                .get(field)
                .map(|q| q.trim())
                .filter(|q| !q.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| fallback_question(field, patient_initials, contact_no));
            (field.clone(), text)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Remote strategy — OpenAI-compatible chat completions
// ---------------------------------------------------------------------------

/// Connection settings for the remote question endpoint. Passed explicitly
/// into [`RemoteQuestionSource::new`]; nothing here is process-global.
#[derive(Debug, Clone)]
pub struct RemoteQuestionConfig {
    /// Base endpoint, e.g. `https://xxxx.openai.azure.com`
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    pub deployment: String,
    pub timeout_secs: u64,
}

impl RemoteQuestionConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Read the endpoint configuration from the environment. Returns None
    /// unless all four variables are set.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            endpoint: config::env_var("AZURE_ENDPOINT")?,
            api_key: config::env_var("AZURE_OPENAI_API_KEY")?,
            api_version: config::env_var("AZURE_API_VERSION")?,
            deployment: config::env_var("AZURE_DEPLOYMENT")?,
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
        })
    }
}

/// Remote question generator over a bounded-timeout blocking HTTP request.
pub struct RemoteQuestionSource {
    config: RemoteQuestionConfig,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

const SYSTEM_PROMPT: &str = "You are a pharmacovigilance data-collection assistant. \
Your job is to ask patients for missing report fields. \
Be clear, empathetic, and concise. \
Ask exactly one question per field. \
Do not ask for extra information beyond the field.";

impl RemoteQuestionSource {
    pub fn new(config: RemoteQuestionConfig) -> Result<Self, QuestionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| QuestionError::HttpClient(e.to_string()))?;
        Ok(Self { config, client })
    }

    /// Construct from environment configuration, if present.
    pub fn from_env() -> Result<Self, QuestionError> {
        let config = RemoteQuestionConfig::from_env().ok_or(QuestionError::NotConfigured)?;
        Self::new(config)
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions",
            self.config.endpoint.trim_end_matches('/'),
            self.config.deployment
        )
    }

    fn user_prompt(
        patient_initials: &str,
        contact_no: &str,
        missing_fields: &[String],
        language: &str,
    ) -> String {
        let fields_json = serde_json::to_string(missing_fields).unwrap_or_else(|_| "[]".into());
        format!(
            "Patient: patient {patient_initials} (PHN: {contact_no})\n\
             Missing fields (column names): {fields_json}\n\n\
             Write questions in {language}. \
             Return ONLY a JSON object where each key is the exact field name and the value is the question string."
        )
    }
}

impl QuestionSource for RemoteQuestionSource {
    fn generate(
        &self,
        patient_initials: &str,
        contact_no: &str,
        missing_fields: &[String],
        language: &str,
    ) -> Result<BTreeMap<String, String>, QuestionError> {
        if missing_fields.is_empty() {
            return Ok(BTreeMap::new());
        }

        let body = ChatRequest {
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: Self::user_prompt(
                        patient_initials,
                        contact_no,
                        missing_fields,
                        language,
                    ),
                },
            ],
            temperature: 0.7,
            max_tokens: 700,
        };

        let response = self
            .client
            .post(self.completions_url())
            .query(&[("api-version", self.config.api_version.as_str())])
            .header("api-key", &self.config.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    QuestionError::HttpClient(format!(
                        "Request timed out after {}s",
                        self.config.timeout_secs
                    ))
                } else {
                    QuestionError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(QuestionError::Endpoint {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| QuestionError::ResponseParsing(e.to_string()))?;
        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| QuestionError::ResponseParsing("Empty choices array".into()))?;

        let mapping: BTreeMap<String, serde_json::Value> = serde_json::from_str(&content)
            .map_err(|e| {
                QuestionError::ResponseParsing(format!("Model did not return a JSON object: {e}"))
            })?;

        // Keep only requested fields whose value is a usable string; gaps are
        // filled by resolve_questions.
        let mut cleaned = BTreeMap::new();
        for field in missing_fields {
            if let Some(serde_json::Value::String(q)) = mapping.get(field) {
                let q = q.trim();
                if !q.is_empty() {
                    cleaned.insert(field.clone(), q.to_string());
                }
            }
        }
        Ok(cleaned)
    }
}

// ---------------------------------------------------------------------------
// Template strategy — deterministic, offline
// ---------------------------------------------------------------------------

/// Deterministic local strategy: curated question phrasing for the known
/// pharmacovigilance columns, generic template for everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateQuestionSource;

impl TemplateQuestionSource {
    pub fn new() -> Self {
        Self
    }

    fn curated(field_name: &str, who: &str) -> Option<String> {
        let question = match field_name {
            columns::AGE => format!("What is the age of {who}?"),
            columns::SEX => format!("What is the gender/sex of {who}?"),
            columns::REACTION_ONSET => {
                format!("When did the adverse reaction start for {who}?")
            }
            columns::OUTCOME => {
                format!("What was the outcome of the adverse reaction for {who}?")
            }
            columns::SERIOUS => format!("Was the adverse reaction serious for {who}? (Y/N)"),
            columns::DAILY_DOSE => {
                format!("What was the daily dose of the suspect drug for {who}?")
            }
            columns::INDICATION => {
                format!("What was the indication for the suspect drug for {who}?")
            }
            columns::THERAPY_START => format!("When did the therapy start for {who}?"),
            columns::THERAPY_END => format!("When did the therapy end for {who}?"),
            columns::THERAPY_DURATION => format!("What was the duration of therapy for {who}?"),
            columns::ABATED_AFTER_STOPPING => {
                format!("Did symptoms abate after stopping the drug for {who}?")
            }
            columns::RECHALLENGE => format!("What was the rechallenge result for {who}?"),
            columns::CONCOMITANT_DRUG_1 => {
                format!("What was the first concomitant drug for {who}?")
            }
            columns::CONCOMITANT_DRUG_2 => {
                format!("What was the second concomitant drug for {who}?")
            }
            columns::MEDICAL_HISTORY => format!("What is the medical history of {who}?"),
            _ => return None,
        };
        Some(question)
    }
}

impl QuestionSource for TemplateQuestionSource {
    fn generate(
        &self,
        patient_initials: &str,
        contact_no: &str,
        missing_fields: &[String],
        _language: &str,
    ) -> Result<BTreeMap<String, String>, QuestionError> {
        let who = format!("patient {patient_initials} (PHN: {contact_no})");
        Ok(missing_fields
            .iter()
            .map(|field| {
                let question = Self::curated(field, &who)
                    .unwrap_or_else(|| fallback_question(field, patient_initials, contact_no));
                (field.clone(), question)
            })
            .collect())
    }
}
