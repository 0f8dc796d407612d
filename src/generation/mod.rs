// src/generation/mod.rs

//! AI question generation pipeline:
//! prompt build -> bounded completion call -> normalize -> ingest.

pub mod client;
pub mod ingest;
pub mod normalize;
pub mod prompt;

use std::{fmt, sync::Arc, time::Duration};

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::{
        question::QuestionType,
        quiz::Quiz,
        user::{Actor, Role},
    },
};

use self::{
    ingest::IngestReport,
    normalize::NormalizedBatch,
    prompt::{Difficulty, OutputLanguage},
};

/// Failures of a single generation attempt. None of them are retried.
#[derive(Debug)]
pub enum GenerationError {
    /// `OPENROUTER_API_KEY` is not configured.
    MissingApiKey,
    /// Connection refused, DNS failure, broken body, ...
    Transport(String),
    /// The service answered with a non-2xx status.
    Remote { status: u16, body: String },
    /// The HTTP client gave up on its own timeout.
    SoftTimeout(Duration),
    /// The supervisor preempted a call that outlived the hard deadline.
    HardTimeout(Duration),
    /// The top-level response could not be decoded.
    MalformedResponse(String),
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationError::MissingApiKey => write!(f, "OPENROUTER_API_KEY is not configured"),
            GenerationError::Transport(reason) => write!(f, "connection error: {}", reason),
            GenerationError::Remote { status, body } => {
                write!(f, "API error ({}): {}", status, body)
            }
            GenerationError::SoftTimeout(t) => write!(
                f,
                "request timed out after {} seconds. Please try fewer questions or a shorter topic.",
                t.as_secs()
            ),
            GenerationError::HardTimeout(t) => write!(
                f,
                "AI generation exceeded {} seconds. Please try fewer questions or a shorter topic.",
                t.as_secs()
            ),
            GenerationError::MalformedResponse(reason) => {
                write!(f, "unexpected response format: {}", reason)
            }
        }
    }
}

impl std::error::Error for GenerationError {}

fn default_count() -> u8 {
    5
}

fn default_marks() -> i64 {
    1
}

fn validate_not_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        return Err(validator::ValidationError::new("blank")
            .with_message("Heading/Topic is required for AI generation".into()));
    }
    Ok(())
}

/// Parameters of one generation request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GenerationRequest {
    #[validate(
        length(max = 300, message = "Topic must be at most 300 characters"),
        custom(function = validate_not_blank)
    )]
    pub topic: String,
    pub question_type: QuestionType,
    #[serde(default = "default_count")]
    #[validate(range(min = 1, max = 20, message = "Question count must be between 1 and 20"))]
    pub count: u8,
    #[serde(default = "default_marks")]
    #[validate(range(min = 1, max = 100, message = "Marks must be at least 1"))]
    pub marks: i64,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub syllabus_scope: Option<String>,
    #[serde(default)]
    pub output_language: OutputLanguage,
}

/// Connection settings for the completion service.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub api_key: Option<String>,
    pub model: String,
    /// Full URL of the chat completions endpoint.
    pub endpoint: String,
    pub soft_timeout: Duration,
    pub hard_timeout: Duration,
}

impl GeneratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_key: config.openrouter_api_key.clone(),
            model: config.openrouter_model.clone(),
            endpoint: format!(
                "{}/chat/completions",
                config.openrouter_base_url.trim_end_matches('/')
            ),
            soft_timeout: Duration::from_secs(config.openrouter_timeout_secs),
            hard_timeout: Duration::from_secs(config.openrouter_hard_timeout_secs),
        }
    }
}

/// Handle to the remote question generator. Cheap to clone.
#[derive(Clone)]
pub struct QuestionGenerator {
    client: Client,
    settings: Arc<GeneratorSettings>,
}

impl QuestionGenerator {
    pub fn new(settings: GeneratorSettings) -> Self {
        Self {
            client: Client::new(),
            settings: Arc::new(settings),
        }
    }

    /// Builds the prompt and performs the bounded call. Returns the raw response body.
    pub async fn request_questions(&self, req: &GenerationRequest) -> Result<Value, GenerationError> {
        let api_key = self
            .settings
            .api_key
            .clone()
            .ok_or(GenerationError::MissingApiKey)?;

        let body = prompt::build_chat_request(&self.settings.model, req);

        tracing::info!(
            topic = %req.topic.trim(),
            question_type = %req.question_type,
            count = req.count,
            "Requesting generated questions"
        );

        client::with_deadline(
            self.settings.hard_timeout,
            client::post_completion(
                self.client.clone(),
                self.settings.endpoint.clone(),
                api_key,
                body,
                self.settings.soft_timeout,
            ),
        )
        .await
    }

    /// Prompt -> bounded call -> normalize. Nothing is persisted.
    pub async fn generate(&self, req: &GenerationRequest) -> Result<NormalizedBatch, GenerationError> {
        let raw = self.request_questions(req).await?;
        let batch = normalize::normalize_response(&raw, req.question_type, req.marks)?;

        tracing::info!(
            valid = batch.valid_count(),
            discarded = batch.discarded,
            requested = req.count,
            "Normalized generated questions"
        );

        Ok(batch)
    }
}

/// Full pipeline for one quiz: generate questions and ingest the valid ones.
///
/// Ownership and editability are checked before the remote call so a rejected
/// request never spends an API call.
pub async fn generate_into_quiz(
    pool: &SqlitePool,
    generator: &QuestionGenerator,
    actor: &Actor,
    quiz_id: i64,
    req: &GenerationRequest,
) -> Result<IngestReport, AppError> {
    actor.require(Role::Teacher)?;
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let quiz = Quiz::find_owned(pool, actor, quiz_id).await?;
    Quiz::ensure_editable(pool, quiz.id).await?;

    let batch = generator.generate(req).await?;
    let upstream_discarded = batch.discarded;

    let mut report = ingest::ingest_questions(pool, actor, quiz.id, batch.questions).await?;
    report.discarded += upstream_discarded;

    Ok(report)
}
