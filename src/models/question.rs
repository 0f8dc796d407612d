// src/models/question.rs

use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, prelude::FromRow};
use validator::Validate;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Mcq,
    TrueFalse,
    ShortAnswer,
}

impl QuestionType {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::Mcq => "mcq",
            QuestionType::TrueFalse => "true_false",
            QuestionType::ShortAnswer => "short_answer",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mcq" => Ok(QuestionType::Mcq),
            "true_false" => Ok(QuestionType::TrueFalse),
            "short_answer" => Ok(QuestionType::ShortAnswer),
            other => Err(AppError::InternalServerError(format!(
                "Unknown question type '{}'",
                other
            ))),
        }
    }
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub quiz_id: i64,
    pub question_text: String,

    /// 'mcq', 'true_false' or 'short_answer'.
    pub question_type: String,

    pub marks: i64,

    /// Reference answer for true_false ("True"/"False") and short_answer.
    /// Always NULL for mcq, whose key lives in `options.is_correct`.
    pub correct_answer: Option<String>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'options' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuizOption {
    pub id: i64,
    pub question_id: i64,
    pub option_text: String,
    pub is_correct: bool,
}

/// Teacher view of a question, answer key included.
#[derive(Debug, Serialize)]
pub struct QuestionDetail {
    #[serde(flatten)]
    pub question: Question,
    pub options: Vec<QuizOption>,
}

impl QuestionDetail {
    /// All questions of a quiz with their options, oldest first.
    pub async fn load_for_quiz(
        conn: &mut SqliteConnection,
        quiz_id: i64,
    ) -> Result<Vec<QuestionDetail>, sqlx::Error> {
        let questions = sqlx::query_as::<_, Question>(
            r#"
            SELECT id, quiz_id, question_text, question_type, marks, correct_answer, created_at
            FROM questions
            WHERE quiz_id = ?
            ORDER BY id
            "#,
        )
        .bind(quiz_id)
        .fetch_all(&mut *conn)
        .await?;

        let options = sqlx::query_as::<_, QuizOption>(
            r#"
            SELECT o.id, o.question_id, o.option_text, o.is_correct
            FROM options o
            JOIN questions q ON q.id = o.question_id
            WHERE q.quiz_id = ?
            ORDER BY o.id
            "#,
        )
        .bind(quiz_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut by_question: HashMap<i64, Vec<QuizOption>> = HashMap::new();
        for option in options {
            by_question.entry(option.question_id).or_default().push(option);
        }

        Ok(questions
            .into_iter()
            .map(|question| {
                let options = by_question.remove(&question.id).unwrap_or_default();
                QuestionDetail { question, options }
            })
            .collect())
    }
}

/// DTO for sending a question to a student (no answer key).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub question_type: String,
    pub question_text: String,
    pub marks: i64,
    pub options: Vec<PublicOption>,
}

#[derive(Debug, Serialize)]
pub struct PublicOption {
    pub id: i64,
    pub option_text: String,
}

impl From<QuestionDetail> for PublicQuestion {
    fn from(detail: QuestionDetail) -> Self {
        Self {
            id: detail.question.id,
            question_type: detail.question.question_type,
            question_text: detail.question.question_text,
            marks: detail.question.marks,
            options: detail
                .options
                .into_iter()
                .map(|o| PublicOption {
                    id: o.id,
                    option_text: o.option_text,
                })
                .collect(),
        }
    }
}

/// The literal answer of a true/false question. Serializes as "True" / "False".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TruthValue {
    True,
    False,
}

impl TruthValue {
    /// Accepts exactly "True" or "False" after trimming.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "True" => Some(TruthValue::True),
            "False" => Some(TruthValue::False),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TruthValue::True => "True",
            TruthValue::False => "False",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McqDraft {
    pub question_text: String,
    pub marks: i64,
    pub options: Vec<String>,
    /// Zero-based index into `options`.
    pub correct_option_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrueFalseDraft {
    pub question_text: String,
    pub marks: i64,
    pub correct_answer: TruthValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortAnswerDraft {
    pub question_text: String,
    pub marks: i64,
    pub correct_answer: String,
}

/// A question that has not been persisted yet, from the generator or a teacher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "question_type", rename_all = "snake_case")]
pub enum QuestionDraft {
    Mcq(McqDraft),
    TrueFalse(TrueFalseDraft),
    ShortAnswer(ShortAnswerDraft),
}

/// Why a draft cannot be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftError {
    EmptyText,
    InvalidMarks(i64),
    TooFewOptions(usize),
    BlankOption(usize),
    CorrectIndexOutOfRange { index: usize, options: usize },
    /// Stored mcq options do not have exactly one correct entry.
    CorrectOptionCount(i64),
    EmptyAnswer,
}

impl fmt::Display for DraftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DraftError::EmptyText => write!(f, "question text is empty"),
            DraftError::InvalidMarks(m) => write!(f, "marks must be at least 1, got {}", m),
            DraftError::TooFewOptions(n) => write!(f, "at least 2 options required, got {}", n),
            DraftError::BlankOption(i) => write!(f, "option {} is blank", i + 1),
            DraftError::CorrectIndexOutOfRange { index, options } => write!(
                f,
                "correct option index {} is outside 0..{}",
                index, options
            ),
            DraftError::CorrectOptionCount(n) => {
                write!(f, "expected exactly one correct option, found {}", n)
            }
            DraftError::EmptyAnswer => write!(f, "correct answer is empty"),
        }
    }
}

impl std::error::Error for DraftError {}

impl QuestionDraft {
    pub fn question_type(&self) -> QuestionType {
        match self {
            QuestionDraft::Mcq(_) => QuestionType::Mcq,
            QuestionDraft::TrueFalse(_) => QuestionType::TrueFalse,
            QuestionDraft::ShortAnswer(_) => QuestionType::ShortAnswer,
        }
    }

    pub fn question_text(&self) -> &str {
        match self {
            QuestionDraft::Mcq(d) => &d.question_text,
            QuestionDraft::TrueFalse(d) => &d.question_text,
            QuestionDraft::ShortAnswer(d) => &d.question_text,
        }
    }

    pub fn marks(&self) -> i64 {
        match self {
            QuestionDraft::Mcq(d) => d.marks,
            QuestionDraft::TrueFalse(d) => d.marks,
            QuestionDraft::ShortAnswer(d) => d.marks,
        }
    }

    /// Value of the `questions.correct_answer` column.
    pub fn stored_answer(&self) -> Option<&str> {
        match self {
            QuestionDraft::Mcq(_) => None,
            QuestionDraft::TrueFalse(d) => Some(d.correct_answer.as_str()),
            QuestionDraft::ShortAnswer(d) => Some(d.correct_answer.trim()),
        }
    }

    /// Item-level validation predicate, one rule set per variant.
    pub fn check(&self) -> Result<(), DraftError> {
        if self.question_text().trim().is_empty() {
            return Err(DraftError::EmptyText);
        }
        if self.marks() < 1 {
            return Err(DraftError::InvalidMarks(self.marks()));
        }
        match self {
            QuestionDraft::Mcq(d) => {
                if d.options.len() < 2 {
                    return Err(DraftError::TooFewOptions(d.options.len()));
                }
                if let Some(i) = d.options.iter().position(|o| o.trim().is_empty()) {
                    return Err(DraftError::BlankOption(i));
                }
                if d.correct_option_index >= d.options.len() {
                    return Err(DraftError::CorrectIndexOutOfRange {
                        index: d.correct_option_index,
                        options: d.options.len(),
                    });
                }
                Ok(())
            }
            // The answer type already restricts it to "True" / "False".
            QuestionDraft::TrueFalse(_) => Ok(()),
            QuestionDraft::ShortAnswer(d) => {
                if d.correct_answer.trim().is_empty() {
                    return Err(DraftError::EmptyAnswer);
                }
                Ok(())
            }
        }
    }
}

/// DTO for a teacher adding one question by hand.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 2000, message = "Question text is required"))]
    pub question_text: String,
    pub question_type: QuestionType,
    #[validate(range(min = 1, max = 100))]
    pub marks: Option<i64>,
    #[validate(custom(function = validate_options))]
    pub options: Option<Vec<String>>,
    /// Zero-based index of the correct option (mcq only).
    pub correct_option: Option<usize>,
    /// Reference answer (true_false / short_answer only).
    #[validate(length(max = 2000))]
    pub correct_answer: Option<String>,
}

/// DTO for saving reviewed drafts, e.g. an edited generation preview.
#[derive(Debug, Deserialize, Validate)]
pub struct BatchQuestionsRequest {
    #[validate(length(min = 1, max = 50, message = "Between 1 and 50 questions per batch"))]
    pub questions: Vec<QuestionDraft>,
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    for opt in options {
        if opt.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}

impl CreateQuestionRequest {
    /// Converts the form-shaped request into a typed draft.
    pub fn into_draft(self) -> Result<QuestionDraft, AppError> {
        let question_text = self.question_text.trim().to_string();
        let marks = self.marks.unwrap_or(1);

        let draft = match self.question_type {
            QuestionType::Mcq => {
                let options: Vec<String> = self
                    .options
                    .unwrap_or_default()
                    .into_iter()
                    .map(|o| o.trim().to_string())
                    .collect();
                if options.len() < 2 {
                    return Err(AppError::BadRequest(
                        "At least 2 options required for MCQ".to_string(),
                    ));
                }
                let correct_option_index = self.correct_option.ok_or_else(|| {
                    AppError::BadRequest("Please select which option is correct!".to_string())
                })?;
                QuestionDraft::Mcq(McqDraft {
                    question_text,
                    marks,
                    options,
                    correct_option_index,
                })
            }
            QuestionType::TrueFalse => {
                let correct_answer = self
                    .correct_answer
                    .as_deref()
                    .and_then(TruthValue::parse)
                    .ok_or_else(|| {
                        AppError::BadRequest(
                            "Please select a valid correct answer (True or False)".to_string(),
                        )
                    })?;
                QuestionDraft::TrueFalse(TrueFalseDraft {
                    question_text,
                    marks,
                    correct_answer,
                })
            }
            QuestionType::ShortAnswer => QuestionDraft::ShortAnswer(ShortAnswerDraft {
                question_text,
                marks,
                correct_answer: self.correct_answer.unwrap_or_default().trim().to_string(),
            }),
        };

        draft.check().map_err(|e| match e {
            DraftError::CorrectIndexOutOfRange { .. } => {
                AppError::BadRequest("Invalid correct option selection".to_string())
            }
            DraftError::EmptyAnswer => AppError::BadRequest(
                "Please provide a correct answer for the short answer question".to_string(),
            ),
            other => AppError::BadRequest(other.to_string()),
        })?;

        Ok(draft)
    }
}
