// src/models/submission.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::quiz::QuizSummary;

/// Whether an answer has received its final mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradingStatus {
    Graded,
    /// Short answers wait for a human; `is_correct = false` does not mean wrong yet.
    Pending,
}

impl GradingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GradingStatus::Graded => "graded",
            GradingStatus::Pending => "pending",
        }
    }
}

/// Represents the 'student_answers' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StudentAnswer {
    pub id: i64,
    pub submission_id: i64,
    pub question_id: i64,
    pub selected_option_id: Option<i64>,
    pub answer_text: Option<String>,
    pub is_correct: bool,
    pub marks_obtained: i64,
    pub grading_status: String,
}

/// DTO for submitting a quiz attempt.
#[derive(Debug, Deserialize)]
pub struct SubmitQuizRequest {
    /// Key: question id. Value: option id for mcq, free text otherwise.
    /// Questions left out count as unanswered.
    #[serde(default)]
    pub answers: HashMap<i64, String>,
}

/// What the student gets back right after submitting.
#[derive(Debug, Serialize)]
pub struct SubmissionReceipt {
    pub submission_id: i64,
    pub score: i64,
    pub total_marks: i64,
    pub pending_answers: usize,
    pub answers: Vec<StudentAnswer>,
}

/// Row of a teacher's result sheet.
#[derive(Debug, Serialize, FromRow)]
pub struct ResultEntry {
    pub submission_id: i64,
    pub student_id: i64,
    pub username: String,
    pub score: i64,
    pub total_marks: i64,
    pub submitted_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Row of a student's own result list.
#[derive(Debug, Serialize, FromRow)]
pub struct StudentResult {
    pub submission_id: i64,
    pub quiz_id: i64,
    pub quiz_title: String,
    pub score: i64,
    pub total_marks: i64,
    pub submitted_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Serialize)]
pub struct StudentDashboard {
    pub pending_quizzes: Vec<QuizSummary>,
    pub completed_quizzes: Vec<StudentResult>,
}
