// src/models/quiz.rs

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Sqlite};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        question::{PublicQuestion, QuestionDetail},
        user::Actor,
    },
};

/// Represents the 'quizzes' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,

    /// Owning teacher.
    pub teacher_id: i64,

    pub duration_minutes: i64,

    /// Marks the teacher advertises for the quiz.
    /// Grading uses the sum of the question marks instead.
    pub total_marks: i64,

    /// Once set, never cleared.
    pub is_published: bool,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Quiz {
    pub async fn find<'e, E>(executor: E, quiz_id: i64) -> Result<Option<Quiz>, AppError>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let quiz = sqlx::query_as::<_, Quiz>(
            r#"
            SELECT id, title, description, teacher_id, duration_minutes, total_marks,
                   is_published, created_at, updated_at
            FROM quizzes
            WHERE id = ?
            "#,
        )
        .bind(quiz_id)
        .fetch_optional(executor)
        .await?;

        Ok(quiz)
    }

    /// Loads a quiz the actor owns. 404 when missing, 403 when someone else's.
    pub async fn find_owned<'e, E>(executor: E, actor: &Actor, quiz_id: i64) -> Result<Quiz, AppError>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let quiz = Self::find(executor, quiz_id)
            .await?
            .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

        if quiz.teacher_id != actor.id {
            return Err(AppError::Forbidden(
                "You do not have permission to modify this quiz".to_string(),
            ));
        }

        Ok(quiz)
    }

    /// Questions are frozen once any student has submitted the quiz.
    pub async fn ensure_editable<'e, E>(executor: E, quiz_id: i64) -> Result<(), AppError>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let submissions: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM quiz_submissions WHERE quiz_id = ?")
                .bind(quiz_id)
                .fetch_one(executor)
                .await?;

        if submissions > 0 {
            return Err(AppError::Conflict(
                "Quiz already has submissions; its questions can no longer change".to_string(),
            ));
        }

        Ok(())
    }
}

/// Quiz row with the number of questions it owns, for dashboards.
#[derive(Debug, Serialize, FromRow)]
pub struct QuizSummary {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub duration_minutes: i64,
    pub total_marks: i64,
    pub is_published: bool,
    pub question_count: i64,
}

/// Teacher view of one quiz, answer keys included.
#[derive(Debug, Serialize)]
pub struct QuizDetail {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub questions: Vec<QuestionDetail>,
}

/// What a student sees when starting a quiz. No answer keys.
#[derive(Debug, Serialize)]
pub struct QuizPaper {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub duration_minutes: i64,
    pub total_marks: i64,
    pub questions: Vec<PublicQuestion>,
}

#[derive(Debug, Serialize)]
pub struct TeacherDashboard {
    pub quizzes: Vec<QuizSummary>,
    pub total_quizzes: usize,
    pub total_questions: i64,
}

/// DTO for creating a quiz.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200, message = "Quiz title is required"))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 600))]
    pub duration_minutes: Option<i64>,
    #[validate(range(min = 0, max = 10000))]
    pub total_marks: Option<i64>,
}

/// DTO for updating a quiz. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 600))]
    pub duration_minutes: Option<i64>,
    #[validate(range(min = 0, max = 10000))]
    pub total_marks: Option<i64>,
}
