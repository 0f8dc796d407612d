// src/handlers/student.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    grading,
    models::{
        question::{PublicQuestion, QuestionDetail},
        quiz::{Quiz, QuizPaper, QuizSummary},
        submission::{StudentDashboard, StudentResult, SubmitQuizRequest},
        user::Actor,
    },
};

async fn completed_results(pool: &SqlitePool, student_id: i64) -> Result<Vec<StudentResult>, AppError> {
    let results = sqlx::query_as::<_, StudentResult>(
        r#"
        SELECT s.id AS submission_id, s.quiz_id, z.title AS quiz_title, s.score,
               s.total_marks, s.submitted_at
        FROM quiz_submissions s
        JOIN quizzes z ON z.id = s.quiz_id
        WHERE s.student_id = ?
        ORDER BY s.submitted_at DESC, s.id DESC
        "#,
    )
    .bind(student_id)
    .fetch_all(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch student results: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(results)
}

/// Published quizzes still to take, plus finished attempts.
pub async fn dashboard(
    State(pool): State<SqlitePool>,
    actor: Actor,
) -> Result<impl IntoResponse, AppError> {
    let pending_quizzes = sqlx::query_as::<_, QuizSummary>(
        r#"
        SELECT z.id, z.title, z.description, z.duration_minutes, z.total_marks, z.is_published,
               (SELECT COUNT(*) FROM questions q WHERE q.quiz_id = z.id) AS question_count
        FROM quizzes z
        WHERE z.is_published = 1
          AND NOT EXISTS (
              SELECT 1 FROM quiz_submissions s
              WHERE s.quiz_id = z.id AND s.student_id = ?
          )
        ORDER BY z.created_at DESC, z.id DESC
        "#,
    )
    .bind(actor.id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to load student dashboard: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let completed_quizzes = completed_results(&pool, actor.id).await?;

    Ok(Json(StudentDashboard {
        pending_quizzes,
        completed_quizzes,
    }))
}

/// Hands out the question paper. The quiz must be published and not yet taken.
pub async fn start_quiz(
    State(pool): State<SqlitePool>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;

    let quiz = Quiz::find(&mut *conn, id)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;
    if !quiz.is_published {
        return Err(AppError::Forbidden("This quiz is not available".to_string()));
    }

    let submitted: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM quiz_submissions WHERE quiz_id = ? AND student_id = ?",
    )
    .bind(id)
    .bind(actor.id)
    .fetch_one(&mut *conn)
    .await?;
    if submitted > 0 {
        return Err(AppError::Conflict("Quiz already submitted".to_string()));
    }

    let questions = QuestionDetail::load_for_quiz(&mut *conn, id)
        .await?
        .into_iter()
        .map(PublicQuestion::from)
        .collect();

    Ok(Json(QuizPaper {
        id: quiz.id,
        title: quiz.title,
        description: quiz.description,
        duration_minutes: quiz.duration_minutes,
        total_marks: quiz.total_marks,
        questions,
    }))
}

pub async fn submit_quiz(
    State(pool): State<SqlitePool>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(payload): Json<SubmitQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let receipt = grading::submit_quiz(&pool, &actor, id, &payload.answers).await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn results(
    State(pool): State<SqlitePool>,
    actor: Actor,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(completed_results(&pool, actor.id).await?))
}
