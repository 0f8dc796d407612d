// src/handlers/teacher.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use validator::Validate;

use crate::{
    error::AppError,
    generation::{self, GenerationRequest, QuestionGenerator, ingest},
    models::{
        question::{BatchQuestionsRequest, CreateQuestionRequest, QuestionDetail},
        quiz::{CreateQuizRequest, Quiz, QuizDetail, QuizSummary, TeacherDashboard, UpdateQuizRequest},
        submission::ResultEntry,
        user::Actor,
    },
    utils::html::{clean_html, clean_optional},
};

/// Own quizzes with their question counts.
pub async fn dashboard(
    State(pool): State<SqlitePool>,
    actor: Actor,
) -> Result<impl IntoResponse, AppError> {
    let quizzes = sqlx::query_as::<_, QuizSummary>(
        r#"
        SELECT z.id, z.title, z.description, z.duration_minutes, z.total_marks, z.is_published,
               (SELECT COUNT(*) FROM questions q WHERE q.quiz_id = z.id) AS question_count
        FROM quizzes z
        WHERE z.teacher_id = ?
        ORDER BY z.created_at DESC, z.id DESC
        "#,
    )
    .bind(actor.id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to load teacher dashboard: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let total_questions = quizzes.iter().map(|q| q.question_count).sum();

    Ok(Json(TeacherDashboard {
        total_quizzes: quizzes.len(),
        total_questions,
        quizzes,
    }))
}

pub async fn create_quiz(
    State(pool): State<SqlitePool>,
    actor: Actor,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let title = clean_html(payload.title.trim());
    if title.is_empty() {
        return Err(AppError::BadRequest("Quiz title is required".to_string()));
    }

    let quiz = sqlx::query_as::<_, Quiz>(
        r#"
        INSERT INTO quizzes (title, description, teacher_id, duration_minutes, total_marks)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id, title, description, teacher_id, duration_minutes, total_marks,
                  is_published, created_at, updated_at
        "#,
    )
    .bind(&title)
    .bind(clean_optional(payload.description.as_deref()))
    .bind(actor.id)
    .bind(payload.duration_minutes.unwrap_or(30))
    .bind(payload.total_marks.unwrap_or(100))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create quiz: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    tracing::info!(quiz_id = quiz.id, teacher_id = actor.id, "Quiz created");

    Ok((StatusCode::CREATED, Json(quiz)))
}

/// Quiz with every question, option and answer key.
pub async fn get_quiz(
    State(pool): State<SqlitePool>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;

    let quiz = Quiz::find_owned(&mut *conn, &actor, id).await?;
    let questions = QuestionDetail::load_for_quiz(&mut *conn, id).await?;

    Ok(Json(QuizDetail { quiz, questions }))
}

pub async fn update_quiz(
    State(pool): State<SqlitePool>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    Quiz::find_owned(&pool, &actor, id).await?;

    if payload.title.is_none()
        && payload.description.is_none()
        && payload.duration_minutes.is_none()
        && payload.total_marks.is_none()
    {
        return Ok(StatusCode::OK);
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE quizzes SET ");
    let mut separated = builder.separated(", ");

    if let Some(title) = payload.title {
        let title = clean_html(title.trim());
        if title.is_empty() {
            return Err(AppError::BadRequest("Quiz title is required".to_string()));
        }
        separated.push("title = ");
        separated.push_bind_unseparated(title);
    }

    if let Some(description) = payload.description {
        separated.push("description = ");
        separated.push_bind_unseparated(clean_optional(Some(description.as_str())));
    }

    if let Some(duration) = payload.duration_minutes {
        separated.push("duration_minutes = ");
        separated.push_bind_unseparated(duration);
    }

    if let Some(total_marks) = payload.total_marks {
        separated.push("total_marks = ");
        separated.push_bind_unseparated(total_marks);
    }

    separated.push("updated_at = CURRENT_TIMESTAMP");

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update quiz: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(StatusCode::OK)
}

/// Deletes a quiz with its questions and submissions.
pub async fn delete_quiz(
    State(pool): State<SqlitePool>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Quiz::find_owned(&pool, &actor, id).await?;

    sqlx::query("DELETE FROM quizzes WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete quiz: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    tracing::info!(quiz_id = id, teacher_id = actor.id, "Quiz deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Adds one hand-written question.
pub async fn add_question(
    State(pool): State<SqlitePool>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let draft = payload.into_draft()?;
    let question = ingest::add_question(&pool, &actor, id, draft).await?;

    Ok((StatusCode::CREATED, Json(question)))
}

/// Saves a batch of reviewed drafts. Invalid items are skipped and counted.
pub async fn add_questions_batch(
    State(pool): State<SqlitePool>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(payload): Json<BatchQuestionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let report = ingest::ingest_questions(&pool, &actor, id, payload.questions).await?;
    let status = if report.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((status, Json(report)))
}

/// Generates questions with the AI service and saves the valid ones.
///
/// 201 when something was saved, 200 with an empty `saved` list otherwise.
pub async fn generate_questions(
    State(pool): State<SqlitePool>,
    State(generator): State<QuestionGenerator>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(payload): Json<GenerationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let report = generation::generate_into_quiz(&pool, &generator, &actor, id, &payload).await?;

    if report.is_empty() {
        tracing::warn!(quiz_id = id, "Generation produced no valid questions");
        return Ok((StatusCode::OK, Json(report)));
    }

    tracing::info!(
        quiz_id = id,
        saved = report.saved_count(),
        discarded = report.discarded,
        "Generated questions saved"
    );

    Ok((StatusCode::CREATED, Json(report)))
}

/// Runs the generation pipeline without saving. The teacher can review the
/// drafts and send them back through the batch endpoint.
pub async fn preview_questions(
    State(pool): State<SqlitePool>,
    State(generator): State<QuestionGenerator>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(payload): Json<GenerationRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    Quiz::find_owned(&pool, &actor, id).await?;

    let batch = generator.generate(&payload).await?;

    Ok(Json(batch))
}

/// Makes the quiz visible to students. Requires at least one question.
pub async fn publish_quiz(
    State(pool): State<SqlitePool>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = Quiz::find_owned(&pool, &actor, id).await?;

    if quiz.is_published {
        return Ok(StatusCode::OK);
    }

    let questions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE quiz_id = ?")
        .bind(id)
        .fetch_one(&pool)
        .await?;

    if questions == 0 {
        return Err(AppError::BadRequest(
            "Add at least one question before publishing".to_string(),
        ));
    }

    sqlx::query(
        "UPDATE quizzes SET is_published = 1, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(id)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to publish quiz: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    tracing::info!(quiz_id = id, questions, "Quiz published");

    Ok(StatusCode::OK)
}

/// Submissions for one quiz, best score first.
pub async fn quiz_results(
    State(pool): State<SqlitePool>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Quiz::find_owned(&pool, &actor, id).await?;

    let results = sqlx::query_as::<_, ResultEntry>(
        r#"
        SELECT s.id AS submission_id, s.student_id, u.username, s.score, s.total_marks,
               s.submitted_at
        FROM quiz_submissions s
        JOIN users u ON u.id = s.student_id
        WHERE s.quiz_id = ?
        ORDER BY s.score DESC, s.submitted_at
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch quiz results: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(results))
}

pub async fn delete_question(
    State(pool): State<SqlitePool>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz_id: i64 = sqlx::query_scalar("SELECT quiz_id FROM questions WHERE id = ?")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

    Quiz::find_owned(&pool, &actor, quiz_id).await?;
    Quiz::ensure_editable(&pool, quiz_id).await?;

    sqlx::query("DELETE FROM questions WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete question: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(StatusCode::NO_CONTENT)
}
