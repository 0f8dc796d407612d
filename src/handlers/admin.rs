// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    models::user::{Actor, AdminCreateUserRequest, AdminDashboard, AdminUpdateUserRequest, User},
    utils::hash::hash_password,
};

/// Counts for the admin landing page. Admins are not counted as users.
pub async fn dashboard(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let (total_teachers, total_students): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN role = 'teacher' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN role = 'student' THEN 1 ELSE 0 END), 0)
        FROM users
        "#,
    )
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to count users: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let total_quizzes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM quizzes")
        .fetch_one(&pool)
        .await?;

    Ok(Json(AdminDashboard {
        total_users: total_teachers + total_students,
        total_teachers,
        total_students,
        total_quizzes,
    }))
}

/// Lists all users in the system, newest first.
pub async fn list_users(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, email, password, role, created_at
        FROM users
        ORDER BY id DESC
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list users: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(users))
}

/// Creates a user with any role, admins included.
pub async fn create_user(
    State(pool): State<SqlitePool>,
    Json(payload): Json<AdminCreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let hashed_password = hash_password(&payload.password)?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO users (username, email, password, role)
        VALUES (?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(payload.username.trim())
    .bind(payload.email.trim())
    .bind(&hashed_password)
    .bind(payload.role.as_str())
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Username or email already exists".to_string())
        } else {
            tracing::error!("Failed to create user: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    tracing::info!(user_id = id, role = %payload.role, "User created by admin");

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// Updates the provided fields of a user.
pub async fn update_user(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<AdminUpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if payload.username.is_none()
        && payload.email.is_none()
        && payload.role.is_none()
        && payload.password.is_none()
    {
        return Ok(StatusCode::OK);
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE users SET ");
    let mut separated = builder.separated(", ");

    if let Some(username) = payload.username {
        separated.push("username = ");
        separated.push_bind_unseparated(username.trim().to_string());
    }

    if let Some(email) = payload.email {
        separated.push("email = ");
        separated.push_bind_unseparated(email.trim().to_string());
    }

    if let Some(role) = payload.role {
        separated.push("role = ");
        separated.push_bind_unseparated(role.as_str());
    }

    if let Some(password) = payload.password {
        separated.push("password = ");
        separated.push_bind_unseparated(hash_password(&password)?);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Username or email already exists".to_string())
        } else {
            tracing::error!("Failed to update user: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deletes a user by ID. Prevents deleting self.
pub async fn delete_user(
    State(pool): State<SqlitePool>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if id == actor.id {
        return Err(AppError::BadRequest("Cannot delete yourself".to_string()));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete user: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, FromRow)]
struct AuditRow {
    question_id: i64,
    quiz_id: i64,
    quiz_title: String,
    question_type: String,
    question_text: String,
    correct_answer: Option<String>,
    correct_options: i64,
}

/// A stored question whose answer key cannot grade anything.
#[derive(Debug, Serialize)]
pub struct QuestionIssue {
    pub question_id: i64,
    pub quiz_id: i64,
    pub quiz_title: String,
    pub question_type: String,
    pub question_text: String,
    pub issue: String,
}

impl From<AuditRow> for QuestionIssue {
    fn from(row: AuditRow) -> Self {
        let issue = match row.question_type.as_str() {
            "mcq" if row.correct_options == 0 => "No correct option".to_string(),
            "mcq" => format!("{} options marked correct", row.correct_options),
            "true_false" => match row.correct_answer {
                Some(answer) => format!("Invalid true/false answer '{}'", answer),
                None => "Missing true/false answer".to_string(),
            },
            _ => "Missing reference answer".to_string(),
        };

        Self {
            question_id: row.question_id,
            quiz_id: row.quiz_id,
            quiz_title: row.quiz_title,
            question_type: row.question_type,
            question_text: row.question_text,
            issue,
        }
    }
}

/// Lists questions with a broken answer key.
pub async fn question_audit(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let rows = sqlx::query_as::<_, AuditRow>(
        r#"
        SELECT q.id AS question_id, q.quiz_id, z.title AS quiz_title, q.question_type,
               q.question_text, q.correct_answer,
               (SELECT COUNT(*) FROM options o
                WHERE o.question_id = q.id AND o.is_correct = 1) AS correct_options
        FROM questions q
        JOIN quizzes z ON z.id = q.quiz_id
        WHERE (q.question_type = 'true_false'
               AND (q.correct_answer IS NULL OR TRIM(q.correct_answer, char(32, 9, 10, 13)) NOT IN ('True', 'False')))
           OR (q.question_type = 'short_answer'
               AND (q.correct_answer IS NULL OR TRIM(q.correct_answer) = ''))
           OR (q.question_type = 'mcq'
               AND (SELECT COUNT(*) FROM options o
                    WHERE o.question_id = q.id AND o.is_correct = 1) != 1)
        ORDER BY q.id
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to audit questions: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let issues: Vec<QuestionIssue> = rows.into_iter().map(QuestionIssue::from).collect();

    Ok(Json(issues))
}

/// Deletes mcq questions that have no correct option.
pub async fn repair_questions(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query(
        r#"
        DELETE FROM questions
        WHERE question_type = 'mcq'
          AND NOT EXISTS (
              SELECT 1 FROM options o
              WHERE o.question_id = questions.id AND o.is_correct = 1
          )
        "#,
    )
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to repair questions: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let deleted = result.rows_affected();
    if deleted > 0 {
        tracing::warn!(deleted, "Deleted mcq questions without a correct option");
    }

    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(question_type: &str, correct_answer: Option<&str>, correct_options: i64) -> AuditRow {
        AuditRow {
            question_id: 1,
            quiz_id: 1,
            quiz_title: "Cells".to_string(),
            question_type: question_type.to_string(),
            question_text: "?".to_string(),
            correct_answer: correct_answer.map(str::to_string),
            correct_options,
        }
    }

    #[test]
    fn issue_describes_the_broken_key() {
        assert_eq!(QuestionIssue::from(row("mcq", None, 0)).issue, "No correct option");
        assert_eq!(
            QuestionIssue::from(row("mcq", None, 2)).issue,
            "2 options marked correct"
        );
        assert_eq!(
            QuestionIssue::from(row("true_false", Some("yes"), 0)).issue,
            "Invalid true/false answer 'yes'"
        );
        assert_eq!(
            QuestionIssue::from(row("short_answer", None, 0)).issue,
            "Missing reference answer"
        );
    }
}
