// src/generation/ingest.rs

use serde::Serialize;
use sqlx::{Acquire, SqliteConnection, SqlitePool};

use crate::{
    error::AppError,
    models::{
        question::{DraftError, Question, QuestionDetail, QuestionDraft, QuizOption, TruthValue},
        quiz::Quiz,
        user::{Actor, Role},
    },
};

/// Outcome of one ingestion batch.
#[derive(Debug, Serialize)]
pub struct IngestReport {
    pub saved: Vec<QuestionDetail>,
    /// Items dropped before or during persistence.
    pub discarded: usize,
}

impl IngestReport {
    pub fn saved_count(&self) -> usize {
        self.saved.len()
    }

    /// Nothing survived; the transaction was rolled back.
    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }
}

/// Writes `drafts` into a quiz in one transaction.
///
/// Each question gets its own savepoint, so an item failing its checks is
/// rolled back alone. When no item survives, the whole transaction is rolled
/// back and an empty report is returned. Database errors abort the batch.
pub async fn ingest_questions(
    pool: &SqlitePool,
    actor: &Actor,
    quiz_id: i64,
    drafts: Vec<QuestionDraft>,
) -> Result<IngestReport, AppError> {
    actor.require(Role::Teacher)?;

    let mut tx = pool.begin().await?;

    Quiz::find_owned(&mut *tx, actor, quiz_id).await?;
    Quiz::ensure_editable(&mut *tx, quiz_id).await?;

    let mut saved = Vec::with_capacity(drafts.len());
    let mut discarded = 0;

    for (index, draft) in drafts.into_iter().enumerate() {
        if let Err(reason) = draft.check() {
            tracing::warn!(index, %reason, "Skipping question before insert");
            discarded += 1;
            continue;
        }

        let mut item = tx.begin().await?;
        let stored = insert_question(&mut *item, quiz_id, &draft).await?;

        match verify_stored(&mut *item, &stored).await? {
            Ok(()) => {
                item.commit().await?;
                saved.push(stored);
            }
            Err(reason) => {
                tracing::warn!(index, %reason, "Rolling back question that failed persistence check");
                item.rollback().await?;
                discarded += 1;
            }
        }
    }

    if saved.is_empty() {
        tx.rollback().await?;
        tracing::warn!(quiz_id, discarded, "No valid questions could be saved");
        return Ok(IngestReport { saved, discarded });
    }

    sqlx::query("UPDATE quizzes SET updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(quiz_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await.map_err(|e| {
        tracing::error!("Failed to commit question batch: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    tracing::info!(quiz_id, saved = saved.len(), discarded, "Questions added to quiz");

    Ok(IngestReport { saved, discarded })
}

/// Inserts one question (and its options) on `conn`. No validation here.
pub async fn insert_question(
    conn: &mut SqliteConnection,
    quiz_id: i64,
    draft: &QuestionDraft,
) -> Result<QuestionDetail, sqlx::Error> {
    let question = sqlx::query_as::<_, Question>(
        r#"
        INSERT INTO questions (quiz_id, question_text, question_type, marks, correct_answer)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id, quiz_id, question_text, question_type, marks, correct_answer, created_at
        "#,
    )
    .bind(quiz_id)
    .bind(draft.question_text().trim())
    .bind(draft.question_type().as_str())
    .bind(draft.marks())
    .bind(draft.stored_answer())
    .fetch_one(&mut *conn)
    .await?;

    let mut options = Vec::new();
    if let QuestionDraft::Mcq(mcq) = draft {
        for (idx, text) in mcq.options.iter().enumerate() {
            let option = sqlx::query_as::<_, QuizOption>(
                r#"
                INSERT INTO options (question_id, option_text, is_correct)
                VALUES (?, ?, ?)
                RETURNING id, question_id, option_text, is_correct
                "#,
            )
            .bind(question.id)
            .bind(text.trim())
            .bind(idx == mcq.correct_option_index)
            .fetch_one(&mut *conn)
            .await?;
            options.push(option);
        }
    }

    Ok(QuestionDetail { question, options })
}

/// Re-reads what was written and checks the per-type invariants.
async fn verify_stored(
    conn: &mut SqliteConnection,
    stored: &QuestionDetail,
) -> Result<Result<(), DraftError>, sqlx::Error> {
    let question = &stored.question;

    let verdict = match question.question_type.as_str() {
        "mcq" => {
            let (total, correct): (i64, i64) = sqlx::query_as(
                "SELECT COUNT(*), COALESCE(SUM(is_correct), 0) FROM options WHERE question_id = ?",
            )
            .bind(question.id)
            .fetch_one(&mut *conn)
            .await?;

            if total < 2 {
                Err(DraftError::TooFewOptions(total as usize))
            } else if correct != 1 {
                Err(DraftError::CorrectOptionCount(correct))
            } else {
                Ok(())
            }
        }
        "true_false" => match question.correct_answer.as_deref().and_then(TruthValue::parse) {
            Some(_) => Ok(()),
            None => Err(DraftError::EmptyAnswer),
        },
        _ => match question.correct_answer.as_deref().map(str::trim) {
            Some(answer) if !answer.is_empty() => Ok(()),
            _ => Err(DraftError::EmptyAnswer),
        },
    };

    Ok(verdict)
}

/// Adds a single teacher-authored question through the same write path.
pub async fn add_question(
    pool: &SqlitePool,
    actor: &Actor,
    quiz_id: i64,
    draft: QuestionDraft,
) -> Result<QuestionDetail, AppError> {
    let mut report = ingest_questions(pool, actor, quiz_id, vec![draft]).await?;
    report
        .saved
        .pop()
        .ok_or(AppError::BadRequest("Question could not be saved".to_string()))
}
