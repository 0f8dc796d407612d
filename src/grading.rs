// src/grading.rs

//! Scores a full quiz attempt and stores it as the student's only submission.

use std::collections::HashMap;

use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    error::{AppError, is_unique_violation},
    models::{
        question::QuestionType,
        quiz::Quiz,
        submission::{GradingStatus, StudentAnswer, SubmissionReceipt},
        user::{Actor, Role},
    },
};

/// Everything needed to grade one question.
#[derive(Debug, Clone)]
pub struct AnswerKey {
    pub question_id: i64,
    pub question_type: QuestionType,
    pub marks: i64,
    pub correct_answer: Option<String>,
    /// Option id -> is_correct, mcq only.
    pub options: HashMap<i64, bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradedAnswer {
    pub question_id: i64,
    pub selected_option_id: Option<i64>,
    pub answer_text: Option<String>,
    pub is_correct: bool,
    pub marks_obtained: i64,
    pub status: GradingStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradedSubmission {
    pub score: i64,
    /// Sum of every question's marks, answered or not.
    pub total_marks: i64,
    pub answers: Vec<GradedAnswer>,
}

/// Grades `submitted` against `keys`. Pure; answers for unknown questions are ignored.
pub fn grade(keys: &[AnswerKey], submitted: &HashMap<i64, String>) -> GradedSubmission {
    let answers: Vec<GradedAnswer> = keys
        .iter()
        .map(|key| grade_one(key, submitted.get(&key.question_id).map(String::as_str)))
        .collect();

    GradedSubmission {
        score: answers.iter().map(|a| a.marks_obtained).sum(),
        total_marks: keys.iter().map(|k| k.marks).sum(),
        answers,
    }
}

fn grade_one(key: &AnswerKey, raw: Option<&str>) -> GradedAnswer {
    let mut graded = GradedAnswer {
        question_id: key.question_id,
        selected_option_id: None,
        answer_text: None,
        is_correct: false,
        marks_obtained: 0,
        status: GradingStatus::Graded,
    };

    match key.question_type {
        QuestionType::Mcq => {
            let resolved = raw
                .and_then(|r| r.trim().parse::<i64>().ok())
                .and_then(|id| key.options.get(&id).map(|correct| (id, *correct)));
            if let Some((option_id, correct)) = resolved {
                graded.selected_option_id = Some(option_id);
                graded.is_correct = correct;
            }
        }
        QuestionType::TrueFalse => {
            let given = raw.map(str::trim);
            graded.answer_text = given.map(str::to_string);
            graded.is_correct = match (given, key.correct_answer.as_deref()) {
                (Some(given), Some(expected)) => given == expected.trim(),
                _ => false,
            };
        }
        QuestionType::ShortAnswer => {
            graded.answer_text = raw.map(|r| r.trim().to_string());
            graded.status = GradingStatus::Pending;
        }
    }

    if graded.is_correct {
        graded.marks_obtained = key.marks;
    }
    graded
}

/// Answer keys for every question of a quiz.
pub async fn load_answer_keys(
    conn: &mut SqliteConnection,
    quiz_id: i64,
) -> Result<Vec<AnswerKey>, AppError> {
    let rows: Vec<(i64, String, i64, Option<String>)> = sqlx::query_as(
        "SELECT id, question_type, marks, correct_answer FROM questions WHERE quiz_id = ? ORDER BY id",
    )
    .bind(quiz_id)
    .fetch_all(&mut *conn)
    .await?;

    let option_rows: Vec<(i64, i64, bool)> = sqlx::query_as(
        r#"
        SELECT o.id, o.question_id, o.is_correct
        FROM options o
        JOIN questions q ON q.id = o.question_id
        WHERE q.quiz_id = ?
        "#,
    )
    .bind(quiz_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut options: HashMap<i64, HashMap<i64, bool>> = HashMap::new();
    for (option_id, question_id, is_correct) in option_rows {
        options
            .entry(question_id)
            .or_default()
            .insert(option_id, is_correct);
    }

    rows.into_iter()
        .map(|(question_id, question_type, marks, correct_answer)| -> Result<AnswerKey, AppError> {
            Ok(AnswerKey {
                question_id,
                question_type: question_type.parse()?,
                marks,
                correct_answer,
                options: options.remove(&question_id).unwrap_or_default(),
            })
        })
        .collect()
}

/// Grades and stores a student's attempt. A second attempt is rejected with
/// `Conflict` and leaves the first one untouched.
pub async fn submit_quiz(
    pool: &SqlitePool,
    actor: &Actor,
    quiz_id: i64,
    answers: &HashMap<i64, String>,
) -> Result<SubmissionReceipt, AppError> {
    actor.require(Role::Student)?;

    let mut tx = pool.begin().await?;

    let quiz = Quiz::find(&mut *tx, quiz_id)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;
    if !quiz.is_published {
        return Err(AppError::Forbidden("This quiz is not available".to_string()));
    }

    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM quiz_submissions WHERE quiz_id = ? AND student_id = ?",
    )
    .bind(quiz_id)
    .bind(actor.id)
    .fetch_optional(&mut *tx)
    .await?;
    if existing.is_some() {
        return Err(AppError::Conflict("Quiz already submitted".to_string()));
    }

    let keys = load_answer_keys(&mut *tx, quiz_id).await?;
    let graded = grade(&keys, answers);

    let submission_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO quiz_submissions (quiz_id, student_id, score, total_marks)
        VALUES (?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(quiz_id)
    .bind(actor.id)
    .bind(graded.score)
    .bind(graded.total_marks)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Quiz already submitted".to_string())
        } else {
            tracing::error!("Failed to insert submission: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    let mut stored = Vec::with_capacity(graded.answers.len());
    for answer in &graded.answers {
        let row = sqlx::query_as::<_, StudentAnswer>(
            r#"
            INSERT INTO student_answers
                (submission_id, question_id, selected_option_id, answer_text,
                 is_correct, marks_obtained, grading_status)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id, submission_id, question_id, selected_option_id, answer_text,
                      is_correct, marks_obtained, grading_status
            "#,
        )
        .bind(submission_id)
        .bind(answer.question_id)
        .bind(answer.selected_option_id)
        .bind(answer.answer_text.as_deref())
        .bind(answer.is_correct)
        .bind(answer.marks_obtained)
        .bind(answer.status.as_str())
        .fetch_one(&mut *tx)
        .await?;
        stored.push(row);
    }

    tx.commit().await.map_err(|e| {
        tracing::error!("Failed to commit submission: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let pending_answers = graded
        .answers
        .iter()
        .filter(|a| a.status == GradingStatus::Pending)
        .count();

    tracing::info!(
        quiz_id,
        student_id = actor.id,
        score = graded.score,
        total_marks = graded.total_marks,
        "Quiz submitted"
    );

    Ok(SubmissionReceipt {
        submission_id,
        score: graded.score,
        total_marks: graded.total_marks,
        pending_answers,
        answers: stored,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mcq_key(question_id: i64, marks: i64, options: &[(i64, bool)]) -> AnswerKey {
        AnswerKey {
            question_id,
            question_type: QuestionType::Mcq,
            marks,
            correct_answer: None,
            options: options.iter().copied().collect(),
        }
    }

    fn text_key(question_id: i64, kind: QuestionType, marks: i64, answer: &str) -> AnswerKey {
        AnswerKey {
            question_id,
            question_type: kind,
            marks,
            correct_answer: Some(answer.to_string()),
            options: HashMap::new(),
        }
    }

    fn answers(pairs: &[(i64, &str)]) -> HashMap<i64, String> {
        pairs.iter().map(|(q, a)| (*q, a.to_string())).collect()
    }

    #[test]
    fn true_false_comparison_is_case_sensitive() {
        let keys = vec![
            mcq_key(1, 2, &[(10, false), (11, true), (12, false)]),
            text_key(2, QuestionType::TrueFalse, 1, "True"),
        ];

        let result = grade(&keys, &answers(&[(1, "11"), (2, "true")]));

        assert_eq!(result.score, 2);
        assert_eq!(result.total_marks, 3);
        assert!(result.answers[0].is_correct);
        assert_eq!(result.answers[0].selected_option_id, Some(11));
        assert!(!result.answers[1].is_correct);
    }

    #[test]
    fn true_false_ignores_surrounding_whitespace() {
        let keys = vec![text_key(1, QuestionType::TrueFalse, 1, "False")];
        let result = grade(&keys, &answers(&[(1, "  False ")]));
        assert_eq!(result.score, 1);
    }

    #[test]
    fn short_answer_is_pending_with_zero_marks() {
        let keys = vec![text_key(5, QuestionType::ShortAnswer, 4, "Photosynthesis")];
        let result = grade(&keys, &answers(&[(5, "Photosynthesis")]));

        let answer = &result.answers[0];
        assert!(!answer.is_correct);
        assert_eq!(answer.marks_obtained, 0);
        assert_eq!(answer.status, GradingStatus::Pending);
        assert_eq!(answer.answer_text.as_deref(), Some("Photosynthesis"));
        assert_eq!(result.total_marks, 4);
    }

    #[test]
    fn option_from_another_question_does_not_resolve() {
        let keys = vec![
            mcq_key(1, 1, &[(10, true), (11, false)]),
            mcq_key(2, 1, &[(20, true), (21, false)]),
        ];
        let result = grade(&keys, &answers(&[(1, "20"), (2, "abc")]));

        assert_eq!(result.score, 0);
        assert_eq!(result.answers[0].selected_option_id, None);
        assert_eq!(result.answers[1].selected_option_id, None);
    }

    #[test]
    fn unanswered_questions_still_count_toward_total() {
        let keys = vec![
            mcq_key(1, 3, &[(10, true), (11, false)]),
            text_key(2, QuestionType::TrueFalse, 2, "True"),
        ];
        let result = grade(&keys, &HashMap::new());

        assert_eq!(result.score, 0);
        assert_eq!(result.total_marks, 5);
        assert_eq!(result.answers.len(), 2);
    }

    #[test]
    fn answers_for_unknown_questions_are_ignored() {
        let keys = vec![text_key(1, QuestionType::TrueFalse, 1, "True")];
        let result = grade(&keys, &answers(&[(1, "True"), (99, "True")]));

        assert_eq!(result.score, 1);
        assert_eq!(result.answers.len(), 1);
    }

    #[test]
    fn score_does_not_depend_on_key_order() {
        let mut keys = vec![
            mcq_key(1, 2, &[(10, true), (11, false)]),
            text_key(2, QuestionType::TrueFalse, 1, "False"),
            text_key(3, QuestionType::ShortAnswer, 5, "Osmosis"),
        ];
        let submitted = answers(&[(1, "10"), (2, "False"), (3, "Osmosis")]);

        let forward = grade(&keys, &submitted);
        keys.reverse();
        let backward = grade(&keys, &submitted);

        assert_eq!(forward.score, backward.score);
        assert_eq!(forward.total_marks, backward.total_marks);
        assert_eq!(forward.score, 3);
    }
}
