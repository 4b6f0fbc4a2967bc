use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Answer;
use crate::db::types::{AttemptStatus, QuestionType};

pub(crate) const COLUMNS: &str = "\
    id, attempt_id, question_id, selected_choice_id, text_answer, obtained_marks, \
    is_pending, graded_by, graded_at, feedback";

/// Minimal projection used to recompute an attempt score.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct ScoreRow {
    pub(crate) question_type: QuestionType,
    pub(crate) obtained_marks: f64,
    pub(crate) is_pending: bool,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ReviewRow {
    pub(crate) answer_id: String,
    pub(crate) question_id: String,
    pub(crate) question_text: String,
    pub(crate) question_type: QuestionType,
    pub(crate) max_marks: f64,
    pub(crate) position: i32,
    pub(crate) selected_choice_id: Option<String>,
    pub(crate) selected_choice_text: Option<String>,
    pub(crate) selected_is_correct: Option<bool>,
    pub(crate) text_answer: Option<String>,
    pub(crate) obtained_marks: f64,
    pub(crate) is_pending: bool,
    pub(crate) feedback: Option<String>,
    pub(crate) graded_by_username: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PendingAnswerRow {
    pub(crate) answer_id: String,
    pub(crate) attempt_id: String,
    pub(crate) quiz_id: String,
    pub(crate) quiz_title: String,
    pub(crate) student_id: String,
    pub(crate) student_username: String,
    pub(crate) student_first_name: String,
    pub(crate) student_last_name: String,
    pub(crate) question_id: String,
    pub(crate) question_text: String,
    pub(crate) text_answer: Option<String>,
    pub(crate) max_marks: f64,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
}

/// Answer joined with what grading needs to authorize and bound the mark.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct GradingTarget {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) question_type: QuestionType,
    pub(crate) max_marks: f64,
    pub(crate) attempt_status: AttemptStatus,
    pub(crate) quiz_id: String,
    pub(crate) quiz_title: String,
    pub(crate) quiz_created_by: Option<String>,
    pub(crate) student_id: String,
}

pub(crate) async fn insert_blank(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
    question_id: &str,
    is_pending: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO answers (id, attempt_id, question_id, obtained_marks, is_pending)
         VALUES ($1, $2, $3, 0, $4)
         ON CONFLICT (attempt_id, question_id) DO NOTHING",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(attempt_id)
    .bind(question_id)
    .bind(is_pending)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn list_for_attempt(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
) -> Result<Vec<Answer>, sqlx::Error> {
    sqlx::query_as::<_, Answer>(&format!(
        "SELECT {COLUMNS} FROM answers WHERE attempt_id = $1 ORDER BY question_id"
    ))
    .bind(attempt_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn save_objective(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
    question_id: &str,
    choice_id: Option<&str>,
    obtained_marks: f64,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO answers (
            id, attempt_id, question_id, selected_choice_id, obtained_marks, is_pending, graded_at
         ) VALUES ($1, $2, $3, $4, $5, FALSE, $6)
         ON CONFLICT (attempt_id, question_id) DO UPDATE
         SET selected_choice_id = EXCLUDED.selected_choice_id,
             obtained_marks = EXCLUDED.obtained_marks,
             is_pending = FALSE,
             graded_at = EXCLUDED.graded_at",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(attempt_id)
    .bind(question_id)
    .bind(choice_id)
    .bind(obtained_marks)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn save_subjective(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
    question_id: &str,
    text: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO answers (id, attempt_id, question_id, text_answer, obtained_marks, is_pending)
         VALUES ($1, $2, $3, $4, 0, TRUE)
         ON CONFLICT (attempt_id, question_id) DO UPDATE
         SET text_answer = EXCLUDED.text_answer, is_pending = TRUE",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(attempt_id)
    .bind(question_id)
    .bind(text)
    .execute(executor)
    .await?;
    Ok(())
}

/// Re-derives objective marks from the selected choice of every objective answer.
pub(crate) async fn regrade_objectives(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE answers an
         SET obtained_marks = COALESCE(
                (SELECT CASE WHEN c.is_correct THEN q.marks ELSE 0 END
                   FROM choices c
                  WHERE c.id = an.selected_choice_id AND c.question_id = q.id),
                0),
             is_pending = FALSE,
             graded_at = COALESCE(an.graded_at, $2)
         FROM questions q
         WHERE q.id = an.question_id
           AND an.attempt_id = $1
           AND q.question_type = $3",
    )
    .bind(attempt_id)
    .bind(now)
    .bind(QuestionType::Objective)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn score_rows(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
) -> Result<Vec<ScoreRow>, sqlx::Error> {
    sqlx::query_as::<_, ScoreRow>(
        "SELECT q.question_type, an.obtained_marks, an.is_pending
         FROM answers an
         JOIN questions q ON q.id = an.question_id
         WHERE an.attempt_id = $1",
    )
    .bind(attempt_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn review_rows(
    pool: &PgPool,
    attempt_id: &str,
) -> Result<Vec<ReviewRow>, sqlx::Error> {
    sqlx::query_as::<_, ReviewRow>(
        "SELECT an.id AS answer_id, q.id AS question_id, q.text AS question_text,
                q.question_type, q.marks AS max_marks, q.position,
                an.selected_choice_id, c.text AS selected_choice_text,
                c.is_correct AS selected_is_correct, an.text_answer, an.obtained_marks,
                an.is_pending, an.feedback, g.username AS graded_by_username
         FROM answers an
         JOIN questions q ON q.id = an.question_id
         LEFT JOIN choices c ON c.id = an.selected_choice_id
         LEFT JOIN users g ON g.id = an.graded_by
         WHERE an.attempt_id = $1
         ORDER BY q.position, q.id",
    )
    .bind(attempt_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn find_grading_target(
    executor: impl sqlx::PgExecutor<'_>,
    answer_id: &str,
) -> Result<Option<GradingTarget>, sqlx::Error> {
    sqlx::query_as::<_, GradingTarget>(
        "SELECT an.id, an.attempt_id, q.question_type, q.marks AS max_marks,
                a.status AS attempt_status, qz.id AS quiz_id, qz.title AS quiz_title,
                qz.created_by AS quiz_created_by, a.student_id
         FROM answers an
         JOIN questions q ON q.id = an.question_id
         JOIN quiz_attempts a ON a.id = an.attempt_id
         JOIN quizzes qz ON qz.id = a.quiz_id
         WHERE an.id = $1
         FOR UPDATE OF an, a",
    )
    .bind(answer_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn grade(
    executor: impl sqlx::PgExecutor<'_>,
    answer_id: &str,
    marks: f64,
    feedback: Option<&str>,
    graded_by: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE answers
         SET obtained_marks = $1, feedback = $2, graded_by = $3, graded_at = $4, is_pending = FALSE
         WHERE id = $5",
    )
    .bind(marks)
    .bind(feedback)
    .bind(graded_by)
    .bind(now)
    .bind(answer_id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Pending subjective answers on submitted attempts; restricted to one creator when given.
pub(crate) async fn list_pending(
    pool: &PgPool,
    creator_id: Option<&str>,
    limit: i64,
) -> Result<Vec<PendingAnswerRow>, sqlx::Error> {
    sqlx::query_as::<_, PendingAnswerRow>(
        "SELECT an.id AS answer_id, a.id AS attempt_id, qz.id AS quiz_id, qz.title AS quiz_title,
                u.id AS student_id, u.username AS student_username,
                u.first_name AS student_first_name, u.last_name AS student_last_name,
                q.id AS question_id, q.text AS question_text, an.text_answer,
                q.marks AS max_marks, a.submitted_at
         FROM answers an
         JOIN questions q ON q.id = an.question_id
         JOIN quiz_attempts a ON a.id = an.attempt_id
         JOIN quizzes qz ON qz.id = a.quiz_id
         JOIN users u ON u.id = a.student_id
         WHERE an.is_pending
           AND q.question_type = $1
           AND a.status = $2
           AND ($3::varchar IS NULL OR qz.created_by = $3)
         ORDER BY a.started_at, q.position
         LIMIT $4",
    )
    .bind(QuestionType::Subjective)
    .bind(AttemptStatus::Submitted)
    .bind(creator_id)
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_pending(
    pool: &PgPool,
    creator_id: Option<&str>,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*)
         FROM answers an
         JOIN questions q ON q.id = an.question_id
         JOIN quiz_attempts a ON a.id = an.attempt_id
         JOIN quizzes qz ON qz.id = a.quiz_id
         WHERE an.is_pending
           AND q.question_type = $1
           AND a.status = $2
           AND ($3::varchar IS NULL OR qz.created_by = $3)",
    )
    .bind(QuestionType::Subjective)
    .bind(AttemptStatus::Submitted)
    .bind(creator_id)
    .fetch_one(pool)
    .await
}

pub(crate) async fn count_pending_for_student(
    pool: &PgPool,
    student_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*)
         FROM answers an
         JOIN quiz_attempts a ON a.id = an.attempt_id
         WHERE an.is_pending AND a.student_id = $1",
    )
    .bind(student_id)
    .fetch_one(pool)
    .await
}

/// Objective questions answered wrongly (or left blank) on one attempt.
pub(crate) async fn wrong_objective_texts(
    pool: &PgPool,
    attempt_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT q.text
         FROM answers an
         JOIN questions q ON q.id = an.question_id
         LEFT JOIN choices c ON c.id = an.selected_choice_id
         WHERE an.attempt_id = $1
           AND q.question_type = $2
           AND COALESCE(c.is_correct, FALSE) = FALSE
         ORDER BY q.position, q.id",
    )
    .bind(attempt_id)
    .bind(QuestionType::Objective)
    .fetch_all(pool)
    .await
}
