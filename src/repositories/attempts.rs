use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::QuizAttempt;
use crate::db::types::AttemptStatus;

pub(crate) const COLUMNS: &str = "\
    id, quiz_id, student_id, attempt_number, status, started_at, expires_at, \
    submitted_at, auto_submitted, score, total_marks, graded, retake_allowed";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct StudentAttemptRow {
    pub(crate) id: String,
    pub(crate) quiz_id: String,
    pub(crate) quiz_title: String,
    pub(crate) subject_name: String,
    pub(crate) attempt_number: i32,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    pub(crate) score: f64,
    pub(crate) total_marks: f64,
    pub(crate) graded: bool,
    pub(crate) pending_count: i64,
}

/// Serializes attempt creation for one (quiz, student) pair until the transaction ends.
pub(crate) async fn acquire_quiz_student_lock(
    executor: impl sqlx::PgExecutor<'_>,
    quiz_id: &str,
    student_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1), hashtext($2))")
        .bind(quiz_id)
        .bind(student_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<QuizAttempt>, sqlx::Error> {
    sqlx::query_as::<_, QuizAttempt>(&format!("SELECT {COLUMNS} FROM quiz_attempts WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn find_by_id_for_update(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<QuizAttempt>, sqlx::Error> {
    sqlx::query_as::<_, QuizAttempt>(&format!(
        "SELECT {COLUMNS} FROM quiz_attempts WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn find_latest(
    executor: impl sqlx::PgExecutor<'_>,
    quiz_id: &str,
    student_id: &str,
) -> Result<Option<QuizAttempt>, sqlx::Error> {
    sqlx::query_as::<_, QuizAttempt>(&format!(
        "SELECT {COLUMNS} FROM quiz_attempts
         WHERE quiz_id = $1 AND student_id = $2
         ORDER BY attempt_number DESC
         LIMIT 1"
    ))
    .bind(quiz_id)
    .bind(student_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn count_for_student(
    executor: impl sqlx::PgExecutor<'_>,
    quiz_id: &str,
    student_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM quiz_attempts WHERE quiz_id = $1 AND student_id = $2")
        .bind(quiz_id)
        .bind(student_id)
        .fetch_one(executor)
        .await
}

pub(crate) struct CreateAttempt<'a> {
    pub(crate) id: &'a str,
    pub(crate) quiz_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) attempt_number: i32,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) expires_at: PrimitiveDateTime,
    pub(crate) total_marks: f64,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateAttempt<'_>,
) -> Result<QuizAttempt, sqlx::Error> {
    sqlx::query_as::<_, QuizAttempt>(&format!(
        "INSERT INTO quiz_attempts (
            id, quiz_id, student_id, attempt_number, status, started_at, expires_at,
            auto_submitted, score, total_marks, graded, retake_allowed
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, 0, $8, FALSE, FALSE)
        RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.quiz_id)
    .bind(params.student_id)
    .bind(params.attempt_number)
    .bind(AttemptStatus::Active)
    .bind(params.started_at)
    .bind(params.expires_at)
    .bind(params.total_marks)
    .fetch_one(executor)
    .await
}

pub(crate) async fn mark_submitted(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    submitted_at: PrimitiveDateTime,
    auto_submitted: bool,
    score: f64,
    graded: bool,
) -> Result<QuizAttempt, sqlx::Error> {
    sqlx::query_as::<_, QuizAttempt>(&format!(
        "UPDATE quiz_attempts
         SET status = $1, submitted_at = $2, auto_submitted = $3, score = $4, graded = $5
         WHERE id = $6
         RETURNING {COLUMNS}"
    ))
    .bind(AttemptStatus::Submitted)
    .bind(submitted_at)
    .bind(auto_submitted)
    .bind(score)
    .bind(graded)
    .bind(id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn update_score(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    score: f64,
    graded: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE quiz_attempts SET score = $1, graded = $2 WHERE id = $3")
        .bind(score)
        .bind(graded)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn set_retake_allowed(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    allowed: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE quiz_attempts SET retake_allowed = $1 WHERE id = $2")
        .bind(allowed)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

/// Active attempts whose deadline has passed, oldest first.
pub(crate) async fn list_expired_ids(
    pool: &PgPool,
    now: PrimitiveDateTime,
    limit: i64,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT id FROM quiz_attempts
         WHERE status = $1 AND expires_at < $2
         ORDER BY expires_at
         LIMIT $3",
    )
    .bind(AttemptStatus::Active)
    .bind(now)
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_for_student(
    pool: &PgPool,
    student_id: &str,
    limit: i64,
) -> Result<Vec<StudentAttemptRow>, sqlx::Error> {
    sqlx::query_as::<_, StudentAttemptRow>(
        "SELECT a.id, a.quiz_id, q.title AS quiz_title, s.name AS subject_name,
                a.attempt_number, a.status, a.started_at, a.submitted_at, a.score,
                a.total_marks, a.graded,
                (SELECT COUNT(*) FROM answers an
                  WHERE an.attempt_id = a.id AND an.is_pending) AS pending_count
         FROM quiz_attempts a
         JOIN quizzes q ON q.id = a.quiz_id
         JOIN subjects s ON s.id = q.subject_id
         WHERE a.student_id = $1
         ORDER BY a.started_at DESC
         LIMIT $2",
    )
    .bind(student_id)
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
}

/// Latest attempt per quiz for a student.
pub(crate) async fn latest_per_quiz(
    pool: &PgPool,
    student_id: &str,
) -> Result<Vec<QuizAttempt>, sqlx::Error> {
    sqlx::query_as::<_, QuizAttempt>(&format!(
        "SELECT DISTINCT ON (quiz_id) {COLUMNS} FROM quiz_attempts
         WHERE student_id = $1
         ORDER BY quiz_id, attempt_number DESC"
    ))
    .bind(student_id)
    .fetch_all(pool)
    .await
}
