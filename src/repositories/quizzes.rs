use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{Choice, Question, Quiz};
use crate::db::types::{QuestionType, UserRole};

pub(crate) const COLUMNS: &str = "\
    id, title, description, subject_id, created_by, duration_minutes, start_time, end_time, \
    is_published, shuffle_questions, allow_retake, created_at, updated_at";

const QUESTION_COLUMNS: &str = "id, quiz_id, text, question_type, marks, position";
const CHOICE_COLUMNS: &str = "id, question_id, text, is_correct, position";

/// Listing row used by the management views and dashboards.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct QuizSummaryRow {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) subject_id: String,
    pub(crate) subject_name: String,
    pub(crate) class_name: String,
    pub(crate) created_by: Option<String>,
    pub(crate) created_by_username: Option<String>,
    pub(crate) start_time: PrimitiveDateTime,
    pub(crate) end_time: PrimitiveDateTime,
    pub(crate) duration_minutes: i32,
    pub(crate) is_published: bool,
    pub(crate) allow_retake: bool,
    pub(crate) question_count: i64,
    pub(crate) attempt_count: i64,
    pub(crate) created_at: PrimitiveDateTime,
}

const SUMMARY_SELECT: &str = "\
    SELECT q.id, q.title, q.subject_id, s.name AS subject_name, c.name AS class_name, \
           q.created_by, u.username AS created_by_username, q.start_time, q.end_time, \
           q.duration_minutes, q.is_published, q.allow_retake, \
           (SELECT COUNT(*) FROM questions qq WHERE qq.quiz_id = q.id) AS question_count, \
           (SELECT COUNT(*) FROM quiz_attempts a WHERE a.quiz_id = q.id) AS attempt_count, \
           q.created_at \
    FROM quizzes q \
    JOIN subjects s ON s.id = q.subject_id \
    JOIN school_classes c ON c.id = s.school_class_id \
    LEFT JOIN users u ON u.id = q.created_by";

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Quiz>, sqlx::Error> {
    sqlx::query_as::<_, Quiz>(&format!("SELECT {COLUMNS} FROM quizzes WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) struct QuizFields<'a> {
    pub(crate) title: &'a str,
    pub(crate) description: Option<&'a str>,
    pub(crate) subject_id: &'a str,
    pub(crate) duration_minutes: i32,
    pub(crate) start_time: PrimitiveDateTime,
    pub(crate) end_time: PrimitiveDateTime,
    pub(crate) is_published: bool,
    pub(crate) shuffle_questions: bool,
    pub(crate) allow_retake: bool,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    created_by: &str,
    fields: &QuizFields<'_>,
    now: PrimitiveDateTime,
) -> Result<Quiz, sqlx::Error> {
    sqlx::query_as::<_, Quiz>(&format!(
        "INSERT INTO quizzes (
            id, title, description, subject_id, created_by, duration_minutes,
            start_time, end_time, is_published, shuffle_questions, allow_retake,
            created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$12)
        RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(fields.title)
    .bind(fields.description)
    .bind(fields.subject_id)
    .bind(created_by)
    .bind(fields.duration_minutes)
    .bind(fields.start_time)
    .bind(fields.end_time)
    .bind(fields.is_published)
    .bind(fields.shuffle_questions)
    .bind(fields.allow_retake)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn update(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    fields: &QuizFields<'_>,
    now: PrimitiveDateTime,
) -> Result<Quiz, sqlx::Error> {
    sqlx::query_as::<_, Quiz>(&format!(
        "UPDATE quizzes SET
            title = $1, description = $2, subject_id = $3, duration_minutes = $4,
            start_time = $5, end_time = $6, is_published = $7, shuffle_questions = $8,
            allow_retake = $9, updated_at = $10
         WHERE id = $11
         RETURNING {COLUMNS}"
    ))
    .bind(fields.title)
    .bind(fields.description)
    .bind(fields.subject_id)
    .bind(fields.duration_minutes)
    .bind(fields.start_time)
    .bind(fields.end_time)
    .bind(fields.is_published)
    .bind(fields.shuffle_questions)
    .bind(fields.allow_retake)
    .bind(now)
    .bind(id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn toggle_publish(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "UPDATE quizzes SET is_published = NOT is_published, updated_at = $1
         WHERE id = $2
         RETURNING is_published",
    )
    .bind(now)
    .bind(id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn delete_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM quizzes WHERE id = $1").bind(id).execute(executor).await?;
    Ok(())
}

pub(crate) async fn delete_questions(
    executor: impl sqlx::PgExecutor<'_>,
    quiz_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM questions WHERE quiz_id = $1").bind(quiz_id).execute(executor).await?;
    Ok(())
}

pub(crate) struct CreateQuestion<'a> {
    pub(crate) id: &'a str,
    pub(crate) quiz_id: &'a str,
    pub(crate) text: &'a str,
    pub(crate) question_type: QuestionType,
    pub(crate) marks: f64,
    pub(crate) position: i32,
}

pub(crate) async fn insert_question(
    executor: impl sqlx::PgExecutor<'_>,
    question: CreateQuestion<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO questions (id, quiz_id, text, question_type, marks, position)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(question.id)
    .bind(question.quiz_id)
    .bind(question.text)
    .bind(question.question_type)
    .bind(question.marks)
    .bind(question.position)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn insert_choice(
    executor: impl sqlx::PgExecutor<'_>,
    question_id: &str,
    text: &str,
    is_correct: bool,
    position: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO choices (id, question_id, text, is_correct, position)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(question_id)
    .bind(text)
    .bind(is_correct)
    .bind(position)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn list_questions(
    executor: impl sqlx::PgExecutor<'_>,
    quiz_id: &str,
) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE quiz_id = $1 ORDER BY position, id"
    ))
    .bind(quiz_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn find_question_in_quiz(
    executor: impl sqlx::PgExecutor<'_>,
    quiz_id: &str,
    question_id: &str,
) -> Result<Option<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1 AND quiz_id = $2"
    ))
    .bind(question_id)
    .bind(quiz_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_choices_for_quiz(
    executor: impl sqlx::PgExecutor<'_>,
    quiz_id: &str,
) -> Result<Vec<Choice>, sqlx::Error> {
    sqlx::query_as::<_, Choice>(
        "SELECT c.id, c.question_id, c.text, c.is_correct, c.position
         FROM choices c
         JOIN questions q ON q.id = c.question_id
         WHERE q.quiz_id = $1
         ORDER BY c.question_id, c.position, c.id",
    )
    .bind(quiz_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn find_choice_for_question(
    executor: impl sqlx::PgExecutor<'_>,
    question_id: &str,
    choice_id: &str,
) -> Result<Option<Choice>, sqlx::Error> {
    sqlx::query_as::<_, Choice>(&format!(
        "SELECT {CHOICE_COLUMNS} FROM choices WHERE id = $1 AND question_id = $2"
    ))
    .bind(choice_id)
    .bind(question_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn total_marks(
    executor: impl sqlx::PgExecutor<'_>,
    quiz_id: &str,
) -> Result<f64, sqlx::Error> {
    sqlx::query_scalar("SELECT COALESCE(SUM(marks), 0)::float8 FROM questions WHERE quiz_id = $1")
        .bind(quiz_id)
        .fetch_one(executor)
        .await
}

pub(crate) async fn count_attempts(
    executor: impl sqlx::PgExecutor<'_>,
    quiz_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM quiz_attempts WHERE quiz_id = $1")
        .bind(quiz_id)
        .fetch_one(executor)
        .await
}

/// Quizzes visible in the management view: own quizzes for teachers, all for administrators.
pub(crate) async fn list_managed(
    pool: &PgPool,
    owner: Option<&str>,
    skip: i64,
    limit: i64,
) -> Result<Vec<QuizSummaryRow>, sqlx::Error> {
    sqlx::query_as::<_, QuizSummaryRow>(&format!(
        "{SUMMARY_SELECT}
         WHERE ($1::varchar IS NULL OR q.created_by = $1)
         ORDER BY q.created_at DESC
         OFFSET $2 LIMIT $3"
    ))
    .bind(owner)
    .bind(skip.max(0))
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_managed(pool: &PgPool, owner: Option<&str>) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM quizzes WHERE ($1::varchar IS NULL OR created_by = $1)")
        .bind(owner)
        .fetch_one(pool)
        .await
}

/// Published quizzes for a class, authored by staff.
pub(crate) async fn list_for_class(
    pool: &PgPool,
    class_id: &str,
) -> Result<Vec<QuizSummaryRow>, sqlx::Error> {
    sqlx::query_as::<_, QuizSummaryRow>(&format!(
        "{SUMMARY_SELECT}
         WHERE s.school_class_id = $1
           AND q.is_published
           AND u.role <> $2
         ORDER BY q.start_time DESC"
    ))
    .bind(class_id)
    .bind(UserRole::Student)
    .fetch_all(pool)
    .await
}

/// Subject's class id for a quiz; used to check student eligibility.
pub(crate) async fn class_id_for_quiz(
    executor: impl sqlx::PgExecutor<'_>,
    quiz_id: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT s.school_class_id FROM quizzes q JOIN subjects s ON s.id = q.subject_id
         WHERE q.id = $1",
    )
    .bind(quiz_id)
    .fetch_optional(executor)
    .await
}
