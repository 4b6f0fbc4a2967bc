use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{SchoolClass, Subject};

const CLASS_COLUMNS: &str = "id, name, description, created_at";
const SUBJECT_COLUMNS: &str = "id, name, school_class_id, created_at";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ClassWithCounts {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) subject_count: i64,
    pub(crate) student_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SubjectWithClass {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) school_class_id: String,
    pub(crate) class_name: String,
}

pub(crate) async fn list_classes(pool: &PgPool) -> Result<Vec<ClassWithCounts>, sqlx::Error> {
    sqlx::query_as::<_, ClassWithCounts>(
        "SELECT c.id, c.name, c.description,
                (SELECT COUNT(*) FROM subjects s WHERE s.school_class_id = c.id) AS subject_count,
                (SELECT COUNT(*) FROM users u
                  WHERE u.school_class_id = c.id AND u.role = 'student') AS student_count
         FROM school_classes c
         ORDER BY c.name",
    )
    .fetch_all(pool)
    .await
}

pub(crate) async fn find_class(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<SchoolClass>, sqlx::Error> {
    sqlx::query_as::<_, SchoolClass>(&format!(
        "SELECT {CLASS_COLUMNS} FROM school_classes WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn find_class_by_name(
    executor: impl sqlx::PgExecutor<'_>,
    name: &str,
) -> Result<Option<SchoolClass>, sqlx::Error> {
    sqlx::query_as::<_, SchoolClass>(&format!(
        "SELECT {CLASS_COLUMNS} FROM school_classes WHERE lower(name) = lower($1)"
    ))
    .bind(name.trim())
    .fetch_optional(executor)
    .await
}

/// Inserts a class; returns `None` when the name is already taken.
pub(crate) async fn create_class(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    name: &str,
    description: Option<&str>,
    now: PrimitiveDateTime,
) -> Result<Option<SchoolClass>, sqlx::Error> {
    sqlx::query_as::<_, SchoolClass>(&format!(
        "INSERT INTO school_classes (id, name, description, created_at)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT DO NOTHING
         RETURNING {CLASS_COLUMNS}"
    ))
    .bind(id)
    .bind(name.trim())
    .bind(description)
    .bind(now)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn update_class(
    pool: &PgPool,
    id: &str,
    name: Option<&str>,
    description: Option<&str>,
) -> Result<Option<SchoolClass>, sqlx::Error> {
    sqlx::query_as::<_, SchoolClass>(&format!(
        "UPDATE school_classes
         SET name = COALESCE($1, name), description = COALESCE($2, description)
         WHERE id = $3
         RETURNING {CLASS_COLUMNS}"
    ))
    .bind(name.map(str::trim))
    .bind(description)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn delete_class(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM school_classes WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn list_subjects(
    pool: &PgPool,
    class_id: Option<&str>,
) -> Result<Vec<SubjectWithClass>, sqlx::Error> {
    sqlx::query_as::<_, SubjectWithClass>(
        "SELECT s.id, s.name, s.school_class_id, c.name AS class_name
         FROM subjects s
         JOIN school_classes c ON c.id = s.school_class_id
         WHERE ($1::varchar IS NULL OR s.school_class_id = $1)
         ORDER BY c.name, s.name",
    )
    .bind(class_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn find_subject(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Subject>, sqlx::Error> {
    sqlx::query_as::<_, Subject>(&format!("SELECT {SUBJECT_COLUMNS} FROM subjects WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn find_subject_in_class(
    executor: impl sqlx::PgExecutor<'_>,
    class_id: &str,
    name: &str,
) -> Result<Option<Subject>, sqlx::Error> {
    sqlx::query_as::<_, Subject>(&format!(
        "SELECT {SUBJECT_COLUMNS} FROM subjects
         WHERE school_class_id = $1 AND lower(name) = lower($2)"
    ))
    .bind(class_id)
    .bind(name.trim())
    .fetch_optional(executor)
    .await
}

pub(crate) async fn create_subject(
    pool: &PgPool,
    id: &str,
    name: &str,
    class_id: &str,
    now: PrimitiveDateTime,
) -> Result<Option<Subject>, sqlx::Error> {
    sqlx::query_as::<_, Subject>(&format!(
        "INSERT INTO subjects (id, name, school_class_id, created_at)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT DO NOTHING
         RETURNING {SUBJECT_COLUMNS}"
    ))
    .bind(id)
    .bind(name.trim())
    .bind(class_id)
    .bind(now)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn update_subject(
    pool: &PgPool,
    id: &str,
    name: Option<&str>,
    class_id: Option<&str>,
) -> Result<Option<Subject>, sqlx::Error> {
    sqlx::query_as::<_, Subject>(&format!(
        "UPDATE subjects
         SET name = COALESCE($1, name), school_class_id = COALESCE($2, school_class_id)
         WHERE id = $3
         RETURNING {SUBJECT_COLUMNS}"
    ))
    .bind(name.map(str::trim))
    .bind(class_id)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn delete_subject(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM subjects WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}
