use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::types::{AttemptStatus, UserRole};

#[derive(Debug, Default, sqlx::FromRow)]
pub(crate) struct SchoolCounts {
    pub(crate) total_users: i64,
    pub(crate) total_admins: i64,
    pub(crate) total_teachers: i64,
    pub(crate) total_students: i64,
    pub(crate) pending_users: i64,
    pub(crate) total_classes: i64,
    pub(crate) total_subjects: i64,
    pub(crate) total_quizzes: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct LeaderboardRow {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) first_name: String,
    pub(crate) last_name: String,
    pub(crate) avg_score: f64,
    pub(crate) attempts: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ClassPerformanceRow {
    pub(crate) class_id: String,
    pub(crate) class_name: String,
    pub(crate) avg_score: Option<f64>,
    pub(crate) attempts: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct QuizPerformanceRow {
    pub(crate) quiz_id: String,
    pub(crate) title: String,
    pub(crate) avg_score: Option<f64>,
    pub(crate) attempts: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct AttemptReportRow {
    pub(crate) attempt_id: String,
    pub(crate) quiz_id: String,
    pub(crate) quiz_title: String,
    pub(crate) subject_name: String,
    pub(crate) student_username: String,
    pub(crate) student_first_name: String,
    pub(crate) student_last_name: String,
    pub(crate) score: f64,
    pub(crate) total_marks: f64,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    pub(crate) pending_count: i64,
}

impl AttemptReportRow {
    pub(crate) fn student_full_name(&self) -> String {
        let joined =
            format!("{} {}", self.student_first_name.trim(), self.student_last_name.trim());
        let trimmed = joined.trim();
        if trimmed.is_empty() {
            self.student_username.clone()
        } else {
            trimmed.to_string()
        }
    }
}

pub(crate) async fn school_counts(pool: &PgPool) -> Result<SchoolCounts, sqlx::Error> {
    sqlx::query_as::<_, SchoolCounts>(
        "SELECT
            (SELECT COUNT(*) FROM users WHERE role IN ('admin', 'teacher', 'student')) AS total_users,
            (SELECT COUNT(*) FROM users WHERE role = 'admin' AND approval_status = 'approved')
                AS total_admins,
            (SELECT COUNT(*) FROM users WHERE role = 'teacher' AND approval_status = 'approved')
                AS total_teachers,
            (SELECT COUNT(*) FROM users WHERE role = 'student' AND approval_status = 'approved')
                AS total_students,
            (SELECT COUNT(*) FROM users WHERE approval_status = 'pending') AS pending_users,
            (SELECT COUNT(*) FROM school_classes) AS total_classes,
            (SELECT COUNT(*) FROM subjects) AS total_subjects,
            (SELECT COUNT(*) FROM quizzes) AS total_quizzes",
    )
    .fetch_one(pool)
    .await
}

pub(crate) async fn count_by_role(pool: &PgPool, role: UserRole) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = $1")
        .bind(role)
        .fetch_one(pool)
        .await
}

/// Students ranked by mean score over submitted attempts.
pub(crate) async fn leaderboard(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<LeaderboardRow>, sqlx::Error> {
    sqlx::query_as::<_, LeaderboardRow>(
        "SELECT u.id, u.username, u.first_name, u.last_name,
                AVG(a.score)::float8 AS avg_score, COUNT(a.id) AS attempts
         FROM users u
         JOIN quiz_attempts a ON a.student_id = u.id AND a.status = $1
         WHERE u.role = $2
         GROUP BY u.id, u.username, u.first_name, u.last_name
         ORDER BY avg_score DESC, u.username
         LIMIT $3",
    )
    .bind(AttemptStatus::Submitted)
    .bind(UserRole::Student)
    .bind(limit.clamp(1, 100))
    .fetch_all(pool)
    .await
}

pub(crate) async fn class_performance(
    pool: &PgPool,
) -> Result<Vec<ClassPerformanceRow>, sqlx::Error> {
    sqlx::query_as::<_, ClassPerformanceRow>(
        "SELECT c.id AS class_id, c.name AS class_name,
                AVG(a.score)::float8 AS avg_score, COUNT(a.id) AS attempts
         FROM school_classes c
         LEFT JOIN users u ON u.school_class_id = c.id AND u.role = $1
         LEFT JOIN quiz_attempts a ON a.student_id = u.id AND a.status = $2
         GROUP BY c.id, c.name
         ORDER BY c.name",
    )
    .bind(UserRole::Student)
    .bind(AttemptStatus::Submitted)
    .fetch_all(pool)
    .await
}

pub(crate) async fn quiz_performance_for_creator(
    pool: &PgPool,
    creator_id: &str,
) -> Result<Vec<QuizPerformanceRow>, sqlx::Error> {
    sqlx::query_as::<_, QuizPerformanceRow>(
        "SELECT q.id AS quiz_id, q.title,
                AVG(a.score)::float8 AS avg_score, COUNT(a.id) AS attempts
         FROM quizzes q
         LEFT JOIN quiz_attempts a ON a.quiz_id = q.id AND a.status = $1
         WHERE q.created_by = $2
         GROUP BY q.id, q.title, q.created_at
         ORDER BY q.created_at DESC",
    )
    .bind(AttemptStatus::Submitted)
    .bind(creator_id)
    .fetch_all(pool)
    .await
}

#[derive(Debug, Default, sqlx::FromRow)]
pub(crate) struct StudentSummary {
    pub(crate) total_attempts: i64,
    pub(crate) avg_score: Option<f64>,
}

pub(crate) async fn student_summary(
    pool: &PgPool,
    student_id: &str,
) -> Result<StudentSummary, sqlx::Error> {
    sqlx::query_as::<_, StudentSummary>(
        "SELECT COUNT(*) AS total_attempts, AVG(score)::float8 AS avg_score
         FROM quiz_attempts
         WHERE student_id = $1 AND status = $2",
    )
    .bind(student_id)
    .bind(AttemptStatus::Submitted)
    .fetch_one(pool)
    .await
}

/// Submitted attempts for reports, optionally narrowed to one student or one quiz creator.
pub(crate) async fn attempt_report_rows(
    pool: &PgPool,
    student_id: Option<&str>,
    creator_id: Option<&str>,
) -> Result<Vec<AttemptReportRow>, sqlx::Error> {
    sqlx::query_as::<_, AttemptReportRow>(
        "SELECT a.id AS attempt_id, q.id AS quiz_id, q.title AS quiz_title,
                s.name AS subject_name, u.username AS student_username,
                u.first_name AS student_first_name, u.last_name AS student_last_name,
                a.score, a.total_marks, a.started_at, a.submitted_at,
                (SELECT COUNT(*) FROM answers an
                  WHERE an.attempt_id = a.id AND an.is_pending) AS pending_count
         FROM quiz_attempts a
         JOIN quizzes q ON q.id = a.quiz_id
         JOIN subjects s ON s.id = q.subject_id
         JOIN users u ON u.id = a.student_id
         WHERE a.status = $1
           AND ($2::varchar IS NULL OR a.student_id = $2)
           AND ($3::varchar IS NULL OR q.created_by = $3)
         ORDER BY q.title, a.submitted_at DESC NULLS LAST",
    )
    .bind(AttemptStatus::Submitted)
    .bind(student_id)
    .bind(creator_id)
    .fetch_all(pool)
    .await
}
