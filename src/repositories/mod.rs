pub(crate) mod action_logs;
pub(crate) mod answers;
pub(crate) mod attempts;
pub(crate) mod classes;
pub(crate) mod health;
pub(crate) mod notifications;
pub(crate) mod quizzes;
pub(crate) mod stats;
pub(crate) mod users;

/// True when a write failed on a unique index.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error().is_some_and(|db| db.is_unique_violation())
}
