use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Notification;
use crate::db::types::UserRole;

pub(crate) const COLUMNS: &str = "\
    id, sender_id, recipient_id, title, message, role, is_broadcast, is_read, created_at";

pub(crate) struct CreateNotification<'a> {
    pub(crate) sender_id: Option<&'a str>,
    pub(crate) recipient_id: &'a str,
    pub(crate) title: &'a str,
    pub(crate) message: &'a str,
    pub(crate) role: Option<UserRole>,
    pub(crate) is_broadcast: bool,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateNotification<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO notifications (
            id, sender_id, recipient_id, title, message, role, is_broadcast, is_read, created_at
         ) VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, $8)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(params.sender_id)
    .bind(params.recipient_id)
    .bind(params.title)
    .bind(params.message)
    .bind(params.role)
    .bind(params.is_broadcast)
    .bind(params.now)
    .execute(executor)
    .await?;
    Ok(())
}

/// Fans a broadcast out to every approved, active user with `role`.
pub(crate) async fn broadcast(
    executor: impl sqlx::PgExecutor<'_>,
    sender_id: &str,
    role: UserRole,
    title: &str,
    message: &str,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO notifications (
            id, sender_id, recipient_id, title, message, role, is_broadcast, is_read, created_at
         )
         SELECT gen_random_uuid()::varchar, $1, u.id, $2, $3, $4, TRUE, FALSE, $5
         FROM users u
         WHERE u.role = $4 AND u.approval_status = 'approved' AND u.is_active",
    )
    .bind(sender_id)
    .bind(title)
    .bind(message)
    .bind(role)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn list_unread(
    pool: &PgPool,
    recipient_id: &str,
    limit: i64,
) -> Result<Vec<Notification>, sqlx::Error> {
    sqlx::query_as::<_, Notification>(&format!(
        "SELECT {COLUMNS} FROM notifications
         WHERE recipient_id = $1 AND NOT is_read
         ORDER BY created_at DESC
         LIMIT $2"
    ))
    .bind(recipient_id)
    .bind(limit.clamp(1, 100))
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_unread(pool: &PgPool, recipient_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND NOT is_read")
        .bind(recipient_id)
        .fetch_one(pool)
        .await
}

pub(crate) async fn mark_read(
    pool: &PgPool,
    recipient_id: &str,
    ids: Option<&[String]>,
) -> Result<u64, sqlx::Error> {
    let result = match ids {
        Some(ids) => {
            sqlx::query(
                "UPDATE notifications SET is_read = TRUE
                 WHERE recipient_id = $1 AND NOT is_read AND id = ANY($2)",
            )
            .bind(recipient_id)
            .bind(ids)
            .execute(pool)
            .await?
        }
        None => {
            sqlx::query(
                "UPDATE notifications SET is_read = TRUE WHERE recipient_id = $1 AND NOT is_read",
            )
            .bind(recipient_id)
            .execute(pool)
            .await?
        }
    };
    Ok(result.rows_affected())
}

pub(crate) async fn mark_one_read(
    pool: &PgPool,
    recipient_id: &str,
    id: &str,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1 AND recipient_id = $2")
            .bind(id)
            .bind(recipient_id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn delete_read_before(
    pool: &PgPool,
    cutoff: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM notifications WHERE is_read AND created_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
