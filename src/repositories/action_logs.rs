use sqlx::PgPool;
use time::PrimitiveDateTime;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ActionLogRow {
    pub(crate) id: String,
    pub(crate) user_id: Option<String>,
    pub(crate) username: Option<String>,
    pub(crate) action: String,
    pub(crate) model_name: Option<String>,
    pub(crate) object_id: Option<String>,
    pub(crate) details: sqlx::types::Json<serde_json::Value>,
    pub(crate) created_at: PrimitiveDateTime,
}

pub(crate) struct CreateActionLog<'a> {
    pub(crate) user_id: Option<&'a str>,
    pub(crate) action: &'a str,
    pub(crate) model_name: Option<&'a str>,
    pub(crate) object_id: Option<&'a str>,
    pub(crate) details: serde_json::Value,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateActionLog<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO action_logs (id, user_id, action, model_name, object_id, details, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(params.user_id)
    .bind(params.action)
    .bind(params.model_name)
    .bind(params.object_id)
    .bind(sqlx::types::Json(params.details))
    .bind(params.now)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn list(
    pool: &PgPool,
    skip: i64,
    limit: i64,
) -> Result<Vec<ActionLogRow>, sqlx::Error> {
    sqlx::query_as::<_, ActionLogRow>(
        "SELECT l.id, l.user_id, u.username, l.action, l.model_name, l.object_id,
                l.details, l.created_at
         FROM action_logs l
         LEFT JOIN users u ON u.id = l.user_id
         ORDER BY l.created_at DESC, l.id
         OFFSET $1 LIMIT $2",
    )
    .bind(skip.max(0))
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
}

pub(crate) async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM action_logs").fetch_one(pool).await
}
