use serde_json::Value;

use crate::core::time::primitive_now_utc;
use crate::repositories::action_logs::{self, CreateActionLog};

/// What an audit entry is about.
pub(crate) struct Target<'a> {
    pub(crate) model: &'a str,
    pub(crate) object_id: &'a str,
}

/// Records an action-log row on the given executor, so it shares the caller's transaction.
pub(crate) async fn log_action(
    executor: impl sqlx::PgExecutor<'_>,
    user_id: Option<&str>,
    action: &str,
    target: Option<Target<'_>>,
    details: Value,
) -> Result<(), sqlx::Error> {
    action_logs::create(
        executor,
        CreateActionLog {
            user_id,
            action,
            model_name: target.as_ref().map(|t| t.model),
            object_id: target.as_ref().map(|t| t.object_id),
            details,
            now: primitive_now_utc(),
        },
    )
    .await?;

    tracing::debug!(user_id = user_id.unwrap_or("system"), action, "Action logged");
    Ok(())
}
