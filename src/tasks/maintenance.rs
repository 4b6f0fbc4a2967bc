use anyhow::{Context, Result};
use time::Duration;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc as now_primitive;
use crate::repositories;
use crate::services::attempts;

pub(crate) const READ_NOTIFICATION_RETENTION_DAYS: i64 = 30;

pub(crate) async fn auto_submit_expired_attempts(state: &AppState) -> Result<usize> {
    let closed = attempts::expire_overdue(state.db(), now_primitive())
        .await
        .context("Failed to auto-submit expired attempts")?;

    if closed > 0 {
        tracing::info!(closed_attempts = closed, "Auto-submitted expired attempts");
    }
    Ok(closed)
}

pub(crate) async fn prune_read_notifications(state: &AppState) -> Result<u64> {
    let cutoff = now_primitive() - Duration::days(READ_NOTIFICATION_RETENTION_DAYS);
    let deleted = repositories::notifications::delete_read_before(state.db(), cutoff)
        .await
        .context("Failed to prune read notifications")?;

    tracing::info!(deleted_notifications = deleted, "Pruned read notifications");
    metrics::counter!("notifications_pruned_total").increment(deleted);
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::{AttemptStatus, UserRole};
    use crate::repositories::notifications::CreateNotification;
    use crate::test_support;

    #[tokio::test]
    async fn sweeper_closes_only_overdue_attempts() {
        let ctx = test_support::setup_test_context().await;
        let fixture = test_support::quiz_fixture(ctx.state.db(), false).await;

        let started = attempts::start(
            ctx.state.db(),
            &fixture.quiz.id,
            &fixture.student,
            now_primitive(),
        )
        .await
        .expect("start");

        assert_eq!(auto_submit_expired_attempts(&ctx.state).await.expect("sweep"), 0);

        sqlx::query("UPDATE quiz_attempts SET expires_at = $1 WHERE id = $2")
            .bind(now_primitive() - Duration::minutes(1))
            .bind(&started.attempt_id)
            .execute(ctx.state.db())
            .await
            .expect("backdate");

        assert_eq!(auto_submit_expired_attempts(&ctx.state).await.expect("sweep"), 1);

        let attempt = repositories::attempts::find_by_id(ctx.state.db(), &started.attempt_id)
            .await
            .expect("lookup")
            .expect("attempt");
        assert_eq!(attempt.status, AttemptStatus::Submitted);
        assert!(attempt.auto_submitted);
        assert!(!attempt.graded);
    }

    #[tokio::test]
    async fn prune_keeps_unread_and_recent() {
        let ctx = test_support::setup_test_context().await;
        let user = test_support::insert_user(ctx.state.db(), "reader", UserRole::Teacher).await;
        let old = now_primitive() - Duration::days(READ_NOTIFICATION_RETENTION_DAYS + 1);

        for (title, created_at) in [("old", old), ("old-unread", old), ("new", now_primitive())] {
            repositories::notifications::create(
                ctx.state.db(),
                CreateNotification {
                    sender_id: None,
                    recipient_id: &user.id,
                    title,
                    message: "hello",
                    role: None,
                    is_broadcast: false,
                    now: created_at,
                },
            )
            .await
            .expect("notification");
        }
        sqlx::query("UPDATE notifications SET is_read = TRUE WHERE title IN ('old', 'new')")
            .execute(ctx.state.db())
            .await
            .expect("mark read");

        assert_eq!(prune_read_notifications(&ctx.state).await.expect("prune"), 1);
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications")
            .fetch_one(ctx.state.db())
            .await
            .expect("count");
        assert_eq!(remaining, 2);
    }
}
