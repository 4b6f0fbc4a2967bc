use uuid::Uuid;

use crate::core::security;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::{ApprovalStatus, UserRole};
use crate::repositories;
use crate::repositories::users::{CreateUser, UpdateUser};

pub(crate) async fn ensure_superadmin(state: &AppState) -> anyhow::Result<()> {
    let admin = state.settings().admin();
    if admin.first_superadmin_password.is_empty() {
        tracing::warn!("FIRST_SUPERADMIN_PASSWORD not configured; skipping superadmin creation");
        return Ok(());
    }

    let username = &admin.first_superadmin_username;
    let now = primitive_now_utc();
    let user = repositories::users::find_by_username(state.db(), username).await?;

    if let Some(user) = user {
        let verified =
            security::verify_password(&admin.first_superadmin_password, &user.hashed_password)
                .unwrap_or(false);

        let mut changes = UpdateUser::default();
        if !verified {
            changes.hashed_password = Some(security::hash_password(&admin.first_superadmin_password)?);
        }
        if user.role != UserRole::Superadmin {
            changes.role = Some(UserRole::Superadmin);
        }
        if !user.is_active {
            changes.is_active = Some(true);
        }
        let needs_update =
            changes.hashed_password.is_some() || changes.role.is_some() || changes.is_active.is_some();

        if needs_update {
            repositories::users::update(state.db(), &user.id, changes, now).await?;
        }
        if !user.is_approved() {
            repositories::users::set_approval_status(
                state.db(),
                &user.id,
                ApprovalStatus::Approved,
                now,
            )
            .await?;
        }

        if needs_update || !user.is_approved() {
            tracing::info!("Updated default superadmin {username}");
        } else {
            tracing::info!("Default superadmin already up to date");
        }
        return Ok(());
    }

    let hashed_password = security::hash_password(&admin.first_superadmin_password)?;
    repositories::users::create(
        state.db(),
        CreateUser {
            id: &Uuid::new_v4().to_string(),
            username,
            email: &admin.first_superadmin_email,
            hashed_password,
            first_name: "Super",
            last_name: "Admin",
            role: UserRole::Superadmin,
            approval_status: ApprovalStatus::Approved,
            school_class_id: None,
            phone: None,
            now,
        },
    )
    .await?;

    tracing::info!("Created default superadmin {username}");
    Ok(())
}

/// Inserts any configured default class that does not exist yet.
pub(crate) async fn seed_default_classes(state: &AppState) -> anyhow::Result<usize> {
    let now = primitive_now_utc();
    let mut created = 0;

    for name in &state.settings().school().default_classes {
        if repositories::classes::find_class_by_name(state.db(), name).await?.is_some() {
            continue;
        }
        let inserted = repositories::classes::create_class(
            state.db(),
            &Uuid::new_v4().to_string(),
            name,
            None,
            now,
        )
        .await?;
        if inserted.is_some() {
            created += 1;
        }
    }

    if created > 0 {
        tracing::info!(created, "Seeded default school classes");
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let ctx = test_support::setup_test_context().await;

        ensure_superadmin(&ctx.state).await.expect("first run");
        ensure_superadmin(&ctx.state).await.expect("second run");
        let first = seed_default_classes(&ctx.state).await.expect("seed");
        let second = seed_default_classes(&ctx.state).await.expect("reseed");

        let admin = repositories::users::find_by_username(ctx.state.db(), "superadmin")
            .await
            .expect("lookup")
            .expect("superadmin exists");
        assert_eq!(admin.role, UserRole::Superadmin);
        assert!(admin.is_approved());
        assert_eq!(first, ctx.state.settings().school().default_classes.len());
        assert_eq!(second, 0);
    }
}
