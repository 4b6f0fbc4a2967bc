use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::User;
use crate::db::types::{ApprovalStatus, UserRole};

pub(crate) const COLUMNS: &str = "\
    id, username, email, hashed_password, first_name, last_name, role, approval_status, \
    is_active, school_class_id, phone, subject_assigned_id, qualification, \
    years_of_experience, next_of_kin, next_of_kin_phone, profile_picture, created_at, updated_at";

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn find_by_username(
    pool: &PgPool,
    username: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {COLUMNS} FROM users WHERE lower(username) = lower($1)"
    ))
    .bind(username.trim())
    .fetch_optional(pool)
    .await
}

/// Returns which of username/email is already taken by a different user.
pub(crate) async fn find_conflict(
    pool: &PgPool,
    username: &str,
    email: &str,
    exclude_id: Option<&str>,
) -> Result<Option<&'static str>, sqlx::Error> {
    let row = sqlx::query_as::<_, (bool, bool)>(
        "SELECT
            EXISTS(SELECT 1 FROM users WHERE lower(username) = lower($1)
                   AND ($3::varchar IS NULL OR id <> $3)),
            EXISTS(SELECT 1 FROM users WHERE lower(email) = lower($2)
                   AND ($3::varchar IS NULL OR id <> $3))",
    )
    .bind(username.trim())
    .bind(email.trim())
    .bind(exclude_id)
    .fetch_one(pool)
    .await?;

    Ok(match row {
        (true, _) => Some("username"),
        (_, true) => Some("email"),
        _ => None,
    })
}

pub(crate) struct CreateUser<'a> {
    pub(crate) id: &'a str,
    pub(crate) username: &'a str,
    pub(crate) email: &'a str,
    pub(crate) hashed_password: String,
    pub(crate) first_name: &'a str,
    pub(crate) last_name: &'a str,
    pub(crate) role: UserRole,
    pub(crate) approval_status: ApprovalStatus,
    pub(crate) school_class_id: Option<&'a str>,
    pub(crate) phone: Option<&'a str>,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateUser<'_>,
) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (
            id, username, email, hashed_password, first_name, last_name, role,
            approval_status, is_active, school_class_id, phone, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,TRUE,$9,$10,$11,$11)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.username.trim())
    .bind(params.email.trim())
    .bind(params.hashed_password)
    .bind(params.first_name)
    .bind(params.last_name)
    .bind(params.role)
    .bind(params.approval_status)
    .bind(params.school_class_id)
    .bind(params.phone)
    .bind(params.now)
    .fetch_one(executor)
    .await
}

#[derive(Default)]
pub(crate) struct UpdateUser {
    pub(crate) username: Option<String>,
    pub(crate) email: Option<String>,
    pub(crate) first_name: Option<String>,
    pub(crate) last_name: Option<String>,
    pub(crate) role: Option<UserRole>,
    pub(crate) is_active: Option<bool>,
    pub(crate) school_class_id: Option<Option<String>>,
    pub(crate) phone: Option<String>,
    pub(crate) hashed_password: Option<String>,
}

pub(crate) async fn update(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    params: UpdateUser,
    now: PrimitiveDateTime,
) -> Result<Option<User>, sqlx::Error> {
    let (set_class, class_value) = match params.school_class_id {
        Some(value) => (true, value),
        None => (false, None),
    };

    sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET
            username = COALESCE($1, username),
            email = COALESCE($2, email),
            first_name = COALESCE($3, first_name),
            last_name = COALESCE($4, last_name),
            role = COALESCE($5, role),
            is_active = COALESCE($6, is_active),
            school_class_id = CASE WHEN $7 THEN $8 ELSE school_class_id END,
            phone = COALESCE($9, phone),
            hashed_password = COALESCE($10, hashed_password),
            updated_at = $11
         WHERE id = $12
         RETURNING {COLUMNS}"
    ))
    .bind(params.username)
    .bind(params.email)
    .bind(params.first_name)
    .bind(params.last_name)
    .bind(params.role)
    .bind(params.is_active)
    .bind(set_class)
    .bind(class_value)
    .bind(params.phone)
    .bind(params.hashed_password)
    .bind(now)
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) struct TeacherProfile {
    pub(crate) subject_assigned_id: Option<String>,
    pub(crate) qualification: Option<String>,
    pub(crate) years_of_experience: Option<i32>,
    pub(crate) next_of_kin: Option<String>,
    pub(crate) next_of_kin_phone: Option<String>,
}

pub(crate) async fn update_teacher_profile(
    pool: &PgPool,
    id: &str,
    profile: TeacherProfile,
    now: PrimitiveDateTime,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET
            subject_assigned_id = $1,
            qualification = $2,
            years_of_experience = $3,
            next_of_kin = $4,
            next_of_kin_phone = $5,
            updated_at = $6
         WHERE id = $7
         RETURNING {COLUMNS}"
    ))
    .bind(profile.subject_assigned_id)
    .bind(profile.qualification)
    .bind(profile.years_of_experience)
    .bind(profile.next_of_kin)
    .bind(profile.next_of_kin_phone)
    .bind(now)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn set_approval_status(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    status: ApprovalStatus,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET approval_status = $1, updated_at = $2 WHERE id = $3")
        .bind(status)
        .bind(now)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn set_profile_picture(
    pool: &PgPool,
    id: &str,
    key: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET profile_picture = $1, updated_at = $2 WHERE id = $3")
        .bind(key)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub(crate) async fn delete_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1").bind(id).execute(executor).await?;
    Ok(result.rows_affected() > 0)
}

#[derive(Debug, Default)]
pub(crate) struct UserFilter<'a> {
    pub(crate) role: Option<UserRole>,
    pub(crate) status: Option<ApprovalStatus>,
    pub(crate) search: Option<&'a str>,
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter<'_>) {
    builder.push(" WHERE 1=1");
    if let Some(role) = filter.role {
        builder.push(" AND role = ");
        builder.push_bind(role);
    }
    if let Some(status) = filter.status {
        builder.push(" AND approval_status = ");
        builder.push_bind(status);
    }
    if let Some(search) = filter.search.map(str::trim).filter(|value| !value.is_empty()) {
        let pattern = format!("%{}%", search.to_lowercase());
        builder.push(" AND (lower(username) LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR lower(email) LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR lower(first_name || ' ' || last_name) LIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
}

pub(crate) async fn list(
    pool: &PgPool,
    filter: &UserFilter<'_>,
    skip: i64,
    limit: i64,
) -> Result<Vec<User>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM users"));
    push_filters(&mut builder, filter);
    builder.push(" ORDER BY created_at DESC OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder.build_query_as::<User>().fetch_all(pool).await
}

pub(crate) async fn count(pool: &PgPool, filter: &UserFilter<'_>) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
    push_filters(&mut builder, filter);
    builder.build_query_scalar::<i64>().fetch_one(pool).await
}

pub(crate) async fn list_pending(pool: &PgPool, limit: i64) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {COLUMNS} FROM users WHERE approval_status = $1 ORDER BY created_at DESC LIMIT $2"
    ))
    .bind(ApprovalStatus::Pending)
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
}
