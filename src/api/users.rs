use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post, put},
    Json, Router,
};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentAdmin, CurrentUser};
use crate::api::pagination::PaginatedResponse;
use crate::api::validation::{read_file_field, validate_image_upload};
use crate::core::security;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::User;
use crate::db::types::{ApprovalStatus, UserRole};
use crate::repositories;
use crate::repositories::users::{TeacherProfile, UpdateUser, UserFilter};
use crate::schemas::user::{
    AdminUserCreate, AdminUserUpdate, ProfilePictureResponse, TeacherProfileUpdate,
    UpdateMeRequest, UserListQuery, UserResponse, UserStatusUpdate,
};
use crate::schemas::OkResponse;
use crate::services::audit::{self, Target};

const PENDING_LIST_LIMIT: i64 = 50;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(me).patch(update_me))
        .route("/me/profile-picture", post(upload_profile_picture).get(profile_picture_url))
        .route("/", get(list_users).post(create_user))
        .route("/pending", get(pending_users))
        .route("/:user_id", get(get_user).patch(update_user).delete(delete_user))
        .route("/:user_id/status", patch(update_user_status))
        .route("/:user_id/teacher-profile", put(update_teacher_profile))
}

async fn me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::from_db(user))
}

async fn update_me(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateMeRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if let Some(email) = payload.email.as_deref() {
        ensure_no_conflict(&state, &user.username, email, &user.id).await?;
    }

    let updated = repositories::users::update(
        state.db(),
        &user.id,
        UpdateUser {
            first_name: payload.first_name.map(|v| v.trim().to_string()),
            last_name: payload.last_name.map(|v| v.trim().to_string()),
            email: payload.email.map(|v| v.trim().to_string()),
            phone: payload.phone,
            ..UpdateUser::default()
        },
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update profile"))?
    .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(UserResponse::from_db(updated)))
}

async fn upload_profile_picture(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ProfilePictureResponse>, ApiError> {
    let storage = state.storage().ok_or_else(|| {
        ApiError::ServiceUnavailable("File storage is not configured".to_string())
    })?;

    let max_bytes = state.settings().storage().max_upload_bytes();
    let file = read_file_field(&mut multipart, "file", max_bytes)
        .await?
        .ok_or_else(|| ApiError::BadRequest("No file uploaded".to_string()))?;

    validate_image_upload(
        &file.filename,
        &file.content_type,
        &state.settings().storage().allowed_image_extensions,
    )?;

    let stored = storage
        .upload_profile_picture(&user.id, &file.filename, &file.content_type, file.bytes)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to upload profile picture"))?;

    repositories::users::set_profile_picture(state.db(), &user.id, &stored.key, primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to save profile picture"))?;

    tracing::info!(
        user_id = %user.id,
        size = stored.size,
        sha256 = %stored.sha256,
        action = "profile_picture_upload",
        "Profile picture uploaded"
    );

    let url = presign_picture(&state, &stored.key).await?;
    Ok(Json(ProfilePictureResponse { url }))
}

async fn profile_picture_url(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ProfilePictureResponse>, ApiError> {
    let key = user
        .profile_picture
        .as_deref()
        .ok_or_else(|| ApiError::NotFound("No profile picture".to_string()))?;
    let url = presign_picture(&state, key).await?;
    Ok(Json(ProfilePictureResponse { url }))
}

async fn presign_picture(state: &AppState, key: &str) -> Result<String, ApiError> {
    let storage = state.storage().ok_or_else(|| {
        ApiError::ServiceUnavailable("File storage is not configured".to_string())
    })?;
    let ttl = Duration::from_secs(state.settings().s3().presigned_url_expire_minutes * 60);
    storage
        .presign_get(key, ttl)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to create download URL"))
}

async fn list_users(
    Query(params): Query<UserListQuery>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<PaginatedResponse<UserResponse>>, ApiError> {
    let filter =
        UserFilter { role: params.role, status: params.status, search: params.search.as_deref() };

    let users = repositories::users::list(state.db(), &filter, params.skip, params.limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list users"))?;
    let total_count = repositories::users::count(state.db(), &filter)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count users"))?;

    Ok(Json(PaginatedResponse {
        items: users.into_iter().map(UserResponse::from_db).collect(),
        total_count,
        skip: params.skip.max(0),
        limit: params.limit.clamp(1, 1000),
    }))
}

async fn pending_users(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = repositories::users::list_pending(state.db(), PENDING_LIST_LIMIT)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list pending users"))?;
    Ok(Json(users.into_iter().map(UserResponse::from_db).collect()))
}

async fn create_user(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<AdminUserCreate>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    ensure_may_assign_role(&admin, payload.role)?;

    let conflict =
        repositories::users::find_conflict(state.db(), &payload.username, &payload.email, None)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to check existing user"))?;
    if let Some(field) = conflict {
        return Err(ApiError::Conflict(format!("A user with this {field} already exists")));
    }

    let hashed_password = security::hash_password(&payload.password)
        .map_err(|e| ApiError::internal(e, "Failed to hash password"))?;

    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;
    let user = repositories::users::create(
        &mut *tx,
        repositories::users::CreateUser {
            id: &Uuid::new_v4().to_string(),
            username: &payload.username,
            email: &payload.email,
            hashed_password,
            first_name: payload.first_name.trim(),
            last_name: payload.last_name.trim(),
            role: payload.role,
            approval_status: payload.approval_status,
            school_class_id: payload.school_class_id.as_deref(),
            phone: payload.phone.as_deref(),
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| {
        if repositories::is_unique_violation(&e) {
            ApiError::Conflict("A user with this username already exists".to_string())
        } else {
            ApiError::internal(e, "Failed to create user")
        }
    })?;

    audit::log_action(
        &mut *tx,
        Some(&admin.id),
        "Created user",
        Some(Target { model: "User", object_id: &user.id }),
        json!({"username": user.username, "role": user.role.as_str()}),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to record action"))?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit user"))?;

    tracing::info!(
        admin_id = %admin.id,
        user_id = %user.id,
        role = user.role.as_str(),
        action = "user_create",
        "User created"
    );

    Ok((StatusCode::CREATED, Json(UserResponse::from_db(user))))
}

async fn get_user(
    Path(user_id): Path<String>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = fetch_user(&state, &user_id).await?;
    Ok(Json(UserResponse::from_db(user)))
}

async fn update_user(
    Path(user_id): Path<String>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<AdminUserUpdate>,
) -> Result<Json<UserResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let target = fetch_user(&state, &user_id).await?;
    if target.role.is_administrator() && admin.role != UserRole::Superadmin {
        return Err(ApiError::Forbidden("Only a superadmin can modify administrators"));
    }
    if let Some(role) = payload.role {
        ensure_may_assign_role(&admin, role)?;
    }

    if payload.username.is_some() || payload.email.is_some() {
        let username = payload.username.as_deref().unwrap_or(&target.username);
        let email = payload.email.as_deref().unwrap_or(&target.email);
        ensure_no_conflict(&state, username, email, &target.id).await?;
    }

    let hashed_password = match payload.password.as_deref() {
        Some(password) => Some(
            security::hash_password(password)
                .map_err(|e| ApiError::internal(e, "Failed to hash password"))?,
        ),
        None => None,
    };
    let password_reset = hashed_password.is_some();

    let changes = UpdateUser {
        username: payload.username.map(|v| v.trim().to_string()),
        email: payload.email.map(|v| v.trim().to_string()),
        first_name: payload.first_name.map(|v| v.trim().to_string()),
        last_name: payload.last_name.map(|v| v.trim().to_string()),
        role: payload.role,
        is_active: payload.is_active,
        school_class_id: payload.school_class_id,
        phone: payload.phone,
        hashed_password,
    };

    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;
    let updated = repositories::users::update(&mut *tx, &target.id, changes, primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update user"))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    audit::log_action(
        &mut *tx,
        Some(&admin.id),
        "Updated user",
        Some(Target { model: "User", object_id: &updated.id }),
        json!({
            "old_role": target.role.as_str(),
            "new_role": updated.role.as_str(),
            "password_reset": password_reset,
        }),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to record action"))?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit user"))?;

    Ok(Json(UserResponse::from_db(updated)))
}

async fn delete_user(
    Path(user_id): Path<String>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<OkResponse>, ApiError> {
    if user_id == admin.id {
        return Err(ApiError::BadRequest("You cannot delete yourself.".to_string()));
    }

    let target = fetch_user(&state, &user_id).await?;
    match target.role {
        UserRole::Superadmin => {
            return Err(ApiError::Forbidden("Superadmin accounts cannot be deleted"));
        }
        UserRole::Admin if admin.role != UserRole::Superadmin => {
            return Err(ApiError::Forbidden("Only a superadmin can delete administrators"));
        }
        _ => {}
    }

    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;
    repositories::users::delete_by_id(&mut *tx, &target.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete user"))?;
    audit::log_action(
        &mut *tx,
        Some(&admin.id),
        "Deleted user",
        Some(Target { model: "User", object_id: &target.id }),
        json!({"username": target.username, "role": target.role.as_str()}),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to record action"))?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit deletion"))?;

    tracing::info!(admin_id = %admin.id, user_id = %target.id, action = "user_delete", "User deleted");
    Ok(Json(OkResponse::ok()))
}

async fn update_user_status(
    Path(user_id): Path<String>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<UserStatusUpdate>,
) -> Result<Json<UserResponse>, ApiError> {
    let status = ApprovalStatus::from_action(payload.status.trim())
        .ok_or_else(|| ApiError::BadRequest("invalid status".to_string()))?;
    let target = fetch_user(&state, &user_id).await?;
    if target.role == UserRole::Superadmin {
        return Err(ApiError::Forbidden("Superadmin status cannot be changed"));
    }

    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;
    repositories::users::set_approval_status(&mut *tx, &target.id, status, primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update user status"))?;
    audit::log_action(
        &mut *tx,
        Some(&admin.id),
        &format!("Updated user status -> {}", status.as_str()),
        Some(Target { model: "User", object_id: &target.id }),
        json!({"old": target.approval_status.as_str(), "new": status.as_str()}),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to record action"))?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit status"))?;

    tracing::info!(
        admin_id = %admin.id,
        user_id = %target.id,
        status = status.as_str(),
        action = "user_status",
        "User approval status changed"
    );

    let updated = fetch_user(&state, &target.id).await?;
    Ok(Json(UserResponse::from_db(updated)))
}

async fn update_teacher_profile(
    Path(user_id): Path<String>,
    CurrentUser(caller): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<TeacherProfileUpdate>,
) -> Result<Json<UserResponse>, ApiError> {
    if caller.id != user_id && !caller.role.is_administrator() {
        return Err(ApiError::Forbidden("Permission denied"));
    }
    let target = fetch_user(&state, &user_id).await?;
    if !matches!(target.role, UserRole::Teacher | UserRole::Admin) {
        return Err(ApiError::BadRequest("User is not a teacher".to_string()));
    }
    if payload.years_of_experience.is_some_and(|years| years < 0) {
        return Err(ApiError::BadRequest("Experience years cannot be negative.".to_string()));
    }
    if let Some(subject_id) = payload.subject_assigned_id.as_deref() {
        repositories::classes::find_subject(state.db(), subject_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load subject"))?
            .ok_or_else(|| ApiError::NotFound("Subject not found.".to_string()))?;
    }

    let updated = repositories::users::update_teacher_profile(
        state.db(),
        &target.id,
        TeacherProfile {
            subject_assigned_id: payload.subject_assigned_id,
            qualification: payload.qualification,
            years_of_experience: payload.years_of_experience,
            next_of_kin: payload.next_of_kin,
            next_of_kin_phone: payload.next_of_kin_phone,
        },
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update teacher profile"))?
    .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(UserResponse::from_db(updated)))
}

async fn fetch_user(state: &AppState, user_id: &str) -> Result<User, ApiError> {
    repositories::users::find_by_id(state.db(), user_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load user"))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

async fn ensure_no_conflict(
    state: &AppState,
    username: &str,
    email: &str,
    exclude_id: &str,
) -> Result<(), ApiError> {
    let conflict = repositories::users::find_conflict(state.db(), username, email, Some(exclude_id))
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check existing user"))?;
    match conflict {
        Some(field) => Err(ApiError::Conflict(format!("A user with this {field} already exists"))),
        None => Ok(()),
    }
}

fn ensure_may_assign_role(caller: &User, role: UserRole) -> Result<(), ApiError> {
    if role.is_administrator() && caller.role != UserRole::Superadmin {
        return Err(ApiError::Forbidden("Only a superadmin can create administrators"));
    }
    Ok(())
}
