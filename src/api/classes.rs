use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentAdmin, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::schemas::class::{
    ClassCreate, ClassResponse, ClassUpdate, SubjectCreate, SubjectListQuery, SubjectResponse,
    SubjectUpdate,
};
use crate::schemas::OkResponse;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/classes", get(list_classes).post(create_class))
        .route("/classes/:class_id", get(get_class).patch(update_class).delete(delete_class))
        .route("/subjects", get(list_subjects).post(create_subject))
        .route("/subjects/:subject_id", get(get_subject).patch(update_subject).delete(delete_subject))
}

async fn list_classes(
    CurrentUser(_user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ClassResponse>>, ApiError> {
    let classes = repositories::classes::list_classes(state.db())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list classes"))?;
    Ok(Json(classes.into_iter().map(ClassResponse::from).collect()))
}

async fn get_class(
    Path(class_id): Path<String>,
    CurrentUser(_user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ClassResponse>, ApiError> {
    let class = repositories::classes::find_class(state.db(), &class_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load class"))?
        .ok_or_else(|| ApiError::NotFound("Class not found".to_string()))?;
    Ok(Json(class.into()))
}

async fn create_class(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<ClassCreate>,
) -> Result<(StatusCode, Json<ClassResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let class = repositories::classes::create_class(
        state.db(),
        &Uuid::new_v4().to_string(),
        payload.name.trim(),
        payload.description.as_deref(),
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create class"))?
    .ok_or_else(|| ApiError::Conflict("A class with this name already exists".to_string()))?;

    tracing::info!(admin_id = %admin.id, class_id = %class.id, action = "class_create", "Class created");
    Ok((StatusCode::CREATED, Json(class.into())))
}

async fn update_class(
    Path(class_id): Path<String>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<ClassUpdate>,
) -> Result<Json<ClassResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let class = repositories::classes::update_class(
        state.db(),
        &class_id,
        payload.name.as_deref().map(str::trim),
        payload.description.as_deref(),
    )
    .await
    .map_err(|e| {
        if repositories::is_unique_violation(&e) {
            ApiError::Conflict("A class with this name already exists".to_string())
        } else {
            ApiError::internal(e, "Failed to update class")
        }
    })?
    .ok_or_else(|| ApiError::NotFound("Class not found".to_string()))?;

    Ok(Json(class.into()))
}

async fn delete_class(
    Path(class_id): Path<String>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<OkResponse>, ApiError> {
    let deleted = repositories::classes::delete_class(state.db(), &class_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete class"))?;
    if !deleted {
        return Err(ApiError::NotFound("Class not found".to_string()));
    }

    tracing::info!(admin_id = %admin.id, class_id = %class_id, action = "class_delete", "Class deleted");
    Ok(Json(OkResponse::ok()))
}

async fn list_subjects(
    Query(params): Query<SubjectListQuery>,
    CurrentUser(_user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<SubjectResponse>>, ApiError> {
    let subjects = repositories::classes::list_subjects(state.db(), params.class_id.as_deref())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list subjects"))?;
    Ok(Json(subjects.into_iter().map(SubjectResponse::from).collect()))
}

async fn get_subject(
    Path(subject_id): Path<String>,
    CurrentUser(_user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SubjectResponse>, ApiError> {
    let subject = repositories::classes::find_subject(state.db(), &subject_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load subject"))?
        .ok_or_else(|| ApiError::NotFound("Subject not found.".to_string()))?;
    Ok(Json(subject.into()))
}

async fn create_subject(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<SubjectCreate>,
) -> Result<(StatusCode, Json<SubjectResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    ensure_class_exists(&state, &payload.school_class_id).await?;

    let subject = repositories::classes::create_subject(
        state.db(),
        &Uuid::new_v4().to_string(),
        payload.name.trim(),
        &payload.school_class_id,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create subject"))?
    .ok_or_else(|| {
        ApiError::Conflict("This subject already exists for the class".to_string())
    })?;

    tracing::info!(
        admin_id = %admin.id,
        subject_id = %subject.id,
        class_id = %subject.school_class_id,
        action = "subject_create",
        "Subject created"
    );
    Ok((StatusCode::CREATED, Json(subject.into())))
}

async fn update_subject(
    Path(subject_id): Path<String>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<SubjectUpdate>,
) -> Result<Json<SubjectResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if let Some(class_id) = payload.school_class_id.as_deref() {
        ensure_class_exists(&state, class_id).await?;
    }

    let subject = repositories::classes::update_subject(
        state.db(),
        &subject_id,
        payload.name.as_deref().map(str::trim),
        payload.school_class_id.as_deref(),
    )
    .await
    .map_err(|e| {
        if repositories::is_unique_violation(&e) {
            ApiError::Conflict("This subject already exists for the class".to_string())
        } else {
            ApiError::internal(e, "Failed to update subject")
        }
    })?
    .ok_or_else(|| ApiError::NotFound("Subject not found.".to_string()))?;

    Ok(Json(subject.into()))
}

async fn delete_subject(
    Path(subject_id): Path<String>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<OkResponse>, ApiError> {
    let deleted = repositories::classes::delete_subject(state.db(), &subject_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete subject"))?;
    if !deleted {
        return Err(ApiError::NotFound("Subject not found.".to_string()));
    }
    Ok(Json(OkResponse::ok()))
}

async fn ensure_class_exists(state: &AppState, class_id: &str) -> Result<(), ApiError> {
    repositories::classes::find_class(state.db(), class_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load class"))?
        .ok_or_else(|| ApiError::NotFound("Class not found".to_string()))?;
    Ok(())
}
