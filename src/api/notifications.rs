use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentStaff, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::UserRole;
use crate::repositories;
use crate::schemas::notification::{
    BroadcastRequest, BroadcastResponse, MarkReadRequest, MarkReadResponse, NotificationResponse,
    UnreadResponse,
};
use crate::schemas::OkResponse;
use crate::services::audit;
use crate::services::notifications::{excerpt, may_broadcast_to, AUDIT_EXCERPT_CHARS};

const UNREAD_LIMIT: i64 = 10;
const DEFAULT_BROADCAST_TITLE: &str = "Announcement";

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/broadcast", post(broadcast))
        .route("/unread", get(unread))
        .route("/read", post(mark_read))
        .route("/:notification_id/read", post(mark_one_read))
}

async fn broadcast(
    CurrentStaff(sender): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<BroadcastRequest>,
) -> Result<Json<BroadcastResponse>, ApiError> {
    let role = payload.role.as_deref().map(str::trim).unwrap_or_default();
    let message = payload.message.as_deref().map(str::trim).unwrap_or_default();
    if role.is_empty() || message.is_empty() {
        return Err(ApiError::BadRequest("role & message required".to_string()));
    }

    let role = UserRole::parse(role)
        .filter(|role| *role != UserRole::Superadmin)
        .ok_or_else(|| ApiError::BadRequest("role must be admin, teacher or student".to_string()))?;
    if !may_broadcast_to(sender.role, role) {
        return Err(ApiError::Forbidden("Teachers can only broadcast to students"));
    }

    let title = payload
        .title
        .as_deref()
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .unwrap_or(DEFAULT_BROADCAST_TITLE);

    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;
    let count = repositories::notifications::broadcast(
        &mut *tx,
        &sender.id,
        role,
        title,
        message,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to send broadcast"))?;
    audit::log_action(
        &mut *tx,
        Some(&sender.id),
        "Broadcast",
        None,
        json!({
            "role": role.as_str(),
            "count": count,
            "message": excerpt(message, AUDIT_EXCERPT_CHARS),
        }),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to record action"))?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit broadcast"))?;

    tracing::info!(
        sender_id = %sender.id,
        role = role.as_str(),
        count,
        action = "broadcast",
        "Broadcast sent"
    );

    Ok(Json(BroadcastResponse {
        ok: true,
        message: format!("Broadcast sent to {count} {}(s).", role.as_str()),
        count,
    }))
}

async fn unread(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<UnreadResponse>, ApiError> {
    let items = repositories::notifications::list_unread(state.db(), &user.id, UNREAD_LIMIT)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list notifications"))?;
    let unread_count = repositories::notifications::count_unread(state.db(), &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count notifications"))?;

    Ok(Json(UnreadResponse {
        unread_count,
        items: items.into_iter().map(NotificationResponse::from).collect(),
    }))
}

async fn mark_read(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    payload: Option<Json<MarkReadRequest>>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let Json(payload) = payload.unwrap_or_default();
    let updated =
        repositories::notifications::mark_read(state.db(), &user.id, payload.ids.as_deref())
            .await
            .map_err(|e| ApiError::internal(e, "Failed to mark notifications read"))?;
    Ok(Json(MarkReadResponse { ok: true, updated }))
}

async fn mark_one_read(
    Path(notification_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<OkResponse>, ApiError> {
    let updated =
        repositories::notifications::mark_one_read(state.db(), &user.id, &notification_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to mark notification read"))?;
    if !updated {
        return Err(ApiError::NotFound("Notification not found".to_string()));
    }
    Ok(Json(OkResponse::ok()))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::db::types::UserRole;
    use crate::test_support;

    #[tokio::test]
    async fn teacher_broadcasts_to_students_only() {
        let ctx = test_support::setup_test_context().await;
        let pool = ctx.state.db();
        let teacher = test_support::insert_user(pool, "teach", UserRole::Teacher).await;
        let student_a = test_support::insert_user(pool, "pupil_a", UserRole::Student).await;
        test_support::insert_user(pool, "pupil_b", UserRole::Student).await;
        let token = test_support::bearer_token(&teacher.id, ctx.state.settings());

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                "/api/v1/notifications/broadcast",
                Some(&token),
                Some(json!({"role": "admin", "message": "hello"})),
            ))
            .await
            .expect("to admins");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                "/api/v1/notifications/broadcast",
                Some(&token),
                Some(json!({"role": "student", "message": "  "})),
            ))
            .await
            .expect("empty message");
        let body = test_support::read_json(response).await;
        assert_eq!(body["detail"], "role & message required");

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                "/api/v1/notifications/broadcast",
                Some(&token),
                Some(json!({"role": "student", "title": "Exam", "message": "Bring pencils"})),
            ))
            .await
            .expect("broadcast");
        assert_eq!(response.status(), StatusCode::OK);
        let body = test_support::read_json(response).await;
        assert_eq!(body["count"], 2);
        assert_eq!(body["message"], "Broadcast sent to 2 student(s).");

        let student_token = test_support::bearer_token(&student_a.id, ctx.state.settings());
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                "/api/v1/notifications/unread",
                Some(&student_token),
                None,
            ))
            .await
            .expect("unread");
        let body = test_support::read_json(response).await;
        assert_eq!(body["unread_count"], 1);
        let id = body["items"][0]["id"].as_str().expect("id").to_string();

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/notifications/{id}/read"),
                Some(&token),
                None,
            ))
            .await
            .expect("not recipient");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                "/api/v1/notifications/read",
                Some(&student_token),
                Some(json!({})),
            ))
            .await
            .expect("mark all");
        let body = test_support::read_json(response).await;
        assert_eq!(body["updated"], 1);
    }
}
