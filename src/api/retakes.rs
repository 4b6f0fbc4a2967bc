use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde_json::json;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::core::state::AppState;
use crate::db::models::{Quiz, QuizAttempt, User};
use crate::db::types::{AttemptStatus, UserRole};
use crate::repositories;
use crate::schemas::quiz::{RetakeRequest, RetakeResponse};
use crate::services::audit::{self, Target};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/quizzes/:quiz_id", post(approve_retake))
        .route("/attempts/:attempt_id", post(grant_retake))
}

async fn approve_retake(
    Path(quiz_id): Path<String>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<RetakeRequest>,
) -> Result<Json<RetakeResponse>, ApiError> {
    let quiz = repositories::quizzes::find_by_id(state.db(), &quiz_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load quiz"))?
        .ok_or_else(|| ApiError::NotFound("Quiz not found.".to_string()))?;
    let student = fetch_student(&state, &payload.student_id).await?;

    let latest = repositories::attempts::find_latest(state.db(), &quiz.id, &student.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load attempts"))?
        .ok_or_else(|| ApiError::BadRequest("Student has not attempted this quiz.".to_string()))?;

    allow_retake(&state, &admin, &quiz, &student, &latest).await.map(Json)
}

async fn grant_retake(
    Path(attempt_id): Path<String>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<RetakeResponse>, ApiError> {
    let attempt = repositories::attempts::find_by_id(state.db(), &attempt_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load attempt"))?
        .ok_or_else(|| ApiError::NotFound("Attempt not found.".to_string()))?;
    let quiz = repositories::quizzes::find_by_id(state.db(), &attempt.quiz_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load quiz"))?
        .ok_or_else(|| ApiError::NotFound("Quiz not found.".to_string()))?;
    let student = fetch_student(&state, &attempt.student_id).await?;

    // `start` only honours the flag on the latest attempt.
    let latest = repositories::attempts::find_latest(state.db(), &quiz.id, &student.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load attempts"))?
        .unwrap_or(attempt);

    allow_retake(&state, &admin, &quiz, &student, &latest).await.map(Json)
}

async fn fetch_student(state: &AppState, student_id: &str) -> Result<User, ApiError> {
    repositories::users::find_by_id(state.db(), student_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load student"))?
        .filter(|user| user.role == UserRole::Student)
        .ok_or_else(|| ApiError::NotFound("Student not found.".to_string()))
}

async fn allow_retake(
    state: &AppState,
    admin: &User,
    quiz: &Quiz,
    student: &User,
    attempt: &QuizAttempt,
) -> Result<RetakeResponse, ApiError> {
    if attempt.status == AttemptStatus::Active {
        return Err(ApiError::BadRequest("Attempt is still in progress.".to_string()));
    }

    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;
    repositories::attempts::set_retake_allowed(&mut *tx, &attempt.id, true)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to allow retake"))?;
    let retake_count = repositories::attempts::count_for_student(&mut *tx, &quiz.id, &student.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count attempts"))?;
    audit::log_action(
        &mut *tx,
        Some(&admin.id),
        "Approved Retake",
        Some(Target { model: "QuizAttempt", object_id: &attempt.id }),
        json!({
            "quiz_id": quiz.id,
            "student_id": student.id,
            "attempt_number": attempt.attempt_number,
        }),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to record action"))?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit retake"))?;

    tracing::info!(
        admin_id = %admin.id,
        student_id = %student.id,
        quiz_id = %quiz.id,
        attempt_number = attempt.attempt_number,
        action = "retake_approve",
        "Retake approved"
    );

    Ok(RetakeResponse {
        success: true,
        message: format!("{} can now retake {}.", student.username, quiz.title),
        retake_count,
    })
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::core::time::primitive_now_utc;
    use crate::db::types::UserRole;
    use crate::services::attempts;
    use crate::test_support;

    #[tokio::test]
    async fn approved_retake_lets_student_start_again() {
        let ctx = test_support::setup_test_context().await;
        let fixture = test_support::quiz_fixture(ctx.state.db(), false).await;
        let pool = ctx.state.db();
        let admin = test_support::insert_user(pool, "admin001", UserRole::Admin).await;
        let token = test_support::bearer_token(&admin.id, ctx.state.settings());
        let uri = format!("/api/v1/retakes/quizzes/{}", fixture.quiz.id);
        let now = primitive_now_utc();

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &uri,
                Some(&token),
                Some(json!({"student_id": fixture.student.id})),
            ))
            .await
            .expect("no attempts");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = test_support::read_json(response).await;
        assert_eq!(body["detail"], "Student has not attempted this quiz.");

        let first = attempts::start(pool, &fixture.quiz.id, &fixture.student, now)
            .await
            .expect("start");
        attempts::submit(pool, &first.attempt_id, &fixture.student.id, now).await.expect("submit");
        let denied = attempts::start(pool, &fixture.quiz.id, &fixture.student, now).await;
        assert!(matches!(denied, Err(attempts::AttemptError::RetakeNotAllowed)));

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &uri,
                Some(&token),
                Some(json!({"student_id": fixture.student.id})),
            ))
            .await
            .expect("approve");
        assert_eq!(response.status(), StatusCode::OK);
        let body = test_support::read_json(response).await;
        assert_eq!(body["message"], "student1 can now retake Arithmetic.");
        assert_eq!(body["retake_count"], 1);

        let second = attempts::start(pool, &fixture.quiz.id, &fixture.student, now)
            .await
            .expect("retake");
        assert_ne!(second.attempt_id, first.attempt_id);
    }

    #[tokio::test]
    async fn grant_on_superseded_attempt_unlocks_the_next_start() {
        let ctx = test_support::setup_test_context().await;
        let fixture = test_support::quiz_fixture(ctx.state.db(), false).await;
        let pool = ctx.state.db();
        let admin = test_support::insert_user(pool, "admin001", UserRole::Admin).await;
        let token = test_support::bearer_token(&admin.id, ctx.state.settings());
        let now = primitive_now_utc();

        let first = attempts::start(pool, &fixture.quiz.id, &fixture.student, now)
            .await
            .expect("first start");
        attempts::submit(pool, &first.attempt_id, &fixture.student.id, now)
            .await
            .expect("first submit");
        crate::repositories::attempts::set_retake_allowed(pool, &first.attempt_id, true)
            .await
            .expect("allow");
        let second = attempts::start(pool, &fixture.quiz.id, &fixture.student, now)
            .await
            .expect("second start");
        attempts::submit(pool, &second.attempt_id, &fixture.student.id, now)
            .await
            .expect("second submit");

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/retakes/attempts/{}", first.attempt_id),
                Some(&token),
                None,
            ))
            .await
            .expect("grant");
        assert_eq!(response.status(), StatusCode::OK);
        let body = test_support::read_json(response).await;
        assert_eq!(body["retake_count"], 2);

        let third = attempts::start(pool, &fixture.quiz.id, &fixture.student, now)
            .await
            .expect("third start");
        assert_ne!(third.attempt_id, second.attempt_id);
        let row = crate::repositories::attempts::find_by_id(pool, &third.attempt_id)
            .await
            .expect("load")
            .expect("attempt");
        assert_eq!(row.attempt_number, 3);
    }

    #[tokio::test]
    async fn grant_refuses_active_attempt_and_teachers() {
        let ctx = test_support::setup_test_context().await;
        let fixture = test_support::quiz_fixture(ctx.state.db(), false).await;
        let pool = ctx.state.db();
        let admin = test_support::insert_user(pool, "admin001", UserRole::Admin).await;

        let started = attempts::start(pool, &fixture.quiz.id, &fixture.student, primitive_now_utc())
            .await
            .expect("start");
        let uri = format!("/api/v1/retakes/attempts/{}", started.attempt_id);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &uri,
                Some(&test_support::bearer_token(&fixture.teacher.id, ctx.state.settings())),
                None,
            ))
            .await
            .expect("teacher");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &uri,
                Some(&test_support::bearer_token(&admin.id, ctx.state.settings())),
                None,
            ))
            .await
            .expect("admin");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/retakes/quizzes/{}", fixture.quiz.id),
                Some(&test_support::bearer_token(&admin.id, ctx.state.settings())),
                Some(json!({"student_id": fixture.student.id})),
            ))
            .await
            .expect("approve while active");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = test_support::read_json(response).await;
        assert_eq!(body["detail"], "Attempt is still in progress.");
    }
}
