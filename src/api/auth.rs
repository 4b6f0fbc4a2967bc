use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::security;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::{ApprovalStatus, UserRole};
use crate::repositories;
use crate::schemas::auth::TokenResponse;
use crate::schemas::user::{LoginRequest, SignupRequest, UserResponse};
use crate::schemas::OkResponse;

const INVALID_CREDENTIALS: &str = "Incorrect username or password";

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
}

async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if !matches!(payload.role, UserRole::Teacher | UserRole::Student) {
        return Err(ApiError::BadRequest("role must be teacher or student".to_string()));
    }

    if let Some(class_id) = payload.school_class_id.as_deref() {
        repositories::classes::find_class(state.db(), class_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load class"))?
            .ok_or_else(|| ApiError::NotFound("Class not found".to_string()))?;
    }

    let conflict =
        repositories::users::find_conflict(state.db(), &payload.username, &payload.email, None)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to check existing user"))?;
    if let Some(field) = conflict {
        return Err(ApiError::Conflict(format!("A user with this {field} already exists")));
    }

    let hashed_password = security::hash_password(&payload.password)
        .map_err(|e| ApiError::internal(e, "Failed to hash password"))?;

    let user = repositories::users::create(
        state.db(),
        repositories::users::CreateUser {
            id: &Uuid::new_v4().to_string(),
            username: &payload.username,
            email: &payload.email,
            hashed_password,
            first_name: payload.first_name.trim(),
            last_name: payload.last_name.trim(),
            role: payload.role,
            approval_status: ApprovalStatus::Pending,
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

    tracing::info!(
        user_id = %user.id,
        role = user.role.as_str(),
        action = "signup",
        "User signed up; awaiting approval"
    );

    Ok((StatusCode::CREATED, Json(UserResponse::from_db(user))))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let per_minute = state.settings().security().login_attempts_per_minute;
    if !state.redis().allow_login(&payload.username, per_minute).await {
        return Err(ApiError::TooManyRequests("Too many login attempts, try again later"));
    }

    let user = repositories::users::find_by_username(state.db(), &payload.username)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load user"))?
        .ok_or(ApiError::Unauthorized(INVALID_CREDENTIALS))?;

    let verified = security::verify_password(&payload.password, &user.hashed_password)
        .map_err(|_| ApiError::Unauthorized(INVALID_CREDENTIALS))?;
    if !verified {
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS));
    }

    if !user.is_active {
        return Err(ApiError::Forbidden("Inactive user"));
    }
    if !user.is_approved() {
        return Err(ApiError::Forbidden("Account pending approval"));
    }

    let token = security::create_access_token(&user.id, state.settings(), None)
        .map_err(|e| ApiError::internal(e, "Failed to create access token"))?;

    tracing::info!(user_id = %user.id, action = "login", "User logged in");

    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer".to_string(),
        user: UserResponse::from_db(user),
    }))
}

async fn logout(CurrentUser(user): CurrentUser) -> Json<OkResponse> {
    tracing::info!(user_id = %user.id, action = "logout", "User logged out");
    Json(OkResponse::ok())
}

async fn me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::from_db(user))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::db::types::UserRole;
    use crate::test_support;

    #[tokio::test]
    async fn signup_creates_pending_account_that_cannot_log_in() {
        let ctx = test_support::setup_test_context().await;

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                "/api/v1/auth/signup",
                None,
                Some(json!({
                    "username": "newstudent",
                    "email": "new@example.com",
                    "password": "password123",
                    "first_name": "New",
                    "last_name": "Student",
                    "role": "student"
                })),
            ))
            .await
            .expect("signup");
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = test_support::read_json(response).await;
        assert_eq!(body["approval_status"], "pending");

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(json!({"username": "newstudent", "password": "password123"})),
            ))
            .await
            .expect("login");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = test_support::read_json(response).await;
        assert_eq!(body["detail"], "Account pending approval");
    }

    #[tokio::test]
    async fn signup_rejects_duplicates_and_admin_role() {
        let ctx = test_support::setup_test_context().await;
        test_support::insert_user(ctx.state.db(), "taken", UserRole::Teacher).await;

        let duplicate = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                "/api/v1/auth/signup",
                None,
                Some(json!({
                    "username": "taken",
                    "email": "other@example.com",
                    "password": "password123",
                    "role": "teacher"
                })),
            ))
            .await
            .expect("signup");
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);

        let admin = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                "/api/v1/auth/signup",
                None,
                Some(json!({
                    "username": "sneaky",
                    "email": "sneaky@example.com",
                    "password": "password123",
                    "role": "admin"
                })),
            ))
            .await
            .expect("signup");
        assert_eq!(admin.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_returns_token_and_rejects_bad_password() {
        let ctx = test_support::setup_test_context().await;
        test_support::insert_user(ctx.state.db(), "teach", UserRole::Teacher).await;

        let ok = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(json!({"username": "teach", "password": test_support::TEST_PASSWORD})),
            ))
            .await
            .expect("login");
        assert_eq!(ok.status(), StatusCode::OK);
        let body = test_support::read_json(ok).await;
        assert_eq!(body["token_type"], "bearer");
        assert_eq!(body["user"]["role"], "teacher");

        let bad = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(json!({"username": "teach", "password": "wrong-password"})),
            ))
            .await
            .expect("login");
        assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);
        let body = test_support::read_json(bad).await;
        assert_eq!(body["detail"], "Incorrect username or password");
    }
}
