use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::core::time::{format_primitive, primitive_now_utc};
use crate::repositories;
use crate::schemas::attempt::{
    AttemptPaper, AttemptReview, AttemptSummary, AutosaveRequest, AutosaveResponse,
    StartAttemptResponse, StudentQuizStatus, SubmitResponse,
};
use crate::services::attempts;

const MY_ATTEMPTS_LIMIT: i64 = 50;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/available", get(available_quizzes))
        .route("/mine", get(my_attempts))
        .route("/start/:quiz_id", post(start_attempt))
        .route("/:attempt_id", get(attempt_paper))
        .route("/:attempt_id/autosave", post(autosave))
        .route("/:attempt_id/submit", post(submit_attempt))
        .route("/:attempt_id/review", get(review_attempt))
}

async fn available_quizzes(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<StudentQuizStatus>>, ApiError> {
    let statuses = attempts::quiz_status_for_student(state.db(), &user)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list quizzes"))?;
    Ok(Json(statuses))
}

async fn my_attempts(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<AttemptSummary>>, ApiError> {
    let rows = repositories::attempts::list_for_student(state.db(), &user.id, MY_ATTEMPTS_LIMIT)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list attempts"))?;
    Ok(Json(rows.into_iter().map(AttemptSummary::from).collect()))
}

async fn start_attempt(
    Path(quiz_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<StartAttemptResponse>, ApiError> {
    let started = attempts::start(state.db(), &quiz_id, &user, primitive_now_utc()).await?;
    Ok(Json(StartAttemptResponse {
        ok: true,
        attempt_id: started.attempt_id,
        end_time: format_primitive(started.expires_at),
        resume: started.resumed,
    }))
}

async fn attempt_paper(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptPaper>, ApiError> {
    let paper = attempts::paper(state.db(), &attempt_id, &user.id, primitive_now_utc()).await?;
    Ok(Json(paper))
}

async fn autosave(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<AutosaveRequest>,
) -> Result<Json<AutosaveResponse>, ApiError> {
    let interval = state.settings().exam().autosave_min_interval_seconds;
    if !state.redis().allow_autosave(&attempt_id, interval).await {
        return Err(ApiError::TooManyRequests("Autosave is too frequent, try again shortly"));
    }

    let saved =
        attempts::autosave(state.db(), &attempt_id, &user.id, &payload.answers, primitive_now_utc())
            .await?;
    Ok(Json(AutosaveResponse { ok: true, saved }))
}

async fn submit_attempt(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let outcome = attempts::submit(state.db(), &attempt_id, &user.id, primitive_now_utc()).await?;
    Ok(Json(SubmitResponse {
        ok: true,
        message: outcome.message().to_string(),
        score: outcome.score,
    }))
}

async fn review_attempt(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptReview>, ApiError> {
    let review = attempts::review(state.db(), &attempt_id, &user).await?;
    Ok(Json(review))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::db::types::UserRole;
    use crate::repositories;
    use crate::test_support;

    #[tokio::test]
    async fn student_takes_quiz_end_to_end() {
        let ctx = test_support::setup_test_context().await;
        let fixture = test_support::quiz_fixture(ctx.state.db(), false).await;
        let token = test_support::bearer_token(&fixture.student.id, ctx.state.settings());

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                "/api/v1/attempts/available",
                Some(&token),
                None,
            ))
            .await
            .expect("available");
        let available = test_support::read_json(response).await;
        assert_eq!(available[0]["status"], "Not Started");

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/attempts/start/{}", fixture.quiz.id),
                Some(&token),
                None,
            ))
            .await
            .expect("start");
        assert_eq!(response.status(), StatusCode::OK);
        let started = test_support::read_json(response).await;
        assert_eq!(started["resume"], false);
        let attempt_id = started["attempt_id"].as_str().expect("attempt id").to_string();

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/attempts/start/{}", fixture.quiz.id),
                Some(&token),
                None,
            ))
            .await
            .expect("resume");
        let resumed = test_support::read_json(response).await;
        assert_eq!(resumed["resume"], true);
        assert_eq!(resumed["attempt_id"], attempt_id.as_str());
        assert_eq!(resumed["end_time"], started["end_time"]);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                &format!("/api/v1/attempts/{attempt_id}"),
                Some(&token),
                None,
            ))
            .await
            .expect("paper");
        let paper = test_support::read_json(response).await;
        let questions = paper["questions"].as_array().expect("questions");
        assert_eq!(questions.len(), 2);
        assert!(questions[0]["choices"][0].get("is_correct").is_none());

        let objective = questions
            .iter()
            .find(|q| q["question_type"] == "objective")
            .expect("objective question");
        let correct = objective["choices"]
            .as_array()
            .and_then(|choices| choices.iter().find(|c| c["text"] == "4"))
            .expect("choice 4");

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/attempts/{attempt_id}/autosave"),
                Some(&token),
                Some(json!({"answers": [
                    {"question_id": objective["id"], "choice_id": correct["id"]}
                ]})),
            ))
            .await
            .expect("autosave");
        assert_eq!(response.status(), StatusCode::OK);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/attempts/{attempt_id}/autosave"),
                Some(&token),
                Some(json!({"answers": []})),
            ))
            .await
            .expect("autosave again");
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/attempts/{attempt_id}/submit"),
                Some(&token),
                None,
            ))
            .await
            .expect("submit");
        let submitted = test_support::read_json(response).await;
        assert_eq!(submitted["message"], "Submitted");
        assert_eq!(submitted["score"], 2.0);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/attempts/{attempt_id}/submit"),
                Some(&token),
                None,
            ))
            .await
            .expect("submit twice");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = test_support::read_json(response).await;
        assert_eq!(body["detail"], "Already submitted.");

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                &format!("/api/v1/attempts/{attempt_id}/review"),
                Some(&test_support::bearer_token(&fixture.teacher.id, ctx.state.settings())),
                None,
            ))
            .await
            .expect("review");
        let review = test_support::read_json(response).await;
        assert_eq!(review["objective_total"], 2.0);
        assert_eq!(review["graded"], false);

        let logs = repositories::action_logs::list(ctx.state.db(), 0, 10).await.expect("logs");
        assert!(logs.iter().any(|log| log.action == "Submitted attempt"));
    }

    #[tokio::test]
    async fn other_users_cannot_touch_an_attempt() {
        let ctx = test_support::setup_test_context().await;
        let fixture = test_support::quiz_fixture(ctx.state.db(), false).await;
        let intruder =
            test_support::insert_student(ctx.state.db(), "intruder", &fixture.class.id).await;
        let teacher_token = test_support::bearer_token(&fixture.teacher.id, ctx.state.settings());

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/attempts/start/{}", fixture.quiz.id),
                Some(&teacher_token),
                None,
            ))
            .await
            .expect("teacher start");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let started = crate::services::attempts::start(
            ctx.state.db(),
            &fixture.quiz.id,
            &fixture.student,
            crate::core::time::primitive_now_utc(),
        )
        .await
        .expect("start");

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/attempts/{}/submit", started.attempt_id),
                Some(&test_support::bearer_token(&intruder.id, ctx.state.settings())),
                None,
            ))
            .await
            .expect("intruder submit");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let outsider = test_support::insert_user(ctx.state.db(), "outsider", UserRole::Student).await;
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/attempts/start/{}", fixture.quiz.id),
                Some(&test_support::bearer_token(&outsider.id, ctx.state.settings())),
                None,
            ))
            .await
            .expect("wrong class");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
