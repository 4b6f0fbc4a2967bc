use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::api::errors::ApiError;
use crate::api::guards::{ensure_quiz_manager, CurrentStaff};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::{AttemptStatus, QuestionType};
use crate::repositories;
use crate::schemas::quiz::{GradeRequest, GradeResponse, PendingAnswer};
use crate::services::attempts::recompute_score;
use crate::services::audit::{self, Target};
use crate::services::notifications;

const PENDING_LIST_LIMIT: i64 = 200;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/pending", get(pending_answers))
        .route("/answers/:answer_id", post(grade_answer))
}

async fn pending_answers(
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<Vec<PendingAnswer>>, ApiError> {
    let creator = (!user.role.is_administrator()).then_some(user.id.as_str());
    let rows = repositories::answers::list_pending(state.db(), creator, PENDING_LIST_LIMIT)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list pending answers"))?;
    Ok(Json(rows.into_iter().map(PendingAnswer::from).collect()))
}

async fn grade_answer(
    Path(answer_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<GradeRequest>,
) -> Result<Json<GradeResponse>, ApiError> {
    let target = repositories::answers::find_grading_target(state.db(), &answer_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load answer"))?
        .ok_or_else(|| ApiError::NotFound("Answer not found.".to_string()))?;

    ensure_quiz_manager(&user, target.quiz_created_by.as_deref())?;

    if target.question_type != QuestionType::Subjective {
        return Err(ApiError::BadRequest("Only subjective answers are graded manually.".to_string()));
    }
    if target.attempt_status != AttemptStatus::Submitted {
        return Err(ApiError::BadRequest("Attempt has not been submitted yet.".to_string()));
    }
    if !payload.marks.is_finite() || payload.marks < 0.0 || payload.marks > target.max_marks {
        return Err(ApiError::BadRequest(format!(
            "Marks must be between 0 and {}.",
            target.max_marks
        )));
    }

    let feedback = payload.feedback.as_deref().map(str::trim).filter(|f| !f.is_empty());

    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;
    let was_graded = repositories::attempts::find_by_id_for_update(&mut *tx, &target.attempt_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load attempt"))?
        .map(|attempt| attempt.graded)
        .unwrap_or(false);

    repositories::answers::grade(
        &mut *tx,
        &target.id,
        payload.marks,
        feedback,
        &user.id,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to grade answer"))?;

    let (score, graded) = recompute_score(&mut tx, &target.attempt_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to recompute score"))?;

    audit::log_action(
        &mut *tx,
        Some(&user.id),
        "Graded answer",
        Some(Target { model: "Answer", object_id: &target.id }),
        json!({"attempt_id": target.attempt_id, "marks": payload.marks, "score": score}),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to record action"))?;

    if graded && !was_graded {
        notifications::notify(
            &mut *tx,
            &target.student_id,
            "Quiz graded",
            &format!("Your attempt on {} has been fully graded. Score: {score}", target.quiz_title),
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to notify student"))?;
    }

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit grade"))?;

    tracing::info!(
        user_id = %user.id,
        answer_id = %target.id,
        attempt_id = %target.attempt_id,
        score,
        graded,
        action = "grade_answer",
        "Answer graded"
    );

    Ok(Json(GradeResponse { ok: true, attempt_id: target.attempt_id, score, graded }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::core::time::primitive_now_utc;
    use crate::db::types::UserRole;
    use crate::repositories;
    use crate::schemas::attempt::AutosaveEntry;
    use crate::services::attempts;
    use crate::test_support;

    #[tokio::test]
    async fn grading_completes_attempt_and_notifies_student() {
        let ctx = test_support::setup_test_context().await;
        let fixture = test_support::quiz_fixture(ctx.state.db(), false).await;
        let pool = ctx.state.db();
        let now = primitive_now_utc();

        let started = attempts::start(pool, &fixture.quiz.id, &fixture.student, now)
            .await
            .expect("start");
        let questions =
            repositories::quizzes::list_questions(pool, &fixture.quiz.id).await.expect("questions");
        let subjective = questions.iter().find(|q| q.marks == 3.0).expect("subjective");
        attempts::autosave(
            pool,
            &started.attempt_id,
            &fixture.student.id,
            &[AutosaveEntry {
                question_id: Some(subjective.id.clone()),
                choice_id: None,
                text: Some("Adding combines quantities.".to_string()),
            }],
            now,
        )
        .await
        .expect("autosave");
        attempts::submit(pool, &started.attempt_id, &fixture.student.id, now)
            .await
            .expect("submit");

        let token = test_support::bearer_token(&fixture.teacher.id, ctx.state.settings());
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                "/api/v1/grading/pending",
                Some(&token),
                None,
            ))
            .await
            .expect("pending");
        let pending = test_support::read_json(response).await;
        let answer_id = pending[0]["answer_id"].as_str().expect("answer id").to_string();
        assert_eq!(pending[0]["max_marks"], 3.0);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/grading/answers/{answer_id}"),
                Some(&token),
                Some(json!({"marks": 4})),
            ))
            .await
            .expect("too many marks");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/grading/answers/{answer_id}"),
                Some(&token),
                Some(json!({"marks": 2.5, "feedback": "Good"})),
            ))
            .await
            .expect("grade");
        assert_eq!(response.status(), StatusCode::OK);
        let body = test_support::read_json(response).await;
        assert_eq!(body["graded"], true);
        assert_eq!(body["score"], 2.5);

        let unread = repositories::notifications::count_unread(pool, &fixture.student.id)
            .await
            .expect("unread");
        assert_eq!(unread, 1);
    }

    #[tokio::test]
    async fn other_teachers_cannot_grade() {
        let ctx = test_support::setup_test_context().await;
        let fixture = test_support::quiz_fixture(ctx.state.db(), false).await;
        let pool = ctx.state.db();
        let now = primitive_now_utc();

        let started = attempts::start(pool, &fixture.quiz.id, &fixture.student, now)
            .await
            .expect("start");
        attempts::submit(pool, &started.attempt_id, &fixture.student.id, now)
            .await
            .expect("submit");
        let pending = repositories::answers::list_pending(pool, None, 10).await.expect("pending");
        let answer_id = &pending[0].answer_id;

        let other = test_support::insert_user(pool, "other", UserRole::Teacher).await;
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/grading/answers/{answer_id}"),
                Some(&test_support::bearer_token(&other.id, ctx.state.settings())),
                Some(json!({"marks": 1})),
            ))
            .await
            .expect("grade");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
