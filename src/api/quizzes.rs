use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::{ensure_quiz_manager, CurrentStaff};
use crate::api::pagination::{PaginatedResponse, SkipLimit};
use crate::api::validation::{read_file_field, validate_xlsx_filename};
use crate::core::state::AppState;
use crate::core::time::{format_primitive, primitive_now_utc};
use crate::db::models::{Quiz, User};
use crate::repositories;
use crate::repositories::quizzes::QuizFields;
use crate::schemas::quiz::{
    EditableChoice, EditableQuestion, PublishResponse, QuizDetail, QuizPayload, QuizSavedResponse,
    QuizSummary,
};
use crate::schemas::OkResponse;
use crate::services::audit::{self, Target};
use crate::services::quiz_authoring::{self, AuthoringError, ValidQuestion};
use crate::services::quiz_excel;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_quizzes).post(create_quiz))
        .route("/import", post(import_quiz))
        .route("/template", get(download_template))
        .route("/:quiz_id", get(get_quiz).put(update_quiz).delete(delete_quiz))
        .route("/:quiz_id/toggle-publish", post(toggle_publish))
}

/// A payload that passed validation and is ready to be written.
struct PreparedQuiz {
    title: String,
    description: Option<String>,
    subject_id: String,
    duration_minutes: i32,
    start_time: time::PrimitiveDateTime,
    end_time: time::PrimitiveDateTime,
    is_published: bool,
    shuffle_questions: bool,
    allow_retake: bool,
    questions: Vec<ValidQuestion>,
}

impl PreparedQuiz {
    fn fields(&self) -> QuizFields<'_> {
        QuizFields {
            title: &self.title,
            description: self.description.as_deref(),
            subject_id: &self.subject_id,
            duration_minutes: self.duration_minutes,
            start_time: self.start_time,
            end_time: self.end_time,
            is_published: self.is_published,
            shuffle_questions: self.shuffle_questions,
            allow_retake: self.allow_retake,
        }
    }
}

async fn prepare(state: &AppState, payload: QuizPayload) -> Result<PreparedQuiz, ApiError> {
    let title = payload.title.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let subject_id = payload.subject_id.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let (Some(title), Some(subject_id)) = (title, subject_id) else {
        return Err(AuthoringError::MissingTitleOrSubject.into());
    };

    repositories::classes::find_subject(state.db(), subject_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load subject"))?
        .ok_or_else(|| ApiError::NotFound("Subject not found.".to_string()))?;

    let (start_time, end_time) = quiz_authoring::parse_window(
        payload.start_time.as_deref(),
        payload.end_time.as_deref(),
    )?;
    let duration_minutes = quiz_authoring::resolve_duration(
        payload.duration_minutes,
        state.settings().exam().default_quiz_duration_minutes,
    )?;
    let questions = quiz_authoring::validate_questions(&payload.questions)?;

    Ok(PreparedQuiz {
        title: title.to_string(),
        description: payload.description.filter(|d| !d.trim().is_empty()),
        subject_id: subject_id.to_string(),
        duration_minutes,
        start_time,
        end_time,
        is_published: payload.is_published,
        shuffle_questions: payload.shuffle_questions,
        allow_retake: payload.allow_retake,
        questions,
    })
}

async fn insert_quiz(
    state: &AppState,
    user: &User,
    prepared: &PreparedQuiz,
    action: &str,
) -> Result<Quiz, ApiError> {
    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;

    let quiz = repositories::quizzes::create(
        &mut *tx,
        &Uuid::new_v4().to_string(),
        &user.id,
        &prepared.fields(),
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create quiz"))?;

    quiz_authoring::insert_questions(&mut tx, &quiz.id, &prepared.questions)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to save questions"))?;

    audit::log_action(
        &mut *tx,
        Some(&user.id),
        action,
        Some(Target { model: "Quiz", object_id: &quiz.id }),
        json!({"title": quiz.title, "questions": prepared.questions.len()}),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to record action"))?;

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit quiz"))?;
    Ok(quiz)
}

async fn create_quiz(
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<QuizPayload>,
) -> Result<(StatusCode, Json<QuizSavedResponse>), ApiError> {
    let prepared = prepare(&state, payload).await?;
    let quiz = insert_quiz(&state, &user, &prepared, "Created quiz").await?;

    tracing::info!(
        user_id = %user.id,
        quiz_id = %quiz.id,
        questions = prepared.questions.len(),
        action = "quiz_create",
        "Quiz created"
    );

    Ok((
        StatusCode::CREATED,
        Json(QuizSavedResponse { ok: true, quiz_id: quiz.id, message: "Quiz created." }),
    ))
}

async fn update_quiz(
    Path(quiz_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<QuizPayload>,
) -> Result<Json<QuizSavedResponse>, ApiError> {
    let quiz = fetch_quiz(&state, &quiz_id).await?;
    ensure_quiz_manager(&user, quiz.created_by.as_deref())?;

    let attempts = repositories::quizzes::count_attempts(state.db(), &quiz.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count attempts"))?;
    if attempts > 0 {
        return Err(ApiError::Conflict(
            "Quiz already has attempts and can no longer be edited.".to_string(),
        ));
    }

    let prepared = prepare(&state, payload).await?;

    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;
    repositories::quizzes::update(&mut *tx, &quiz.id, &prepared.fields(), primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update quiz"))?;
    repositories::quizzes::delete_questions(&mut *tx, &quiz.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to replace questions"))?;
    quiz_authoring::insert_questions(&mut tx, &quiz.id, &prepared.questions)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to save questions"))?;
    audit::log_action(
        &mut *tx,
        Some(&user.id),
        "Updated quiz",
        Some(Target { model: "Quiz", object_id: &quiz.id }),
        json!({"title": prepared.title, "questions": prepared.questions.len()}),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to record action"))?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit quiz"))?;

    Ok(Json(QuizSavedResponse { ok: true, quiz_id: quiz.id, message: "Quiz updated." }))
}

async fn get_quiz(
    Path(quiz_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<QuizDetail>, ApiError> {
    let quiz = fetch_quiz(&state, &quiz_id).await?;
    ensure_quiz_manager(&user, quiz.created_by.as_deref())?;

    let questions = repositories::quizzes::list_questions(state.db(), &quiz.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load questions"))?;
    let choices = repositories::quizzes::list_choices_for_quiz(state.db(), &quiz.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load choices"))?;

    let mut by_question: HashMap<String, Vec<EditableChoice>> = HashMap::new();
    for choice in choices {
        by_question.entry(choice.question_id).or_default().push(EditableChoice {
            id: choice.id,
            text: choice.text,
            is_correct: choice.is_correct,
        });
    }

    let total_marks = questions.iter().map(|q| q.marks).sum();
    let questions = questions
        .into_iter()
        .map(|question| EditableQuestion {
            choices: by_question.remove(&question.id).unwrap_or_default(),
            id: question.id,
            text: question.text,
            question_type: question.question_type,
            marks: question.marks,
        })
        .collect();

    Ok(Json(QuizDetail {
        id: quiz.id,
        title: quiz.title,
        description: quiz.description,
        subject_id: quiz.subject_id,
        created_by: quiz.created_by,
        start_time: format_primitive(quiz.start_time),
        end_time: format_primitive(quiz.end_time),
        duration_minutes: quiz.duration_minutes,
        is_published: quiz.is_published,
        shuffle_questions: quiz.shuffle_questions,
        allow_retake: quiz.allow_retake,
        total_marks,
        questions,
    }))
}

async fn list_quizzes(
    Query(params): Query<SkipLimit>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<PaginatedResponse<QuizSummary>>, ApiError> {
    let owner = (!user.role.is_administrator()).then_some(user.id.as_str());

    let rows = repositories::quizzes::list_managed(state.db(), owner, params.skip, params.limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list quizzes"))?;
    let total_count = repositories::quizzes::count_managed(state.db(), owner)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count quizzes"))?;

    Ok(Json(PaginatedResponse {
        items: rows.into_iter().map(QuizSummary::from).collect(),
        total_count,
        skip: params.skip.max(0),
        limit: params.limit.clamp(1, 1000),
    }))
}

async fn toggle_publish(
    Path(quiz_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<PublishResponse>, ApiError> {
    let quiz = fetch_quiz(&state, &quiz_id).await?;
    ensure_quiz_manager(&user, quiz.created_by.as_deref())?;

    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;
    let is_published = repositories::quizzes::toggle_publish(&mut *tx, &quiz.id, primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to toggle publish"))?;
    audit::log_action(
        &mut *tx,
        Some(&user.id),
        if is_published { "Published quiz" } else { "Unpublished quiz" },
        Some(Target { model: "Quiz", object_id: &quiz.id }),
        json!({"is_published": is_published}),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to record action"))?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit publish toggle"))?;

    Ok(Json(PublishResponse { ok: true, is_published }))
}

async fn delete_quiz(
    Path(quiz_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<OkResponse>, ApiError> {
    let quiz = fetch_quiz(&state, &quiz_id).await?;
    ensure_quiz_manager(&user, quiz.created_by.as_deref())?;

    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;
    repositories::quizzes::delete_by_id(&mut *tx, &quiz.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete quiz"))?;
    audit::log_action(
        &mut *tx,
        Some(&user.id),
        "Deleted quiz",
        Some(Target { model: "Quiz", object_id: &quiz.id }),
        json!({"title": quiz.title}),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to record action"))?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit deletion"))?;

    tracing::info!(user_id = %user.id, quiz_id = %quiz.id, action = "quiz_delete", "Quiz deleted");
    Ok(Json(OkResponse::ok()))
}

async fn import_quiz(
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<QuizSavedResponse>), ApiError> {
    let max_bytes = state.settings().exam().max_import_bytes();
    let file = read_file_field(&mut multipart, "excel_file", max_bytes)
        .await?
        .ok_or_else(|| ApiError::BadRequest("No file uploaded".to_string()))?;
    validate_xlsx_filename(&file.filename)?;

    let imported = quiz_excel::parse_workbook(&file.bytes)?;

    let class = repositories::classes::find_class_by_name(state.db(), &imported.class_name)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load class"))?
        .ok_or_else(|| ApiError::NotFound(format!("Class '{}' not found", imported.class_name)))?;
    let subject =
        repositories::classes::find_subject_in_class(state.db(), &class.id, &imported.subject_name)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load subject"))?
            .ok_or_else(|| {
                ApiError::NotFound(format!(
                    "Subject '{}' not found for class {}",
                    imported.subject_name, class.name
                ))
            })?;

    quiz_authoring::check_window(imported.start_time, imported.end_time)?;
    let duration_minutes = quiz_authoring::resolve_duration(
        Some(imported.duration_minutes),
        state.settings().exam().default_quiz_duration_minutes,
    )?;
    let questions = quiz_authoring::validate_questions(&imported.questions)?;

    let prepared = PreparedQuiz {
        title: imported.title,
        description: None,
        subject_id: subject.id,
        duration_minutes,
        start_time: imported.start_time,
        end_time: imported.end_time,
        is_published: imported.is_published,
        shuffle_questions: false,
        allow_retake: false,
        questions,
    };
    let quiz = insert_quiz(&state, &user, &prepared, "Imported quiz from Excel").await?;

    tracing::info!(
        user_id = %user.id,
        quiz_id = %quiz.id,
        filename = %file.filename,
        questions = prepared.questions.len(),
        action = "quiz_import",
        "Quiz imported from workbook"
    );

    Ok((
        StatusCode::CREATED,
        Json(QuizSavedResponse { ok: true, quiz_id: quiz.id, message: "Quiz imported from Excel." }),
    ))
}

async fn download_template(CurrentStaff(_user): CurrentStaff) -> Result<impl IntoResponse, ApiError> {
    let bytes =
        quiz_excel::build_template().map_err(|e| ApiError::internal(e, "Failed to build template"))?;
    Ok((
        [
            (header::CONTENT_TYPE, quiz_excel::XLSX_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", quiz_excel::TEMPLATE_FILENAME),
            ),
        ],
        bytes,
    ))
}

async fn fetch_quiz(state: &AppState, quiz_id: &str) -> Result<Quiz, ApiError> {
    repositories::quizzes::find_by_id(state.db(), quiz_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load quiz"))?
        .ok_or_else(|| ApiError::NotFound("Quiz not found.".to_string()))
}
