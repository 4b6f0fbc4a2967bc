use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentAdmin, CurrentStaff, CurrentUser};
use crate::core::state::AppState;
use crate::db::types::UserRole;
use crate::repositories;
use crate::services::audit;
use crate::services::quiz_excel::XLSX_CONTENT_TYPE;
use crate::services::reports::{self, StudentResultSection, UsersSummary, PDF_CONTENT_TYPE};

const ADMIN_LEADERBOARD: i64 = 10;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/attempts", get(all_attempts))
        .route("/student", get(student_results))
        .route("/class", get(class_results))
        .route("/admin", get(admin_results))
}

#[derive(Debug, Deserialize)]
struct ReportQuery {
    #[serde(default)]
    format: Option<String>,
}

fn attachment(content_type: &str, filename: &str, bytes: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        bytes,
    )
        .into_response()
}

async fn all_attempts(
    Query(params): Query<ReportQuery>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let format = params.format.as_deref().map(str::trim).unwrap_or("excel").to_ascii_lowercase();
    if !matches!(format.as_str(), "excel" | "pdf") {
        return Err(ApiError::BadRequest("format must be excel or pdf".to_string()));
    }

    let rows = repositories::stats::attempt_report_rows(state.db(), None, None)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load attempts"))?;

    let response = if format == "pdf" {
        attachment(PDF_CONTENT_TYPE, "all_attempts.pdf", reports::attempts_pdf(&rows))
    } else {
        let bytes = reports::attempts_workbook(&rows)
            .map_err(|e| ApiError::internal(e, "Failed to build spreadsheet"))?;
        attachment(XLSX_CONTENT_TYPE, "all_attempts.xlsx", bytes)
    };

    audit::log_action(
        state.db(),
        Some(&admin.id),
        &format!("Downloaded all attempts ({format})"),
        None,
        json!({"count": rows.len()}),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to record action"))?;

    tracing::info!(
        admin_id = %admin.id,
        format = %format,
        rows = rows.len(),
        action = "report_all_attempts",
        "All attempts report downloaded"
    );

    Ok(response)
}

async fn student_results(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    if user.role != UserRole::Student {
        return Err(ApiError::Forbidden("Student access required"));
    }

    let rows = repositories::stats::attempt_report_rows(state.db(), Some(&user.id), None)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load attempts"))?;

    let mut sections = Vec::with_capacity(rows.len());
    for attempt in rows {
        let wrong_questions =
            repositories::answers::wrong_objective_texts(state.db(), &attempt.attempt_id)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to load answers"))?;
        sections.push(StudentResultSection { attempt, wrong_questions });
    }

    let bytes =
        reports::student_results_pdf(&state.settings().school().name, &user.full_name(), &sections);
    tracing::info!(user_id = %user.id, action = "report_student", "Student results downloaded");
    Ok(attachment(PDF_CONTENT_TYPE, &format!("{}_results.pdf", user.username), bytes))
}

async fn class_results(
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let rows = repositories::stats::attempt_report_rows(state.db(), None, Some(&user.id))
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load attempts"))?;

    let bytes =
        reports::class_results_pdf(&state.settings().school().name, &user.full_name(), &rows);
    tracing::info!(user_id = %user.id, rows = rows.len(), action = "report_class", "Class results downloaded");
    Ok(attachment(PDF_CONTENT_TYPE, "class_results.pdf", bytes))
}

async fn admin_results(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let db = state.db();
    let leaderboard = repositories::stats::leaderboard(db, ADMIN_LEADERBOARD)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load leaderboard"))?;

    let mut counts = [0_i64; 3];
    for (slot, role) in counts.iter_mut().zip([UserRole::Student, UserRole::Teacher, UserRole::Admin]) {
        *slot = repositories::stats::count_by_role(db, role)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to count users"))?;
    }
    let [students, teachers, admins] = counts;
    let users = UsersSummary { total: students + teachers + admins, students, teachers, admins };

    let bytes = reports::admin_results_pdf(
        &state.settings().school().name,
        &admin.full_name(),
        &leaderboard,
        &users,
    );
    tracing::info!(admin_id = %admin.id, action = "report_admin", "Admin results downloaded");
    Ok(attachment(PDF_CONTENT_TYPE, "admin_results.pdf", bytes))
}
