use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentAdmin, CurrentStaff, CurrentSuperadmin, CurrentUser};
use crate::api::pagination::{page_window, total_pages, Page, PaginatedResponse, SkipLimit};
use crate::core::state::AppState;
use crate::db::models::User;
use crate::db::types::UserRole;
use crate::repositories;
use crate::schemas::attempt::AttemptSummary;
use crate::schemas::dashboard::{
    round2, AdminDashboard, AdminDashboardQuery, AdminStats, ClassPerformance, LeaderboardEntry,
    LeaderboardQuery, LogEntry, QuizPerformance, StudentDashboard, StudentSummaryResponse,
    SuperadminDashboard, TeacherDashboard,
};
use crate::schemas::notification::NotificationResponse;
use crate::schemas::quiz::QuizSummary;
use crate::schemas::user::UserResponse;
use crate::services::attempts;

const DEFAULT_LEADERBOARD: i64 = 50;
const MAX_LEADERBOARD: i64 = 100;
const DASHBOARD_LEADERBOARD: i64 = 10;
const PENDING_USERS_LIMIT: i64 = 50;
const RECENT_ACTIONS: i64 = 20;
const DEFAULT_PAGE_SIZE: i64 = 10;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/leaderboard", get(leaderboard))
        .route("/admin", get(admin_dashboard))
        .route("/superadmin", get(superadmin_dashboard))
        .route("/teacher", get(teacher_dashboard))
        .route("/student", get(student_dashboard))
        .route("/logs", get(list_logs))
}

async fn leaderboard(
    Query(params): Query<LeaderboardQuery>,
    CurrentUser(_user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LEADERBOARD).clamp(1, MAX_LEADERBOARD);
    let rows = repositories::stats::leaderboard(state.db(), limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load leaderboard"))?;
    Ok(Json(LeaderboardEntry::ranked(rows)))
}

async fn unread_for(
    state: &AppState,
    user: &User,
    limit: i64,
) -> Result<Vec<NotificationResponse>, ApiError> {
    let rows = repositories::notifications::list_unread(state.db(), &user.id, limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load notifications"))?;
    Ok(rows.into_iter().map(NotificationResponse::from).collect())
}

async fn build_admin_dashboard(
    state: &AppState,
    user: &User,
    params: &AdminDashboardQuery,
) -> Result<AdminDashboard, ApiError> {
    let db = state.db();

    let counts = repositories::stats::school_counts(db)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load counts"))?;
    let pending_users = repositories::users::list_pending(db, PENDING_USERS_LIMIT)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list pending users"))?;

    let (logs_page, logs_size, logs_offset) =
        page_window(params.logs_page, params.logs_page_size, DEFAULT_PAGE_SIZE);
    let log_rows = repositories::action_logs::list(db, logs_offset, logs_size)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list logs"))?;
    let log_count = repositories::action_logs::count(db)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count logs"))?;

    let (quizzes_page, quizzes_size, quizzes_offset) =
        page_window(params.quizzes_page, params.quizzes_page_size, DEFAULT_PAGE_SIZE);
    let quiz_rows = repositories::quizzes::list_managed(db, None, quizzes_offset, quizzes_size)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list quizzes"))?;
    let quiz_count = repositories::quizzes::count_managed(db, None)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count quizzes"))?;

    let leaderboard = repositories::stats::leaderboard(db, DASHBOARD_LEADERBOARD)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load leaderboard"))?;
    let class_performance = repositories::stats::class_performance(db)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load class performance"))?;

    Ok(AdminDashboard {
        stats: AdminStats::from(counts),
        pending_users: pending_users.into_iter().map(UserResponse::from_db).collect(),
        logs: Page {
            items: log_rows.into_iter().map(LogEntry::from).collect(),
            page: logs_page,
            page_size: logs_size,
            total_count: log_count,
            total_pages: total_pages(log_count, logs_size),
        },
        leaderboard: LeaderboardEntry::ranked(leaderboard),
        class_performance: class_performance.into_iter().map(ClassPerformance::from).collect(),
        quizzes: Page {
            items: quiz_rows.into_iter().map(QuizSummary::from).collect(),
            page: quizzes_page,
            page_size: quizzes_size,
            total_count: quiz_count,
            total_pages: total_pages(quiz_count, quizzes_size),
        },
        notifications: unread_for(state, user, DEFAULT_PAGE_SIZE).await?,
    })
}

async fn admin_dashboard(
    Query(params): Query<AdminDashboardQuery>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<AdminDashboard>, ApiError> {
    build_admin_dashboard(&state, &user, &params).await.map(Json)
}

async fn superadmin_dashboard(
    Query(params): Query<AdminDashboardQuery>,
    CurrentSuperadmin(user): CurrentSuperadmin,
    State(state): State<AppState>,
) -> Result<Json<SuperadminDashboard>, ApiError> {
    let admin = build_admin_dashboard(&state, &user, &params).await?;
    let total_admins = repositories::stats::count_by_role(state.db(), UserRole::Admin)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count admins"))?;
    let recent = repositories::action_logs::list(state.db(), 0, RECENT_ACTIONS)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list recent actions"))?;

    Ok(Json(SuperadminDashboard {
        admin,
        total_admins,
        recent_actions: recent.into_iter().map(LogEntry::from).collect(),
    }))
}

async fn teacher_dashboard(
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<TeacherDashboard>, ApiError> {
    let performance = repositories::stats::quiz_performance_for_creator(state.db(), &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load quiz performance"))?;
    let pending_count = repositories::answers::count_pending(state.db(), Some(&user.id))
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count pending answers"))?;

    Ok(Json(TeacherDashboard {
        quiz_performance: performance.into_iter().map(QuizPerformance::from).collect(),
        pending_count,
        notifications: unread_for(&state, &user, DEFAULT_PAGE_SIZE).await?,
    }))
}

async fn student_dashboard(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<StudentDashboard>, ApiError> {
    if user.role != UserRole::Student {
        return Err(ApiError::Forbidden("Student access required"));
    }

    let summary = repositories::stats::student_summary(state.db(), &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load summary"))?;
    let pending_count = repositories::answers::count_pending_for_student(state.db(), &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count pending answers"))?;
    let quizzes = attempts::quiz_status_for_student(state.db(), &user)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list quizzes"))?;
    let recent = repositories::attempts::list_for_student(state.db(), &user.id, 5)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list attempts"))?;

    Ok(Json(StudentDashboard {
        summary: StudentSummaryResponse {
            total_attempts: summary.total_attempts,
            avg_score: round2(summary.avg_score.unwrap_or(0.0)),
            pending_count,
        },
        quizzes,
        recent_attempts: recent.into_iter().map(AttemptSummary::from).collect(),
        notifications: unread_for(&state, &user, 5).await?,
    }))
}

async fn list_logs(
    Query(params): Query<SkipLimit>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<PaginatedResponse<LogEntry>>, ApiError> {
    let rows = repositories::action_logs::list(state.db(), params.skip, params.limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list logs"))?;
    let total_count = repositories::action_logs::count(state.db())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count logs"))?;

    Ok(Json(PaginatedResponse {
        items: rows.into_iter().map(LogEntry::from).collect(),
        total_count,
        skip: params.skip.max(0),
        limit: params.limit.clamp(1, 1000),
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use tower::ServiceExt;

    use crate::core::time::primitive_now_utc;
    use crate::db::types::UserRole;
    use crate::services::attempts;
    use crate::test_support;

    #[tokio::test]
    async fn leaderboard_ranks_students_by_average() {
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

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                "/api/v1/dashboard/leaderboard?limit=500",
                Some(&test_support::bearer_token(&fixture.student.id, ctx.state.settings())),
                None,
            ))
            .await
            .expect("leaderboard");
        assert_eq!(response.status(), StatusCode::OK);
        let body = test_support::read_json(response).await;
        assert_eq!(body[0]["rank"], 1);
        assert_eq!(body[0]["username"], "student1");
        assert_eq!(body[0]["attempts"], 1);
    }

    #[tokio::test]
    async fn admin_dashboard_paginates_and_superadmin_adds_totals() {
        let ctx = test_support::setup_test_context().await;
        let pool = ctx.state.db();
        let root = test_support::insert_user(pool, "root", UserRole::Superadmin).await;
        test_support::insert_user(pool, "admin001", UserRole::Admin).await;
        let token = test_support::bearer_token(&root.id, ctx.state.settings());

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                "/api/v1/dashboard/superadmin?logs_page=0&logs_page_size=500",
                Some(&token),
                None,
            ))
            .await
            .expect("superadmin");
        assert_eq!(response.status(), StatusCode::OK);
        let body = test_support::read_json(response).await;
        assert_eq!(body["total_admins"], 1);
        assert_eq!(body["logs"]["page"], 1);
        assert_eq!(body["logs"]["page_size"], 100);
        assert_eq!(body["logs"]["total_pages"], 1);
        assert_eq!(body["stats"]["total_admins"], 1);
    }

    #[tokio::test]
    async fn role_dashboards_are_guarded() {
        let ctx = test_support::setup_test_context().await;
        let pool = ctx.state.db();
        let teacher = test_support::insert_user(pool, "teach", UserRole::Teacher).await;
        let student = test_support::insert_user(pool, "pupil", UserRole::Student).await;

        let cases = [
            ("/api/v1/dashboard/superadmin", &teacher, StatusCode::FORBIDDEN),
            ("/api/v1/dashboard/student", &teacher, StatusCode::FORBIDDEN),
            ("/api/v1/dashboard/teacher", &student, StatusCode::FORBIDDEN),
            ("/api/v1/dashboard/teacher", &teacher, StatusCode::OK),
            ("/api/v1/dashboard/student", &student, StatusCode::OK),
        ];

        for (uri, user, expected) in cases {
            let response = ctx
                .app
                .clone()
                .oneshot(test_support::json_request(
                    Method::GET,
                    uri,
                    Some(&test_support::bearer_token(&user.id, ctx.state.settings())),
                    None,
                ))
                .await
                .expect("dashboard");
            assert_eq!(response.status(), expected, "{uri} as {}", user.username);
        }
    }
}
