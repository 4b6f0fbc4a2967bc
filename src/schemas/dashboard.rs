use serde::{Deserialize, Serialize};

use crate::api::pagination::Page;
use crate::core::time::format_primitive;
use crate::repositories::action_logs::ActionLogRow;
use crate::repositories::stats::{
    ClassPerformanceRow, LeaderboardRow, QuizPerformanceRow, SchoolCounts,
};
use crate::schemas::attempt::{AttemptSummary, StudentQuizStatus};
use crate::schemas::notification::NotificationResponse;
use crate::schemas::quiz::QuizSummary;
use crate::schemas::user::UserResponse;

#[derive(Debug, Deserialize)]
pub(crate) struct LeaderboardQuery {
    #[serde(default)]
    pub(crate) limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AdminDashboardQuery {
    #[serde(default)]
    pub(crate) logs_page: Option<i64>,
    #[serde(default)]
    pub(crate) logs_page_size: Option<i64>,
    #[serde(default)]
    pub(crate) quizzes_page: Option<i64>,
    #[serde(default)]
    pub(crate) quizzes_page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct LeaderboardEntry {
    pub(crate) rank: usize,
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) full_name: String,
    pub(crate) avg_score: f64,
    pub(crate) attempts: i64,
}

impl LeaderboardEntry {
    pub(crate) fn ranked(rows: Vec<LeaderboardRow>) -> Vec<Self> {
        rows.into_iter()
            .enumerate()
            .map(|(index, row)| {
                let joined = format!("{} {}", row.first_name.trim(), row.last_name.trim());
                let full_name = match joined.trim() {
                    "" => row.username.clone(),
                    name => name.to_string(),
                };
                Self {
                    rank: index + 1,
                    id: row.id,
                    username: row.username,
                    full_name,
                    avg_score: round2(row.avg_score),
                    attempts: row.attempts,
                }
            })
            .collect()
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ClassPerformance {
    pub(crate) class_id: String,
    pub(crate) class_name: String,
    pub(crate) avg_score: f64,
    pub(crate) attempts: i64,
}

impl From<ClassPerformanceRow> for ClassPerformance {
    fn from(row: ClassPerformanceRow) -> Self {
        Self {
            class_id: row.class_id,
            class_name: row.class_name,
            avg_score: round2(row.avg_score.unwrap_or(0.0)),
            attempts: row.attempts,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct QuizPerformance {
    pub(crate) quiz_id: String,
    pub(crate) title: String,
    pub(crate) avg_score: f64,
    pub(crate) attempts: i64,
}

impl From<QuizPerformanceRow> for QuizPerformance {
    fn from(row: QuizPerformanceRow) -> Self {
        Self {
            quiz_id: row.quiz_id,
            title: row.title,
            avg_score: round2(row.avg_score.unwrap_or(0.0)),
            attempts: row.attempts,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct LogEntry {
    pub(crate) id: String,
    pub(crate) user_id: Option<String>,
    pub(crate) username: String,
    pub(crate) action: String,
    pub(crate) model_name: Option<String>,
    pub(crate) object_id: Option<String>,
    pub(crate) details: serde_json::Value,
    pub(crate) created_at: String,
}

impl From<ActionLogRow> for LogEntry {
    fn from(row: ActionLogRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            username: row.username.unwrap_or_else(|| "system".to_string()),
            action: row.action,
            model_name: row.model_name,
            object_id: row.object_id,
            details: row.details.0,
            created_at: format_primitive(row.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AdminStats {
    pub(crate) total_users: i64,
    pub(crate) total_admins: i64,
    pub(crate) total_teachers: i64,
    pub(crate) total_students: i64,
    pub(crate) pending_users: i64,
    pub(crate) total_classes: i64,
    pub(crate) total_subjects: i64,
    pub(crate) total_quizzes: i64,
}

impl From<SchoolCounts> for AdminStats {
    fn from(counts: SchoolCounts) -> Self {
        Self {
            total_users: counts.total_users,
            total_admins: counts.total_admins,
            total_teachers: counts.total_teachers,
            total_students: counts.total_students,
            pending_users: counts.pending_users,
            total_classes: counts.total_classes,
            total_subjects: counts.total_subjects,
            total_quizzes: counts.total_quizzes,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AdminDashboard {
    pub(crate) stats: AdminStats,
    pub(crate) pending_users: Vec<UserResponse>,
    pub(crate) logs: Page<LogEntry>,
    pub(crate) leaderboard: Vec<LeaderboardEntry>,
    pub(crate) class_performance: Vec<ClassPerformance>,
    pub(crate) quizzes: Page<QuizSummary>,
    pub(crate) notifications: Vec<NotificationResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SuperadminDashboard {
    #[serde(flatten)]
    pub(crate) admin: AdminDashboard,
    pub(crate) total_admins: i64,
    pub(crate) recent_actions: Vec<LogEntry>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TeacherDashboard {
    pub(crate) quiz_performance: Vec<QuizPerformance>,
    pub(crate) pending_count: i64,
    pub(crate) notifications: Vec<NotificationResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StudentSummaryResponse {
    pub(crate) total_attempts: i64,
    pub(crate) avg_score: f64,
    pub(crate) pending_count: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct StudentDashboard {
    pub(crate) summary: StudentSummaryResponse,
    pub(crate) quizzes: Vec<StudentQuizStatus>,
    pub(crate) recent_attempts: Vec<AttemptSummary>,
    pub(crate) notifications: Vec<NotificationResponse>,
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaderboard_ranks_and_falls_back_to_username() {
        let rows = vec![
            LeaderboardRow {
                id: "a".into(),
                username: "ada".into(),
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                avg_score: 8.666_666,
                attempts: 3,
            },
            LeaderboardRow {
                id: "b".into(),
                username: "bob".into(),
                first_name: " ".into(),
                last_name: String::new(),
                avg_score: 5.0,
                attempts: 1,
            },
        ];
        let entries = LeaderboardEntry::ranked(rows);
        assert_eq!(entries[0].rank, 1);
        assert_eq!(entries[0].full_name, "Ada Lovelace");
        assert_eq!(entries[0].avg_score, 8.67);
        assert_eq!(entries[1].full_name, "bob");
    }

    #[test]
    fn logs_without_user_render_as_system() {
        let entry = LogEntry::from(ActionLogRow {
            id: "l1".into(),
            user_id: None,
            username: None,
            action: "Submitted attempt".into(),
            model_name: Some("QuizAttempt".into()),
            object_id: Some("att".into()),
            details: sqlx::types::Json(serde_json::json!({"auto_submitted": true})),
            created_at: time::macros::datetime!(2025-01-01 08:00:00),
        });
        assert_eq!(entry.username, "system");
        assert_eq!(entry.details["auto_submitted"], true);
    }
}
