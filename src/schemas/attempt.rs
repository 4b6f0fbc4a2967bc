use serde::{Deserialize, Serialize};

use crate::db::types::{AttemptStatus, QuestionType};

#[derive(Debug, Serialize)]
pub(crate) struct StartAttemptResponse {
    pub(crate) ok: bool,
    pub(crate) attempt_id: String,
    pub(crate) end_time: String,
    pub(crate) resume: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AutosaveEntry {
    #[serde(default)]
    pub(crate) question_id: Option<String>,
    #[serde(default, alias = "choiceId")]
    pub(crate) choice_id: Option<String>,
    #[serde(default)]
    pub(crate) text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AutosaveRequest {
    #[serde(default)]
    pub(crate) answers: Vec<AutosaveEntry>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AutosaveResponse {
    pub(crate) ok: bool,
    pub(crate) saved: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitResponse {
    pub(crate) ok: bool,
    pub(crate) message: String,
    pub(crate) score: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct PaperChoice {
    pub(crate) id: String,
    pub(crate) text: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct PaperQuestion {
    pub(crate) id: String,
    pub(crate) text: String,
    pub(crate) question_type: QuestionType,
    pub(crate) marks: f64,
    pub(crate) choices: Vec<PaperChoice>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SavedAnswer {
    pub(crate) question_id: String,
    pub(crate) choice_id: Option<String>,
    pub(crate) text: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptPaper {
    pub(crate) attempt_id: String,
    pub(crate) quiz_id: String,
    pub(crate) quiz_title: String,
    pub(crate) status: AttemptStatus,
    pub(crate) end_time: String,
    pub(crate) remaining_seconds: i64,
    pub(crate) questions: Vec<PaperQuestion>,
    pub(crate) answers: Vec<SavedAnswer>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReviewItem {
    pub(crate) question_id: String,
    pub(crate) question_text: String,
    pub(crate) question_type: QuestionType,
    pub(crate) max_marks: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) selected_choice_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) selected_choice_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) is_correct: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) answer_text: Option<String>,
    pub(crate) is_pending: bool,
    pub(crate) obtained_marks: Option<f64>,
    pub(crate) feedback: Option<String>,
    pub(crate) graded_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptReview {
    pub(crate) attempt_id: String,
    pub(crate) quiz_id: String,
    pub(crate) quiz_title: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) status: AttemptStatus,
    pub(crate) auto_submitted: bool,
    pub(crate) submitted_at: Option<String>,
    pub(crate) graded: bool,
    pub(crate) total_marks: f64,
    pub(crate) objective_total: f64,
    pub(crate) subjective_total_graded: f64,
    pub(crate) grand_total: f64,
    pub(crate) items: Vec<ReviewItem>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StudentQuizStatus {
    pub(crate) quiz_id: String,
    pub(crate) title: String,
    pub(crate) subject: String,
    pub(crate) class_name: String,
    pub(crate) start_time: String,
    pub(crate) end_time: String,
    pub(crate) duration_minutes: i32,
    pub(crate) status: &'static str,
    pub(crate) latest_attempt_id: Option<String>,
    pub(crate) latest_score: Option<f64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptSummary {
    pub(crate) id: String,
    pub(crate) quiz_id: String,
    pub(crate) quiz_title: String,
    pub(crate) subject: String,
    pub(crate) attempt_number: i32,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: String,
    pub(crate) submitted_at: Option<String>,
    pub(crate) score: f64,
    pub(crate) total_marks: f64,
    pub(crate) graded: bool,
    pub(crate) pending_count: i64,
}

impl From<crate::repositories::attempts::StudentAttemptRow> for AttemptSummary {
    fn from(row: crate::repositories::attempts::StudentAttemptRow) -> Self {
        Self {
            id: row.id,
            quiz_id: row.quiz_id,
            quiz_title: row.quiz_title,
            subject: row.subject_name,
            attempt_number: row.attempt_number,
            status: row.status,
            started_at: crate::core::time::format_primitive(row.started_at),
            submitted_at: row.submitted_at.map(crate::core::time::format_primitive),
            score: row.score,
            total_marks: row.total_marks,
            graded: row.graded,
            pending_count: row.pending_count,
        }
    }
}
