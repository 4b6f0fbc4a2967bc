use serde::{Deserialize, Serialize};

use crate::core::time::format_primitive;
use crate::db::types::QuestionType;
use crate::repositories::quizzes::QuizSummaryRow;
use crate::services::quiz_authoring::QuestionDraft;

/// Create/update payload; validated by the authoring service so the
/// client gets index-specific messages.
#[derive(Debug, Deserialize)]
pub(crate) struct QuizPayload {
    #[serde(default)]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default, alias = "subjectId", alias = "subject")]
    pub(crate) subject_id: Option<String>,
    #[serde(default, alias = "startTime")]
    pub(crate) start_time: Option<String>,
    #[serde(default, alias = "endTime")]
    pub(crate) end_time: Option<String>,
    #[serde(default, alias = "durationMinutes")]
    pub(crate) duration_minutes: Option<i64>,
    #[serde(default, alias = "isPublished")]
    pub(crate) is_published: bool,
    #[serde(default, alias = "shuffleQuestions")]
    pub(crate) shuffle_questions: bool,
    #[serde(default, alias = "allowRetake")]
    pub(crate) allow_retake: bool,
    #[serde(default)]
    pub(crate) questions: Vec<QuestionDraft>,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuizSavedResponse {
    pub(crate) ok: bool,
    pub(crate) quiz_id: String,
    pub(crate) message: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct PublishResponse {
    pub(crate) ok: bool,
    pub(crate) is_published: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct EditableChoice {
    pub(crate) id: String,
    pub(crate) text: String,
    pub(crate) is_correct: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct EditableQuestion {
    pub(crate) id: String,
    pub(crate) text: String,
    pub(crate) question_type: QuestionType,
    pub(crate) marks: f64,
    pub(crate) choices: Vec<EditableChoice>,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuizDetail {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) subject_id: String,
    pub(crate) created_by: Option<String>,
    pub(crate) start_time: String,
    pub(crate) end_time: String,
    pub(crate) duration_minutes: i32,
    pub(crate) is_published: bool,
    pub(crate) shuffle_questions: bool,
    pub(crate) allow_retake: bool,
    pub(crate) total_marks: f64,
    pub(crate) questions: Vec<EditableQuestion>,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuizSummary {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) subject_id: String,
    pub(crate) subject: String,
    pub(crate) class_name: String,
    pub(crate) created_by: Option<String>,
    pub(crate) created_by_username: Option<String>,
    pub(crate) start_time: String,
    pub(crate) end_time: String,
    pub(crate) duration_minutes: i32,
    pub(crate) is_published: bool,
    pub(crate) allow_retake: bool,
    pub(crate) question_count: i64,
    pub(crate) attempt_count: i64,
    pub(crate) created_at: String,
}

impl From<QuizSummaryRow> for QuizSummary {
    fn from(row: QuizSummaryRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            subject_id: row.subject_id,
            subject: row.subject_name,
            class_name: row.class_name,
            created_by: row.created_by,
            created_by_username: row.created_by_username,
            start_time: format_primitive(row.start_time),
            end_time: format_primitive(row.end_time),
            duration_minutes: row.duration_minutes,
            is_published: row.is_published,
            allow_retake: row.allow_retake,
            question_count: row.question_count,
            attempt_count: row.attempt_count,
            created_at: format_primitive(row.created_at),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GradeRequest {
    pub(crate) marks: f64,
    #[serde(default)]
    pub(crate) feedback: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct GradeResponse {
    pub(crate) ok: bool,
    pub(crate) attempt_id: String,
    pub(crate) score: f64,
    pub(crate) graded: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct PendingAnswer {
    pub(crate) answer_id: String,
    pub(crate) attempt_id: String,
    pub(crate) quiz_id: String,
    pub(crate) quiz_title: String,
    pub(crate) student_id: String,
    pub(crate) student_username: String,
    pub(crate) student_name: String,
    pub(crate) question_id: String,
    pub(crate) question_text: String,
    pub(crate) answer_text: String,
    pub(crate) max_marks: f64,
    pub(crate) submitted_at: Option<String>,
}

impl From<crate::repositories::answers::PendingAnswerRow> for PendingAnswer {
    fn from(row: crate::repositories::answers::PendingAnswerRow) -> Self {
        let joined = format!("{} {}", row.student_first_name.trim(), row.student_last_name.trim());
        let student_name = match joined.trim() {
            "" => row.student_username.clone(),
            name => name.to_string(),
        };
        Self {
            answer_id: row.answer_id,
            attempt_id: row.attempt_id,
            quiz_id: row.quiz_id,
            quiz_title: row.quiz_title,
            student_id: row.student_id,
            student_username: row.student_username,
            student_name,
            question_id: row.question_id,
            question_text: row.question_text,
            answer_text: row.text_answer.unwrap_or_default(),
            max_marks: row.max_marks,
            submitted_at: row.submitted_at.map(format_primitive),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RetakeRequest {
    #[serde(alias = "studentId")]
    pub(crate) student_id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct RetakeResponse {
    pub(crate) success: bool,
    pub(crate) message: String,
    pub(crate) retake_count: i64,
}
