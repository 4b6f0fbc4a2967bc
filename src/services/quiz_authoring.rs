use serde::Deserialize;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::core::time::parse_datetime;
use crate::db::types::QuestionType;
use crate::repositories::quizzes::{self, CreateQuestion};

#[derive(Debug, Error, PartialEq)]
pub(crate) enum AuthoringError {
    #[error("Title and subject are required.")]
    MissingTitleOrSubject,
    #[error("Invalid start_time or end_time format. Use YYYY-MM-DD HH:MM")]
    InvalidWindowFormat,
    #[error("end_time must be after start_time")]
    WindowOrder,
    #[error("duration_minutes must be positive")]
    InvalidDuration,
    #[error("Invalid question at index {0}")]
    InvalidQuestion(usize),
    #[error("Objective question requires choices at index {0}")]
    MissingChoices(usize),
    #[error("Choice text missing for question {0} choice {1}")]
    MissingChoiceText(usize, usize),
    #[error("At least one correct choice required for question {0}")]
    NoCorrectChoice(usize),
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChoiceDraft {
    #[serde(default)]
    pub(crate) text: Option<String>,
    #[serde(default)]
    pub(crate) is_correct: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct QuestionDraft {
    #[serde(default)]
    pub(crate) text: Option<String>,
    #[serde(default)]
    pub(crate) question_type: Option<String>,
    #[serde(default)]
    pub(crate) marks: Option<f64>,
    #[serde(default)]
    pub(crate) choices: Vec<ChoiceDraft>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ValidChoice {
    pub(crate) text: String,
    pub(crate) is_correct: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ValidQuestion {
    pub(crate) text: String,
    pub(crate) question_type: QuestionType,
    pub(crate) marks: f64,
    pub(crate) choices: Vec<ValidChoice>,
}

pub(crate) fn parse_window(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(PrimitiveDateTime, PrimitiveDateTime), AuthoringError> {
    let start = start.and_then(parse_datetime).ok_or(AuthoringError::InvalidWindowFormat)?;
    let end = end.and_then(parse_datetime).ok_or(AuthoringError::InvalidWindowFormat)?;
    check_window(start, end)?;
    Ok((start, end))
}

pub(crate) fn check_window(
    start: PrimitiveDateTime,
    end: PrimitiveDateTime,
) -> Result<(), AuthoringError> {
    if end <= start {
        return Err(AuthoringError::WindowOrder);
    }
    Ok(())
}

pub(crate) fn resolve_duration(
    requested: Option<i64>,
    default_minutes: u32,
) -> Result<i32, AuthoringError> {
    let minutes = requested.unwrap_or(i64::from(default_minutes));
    if minutes <= 0 {
        return Err(AuthoringError::InvalidDuration);
    }
    i32::try_from(minutes).map_err(|_| AuthoringError::InvalidDuration)
}

pub(crate) fn validate_questions(
    drafts: &[QuestionDraft],
) -> Result<Vec<ValidQuestion>, AuthoringError> {
    drafts.iter().enumerate().map(|(index, draft)| validate_question(index, draft)).collect()
}

fn validate_question(index: usize, draft: &QuestionDraft) -> Result<ValidQuestion, AuthoringError> {
    let text = draft
        .text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .ok_or(AuthoringError::InvalidQuestion(index))?;
    let question_type = draft
        .question_type
        .as_deref()
        .and_then(QuestionType::parse)
        .ok_or(AuthoringError::InvalidQuestion(index))?;
    let marks = draft.marks.unwrap_or(1.0);
    if !marks.is_finite() || marks < 0.0 {
        return Err(AuthoringError::InvalidQuestion(index));
    }

    let choices = match question_type {
        QuestionType::Subjective => Vec::new(),
        QuestionType::Objective => {
            if draft.choices.is_empty() {
                return Err(AuthoringError::MissingChoices(index));
            }
            let choices = draft
                .choices
                .iter()
                .enumerate()
                .map(|(choice_index, choice)| {
                    choice
                        .text
                        .as_deref()
                        .map(str::trim)
                        .filter(|text| !text.is_empty())
                        .map(|text| ValidChoice {
                            text: text.to_string(),
                            is_correct: choice.is_correct,
                        })
                        .ok_or(AuthoringError::MissingChoiceText(index, choice_index))
                })
                .collect::<Result<Vec<_>, _>>()?;
            if !choices.iter().any(|choice| choice.is_correct) {
                return Err(AuthoringError::NoCorrectChoice(index));
            }
            choices
        }
    };

    Ok(ValidQuestion { text: text.to_string(), question_type, marks, choices })
}

/// Writes validated questions and their choices in order.
pub(crate) async fn insert_questions(
    conn: &mut sqlx::PgConnection,
    quiz_id: &str,
    questions: &[ValidQuestion],
) -> Result<(), sqlx::Error> {
    for (position, question) in questions.iter().enumerate() {
        let question_id = uuid::Uuid::new_v4().to_string();
        quizzes::insert_question(
            &mut *conn,
            CreateQuestion {
                id: &question_id,
                quiz_id,
                text: &question.text,
                question_type: question.question_type,
                marks: question.marks,
                position: position as i32,
            },
        )
        .await?;

        for (choice_position, choice) in question.choices.iter().enumerate() {
            quizzes::insert_choice(
                &mut *conn,
                &question_id,
                &choice.text,
                choice.is_correct,
                choice_position as i32,
            )
            .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn objective(text: &str, choices: &[(&str, bool)]) -> QuestionDraft {
        QuestionDraft {
            text: Some(text.to_string()),
            question_type: Some("objective".to_string()),
            marks: Some(2.0),
            choices: choices
                .iter()
                .map(|(text, is_correct)| ChoiceDraft {
                    text: Some(text.to_string()),
                    is_correct: *is_correct,
                })
                .collect(),
        }
    }

    #[test]
    fn window_requires_parseable_ordered_bounds() {
        assert_eq!(
            parse_window(Some("2025-05-01 09:00"), Some("2025-05-01T10:00")),
            Ok((datetime!(2025-05-01 09:00:00), datetime!(2025-05-01 10:00:00)))
        );
        assert_eq!(
            parse_window(Some("yesterday"), Some("2025-05-01 10:00")),
            Err(AuthoringError::InvalidWindowFormat)
        );
        assert_eq!(parse_window(None, None), Err(AuthoringError::InvalidWindowFormat));
        assert_eq!(
            parse_window(Some("2025-05-01 10:00"), Some("2025-05-01 10:00")),
            Err(AuthoringError::WindowOrder)
        );
    }

    #[test]
    fn duration_defaults_and_rejects_non_positive() {
        assert_eq!(resolve_duration(None, 30), Ok(30));
        assert_eq!(resolve_duration(Some(45), 30), Ok(45));
        assert_eq!(resolve_duration(Some(0), 30), Err(AuthoringError::InvalidDuration));
    }

    #[test]
    fn validates_objective_and_subjective_questions() {
        let drafts = vec![
            objective("What is 2+2?", &[("3", false), ("4", true)]),
            QuestionDraft {
                text: Some("Explain photosynthesis".to_string()),
                question_type: Some("Subjective".to_string()),
                marks: None,
                choices: Vec::new(),
            },
        ];
        let questions = validate_questions(&drafts).expect("valid");
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].choices.len(), 2);
        assert_eq!(questions[1].question_type, QuestionType::Subjective);
        assert_eq!(questions[1].marks, 1.0);
    }

    #[test]
    fn reports_the_failing_index() {
        let mut missing_type = objective("Q", &[("a", true)]);
        missing_type.question_type = Some("essay".to_string());
        assert_eq!(
            validate_questions(&[objective("ok", &[("a", true)]), missing_type]),
            Err(AuthoringError::InvalidQuestion(1))
        );

        assert_eq!(
            validate_questions(&[objective("Q", &[])]).map(|_| ()),
            Err(AuthoringError::MissingChoices(0))
        );
        assert_eq!(
            validate_questions(&[objective("Q", &[("a", true), ("  ", false)])]).map(|_| ()),
            Err(AuthoringError::MissingChoiceText(0, 1))
        );
        assert_eq!(
            validate_questions(&[objective("Q", &[("a", false), ("b", false)])]).map(|_| ()),
            Err(AuthoringError::NoCorrectChoice(0))
        );
    }

    #[test]
    fn error_messages_match_client_contract() {
        assert_eq!(
            AuthoringError::MissingChoiceText(2, 3).to_string(),
            "Choice text missing for question 2 choice 3"
        );
        assert_eq!(
            AuthoringError::InvalidWindowFormat.to_string(),
            "Invalid start_time or end_time format. Use YYYY-MM-DD HH:MM"
        );
    }
}
