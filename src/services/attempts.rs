//! Quiz attempt lifecycle: start or resume, autosave, submit, expiry and review.
//!
//! Every state transition runs inside one transaction holding either the
//! per-(quiz, student) advisory lock or a row lock on the attempt, so a
//! submitted attempt is never written by a late autosave.

use std::collections::HashMap;

use serde_json::json;
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::core::time::{format_primitive, remaining_seconds};
use crate::db::models::{QuizAttempt, User};
use crate::db::types::{AttemptStatus, QuestionType, UserRole};
use crate::repositories::{answers, attempts, quizzes};
use crate::schemas::attempt::{
    AttemptPaper, AttemptReview, AutosaveEntry, PaperChoice, PaperQuestion, ReviewItem,
    SavedAnswer, StudentQuizStatus,
};
use crate::services::audit::{self, Target};
use crate::services::notifications::notify;
use crate::services::scoring::{self, ScoreSummary};

const EXPIRY_BATCH: i64 = 500;

pub(crate) const SUBMITTED_MESSAGE: &str = "Submitted";
pub(crate) const AUTO_SUBMITTED_MESSAGE: &str = "Time elapsed — auto-submitted.";

#[derive(Debug, Error)]
pub(crate) enum AttemptError {
    #[error("Quiz not found")]
    QuizNotFound,
    #[error("Quiz not active.")]
    QuizNotActive,
    #[error("Only students can take quizzes")]
    NotAStudent,
    #[error("This quiz is not assigned to your class")]
    WrongClass,
    #[error("Previous attempt timed out and was auto-submitted.")]
    PreviousTimedOut,
    #[error("You cannot retake this quiz.")]
    RetakeNotAllowed,
    #[error("Attempt not found")]
    AttemptNotFound,
    #[error("Access denied")]
    NotOwner,
    #[error("Attempt already submitted.")]
    AttemptClosed,
    #[error("Already submitted.")]
    AlreadySubmitted,
    #[error("Attempt time elapsed; auto-submitted.")]
    TimeElapsed,
    #[error("Question not found")]
    QuestionNotFound,
    #[error("Choice not found")]
    ChoiceNotFound,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug)]
pub(crate) struct StartedAttempt {
    pub(crate) attempt_id: String,
    pub(crate) expires_at: PrimitiveDateTime,
    pub(crate) resumed: bool,
}

#[derive(Debug)]
pub(crate) struct SubmitOutcome {
    pub(crate) score: f64,
    pub(crate) auto_submitted: bool,
    pub(crate) pending: usize,
}

impl SubmitOutcome {
    pub(crate) fn message(&self) -> &'static str {
        if self.auto_submitted {
            AUTO_SUBMITTED_MESSAGE
        } else {
            SUBMITTED_MESSAGE
        }
    }
}

/// Who closed an attempt; the sweeper acts without a user.
#[derive(Debug, Clone, Copy)]
enum Closer<'a> {
    Student(&'a str),
    Sweeper,
}

impl Closer<'_> {
    fn user_id(&self) -> Option<&str> {
        match self {
            Self::Student(id) => Some(id),
            Self::Sweeper => None,
        }
    }
}

pub(crate) async fn start(
    pool: &PgPool,
    quiz_id: &str,
    student: &User,
    now: PrimitiveDateTime,
) -> Result<StartedAttempt, AttemptError> {
    let quiz = quizzes::find_by_id(pool, quiz_id)
        .await?
        .filter(|quiz| quiz.is_published)
        .ok_or(AttemptError::QuizNotFound)?;

    if !quiz.is_open_at(now) {
        return Err(AttemptError::QuizNotActive);
    }
    if student.role != UserRole::Student {
        return Err(AttemptError::NotAStudent);
    }

    let class_id = quizzes::class_id_for_quiz(pool, &quiz.id).await?;
    match (student.school_class_id.as_deref(), class_id.as_deref()) {
        (Some(own), Some(required)) if own == required => {}
        _ => return Err(AttemptError::WrongClass),
    }

    let mut tx = pool.begin().await?;
    attempts::acquire_quiz_student_lock(&mut *tx, &quiz.id, &student.id).await?;

    let latest = attempts::find_latest(&mut *tx, &quiz.id, &student.id).await?;
    if let Some(previous) = &latest {
        match previous.status {
            AttemptStatus::Active if now <= previous.expires_at => {
                tx.commit().await?;
                return Ok(StartedAttempt {
                    attempt_id: previous.id.clone(),
                    expires_at: previous.expires_at,
                    resumed: true,
                });
            }
            AttemptStatus::Active => {
                finalize(&mut tx, previous, now, true, Closer::Student(&student.id)).await?;
                tx.commit().await?;
                return Err(AttemptError::PreviousTimedOut);
            }
            AttemptStatus::Submitted => {
                if !(quiz.allow_retake || previous.retake_allowed) {
                    return Err(AttemptError::RetakeNotAllowed);
                }
                if previous.retake_allowed {
                    attempts::set_retake_allowed(&mut *tx, &previous.id, false).await?;
                }
            }
        }
    }

    let questions = quizzes::list_questions(&mut *tx, &quiz.id).await?;
    let total_marks: f64 = questions.iter().map(|question| question.marks).sum();
    let attempt_id = uuid::Uuid::new_v4().to_string();
    let attempt = attempts::create(
        &mut *tx,
        attempts::CreateAttempt {
            id: &attempt_id,
            quiz_id: &quiz.id,
            student_id: &student.id,
            attempt_number: latest.as_ref().map_or(1, |previous| previous.attempt_number + 1),
            started_at: now,
            expires_at: scoring::attempt_deadline(now, quiz.duration_minutes),
            total_marks,
        },
    )
    .await?;

    for question in &questions {
        answers::insert_blank(
            &mut *tx,
            &attempt.id,
            &question.id,
            question.question_type == QuestionType::Subjective,
        )
        .await?;
    }

    tx.commit().await?;

    metrics::counter!("attempts_started_total").increment(1);
    tracing::info!(
        attempt_id = %attempt.id,
        quiz_id = %quiz.id,
        student_id = %student.id,
        attempt_number = attempt.attempt_number,
        action = "attempt_start",
        "Attempt started"
    );

    Ok(StartedAttempt { attempt_id: attempt.id, expires_at: attempt.expires_at, resumed: false })
}

/// Grades, scores and closes an attempt on the caller's connection.
async fn finalize(
    conn: &mut PgConnection,
    attempt: &QuizAttempt,
    now: PrimitiveDateTime,
    auto_submitted: bool,
    closer: Closer<'_>,
) -> Result<SubmitOutcome, sqlx::Error> {
    answers::regrade_objectives(&mut *conn, &attempt.id, now).await?;
    let summary = ScoreSummary::from_rows(&answers::score_rows(&mut *conn, &attempt.id).await?);
    let score = summary.score();

    attempts::mark_submitted(
        &mut *conn,
        &attempt.id,
        now,
        auto_submitted,
        score,
        summary.graded(AttemptStatus::Submitted),
    )
    .await?;

    audit::log_action(
        &mut *conn,
        closer.user_id(),
        "Submitted attempt",
        Some(Target { model: "QuizAttempt", object_id: &attempt.id }),
        json!({
            "quiz_id": attempt.quiz_id,
            "student_id": attempt.student_id,
            "score": score,
            "auto_submitted": auto_submitted,
            "pending": summary.pending,
        }),
    )
    .await?;

    if summary.pending > 0 {
        if let Some(quiz) = quizzes::find_by_id(&mut *conn, &attempt.quiz_id).await? {
            if let Some(creator_id) = quiz.created_by.as_deref() {
                notify(
                    &mut *conn,
                    creator_id,
                    "Grading required",
                    &format!(
                        "A submission for '{}' has {} answer(s) awaiting grading.",
                        quiz.title, summary.pending
                    ),
                )
                .await?;
            }
        }
    }

    let mode = if auto_submitted { "auto" } else { "manual" };
    metrics::counter!("attempts_submitted_total", "mode" => mode).increment(1);
    if auto_submitted {
        metrics::counter!("attempts_auto_submitted_total").increment(1);
    }

    Ok(SubmitOutcome { score, auto_submitted, pending: summary.pending })
}

async fn load_owned_for_update(
    conn: &mut PgConnection,
    attempt_id: &str,
    student_id: &str,
) -> Result<QuizAttempt, AttemptError> {
    let attempt = attempts::find_by_id_for_update(&mut *conn, attempt_id)
        .await?
        .ok_or(AttemptError::AttemptNotFound)?;
    if attempt.student_id != student_id {
        return Err(AttemptError::NotOwner);
    }
    Ok(attempt)
}

pub(crate) async fn autosave(
    pool: &PgPool,
    attempt_id: &str,
    student_id: &str,
    entries: &[AutosaveEntry],
    now: PrimitiveDateTime,
) -> Result<usize, AttemptError> {
    let mut tx = pool.begin().await?;
    let attempt = load_owned_for_update(&mut tx, attempt_id, student_id).await?;

    if attempt.status == AttemptStatus::Submitted {
        return Err(AttemptError::AttemptClosed);
    }
    if now > attempt.expires_at {
        finalize(&mut tx, &attempt, now, true, Closer::Student(student_id)).await?;
        tx.commit().await?;
        return Err(AttemptError::TimeElapsed);
    }

    let mut saved = 0;
    for entry in entries {
        let Some(question_id) = entry.question_id.as_deref() else {
            continue;
        };
        let question = quizzes::find_question_in_quiz(&mut *tx, &attempt.quiz_id, question_id)
            .await?
            .ok_or(AttemptError::QuestionNotFound)?;

        match question.question_type {
            QuestionType::Objective => {
                let choice = match entry.choice_id.as_deref() {
                    Some(choice_id) => Some(
                        quizzes::find_choice_for_question(&mut *tx, &question.id, choice_id)
                            .await?
                            .ok_or(AttemptError::ChoiceNotFound)?,
                    ),
                    None => None,
                };
                let marks = scoring::objective_marks(question.marks, choice.as_ref());
                answers::save_objective(
                    &mut *tx,
                    &attempt.id,
                    &question.id,
                    choice.as_ref().map(|choice| choice.id.as_str()),
                    marks,
                    now,
                )
                .await?;
            }
            QuestionType::Subjective => {
                let text = entry.text.as_deref().unwrap_or_default();
                answers::save_subjective(&mut *tx, &attempt.id, &question.id, text).await?;
            }
        }
        saved += 1;
    }

    tx.commit().await?;
    tracing::debug!(attempt_id = %attempt.id, saved, "Autosave stored");
    Ok(saved)
}

pub(crate) async fn submit(
    pool: &PgPool,
    attempt_id: &str,
    student_id: &str,
    now: PrimitiveDateTime,
) -> Result<SubmitOutcome, AttemptError> {
    let mut tx = pool.begin().await?;
    let attempt = load_owned_for_update(&mut tx, attempt_id, student_id).await?;
    if attempt.status == AttemptStatus::Submitted {
        return Err(AttemptError::AlreadySubmitted);
    }

    let auto_submitted = now > attempt.expires_at;
    let outcome = finalize(&mut tx, &attempt, now, auto_submitted, Closer::Student(student_id)).await?;
    tx.commit().await?;

    tracing::info!(
        attempt_id = %attempt.id,
        quiz_id = %attempt.quiz_id,
        student_id,
        score = outcome.score,
        auto_submitted,
        pending = outcome.pending,
        action = "attempt_submit",
        "Attempt submitted"
    );
    Ok(outcome)
}

/// Auto-submits every active attempt whose deadline has passed.
pub(crate) async fn expire_overdue(pool: &PgPool, now: PrimitiveDateTime) -> Result<usize, sqlx::Error> {
    let ids = attempts::list_expired_ids(pool, now, EXPIRY_BATCH).await?;
    let mut closed = 0;

    for id in ids {
        let mut tx = pool.begin().await?;
        let Some(attempt) = attempts::find_by_id_for_update(&mut *tx, &id).await? else {
            continue;
        };
        if attempt.status != AttemptStatus::Active || attempt.expires_at >= now {
            continue;
        }
        finalize(&mut tx, &attempt, now, true, Closer::Sweeper).await?;
        tx.commit().await?;
        closed += 1;
    }

    Ok(closed)
}

/// Recomputes score and graded flag after a subjective mark changes.
pub(crate) async fn recompute_score(
    conn: &mut PgConnection,
    attempt_id: &str,
) -> Result<(f64, bool), sqlx::Error> {
    let status = attempts::find_by_id(&mut *conn, attempt_id)
        .await?
        .map(|attempt| attempt.status)
        .unwrap_or(AttemptStatus::Active);
    let summary = ScoreSummary::from_rows(&answers::score_rows(&mut *conn, attempt_id).await?);
    let graded = summary.graded(status);
    attempts::update_score(&mut *conn, attempt_id, summary.score(), graded).await?;
    Ok((summary.score(), graded))
}

pub(crate) async fn paper(
    pool: &PgPool,
    attempt_id: &str,
    student_id: &str,
    now: PrimitiveDateTime,
) -> Result<AttemptPaper, AttemptError> {
    let attempt =
        attempts::find_by_id(pool, attempt_id).await?.ok_or(AttemptError::AttemptNotFound)?;
    if attempt.student_id != student_id {
        return Err(AttemptError::NotOwner);
    }
    let quiz =
        quizzes::find_by_id(pool, &attempt.quiz_id).await?.ok_or(AttemptError::QuizNotFound)?;

    let mut questions = quizzes::list_questions(pool, &quiz.id).await?;
    if quiz.shuffle_questions {
        scoring::shuffle_for_attempt(&mut questions, &attempt.id);
    }

    let mut choices_by_question: HashMap<String, Vec<PaperChoice>> = HashMap::new();
    for choice in quizzes::list_choices_for_quiz(pool, &quiz.id).await? {
        choices_by_question
            .entry(choice.question_id)
            .or_default()
            .push(PaperChoice { id: choice.id, text: choice.text });
    }

    let questions = questions
        .into_iter()
        .map(|question| PaperQuestion {
            choices: choices_by_question.remove(&question.id).unwrap_or_default(),
            id: question.id,
            text: question.text,
            question_type: question.question_type,
            marks: question.marks,
        })
        .collect();

    let answers = answers::list_for_attempt(pool, &attempt.id)
        .await?
        .into_iter()
        .map(|answer| SavedAnswer {
            question_id: answer.question_id,
            choice_id: answer.selected_choice_id,
            text: answer.text_answer,
        })
        .collect();

    let remaining = match attempt.status {
        AttemptStatus::Active => remaining_seconds(attempt.expires_at, now),
        AttemptStatus::Submitted => 0,
    };

    Ok(AttemptPaper {
        attempt_id: attempt.id,
        quiz_id: quiz.id,
        quiz_title: quiz.title,
        status: attempt.status,
        end_time: format_primitive(attempt.expires_at),
        remaining_seconds: remaining,
        questions,
        answers,
    })
}

pub(crate) async fn review(
    pool: &PgPool,
    attempt_id: &str,
    viewer: &User,
) -> Result<AttemptReview, AttemptError> {
    let attempt =
        attempts::find_by_id(pool, attempt_id).await?.ok_or(AttemptError::AttemptNotFound)?;
    if attempt.student_id != viewer.id && !viewer.role.is_staff() {
        return Err(AttemptError::NotOwner);
    }
    let quiz =
        quizzes::find_by_id(pool, &attempt.quiz_id).await?.ok_or(AttemptError::QuizNotFound)?;

    let rows = answers::review_rows(pool, &attempt.id).await?;
    let mut objective_total = 0.0;
    let mut subjective_total_graded = 0.0;
    let items = rows
        .into_iter()
        .map(|row| match row.question_type {
            QuestionType::Objective => {
                objective_total += row.obtained_marks;
                ReviewItem {
                    question_id: row.question_id,
                    question_text: row.question_text,
                    question_type: row.question_type,
                    max_marks: row.max_marks,
                    is_correct: Some(row.selected_is_correct.unwrap_or(false)),
                    selected_choice_id: row.selected_choice_id,
                    selected_choice_text: row.selected_choice_text,
                    answer_text: None,
                    is_pending: false,
                    obtained_marks: Some(row.obtained_marks),
                    feedback: None,
                    graded_by: None,
                }
            }
            QuestionType::Subjective => {
                if !row.is_pending {
                    subjective_total_graded += row.obtained_marks;
                }
                ReviewItem {
                    question_id: row.question_id,
                    question_text: row.question_text,
                    question_type: row.question_type,
                    max_marks: row.max_marks,
                    selected_choice_id: None,
                    selected_choice_text: None,
                    is_correct: None,
                    answer_text: Some(row.text_answer.unwrap_or_default()),
                    is_pending: row.is_pending,
                    obtained_marks: (!row.is_pending).then_some(row.obtained_marks),
                    feedback: row.feedback,
                    graded_by: row.graded_by_username,
                }
            }
        })
        .collect();

    Ok(AttemptReview {
        attempt_id: attempt.id,
        quiz_id: quiz.id,
        quiz_title: quiz.title,
        student_id: attempt.student_id,
        attempt_number: attempt.attempt_number,
        status: attempt.status,
        auto_submitted: attempt.auto_submitted,
        submitted_at: attempt.submitted_at.map(format_primitive),
        graded: attempt.graded,
        total_marks: attempt.total_marks,
        objective_total,
        subjective_total_graded,
        grand_total: objective_total + subjective_total_graded,
        items,
    })
}

/// Published quizzes in the student's class with the student's progress on each.
pub(crate) async fn quiz_status_for_student(
    pool: &PgPool,
    student: &User,
) -> Result<Vec<StudentQuizStatus>, sqlx::Error> {
    let Some(class_id) = student.school_class_id.as_deref() else {
        return Ok(Vec::new());
    };

    let quizzes = quizzes::list_for_class(pool, class_id).await?;
    let mut latest: HashMap<String, QuizAttempt> = attempts::latest_per_quiz(pool, &student.id)
        .await?
        .into_iter()
        .map(|attempt| (attempt.quiz_id.clone(), attempt))
        .collect();

    Ok(quizzes
        .into_iter()
        .map(|quiz| {
            let attempt = latest.remove(&quiz.id);
            let progress = scoring::quiz_progress(attempt.as_ref(), quiz.allow_retake);
            StudentQuizStatus {
                quiz_id: quiz.id,
                title: quiz.title,
                subject: quiz.subject_name,
                class_name: quiz.class_name,
                start_time: format_primitive(quiz.start_time),
                end_time: format_primitive(quiz.end_time),
                duration_minutes: quiz.duration_minutes,
                status: progress.label(),
                latest_score: attempt
                    .as_ref()
                    .filter(|attempt| attempt.status == AttemptStatus::Submitted)
                    .map(|attempt| attempt.score),
                latest_attempt_id: attempt.map(|attempt| attempt.id),
            }
        })
        .collect())
}
