use rand::rngs::StdRng;
use rand::{seq::SliceRandom, SeedableRng};
use sha2::{Digest, Sha256};
use time::{Duration, PrimitiveDateTime};

use crate::db::models::{Choice, QuizAttempt};
use crate::db::types::{AttemptStatus, QuestionType};
use crate::repositories::answers::ScoreRow;

/// Marks earned by an objective answer.
pub(crate) fn objective_marks(question_marks: f64, selected: Option<&Choice>) -> f64 {
    match selected {
        Some(choice) if choice.is_correct => question_marks,
        _ => 0.0,
    }
}

pub(crate) fn attempt_deadline(started_at: PrimitiveDateTime, duration_minutes: i32) -> PrimitiveDateTime {
    started_at + Duration::minutes(i64::from(duration_minutes.max(0)))
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct ScoreSummary {
    pub(crate) objective_total: f64,
    pub(crate) subjective_graded: f64,
    pub(crate) pending: usize,
}

impl ScoreSummary {
    pub(crate) fn from_rows(rows: &[ScoreRow]) -> Self {
        rows.iter().fold(Self::default(), |mut acc, row| {
            match row.question_type {
                QuestionType::Objective => acc.objective_total += row.obtained_marks,
                QuestionType::Subjective if row.is_pending => acc.pending += 1,
                QuestionType::Subjective => acc.subjective_graded += row.obtained_marks,
            }
            acc
        })
    }

    pub(crate) fn score(&self) -> f64 {
        self.objective_total + self.subjective_graded
    }

    /// An attempt is fully graded once it is submitted and nothing is pending.
    pub(crate) fn graded(&self, status: AttemptStatus) -> bool {
        status == AttemptStatus::Submitted && self.pending == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QuizProgress {
    NotStarted,
    InProgress,
    Completed,
    AvailableForRetake,
}

impl QuizProgress {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::NotStarted => "Not Started",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::AvailableForRetake => "Available for Retake",
        }
    }
}

pub(crate) fn quiz_progress(latest: Option<&QuizAttempt>, quiz_allows_retake: bool) -> QuizProgress {
    match latest {
        None => QuizProgress::NotStarted,
        Some(attempt) if attempt.status == AttemptStatus::Active => QuizProgress::InProgress,
        Some(attempt) if quiz_allows_retake || attempt.retake_allowed => {
            QuizProgress::AvailableForRetake
        }
        Some(_) => QuizProgress::Completed,
    }
}

/// Stable per-attempt ordering so a resumed paper keeps its question order.
pub(crate) fn shuffle_for_attempt<T>(items: &mut [T], attempt_id: &str) {
    let digest = Sha256::digest(attempt_id.as_bytes());
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    let mut rng = StdRng::seed_from_u64(u64::from_le_bytes(seed));
    items.shuffle(&mut rng);
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn choice(is_correct: bool) -> Choice {
        Choice {
            id: "c".into(),
            question_id: "q".into(),
            text: "4".into(),
            is_correct,
            position: 0,
        }
    }

    fn row(question_type: QuestionType, obtained_marks: f64, is_pending: bool) -> ScoreRow {
        ScoreRow { question_type, obtained_marks, is_pending }
    }

    fn attempt(status: AttemptStatus, retake_allowed: bool) -> QuizAttempt {
        let now = datetime!(2025-01-01 10:00:00);
        QuizAttempt {
            id: "a".into(),
            quiz_id: "q".into(),
            student_id: "s".into(),
            attempt_number: 1,
            status,
            started_at: now,
            expires_at: now,
            submitted_at: None,
            auto_submitted: false,
            score: 0.0,
            total_marks: 0.0,
            graded: false,
            retake_allowed,
        }
    }

    #[test]
    fn objective_marks_only_for_correct_choice() {
        assert_eq!(objective_marks(2.5, Some(&choice(true))), 2.5);
        assert_eq!(objective_marks(2.5, Some(&choice(false))), 0.0);
        assert_eq!(objective_marks(2.5, None), 0.0);
    }

    #[test]
    fn summary_excludes_pending_subjective_marks() {
        let rows = vec![
            row(QuestionType::Objective, 2.0, false),
            row(QuestionType::Objective, 0.0, false),
            row(QuestionType::Subjective, 4.0, false),
            row(QuestionType::Subjective, 9.0, true),
        ];
        let summary = ScoreSummary::from_rows(&rows);
        assert_eq!(summary.objective_total, 2.0);
        assert_eq!(summary.subjective_graded, 4.0);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.score(), 6.0);
        assert!(!summary.graded(AttemptStatus::Submitted));
    }

    #[test]
    fn graded_requires_submission() {
        let summary = ScoreSummary::from_rows(&[row(QuestionType::Objective, 1.0, false)]);
        assert!(summary.graded(AttemptStatus::Submitted));
        assert!(!summary.graded(AttemptStatus::Active));
    }

    #[test]
    fn deadline_adds_duration() {
        let start = datetime!(2025-01-01 10:00:00);
        assert_eq!(attempt_deadline(start, 45), datetime!(2025-01-01 10:45:00));
    }

    #[test]
    fn progress_labels_follow_latest_attempt() {
        assert_eq!(quiz_progress(None, false).label(), "Not Started");
        let active = attempt(AttemptStatus::Active, false);
        assert_eq!(quiz_progress(Some(&active), true), QuizProgress::InProgress);
        let done = attempt(AttemptStatus::Submitted, false);
        assert_eq!(quiz_progress(Some(&done), false), QuizProgress::Completed);
        assert_eq!(quiz_progress(Some(&done), true).label(), "Available for Retake");
        let granted = attempt(AttemptStatus::Submitted, true);
        assert_eq!(quiz_progress(Some(&granted), false), QuizProgress::AvailableForRetake);
    }

    #[test]
    fn shuffle_is_stable_per_attempt() {
        let base: Vec<u32> = (0..20).collect();
        let mut first = base.clone();
        let mut second = base.clone();
        shuffle_for_attempt(&mut first, "attempt-1");
        shuffle_for_attempt(&mut second, "attempt-1");
        assert_eq!(first, second);

        let mut sorted = first.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, base);
    }
}
