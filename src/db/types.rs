use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "userrole", rename_all = "lowercase")]
pub(crate) enum UserRole {
    Superadmin,
    Admin,
    Teacher,
    Student,
}

impl UserRole {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Superadmin => "superadmin",
            Self::Admin => "admin",
            Self::Teacher => "teacher",
            Self::Student => "student",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "superadmin" => Some(Self::Superadmin),
            "admin" => Some(Self::Admin),
            "teacher" => Some(Self::Teacher),
            "student" => Some(Self::Student),
            _ => None,
        }
    }

    /// Admin or superadmin.
    pub(crate) fn is_administrator(self) -> bool {
        matches!(self, Self::Superadmin | Self::Admin)
    }

    /// Anyone allowed to author quizzes and grade.
    pub(crate) fn is_staff(self) -> bool {
        !matches!(self, Self::Student)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "approvalstatus", rename_all = "lowercase")]
pub(crate) enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Maps the admin action verbs (`approve`, `reject`, `pending`) to a status.
    pub(crate) fn from_action(action: &str) -> Option<Self> {
        match action {
            "approve" => Some(Self::Approved),
            "reject" => Some(Self::Rejected),
            "pending" => Some(Self::Pending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "questiontype", rename_all = "lowercase")]
pub(crate) enum QuestionType {
    Objective,
    Subjective,
}

impl QuestionType {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Objective => "objective",
            Self::Subjective => "subjective",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "objective" => Some(Self::Objective),
            "subjective" => Some(Self::Subjective),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "attemptstatus", rename_all = "lowercase")]
pub(crate) enum AttemptStatus {
    Active,
    Submitted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_groups() {
        assert!(UserRole::Superadmin.is_administrator());
        assert!(UserRole::Admin.is_administrator());
        assert!(!UserRole::Teacher.is_administrator());
        assert!(UserRole::Teacher.is_staff());
        assert!(!UserRole::Student.is_staff());
    }

    #[test]
    fn parses_loose_input() {
        assert_eq!(UserRole::parse(" Teacher "), Some(UserRole::Teacher));
        assert_eq!(UserRole::parse("janitor"), None);
        assert_eq!(QuestionType::parse("SUBJECTIVE"), Some(QuestionType::Subjective));
        assert_eq!(ApprovalStatus::from_action("reject"), Some(ApprovalStatus::Rejected));
        assert_eq!(ApprovalStatus::from_action("rejected"), None);
    }
}
