use crate::core::time::primitive_now_utc;
use crate::db::types::UserRole;
use crate::repositories::notifications::{self, CreateNotification};

/// Longest message excerpt kept in the broadcast audit entry.
pub(crate) const AUDIT_EXCERPT_CHARS: usize = 200;

pub(crate) async fn notify(
    executor: impl sqlx::PgExecutor<'_>,
    recipient_id: &str,
    title: &str,
    message: &str,
) -> Result<(), sqlx::Error> {
    notifications::create(
        executor,
        CreateNotification {
            sender_id: None,
            recipient_id,
            title,
            message,
            role: None,
            is_broadcast: false,
            now: primitive_now_utc(),
        },
    )
    .await
}

/// Roles a sender may broadcast to. Teachers only reach students.
pub(crate) fn may_broadcast_to(sender: UserRole, target: UserRole) -> bool {
    match sender {
        UserRole::Superadmin | UserRole::Admin => {
            matches!(target, UserRole::Admin | UserRole::Teacher | UserRole::Student)
        }
        UserRole::Teacher => target == UserRole::Student,
        UserRole::Student => false,
    }
}

pub(crate) fn excerpt(message: &str, max_chars: usize) -> String {
    message.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teachers_only_broadcast_to_students() {
        assert!(may_broadcast_to(UserRole::Teacher, UserRole::Student));
        assert!(!may_broadcast_to(UserRole::Teacher, UserRole::Teacher));
        assert!(!may_broadcast_to(UserRole::Teacher, UserRole::Admin));
        assert!(may_broadcast_to(UserRole::Admin, UserRole::Teacher));
        assert!(!may_broadcast_to(UserRole::Admin, UserRole::Superadmin));
        assert!(!may_broadcast_to(UserRole::Student, UserRole::Student));
    }

    #[test]
    fn excerpt_counts_characters_not_bytes() {
        assert_eq!(excerpt("héllo wörld", 7), "héllo w");
        assert_eq!(excerpt("short", AUDIT_EXCERPT_CHARS), "short");
    }
}
