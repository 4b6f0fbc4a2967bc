use serde::{Deserialize, Serialize};

use crate::core::time::format_primitive;
use crate::db::models::Notification;
use crate::db::types::UserRole;

#[derive(Debug, Deserialize)]
pub(crate) struct BroadcastRequest {
    #[serde(default)]
    pub(crate) role: Option<String>,
    #[serde(default)]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) message: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BroadcastResponse {
    pub(crate) ok: bool,
    pub(crate) message: String,
    pub(crate) count: u64,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct MarkReadRequest {
    /// Marks everything unread when absent.
    #[serde(default)]
    pub(crate) ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MarkReadResponse {
    pub(crate) ok: bool,
    pub(crate) updated: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct NotificationResponse {
    pub(crate) id: String,
    pub(crate) sender_id: Option<String>,
    pub(crate) title: String,
    pub(crate) message: String,
    pub(crate) role: Option<UserRole>,
    pub(crate) is_broadcast: bool,
    pub(crate) is_read: bool,
    pub(crate) created_at: String,
}

impl From<Notification> for NotificationResponse {
    fn from(notification: Notification) -> Self {
        Self {
            id: notification.id,
            sender_id: notification.sender_id,
            title: notification.title,
            message: notification.message,
            role: notification.role,
            is_broadcast: notification.is_broadcast,
            is_read: notification.is_read,
            created_at: format_primitive(notification.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct UnreadResponse {
    pub(crate) unread_count: i64,
    pub(crate) items: Vec<NotificationResponse>,
}
