use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::transactions::domain::{NotificationId, PostId, RequestId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Message,
    RentalReminder,
    RentalOverdue,
    VerificationApproved,
    VerificationRejected,
    VerificationPending,
    ItemUnavailable,
    PostUpdate,
    System,
}

impl NotificationType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::RentalReminder => "rental_reminder",
            Self::RentalOverdue => "rental_overdue",
            Self::VerificationApproved => "verification_approved",
            Self::VerificationRejected => "verification_rejected",
            Self::VerificationPending => "verification_pending",
            Self::ItemUnavailable => "item_unavailable",
            Self::PostUpdate => "post_update",
            Self::System => "system",
        }
    }
}

/// Event content handed to the dispatcher before it becomes a persisted row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_post: Option<PostId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_user: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_request: Option<RequestId>,
}

impl NotificationPayload {
    pub fn new(
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            notification_type,
            title: title.into(),
            message: message.into(),
            related_post: None,
            related_user: None,
            related_request: None,
        }
    }

    pub fn with_post(mut self, post: &PostId) -> Self {
        self.related_post = Some(post.clone());
        self
    }

    pub fn with_user(mut self, user: &UserId) -> Self {
        self.related_user = Some(user.clone());
        self
    }

    pub fn with_request(mut self, request: &RequestId) -> Self {
        self.related_request = Some(request.clone());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient_id: UserId,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_post: Option<PostId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_user: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_request: Option<RequestId>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub(crate) fn from_payload(
        id: NotificationId,
        recipient_id: UserId,
        payload: NotificationPayload,
        created_at: DateTime<Utc>,
    ) -> Self {
        let NotificationPayload {
            notification_type,
            title,
            message,
            related_post,
            related_user,
            related_request,
        } = payload;

        Self {
            id,
            recipient_id,
            notification_type,
            title,
            message,
            related_post,
            related_user,
            related_request,
            is_read: false,
            created_at,
        }
    }
}

/// Frame pushed over a live channel: the persisted row plus a freshly counted unread total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LiveEvent {
    Notification {
        notification: Notification,
        unread_count: usize,
    },
    UnreadCount {
        unread_count: usize,
    },
}

impl LiveEvent {
    pub fn unread_count(&self) -> usize {
        match self {
            Self::Notification { unread_count, .. } | Self::UnreadCount { unread_count } => {
                *unread_count
            }
        }
    }
}
