use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use super::domain::{LiveEvent, Notification, NotificationPayload};
use super::presence::PresenceRegistry;
use crate::store::{NotificationRepository, RepositoryError};
use crate::workflows::transactions::domain::{NotificationId, UserId};

/// Persists notifications, then attempts best-effort live delivery.
///
/// Persistence is the source of truth: a push is attempted at most once per call, never retried,
/// and a failed push never surfaces to the caller.
pub struct NotificationDispatcher {
    repository: Arc<dyn NotificationRepository>,
    presence: Arc<dyn PresenceRegistry>,
}

impl NotificationDispatcher {
    pub fn new(
        repository: Arc<dyn NotificationRepository>,
        presence: Arc<dyn PresenceRegistry>,
    ) -> Self {
        Self {
            repository,
            presence,
        }
    }

    pub fn presence(&self) -> &Arc<dyn PresenceRegistry> {
        &self.presence
    }

    pub fn notify(
        &self,
        recipient: &UserId,
        payload: NotificationPayload,
    ) -> Result<Notification, RepositoryError> {
        let notification = Notification::from_payload(
            self.repository.next_notification_id()?,
            recipient.clone(),
            payload,
            Utc::now(),
        );
        let stored = self.repository.insert_notification(notification)?;
        self.push_notification(&stored);
        Ok(stored)
    }

    /// Fan the same payload out to every recipient, returning how many rows were persisted.
    pub fn notify_many<'a, I>(&self, recipients: I, payload: &NotificationPayload) -> usize
    where
        I: IntoIterator<Item = &'a UserId>,
    {
        let mut delivered = 0;
        for recipient in recipients {
            match self.notify(recipient, payload.clone()) {
                Ok(_) => delivered += 1,
                Err(error) => warn!(
                    recipient = %recipient,
                    kind = payload.notification_type.label(),
                    %error,
                    "failed to persist fan-out notification"
                ),
            }
        }
        delivered
    }

    pub fn unread_count(&self, user: &UserId) -> Result<usize, RepositoryError> {
        self.repository.unread_count(user)
    }

    pub fn list(
        &self,
        user: &UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError> {
        self.repository.notifications_for(user, unread_only)
    }

    pub fn mark_read(
        &self,
        user: &UserId,
        id: &NotificationId,
    ) -> Result<Notification, RepositoryError> {
        let notification = self.repository.mark_read(user, id)?;
        self.push_unread_count(user);
        Ok(notification)
    }

    pub fn mark_all_read(&self, user: &UserId) -> Result<usize, RepositoryError> {
        let updated = self.repository.mark_all_read(user)?;
        if updated > 0 {
            self.push_unread_count(user);
        }
        Ok(updated)
    }

    fn push_notification(&self, notification: &Notification) {
        let recipient = &notification.recipient_id;
        let Some(channel) = self.presence.channel_for(recipient) else {
            debug!(recipient = %recipient, "recipient offline; delivery deferred to next poll");
            return;
        };

        let unread_count = match self.repository.unread_count(recipient) {
            Ok(count) => count,
            Err(error) => {
                warn!(recipient = %recipient, %error, "unable to count unread notifications");
                return;
            }
        };

        let event = LiveEvent::Notification {
            notification: notification.clone(),
            unread_count,
        };
        if channel.push(event).is_err() {
            self.presence.release(recipient, channel.id());
            debug!(recipient = %recipient, "pruned closed live channel");
        }
    }

    fn push_unread_count(&self, user: &UserId) {
        let Some(channel) = self.presence.channel_for(user) else {
            return;
        };
        match self.repository.unread_count(user) {
            Ok(unread_count) => {
                if channel.push(LiveEvent::UnreadCount { unread_count }).is_err() {
                    self.presence.release(user, channel.id());
                }
            }
            Err(error) => warn!(recipient = %user, %error, "unable to count unread notifications"),
        }
    }
}
