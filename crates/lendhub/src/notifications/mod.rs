//! Notification fan-out and live presence.

mod dispatcher;
pub mod domain;
pub mod presence;

pub use dispatcher::NotificationDispatcher;
pub use domain::{LiveEvent, Notification, NotificationPayload, NotificationType};
pub use presence::{
    ChannelId, DeliveryChannel, DeliveryError, InMemoryPresenceRegistry, PresenceRegistry,
};
