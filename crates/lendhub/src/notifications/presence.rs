//! Ephemeral mapping of online users to their live delivery channel.
//!
//! The in-process registry only sees connections terminated by this process. Deployments with
//! several instances need a shared [`PresenceRegistry`] (pub/sub or key-value backed) so a
//! notification raised on one node reaches a user connected to another.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use tokio::sync::mpsc;

use super::domain::LiveEvent;
use crate::workflows::transactions::domain::UserId;

static CHANNEL_SEQUENCE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

/// Sending half of a live connection. The delivery worker owns the receiver.
#[derive(Debug, Clone)]
pub struct DeliveryChannel {
    id: ChannelId,
    sender: mpsc::UnboundedSender<LiveEvent>,
}

impl DeliveryChannel {
    /// Open a channel, returning the registry half and the receiver for the transport task.
    pub fn open() -> (Self, mpsc::UnboundedReceiver<LiveEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = ChannelId(CHANNEL_SEQUENCE.fetch_add(1, Ordering::Relaxed));
        (Self { id, sender }, receiver)
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Non-blocking push; fails only when the receiving side has gone away.
    pub fn push(&self, event: LiveEvent) -> Result<(), DeliveryError> {
        self.sender
            .send(event)
            .map_err(|_| DeliveryError::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("live channel closed")]
    ChannelClosed,
}

pub trait PresenceRegistry: Send + Sync {
    /// Register `channel` for `user`, replacing any earlier registration.
    fn register(&self, user: UserId, channel: DeliveryChannel);
    fn unregister(&self, user: &UserId);
    /// Remove the entry only while it still points at `channel`.
    fn release(&self, user: &UserId, channel: ChannelId) -> bool;
    fn channel_for(&self, user: &UserId) -> Option<DeliveryChannel>;
    fn online_count(&self) -> usize;
}

#[derive(Debug, Default)]
pub struct InMemoryPresenceRegistry {
    channels: RwLock<HashMap<UserId, DeliveryChannel>>,
}

impl PresenceRegistry for InMemoryPresenceRegistry {
    fn register(&self, user: UserId, channel: DeliveryChannel) {
        let mut guard = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.insert(user, channel);
    }

    fn unregister(&self, user: &UserId) {
        let mut guard = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.remove(user);
    }

    fn release(&self, user: &UserId, channel: ChannelId) -> bool {
        let mut guard = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match guard.get(user) {
            Some(current) if current.id() == channel => {
                guard.remove(user);
                true
            }
            _ => false,
        }
    }

    fn channel_for(&self, user: &UserId) -> Option<DeliveryChannel> {
        let guard = self
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        guard.get(user).cloned()
    }

    fn online_count(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
