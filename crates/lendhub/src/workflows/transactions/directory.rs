use std::collections::{BTreeSet, HashMap};

use super::domain::{PostId, UserId};

/// Identity and messaging lookups owned by external collaborators.
pub trait UserDirectory: Send + Sync {
    fn administrators(&self) -> Vec<UserId>;

    fn is_administrator(&self, user: &UserId) -> bool {
        self.administrators().iter().any(|admin| admin == user)
    }

    /// Distinct participants of conversations about `post`.
    fn conversation_participants(&self, post: &PostId) -> Vec<UserId>;
}

/// Fixed directory used by the single-process deployment and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticUserDirectory {
    administrators: BTreeSet<UserId>,
    conversations: HashMap<PostId, BTreeSet<UserId>>,
}

impl StaticUserDirectory {
    pub fn new<I>(administrators: I) -> Self
    where
        I: IntoIterator<Item = UserId>,
    {
        Self {
            administrators: administrators.into_iter().collect(),
            conversations: HashMap::new(),
        }
    }

    pub fn with_conversation<I>(mut self, post: PostId, participants: I) -> Self
    where
        I: IntoIterator<Item = UserId>,
    {
        self.conversations
            .entry(post)
            .or_default()
            .extend(participants);
        self
    }
}

impl UserDirectory for StaticUserDirectory {
    fn administrators(&self) -> Vec<UserId> {
        self.administrators.iter().cloned().collect()
    }

    fn is_administrator(&self, user: &UserId) -> bool {
        self.administrators.contains(user)
    }

    fn conversation_participants(&self, post: &PostId) -> Vec<UserId> {
        self.conversations
            .get(post)
            .map(|participants| participants.iter().cloned().collect())
            .unwrap_or_default()
    }
}
