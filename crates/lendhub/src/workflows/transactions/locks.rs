use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::domain::PostId;

/// Logical per-post lock spanning "read availability, decide, write".
#[derive(Debug, Default)]
pub(crate) struct PostLocks {
    slots: Mutex<HashMap<PostId, Arc<Mutex<()>>>>,
}

impl PostLocks {
    pub(crate) fn slot(&self, post: &PostId) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(post.clone()).or_default())
    }
}
