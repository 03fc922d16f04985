//! Concurrent, token-addressed membership list used by a channel's
//! subscriber set.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::RwLock;

/// Stable handle returned by [`SubscriberList::add`], used to remove the same
/// entry later without scanning the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(u64);

/// Weak-reference membership set, generic over the referent so the
/// data-structure invariants can be unit-tested without a live WebSocket
/// session. [`crate::channel::Channel`] instantiates this as
/// `SubscriberList<crate::session::Session>`.
///
/// Mutation (`add`/`remove`) is exclusive; `for_each` is shared with other
/// `for_each` calls. Entries whose referent has already been dropped are
/// skipped by `for_each` rather than eagerly pruned.
pub struct SubscriberList<T: ?Sized> {
    next_token: AtomicU64,
    entries: RwLock<HashMap<Token, Weak<T>>>,
}

impl<T: ?Sized> SubscriberList<T> {
    pub fn new() -> Self {
        Self {
            next_token: AtomicU64::new(0),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn add(&self, subscriber: Weak<T>) -> Token {
        let token = Token(self.next_token.fetch_add(1, Ordering::Relaxed));
        let mut entries = self.entries.write().await;
        entries.insert(token, subscriber);
        token
    }

    /// Removes the entry for `token`. `token` must have been returned by
    /// `add` on this list and not already removed.
    pub async fn remove(&self, token: Token) {
        let mut entries = self.entries.write().await;
        entries.remove(&token);
    }

    /// Invokes `f` once per entry whose weak reference still upgrades.
    pub async fn for_each(&self, mut f: impl FnMut(Arc<T>)) {
        let entries = self.entries.read().await;
        for weak in entries.values() {
            if let Some(strong) = weak.upgrade() {
                f(strong);
            }
        }
    }
}

impl<T: ?Sized> Default for SubscriberList<T> {
    fn default() -> Self {
        Self::new()
    }
}
