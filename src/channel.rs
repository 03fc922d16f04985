//! A named channel: a subscriber list plus a usage counter governing its
//! lifetime in the [`ChannelHub`](crate::hub::ChannelHub).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::session::Session;
use crate::subscriber_list::{SubscriberList, Token};

/// A channel is reachable from the hub iff `usage_count > 0`. The counter is
/// initialised to 1 by whoever creates the channel (the first `connect`).
pub struct Channel {
    subscribers: SubscriberList<Session>,
    usage_count: AtomicU64,
}

impl Channel {
    pub fn new() -> Self {
        Self {
            subscribers: SubscriberList::new(),
            usage_count: AtomicU64::new(1),
        }
    }

    pub async fn add_subscriber(&self, subscriber: std::sync::Weak<Session>) -> Token {
        self.subscribers.add(subscriber).await
    }

    pub async fn remove_subscriber(&self, token: Token) {
        self.subscribers.remove(token).await
    }

    pub async fn for_each(&self, f: impl FnMut(Arc<Session>)) {
        self.subscribers.for_each(f).await
    }

    pub fn inc_usage(&self) {
        self.usage_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements the usage count. Returns `true` iff the pre-decrement value
    /// was 1 — a hint that the channel *might* now have no users. The caller
    /// must re-confirm with [`Channel::has_no_usage`] under the hub's
    /// exclusive lock before deleting, since a concurrent `connect` may have
    /// revived the channel in between.
    pub fn dec_usage(&self) -> bool {
        self.usage_count.fetch_sub(1, Ordering::Release) == 1
    }

    pub fn has_no_usage(&self) -> bool {
        self.usage_count.load(Ordering::Acquire) == 0
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::new()
    }
}
