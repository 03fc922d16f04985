//! The channel registry. Creates a channel on first use, deletes it when its
//! last holder disconnects.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::channel::Channel;

/// Name -> [`Channel`] mapping with reference-counted channel lifetime.
///
/// `connect` uses a two-phase lock: an optimistic shared-lock lookup that
/// services the common case (channel already exists) without contending for
/// the exclusive lock, falling back to an exclusive lock only to create a new
/// channel or to settle a race against a concurrent creator.
pub struct ChannelHub {
    channels: RwLock<HashMap<String, Arc<Channel>>>,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Returns a handle to the named channel, having incremented its usage
    /// count for the caller. Creates the channel (with usage 1) if absent.
    pub async fn connect(&self, name: &str) -> Arc<Channel> {
        {
            let channels = self.channels.read().await;
            if let Some(channel) = channels.get(name) {
                channel.inc_usage();
                return channel.clone();
            }
        }

        let mut channels = self.channels.write().await;
        match channels.get(name) {
            Some(channel) => {
                channel.inc_usage();
                channel.clone()
            }
            None => {
                let channel = Arc::new(Channel::new());
                channels.insert(name.to_string(), channel.clone());
                channel
            }
        }
    }

    /// Releases the caller's handle on the named channel. If this was the
    /// last holder, removes the channel from the map — unless a concurrent
    /// `connect` revived it first, which the exclusive-lock re-check catches.
    pub async fn disconnect(&self, name: &str, channel: &Arc<Channel>) {
        if channel.dec_usage() {
            let mut channels = self.channels.write().await;
            if channel.has_no_usage() {
                channels.remove(name);
            }
        }
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.channels.read().await.len()
    }
}

impl Default for ChannelHub {
    fn default() -> Self {
        Self::new()
    }
}
