//! Typing indicators.
//!
//! Start/stop signals are relayed verbatim to the receiver's sessions. The
//! tracker also remembers each open (sender, receiver) pair and emits the
//! stop signal itself once the pair has been quiet for the configured
//! period, so a lost client stop never leaves a stuck indicator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::presence::PresenceRegistry;
use crate::ws::broadcast::send_to_user;
use crate::ws::events::ServerEvent;

type PairKey = (String, String);

pub struct TypingTracker {
    registry: Arc<PresenceRegistry>,
    quiet: Duration,
    /// (sender, receiver) -> generation of the latest start signal
    active: DashMap<PairKey, u64>,
    next_generation: AtomicU64,
}

impl TypingTracker {
    pub fn new(registry: Arc<PresenceRegistry>, quiet: Duration) -> Self {
        Self {
            registry,
            quiet,
            active: DashMap::new(),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Relay a start signal and (re)arm the quiet-period expiry.
    pub fn started(self: &Arc<Self>, sender_id: &str, receiver_id: &str) {
        let key = (sender_id.to_string(), receiver_id.to_string());
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.active.insert(key.clone(), generation);

        send_to_user(
            &self.registry,
            receiver_id,
            &ServerEvent::UserTyping {
                sender_id: sender_id.to_string(),
            },
        );

        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(tracker.quiet).await;
            // A newer start signal replaced the generation: leave it armed.
            if tracker
                .active
                .remove_if(&key, |_, current| *current == generation)
                .is_some()
            {
                tracing::debug!(sender_id = %key.0, receiver_id = %key.1, "Typing indicator expired");
                tracker.emit_stop(&key.0, &key.1);
            }
        });
    }

    /// Relay a stop signal.
    pub fn stopped(&self, sender_id: &str, receiver_id: &str) {
        self.active
            .remove(&(sender_id.to_string(), receiver_id.to_string()));
        self.emit_stop(sender_id, receiver_id);
    }

    /// Close every indicator opened by a user who just went offline.
    pub fn sender_gone(&self, sender_id: &str) {
        let receivers: Vec<String> = self
            .active
            .iter()
            .filter(|entry| entry.key().0 == sender_id)
            .map(|entry| entry.key().1.clone())
            .collect();

        for receiver_id in receivers {
            self.stopped(sender_id, &receiver_id);
        }
    }

    #[cfg(test)]
    fn is_typing(&self, sender_id: &str, receiver_id: &str) -> bool {
        self.active
            .contains_key(&(sender_id.to_string(), receiver_id.to_string()))
    }

    fn emit_stop(&self, sender_id: &str, receiver_id: &str) {
        send_to_user(
            &self.registry,
            receiver_id,
            &ServerEvent::UserStopTyping {
                sender_id: sender_id.to_string(),
            },
        );
    }
}
