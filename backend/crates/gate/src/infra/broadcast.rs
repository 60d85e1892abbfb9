//! Identity fan-out shared by the provider implementations

use tokio::sync::mpsc;

use crate::domain::entity::Identity;
use crate::domain::provider::IdentityReceiver;

/// Current identity plus the live subscriber channels
#[derive(Debug, Default)]
pub(crate) struct IdentityBroadcast {
    current: Option<Identity>,
    subscribers: Vec<mpsc::UnboundedSender<Option<Identity>>>,
}

impl IdentityBroadcast {
    pub(crate) fn current(&self) -> Option<&Identity> {
        self.current.as_ref()
    }

    /// Add a subscriber, optionally handing it the current identity first
    pub(crate) fn subscribe(&mut self, announce: bool) -> IdentityReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        if announce {
            // Receiver is alive, send cannot fail
            let _ = tx.send(self.current.clone());
        }
        self.subscribers.push(tx);
        rx
    }

    /// Replace the identity and notify everyone. Closed channels are dropped.
    pub(crate) fn publish(&mut self, identity: Option<Identity>) {
        self.current = identity;
        self.announce();
    }

    /// Re-send the current identity to every subscriber
    pub(crate) fn announce(&mut self) {
        let current = &self.current;
        self.subscribers
            .retain(|subscriber| subscriber.send(current.clone()).is_ok());
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
