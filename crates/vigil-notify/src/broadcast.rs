//! Live-dashboard broadcasts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::error::NotifyResult;

/// Flat string-keyed message body.
pub type Payload = BTreeMap<String, String>;

/// A host service changed status.
pub const HOST_SERVICE_STATUS_CHANGED: &str = "host-service-status-changed";
/// Aggregate per-status counts were recomputed.
pub const HOST_SERVICE_COUNT_CHANGED: &str = "host-service-count-changed";
/// A job was scheduled or its next run moved.
pub const SCHEDULE_CHANGED: &str = "schedule-changed";
/// A job was removed from the schedule.
pub const SCHEDULE_ITEM_REMOVED: &str = "schedule-item-removed";

/// Publishes named messages to a channel.
///
/// Callers log failures and move on; publishing is never retried.
pub trait Broadcaster: Send + Sync {
    fn publish(&self, channel: &str, event: &str, payload: &Payload) -> NotifyResult<()>;
}

/// One published message as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub channel: String,
    pub event: String,
    pub data: Payload,
}

/// In-process fan-out of broadcasts over a tokio broadcast channel.
///
/// Slow subscribers lag and drop old messages rather than blocking
/// publishers.
#[derive(Clone)]
pub struct ChannelHub {
    tx: broadcast::Sender<BroadcastMessage>,
}

impl ChannelHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChannelHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Broadcaster for ChannelHub {
    fn publish(&self, channel: &str, event: &str, payload: &Payload) -> NotifyResult<()> {
        let message = BroadcastMessage {
            channel: channel.to_string(),
            event: event.to_string(),
            data: payload.clone(),
        };
        trace!(%channel, %event, ?payload, "broadcast");
        // No subscribers is not a failure: nobody is watching the dashboard.
        if let Ok(receivers) = self.tx.send(message) {
            debug!(%channel, %event, receivers, "broadcast delivered");
        }
        Ok(())
    }
}
