//! Notification delivery for escalation, pause and awareness events.

use tokio::sync::mpsc;

use wheelhouse_core::MissionEvent;

/// Fire-and-forget event sink. Implementations must not block.
pub trait Notifier: Send + Sync {
    fn emit(&self, event: MissionEvent);
}

/// Writes every event to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn emit(&self, event: MissionEvent) {
        let payload = serde_json::to_string(&event.payload).unwrap_or_default();
        if event.payload.is_error() {
            tracing::warn!(
                mission_id = %event.mission_id,
                event = event.name(),
                %payload,
                "Mission event"
            );
        } else {
            tracing::info!(
                mission_id = %event.mission_id,
                event = event.name(),
                %payload,
                "Mission event"
            );
        }
    }
}

/// Forwards events over an unbounded channel, e.g. to a UI task.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<MissionEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MissionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn emit(&self, event: MissionEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Notification receiver dropped, event discarded");
        }
    }
}
