use crate::events::OutboundEvent;
use async_trait::async_trait;
use parlor_core::RoomId;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
#[error("Delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Outbound seam implemented by the platform integration.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, room: RoomId, event: &OutboundEvent) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub room: RoomId,
    pub event: OutboundEvent,
}

/// Forwards events into an unbounded channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn deliver(&self, room: RoomId, event: &OutboundEvent) -> Result<(), DeliveryError> {
        self.tx
            .send(Envelope {
                room,
                event: event.clone(),
            })
            .map_err(|_| DeliveryError("receiver dropped".to_string()))
    }
}

/// Best-effort delivery: failures are logged and never propagate.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn EventSink>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    pub async fn send(&self, room: RoomId, event: OutboundEvent) {
        if let Err(e) = self.sink.deliver(room, &event).await {
            tracing::warn!("Dropped outbound event for room {}: {}", room, e);
        }
    }
}
