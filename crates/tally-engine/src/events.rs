//! Normalized inbound chat events.
//!
//! Channel runtimes translate their wire updates into these events and
//! hand them to an [`InboundHandler`]; the engine never sees
//! platform-specific update shapes.

use async_trait::async_trait;

/// Enumerates supported `InboundEvent` values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A plain text message (including slash commands).
    Text {
        channel_identity: String,
        sender_display_name: String,
        text: String,
    },
    /// An inline button press carrying an encoded payload.
    CallbackPress {
        channel_identity: String,
        sender_display_name: String,
        callback_id: String,
        payload: String,
    },
}

impl InboundEvent {
    pub fn channel_identity(&self) -> &str {
        match self {
            InboundEvent::Text {
                channel_identity, ..
            }
            | InboundEvent::CallbackPress {
                channel_identity, ..
            } => channel_identity,
        }
    }
}

/// Consumer of normalized inbound events.
///
/// `handle_event` is invoked once per event; events from the same
/// channel identity are delivered in order, events from different
/// identities may be handled concurrently.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle_event(&self, event: InboundEvent) -> anyhow::Result<()>;
}
