//! Chat-transport seam consumed by the engine.

use async_trait::async_trait;
use tally_core::EngineError;

/// One inline keyboard button carrying an encoded callback payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub payload: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            payload: payload.into(),
        }
    }
}

/// Public struct `OutboundMessage` used across Tally components.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    pub text: String,
    /// Inline keyboard rows; empty means a plain text message.
    pub buttons: Vec<Vec<InlineButton>>,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
        }
    }

    pub fn with_buttons(text: impl Into<String>, buttons: Vec<Vec<InlineButton>>) -> Self {
        Self {
            text: text.into(),
            buttons,
        }
    }
}

/// Delivery seam to the chat platform.
///
/// Failures are reported as [`EngineError::TransportDeliveryFailure`]
/// so dispatch loops can isolate them per recipient.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_message(
        &self,
        channel_identity: &str,
        message: &OutboundMessage,
    ) -> Result<(), EngineError>;

    /// Acknowledges a callback press, optionally with a short notice
    /// shown to the presser.
    async fn acknowledge_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), EngineError>;
}
