//! Outbound transport adapter backed by the Telegram Bot API.

use async_trait::async_trait;
use serde_json::{json, Value};

use tally_core::EngineError;
use tally_engine::{OutboundMessage, Transport};

use crate::bot_api_client::TelegramBotClient;

/// Delivers engine messages through a [`TelegramBotClient`]. The
/// channel identity is the Telegram chat id as a decimal string.
#[derive(Clone)]
pub struct TelegramTransport {
    client: TelegramBotClient,
}

impl TelegramTransport {
    pub fn new(client: TelegramBotClient) -> Self {
        Self { client }
    }
}

fn inline_keyboard_json(message: &OutboundMessage) -> Option<Value> {
    if message.buttons.is_empty() {
        return None;
    }
    let rows = message
        .buttons
        .iter()
        .map(|row| {
            row.iter()
                .map(|button| json!({ "text": button.label, "callback_data": button.payload }))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    Some(json!(rows))
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_message(
        &self,
        channel_identity: &str,
        message: &OutboundMessage,
    ) -> Result<(), EngineError> {
        self.client
            .send_message(channel_identity, &message.text, inline_keyboard_json(message))
            .await
            .map_err(|error| EngineError::TransportDeliveryFailure(format!("{error:#}")))
    }

    async fn acknowledge_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), EngineError> {
        self.client
            .answer_callback_query(callback_id, text)
            .await
            .map_err(|error| EngineError::TransportDeliveryFailure(format!("{error:#}")))
    }
}
