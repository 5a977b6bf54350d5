//! Telegram bridge for the Tally worker-hours bot.
//!
//! Contains the Bot API client, the outbound transport adapter, and
//! the long-poll runtime that turns updates into inbound events.

pub mod bot_api_client;
pub mod poll_runtime;
pub mod transport;

pub use bot_api_client::{TelegramBotClient, TelegramBotClientConfig, TelegramUpdate};
pub use poll_runtime::{
    inbound_event_from_update, run_telegram_bridge, PollCycleReport, TelegramPollRuntimeConfig,
};
pub use transport::TelegramTransport;
