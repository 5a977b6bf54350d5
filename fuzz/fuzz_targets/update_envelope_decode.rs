#![no_main]

use libfuzzer_sys::fuzz_target;
use tally_telegram::{inbound_event_from_update, TelegramUpdate};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let Ok(update) = serde_json::from_str::<TelegramUpdate>(&raw) else {
        return;
    };
    if let Some(event) = inbound_event_from_update(update) {
        assert!(!event.channel_identity().is_empty());
    }
});
