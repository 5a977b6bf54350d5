#![no_main]

use libfuzzer_sys::fuzz_target;
use tally_core::CallbackPayload;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    match CallbackPayload::parse(&raw) {
        Ok(payload) => {
            let encoded = payload.encode();
            assert!(!encoded.is_empty());
            assert_eq!(
                CallbackPayload::parse(&encoded).as_ref(),
                Ok(&payload),
                "re-encoded payload must decode to itself: {encoded}"
            );
        }
        Err(error) => {
            assert!(!error.to_string().is_empty());
        }
    }
});
