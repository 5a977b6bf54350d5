//! Core domain types and low-level utilities shared across Tally crates.
//!
//! Defines the worker/hours/dispute entities, aggregation windows, the
//! callback payload codec, the error taxonomy, and small time/file helpers
//! used by the engine and its adapters.

pub mod atomic_io;
pub mod dates;
pub mod entities;
pub mod error;
pub mod payload;
pub mod time_utils;
pub mod window;

pub use atomic_io::write_text_atomic;
pub use dates::{date_from_epoch_day, epoch_day, month_bounds, parse_day, week_monday};
pub use entities::{
    AggregationResult, Dispute, DisputeKind, DisputeTopic, HoursRecord, ImportBatch, ImportRow,
    Worker,
};
pub use error::EngineError;
pub use payload::{CallbackPayload, MenuAction, PayloadError};
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms};
pub use window::Window;

#[cfg(test)]
mod tests {
    use std::fs::read_to_string;

    use super::*;

    #[test]
    fn time_utils_round_trip_bounds() {
        let now_s = current_unix_timestamp();
        let now_ms = current_unix_timestamp_ms();
        let now_ms_s = now_ms / 1_000;
        assert!(now_ms_s >= now_s);
        assert!(now_ms_s <= now_s.saturating_add(1));
    }

    #[test]
    fn write_text_atomic_writes_content() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("sample.txt");
        write_text_atomic(&path, "hello world").expect("write");
        let contents = read_to_string(&path).expect("read");
        assert_eq!(contents, "hello world");
    }
}
