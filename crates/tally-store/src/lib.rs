//! SQLite-backed record store for the Tally worker-hours bot.

pub mod hours_store;

pub use hours_store::{normalize_imported_hours, SqliteHoursStore};
