//! Core engine for the Tally worker-hours bot.
//!
//! The engine owns identity resolution, per-identity conversation
//! sessions, window aggregation, outbound dispatch, and reconciliation
//! of confirmation callbacks. Storage and chat delivery are consumed
//! through the [`RecordStore`] and [`Transport`] seams so runtimes and
//! tests can substitute their own implementations.

pub mod events;
pub mod hours_engine;
pub mod session;
pub mod store;
pub mod transport;

pub use events::{InboundEvent, InboundHandler};
pub use hours_engine::{DispatchReport, EngineConfig, HoursEngine};
pub use session::{Session, SessionStore};
pub use store::{
    DisputeListEntry, LinkStats, NewDispute, RecordListEntry, RecordPage, RecordStore,
    WorkerHoursSum,
};
pub use transport::{InlineButton, OutboundMessage, Transport};
