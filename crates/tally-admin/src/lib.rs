//! HTTP admin surface for the Tally worker-hours bot.

pub mod admin_server;

pub use admin_server::{build_admin_router, run_admin_server, AdminState};
