//! Command-line and environment configuration for the `tally` binary.

use std::path::PathBuf;

use chrono_tz::Tz;
use clap::{ArgAction, Parser};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const DEFAULT_DB_PATH: &str = ".tally/hours.sqlite3";
const DEFAULT_ADMIN_BIND: &str = "127.0.0.1:7707";
const DEFAULT_SCHEDULER_STATE_PATH: &str = ".tally/scheduler-state.json";
const DEFAULT_DAILY_CRON: &str = "0 0 9 * * * *";
const DEFAULT_DIGEST_CRON: &str = "0 0 9 1,5,10,15,20,25,30 * * *";

#[derive(Debug, Parser)]
#[command(
    name = "tally",
    about = "Telegram worker-hours notification bot with an admin HTTP surface",
    version
)]
/// Public struct `Cli` used across Tally components.
pub struct Cli {
    #[arg(
        long,
        env = "TALLY_BOT_TOKEN",
        hide_env_values = true,
        help = "Telegram Bot API token used for polling and sending"
    )]
    pub bot_token: String,

    #[arg(
        long,
        env = "TALLY_API_BASE",
        default_value = DEFAULT_API_BASE,
        help = "Base URL of the Telegram Bot API"
    )]
    pub api_base: String,

    #[arg(
        long,
        env = "TALLY_DB_PATH",
        default_value = DEFAULT_DB_PATH,
        help = "SQLite database path; missing parent directories are created"
    )]
    pub db_path: PathBuf,

    #[arg(
        long,
        env = "TALLY_ADMIN_BIND",
        default_value = DEFAULT_ADMIN_BIND,
        help = "Bind address for the admin HTTP server"
    )]
    pub admin_bind: String,

    #[arg(
        long,
        env = "TALLY_ADMIN_CHAT_ID",
        help = "Chat receiving dispute notifications; omit to disable them"
    )]
    pub admin_chat_id: Option<String>,

    #[arg(
        long,
        env = "TALLY_TIMEZONE",
        default_value = "UTC",
        value_parser = parse_timezone,
        help = "IANA timezone that defines the local business day"
    )]
    pub timezone: String,

    #[arg(
        long,
        env = "TALLY_ROLLING_WINDOW_DAYS",
        default_value_t = 5,
        value_parser = parse_positive_u32,
        help = "Length of the rolling self-service window in days"
    )]
    pub rolling_window_days: u32,

    #[arg(
        long,
        env = "TALLY_DAILY_CRON",
        default_value = DEFAULT_DAILY_CRON,
        help = "Cron expression (seconds first) for the daily dispatch"
    )]
    pub daily_cron: String,

    #[arg(
        long,
        env = "TALLY_DIGEST_CRON",
        default_value = DEFAULT_DIGEST_CRON,
        help = "Cron expression (seconds first) for the rolling digest"
    )]
    pub digest_cron: String,

    #[arg(
        long,
        env = "TALLY_POLL_INTERVAL_MS",
        default_value_t = 2_000,
        value_parser = parse_positive_u64,
        help = "Delay between Telegram update polls in milliseconds"
    )]
    pub poll_interval_ms: u64,

    #[arg(
        long,
        env = "TALLY_SCHEDULER_POLL_INTERVAL_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "Delay between scheduler due-checks in milliseconds"
    )]
    pub scheduler_poll_interval_ms: u64,

    #[arg(
        long,
        env = "TALLY_SCHEDULER_STATE",
        default_value = DEFAULT_SCHEDULER_STATE_PATH,
        help = "Path of the scheduler last-run state file"
    )]
    pub scheduler_state_path: PathBuf,

    #[arg(
        long,
        env = "TALLY_REQUEST_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "Telegram Bot API request timeout in milliseconds"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long,
        env = "TALLY_RETRY_MAX_ATTEMPTS",
        default_value_t = 3,
        value_parser = parse_positive_usize,
        help = "Attempts per Telegram Bot API request before giving up"
    )]
    pub retry_max_attempts: usize,

    #[arg(
        long,
        env = "TALLY_RETRY_BASE_DELAY_MS",
        default_value_t = 500,
        value_parser = parse_positive_u64,
        help = "Base delay of the exponential retry backoff in milliseconds"
    )]
    pub retry_base_delay_ms: u64,

    #[arg(
        long,
        env = "TALLY_POLL_ONCE",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Drain pending updates once and exit without scheduler or admin server"
    )]
    pub poll_once: bool,
}

fn parse_positive_u32(value: &str) -> Result<u32, String> {
    let parsed = value
        .parse::<u32>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_timezone(value: &str) -> Result<String, String> {
    value
        .parse::<Tz>()
        .map(|timezone| timezone.name().to_string())
        .map_err(|error| format!("unknown timezone: {error}"))
}
