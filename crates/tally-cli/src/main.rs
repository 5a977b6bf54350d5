//! `tally` binary: configuration parsing, component wiring, and
//! supervision of the Telegram bridge, dispatch scheduler, and admin
//! HTTP server.

mod bootstrap_helpers;
mod cli_args;
mod dispatch_jobs;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;
use clap::Parser;

use tally_admin::{run_admin_server, AdminState};
use tally_engine::{EngineConfig, HoursEngine};
use tally_events::{run_dispatch_scheduler, SchedulerConfig};
use tally_store::SqliteHoursStore;
use tally_telegram::{
    run_telegram_bridge, TelegramBotClient, TelegramBotClientConfig, TelegramPollRuntimeConfig,
    TelegramTransport,
};

use crate::bootstrap_helpers::init_tracing;
use crate::cli_args::Cli;
use crate::dispatch_jobs::{dispatch_jobs, EngineJobRunner};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run_cli(cli).await
}

async fn run_cli(cli: Cli) -> Result<()> {
    let timezone: Tz = cli
        .timezone
        .parse()
        .map_err(|error| anyhow!("invalid timezone '{}': {error}", cli.timezone))?;

    let store = Arc::new(SqliteHoursStore::open(&cli.db_path)?);
    let client = TelegramBotClient::new(TelegramBotClientConfig {
        api_base: cli.api_base.clone(),
        bot_token: cli.bot_token.clone(),
        request_timeout_ms: cli.request_timeout_ms,
        retry_max_attempts: cli.retry_max_attempts,
        retry_base_delay_ms: cli.retry_base_delay_ms,
    })?;
    let transport = Arc::new(TelegramTransport::new(client.clone()));
    let engine = Arc::new(HoursEngine::new(
        store.clone(),
        transport,
        EngineConfig {
            timezone,
            rolling_window_days: cli.rolling_window_days,
            admin_channel_identity: cli.admin_chat_id.clone(),
        },
    ));

    let bridge_config = TelegramPollRuntimeConfig {
        client,
        handler: engine.clone(),
        poll_interval: Duration::from_millis(cli.poll_interval_ms),
        poll_once: cli.poll_once,
    };
    if cli.poll_once {
        return run_telegram_bridge(bridge_config).await;
    }

    let scheduler_config = SchedulerConfig {
        runner: Arc::new(EngineJobRunner {
            engine: engine.clone(),
        }),
        jobs: dispatch_jobs(&cli),
        state_path: cli.scheduler_state_path.clone(),
        poll_interval: Duration::from_millis(cli.scheduler_poll_interval_ms),
    };
    let admin_state = AdminState { engine, store };

    println!(
        "tally bot starting: db={} admin_bind={} timezone={} rolling_window_days={}",
        cli.db_path.display(),
        cli.admin_bind,
        timezone,
        cli.rolling_window_days
    );

    tokio::select! {
        result = run_telegram_bridge(bridge_config) => {
            result.context("telegram bridge exited")
        }
        result = run_dispatch_scheduler(scheduler_config) => {
            result.context("dispatch scheduler exited")
        }
        result = run_admin_server(&cli.admin_bind, admin_state) => {
            result.context("admin server exited")
        }
    }
}
