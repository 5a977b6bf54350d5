//! Cron-driven dispatch scheduling for the Tally worker-hours bot.
//!
//! The scheduler evaluates a fixed set of periodic jobs against their
//! cron expressions (in each job's timezone) and hands due jobs to a
//! [`JobRunner`]. Last-run instants persist across restarts in a
//! versioned state file so a restart neither re-fires a completed tick
//! nor replays missed history.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::TimeZone;
use chrono_tz::Tz;
use cron::Schedule;
use serde::{Deserialize, Serialize};

use tally_core::{current_unix_timestamp_ms, write_text_atomic};

const SCHEDULER_STATE_SCHEMA_VERSION: u32 = 1;

#[async_trait]
/// Trait contract for `JobRunner` behavior.
pub trait JobRunner: Send + Sync {
    async fn run_job(&self, job: &JobDefinition, now_unix_ms: u64) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `JobKind` values.
pub enum JobKind {
    /// Per-worker confirmation messages for one day's records.
    DailyDispatch,
    /// Rolling-window digests without delivery marking.
    DigestDispatch,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::DailyDispatch => "daily_dispatch",
            JobKind::DigestDispatch => "digest_dispatch",
        }
    }
}

/// One periodic job: a cron expression evaluated in `timezone`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    pub id: String,
    pub kind: JobKind,
    pub cron: String,
    pub timezone: String,
}

#[derive(Clone)]
/// Public struct `SchedulerConfig` used across Tally components.
pub struct SchedulerConfig {
    pub runner: Arc<dyn JobRunner>,
    pub jobs: Vec<JobDefinition>,
    pub state_path: PathBuf,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SchedulerState {
    schema_version: u32,
    #[serde(default)]
    last_run_unix_ms: HashMap<String, u64>,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self {
            schema_version: SCHEDULER_STATE_SCHEMA_VERSION,
            last_run_unix_ms: HashMap::new(),
        }
    }
}

/// Counters for one scheduler poll cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerPollReport {
    pub evaluated: usize,
    pub executed: usize,
    pub not_due: usize,
    pub failed: usize,
}

/// Next occurrence of `cron` in `timezone` strictly after
/// `from_unix_ms`, as unix milliseconds.
pub fn next_due_unix_ms(cron: &str, timezone: &str, from_unix_ms: u64) -> Result<u64> {
    let schedule =
        Schedule::from_str(cron).with_context(|| format!("invalid cron expression '{}'", cron))?;
    let tz: Tz = timezone
        .parse()
        .map_err(|_| anyhow!("invalid timezone '{}'", timezone))?;
    let from = tz
        .timestamp_millis_opt(i64::try_from(from_unix_ms).unwrap_or(i64::MAX))
        .single()
        .ok_or_else(|| anyhow!("invalid from timestamp for schedule"))?;
    let next = schedule
        .after(&from)
        .next()
        .ok_or_else(|| anyhow!("cron expression '{}' has no future occurrence", cron))?;
    Ok(u64::try_from(next.timestamp_millis()).unwrap_or(u64::MAX))
}

/// Runs the dispatch scheduler until ctrl-c.
pub async fn run_dispatch_scheduler(config: SchedulerConfig) -> Result<()> {
    let mut runtime = DispatchSchedulerRuntime::new(config)?;
    runtime.run().await
}

struct DispatchSchedulerRuntime {
    config: SchedulerConfig,
    state: SchedulerState,
}

impl DispatchSchedulerRuntime {
    fn new(config: SchedulerConfig) -> Result<Self> {
        let mut seen_ids = HashSet::new();
        for job in &config.jobs {
            if !seen_ids.insert(job.id.clone()) {
                bail!("duplicate scheduler job id '{}'", job.id);
            }
            Schedule::from_str(&job.cron)
                .with_context(|| format!("invalid cron expression '{}' for job '{}'", job.cron, job.id))?;
            job.timezone
                .parse::<Tz>()
                .map_err(|_| anyhow!("invalid timezone '{}' for job '{}'", job.timezone, job.id))?;
        }
        let state = load_scheduler_state(&config.state_path)?;
        Ok(Self { config, state })
    }

    async fn run(&mut self) -> Result<()> {
        loop {
            match self.poll_once(current_unix_timestamp_ms()).await {
                Ok(report) => {
                    if report.executed > 0 || report.failed > 0 {
                        println!(
                            "dispatch scheduler poll: evaluated={} executed={} failed={} not_due={}",
                            report.evaluated, report.executed, report.failed, report.not_due
                        );
                    }
                }
                Err(error) => {
                    eprintln!("dispatch scheduler poll error: {error}");
                }
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    println!("dispatch scheduler shutdown requested");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    async fn poll_once(&mut self, now_unix_ms: u64) -> Result<SchedulerPollReport> {
        let mut report = SchedulerPollReport::default();
        let mut state_dirty = false;

        let jobs = self.config.jobs.clone();
        for job in &jobs {
            report.evaluated = report.evaluated.saturating_add(1);
            // A fresh job starts one minute back so it does not fire on
            // every deploy, only when a tick genuinely passed.
            let last_run = self
                .state
                .last_run_unix_ms
                .get(&job.id)
                .copied()
                .unwrap_or_else(|| now_unix_ms.saturating_sub(60_000));
            let next_due = next_due_unix_ms(&job.cron, &job.timezone, last_run)?;
            if next_due > now_unix_ms {
                report.not_due = report.not_due.saturating_add(1);
                continue;
            }

            match self.config.runner.run_job(job, now_unix_ms).await {
                Ok(()) => {
                    report.executed = report.executed.saturating_add(1);
                    self.state
                        .last_run_unix_ms
                        .insert(job.id.clone(), now_unix_ms);
                    state_dirty = true;
                }
                Err(error) => {
                    // Last run stays put, so the job retries next cycle.
                    report.failed = report.failed.saturating_add(1);
                    eprintln!(
                        "dispatch job failed: id={} kind={} error={error}",
                        job.id,
                        job.kind.as_str()
                    );
                }
            }
        }

        if state_dirty {
            save_scheduler_state(&self.config.state_path, &self.state)?;
        }
        Ok(report)
    }
}

fn load_scheduler_state(path: &Path) -> Result<SchedulerState> {
    if !path.exists() {
        return Ok(SchedulerState::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let state = serde_json::from_str::<SchedulerState>(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    if state.schema_version != SCHEDULER_STATE_SCHEMA_VERSION {
        bail!(
            "unsupported scheduler state schema: expected {}, found {}",
            SCHEDULER_STATE_SCHEMA_VERSION,
            state.schema_version
        );
    }
    Ok(state)
}

fn save_scheduler_state(path: &Path, state: &SchedulerState) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let mut payload = serde_json::to_string_pretty(state).context("failed to serialize state")?;
    payload.push('\n');
    write_text_atomic(path, &payload).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests;
