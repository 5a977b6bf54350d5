//! Tests for cron due computation, scheduler state, and job execution.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::tempdir;

use super::{
    load_scheduler_state, next_due_unix_ms, DispatchSchedulerRuntime, JobDefinition, JobKind,
    JobRunner, SchedulerConfig, SchedulerState, SCHEDULER_STATE_SCHEMA_VERSION,
};

#[derive(Default)]
struct RecordingRunner {
    runs: Mutex<Vec<(String, u64)>>,
    fail_kinds: Vec<JobKind>,
}

#[async_trait]
impl JobRunner for RecordingRunner {
    async fn run_job(&self, job: &JobDefinition, now_unix_ms: u64) -> Result<()> {
        self.runs
            .lock()
            .unwrap()
            .push((job.id.clone(), now_unix_ms));
        if self.fail_kinds.contains(&job.kind) {
            anyhow::bail!("scripted job failure for {}", job.kind.as_str());
        }
        Ok(())
    }
}

fn every_second_job(id: &str, kind: JobKind) -> JobDefinition {
    JobDefinition {
        id: id.to_string(),
        kind,
        cron: "0/1 * * * * * *".to_string(),
        timezone: "UTC".to_string(),
    }
}

fn config_with_jobs(
    state_path: std::path::PathBuf,
    runner: Arc<RecordingRunner>,
    jobs: Vec<JobDefinition>,
) -> SchedulerConfig {
    SchedulerConfig {
        runner,
        jobs,
        state_path,
        poll_interval: Duration::from_millis(1),
    }
}

#[test]
fn unit_next_due_unix_ms_follows_cron_in_timezone() {
    // 2023-11-14T22:13:20Z.
    let from = 1_700_000_000_000_u64;

    // Daily 09:00 in UTC lands on the next day at 09:00 UTC.
    let utc = next_due_unix_ms("0 0 9 * * * *", "UTC", from).expect("utc due");
    assert_eq!(utc, 1_700_038_800_000);

    // Belgrade is UTC+1 in November, so 09:00 local is 08:00 UTC.
    let belgrade = next_due_unix_ms("0 0 9 * * * *", "Europe/Belgrade", from).expect("local due");
    assert_eq!(belgrade, 1_700_035_200_000);

    let soon = next_due_unix_ms("0/5 * * * * * *", "UTC", from).expect("soon");
    assert!(soon > from);
    assert!(soon <= from + 5_000);
}

#[test]
fn unit_next_due_rejects_invalid_cron_and_timezone() {
    let bad_cron = next_due_unix_ms("not-a-cron", "UTC", 0).expect_err("cron");
    assert!(bad_cron.to_string().contains("invalid cron expression"));

    let bad_tz = next_due_unix_ms("0/1 * * * * * *", "Mars/Olympus", 0).expect_err("tz");
    assert!(bad_tz.to_string().contains("invalid timezone"));
}

#[test]
fn unit_scheduler_state_round_trips_and_rejects_schema_drift() {
    let temp = tempdir().expect("tempdir");
    let state_path = temp.path().join("scheduler/state.json");

    let mut state = SchedulerState::default();
    state
        .last_run_unix_ms
        .insert("daily-dispatch".to_string(), 42);
    super::save_scheduler_state(&state_path, &state).expect("save");
    let loaded = load_scheduler_state(&state_path).expect("load");
    assert_eq!(loaded, state);

    std::fs::write(
        &state_path,
        format!(
            "{{\"schema_version\": {}, \"last_run_unix_ms\": {{}}}}\n",
            SCHEDULER_STATE_SCHEMA_VERSION + 1
        ),
    )
    .expect("write drifted");
    let error = load_scheduler_state(&state_path).expect_err("schema drift");
    assert!(error.to_string().contains("unsupported scheduler state schema"));
}

#[test]
fn unit_duplicate_job_ids_are_rejected() {
    let temp = tempdir().expect("tempdir");
    let runner = Arc::new(RecordingRunner::default());
    let config = config_with_jobs(
        temp.path().join("state.json"),
        runner,
        vec![
            every_second_job("daily-dispatch", JobKind::DailyDispatch),
            every_second_job("daily-dispatch", JobKind::DigestDispatch),
        ],
    );
    let error = DispatchSchedulerRuntime::new(config).err().expect("duplicate id");
    assert!(error.to_string().contains("duplicate scheduler job id"));
}

#[test]
fn unit_invalid_job_schedule_is_rejected_up_front() {
    let temp = tempdir().expect("tempdir");
    let runner = Arc::new(RecordingRunner::default());
    let mut bad_cron = every_second_job("daily-dispatch", JobKind::DailyDispatch);
    bad_cron.cron = "9 * *".to_string();
    let config = config_with_jobs(temp.path().join("state.json"), runner, vec![bad_cron]);
    let error = DispatchSchedulerRuntime::new(config).err().expect("bad cron");
    assert!(error.to_string().contains("for job 'daily-dispatch'"));
}

#[tokio::test]
async fn functional_poll_once_runs_due_jobs_and_records_last_run() {
    let temp = tempdir().expect("tempdir");
    let state_path = temp.path().join("scheduler/state.json");
    let runner = Arc::new(RecordingRunner::default());
    let config = config_with_jobs(
        state_path.clone(),
        runner.clone(),
        vec![
            every_second_job("daily-dispatch", JobKind::DailyDispatch),
            every_second_job("digest-dispatch", JobKind::DigestDispatch),
        ],
    );
    let mut runtime = DispatchSchedulerRuntime::new(config).expect("runtime");

    let now = 1_700_000_000_000_u64;
    // Make the digest job look freshly run so only the daily job is due.
    runtime
        .state
        .last_run_unix_ms
        .insert("digest-dispatch".to_string(), now);

    let report = runtime.poll_once(now).await.expect("poll");
    assert_eq!(report.evaluated, 2);
    assert_eq!(report.executed, 1);
    assert_eq!(report.not_due, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(
        runner.runs.lock().unwrap().as_slice(),
        &[("daily-dispatch".to_string(), now)]
    );
    assert_eq!(
        runtime.state.last_run_unix_ms.get("daily-dispatch").copied(),
        Some(now)
    );

    // The same instant again: nothing new is due.
    let repeat = runtime.poll_once(now).await.expect("repeat poll");
    assert_eq!(repeat.executed, 0);
    assert_eq!(repeat.not_due, 2);

    // Last-run state survives a restart.
    let reloaded = load_scheduler_state(&state_path).expect("reload");
    assert_eq!(
        reloaded.last_run_unix_ms.get("daily-dispatch").copied(),
        Some(now)
    );
}

#[tokio::test]
async fn functional_failed_job_keeps_last_run_and_retries_next_cycle() {
    let temp = tempdir().expect("tempdir");
    let runner = Arc::new(RecordingRunner {
        runs: Mutex::new(Vec::new()),
        fail_kinds: vec![JobKind::DigestDispatch],
    });
    let config = config_with_jobs(
        temp.path().join("state.json"),
        runner.clone(),
        vec![every_second_job("digest-dispatch", JobKind::DigestDispatch)],
    );
    let mut runtime = DispatchSchedulerRuntime::new(config).expect("runtime");

    let now = 1_700_000_000_000_u64;
    let first = runtime.poll_once(now).await.expect("first poll");
    assert_eq!(first.failed, 1);
    assert!(runtime.state.last_run_unix_ms.is_empty());

    let second = runtime.poll_once(now).await.expect("second poll");
    assert_eq!(second.failed, 1);
    assert_eq!(runner.runs.lock().unwrap().len(), 2);
}
