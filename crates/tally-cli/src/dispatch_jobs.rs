//! Scheduler job definitions wired onto the engine's dispatch operations.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use tally_engine::HoursEngine;
use tally_events::{JobDefinition, JobKind, JobRunner};

use crate::cli_args::Cli;

/// Runs due scheduler jobs against the shared engine.
pub(crate) struct EngineJobRunner {
    pub(crate) engine: Arc<HoursEngine>,
}

#[async_trait]
impl JobRunner for EngineJobRunner {
    async fn run_job(&self, job: &JobDefinition, _now_unix_ms: u64) -> Result<()> {
        let report = match job.kind {
            JobKind::DailyDispatch => self.engine.dispatch_daily(None).await?,
            JobKind::DigestDispatch => self.engine.dispatch_digest_batch(None).await?,
        };
        println!(
            "dispatch job complete: id={} kind={} candidates={} sent={} skipped_no_records={} failed={}",
            job.id,
            job.kind.as_str(),
            report.candidates,
            report.sent,
            report.skipped_no_records,
            report.failed
        );
        Ok(())
    }
}

/// The two deployment cadences, each on its own cron expression.
pub(crate) fn dispatch_jobs(cli: &Cli) -> Vec<JobDefinition> {
    vec![
        JobDefinition {
            id: "daily-dispatch".to_string(),
            kind: JobKind::DailyDispatch,
            cron: cli.daily_cron.clone(),
            timezone: cli.timezone.clone(),
        },
        JobDefinition {
            id: "digest-dispatch".to_string(),
            kind: JobKind::DigestDispatch,
            cron: cli.digest_cron.clone(),
            timezone: cli.timezone.clone(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::Parser;
    use tally_core::{EngineError, ImportRow};
    use tally_engine::{EngineConfig, OutboundMessage, RecordStore, Transport};
    use tally_store::SqliteHoursStore;
    use tempfile::tempdir;

    #[derive(Default)]
    struct CountingTransport {
        sent: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn send_message(
            &self,
            _channel_identity: &str,
            message: &OutboundMessage,
        ) -> Result<(), EngineError> {
            self.sent
                .lock()
                .expect("transport lock")
                .push(message.text.clone());
            Ok(())
        }

        async fn acknowledge_callback(
            &self,
            _callback_id: &str,
            _text: Option<&str>,
        ) -> Result<(), EngineError> {
            Ok(())
        }
    }

    fn cli_with_defaults() -> Cli {
        Cli::try_parse_from(["tally", "--bot-token", "test-token"]).expect("cli args")
    }

    fn import_row(worker_id: i64, name: &str, hours: f64) -> ImportRow {
        ImportRow {
            worker_id,
            name: name.to_string(),
            position: "Fitter".to_string(),
            hours,
            activity_code: "A1".to_string(),
            activity_description: "Assembly".to_string(),
            cost_center: "CC-9".to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn unit_dispatch_jobs_carry_the_configured_cadences() {
        let cli = cli_with_defaults();
        let jobs = dispatch_jobs(&cli);
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, "daily-dispatch");
        assert_eq!(jobs[0].kind, JobKind::DailyDispatch);
        assert_eq!(jobs[0].cron, "0 0 9 * * * *");
        assert_eq!(jobs[1].id, "digest-dispatch");
        assert_eq!(jobs[1].kind, JobKind::DigestDispatch);
        assert_eq!(jobs[1].cron, "0 0 9 1,5,10,15,20,25,30 * * *");
        assert_eq!(jobs[1].timezone, "UTC");
    }

    #[tokio::test]
    async fn functional_job_runner_maps_kinds_onto_dispatch_operations() {
        let temp = tempdir().expect("tempdir");
        let store =
            Arc::new(SqliteHoursStore::open(temp.path().join("tally.sqlite")).expect("store"));
        let transport = Arc::new(CountingTransport::default());
        let engine = Arc::new(HoursEngine::new(
            store.clone(),
            transport.clone(),
            EngineConfig::default(),
        ));
        let today = engine.local_today();
        store
            .replace_day(today, "seed", &[import_row(1, "Ivan Petrov", 8.0)])
            .expect("seed records");
        store.set_worker_link(1, Some("chat-1")).expect("link");

        let runner = EngineJobRunner {
            engine: engine.clone(),
        };
        let jobs = dispatch_jobs(&cli_with_defaults());
        runner.run_job(&jobs[0], 0).await.expect("daily job");
        runner.run_job(&jobs[1], 0).await.expect("digest job");

        // One confirmation from the daily job, one digest from the other.
        assert_eq!(transport.sent.lock().expect("transport lock").len(), 2);
    }
}
