//! The engine behind the bot: identity resolution, aggregation,
//! dispatch, and reconciliation of confirmation callbacks.
//!
//! One [`HoursEngine`] instance serves every channel identity. Inbound
//! events arrive through the [`InboundHandler`] impl; outbound traffic
//! leaves through the injected [`Transport`]; all durable state lives
//! behind the injected [`RecordStore`].

pub mod render_helpers;
pub mod search_helpers;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use tally_core::{
    current_unix_timestamp_ms, date_from_epoch_day, AggregationResult, CallbackPayload,
    DisputeKind, DisputeTopic, EngineError, MenuAction, Window, Worker,
};

use crate::events::{InboundEvent, InboundHandler};
use crate::session::{Session, SessionStore};
use crate::store::{NewDispute, RecordStore};
use crate::transport::{OutboundMessage, Transport};

/// Runtime settings of the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Calendar-local timezone used to resolve "today".
    pub timezone: Tz,
    /// Day count of the rolling self-service window.
    pub rolling_window_days: u32,
    /// Channel identity receiving dispute notices; `None` disables
    /// admin notifications.
    pub admin_channel_identity: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::UTC,
            rolling_window_days: 5,
            admin_channel_identity: None,
        }
    }
}

/// Outcome counters of one dispatch batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Linked workers considered.
    pub candidates: usize,
    /// Workers that received a message.
    pub sent: usize,
    /// Workers skipped because the window held no records.
    pub skipped_no_records: usize,
    /// Workers whose lookup or delivery failed.
    pub failed: usize,
}

/// Public struct `HoursEngine` used across Tally components.
pub struct HoursEngine {
    store: Arc<dyn RecordStore>,
    transport: Arc<dyn Transport>,
    sessions: SessionStore,
    config: EngineConfig,
}

impl HoursEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        transport: Arc<dyn Transport>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            transport,
            sessions: SessionStore::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Today in the configured timezone.
    pub fn local_today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.config.timezone).date_naive()
    }

    /// The worker currently linked to the identity, if any.
    pub fn resolve_worker(&self, channel_identity: &str) -> Result<Option<Worker>, EngineError> {
        Ok(self
            .store
            .workers_linked_to_identity(channel_identity)?
            .into_iter()
            .next())
    }

    /// Links one channel identity to one worker, enforcing the
    /// bijection. Re-linking the same pair is a no-op success.
    pub fn link_worker(
        &self,
        worker_id: i64,
        channel_identity: &str,
    ) -> Result<Worker, EngineError> {
        let worker = self
            .store
            .worker_by_id(worker_id)?
            .ok_or_else(|| EngineError::worker_not_found(worker_id))?;
        if worker.is_linked_to(channel_identity) {
            return Ok(worker);
        }
        if let Some(existing) = self.resolve_worker(channel_identity)? {
            if existing.id != worker_id {
                return Err(EngineError::AlreadyLinkedOther(existing.id));
            }
        }
        if worker.linked {
            return Err(EngineError::TargetAlreadyLinked(worker.id));
        }
        self.store.set_worker_link(worker_id, Some(channel_identity))?;
        Ok(Worker {
            channel_identity: Some(channel_identity.to_string()),
            linked: true,
            ..worker
        })
    }

    /// Clears both sides of one worker's link.
    pub fn unlink_worker(&self, worker_id: i64) -> Result<(), EngineError> {
        let worker = self
            .store
            .worker_by_id(worker_id)?
            .ok_or_else(|| EngineError::worker_not_found(worker_id))?;
        self.store.set_worker_link(worker.id, None)
    }

    /// Unlinks every worker mapped to the identity and notifies the
    /// chat. Returns the ids that were unlinked.
    pub async fn force_unlink_identity(
        &self,
        channel_identity: &str,
    ) -> Result<Vec<i64>, EngineError> {
        let workers = self.store.workers_linked_to_identity(channel_identity)?;
        let mut unlinked = Vec::with_capacity(workers.len());
        for worker in &workers {
            self.store.set_worker_link(worker.id, None)?;
            unlinked.push(worker.id);
        }
        if !unlinked.is_empty() {
            if let Err(error) = self
                .transport
                .send_message(
                    channel_identity,
                    &OutboundMessage::text(render_helpers::FORCED_UNLINK_NOTICE),
                )
                .await
            {
                warn!(%error, "failed to notify unlinked identity");
            }
        }
        Ok(unlinked)
    }

    /// Ranked fuzzy search over all workers.
    pub fn search_workers(&self, query: &str) -> Result<Vec<Worker>, EngineError> {
        let workers = self.store.all_workers()?;
        Ok(search_helpers::rank_workers(query, workers))
    }

    pub fn aggregate(
        &self,
        worker_id: i64,
        window: &Window,
    ) -> Result<AggregationResult, EngineError> {
        self.aggregate_as_of(worker_id, window, self.local_today())
    }

    /// Aggregates one worker's records over a window anchored at an
    /// explicit day. Zero records is a valid, empty result.
    pub fn aggregate_as_of(
        &self,
        worker_id: i64,
        window: &Window,
        today: NaiveDate,
    ) -> Result<AggregationResult, EngineError> {
        if self.store.worker_by_id(worker_id)?.is_none() {
            return Err(EngineError::worker_not_found(worker_id));
        }
        let (start, end) = window.resolve(today)?;
        let mut records = self.store.records_in_range(worker_id, start, end)?;
        records.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        let total_hours = records.iter().map(|record| record.hours).sum();
        Ok(AggregationResult {
            records,
            total_hours,
            start,
            end,
        })
    }

    /// Sends every linked worker their records for `target_date`
    /// (default today) and marks the included records delivered.
    /// Failure for one recipient never aborts the batch.
    pub async fn dispatch_daily(
        &self,
        target_date: Option<NaiveDate>,
    ) -> Result<DispatchReport, EngineError> {
        let date = target_date.unwrap_or_else(|| self.local_today());
        let workers = self.store.linked_workers()?;
        let mut report = DispatchReport {
            candidates: workers.len(),
            ..DispatchReport::default()
        };
        for worker in workers {
            let Some(identity) = worker.channel_identity.clone() else {
                continue;
            };
            let records = match self.store.records_on_date(worker.id, date) {
                Ok(records) => records,
                Err(error) => {
                    warn!(worker_id = worker.id, %error, "daily dispatch lookup failed");
                    report.failed += 1;
                    continue;
                }
            };
            if records.is_empty() {
                report.skipped_no_records += 1;
                continue;
            }
            let message = render_helpers::daily_digest(&worker, date, &records, None, None);
            if let Err(error) = self.transport.send_message(&identity, &message).await {
                warn!(worker_id = worker.id, %error, "daily dispatch delivery failed");
                report.failed += 1;
                continue;
            }
            report.sent = report.sent.saturating_add(1);
            let record_ids: Vec<i64> = records.iter().map(|record| record.id).collect();
            if let Err(error) = self
                .store
                .mark_delivered(&record_ids, current_unix_timestamp_ms())
            {
                warn!(worker_id = worker.id, %error, "failed to mark records delivered");
            }
        }
        Ok(report)
    }

    /// Sends every linked worker a rolling-window digest anchored at
    /// `anchor_date` (default today). Unlike the daily dispatch this
    /// never touches delivered flags.
    pub async fn dispatch_digest_batch(
        &self,
        anchor_date: Option<NaiveDate>,
    ) -> Result<DispatchReport, EngineError> {
        let window = Window::RollingDays(self.config.rolling_window_days);
        let today = anchor_date.unwrap_or_else(|| self.local_today());
        let workers = self.store.linked_workers()?;
        let mut report = DispatchReport {
            candidates: workers.len(),
            ..DispatchReport::default()
        };
        for worker in workers {
            let Some(identity) = worker.channel_identity.clone() else {
                continue;
            };
            let result = match self.aggregate_as_of(worker.id, &window, today) {
                Ok(result) => result,
                Err(error) => {
                    warn!(worker_id = worker.id, %error, "digest aggregation failed");
                    report.failed += 1;
                    continue;
                }
            };
            if result.is_empty() {
                report.skipped_no_records += 1;
                continue;
            }
            let message = render_helpers::window_digest(&worker, &result, &window);
            if let Err(error) = self.transport.send_message(&identity, &message).await {
                warn!(worker_id = worker.id, %error, "digest delivery failed");
                report.failed += 1;
                continue;
            }
            report.sent = report.sent.saturating_add(1);
        }
        Ok(report)
    }

    /// Sends one worker their aggregated window, self-service style.
    pub async fn dispatch_window(
        &self,
        worker_id: i64,
        window: &Window,
    ) -> Result<(), EngineError> {
        let worker = self
            .store
            .worker_by_id(worker_id)?
            .ok_or_else(|| EngineError::worker_not_found(worker_id))?;
        let identity = match (&worker.channel_identity, worker.linked) {
            (Some(identity), true) => identity.clone(),
            _ => return Err(EngineError::Unlinked(worker.id)),
        };
        let result = self.aggregate_as_of(worker.id, window, self.local_today())?;
        if result.is_empty() {
            return Err(EngineError::NoData);
        }
        let message = render_helpers::window_digest(&worker, &result, window);
        self.transport.send_message(&identity, &message).await
    }

    /// Re-delivers one day's records to one worker, with an optional
    /// annotation banner and an optional display-only total.
    pub async fn dispatch_one(
        &self,
        worker_id: i64,
        date: Option<NaiveDate>,
        annotation: Option<&str>,
        override_hours_display: Option<f64>,
    ) -> Result<(), EngineError> {
        let worker = self
            .store
            .worker_by_id(worker_id)?
            .ok_or_else(|| EngineError::worker_not_found(worker_id))?;
        let identity = match (&worker.channel_identity, worker.linked) {
            (Some(identity), true) => identity.clone(),
            _ => return Err(EngineError::Unlinked(worker.id)),
        };
        let date = date.unwrap_or_else(|| self.local_today());
        let records = self.store.records_on_date(worker.id, date)?;
        if records.is_empty() {
            return Err(EngineError::NoData);
        }
        let message =
            render_helpers::daily_digest(&worker, date, &records, annotation, override_hours_display);
        self.transport.send_message(&identity, &message).await?;
        let record_ids: Vec<i64> = records.iter().map(|record| record.id).collect();
        if let Err(error) = self
            .store
            .mark_delivered(&record_ids, current_unix_timestamp_ms())
        {
            warn!(worker_id = worker.id, %error, "failed to mark records delivered");
        }
        Ok(())
    }

    async fn notify_admin(&self, text: &str) {
        let Some(admin_identity) = &self.config.admin_channel_identity else {
            return;
        };
        if let Err(error) = self
            .transport
            .send_message(admin_identity, &OutboundMessage::text(text))
            .await
        {
            warn!(%error, "failed to notify admin channel");
        }
    }

    async fn ack(&self, callback_id: &str, text: Option<&str>) {
        if let Err(error) = self.transport.acknowledge_callback(callback_id, text).await {
            warn!(%error, "failed to acknowledge callback press");
        }
    }

    async fn handle_text(
        &self,
        channel_identity: &str,
        sender_display_name: &str,
        text: &str,
    ) -> anyhow::Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        // Slash commands always win over a pending prompt.
        if let Some(command_line) = text.strip_prefix('/') {
            self.sessions.clear(channel_identity);
            return self.handle_command(channel_identity, command_line).await;
        }
        match self.sessions.get(channel_identity) {
            Session::AwaitingNumericCorrection { record_id } => {
                self.handle_correction_reply(channel_identity, record_id, text)
                    .await
            }
            Session::AwaitingFreeTextDispute { topic } => {
                self.handle_dispute_reply(channel_identity, sender_display_name, topic, text)
                    .await
            }
            Session::Idle => self.handle_worker_search(channel_identity, text).await,
        }
    }

    async fn handle_command(
        &self,
        channel_identity: &str,
        command_line: &str,
    ) -> anyhow::Result<()> {
        let mut parts = command_line.split_whitespace();
        let command = parts
            .next()
            .and_then(|raw| raw.split('@').next())
            .unwrap_or("");
        match command {
            "start" => self.handle_start(channel_identity).await,
            "id" => {
                self.transport
                    .send_message(
                        channel_identity,
                        &OutboundMessage::text(format!(
                            "Your channel identity: {channel_identity}"
                        )),
                    )
                    .await?;
                Ok(())
            }
            "link" => {
                let Some(worker_id) = parts.next().and_then(|raw| raw.parse::<i64>().ok()) else {
                    self.transport
                        .send_message(
                            channel_identity,
                            &OutboundMessage::text(render_helpers::LINK_USAGE),
                        )
                        .await?;
                    return Ok(());
                };
                self.run_link_flow(channel_identity, worker_id).await
            }
            "menu" => {
                self.transport
                    .send_message(
                        channel_identity,
                        &render_helpers::menu_message(self.config.rolling_window_days),
                    )
                    .await?;
                Ok(())
            }
            "days" => {
                self.send_window_reply(
                    channel_identity,
                    Window::RollingDays(self.config.rolling_window_days),
                )
                .await
            }
            "week" => {
                self.send_window_reply(channel_identity, Window::CalendarWeek(self.local_today()))
                    .await
            }
            "month" => {
                let today = self.local_today();
                self.send_window_reply(
                    channel_identity,
                    Window::CalendarMonth {
                        month: today.month(),
                        year: today.year(),
                    },
                )
                .await
            }
            "history" => {
                self.transport
                    .send_message(
                        channel_identity,
                        &render_helpers::month_history_message(self.local_today()),
                    )
                    .await?;
                Ok(())
            }
            "feedback" => {
                self.transport
                    .send_message(channel_identity, &render_helpers::feedback_menu())
                    .await?;
                Ok(())
            }
            other => {
                debug!(command = other, "ignoring unknown command");
                Ok(())
            }
        }
    }

    async fn handle_start(&self, channel_identity: &str) -> anyhow::Result<()> {
        match self.resolve_worker(channel_identity)? {
            Some(worker) => {
                self.transport
                    .send_message(
                        channel_identity,
                        &OutboundMessage::text(format!("Welcome back, {}!", worker.name)),
                    )
                    .await?;
                self.transport
                    .send_message(
                        channel_identity,
                        &render_helpers::menu_message(self.config.rolling_window_days),
                    )
                    .await?;
            }
            None => {
                self.transport
                    .send_message(channel_identity, &render_helpers::start_instructions())
                    .await?;
            }
        }
        Ok(())
    }

    async fn run_link_flow(&self, channel_identity: &str, worker_id: i64) -> anyhow::Result<()> {
        match self.link_worker(worker_id, channel_identity) {
            Ok(worker) => {
                self.transport
                    .send_message(channel_identity, &render_helpers::link_success(&worker))
                    .await?;
                match self.dispatch_one(worker.id, None, None, None).await {
                    Ok(()) | Err(EngineError::NoData) => {}
                    Err(error) => {
                        warn!(worker_id = worker.id, %error, "post-link digest delivery failed");
                    }
                }
                self.transport
                    .send_message(
                        channel_identity,
                        &render_helpers::menu_message(self.config.rolling_window_days),
                    )
                    .await?;
                Ok(())
            }
            Err(EngineError::NotFound(_)) => {
                self.transport
                    .send_message(
                        channel_identity,
                        &render_helpers::worker_id_not_found(worker_id),
                    )
                    .await?;
                Ok(())
            }
            Err(EngineError::AlreadyLinkedOther(existing_id)) => {
                let existing_name = self
                    .store
                    .worker_by_id(existing_id)?
                    .map(|worker| worker.name)
                    .unwrap_or_else(|| format!("worker {existing_id}"));
                self.transport
                    .send_message(
                        channel_identity,
                        &render_helpers::already_linked_other(&existing_name, existing_id),
                    )
                    .await?;
                Ok(())
            }
            Err(EngineError::TargetAlreadyLinked(_)) => {
                let name = self
                    .store
                    .worker_by_id(worker_id)?
                    .map(|worker| worker.name)
                    .unwrap_or_else(|| format!("worker {worker_id}"));
                self.transport
                    .send_message(
                        channel_identity,
                        &render_helpers::target_already_linked(&name),
                    )
                    .await?;
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn handle_worker_search(
        &self,
        channel_identity: &str,
        text: &str,
    ) -> anyhow::Result<()> {
        if let Some(worker) = self.resolve_worker(channel_identity)? {
            self.transport
                .send_message(channel_identity, &render_helpers::linked_idle_hint(&worker))
                .await?;
            return Ok(());
        }
        let ranked = self.search_workers(text)?;
        if ranked.is_empty() {
            self.transport
                .send_message(
                    channel_identity,
                    &OutboundMessage::text(render_helpers::NO_SEARCH_MATCHES),
                )
                .await?;
            return Ok(());
        }
        self.transport
            .send_message(
                channel_identity,
                &render_helpers::search_results(channel_identity, &ranked),
            )
            .await?;
        Ok(())
    }

    async fn handle_correction_reply(
        &self,
        channel_identity: &str,
        record_id: i64,
        text: &str,
    ) -> anyhow::Result<()> {
        let normalized = text.trim().replace(',', ".");
        let claimed_hours = match normalized.parse::<f64>() {
            Ok(value) if value.is_finite() => value,
            _ => {
                // Re-prompt, the session stays in place.
                self.transport
                    .send_message(
                        channel_identity,
                        &OutboundMessage::text(render_helpers::PROMPT_HOURS_PARSE_RETRY),
                    )
                    .await?;
                return Ok(());
            }
        };
        let Some(record) = self.store.record_by_id(record_id)? else {
            self.sessions.clear(channel_identity);
            self.transport
                .send_message(
                    channel_identity,
                    &OutboundMessage::text(render_helpers::RECORD_GONE_RESTART),
                )
                .await?;
            return Ok(());
        };
        let worker_name = self
            .store
            .worker_by_id(record.worker_id)?
            .map(|worker| worker.name)
            .unwrap_or_else(|| format!("worker {}", record.worker_id));
        self.store.create_dispute(NewDispute {
            worker_id: record.worker_id,
            record_id: Some(record.id),
            kind: DisputeKind::IncorrectHours,
            message: format!(
                "Worker stated the correct hours: {}",
                render_helpers::format_hours(claimed_hours)
            ),
            channel_identity: channel_identity.to_string(),
            admin_notified: true,
        })?;
        self.sessions.clear(channel_identity);
        self.notify_admin(&render_helpers::admin_hours_dispute_notice(
            &worker_name,
            &record,
            claimed_hours,
        ))
        .await;
        self.transport
            .send_message(
                channel_identity,
                &OutboundMessage::text(render_helpers::DISPUTE_ACK),
            )
            .await?;
        self.transport
            .send_message(
                channel_identity,
                &render_helpers::menu_message(self.config.rolling_window_days),
            )
            .await?;
        Ok(())
    }

    async fn handle_dispute_reply(
        &self,
        channel_identity: &str,
        sender_display_name: &str,
        topic: DisputeTopic,
        text: &str,
    ) -> anyhow::Result<()> {
        let Some(worker) = self.resolve_worker(channel_identity)? else {
            self.sessions.clear(channel_identity);
            self.transport
                .send_message(
                    channel_identity,
                    &OutboundMessage::text(render_helpers::NOT_LINKED_HINT),
                )
                .await?;
            return Ok(());
        };
        self.store.create_dispute(NewDispute {
            worker_id: worker.id,
            record_id: None,
            kind: topic.dispute_kind(),
            message: format!(
                "Message from {} ({sender_display_name}): {text}",
                worker.name
            ),
            channel_identity: channel_identity.to_string(),
            admin_notified: true,
        })?;
        self.sessions.clear(channel_identity);
        self.notify_admin(&render_helpers::admin_feedback_notice(
            &worker.name,
            topic,
            text,
        ))
        .await;
        self.transport
            .send_message(
                channel_identity,
                &OutboundMessage::text(render_helpers::FEEDBACK_ACK),
            )
            .await?;
        self.transport
            .send_message(
                channel_identity,
                &render_helpers::menu_message(self.config.rolling_window_days),
            )
            .await?;
        Ok(())
    }

    async fn handle_callback(
        &self,
        channel_identity: &str,
        callback_id: &str,
        payload: &str,
    ) -> anyhow::Result<()> {
        let parsed = match CallbackPayload::parse(payload) {
            Ok(parsed) => parsed,
            Err(error) => {
                debug!(payload, %error, "ignoring malformed callback payload");
                self.ack(callback_id, None).await;
                return Ok(());
            }
        };
        match parsed {
            CallbackPayload::Correct {
                worker_id,
                epoch_day,
            } => {
                self.handle_confirmation(channel_identity, callback_id, worker_id, epoch_day, true)
                    .await
            }
            CallbackPayload::Incorrect {
                worker_id,
                epoch_day,
            } => {
                self.handle_confirmation(
                    channel_identity,
                    callback_id,
                    worker_id,
                    epoch_day,
                    false,
                )
                .await
            }
            CallbackPayload::Select {
                channel_identity: expected_identity,
                worker_id,
            } => {
                if expected_identity != channel_identity {
                    self.ack(callback_id, Some(render_helpers::BUTTON_NOT_YOURS))
                        .await;
                    return Ok(());
                }
                self.ack(callback_id, None).await;
                self.run_link_flow(channel_identity, worker_id).await
            }
            CallbackPayload::Feedback { topic } => {
                self.ack(callback_id, None).await;
                self.sessions
                    .set(channel_identity, Session::AwaitingFreeTextDispute { topic });
                let prompt = match topic {
                    DisputeTopic::General => render_helpers::PROMPT_FEEDBACK_GENERAL,
                    DisputeTopic::HoursMistake => render_helpers::PROMPT_FEEDBACK_HOURS,
                };
                self.transport
                    .send_message(channel_identity, &OutboundMessage::text(prompt))
                    .await?;
                Ok(())
            }
            CallbackPayload::LogoutRequest { worker_id } => {
                self.handle_unlink_request(channel_identity, callback_id, worker_id)
                    .await
            }
            CallbackPayload::Month { month, year } => {
                self.ack(callback_id, None).await;
                self.sessions.clear(channel_identity);
                self.send_window_reply(channel_identity, Window::CalendarMonth { month, year })
                    .await
            }
            CallbackPayload::Menu { action } => {
                self.ack(callback_id, None).await;
                self.sessions.clear(channel_identity);
                self.handle_menu_action(channel_identity, action).await
            }
            CallbackPayload::MoreResults => {
                self.ack(callback_id, Some(render_helpers::MORE_RESULTS_TIP))
                    .await;
                Ok(())
            }
        }
    }

    async fn handle_confirmation(
        &self,
        channel_identity: &str,
        callback_id: &str,
        worker_id: i64,
        epoch_day: i64,
        confirmed: bool,
    ) -> anyhow::Result<()> {
        let ack_text = if confirmed {
            "You chose: Correct ✅"
        } else {
            "You chose: Incorrect ❌"
        };
        self.ack(callback_id, Some(ack_text)).await;
        let Some(worker) = self.resolve_worker(channel_identity)? else {
            self.transport
                .send_message(
                    channel_identity,
                    &OutboundMessage::text(render_helpers::NOT_LINKED_HINT),
                )
                .await?;
            return Ok(());
        };
        if worker.id != worker_id {
            self.transport
                .send_message(
                    channel_identity,
                    &OutboundMessage::text(render_helpers::BUTTON_NOT_YOURS),
                )
                .await?;
            return Ok(());
        }
        let record = match date_from_epoch_day(epoch_day) {
            Some(date) => self.store.latest_record_for_day(worker.id, date)?,
            None => None,
        };
        let Some(record) = record else {
            // Stale affordance: inform and leave the session alone.
            self.transport
                .send_message(
                    channel_identity,
                    &OutboundMessage::text(render_helpers::RECORD_NOT_LOCATED),
                )
                .await?;
            return Ok(());
        };
        if confirmed {
            self.transport
                .send_message(
                    channel_identity,
                    &OutboundMessage::text(render_helpers::CONFIRM_THANKS),
                )
                .await?;
            return Ok(());
        }
        self.sessions.set(
            channel_identity,
            Session::AwaitingNumericCorrection {
                record_id: record.id,
            },
        );
        self.transport
            .send_message(
                channel_identity,
                &OutboundMessage::text(render_helpers::PROMPT_ENTER_HOURS),
            )
            .await?;
        Ok(())
    }

    async fn handle_unlink_request(
        &self,
        channel_identity: &str,
        callback_id: &str,
        worker_id: i64,
    ) -> anyhow::Result<()> {
        let Some(worker) = self.store.worker_by_id(worker_id)? else {
            self.ack(callback_id, Some("Worker not found.")).await;
            return Ok(());
        };
        self.store.create_dispute(NewDispute {
            worker_id: worker.id,
            record_id: None,
            kind: DisputeKind::GeneralOrUnlink,
            message: format!(
                "Unlink request from worker {}. Channel identity: {channel_identity}",
                worker.name
            ),
            channel_identity: channel_identity.to_string(),
            admin_notified: true,
        })?;
        self.ack(callback_id, None).await;
        self.notify_admin(&render_helpers::admin_unlink_request_notice(
            &worker.name,
            channel_identity,
        ))
        .await;
        self.transport
            .send_message(
                channel_identity,
                &OutboundMessage::text(render_helpers::UNLINK_REQUEST_SENT),
            )
            .await?;
        Ok(())
    }

    async fn handle_menu_action(
        &self,
        channel_identity: &str,
        action: MenuAction,
    ) -> anyhow::Result<()> {
        match action {
            MenuAction::Days => {
                self.send_window_reply(
                    channel_identity,
                    Window::RollingDays(self.config.rolling_window_days),
                )
                .await
            }
            MenuAction::Week => {
                self.send_window_reply(channel_identity, Window::CalendarWeek(self.local_today()))
                    .await
            }
            MenuAction::Month => {
                let today = self.local_today();
                self.send_window_reply(
                    channel_identity,
                    Window::CalendarMonth {
                        month: today.month(),
                        year: today.year(),
                    },
                )
                .await
            }
            MenuAction::History => {
                self.transport
                    .send_message(
                        channel_identity,
                        &render_helpers::month_history_message(self.local_today()),
                    )
                    .await?;
                Ok(())
            }
            MenuAction::Feedback => {
                self.transport
                    .send_message(channel_identity, &render_helpers::feedback_menu())
                    .await?;
                Ok(())
            }
        }
    }

    async fn send_window_reply(
        &self,
        channel_identity: &str,
        window: Window,
    ) -> anyhow::Result<()> {
        let Some(worker) = self.resolve_worker(channel_identity)? else {
            self.transport
                .send_message(
                    channel_identity,
                    &OutboundMessage::text(render_helpers::NOT_LINKED_HINT),
                )
                .await?;
            return Ok(());
        };
        match self.dispatch_window(worker.id, &window).await {
            Ok(()) => Ok(()),
            Err(EngineError::NoData) => {
                self.transport
                    .send_message(channel_identity, &render_helpers::no_data_message(&window))
                    .await?;
                Ok(())
            }
            Err(EngineError::InvalidRange(reason)) => {
                debug!(%reason, "window request rejected");
                self.transport
                    .send_message(
                        channel_identity,
                        &OutboundMessage::text(render_helpers::PERIOD_UNAVAILABLE),
                    )
                    .await?;
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }
}

#[async_trait]
impl InboundHandler for HoursEngine {
    async fn handle_event(&self, event: InboundEvent) -> anyhow::Result<()> {
        match event {
            InboundEvent::Text {
                channel_identity,
                sender_display_name,
                text,
            } => {
                self.handle_text(&channel_identity, &sender_display_name, &text)
                    .await
            }
            InboundEvent::CallbackPress {
                channel_identity,
                sender_display_name: _,
                callback_id,
                payload,
            } => {
                self.handle_callback(&channel_identity, &callback_id, &payload)
                    .await
            }
        }
    }
}
