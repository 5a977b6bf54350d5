//! Long-poll runtime that feeds Telegram updates into the hours engine.
//!
//! Updates are normalized into [`InboundEvent`]s and queued per chat.
//! One task at a time runs per chat so a chat's events are handled in
//! arrival order while different chats proceed concurrently.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use tally_engine::{InboundEvent, InboundHandler};

use crate::bot_api_client::{TelegramBotClient, TelegramUpdate};

#[derive(Clone)]
/// Runtime configuration for the Telegram long-poll loop.
pub struct TelegramPollRuntimeConfig {
    pub client: TelegramBotClient,
    pub handler: Arc<dyn InboundHandler>,
    pub poll_interval: Duration,
    /// Process a single poll cycle (draining started work) and exit.
    pub poll_once: bool,
}

/// Counters for one poll cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollCycleReport {
    pub discovered_updates: usize,
    pub queued_events: usize,
    pub skipped_updates: usize,
    pub completed_events: usize,
    pub failed_events: usize,
}

/// Runs the Telegram bridge until ctrl-c (or one cycle in one-shot mode).
pub async fn run_telegram_bridge(config: TelegramPollRuntimeConfig) -> Result<()> {
    let mut runtime = TelegramPollRuntime::new(config);
    runtime.run().await
}

struct TelegramPollRuntime {
    client: TelegramBotClient,
    handler: Arc<dyn InboundHandler>,
    poll_interval: Duration,
    poll_once: bool,
    next_offset: Option<i64>,
    pending: HashMap<String, VecDeque<InboundEvent>>,
    active: HashMap<String, tokio::task::JoinHandle<Result<()>>>,
}

impl TelegramPollRuntime {
    fn new(config: TelegramPollRuntimeConfig) -> Self {
        Self {
            client: config.client,
            handler: config.handler,
            poll_interval: config.poll_interval,
            poll_once: config.poll_once,
            next_offset: None,
            pending: HashMap::new(),
            active: HashMap::new(),
        }
    }

    async fn run(&mut self) -> Result<()> {
        loop {
            match self.poll_cycle().await {
                Ok(mut report) => {
                    if self.poll_once {
                        self.drain_all_pending(&mut report).await;
                        println!(
                            "telegram bridge one-shot complete: discovered={} completed={} failed={} skipped={}",
                            report.discovered_updates,
                            report.completed_events,
                            report.failed_events,
                            report.skipped_updates
                        );
                        return Ok(());
                    }
                    if report.discovered_updates > 0 || report.failed_events > 0 {
                        println!(
                            "telegram bridge poll: discovered={} queued={} completed={} failed={} skipped={}",
                            report.discovered_updates,
                            report.queued_events,
                            report.completed_events,
                            report.failed_events,
                            report.skipped_updates
                        );
                    }
                }
                Err(error) => {
                    eprintln!("telegram bridge poll error: {error:#}");
                    if self.poll_once {
                        return Err(error);
                    }
                }
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    println!("telegram bridge shutdown requested");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn poll_cycle(&mut self) -> Result<PollCycleReport> {
        let mut report = PollCycleReport::default();
        self.drain_finished_runs(&mut report, false).await;

        let updates = self.client.get_updates(self.next_offset).await?;
        report.discovered_updates = updates.len();
        for update in updates {
            let confirm_offset = update.update_id.saturating_add(1);
            if self.next_offset.map_or(true, |offset| confirm_offset > offset) {
                self.next_offset = Some(confirm_offset);
            }
            match inbound_event_from_update(update) {
                Some(event) => {
                    report.queued_events = report.queued_events.saturating_add(1);
                    self.pending
                        .entry(event.channel_identity().to_string())
                        .or_default()
                        .push_back(event);
                }
                None => {
                    report.skipped_updates = report.skipped_updates.saturating_add(1);
                }
            }
        }

        self.launch_ready_events();
        Ok(report)
    }

    /// Starts at most one handler task per chat with queued events.
    fn launch_ready_events(&mut self) {
        let ready = self
            .pending
            .keys()
            .filter(|identity| !self.active.contains_key(*identity))
            .cloned()
            .collect::<Vec<_>>();
        for identity in ready {
            let Some(queue) = self.pending.get_mut(&identity) else {
                continue;
            };
            let Some(event) = queue.pop_front() else {
                self.pending.remove(&identity);
                continue;
            };
            if queue.is_empty() {
                self.pending.remove(&identity);
            }
            let handler = Arc::clone(&self.handler);
            let handle = tokio::spawn(async move { handler.handle_event(event).await });
            self.active.insert(identity, handle);
        }
    }

    async fn drain_finished_runs(&mut self, report: &mut PollCycleReport, include_pending: bool) {
        let finished = self
            .active
            .iter()
            .filter_map(|(identity, handle)| {
                if include_pending || handle.is_finished() {
                    Some(identity.clone())
                } else {
                    None
                }
            })
            .collect::<Vec<_>>();
        for identity in finished {
            let Some(handle) = self.active.remove(&identity) else {
                continue;
            };
            match handle.await {
                Ok(Ok(())) => {
                    report.completed_events = report.completed_events.saturating_add(1);
                }
                Ok(Err(error)) => {
                    report.failed_events = report.failed_events.saturating_add(1);
                    tracing::warn!(
                        channel_identity = %identity,
                        error = %format!("{error:#}"),
                        "inbound event handling failed"
                    );
                }
                Err(error) => {
                    report.failed_events = report.failed_events.saturating_add(1);
                    tracing::warn!(
                        channel_identity = %identity,
                        error = %error,
                        "inbound event task join failed"
                    );
                }
            }
        }
    }

    /// Waits out every queued and running event. Used by one-shot mode.
    async fn drain_all_pending(&mut self, report: &mut PollCycleReport) {
        while !self.active.is_empty() || !self.pending.is_empty() {
            self.drain_finished_runs(report, true).await;
            self.launch_ready_events();
        }
    }
}

/// Maps one Telegram update onto an engine event. Updates without a
/// usable text or callback payload yield `None`.
pub fn inbound_event_from_update(update: TelegramUpdate) -> Option<InboundEvent> {
    if let Some(callback) = update.callback_query {
        let payload = callback.data?;
        let channel_identity = callback
            .message
            .as_ref()
            .map(|message| message.chat.id.to_string())?;
        let sender_display_name = callback
            .from
            .map(|user| user.display_name())
            .unwrap_or_else(|| "unknown".to_string());
        return Some(InboundEvent::CallbackPress {
            channel_identity,
            sender_display_name,
            callback_id: callback.id,
            payload,
        });
    }

    let message = update.message?;
    let text = message.text?;
    let sender_display_name = message
        .from
        .map(|user| user.display_name())
        .unwrap_or_else(|| "unknown".to_string());
    Some(InboundEvent::Text {
        channel_identity: message.chat.id.to_string(),
        sender_display_name,
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::sync::Mutex;

    use crate::bot_api_client::TelegramBotClientConfig;

    #[derive(Default)]
    struct RecordingHandler {
        events: Mutex<Vec<InboundEvent>>,
        fail_identities: Vec<String>,
    }

    #[async_trait]
    impl InboundHandler for RecordingHandler {
        async fn handle_event(&self, event: InboundEvent) -> Result<()> {
            // Yield so concurrently launched tasks interleave.
            tokio::time::sleep(Duration::from_millis(5)).await;
            let identity = event.channel_identity().to_string();
            self.events.lock().unwrap().push(event);
            if self.fail_identities.contains(&identity) {
                anyhow::bail!("scripted handler failure for {identity}");
            }
            Ok(())
        }
    }

    fn client_for(server: &MockServer) -> TelegramBotClient {
        TelegramBotClient::new(TelegramBotClientConfig {
            api_base: server.base_url(),
            bot_token: "test-token".to_string(),
            request_timeout_ms: 3_000,
            retry_max_attempts: 1,
            retry_base_delay_ms: 1,
        })
        .expect("client")
    }

    fn update_from_json(value: serde_json::Value) -> TelegramUpdate {
        serde_json::from_value(value).expect("update")
    }

    #[test]
    fn unit_inbound_event_from_update_maps_messages_and_callbacks() {
        let text = inbound_event_from_update(update_from_json(json!({
            "update_id": 1,
            "message": {
                "chat": {"id": 100500},
                "from": {"first_name": "Ivan", "last_name": "Petrov"},
                "text": "/start"
            }
        })));
        assert_eq!(
            text,
            Some(InboundEvent::Text {
                channel_identity: "100500".to_string(),
                sender_display_name: "Ivan Petrov".to_string(),
                text: "/start".to_string(),
            })
        );

        let press = inbound_event_from_update(update_from_json(json!({
            "update_id": 2,
            "callback_query": {
                "id": "cb-9",
                "from": {"username": "ivanp"},
                "message": {"chat": {"id": 100500}},
                "data": "menu:days"
            }
        })));
        assert_eq!(
            press,
            Some(InboundEvent::CallbackPress {
                channel_identity: "100500".to_string(),
                sender_display_name: "@ivanp".to_string(),
                callback_id: "cb-9".to_string(),
                payload: "menu:days".to_string(),
            })
        );
    }

    #[test]
    fn unit_inbound_event_from_update_skips_unusable_updates() {
        // Photo-only message: no text.
        assert!(inbound_event_from_update(update_from_json(json!({
            "update_id": 1,
            "message": {"chat": {"id": 1}}
        })))
        .is_none());
        // Callback without payload data.
        assert!(inbound_event_from_update(update_from_json(json!({
            "update_id": 2,
            "callback_query": {"id": "cb-1", "message": {"chat": {"id": 1}}}
        })))
        .is_none());
        // Callback from an inline-mode message with no chat attached.
        assert!(inbound_event_from_update(update_from_json(json!({
            "update_id": 3,
            "callback_query": {"id": "cb-2", "data": "menu:days"}
        })))
        .is_none());
        // Unknown update kind.
        assert!(inbound_event_from_update(update_from_json(json!({
            "update_id": 4
        })))
        .is_none());
    }

    #[tokio::test]
    async fn functional_poll_cycle_advances_offset_past_seen_updates() {
        let server = MockServer::start();
        let mut first = server.mock(|when, then| {
            when.method(POST).path("/bottest-token/getUpdates");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    r#"{"ok":true,"result":[
                        {"update_id":7,"message":{"chat":{"id":1},"text":"hello"}},
                        {"update_id":8,"message":{"chat":{"id":2},"text":"hi"}}
                    ]}"#,
                );
        });

        let handler = Arc::new(RecordingHandler::default());
        let mut runtime = TelegramPollRuntime::new(TelegramPollRuntimeConfig {
            client: client_for(&server),
            handler: handler.clone(),
            poll_interval: Duration::from_millis(10),
            poll_once: true,
        });

        let mut report = runtime.poll_cycle().await.expect("first cycle");
        assert_eq!(report.discovered_updates, 2);
        assert_eq!(report.queued_events, 2);
        assert_eq!(runtime.next_offset, Some(9));
        runtime.drain_all_pending(&mut report).await;
        assert_eq!(report.completed_events, 2);
        first.delete();

        let confirmed = server.mock(|when, then| {
            when.method(POST)
                .path("/bottest-token/getUpdates")
                .json_body_includes(json!({"offset": 9}).to_string());
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"ok":true,"result":[]}"#);
        });
        let second = runtime.poll_cycle().await.expect("second cycle");
        assert_eq!(second.discovered_updates, 0);
        confirmed.assert_calls(1);
    }

    #[tokio::test]
    async fn functional_events_for_one_chat_run_in_order() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/bottest-token/getUpdates");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    r#"{"ok":true,"result":[
                        {"update_id":1,"message":{"chat":{"id":5},"text":"first"}},
                        {"update_id":2,"message":{"chat":{"id":5},"text":"second"}},
                        {"update_id":3,"message":{"chat":{"id":5},"text":"third"}},
                        {"update_id":4,"callback_query":{"id":"cb-x","data":"noise"}}
                    ]}"#,
                );
        });

        let handler = Arc::new(RecordingHandler::default());
        let mut runtime = TelegramPollRuntime::new(TelegramPollRuntimeConfig {
            client: client_for(&server),
            handler: handler.clone(),
            poll_interval: Duration::from_millis(10),
            poll_once: true,
        });

        let mut report = runtime.poll_cycle().await.expect("cycle");
        assert_eq!(report.skipped_updates, 1);
        runtime.drain_all_pending(&mut report).await;
        assert_eq!(report.completed_events, 3);
        assert_eq!(report.failed_events, 0);

        let texts = handler
            .events
            .lock()
            .unwrap()
            .iter()
            .map(|event| match event {
                InboundEvent::Text { text, .. } => text.clone(),
                other => panic!("unexpected event: {other:?}"),
            })
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn functional_handler_failures_are_counted_not_fatal() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/bottest-token/getUpdates");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    r#"{"ok":true,"result":[
                        {"update_id":1,"message":{"chat":{"id":5},"text":"boom"}},
                        {"update_id":2,"message":{"chat":{"id":6},"text":"fine"}}
                    ]}"#,
                );
        });

        let handler = Arc::new(RecordingHandler {
            events: Mutex::new(Vec::new()),
            fail_identities: vec!["5".to_string()],
        });
        let mut runtime = TelegramPollRuntime::new(TelegramPollRuntimeConfig {
            client: client_for(&server),
            handler: handler.clone(),
            poll_interval: Duration::from_millis(10),
            poll_once: true,
        });

        let mut report = runtime.poll_cycle().await.expect("cycle");
        runtime.drain_all_pending(&mut report).await;
        assert_eq!(report.completed_events, 1);
        assert_eq!(report.failed_events, 1);
        assert_eq!(handler.events.lock().unwrap().len(), 2);
    }
}
