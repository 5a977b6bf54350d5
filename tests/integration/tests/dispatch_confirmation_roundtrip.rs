use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use tally_admin::{build_admin_router, AdminState};
use tally_core::{DisputeKind, EngineError, ImportRow};
use tally_engine::{
    EngineConfig, HoursEngine, InboundEvent, InboundHandler, OutboundMessage, RecordStore,
    Transport,
};
use tally_store::SqliteHoursStore;

static WORKSPACE_COUNTER: AtomicU64 = AtomicU64::new(1);

const WORKER_CHAT: &str = "chat-900";
const ADMIN_CHANNEL: &str = "admin-chat";

/// Records every outbound message and callback acknowledgement so the
/// scenarios can follow the conversation from the worker's side.
#[derive(Default)]
struct ScriptedTransport {
    sent: Mutex<Vec<(String, OutboundMessage)>>,
    acks: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedTransport {
    fn messages_to(&self, channel_identity: &str) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .expect("transport send log")
            .iter()
            .filter(|(identity, _)| identity == channel_identity)
            .map(|(_, message)| message.clone())
            .collect()
    }

    fn texts_to(&self, channel_identity: &str) -> Vec<String> {
        self.messages_to(channel_identity)
            .into_iter()
            .map(|message| message.text)
            .collect()
    }

    fn ack_notices(&self) -> Vec<Option<String>> {
        self.acks
            .lock()
            .expect("transport ack log")
            .iter()
            .map(|(_, notice)| notice.clone())
            .collect()
    }

    fn button_payload(&self, channel_identity: &str, label_prefix: &str) -> String {
        let messages = self.messages_to(channel_identity);
        messages
            .iter()
            .rev()
            .flat_map(|message| message.buttons.iter().flatten())
            .find(|button| button.label.starts_with(label_prefix))
            .map(|button| button.payload.clone())
            .unwrap_or_else(|| panic!("missing button labeled '{label_prefix}'"))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send_message(
        &self,
        channel_identity: &str,
        message: &OutboundMessage,
    ) -> Result<(), EngineError> {
        self.sent
            .lock()
            .expect("transport send log")
            .push((channel_identity.to_string(), message.clone()));
        Ok(())
    }

    async fn acknowledge_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), EngineError> {
        self.acks
            .lock()
            .expect("transport ack log")
            .push((callback_id.to_string(), text.map(str::to_string)));
        Ok(())
    }
}

struct IsolatedWorkspace {
    root: PathBuf,
}

impl IsolatedWorkspace {
    fn new(label: &str) -> Self {
        let tick = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let count = WORKSPACE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let root = std::env::temp_dir().join(format!(
            "tally-{label}-{}-{tick}-{count}",
            std::process::id()
        ));
        fs::create_dir_all(&root).expect("must create isolated workspace root");
        Self { root }
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for IsolatedWorkspace {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

fn harness(
    workspace: &IsolatedWorkspace,
) -> (
    Arc<SqliteHoursStore>,
    Arc<ScriptedTransport>,
    Arc<HoursEngine>,
) {
    let store = Arc::new(
        SqliteHoursStore::open(workspace.root().join("hours.sqlite3"))
            .expect("store opens inside the isolated workspace"),
    );
    let transport = Arc::new(ScriptedTransport::default());
    let engine = Arc::new(HoursEngine::new(
        store.clone(),
        transport.clone(),
        EngineConfig {
            admin_channel_identity: Some(ADMIN_CHANNEL.to_string()),
            ..EngineConfig::default()
        },
    ));
    (store, transport, engine)
}

fn import_row(worker_id: i64, name: &str, hours: f64, label: &str) -> ImportRow {
    ImportRow {
        worker_id,
        name: name.to_string(),
        position: "Fitter".to_string(),
        hours,
        activity_code: "A1".to_string(),
        activity_description: label.to_string(),
        cost_center: "CC-4".to_string(),
        description: String::new(),
    }
}

fn text_event(channel_identity: &str, text: &str) -> InboundEvent {
    InboundEvent::Text {
        channel_identity: channel_identity.to_string(),
        sender_display_name: "ivan_p".to_string(),
        text: text.to_string(),
    }
}

fn press_event(channel_identity: &str, callback_id: &str, payload: &str) -> InboundEvent {
    InboundEvent::CallbackPress {
        channel_identity: channel_identity.to_string(),
        sender_display_name: "ivan_p".to_string(),
        callback_id: callback_id.to_string(),
        payload: payload.to_string(),
    }
}

#[tokio::test]
async fn integration_link_command_delivers_pending_day_and_menu() {
    let workspace = IsolatedWorkspace::new("link-roundtrip");
    let (store, transport, engine) = harness(&workspace);
    let today = engine.local_today();
    store
        .replace_day(
            today,
            "payroll-export",
            &[import_row(101, "Ivan Petrov", 8.0, "Assembly")],
        )
        .expect("seed day");

    engine
        .handle_event(text_event(WORKER_CHAT, "/link 101"))
        .await
        .expect("link command");

    let texts = transport.texts_to(WORKER_CHAT);
    assert_eq!(texts.len(), 3, "link ack, day digest, menu: {texts:?}");
    assert!(texts[0].starts_with("✅ Link established!"));
    assert!(texts[0].contains("Ivan Petrov"));
    assert!(texts[1].contains("👷 Ivan Petrov"));
    assert!(texts[1].contains("• Assembly: 8 h"));
    assert!(texts[1].ends_with("Total: 8 h"));
    assert_eq!(texts[2], "Choose an action:");

    let records = store.records_on_date(101, today).expect("records");
    assert!(
        records.iter().all(|record| record.delivered),
        "post-link delivery marks the day as delivered"
    );
}

#[tokio::test]
async fn conformance_incorrect_press_opens_dispute_and_notifies_admin() {
    let workspace = IsolatedWorkspace::new("incorrect-press");
    let (store, transport, engine) = harness(&workspace);
    let today = engine.local_today();
    store
        .replace_day(
            today,
            "payroll-export",
            &[import_row(101, "Ivan Petrov", 8.0, "Assembly")],
        )
        .expect("seed day");
    engine.link_worker(101, WORKER_CHAT).expect("link worker");

    let report = engine.dispatch_daily(None).await.expect("daily dispatch");
    assert_eq!(report.sent, 1);

    let payload = transport.button_payload(WORKER_CHAT, "Incorrect");
    engine
        .handle_event(press_event(WORKER_CHAT, "cb-incorrect", &payload))
        .await
        .expect("incorrect press");
    assert!(transport
        .ack_notices()
        .iter()
        .any(|notice| notice.as_deref() == Some("You chose: Incorrect ❌")));
    let texts = transport.texts_to(WORKER_CHAT);
    assert_eq!(
        texts.last().map(String::as_str),
        Some("Please enter the correct number of hours:")
    );

    // Comma decimals come straight from phone keyboards.
    engine
        .handle_event(text_event(WORKER_CHAT, "7,5"))
        .await
        .expect("claimed hours reply");

    let disputes = store.list_disputes_page(1, 10).expect("disputes page");
    assert_eq!(disputes.total, 1);
    let entry = &disputes.items[0];
    assert_eq!(entry.worker_name, "Ivan Petrov");
    assert_eq!(entry.dispute.kind, DisputeKind::IncorrectHours);
    assert!(entry.dispute.record_id.is_some());
    assert!(entry.dispute.message.contains("7.5"));

    let admin_texts = transport.texts_to(ADMIN_CHANNEL);
    assert_eq!(admin_texts.len(), 1);
    assert!(admin_texts[0].contains("Ivan Petrov"));
    assert!(admin_texts[0].contains("7.5"));

    let texts = transport.texts_to(WORKER_CHAT);
    assert!(texts
        .iter()
        .any(|text| text.starts_with("Your request has been sent to the administrators")));
}

#[tokio::test]
async fn conformance_correct_press_confirms_without_dispute() {
    let workspace = IsolatedWorkspace::new("correct-press");
    let (store, transport, engine) = harness(&workspace);
    let today = engine.local_today();
    store
        .replace_day(
            today,
            "payroll-export",
            &[import_row(101, "Ivan Petrov", 8.0, "Assembly")],
        )
        .expect("seed day");
    engine.link_worker(101, WORKER_CHAT).expect("link worker");
    engine.dispatch_daily(None).await.expect("daily dispatch");

    let payload = transport.button_payload(WORKER_CHAT, "Correct");
    engine
        .handle_event(press_event(WORKER_CHAT, "cb-correct", &payload))
        .await
        .expect("correct press");

    assert!(transport
        .ack_notices()
        .iter()
        .any(|notice| notice.as_deref() == Some("You chose: Correct ✅")));
    let texts = transport.texts_to(WORKER_CHAT);
    assert_eq!(
        texts.last().map(String::as_str),
        Some("Thank you, you confirmed the recorded hours.")
    );
    assert_eq!(store.list_disputes_page(1, 10).expect("disputes").total, 0);
    assert!(transport.texts_to(ADMIN_CHANNEL).is_empty());
}

#[tokio::test]
async fn regression_confirmation_pressed_from_foreign_chat_is_rejected() {
    let workspace = IsolatedWorkspace::new("foreign-press");
    let (store, transport, engine) = harness(&workspace);
    let today = engine.local_today();
    store
        .replace_day(
            today,
            "payroll-export",
            &[
                import_row(101, "Ivan Petrov", 8.0, "Assembly"),
                import_row(202, "Pavel Sidorov", 8.0, "Welding"),
            ],
        )
        .expect("seed day");
    engine.link_worker(101, WORKER_CHAT).expect("link ivan");
    engine.link_worker(202, "chat-777").expect("link pavel");
    engine.dispatch_daily(None).await.expect("daily dispatch");

    // Pavel presses the button from Ivan's digest.
    let payload = transport.button_payload(WORKER_CHAT, "Correct");
    engine
        .handle_event(press_event("chat-777", "cb-foreign", &payload))
        .await
        .expect("foreign press");

    let texts = transport.texts_to("chat-777");
    assert_eq!(
        texts.last().map(String::as_str),
        Some("This button is not for you.")
    );
    assert!(!texts
        .iter()
        .any(|text| text.starts_with("Thank you, you confirmed")));
    assert_eq!(store.list_disputes_page(1, 10).expect("disputes").total, 0);
}

#[tokio::test]
async fn functional_admin_correction_over_http_redelivers_banner() {
    let workspace = IsolatedWorkspace::new("http-correction");
    let (store, transport, engine) = harness(&workspace);
    let today = engine.local_today();
    store
        .replace_day(
            today,
            "payroll-export",
            &[import_row(101, "Ivan Petrov", 8.0, "Assembly")],
        )
        .expect("seed day");
    engine.link_worker(101, WORKER_CHAT).expect("link worker");
    let record_id = store.records_on_date(101, today).expect("records")[0].id;

    let state = AdminState {
        engine: engine.clone(),
        store: store.clone(),
    };
    let app = build_admin_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind admin listener");
    let addr = listener.local_addr().expect("local addr");
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    tokio::time::sleep(Duration::from_millis(25)).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/admin/correction"))
        .json(&serde_json::json!({
            "worker_id": 101,
            "record_id": record_id,
            "hours": 9.0,
            "message": "Recalculated by payroll"
        }))
        .send()
        .await
        .expect("correction request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let updated = store
        .record_by_id(record_id)
        .expect("record lookup")
        .expect("record exists");
    assert_eq!(updated.hours, 9.0);

    let texts = transport.texts_to(WORKER_CHAT);
    let banner = texts.last().expect("redelivered digest");
    assert!(banner.starts_with("⚠️ Recalculated by payroll"));
    assert!(banner.ends_with("Total: 9 h"));

    server.abort();
}
