//! Message rendering for digests, menus, and admin notices.

use chrono::{Datelike, NaiveDate};

use tally_core::{
    epoch_day, AggregationResult, CallbackPayload, DisputeTopic, HoursRecord, MenuAction, Window,
    Worker,
};

use crate::hours_engine::search_helpers::SEARCH_PRESENTED_RESULTS;
use crate::transport::{InlineButton, OutboundMessage};

/// How many months the history picker offers, newest first.
pub const HISTORY_MONTHS: usize = 12;

pub const PROMPT_ENTER_HOURS: &str = "Please enter the correct number of hours:";
pub const PROMPT_HOURS_PARSE_RETRY: &str = "Please enter the number of hours, for example 7.5.";
pub const PROMPT_FEEDBACK_GENERAL: &str =
    "Please describe your question or issue in one message:";
pub const PROMPT_FEEDBACK_HOURS: &str =
    "Please describe the mistake in your recorded hours in one message:";
pub const RECORD_NOT_LOCATED: &str = "The hours record for that date could not be found.";
pub const RECORD_GONE_RESTART: &str =
    "That hours record no longer exists. Please start over from the daily message.";
pub const DISPUTE_ACK: &str = "Your request has been sent to the administrators. Thank you!";
pub const FEEDBACK_ACK: &str =
    "✅ Your message has been sent to the administrators. Thank you!";
pub const NOT_LINKED_HINT: &str = "Your account is not linked yet. Send /start to begin.";
pub const UNLINK_REQUEST_SENT: &str =
    "Your unlink request has been sent to the administrators. Please wait for a response.";
pub const FORCED_UNLINK_NOTICE: &str =
    "Your account link was removed by an administrator. Send /start to link again.";
pub const CONFIRM_THANKS: &str = "Thank you, you confirmed the recorded hours.";
pub const NO_SEARCH_MATCHES: &str =
    "No matching workers found. Try a different spelling or send /link <worker id>.";
pub const MORE_RESULTS_TIP: &str = "Refine your search to narrow down the list.";
pub const BUTTON_NOT_YOURS: &str = "This button is not for you.";
pub const LINK_USAGE: &str = "Usage: /link <worker id>";
pub const PERIOD_UNAVAILABLE: &str = "That period is not available.";

/// Formats an hour value without trailing zeros, `7.5` not `7.50`.
pub fn format_hours(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        let rendered = format!("{value:.2}");
        rendered
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

fn record_label(record: &HoursRecord) -> &str {
    if !record.description.is_empty() {
        &record.description
    } else if !record.activity_description.is_empty() {
        &record.activity_description
    } else if !record.activity_code.is_empty() {
        &record.activity_code
    } else {
        "Recorded hours"
    }
}

/// Confirm/dispute affordances for one worker-day.
pub fn confirm_keyboard(worker_id: i64, date: NaiveDate) -> Vec<Vec<InlineButton>> {
    let day = epoch_day(date);
    vec![vec![
        InlineButton::new(
            "Correct ✅",
            CallbackPayload::Correct {
                worker_id,
                epoch_day: day,
            }
            .encode(),
        ),
        InlineButton::new(
            "Incorrect ❌",
            CallbackPayload::Incorrect {
                worker_id,
                epoch_day: day,
            }
            .encode(),
        ),
    ]]
}

/// One day's records with the confirm/dispute keyboard attached.
///
/// `annotation` prefixes a warning banner; `override_total` replaces
/// the displayed total without touching the per-record lines.
pub fn daily_digest(
    worker: &Worker,
    date: NaiveDate,
    records: &[HoursRecord],
    annotation: Option<&str>,
    override_total: Option<f64>,
) -> OutboundMessage {
    let mut text = String::new();
    if let Some(annotation) = annotation {
        text.push_str("⚠️ ");
        text.push_str(annotation);
        text.push_str("\n\n");
    }
    text.push_str(&format!(
        "👷 {}\n💼 {}\n📅 {}\n\n",
        worker.name, worker.position, date
    ));
    for record in records {
        text.push_str(&format!(
            "• {}: {} h\n",
            record_label(record),
            format_hours(record.hours)
        ));
    }
    let total: f64 = records.iter().map(|record| record.hours).sum();
    let displayed = match override_total {
        Some(value) => format_hours(value),
        None => (total.round() as i64).to_string(),
    };
    text.push_str(&format!("\nTotal: {displayed} h"));
    OutboundMessage::with_buttons(text, confirm_keyboard(worker.id, date))
}

/// A window's records grouped by day, plain text, no affordances.
pub fn window_digest(
    worker: &Worker,
    result: &AggregationResult,
    window: &Window,
) -> OutboundMessage {
    let mut text = format!(
        "👷 {}\n💼 {}\n📊 {} ({} to {})\n",
        worker.name,
        worker.position,
        window.describe(),
        result.start,
        result.end
    );
    let mut current_date: Option<NaiveDate> = None;
    for record in &result.records {
        if current_date != Some(record.date) {
            text.push_str(&format!("\n📅 {}\n", record.date));
            current_date = Some(record.date);
        }
        text.push_str(&format!(
            "• {}: {} h\n",
            record_label(record),
            format_hours(record.hours)
        ));
    }
    text.push_str(&format!("\nTotal: {} h", result.rounded_total()));
    OutboundMessage::text(text)
}

pub fn menu_message(rolling_days: u32) -> OutboundMessage {
    let buttons = vec![
        vec![
            InlineButton::new(
                format!("📊 Last {rolling_days} days"),
                CallbackPayload::Menu {
                    action: MenuAction::Days,
                }
                .encode(),
            ),
            InlineButton::new(
                "🗓 Current week",
                CallbackPayload::Menu {
                    action: MenuAction::Week,
                }
                .encode(),
            ),
        ],
        vec![
            InlineButton::new(
                "📅 Current month",
                CallbackPayload::Menu {
                    action: MenuAction::Month,
                }
                .encode(),
            ),
            InlineButton::new(
                "🗂 History",
                CallbackPayload::Menu {
                    action: MenuAction::History,
                }
                .encode(),
            ),
        ],
        vec![InlineButton::new(
            "✉️ Feedback",
            CallbackPayload::Menu {
                action: MenuAction::Feedback,
            }
            .encode(),
        )],
    ];
    OutboundMessage::with_buttons("Choose an action:", buttons)
}

pub fn feedback_menu() -> OutboundMessage {
    let buttons = vec![
        vec![InlineButton::new(
            "✉️ General question",
            CallbackPayload::Feedback {
                topic: DisputeTopic::General,
            }
            .encode(),
        )],
        vec![InlineButton::new(
            "⚠️ Mistake in my hours",
            CallbackPayload::Feedback {
                topic: DisputeTopic::HoursMistake,
            }
            .encode(),
        )],
    ];
    OutboundMessage::with_buttons("What would you like to report?", buttons)
}

fn previous_month(month: u32, year: i32) -> (u32, i32) {
    if month == 1 {
        (12, year - 1)
    } else {
        (month - 1, year)
    }
}

/// Month picker covering the last [`HISTORY_MONTHS`] months.
pub fn month_history_message(today: NaiveDate) -> OutboundMessage {
    let mut buttons: Vec<Vec<InlineButton>> = Vec::new();
    let mut row: Vec<InlineButton> = Vec::new();
    let (mut month, mut year) = (today.month(), today.year());
    for _ in 0..HISTORY_MONTHS {
        row.push(InlineButton::new(
            format!("{month:02}.{year}"),
            CallbackPayload::Month { month, year }.encode(),
        ));
        if row.len() == 3 {
            buttons.push(std::mem::take(&mut row));
        }
        (month, year) = previous_month(month, year);
    }
    if !row.is_empty() {
        buttons.push(row);
    }
    OutboundMessage::with_buttons("Choose a month:", buttons)
}

/// Select buttons for ranked search results, capped for presentation.
pub fn search_results(channel_identity: &str, ranked: &[Worker]) -> OutboundMessage {
    let mut buttons: Vec<Vec<InlineButton>> = ranked
        .iter()
        .take(SEARCH_PRESENTED_RESULTS)
        .map(|worker| {
            vec![InlineButton::new(
                format!("{} ({})", worker.name, worker.position),
                CallbackPayload::Select {
                    channel_identity: channel_identity.to_string(),
                    worker_id: worker.id,
                }
                .encode(),
            )]
        })
        .collect();
    if ranked.len() > SEARCH_PRESENTED_RESULTS {
        let remaining = ranked.len() - SEARCH_PRESENTED_RESULTS;
        buttons.push(vec![InlineButton::new(
            format!("{remaining} more matches"),
            CallbackPayload::MoreResults.encode(),
        )]);
    }
    OutboundMessage::with_buttons("Select yourself from the list:", buttons)
}

pub fn start_instructions() -> OutboundMessage {
    OutboundMessage::text(
        "Hello! I report your recorded working hours.\n\
         Send /link <worker id> to link your account, or type your name to find yourself.",
    )
}

pub fn linked_idle_hint(worker: &Worker) -> OutboundMessage {
    OutboundMessage::text(format!(
        "You are linked as {}. Send /menu to choose an action.",
        worker.name
    ))
}

pub fn link_success(worker: &Worker) -> OutboundMessage {
    OutboundMessage::text(format!(
        "✅ Link established!\n👷 {}\n💼 {}",
        worker.name, worker.position
    ))
}

/// Shown when the sender's identity already maps to another worker;
/// carries the explicit unlink-request affordance.
pub fn already_linked_other(existing_name: &str, existing_worker_id: i64) -> OutboundMessage {
    OutboundMessage::with_buttons(
        format!(
            "This account is already linked to {existing_name}. \
             Ask an administrator to unlink it first."
        ),
        vec![vec![InlineButton::new(
            "Send unlink request",
            CallbackPayload::LogoutRequest {
                worker_id: existing_worker_id,
            }
            .encode(),
        )]],
    )
}

pub fn target_already_linked(worker_name: &str) -> OutboundMessage {
    OutboundMessage::text(format!(
        "{worker_name} is already linked to another account. \
         Contact an administrator if this is you."
    ))
}

pub fn worker_id_not_found(worker_id: i64) -> OutboundMessage {
    OutboundMessage::text(format!("Worker id {worker_id} was not found."))
}

pub fn no_data_message(window: &Window) -> OutboundMessage {
    OutboundMessage::text(format!("No recorded hours for {}.", window.describe()))
}

pub fn admin_hours_dispute_notice(
    worker_name: &str,
    record: &HoursRecord,
    claimed_hours: f64,
) -> String {
    format!(
        "⚠️ Hours dispute from {worker_name}: {} has {} h recorded, worker claims {} h.",
        record.date,
        format_hours(record.hours),
        format_hours(claimed_hours)
    )
}

pub fn admin_feedback_notice(worker_name: &str, topic: DisputeTopic, text: &str) -> String {
    match topic {
        DisputeTopic::General => format!("📨 Message from {worker_name}: {text}"),
        DisputeTopic::HoursMistake => format!("⚠️ Hours complaint from {worker_name}: {text}"),
    }
}

pub fn admin_unlink_request_notice(worker_name: &str, channel_identity: &str) -> String {
    format!("🔓 Unlink request from {worker_name} (channel identity {channel_identity}).")
}
