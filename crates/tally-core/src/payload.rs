//! Opaque callback payload codec for inline button affordances.
//!
//! The engine owns this encoding; the transport only carries the strings.
//! Format is `kind` followed by colon-separated arguments, e.g.
//! `correct:42:19787` or `select:chat-900:42`. Decoding is a closed tagged
//! union and rejects malformed input instead of guessing.

use thiserror::Error;

use crate::entities::DisputeTopic;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
/// Enumerates supported `PayloadError` values.
pub enum PayloadError {
    #[error("empty payload")]
    Empty,
    #[error("unknown payload kind '{0}'")]
    UnknownKind(String),
    #[error("payload '{0}' has a wrong argument count")]
    WrongArity(String),
    #[error("payload argument '{0}' is not a valid number")]
    InvalidNumber(String),
    #[error("payload argument '{0}' is not a known variant")]
    InvalidVariant(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `MenuAction` values.
pub enum MenuAction {
    Days,
    Week,
    Month,
    History,
    Feedback,
}

impl MenuAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MenuAction::Days => "days",
            MenuAction::Week => "week",
            MenuAction::Month => "month",
            MenuAction::History => "history",
            MenuAction::Feedback => "feedback",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "days" => Some(MenuAction::Days),
            "week" => Some(MenuAction::Week),
            "month" => Some(MenuAction::Month),
            "history" => Some(MenuAction::History),
            "feedback" => Some(MenuAction::Feedback),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates supported `CallbackPayload` values.
pub enum CallbackPayload {
    Correct { worker_id: i64, epoch_day: i64 },
    Incorrect { worker_id: i64, epoch_day: i64 },
    Select { channel_identity: String, worker_id: i64 },
    Feedback { topic: DisputeTopic },
    LogoutRequest { worker_id: i64 },
    Month { month: u32, year: i32 },
    Menu { action: MenuAction },
    MoreResults,
}

impl CallbackPayload {
    pub fn encode(&self) -> String {
        match self {
            CallbackPayload::Correct {
                worker_id,
                epoch_day,
            } => format!("correct:{worker_id}:{epoch_day}"),
            CallbackPayload::Incorrect {
                worker_id,
                epoch_day,
            } => format!("incorrect:{worker_id}:{epoch_day}"),
            CallbackPayload::Select {
                channel_identity,
                worker_id,
            } => format!("select:{channel_identity}:{worker_id}"),
            CallbackPayload::Feedback { topic } => format!("feedback:{}", topic.as_str()),
            CallbackPayload::LogoutRequest { worker_id } => {
                format!("logout_request:{worker_id}")
            }
            CallbackPayload::Month { month, year } => format!("month:{month}:{year}"),
            CallbackPayload::Menu { action } => format!("menu:{}", action.as_str()),
            CallbackPayload::MoreResults => "more_results".to_string(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, PayloadError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PayloadError::Empty);
        }
        let parts = trimmed.split(':').collect::<Vec<_>>();
        let kind = parts[0];
        let args = &parts[1..];
        match kind {
            "correct" | "incorrect" => {
                let [worker_raw, day_raw] = args else {
                    return Err(PayloadError::WrongArity(trimmed.to_string()));
                };
                let worker_id = parse_i64(worker_raw)?;
                let epoch_day = parse_i64(day_raw)?;
                if kind == "correct" {
                    Ok(CallbackPayload::Correct {
                        worker_id,
                        epoch_day,
                    })
                } else {
                    Ok(CallbackPayload::Incorrect {
                        worker_id,
                        epoch_day,
                    })
                }
            }
            "select" => {
                let [channel_raw, worker_raw] = args else {
                    return Err(PayloadError::WrongArity(trimmed.to_string()));
                };
                if channel_raw.is_empty() {
                    return Err(PayloadError::WrongArity(trimmed.to_string()));
                }
                Ok(CallbackPayload::Select {
                    channel_identity: (*channel_raw).to_string(),
                    worker_id: parse_i64(worker_raw)?,
                })
            }
            "feedback" => {
                let [topic_raw] = args else {
                    return Err(PayloadError::WrongArity(trimmed.to_string()));
                };
                let topic = DisputeTopic::parse(topic_raw)
                    .ok_or_else(|| PayloadError::InvalidVariant((*topic_raw).to_string()))?;
                Ok(CallbackPayload::Feedback { topic })
            }
            "logout_request" => {
                let [worker_raw] = args else {
                    return Err(PayloadError::WrongArity(trimmed.to_string()));
                };
                Ok(CallbackPayload::LogoutRequest {
                    worker_id: parse_i64(worker_raw)?,
                })
            }
            "month" => {
                let [month_raw, year_raw] = args else {
                    return Err(PayloadError::WrongArity(trimmed.to_string()));
                };
                let month = month_raw
                    .parse::<u32>()
                    .map_err(|_| PayloadError::InvalidNumber((*month_raw).to_string()))?;
                let year = year_raw
                    .parse::<i32>()
                    .map_err(|_| PayloadError::InvalidNumber((*year_raw).to_string()))?;
                Ok(CallbackPayload::Month { month, year })
            }
            "menu" => {
                let [action_raw] = args else {
                    return Err(PayloadError::WrongArity(trimmed.to_string()));
                };
                let action = MenuAction::parse(action_raw)
                    .ok_or_else(|| PayloadError::InvalidVariant((*action_raw).to_string()))?;
                Ok(CallbackPayload::Menu { action })
            }
            "more_results" => {
                if args.is_empty() {
                    Ok(CallbackPayload::MoreResults)
                } else {
                    Err(PayloadError::WrongArity(trimmed.to_string()))
                }
            }
            other => Err(PayloadError::UnknownKind(other.to_string())),
        }
    }
}

fn parse_i64(raw: &str) -> Result<i64, PayloadError> {
    raw.parse::<i64>()
        .map_err(|_| PayloadError::InvalidNumber(raw.to_string()))
}
