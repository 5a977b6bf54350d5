//! Persistent entities and the transient aggregation view.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Public struct `Worker` used across Tally components.
pub struct Worker {
    pub id: i64,
    pub name: String,
    pub position: String,
    pub channel_identity: Option<String>,
    pub linked: bool,
}

impl Worker {
    /// True when the worker is linked to the given channel identity.
    pub fn is_linked_to(&self, channel_identity: &str) -> bool {
        self.linked && self.channel_identity.as_deref() == Some(channel_identity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Public struct `HoursRecord` used across Tally components.
pub struct HoursRecord {
    pub id: i64,
    pub worker_id: i64,
    pub date: NaiveDate,
    pub hours: f64,
    pub activity_code: String,
    pub activity_description: String,
    pub cost_center: String,
    pub description: String,
    pub delivered: bool,
    pub delivered_at_unix_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `DisputeKind` values.
pub enum DisputeKind {
    IncorrectHours,
    GeneralOrUnlink,
}

impl DisputeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeKind::IncorrectHours => "incorrect_hours",
            DisputeKind::GeneralOrUnlink => "general_or_unlink",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "incorrect_hours" => Some(DisputeKind::IncorrectHours),
            "general_or_unlink" => Some(DisputeKind::GeneralOrUnlink),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Sub-choice offered by the "report a problem" menu; maps onto
/// [`DisputeKind`] when the dispute is written.
pub enum DisputeTopic {
    General,
    HoursMistake,
}

impl DisputeTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeTopic::General => "general",
            DisputeTopic::HoursMistake => "hours_mistake",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "general" => Some(DisputeTopic::General),
            "hours_mistake" => Some(DisputeTopic::HoursMistake),
            _ => None,
        }
    }

    pub fn dispute_kind(&self) -> DisputeKind {
        match self {
            DisputeTopic::General => DisputeKind::GeneralOrUnlink,
            DisputeTopic::HoursMistake => DisputeKind::IncorrectHours,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Public struct `Dispute` used across Tally components.
pub struct Dispute {
    pub id: i64,
    pub worker_id: i64,
    pub record_id: Option<i64>,
    pub kind: DisputeKind,
    pub message: String,
    pub channel_identity: String,
    pub admin_notified: bool,
    pub created_unix_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// One logged ingestion run.
pub struct ImportBatch {
    pub id: i64,
    pub source: String,
    pub record_count: usize,
    pub target_date: NaiveDate,
    pub created_unix_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Normalized ingestion tuple produced by the upstream import
/// pipeline. The day it belongs to is carried by the batch, not by
/// the row.
pub struct ImportRow {
    pub worker_id: i64,
    pub name: String,
    pub position: String,
    pub hours: f64,
    #[serde(default)]
    pub activity_code: String,
    #[serde(default)]
    pub activity_description: String,
    #[serde(default)]
    pub cost_center: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
/// Transient view over one worker's records in a resolved window. Never
/// persisted; produced fresh on every request.
pub struct AggregationResult {
    pub records: Vec<HoursRecord>,
    pub total_hours: f64,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl AggregationResult {
    /// Display total, rounded half away from zero. Stored per-record values
    /// are never rounded.
    pub fn rounded_total(&self) -> i64 {
        self.total_hours.round() as i64
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_rounded_total_is_half_away_from_zero() {
        let base = AggregationResult {
            records: Vec::new(),
            total_hours: 6.5,
            start: NaiveDate::from_ymd_opt(2024, 3, 1).expect("date"),
            end: NaiveDate::from_ymd_opt(2024, 3, 5).expect("date"),
        };
        assert_eq!(base.rounded_total(), 7);
        let negative = AggregationResult {
            total_hours: -6.5,
            ..base.clone()
        };
        assert_eq!(negative.rounded_total(), -7);
        let below_half = AggregationResult {
            total_hours: 39.4,
            ..base
        };
        assert_eq!(below_half.rounded_total(), 39);
    }

    #[test]
    fn unit_dispute_topic_maps_to_dispute_kind() {
        assert_eq!(
            DisputeTopic::General.dispute_kind(),
            DisputeKind::GeneralOrUnlink
        );
        assert_eq!(
            DisputeTopic::HoursMistake.dispute_kind(),
            DisputeKind::IncorrectHours
        );
        assert_eq!(DisputeTopic::parse("general"), Some(DisputeTopic::General));
        assert_eq!(
            DisputeTopic::parse("hours_mistake"),
            Some(DisputeTopic::HoursMistake)
        );
        assert_eq!(DisputeTopic::parse("other"), None);
    }

    #[test]
    fn unit_worker_link_check_requires_flag_and_identity() {
        let worker = Worker {
            id: 7,
            name: "Anna Orlova".to_string(),
            position: "Fitter".to_string(),
            channel_identity: Some("chat-1".to_string()),
            linked: true,
        };
        assert!(worker.is_linked_to("chat-1"));
        assert!(!worker.is_linked_to("chat-2"));
        let unlinked = Worker {
            linked: false,
            ..worker
        };
        assert!(!unlinked.is_linked_to("chat-1"));
    }
}
