//! Record-store seam consumed by the engine.

use chrono::NaiveDate;
use tally_core::{Dispute, DisputeKind, EngineError, HoursRecord, ImportBatch, ImportRow, Worker};

/// Payload for creating a dispute; the store assigns `id` and the
/// creation timestamp.
#[derive(Debug, Clone)]
pub struct NewDispute {
    pub worker_id: i64,
    pub record_id: Option<i64>,
    pub kind: DisputeKind,
    pub message: String,
    pub channel_identity: String,
    pub admin_notified: bool,
}

/// Public struct `LinkStats` used across Tally components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    pub total_workers: u64,
    pub linked_workers: u64,
    pub unlinked_workers: u64,
}

/// Per-worker hour totals over a date range, for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerHoursSum {
    pub worker_id: i64,
    pub name: String,
    pub position: String,
    pub total_hours: f64,
}

/// One page of a listing plus the unpaged total count.
#[derive(Debug, Clone)]
pub struct RecordPage<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

/// Hours record joined with the owning worker, for admin listings.
#[derive(Debug, Clone)]
pub struct RecordListEntry {
    pub record: HoursRecord,
    pub worker_name: String,
    pub worker_position: String,
}

/// Dispute joined with the owning worker, for admin listings.
#[derive(Debug, Clone)]
pub struct DisputeListEntry {
    pub dispute: Dispute,
    pub worker_name: String,
}

/// Storage operations the engine depends on.
///
/// Implementations must keep the `delivered` flag monotonic: marking a
/// record delivered never resets an earlier mark, and re-delivery only
/// refreshes the timestamp. Range queries return records ordered by
/// date ascending, then by record id ascending.
pub trait RecordStore: Send + Sync {
    fn worker_by_id(&self, worker_id: i64) -> Result<Option<Worker>, EngineError>;
    /// All workers currently linked to the given channel identity.
    ///
    /// The link is maintained as a bijection, so this normally yields
    /// at most one worker; drifted data with several matches is still
    /// returned in full so callers can repair it.
    fn workers_linked_to_identity(
        &self,
        channel_identity: &str,
    ) -> Result<Vec<Worker>, EngineError>;
    fn all_workers(&self) -> Result<Vec<Worker>, EngineError>;
    fn linked_workers(&self) -> Result<Vec<Worker>, EngineError>;
    /// Sets or clears the channel link of one worker.
    fn set_worker_link(
        &self,
        worker_id: i64,
        channel_identity: Option<&str>,
    ) -> Result<(), EngineError>;

    fn records_in_range(
        &self,
        worker_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<HoursRecord>, EngineError>;
    fn records_on_date(
        &self,
        worker_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<HoursRecord>, EngineError>;
    fn record_by_id(&self, record_id: i64) -> Result<Option<HoursRecord>, EngineError>;
    /// The most recently ingested record (highest id) for one worker
    /// and day, used to correlate confirmation presses.
    fn latest_record_for_day(
        &self,
        worker_id: i64,
        date: NaiveDate,
    ) -> Result<Option<HoursRecord>, EngineError>;
    fn mark_delivered(
        &self,
        record_ids: &[i64],
        delivered_at_unix_ms: u64,
    ) -> Result<(), EngineError>;
    fn update_record_hours(&self, record_id: i64, hours: f64) -> Result<(), EngineError>;
    /// Replaces every record on `target_date` with the given rows in a
    /// single transaction and appends an import batch entry.
    fn replace_day(
        &self,
        target_date: NaiveDate,
        source: &str,
        rows: &[ImportRow],
    ) -> Result<ImportBatch, EngineError>;
    fn list_records_page(
        &self,
        page: u32,
        limit: u32,
        search: Option<&str>,
    ) -> Result<RecordPage<RecordListEntry>, EngineError>;

    fn create_dispute(&self, new_dispute: NewDispute) -> Result<Dispute, EngineError>;
    fn list_disputes_page(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<RecordPage<DisputeListEntry>, EngineError>;
    fn count_disputes_since(&self, since_unix_ms: u64) -> Result<u64, EngineError>;

    fn list_import_batches(&self) -> Result<Vec<ImportBatch>, EngineError>;

    fn link_stats(&self) -> Result<LinkStats, EngineError>;
    /// Per-worker totals over an inclusive range, ordered by total
    /// descending then worker name ascending. `limit` truncates the
    /// result when present.
    fn sum_hours_per_worker(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        limit: Option<usize>,
    ) -> Result<Vec<WorkerHoursSum>, EngineError>;
    fn total_hours(&self, start: NaiveDate, end: NaiveDate) -> Result<f64, EngineError>;
}
