//! SQLite persistence for workers, hours records, disputes, and
//! import batches.
//!
//! Every operation opens a fresh connection against the configured
//! path, so one store value can be shared freely across tasks. WAL
//! mode plus a busy timeout keeps concurrent readers and the writer
//! from tripping over each other.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

use tally_core::{
    current_unix_timestamp_ms, Dispute, DisputeKind, EngineError, HoursRecord, ImportBatch,
    ImportRow, Worker,
};
use tally_engine::{
    DisputeListEntry, LinkStats, NewDispute, RecordListEntry, RecordPage, RecordStore,
    WorkerHoursSum,
};

/// Shift codes in imported sheets that stand for longer real hours.
/// Values without a mapping pass through unchanged.
pub fn normalize_imported_hours(raw: f64) -> f64 {
    match raw {
        value if value == 10.0 => 11.0,
        value if value == 11.0 => 12.5,
        value if value == 12.0 => 14.0,
        value if value == 13.0 => 15.5,
        value if value == 14.0 => 17.0,
        other => other,
    }
}

fn store_error(context: &str, error: impl std::fmt::Display) -> EngineError {
    EngineError::Store(format!("{context}: {error}"))
}

fn day_from_row(row: &Row<'_>, index: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(index)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            Box::new(error),
        )
    })
}

fn worker_from_row(row: &Row<'_>) -> rusqlite::Result<Worker> {
    Ok(Worker {
        id: row.get(0)?,
        name: row.get(1)?,
        position: row.get(2)?,
        channel_identity: row.get(3)?,
        linked: row.get(4)?,
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<HoursRecord> {
    Ok(HoursRecord {
        id: row.get(0)?,
        worker_id: row.get(1)?,
        date: day_from_row(row, 2)?,
        hours: row.get(3)?,
        activity_code: row.get(4)?,
        activity_description: row.get(5)?,
        cost_center: row.get(6)?,
        description: row.get(7)?,
        delivered: row.get(8)?,
        delivered_at_unix_ms: row.get(9)?,
    })
}

fn dispute_from_row(row: &Row<'_>) -> rusqlite::Result<Dispute> {
    let raw_kind: String = row.get(3)?;
    let kind = DisputeKind::parse(&raw_kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unknown dispute kind {raw_kind}"),
            )),
        )
    })?;
    Ok(Dispute {
        id: row.get(0)?,
        worker_id: row.get(1)?,
        record_id: row.get(2)?,
        kind,
        message: row.get(4)?,
        channel_identity: row.get(5)?,
        admin_notified: row.get(6)?,
        created_unix_ms: row.get(7)?,
    })
}

const RECORD_COLUMNS: &str = "id, worker_id, date, hours, activity_code, activity_description, \
                              cost_center, description, delivered, delivered_at_unix_ms";

/// SQLite-backed [`RecordStore`] holding only the database path.
#[derive(Debug, Clone)]
pub struct SqliteHoursStore {
    db_path: PathBuf,
}

impl SqliteHoursStore {
    /// Opens the store, creating the database and schema on first use.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let store = Self {
            db_path: db_path.into(),
        };
        store.connection()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connection(&self) -> Result<Connection, EngineError> {
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|error| store_error("failed to create store directory", error))?;
            }
        }
        let connection = Connection::open(&self.db_path)
            .map_err(|error| store_error("failed to open hours store", error))?;
        connection
            .busy_timeout(Duration::from_secs(5))
            .map_err(|error| store_error("failed to set busy timeout", error))?;
        connection
            .execute_batch(
                r#"
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                "#,
            )
            .map_err(|error| store_error("failed to apply store pragmas", error))?;
        connection
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS workers (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    position TEXT NOT NULL,
                    channel_identity TEXT NULL,
                    linked INTEGER NOT NULL DEFAULT 0
                );
                CREATE INDEX IF NOT EXISTS idx_workers_channel_identity
                    ON workers(channel_identity);
                CREATE TABLE IF NOT EXISTS hours_records (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    worker_id INTEGER NOT NULL,
                    date TEXT NOT NULL,
                    hours REAL NOT NULL,
                    activity_code TEXT NOT NULL DEFAULT '',
                    activity_description TEXT NOT NULL DEFAULT '',
                    cost_center TEXT NOT NULL DEFAULT '',
                    description TEXT NOT NULL DEFAULT '',
                    delivered INTEGER NOT NULL DEFAULT 0,
                    delivered_at_unix_ms INTEGER NULL
                );
                CREATE INDEX IF NOT EXISTS idx_hours_records_worker_date
                    ON hours_records(worker_id, date);
                CREATE INDEX IF NOT EXISTS idx_hours_records_date
                    ON hours_records(date);
                CREATE TABLE IF NOT EXISTS disputes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    worker_id INTEGER NOT NULL,
                    record_id INTEGER NULL,
                    kind TEXT NOT NULL,
                    message TEXT NOT NULL,
                    channel_identity TEXT NOT NULL,
                    admin_notified INTEGER NOT NULL DEFAULT 0,
                    created_unix_ms INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_disputes_created
                    ON disputes(created_unix_ms);
                CREATE TABLE IF NOT EXISTS import_batches (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    source TEXT NOT NULL,
                    record_count INTEGER NOT NULL,
                    target_date TEXT NOT NULL,
                    created_unix_ms INTEGER NOT NULL
                );
                "#,
            )
            .map_err(|error| store_error("failed to initialize store schema", error))?;
        Ok(connection)
    }
}

impl RecordStore for SqliteHoursStore {
    fn worker_by_id(&self, worker_id: i64) -> Result<Option<Worker>, EngineError> {
        let connection = self.connection()?;
        connection
            .query_row(
                "SELECT id, name, position, channel_identity, linked FROM workers WHERE id = ?1",
                params![worker_id],
                worker_from_row,
            )
            .optional()
            .map_err(|error| store_error("failed to load worker", error))
    }

    fn workers_linked_to_identity(
        &self,
        channel_identity: &str,
    ) -> Result<Vec<Worker>, EngineError> {
        let connection = self.connection()?;
        let mut statement = connection
            .prepare(
                "SELECT id, name, position, channel_identity, linked FROM workers \
                 WHERE linked != 0 AND channel_identity = ?1 ORDER BY id ASC",
            )
            .map_err(|error| store_error("failed to prepare linked-identity query", error))?;
        let workers = statement
            .query_map(params![channel_identity], worker_from_row)
            .map_err(|error| store_error("failed to query linked workers", error))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|error| store_error("failed to read linked workers", error))?;
        Ok(workers)
    }

    fn all_workers(&self) -> Result<Vec<Worker>, EngineError> {
        let connection = self.connection()?;
        let mut statement = connection
            .prepare(
                "SELECT id, name, position, channel_identity, linked FROM workers ORDER BY id ASC",
            )
            .map_err(|error| store_error("failed to prepare workers query", error))?;
        let workers = statement
            .query_map([], worker_from_row)
            .map_err(|error| store_error("failed to query workers", error))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|error| store_error("failed to read workers", error))?;
        Ok(workers)
    }

    fn linked_workers(&self) -> Result<Vec<Worker>, EngineError> {
        let connection = self.connection()?;
        let mut statement = connection
            .prepare(
                "SELECT id, name, position, channel_identity, linked FROM workers \
                 WHERE linked != 0 AND channel_identity IS NOT NULL ORDER BY id ASC",
            )
            .map_err(|error| store_error("failed to prepare linked workers query", error))?;
        let workers = statement
            .query_map([], worker_from_row)
            .map_err(|error| store_error("failed to query linked workers", error))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|error| store_error("failed to read linked workers", error))?;
        Ok(workers)
    }

    fn set_worker_link(
        &self,
        worker_id: i64,
        channel_identity: Option<&str>,
    ) -> Result<(), EngineError> {
        let connection = self.connection()?;
        let changed = connection
            .execute(
                "UPDATE workers SET channel_identity = ?2, linked = ?3 WHERE id = ?1",
                params![worker_id, channel_identity, channel_identity.is_some()],
            )
            .map_err(|error| store_error("failed to update worker link", error))?;
        if changed == 0 {
            return Err(EngineError::worker_not_found(worker_id));
        }
        Ok(())
    }

    fn records_in_range(
        &self,
        worker_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<HoursRecord>, EngineError> {
        let connection = self.connection()?;
        let mut statement = connection
            .prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM hours_records \
                 WHERE worker_id = ?1 AND date >= ?2 AND date <= ?3 \
                 ORDER BY date ASC, id ASC"
            ))
            .map_err(|error| store_error("failed to prepare range query", error))?;
        let records = statement
            .query_map(
                params![worker_id, start.to_string(), end.to_string()],
                record_from_row,
            )
            .map_err(|error| store_error("failed to query records", error))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|error| store_error("failed to read records", error))?;
        Ok(records)
    }

    fn records_on_date(
        &self,
        worker_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<HoursRecord>, EngineError> {
        self.records_in_range(worker_id, date, date)
    }

    fn record_by_id(&self, record_id: i64) -> Result<Option<HoursRecord>, EngineError> {
        let connection = self.connection()?;
        connection
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM hours_records WHERE id = ?1"),
                params![record_id],
                record_from_row,
            )
            .optional()
            .map_err(|error| store_error("failed to load record", error))
    }

    fn latest_record_for_day(
        &self,
        worker_id: i64,
        date: NaiveDate,
    ) -> Result<Option<HoursRecord>, EngineError> {
        let connection = self.connection()?;
        connection
            .query_row(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM hours_records \
                     WHERE worker_id = ?1 AND date = ?2 ORDER BY id DESC LIMIT 1"
                ),
                params![worker_id, date.to_string()],
                record_from_row,
            )
            .optional()
            .map_err(|error| store_error("failed to load latest record", error))
    }

    fn mark_delivered(
        &self,
        record_ids: &[i64],
        delivered_at_unix_ms: u64,
    ) -> Result<(), EngineError> {
        if record_ids.is_empty() {
            return Ok(());
        }
        let mut connection = self.connection()?;
        let transaction = connection
            .transaction()
            .map_err(|error| store_error("failed to begin delivery transaction", error))?;
        for record_id in record_ids {
            transaction
                .execute(
                    "UPDATE hours_records SET delivered = 1, delivered_at_unix_ms = ?2 \
                     WHERE id = ?1",
                    params![record_id, delivered_at_unix_ms],
                )
                .map_err(|error| store_error("failed to mark record delivered", error))?;
        }
        transaction
            .commit()
            .map_err(|error| store_error("failed to commit delivery marks", error))
    }

    fn update_record_hours(&self, record_id: i64, hours: f64) -> Result<(), EngineError> {
        let connection = self.connection()?;
        let changed = connection
            .execute(
                "UPDATE hours_records SET hours = ?2 WHERE id = ?1",
                params![record_id, hours],
            )
            .map_err(|error| store_error("failed to update record hours", error))?;
        if changed == 0 {
            return Err(EngineError::record_not_found(record_id));
        }
        Ok(())
    }

    /// Replaces the whole day inside one transaction: existing records
    /// for `target_date` are deleted, rows are inserted with
    /// normalized hours, worker names and positions are upserted
    /// without touching links, and the batch is logged.
    fn replace_day(
        &self,
        target_date: NaiveDate,
        source: &str,
        rows: &[ImportRow],
    ) -> Result<ImportBatch, EngineError> {
        let mut connection = self.connection()?;
        let transaction = connection
            .transaction()
            .map_err(|error| store_error("failed to begin import transaction", error))?;
        transaction
            .execute(
                "DELETE FROM hours_records WHERE date = ?1",
                params![target_date.to_string()],
            )
            .map_err(|error| store_error("failed to clear records for date", error))?;
        for row in rows {
            transaction
                .execute(
                    "INSERT INTO workers (id, name, position, linked) VALUES (?1, ?2, ?3, 0) \
                     ON CONFLICT(id) DO UPDATE SET name = excluded.name, \
                     position = excluded.position",
                    params![row.worker_id, row.name, row.position],
                )
                .map_err(|error| store_error("failed to upsert worker", error))?;
            transaction
                .execute(
                    "INSERT INTO hours_records (worker_id, date, hours, activity_code, \
                     activity_description, cost_center, description, delivered) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
                    params![
                        row.worker_id,
                        target_date.to_string(),
                        normalize_imported_hours(row.hours),
                        row.activity_code,
                        row.activity_description,
                        row.cost_center,
                        row.description,
                    ],
                )
                .map_err(|error| store_error("failed to insert record", error))?;
        }
        let created_unix_ms = current_unix_timestamp_ms();
        transaction
            .execute(
                "INSERT INTO import_batches (source, record_count, target_date, created_unix_ms) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    source,
                    rows.len() as i64,
                    target_date.to_string(),
                    created_unix_ms
                ],
            )
            .map_err(|error| store_error("failed to log import batch", error))?;
        let batch_id = transaction.last_insert_rowid();
        transaction
            .commit()
            .map_err(|error| store_error("failed to commit import", error))?;
        Ok(ImportBatch {
            id: batch_id,
            source: source.to_string(),
            record_count: rows.len(),
            target_date,
            created_unix_ms,
        })
    }

    fn list_records_page(
        &self,
        page: u32,
        limit: u32,
        search: Option<&str>,
    ) -> Result<RecordPage<RecordListEntry>, EngineError> {
        let connection = self.connection()?;
        // Empty or whitespace-only search behaves like no search.
        let pattern = search
            .map(str::trim)
            .filter(|needle| !needle.is_empty())
            .map(|needle| format!("%{needle}%"));
        let total: i64 = match &pattern {
            Some(pattern) => connection.query_row(
                "SELECT COUNT(*) FROM hours_records \
                 WHERE activity_description LIKE ?1 OR cost_center LIKE ?1",
                params![pattern],
                |row| row.get(0),
            ),
            None => connection.query_row("SELECT COUNT(*) FROM hours_records", [], |row| {
                row.get(0)
            }),
        }
        .map_err(|error| store_error("failed to count records", error))?;

        let filter = if pattern.is_some() {
            "WHERE h.activity_description LIKE ?3 OR h.cost_center LIKE ?3"
        } else {
            ""
        };
        let offset = i64::from(page.max(1) - 1) * i64::from(limit);
        let page_sql = format!(
            "SELECT h.id, h.worker_id, h.date, h.hours, h.activity_code, \
             h.activity_description, h.cost_center, h.description, h.delivered, \
             h.delivered_at_unix_ms, w.name, w.position \
             FROM hours_records h LEFT JOIN workers w ON w.id = h.worker_id {filter} \
             ORDER BY h.date DESC, h.id DESC LIMIT ?1 OFFSET ?2"
        );
        let map_row = |row: &Row<'_>| -> rusqlite::Result<RecordListEntry> {
            Ok(RecordListEntry {
                record: record_from_row(row)?,
                worker_name: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
                worker_position: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
            })
        };
        let mut statement = connection
            .prepare(&page_sql)
            .map_err(|error| store_error("failed to prepare records page query", error))?;
        let items = match &pattern {
            Some(pattern) => statement
                .query_map(params![i64::from(limit), offset, pattern], map_row)
                .map_err(|error| store_error("failed to query records page", error))?
                .collect::<rusqlite::Result<Vec<_>>>(),
            None => statement
                .query_map(params![i64::from(limit), offset], map_row)
                .map_err(|error| store_error("failed to query records page", error))?
                .collect::<rusqlite::Result<Vec<_>>>(),
        }
        .map_err(|error| store_error("failed to read records page", error))?;
        Ok(RecordPage {
            items,
            total: total as u64,
            page,
            limit,
        })
    }

    fn create_dispute(&self, new_dispute: NewDispute) -> Result<Dispute, EngineError> {
        let connection = self.connection()?;
        let created_unix_ms = current_unix_timestamp_ms();
        connection
            .execute(
                "INSERT INTO disputes (worker_id, record_id, kind, message, channel_identity, \
                 admin_notified, created_unix_ms) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    new_dispute.worker_id,
                    new_dispute.record_id,
                    new_dispute.kind.as_str(),
                    new_dispute.message,
                    new_dispute.channel_identity,
                    new_dispute.admin_notified,
                    created_unix_ms
                ],
            )
            .map_err(|error| store_error("failed to insert dispute", error))?;
        Ok(Dispute {
            id: connection.last_insert_rowid(),
            worker_id: new_dispute.worker_id,
            record_id: new_dispute.record_id,
            kind: new_dispute.kind,
            message: new_dispute.message,
            channel_identity: new_dispute.channel_identity,
            admin_notified: new_dispute.admin_notified,
            created_unix_ms,
        })
    }

    fn list_disputes_page(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<RecordPage<DisputeListEntry>, EngineError> {
        let connection = self.connection()?;
        let total: i64 = connection
            .query_row("SELECT COUNT(*) FROM disputes", [], |row| row.get(0))
            .map_err(|error| store_error("failed to count disputes", error))?;
        let offset = i64::from(page.max(1) - 1) * i64::from(limit);
        let mut statement = connection
            .prepare(
                "SELECT d.id, d.worker_id, d.record_id, d.kind, d.message, d.channel_identity, \
                 d.admin_notified, d.created_unix_ms, w.name \
                 FROM disputes d LEFT JOIN workers w ON w.id = d.worker_id \
                 ORDER BY d.id DESC LIMIT ?1 OFFSET ?2",
            )
            .map_err(|error| store_error("failed to prepare disputes query", error))?;
        let items = statement
            .query_map(params![i64::from(limit), offset], |row| {
                Ok(DisputeListEntry {
                    dispute: dispute_from_row(row)?,
                    worker_name: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
                })
            })
            .map_err(|error| store_error("failed to query disputes", error))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|error| store_error("failed to read disputes", error))?;
        Ok(RecordPage {
            items,
            total: total as u64,
            page,
            limit,
        })
    }

    fn count_disputes_since(&self, since_unix_ms: u64) -> Result<u64, EngineError> {
        let connection = self.connection()?;
        let count: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM disputes WHERE created_unix_ms >= ?1",
                params![since_unix_ms],
                |row| row.get(0),
            )
            .map_err(|error| store_error("failed to count recent disputes", error))?;
        Ok(count as u64)
    }

    fn list_import_batches(&self) -> Result<Vec<ImportBatch>, EngineError> {
        let connection = self.connection()?;
        let mut statement = connection
            .prepare(
                "SELECT id, source, record_count, target_date, created_unix_ms \
                 FROM import_batches ORDER BY id DESC",
            )
            .map_err(|error| store_error("failed to prepare batches query", error))?;
        let batches = statement
            .query_map([], |row| {
                Ok(ImportBatch {
                    id: row.get(0)?,
                    source: row.get(1)?,
                    record_count: row.get::<_, i64>(2)? as usize,
                    target_date: day_from_row(row, 3)?,
                    created_unix_ms: row.get(4)?,
                })
            })
            .map_err(|error| store_error("failed to query batches", error))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|error| store_error("failed to read batches", error))?;
        Ok(batches)
    }

    fn link_stats(&self) -> Result<LinkStats, EngineError> {
        let connection = self.connection()?;
        let (total, linked): (i64, i64) = connection
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(CASE WHEN linked != 0 THEN 1 ELSE 0 END), 0) \
                 FROM workers",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|error| store_error("failed to compute link stats", error))?;
        Ok(LinkStats {
            total_workers: total as u64,
            linked_workers: linked as u64,
            unlinked_workers: (total - linked) as u64,
        })
    }

    fn sum_hours_per_worker(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        limit: Option<usize>,
    ) -> Result<Vec<WorkerHoursSum>, EngineError> {
        let connection = self.connection()?;
        let mut statement = connection
            .prepare(
                "SELECT w.id, w.name, w.position, SUM(h.hours) AS total_hours \
                 FROM hours_records h JOIN workers w ON w.id = h.worker_id \
                 WHERE h.date >= ?1 AND h.date <= ?2 \
                 GROUP BY w.id, w.name, w.position \
                 HAVING SUM(h.hours) > 0 \
                 ORDER BY total_hours DESC, w.name ASC LIMIT ?3",
            )
            .map_err(|error| store_error("failed to prepare hour sums query", error))?;
        let bounded = limit.map_or(-1, |value| value as i64);
        let sums = statement
            .query_map(
                params![start.to_string(), end.to_string(), bounded],
                |row| {
                    Ok(WorkerHoursSum {
                        worker_id: row.get(0)?,
                        name: row.get(1)?,
                        position: row.get(2)?,
                        total_hours: row.get(3)?,
                    })
                },
            )
            .map_err(|error| store_error("failed to query hour sums", error))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|error| store_error("failed to read hour sums", error))?;
        Ok(sums)
    }

    fn total_hours(&self, start: NaiveDate, end: NaiveDate) -> Result<f64, EngineError> {
        let connection = self.connection()?;
        connection
            .query_row(
                "SELECT COALESCE(SUM(hours), 0) FROM hours_records \
                 WHERE date >= ?1 AND date <= ?2",
                params![start.to_string(), end.to_string()],
                |row| row.get(0),
            )
            .map_err(|error| store_error("failed to sum hours", error))
    }
}
