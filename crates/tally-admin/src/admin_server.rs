//! Administrative HTTP endpoints for the Tally worker-hours bot:
//! dispatch triggers, hour corrections, day ingestion, listings, and
//! reporting projections. Every failure is returned as a structured
//! `{"error": {"code", "message"}}` envelope.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Datelike, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use tally_core::{parse_day, EngineError, ImportRow, Window};
use tally_engine::{
    DispatchReport, DisputeListEntry, HoursEngine, RecordListEntry, RecordStore, WorkerHoursSum,
};

const DEFAULT_PAGE_LIMIT: u32 = 50;
const DEFAULT_TOP_LIMIT: usize = 10;
const CORRECTION_BANNER_DEFAULT: &str = "Your hours were corrected by the administrator.";

/// Shared handles behind every admin route.
#[derive(Clone)]
pub struct AdminState {
    pub engine: Arc<HoursEngine>,
    pub store: Arc<dyn RecordStore>,
}

/// Binds the admin listener and serves until ctrl-c.
pub async fn run_admin_server(bind_address: &str, state: AdminState) -> Result<()> {
    let listener = TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve admin bound address")?;
    println!("admin server listening: addr={local_addr}");
    let app = build_admin_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("admin server exited unexpectedly")?;
    Ok(())
}

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/admin/dispatch-daily", post(handle_dispatch_daily))
        .route("/admin/dispatch-digest", post(handle_dispatch_digest))
        .route("/admin/correction", post(handle_correction))
        .route("/admin/workers", get(handle_list_workers))
        .route("/admin/records", get(handle_list_records))
        .route("/admin/disputes", get(handle_list_disputes))
        .route(
            "/admin/imports",
            get(handle_list_imports).post(handle_run_import),
        )
        .route("/admin/stats", get(handle_stats))
        .route("/admin/hours-sum", get(handle_hours_sum))
        .route("/admin/top", get(handle_top_workers))
        .route("/admin/monthly-total", get(handle_monthly_total))
        .route("/admin/unlink", post(handle_force_unlink))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct DispatchRequest {
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CorrectionRequest {
    worker_id: i64,
    record_id: i64,
    hours: f64,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImportRequest {
    target_date: String,
    source: Option<String>,
    #[serde(default)]
    dispatch: bool,
    rows: Vec<ImportRow>,
}

#[derive(Debug, Deserialize)]
struct UnlinkRequest {
    channel_identity: String,
}

#[derive(Debug, Deserialize)]
struct RecordListQuery {
    page: Option<u32>,
    limit: Option<u32>,
    search: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DisputeListQuery {
    page: Option<u32>,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RangeQuery {
    start: Option<String>,
    end: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TopQuery {
    window: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct MonthQuery {
    month: Option<u32>,
    year: Option<i32>,
}

async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status":"ok"})))
}

async fn handle_dispatch_daily(State(state): State<AdminState>, body: String) -> impl IntoResponse {
    let request: DispatchRequest = match parse_optional_body(&body) {
        Ok(request) => request,
        Err(error) => return error_response(&error),
    };
    let date = match parse_optional_date(request.date.as_deref()) {
        Ok(date) => date,
        Err(error) => return error_response(&error),
    };
    match state.engine.dispatch_daily(date).await {
        Ok(report) => (StatusCode::OK, Json(dispatch_report_json(&report))),
        Err(error) => error_response(&error),
    }
}

async fn handle_dispatch_digest(
    State(state): State<AdminState>,
    body: String,
) -> impl IntoResponse {
    let request: DispatchRequest = match parse_optional_body(&body) {
        Ok(request) => request,
        Err(error) => return error_response(&error),
    };
    let date = match parse_optional_date(request.date.as_deref()) {
        Ok(date) => date,
        Err(error) => return error_response(&error),
    };
    match state.engine.dispatch_digest_batch(date).await {
        Ok(report) => (StatusCode::OK, Json(dispatch_report_json(&report))),
        Err(error) => error_response(&error),
    }
}

async fn handle_correction(State(state): State<AdminState>, body: String) -> impl IntoResponse {
    let request: CorrectionRequest = match parse_json_body(&body) {
        Ok(request) => request,
        Err(error) => return error_response(&error),
    };
    match apply_correction(&state, &request).await {
        Ok(date) => (
            StatusCode::OK,
            Json(json!({
                "status": "corrected",
                "worker_id": request.worker_id,
                "record_id": request.record_id,
                "date": date.to_string(),
                "hours": request.hours,
            })),
        ),
        Err(error) => error_response(&error),
    }
}

/// Rewrites the stored hours, then re-delivers that day's digest with a
/// correction banner and the corrected figure as the displayed total.
async fn apply_correction(
    state: &AdminState,
    request: &CorrectionRequest,
) -> Result<NaiveDate, EngineError> {
    if !request.hours.is_finite() {
        return Err(EngineError::ParseFailure(
            "hours must be a finite number".to_string(),
        ));
    }
    let record = state
        .store
        .record_by_id(request.record_id)?
        .ok_or_else(|| EngineError::record_not_found(request.record_id))?;
    if record.worker_id != request.worker_id {
        return Err(EngineError::NotFound(format!(
            "record {} does not belong to worker {}",
            request.record_id, request.worker_id
        )));
    }
    state
        .store
        .update_record_hours(request.record_id, request.hours)?;
    let annotation = request
        .message
        .as_deref()
        .unwrap_or(CORRECTION_BANNER_DEFAULT);
    state
        .engine
        .dispatch_one(
            request.worker_id,
            Some(record.date),
            Some(annotation),
            Some(request.hours),
        )
        .await?;
    Ok(record.date)
}

async fn handle_list_workers(State(state): State<AdminState>) -> impl IntoResponse {
    match state.store.all_workers() {
        Ok(workers) => (StatusCode::OK, Json(json!({"workers": workers}))),
        Err(error) => error_response(&error),
    }
}

async fn handle_list_records(
    State(state): State<AdminState>,
    Query(query): Query<RecordListQuery>,
) -> impl IntoResponse {
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    match state
        .store
        .list_records_page(page, limit, query.search.as_deref())
    {
        Ok(listing) => {
            let records: Vec<Value> = listing.items.iter().map(record_entry_json).collect();
            (
                StatusCode::OK,
                Json(json!({
                    "records": records,
                    "total": listing.total,
                    "page": listing.page,
                    "limit": listing.limit,
                })),
            )
        }
        Err(error) => error_response(&error),
    }
}

async fn handle_list_disputes(
    State(state): State<AdminState>,
    Query(query): Query<DisputeListQuery>,
) -> impl IntoResponse {
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    match state.store.list_disputes_page(page, limit) {
        Ok(listing) => {
            let disputes: Vec<Value> = listing.items.iter().map(dispute_entry_json).collect();
            (
                StatusCode::OK,
                Json(json!({
                    "disputes": disputes,
                    "total": listing.total,
                    "page": listing.page,
                    "limit": listing.limit,
                })),
            )
        }
        Err(error) => error_response(&error),
    }
}

async fn handle_list_imports(State(state): State<AdminState>) -> impl IntoResponse {
    match state.store.list_import_batches() {
        Ok(imports) => (StatusCode::OK, Json(json!({"imports": imports}))),
        Err(error) => error_response(&error),
    }
}

async fn handle_run_import(State(state): State<AdminState>, body: String) -> impl IntoResponse {
    let request: ImportRequest = match parse_json_body(&body) {
        Ok(request) => request,
        Err(error) => return error_response(&error),
    };
    let Some(target_date) = parse_day(&request.target_date) else {
        return error_response(&EngineError::InvalidRange(format!(
            "unparseable day '{}'",
            request.target_date
        )));
    };
    let source = request.source.as_deref().unwrap_or("admin-api");
    let batch = match state.store.replace_day(target_date, source, &request.rows) {
        Ok(batch) => batch,
        Err(error) => return error_response(&error),
    };
    if !request.dispatch {
        return (StatusCode::OK, Json(json!({"import": batch})));
    }
    match state.engine.dispatch_daily(Some(target_date)).await {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({"import": batch, "dispatch": dispatch_report_json(&report)})),
        ),
        Err(error) => error_response(&error),
    }
}

async fn handle_stats(State(state): State<AdminState>) -> impl IntoResponse {
    let stats = match state.store.link_stats() {
        Ok(stats) => stats,
        Err(error) => return error_response(&error),
    };
    let today_start =
        start_of_local_day_unix_ms(state.engine.config().timezone, state.engine.local_today())
            .unwrap_or(0);
    match state.store.count_disputes_since(today_start) {
        Ok(today_disputes) => (
            StatusCode::OK,
            Json(json!({
                "total_workers": stats.total_workers,
                "linked_workers": stats.linked_workers,
                "unlinked_workers": stats.unlinked_workers,
                "today_disputes": today_disputes,
            })),
        ),
        Err(error) => error_response(&error),
    }
}

async fn handle_hours_sum(
    State(state): State<AdminState>,
    Query(query): Query<RangeQuery>,
) -> impl IntoResponse {
    let (start, end) = match parse_range(query.start.as_deref(), query.end.as_deref()) {
        Ok(bounds) => bounds,
        Err(error) => return error_response(&error),
    };
    match state.store.sum_hours_per_worker(start, end, None) {
        Ok(sums) => (StatusCode::OK, Json(hours_sum_json(start, end, &sums))),
        Err(error) => error_response(&error),
    }
}

async fn handle_top_workers(
    State(state): State<AdminState>,
    Query(query): Query<TopQuery>,
) -> impl IntoResponse {
    let today = state.engine.local_today();
    let window = match query.window.as_deref() {
        Some("week") => Window::CalendarWeek(today),
        Some("month") => Window::CalendarMonth {
            month: today.month(),
            year: today.year(),
        },
        other => {
            return error_response(&EngineError::InvalidRange(format!(
                "window must be 'week' or 'month', got '{}'",
                other.unwrap_or("")
            )))
        }
    };
    let (start, end) = match window.resolve(today) {
        Ok(bounds) => bounds,
        Err(error) => return error_response(&error),
    };
    let limit = query.limit.unwrap_or(DEFAULT_TOP_LIMIT).max(1);
    match state.store.sum_hours_per_worker(start, end, Some(limit)) {
        Ok(sums) => {
            let workers: Vec<Value> = sums.iter().map(worker_sum_json).collect();
            (
                StatusCode::OK,
                Json(json!({
                    "window": window.describe(),
                    "start": start.to_string(),
                    "end": end.to_string(),
                    "workers": workers,
                })),
            )
        }
        Err(error) => error_response(&error),
    }
}

async fn handle_monthly_total(
    State(state): State<AdminState>,
    Query(query): Query<MonthQuery>,
) -> impl IntoResponse {
    let today = state.engine.local_today();
    let month = query.month.unwrap_or_else(|| today.month());
    let year = query.year.unwrap_or_else(|| today.year());
    let (start, end) = match (Window::CalendarMonth { month, year }).resolve(today) {
        Ok(bounds) => bounds,
        Err(error) => return error_response(&error),
    };
    match state.store.total_hours(start, end) {
        Ok(total_hours) => (
            StatusCode::OK,
            Json(json!({"month": month, "year": year, "total_hours": total_hours})),
        ),
        Err(error) => error_response(&error),
    }
}

async fn handle_force_unlink(State(state): State<AdminState>, body: String) -> impl IntoResponse {
    let request: UnlinkRequest = match parse_json_body(&body) {
        Ok(request) => request,
        Err(error) => return error_response(&error),
    };
    let identity = request.channel_identity.trim();
    if identity.is_empty() {
        return error_response(&EngineError::ParseFailure(
            "channel_identity must not be empty".to_string(),
        ));
    }
    match state.engine.force_unlink_identity(identity).await {
        Ok(unlinked) => (
            StatusCode::OK,
            Json(json!({"channel_identity": identity, "unlinked_worker_ids": unlinked})),
        ),
        Err(error) => error_response(&error),
    }
}

fn error_response(error: &EngineError) -> (StatusCode, Json<Value>) {
    tracing::debug!(code = error.code(), %error, "admin request rejected");
    (
        status_for(error),
        Json(json!({"error": {"code": error.code(), "message": error.to_string()}})),
    )
}

fn status_for(error: &EngineError) -> StatusCode {
    match error {
        EngineError::NotFound(_) | EngineError::NoData => StatusCode::NOT_FOUND,
        EngineError::InvalidRange(_) | EngineError::ParseFailure(_) => StatusCode::BAD_REQUEST,
        EngineError::AlreadyLinkedOther(_)
        | EngineError::TargetAlreadyLinked(_)
        | EngineError::Unlinked(_) => StatusCode::CONFLICT,
        EngineError::TransportDeliveryFailure(_) => StatusCode::BAD_GATEWAY,
        EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn parse_json_body<T: DeserializeOwned>(body: &str) -> Result<T, EngineError> {
    serde_json::from_str(body)
        .map_err(|error| EngineError::ParseFailure(format!("invalid request body: {error}")))
}

/// An absent or empty body falls back to the request type's defaults.
fn parse_optional_body<T: DeserializeOwned + Default>(body: &str) -> Result<T, EngineError> {
    if body.trim().is_empty() {
        return Ok(T::default());
    }
    parse_json_body(body)
}

fn parse_optional_date(raw: Option<&str>) -> Result<Option<NaiveDate>, EngineError> {
    match raw {
        None => Ok(None),
        Some(raw) => parse_day(raw)
            .map(Some)
            .ok_or_else(|| EngineError::InvalidRange(format!("unparseable day '{raw}'"))),
    }
}

fn parse_range(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(NaiveDate, NaiveDate), EngineError> {
    let (Some(start), Some(end)) = (start, end) else {
        return Err(EngineError::InvalidRange(
            "both start and end are required".to_string(),
        ));
    };
    let start = parse_day(start)
        .ok_or_else(|| EngineError::InvalidRange(format!("unparseable day '{start}'")))?;
    let end = parse_day(end)
        .ok_or_else(|| EngineError::InvalidRange(format!("unparseable day '{end}'")))?;
    if start > end {
        return Err(EngineError::InvalidRange(format!(
            "start {start} is after end {end}"
        )));
    }
    Ok((start, end))
}

fn start_of_local_day_unix_ms(timezone: Tz, day: NaiveDate) -> Option<u64> {
    let midnight = timezone
        .from_local_datetime(&day.and_time(NaiveTime::MIN))
        .earliest()?;
    u64::try_from(midnight.timestamp_millis()).ok()
}

fn dispatch_report_json(report: &DispatchReport) -> Value {
    json!({
        "sent_count": report.sent,
        "candidates": report.candidates,
        "skipped_no_records": report.skipped_no_records,
        "failed": report.failed,
    })
}

fn record_entry_json(entry: &RecordListEntry) -> Value {
    let mut value = json!(entry.record);
    value["worker_name"] = json!(entry.worker_name);
    value["worker_position"] = json!(entry.worker_position);
    value
}

fn dispute_entry_json(entry: &DisputeListEntry) -> Value {
    let mut value = json!(entry.dispute);
    value["worker_name"] = json!(entry.worker_name);
    value
}

fn hours_sum_json(start: NaiveDate, end: NaiveDate, sums: &[WorkerHoursSum]) -> Value {
    let workers: Vec<Value> = sums.iter().map(worker_sum_json).collect();
    let total: f64 = sums.iter().map(|sum| sum.total_hours).sum();
    json!({
        "start": start.to_string(),
        "end": end.to_string(),
        "workers": workers,
        "total_hours": total,
    })
}

fn worker_sum_json(sum: &WorkerHoursSum) -> Value {
    json!({
        "worker_id": sum.worker_id,
        "name": sum.name,
        "position": sum.position,
        "total_hours": sum.total_hours,
    })
}
