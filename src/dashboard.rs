//! JSON dashboard over the reply log, policy edits, and poller controls

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{parse_keyword_list, PolicyEdit, ReplyPolicy};
use crate::engine::MailCycleEngine;
use crate::error::{AutoReplyError, Result};
use crate::models::{IgnoredRecord, RepliedRecord};
use crate::poller::{self, PollerHandle, ServicePaths};
use crate::state::{self, ReplyLog, RunStatus};

const DEFAULT_PER_PAGE: usize = 50;
const MAX_PER_PAGE: usize = 500;

/// Builds a fresh engine each time the dashboard starts the poller
pub type EngineBuilder = Box<dyn Fn() -> MailCycleEngine + Send + Sync>;

/// Shared dashboard state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Shared>,
}

struct Shared {
    paths: ServicePaths,
    base_policy: ReplyPolicy,
    interval: Duration,
    engine_builder: EngineBuilder,
    poller: Mutex<Option<PollerHandle>>,
}

impl AppState {
    pub fn new(
        paths: ServicePaths,
        base_policy: ReplyPolicy,
        interval: Duration,
        engine_builder: EngineBuilder,
    ) -> Self {
        Self {
            inner: Arc::new(Shared {
                paths,
                base_policy,
                interval,
                engine_builder,
                poller: Mutex::new(None),
            }),
        }
    }

    /// Hand an already-running poller to the dashboard for supervision
    pub async fn adopt_poller(&self, handle: PollerHandle) {
        *self.inner.poller.lock().await = Some(handle);
    }
}

/// Run the dashboard server until ctrl-c
///
/// On shutdown any live poller task is asked to stop and joined before
/// the server exits.
pub async fn run_server(state: AppState, host: &str, port: u16) -> Result<()> {
    let host: IpAddr = host
        .parse()
        .map_err(|_| AutoReplyError::ConfigError(format!("Invalid host: {}", host)))?;
    let addr = SocketAddr::new(host, port);

    let app = router(state.clone());
    info!("Dashboard listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;
    Ok(())
}

async fn shutdown_signal(state: AppState) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    info!("Shutting down dashboard");
    let handle = state.inner.poller.lock().await.take();
    if let Some(handle) = handle {
        handle.request_stop();
        handle.join().await;
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(get_status))
        .route("/api/log", get(get_log))
        .route("/api/charts", get(get_charts))
        .route("/api/config", get(get_config).post(post_config))
        .route("/api/start", post(start_poller))
        .route("/api/stop", post(stop_poller))
        .with_state(state)
}

/// JSON error body with an HTTP status
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<AutoReplyError> for ApiError {
    fn from(e: AutoReplyError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(json!({"error": self.message}))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn get_status(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    // The status flag is informational; an unreadable file reports as
    // stopped rather than failing the endpoint
    let status = match state::load_status(&state.inner.paths.status_file).await {
        Ok(Some(s)) => s,
        Ok(None) => RunStatus::Stopped,
        Err(e) => {
            warn!("Failed to read status file: {}", e);
            RunStatus::Stopped
        }
    };

    let log = ReplyLog::load(&state.inner.paths.data_file).await?;
    let poller_alive = state
        .inner
        .poller
        .lock()
        .await
        .as_ref()
        .map(|h| h.is_running())
        .unwrap_or(false);

    Ok(Json(json!({
        "status": status,
        "poller_alive": poller_alive,
        "total_replied": log.replied_mails.len(),
        "total_ignored": log.ignored_mails.len(),
        "recent_replied": log.replied_mails.last(),
        "recent_ignored": log.ignored_mails.last(),
    })))
}

#[derive(Debug, Deserialize)]
struct LogQuery {
    search: Option<String>,
    page: Option<usize>,
    per_page: Option<usize>,
}

async fn get_log(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Json<Value>> {
    let log = ReplyLog::load(&state.inner.paths.data_file).await?;

    let search = query.search.unwrap_or_default();
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);

    let mut replied = filter_replied(log.replied_mails, &search);
    let mut ignored = filter_ignored(log.ignored_mails, &search);
    // Newest first
    replied.reverse();
    ignored.reverse();

    let replied_total = replied.len();
    let ignored_total = ignored.len();

    let replied_items: Vec<RepliedRecord> = paginate(replied, page, per_page)
        .into_iter()
        .map(|mut r| {
            r.date = r.date.as_deref().map(format_date);
            r
        })
        .collect();
    let ignored_items: Vec<IgnoredRecord> = paginate(ignored, page, per_page)
        .into_iter()
        .map(|mut r| {
            r.date = r.date.as_deref().map(format_date);
            r
        })
        .collect();

    Ok(Json(json!({
        "search": search,
        "page": page,
        "per_page": per_page,
        "replied": {"total": replied_total, "items": replied_items},
        "ignored": {"total": ignored_total, "items": ignored_items},
    })))
}

async fn get_charts(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let log = ReplyLog::load(&state.inner.paths.data_file).await?;

    let daily = daily_counts(&log);
    let labels: Vec<&String> = daily.keys().collect();
    let replied_series: Vec<usize> = daily.values().map(|(r, _)| *r).collect();
    let ignored_series: Vec<usize> = daily.values().map(|(_, i)| *i).collect();

    let replied_categories =
        category_counts(log.replied_mails.iter().map(|r| r.category.as_str()));
    let ignored_categories =
        category_counts(log.ignored_mails.iter().map(|r| r.category.as_str()));

    Ok(Json(json!({
        "daily": {
            "labels": labels,
            "replied": replied_series,
            "ignored": ignored_series,
        },
        "replied_categories": {
            "labels": replied_categories.keys().collect::<Vec<_>>(),
            "counts": replied_categories.values().collect::<Vec<_>>(),
        },
        "ignored_categories": {
            "labels": ignored_categories.keys().collect::<Vec<_>>(),
            "counts": ignored_categories.values().collect::<Vec<_>>(),
        },
    })))
}

async fn get_config(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let (policy, version) = effective_policy(&state).await?;
    Ok(Json(json!({
        "keywords": policy.keywords,
        "keywords_csv": policy.keywords.join(", "),
        "reply_template": policy.template,
        "use_ai": policy.use_ai,
        "version": version,
    })))
}

#[derive(Debug, Deserialize)]
struct ConfigUpdate {
    keywords: String,
    reply_template: String,
    use_ai: bool,
}

async fn post_config(
    State(state): State<AppState>,
    Json(update): Json<ConfigUpdate>,
) -> ApiResult<Json<PolicyEdit>> {
    if update.reply_template.trim().is_empty() {
        return Err(ApiError::bad_request("reply_template must not be empty"));
    }

    let policy = ReplyPolicy {
        keywords: parse_keyword_list(&update.keywords),
        template: update.reply_template,
        use_ai: update.use_ai,
    };

    let previous = PolicyEdit::load(&state.inner.paths.edits_file).await?;
    let edit = PolicyEdit::next(previous.as_ref(), policy);
    edit.store(&state.inner.paths.edits_file).await?;
    Ok(Json(edit))
}

async fn start_poller(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let mut guard = state.inner.poller.lock().await;
    if guard.as_ref().map(|h| h.is_running()).unwrap_or(false) {
        return Ok(Json(json!({"result": "already_running"})));
    }

    let engine = (state.inner.engine_builder)();
    let handle = poller::spawn(
        engine,
        state.inner.base_policy.clone(),
        state.inner.interval,
        state.inner.paths.clone(),
    );
    *guard = Some(handle);
    info!("Poller started from dashboard");
    Ok(Json(json!({"result": "started"})))
}

async fn stop_poller(State(state): State<AppState>) -> Json<Value> {
    let guard = state.inner.poller.lock().await;
    match guard.as_ref() {
        Some(handle) if handle.is_running() => {
            handle.request_stop();
            info!("Poller stop requested from dashboard");
            Json(json!({"result": "stopping"}))
        }
        _ => Json(json!({"result": "not_running"})),
    }
}

/// Current reply policy as the loop would see it: the latest pending
/// edit when one exists, the configured defaults otherwise (version 0)
async fn effective_policy(state: &AppState) -> Result<(ReplyPolicy, u64)> {
    Ok(
        match PolicyEdit::load(&state.inner.paths.edits_file).await? {
            Some(edit) => {
                let version = edit.version;
                (edit.to_policy(), version)
            }
            None => (state.inner.base_policy.clone(), 0),
        },
    )
}

fn filter_replied(records: Vec<RepliedRecord>, search: &str) -> Vec<RepliedRecord> {
    if search.is_empty() {
        return records;
    }
    let needle = search.to_lowercase();
    records
        .into_iter()
        .filter(|r| {
            r.recipient.to_lowercase().contains(&needle)
                || r.subject.to_lowercase().contains(&needle)
                || r.reply.to_lowercase().contains(&needle)
        })
        .collect()
}

fn filter_ignored(records: Vec<IgnoredRecord>, search: &str) -> Vec<IgnoredRecord> {
    if search.is_empty() {
        return records;
    }
    let needle = search.to_lowercase();
    records
        .into_iter()
        .filter(|r| {
            contains_ci(r.sender.as_deref(), &needle) || contains_ci(r.subject.as_deref(), &needle)
        })
        .collect()
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack
        .map(|h| h.to_lowercase().contains(needle))
        .unwrap_or(false)
}

fn paginate<T>(items: Vec<T>, page: usize, per_page: usize) -> Vec<T> {
    items
        .into_iter()
        .skip((page - 1).saturating_mul(per_page))
        .take(per_page)
        .collect()
}

fn parse_mail_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
}

/// Format a stored date for display, passing unparseable values through
fn format_date(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    match parse_mail_date(raw) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => {
            warn!("Could not parse date: {}", raw);
            raw.to_string()
        }
    }
}

fn day_key(raw: &str) -> Option<String> {
    match parse_mail_date(raw) {
        Some(dt) => Some(dt.format("%Y-%m-%d").to_string()),
        None => {
            warn!("Could not parse date: {}", raw);
            None
        }
    }
}

/// Per-day (replied, ignored) counts, keyed by day in ascending order.
/// Records without a parseable date are left out.
fn daily_counts(log: &ReplyLog) -> BTreeMap<String, (usize, usize)> {
    let mut days: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for record in &log.replied_mails {
        if let Some(day) = record.date.as_deref().and_then(day_key) {
            days.entry(day).or_default().0 += 1;
        }
    }
    for record in &log.ignored_mails {
        if let Some(day) = record.date.as_deref().and_then(day_key) {
            days.entry(day).or_default().1 += 1;
        }
    }
    days
}

fn category_counts<'a>(categories: impl Iterator<Item = &'a str>) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for category in categories {
        *counts.entry(category.to_string()).or_default() += 1;
    }
    counts
}
