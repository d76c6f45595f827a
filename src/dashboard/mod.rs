//! HTTP surface: the dashboard page, panel data as JSON, metrics and a
//! health probe.

mod page;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, NaiveDateTime, Utc};
use log::info;
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::{AthenaConfig, QuerySettings};
use crate::metrics::Metrics;
use crate::models::{QueryRequest, ResultTable, Value};
use crate::queries;
use crate::runner::{CacheStatus, QueryRunner, ResultCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Panel {
    TrafficStatus,
    TopTalkers,
    TrafficOverTime,
    DdosCandidates,
    PortScanCandidates,
    RecentLogs,
}

impl Panel {
    pub const ALL: [Panel; 6] = [
        Panel::TrafficStatus,
        Panel::TopTalkers,
        Panel::TrafficOverTime,
        Panel::DdosCandidates,
        Panel::PortScanCandidates,
        Panel::RecentLogs,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Panel::TrafficStatus => "traffic_status",
            Panel::TopTalkers => "top_talkers",
            Panel::TrafficOverTime => "traffic_over_time",
            Panel::DdosCandidates => "ddos_candidates",
            Panel::PortScanCandidates => "port_scan_candidates",
            Panel::RecentLogs => "recent_logs",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Panel::ALL.into_iter().find(|panel| panel.name() == name)
    }

    pub fn title(self) -> &'static str {
        match self {
            Panel::TrafficStatus => "Accepted vs Rejected Traffic",
            Panel::TopTalkers => "Top 10 Traffic Sources",
            Panel::TrafficOverTime => "Traffic Volume Over Time",
            Panel::DdosCandidates => "Potential DDoS Activity",
            Panel::PortScanCandidates => "Potential Port Scanning",
            Panel::RecentLogs => "Last 50 Flow Log Entries",
        }
    }

    /// Shown when the query succeeded but found nothing
    pub fn empty_message(self) -> &'static str {
        match self {
            Panel::TrafficStatus => "No data available.",
            Panel::TopTalkers => "No top talkers.",
            Panel::TrafficOverTime => "Not enough data.",
            Panel::DdosCandidates => "No DDoS signs.",
            Panel::PortScanCandidates => "No scanning detected.",
            Panel::RecentLogs => "No logs found.",
        }
    }

    pub fn query(self, settings: &QuerySettings) -> String {
        match self {
            Panel::TrafficStatus => queries::traffic_status(settings),
            Panel::TopTalkers => queries::top_talkers(settings),
            Panel::TrafficOverTime => queries::traffic_over_time(settings),
            Panel::DdosCandidates => queries::ddos_candidates(settings),
            Panel::PortScanCandidates => queries::port_scan_candidates(settings),
            Panel::RecentLogs => queries::recent_logs(settings),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelStatus {
    Ok,
    Empty,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct PanelReport {
    pub panel: Panel,
    pub title: &'static str,
    pub status: PanelStatus,
    pub message: Option<String>,
    pub table: ResultTable,
    pub cached: bool,
    pub generated_at: DateTime<Utc>,
}

/// Runs panel queries through the result cache.
pub struct Dashboard {
    runner: QueryRunner,
    cache: ResultCache,
    database: String,
    output_location: String,
    settings: QuerySettings,
    metrics: Arc<Metrics>,
    shutdown: CancellationToken,
}

impl Dashboard {
    pub fn new(
        runner: QueryRunner,
        cache: ResultCache,
        athena: &AthenaConfig,
        settings: QuerySettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            runner,
            cache,
            database: athena.database.clone(),
            output_location: athena.output_location.clone(),
            settings,
            metrics,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token whose cancellation stops every in-flight run
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn request_for(&self, panel: Panel) -> QueryRequest {
        QueryRequest::new(
            panel.query(&self.settings),
            self.database.clone(),
            self.output_location.clone(),
        )
    }

    pub async fn report(&self, panel: Panel) -> PanelReport {
        let request = self.request_for(panel);
        let run = {
            let runner = self.runner.clone();
            let request = request.clone();
            let shutdown = self.shutdown.clone();
            move || async move { runner.run(&request, &shutdown).await }
        };
        let (outcome, cache_status) = self.cache.get_or_run(&request, run).await;

        let cached = cache_status == CacheStatus::Hit;
        self.metrics.record_cache_lookup(cached);

        let (status, message, table) = match outcome {
            Ok(table) if table.is_empty() => (
                PanelStatus::Empty,
                Some(panel.empty_message().to_string()),
                shape(panel, &table),
            ),
            Ok(table) => (PanelStatus::Ok, None, shape(panel, &table)),
            Err(e) => (
                PanelStatus::Error,
                Some(format!("Query failed: {}", e)),
                ResultTable::empty(),
            ),
        };

        PanelReport {
            panel,
            title: panel.title(),
            status,
            message,
            table,
            cached,
            generated_at: Utc::now(),
        }
    }

    /// Every panel, with the queries running concurrently
    pub async fn report_all(&self) -> Vec<PanelReport> {
        let (status, talkers, over_time, ddos, scan, recent) = tokio::join!(
            self.report(Panel::TrafficStatus),
            self.report(Panel::TopTalkers),
            self.report(Panel::TrafficOverTime),
            self.report(Panel::DdosCandidates),
            self.report(Panel::PortScanCandidates),
            self.report(Panel::RecentLogs),
        );
        vec![status, talkers, over_time, ddos, scan, recent]
    }
}

fn shape(panel: Panel, table: &ResultTable) -> ResultTable {
    match panel {
        Panel::TrafficOverTime => table.map_column("time_bucket", normalize_timestamp),
        _ => table.clone(),
    }
}

/// Rewrite a service timestamp such as `2024-05-01 12:34:00.000` as
/// RFC 3339. Values that don't parse are returned unchanged.
pub fn normalize_timestamp(value: &Value) -> Value {
    let Some(raw) = value.as_str() else {
        return value.clone();
    };
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix(" UTC").unwrap_or(trimmed);

    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f") {
        return Value::Text(naive.and_utc().to_rfc3339());
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Value::Text(parsed.with_timezone(&Utc).to_rfc3339());
    }
    value.clone()
}

pub fn router(dashboard: Arc<Dashboard>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/panels", get(all_panels))
        .route("/api/panels/:name", get(one_panel))
        .route("/metrics", get(export_metrics))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(dashboard)
}

/// Serve the dashboard until `shutdown` is cancelled
pub async fn serve(
    dashboard: Arc<Dashboard>,
    listen_addr: &str,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to bind dashboard listener on {}", listen_addr))?;
    info!("Dashboard listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(dashboard))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Dashboard server failed")
}

async fn index() -> impl IntoResponse {
    Html(page::DASHBOARD_HTML)
}

async fn all_panels(State(dashboard): State<Arc<Dashboard>>) -> Json<Vec<PanelReport>> {
    Json(dashboard.report_all().await)
}

async fn one_panel(
    State(dashboard): State<Arc<Dashboard>>,
    Path(name): Path<String>,
) -> Result<Json<PanelReport>, (StatusCode, String)> {
    let panel = Panel::from_name(&name)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Unknown panel: {}", name)))?;
    Ok(Json(dashboard.report(panel).await))
}

async fn export_metrics(
    State(dashboard): State<Arc<Dashboard>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let body = dashboard
        .metrics()
        .export()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
