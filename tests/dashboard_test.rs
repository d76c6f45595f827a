mod common;

use common::{auth_error, fast_options, page, ScriptedService, TEST_DATABASE, TEST_OUTPUT};
use flowdash::config::{AthenaConfig, QuerySettings};
use flowdash::dashboard::{router, Dashboard, Panel};
use flowdash::metrics::Metrics;
use flowdash::runner::{QueryRunner, ResultCache};
use serde_json::Value as Json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

fn athena_config() -> AthenaConfig {
    AthenaConfig {
        region: "eu-north-1".to_string(),
        database: TEST_DATABASE.to_string(),
        output_location: TEST_OUTPUT.to_string(),
        workgroup: None,
    }
}

fn dashboard(service: Arc<ScriptedService>) -> Arc<Dashboard> {
    let metrics = Arc::new(Metrics::new().unwrap());
    let runner = QueryRunner::new(service, fast_options()).with_metrics(metrics.clone());
    Arc::new(Dashboard::new(
        runner,
        ResultCache::new(Duration::from_secs(300)),
        &athena_config(),
        QuerySettings::default(),
        metrics,
    ))
}

/// Serve the dashboard on an ephemeral port and return its base URL
async fn spawn_server(dashboard: Arc<Dashboard>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(dashboard)).await.unwrap();
    });
    format!("http://{}", addr)
}

fn talkers_service() -> ScriptedService {
    ScriptedService::succeeding(vec![page(
        &["srcaddr", "total_bytes"],
        vec![
            vec![Some("10.0.0.5"), Some("52000")],
            vec![Some("10.0.0.9"), Some("1200")],
        ],
    )])
}

async fn get_json(url: &str) -> Json {
    let response = reqwest::get(url).await.unwrap();
    assert!(response.status().is_success(), "GET {} failed", url);
    response.json().await.unwrap()
}

#[tokio::test]
async fn test_healthz() {
    let base = spawn_server(dashboard(Arc::new(talkers_service()))).await;

    let body = reqwest::get(format!("{}/healthz", base))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_index_serves_dashboard_page() {
    let base = spawn_server(dashboard(Arc::new(talkers_service()))).await;

    let response = reqwest::get(&base).await.unwrap();
    assert!(response.status().is_success());
    let body = response.text().await.unwrap();
    assert!(body.contains("Mini SIEM"));
    assert!(body.contains("/api/panels"));
}

#[tokio::test]
async fn test_all_panels_reports_every_panel() {
    let base = spawn_server(dashboard(Arc::new(talkers_service()))).await;

    let reports = get_json(&format!("{}/api/panels", base)).await;
    let reports = reports.as_array().unwrap();

    assert_eq!(reports.len(), Panel::ALL.len());
    let names: Vec<&str> = reports
        .iter()
        .map(|r| r["panel"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            "traffic_status",
            "top_talkers",
            "traffic_over_time",
            "ddos_candidates",
            "port_scan_candidates",
            "recent_logs"
        ]
    );
    for report in reports {
        assert_eq!(report["status"], "ok");
    }
}

#[tokio::test]
async fn test_single_panel_carries_coerced_table() {
    let base = spawn_server(dashboard(Arc::new(talkers_service()))).await;

    let report = get_json(&format!("{}/api/panels/top_talkers", base)).await;

    assert_eq!(report["title"], "Top 10 Traffic Sources");
    assert_eq!(report["status"], "ok");
    assert_eq!(report["table"]["columns"][1], "total_bytes");
    assert_eq!(report["table"]["rows"][0][0], "10.0.0.5");
    assert_eq!(report["table"]["rows"][0][1], 52000);
    assert!(report["message"].is_null());
}

#[tokio::test]
async fn test_unknown_panel_is_not_found() {
    let base = spawn_server(dashboard(Arc::new(talkers_service()))).await;

    let response = reqwest::get(format!("{}/api/panels/bogus", base))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_empty_panel_reports_message() {
    let service = ScriptedService::succeeding(vec![page(&["srcaddr", "dstport_count"], vec![])]);
    let base = spawn_server(dashboard(Arc::new(service))).await;

    let report = get_json(&format!("{}/api/panels/port_scan_candidates", base)).await;

    assert_eq!(report["status"], "empty");
    assert_eq!(report["message"], "No scanning detected.");
    assert_eq!(report["table"]["columns"][0], "srcaddr");
    assert_eq!(report["table"]["rows"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_failed_panel_is_retried_on_next_request() {
    let service = Arc::new(talkers_service().with_submit_errors(vec![auth_error()]));
    let base = spawn_server(dashboard(service.clone())).await;
    let url = format!("{}/api/panels/top_talkers", base);

    let first = get_json(&url).await;
    assert_eq!(first["status"], "error");
    assert!(first["message"]
        .as_str()
        .unwrap()
        .contains("UnrecognizedClientException"));

    let second = get_json(&url).await;
    assert_eq!(second["status"], "ok");
    assert_eq!(second["cached"], false);
    assert_eq!(service.starts(), 2);
}

#[tokio::test]
async fn test_repeat_request_is_served_from_cache() {
    let service = Arc::new(talkers_service());
    let base = spawn_server(dashboard(service.clone())).await;
    let url = format!("{}/api/panels/top_talkers", base);

    let first = get_json(&url).await;
    let second = get_json(&url).await;

    assert_eq!(first["cached"], false);
    assert_eq!(second["cached"], true);
    assert_eq!(first["table"], second["table"]);
    assert_eq!(service.starts(), 1);
}

#[tokio::test]
async fn test_metrics_endpoint_exports_counters() {
    let base = spawn_server(dashboard(Arc::new(talkers_service()))).await;
    let url = format!("{}/api/panels/top_talkers", base);
    get_json(&url).await;
    get_json(&url).await;

    let body = reqwest::get(format!("{}/metrics", base))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(body.contains("flowdash_query_executions_total{outcome=\"succeeded\"} 1"));
    assert!(body.contains("flowdash_cache_lookups_total{result=\"hit\"} 1"));
    assert!(body.contains("flowdash_cache_lookups_total{result=\"miss\"} 1"));
    assert!(body.contains("flowdash_query_duration_seconds"));
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight_runs() {
    let service = Arc::new(ScriptedService::stuck());
    let metrics = Arc::new(Metrics::new().unwrap());
    let shutdown = tokio_util::sync::CancellationToken::new();
    let dashboard = Dashboard::new(
        QueryRunner::new(service.clone(), fast_options()),
        ResultCache::new(Duration::from_secs(300)),
        &athena_config(),
        QuerySettings::default(),
        metrics,
    )
    .with_shutdown(shutdown.clone());

    let canceller = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });
    let report = dashboard.report(Panel::RecentLogs).await;

    assert_eq!(report.status, flowdash::dashboard::PanelStatus::Error);
    assert_eq!(service.stops(), 1);
}

#[tokio::test]
async fn test_dropped_report_leaves_one_run_for_the_next_caller() {
    let service = Arc::new(ScriptedService::stuck());
    let shutdown = tokio_util::sync::CancellationToken::new();
    let dashboard = Arc::new(
        Dashboard::new(
            QueryRunner::new(service.clone(), fast_options()),
            ResultCache::new(Duration::from_secs(300)),
            &athena_config(),
            QuerySettings::default(),
            Arc::new(Metrics::new().unwrap()),
        )
        .with_shutdown(shutdown.clone()),
    );

    let first = {
        let dashboard = dashboard.clone();
        tokio::spawn(async move { dashboard.report(Panel::RecentLogs).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    first.abort();

    let second = {
        let dashboard = dashboard.clone();
        tokio::spawn(async move { dashboard.report(Panel::RecentLogs).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(service.starts(), 1);
    assert_eq!(service.stops(), 0);

    shutdown.cancel();
    let report = second.await.unwrap();

    assert_eq!(report.status, flowdash::dashboard::PanelStatus::Error);
    assert!(report.cached);
    assert_eq!(service.starts(), 1);
    assert_eq!(service.stops(), 1);
}
