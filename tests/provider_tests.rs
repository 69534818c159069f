//! Provider client tests against a local mock HTTP server.

use chartfolio::error::BacktestError;
use chartfolio::provider::{ProviderClient, ProviderConfig, SeriesSource};
use chartfolio::retry::RetryPolicy;
use chartfolio::window::{Interval, RangeCode};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHART_OK: &str = r#"{"chart":{"result":[{"timestamp":[1704200400,1704286800,1704373200,1704459600],"indicators":{"quote":[{"close":[470.1,null,-1.0,472.3]}]}}],"error":null}}"#;

const SPARK_OK: &str = r#"{"spark":{"result":[{"symbol":"SPY","response":[{"timestamp":[1704200400,1704286800],"close":[470.1,471.0]}]}]}}"#;

fn client(hosts: Vec<String>, backoff_ms: &[u64]) -> ProviderClient {
    ProviderClient::new(ProviderConfig {
        hosts,
        request_timeout: Duration::from_secs(5),
        retry: RetryPolicy::from_millis(backoff_ms),
        ..ProviderConfig::default()
    })
    .unwrap()
}

fn chart_path(symbol: &str) -> String {
    format!("/v8/finance/chart/{}", symbol)
}

#[tokio::test]
async fn test_chart_success_is_cleaned() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(chart_path("SPY")))
        .and(query_param("range", "1y"))
        .and(query_param("interval", "1d"))
        .and(header("accept-language", "en-US,en;q=0.9"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CHART_OK))
        .expect(1)
        .mount(&server)
        .await;

    let series = client(vec![server.uri()], &[1])
        .fetch("SPY", Interval::OneDay, RangeCode::OneYear)
        .await
        .unwrap();

    // Null close kept as zero, negative close dropped.
    assert_eq!(series.symbol, "SPY");
    assert_eq!(series.timestamps, vec![1704200400, 1704286800, 1704459600]);
    assert_eq!(series.closes, vec![470.1, 0.0, 472.3]);
}

#[tokio::test]
async fn test_second_host_answers_when_first_fails() {
    let down = MockServer::start().await;
    let up = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(chart_path("AAPL")))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(1)
        .mount(&down)
        .await;
    Mock::given(method("GET"))
        .and(path(chart_path("AAPL")))
        .respond_with(ResponseTemplate::new(200).set_body_string(CHART_OK))
        .expect(1)
        .mount(&up)
        .await;

    let series = client(vec![down.uri(), up.uri()], &[1])
        .fetch("AAPL", Interval::OneDay, RangeCode::OneYear)
        .await
        .unwrap();
    assert_eq!(series.len(), 3);
}

#[tokio::test]
async fn test_rate_limit_retried_after_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(chart_path("SPY")))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(chart_path("SPY")))
        .respond_with(ResponseTemplate::new(200).set_body_string(CHART_OK))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(vec![server.uri()], &[1, 1, 1])
        .fetch("SPY", Interval::OneDay, RangeCode::OneYear)
        .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_banner_exhausts_chart_then_spark_answers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(chart_path("SPY")))
        .respond_with(ResponseTemplate::new(200).set_body_string("Edge: Too Many Requests"))
        .expect(4)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v7/finance/spark"))
        .and(query_param("symbols", "SPY"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SPARK_OK))
        .expect(1)
        .mount(&server)
        .await;

    let series = client(vec![server.uri()], &[1, 1, 1])
        .fetch("SPY", Interval::OneDay, RangeCode::OneYear)
        .await
        .unwrap();
    assert_eq!(series.closes, vec![470.1, 471.0]);
}

#[tokio::test]
async fn test_both_schemas_exhausted_reports_last_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(chart_path("SPY")))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>blocked</html>"))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v7/finance/spark"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(2)
        .mount(&server)
        .await;

    let err = client(vec![server.uri()], &[1])
        .fetch("SPY", Interval::OneDay, RangeCode::OneYear)
        .await
        .unwrap_err();

    match err {
        BacktestError::UpstreamStatus { status, preview, .. } => {
            assert_eq!(status, 503);
            assert_eq!(preview, "unavailable");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_empty_payload_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(chart_path("ZZZZ")))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"chart":{"result":[],"error":null}}"#),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v7/finance/spark"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SPARK_OK))
        .expect(0)
        .mount(&server)
        .await;

    let err = client(vec![server.uri()], &[1, 1])
        .fetch("ZZZZ", Interval::OneDay, RangeCode::OneYear)
        .await
        .unwrap_err();
    assert!(matches!(err, BacktestError::NoData(ref s) if s == "ZZZZ"));
}

#[tokio::test]
async fn test_cancelled_client_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CHART_OK))
        .expect(0)
        .mount(&server)
        .await;

    let token = CancellationToken::new();
    token.cancel();
    let err = client(vec![server.uri()], &[1])
        .with_cancellation(token)
        .fetch("SPY", Interval::OneDay, RangeCode::OneYear)
        .await
        .unwrap_err();
    assert!(matches!(err, BacktestError::Cancelled));
}
