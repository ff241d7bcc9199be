use std::sync::{Arc, Mutex};
use std::time::Duration;

use logzio_shipper::{Config, EventTime, MetricsSink, Record, Shipper};
use mockito::{Matcher, Server};
use serde_json::json;
use tracing_test::traced_test;

/// Metrics sink that captures every status-code observation.
#[derive(Debug, Default)]
struct CaptureMetrics(Mutex<Vec<u16>>);

impl CaptureMetrics {
    fn statuses(&self) -> Vec<u16> {
        self.0.lock().unwrap().clone()
    }
}

impl MetricsSink for CaptureMetrics {
    fn record_status(&self, status_code: u16) {
        self.0.lock().unwrap().push(status_code);
    }
}

fn test_config(endpoint_url: String) -> Config {
    Config {
        include_time: false,
        include_tags: false,
        retry_sleep: Duration::from_millis(1),
        ..Config::new(endpoint_url)
    }
}

fn record(value: serde_json::Value) -> Record {
    value.as_object().cloned().unwrap()
}

fn entry(value: serde_json::Value) -> (String, EventTime, Record) {
    ("test".to_string(), EventTime::Seconds(0.0), record(value))
}

fn two_records() -> Vec<(String, EventTime, Record)> {
    vec![
        entry(json!({"field1": 50, "otherfield": 99})),
        entry(json!({"field1": 150, "otherfield": 199})),
    ]
}

#[tokio::test]
async fn shipper_posts_newline_joined_bulk() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_query(Matcher::UrlEncoded("token".into(), "123".into()))
        .match_header("content-type", "text/plain")
        .match_body("{\"field1\":50,\"otherfield\":99}\n{\"field1\":150,\"otherfield\":199}")
        .with_status(200)
        .create_async()
        .await;

    let shipper = Shipper::new(test_config(format!("{}/?token=123", server.url()))).unwrap();
    shipper.write(two_records()).await;

    mock.assert_async().await;
}

#[tokio::test]
async fn shipper_drops_record_over_bulk_limit() {
    let mut server = Server::new_async().await;
    // With tags enabled the first record is 51 bytes and fits the 52-byte
    // ceiling; the second is 53 bytes and can never be sent.
    let mock = server
        .mock("POST", "/")
        .match_query(Matcher::UrlEncoded("token".into(), "123".into()))
        .match_body("{\"field1\":50,\"otherfield\":99,\"fluentd_tags\":\"test\"}")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let config = Config {
        include_tags: true,
        bulk_limit: 52,
        ..test_config(format!("{}/?token=123", server.url()))
    };
    let shipper = Shipper::new(config).unwrap();
    shipper.write(two_records()).await;

    mock.assert_async().await;
}

#[tokio::test]
async fn shipper_retries_until_success() {
    let mut server = Server::new_async().await;
    let failures = server
        .mock("POST", "/")
        .match_query(Matcher::UrlEncoded("token".into(), "123".into()))
        .with_status(500)
        .with_body("Internal Server Error")
        .expect(3)
        .create_async()
        .await;
    let success = server
        .mock("POST", "/")
        .match_query(Matcher::UrlEncoded("token".into(), "123".into()))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let metrics = Arc::new(CaptureMetrics::default());
    let shipper = Shipper::with_metrics(
        test_config(format!("{}/?token=123", server.url())),
        Arc::clone(&metrics) as Arc<dyn MetricsSink>,
    )
    .unwrap();
    shipper.write(vec![entry(json!({"message": "hi"}))]).await;

    failures.assert_async().await;
    success.assert_async().await;
    assert_eq!(metrics.statuses(), vec![500, 500, 500, 200]);
}

#[traced_test]
#[tokio::test]
async fn shipper_gives_up_after_retry_count_attempts() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_query(Matcher::UrlEncoded("token".into(), "123".into()))
        .with_status(500)
        .with_body("Internal Server Error")
        .expect(4)
        .create_async()
        .await;

    let metrics = Arc::new(CaptureMetrics::default());
    let shipper = Shipper::with_metrics(
        test_config(format!("{}/?token=123", server.url())),
        Arc::clone(&metrics) as Arc<dyn MetricsSink>,
    )
    .unwrap();
    // Must absorb the failure: no panic, no error returned.
    shipper
        .write(vec![entry(json!({"message": "undeliverable"}))])
        .await;

    mock.assert_async().await;
    assert_eq!(metrics.statuses(), vec![500, 500, 500, 500]);
    // The abandoned bulk body is preserved in the error log.
    assert!(logs_contain("dropping bulk"));
    assert!(logs_contain("undeliverable"));
}

#[tokio::test]
async fn shipper_drops_bulk_on_unauthorized_without_retrying() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_query(Matcher::UrlEncoded("token".into(), "bad".into()))
        .with_status(401)
        .expect(1)
        .create_async()
        .await;

    let metrics = Arc::new(CaptureMetrics::default());
    let shipper = Shipper::with_metrics(
        test_config(format!("{}/?token=bad", server.url())),
        Arc::clone(&metrics) as Arc<dyn MetricsSink>,
    )
    .unwrap();
    shipper.write(vec![entry(json!({"message": "hi"}))]).await;

    mock.assert_async().await;
    assert_eq!(metrics.statuses(), vec![401]);
}

#[tokio::test]
async fn shipper_skips_salvage_when_nothing_was_flagged() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_query(Matcher::UrlEncoded("token".into(), "123".into()))
        .with_status(400)
        .with_body("{\"malformedLines\":0,\"oversizedLines\":0}")
        .expect(1)
        .create_async()
        .await;

    let metrics = Arc::new(CaptureMetrics::default());
    let shipper = Shipper::with_metrics(
        test_config(format!("{}/?token=123", server.url())),
        Arc::clone(&metrics) as Arc<dyn MetricsSink>,
    )
    .unwrap();
    shipper.write(vec![entry(json!({"message": "hi"}))]).await;

    mock.assert_async().await;
    assert_eq!(metrics.statuses(), vec![400]);
}

#[tokio::test]
async fn shipper_salvages_oversized_records_once() {
    let mut server = Server::new_async().await;
    let rejection = server
        .mock("POST", "/")
        .match_query(Matcher::UrlEncoded("token".into(), "123".into()))
        .with_status(400)
        .with_body("{\"oversizedLines\":1}")
        .expect(1)
        .create_async()
        .await;
    // The salvage bulk holds only the oversized record, its message cut to
    // 31999 bytes.
    let salvage = server
        .mock("POST", "/")
        .match_query(Matcher::UrlEncoded("token".into(), "123".into()))
        .match_body(Matcher::Regex(
            r#"^\{"message":"x{31999}"\}$"#.to_string(),
        ))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let metrics = Arc::new(CaptureMetrics::default());
    let shipper = Shipper::with_metrics(
        test_config(format!("{}/?token=123", server.url())),
        Arc::clone(&metrics) as Arc<dyn MetricsSink>,
    )
    .unwrap();
    shipper
        .write(vec![
            entry(json!({"message": "small"})),
            entry(json!({"message": "x".repeat(40_000)})),
        ])
        .await;

    rejection.assert_async().await;
    salvage.assert_async().await;
    assert_eq!(metrics.statuses(), vec![400, 200]);
}

#[tokio::test]
async fn shipper_compresses_body_when_gzip_is_enabled() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_query(Matcher::UrlEncoded("token".into(), "123".into()))
        .match_header("content-encoding", "gzip")
        .match_header("content-type", "text/plain")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let config = Config {
        gzip: true,
        ..test_config(format!("{}/?token=123", server.url()))
    };
    let shipper = Shipper::new(config).unwrap();
    shipper.write(two_records()).await;

    mock.assert_async().await;
}

#[tokio::test]
async fn shipper_makes_no_request_for_an_empty_flush() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_query(Matcher::UrlEncoded("token".into(), "123".into()))
        .expect(0)
        .create_async()
        .await;

    let shipper = Shipper::new(test_config(format!("{}/?token=123", server.url()))).unwrap();
    shipper.write(Vec::new()).await;

    mock.assert_async().await;
}

#[tokio::test]
async fn shipper_enriches_records_before_encoding() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_query(Matcher::UrlEncoded("token".into(), "123".into()))
        .match_body(
            "{\"message\":\"hi\",\"@timestamp\":\"1970-01-01T00:00:01.500Z\",\"fluentd_tags\":\"test\"}",
        )
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let config = Config {
        include_time: true,
        include_tags: true,
        ..test_config(format!("{}/?token=123", server.url()))
    };
    let shipper = Shipper::new(config).unwrap();
    shipper
        .write(vec![(
            "test".to_string(),
            EventTime::Precise {
                secs: 1,
                nanos: 500_000_000,
            },
            record(json!({"message": "hi"})),
        )])
        .await;

    mock.assert_async().await;
}
