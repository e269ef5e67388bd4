//! Workbook table gateway
//!
//! Appends one row per event to a table of a cloud-hosted workbook through
//! its REST API. Server errors are retried with exponential backoff; the
//! circuit breaker's timeout bounds the whole call including retries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use super::{SyncError, SyncGateway};
use crate::config::SyncConfig;
use crate::domain::{BreakEvent, EventKind};

/// Maximum number of retries for transient errors
const MAX_RETRIES: u32 = 3;

/// Initial backoff delay for retries
const INITIAL_BACKOFF: Duration = Duration::from_millis(1000);

pub struct GraphSyncGateway {
    http: Client,
    token: String,
    rows_url: String,
    initial_backoff: Duration,
}

impl GraphSyncGateway {
    /// Create a gateway from configuration
    ///
    /// Reads the bearer token from the environment variable named in config.
    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        debug!(file_id = %config.file_id, table = %config.table_name, "GraphSyncGateway::from_config: called");
        if config.file_id.trim().is_empty() {
            return Err(SyncError::NotConfigured("sync.file-id is empty".to_string()));
        }
        let token = config
            .get_token()
            .map_err(|e| SyncError::NotConfigured(e.to_string()))?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(SyncError::Network)?;

        Ok(Self::new(http, &config.base_url, &config.file_id, &config.table_name, token))
    }

    pub fn new(http: Client, base_url: &str, file_id: &str, table_name: &str, token: String) -> Self {
        let rows_url = format!(
            "{}/me/drive/items/{}/workbook/tables/{}/rows/add",
            base_url.trim_end_matches('/'),
            file_id,
            table_name
        );
        Self {
            http,
            token,
            rows_url,
            initial_backoff: INITIAL_BACKOFF,
        }
    }

    /// Override the first retry delay; later retries double it
    pub fn with_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    pub fn rows_url(&self) -> &str {
        &self.rows_url
    }
}

/// Row body for one event: timestamp, person, name, category, action, duration, reason
pub fn row_body(event: &BreakEvent) -> serde_json::Value {
    let duration = match (event.kind, event.duration_minutes) {
        (EventKind::Back, Some(minutes)) => format!("{:.2}", minutes),
        _ => String::new(),
    };
    json!({
        "values": [[
            event.timestamp,
            event.person_id.to_string(),
            event.display_name,
            event.category.label(),
            event.kind.to_string(),
            duration,
            event.reason.clone().unwrap_or_default(),
        ]]
    })
}

#[async_trait]
impl SyncGateway for GraphSyncGateway {
    async fn push(&self, event: &BreakEvent) -> Result<(), SyncError> {
        debug!(person = event.person_id, kind = %event.kind, "push: called");
        let body = row_body(event);

        let mut attempt = 0;
        loop {
            let err = match self
                .http
                .post(&self.rows_url)
                .bearer_auth(&self.token)
                .json(&body)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status().as_u16();

                    if status == 429 {
                        let retry_after = response
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .unwrap_or(60);
                        debug!(retry_after, "push: rate limited (429)");
                        return Err(SyncError::RateLimited {
                            retry_after: Duration::from_secs(retry_after),
                        });
                    }

                    if response.status().is_success() {
                        debug!("push: success");
                        return Ok(());
                    }

                    let message = response.text().await.unwrap_or_default();
                    SyncError::ApiError { status, message }
                }
                Err(e) => SyncError::Network(e),
            };

            if !err.is_retryable() {
                debug!(error = %err, "push: API error");
                return Err(err);
            }
            if attempt == MAX_RETRIES {
                return Err(SyncError::RetriesExhausted {
                    attempts: attempt + 1,
                    last: Box::new(err),
                });
            }

            attempt += 1;
            let backoff = self.initial_backoff * 2u32.pow(attempt - 1);
            warn!(attempt, ?backoff, error = %err, "push: retrying after transient error");
            tokio::time::sleep(backoff).await;
        }
    }

    fn name(&self) -> &str {
        "workbook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BreakCategory;
    use chrono::NaiveDate;
    use serial_test::serial;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn at() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 15).unwrap().and_hms_opt(12, 18, 30).unwrap()
    }

    #[test]
    fn test_row_body_for_back() {
        let event = BreakEvent::back(42, "Ana", BreakCategory::Meal, at(), 18.5, None);
        let body = row_body(&event);
        assert_eq!(
            body["values"][0],
            json!(["2026-10-15 12:18:30", "42", "Ana", "Eating", "BACK", "18.50", ""])
        );
    }

    #[test]
    fn test_row_body_for_out_has_no_duration() {
        let event = BreakEvent::out(7, "Ben", BreakCategory::Other, at(), Some("bank".to_string()));
        let body = row_body(&event);
        assert_eq!(body["values"][0][4], "OUT");
        assert_eq!(body["values"][0][5], "");
        assert_eq!(body["values"][0][6], "bank");
    }

    #[test]
    fn test_rows_url() {
        let gateway = GraphSyncGateway::new(Client::new(), "https://example.test/v1.0/", "F1", "BreakLog", "t".into());
        assert_eq!(
            gateway.rows_url(),
            "https://example.test/v1.0/me/drive/items/F1/workbook/tables/BreakLog/rows/add"
        );
    }

    #[test]
    #[serial]
    fn test_from_config_requires_token() {
        let config = SyncConfig {
            enabled: true,
            file_id: "F1".to_string(),
            token_env: "BREAKTIME_TEST_GRAPH_TOKEN".to_string(),
            ..SyncConfig::default()
        };

        unsafe { std::env::remove_var("BREAKTIME_TEST_GRAPH_TOKEN") };
        assert!(matches!(
            GraphSyncGateway::from_config(&config),
            Err(SyncError::NotConfigured(_))
        ));

        unsafe { std::env::set_var("BREAKTIME_TEST_GRAPH_TOKEN", "token") };
        assert!(GraphSyncGateway::from_config(&config).is_ok());
        unsafe { std::env::remove_var("BREAKTIME_TEST_GRAPH_TOKEN") };
    }

    /// Answer every request on a local port with `status` and count the requests
    async fn canned_server(status: &'static str) -> (String, Arc<AtomicU32>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}/v1.0", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                read_request(&mut stream).await;
                let response = format!("HTTP/1.1 {}\r\nContent-Length: 4\r\nConnection: close\r\n\r\nnope", status);
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        (base_url, hits)
    }

    /// Consume headers and the declared body so the client sees a clean close
    async fn read_request(stream: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let Ok(n) = stream.read(&mut chunk).await else { return };
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    fn gateway(base_url: &str) -> GraphSyncGateway {
        let http = Client::builder().no_proxy().build().unwrap();
        GraphSyncGateway::new(http, base_url, "F1", "BreakLog", "t".into()).with_backoff(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_retries() {
        let (base_url, hits) = canned_server("503 Service Unavailable").await;
        let event = BreakEvent::out(7, "Ben", BreakCategory::Meal, at(), None);

        let err = gateway(&base_url).push(&event).await.unwrap_err();
        match err {
            SyncError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, MAX_RETRIES + 1);
                assert!(matches!(*last, SyncError::ApiError { status: 503, .. }));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), MAX_RETRIES + 1);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let (base_url, hits) = canned_server("400 Bad Request").await;
        let event = BreakEvent::out(7, "Ben", BreakCategory::Meal, at(), None);

        let err = gateway(&base_url).push(&event).await.unwrap_err();
        assert!(matches!(err, SyncError::ApiError { status: 400, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_pushes_once() {
        let (base_url, hits) = canned_server("201 Created").await;
        let event = BreakEvent::back(7, "Ben", BreakCategory::Meal, at(), 12.0, None);

        gateway(&base_url).push(&event).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
