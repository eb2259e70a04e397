//! Live browser adapters speaking the W3C WebDriver protocol to `chromedriver`.

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::ports::browser::{
    BoxError, BrowserLauncher, BrowserSession, DriverFuture, DriverService,
};

/// How long to wait for a freshly spawned driver to answer `/status`.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(20);
const STARTUP_POLL: Duration = Duration::from_millis(100);

/// Starts a local `chromedriver` process per harness run.
#[derive(Debug, Clone)]
pub struct ChromeDriverLauncher {
    binary: PathBuf,
    client: Client,
}

impl ChromeDriverLauncher {
    /// Creates a launcher for the given driver binary.
    #[must_use]
    pub fn new(binary: PathBuf) -> Self {
        Self { binary, client: Client::new() }
    }
}

impl BrowserLauncher for ChromeDriverLauncher {
    fn start(&self) -> DriverFuture<'_, Box<dyn DriverService>> {
        Box::pin(async move {
            let port = free_port()?;
            let child = Command::new(&self.binary)
                .arg(format!("--port={port}"))
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::inherit())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| format!("failed to start {}: {e}", self.binary.display()))?;
            let base_url = format!("http://127.0.0.1:{port}");
            wait_until_ready(&self.client, &base_url).await?;
            log::debug!("chromedriver listening on {base_url}");
            let service = ChromeDriverService {
                base_url,
                client: self.client.clone(),
                child: Mutex::new(Some(child)),
            };
            Ok(Box::new(service) as Box<dyn DriverService>)
        })
    }
}

fn free_port() -> Result<u16, BoxError> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

async fn wait_until_ready(client: &Client, base_url: &str) -> Result<(), BoxError> {
    let deadline = tokio::time::Instant::now() + STARTUP_TIMEOUT;
    loop {
        if let Ok(value) = send(client, Method::GET, &format!("{base_url}/status"), None).await {
            if value.get("ready").and_then(Value::as_bool).unwrap_or(true) {
                return Ok(());
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(format!("chromedriver at {base_url} did not become ready").into());
        }
        tokio::time::sleep(STARTUP_POLL).await;
    }
}

/// A running `chromedriver` process.
pub struct ChromeDriverService {
    base_url: String,
    client: Client,
    child: Mutex<Option<Child>>,
}

impl DriverService for ChromeDriverService {
    fn new_session(&self) -> DriverFuture<'_, Box<dyn BrowserSession>> {
        Box::pin(async move {
            let value = send(
                &self.client,
                Method::POST,
                &format!("{}/session", self.base_url),
                Some(session_capabilities()),
            )
            .await?;
            let id = value
                .get("sessionId")
                .and_then(Value::as_str)
                .ok_or("new session response has no sessionId")?;
            let session = WebDriverSession {
                client: self.client.clone(),
                url: format!("{}/session/{id}", self.base_url),
            };
            Ok(Box::new(session) as Box<dyn BrowserSession>)
        })
    }

    fn stop(&self) -> DriverFuture<'_, ()> {
        Box::pin(async move {
            if let Some(mut child) = self.child.lock().await.take() {
                child.kill().await?;
            }
            Ok(())
        })
    }
}

/// Capabilities for a headless Chrome session with browser logging enabled.
#[must_use]
pub fn session_capabilities() -> Value {
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "goog:chromeOptions": { "args": ["--headless", "--disable-gpu"] },
                "goog:loggingPrefs": { "browser": "ALL" }
            }
        }
    })
}

/// One WebDriver session.
struct WebDriverSession {
    client: Client,
    url: String,
}

impl BrowserSession for WebDriverSession {
    fn navigate<'a>(&'a mut self, url: &'a str) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            send(&self.client, Method::POST, &format!("{}/url", self.url), Some(json!({ "url": url })))
                .await?;
            Ok(())
        })
    }

    fn set_script_timeout(&mut self, timeout: Duration) -> DriverFuture<'_, ()> {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        Box::pin(async move {
            send(
                &self.client,
                Method::POST,
                &format!("{}/timeouts", self.url),
                Some(json!({ "script": millis })),
            )
            .await?;
            Ok(())
        })
    }

    fn execute_async_script<'a>(&'a mut self, script: &'a str) -> DriverFuture<'a, Value> {
        Box::pin(async move {
            send(
                &self.client,
                Method::POST,
                &format!("{}/execute/async", self.url),
                Some(json!({ "script": script, "args": [] })),
            )
            .await
        })
    }

    fn browser_logs(&mut self) -> DriverFuture<'_, Vec<String>> {
        Box::pin(async move {
            let value = send(
                &self.client,
                Method::POST,
                &format!("{}/se/log", self.url),
                Some(json!({ "type": "browser" })),
            )
            .await?;
            let entries: Vec<LogEntry> = serde_json::from_value(value)?;
            Ok(entries.iter().map(LogEntry::render).collect())
        })
    }

    fn quit(self: Box<Self>) -> DriverFuture<'static, ()> {
        Box::pin(async move {
            send(&self.client, Method::DELETE, &self.url, None).await?;
            Ok(())
        })
    }
}

/// A browser console entry as returned by the driver.
#[derive(Debug, Deserialize)]
pub struct LogEntry {
    /// Severity, e.g. `INFO` or `SEVERE`.
    pub level: String,
    /// Logged text.
    pub message: String,
    /// Milliseconds since the epoch.
    #[serde(default)]
    pub timestamp: i64,
}

impl LogEntry {
    /// Renders the entry as `[<time>] [<LEVEL>] <message>`.
    #[must_use]
    pub fn render(&self) -> String {
        let time = DateTime::<Utc>::from_timestamp_millis(self.timestamp)
            .map_or_else(|| self.timestamp.to_string(), |t| t.to_rfc3339());
        format!("[{time}] [{}] {}", self.level, self.message)
    }
}

/// Error payload of a failed WebDriver command.
#[derive(Debug, Deserialize)]
struct WebDriverError {
    error: String,
    #[serde(default)]
    message: String,
}

/// Sends a WebDriver command and returns its `value`.
async fn send(
    client: &Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value, BoxError> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request
        .send()
        .await
        .map_err(|e| -> BoxError { format!("WebDriver request to {url} failed: {e}").into() })?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| -> BoxError { format!("failed to read WebDriver response: {e}").into() })?;
    decode_response(status.is_success(), &text)
}

/// Extracts `value` from a WebDriver response body, turning protocol errors
/// into `"<error>: <message>"`.
fn decode_response(success: bool, text: &str) -> Result<Value, BoxError> {
    let body: Value = serde_json::from_str(text)
        .map_err(|e| -> BoxError { format!("invalid WebDriver response: {e}").into() })?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);
    if let Ok(err) = serde_json::from_value::<WebDriverError>(value.clone()) {
        return Err(format!("{}: {}", err.error, err.message).into());
    }
    if !success {
        return Err(format!("WebDriver command failed: {text}").into());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_request_headless_chrome_with_browser_logs() {
        let caps = session_capabilities();
        let always = &caps["capabilities"]["alwaysMatch"];
        assert_eq!(always["browserName"], "chrome");
        assert_eq!(always["goog:loggingPrefs"]["browser"], "ALL");
        assert!(always["goog:chromeOptions"]["args"]
            .as_array()
            .unwrap()
            .contains(&json!("--headless")));
    }

    #[test]
    fn renders_log_entries() {
        let entry = LogEntry {
            level: "SEVERE".into(),
            message: "boom".into(),
            timestamp: 1_700_000_000_000,
        };
        assert_eq!(entry.render(), "[2023-11-14T22:13:20+00:00] [SEVERE] boom");
    }

    #[test]
    fn decodes_successful_value() {
        let value = decode_response(true, r#"{"value": true}"#).unwrap();
        assert_eq!(value, json!(true));
        assert_eq!(decode_response(true, r#"{"value": null}"#).unwrap(), Value::Null);
    }

    #[test]
    fn decodes_protocol_errors() {
        let err = decode_response(
            false,
            r#"{"value": {"error": "script timeout", "message": "timed out", "stacktrace": ""}}"#,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "script timeout: timed out");
    }

    #[test]
    fn non_json_body_is_an_error() {
        assert!(decode_response(false, "<html>").is_err());
    }

    #[test]
    fn free_port_is_nonzero() {
        assert_ne!(free_port().unwrap(), 0);
    }
}
