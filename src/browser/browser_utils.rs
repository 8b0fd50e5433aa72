use anyhow::{Context, Result, anyhow};
use log::debug;
use regex::Regex;
use serde::Deserialize;
use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use crate::browser::browser_config::BrowserConfig;

pub(crate) fn spawn_browser_process(config: &BrowserConfig) -> Result<Child> {
    #[cfg(windows)]
    let mut cmd = {
        use std::os::windows::process::CommandExt;
        let mut c = Command::new(&config.executable_path);
        c.creation_flags(0x08000000); // CREATE_NO_WINDOW
        c
    };
    #[cfg(not(windows))]
    let mut cmd = Command::new(&config.executable_path);

    cmd.args(config.get_browser_args())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to spawn {}", config.executable_path.display()))
}

/// Read the spawned browser's stderr until the DevTools WebSocket URL shows up.
pub(crate) async fn get_websocket_url(stderr: std::process::ChildStderr) -> Result<String> {
    tokio::task::spawn_blocking(move || scan_for_ws_url(BufReader::new(stderr))).await?
}

fn scan_for_ws_url<R: BufRead>(reader: R) -> Result<String> {
    let re = Regex::new(r"listening on (.*/devtools/browser/.*)$")?;
    for line in reader.lines() {
        let line = line?;
        if let Some(caps) = re.captures(&line) {
            return Ok(caps[1].to_string());
        }
    }
    Err(anyhow!("DevTools URL not found in browser stderr"))
}

/// Resolve a remote debugging endpoint to its WebSocket URL. A `ws://` URL is
/// used as-is; anything else is asked for its `webSocketDebuggerUrl`.
pub(crate) async fn discover_websocket_url(endpoint: &str) -> Result<String> {
    if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        return Ok(endpoint.to_string());
    }

    let url = format!("{}/json/version", endpoint.trim_end_matches('/'));
    debug!("Requesting browser version info from {url}");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .context("Failed to build HTTP client")?;
    let resp = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Failed to reach debugging endpoint {endpoint}"))?;
    if !resp.status().is_success() {
        return Err(anyhow!("Endpoint {} returned {}", url, resp.status()));
    }

    let body: JsonVersion = resp
        .json()
        .await
        .context("Failed to parse /json/version response")?;
    Ok(body.web_socket_debugger_url)
}

#[derive(Deserialize)]
struct JsonVersion {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn scans_the_devtools_url_out_of_stderr() {
        let stderr = "\
[0804/120000.000000:WARNING:foo.cc(12)] something harmless\n\
DevTools listening on ws://127.0.0.1:8431/devtools/browser/6a0d8f3c\n\
[0804/120001.000000:INFO:bar.cc(34)] later noise\n";
        let url = scan_for_ws_url(Cursor::new(stderr)).unwrap();
        assert_eq!(url, "ws://127.0.0.1:8431/devtools/browser/6a0d8f3c");
    }

    #[test]
    fn missing_devtools_line_is_an_error() {
        let err = scan_for_ws_url(Cursor::new("no url here\n")).unwrap_err();
        assert!(err.to_string().contains("DevTools URL not found"));
    }

    #[test]
    fn version_payload_deserializes() {
        let body: JsonVersion = serde_json::from_str(
            r#"{"Browser":"Chrome/122.0.0.0","webSocketDebuggerUrl":"ws://h:9222/devtools/browser/x"}"#,
        )
        .unwrap();
        assert_eq!(body.web_socket_debugger_url, "ws://h:9222/devtools/browser/x");
    }

    #[tokio::test]
    async fn websocket_endpoints_pass_through_unchanged() {
        let url = "ws://127.0.0.1:9222/devtools/browser/abc";
        assert_eq!(discover_websocket_url(url).await.unwrap(), url);
    }
}
