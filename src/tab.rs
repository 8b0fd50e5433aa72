use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use crate::transport::Transport;

const LOAD_EVENT_TIMEOUT: Duration = Duration::from_secs(30);

/// A browser tab (target) attached in flat session mode.
pub struct Tab {
    transport: Arc<Transport>,
    session_id: String,
    target_id: String,
}

impl Tab {
    pub(crate) async fn new(transport: Arc<Transport>) -> Result<Self> {
        let res_create = transport
            .send("Target.createTarget", json!({ "url": "about:blank" }))
            .await?;
        let target_id = res_create["targetId"]
            .as_str()
            .context("No targetId")?
            .to_string();

        let res_attach = transport
            .send(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session_id = res_attach["sessionId"]
            .as_str()
            .context("No sessionId")?
            .to_string();

        Ok(Self {
            transport,
            session_id,
            target_id,
        })
    }

    async fn send_cmd(&self, method: &str, params: Value) -> Result<Value> {
        self.transport
            .send_to_session(&self.session_id, method, params)
            .await
    }

    /// Navigate to the URL and wait for the page load event.
    pub async fn goto(&self, url: &str) -> Result<&Self> {
        self.send_cmd("Page.enable", json!({})).await?;

        // Register the listener before triggering the event to avoid a race.
        let event_rx = self
            .transport
            .listen_for_event(&self.session_id, "Page.loadEventFired")
            .await?;

        self.send_cmd("Page.navigate", json!({ "url": url })).await?;

        time::timeout(LOAD_EVENT_TIMEOUT, event_rx)
            .await
            .map_err(|_| anyhow!("Timeout waiting for event Page.loadEventFired"))?
            .map_err(|_| anyhow!("Event channel closed"))?;

        Ok(self)
    }

    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self
            .send_cmd(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true
                }),
            )
            .await?;
        Ok(result["result"]["value"].clone())
    }

    pub async fn evaluate_as_string(&self, expression: &str) -> Result<String> {
        let value = self.evaluate(expression).await?;
        value
            .as_str()
            .map(|s| s.to_string())
            .or_else(|| Some(value.to_string()))
            .context("Failed to convert result to string")
    }

    pub async fn title(&self) -> Result<String> {
        self.evaluate_as_string("document.title").await
    }

    /// Pin the session to the given dimensions, the session-level analogue of
    /// resizing the window.
    pub async fn set_window_size(&self, width: u64, height: u64) -> Result<&Self> {
        self.send_cmd(
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": width,
                "height": height,
                "deviceScaleFactor": 1.0,
                "mobile": false
            }),
        )
        .await?;
        Ok(self)
    }

    pub async fn clear_window_size(&self) -> Result<&Self> {
        self.send_cmd("Emulation.clearDeviceMetricsOverride", json!({}))
            .await?;
        Ok(self)
    }

    /// Capture a PNG of the current view and return the decoded bytes.
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        let result = self
            .send_cmd(
                "Page.captureScreenshot",
                json!({
                    "format": "png",
                    "fromSurface": true
                }),
            )
            .await?;
        let data = result["data"].as_str().context("No image data received")?;
        BASE64_STANDARD
            .decode(data)
            .context("Invalid screenshot payload")
    }

    pub async fn close(&self) -> Result<()> {
        self.transport
            .send("Target.closeTarget", json!({ "targetId": self.target_id }))
            .await?;
        Ok(())
    }
}
