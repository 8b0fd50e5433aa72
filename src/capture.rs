use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use log::{debug, info};
use std::path::Path;

use crate::browser::default_executable;
use crate::tab::Tab;
use crate::types::CaptureMode;

/// Fixed scratch file every capture strategy writes, overwritten per capture.
pub(crate) const SCREENSHOT_FILE: &str = "screenshot.png";

/// Capture a screenshot of `url` with the given strategy and return it as
/// base64-encoded PNG bytes. All strategies land their output in the scratch
/// file, which is read back for encoding.
pub(crate) async fn capture(tab: &Tab, url: &str, mode: CaptureMode) -> Result<String> {
    let scratch = Path::new(SCREENSHOT_FILE);
    match mode {
        CaptureMode::Viewport => {
            let png = tab.screenshot().await?;
            persist_and_encode(scratch, &png).await
        }
        CaptureMode::FullPage => {
            let width = measure(tab, "document.body.scrollWidth").await?;
            let height = measure(tab, "document.body.scrollHeight").await?;
            debug!("Resizing session to document size {width}x{height}");
            tab.set_window_size(width, height).await?;
            let shot = tab.screenshot().await;
            // Leave the session the way we found it even when capture failed.
            let _ = tab.clear_window_size().await;
            persist_and_encode(scratch, &shot?).await
        }
        CaptureMode::Command => {
            command_screenshot(url).await?;
            encode_file(scratch).await
        }
    }
}

async fn measure(tab: &Tab, expression: &str) -> Result<u64> {
    let value = tab.evaluate(expression).await?;
    value
        .as_f64()
        .map(|v| v.round() as u64)
        .with_context(|| format!("Expected a number from `{expression}`"))
}

/// Run a separate local browser with screenshot flags, independent of the
/// driven session. The browser writes the scratch file itself.
async fn command_screenshot(url: &str) -> Result<()> {
    let exe = default_executable()?;
    info!("Running {} --headless --screenshot {url}", exe.display());
    let status = tokio::process::Command::new(&exe)
        .args(["--headless", "--disable-gpu", "--screenshot", url])
        .status()
        .await
        .with_context(|| format!("Failed to run {}", exe.display()))?;
    if !status.success() {
        return Err(anyhow!("{} exited with {status}", exe.display()));
    }
    Ok(())
}

/// Write the PNG bytes to the scratch file, then read back and encode.
async fn persist_and_encode(path: &Path, png: &[u8]) -> Result<String> {
    tokio::fs::write(path, png)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    encode_file(path).await
}

async fn encode_file(path: &Path) -> Result<String> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(BASE64_STANDARD.encode(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[tokio::test]
    async fn scratch_file_round_trip_keeps_the_png_signature() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screenshot.png");

        let mut png = PNG_SIGNATURE.to_vec();
        png.extend_from_slice(&[0, 0, 0, 13]);

        let encoded = persist_and_encode(&path, &png).await.unwrap();
        let decoded = BASE64_STANDARD.decode(encoded).unwrap();
        assert!(decoded.starts_with(&PNG_SIGNATURE));
        assert_eq!(decoded, png);
    }

    #[tokio::test]
    async fn scratch_file_is_overwritten_per_capture() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screenshot.png");

        persist_and_encode(&path, b"first").await.unwrap();
        let encoded = persist_and_encode(&path, b"second").await.unwrap();
        assert_eq!(BASE64_STANDARD.decode(encoded).unwrap(), b"second");
    }

    #[tokio::test]
    async fn missing_scratch_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = encode_file(&dir.path().join("screenshot.png"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
