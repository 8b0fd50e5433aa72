mod browser_config;
mod browser_utils;

use anyhow::{Context, Result, anyhow};
use std::process::Child;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use crate::tab::Tab;
use crate::transport::Transport;
use browser_config::BrowserConfig;

pub(crate) use browser_config::default_executable;

/// A spawned browser process and its disposable profile directory.
/// Both are reclaimed on drop, covering early-failure paths.
#[derive(Debug)]
struct Process {
    child: Child,
    _user_data_dir: TempDir,
}

impl Drop for Process {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A live browser session: either a locally spawned headless process or an
/// attachment to a remote debugging endpoint.
#[derive(Debug)]
pub struct Browser {
    transport: Arc<Transport>,
    process: Mutex<Option<Process>>,
}

impl Browser {
    /// Spawn a local headless browser and attach to its DevTools socket.
    pub async fn launch() -> Result<Self> {
        let config = BrowserConfig::new()?;
        let mut child = browser_utils::spawn_browser_process(&config)?;
        let stderr = child
            .stderr
            .take()
            .context("Failed to get stderr from browser process")?;
        let ws_url = browser_utils::get_websocket_url(stderr).await?;

        Ok(Self {
            transport: Arc::new(Transport::new(&ws_url).await?),
            process: Mutex::new(Some(Process {
                child,
                _user_data_dir: config.user_data_dir,
            })),
        })
    }

    /// Attach to a remote debugging endpoint. The remote process stays up
    /// after we disconnect.
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let ws_url = browser_utils::discover_websocket_url(endpoint).await?;
        Ok(Self {
            transport: Arc::new(Transport::new(&ws_url).await?),
            process: Mutex::new(None),
        })
    }

    /// Open a new blank tab.
    pub async fn new_tab(&self) -> Result<Tab> {
        Tab::new(self.transport.clone()).await
    }

    /// Tear the session down. A spawned browser is asked to quit, then killed
    /// and reaped; a remote one is only disconnected from.
    pub async fn close(&self) -> Result<()> {
        let owns_process = self
            .process
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false);

        self.transport.shutdown(owns_process).await;

        let mut guard = self
            .process
            .lock()
            .map_err(|_| anyhow!("Failed to lock browser process"))?;
        if let Some(mut process) = guard.take() {
            let _ = process.child.kill();
            process
                .child
                .wait()
                .context("Failed to wait for browser process exit")?;
        }
        Ok(())
    }
}
