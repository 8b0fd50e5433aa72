use anyhow::Result;
use log::{info, warn};
use std::time::Duration;
use tokio::time;

use crate::browser::Browser;
use crate::capture;
use crate::types::{ConnectTarget, FetchConfig, PageReport};

/// Drive a browser session through one configured fetch: navigate, wait, read
/// the title, run the requested captures, and tear everything down.
pub async fn fetch_page(config: &FetchConfig) -> Result<PageReport> {
    let browser = match &config.target {
        ConnectTarget::Endpoint(url) => {
            info!("Connecting to remote debugging endpoint {url}");
            Browser::connect(url).await?
        }
        ConnectTarget::LocalSpawn => {
            info!("Spawning local headless browser");
            Browser::launch().await?
        }
    };

    let result = drive_session(&browser, config).await;

    if let Err(e) = browser.close().await {
        warn!("Failed to close browser session: {e:?}");
    }

    result
}

async fn drive_session(browser: &Browser, config: &FetchConfig) -> Result<PageReport> {
    let tab = browser.new_tab().await?;

    let result = async {
        tab.goto(&config.url).await?;

        // Fixed settling delay for asynchronous page content, on top of the
        // load-event wait.
        time::sleep(Duration::from_secs(config.wait_secs)).await;

        let mut report = PageReport::default();

        let title = tab.title().await?;
        info!("document title is {title}");
        report.title = Some(title);

        // Last capture wins when several modes are requested.
        for &mode in &config.modes {
            report.screenshot = Some(capture::capture(&tab, &config.url, mode).await?);
            info!("screenshot ({mode:?}) saved to {}", capture::SCREENSHOT_FILE);
        }

        Ok(report)
    }
    .await;

    if let Err(e) = tab.close().await {
        warn!("Failed to close tab after fetch: {e:?}");
    }

    result
}
