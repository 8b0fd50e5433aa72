use anyhow::Result;
use cdp_page_shot::{CaptureMode, ConnectTarget, FetchConfig, fetch_page};
use clap::{ArgAction, Parser};

/// Access a URL in a remote-controlled browser, read the document title, and
/// optionally capture a screenshot. The result is printed as JSON on stdout.
#[derive(Parser, Debug)]
#[command(name = "cdp-page-shot", version, about)]
struct Cli {
    /// access url
    url: String,

    /// save screen shot, default window size
    #[arg(long, action = ArgAction::Count)]
    screenshot: u8,

    /// save screen shot, whole web page
    #[arg(long, action = ArgAction::Count)]
    fullscreenshot: u8,

    /// save screen shot, with the browser command
    #[arg(long, action = ArgAction::Count)]
    cmdscreenshot: u8,

    /// increase log verbosity on stderr
    #[arg(long, action = ArgAction::Count)]
    verbose: u8,

    /// wait page load in seconds
    #[arg(long, default_value_t = 5)]
    waitsec: u64,

    /// remote debugging endpoint url, like http://selenium-chrome:9222
    #[arg(long)]
    seleniumurl: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logger(cli.verbose);

    let config = FetchConfig {
        wait_secs: cli.waitsec,
        modes: CaptureMode::from_flags(
            cli.cmdscreenshot > 0,
            cli.screenshot > 0,
            cli.fullscreenshot > 0,
        ),
        target: ConnectTarget::resolve(cli.seleniumurl, std::env::var("SELENIUM_URL").ok()),
        url: cli.url,
    };

    log::info!("url={}", config.url);

    let report = fetch_page(&config).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Logs go to stderr so stdout stays pure JSON. `RUST_LOG` wins when set.
fn init_logger(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}
