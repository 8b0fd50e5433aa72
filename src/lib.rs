/*!
Drive a remote-controlled browser over the Chrome DevTools Protocol: load a
URL, read the document title, capture a screenshot.

The browser comes from one of two places — a locally spawned headless process,
or a remote debugging endpoint given by URL. Screenshots go through a fixed
scratch file and come back base64-encoded, ready for the JSON report the CLI
prints.
*/

pub use browser::Browser;
pub use fetch::fetch_page;
pub use tab::Tab;
pub use types::{CaptureMode, ConnectTarget, FetchConfig, PageReport};

mod browser;
mod capture;
mod fetch;
mod tab;
mod transport;
mod types;
