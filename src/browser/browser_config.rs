use anyhow::{Context, Result, anyhow};
use rand::prelude::SliceRandom;
use std::net;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use which::which;

#[cfg(windows)]
use winreg::{RegKey, enums::HKEY_LOCAL_MACHINE};

/// Fixed flag set for a locally spawned browser: headless, no GPU, no
/// extensions, direct connection bypassing any proxy.
static SPAWN_ARGS: [&str; 5] = [
    "--headless",
    "--disable-gpu",
    "--disable-extensions",
    "--proxy-server=\"direct://\"",
    "--proxy-bypass-list=*",
];

pub(crate) struct BrowserConfig {
    debug_port: u16,
    pub(crate) user_data_dir: TempDir,
    pub(crate) executable_path: PathBuf,
}

impl BrowserConfig {
    pub(crate) fn new() -> Result<Self> {
        Ok(Self {
            executable_path: default_executable()?,
            debug_port: get_available_port().context("Failed to get available debug port")?,
            user_data_dir: tempfile::Builder::new()
                .prefix("cdp-page-shot")
                .tempdir()
                .context("Failed to create browser profile directory")?,
        })
    }

    pub(crate) fn get_browser_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--remote-debugging-port={}", self.debug_port),
            format!("--user-data-dir={}", self.user_data_dir.path().display()),
        ];
        args.extend(SPAWN_ARGS.iter().map(|s| s.to_string()));
        args
    }
}

/// Locate a local browser binary: the `CHROME` override first, then the
/// well-known executable names, then platform-specific install paths.
pub(crate) fn default_executable() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CHROME")
        && Path::new(&path).exists()
    {
        return Ok(path.into());
    }

    let apps = [
        "chromium",
        "chromium-browser",
        "google-chrome-stable",
        "google-chrome",
        "chrome",
        "msedge",
        "microsoft-edge",
    ];
    for app in apps {
        if let Ok(path) = which(app) {
            return Ok(path);
        }
    }

    #[cfg(target_os = "macos")]
    {
        let macos_apps = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        ];
        for path in macos_apps {
            let path = Path::new(path);
            if path.exists() {
                return Ok(path.into());
            }
        }
    }

    #[cfg(windows)]
    {
        if let Some(path) = get_chrome_path_from_registry().filter(|p| p.exists()) {
            return Ok(path);
        }
        let windows_apps = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for path in windows_apps {
            let path = Path::new(path);
            if path.exists() {
                return Ok(path.into());
            }
        }
    }

    Err(anyhow!(
        "Could not auto detect a browser executable. Set the CHROME env var."
    ))
}

#[cfg(windows)]
fn get_chrome_path_from_registry() -> Option<PathBuf> {
    RegKey::predef(HKEY_LOCAL_MACHINE)
        .open_subkey("SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\App Paths\\chrome.exe")
        .and_then(|key| key.get_value::<String, _>(""))
        .map(PathBuf::from)
        .ok()
}

fn get_available_port() -> Option<u16> {
    let mut ports: Vec<u16> = (8000..9000).collect();
    ports.shuffle(&mut rand::thread_rng());
    ports.iter().find(|port| port_is_available(**port)).copied()
}

fn port_is_available(port: u16) -> bool {
    net::TcpListener::bind(("127.0.0.1", port)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> BrowserConfig {
        BrowserConfig {
            debug_port: 8123,
            user_data_dir: tempfile::tempdir().unwrap(),
            executable_path: PathBuf::from("chromium"),
        }
    }

    #[test]
    fn browser_args_carry_the_fixed_flag_set() {
        let args = test_config().get_browser_args();
        for flag in [
            "--headless",
            "--disable-gpu",
            "--disable-extensions",
            "--proxy-server=\"direct://\"",
            "--proxy-bypass-list=*",
        ] {
            assert!(args.iter().any(|a| a == flag), "missing {flag}");
        }
    }

    #[test]
    fn browser_args_wire_up_port_and_profile_dir() {
        let config = test_config();
        let args = config.get_browser_args();
        assert_eq!(args[0], "--remote-debugging-port=8123");
        assert!(args[1].starts_with("--user-data-dir="));
        assert!(args[1].contains(&config.user_data_dir.path().display().to_string()));
    }

    #[test]
    fn bound_port_is_reported_unavailable() {
        let listener = net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(!port_is_available(port));
    }
}
