use serde::Serialize;

/// Result of a single page fetch.
///
/// Serialized as the program's JSON output; absent fields are omitted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PageReport {
    /// The page's document title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Base64-encoded PNG bytes of the last capture.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

/// Screenshot capture strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Capture the session's current window size.
    Viewport,
    /// Resize the session to the rendered document dimensions, then capture.
    FullPage,
    /// Run a separate local browser process with screenshot flags.
    Command,
}

impl CaptureMode {
    /// Modes in the order captures run. With several flags set, the last
    /// mode's screenshot is the one that ends up in the report.
    pub fn from_flags(cmd: bool, viewport: bool, full_page: bool) -> Vec<CaptureMode> {
        let mut modes = Vec::new();
        if cmd {
            modes.push(CaptureMode::Command);
        }
        if viewport {
            modes.push(CaptureMode::Viewport);
        }
        if full_page {
            modes.push(CaptureMode::FullPage);
        }
        modes
    }
}

/// Where the browser session comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    /// Remote debugging endpoint (`ws://…`, or `http://host:port` to resolve).
    Endpoint(String),
    /// Spawn a local headless browser process.
    LocalSpawn,
}

impl ConnectTarget {
    /// The explicit flag wins over the environment; empty values count as
    /// unset. With neither present, a local browser is spawned.
    pub fn resolve(flag: Option<String>, env: Option<String>) -> Self {
        flag.filter(|s| !s.is_empty())
            .or(env.filter(|s| !s.is_empty()))
            .map(ConnectTarget::Endpoint)
            .unwrap_or(ConnectTarget::LocalSpawn)
    }
}

/// Configuration for one fetch run, resolved at the process boundary.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub url: String,
    /// Unconditional settling delay after the page load event, in seconds.
    pub wait_secs: u64,
    pub modes: Vec<CaptureMode>,
    pub target: ConnectTarget,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_without_screenshot_serializes_title_only() {
        let report = PageReport {
            title: Some("Example Domain".to_string()),
            screenshot: None,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(json, r#"{"title":"Example Domain"}"#);
    }

    #[test]
    fn report_pretty_json_uses_two_space_indent() {
        let report = PageReport {
            title: Some("t".to_string()),
            screenshot: Some("aGVsbG8=".to_string()),
        };
        let json = serde_json::to_string_pretty(&report).unwrap();
        assert_eq!(json, "{\n  \"title\": \"t\",\n  \"screenshot\": \"aGVsbG8=\"\n}");
    }

    #[test]
    fn report_preserves_non_ascii_literally() {
        let report = PageReport {
            title: Some("ページタイトル".to_string()),
            screenshot: None,
        };
        let json = serde_json::to_string_pretty(&report).unwrap();
        assert!(json.contains("ページタイトル"));
        assert!(!json.contains("\\u"));
    }

    #[test]
    fn empty_report_serializes_to_empty_object() {
        let json = serde_json::to_string(&PageReport::default()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn flag_overrides_environment() {
        let target = ConnectTarget::resolve(
            Some("http://grid:4444".to_string()),
            Some("http://env:4444".to_string()),
        );
        assert_eq!(target, ConnectTarget::Endpoint("http://grid:4444".to_string()));
    }

    #[test]
    fn environment_used_when_flag_absent() {
        let target = ConnectTarget::resolve(None, Some("http://env:4444".to_string()));
        assert_eq!(target, ConnectTarget::Endpoint("http://env:4444".to_string()));
    }

    #[test]
    fn neither_source_falls_back_to_local_spawn() {
        assert_eq!(ConnectTarget::resolve(None, None), ConnectTarget::LocalSpawn);
    }

    #[test]
    fn empty_strings_count_as_unset() {
        let target = ConnectTarget::resolve(Some(String::new()), Some(String::new()));
        assert_eq!(target, ConnectTarget::LocalSpawn);
        let target = ConnectTarget::resolve(Some(String::new()), Some("ws://x".to_string()));
        assert_eq!(target, ConnectTarget::Endpoint("ws://x".to_string()));
    }

    #[test]
    fn capture_modes_keep_the_command_viewport_fullpage_order() {
        assert_eq!(
            CaptureMode::from_flags(true, true, true),
            vec![CaptureMode::Command, CaptureMode::Viewport, CaptureMode::FullPage]
        );
        assert_eq!(
            CaptureMode::from_flags(false, false, true),
            vec![CaptureMode::FullPage]
        );
        assert!(CaptureMode::from_flags(false, false, false).is_empty());
    }
}
