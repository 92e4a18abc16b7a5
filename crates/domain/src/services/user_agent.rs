//! User-Agent parsing for device display names.

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::BrowserInfo;

lazy_static! {
    static ref BROWSER_REGEX: Regex =
        Regex::new(r"(?i)(Chrome|Firefox|Safari|Edge)/(\d+\.\d+)").unwrap();
    static ref OS_REGEX: Regex = Regex::new(r"(Windows|Mac|Linux|Android|iOS)").unwrap();
}

const UNKNOWN: &str = "Unknown";
const UNKNOWN_VERSION: &str = "0.0";

/// Derives browser, version and OS from a User-Agent header.
///
/// The first browser token in the string wins, so a Chrome UA that also
/// advertises Safari reports Chrome.
pub fn parse_user_agent(user_agent: &str) -> BrowserInfo {
    let (browser_name, browser_version) = BROWSER_REGEX
        .captures(user_agent)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .unwrap_or_else(|| (UNKNOWN.to_string(), UNKNOWN_VERSION.to_string()));

    let os = OS_REGEX
        .captures(user_agent)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| UNKNOWN.to_string());

    BrowserInfo {
        user_agent: user_agent.to_string(),
        device_name: format!("{browser_name} {browser_version} on {os}"),
        browser_name,
        browser_version,
        os,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chrome_on_windows() {
        let ua = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                  (KHTML, like Gecko) Chrome/120.0.6099.109 Safari/537.36";
        let info = parse_user_agent(ua);
        assert_eq!(info.browser_name, "Chrome");
        assert_eq!(info.browser_version, "120.0");
        assert_eq!(info.os, "Windows");
        assert_eq!(info.device_name, "Chrome 120.0 on Windows");
        assert_eq!(info.user_agent, ua);
    }

    #[test]
    fn test_firefox_on_linux() {
        let info = parse_user_agent(
            "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
        );
        assert_eq!(info.device_name, "Firefox 121.0 on Linux");
    }

    #[test]
    fn test_unknown_agent() {
        let info = parse_user_agent("curl/8.4.0");
        assert_eq!(info.browser_name, "Unknown");
        assert_eq!(info.browser_version, "0.0");
        assert_eq!(info.os, "Unknown");
        assert_eq!(info.device_name, "Unknown 0.0 on Unknown");
    }

    #[test]
    fn test_empty_agent() {
        let info = parse_user_agent("");
        assert_eq!(info.device_name, "Unknown 0.0 on Unknown");
    }
}
