//! Config schema. Every section is optional in the file; defaults carry the
//! documented tuning constants.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotlineConfig {
    pub channels: ChannelsSection,
    pub browser: BrowserSection,
    pub resilience: ResilienceSection,
    pub sessions: SessionsSection,
}

/// Polling cadence per platform style plus the manual-login bound.
///
/// Kept configurable rather than hardcoded per adapter; per-connection
/// `ConnectionOptions` override these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsSection {
    /// Poll interval for API-style platforms, seconds.
    pub api_poll_interval_secs: u64,
    /// Poll interval for browser-automation platforms, seconds.
    pub web_poll_interval_secs: u64,
    /// How long to wait for an operator to finish a QR/verification step.
    pub login_timeout_secs: u64,
}

impl Default for ChannelsSection {
    fn default() -> Self {
        Self {
            api_poll_interval_secs: 10,
            web_poll_interval_secs: 5,
            login_timeout_secs: 300,
        }
    }
}

/// Browser pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    /// Path to Chrome/Chromium binary (auto-detected if not set).
    pub chrome_path: Option<String>,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// User agent string (a realistic desktop Chrome UA if not set).
    pub user_agent: Option<String>,
    /// Additional Chrome arguments, appended after the stealth set.
    pub chrome_args: Vec<String>,
    pub navigation_timeout_ms: u64,
    /// System memory usage threshold (0-100) above which new browsers are
    /// refused.
    pub memory_limit_percent: u8,
    /// Maximum concurrent browser instances (0 = unlimited, memory-bound).
    pub max_instances: usize,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            viewport_width: 1366,
            viewport_height: 768,
            user_agent: None,
            chrome_args: Vec::new(),
            navigation_timeout_ms: 30_000,
            memory_limit_percent: 90,
            max_instances: 0,
        }
    }
}

/// Circuit breaker and retry tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceSection {
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
    pub monitoring_window_secs: u64,
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for ResilienceSection {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_secs: 60,
            monitoring_window_secs: 60,
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Session expiry sweep tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsSection {
    /// Connections whose last sync is older than this are expired.
    pub max_session_age_days: i64,
    pub sweep_interval_secs: u64,
}

impl Default for SessionsSection {
    fn default() -> Self {
        Self {
            max_session_age_days: 7,
            sweep_interval_secs: 3600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let cfg = BotlineConfig::default();
        assert_eq!(cfg.channels.api_poll_interval_secs, 10);
        assert_eq!(cfg.channels.web_poll_interval_secs, 5);
        assert_eq!(cfg.channels.login_timeout_secs, 300);
        assert_eq!(cfg.resilience.failure_threshold, 5);
        assert_eq!(cfg.resilience.reset_timeout_secs, 60);
        assert_eq!(cfg.sessions.max_session_age_days, 7);
        assert!(cfg.browser.headless);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let cfg: BotlineConfig = toml::from_str(
            r#"
            [channels]
            web_poll_interval_secs = 3

            [browser]
            headless = false
            "#,
        )
        .unwrap();
        assert_eq!(cfg.channels.web_poll_interval_secs, 3);
        assert_eq!(cfg.channels.api_poll_interval_secs, 10);
        assert!(!cfg.browser.headless);
        assert_eq!(cfg.browser.viewport_width, 1366);
    }
}
