//! Pool configuration and the fixed anti-detection launch profile.

use serde::{Deserialize, Serialize};

/// User agent presented when none is configured. A realistic desktop Chrome
/// string: web clients gate features (and bot heuristics) on it.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Launch flags applied to every browser, regardless of platform. This is a
/// fixed configuration concern — per-call customization is limited to proxy
/// and profile passthrough.
pub const STEALTH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-infobars",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--no-sandbox",
    "--disable-setuid-sandbox",
];

/// Script injected into every new document before page scripts run.
pub const STEALTH_INIT_SCRIPT: &str = r"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
window.chrome = window.chrome || { runtime: {} };
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
";

/// Browser pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserPoolConfig {
    /// Path to Chrome/Chromium binary (auto-detected if not set).
    pub chrome_path: Option<String>,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// User agent string ([`DEFAULT_USER_AGENT`] if not set).
    pub user_agent: Option<String>,
    /// Additional Chrome arguments, appended after [`STEALTH_ARGS`].
    pub chrome_args: Vec<String>,
    pub navigation_timeout_ms: u64,
    /// System memory usage threshold (0-100) above which new launches are
    /// refused.
    pub memory_limit_percent: u8,
    /// Maximum concurrent browser instances (0 = unlimited, memory-bound).
    pub max_instances: usize,
}

impl Default for BrowserPoolConfig {
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

impl From<&botline_config::schema::BrowserSection> for BrowserPoolConfig {
    fn from(cfg: &botline_config::schema::BrowserSection) -> Self {
        Self {
            chrome_path: cfg.chrome_path.clone(),
            headless: cfg.headless,
            viewport_width: cfg.viewport_width,
            viewport_height: cfg.viewport_height,
            user_agent: cfg.user_agent.clone(),
            chrome_args: cfg.chrome_args.clone(),
            navigation_timeout_ms: cfg.navigation_timeout_ms,
            memory_limit_percent: cfg.memory_limit_percent,
            max_instances: cfg.max_instances,
        }
    }
}

/// Per-acquire options. Everything else about the launch profile is fixed.
#[derive(Debug, Clone, Default)]
pub struct AcquireOptions {
    /// Proxy URL handed to the browser (`--proxy-server`).
    pub proxy: Option<String>,
    /// Profile directory so web-client logins survive restarts.
    pub profile_dir: Option<String>,
}
