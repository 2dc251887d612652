//! Browser instance pool, one process per connection id.

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
    time::Duration,
};

use {
    chromiumoxide::{
        Browser, BrowserConfig as CdpBrowserConfig, Handler, Page,
        cdp::browser_protocol::{
            emulation::SetDeviceMetricsOverrideParams,
            page::AddScriptToEvaluateOnNewDocumentParams,
        },
    },
    futures::StreamExt,
    sysinfo::System,
    tokio::sync::{Mutex, RwLock},
    tracing::{debug, info, warn},
};

use crate::{
    config::{AcquireOptions, BrowserPoolConfig, DEFAULT_USER_AGENT, STEALTH_ARGS,
        STEALTH_INIT_SCRIPT},
    detect,
    error::BrowserError,
};

/// Get current system memory usage as a percentage (0-100).
fn memory_usage_percent() -> u8 {
    let mut sys = System::new();
    sys.refresh_memory();

    let total = sys.total_memory();
    if total == 0 {
        return 0;
    }

    let used = sys.used_memory();
    let percent = (used as f64 / total as f64 * 100.0) as u8;
    percent.min(100)
}

/// One pooled browser process and its single page.
struct BrowserSession {
    browser: Browser,
    page: Option<Page>,
}

type SessionMap = Arc<RwLock<HashMap<String, Arc<Mutex<BrowserSession>>>>>;

/// Pool of isolated browser processes keyed by connection id.
pub struct BrowserPool {
    config: BrowserPoolConfig,
    sessions: SessionMap,
}

impl BrowserPool {
    pub fn new(config: BrowserPoolConfig) -> Self {
        Self {
            config,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get or launch the browser for `connection_id` and return its page.
    ///
    /// Idempotent: a second acquire for a live connection returns the
    /// existing handle.
    pub async fn acquire(
        &self,
        connection_id: &str,
        options: AcquireOptions,
    ) -> Result<Page, BrowserError> {
        if self.sessions.read().await.contains_key(connection_id) {
            warn!(connection_id, "browser already acquired, reusing existing instance");
            return self.page(connection_id).await;
        }

        if self.config.max_instances > 0
            && self.sessions.read().await.len() >= self.config.max_instances
        {
            return Err(BrowserError::PoolExhausted);
        }

        let memory = memory_usage_percent();
        if memory >= self.config.memory_limit_percent {
            warn!(
                memory_usage = memory,
                threshold = self.config.memory_limit_percent,
                "refusing browser launch due to memory pressure"
            );
            return Err(BrowserError::PoolExhausted);
        }

        let (session, handler) = self.launch(&options).await?;
        let session = Arc::new(Mutex::new(session));
        self.sessions
            .write()
            .await
            .insert(connection_id.to_string(), Arc::clone(&session));
        self.spawn_crash_watcher(connection_id, Arc::downgrade(&session), handler);

        info!(
            connection_id,
            headless = self.config.headless,
            proxy = options.proxy.as_deref().unwrap_or("none"),
            "launched browser instance"
        );
        self.page(connection_id).await
    }

    /// The connection's page, created on first use.
    pub async fn page(&self, connection_id: &str) -> Result<Page, BrowserError> {
        let session = self
            .sessions
            .read()
            .await
            .get(connection_id)
            .map(Arc::clone)
            .ok_or_else(|| BrowserError::not_found(connection_id))?;

        let mut session = session.lock().await;
        if let Some(page) = &session.page {
            return Ok(page.clone());
        }

        let page = session
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let stealth = AddScriptToEvaluateOnNewDocumentParams::builder()
            .source(STEALTH_INIT_SCRIPT)
            .build()
            .map_err(BrowserError::Cdp)?;
        if let Err(e) = page.execute(stealth).await {
            warn!(connection_id, error = %e, "failed to install stealth init script");
        }

        // Browser-level viewport is not always applied to new pages.
        let viewport = SetDeviceMetricsOverrideParams::builder()
            .width(self.config.viewport_width)
            .height(self.config.viewport_height)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(BrowserError::Cdp)?;
        if let Err(e) = page.execute(viewport).await {
            warn!(connection_id, error = %e, "failed to set page viewport");
        }

        session.page = Some(page.clone());
        Ok(page)
    }

    /// Close and forget the connection's browser. No-op when absent.
    pub async fn release(&self, connection_id: &str) -> Result<(), BrowserError> {
        let session = self.sessions.write().await.remove(connection_id);

        if let Some(session) = session {
            let mut session = session.lock().await;
            session.page = None;
            if let Err(e) = session.browser.close().await {
                debug!(connection_id, error = %e, "browser close reported an error");
            }
            info!(connection_id, "closed browser instance");
        }

        Ok(())
    }

    /// Close every browser, awaiting each close. The only graceful-shutdown
    /// hook the pool has.
    pub async fn close_all(&self) {
        let ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        for connection_id in ids {
            if let Err(e) = self.release(&connection_id).await {
                warn!(connection_id, error = %e, "failed to close browser during shutdown");
            }
        }
        info!("browser pool shut down");
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Watch the CDP event stream; when it ends the process is gone, so the
    /// pool entry is evicted (if still this session) and a later acquire
    /// relaunches instead of returning a dead handle.
    fn spawn_crash_watcher(
        &self,
        connection_id: &str,
        session: Weak<Mutex<BrowserSession>>,
        mut handler: Handler,
    ) {
        let sessions = Arc::clone(&self.sessions);
        let cid = connection_id.to_string();
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                debug!(connection_id = cid, ?event, "browser event");
            }

            let mut map = sessions.write().await;
            let is_current = match (map.get(&cid), session.upgrade()) {
                (Some(current), Some(mine)) => Arc::ptr_eq(current, &mine),
                _ => false,
            };
            if is_current {
                map.remove(&cid);
                warn!(connection_id = cid, "browser process ended, evicted from pool");
            }
        });
    }

    async fn launch(
        &self,
        options: &AcquireOptions,
    ) -> Result<(BrowserSession, Handler), BrowserError> {
        let detection = detect::detect_browser(self.config.chrome_path.as_deref());
        if !detection.found {
            return Err(BrowserError::BrowserNotAvailable(detection.install_hint));
        }

        let mut builder = CdpBrowserConfig::builder();

        // chromiumoxide runs headless unless told otherwise.
        if !self.config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .viewport(chromiumoxide::handler::viewport::Viewport {
                width: self.config.viewport_width,
                height: self.config.viewport_height,
                device_scale_factor: Some(1.0),
                emulating_mobile: false,
                is_landscape: true,
                has_touch: false,
            })
            .request_timeout(Duration::from_millis(self.config.navigation_timeout_ms));

        if let Some(path) = &detection.path {
            builder = builder.chrome_executable(path);
        }

        let user_agent = self
            .config
            .user_agent
            .as_deref()
            .unwrap_or(DEFAULT_USER_AGENT);
        builder = builder.arg(format!("--user-agent={user_agent}"));

        for arg in STEALTH_ARGS {
            builder = builder.arg(*arg);
        }
        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }

        if let Some(proxy) = &options.proxy {
            builder = builder.arg(format!("--proxy-server={proxy}"));
        }
        if let Some(profile_dir) = &options.profile_dir {
            builder = builder.user_data_dir(profile_dir);
        }

        let config = builder.build().map_err(|e| {
            BrowserError::LaunchFailed(format!("failed to build browser config: {e}"))
        })?;

        let (browser, handler) = Browser::launch(config).await.map_err(|e| {
            let hint = detect::install_instructions();
            BrowserError::LaunchFailed(format!("browser launch failed: {e}\n\n{hint}"))
        })?;

        Ok((
            BrowserSession {
                browser,
                page: None,
            },
            handler,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn page_for_unknown_connection_is_not_found() {
        let pool = BrowserPool::new(BrowserPoolConfig::default());
        let err = pool.page("nope").await.unwrap_err();
        assert!(matches!(err, BrowserError::NotFound { .. }));
    }

    #[tokio::test]
    async fn release_of_unknown_connection_is_a_noop() {
        let pool = BrowserPool::new(BrowserPoolConfig::default());
        assert!(pool.release("nope").await.is_ok());
        assert_eq!(pool.active_count().await, 0);
    }

    #[test]
    fn memory_percent_is_bounded() {
        let percent = memory_usage_percent();
        assert!(percent <= 100);
    }
}
