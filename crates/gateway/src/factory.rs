//! Adapter construction, injected into the manager so tests can substitute
//! platform implementations.

use std::{sync::Arc, time::Duration};

use {
    botline_browser::BrowserPool,
    botline_channels::{EventSender, PlatformAdapter},
    botline_common::types::PlatformType,
    botline_config::schema::{ChannelsSection, ResilienceSection},
    botline_mercadolibre::MercadoLibreAdapter,
    botline_resilience::{BreakerConfig, BreakerRegistry, RetryPolicy},
    botline_whatsapp::WhatsAppAdapter,
};

/// Breaker tuning from the `[resilience]` config section.
pub fn breaker_config(cfg: &ResilienceSection) -> BreakerConfig {
    BreakerConfig {
        failure_threshold: cfg.failure_threshold,
        reset_timeout: Duration::from_secs(cfg.reset_timeout_secs),
        monitoring_window: Duration::from_secs(cfg.monitoring_window_secs),
    }
}

/// Retry tuning from the `[resilience]` config section. The retryable
/// pattern set keeps its defaults.
pub fn retry_policy(cfg: &ResilienceSection) -> RetryPolicy {
    RetryPolicy {
        max_retries: cfg.max_retries,
        initial_delay: Duration::from_millis(cfg.initial_delay_ms),
        max_delay: Duration::from_millis(cfg.max_delay_ms),
        backoff_multiplier: cfg.backoff_multiplier,
        ..Default::default()
    }
}

/// Builds the platform-specific adapter for a connection.
pub trait AdapterFactory: Send + Sync {
    fn build(
        &self,
        connection_id: &str,
        platform: PlatformType,
        events: EventSender,
    ) -> Arc<dyn PlatformAdapter>;
}

/// Production factory: one concrete adapter type per platform, sharing the
/// per-platform breaker registry and the browser pool.
pub struct LiveAdapterFactory {
    breakers: Arc<BreakerRegistry>,
    browser_pool: Arc<BrowserPool>,
    retry: RetryPolicy,
    channels: ChannelsSection,
}

impl LiveAdapterFactory {
    pub fn new(
        breakers: Arc<BreakerRegistry>,
        browser_pool: Arc<BrowserPool>,
        retry: RetryPolicy,
        channels: ChannelsSection,
    ) -> Self {
        Self {
            breakers,
            browser_pool,
            retry,
            channels,
        }
    }
}

impl AdapterFactory for LiveAdapterFactory {
    fn build(
        &self,
        connection_id: &str,
        platform: PlatformType,
        events: EventSender,
    ) -> Arc<dyn PlatformAdapter> {
        let breaker = self.breakers.for_platform(platform.as_str());
        match platform {
            PlatformType::MercadoLibre => Arc::new(MercadoLibreAdapter::new(
                connection_id,
                events,
                breaker,
                self.retry.clone(),
                Duration::from_secs(self.channels.api_poll_interval_secs),
            )),
            PlatformType::WhatsappWeb => Arc::new(WhatsAppAdapter::new(
                connection_id,
                events,
                breaker,
                self.retry.clone(),
                Arc::clone(&self.browser_pool),
                Duration::from_secs(self.channels.web_poll_interval_secs),
                Duration::from_secs(self.channels.login_timeout_secs),
            )),
        }
    }
}
