// Tick sources: what the polling loop awaits between ticks

use async_trait::async_trait;

/// Schedules the next polling tick.
///
/// `wait` is awaited only after the previous tick has finished, so ticks never
/// overlap. Browsers provide a `setTimeout` ticker and a display-synchronized
/// `requestAnimationFrame` ticker.
#[async_trait(?Send)]
pub trait Ticker {
    async fn wait(&mut self);
}

/// Fixed-delay ticker on the tokio timer
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone)]
pub struct IntervalTicker {
    delay: std::time::Duration,
}

#[cfg(not(target_arch = "wasm32"))]
impl IntervalTicker {
    pub fn new(delay: std::time::Duration) -> Self {
        Self { delay }
    }

    pub fn from_config(config: &crate::config::ScanConfig) -> Self {
        Self::new(config.tick_interval())
    }

    pub fn delay(&self) -> std::time::Duration {
        self.delay
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[async_trait(?Send)]
impl Ticker for IntervalTicker {
    async fn wait(&mut self) {
        tokio::time::sleep(self.delay).await;
    }
}
