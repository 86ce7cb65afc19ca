//! Background health polling against the engine's HTTP surface.
//!
//! The monitor probes `{base_url}/config` on a fixed interval and hands
//! the current online/offline boolean to the registered callback on
//! every tick, not just on change. Downstream consumers must apply
//! updates idempotently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// One bounded-timeout probe. Online means the status endpoint answered
/// with exactly 200; anything else, including transport errors, is
/// offline.
pub async fn probe_engine(client: &reqwest::Client, base_url: &str) -> bool {
    let url = format!("{base_url}/config");
    match client.get(&url).timeout(PROBE_TIMEOUT).send().await {
        Ok(response) => response.status() == reqwest::StatusCode::OK,
        Err(_) => false,
    }
}

/// Blocking single probe for callers outside an async context, such as
/// an explicit refresh before a run.
pub fn probe_once(base_url: &str) -> bool {
    let Ok(runtime) = tokio::runtime::Runtime::new() else {
        warn!("failed to build a runtime for a health probe");
        return false;
    };
    runtime.block_on(probe_engine(crate::api::shared_client(), base_url))
}

/// Periodic health poller running on its own thread.
pub struct HealthMonitor {
    stop_tx: mpsc::Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
    online: Arc<AtomicBool>,
}

impl HealthMonitor {
    /// Starts polling `base_url` every `interval` (clamped to at least
    /// [`MIN_POLL_INTERVAL`]), invoking `on_tick` with the probe result
    /// each round until [`stop`](Self::stop) is called or the monitor
    /// is dropped.
    pub fn spawn(
        base_url: String,
        interval: Duration,
        on_tick: impl Fn(bool) + Send + 'static,
    ) -> Self {
        let interval = interval.max(MIN_POLL_INTERVAL);
        let (stop_tx, stop_rx) = mpsc::channel();
        let online = Arc::new(AtomicBool::new(false));
        let shared = Arc::clone(&online);

        let thread = thread::Builder::new()
            .name("health-monitor".into())
            .spawn(move || {
                let Ok(runtime) = tokio::runtime::Runtime::new() else {
                    warn!("health monitor failed to build a runtime, probing disabled");
                    return;
                };
                let client = reqwest::Client::builder()
                    .build()
                    .expect("failed to build HTTP client");
                let mut last_seen: Option<bool> = None;
                loop {
                    let online_now = runtime.block_on(probe_engine(&client, &base_url));
                    shared.store(online_now, Ordering::Relaxed);
                    if last_seen != Some(online_now) {
                        info!(online = online_now, "engine health changed");
                        last_seen = Some(online_now);
                    }
                    on_tick(online_now);
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .ok();

        Self {
            stop_tx,
            thread,
            online,
        }
    }

    /// Last probe result. False until the first probe lands.
    pub fn online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    /// Signals the loop and waits for it to wind down. A probe already
    /// in flight finishes first, so this can block up to the probe
    /// timeout.
    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        // Unblocks the loop without joining; the thread exits on its own.
        let _ = self.stop_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Answers every request with the given status until the process
    /// exits. Returns the base URL to probe.
    fn fake_engine_endpoint(status: u16) -> String {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        thread::spawn(move || {
            for request in server.incoming_requests() {
                let _ = request.respond(tiny_http::Response::empty(status));
            }
        });
        format!("http://{addr}")
    }

    fn collecting_monitor(base_url: String, interval: Duration) -> (HealthMonitor, Arc<Mutex<Vec<bool>>>) {
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&ticks);
        let monitor = HealthMonitor::spawn(base_url, interval, move |online| {
            sink.lock().push(online);
        });
        (monitor, ticks)
    }

    #[test]
    fn test_callback_fires_every_tick_without_change() {
        let base_url = fake_engine_endpoint(200);
        let (monitor, ticks) = collecting_monitor(base_url, Duration::from_secs(1));
        thread::sleep(Duration::from_millis(2500));
        monitor.stop();
        let ticks = ticks.lock();
        assert!(ticks.len() >= 2, "expected repeated ticks, got {}", ticks.len());
        assert!(ticks.iter().all(|online| *online));
    }

    #[test]
    fn test_non_200_status_counts_as_offline() {
        let base_url = fake_engine_endpoint(404);
        let (monitor, ticks) = collecting_monitor(base_url, Duration::from_secs(1));
        thread::sleep(Duration::from_millis(1200));
        assert!(!monitor.online());
        monitor.stop();
        let ticks = ticks.lock();
        assert!(!ticks.is_empty());
        assert!(ticks.iter().all(|online| !*online));
    }

    #[test]
    fn test_unreachable_endpoint_counts_as_offline() {
        // Nothing listens on this port.
        let (monitor, ticks) = collecting_monitor("http://127.0.0.1:9".to_string(), Duration::from_secs(1));
        thread::sleep(Duration::from_millis(1200));
        monitor.stop();
        assert!(ticks.lock().iter().all(|online| !*online));
    }

    #[test]
    fn test_interval_clamped_to_minimum() {
        let base_url = fake_engine_endpoint(200);
        let (monitor, ticks) = collecting_monitor(base_url, Duration::ZERO);
        thread::sleep(Duration::from_millis(2500));
        monitor.stop();
        // A zero interval would produce hundreds of ticks; the clamp
        // keeps it to one per second.
        let count = ticks.lock().len();
        assert!((1..=4).contains(&count), "got {count} ticks");
    }

    #[test]
    fn test_stop_halts_polling() {
        let base_url = fake_engine_endpoint(200);
        let (monitor, ticks) = collecting_monitor(base_url, Duration::from_secs(1));
        thread::sleep(Duration::from_millis(1200));
        monitor.stop();
        let after_stop = ticks.lock().len();
        thread::sleep(Duration::from_millis(1500));
        assert_eq!(ticks.lock().len(), after_stop);
    }
}
