//! One pattern run on a background worker thread.
//!
//! The worker owns its own async runtime and drives the transport;
//! fragments and the terminal status come back over the context's
//! event channel. Nothing a worker does can propagate a failure into
//! the control thread: even a panic turns into a `RunFinished` event.

use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use engine::transport::{EngineTransport, TransportRequest};
use shared::events::{AppEvent, RunStatus};
use tokio_util::sync::CancellationToken;

pub struct RequestRunner {
    cancel: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl RequestRunner {
    /// Spawns the worker. Every run ends with exactly one
    /// `RunFinished` event on `events`, whatever happens in between.
    pub fn spawn(
        transport: Arc<dyn EngineTransport>,
        request: TransportRequest,
        events: Sender<AppEvent>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let thread = thread::spawn(move || {
            let events_panic = events.clone();
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                run_request(transport, request, events, worker_cancel);
            }));
            if result.is_err() {
                let _ = events_panic.send(AppEvent::RunFinished {
                    status: RunStatus::Failed {
                        reason: "the run worker crashed; see the log for details".to_string(),
                    },
                    output: String::new(),
                });
            }
        });
        Self {
            cancel,
            thread: Some(thread),
        }
    }

    /// Requests cancellation. The worker notices at its next read
    /// iteration; this never blocks.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread
            .as_ref()
            .map(JoinHandle::is_finished)
            .unwrap_or(true)
    }

    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run_request(
    transport: Arc<dyn EngineTransport>,
    request: TransportRequest,
    events: Sender<AppEvent>,
    cancel: CancellationToken,
) {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            let _ = events.send(AppEvent::RunFinished {
                status: RunStatus::Failed {
                    reason: format!("failed to start async runtime: {err}"),
                },
                output: String::new(),
            });
            return;
        }
    };

    let (status, output) = runtime.block_on(async {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let send = transport.send(&request, tx, cancel);
        let forward = async {
            let mut full = String::new();
            while let Some(fragment) = rx.recv().await {
                full.push_str(&fragment);
                let _ = events.send(AppEvent::OutputFragment(fragment));
            }
            full
        };
        tokio::join!(send, forward)
    });

    let _ = events.send(AppEvent::RunFinished { status, output });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::mpsc;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedSender;

    struct ScriptedTransport {
        fragments: Vec<&'static str>,
        status: RunStatus,
    }

    #[async_trait]
    impl EngineTransport for ScriptedTransport {
        async fn send(
            &self,
            _request: &TransportRequest,
            fragments: UnboundedSender<String>,
            _cancel: CancellationToken,
        ) -> RunStatus {
            for fragment in &self.fragments {
                let _ = fragments.send(fragment.to_string());
            }
            self.status.clone()
        }
    }

    struct StallingTransport;

    #[async_trait]
    impl EngineTransport for StallingTransport {
        async fn send(
            &self,
            _request: &TransportRequest,
            fragments: UnboundedSender<String>,
            cancel: CancellationToken,
        ) -> RunStatus {
            let _ = fragments.send("partial".to_string());
            cancel.cancelled().await;
            RunStatus::Cancelled
        }
    }

    struct PanickingTransport;

    #[async_trait]
    impl EngineTransport for PanickingTransport {
        async fn send(
            &self,
            _request: &TransportRequest,
            _fragments: UnboundedSender<String>,
            _cancel: CancellationToken,
        ) -> RunStatus {
            panic!("scripted failure");
        }
    }

    fn request() -> TransportRequest {
        TransportRequest::new("summarize", None, "hello")
    }

    fn collect_until_finished(rx: &mpsc::Receiver<AppEvent>) -> (Vec<String>, RunStatus, String) {
        let mut fragments = Vec::new();
        loop {
            match rx.recv_timeout(Duration::from_secs(5)).expect("run timed out") {
                AppEvent::OutputFragment(fragment) => fragments.push(fragment),
                AppEvent::RunFinished { status, output } => return (fragments, status, output),
                AppEvent::EngineHealth { .. } => {}
            }
        }
    }

    #[test]
    fn test_fragments_arrive_in_order_then_finished() {
        let (tx, rx) = mpsc::channel();
        let transport = Arc::new(ScriptedTransport {
            fragments: vec!["HEL", "LO\n"],
            status: RunStatus::Completed { exit_code: Some(0) },
        });
        let runner = RequestRunner::spawn(transport, request(), tx);
        let (fragments, status, output) = collect_until_finished(&rx);
        assert_eq!(fragments, vec!["HEL", "LO\n"]);
        assert_eq!(status, RunStatus::Completed { exit_code: Some(0) });
        assert_eq!(output, "HELLO\n");
        runner.join();
    }

    #[test]
    fn test_cancel_reaches_the_transport() {
        let (tx, rx) = mpsc::channel();
        let runner = RequestRunner::spawn(Arc::new(StallingTransport), request(), tx);
        // First fragment proves the run is underway before we cancel.
        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            AppEvent::OutputFragment(fragment) => assert_eq!(fragment, "partial"),
            other => panic!("expected a fragment, got {other:?}"),
        }
        runner.cancel();
        let (_, status, output) = collect_until_finished(&rx);
        assert_eq!(status, RunStatus::Cancelled);
        assert_eq!(output, "partial");
        runner.join();
    }

    #[test]
    fn test_worker_panic_becomes_failed_status() {
        let (tx, rx) = mpsc::channel();
        let runner = RequestRunner::spawn(Arc::new(PanickingTransport), request(), tx);
        let (_, status, _) = collect_until_finished(&rx);
        assert!(matches!(status, RunStatus::Failed { .. }));
        runner.join();
    }
}
