use argus_stream::{StateReader, ThreatAlert};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Watches the session's alert registry and routes newly recorded alerts to
/// configured outputs (JSONL file, webhook).
pub struct AlertDispatcher {
    reader: StateReader,
    log_path: Option<PathBuf>,
    webhook_url: Option<String>,
    poll_interval_secs: u64,
}

impl AlertDispatcher {
    pub fn new(reader: StateReader) -> Self {
        Self {
            reader,
            log_path: None,
            webhook_url: None,
            poll_interval_secs: 5,
        }
    }

    pub fn with_log_file(mut self, path: &str) -> Self {
        if !path.is_empty() {
            self.log_path = Some(PathBuf::from(path));
        }
        self
    }

    pub fn with_webhook(mut self, url: &str) -> Self {
        if !url.is_empty() {
            self.webhook_url = Some(url.into());
        }
        self
    }

    pub fn with_interval(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs.max(1);
        self
    }

    /// Start the background dispatch loop.
    pub fn start(self) -> DispatchHandle {
        let running = Arc::new(AtomicBool::new(true));
        let handle = DispatchHandle {
            running: running.clone(),
        };

        tokio::spawn(async move {
            let mut seen: u64 = 0;
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(
                self.poll_interval_secs,
            ));

            // Ensure log directory exists
            if let Some(ref path) = self.log_path {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        let _ = std::fs::create_dir_all(parent);
                    }
                }
            }

            while running.load(Ordering::Relaxed) {
                ticker.tick().await;

                let report = self.reader.report();
                if report.alerts_recorded <= seen {
                    continue;
                }
                let new_count = (report.alerts_recorded - seen) as usize;
                seen = report.alerts_recorded;

                // The registry is newest-first and capped; alerts past the
                // cap since the last tick are gone and stay unlogged.
                let snapshot = self.reader.snapshot();
                let fresh: Vec<ThreatAlert> = snapshot
                    .alerts
                    .iter()
                    .take(new_count.min(snapshot.alerts.len()))
                    .cloned()
                    .collect();

                // Oldest first into the log
                for alert in fresh.iter().rev() {
                    if let Some(ref path) = self.log_path {
                        if let Ok(line) = serde_json::to_string(alert) {
                            use std::io::Write;
                            if let Ok(mut f) = std::fs::OpenOptions::new()
                                .create(true)
                                .append(true)
                                .open(path)
                            {
                                let _ = writeln!(f, "{}", line);
                            }
                        }
                    }

                    // Webhook delivery (fire-and-forget)
                    if let Some(ref url) = self.webhook_url {
                        let url = url.clone();
                        let payload = alert.clone();
                        tokio::spawn(async move {
                            let client = reqwest::Client::new();
                            match client
                                .post(&url)
                                .json(&payload)
                                .timeout(std::time::Duration::from_secs(5))
                                .send()
                                .await
                            {
                                Ok(resp) if resp.status().is_success() => {}
                                Ok(resp) => {
                                    warn!(status = %resp.status(), "Webhook response not OK")
                                }
                                Err(e) => warn!(error = %e, "Webhook delivery failed"),
                            }
                        });
                    }
                }

                info!(new = fresh.len(), total = seen, "Alerts dispatched");
            }
        });

        handle
    }
}

/// Stops the dispatch loop on its next tick.
pub struct DispatchHandle {
    running: Arc<AtomicBool>,
}

impl DispatchHandle {
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}
