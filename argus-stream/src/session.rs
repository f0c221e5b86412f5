//! # Stream Session — one event loop per dashboard session
//!
//! The coordinating context the dashboard talks to. All channel
//! events, timers, and poll ticks run as arms of one `tokio::select!` loop
//! on a single task, so registry mutations are serialized in arrival order
//! and no reader ever observes a half-applied message. Consumer handles read
//! through an `RwLock`; the loop task is the only writer.
//!
//! Exactly one acquisition strategy is live at a time: the push channel
//! (with heartbeat and backoff retries) or the fixed-interval poller. Mode
//! switches tear the other side down before the first tick of the new one.

use crate::config::StreamConfig;
use crate::connection::ConnectionManager;
use crate::error::StreamError;
use crate::poller::SnapshotPoller;
use crate::reconnect::ReconnectPolicy;
use crate::router::route;
use crate::state::{AcquisitionMode, DashboardSnapshot, DashboardState, SessionStats};
use crate::types::{parse_frame, ChannelState, ControlFrame};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Imperative actions a consumer can issue against a running session.
#[derive(Debug, Clone)]
enum Command {
    Reconnect,
    Disconnect,
    Subscribe(String),
    Unsubscribe(String),
    Shutdown,
}

/// Builder for a streaming session.
pub struct StreamSession {
    config: StreamConfig,
}

impl StreamSession {
    pub fn new(config: StreamConfig) -> Self {
        Self { config }
    }

    /// Spawn the session event loop. Must be called inside a tokio runtime.
    pub fn start(self) -> SessionHandle {
        let shared = Arc::new(RwLock::new(DashboardState::new(&self.config)));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let mut heartbeat = interval(self.config.heartbeat_interval());
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut poll_tick = interval(self.config.poll_interval());
        poll_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let driver = SessionDriver {
            conn: ConnectionManager::new(self.config.push_endpoint.clone()),
            policy: ReconnectPolicy::new(
                self.config.max_reconnect_attempts,
                self.config.reconnect_base(),
                self.config.reconnect_cap(),
            ),
            poller: SnapshotPoller::new(self.config.snapshot_endpoint.clone()),
            mode: if self.config.push_enabled {
                AcquisitionMode::Push
            } else {
                AcquisitionMode::Polling
            },
            auto_reconnect: self.config.push_enabled,
            retry_at: None,
            desired_subs: Vec::new(),
            heartbeat,
            poll_tick,
            shared: shared.clone(),
            cmd_rx,
            config: self.config,
        };
        let task = tokio::spawn(driver.run());

        SessionHandle {
            reader: StateReader { shared },
            cmd_tx,
            task,
        }
    }
}

/// Owning handle for a running session: commands plus state reads. Dropping
/// the handle without `shutdown()` leaves the loop running detached until
/// the command channel closes.
pub struct SessionHandle {
    reader: StateReader,
    cmd_tx: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Cheap cloneable read-only view, for status tickers and dispatchers.
    pub fn reader(&self) -> StateReader {
        self.reader.clone()
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.reader.snapshot()
    }

    pub fn is_connected(&self) -> bool {
        self.reader.is_connected()
    }

    pub fn last_error(&self) -> Option<String> {
        self.reader.last_error()
    }

    pub fn report(&self) -> SessionStats {
        self.reader.report()
    }

    /// Force a fresh connection: resets the attempt counter, cancels any
    /// pending retry, and connects regardless of current state — the only
    /// way out of the exhausted state.
    pub fn reconnect(&self) {
        let _ = self.cmd_tx.send(Command::Reconnect);
    }

    /// Close the channel and suppress automatic reconnection.
    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(Command::Disconnect);
    }

    pub fn subscribe(&self, target: impl Into<String>) {
        let _ = self.cmd_tx.send(Command::Subscribe(target.into()));
    }

    pub fn unsubscribe(&self, target: impl Into<String>) {
        let _ = self.cmd_tx.send(Command::Unsubscribe(target.into()));
    }

    /// Stop the event loop and wait for it to finish. All timers die with
    /// the loop task, so nothing can mutate state afterwards.
    pub async fn shutdown(self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
        let _ = self.task.await;
    }
}

/// Read-only view of session state.
#[derive(Clone)]
pub struct StateReader {
    shared: Arc<RwLock<DashboardState>>,
}

impl StateReader {
    pub fn snapshot(&self) -> DashboardSnapshot {
        self.shared.read().snapshot()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.read().channel_state == ChannelState::Open
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.read().last_error.clone()
    }

    pub fn channel_state(&self) -> ChannelState {
        self.shared.read().channel_state
    }

    pub fn mode(&self) -> AcquisitionMode {
        self.shared.read().mode
    }

    pub fn report(&self) -> SessionStats {
        self.shared.read().report()
    }
}

// ── Event loop ───────────────────────────────────────────────────────────────

struct SessionDriver {
    config: StreamConfig,
    shared: Arc<RwLock<DashboardState>>,
    conn: ConnectionManager,
    policy: ReconnectPolicy,
    poller: SnapshotPoller,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    mode: AcquisitionMode,
    /// Cleared by an explicit disconnect, restored by a manual reconnect.
    auto_reconnect: bool,
    /// Deadline of the pending backoff retry, if one is scheduled.
    retry_at: Option<Instant>,
    desired_subs: Vec<String>,
    heartbeat: Interval,
    poll_tick: Interval,
}

impl SessionDriver {
    async fn run(mut self) {
        info!(
            push = self.config.push_enabled,
            endpoint = %self.config.push_endpoint,
            "stream session started"
        );

        if self.mode == AcquisitionMode::Push {
            if !self.config.snapshot_endpoint.is_empty() {
                // Initial hydration so the dashboard has a series before the
                // first push frame lands.
                self.poll_once().await;
            }
            self.try_connect().await;
        }

        loop {
            let retry_at = self.retry_at;
            tokio::select! {
                biased;

                maybe_cmd = self.cmd_rx.recv() => {
                    match maybe_cmd {
                        None | Some(Command::Shutdown) => break,
                        Some(cmd) => self.handle_command(cmd).await,
                    }
                }
                frame = self.conn.next_text(), if self.conn.is_open() => {
                    self.handle_frame(frame).await;
                }
                _ = self.heartbeat.tick(), if self.conn.is_open() => {
                    self.heartbeat_tick().await;
                }
                _ = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    self.retry_at = None;
                    self.try_connect().await;
                }
                _ = self.poll_tick.tick(), if self.mode == AcquisitionMode::Polling => {
                    self.poll_once().await;
                }
            }
        }

        // Teardown: the retry deadline is dropped and the channel closed
        // before the task exits; every timer is owned by this task, so no
        // stale tick can mutate state afterwards.
        self.retry_at = None;
        self.conn.close().await;
        let report = {
            let mut st = self.shared.write();
            st.channel_state = ChannelState::Closed;
            st.report()
        };
        info!(
            frames = report.frames_received,
            alerts = report.alerts_recorded,
            polls = report.polls_issued,
            malformed = report.malformed_dropped,
            "stream session stopped"
        );
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Reconnect => {
                info!("manual reconnect requested");
                self.policy.reset();
                self.retry_at = None;
                self.auto_reconnect = true;
                self.conn.close().await;
                {
                    let mut st = self.shared.write();
                    st.reconnect_exhausted = false;
                    st.last_error = None;
                }
                if self.mode == AcquisitionMode::Polling {
                    self.enter_push();
                }
                self.try_connect().await;
            }
            Command::Disconnect => {
                // Flag first, then cancel the pending retry, then close —
                // this ordering is what makes disconnect safe mid-connect.
                self.auto_reconnect = false;
                self.retry_at = None;
                self.conn.close().await;
                self.shared.write().channel_state = ChannelState::Closed;
                info!("channel disconnected, reconnect suppressed");
            }
            Command::Subscribe(target) => {
                if !self.desired_subs.contains(&target) {
                    self.desired_subs.push(target.clone());
                }
                if !self
                    .conn
                    .send(&ControlFrame::Subscribe {
                        target: target.clone(),
                    })
                    .await
                {
                    debug!(subscription = %target, "subscribe deferred until the channel opens");
                }
            }
            Command::Unsubscribe(target) => {
                self.desired_subs.retain(|t| t != &target);
                let _ = self
                    .conn
                    .send(&ControlFrame::Unsubscribe { target })
                    .await;
            }
            Command::Shutdown => {}
        }
    }

    async fn try_connect(&mut self) {
        self.shared.write().channel_state = ChannelState::Connecting;
        match self.conn.connect().await {
            Ok(()) => {
                self.policy.on_connected();
                {
                    let mut st = self.shared.write();
                    st.channel_state = ChannelState::Open;
                    st.reconnect_exhausted = false;
                    st.awaiting_pong = false;
                    st.last_error = None;
                }
                self.heartbeat.reset();
                self.resubscribe().await;
            }
            Err(e) => {
                warn!(error = %e, endpoint = self.conn.endpoint(), "channel open failed");
                {
                    let mut st = self.shared.write();
                    st.channel_state = ChannelState::Errored;
                    st.last_error = Some(e.to_string());
                }
                self.on_channel_lost().await;
            }
        }
    }

    async fn handle_frame(&mut self, frame: Option<Result<String, StreamError>>) {
        match frame {
            Some(Ok(text)) => self.ingest(&text),
            Some(Err(e)) => {
                // In this transport model an error always resolves to a
                // close; the close handling below is that close.
                warn!(error = %e, "transport error on push channel");
                {
                    let mut st = self.shared.write();
                    st.channel_state = ChannelState::Errored;
                    st.last_error = Some(e.to_string());
                }
                self.on_channel_lost().await;
            }
            None => {
                info!("push channel closed by peer");
                self.on_channel_lost().await;
            }
        }
    }

    /// Parse and route one inbound payload. A malformed frame is dropped
    /// here, before any registry is touched.
    fn ingest(&mut self, text: &str) {
        match parse_frame(text) {
            Ok(msg) => {
                let mut st = self.shared.write();
                route(&mut st, msg);
            }
            Err(e) => {
                warn!(error = %e, "malformed frame dropped");
                self.shared.write().stats.malformed_dropped += 1;
            }
        }
    }

    async fn heartbeat_tick(&mut self) {
        let overdue = {
            let mut st = self.shared.write();
            if st.awaiting_pong {
                st.stats.missed_pongs += 1;
                true
            } else {
                false
            }
        };
        if overdue {
            warn!("heartbeat pong overdue");
        }
        if self.conn.send(&ControlFrame::Ping).await {
            let mut st = self.shared.write();
            st.awaiting_pong = true;
            st.stats.heartbeats_sent += 1;
        } else if self.conn.state() == ChannelState::Errored {
            self.on_channel_lost().await;
        }
    }

    async fn on_channel_lost(&mut self) {
        self.conn.mark_closed();
        {
            let mut st = self.shared.write();
            st.channel_state = ChannelState::Closed;
            st.awaiting_pong = false;
        }

        if !self.auto_reconnect {
            debug!("reconnect suppressed by explicit disconnect");
            return;
        }
        if self.mode != AcquisitionMode::Push {
            return;
        }

        match self.policy.next_delay() {
            Some(delay) => {
                self.shared.write().stats.reconnects_scheduled += 1;
                info!(
                    attempt = self.policy.attempts(),
                    max = self.policy.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "reconnect scheduled"
                );
                self.retry_at = Some(Instant::now() + delay);
            }
            None => {
                let err = StreamError::ReconnectExhausted {
                    attempts: self.policy.max_attempts(),
                };
                error!(attempts = self.policy.max_attempts(), "reconnect attempts exhausted");
                {
                    let mut st = self.shared.write();
                    st.reconnect_exhausted = true;
                    st.last_error = Some(err.to_string());
                }
                if self.config.fallback_to_polling && !self.config.snapshot_endpoint.is_empty() {
                    self.enter_polling("reconnect exhausted").await;
                }
            }
        }
    }

    async fn poll_once(&mut self) {
        self.shared.write().stats.polls_issued += 1;
        match self.poller.fetch().await {
            Ok(msg) => {
                let mut st = self.shared.write();
                route(&mut st, msg);
            }
            Err(e) => {
                warn!(error = %e, "snapshot poll failed");
                let mut st = self.shared.write();
                st.stats.poll_failures += 1;
                st.last_error = Some(e.to_string());
            }
        }
    }

    /// Switch to the polling fallback, tearing the push side down first so
    /// only one acquisition mechanism is ever live.
    async fn enter_polling(&mut self, reason: &str) {
        if self.mode == AcquisitionMode::Polling {
            return;
        }
        self.mode = AcquisitionMode::Polling;
        self.retry_at = None;
        self.conn.close().await;
        {
            let mut st = self.shared.write();
            st.mode = AcquisitionMode::Polling;
            st.channel_state = ChannelState::Closed;
        }
        warn!(reason = %reason, interval_ms = self.config.poll_interval_ms, "switched to polling fallback");
        self.poll_tick.reset();
        self.poll_once().await;
    }

    /// Switch back to push acquisition; the poll arm is gated off the mode,
    /// so its ticker goes quiet the moment this flips.
    fn enter_push(&mut self) {
        self.mode = AcquisitionMode::Push;
        self.shared.write().mode = AcquisitionMode::Push;
        info!("switched to push channel");
    }

    async fn resubscribe(&mut self) {
        let targets = self.desired_subs.clone();
        for target in targets {
            if !self
                .conn
                .send(&ControlFrame::Subscribe {
                    target: target.clone(),
                })
                .await
            {
                warn!(subscription = %target, "resubscribe frame not sent");
                break;
            }
        }
    }
}
