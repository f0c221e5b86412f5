//! Per-session dashboard state: the registries, the rolling metrics buffer,
//! and the consumer-facing snapshot view.
//!
//! One `DashboardState` exists per stream session, created with it and torn
//! down with it. It is mutated only by the session's event-loop task; consumer
//! handles take read locks and clone snapshots out.

use crate::config::StreamConfig;
use crate::registry::{AlertRegistry, EntityRegistry};
use crate::rolling::RollingBuffer;
use crate::types::{
    ChannelState, EntityActivity, MetricPoint, RawFrame, SystemHealth, ThreatAlert,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which acquisition strategy is currently feeding the buffers. Exactly one
/// is active at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMode {
    Push,
    Polling,
}

/// Lifetime counters for one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub frames_received: u64,
    pub malformed_dropped: u64,
    pub alerts_recorded: u64,
    pub derived_alerts: u64,
    pub acks_received: u64,
    pub error_notices: u64,
    pub polls_issued: u64,
    pub poll_failures: u64,
    pub reconnects_scheduled: u64,
    pub heartbeats_sent: u64,
    pub missed_pongs: u64,
}

/// Everything one dashboard session owns.
#[derive(Debug)]
pub struct DashboardState {
    pub channel_state: ChannelState,
    pub mode: AcquisitionMode,
    pub metrics: RollingBuffer<MetricPoint>,
    pub alerts: AlertRegistry,
    pub entities: EntityRegistry,
    pub system_health: Option<SystemHealth>,
    /// Aggregate anomaly over entity activity; recomputed on every entity
    /// registry mutation, never served stale.
    pub aggregate_anomaly: f64,
    /// Raw envelope of the most recent inbound frame, unrecognized kinds
    /// included.
    pub last_message: Option<RawFrame>,
    pub last_error: Option<String>,
    pub last_update: Option<DateTime<Utc>>,
    /// Heartbeat liveness: set when a ping goes out, cleared by the pong ack.
    pub awaiting_pong: bool,
    /// Subscriptions the backend has acknowledged.
    pub confirmed_subscriptions: BTreeSet<String>,
    pub reconnect_exhausted: bool,
    pub derived_alert_seq: u64,
    pub stats: SessionStats,
}

impl DashboardState {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            channel_state: ChannelState::Closed,
            mode: if config.push_enabled {
                AcquisitionMode::Push
            } else {
                AcquisitionMode::Polling
            },
            metrics: RollingBuffer::new(config.max_metric_points),
            alerts: AlertRegistry::new(config.max_alerts),
            entities: EntityRegistry::new(config.max_entities),
            system_health: None,
            aggregate_anomaly: 0.0,
            last_message: None,
            last_error: None,
            last_update: None,
            awaiting_pong: false,
            confirmed_subscriptions: BTreeSet::new(),
            reconnect_exhausted: false,
            derived_alert_seq: 0,
            stats: SessionStats::default(),
        }
    }

    /// Consumer-facing view: ordered series, capped lists, status flags.
    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            connected: self.channel_state == ChannelState::Open,
            channel_state: self.channel_state,
            mode: self.mode,
            last_error: self.last_error.clone(),
            metrics: self.metrics.to_vec(),
            current: self.metrics.latest().cloned(),
            alerts: self.alerts.to_vec(),
            entities: self.entities.to_vec(),
            system_health: self.system_health.clone(),
            aggregate_anomaly: self.aggregate_anomaly,
            last_update: self.last_update,
            confirmed_subscriptions: self.confirmed_subscriptions.iter().cloned().collect(),
            reconnect_exhausted: self.reconnect_exhausted,
        }
    }

    pub fn report(&self) -> SessionStats {
        self.stats.clone()
    }
}

/// Point-in-time copy of the session state for the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub connected: bool,
    pub channel_state: ChannelState,
    pub mode: AcquisitionMode,
    pub last_error: Option<String>,
    /// Oldest → newest, for charting.
    pub metrics: Vec<MetricPoint>,
    /// Most recent metric point, for current-value displays.
    pub current: Option<MetricPoint>,
    /// Newest first.
    pub alerts: Vec<ThreatAlert>,
    /// Most recently updated first.
    pub entities: Vec<EntityActivity>,
    pub system_health: Option<SystemHealth>,
    pub aggregate_anomaly: f64,
    pub last_update: Option<DateTime<Utc>>,
    /// Targets the backend has acknowledged, sorted.
    pub confirmed_subscriptions: Vec<String>,
    pub reconnect_exhausted: bool,
}
