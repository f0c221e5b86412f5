//! # Message Router — classifies inbound messages and updates session state
//!
//! Pure dispatch: every recognized kind lands in exactly one sink, unknown
//! kinds only touch the last-message slot, and nothing in here can panic a
//! running session. A message that fails payload parsing never reaches this
//! module — the session drops it upstream — so every arm below is total.

use crate::analytics;
use crate::state::DashboardState;
use crate::types::{
    AckKind, EntityActivity, HealthLevel, Inbound, InboundKind, MetricPoint, Severity,
    SystemHealth, ThreatAlert,
};
use tracing::{debug, warn};

/// Confidence attached to alerts synthesized from system status frames.
const DERIVED_ALERT_CONFIDENCE: f64 = 0.75;

/// Route one parsed message into the session state. Mutations are applied in
/// arrival order; a reader never observes a partially applied message.
pub fn route(state: &mut DashboardState, msg: Inbound) {
    state.stats.frames_received += 1;
    state.last_update = Some(msg.raw.timestamp);
    state.last_message = Some(msg.raw.clone());

    match msg.kind {
        InboundKind::Metric(payload) => {
            state
                .metrics
                .push(MetricPoint::from_payload(msg.raw.timestamp, payload));
        }
        InboundKind::Alert(payload) => {
            let alert = ThreatAlert::from_payload(msg.raw.timestamp, payload);
            record_alert(state, alert);
        }
        InboundKind::Entity(payload) => {
            state
                .entities
                .upsert(EntityActivity::from_payload(msg.raw.timestamp, payload));
            state.aggregate_anomaly = analytics::anomaly_score(&state.entities.activity_levels());
        }
        InboundKind::Status(payload) => {
            if let Some(severity) = derived_severity(payload.status) {
                state.derived_alert_seq += 1;
                let alert = ThreatAlert {
                    id: format!("derived-{}", state.derived_alert_seq),
                    severity,
                    title: format!("System status {}", payload.status.as_str()),
                    description: payload.message.clone(),
                    confidence: DERIVED_ALERT_CONFIDENCE,
                    entity_id: None,
                    at: msg.raw.timestamp,
                };
                warn!(status = payload.status.as_str(), severity = ?severity, "derived alert from system status");
                record_alert(state, alert);
                state.stats.derived_alerts += 1;
            }
            state.system_health = Some(SystemHealth {
                level: payload.status,
                message: payload.message,
                at: msg.raw.timestamp,
            });
        }
        InboundKind::Ack(payload) => {
            state.stats.acks_received += 1;
            match payload.ack {
                AckKind::Pong => state.awaiting_pong = false,
                AckKind::Subscribed => {
                    if let Some(target) = payload.target {
                        state.confirmed_subscriptions.insert(target);
                    }
                }
                AckKind::Unsubscribed => {
                    if let Some(target) = payload.target {
                        state.confirmed_subscriptions.remove(&target);
                    }
                }
            }
        }
        InboundKind::ErrorNotice(payload) => {
            state.stats.error_notices += 1;
            state.last_error = Some(payload.message);
            // ChannelState is the connection manager's alone; a backend error
            // notice never changes it.
        }
        InboundKind::Unknown => {
            debug!(kind = %msg.raw.kind, "unrecognized message kind, kept in last-message slot only");
        }
    }
}

fn record_alert(state: &mut DashboardState, alert: ThreatAlert) {
    state.alerts.record(alert);
    state.stats.alerts_recorded += 1;
}

fn derived_severity(level: HealthLevel) -> Option<Severity> {
    match level {
        HealthLevel::Critical => Some(Severity::Critical),
        HealthLevel::Degraded => Some(Severity::High),
        HealthLevel::Healthy => None,
    }
}
