//! Shared types for the streaming layer: wire frames, typed payloads, and the
//! records the registries store.
//!
//! Inbound frames are JSON envelopes with a required `type` and `timestamp`,
//! an optional `investigation_id`, and a `type`-dependent `data` payload.
//! Parsing is two-stage: the envelope first, then the payload for recognized
//! kinds. A frame with an unrecognized kind is kept as its raw envelope so
//! the last-message slot can preserve it without touching any typed registry.

use crate::error::{StreamError, StreamResult};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Lifecycle state of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
    Errored,
}

/// Threat alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Backend-reported system health level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Healthy,
    Degraded,
    Critical,
}

impl HealthLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthLevel::Healthy => "healthy",
            HealthLevel::Degraded => "degraded",
            HealthLevel::Critical => "critical",
        }
    }
}

// ── Wire envelope ────────────────────────────────────────────────────────────

/// Raw inbound envelope, before payload typing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub investigation_id: Option<i64>,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// A fully parsed inbound message: the raw envelope plus its typed payload.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub raw: RawFrame,
    pub kind: InboundKind,
}

/// Typed payload of an inbound message, by wire kind.
#[derive(Debug, Clone)]
pub enum InboundKind {
    Metric(MetricSnapshotPayload),
    Alert(ThreatAlertPayload),
    Entity(EntityActivityPayload),
    Status(SystemStatusPayload),
    Ack(ControlAckPayload),
    ErrorNotice(ErrorNoticePayload),
    /// Unrecognized `type` — preserved in the last-message slot only.
    Unknown,
}

// ── Typed payloads ───────────────────────────────────────────────────────────

/// `metric_snapshot` payload. Scalar counters are tolerant of omission so a
/// backend can ship partial snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshotPayload {
    #[serde(default)]
    pub active_investigations: u64,
    #[serde(default)]
    pub threats_detected: u64,
    #[serde(default)]
    pub entities_monitored: u64,
    #[serde(default)]
    pub network_activity: u64,
    #[serde(default)]
    pub anomaly_score: f64,
}

/// `threat_alert` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatAlertPayload {
    pub id: String,
    pub severity: Severity,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub entity_id: Option<String>,
}

fn default_confidence() -> f64 {
    0.5
}

/// `entity_activity` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityActivityPayload {
    pub entity_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub activity_level: u32,
    #[serde(default)]
    pub threat_score: f64,
}

/// `system_status` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatusPayload {
    pub status: HealthLevel,
    #[serde(default)]
    pub message: String,
}

/// Kind of a `control_ack` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckKind {
    Subscribed,
    Unsubscribed,
    Pong,
}

/// `control_ack` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlAckPayload {
    pub ack: AckKind,
    #[serde(default)]
    pub target: Option<String>,
}

/// `error_notice` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorNoticePayload {
    #[serde(default)]
    pub message: String,
}

// ── Stored records ───────────────────────────────────────────────────────────

/// One point in the rolling metrics series. `at` is the sender's envelope
/// timestamp; the score is clamped to [0, 1] on construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub at: DateTime<Utc>,
    pub active_investigations: u64,
    pub threats_detected: u64,
    pub entities_monitored: u64,
    pub network_activity: u64,
    pub anomaly_score: f64,
}

impl MetricPoint {
    pub fn from_payload(at: DateTime<Utc>, p: MetricSnapshotPayload) -> Self {
        Self {
            at,
            active_investigations: p.active_investigations,
            threats_detected: p.threats_detected,
            entities_monitored: p.entities_monitored,
            network_activity: p.network_activity,
            anomaly_score: p.anomaly_score.clamp(0.0, 1.0),
        }
    }
}

/// A threat alert as held by the alert registry. Each alert is a discrete
/// event; ids are opaque and not deduplicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatAlert {
    pub id: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub confidence: f64,
    pub entity_id: Option<String>,
    pub at: DateTime<Utc>,
}

impl ThreatAlert {
    pub fn from_payload(at: DateTime<Utc>, p: ThreatAlertPayload) -> Self {
        Self {
            id: p.id,
            severity: p.severity,
            title: p.title,
            description: p.description,
            confidence: p.confidence.clamp(0.0, 1.0),
            entity_id: p.entity_id,
            at,
        }
    }
}

/// Entity activity as held by the entity registry. `entity_id` is the
/// deduplicating key; a newer record for the same id replaces the old one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityActivity {
    pub entity_id: String,
    pub name: String,
    pub platform: String,
    pub activity_level: u32,
    pub threat_score: f64,
    pub last_seen: DateTime<Utc>,
}

impl EntityActivity {
    pub fn from_payload(at: DateTime<Utc>, p: EntityActivityPayload) -> Self {
        Self {
            entity_id: p.entity_id,
            name: p.name,
            platform: p.platform,
            activity_level: p.activity_level.min(100),
            threat_score: p.threat_score.clamp(0.0, 1.0),
            last_seen: at,
        }
    }
}

/// Last-known backend health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub level: HealthLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

// ── Outbound control frames ──────────────────────────────────────────────────

/// Control frames the client sends upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    Ping,
    Subscribe { target: String },
    Unsubscribe { target: String },
}

// ── Parsing ──────────────────────────────────────────────────────────────────

/// Parse one inbound text frame. Envelope failures (invalid JSON, missing
/// `type` or `timestamp`) and payload failures for recognized kinds both
/// surface as `MalformedMessage`; the caller logs and drops the frame.
pub fn parse_frame(text: &str) -> StreamResult<Inbound> {
    let raw: RawFrame =
        serde_json::from_str(text).map_err(|e| StreamError::MalformedMessage(e.to_string()))?;

    let kind = match raw.kind.as_str() {
        "metric_snapshot" => InboundKind::Metric(payload(&raw)?),
        "threat_alert" => InboundKind::Alert(payload(&raw)?),
        "entity_activity" => InboundKind::Entity(payload(&raw)?),
        "system_status" => InboundKind::Status(payload(&raw)?),
        "control_ack" => InboundKind::Ack(payload(&raw)?),
        "error_notice" => InboundKind::ErrorNotice(payload(&raw)?),
        _ => InboundKind::Unknown,
    };

    Ok(Inbound { raw, kind })
}

fn payload<T: DeserializeOwned>(raw: &RawFrame) -> StreamResult<T> {
    serde_json::from_value(raw.data.clone())
        .map_err(|e| StreamError::MalformedMessage(format!("{} payload: {}", raw.kind, e)))
}
