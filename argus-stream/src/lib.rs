//! # Argus Stream — real-time intelligence streaming core
//!
//! Maintains a live WebSocket channel to the intelligence backend, falls
//! back to snapshot polling when the channel is unavailable, and normalizes
//! the event feed into bounded, time-ordered state a dashboard can read at
//! any moment:
//! - Connection manager + heartbeat over the push channel
//! - Bounded exponential-backoff reconnection with a terminal exhausted state
//! - Typed message routing into a rolling metrics buffer and capped
//!   alert/entity registries
//! - Derived analytics (aggregate anomaly score, linear trend) on demand
//! - Fixed-interval polling fallback feeding the same routing path
//!
//! One `StreamSession` per dashboard session owns all of it; a single event
//! loop task applies every mutation in arrival order.

pub mod analytics;
pub mod config;
pub mod connection;
pub mod error;
pub mod poller;
pub mod reconnect;
pub mod registry;
pub mod rolling;
pub mod router;
pub mod session;
pub mod state;
pub mod types;

pub use config::StreamConfig;
pub use error::{StreamError, StreamResult};
pub use session::{SessionHandle, StateReader, StreamSession};
pub use state::{AcquisitionMode, DashboardSnapshot, SessionStats};
pub use types::{ChannelState, EntityActivity, MetricPoint, Severity, ThreatAlert};
