//! Bounded registries for discrete events: threat alerts and entity activity.
//!
//! Both hold the most recent entries first. Alerts are discrete events with
//! no dedup; entity activity is keyed by entity id, so a new record for a
//! known entity replaces the old one instead of appending.

use crate::types::{EntityActivity, Severity, ThreatAlert};

/// Most-recent-first alert list, capped. No dedup by id.
#[derive(Debug, Clone)]
pub struct AlertRegistry {
    alerts: Vec<ThreatAlert>,
    cap: usize,
}

impl AlertRegistry {
    pub fn new(cap: usize) -> Self {
        Self {
            alerts: Vec::new(),
            cap: cap.max(1),
        }
    }

    /// Insert at the head; the oldest entry past the cap is dropped.
    pub fn record(&mut self, alert: ThreatAlert) {
        self.alerts.insert(0, alert);
        self.alerts.truncate(self.cap);
    }

    /// Newest-first copy.
    pub fn to_vec(&self) -> Vec<ThreatAlert> {
        self.alerts.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ThreatAlert> {
        self.alerts.iter()
    }

    pub fn latest(&self) -> Option<&ThreatAlert> {
        self.alerts.first()
    }

    pub fn count_at_least(&self, floor: Severity) -> usize {
        self.alerts.iter().filter(|a| a.severity >= floor).count()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}

/// Entity activity keyed by entity id, most recently updated first, capped by
/// evicting the least-recently-updated entity.
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    entities: Vec<EntityActivity>,
    cap: usize,
}

impl EntityRegistry {
    pub fn new(cap: usize) -> Self {
        Self {
            entities: Vec::new(),
            cap: cap.max(1),
        }
    }

    /// Insert or replace by entity id. A repeated id moves to the head with
    /// the new fields; a new id past the cap evicts the tail (the
    /// least-recently-updated entity).
    pub fn upsert(&mut self, activity: EntityActivity) {
        self.entities.retain(|e| e.entity_id != activity.entity_id);
        self.entities.insert(0, activity);
        self.entities.truncate(self.cap);
    }

    pub fn get(&self, entity_id: &str) -> Option<&EntityActivity> {
        self.entities.iter().find(|e| e.entity_id == entity_id)
    }

    /// Activity levels of every tracked entity, for the aggregate anomaly
    /// computation.
    pub fn activity_levels(&self) -> Vec<f64> {
        self.entities
            .iter()
            .map(|e| e.activity_level as f64)
            .collect()
    }

    /// Most-recently-updated-first copy.
    pub fn to_vec(&self) -> Vec<EntityActivity> {
        self.entities.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityActivity> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
