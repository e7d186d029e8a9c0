//! Security event record and aggregate view.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::clock::unix_now;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AttackBlocked,
    GeoBlocked,
    GeoChallenged,
    RateLimited,
    BotBlocked,
    BotChallenged,
    Allowed,
    CounterStoreError,
    ClassificationFallback,
    InternalError,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::AttackBlocked => "attack_blocked",
            EventType::GeoBlocked => "geo_blocked",
            EventType::GeoChallenged => "geo_challenged",
            EventType::RateLimited => "rate_limited",
            EventType::BotBlocked => "bot_blocked",
            EventType::BotChallenged => "bot_challenged",
            EventType::Allowed => "allowed",
            EventType::CounterStoreError => "counter_store_error",
            EventType::ClassificationFallback => "classification_fallback",
            EventType::InternalError => "internal_error",
        }
    }
}

/// Append-only record of a security-relevant outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    /// Seconds since epoch.
    pub timestamp: u64,
    pub event_type: EventType,
    pub subject: String,
    pub route: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl SecurityEvent {
    pub fn new(event_type: EventType, subject: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: unix_now(),
            event_type,
            subject: subject.into(),
            route: route.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn at(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Counts of security outcomes over a time range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub from: u64,
    pub to: u64,
    pub total: u64,
    pub blocks: u64,
    pub challenges: u64,
    pub rate_limits: u64,
    pub bot_blocks: u64,
    pub attacks: u64,
    pub allowed_sampled: u64,
    pub store_errors: u64,
    pub classification_fallbacks: u64,
    pub internal_errors: u64,
}

impl AnalyticsSummary {
    /// Aggregate events with `from <= timestamp <= to`.
    pub fn from_events<'a>(
        events: impl IntoIterator<Item = &'a SecurityEvent>,
        from: u64,
        to: u64,
    ) -> Self {
        let mut summary = Self { from, to, ..Self::default() };
        for event in events {
            if event.timestamp < from || event.timestamp > to {
                continue;
            }
            summary.total += 1;
            match event.event_type {
                EventType::AttackBlocked => {
                    summary.attacks += 1;
                    summary.blocks += 1;
                }
                EventType::GeoBlocked => summary.blocks += 1,
                EventType::BotBlocked => {
                    summary.bot_blocks += 1;
                    summary.blocks += 1;
                }
                EventType::GeoChallenged | EventType::BotChallenged => summary.challenges += 1,
                EventType::RateLimited => summary.rate_limits += 1,
                EventType::Allowed => summary.allowed_sampled += 1,
                EventType::CounterStoreError => summary.store_errors += 1,
                EventType::ClassificationFallback => summary.classification_fallbacks += 1,
                EventType::InternalError => summary.internal_errors += 1,
            }
        }
        summary
    }
}
