//! Local usage-statistics event log.
//!
//! Events are appended in order and the log keeps only the most recent
//! `max_events`; older ones are dropped first. Persistence is write-behind, so
//! the newest events can be lost if the process dies before the write lands.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::catalog::Character;
use crate::clock::Clock;
use crate::store::{keys, read_json, Flush, KvStore};

pub const DEFAULT_MAX_EVENTS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
  AppLaunched,
  CharacterViewed,
  FavoriteAdded,
  FavoriteRemoved,
  FilterApplied,
}

impl EventType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::AppLaunched => "app_launched",
      Self::CharacterViewed => "character_viewed",
      Self::FavoriteAdded => "favorite_added",
      Self::FavoriteRemoved => "favorite_removed",
      Self::FilterApplied => "filter_applied",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
  pub timestamp: DateTime<Utc>,
  #[serde(rename = "type")]
  pub event_type: EventType,
  #[serde(default)]
  pub details: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryStats {
  pub total_events: usize,
  pub events_by_type: BTreeMap<EventType, usize>,
  pub most_recent_event: Option<TelemetryEvent>,
  pub oldest_event: Option<TelemetryEvent>,
}

/// Append-only, size-capped event log.
pub struct TelemetryLog {
  store: Arc<dyn KvStore>,
  clock: Arc<dyn Clock>,
  events: Vec<TelemetryEvent>,
  max_events: usize,
}

impl TelemetryLog {
  /// Load persisted events. Unreadable data starts an empty log.
  pub fn load(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, max_events: usize) -> Self {
    let events = match read_json::<Vec<TelemetryEvent>>(store.as_ref(), keys::TELEMETRY) {
      Ok(events) => events.unwrap_or_default(),
      Err(e) => {
        tracing::error!(error = %e, "failed to load telemetry events");
        Vec::new()
      }
    };
    tracing::debug!(count = events.len(), "telemetry events loaded");

    let mut log = Self {
      store,
      clock,
      events,
      max_events,
    };
    log.truncate();
    log
  }

  /// Append an event and truncate to the cap.
  pub fn log_event(&mut self, event_type: EventType, mut details: Map<String, Value>) -> Flush {
    let timestamp = self.clock.now();
    details.insert(
      "deviceTimestamp".to_string(),
      Value::from(timestamp.timestamp_millis()),
    );

    let shown = Value::Object(details.clone());
    tracing::info!(target: "telemetry", event = event_type.as_str(), details = %shown);

    self.events.push(TelemetryEvent {
      timestamp,
      event_type,
      details,
    });
    self.truncate();
    self.persist()
  }

  pub fn app_launched(&mut self) -> Flush {
    self.log_event(EventType::AppLaunched, Map::new())
  }

  pub fn character_viewed(&mut self, character: &Character) -> Flush {
    self.log_event(
      EventType::CharacterViewed,
      details(json!({"characterId": character.id, "characterName": character.name})),
    )
  }

  pub fn favorite_added(&mut self, character: &Character) -> Flush {
    self.log_event(
      EventType::FavoriteAdded,
      details(json!({"characterId": character.id, "characterName": character.name})),
    )
  }

  pub fn favorite_removed(&mut self, character_id: u32) -> Flush {
    self.log_event(
      EventType::FavoriteRemoved,
      details(json!({"characterId": character_id})),
    )
  }

  pub fn filter_applied(&mut self, filter_type: &str, filter_value: &str) -> Flush {
    self.log_event(
      EventType::FilterApplied,
      details(json!({"filterType": filter_type, "filterValue": filter_value})),
    )
  }

  pub fn get_stats(&self) -> TelemetryStats {
    let mut events_by_type = BTreeMap::new();
    for event in &self.events {
      *events_by_type.entry(event.event_type).or_insert(0) += 1;
    }

    TelemetryStats {
      total_events: self.events.len(),
      events_by_type,
      most_recent_event: self.events.last().cloned(),
      oldest_event: self.events.first().cloned(),
    }
  }

  /// All events, oldest first.
  pub fn events(&self) -> &[TelemetryEvent] {
    &self.events
  }

  pub fn events_by_type(&self, event_type: EventType) -> Vec<&TelemetryEvent> {
    self
      .events
      .iter()
      .filter(|e| e.event_type == event_type)
      .collect()
  }

  /// Events with `start <= timestamp <= end`.
  pub fn events_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<&TelemetryEvent> {
    self
      .events
      .iter()
      .filter(|e| e.timestamp >= start && e.timestamp <= end)
      .collect()
  }

  /// The `count` most recent events, oldest first.
  pub fn recent_events(&self, count: usize) -> &[TelemetryEvent] {
    let start = self.events.len().saturating_sub(count);
    &self.events[start..]
  }

  /// Drop events older than `days` days. Returns how many were removed.
  pub fn clear_old_events(&mut self, days: i64) -> (usize, Flush) {
    let cutoff = self.clock.now() - Duration::days(days);
    let before = self.events.len();
    self.events.retain(|e| e.timestamp >= cutoff);
    let removed = before - self.events.len();

    tracing::info!(removed, days, "removed old telemetry events");
    (removed, self.persist())
  }

  pub fn clear_all_events(&mut self) -> Flush {
    self.events.clear();
    tracing::info!("all telemetry events cleared");
    self.persist()
  }

  /// Pretty-printed JSON of every retained event.
  pub fn export_events(&self) -> String {
    serde_json::to_string_pretty(&self.events).unwrap_or_else(|e| {
      tracing::error!(error = %e, "failed to export telemetry");
      json!({"error": "Unable to export events"}).to_string()
    })
  }

  fn truncate(&mut self) {
    if self.events.len() > self.max_events {
      let excess = self.events.len() - self.max_events;
      self.events.drain(..excess);
    }
  }

  fn persist(&self) -> Flush {
    Flush::persist_json(self.store.clone(), keys::TELEMETRY, &self.events)
  }
}

fn details(value: Value) -> Map<String, Value> {
  match value {
    Value::Object(map) => map,
    _ => Map::new(),
  }
}
