//! Telemetry event definitions.
//!
//! Events are transient: created per call site, never persisted, only
//! serialized for transport to the ingestion endpoint.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

/// Version of this SDK, attached to every event and used as part of the
/// sampling key.
pub fn sdk_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Kind of a telemetry event. Liveness pings are exempt from sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Ping,
    Fit,
    Predict,
}

/// A telemetry event: a name, an open-ended property map, and a
/// timestamp. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct TelemetryEvent {
    name: &'static str,
    kind: EventKind,
    properties: Map<String, Value>,
    timestamp: DateTime<Utc>,
}

impl TelemetryEvent {
    /// A liveness ping ("this installation is alive").
    pub fn ping() -> TelemetryEvent {
        TelemetryEvent::new("ping", EventKind::Ping, Map::new())
    }

    /// A model-training event.
    pub fn fit(task: &str, num_rows: u64, num_columns: u64, duration_ms: u64) -> TelemetryEvent {
        TelemetryEvent::new(
            "fit",
            EventKind::Fit,
            task_properties(task, num_rows, num_columns, duration_ms),
        )
    }

    /// A prediction event.
    pub fn predict(task: &str, num_rows: u64, num_columns: u64, duration_ms: u64) -> TelemetryEvent {
        TelemetryEvent::new(
            "predict",
            EventKind::Predict,
            task_properties(task, num_rows, num_columns, duration_ms),
        )
    }

    fn new(name: &'static str, kind: EventKind, mut properties: Map<String, Value>) -> TelemetryEvent {
        properties.insert("sdk_version".to_owned(), json!(sdk_version()));
        properties.insert("language".to_owned(), json!("rust"));
        TelemetryEvent {
            name,
            kind,
            properties,
            timestamp: Utc::now(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The event's `duration_ms` property, if it carries one.
    pub fn duration_ms(&self) -> Option<u64> {
        self.properties.get("duration_ms")?.as_u64()
    }
}

fn task_properties(task: &str, num_rows: u64, num_columns: u64, duration_ms: u64) -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("task".to_owned(), json!(task));
    properties.insert("num_rows".to_owned(), json!(num_rows));
    properties.insert("num_columns".to_owned(), json!(num_columns));
    properties.insert("duration_ms".to_owned(), json!(duration_ms));
    properties
}
