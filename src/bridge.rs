//! Home-automation payloads derived from adapter output.

use crate::adapter::{AdapterEvent, Snapshot, StateDelta};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Prefix for bus event types
pub const EVENT_DOMAIN: &str = "trinnov_altitude";

/// One event for the automation platform's event bus
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusEvent {
    pub event_type: String,
    pub event_data: Map<String, Value>,
}

impl From<&AdapterEvent> for BusEvent {
    fn from(event: &AdapterEvent) -> Self {
        Self {
            event_type: format!("{}.{}", EVENT_DOMAIN, event.kind()),
            event_data: event.payload(),
        }
    }
}

/// Everything a coordinator needs from one adapter update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeUpdate {
    pub coordinator_data: Value,
    pub changed_fields: Vec<&'static str>,
    pub bus_events: Vec<BusEvent>,
}

fn catalog(entries: &[(i32, String)]) -> Value {
    Value::Object(
        entries
            .iter()
            .map(|(index, name)| (index.to_string(), Value::String(name.clone())))
            .collect(),
    )
}

/// Flat coordinator payload for one snapshot
///
/// Catalogs become objects keyed by the index as a string.
pub fn coordinator_payload(snapshot: &Snapshot) -> Value {
    json!({
        "available": snapshot.synced,
        "version": snapshot.version,
        "device_id": snapshot.id,
        "volume_db": snapshot.volume,
        "mute": snapshot.mute,
        "dim": snapshot.dim,
        "bypass": snapshot.bypass,
        "preset": snapshot.preset,
        "source": snapshot.source,
        "sampling_rate_hz": snapshot.sampling_rate,
        "audiosync_mode": snapshot.audiosync,
        "audiosync_status": snapshot.audiosync_status,
        "decoder": snapshot.decoder,
        "upmixer": snapshot.upmixer,
        "source_format": snapshot.source_format,
        "current_preset_index": snapshot.current_preset_index,
        "current_source_index": snapshot.current_source_index,
        "presets": catalog(&snapshot.presets),
        "sources": catalog(&snapshot.sources),
    })
}

pub fn build_update(
    snapshot: &Snapshot,
    deltas: &[StateDelta],
    events: &[AdapterEvent],
) -> BridgeUpdate {
    BridgeUpdate {
        coordinator_data: coordinator_payload(snapshot),
        changed_fields: deltas.iter().map(|d| d.field).collect(),
        bus_events: events.iter().map(BusEvent::from).collect(),
    }
}

type EventEmitter = Box<dyn Fn(&str, &Map<String, Value>) + Send + Sync>;

/// Converts adapter updates and forwards bus events to an emitter
#[derive(Default)]
pub struct BridgeDispatcher {
    emitter: Option<EventEmitter>,
    last_update: Option<BridgeUpdate>,
}

impl BridgeDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward every bus event to `emitter(event_type, event_data)`
    pub fn with_emitter<F>(emitter: F) -> Self
    where
        F: Fn(&str, &Map<String, Value>) + Send + Sync + 'static,
    {
        Self {
            emitter: Some(Box::new(emitter)),
            last_update: None,
        }
    }

    pub fn last_update(&self) -> Option<&BridgeUpdate> {
        self.last_update.as_ref()
    }

    pub fn handle_adapter_update(
        &mut self,
        snapshot: &Snapshot,
        deltas: &[StateDelta],
        events: &[AdapterEvent],
    ) -> &BridgeUpdate {
        let update = build_update(snapshot, deltas, events);
        if let Some(emitter) = &self.emitter {
            for event in &update.bus_events {
                emitter(&event.event_type, &event.event_data);
            }
        }
        self.last_update.insert(update)
    }
}
