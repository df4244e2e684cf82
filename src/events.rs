//! Domain events and the sink they are published to. The sink is injected into the engines
//! and the scheduler; a failing sink is logged and never fails the operation that emitted.

use crate::schema::EntityKind;
use serde::Serialize;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Created { kind: EntityKind, id: i64 },
    Updated { kind: EntityKind, id: i64 },
    Deleted { kind: EntityKind, id: i64 },
    AppointmentBooked {
        id: i64,
        vet_id: i64,
        date: String,
        time_slot: String,
    },
    AppointmentCancelled { id: i64 },
    VisitRecorded { id: i64, pet_id: i64, services: usize },
}

#[derive(Error, Debug)]
#[error("event sink: {0}")]
pub struct SinkError(pub String);

pub trait EventSink: Send + Sync {
    fn publish(&self, event: &DomainEvent) -> Result<(), SinkError>;
}

/// Publish, logging instead of propagating a sink failure.
pub fn emit(sink: &dyn EventSink, event: DomainEvent) {
    if let Err(e) = sink.publish(&event) {
        tracing::warn!(error = %e, ?event, "event not delivered");
    }
}

/// Writes every event to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: &DomainEvent) -> Result<(), SinkError> {
        tracing::info!(?event, "domain event");
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn publish(&self, _event: &DomainEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Keeps published events in memory for inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        RecordingSink::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: &DomainEvent) -> Result<(), SinkError> {
        self.events
            .lock()
            .map_err(|_| SinkError("recording sink poisoned".into()))?
            .push(event.clone());
        Ok(())
    }
}
