//! Explicit state container: the only place progression records are replaced.
//!
//! Every command clones the record it touches, runs the pure rule functions on
//! the copy, and swaps it in only when all of them succeed.

mod commands;
mod queries;

use contracts::{
    Campaign, Event, EventType, Knight, ProgressionSnapshot, ReferenceCatalog, SCHEMA_VERSION_V1,
};
use serde_json::Value;

use crate::error::{EntityKind, ProgressionError, ProgressionResult};

pub use queries::ChapterSummary;

#[derive(Debug, Clone)]
struct PendingEvent {
    event_type: EventType,
    subject_id: String,
    details: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct ProgressionEngine {
    state: ProgressionSnapshot,
    catalog: ReferenceCatalog,
    event_log: Vec<Event>,
    next_sequence: u64,
}

impl ProgressionEngine {
    pub fn new(catalog: ReferenceCatalog) -> Self {
        Self::resume(ProgressionSnapshot::default(), catalog, 1)
    }

    /// Restores a persisted snapshot; new events continue from `next_sequence`.
    pub fn resume(
        snapshot: ProgressionSnapshot,
        catalog: ReferenceCatalog,
        next_sequence: u64,
    ) -> Self {
        Self {
            state: snapshot,
            catalog,
            event_log: Vec::new(),
            next_sequence: next_sequence.max(1),
        }
    }

    pub fn snapshot(&self) -> &ProgressionSnapshot {
        &self.state
    }

    pub fn catalog(&self) -> &ReferenceCatalog {
        &self.catalog
    }

    /// Events emitted since this engine was created or resumed.
    pub fn events(&self) -> &[Event] {
        &self.event_log
    }

    pub fn knight(&self, knight_uid: &str) -> ProgressionResult<&Knight> {
        self.state
            .knights
            .get(knight_uid)
            .ok_or_else(|| ProgressionError::not_found(EntityKind::Knight, knight_uid))
    }

    pub fn campaign(&self, campaign_id: &str) -> ProgressionResult<&Campaign> {
        self.state
            .campaigns
            .get(campaign_id)
            .ok_or_else(|| ProgressionError::not_found(EntityKind::Campaign, campaign_id))
    }

    fn commit_events(
        &mut self,
        command_id: &str,
        created_at_ms: u64,
        pending: Vec<PendingEvent>,
    ) -> &[Event] {
        let start = self.event_log.len();
        for entry in pending {
            self.event_log.push(Event {
                schema_version: SCHEMA_VERSION_V1.to_string(),
                sequence: self.next_sequence,
                command_id: command_id.to_string(),
                created_at_ms,
                event_type: entry.event_type,
                subject_id: entry.subject_id,
                details: entry.details,
            });
            self.next_sequence += 1;
        }
        &self.event_log[start..]
    }
}
