//! Append-only event ledger.
//!
//! Events live in an in-memory queue and as one JSON file each under
//! `events/`. `append` persists before acknowledging, so an event that was
//! handed an id is guaranteed to survive a crash. The `processed` flag is
//! flipped exactly once, after the handler completed, which makes a crash
//! mid-handler leave the event re-processable on the next drain.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use super::fs_util::{self, RecordRead};
use super::types::{CoordinationEvent, EventKind};
use super::CoordinationError;

#[derive(Debug)]
pub struct EventLedger {
    events_dir: PathBuf,
    queue: Vec<CoordinationEvent>,
}

impl EventLedger {
    /// Open a ledger over `events_dir`, replaying every persisted event into
    /// the queue in append order. Corrupt event files are skipped with a
    /// warning; they are data loss for that one event, not for the session.
    pub async fn open(events_dir: impl Into<PathBuf>) -> Result<Self, CoordinationError> {
        let events_dir = events_dir.into();
        fs::create_dir_all(&events_dir).await?;

        let mut queue = Vec::new();
        let mut entries = fs::read_dir(&events_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match fs_util::read_json_lenient::<CoordinationEvent>(&path).await {
                RecordRead::Value(event) => queue.push(event),
                RecordRead::Missing | RecordRead::Corrupt => {}
            }
        }
        // Files enumerate in arbitrary order; restore append order.
        queue.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.event_id.cmp(&b.event_id))
        });

        Ok(Self { events_dir, queue })
    }

    fn event_path(&self, event_id: &str) -> PathBuf {
        self.events_dir.join(format!("{event_id}.json"))
    }

    /// Append an event, durably persisting it before returning its id. A
    /// persistence failure here is the one storage error that is fatal to
    /// the session, so it propagates instead of being converted to a warning.
    pub async fn append(
        &mut self,
        agent_id: &str,
        kind: EventKind,
        payload: BTreeMap<String, String>,
    ) -> Result<String, CoordinationError> {
        let timestamp = Utc::now();
        let event = CoordinationEvent {
            event_id: derive_event_id(agent_id, &kind, timestamp),
            timestamp,
            agent_id: agent_id.to_string(),
            kind,
            payload,
            processed: false,
        };

        fs_util::write_json_atomic(&self.event_path(&event.event_id), &event)
            .await
            .map_err(|err| CoordinationError::LedgerAppend {
                reason: err.to_string(),
            })?;

        debug!(
            event_id = %event.event_id,
            kind = %event.kind,
            agent_id = %event.agent_id,
            "Event appended"
        );
        let event_id = event.event_id.clone();
        self.queue.push(event);
        Ok(event_id)
    }

    /// Snapshot of all unprocessed events, in append order.
    pub fn drain_unprocessed(&self) -> Vec<CoordinationEvent> {
        self.queue
            .iter()
            .filter(|event| !event.processed)
            .cloned()
            .collect()
    }

    /// Flip the processed flag and rewrite the record. Called only after the
    /// handler for the event returned without error.
    pub async fn mark_processed(&mut self, event_id: &str) -> Result<(), CoordinationError> {
        let path = self.event_path(event_id);
        if let Some(event) = self.queue.iter_mut().find(|e| e.event_id == event_id) {
            if event.processed {
                return Ok(());
            }
            event.processed = true;
            fs_util::write_json_atomic(&path, event).await?;
        } else {
            warn!(event_id = %event_id, "mark_processed for unknown event");
        }
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.queue.iter().filter(|event| !event.processed).count()
    }

    pub fn events_dir(&self) -> &Path {
        &self.events_dir
    }
}

/// Content-derived, collision-resistant event id: a hash over the source,
/// kind, and timestamp, salted with a random nonce so two events from the
/// same source in the same instant still diverge.
fn derive_event_id(agent_id: &str, kind: &EventKind, timestamp: DateTime<Utc>) -> String {
    let mut hasher = DefaultHasher::new();
    agent_id.hash(&mut hasher);
    kind.to_string().hash(&mut hasher);
    timestamp
        .timestamp_nanos_opt()
        .unwrap_or_else(|| timestamp.timestamp())
        .hash(&mut hasher);
    rand::rng().random::<u32>().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
