use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use shared::domain::{
    EventId, FileEvent, FileId, FileMetadata, FileRecord, FileWithEvents, Stage,
};

/// Injectable time source. The store and the event deriver never sample the
/// wall clock directly, so tests can pin exact timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fields a caller may change on an existing record. A `None` field is left
/// untouched. No forward-only check is applied to `stage`: any of the five
/// stages may be set, including moving backward.
#[derive(Debug, Clone, Default)]
pub struct UpdatePatch {
    pub stage: Option<Stage>,
    pub details: Option<String>,
}

/// Authoritative in-memory holder of file records and their event log.
/// Cheap to clone; all clones share state. One `RwLock` guards the whole
/// store, so every mutation runs as a single serialized read-modify-write
/// and readers never observe a half-applied update.
#[derive(Clone)]
pub struct Store {
    inner: Arc<RwLock<StoreInner>>,
    clock: Arc<dyn Clock>,
}

struct StoreInner {
    files: Vec<FileRecord>,
    events: HashMap<FileId, Vec<FileEvent>>,
}

impl Store {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner {
                files: Vec::new(),
                events: HashMap::new(),
            })),
            clock,
        }
    }

    /// Builds a store pre-populated with `count` deterministic mock records,
    /// each carrying the event history implied by its seeded stage.
    /// Regenerated on every process start; `file-1` always seeds at `ordered`.
    pub fn seed(count: usize, clock: Arc<dyn Clock>) -> Self {
        let mut files = Vec::with_capacity(count);
        let mut events = HashMap::new();
        for index in 0..count {
            let record = seed_record(index, clock.as_ref());
            let history = derive_events(&record.id, record.stage, clock.as_ref());
            events.insert(record.id.clone(), history);
            files.push(record);
        }
        Self {
            inner: Arc::new(RwLock::new(StoreInner { files, events })),
            clock,
        }
    }

    /// All records in insertion order. No pagination, filtering, or sorting.
    pub async fn list_files(&self) -> Vec<FileRecord> {
        self.inner.read().await.files.clone()
    }

    pub async fn get_file(&self, id: &FileId) -> Option<FileRecord> {
        let inner = self.inner.read().await;
        inner.files.iter().find(|file| &file.id == id).cloned()
    }

    pub async fn get_file_with_events(&self, id: &FileId) -> Option<FileWithEvents> {
        let inner = self.inner.read().await;
        let file = inner.files.iter().find(|file| &file.id == id)?.clone();
        let events = inner.events.get(id).cloned().unwrap_or_default();
        Some(FileWithEvents { file, events })
    }

    /// Events for one file in append order, or `None` for an unknown id.
    pub async fn list_events(&self, id: &FileId) -> Option<Vec<FileEvent>> {
        let inner = self.inner.read().await;
        if !inner.files.iter().any(|file| &file.id == id) {
            return None;
        }
        Some(inner.events.get(id).cloned().unwrap_or_default())
    }

    /// Applies the patch and refreshes `last_modified`. Returns the updated
    /// record, or `None` for an unknown id.
    pub async fn update_file(&self, id: &FileId, patch: UpdatePatch) -> Option<FileRecord> {
        let now = self.clock.now();
        let mut inner = self.inner.write().await;
        let file = inner.files.iter_mut().find(|file| &file.id == id)?;
        if let Some(stage) = patch.stage {
            file.stage = stage;
        }
        if let Some(details) = patch.details {
            file.metadata.get_or_insert_with(FileMetadata::default).notes = Some(details);
        }
        file.last_modified = now;
        Some(file.clone())
    }

    /// Records one historical transition. Returns `None` (and drops the
    /// event) for an unknown file id.
    pub async fn append_event(&self, event: FileEvent) -> Option<()> {
        let mut inner = self.inner.write().await;
        if !inner.files.iter().any(|file| file.id == event.file_id) {
            return None;
        }
        inner.events.entry(event.file_id.clone()).or_default().push(event);
        Some(())
    }

    /// The single write path for a stage change: sets the stage, refreshes
    /// `last_modified`, and appends exactly one event, all under one write
    /// lock. A transition to the current stage is not suppressed; the event
    /// is appended and the timestamp refreshed regardless.
    pub async fn transition_file(
        &self,
        id: &FileId,
        stage: Stage,
        details: Option<String>,
    ) -> Option<FileWithEvents> {
        let now = self.clock.now();
        let mut inner = self.inner.write().await;
        let file = inner.files.iter_mut().find(|file| &file.id == id)?;
        file.stage = stage;
        file.last_modified = now;
        let file = file.clone();

        let event = FileEvent {
            id: EventId::generate(),
            file_id: id.clone(),
            stage,
            timestamp: now,
            details,
            document_url: stage_document_url(id, stage),
        };
        let events = inner.events.entry(id.clone()).or_default();
        events.push(event);
        let events = events.clone();

        Some(FileWithEvents { file, events })
    }
}

/// Synthesizes the event history implied by a current stage: one event per
/// stage from `ordered` up to and including `stage`, one day apart, counting
/// back from the clock's now so the newest stage lands on "now". Stage
/// identity and ordering are deterministic for a given `(file_id, stage)`;
/// timestamps are exact under an injected clock.
pub fn derive_events(file_id: &FileId, stage: Stage, clock: &dyn Clock) -> Vec<FileEvent> {
    let now = clock.now();
    let current = stage.index() as i64;
    Stage::ALL[..=stage.index()]
        .iter()
        .map(|&reached| FileEvent {
            id: EventId::generate(),
            file_id: file_id.clone(),
            stage: reached,
            timestamp: now - Duration::days(current - reached.index() as i64),
            details: None,
            document_url: stage_document_url(file_id, reached),
        })
        .collect()
}

/// The invoiced stage carries a link to the invoice document; no other stage
/// attaches one.
fn stage_document_url(file_id: &FileId, stage: Stage) -> Option<String> {
    (stage == Stage::Invoiced).then(|| format!("/documents/{file_id}/invoice.pdf"))
}

// Deterministic mock-data catalogs. Index arithmetic stands in for the
// randomness of a real upload mix so seeded stores are reproducible.

struct SeedKind {
    prefixes: &'static [&'static str],
    extension: &'static str,
    base_size: u64,
}

const SEED_KINDS: [SeedKind; 5] = [
    SeedKind {
        prefixes: &["Report", "Document", "Contract", "Invoice"],
        extension: "pdf",
        base_size: 100_000,
    },
    SeedKind {
        prefixes: &["Proposal", "Letter", "Agreement", "Resume"],
        extension: "docx",
        base_size: 50_000,
    },
    SeedKind {
        prefixes: &["Budget", "Forecast", "Analysis", "Data"],
        extension: "xlsx",
        base_size: 50_000,
    },
    SeedKind {
        prefixes: &["Photo", "Screenshot", "Diagram", "Chart"],
        extension: "png",
        base_size: 500_000,
    },
    SeedKind {
        prefixes: &["Notes", "Log", "README", "Changes"],
        extension: "txt",
        base_size: 1_000,
    },
];

const SEED_USERS: [&str; 4] = ["alice", "bob", "carol", "dave"];
const SEED_CARRIERS: [&str; 3] = ["UPS", "FedEx", "DHL"];
const SEED_PAYMENT_METHODS: [&str; 2] = ["ACH", "Wire"];

fn seed_record(index: usize, clock: &dyn Clock) -> FileRecord {
    let now = clock.now();
    let kind = &SEED_KINDS[index % SEED_KINDS.len()];
    let prefix = kind.prefixes[(index / SEED_KINDS.len()) % kind.prefixes.len()];
    let stage = Stage::ALL[index % Stage::ALL.len()];
    let id = FileId::new(format!("file-{}", index + 1));

    FileRecord {
        filename: format!("{prefix}_{:03}.{}", index + 1, kind.extension),
        size: kind.base_size + 1024 * (index as u64 + 1),
        stage,
        uploaded_at: now - Duration::days(30 - (index as i64 % 30)),
        last_modified: now,
        metadata: Some(seed_metadata(index, stage)),
        id,
    }
}

/// Metadata accumulates field-by-field as a file advances, so a seeded
/// record carries every field its stage has already passed through.
fn seed_metadata(index: usize, stage: Stage) -> FileMetadata {
    let mut metadata = FileMetadata {
        user: SEED_USERS[index % SEED_USERS.len()].to_string(),
        order_number: Some(format!("ORD-{:04}", 1000 + index)),
        ..FileMetadata::default()
    };
    if stage >= Stage::Shipped {
        metadata.carrier = Some(SEED_CARRIERS[index % SEED_CARRIERS.len()].to_string());
        metadata.tracking_number = Some(format!("TRK-{:06}", 100_000 + index));
    }
    if stage >= Stage::Invoiced {
        metadata.invoice_number = Some(format!("INV-{:04}", 2000 + index));
        metadata.amount = Some(250 + 25 * index as u64);
    }
    if stage >= Stage::Remitted {
        metadata.remittance_id = Some(format!("REM-{:04}", 3000 + index));
        metadata.payment_method =
            Some(SEED_PAYMENT_METHODS[index % SEED_PAYMENT_METHODS.len()].to_string());
    }
    if stage >= Stage::Complete {
        metadata.completed_by = Some(SEED_USERS[(index + 1) % SEED_USERS.len()].to_string());
    }
    metadata
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
