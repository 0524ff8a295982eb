use std::sync::Mutex;

use super::*;

struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().expect("clock lock");
        *now += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

fn epoch() -> DateTime<Utc> {
    "2024-03-01T12:00:00Z".parse().expect("timestamp")
}

#[tokio::test]
async fn seeded_store_lists_records_in_insertion_order() {
    let store = Store::seed(10, Arc::new(SystemClock));
    let files = store.list_files().await;
    assert_eq!(files.len(), 10);
    for (index, file) in files.iter().enumerate() {
        assert_eq!(file.id.as_str(), format!("file-{}", index + 1));
    }
}

#[tokio::test]
async fn first_seeded_file_starts_at_ordered() {
    let store = Store::seed(5, Arc::new(SystemClock));
    let file = store
        .get_file(&FileId::new("file-1"))
        .await
        .expect("file-1");
    assert_eq!(file.stage, Stage::Ordered);
}

#[tokio::test]
async fn seeded_history_matches_stage_index() {
    let store = Store::seed(10, Arc::new(SystemClock));
    for file in store.list_files().await {
        let events = store.list_events(&file.id).await.expect("events");
        assert_eq!(events.len(), file.stage.index() + 1);
        for (index, event) in events.iter().enumerate() {
            assert_eq!(event.stage, Stage::ALL[index]);
        }
    }
}

#[tokio::test]
async fn update_applies_stage_and_refreshes_last_modified() {
    let clock = Arc::new(ManualClock::starting_at(epoch()));
    let store = Store::seed(3, clock.clone());
    let id = FileId::new("file-1");
    let before = store.get_file(&id).await.expect("file").last_modified;

    clock.advance(Duration::seconds(5));
    let updated = store
        .update_file(
            &id,
            UpdatePatch {
                stage: Some(Stage::Shipped),
                details: None,
            },
        )
        .await
        .expect("update");

    assert_eq!(updated.stage, Stage::Shipped);
    assert!(updated.last_modified > before);

    let fetched = store.get_file(&id).await.expect("file");
    assert_eq!(fetched, updated);
}

#[tokio::test]
async fn update_details_lands_in_metadata_notes() {
    let store = Store::seed(3, Arc::new(SystemClock));
    let id = FileId::new("file-2");
    let updated = store
        .update_file(
            &id,
            UpdatePatch {
                stage: None,
                details: Some("double-checked against the packing list".to_string()),
            },
        )
        .await
        .expect("update");
    assert_eq!(
        updated.metadata.expect("metadata").notes.as_deref(),
        Some("double-checked against the packing list")
    );
}

#[tokio::test]
async fn update_unknown_id_returns_none() {
    let store = Store::seed(3, Arc::new(SystemClock));
    let missing = store
        .update_file(&FileId::new("does-not-exist"), UpdatePatch::default())
        .await;
    assert!(missing.is_none());
}

#[tokio::test]
async fn backward_stage_updates_are_not_rejected() {
    let store = Store::seed(5, Arc::new(SystemClock));
    // file-5 seeds at complete; moving it back to ordered is allowed.
    let updated = store
        .update_file(
            &FileId::new("file-5"),
            UpdatePatch {
                stage: Some(Stage::Ordered),
                details: None,
            },
        )
        .await
        .expect("update");
    assert_eq!(updated.stage, Stage::Ordered);
}

#[tokio::test]
async fn transition_appends_exactly_one_event() {
    let store = Store::seed(3, Arc::new(SystemClock));
    let id = FileId::new("file-1");
    let before = store.list_events(&id).await.expect("events").len();

    let result = store
        .transition_file(&id, Stage::Shipped, Some("left the warehouse".to_string()))
        .await
        .expect("transition");

    assert_eq!(result.file.stage, Stage::Shipped);
    assert_eq!(result.events.len(), before + 1);
    let appended = result.events.last().expect("appended event");
    assert_eq!(appended.stage, Stage::Shipped);
    assert_eq!(appended.details.as_deref(), Some("left the warehouse"));
    assert_eq!(appended.file_id, id);
}

#[tokio::test]
async fn transition_to_current_stage_still_appends_and_refreshes() {
    let clock = Arc::new(ManualClock::starting_at(epoch()));
    let store = Store::seed(3, clock.clone());
    let id = FileId::new("file-1");

    clock.advance(Duration::seconds(1));
    let first = store
        .transition_file(&id, Stage::Shipped, None)
        .await
        .expect("first transition");

    clock.advance(Duration::seconds(1));
    let second = store
        .transition_file(&id, Stage::Shipped, None)
        .await
        .expect("second transition");

    assert_eq!(first.file.stage, Stage::Shipped);
    assert_eq!(second.file.stage, Stage::Shipped);
    assert_eq!(second.events.len(), first.events.len() + 1);
    assert!(second.file.last_modified > first.file.last_modified);
}

#[tokio::test]
async fn transition_unknown_id_returns_none() {
    let store = Store::seed(3, Arc::new(SystemClock));
    let missing = store
        .transition_file(&FileId::new("does-not-exist"), Stage::Shipped, None)
        .await;
    assert!(missing.is_none());
}

#[tokio::test]
async fn append_event_requires_an_existing_file() {
    let clock = Arc::new(ManualClock::starting_at(epoch()));
    let store = Store::seed(3, clock.clone());
    let id = FileId::new("file-2");

    let event = FileEvent {
        id: EventId::generate(),
        file_id: id.clone(),
        stage: Stage::Invoiced,
        timestamp: epoch(),
        details: Some("manual correction".to_string()),
        document_url: None,
    };
    store.append_event(event.clone()).await.expect("append");
    let events = store.list_events(&id).await.expect("events");
    assert_eq!(events.last(), Some(&event));

    let orphan = FileEvent {
        file_id: FileId::new("does-not-exist"),
        ..event
    };
    assert!(store.append_event(orphan).await.is_none());
}

#[tokio::test]
async fn list_events_unknown_id_returns_none() {
    let store = Store::seed(3, Arc::new(SystemClock));
    assert!(store.list_events(&FileId::new("nope")).await.is_none());
}

#[test]
fn derived_events_cover_every_stage_up_to_current() {
    let clock = ManualClock::starting_at(epoch());
    let id = FileId::new("file-7");

    for &stage in &Stage::ALL {
        let events = derive_events(&id, stage, &clock);
        assert_eq!(events.len(), stage.index() + 1);
        for (index, event) in events.iter().enumerate() {
            assert_eq!(event.stage, Stage::ALL[index]);
            assert_eq!(event.file_id, id);
        }
        let mut stages: Vec<_> = events.iter().map(|event| event.stage).collect();
        stages.dedup();
        assert_eq!(stages.len(), events.len(), "no duplicate stages");
    }
}

#[test]
fn derived_timestamps_step_back_one_day_per_stage() {
    let clock = ManualClock::starting_at(epoch());
    let events = derive_events(&FileId::new("file-7"), Stage::Remitted, &clock);

    assert_eq!(events[3].timestamp, epoch());
    assert_eq!(events[2].timestamp, epoch() - Duration::days(1));
    assert_eq!(events[1].timestamp, epoch() - Duration::days(2));
    assert_eq!(events[0].timestamp, epoch() - Duration::days(3));
    assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[test]
fn only_invoiced_events_carry_a_document_url() {
    let clock = ManualClock::starting_at(epoch());
    let events = derive_events(&FileId::new("file-7"), Stage::Complete, &clock);

    for event in &events {
        if event.stage == Stage::Invoiced {
            assert_eq!(
                event.document_url.as_deref(),
                Some("/documents/file-7/invoice.pdf")
            );
        } else {
            assert!(event.document_url.is_none());
        }
    }
}

#[tokio::test]
async fn seeded_metadata_accumulates_with_stage() {
    let store = Store::seed(5, Arc::new(SystemClock));

    // file-1 seeds at ordered: order fields only.
    let ordered = store
        .get_file(&FileId::new("file-1"))
        .await
        .expect("file")
        .metadata
        .expect("metadata");
    assert!(ordered.order_number.is_some());
    assert!(ordered.carrier.is_none());

    // file-5 seeds at complete: every stage's fields are present.
    let complete = store
        .get_file(&FileId::new("file-5"))
        .await
        .expect("file")
        .metadata
        .expect("metadata");
    assert!(complete.carrier.is_some());
    assert!(complete.invoice_number.is_some());
    assert!(complete.remittance_id.is_some());
    assert!(complete.completed_by.is_some());
}
