//! End-to-end sync: a device-local queue synced against an in-process
//! event service.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use fieldscout::records::{
    make_qual_match_key, Alliance, Card, Drivetrain, MatchRecord, MetricValue, PitRecord,
    ScheduleEntry, Station,
};
use fieldscout::server::{EventDb, EventService};
use fieldscout::storage::local::LocalStore;
use fieldscout::sync::wire::SyncBatch;
use fieldscout::sync::{ApiError, ScoutApi, SyncEngine, SyncError, SyncResponse};

const API_KEY: &str = "pit-crew-secret";

/// Transport that hands batches straight to an event service, counting
/// round trips.
struct ServiceApi {
    service: Mutex<EventService>,
    presented_key: String,
    batch_calls: AtomicUsize,
    upload_calls: AtomicUsize,
}

impl ServiceApi {
    fn new(presented_key: &str) -> Self {
        let service = EventService::new(EventDb::open_in_memory().unwrap(), API_KEY);
        Self {
            service: Mutex::new(service),
            presented_key: presented_key.to_string(),
            batch_calls: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
        }
    }
}

impl ScoutApi for ServiceApi {
    async fn submit_batch(&self, batch: &SyncBatch) -> Result<SyncResponse, ApiError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .service
            .lock()
            .unwrap()
            .apply_batch(&self.presented_key, batch))
    }

    async fn upload_photo(
        &self,
        event_key: &str,
        team_number: u32,
        name: &str,
        _jpeg: Vec<u8>,
    ) -> Result<String, ApiError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("https://host/uploads/{event_key}/{team_number}/{name}"))
    }

    async fn fetch_teams(&self, event_key: &str) -> Result<serde_json::Value, ApiError> {
        let resp = self
            .service
            .lock()
            .unwrap()
            .event_teams(event_key)
            .map_err(|e| ApiError::Rejected(e.to_string()))?;
        serde_json::to_value(resp).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn fetch_schedule(&self, event_key: &str) -> Result<Vec<ScheduleEntry>, ApiError> {
        Ok(self
            .service
            .lock()
            .unwrap()
            .schedule(event_key)
            .map_err(|e| ApiError::Rejected(e.to_string()))?
            .matches)
    }
}

fn pit_record(device: &str, team: u32, notes: &str, created: i64) -> PitRecord {
    PitRecord {
        event_key: "2025gaalb".to_string(),
        team_number: team,
        drivetrain: Drivetrain::Swerve,
        weight_lb: Some(112.0),
        dims: None,
        autos: None,
        mechanisms: None,
        notes: Some(notes.to_string()),
        photos: Vec::new(),
        pending_photos: Vec::new(),
        scout_name: "casey".to_string(),
        device_id: device.to_string(),
        schema_version: Some(2),
        created_at_ms: created,
        synced: false,
    }
}

fn match_record(team: u32, n: u32, coral: f64) -> MatchRecord {
    MatchRecord {
        event_key: "2025gaalb".to_string(),
        match_key: make_qual_match_key("2025gaalb", n),
        team_number: team,
        alliance: Alliance::Red,
        station: Station::Red1,
        metrics: BTreeMap::from([(
            "teleop_coral_L1".to_string(),
            MetricValue::Number(coral),
        )]),
        penalties: 0,
        broke_down: false,
        defense_played: 0,
        defense_resilience: 0,
        driver_skill: 3,
        card: Card::None,
        comments: None,
        scout_name: "casey".to_string(),
        device_id: "dev_a".to_string(),
        schema_version: Some(2),
        created_at_ms: 1_755_000_000_000 + n as i64,
        synced: false,
    }
}

fn tiny_png() -> Vec<u8> {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(4, 4));
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

#[tokio::test]
async fn full_cycle_lands_on_server_and_marks_local() {
    let mut store = LocalStore::open_in_memory().unwrap();
    let mut pit = pit_record("dev_a", 1795, "fast intake", 100);
    pit.queue_photo("front.jpg".to_string(), tiny_png()).unwrap();
    store.put_pit(&pit).unwrap();
    store.put_match(&match_record(1795, 1, 4.0)).unwrap();

    let api = ServiceApi::new(API_KEY);
    let engine = SyncEngine::new();
    let outcome = engine.sync_unsynced(&mut store, &api).await.unwrap();

    assert_eq!(outcome.pit_count, 1);
    assert_eq!(outcome.match_count, 1);
    assert_eq!(outcome.photos_uploaded, 1);

    // server holds the record, photo url resolved
    let service = api.service.lock().unwrap();
    let stored = service.db().pit_record("2025gaalb", 1795).unwrap().unwrap();
    assert_eq!(stored.notes.as_deref(), Some("fast intake"));
    assert_eq!(stored.photos.len(), 1);
    assert!(stored.photos[0].contains("/1795/"));

    // local queue fully drained
    drop(service);
    let counts = store.unsynced_counts().unwrap();
    assert_eq!(counts.pit, 0);
    assert_eq!(counts.matches, 0);
}

#[tokio::test]
async fn resync_with_nothing_pending_sends_nothing() {
    let mut store = LocalStore::open_in_memory().unwrap();
    store.put_match(&match_record(118, 1, 2.0)).unwrap();

    let api = ServiceApi::new(API_KEY);
    let engine = SyncEngine::new();
    engine.sync_unsynced(&mut store, &api).await.unwrap();
    let second = engine.sync_unsynced(&mut store, &api).await.unwrap();

    assert!(second.is_noop());
    assert_eq!(api.batch_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.upload_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn later_device_wins_for_same_pit_keys() {
    let api = ServiceApi::new(API_KEY);
    let engine = SyncEngine::new();

    let mut device_a = LocalStore::open_in_memory().unwrap();
    device_a
        .put_pit(&pit_record("dev_a", 1795, "first visit", 200))
        .unwrap();
    engine.sync_unsynced(&mut device_a, &api).await.unwrap();

    // device B syncs later with an older capture timestamp; arrival wins
    let mut device_b = LocalStore::open_in_memory().unwrap();
    device_b
        .put_pit(&pit_record("dev_b", 1795, "second visit", 150))
        .unwrap();
    engine.sync_unsynced(&mut device_b, &api).await.unwrap();

    let service = api.service.lock().unwrap();
    let stored = service.db().pit_record("2025gaalb", 1795).unwrap().unwrap();
    assert_eq!(stored.device_id, "dev_b");
    assert_eq!(stored.notes.as_deref(), Some("second visit"));
}

#[tokio::test]
async fn match_resubmission_overwrites_single_row() {
    let api = ServiceApi::new(API_KEY);
    let engine = SyncEngine::new();
    let mut store = LocalStore::open_in_memory().unwrap();

    store.put_match(&match_record(118, 1, 2.0)).unwrap();
    engine.sync_unsynced(&mut store, &api).await.unwrap();

    // the scout corrects the entry and submits again
    store.put_match(&match_record(118, 1, 6.0)).unwrap();
    engine.sync_unsynced(&mut store, &api).await.unwrap();

    let service = api.service.lock().unwrap();
    let records = service.db().match_records_for_event("2025gaalb").unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].metrics["teleop_coral_L1"],
        MetricValue::Number(6.0)
    );
}

#[tokio::test]
async fn rejected_key_leaves_queue_intact() {
    let mut store = LocalStore::open_in_memory().unwrap();
    store.put_pit(&pit_record("dev_a", 118, "notes", 1)).unwrap();
    store.put_match(&match_record(118, 1, 2.0)).unwrap();

    let api = ServiceApi::new("wrong-key");
    let engine = SyncEngine::new();
    let err = engine.sync_unsynced(&mut store, &api).await.unwrap_err();

    assert!(matches!(err, SyncError::Rejected(_)));
    let counts = store.unsynced_counts().unwrap();
    assert_eq!(counts.pit, 1);
    assert_eq!(counts.matches, 1);

    let service = api.service.lock().unwrap();
    assert!(service
        .db()
        .match_records_for_event("2025gaalb")
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn roster_response_normalizes_into_cache() {
    let api = ServiceApi::new(API_KEY);
    api.service
        .lock()
        .unwrap()
        .db()
        .upsert_teams(
            "2025gaalb",
            &[fieldscout::records::TeamMeta {
                team_number: 118,
                nickname: Some("Everybot".to_string()),
                name: None,
            }],
        )
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let cache = fieldscout::cache::ReferenceCache::new(dir.path());
    let teams = fieldscout::sync::refresh_teams_cache(&api, &cache, "2025gaalb")
        .await
        .unwrap();

    assert_eq!(teams[&118].nickname.as_deref(), Some("Everybot"));
    assert_eq!(cache.load_teams("2025gaalb"), teams);
}
