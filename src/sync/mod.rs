//! Sync engine: ships queued records to the aggregation server.
//!
//! Sync is explicit (a button, not a daemon), single-flight, and
//! all-or-nothing per batch: photos for pit records upload first, then every
//! unsynced record of both kinds goes up in one request, and local records
//! flip to synced only after the server confirms the whole batch. A failed
//! photo upload never blocks the batch; the photo stays pending for the next
//! run.

pub mod http;
pub mod wire;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

use crate::cache::{teams_meta_from_value, CacheError, ReferenceCache};
use crate::photos;
use crate::records::{PitRecord, RecordKind, ScheduleEntry, TeamMeta, MAX_PIT_PHOTOS};
use crate::storage::local::{LocalStore, StoreError};

pub use http::HttpApi;
pub use wire::{SyncBatch, SyncResponse};

/// Transport-level errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Rejected: {0}")]
    Rejected(String),
}

/// Sync errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A sync pass is already running; concurrent triggers collapse into
    /// the one in flight.
    #[error("sync already in progress")]
    AlreadyRunning,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// The server refused the batch; nothing was marked synced.
    #[error("Server rejected batch: {0}")]
    Rejected(String),
}

/// Server transport seam. The production implementation is [`HttpApi`];
/// tests drive the engine against an in-process fake.
pub trait ScoutApi: Send + Sync {
    /// Submit one batch of records.
    fn submit_batch(
        &self,
        batch: &SyncBatch,
    ) -> impl std::future::Future<Output = Result<SyncResponse, ApiError>> + Send;

    /// Upload one compressed photo; returns its reference URL.
    fn upload_photo(
        &self,
        event_key: &str,
        team_number: u32,
        name: &str,
        jpeg: Vec<u8>,
    ) -> impl std::future::Future<Output = Result<String, ApiError>> + Send;

    /// Fetch the event roster in whatever shape the server produces.
    fn fetch_teams(
        &self,
        event_key: &str,
    ) -> impl std::future::Future<Output = Result<serde_json::Value, ApiError>> + Send;

    /// Fetch the event schedule.
    fn fetch_schedule(
        &self,
        event_key: &str,
    ) -> impl std::future::Future<Output = Result<Vec<ScheduleEntry>, ApiError>> + Send;
}

/// What one sync pass accomplished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub pit_count: usize,
    pub match_count: usize,
    pub photos_uploaded: usize,
    pub photos_failed: usize,
}

impl SyncOutcome {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Single-flight sync driver.
pub struct SyncEngine {
    in_flight: AtomicBool,
}

struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncEngine {
    pub fn new() -> Self {
        Self {
            in_flight: AtomicBool::new(false),
        }
    }

    /// Run one sync pass: upload pending photos, ship every unsynced record
    /// in one batch, and mark local rows synced on server confirmation.
    /// A second concurrent call fails fast with [`SyncError::AlreadyRunning`].
    /// With nothing pending this touches the network not at all.
    pub async fn sync_unsynced(
        &self,
        store: &mut LocalStore,
        api: &impl ScoutApi,
    ) -> Result<SyncOutcome, SyncError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(SyncError::AlreadyRunning);
        }
        let _guard = FlightGuard(&self.in_flight);
        self.run_pass(store, api).await
    }

    async fn run_pass(
        &self,
        store: &mut LocalStore,
        api: &impl ScoutApi,
    ) -> Result<SyncOutcome, SyncError> {
        // a synced record still carrying pending photos re-ships so the
        // photos get another attempt and the server sees the new urls
        let pending_pit: Vec<_> = store
            .get_all_pit()?
            .into_iter()
            .filter(|s| !s.record.synced || !s.record.pending_photos.is_empty())
            .collect();
        let pending_match: Vec<_> = store
            .get_all_match()?
            .into_iter()
            .filter(|s| !s.record.synced)
            .collect();

        let mut outcome = SyncOutcome::default();
        if pending_pit.is_empty() && pending_match.is_empty() {
            tracing::debug!("sync: nothing pending");
            return Ok(outcome);
        }

        let mut pit_ids = Vec::with_capacity(pending_pit.len());
        let mut pit_payload = Vec::with_capacity(pending_pit.len());
        for stored in pending_pit {
            let mut record = stored.record;
            let changed = self.upload_photos(api, &mut record, &mut outcome).await;
            if changed {
                store.update_pit(stored.id, &record)?;
            }
            pit_ids.push(stored.id);
            pit_payload.push(record);
        }

        let mut match_ids = Vec::with_capacity(pending_match.len());
        let mut match_payload = Vec::with_capacity(pending_match.len());
        for stored in pending_match {
            let mut record = stored.record;
            record.sanitize_metrics();
            match_ids.push(stored.id);
            match_payload.push(record);
        }

        let batch = SyncBatch {
            pit: pit_payload,
            match_records: match_payload,
            key: None,
        };
        let resp = api.submit_batch(&batch).await?;
        if !resp.ok {
            return Err(SyncError::Rejected(
                resp.error.unwrap_or_else(|| "batch refused".to_string()),
            ));
        }

        store.mark_synced(RecordKind::Pit, &pit_ids)?;
        store.mark_synced(RecordKind::Match, &match_ids)?;
        outcome.pit_count = pit_ids.len();
        outcome.match_count = match_ids.len();

        tracing::info!(
            pit = outcome.pit_count,
            matches = outcome.match_count,
            photos = outcome.photos_uploaded,
            "sync complete"
        );
        Ok(outcome)
    }

    /// Upload a record's pending photos, moving each success into the
    /// resolved URL list. An unreadable photo is dropped; a transport
    /// failure leaves the remainder pending for the next pass. Returns
    /// whether the record changed and needs a writeback.
    async fn upload_photos(
        &self,
        api: &impl ScoutApi,
        record: &mut PitRecord,
        outcome: &mut SyncOutcome,
    ) -> bool {
        let mut changed = false;
        while let Some(photo) = record.pending_photos.first() {
            if record.photos.len() >= MAX_PIT_PHOTOS {
                let dropped = record.pending_photos.len();
                tracing::warn!(
                    team = record.team_number,
                    dropped,
                    "photo cap reached, dropping excess pending photos"
                );
                outcome.photos_failed += dropped;
                record.pending_photos.clear();
                changed = true;
                break;
            }

            let jpeg = match photos::compress_default(&photo.bytes) {
                Ok(jpeg) => jpeg,
                Err(e) => {
                    tracing::warn!(name = %photo.name, "dropping unreadable photo: {e}");
                    record.pending_photos.remove(0);
                    outcome.photos_failed += 1;
                    changed = true;
                    continue;
                }
            };

            // the server stores uploads flat by filename; the capture name
            // is not unique across records, so mint one that is
            let name = photos::photo_filename(
                &record.event_key,
                record.team_number,
                record.created_at_ms,
            );
            match api
                .upload_photo(&record.event_key, record.team_number, &name, jpeg)
                .await
            {
                Ok(url) => {
                    record.photos.push(url);
                    record.pending_photos.remove(0);
                    outcome.photos_uploaded += 1;
                    changed = true;
                }
                Err(e) => {
                    // leave this and the rest pending; the record still
                    // ships with whatever photos it has
                    tracing::warn!(
                        team = record.team_number,
                        "photo upload failed, will retry next sync: {e}"
                    );
                    break;
                }
            }
        }
        changed
    }
}

/// Fetch the event roster, normalize it, and replace the cache for that
/// event.
pub async fn refresh_teams_cache(
    api: &impl ScoutApi,
    cache: &ReferenceCache,
    event_key: &str,
) -> Result<BTreeMap<u32, TeamMeta>, SyncError> {
    let raw = api.fetch_teams(event_key).await?;
    let teams = teams_meta_from_value(&raw);
    cache.store_teams(event_key, &teams)?;
    tracing::info!(event = event_key, teams = teams.len(), "roster cache refreshed");
    Ok(teams)
}

/// Fetch the event schedule and replace the cache for that event.
pub async fn refresh_schedule_cache(
    api: &impl ScoutApi,
    cache: &ReferenceCache,
    event_key: &str,
) -> Result<Vec<ScheduleEntry>, SyncError> {
    let schedule = api.fetch_schedule(event_key).await?;
    cache.store_schedule(event_key, &schedule)?;
    tracing::info!(
        event = event_key,
        matches = schedule.len(),
        "schedule cache refreshed"
    );
    Ok(schedule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{
        Alliance, Card, Drivetrain, MatchRecord, MetricValue, PendingPhoto, Station,
    };
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeApi {
        batches: Mutex<Vec<SyncBatch>>,
        uploads: Mutex<Vec<String>>,
        fail_uploads: bool,
        reject_batches: bool,
    }

    impl ScoutApi for FakeApi {
        async fn submit_batch(&self, batch: &SyncBatch) -> Result<SyncResponse, ApiError> {
            if self.reject_batches {
                return Ok(SyncResponse {
                    ok: false,
                    error: Some("invalid key".to_string()),
                    ..Default::default()
                });
            }
            self.batches.lock().unwrap().push(batch.clone());
            Ok(SyncResponse {
                ok: true,
                pit_synced: batch.pit.len(),
                match_synced: batch.match_records.len(),
                error: None,
            })
        }

        async fn upload_photo(
            &self,
            event_key: &str,
            team_number: u32,
            name: &str,
            _jpeg: Vec<u8>,
        ) -> Result<String, ApiError> {
            if self.fail_uploads {
                return Err(ApiError::Network("connection refused".to_string()));
            }
            let url = format!("https://host/uploads/{event_key}/{team_number}/{name}");
            self.uploads.lock().unwrap().push(url.clone());
            Ok(url)
        }

        async fn fetch_teams(&self, _event_key: &str) -> Result<serde_json::Value, ApiError> {
            Ok(serde_json::json!({"ok": true, "teams": [118, 1795]}))
        }

        async fn fetch_schedule(
            &self,
            _event_key: &str,
        ) -> Result<Vec<ScheduleEntry>, ApiError> {
            Ok(Vec::new())
        }
    }

    fn pit_record(team: u32) -> PitRecord {
        PitRecord {
            event_key: "2025gaalb".to_string(),
            team_number: team,
            drivetrain: Drivetrain::Swerve,
            weight_lb: None,
            dims: None,
            autos: None,
            mechanisms: None,
            notes: None,
            photos: Vec::new(),
            pending_photos: Vec::new(),
            scout_name: "casey".to_string(),
            device_id: "dev_abc".to_string(),
            schema_version: Some(2),
            created_at_ms: 1_755_000_000_000,
            synced: false,
        }
    }

    fn match_record(team: u32, match_number: u32) -> MatchRecord {
        MatchRecord {
            event_key: "2025gaalb".to_string(),
            match_key: crate::records::make_qual_match_key("2025gaalb", match_number),
            team_number: team,
            alliance: Alliance::Red,
            station: Station::Red1,
            metrics: BTreeMap::from([
                ("teleop_coral_L1".to_string(), MetricValue::Number(3.0)),
                ("notes".to_string(), MetricValue::Text("dup".to_string())),
            ]),
            penalties: 0,
            broke_down: false,
            defense_played: 0,
            defense_resilience: 0,
            driver_skill: 3,
            card: Card::None,
            comments: Some("dup".to_string()),
            scout_name: "casey".to_string(),
            device_id: "dev_abc".to_string(),
            schema_version: Some(2),
            created_at_ms: 1_755_000_100_000,
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
    async fn test_batch_ships_everything_and_marks_synced() {
        let mut store = LocalStore::open_in_memory().unwrap();
        store.put_pit(&pit_record(118)).unwrap();
        store.put_match(&match_record(118, 1)).unwrap();
        store.put_match(&match_record(254, 1)).unwrap();

        let api = FakeApi::default();
        let engine = SyncEngine::new();
        let outcome = engine.sync_unsynced(&mut store, &api).await.unwrap();

        assert_eq!(outcome.pit_count, 1);
        assert_eq!(outcome.match_count, 2);
        assert_eq!(api.batches.lock().unwrap().len(), 1);
        assert_eq!(store.unsynced_counts().unwrap().matches, 0);
    }

    #[tokio::test]
    async fn test_second_pass_is_zero_network() {
        let mut store = LocalStore::open_in_memory().unwrap();
        store.put_match(&match_record(118, 1)).unwrap();

        let api = FakeApi::default();
        let engine = SyncEngine::new();
        engine.sync_unsynced(&mut store, &api).await.unwrap();

        let outcome = engine.sync_unsynced(&mut store, &api).await.unwrap();
        assert!(outcome.is_noop());
        // no second request of any kind
        assert_eq!(api.batches.lock().unwrap().len(), 1);
        assert!(api.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_batch_marks_nothing() {
        let mut store = LocalStore::open_in_memory().unwrap();
        store.put_pit(&pit_record(118)).unwrap();
        store.put_match(&match_record(118, 1)).unwrap();

        let api = FakeApi {
            reject_batches: true,
            ..Default::default()
        };
        let engine = SyncEngine::new();
        let err = engine.sync_unsynced(&mut store, &api).await.unwrap_err();

        assert!(matches!(err, SyncError::Rejected(_)));
        let counts = store.unsynced_counts().unwrap();
        assert_eq!(counts.pit, 1);
        assert_eq!(counts.matches, 1);
    }

    #[tokio::test]
    async fn test_photos_upload_before_batch() {
        let mut store = LocalStore::open_in_memory().unwrap();
        let mut rec = pit_record(1795);
        rec.queue_photo("front.jpg".to_string(), tiny_png()).unwrap();
        store.put_pit(&rec).unwrap();

        let api = FakeApi::default();
        let engine = SyncEngine::new();
        let outcome = engine.sync_unsynced(&mut store, &api).await.unwrap();

        assert_eq!(outcome.photos_uploaded, 1);
        let shipped = &api.batches.lock().unwrap()[0].pit[0];
        assert_eq!(shipped.photos.len(), 1);
        assert!(shipped.photos[0].contains("1795"));

        // local copy carries the url and no pending payloads
        let all = store.get_all_pit().unwrap();
        assert!(all[0].record.pending_photos.is_empty());
        assert_eq!(all[0].record.photos.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_photo_stays_pending_but_batch_ships() {
        let mut store = LocalStore::open_in_memory().unwrap();
        let mut rec = pit_record(1795);
        rec.queue_photo("front.jpg".to_string(), tiny_png()).unwrap();
        store.put_pit(&rec).unwrap();

        let api = FakeApi {
            fail_uploads: true,
            ..Default::default()
        };
        let engine = SyncEngine::new();
        let outcome = engine.sync_unsynced(&mut store, &api).await.unwrap();

        // the record still synced, photo retried next pass
        assert_eq!(outcome.pit_count, 1);
        assert_eq!(outcome.photos_uploaded, 0);
        let all = store.get_all_pit().unwrap();
        assert!(all[0].record.synced);
        assert_eq!(all[0].record.pending_photos.len(), 1);

        // once the network is back, the next pass picks the photo up even
        // though the record itself already synced
        let api = FakeApi::default();
        let outcome = engine.sync_unsynced(&mut store, &api).await.unwrap();
        assert_eq!(outcome.photos_uploaded, 1);
        let all = store.get_all_pit().unwrap();
        assert!(all[0].record.pending_photos.is_empty());
        assert_eq!(all[0].record.photos.len(), 1);
    }

    #[tokio::test]
    async fn test_upload_names_generated_and_unique() {
        let mut store = LocalStore::open_in_memory().unwrap();
        // two teams, both cameras save to the same default capture name
        for team in [118, 1795] {
            let mut rec = pit_record(team);
            rec.queue_photo("photo.jpg".to_string(), tiny_png()).unwrap();
            store.put_pit(&rec).unwrap();
        }

        let api = FakeApi::default();
        let engine = SyncEngine::new();
        let outcome = engine.sync_unsynced(&mut store, &api).await.unwrap();
        assert_eq!(outcome.photos_uploaded, 2);

        let uploads = api.uploads.lock().unwrap();
        let names: Vec<&str> = uploads
            .iter()
            .map(|u| u.rsplit('/').next().unwrap())
            .collect();
        assert_ne!(names[0], names[1]);
        for (name, team) in names.iter().zip([118, 1795]) {
            assert!(name.starts_with(&format!("2025gaalb_{team}_")));
            assert!(name.ends_with(".jpg"));
            assert_ne!(*name, "photo.jpg");
        }
    }

    #[tokio::test]
    async fn test_pendings_over_cap_dropped_at_upload() {
        let mut store = LocalStore::open_in_memory().unwrap();
        let mut rec = pit_record(118);
        // drifted state: the url list already holds the cap
        rec.photos = (0..MAX_PIT_PHOTOS)
            .map(|i| format!("https://host/uploads/p{i}.jpg"))
            .collect();
        rec.pending_photos.push(PendingPhoto {
            name: "extra.jpg".to_string(),
            bytes: tiny_png(),
        });
        store.put_pit(&rec).unwrap();

        let api = FakeApi::default();
        let engine = SyncEngine::new();
        let outcome = engine.sync_unsynced(&mut store, &api).await.unwrap();

        assert_eq!(outcome.photos_uploaded, 0);
        assert_eq!(outcome.photos_failed, 1);
        assert!(api.uploads.lock().unwrap().is_empty());
        let all = store.get_all_pit().unwrap();
        assert!(all[0].record.pending_photos.is_empty());
        assert_eq!(all[0].record.photos.len(), MAX_PIT_PHOTOS);
    }

    #[tokio::test]
    async fn test_unreadable_photo_dropped_and_counted() {
        let mut store = LocalStore::open_in_memory().unwrap();
        let mut rec = pit_record(118);
        rec.queue_photo("junk.jpg".to_string(), vec![0, 1, 2, 3]).unwrap();
        rec.queue_photo("real.jpg".to_string(), tiny_png()).unwrap();
        store.put_pit(&rec).unwrap();

        let api = FakeApi::default();
        let engine = SyncEngine::new();
        let outcome = engine.sync_unsynced(&mut store, &api).await.unwrap();

        assert_eq!(outcome.photos_failed, 1);
        assert_eq!(outcome.photos_uploaded, 1);
        let all = store.get_all_pit().unwrap();
        assert!(all[0].record.pending_photos.is_empty());
        assert_eq!(all[0].record.photos.len(), 1);
    }

    #[tokio::test]
    async fn test_metrics_notes_stripped_on_the_wire() {
        let mut store = LocalStore::open_in_memory().unwrap();
        store.put_match(&match_record(118, 1)).unwrap();

        let api = FakeApi::default();
        let engine = SyncEngine::new();
        engine.sync_unsynced(&mut store, &api).await.unwrap();

        let shipped = &api.batches.lock().unwrap()[0].match_records[0];
        assert!(!shipped.metrics.contains_key("notes"));
        assert_eq!(shipped.comments.as_deref(), Some("dup"));
    }

    #[tokio::test]
    async fn test_refresh_caches() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ReferenceCache::new(dir.path());
        let api = FakeApi::default();

        let teams = refresh_teams_cache(&api, &cache, "2025gaalb").await.unwrap();
        assert_eq!(teams.len(), 2);
        assert_eq!(cache.load_teams("2025gaalb").len(), 2);

        refresh_schedule_cache(&api, &cache, "2025gaalb").await.unwrap();
        assert!(cache.load_schedule("2025gaalb").is_empty());
    }
}
