//! HTTP transport for the sync protocol over reqwest.
//!
//! Endpoints hang off the normalized `/api` base: `sync.php` for batches,
//! `upload_photo.php` for photo payloads, `event_teams.php` and
//! `schedule.php` for reference data. The API key rides in the `X-API-KEY`
//! header, with a `key` query parameter duplicate for the photo endpoint.

use crate::records::ScheduleEntry;
use crate::settings::to_api_base;
use crate::sync::wire::{ScheduleResponse, SyncBatch, SyncResponse, UploadResponse};
use crate::sync::{ApiError, ScoutApi};

const API_KEY_HEADER: &str = "X-API-KEY";

/// Sync server client.
pub struct HttpApi {
    client: reqwest::Client,
    base: String,
    api_key: String,
}

impl HttpApi {
    /// Client for a server at any accepted base spelling.
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: to_api_base(base_url),
            api_key: api_key.to_string(),
        }
    }

    fn endpoint(&self, file: &str) -> String {
        format!("{}/{}", self.base, file)
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }
        resp.json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

impl ScoutApi for HttpApi {
    async fn submit_batch(&self, batch: &SyncBatch) -> Result<SyncResponse, ApiError> {
        let resp = self
            .client
            .post(self.endpoint("sync.php"))
            .header(API_KEY_HEADER, &self.api_key)
            .json(batch)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Self::decode(resp).await
    }

    async fn upload_photo(
        &self,
        event_key: &str,
        team_number: u32,
        name: &str,
        jpeg: Vec<u8>,
    ) -> Result<String, ApiError> {
        let team = team_number.to_string();
        let resp = self
            .client
            .post(self.endpoint("upload_photo.php"))
            .query(&[
                ("event", event_key),
                ("team", team.as_str()),
                ("name", name),
                ("key", self.api_key.as_str()),
            ])
            .header(API_KEY_HEADER, &self.api_key)
            .header("Content-Type", "image/jpeg")
            .body(jpeg)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let upload: UploadResponse = Self::decode(resp).await?;
        match (upload.ok, upload.url) {
            (true, Some(url)) => Ok(url),
            _ => Err(ApiError::Rejected(
                upload.error.unwrap_or_else(|| "upload rejected".to_string()),
            )),
        }
    }

    async fn fetch_teams(&self, event_key: &str) -> Result<serde_json::Value, ApiError> {
        let resp = self
            .client
            .get(self.endpoint("event_teams.php"))
            .query(&[("event", event_key)])
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Self::decode(resp).await
    }

    async fn fetch_schedule(&self, event_key: &str) -> Result<Vec<ScheduleEntry>, ApiError> {
        let resp = self
            .client
            .get(self.endpoint("schedule.php"))
            .query(&[("event", event_key)])
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let schedule: ScheduleResponse = Self::decode(resp).await?;
        if !schedule.ok {
            return Err(ApiError::Rejected(
                schedule
                    .error
                    .unwrap_or_else(|| "schedule unavailable".to_string()),
            ));
        }
        Ok(schedule.matches)
    }
}
