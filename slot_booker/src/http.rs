use crate::backend::SlotStore;
use crate::error::{BookingError, Result};
use crate::types::{BookingRequest, Slot};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// [`SlotStore`] talking to the booking service over its JSON API.
#[derive(Debug, Clone)]
pub struct HttpSlotStore {
    client: Client,
    base_url: String,
}

impl HttpSlotStore {
    pub fn new(base_url: &str, request_timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(request_timeout) = request_timeout {
            builder = builder.timeout(request_timeout);
        }
        let client = builder.build().map_err(|err| {
            BookingError::Configuration(format!("Failed to create HTTP client: {err}"))
        })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn slots_url(&self) -> String {
        format!("{}/api/slots", self.base_url)
    }

    fn book_url(&self, id: &str) -> String {
        format!(
            "{}/api/slots/{}/book",
            self.base_url,
            urlencoding::encode(id)
        )
    }
}

#[async_trait]
impl SlotStore for HttpSlotStore {
    async fn list_slots(&self) -> Result<Vec<Slot>> {
        let response = self.client.get(self.slots_url()).send().await.map_err(|err| {
            error!(?err, "Failed to reach booking service");
            BookingError::Fetch(err.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            error!(%status, "Booking service refused to list slots");
            return Err(BookingError::Fetch(status.to_string()));
        }

        let slots: Vec<Slot> = response
            .json()
            .await
            .map_err(|err| BookingError::Fetch(format!("Malformed slot list: {err}")))?;
        debug!(count = slots.len(), "Fetched slots");
        Ok(slots)
    }

    async fn book_slot(&self, id: &str, request: BookingRequest) -> Result<Option<Slot>> {
        let response = self
            .client
            .post(self.book_url(id))
            .json(&request)
            .send()
            .await
            .map_err(|err| {
                error!(?err, slot_id = id, "Failed to reach booking service");
                BookingError::Booking(err.to_string())
            })?;

        let status = response.status();
        let body = response.text().await;

        if !status.is_success() {
            let detail = body.ok();
            let message = match detail.as_deref().and_then(error_detail) {
                Some(detail) => format!("{status}: {detail}"),
                None => status.to_string(),
            };
            error!(slot_id = id, %message, "Booking rejected");
            return Err(BookingError::Booking(message));
        }

        info!(slot_id = id, "Booking confirmed by service");
        // The slot is booked at this point even if the body is lost.
        let body = match body {
            Ok(body) => body,
            Err(err) => {
                warn!(?err, slot_id = id, "Failed to read booking confirmation");
                return Ok(None);
            }
        };
        match serde_json::from_str::<Slot>(&body) {
            Ok(slot) => Ok(Some(slot)),
            Err(err) => {
                debug!(?err, slot_id = id, "Booking response carried no slot");
                Ok(None)
            }
        }
    }
}

/// Extracts the `detail` of an error body. Validation failures carry a list
/// of `{ "msg": ... }` entries instead of a plain string.
fn error_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::String(detail) => Some(detail.clone()),
        Value::Array(entries) => {
            let messages: Vec<&str> = entries
                .iter()
                .filter_map(|entry| entry.get("msg").and_then(Value::as_str))
                .collect();
            match messages.is_empty() {
                true => None,
                false => Some(messages.join("; ")),
            }
        }
        _ => None,
    }
}
