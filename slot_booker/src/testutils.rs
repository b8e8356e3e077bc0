use crate::{
    backend::SlotStore,
    error::{BookingError, Result},
    types::{BookingRequest, Slot},
};
use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::{net::TcpListener, task::JoinHandle, time::timeout};
use tokio_stream::{wrappers::WatchStream, StreamExt};

pub fn slot(id: &str, datetime_utc: DateTime<Utc>) -> Slot {
    Slot {
        id: id.into(),
        datetime_utc,
        is_booked: false,
        booked_by_name: None,
        booked_by_email: None,
        description: None,
    }
}

pub async fn read_from_slot_stream(slot_stream: &mut WatchStream<Vec<Slot>>) -> Vec<Slot> {
    timeout(Duration::from_secs(1), slot_stream.next())
        .await
        .expect("No slots received within a second")
        .expect("Slot stream closed")
}

pub struct MockSlotStoreInner {
    pub success: AtomicBool,
    pub confirm_with_slot: AtomicBool,
    pub failure_message: Mutex<String>,
    pub calls_to_list_slots: AtomicU64,
    pub calls_to_book_slot: AtomicU64,
    pub slots: Mutex<Vec<Slot>>,
    pub booking_requests: Mutex<Vec<(String, BookingRequest)>>,
}

#[derive(Clone)]
pub struct MockSlotStore(pub Arc<MockSlotStoreInner>);

impl MockSlotStoreInner {
    fn new() -> Self {
        Self {
            success: AtomicBool::new(true),
            confirm_with_slot: AtomicBool::new(true),
            failure_message: Mutex::new("Supposed to fail".into()),
            calls_to_list_slots: AtomicU64::default(),
            calls_to_book_slot: AtomicU64::default(),
            slots: Mutex::default(),
            booking_requests: Mutex::default(),
        }
    }
}

impl MockSlotStore {
    pub fn new() -> Self {
        Self(Arc::new(MockSlotStoreInner::new()))
    }

    pub fn with_slots(slots: Vec<Slot>) -> Self {
        let mock = Self::new();
        *mock.0.slots.lock().unwrap() = slots;
        mock
    }

    pub fn fail_with(&self, message: &str) {
        self.0.success.store(false, Ordering::SeqCst);
        *self.0.failure_message.lock().unwrap() = message.into();
    }

    pub fn calls_to_book_slot(&self) -> u64 {
        self.0.calls_to_book_slot.load(Ordering::SeqCst)
    }

    fn failure(&self) -> String {
        self.0.failure_message.lock().unwrap().clone()
    }
}

#[async_trait]
impl SlotStore for MockSlotStore {
    async fn list_slots(&self) -> Result<Vec<Slot>> {
        self.0.calls_to_list_slots.fetch_add(1, Ordering::SeqCst);
        match self.0.success.load(Ordering::SeqCst) {
            true => Ok(self.0.slots.lock().unwrap().clone()),
            false => Err(BookingError::Fetch(self.failure())),
        }
    }

    async fn book_slot(&self, id: &str, request: BookingRequest) -> Result<Option<Slot>> {
        self.0.calls_to_book_slot.fetch_add(1, Ordering::SeqCst);
        self.0
            .booking_requests
            .lock()
            .unwrap()
            .push((id.to_string(), request.clone()));

        if !self.0.success.load(Ordering::SeqCst) {
            return Err(BookingError::Booking(self.failure()));
        }
        if !self.0.confirm_with_slot.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let mut slots = self.0.slots.lock().unwrap();
        Ok(slots.iter_mut().find(|slot| slot.id == id).map(|slot| {
            slot.is_booked = true;
            slot.booked_by_name = Some(request.booked_by_name);
            slot.booked_by_email = Some(request.booked_by_email);
            slot.description = request.description;
            slot.clone()
        }))
    }
}

/// Minimal stand-in for the booking service's HTTP API.
#[derive(Clone, Default)]
pub struct FakeBookingService {
    pub slots: Arc<Mutex<HashMap<String, Slot>>>,
    pub unavailable: Arc<AtomicBool>,
    pub empty_confirmation: Arc<AtomicBool>,
}

impl FakeBookingService {
    pub fn with_slots(slots: Vec<Slot>) -> Self {
        let service = Self::default();
        *service.slots.lock().unwrap() = slots
            .into_iter()
            .map(|slot| (slot.id.clone(), slot))
            .collect();
        service
    }

    /// Serves on an ephemeral local port and returns the base URL.
    pub async fn start(&self) -> (JoinHandle<()>, String) {
        let app = Router::new()
            .route("/api/slots", get(fake_list_slots))
            .route("/api/slots/:id/book", post(fake_book_slot))
            .with_state(self.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (server, format!("http://{address}"))
    }
}

async fn fake_list_slots(State(service): State<FakeBookingService>) -> Response {
    if service.unavailable.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let mut slots: Vec<Slot> = service.slots.lock().unwrap().values().cloned().collect();
    slots.sort_by(|a, b| a.datetime_utc.cmp(&b.datetime_utc));
    Json(slots).into_response()
}

async fn fake_book_slot(
    State(service): State<FakeBookingService>,
    Path(id): Path<String>,
    Json(request): Json<BookingRequest>,
) -> Response {
    let mut slots = service.slots.lock().unwrap();
    let Some(slot) = slots.get_mut(&id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": "Slot not found." })),
        )
            .into_response();
    };
    if slot.is_booked {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "detail": "Already booked" })),
        )
            .into_response();
    }

    slot.is_booked = true;
    slot.booked_by_name = Some(request.booked_by_name);
    slot.booked_by_email = Some(request.booked_by_email);
    slot.description = request.description;

    if service.empty_confirmation.load(Ordering::SeqCst) {
        return StatusCode::OK.into_response();
    }
    Json(slot.clone()).into_response()
}
