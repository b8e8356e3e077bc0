use crate::error::Result;
use crate::types::{BookingRequest, Slot};
use async_trait::async_trait;

/// The remote booking service.
#[async_trait]
pub trait SlotStore: Clone + Send + Sync + 'static {
    async fn list_slots(&self) -> Result<Vec<Slot>>;

    /// Returns the slot as confirmed by the service, if the response carried one.
    async fn book_slot(&self, id: &str, request: BookingRequest) -> Result<Option<Slot>>;
}
