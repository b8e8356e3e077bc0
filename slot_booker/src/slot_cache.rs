use crate::error::{BookingError, Result};
use crate::types::Slot;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::sync::watch::{self, Sender};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};

/// In-memory copy of the slots last fetched from the booking service.
#[derive(Debug, Clone)]
pub struct SlotCache {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
    sender: Sender<Vec<Slot>>,
}

impl Default for SlotCache {
    fn default() -> Self {
        let (sender, _) = watch::channel(vec![]);
        Self {
            slots: Arc::new(Mutex::default()),
            sender,
        }
    }
}

impl SlotCache {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send_slots(&self) {
        let slots = self.slots();
        self.sender.send_replace(slots);
    }

    /// All cached slots, earliest first.
    pub fn slots(&self) -> Vec<Slot> {
        let mut slots: Vec<Slot> = self.lock().values().cloned().collect();
        slots.sort_unstable_by(|a, b| {
            a.datetime_utc
                .cmp(&b.datetime_utc)
                .then_with(|| a.id.cmp(&b.id))
        });
        slots
    }

    pub fn get(&self, id: &str) -> Option<Slot> {
        self.lock().get(id).cloned()
    }

    /// Emits the current slots and every later change.
    pub fn slot_stream(&self) -> WatchStream<Vec<Slot>> {
        WatchStream::new(self.sender.subscribe())
    }

    pub fn replace_all(&self, slots: Vec<Slot>) {
        debug!(count = slots.len(), "Replacing cached slots");
        *self.lock() = slots
            .into_iter()
            .map(|slot| (slot.id.clone(), slot))
            .collect();
        self.send_slots();
    }

    /// Optimistically flags a slot as booked.
    pub fn mark_booked(&self, id: &str) -> Result<Slot> {
        let slot = {
            let mut slots = self.lock();
            let slot = slots
                .get_mut(id)
                .ok_or_else(|| BookingError::SlotNotFound(id.to_string()))?;
            if slot.is_booked {
                return Err(BookingError::SlotUnavailable(id.to_string()));
            }
            slot.is_booked = true;
            slot.clone()
        };
        self.send_slots();
        Ok(slot)
    }

    /// Applies a successful booking of `id`.
    ///
    /// The slot confirmed by the service replaces the cached one. Without a
    /// usable confirmation the cached slot is marked booked instead.
    pub fn reconcile(&self, id: &str, confirmed: Option<Slot>) -> Result<Slot> {
        match confirmed {
            Some(confirmed) if confirmed.id == id => {
                if !confirmed.is_booked {
                    warn!(slot_id = id, "Service confirmed booking but reports slot as free");
                }
                // The booking succeeded, whatever flag the body carries.
                let confirmed = Slot {
                    is_booked: true,
                    ..confirmed
                };
                {
                    let mut slots = self.lock();
                    if !slots.contains_key(id) {
                        warn!(slot_id = id, "Booked slot is not cached, inserting it");
                    }
                    slots.insert(id.to_string(), confirmed.clone());
                }
                self.send_slots();
                Ok(confirmed)
            }
            other => {
                if let Some(unrelated) = other {
                    warn!(
                        slot_id = id,
                        returned_id = %unrelated.id,
                        "Service returned a different slot, ignoring it"
                    );
                }
                match self.mark_booked(id) {
                    Err(BookingError::SlotUnavailable(_)) => self
                        .get(id)
                        .ok_or_else(|| BookingError::SlotNotFound(id.to_string())),
                    result => result,
                }
            }
        }
    }
}
