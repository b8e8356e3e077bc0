//! Lifecycle of a single booking attempt.
//!
//! ```text
//! Idle -> SlotChosen -> FormEditing -> Submitting -> BookedOk
//!                                               \-> BookedFailed -> (retry) Submitting
//! ```
//!
//! Submission is split into [`BookingFlow::begin_submit`] and
//! [`BookingFlow::complete_submit`] so a caller can keep the flow around while
//! the request is in flight. [`BookingFlow::submit`] runs both around the
//! store call. Flows for different slots do not coordinate with each other.

use crate::{
    backend::SlotStore,
    error::{BookingError, Result},
    slot_cache::SlotCache,
    types::{BookingForm, BookingRequest, DescriptionPolicy, Slot},
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    SlotChosen,
    FormEditing,
    Submitting,
    BookedOk,
    BookedFailed(BookingError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    BookingSucceeded { slot: Slot },
    BookingFailed { slot_id: String, message: String },
}

/// How the form is seeded and checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormDefaults {
    pub description_policy: DescriptionPolicy,
    pub description_template: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingAttempt {
    pub attempt_id: Uuid,
    pub slot: Slot,
    pub form: BookingForm,
}

/// A validated request handed out by [`BookingFlow::begin_submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBooking {
    pub attempt_id: Uuid,
    pub slot_id: String,
    pub request: BookingRequest,
}

pub struct BookingFlow<S: SlotStore> {
    store: S,
    slot_cache: SlotCache,
    notifications: UnboundedSender<Notification>,
    defaults: FormDefaults,
    state: FlowState,
    attempt: Option<BookingAttempt>,
}

impl<S: SlotStore> BookingFlow<S> {
    pub fn new(
        store: S,
        slot_cache: SlotCache,
        notifications: UnboundedSender<Notification>,
        defaults: FormDefaults,
    ) -> Self {
        Self {
            store,
            slot_cache,
            notifications,
            defaults,
            state: FlowState::Idle,
            attempt: None,
        }
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn attempt(&self) -> Option<&BookingAttempt> {
        self.attempt.as_ref()
    }

    /// Whether the confirmation dialog is showing.
    pub fn is_open(&self) -> bool {
        self.attempt.is_some()
    }

    fn busy_slot(&self) -> Option<String> {
        match (&self.state, &self.attempt) {
            (FlowState::Submitting, Some(attempt)) => Some(attempt.slot.id.clone()),
            (FlowState::Submitting, None) => Some(String::new()),
            _ => None,
        }
    }

    pub fn choose_slot(&mut self, slot_id: &str) -> Result<()> {
        if let Some(busy) = self.busy_slot() {
            return Err(BookingError::SubmissionInProgress(busy));
        }
        let slot = self
            .slot_cache
            .get(slot_id)
            .ok_or_else(|| BookingError::SlotNotFound(slot_id.to_string()))?;
        if slot.is_booked {
            return Err(BookingError::SlotUnavailable(slot_id.to_string()));
        }

        let attempt_id = Uuid::new_v4();
        info!(slot_id, %attempt_id, "Slot chosen");
        self.attempt = Some(BookingAttempt {
            attempt_id,
            slot,
            form: BookingForm::with_description(self.defaults.description_template.clone()),
        });
        self.state = FlowState::SlotChosen;
        Ok(())
    }

    pub fn edit_form(&mut self, edit: impl FnOnce(&mut BookingForm)) -> Result<()> {
        match self.state {
            FlowState::SlotChosen | FlowState::FormEditing | FlowState::BookedFailed(_) => {}
            FlowState::Submitting => {
                return Err(BookingError::SubmissionInProgress(
                    self.busy_slot().unwrap_or_default(),
                ))
            }
            FlowState::Idle | FlowState::BookedOk => return Err(BookingError::NoSlotChosen),
        }
        let attempt = self.attempt.as_mut().ok_or(BookingError::NoSlotChosen)?;
        edit(&mut attempt.form);
        self.state = FlowState::FormEditing;
        Ok(())
    }

    /// Validates the form and moves to `Submitting`. Nothing is sent on error.
    pub fn begin_submit(&mut self) -> Result<PendingBooking> {
        match self.state {
            FlowState::SlotChosen | FlowState::FormEditing | FlowState::BookedFailed(_) => {}
            FlowState::Submitting => {
                return Err(BookingError::SubmissionInProgress(
                    self.busy_slot().unwrap_or_default(),
                ))
            }
            FlowState::Idle | FlowState::BookedOk => return Err(BookingError::NoSlotChosen),
        }
        let attempt = self.attempt.as_ref().ok_or(BookingError::NoSlotChosen)?;

        if self
            .slot_cache
            .get(&attempt.slot.id)
            .is_some_and(|slot| slot.is_booked)
        {
            return Err(BookingError::SlotUnavailable(attempt.slot.id.clone()));
        }
        let request = attempt
            .form
            .to_request(self.defaults.description_policy)
            .inspect_err(|err| warn!(slot_id = %attempt.slot.id, %err, "Booking form rejected"))?;

        let pending = PendingBooking {
            attempt_id: attempt.attempt_id,
            slot_id: attempt.slot.id.clone(),
            request,
        };
        info!(slot_id = %pending.slot_id, attempt_id = %pending.attempt_id, "Submitting booking");
        self.state = FlowState::Submitting;
        Ok(pending)
    }

    /// Applies the outcome of the store call for `pending`.
    pub fn complete_submit(
        &mut self,
        pending: PendingBooking,
        outcome: Result<Option<Slot>>,
    ) -> Result<Slot> {
        let chosen = match &self.attempt {
            Some(attempt)
                if self.state == FlowState::Submitting
                    && attempt.attempt_id == pending.attempt_id =>
            {
                attempt.slot.clone()
            }
            _ => {
                warn!(attempt_id = %pending.attempt_id, "Outcome for an attempt that is not submitting");
                return Err(BookingError::NoSlotChosen);
            }
        };

        match outcome {
            Ok(confirmed) => {
                let slot = self
                    .slot_cache
                    .reconcile(&pending.slot_id, confirmed)
                    .unwrap_or_else(|err| {
                        warn!(%err, slot_id = %pending.slot_id, "Booked slot is no longer cached");
                        Slot {
                            is_booked: true,
                            ..chosen
                        }
                    });
                info!(slot_id = %pending.slot_id, "Slot booked");
                self.attempt = None;
                self.state = FlowState::BookedOk;
                self.notify(Notification::BookingSucceeded { slot: slot.clone() });
                Ok(slot)
            }
            Err(err) => {
                error!(slot_id = %pending.slot_id, %err, "Booking failed");
                self.state = FlowState::BookedFailed(err.clone());
                self.notify(Notification::BookingFailed {
                    slot_id: pending.slot_id,
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    pub async fn submit(&mut self) -> Result<Slot> {
        let pending = self.begin_submit()?;
        let outcome = self
            .store
            .book_slot(&pending.slot_id, pending.request.clone())
            .await;
        self.complete_submit(pending, outcome)
    }

    /// Dismisses the dialog. Not possible while a submission is in flight.
    pub fn close(&mut self) -> Result<()> {
        if let Some(busy) = self.busy_slot() {
            return Err(BookingError::SubmissionInProgress(busy));
        }
        self.attempt = None;
        self.state = FlowState::Idle;
        Ok(())
    }

    fn notify(&self, notification: Notification) {
        if self.notifications.send(notification).is_err() {
            warn!("Notification receiver dropped");
        }
    }
}
