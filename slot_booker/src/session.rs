use crate::{
    availability::{self, DaySlots},
    backend::SlotStore,
    booking_flow::{BookingFlow, FormDefaults, Notification},
    error::{BookingError, Result},
    slot_cache::SlotCache,
    timezone::{format_in_zone, from_civil_datetime, parse_timezone, timezone_or_utc},
    types::Slot,
};
use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use std::collections::BTreeSet;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    NotLoaded,
    Loaded,
    /// Shown as an inline error panel until the next successful load.
    Failed(BookingError),
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub offered_timezones: Vec<Tz>,
    pub initial_timezone: Tz,
    pub form_defaults: FormDefaults,
}

/// State of one visitor's booking page: chosen zone and date, the slot
/// cache and the booking dialog.
pub struct BookingSession<S: SlotStore> {
    store: S,
    slot_cache: SlotCache,
    offered_timezones: Vec<Tz>,
    timezone: Tz,
    selected_date: Option<NaiveDate>,
    load_state: LoadState,
    flow: BookingFlow<S>,
}

impl<S: SlotStore> BookingSession<S> {
    pub fn new(
        store: S,
        settings: SessionSettings,
        notifications: UnboundedSender<Notification>,
    ) -> Self {
        let mut offered_timezones = settings.offered_timezones;
        if !offered_timezones.contains(&settings.initial_timezone) {
            offered_timezones.insert(0, settings.initial_timezone);
        }
        let slot_cache = SlotCache::default();
        let flow = BookingFlow::new(
            store.clone(),
            slot_cache.clone(),
            notifications,
            settings.form_defaults,
        );

        Self {
            store,
            slot_cache,
            offered_timezones,
            timezone: settings.initial_timezone,
            selected_date: None,
            load_state: LoadState::NotLoaded,
            flow,
        }
    }

    /// Fetches all slots and replaces the cache with them.
    pub async fn load(&mut self) -> Result<()> {
        match self.store.list_slots().await {
            Ok(slots) => {
                info!(count = slots.len(), "Slots loaded");
                self.slot_cache.replace_all(slots);
                self.load_state = LoadState::Loaded;
                Ok(())
            }
            Err(err) => {
                error!(%err, "Failed to load slots");
                self.load_state = LoadState::Failed(err.clone());
                Err(err)
            }
        }
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    pub fn slot_cache(&self) -> &SlotCache {
        &self.slot_cache
    }

    pub fn flow(&self) -> &BookingFlow<S> {
        &self.flow
    }

    pub fn flow_mut(&mut self) -> &mut BookingFlow<S> {
        &mut self.flow
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn offered_timezones(&self) -> &[Tz] {
        &self.offered_timezones
    }

    /// Switches the display zone. Only offered zones can be chosen.
    pub fn set_timezone(&mut self, name: &str) -> Result<()> {
        let timezone = parse_timezone(name)?;
        if !self.offered_timezones.contains(&timezone) {
            return Err(BookingError::InvalidTimezone(format!(
                "{name} is not offered"
            )));
        }
        self.switch_timezone(timezone);
        Ok(())
    }

    /// Like [`Self::set_timezone`], but an unknown or not offered zone
    /// switches to UTC instead of failing.
    pub fn set_timezone_or_utc(&mut self, name: &str) -> Tz {
        let timezone = match timezone_or_utc(name) {
            timezone if self.offered_timezones.contains(&timezone) => timezone,
            timezone => {
                warn!(timezone = timezone.name(), "Timezone not offered, falling back to UTC");
                if !self.offered_timezones.contains(&chrono_tz::UTC) {
                    self.offered_timezones.push(chrono_tz::UTC);
                }
                chrono_tz::UTC
            }
        };
        self.switch_timezone(timezone);
        timezone
    }

    fn switch_timezone(&mut self, timezone: Tz) {
        info!(timezone = timezone.name(), "Timezone changed");
        self.timezone = timezone;
        if let Some(date) = self.selected_date {
            if !availability::is_date_selectable(&self.slot_cache.slots(), date, timezone) {
                debug!(%date, "Selected date has no slots in the new timezone");
                self.clear_date();
            }
        }
    }

    pub fn available_dates(&self) -> BTreeSet<NaiveDate> {
        availability::available_dates(&self.slot_cache.slots(), self.timezone)
    }

    pub fn select_date(&mut self, date: NaiveDate) -> Result<()> {
        if !availability::is_date_selectable(&self.slot_cache.slots(), date, self.timezone) {
            return Err(BookingError::DateUnavailable(date));
        }
        self.selected_date = Some(date);
        Ok(())
    }

    pub fn clear_date(&mut self) {
        self.selected_date = None;
    }

    pub fn selected_date(&self) -> Option<NaiveDate> {
        self.selected_date
    }

    pub fn day_slots(&self) -> DaySlots {
        availability::day_slots(&self.slot_cache.slots(), self.selected_date(), self.timezone)
    }

    /// Free slots of the selected date starting at the wall-clock `time`.
    pub fn slots_at(&self, time: NaiveTime) -> Result<Vec<Slot>> {
        let DaySlots::Chosen { date, slots } = self.day_slots() else {
            return Err(BookingError::NoDateChosen);
        };
        let instant = from_civil_datetime(date.and_time(time), self.timezone)?;
        Ok(slots
            .into_iter()
            .filter(|slot| slot.datetime_utc == instant)
            .collect())
    }

    /// Formats the slot's start in the session's zone.
    pub fn slot_time(&self, slot: &Slot, pattern: &str) -> Result<String> {
        format_in_zone(slot.datetime_utc, self.timezone, pattern)
    }
}
