use crate::{timezone::to_civil_date, types::Slot};
use chrono::NaiveDate;
use chrono_tz::Tz;
use std::collections::BTreeSet;

/// Slots of the day picked in the calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaySlots {
    NoDateChosen,
    Chosen { date: NaiveDate, slots: Vec<Slot> },
}

/// Civil dates in `timezone` that have at least one unbooked slot.
pub fn available_dates(slots: &[Slot], timezone: Tz) -> BTreeSet<NaiveDate> {
    slots
        .iter()
        .filter(|slot| !slot.is_booked)
        .map(|slot| to_civil_date(slot.datetime_utc, timezone))
        .collect()
}

pub fn is_date_selectable(slots: &[Slot], date: NaiveDate, timezone: Tz) -> bool {
    slots
        .iter()
        .any(|slot| !slot.is_booked && to_civil_date(slot.datetime_utc, timezone) == date)
}

/// Unbooked slots falling on `date` in `timezone`, earliest first.
pub fn slots_on_date(slots: &[Slot], date: NaiveDate, timezone: Tz) -> Vec<Slot> {
    let mut slots: Vec<Slot> = slots
        .iter()
        .filter(|slot| !slot.is_booked && to_civil_date(slot.datetime_utc, timezone) == date)
        .cloned()
        .collect();
    slots.sort_by(|a, b| {
        a.datetime_utc
            .cmp(&b.datetime_utc)
            .then_with(|| a.id.cmp(&b.id))
    });
    slots
}

pub fn day_slots(slots: &[Slot], date: Option<NaiveDate>, timezone: Tz) -> DaySlots {
    match date {
        Some(date) => DaySlots::Chosen {
            date,
            slots: slots_on_date(slots, date, timezone),
        },
        None => DaySlots::NoDateChosen,
    }
}
