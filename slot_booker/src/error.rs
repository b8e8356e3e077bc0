use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to fetch slots: {0}")]
    Fetch(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Booking failed: {0}")]
    Booking(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid datetime: {0}")]
    InvalidDatetime(String),

    #[error("Invalid format pattern: {0}")]
    InvalidFormat(String),

    #[error("Slot {0} is already booked")]
    SlotUnavailable(String),

    #[error("Slot {0} does not exist")]
    SlotNotFound(String),

    #[error("No available slots on {0}")]
    DateUnavailable(NaiveDate),

    #[error("Booking of slot {0} is already being submitted")]
    SubmissionInProgress(String),

    #[error("No slot chosen")]
    NoSlotChosen,

    #[error("No date chosen")]
    NoDateChosen,
}

pub type Result<T> = std::result::Result<T, BookingError>;
