use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

use crate::error::{BookingError, Result};

/// A bookable unit of time as served by the booking service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: String,
    #[serde(deserialize_with = "deserialize_utc")]
    pub datetime_utc: DateTime<Utc>,
    #[serde(default)]
    pub is_booked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booked_by_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booked_by_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The service stores naive UTC datetimes and serializes them without an offset.
fn deserialize_utc<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(datetime) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(datetime.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

/// Body of `POST /api/slots/{id}/book`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub booked_by_name: String,
    pub booked_by_email: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DescriptionPolicy {
    #[default]
    Required,
    Optional,
}

/// Form fields of the confirmation dialog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Validate)]
pub struct BookingForm {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Email address is not valid")
    )]
    pub email: String,
    pub description: String,
}

impl BookingForm {
    pub fn with_description(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    fn trimmed(&self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            description: self.description.trim().to_string(),
        }
    }

    /// Checks the required fields and turns the form into the wire request.
    pub fn to_request(&self, policy: DescriptionPolicy) -> Result<BookingRequest> {
        let form = self.trimmed();

        let mut problems = match form.validate() {
            Ok(()) => vec![],
            Err(errors) => {
                let mut messages: Vec<String> = errors
                    .field_errors()
                    .values()
                    .flat_map(|field_errors| field_errors.iter())
                    .map(|err| match &err.message {
                        Some(message) => message.to_string(),
                        None => err.code.to_string(),
                    })
                    .collect();
                messages.sort();
                messages.dedup();
                messages
            }
        };
        if policy == DescriptionPolicy::Required && form.description.is_empty() {
            problems.push("Description is required".into());
        }
        if !problems.is_empty() {
            return Err(BookingError::Validation(problems.join("; ")));
        }

        let description = match form.description.is_empty() {
            true => None,
            false => Some(form.description),
        };
        Ok(BookingRequest {
            booked_by_name: form.name,
            booked_by_email: form.email,
            description,
        })
    }
}
