use crate::{
    configuration::Configuration,
    error::{BookingError, Result},
    timezone::parse_timezone,
    types::DescriptionPolicy,
};
use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use reqwest::Url;
use std::time::Duration;
use tracing::warn;

const DEFAULT_TIMEZONES: [&str; 7] = [
    "UTC",
    "Europe/London",
    "Europe/Berlin",
    "America/New_York",
    "America/Los_Angeles",
    "Asia/Tokyo",
    "Australia/Sydney",
];

#[derive(Debug, Parser)]
#[command(name = "slot_booker", about = "Browse and book slots of a booking service")]
pub struct Arguments {
    /// Base URL of the booking service, e.g. https://booking.example.com
    #[arg(long, env = "BOOKING_API_URL")]
    api_url: Option<String>,

    /// Comma separated IANA zones offered for display
    #[arg(long, env = "BOOKING_TIMEZONES", value_delimiter = ',')]
    timezones: Vec<String>,

    /// Accept bookings without a description
    #[arg(long, env = "BOOKING_DESCRIPTION_OPTIONAL")]
    description_optional: bool,

    /// Text the description field starts with
    #[arg(long, env = "BOOKING_DESCRIPTION_TEMPLATE", default_value = "")]
    description_template: String,

    #[arg(long, env = "BOOKING_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: Option<u64>,

    /// Zone to show dates and times in (defaults to the system zone)
    #[arg(long, global = true)]
    timezone: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// List the offered timezones
    Timezones,
    /// List dates with at least one free slot
    Dates,
    /// List the free slots of a date
    Slots {
        #[arg(long)]
        date: NaiveDate,
        /// Only show the slot starting at this local time (HH:MM)
        #[arg(long)]
        at: Option<NaiveTime>,
    },
    /// Keep polling the service and print the available dates when they change
    Watch {
        #[arg(long, default_value_t = 30)]
        interval_secs: u64,
    },
    /// Book a slot
    Book {
        #[arg(long)]
        slot_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        description: Option<String>,
    },
}

/// What to do once the configuration is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub timezone: Option<String>,
    pub command: Command,
}

#[derive(Debug, Clone)]
pub struct ConfigurationHandler {
    api_base_url: String,
    offered_timezones: Vec<Tz>,
    description_policy: DescriptionPolicy,
    description_template: String,
    request_timeout: Option<Duration>,
}

impl ConfigurationHandler {
    pub fn parse_arguments() -> Result<(Self, Invocation)> {
        Self::from_arguments(Arguments::parse())
    }

    pub fn from_arguments(arguments: Arguments) -> Result<(Self, Invocation)> {
        let api_base_url = arguments
            .api_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                BookingError::Configuration(
                    "Booking service URL missing. Set BOOKING_API_URL or pass --api-url".into(),
                )
            })?;
        Url::parse(&api_base_url).map_err(|err| {
            BookingError::Configuration(format!("Invalid booking service URL {api_base_url}: {err}"))
        })?;

        let configuration = Self {
            api_base_url,
            offered_timezones: offered_timezones(&arguments.timezones),
            description_policy: match arguments.description_optional {
                true => DescriptionPolicy::Optional,
                false => DescriptionPolicy::Required,
            },
            description_template: arguments.description_template,
            request_timeout: arguments.request_timeout_secs.map(Duration::from_secs),
        };
        let invocation = Invocation {
            timezone: arguments.timezone,
            command: arguments.command,
        };
        Ok((configuration, invocation))
    }
}

fn offered_timezones(names: &[String]) -> Vec<Tz> {
    let names: Vec<&str> = match names.iter().any(|name| !name.trim().is_empty()) {
        true => names.iter().map(String::as_str).collect(),
        false => DEFAULT_TIMEZONES.to_vec(),
    };

    let mut timezones = Vec::new();
    for name in names.into_iter().filter(|name| !name.trim().is_empty()) {
        match parse_timezone(name) {
            Ok(timezone) if !timezones.contains(&timezone) => timezones.push(timezone),
            Ok(_) => {}
            Err(err) => warn!(%err, "Ignoring offered timezone"),
        }
    }
    if timezones.is_empty() {
        timezones.push(chrono_tz::UTC);
    }
    timezones
}

impl Configuration for ConfigurationHandler {
    fn api_base_url(&self) -> String {
        self.api_base_url.clone()
    }

    fn offered_timezones(&self) -> Vec<Tz> {
        self.offered_timezones.clone()
    }

    fn description_policy(&self) -> DescriptionPolicy {
        self.description_policy
    }

    fn description_template(&self) -> String {
        self.description_template.clone()
    }

    fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_case::test_case;

    fn parse(arguments: &[&str]) -> Result<(ConfigurationHandler, Invocation)> {
        let mut full = vec!["slot_booker"];
        full.extend_from_slice(arguments);
        ConfigurationHandler::from_arguments(Arguments::try_parse_from(full).unwrap())
    }

    #[test]
    fn test_full_configuration() {
        let (configuration, invocation) = parse(&[
            "--api-url",
            "http://localhost:8000/",
            "--timezones",
            "Asia/Tokyo,Europe/Berlin,Asia/Tokyo",
            "--description-optional",
            "--description-template",
            "Topic:",
            "--request-timeout-secs",
            "5",
            "slots",
            "--date",
            "2024-03-10",
            "--at",
            "09:30",
            "--timezone",
            "Asia/Tokyo",
        ])
        .unwrap();

        assert_eq!(configuration.api_base_url(), "http://localhost:8000/");
        assert_eq!(
            configuration.offered_timezones(),
            vec![chrono_tz::Asia::Tokyo, chrono_tz::Europe::Berlin]
        );
        assert_eq!(configuration.description_policy(), DescriptionPolicy::Optional);
        assert_eq!(configuration.description_template(), "Topic:");
        assert_eq!(configuration.request_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(
            invocation,
            Invocation {
                timezone: Some("Asia/Tokyo".into()),
                command: Command::Slots {
                    date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
                    at: NaiveTime::from_hms_opt(9, 30, 0),
                },
            }
        );
    }

    #[test]
    fn test_defaults() {
        let (configuration, invocation) =
            parse(&["--api-url", "https://booking.example.com", "dates"]).unwrap();

        assert_eq!(configuration.offered_timezones().len(), DEFAULT_TIMEZONES.len());
        assert_eq!(configuration.offered_timezones()[0], chrono_tz::UTC);
        assert_eq!(configuration.description_policy(), DescriptionPolicy::Required);
        assert_eq!(configuration.description_template(), "");
        assert_eq!(configuration.request_timeout(), None);
        assert_eq!(invocation.command, Command::Dates);
        assert_eq!(invocation.timezone, None);
    }

    #[test]
    fn test_watch_interval() {
        let (_, invocation) = parse(&["--api-url", "http://localhost:8000", "watch"]).unwrap();
        assert_eq!(invocation.command, Command::Watch { interval_secs: 30 });

        let (_, invocation) = parse(&[
            "--api-url",
            "http://localhost:8000",
            "watch",
            "--interval-secs",
            "5",
        ])
        .unwrap();
        assert_eq!(invocation.command, Command::Watch { interval_secs: 5 });
    }

    #[test_case(&["dates"] ; "missing")]
    #[test_case(&["--api-url", "  ", "dates"] ; "blank")]
    #[test_case(&["--api-url", "not a url", "dates"] ; "malformed")]
    fn test_missing_or_invalid_url_is_fatal(arguments: &[&str]) {
        if std::env::var("BOOKING_API_URL").is_ok() && arguments[0] == "dates" {
            return;
        }
        assert!(matches!(
            parse(arguments),
            Err(BookingError::Configuration(_))
        ));
    }

    #[test_case(&["Mars/Base", "Europe/London"], vec![chrono_tz::Europe::London])]
    #[test_case(&["Mars/Base"], vec![chrono_tz::UTC])]
    #[test_case(&[""], DEFAULT_TIMEZONES.iter().map(|name| parse_timezone(name).unwrap()).collect())]
    fn test_offered_timezones(names: &[&str], expected: Vec<Tz>) {
        let names: Vec<String> = names.iter().map(|name| name.to_string()).collect();
        assert_eq!(offered_timezones(&names), expected);
    }
}
