use crate::{
    availability::DaySlots,
    booking_flow::{FlowState, FormDefaults, Notification},
    configuration::Configuration,
    configuration_handler::{Command, ConfigurationHandler, Invocation},
    error::{BookingError, Result},
    http::HttpSlotStore,
    session::{BookingSession, LoadState, SessionSettings},
    timezone::{detect_system_timezone, initial_timezone, to_civil_datetime, utc_offset_seconds},
};
use chrono::{NaiveDate, Utc};
use std::{collections::BTreeSet, process::ExitCode, time::Duration};
use tokio::{
    sync::mpsc::{self, UnboundedReceiver},
    time::interval,
};
use tokio_stream::StreamExt;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

mod availability;
mod backend;
mod booking_flow;
mod configuration;
mod configuration_handler;
mod error;
mod http;
mod session;
mod slot_cache;
#[cfg(test)]
mod testutils;
mod timezone;
mod types;

const DATE_FORMAT: &str = "%Y-%m-%d (%a)";
const TIME_FORMAT: &str = "%H:%M %Z";

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let (configuration, invocation) = match ConfigurationHandler::parse_arguments() {
        Ok(parsed) => parsed,
        Err(err) => {
            error!(%err, "Refusing to start");
            eprintln!("{err}");
            return ExitCode::from(2);
        }
    };

    match run(configuration, invocation).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            match err {
                BookingError::Configuration(_) => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

/// Builds the session and switches to the requested zone, falling back to UTC.
fn create_session(
    configuration: &ConfigurationHandler,
    timezone: Option<&str>,
    notifications: mpsc::UnboundedSender<Notification>,
) -> Result<BookingSession<HttpSlotStore>> {
    let store = HttpSlotStore::new(
        &configuration.api_base_url(),
        configuration.request_timeout(),
    )?;
    let settings = SessionSettings {
        offered_timezones: configuration.offered_timezones(),
        initial_timezone: initial_timezone(detect_system_timezone().as_deref()),
        form_defaults: FormDefaults {
            description_policy: configuration.description_policy(),
            description_template: configuration.description_template(),
        },
    };
    let mut session = BookingSession::new(store, settings, notifications);
    if let Some(timezone) = timezone {
        session.set_timezone_or_utc(timezone);
    }
    Ok(session)
}

async fn run(configuration: ConfigurationHandler, invocation: Invocation) -> Result<()> {
    let (sender, mut notifications) = mpsc::unbounded_channel();
    let mut session = create_session(&configuration, invocation.timezone.as_deref(), sender)?;

    match invocation.command {
        Command::Timezones => {
            let now = Utc::now();
            for timezone in session.offered_timezones() {
                let marker = if *timezone == session.timezone() { "*" } else { " " };
                println!(
                    "{marker} {:<24} {}  {}",
                    timezone.name(),
                    format_offset(utc_offset_seconds(now, *timezone)),
                    to_civil_datetime(now, *timezone).format("%Y-%m-%d %H:%M"),
                );
            }
        }
        Command::Dates => {
            session.load().await?;
            print_dates(&session.available_dates());
        }
        Command::Slots { date, at } => {
            session.load().await?;
            session.select_date(date)?;
            let slots = match (at, session.day_slots()) {
                (Some(time), _) => session.slots_at(time)?,
                (None, DaySlots::Chosen { slots, .. }) => slots,
                (None, DaySlots::NoDateChosen) => vec![],
            };
            println!("{} in {}", date.format(DATE_FORMAT), session.timezone().name());
            if slots.is_empty() {
                println!("  No free slot at that time");
            }
            for slot in slots {
                println!("  {}  {}", session.slot_time(&slot, TIME_FORMAT)?, slot.id);
            }
        }
        Command::Watch { interval_secs } => {
            let mut slot_stream = session.slot_cache().slot_stream();
            let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));
            let mut shown: Option<BTreeSet<NaiveDate>> = None;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if session.load().await.is_err() {
                            if let LoadState::Failed(err) = session.load_state() {
                                println!("! {err}");
                            }
                        }
                    }
                    Some(slots) = slot_stream.next() => {
                        if session.load_state() != &LoadState::Loaded {
                            continue;
                        }
                        let dates = availability::available_dates(&slots, session.timezone());
                        if shown.as_ref() != Some(&dates) {
                            print_dates(&dates);
                            shown = Some(dates);
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
        Command::Book {
            slot_id,
            name,
            email,
            description,
        } => {
            session.load().await?;
            let flow = session.flow_mut();
            flow.choose_slot(&slot_id)?;
            flow.edit_form(|form| {
                form.name = name;
                form.email = email;
                if let Some(description) = description {
                    form.description = description;
                }
            })?;
            if let Some(attempt) = session.flow().attempt() {
                println!(
                    "Booking {} at {} for {}",
                    attempt.slot.id,
                    session.slot_time(&attempt.slot, TIME_FORMAT)?,
                    attempt.form.name
                );
            }

            let flow = session.flow_mut();
            let outcome = flow.submit().await;
            debug!(state = ?flow.state(), open = flow.is_open(), "Booking flow finished");
            if matches!(flow.state(), FlowState::BookedFailed(_)) {
                flow.close()?;
            }
            print_notifications(&session, &mut notifications)?;
            outcome?;
        }
    }
    Ok(())
}

fn print_dates(dates: &BTreeSet<NaiveDate>) {
    if dates.is_empty() {
        println!("No available dates");
    }
    for date in dates {
        println!("{}", date.format(DATE_FORMAT));
    }
}

fn format_offset(seconds: i32) -> String {
    let sign = if seconds < 0 { '-' } else { '+' };
    let minutes = seconds.abs() / 60;
    format!("UTC{sign}{:02}:{:02}", minutes / 60, minutes % 60)
}

fn print_notifications(
    session: &BookingSession<HttpSlotStore>,
    notifications: &mut UnboundedReceiver<Notification>,
) -> Result<()> {
    while let Ok(notification) = notifications.try_recv() {
        match notification {
            Notification::BookingSucceeded { slot } => println!(
                "Booked {} at {}",
                slot.id,
                session.slot_time(&slot, TIME_FORMAT)?
            ),
            Notification::BookingFailed { slot_id, message } => {
                println!("Could not book {slot_id}: {message}")
            }
        }
    }
    Ok(())
}
