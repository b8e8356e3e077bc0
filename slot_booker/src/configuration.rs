use crate::types::DescriptionPolicy;
use chrono_tz::Tz;
use std::time::Duration;

pub trait Configuration: Clone + Send + Sync + 'static {
    fn api_base_url(&self) -> String;
    fn offered_timezones(&self) -> Vec<Tz>;
    fn description_policy(&self) -> DescriptionPolicy;
    fn description_template(&self) -> String;
    fn request_timeout(&self) -> Option<Duration>;
}
