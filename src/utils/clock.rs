use chrono::{DateTime, Utc};

/// Represents an entity responsible for providing dates across application. This allows "now" to
/// be pinned during testing.
#[cfg_attr(test, mockall::automock)]
pub trait Clock {
    fn time(&self) -> DateTime<Utc>;
}

pub struct DefaultClock;

impl Clock for DefaultClock {
    fn time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
