use std::fmt::Display;

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};

use crate::{
    error::{KizamiError, Result},
    storage::entities::StopState,
};

/// This is the standard way of showing and reading back a timestamp in kokizami.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Written in place of a stop time to mean "still running".
pub const RUNNING_MARKER: &str = "-";

pub fn format_in<Tz: TimeZone>(time: DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    time.with_timezone(tz).format(TIMESTAMP_FORMAT).to_string()
}

/// Stop time as shown to the user, [RUNNING_MARKER] for running sessions.
pub fn format_stop<Tz: TimeZone>(stop: StopState, tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    match stop {
        StopState::Running => RUNNING_MARKER.to_string(),
        StopState::Stopped(at) => format_in(at, tz),
    }
}

/// Resolves a wall-clock time of `tz` into UTC. For times repeated by a DST change the earlier
/// instant wins; times skipped by a DST change are rejected.
pub fn parse_timestamp<Tz: TimeZone>(value: &str, tz: &Tz) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).map_err(|e| {
        KizamiError::validation(format!(
            "can't parse '{value}' as a timestamp, expected YYYY-MM-DD HH:MM:SS: {e}"
        ))
    })?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|v| v.with_timezone(&Utc))
        .ok_or_else(|| KizamiError::validation(format!("'{value}' doesn't exist in local time")))
}

/// Same as [parse_timestamp], but [RUNNING_MARKER] reopens the session.
pub fn parse_stop<Tz: TimeZone>(value: &str, tz: &Tz) -> Result<StopState> {
    if value.trim() == RUNNING_MARKER {
        Ok(StopState::Running)
    } else {
        parse_timestamp(value, tz).map(StopState::Stopped)
    }
}

/// Start of a wall-clock time in UTC. Midnights skipped by DST start an hour later.
pub fn start_of<Tz: TimeZone>(naive: NaiveDateTime, tz: &Tz) -> DateTime<Utc> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|v| v.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

pub fn format_duration(v: Duration) -> String {
    if v < Duration::zero() {
        return format!("-{}", format_duration(-v));
    }
    if v.num_hours() > 0 {
        format!(
            "{}h{}m{}s",
            v.num_hours(),
            v.num_minutes() % 60,
            v.num_seconds() % 60
        )
    } else if v.num_minutes() > 0 {
        format!("{}m{}s", v.num_minutes() % 60, v.num_seconds() % 60)
    } else {
        format!("{}s", v.num_seconds() % 60)
    }
}
