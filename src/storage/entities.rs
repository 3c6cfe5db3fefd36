use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Whether a kizami is still being worked on. Storage keeps the historical epoch sentinel for
/// [StopState::Running]; nothing above the SQLite adapter should ever compare against it.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Copy)]
#[serde(tag = "state", content = "at", rename_all = "lowercase")]
pub enum StopState {
    Running,
    Stopped(DateTime<Utc>),
}

impl StopState {
    pub fn is_running(&self) -> bool {
        matches!(self, StopState::Running)
    }

    pub fn stopped_at(&self) -> Option<DateTime<Utc>> {
        match self {
            StopState::Running => None,
            StopState::Stopped(at) => Some(*at),
        }
    }

    /// End of the session as seen at `now`. Running sessions end "now".
    pub fn end_or(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.stopped_at().unwrap_or(now)
    }
}

/// A single tracked work session.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct Kizami {
    pub id: i64,
    pub desc: String,
    pub started_at: DateTime<Utc>,
    pub stop: StopState,
}

impl Kizami {
    pub fn is_running(&self) -> bool {
        self.stop.is_running()
    }

    /// Time spent on the session. For a running session this grows with `now`, for a stopped
    /// one it is fixed. Can be negative if the session was edited to stop before it started.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        self.stop.end_or(now) - self.started_at
    }

    pub fn with_desc(self, desc: impl Into<String>) -> Self {
        Self {
            desc: desc.into(),
            ..self
        }
    }

    pub fn with_stop(self, stop: StopState) -> Self {
        Self { stop, ..self }
    }
}

/// Label derived from a `#word` token of a description. The label keeps its `#`.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize, Clone)]
pub struct Tag {
    pub id: i64,
    pub label: String,
}

/// Partial update of a kizami. Fields left as `None` keep their stored value.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KizamiPatch {
    pub desc: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub stop: Option<StopState>,
}

impl KizamiPatch {
    pub fn desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = Some(desc.into());
        self
    }

    pub fn started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = Some(started_at);
        self
    }

    pub fn stop(mut self, stop: StopState) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn apply_to(self, kizami: Kizami) -> Kizami {
        Kizami {
            id: kizami.id,
            desc: self.desc.unwrap_or(kizami.desc),
            started_at: self.started_at.unwrap_or(kizami.started_at),
            stop: self.stop.unwrap_or(kizami.stop),
        }
    }
}

/// Aggregated time of a month. Produced on demand by [crate::summary], never stored.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct Elapsed {
    /// Empty for sessions without any tag.
    pub tag: String,
    /// Empty when grouping by tag only.
    pub desc: String,
    pub count: usize,
    #[serde(with = "duration_ser")]
    pub elapsed: Duration,
}

impl Elapsed {
    pub fn new(tag: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            desc: desc.into(),
            count: 0,
            elapsed: Duration::zero(),
        }
    }

    pub fn is_untagged(&self) -> bool {
        self.tag.is_empty()
    }

    pub(crate) fn add(&mut self, elapsed: Duration) {
        self.count += 1;
        self.elapsed += elapsed;
    }
}

mod duration_ser {
    use chrono::Duration;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(duration.num_seconds())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = i64::deserialize(deserializer)?;
        Ok(Duration::seconds(s))
    }
}
