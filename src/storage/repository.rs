use chrono::{DateTime, Utc};

use crate::error::Result;

use super::entities::{Kizami, StopState, Tag};

/// Interface for persisting kizami and their side of the tagging relation.
#[cfg_attr(test, mockall::automock)]
pub trait KizamiRepository {
    /// Creates a running kizami. Fails with a validation error when `desc` is empty.
    fn insert(&self, desc: &str, started_at: DateTime<Utc>) -> Result<Kizami>;

    fn find_by_id(&self, id: i64) -> Result<Kizami>;

    /// Every kizami, ordered by id.
    fn find_all(&self) -> Result<Vec<Kizami>>;

    /// Equality match on the stop state. [StopState::Running] lists every open session.
    fn find_by_stopped_at(&self, stop: StopState) -> Result<Vec<Kizami>>;

    /// Kizami with `from <= started_at < to`, ordered by id.
    fn find_started_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Kizami>>;

    /// Overwrites description, start and stop of the kizami with the same id.
    fn update(&self, kizami: &Kizami) -> Result<()>;

    /// Removes the kizami together with its relation rows.
    fn delete(&self, id: i64) -> Result<()>;

    fn tag(&self, kizami_id: i64, tag_ids: &[i64]) -> Result<()>;

    /// Removes every relation row of the kizami.
    fn untag(&self, kizami_id: i64) -> Result<()>;
}

/// Interface for persisting tag labels.
#[cfg_attr(test, mockall::automock)]
pub trait TagRepository {
    /// Stores labels that are not known yet. Labels already present are left untouched.
    fn insert_many(&self, labels: &[String]) -> Result<()>;

    /// Removes the tag and every relation row pointing at it.
    fn delete(&self, id: i64) -> Result<()>;

    fn find_all(&self) -> Result<Vec<Tag>>;

    fn find_by_kizami_id(&self, kizami_id: i64) -> Result<Vec<Tag>>;

    /// Tags whose label equals any of `labels`, ordered by id.
    fn find_by_labels(&self, labels: &[String]) -> Result<Vec<Tag>>;
}

/// A store holding both repositories over one underlying resource.
pub trait Storage {
    type Kizamis: KizamiRepository;
    type Tags: TagRepository;

    fn kizamis(&self) -> &Self::Kizamis;

    fn tags(&self) -> &Self::Tags;

    /// Runs `f` as a single unit: either every write it made is kept or none is. Calls may nest.
    fn atomically<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>;
}
