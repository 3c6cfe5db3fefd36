use chrono::{DateTime, Local, TimeZone, Utc};
use tracing::{debug, info, instrument};

use crate::{
    error::{KizamiError, Result},
    storage::{
        entities::{Elapsed, Kizami, KizamiPatch, StopState, Tag},
        repository::{KizamiRepository, Storage, TagRepository},
    },
    summary, tagging,
    utils::{
        clock::{Clock, DefaultClock},
        time::{parse_stop, parse_timestamp},
    },
};

/// Entry point of every kokizami operation. Owns the storage and checks the rules no repository
/// enforces on its own: descriptions are never empty, intervals never run backwards and tags
/// always follow the description.
///
/// Timestamps typed by users and month boundaries are read in `Tz`, [Local] unless configured
/// otherwise.
pub struct Kokizami<S: Storage, C: Clock = DefaultClock, Tz: TimeZone = Local> {
    storage: S,
    clock: C,
    tz: Tz,
}

impl<S: Storage, C: Clock> Kokizami<S, C, Local> {
    pub fn new(storage: S, clock: C) -> Self {
        Self::with_time_zone(storage, clock, Local)
    }
}

impl<S: Storage, C: Clock, Tz: TimeZone> Kokizami<S, C, Tz> {
    pub fn with_time_zone(storage: S, clock: C, tz: Tz) -> Self {
        Self { storage, clock, tz }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.time()
    }

    pub fn time_zone(&self) -> &Tz {
        &self.tz
    }

    /// Starts a new running session at the current time.
    #[instrument(skip(self))]
    pub fn start(&self, desc: &str) -> Result<Kizami> {
        validate_desc(desc)?;
        let now = self.clock.time();
        let kizami = self.storage.atomically(|s| {
            let kizami = s.kizamis().insert(desc, now)?;
            tagging::reconcile(s, kizami.id, &kizami.desc)?;
            Ok(kizami)
        })?;
        info!(id = kizami.id, "Started kizami");
        Ok(kizami)
    }

    /// Starts a new session with the description of an existing one.
    pub fn restart(&self, id: i64) -> Result<Kizami> {
        let previous = self.storage.kizamis().find_by_id(id)?;
        debug!(id, "Restarting kizami");
        self.start(&previous.desc)
    }

    pub fn get(&self, id: i64) -> Result<Kizami> {
        self.storage.kizamis().find_by_id(id)
    }

    pub fn list(&self) -> Result<Vec<Kizami>> {
        self.storage.kizamis().find_all()
    }

    /// Replaces every field of a kizami. Both timestamps use `YYYY-MM-DD HH:MM:SS`, and
    /// `stopped_at` may be `-` to reopen the session.
    #[instrument(skip(self))]
    pub fn edit(&self, id: i64, desc: &str, started_at: &str, stopped_at: &str) -> Result<Kizami> {
        let patch = KizamiPatch::default()
            .desc(desc)
            .started_at(parse_timestamp(started_at, &self.tz)?)
            .stop(parse_stop(stopped_at, &self.tz)?);
        self.apply(id, patch)
    }

    /// Updates only the fields present in `patch`, then re-derives the tags.
    pub fn apply(&self, id: i64, patch: KizamiPatch) -> Result<Kizami> {
        let kizami = self.storage.atomically(|s| {
            let kizami = patch.apply_to(s.kizamis().find_by_id(id)?);
            validate_desc(&kizami.desc)?;
            if let StopState::Stopped(at) = kizami.stop {
                if at < kizami.started_at {
                    return Err(KizamiError::validation(format!(
                        "kizami {id} can't stop before it starts"
                    )));
                }
                // Storage keeps running sessions as the unix epoch.
                if at == DateTime::<Utc>::UNIX_EPOCH {
                    return Err(KizamiError::validation(format!(
                        "kizami {id} can't stop at {at}, use \"-\" for a running kizami"
                    )));
                }
            }
            s.kizamis().update(&kizami)?;
            tagging::reconcile(s, kizami.id, &kizami.desc)?;
            Ok(kizami)
        })?;
        info!(id, "Edited kizami");
        Ok(kizami)
    }

    /// Stops the kizami at the current time. A stopped kizami gets a new stop time.
    pub fn stop(&self, id: i64) -> Result<Kizami> {
        let kizami = self
            .storage
            .kizamis()
            .find_by_id(id)?
            .with_stop(StopState::Stopped(self.clock.time()));
        self.storage.kizamis().update(&kizami)?;
        info!(id, "Stopped kizami");
        Ok(kizami)
    }

    /// Stops every running kizami with one shared stop time. Either all of them are stopped or
    /// none is.
    pub fn stop_all(&self) -> Result<Vec<Kizami>> {
        let now = self.clock.time();
        let stopped = self.storage.atomically(|s| {
            let running = s.kizamis().find_by_stopped_at(StopState::Running)?;
            running
                .into_iter()
                .map(|k| {
                    let k = k.with_stop(StopState::Stopped(now));
                    s.kizamis().update(&k)?;
                    Ok(k)
                })
                .collect::<Result<Vec<_>>>()
        })?;
        info!("Stopped {} kizami", stopped.len());
        Ok(stopped)
    }

    pub fn delete(&self, id: i64) -> Result<()> {
        self.storage.kizamis().delete(id)?;
        info!(id, "Deleted kizami");
        Ok(())
    }

    /// Totals of `month` (`YYYY-MM`) per tag.
    pub fn summary_by_tag(&self, month: &str) -> Result<Vec<Elapsed>> {
        summary::elapsed_by_tag(&self.storage, month, self.clock.time(), &self.tz)
    }

    /// Totals of `month` (`YYYY-MM`) per tag and description.
    pub fn summary_by_desc(&self, month: &str) -> Result<Vec<Elapsed>> {
        summary::elapsed_by_desc(&self.storage, month, self.clock.time(), &self.tz)
    }

    pub fn tags_of(&self, kizami_id: i64) -> Result<Vec<Tag>> {
        self.storage.tags().find_by_kizami_id(kizami_id)
    }

    pub fn all_tags(&self) -> Result<Vec<Tag>> {
        self.storage.tags().find_all()
    }

    /// Removes the tag from every kizami carrying it. Descriptions are left as they are, so the
    /// tag comes back on the next edit of such a kizami.
    pub fn delete_tag(&self, id: i64) -> Result<()> {
        self.storage.tags().delete(id)?;
        info!(id, "Deleted tag");
        Ok(())
    }
}

fn validate_desc(desc: &str) -> Result<()> {
    if desc.is_empty() {
        Err(KizamiError::validation("description must not be empty"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rusqlite::Connection;
    use tempfile::tempdir;

    use crate::{
        error::{KizamiError, Result},
        storage::{
            entities::{Kizami, KizamiPatch, StopState},
            memory::{MemoryStorage, MemoryTagRepository},
            repository::{KizamiRepository, Storage, TagRepository},
            sqlite::SqliteStorage,
        },
        utils::{
            clock::{Clock, MockClock},
            logging::TEST_LOGGING,
            month::YearMonth,
            time::{format_in, TIMESTAMP_FORMAT},
        },
    };

    use super::Kokizami;

    /// Clock that tests can move forward while the facade owns it.
    #[derive(Clone)]
    struct TestClock(Rc<Cell<DateTime<Utc>>>);

    impl TestClock {
        fn at(now: DateTime<Utc>) -> Self {
            Self(Rc::new(Cell::new(now)))
        }

        fn advance(&self, by: Duration) {
            self.0.set(self.0.get() + by);
        }
    }

    impl Clock for TestClock {
        fn time(&self) -> DateTime<Utc> {
            self.0.get()
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 3, 10, 9, 0, 0).unwrap()
    }

    fn memory() -> (Kokizami<MemoryStorage, TestClock, Utc>, TestClock) {
        *TEST_LOGGING;
        let clock = TestClock::at(t0());
        let kokizami = Kokizami::with_time_zone(MemoryStorage::new(), clock.clone(), Utc);
        (kokizami, clock)
    }

    fn format_utc(time: DateTime<Utc>) -> String {
        time.format(TIMESTAMP_FORMAT).to_string()
    }

    fn labels(kokizami: &Kokizami<MemoryStorage, TestClock, Utc>, id: i64) -> Vec<String> {
        kokizami
            .tags_of(id)
            .unwrap()
            .into_iter()
            .map(|t| t.label)
            .collect()
    }

    #[test]
    fn test_start_assigns_increasing_ids() -> Result<()> {
        let (kokizami, clock) = memory();
        let mut last = 0;
        for desc in ["a", "b #x", "c"] {
            let k = kokizami.start(desc)?;
            assert!(k.id > last);
            assert_eq!(k.started_at, clock.time());
            assert_eq!(k.stop, StopState::Running);
            last = k.id;
            clock.advance(Duration::minutes(1));
        }
        kokizami.delete(last)?;
        assert!(kokizami.start("d")?.id > last);
        Ok(())
    }

    #[test]
    fn test_start_rejects_empty_desc() -> Result<()> {
        let (kokizami, _) = memory();
        assert!(kokizami.start("").unwrap_err().is_validation());
        assert!(kokizami.list()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_start_tags_the_session() -> Result<()> {
        let (kokizami, _) = memory();
        let k = kokizami.start("fix bug #work #urgent")?;
        assert_eq!(labels(&kokizami, k.id), vec!["#work", "#urgent"]);
        Ok(())
    }

    #[test]
    fn test_restart_copies_description() -> Result<()> {
        let (kokizami, clock) = memory();
        let first = kokizami.start("review #work")?;
        kokizami.stop(first.id)?;
        clock.advance(Duration::hours(1));

        let second = kokizami.restart(first.id)?;
        assert_ne!(second.id, first.id);
        assert_eq!(second.desc, first.desc);
        assert_eq!(second.started_at, clock.time());
        assert!(second.is_running());
        assert_eq!(labels(&kokizami, second.id), vec!["#work"]);

        assert!(kokizami.restart(999).unwrap_err().is_not_found());
        Ok(())
    }

    #[test]
    fn test_edit_replaces_tags() -> Result<()> {
        let (kokizami, _) = memory();
        let k = kokizami.start("a #x")?;
        let start = format_utc(k.started_at);

        kokizami.edit(k.id, "a #y", &start, "-")?;
        assert_eq!(labels(&kokizami, k.id), vec!["#y"]);
        Ok(())
    }

    #[test]
    fn test_edit_parses_both_timestamps() -> Result<()> {
        let (kokizami, _) = memory();
        let k = kokizami.start("a")?;

        let edited = kokizami.edit(k.id, "b", "2021-03-01 08:00:00", "2021-03-01 09:30:00")?;
        assert_eq!(edited.desc, "b");
        assert_eq!(
            edited.started_at,
            Utc.with_ymd_and_hms(2021, 3, 1, 8, 0, 0).unwrap()
        );
        assert_eq!(edited.elapsed(t0()), Duration::minutes(90));
        assert_eq!(kokizami.get(k.id)?, edited);
        Ok(())
    }

    #[test]
    fn test_edit_rejects_bad_input() -> Result<()> {
        let (kokizami, _) = memory();
        let k = kokizami.start("a #x")?;

        let err = kokizami
            .edit(k.id, "a", "2021-03-01 10:00:00", "2021-03-01 09:00:00")
            .unwrap_err();
        assert!(err.is_validation());
        assert!(kokizami
            .edit(k.id, "", "2021-03-01 08:00:00", "-")
            .unwrap_err()
            .is_validation());
        assert!(kokizami
            .edit(k.id, "a", "yesterday", "-")
            .unwrap_err()
            .is_validation());
        assert!(kokizami
            .edit(42, "a", "2021-03-01 08:00:00", "-")
            .unwrap_err()
            .is_not_found());

        // Nothing of the rejected edits was kept.
        assert_eq!(kokizami.get(k.id)?, k);
        assert_eq!(labels(&kokizami, k.id), vec!["#x"]);
        Ok(())
    }

    #[test]
    fn test_edit_rejects_stop_at_epoch() -> Result<()> {
        let (kokizami, _) = memory();
        let k = kokizami.start("old")?;

        let err = kokizami
            .edit(k.id, "old", "1969-12-31 23:00:00", "1970-01-01 00:00:00")
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(kokizami.get(k.id)?, k);

        let stopped = kokizami.edit(k.id, "old", "1969-12-31 23:00:00", "1970-01-01 00:00:01")?;
        assert_eq!(kokizami.get(k.id)?, stopped);
        assert!(!stopped.is_running());
        Ok(())
    }

    #[test]
    fn test_apply_keeps_absent_fields() -> Result<()> {
        let (kokizami, clock) = memory();
        let k = kokizami.start("a #x")?;
        clock.advance(Duration::hours(2));
        let stopped = kokizami.stop(k.id)?;

        let patched = kokizami.apply(k.id, KizamiPatch::default().desc("b #z"))?;
        assert_eq!(patched.started_at, k.started_at);
        assert_eq!(patched.stop, stopped.stop);
        assert_eq!(labels(&kokizami, k.id), vec!["#z"]);

        let reopened = kokizami.apply(k.id, KizamiPatch::default().stop(StopState::Running))?;
        assert!(reopened.is_running());
        assert_eq!(reopened.desc, "b #z");
        Ok(())
    }

    #[test]
    fn test_stop_sets_now_regardless_of_state() -> Result<()> {
        let (kokizami, clock) = memory();
        let k = kokizami.start("a")?;
        clock.advance(Duration::minutes(10));
        let first = kokizami.stop(k.id)?;
        assert_eq!(first.stop, StopState::Stopped(clock.time()));
        assert_eq!(first.elapsed(clock.time() + Duration::days(1)), Duration::minutes(10));

        clock.advance(Duration::minutes(5));
        let second = kokizami.stop(k.id)?;
        assert_eq!(second.stop, StopState::Stopped(clock.time()));
        assert!(kokizami.stop(999).unwrap_err().is_not_found());
        Ok(())
    }

    #[test]
    fn test_stop_all_uses_one_time() -> Result<()> {
        *TEST_LOGGING;
        let mut clock = MockClock::new();
        clock.expect_time().times(3).return_const(t0());
        let kokizami = Kokizami::with_time_zone(MemoryStorage::new(), clock, Utc);

        kokizami.start("a")?;
        kokizami.start("b")?;

        let stopped = kokizami.stop_all()?;
        assert_eq!(stopped.len(), 2);
        assert!(stopped.iter().all(|k| k.stop == StopState::Stopped(t0())));
        Ok(())
    }

    #[test]
    fn test_stop_all_twice_is_noop() -> Result<()> {
        let (kokizami, clock) = memory();
        kokizami.start("a")?;
        let done = kokizami.start("b")?;
        kokizami.stop(done.id)?;
        kokizami.start("c")?;

        clock.advance(Duration::minutes(3));
        assert_eq!(kokizami.stop_all()?.len(), 2);
        let before = kokizami.list()?;

        clock.advance(Duration::minutes(3));
        assert!(kokizami.stop_all()?.is_empty());
        assert_eq!(kokizami.list()?, before);
        assert!(before.iter().all(|k| !k.is_running()));
        Ok(())
    }

    /// Memory storage whose kizami updates start failing after a number of successful ones.
    struct FlakyStorage {
        inner: Rc<MemoryStorage>,
        kizamis: FlakyKizamis,
    }

    struct FlakyKizamis {
        inner: Rc<MemoryStorage>,
        updates_left: Cell<usize>,
    }

    impl FlakyStorage {
        fn new(updates_left: usize) -> Self {
            let inner = Rc::new(MemoryStorage::new());
            Self {
                kizamis: FlakyKizamis {
                    inner: inner.clone(),
                    updates_left: Cell::new(updates_left),
                },
                inner,
            }
        }
    }

    impl Storage for FlakyStorage {
        type Kizamis = FlakyKizamis;
        type Tags = MemoryTagRepository;

        fn kizamis(&self) -> &Self::Kizamis {
            &self.kizamis
        }

        fn tags(&self) -> &Self::Tags {
            self.inner.tags()
        }

        fn atomically<T, F>(&self, f: F) -> Result<T>
        where
            F: FnOnce(&Self) -> Result<T>,
        {
            self.inner.atomically(|_| f(self))
        }
    }

    impl KizamiRepository for FlakyKizamis {
        fn insert(&self, desc: &str, started_at: DateTime<Utc>) -> Result<Kizami> {
            self.inner.kizamis().insert(desc, started_at)
        }

        fn find_by_id(&self, id: i64) -> Result<Kizami> {
            self.inner.kizamis().find_by_id(id)
        }

        fn find_all(&self) -> Result<Vec<Kizami>> {
            self.inner.kizamis().find_all()
        }

        fn find_by_stopped_at(&self, stop: StopState) -> Result<Vec<Kizami>> {
            self.inner.kizamis().find_by_stopped_at(stop)
        }

        fn find_started_between(
            &self,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<Vec<Kizami>> {
            self.inner.kizamis().find_started_between(from, to)
        }

        fn update(&self, kizami: &Kizami) -> Result<()> {
            match self.updates_left.get() {
                0 => Err(KizamiError::Storage(rusqlite::Error::InvalidQuery)),
                n => {
                    self.updates_left.set(n - 1);
                    self.inner.kizamis().update(kizami)
                }
            }
        }

        fn delete(&self, id: i64) -> Result<()> {
            self.inner.kizamis().delete(id)
        }

        fn tag(&self, kizami_id: i64, tag_ids: &[i64]) -> Result<()> {
            self.inner.kizamis().tag(kizami_id, tag_ids)
        }

        fn untag(&self, kizami_id: i64) -> Result<()> {
            self.inner.kizamis().untag(kizami_id)
        }
    }

    #[test]
    fn test_failing_stop_all_keeps_everything_running() -> Result<()> {
        *TEST_LOGGING;
        let kokizami = Kokizami::with_time_zone(FlakyStorage::new(2), TestClock::at(t0()), Utc);
        for desc in ["a", "b", "c"] {
            kokizami.start(desc)?;
        }

        let err = kokizami.stop_all().unwrap_err();
        assert!(matches!(err, KizamiError::Storage(_)));
        assert!(kokizami.list()?.iter().all(|k| k.is_running()));
        Ok(())
    }

    #[test]
    fn test_failing_edit_keeps_tags() -> Result<()> {
        *TEST_LOGGING;
        let kokizami = Kokizami::with_time_zone(FlakyStorage::new(0), TestClock::at(t0()), Utc);
        let k = kokizami.start("a #x")?;

        assert!(kokizami
            .apply(k.id, KizamiPatch::default().desc("a #y"))
            .is_err());
        let labels = kokizami
            .tags_of(k.id)?
            .into_iter()
            .map(|t| t.label)
            .collect::<Vec<_>>();
        assert_eq!(labels, vec!["#x"]);
        assert_eq!(kokizami.get(k.id)?.desc, "a #x");
        Ok(())
    }

    #[test]
    fn test_delete_leaves_nothing_behind() -> Result<()> {
        let (kokizami, _) = memory();
        let k = kokizami.start("gone #x")?;
        let kept = kokizami.start("kept #x")?;

        kokizami.delete(k.id)?;
        assert!(kokizami.get(k.id).unwrap_err().is_not_found());
        assert!(kokizami.list()?.iter().all(|v| v.id != k.id));
        assert!(kokizami.tags_of(k.id)?.is_empty());
        assert_eq!(labels(&kokizami, kept.id), vec!["#x"]);
        assert!(kokizami.delete(k.id).unwrap_err().is_not_found());
        Ok(())
    }

    #[test]
    fn test_delete_tag_detaches_it() -> Result<()> {
        let (kokizami, _) = memory();
        let k = kokizami.start("a #x #y")?;
        let x = kokizami
            .all_tags()?
            .into_iter()
            .find(|t| t.label == "#x")
            .unwrap();

        kokizami.delete_tag(x.id)?;
        assert_eq!(labels(&kokizami, k.id), vec!["#y"]);
        assert_eq!(kokizami.all_tags()?.len(), 1);
        assert!(kokizami.delete_tag(x.id).unwrap_err().is_not_found());
        Ok(())
    }

    #[test]
    fn test_summary_rejects_malformed_month() {
        let (kokizami, _) = memory();
        for month in ["13-99", "2021-13"] {
            assert!(kokizami.summary_by_tag(month).unwrap_err().is_validation());
            assert!(kokizami.summary_by_desc(month).unwrap_err().is_validation());
        }
    }

    #[test]
    fn test_end_to_end_on_sqlite() -> Result<()> {
        *TEST_LOGGING;
        let clock = TestClock::at(t0());
        let kokizami = Kokizami::new(SqliteStorage::in_memory()?, clock.clone());

        let k = kokizami.start("write spec #docs")?;
        assert_eq!(k.id, 1);

        clock.advance(Duration::minutes(30));
        let stopped = kokizami.stop(1)?;
        assert_eq!(stopped.stop, StopState::Stopped(clock.time()));

        let start = format_in(k.started_at, &chrono::Local);
        let reopened = kokizami.edit(1, "write spec #docs", &start, "-")?;
        assert!(reopened.is_running());
        assert!(kokizami.get(1)?.is_running());
        // Timestamps are typed with second precision.
        assert_eq!(reopened.started_at, k.started_at);

        let month = YearMonth::of(&k.started_at.with_timezone(&chrono::Local)).to_string();
        let totals = kokizami.summary_by_tag(&month)?;
        let docs = totals.iter().find(|e| e.tag == "#docs").unwrap();
        assert!(docs.count >= 1);
        assert_eq!(docs.elapsed, Duration::minutes(30));

        let by_desc = kokizami.summary_by_desc(&month)?;
        assert_eq!(by_desc.len(), 1);
        assert_eq!(by_desc[0].desc, "write spec #docs");
        Ok(())
    }

    #[test]
    fn test_stop_all_on_file_written_by_older_tool() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir().unwrap();
        let path = dir.path().join("kokizami.db");
        let kokizami =
            Kokizami::with_time_zone(SqliteStorage::open(&path)?, TestClock::at(t0()), Utc);
        kokizami.start("new")?;

        Connection::open(&path)?.execute(
            r#"INSERT INTO kizami ("desc", started_at, stopped_at)
               VALUES ('old', '2021-03-10 17:00:00+09:00', '1970-01-01 00:00:00+00:00')"#,
            [],
        )?;
        assert_eq!(kokizami.list()?.iter().filter(|k| k.is_running()).count(), 2);

        assert_eq!(kokizami.stop_all()?.len(), 2);
        assert!(kokizami.list()?.iter().all(|k| !k.is_running()));
        Ok(())
    }

    #[test]
    fn test_storage_is_reachable() -> Result<()> {
        let (kokizami, _) = memory();
        kokizami.start("a #x")?;
        assert_eq!(kokizami.storage().tags().find_all()?.len(), 1);
        assert_eq!(kokizami.storage().kizamis().find_all()?.len(), 1);
        Ok(())
    }
}
