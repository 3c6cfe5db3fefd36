use std::{path::Path, rc::Rc, time::Duration};

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{
    params, params_from_iter,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
    Connection, OptionalExtension, Params, Row, ToSql,
};
use tracing::{debug, error, info};

use crate::error::{KizamiError, Result};

use super::{
    entities::{Kizami, StopState, Tag},
    migrations::run_migrations,
    repository::{KizamiRepository, Storage, TagRepository},
};

/// Canonical on-disk form, always UTC. Fractions are written only when present.
const STORED_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Forms written by earlier versions of the tool, which stored local offsets.
const OFFSET_TIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

const NAIVE_TIME_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub(super) fn encode_time(time: DateTime<Utc>) -> String {
    time.format(STORED_TIME_FORMAT).to_string()
}

pub(super) fn decode_time(value: &str) -> FromSqlResult<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Ok(time.with_timezone(&Utc));
    }
    for format in OFFSET_TIME_FORMATS {
        if let Ok(time) = DateTime::parse_from_str(value, format) {
            return Ok(time.with_timezone(&Utc));
        }
    }
    for format in NAIVE_TIME_FORMATS {
        if let Ok(time) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(time.and_utc());
        }
    }
    Err(FromSqlError::Other(
        format!("unrecognized timestamp '{value}'").into(),
    ))
}

/// Timestamp column codec.
struct SqlTime(DateTime<Utc>);

impl ToSql for SqlTime {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(encode_time(self.0)))
    }
}

impl FromSql for SqlTime {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        decode_time(value.as_str()?).map(SqlTime)
    }
}

/// `stopped_at` column codec. The column is NOT NULL and running sessions are stored as the
/// unix epoch, which keeps files readable by older versions of the tool.
struct SqlStop(StopState);

impl ToSql for SqlStop {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let at = self.0.stopped_at().unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Ok(ToSqlOutput::from(encode_time(at)))
    }
}

impl FromSql for SqlStop {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let at = decode_time(value.as_str()?)?;
        if at == DateTime::<Utc>::UNIX_EPOCH {
            Ok(SqlStop(StopState::Running))
        } else {
            Ok(SqlStop(StopState::Stopped(at)))
        }
    }
}

fn row_to_kizami(row: &Row) -> rusqlite::Result<Kizami> {
    Ok(Kizami {
        id: row.get("id")?,
        desc: row.get("desc")?,
        started_at: row.get::<_, SqlTime>("started_at")?.0,
        stop: row.get::<_, SqlStop>("stopped_at")?.0,
    })
}

fn row_to_tag(row: &Row) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get("id")?,
        label: row.get("tag")?,
    })
}

/// Runs `f` inside a savepoint, which unlike a plain transaction can be nested.
fn savepoint<T>(conn: &Connection, f: impl FnOnce() -> Result<T>) -> Result<T> {
    conn.execute_batch("SAVEPOINT kokizami")?;
    match f() {
        Ok(value) => {
            conn.execute_batch("RELEASE SAVEPOINT kokizami")?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) =
                conn.execute_batch("ROLLBACK TO SAVEPOINT kokizami; RELEASE SAVEPOINT kokizami")
            {
                error!("Failed to roll back savepoint: {rollback_err}");
            }
            Err(err)
        }
    }
}

/// SQLite backed [Storage]. Both repositories share one connection, which is closed when the
/// storage is dropped.
pub struct SqliteStorage {
    conn: Rc<Connection>,
    kizamis: SqliteKizamiRepository,
    tags: SqliteTagRepository,
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        info!("Opened database at {}", path.display());
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        run_migrations(&mut conn)?;

        let conn = Rc::new(conn);
        Ok(Self {
            kizamis: SqliteKizamiRepository { conn: conn.clone() },
            tags: SqliteTagRepository { conn: conn.clone() },
            conn,
        })
    }
}

impl Storage for SqliteStorage {
    type Kizamis = SqliteKizamiRepository;
    type Tags = SqliteTagRepository;

    fn kizamis(&self) -> &Self::Kizamis {
        &self.kizamis
    }

    fn tags(&self) -> &Self::Tags {
        &self.tags
    }

    fn atomically<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        savepoint(&self.conn, || f(self))
    }
}

pub struct SqliteKizamiRepository {
    conn: Rc<Connection>,
}

impl SqliteKizamiRepository {
    fn query(&self, sql: &str, params: impl Params) -> Result<Vec<Kizami>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params, row_to_kizami)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl KizamiRepository for SqliteKizamiRepository {
    fn insert(&self, desc: &str, started_at: DateTime<Utc>) -> Result<Kizami> {
        if desc.is_empty() {
            return Err(KizamiError::validation("description must not be empty"));
        }
        self.conn.execute(
            r#"INSERT INTO kizami ("desc", started_at, stopped_at) VALUES (?1, ?2, ?3)"#,
            params![desc, SqlTime(started_at), SqlStop(StopState::Running)],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(id, "Inserted kizami");
        self.find_by_id(id)
    }

    fn find_by_id(&self, id: i64) -> Result<Kizami> {
        self.conn
            .query_row(
                r#"SELECT id, "desc", started_at, stopped_at FROM kizami WHERE id = ?1"#,
                params![id],
                row_to_kizami,
            )
            .optional()?
            .ok_or_else(|| KizamiError::kizami_not_found(id))
    }

    fn find_all(&self) -> Result<Vec<Kizami>> {
        self.query(
            r#"SELECT id, "desc", started_at, stopped_at FROM kizami ORDER BY id ASC"#,
            [],
        )
    }

    // Older versions of the tool keep writing offset-suffixed times into migrated files, so
    // timestamps are compared as julian days rather than as text.
    fn find_by_stopped_at(&self, stop: StopState) -> Result<Vec<Kizami>> {
        self.query(
            r#"SELECT id, "desc", started_at, stopped_at FROM kizami
               WHERE stopped_at = ?1 OR julianday(stopped_at) = julianday(?1)
               ORDER BY id ASC"#,
            params![SqlStop(stop)],
        )
    }

    fn find_started_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Kizami>> {
        self.query(
            r#"SELECT id, "desc", started_at, stopped_at FROM kizami
               WHERE julianday(started_at) >= julianday(?1)
                 AND julianday(started_at) < julianday(?2)
               ORDER BY id ASC"#,
            params![SqlTime(from), SqlTime(to)],
        )
    }

    fn update(&self, kizami: &Kizami) -> Result<()> {
        let rows_affected = self.conn.execute(
            r#"UPDATE kizami
               SET "desc" = ?1,
                   started_at = ?2,
                   stopped_at = ?3
               WHERE id = ?4"#,
            params![
                kizami.desc,
                SqlTime(kizami.started_at),
                SqlStop(kizami.stop),
                kizami.id,
            ],
        )?;
        if rows_affected == 0 {
            return Err(KizamiError::kizami_not_found(kizami.id));
        }
        debug!(id = kizami.id, "Updated kizami");
        Ok(())
    }

    fn delete(&self, id: i64) -> Result<()> {
        savepoint(&self.conn, || {
            let rows_affected = self
                .conn
                .execute("DELETE FROM kizami WHERE id = ?1", params![id])?;
            if rows_affected == 0 {
                return Err(KizamiError::kizami_not_found(id));
            }
            self.conn
                .execute("DELETE FROM kizami_tag WHERE kizami_id = ?1", params![id])?;
            debug!(id, "Deleted kizami");
            Ok(())
        })
    }

    fn tag(&self, kizami_id: i64, tag_ids: &[i64]) -> Result<()> {
        if tag_ids.is_empty() {
            return Ok(());
        }
        savepoint(&self.conn, || {
            let mut stmt = self.conn.prepare_cached(
                "INSERT OR IGNORE INTO kizami_tag (kizami_id, tag_id) VALUES (?1, ?2)",
            )?;
            for tag_id in tag_ids {
                stmt.execute(params![kizami_id, tag_id])?;
            }
            Ok(())
        })
    }

    fn untag(&self, kizami_id: i64) -> Result<()> {
        self.conn.execute(
            "DELETE FROM kizami_tag WHERE kizami_id = ?1",
            params![kizami_id],
        )?;
        Ok(())
    }
}

pub struct SqliteTagRepository {
    conn: Rc<Connection>,
}

impl SqliteTagRepository {
    fn query(&self, sql: &str, params: impl Params) -> Result<Vec<Tag>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, row_to_tag)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl TagRepository for SqliteTagRepository {
    fn insert_many(&self, labels: &[String]) -> Result<()> {
        if labels.is_empty() {
            return Ok(());
        }
        savepoint(&self.conn, || {
            let mut stmt = self
                .conn
                .prepare_cached("INSERT OR IGNORE INTO tag (tag) VALUES (?1)")?;
            for label in labels {
                stmt.execute(params![label])?;
            }
            Ok(())
        })
    }

    fn delete(&self, id: i64) -> Result<()> {
        savepoint(&self.conn, || {
            let rows_affected = self
                .conn
                .execute("DELETE FROM tag WHERE id = ?1", params![id])?;
            if rows_affected == 0 {
                return Err(KizamiError::tag_not_found(id));
            }
            self.conn
                .execute("DELETE FROM kizami_tag WHERE tag_id = ?1", params![id])?;
            debug!(id, "Deleted tag");
            Ok(())
        })
    }

    fn find_all(&self) -> Result<Vec<Tag>> {
        self.query("SELECT id, tag FROM tag ORDER BY id ASC", [])
    }

    fn find_by_kizami_id(&self, kizami_id: i64) -> Result<Vec<Tag>> {
        self.query(
            "SELECT tag.id, tag.tag FROM tag
             INNER JOIN kizami_tag ON kizami_tag.tag_id = tag.id
             WHERE kizami_tag.kizami_id = ?1
             ORDER BY tag.id ASC",
            params![kizami_id],
        )
    }

    fn find_by_labels(&self, labels: &[String]) -> Result<Vec<Tag>> {
        if labels.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; labels.len()].join(", ");
        let sql = format!("SELECT id, tag FROM tag WHERE tag IN ({placeholders}) ORDER BY id ASC");
        self.query(&sql, params_from_iter(labels.iter()))
    }
}
