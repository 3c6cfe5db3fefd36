//! Persistence of kizami and tags is organized through the traits in [repository].
//! The basic idea is:
//!  - [repository::Storage] hands out a [repository::KizamiRepository] and a
//!    [repository::TagRepository] that share one underlying store.
//!  - [sqlite::SqliteStorage] is the real store: one SQLite file with the `kizami`, `tag` and
//!    `kizami_tag` tables.
//!  - [memory::MemoryStorage] satisfies the same contract without touching disk.
//!  - Only the SQLite adapter knows that a running session is written as the unix epoch.

pub mod entities;
pub mod memory;
mod migrations;
pub mod repository;
pub mod sqlite;
