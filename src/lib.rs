//! Tiny timer for tracking what you work on. Every task is a "kizami" with a description, a start
//! and a stop. `#words` in descriptions become tags, and monthly totals are reported per tag and
//! per description.
//!

pub mod cli;
pub mod error;
pub mod kokizami;
pub mod storage;
pub mod summary;
pub mod tagging;
pub mod utils;
