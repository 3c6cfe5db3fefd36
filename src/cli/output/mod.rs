pub mod summary;
pub mod table;

use std::{fmt::Display, io::Write};

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::storage::entities::{Elapsed, Kizami, Tag};

#[derive(Serialize)]
struct SummaryReport<'a> {
    month: &'a str,
    by_tag: &'a [Elapsed],
    by_desc: &'a [Elapsed],
}

/// Writes command results either for humans or as JSON.
pub struct Printer<'a, Tz: TimeZone> {
    pub json: bool,
    pub color: bool,
    pub now: DateTime<Utc>,
    pub tz: &'a Tz,
}

impl<Tz: TimeZone> Printer<'_, Tz>
where
    Tz::Offset: Display,
{
    fn write_json(&self, out: &mut impl Write, value: &impl Serialize) -> Result<()> {
        serde_json::to_writer_pretty(&mut *out, value)?;
        writeln!(out)?;
        Ok(())
    }

    /// Kizami changed by a command, one line each.
    pub fn kizamis(&self, out: &mut impl Write, kizamis: &[Kizami]) -> Result<()> {
        if self.json {
            return self.write_json(out, &kizamis);
        }
        for kizami in kizamis {
            writeln!(out, "{}", table::kizami_line(kizami, self.now, self.tz))?;
        }
        Ok(())
    }

    pub fn list(&self, out: &mut impl Write, kizamis: &[Kizami]) -> Result<()> {
        if self.json {
            return self.write_json(out, &kizamis);
        }
        write!(
            out,
            "{}",
            table::kizami_table(kizamis, self.now, self.tz, self.color)
        )?;
        Ok(())
    }

    pub fn summary(
        &self,
        out: &mut impl Write,
        month: &str,
        by_tag: &[Elapsed],
        by_desc: &[Elapsed],
    ) -> Result<()> {
        if self.json {
            return self.write_json(
                out,
                &SummaryReport {
                    month,
                    by_tag,
                    by_desc,
                },
            );
        }
        writeln!(
            out,
            "{}",
            summary::summary_tree(month, by_tag, by_desc, self.color)
        )?;
        Ok(())
    }

    pub fn tags(&self, out: &mut impl Write, tags: &[Tag]) -> Result<()> {
        if self.json {
            return self.write_json(out, &tags);
        }
        for tag in tags {
            writeln!(out, "{}", tag.label)?;
        }
        Ok(())
    }
}
