use std::fmt::Display;

use ansi_term::Colour;
use chrono::{DateTime, TimeZone, Utc};

use crate::{
    storage::entities::Kizami,
    utils::time::{format_duration, format_in},
};

const HEADER: [&str; 5] = ["ID", "DESC", "STARTED AT", "STOPPED AT", "ELAPSED"];

/// Running sessions show the current time behind this mark instead of a stop time.
const RUNNING_MARK: &str = "*";

/// Columns of one kizami. Elapsed time is rounded down to seconds.
pub fn kizami_cells<Tz: TimeZone>(kizami: &Kizami, now: DateTime<Utc>, tz: &Tz) -> [String; 5]
where
    Tz::Offset: Display,
{
    let stopped_at = match kizami.stop.stopped_at() {
        Some(at) => format_in(at, tz),
        None => format!("{RUNNING_MARK}{}", format_in(now, tz)),
    };
    [
        kizami.id.to_string(),
        kizami.desc.clone(),
        format_in(kizami.started_at, tz),
        stopped_at,
        format_duration(kizami.elapsed(now)),
    ]
}

/// Single tab separated line, printed after a kizami was changed.
pub fn kizami_line<Tz: TimeZone>(kizami: &Kizami, now: DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    kizami_cells(kizami, now, tz).join("\t")
}

/// Renders kizami as a table with side borders. With `color` running rows are highlighted.
pub fn kizami_table<Tz: TimeZone>(
    kizamis: &[Kizami],
    now: DateTime<Utc>,
    tz: &Tz,
    color: bool,
) -> String
where
    Tz::Offset: Display,
{
    if kizamis.is_empty() {
        return "list is empty\n".to_string();
    }

    let rows = kizamis
        .iter()
        .map(|k| (k.is_running(), kizami_cells(k, now, tz)))
        .collect::<Vec<_>>();

    let mut widths = HEADER.map(|v| v.chars().count());
    for (_, cells) in &rows {
        for (width, cell) in widths.iter_mut().zip(cells) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut table = String::new();
    table += &render_row(&HEADER.map(String::from), &widths);
    table.push('\n');
    table += &render_separator(&widths);
    table.push('\n');
    for (running, cells) in rows {
        let row = render_row(&cells, &widths);
        if running && color {
            table += &Colour::Green.paint(row).to_string();
        } else {
            table += &row;
        }
        table.push('\n');
    }
    table
}

fn render_row(cells: &[String; 5], widths: &[usize; 5]) -> String {
    let mut row = String::from("|");
    for (cell, width) in cells.iter().zip(widths) {
        let padding = width - cell.chars().count();
        row += &format!(" {cell}{} |", " ".repeat(padding));
    }
    row
}

fn render_separator(widths: &[usize; 5]) -> String {
    let mut row = String::from("|");
    for width in widths {
        row += &"-".repeat(width + 2);
        row.push('|');
    }
    row
}
