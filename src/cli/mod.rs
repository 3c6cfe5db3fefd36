pub mod editor;
pub mod output;

use std::{
    fmt::Display,
    io::{self, IsTerminal, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use chrono::TimeZone;
use clap::{CommandFactory, Parser, Subcommand};
use output::Printer;
use tracing::{debug, level_filters::LevelFilter};

use crate::{
    kokizami::Kokizami,
    storage::{repository::Storage, sqlite::SqliteStorage},
    utils::{
        clock::{Clock, DefaultClock},
        dir::{create_application_default_path, default_database_path},
        logging::{enable_logging, CLI_PREFIX},
        month::YearMonth,
        time::{format_in, format_stop},
    },
};

#[derive(Parser, Debug)]
#[command(name = "kkzm", version, long_about = None)]
#[command(about = "Awesome task timer and tracker", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Option<Commands>,
    #[arg(
        long,
        global = true,
        env = "KOKIZAMI_DB",
        help = "Database file. By default $HOME/.kokizami.db"
    )]
    db: Option<PathBuf>,
    #[arg(long, global = true, help = "Print results as JSON")]
    json: bool,
    #[arg(long, global = true, help = "Mirror logs to stderr")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Start a new task. Without a description $EDITOR is opened")]
    Start {
        #[arg(short, long, help = "Stop all running tasks in advance")]
        stop: bool,
        #[arg(help = "Description. #words in it become tags")]
        desc: Vec<String>,
    },
    #[command(about = "Start a new task with the description of an old one")]
    Restart {
        #[arg(short, long, help = "Stop all running tasks in advance")]
        stop: bool,
        id: i64,
    },
    #[command(about = "Edit a task. Without fields the task is opened in $EDITOR")]
    Edit {
        id: i64,
        #[arg(
            num_args = 0..=3,
            value_names = ["DESC", "STARTED_AT", "STOPPED_AT"],
            help = "Description, start and stop as \"YYYY-MM-DD HH:MM:SS\". Stop may be \"-\" for a running task"
        )]
        fields: Vec<String>,
    },
    #[command(about = "Show list of tasks. Used when no command is given")]
    List,
    #[command(about = "Stop a task, or every running task when no id is given")]
    Stop { id: Option<i64> },
    #[command(about = "Delete a task")]
    Delete { id: i64 },
    #[command(about = "Show summary of a month")]
    Summary {
        #[arg(short, long, help = "Month as YYYY-MM. By default the current one")]
        month: Option<String>,
    },
    #[command(about = "Show list of tags")]
    Tags {
        #[arg(long, help = "Show tags of the specified task")]
        id: Option<i64>,
        #[arg(long, conflicts_with = "id", help = "Delete the tag with this id")]
        delete: Option<i64>,
    },
}

pub fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.verbose {
        Some(LevelFilter::DEBUG)
    } else {
        None
    };
    enable_logging(
        CLI_PREFIX,
        &create_application_default_path()?,
        logging_level,
        args.verbose,
    )?;

    let db = match args.db {
        Some(db) => db,
        None => default_database_path()?,
    };
    let storage = SqliteStorage::open(&db)
        .with_context(|| format!("Failed to open database {}", db.display()))?;
    let kokizami = Kokizami::new(storage, DefaultClock);

    let color = !args.json && io::stdout().is_terminal();
    let mut stdout = io::stdout().lock();
    execute(
        &kokizami,
        args.commands.unwrap_or(Commands::List),
        args.json,
        color,
        &mut stdout,
    )
}

fn execute<S: Storage, C: Clock, Tz: TimeZone>(
    kokizami: &Kokizami<S, C, Tz>,
    command: Commands,
    json: bool,
    color: bool,
    out: &mut impl Write,
) -> Result<()>
where
    Tz::Offset: Display,
{
    debug!(?command, "Executing command");
    let tz = kokizami.time_zone();
    let printer = || Printer {
        json,
        color,
        now: kokizami.now(),
        tz,
    };

    match command {
        Commands::Start { stop, desc } => {
            let desc = if desc.is_empty() {
                editor::first_line(&editor::edit_text("")?).to_string()
            } else {
                desc.join(" ")
            };
            if stop {
                kokizami.stop_all()?;
            }
            let kizami = kokizami.start(&desc)?;
            printer().kizamis(out, &[kizami])
        }
        Commands::Restart { stop, id } => {
            if stop {
                kokizami.stop_all()?;
            }
            let kizami = kokizami.restart(id)?;
            printer().kizamis(out, &[kizami])
        }
        Commands::Edit { id, fields } => {
            let kizami = match fields.as_slice() {
                [] => {
                    let current = kokizami.get(id)?;
                    let text = format!(
                        "{}\n{}\n{}\n",
                        current.desc,
                        format_in(current.started_at, tz),
                        format_stop(current.stop, tz)
                    );
                    let fields = editor::parse_edited_fields(&editor::edit_text(&text)?)?;
                    kokizami.edit(id, &fields.desc, &fields.started_at, &fields.stopped_at)?
                }
                [desc, started_at, stopped_at] => {
                    kokizami.edit(id, desc, started_at, stopped_at)?
                }
                _ => {
                    return Err(Args::command()
                        .error(
                            clap::error::ErrorKind::WrongNumberOfValues,
                            "edit needs either only an id or an id with description, started at and stopped at",
                        )
                        .into());
                }
            };
            printer().kizamis(out, &[kizami])
        }
        Commands::List => printer().list(out, &kokizami.list()?),
        Commands::Stop { id } => {
            let stopped = match id {
                Some(id) => vec![kokizami.stop(id)?],
                None => kokizami.stop_all()?,
            };
            printer().kizamis(out, &stopped)
        }
        Commands::Delete { id } => {
            kokizami.delete(id)?;
            Ok(())
        }
        Commands::Summary { month } => {
            let month = match month {
                Some(month) => month,
                None => YearMonth::of(&kokizami.now().with_timezone(tz)).to_string(),
            };
            let by_tag = kokizami.summary_by_tag(&month)?;
            let by_desc = kokizami.summary_by_desc(&month)?;
            printer().summary(out, &month, &by_tag, &by_desc)
        }
        Commands::Tags { id, delete } => {
            if let Some(tag_id) = delete {
                kokizami.delete_tag(tag_id)?;
                return Ok(());
            }
            let tags = match id {
                Some(id) => kokizami.tags_of(id)?,
                None => kokizami.all_tags()?,
            };
            printer().tags(out, &tags)
        }
    }
}
