use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

use crate::{
    error::Result,
    storage::{
        entities::Elapsed,
        repository::{KizamiRepository, Storage, TagRepository},
    },
    utils::month::YearMonth,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grouping {
    Tag,
    TagAndDesc,
}

/// Monthly totals per tag label, sorted by label. Untagged sessions are summed under `""`.
///
/// `month` is read as `YYYY-MM` and the month boundaries are taken in `tz`. A session belongs
/// to the month its start falls in. Running sessions count up to `now`.
pub fn elapsed_by_tag<S: Storage, Tz: TimeZone>(
    storage: &S,
    month: &str,
    now: DateTime<Utc>,
    tz: &Tz,
) -> Result<Vec<Elapsed>> {
    let month = month.parse::<YearMonth>()?;
    aggregate(storage, month, now, tz, Grouping::Tag)
}

/// Same as [elapsed_by_tag], but every tag bucket is split further by description. Sorted by tag,
/// then description.
pub fn elapsed_by_desc<S: Storage, Tz: TimeZone>(
    storage: &S,
    month: &str,
    now: DateTime<Utc>,
    tz: &Tz,
) -> Result<Vec<Elapsed>> {
    let month = month.parse::<YearMonth>()?;
    aggregate(storage, month, now, tz, Grouping::TagAndDesc)
}

fn aggregate<S: Storage, Tz: TimeZone>(
    storage: &S,
    month: YearMonth,
    now: DateTime<Utc>,
    tz: &Tz,
    grouping: Grouping,
) -> Result<Vec<Elapsed>> {
    let (from, to) = month.range_in(tz);
    let kizamis = storage.kizamis().find_started_between(from, to)?;
    debug!("Summarizing {} kizami of {month}", kizamis.len());

    let mut map = HashMap::<(String, String), Elapsed>::new();

    for kizami in kizamis {
        let mut labels = storage
            .tags()
            .find_by_kizami_id(kizami.id)?
            .into_iter()
            .map(|t| t.label)
            .collect::<Vec<_>>();
        if labels.is_empty() {
            labels.push(String::new());
        }

        let desc = match grouping {
            Grouping::Tag => String::new(),
            Grouping::TagAndDesc => kizami.desc.clone(),
        };
        let elapsed = kizami.elapsed(now);

        for tag in labels {
            map.entry((tag.clone(), desc.clone()))
                .or_insert_with(|| Elapsed::new(tag, desc.clone()))
                .add(elapsed);
        }
    }

    let mut totals = map.into_values().collect::<Vec<_>>();
    totals.sort_by(|a, b| a.tag.cmp(&b.tag).then_with(|| a.desc.cmp(&b.desc)));
    Ok(totals)
}
