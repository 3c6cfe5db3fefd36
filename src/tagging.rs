//! Tags are not edited directly. They are derived from `#word` tokens of a description every time
//! the description is written.

use tracing::debug;

use crate::{
    error::Result,
    storage::{
        entities::Tag,
        repository::{KizamiRepository, Storage, TagRepository},
    },
};

/// Returns `#`-prefixed tokens of `desc` in the order they appear. Tokens are separated by single
/// spaces and a lone `#` is not a tag. Repeated tokens are kept.
pub fn extract_tags(desc: &str) -> Vec<String> {
    desc.split(' ')
        .filter(|token| token.starts_with('#') && token.len() >= 2)
        .map(str::to_owned)
        .collect()
}

/// Replaces every tag of the kizami with the tags found in `desc`. Returns the new tags in the
/// order the tag repository resolved them.
pub fn reconcile<S: Storage>(storage: &S, kizami_id: i64, desc: &str) -> Result<Vec<Tag>> {
    storage.atomically(|s| {
        s.kizamis().untag(kizami_id)?;

        let labels = extract_tags(desc);
        if labels.is_empty() {
            return Ok(Vec::new());
        }

        s.tags().insert_many(&labels)?;
        let tags = s.tags().find_by_labels(&labels)?;
        let tag_ids = tags.iter().map(|t| t.id).collect::<Vec<_>>();
        s.kizamis().tag(kizami_id, &tag_ids)?;

        debug!(kizami_id, ?labels, "Tagged kizami");
        Ok(tags)
    })
}
