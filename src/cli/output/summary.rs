use ansi_term::Style;

use crate::{storage::entities::Elapsed, utils::time::format_duration};

const UNTAGGED: &str = "-- No tag --";

/// Renders monthly totals as tag headers with their descriptions nested below.
pub fn summary_tree(month: &str, by_tag: &[Elapsed], by_desc: &[Elapsed], color: bool) -> String {
    let mut text = format!("Summary of {month}\n");

    for tag in by_tag {
        let label = if tag.is_untagged() {
            UNTAGGED
        } else {
            tag.tag.as_str()
        };
        let header = format!("{label}\t{}", format_duration(tag.elapsed));
        if color {
            text += &Style::new().bold().paint(header).to_string();
        } else {
            text += &header;
        }
        text.push('\n');

        for desc in by_desc.iter().filter(|d| d.tag == tag.tag) {
            text += &format!("  {}\t{}\n", desc.desc, format_duration(desc.elapsed));
        }
    }
    text
}
