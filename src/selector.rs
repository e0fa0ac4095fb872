use tracing::debug;

use crate::analyzer::RELEVANCE_THRESHOLD;
use crate::models::{Event, Verdict};

pub fn select(events: Vec<Event>, verdicts: Option<&[Verdict]>, max_count: usize) -> Vec<Event> {
    let Some(verdicts) = verdicts else {
        return events.into_iter().take(max_count).collect();
    };

    events
        .into_iter()
        .zip(verdicts)
        .filter_map(|(event, verdict)| {
            if verdict.has_bad_content {
                debug!(title = %event.title, "dropping event with bad content");
                return None;
            }
            if verdict.quality < RELEVANCE_THRESHOLD {
                debug!(title = %event.title, quality = verdict.quality, "dropping low quality event");
                return None;
            }
            Some(event.with_verdict(verdict))
        })
        .take(max_count)
        .collect()
}
