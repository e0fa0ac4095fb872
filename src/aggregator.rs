use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, Locality};
use crate::models::{Event, TimeRange};
use crate::scraping::{self, FetchQuery, SourceAdapter};

pub struct Aggregator {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    deadline: Duration,
    dedupe: bool,
}

impl Aggregator {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::with_adapters(
            scraping::active_adapters(&config.sources),
            Duration::from_secs(config.sources.deadline_secs.max(1)),
            config.dedupe_across_sources,
        )
    }

    pub fn with_adapters(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        deadline: Duration,
        dedupe: bool,
    ) -> Self {
        Self {
            adapters,
            deadline,
            dedupe,
        }
    }

    pub async fn aggregate(
        &self,
        locality: &Locality,
        time_range: TimeRange,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        let query = FetchQuery {
            locality: locality.clone(),
            window: time_range.window(now),
        };

        let runs = self
            .adapters
            .iter()
            .filter(|adapter| adapter.applies_to(locality))
            .map(|adapter| run_adapter(Arc::clone(adapter), query.clone(), self.deadline));
        let mut events: Vec<Event> = join_all(runs).await.into_iter().flatten().collect();

        let fetched = events.len();
        events.retain(|event| {
            let keep = query.window.accepts(event.occurs_at);
            if !keep {
                debug!(title = %event.title, occurs_at = %event.occurs_at, "outside window");
            }
            keep
        });

        if self.dedupe {
            dedupe_by_key(&mut events);
        }

        events.sort_by_key(|event| event.occurs_at);

        info!(
            locality = %locality.key,
            time_range = %time_range,
            fetched,
            kept = events.len(),
            "aggregated events"
        );
        events
    }
}

async fn run_adapter(
    adapter: Arc<dyn SourceAdapter>,
    query: FetchQuery,
    deadline: Duration,
) -> Vec<Event> {
    let source_id = adapter.source_id();
    let handle = tokio::task::spawn_blocking(move || adapter.fetch(&query));
    match tokio::time::timeout(deadline, handle).await {
        Ok(Ok(events)) => events,
        Ok(Err(err)) => {
            warn!(source = source_id, error = %err, "source task failed");
            Vec::new()
        }
        Err(_) => {
            warn!(source = source_id, deadline_secs = deadline.as_secs_f64(), "source timed out");
            Vec::new()
        }
    }
}

fn dedupe_by_key(events: &mut Vec<Event>) {
    let mut seen = HashSet::new();
    events.retain(|event| seen.insert(event.dedup_key.clone()));
}
