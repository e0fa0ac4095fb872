pub mod aggregator;
pub mod analyzer;
pub mod config;
pub mod models;
pub mod render;
pub mod scraping;
pub mod selector;
pub mod telegram;
#[cfg(test)]
mod test_http;
pub mod utils;

use chrono::{DateTime, Utc};
use tracing::info;

use aggregator::Aggregator;
use analyzer::QualityAnalyzer;
use config::{AppConfig, ConfigError};
use models::{Event, TimeRange};

#[derive(Debug, Clone, Default)]
pub struct DigestRequest {
    pub collection: Option<String>,
    pub locality: Option<String>,
    pub time_range: TimeRange,
}

#[derive(Debug, Clone)]
pub struct Digest {
    pub events: Vec<Event>,
    pub chunks: Vec<String>,
    pub thread_id: Option<i64>,
}

pub async fn run_digest(
    config: &AppConfig,
    request: &DigestRequest,
    analyzer: Option<&QualityAnalyzer>,
    now: DateTime<Utc>,
) -> Result<Digest, ConfigError> {
    let aggregator = Aggregator::from_config(config);
    run_digest_with(&aggregator, config, request, analyzer, now).await
}

pub async fn run_digest_with(
    aggregator: &Aggregator,
    config: &AppConfig,
    request: &DigestRequest,
    analyzer: Option<&QualityAnalyzer>,
    now: DateTime<Utc>,
) -> Result<Digest, ConfigError> {
    let collection = config.collection(request.collection.as_deref())?;
    let locality = config.locality(request.locality.as_deref())?;

    let events = aggregator
        .aggregate(&locality, request.time_range, now)
        .await;

    let verdicts = match analyzer {
        Some(analyzer) => Some(
            analyzer
                .analyze_all(&events, config.analysis.concurrency)
                .await,
        ),
        None => None,
    };
    let events = selector::select(events, verdicts.as_deref(), collection.max_count);
    let chunks = render::render(&events, &collection.name, &locality.name);

    info!(
        collection = %collection.key,
        locality = %locality.key,
        time_range = %request.time_range,
        events = events.len(),
        chunks = chunks.len(),
        "digest ready"
    );

    Ok(Digest {
        events,
        chunks,
        thread_id: locality.thread_id,
    })
}
