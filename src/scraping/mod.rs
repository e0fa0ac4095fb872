pub mod afisha_html;
pub mod base;
pub mod kudago_api;
pub mod venue_sites;

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Locality, SourcesConfig};
use crate::models::{Event, Source, Window};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("malformed listing: {0}")]
    MalformedListing(String),
}

#[derive(Debug, Clone)]
pub struct FetchQuery {
    pub locality: Locality,
    pub window: Window,
}

pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &'static str;
    fn source(&self) -> Source;

    fn applies_to(&self, _locality: &Locality) -> bool {
        true
    }

    fn fetch_listings(&self, query: &FetchQuery) -> anyhow::Result<Vec<Event>>;

    fn fetch(&self, query: &FetchQuery) -> Vec<Event> {
        match self.fetch_listings(query) {
            Ok(events) => {
                info!(
                    source = self.source_id(),
                    label = %self.source(),
                    locality = %query.locality.key,
                    count = events.len(),
                    "fetched listings"
                );
                events
            }
            Err(err) => {
                warn!(
                    source = self.source_id(),
                    locality = %query.locality.key,
                    error = %format!("{err:#}"),
                    "source unavailable"
                );
                Vec::new()
            }
        }
    }
}

pub fn active_adapters(config: &SourcesConfig) -> Vec<Arc<dyn SourceAdapter>> {
    vec![
        Arc::new(kudago_api::KudaGo::new(config)),
        Arc::new(afisha_html::YandexAfisha::new(config)),
        Arc::new(venue_sites::VenueSites::new(config)),
    ]
}
