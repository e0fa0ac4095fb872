use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::warn;

use super::base::{self, Draft, HttpSession};
use super::{FetchQuery, SourceAdapter, SourceError};
use crate::config::{Locality, SourcesConfig};
use crate::models::{Event, Source};
use crate::utils::truncate_chars;

const SOURCE_ID: &str = "venue_sites";
const TITLE_LIMIT: usize = 100;

static BLOCK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div[class], section[class]").expect("venue block selector"));
static EVENT_CLASS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)event|афиша|program").expect("venue class regex"));

pub struct VenueSites {
    block_limit: usize,
    session: HttpSession,
}

impl VenueSites {
    pub fn new(config: &SourcesConfig) -> Self {
        Self {
            block_limit: config.venue_block_limit,
            session: HttpSession::new(config),
        }
    }

    pub(crate) fn parse_document(
        &self,
        html: &str,
        venue_url: &str,
        query: &FetchQuery,
    ) -> Vec<Event> {
        let document = Html::parse_document(html);
        let place = base::host_of(venue_url).unwrap_or_else(|| venue_url.to_string());

        document
            .select(&BLOCK_SELECTOR)
            .filter(|block| {
                block
                    .value()
                    .attr("class")
                    .is_some_and(|class| EVENT_CLASS_RE.is_match(class))
            })
            .map(base::inner_text)
            .filter(|text| !text.is_empty())
            .take(self.block_limit)
            .map(|text| {
                base::build_placeholder_event(
                    Draft {
                        title: truncate_chars(&text, TITLE_LIMIT),
                        place: place.clone(),
                        url: Some(venue_url.to_string()),
                        ..Draft::default()
                    },
                    Source::VenueSite,
                    &query.locality.key,
                    query.window.now,
                )
            })
            .collect()
    }
}

impl SourceAdapter for VenueSites {
    fn source_id(&self) -> &'static str {
        SOURCE_ID
    }

    fn source(&self) -> Source {
        Source::VenueSite
    }

    fn applies_to(&self, locality: &Locality) -> bool {
        !locality.venues.is_empty()
    }

    fn fetch_listings(&self, query: &FetchQuery) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        let mut errors: Vec<String> = Vec::new();

        for venue_url in &query.locality.venues {
            match self.session.fetch_text(venue_url) {
                Ok(html) => events.extend(self.parse_document(&html, venue_url, query)),
                Err(err) => {
                    warn!(
                        source = SOURCE_ID,
                        venue = %venue_url,
                        error = %format!("{err:#}"),
                        "venue fetch failed"
                    );
                    errors.push(format!("{venue_url}: {err}"));
                }
            }
        }

        if !errors.is_empty() && errors.len() == query.locality.venues.len() {
            return Err(SourceError::Unavailable(errors.join("; ")).into());
        }

        Ok(events)
    }
}
