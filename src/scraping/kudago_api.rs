use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::base::{self, Draft, HttpSession};
use super::{FetchQuery, SourceAdapter, SourceError};
use crate::config::{Locality, SourcesConfig};
use crate::models::{Event, Source};

const SOURCE_ID: &str = "kudago";
const DEFAULT_LOCATION: &str = "msk";
const PAGE_SIZE: &str = "100";
const FIELDS: &str = "id,title,description,place,dates,price,site_url";

static LOCATION_CODES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("москва", "msk"),
        ("moscow", "msk"),
        ("msk", "msk"),
        ("ярославль", "yaroslavl"),
        ("yaroslavl", "yaroslavl"),
        ("тверь", "tver"),
        ("tver", "tver"),
        ("санкт-петербург", "spb"),
        ("spb", "spb"),
    ])
});

pub fn location_code(locality: &Locality) -> String {
    if let Some(code) = locality
        .code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
    {
        return code.to_string();
    }
    [&locality.name, &locality.key]
        .iter()
        .find_map(|candidate| LOCATION_CODES.get(candidate.trim().to_lowercase().as_str()))
        .map(|code| code.to_string())
        .unwrap_or_else(|| DEFAULT_LOCATION.to_string())
}

#[derive(Debug, Deserialize)]
struct ListingPage {
    #[serde(default)]
    results: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawListing {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    dates: Vec<RawDate>,
    #[serde(default)]
    place: Option<RawPlace>,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    site_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDate {
    #[serde(default)]
    start: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawPlace {
    #[serde(default)]
    title: Option<String>,
}

pub struct KudaGo {
    endpoint: String,
    session: HttpSession,
}

impl KudaGo {
    pub fn new(config: &SourcesConfig) -> Self {
        Self {
            endpoint: config.kudago_endpoint.clone(),
            session: HttpSession::new(config),
        }
    }

    fn request_url(&self, query: &FetchQuery) -> Result<reqwest::Url> {
        let since = query.window.start.timestamp().to_string();
        let until = query.window.end.timestamp().to_string();
        let code = location_code(&query.locality);
        reqwest::Url::parse_with_params(
            &self.endpoint,
            [
                ("location", code.as_str()),
                ("page_size", PAGE_SIZE),
                ("fields", FIELDS),
                ("expand", "place"),
                ("text_format", "text"),
                ("actual_since", since.as_str()),
                ("actual_until", until.as_str()),
                ("order_by", "-publication_date"),
            ],
        )
        .with_context(|| format!("invalid kudago endpoint {}", self.endpoint))
    }

    pub(crate) fn parse_response(&self, body: &str, query: &FetchQuery) -> Result<Vec<Event>> {
        let page: ListingPage =
            serde_json::from_str(body).context("kudago response is not a listing page")?;
        let mut events = Vec::with_capacity(page.results.len());

        for raw in page.results {
            let event = match map_listing(raw, query) {
                Ok(event) => event,
                Err(err) => {
                    debug!(source = SOURCE_ID, error = %err, "dropping listing");
                    continue;
                }
            };
            if !query.window.accepts(event.occurs_at) {
                debug!(
                    source = SOURCE_ID,
                    title = %event.title,
                    occurs_at = %event.occurs_at,
                    "dropping listing outside the requested window"
                );
                continue;
            }
            events.push(event);
        }

        events.sort_by_key(|event| event.occurs_at);
        Ok(events)
    }
}

impl SourceAdapter for KudaGo {
    fn source_id(&self) -> &'static str {
        SOURCE_ID
    }

    fn source(&self) -> Source {
        Source::StructuredApi
    }

    fn fetch_listings(&self, query: &FetchQuery) -> Result<Vec<Event>> {
        let url = self.request_url(query)?;
        let body = self.session.fetch_text(url.as_str())?;
        self.parse_response(&body, query)
    }
}

fn map_listing(raw: Value, query: &FetchQuery) -> Result<Event, SourceError> {
    let listing: RawListing = serde_json::from_value(raw)
        .map_err(|err| SourceError::MalformedListing(err.to_string()))?;
    let title = base::clean_text(listing.title.as_deref().unwrap_or_default());

    let start = listing
        .dates
        .first()
        .and_then(|date| date.start)
        .ok_or_else(|| SourceError::MalformedListing(format!("no start date for {title:?}")))?;
    let occurs_at: DateTime<Utc> = DateTime::from_timestamp(start, 0).ok_or_else(|| {
        SourceError::MalformedListing(format!("start {start} out of range for {title:?}"))
    })?;

    let place = listing
        .place
        .and_then(|place| place.title)
        .map(|title| base::clean_text(&title))
        .unwrap_or_default();

    let draft = Draft {
        title,
        description: base::clean_text(listing.description.as_deref().unwrap_or_default()),
        place,
        price: listing.price,
        url: listing.site_url,
    };

    Ok(base::build_dated_event(
        draft,
        Source::StructuredApi,
        &query.locality.key,
        occurs_at,
        query.locality.timezone,
    ))
}
