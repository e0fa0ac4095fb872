use anyhow::Result;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use super::base::{self, Draft, HttpSession};
use super::{FetchQuery, SourceAdapter};
use crate::config::SourcesConfig;
use crate::models::{Event, Source};
use crate::utils::truncate_chars;

const SOURCE_ID: &str = "yandex_afisha";
const TITLE_LIMIT: usize = 80;

static CARD_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.event-card").expect("afisha card selector"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h3").expect("afisha title selector"));
static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("afisha link selector"));

pub struct YandexAfisha {
    base_url: String,
    card_limit: usize,
    session: HttpSession,
}

impl YandexAfisha {
    pub fn new(config: &SourcesConfig) -> Self {
        Self {
            base_url: config.afisha_base_url.trim_end_matches('/').to_string(),
            card_limit: config.afisha_card_limit,
            session: HttpSession::new(config),
        }
    }

    fn listing_url(&self, query: &FetchQuery) -> String {
        format!(
            "{}/{}/events/",
            self.base_url,
            query.locality.afisha_slug.to_lowercase()
        )
    }

    pub(crate) fn parse_document(&self, html: &str, query: &FetchQuery) -> Vec<Event> {
        let document = Html::parse_document(html);
        let page_url = self.listing_url(query);
        let mut events = Vec::new();

        for card in document.select(&CARD_SELECTOR).take(self.card_limit) {
            let title = match base::first_text(&card, &TITLE_SELECTOR) {
                Some(text) => truncate_chars(&text, TITLE_LIMIT),
                None => continue,
            };
            let href = base::first_attr(&card, &LINK_SELECTOR, "href");
            let url = match base::absolute_url(&page_url, href) {
                Some(url) => url,
                None => continue,
            };

            events.push(base::build_placeholder_event(
                Draft {
                    title,
                    url: Some(url),
                    ..Draft::default()
                },
                Source::HtmlScrape,
                &query.locality.key,
                query.window.now,
            ));
        }

        events
    }
}

impl SourceAdapter for YandexAfisha {
    fn source_id(&self) -> &'static str {
        SOURCE_ID
    }

    fn source(&self) -> Source {
        Source::HtmlScrape
    }

    fn fetch_listings(&self, query: &FetchQuery) -> Result<Vec<Event>> {
        let html = self.session.fetch_text(&self.listing_url(query))?;
        Ok(self.parse_document(&html, query))
    }
}
