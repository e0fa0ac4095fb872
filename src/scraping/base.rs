use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use scraper::{ElementRef, Selector};
use sha2::{Digest, Sha256};

use crate::config::SourcesConfig;
use crate::models::{Event, Source, DEFAULT_PRICE, UNSPECIFIED};

pub fn clean_text(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

pub fn first_text(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    element.select(selector).next().and_then(|node| {
        let cleaned = inner_text(node);
        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned)
        }
    })
}

pub fn inner_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn first_attr(element: &ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string)
}

pub fn absolute_url(base: &str, href: Option<String>) -> Option<String> {
    let href = href?;
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href);
    }
    let base_url = reqwest::Url::parse(base).ok()?;
    base_url.join(&href).ok().map(|u| u.to_string())
}

pub fn host_of(url: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
}

/// Blocking HTTP access for one adapter. The client is built on first use so that
/// it is always created on a blocking worker thread.
pub struct HttpSession {
    user_agent: String,
    timeout: Duration,
    client: OnceCell<Client>,
}

impl HttpSession {
    pub fn new(config: &SourcesConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            client: OnceCell::new(),
        }
    }

    fn client(&self) -> Result<&Client> {
        self.client.get_or_try_init(|| {
            Client::builder()
                .timeout(self.timeout)
                .user_agent(self.user_agent.clone())
                .build()
                .context("unable to build http client")
        })
    }

    pub fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self
            .client()?
            .get(url)
            .send()
            .with_context(|| format!("request failed for {url}"))?;
        let response = response
            .error_for_status()
            .with_context(|| format!("non-success status for {url}"))?;
        response
            .text()
            .with_context(|| format!("unable to read response body for {url}"))
    }
}

pub fn normalize_title(title: &str) -> String {
    clean_text(title).to_lowercase()
}

pub fn dedup_key(title: &str, date: &str, locality_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_title(title).as_bytes());
    hasher.update(b"|");
    hasher.update(date.trim().as_bytes());
    hasher.update(b"|");
    hasher.update(locality_key.to_lowercase().as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn display_date_time(occurs_at: DateTime<Utc>, tz: Tz) -> (String, String) {
    let local = occurs_at.with_timezone(&tz);
    (
        local.format("%d.%m.%Y").to_string(),
        local.format("%H:%M").to_string(),
    )
}

#[derive(Debug, Clone, Default)]
pub struct Draft {
    pub title: String,
    pub description: String,
    pub place: String,
    pub price: Option<String>,
    pub url: Option<String>,
}

pub fn build_dated_event(
    draft: Draft,
    source: Source,
    locality_key: &str,
    occurs_at: DateTime<Utc>,
    tz: Tz,
) -> Event {
    let (date, time) = display_date_time(occurs_at, tz);
    let price =
        cleaned_price(draft.price.as_deref()).unwrap_or_else(|| DEFAULT_PRICE.to_string());
    finish(draft, price, source, locality_key, date, time, occurs_at, false)
}

/// Listing without an extractable start time. `occurs_at` is stamped with the
/// scrape time and flagged; the display date stays `unspecified` and an unknown
/// price stays empty rather than claiming the event is free.
pub fn build_placeholder_event(
    draft: Draft,
    source: Source,
    locality_key: &str,
    now: DateTime<Utc>,
) -> Event {
    let price = cleaned_price(draft.price.as_deref()).unwrap_or_default();
    finish(
        draft,
        price,
        source,
        locality_key,
        UNSPECIFIED.to_string(),
        String::new(),
        now,
        true,
    )
}

fn cleaned_price(price: Option<&str>) -> Option<String> {
    price.map(clean_text).filter(|price| !price.is_empty())
}

#[allow(clippy::too_many_arguments)]
fn finish(
    draft: Draft,
    price: String,
    source: Source,
    locality_key: &str,
    date: String,
    time: String,
    occurs_at: DateTime<Utc>,
    occurs_at_is_placeholder: bool,
) -> Event {
    let url = draft.url.filter(|url| !url.trim().is_empty());

    Event {
        dedup_key: dedup_key(&draft.title, &date, locality_key),
        title: draft.title,
        description: draft.description,
        date,
        time,
        place: draft.place,
        price,
        url,
        source,
        occurs_at,
        occurs_at_is_placeholder,
        quality: None,
        ai_summary: None,
        is_relevant: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn dedup_key_ignores_case_and_spacing() {
        assert_eq!(
            dedup_key("Swan  Lake", "27.10.2025", "moscow"),
            dedup_key("swan lake ", "27.10.2025", "Moscow")
        );
        assert_ne!(
            dedup_key("Swan Lake", "27.10.2025", "moscow"),
            dedup_key("Swan Lake", "28.10.2025", "moscow")
        );
    }

    #[test]
    fn dated_events_render_in_local_zone() {
        let occurs_at = Utc
            .with_ymd_and_hms(2025, 10, 27, 16, 30, 0)
            .single()
            .expect("valid time");
        let event = build_dated_event(
            Draft {
                title: "Concert".to_string(),
                ..Draft::default()
            },
            Source::StructuredApi,
            "moscow",
            occurs_at,
            chrono_tz::Europe::Moscow,
        );
        assert_eq!(event.date, "27.10.2025");
        assert_eq!(event.time, "19:30");
        assert_eq!(event.price, DEFAULT_PRICE);
        assert!(!event.occurs_at_is_placeholder);
    }

    #[test]
    fn placeholder_events_are_flagged() {
        let now = Utc::now();
        let event = build_placeholder_event(
            Draft {
                title: "Exhibition".to_string(),
                price: Some("  ".to_string()),
                url: Some(String::new()),
                ..Draft::default()
            },
            Source::HtmlScrape,
            "moscow",
            now,
        );
        assert_eq!(event.occurs_at, now);
        assert!(event.occurs_at_is_placeholder);
        assert_eq!(event.date, UNSPECIFIED);
        assert!(event.price.is_empty());
        assert!(event.url.is_none());
    }

    #[test]
    fn resolves_relative_links() {
        assert_eq!(
            absolute_url("https://afisha.yandex.ru/moscow/events/", Some("/moscow/concert/x".to_string()))
                .as_deref(),
            Some("https://afisha.yandex.ru/moscow/concert/x")
        );
        assert_eq!(host_of("https://www.bolshoi.ru/afisha").as_deref(), Some("www.bolshoi.ru"));
    }
}
