use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const UNSPECIFIED: &str = "unspecified";
pub const DEFAULT_PRICE: &str = "Free";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    StructuredApi,
    HtmlScrape,
    VenueSite,
}

impl Source {
    pub fn label(&self) -> &'static str {
        match self {
            Source::StructuredApi => "KudaGo",
            Source::HtmlScrape => "Yandex Afisha",
            Source::VenueSite => "Venue sites",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Event {
    pub dedup_key: String, // sha256: normalized title|date|locality
    pub title: String,
    pub description: String,
    pub date: String,
    pub time: String,
    pub place: String,
    pub price: String,
    pub url: Option<String>,
    pub source: Source,
    pub occurs_at: DateTime<Utc>,
    pub occurs_at_is_placeholder: bool,
    pub quality: Option<u8>,
    pub ai_summary: Option<String>,
    pub is_relevant: Option<bool>,
}

impl Event {
    pub fn with_verdict(mut self, verdict: &Verdict) -> Self {
        self.quality = Some(verdict.quality);
        self.ai_summary = Some(verdict.summary.clone());
        self.is_relevant = Some(verdict.is_relevant);
        self
    }

    pub fn has_url(&self) -> bool {
        self.url.as_deref().is_some_and(|url| !url.trim().is_empty())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub quality: u8,
    pub has_bad_content: bool,
    pub event_date: String,
    pub event_location: String,
    pub summary: String,
    pub is_relevant: bool,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Today,
    Tomorrow,
    #[default]
    Week,
    Month,
}

impl TimeRange {
    pub fn parse_lenient(input: &str) -> Self {
        match input.trim().to_lowercase().as_str() {
            "today" => TimeRange::Today,
            "tomorrow" => TimeRange::Tomorrow,
            "month" => TimeRange::Month,
            _ => TimeRange::Week,
        }
    }

    pub fn window(&self, now: DateTime<Utc>) -> Window {
        let (start, end) = match self {
            TimeRange::Today => (now, now + Duration::days(1)),
            TimeRange::Tomorrow => (now + Duration::days(1), now + Duration::days(2)),
            TimeRange::Week => (now, now + Duration::days(7)),
            TimeRange::Month => (now, now + Duration::days(30)),
        };
        Window { now, start, end }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Today => "today",
            TimeRange::Tomorrow => "tomorrow",
            TimeRange::Week => "week",
            TimeRange::Month => "month",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub now: DateTime<Utc>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn earliest_accepted(&self) -> DateTime<Utc> {
        self.now - Duration::days(1)
    }

    pub fn accepts(&self, occurs_at: DateTime<Utc>) -> bool {
        occurs_at >= self.earliest_accepted() && occurs_at <= self.end
    }
}
