use std::fmt::Write as _;

use crate::models::{Event, UNSPECIFIED};
use crate::utils::truncate_chars;

pub const SINGLE_MESSAGE_LIMIT: usize = 4000;
pub const CHUNK_SIZE: usize = 3500;

const MAP_SEARCH_URL: &str = "https://yandex.ru/maps/?text=";
const MAP_PLACE_LIMIT: usize = 5;
const MAP_PLACE_CHARS: usize = 30;
const MAP_SEPARATOR: &str = "%2C";
const TITLE_CHARS: usize = 70;
const PLACE_CHARS: usize = 50;

pub fn render(events: &[Event], collection_label: &str, locality_label: &str) -> Vec<String> {
    chunk_body(&render_body(events, collection_label, locality_label))
}

pub fn render_body(events: &[Event], collection_label: &str, locality_label: &str) -> String {
    let rule = "=".repeat(50);
    let mut body = String::new();

    let _ = writeln!(body, "✨ <b>{}</b> ✨", escape(collection_label));
    let _ = writeln!(body, "📍 {}", escape(locality_label));
    let _ = writeln!(body, "📊 {} events", events.len());
    let _ = writeln!(body, "{rule}\n");

    for (idx, event) in events.iter().enumerate() {
        render_event(&mut body, idx + 1, event);
    }

    if let Some(map_url) = aggregate_map_url(events) {
        let _ = writeln!(body, "{rule}");
        let _ = writeln!(body, "📍 <b>All events on the map:</b>");
        let _ = writeln!(body, "<a href=\"{}\">Open in Yandex Maps</a>", escape(&map_url));
    }

    body
}

fn render_event(body: &mut String, position: usize, event: &Event) {
    let title = if event.title.trim().is_empty() {
        "Event".to_string()
    } else {
        truncate_chars(&event.title, TITLE_CHARS)
    };
    let place = if event.place.trim().is_empty() {
        UNSPECIFIED.to_string()
    } else {
        truncate_chars(&event.place, PLACE_CHARS)
    };
    let price = if event.price.trim().is_empty() {
        UNSPECIFIED
    } else {
        event.price.as_str()
    };

    let _ = writeln!(body, "<b>{position}. {}</b>", escape(&title));
    if let Some(quality) = event.quality {
        let _ = writeln!(body, "⭐ Quality: {quality}/10");
    }
    let _ = write!(body, "📅 {}", escape(&event.date));
    if !event.time.is_empty() {
        let _ = write!(body, " at {}", escape(&event.time));
    }
    body.push('\n');
    let _ = writeln!(body, "📍 {}", escape(&place));
    let _ = writeln!(body, "💰 {}", escape(price));
    let _ = writeln!(body, "📌 Source: {}", event.source);

    if let Some(url) = event.url.as_deref().filter(|url| !url.trim().is_empty()) {
        let _ = write!(body, "🔗 <a href=\"{}\">Link</a>", escape(url));
        if !event.place.trim().is_empty() {
            let _ = write!(
                body,
                " | <a href=\"{}\">On the map</a>",
                escape(&map_search_url(&event.place))
            );
        }
    }
    body.push_str("\n\n");
}

pub fn map_search_url(place: &str) -> String {
    format!("{MAP_SEARCH_URL}{}", place.trim().replace(' ', "+"))
}

pub fn aggregate_map_url(events: &[Event]) -> Option<String> {
    let mut places: Vec<&str> = Vec::new();
    for event in events {
        let place = event.place.trim();
        if place.is_empty() || places.contains(&place) {
            continue;
        }
        places.push(place);
        if places.len() == MAP_PLACE_LIMIT {
            break;
        }
    }
    if places.is_empty() {
        return None;
    }
    let joined = places
        .iter()
        .map(|place| truncate_chars(&place.replace(' ', "+"), MAP_PLACE_CHARS))
        .collect::<Vec<_>>()
        .join(MAP_SEPARATOR);
    Some(format!("{MAP_SEARCH_URL}{joined}"))
}

pub fn chunk_body(body: &str) -> Vec<String> {
    if body.chars().count() <= SINGLE_MESSAGE_LIMIT {
        return vec![body.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    for ch in body.chars() {
        current.push(ch);
        count += 1;
        if count == CHUNK_SIZE {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Source, DEFAULT_PRICE};
    use crate::scraping::base::{self, Draft};
    use chrono::{Duration, Utc};

    fn event(title: &str, place: &str, url: Option<&str>) -> Event {
        base::build_dated_event(
            Draft {
                title: title.to_string(),
                place: place.to_string(),
                url: url.map(str::to_string),
                ..Draft::default()
            },
            Source::StructuredApi,
            "moscow",
            Utc::now() + Duration::days(1),
            chrono_tz::Europe::Moscow,
        )
    }

    #[test]
    fn short_bodies_stay_whole() {
        let body = "a".repeat(SINGLE_MESSAGE_LIMIT);
        assert_eq!(chunk_body(&body), vec![body.clone()]);
    }

    #[test]
    fn long_bodies_split_losslessly() {
        let body = "б".repeat(4150);
        let chunks = chunk_body(&body);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 3500);
        assert_eq!(chunks[1].chars().count(), 650);
        assert_eq!(chunks.concat(), body);

        let chunks = chunk_body(&"x".repeat(SINGLE_MESSAGE_LIMIT + 1));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].len(), 501);

        let chunks = chunk_body(&"x".repeat(9000));
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= CHUNK_SIZE));
    }

    #[test]
    fn renders_header_and_blocks() {
        let mut scored = event("Jazz <Night>", "Club 16 Tons", Some("https://kudago.com/jazz"));
        scored.quality = Some(8);
        let unscored = event("Lecture", "", None);

        let body = render_body(&[scored, unscored], "Weekend", "Москва");
        assert!(body.starts_with("✨ <b>Weekend</b> ✨\n📍 Москва\n📊 2 events\n"));
        assert!(body.contains("<b>1. Jazz &lt;Night&gt;</b>\n⭐ Quality: 8/10\n"));
        assert!(body.contains(
            "<a href=\"https://yandex.ru/maps/?text=Club+16+Tons\">On the map</a>"
        ));
        assert!(body.contains("<b>2. Lecture</b>\n📅 "));
        assert!(body.contains(&format!("💰 {DEFAULT_PRICE}\n")));
        assert_eq!(body.matches("⭐ Quality").count(), 1);
        assert!(body.contains("📍 unspecified\n"));
        assert!(body.contains("📌 Source: KudaGo\n"));
    }

    #[test]
    fn aggregate_map_uses_five_distinct_places() {
        let places = [
            "Bolshoi Theatre",
            "Bolshoi Theatre",
            "Moscow International House of Music on Kosmodamianskaya",
            "",
            "Club 16 Tons",
            "Gorky Park",
            "Zaryadye Hall",
            "Tretyakov Gallery",
        ];
        let events: Vec<Event> = places.iter().map(|place| event("Show", place, None)).collect();
        let url = aggregate_map_url(&events).expect("map url");
        let query = url.trim_start_matches(MAP_SEARCH_URL);
        let parts: Vec<&str> = query.split(MAP_SEPARATOR).collect();
        assert_eq!(
            parts,
            vec![
                "Bolshoi+Theatre",
                "Moscow+International+House+of+",
                "Club+16+Tons",
                "Gorky+Park",
                "Zaryadye+Hall",
            ]
        );
        assert!(aggregate_map_url(&[event("Show", "", None)]).is_none());
    }

    #[test]
    fn rendered_chunks_respect_budget() {
        let events: Vec<Event> = (0..10)
            .map(|i| {
                let title = format!("Very long festival title number {i} {}", "x".repeat(60));
                let place = format!("Venue {i} {}", "y".repeat(45));
                let url = format!("https://kudago.com/msk/event/{i}/{}", "z".repeat(150));
                let mut event = event(&title, &place, Some(url.as_str()));
                event.quality = Some(7);
                event
            })
            .collect();
        let body = render_body(&events, "Weekend", "Москва");
        let chunks = render(&events, "Weekend", "Москва");
        assert!(body.chars().count() > SINGLE_MESSAGE_LIMIT);
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= CHUNK_SIZE));
        assert_eq!(chunks.concat(), body);
    }
}
