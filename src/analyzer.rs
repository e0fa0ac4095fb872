use std::time::Duration;

use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{AnalysisConfig, AnalysisMode, ConfigError, Credentials};
use crate::models::{Event, Verdict, UNSPECIFIED};
use crate::utils::truncate_chars;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis unavailable: {0}")]
    Unavailable(String),
    #[error("analysis response carries no JSON object")]
    NoJson,
    #[error("invalid verdict: {0}")]
    InvalidVerdict(String),
}

pub const RELEVANCE_THRESHOLD: u8 = 5;
pub const SUMMARY_LIMIT: usize = 100;
const MAX_QUALITY: u8 = 10;

const BAD_CONTENT_MARKERS: [&str; 5] = [
    "нецензурн",
    "взрослый контент",
    "adult content",
    "explicit content",
    "profanity",
];

static JSON_OBJECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("json object regex"));

pub enum QualityAnalyzer {
    Remote(RemoteAnalyzer),
    Local,
}

impl QualityAnalyzer {
    pub fn from_config(
        config: &AnalysisConfig,
        credentials: &Credentials,
    ) -> Result<Option<Self>, ConfigError> {
        let key = credentials.analysis_api_key.clone();
        match (config.mode, key) {
            (AnalysisMode::Off, _) | (AnalysisMode::Auto, None) => Ok(None),
            (AnalysisMode::Local, _) => Ok(Some(QualityAnalyzer::Local)),
            (AnalysisMode::Remote, None) => Err(ConfigError::Missing("OPENROUTER_API_KEY")),
            (AnalysisMode::Auto | AnalysisMode::Remote, Some(key)) => {
                let remote = RemoteAnalyzer::new(config, key)?;
                Ok(Some(QualityAnalyzer::Remote(remote)))
            }
        }
    }

    pub async fn analyze(&self, event: &Event) -> Verdict {
        match self {
            QualityAnalyzer::Local => fallback_verdict(event),
            QualityAnalyzer::Remote(remote) => match remote.request_verdict(event).await {
                Ok(verdict) => verdict,
                Err(err) => {
                    warn!(
                        title = %event.title,
                        error = %err,
                        "remote analysis failed, using local rules"
                    );
                    fallback_verdict(event)
                }
            },
        }
    }

    pub async fn analyze_all(&self, events: &[Event], concurrency: usize) -> Vec<Verdict> {
        let mut slots: Vec<Option<Verdict>> = vec![None; events.len()];
        let mut pending = stream::iter(events.iter().enumerate())
            .map(|(idx, event)| async move { (idx, self.analyze(event).await) })
            .buffer_unordered(concurrency.max(1));

        while let Some((idx, verdict)) = pending.next().await {
            debug!(
                title = %events[idx].title,
                quality = verdict.quality,
                has_bad_content = verdict.has_bad_content,
                "analyzed event"
            );
            slots[idx] = Some(verdict);
        }

        slots
            .into_iter()
            .zip(events)
            .map(|(slot, event)| slot.unwrap_or_else(|| fallback_verdict(event)))
            .collect()
    }
}

pub struct RemoteAnalyzer {
    url: String,
    model: String,
    api_key: String,
    temperature: f32,
    client: Client,
}

impl RemoteAnalyzer {
    pub fn new(config: &AnalysisConfig, api_key: String) -> Result<Self, ConfigError> {
        let url = format!("{}/chat/completions", config.endpoint.trim_end_matches('/'));
        let mut builder =
            Client::builder().timeout(Duration::from_secs(config.timeout_secs.max(1)));
        // local model servers are never reached through a proxy
        if is_loopback(&url) {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|err| ConfigError::Invalid(format!("analysis http client: {err}")))?;
        Ok(Self {
            url,
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            client,
        })
    }

    pub async fn request_verdict(&self, event: &Event) -> Result<Verdict, AnalysisError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": build_prompt(event),
                }
            ],
            "temperature": self.temperature,
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| AnalysisError::Unavailable(err.to_string()))?;

        let status = response.status();
        let text_body = response
            .text()
            .await
            .map_err(|err| AnalysisError::Unavailable(err.to_string()))?;

        if !status.is_success() {
            return Err(AnalysisError::Unavailable(format!(
                "HTTP {}: {}",
                status,
                truncate_chars(&text_body, 200)
            )));
        }

        let value: Value = serde_json::from_str(&text_body)
            .map_err(|err| AnalysisError::Unavailable(err.to_string()))?;

        let content = value
            .get("choices")
            .and_then(|choices| choices.as_array())
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .ok_or_else(|| AnalysisError::Unavailable("response missing content".to_string()))?;

        let object = extract_json_object(content).ok_or(AnalysisError::NoJson)?;
        parse_verdict(object, event)
    }
}

fn is_loopback(url: &str) -> bool {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
        .is_some_and(|host| matches!(host.as_str(), "localhost" | "127.0.0.1" | "[::1]"))
}

fn build_prompt(event: &Event) -> String {
    format!(
        "Analyze this event listing:\n\
         Title: {title}\n\
         Description: {description}\n\
         Date: {date}\n\
         Place: {place}\n\
         Price: {price}\n\n\
         Tasks:\n\
         1. Rate the quality from 0 (junk) to 10 (excellent).\n\
         2. Does it contain profanity or illegal content? (true/false)\n\
         3. When does it take place? (DD.MM.YYYY or \"{unspecified}\")\n\
         4. Where does it take place? (address or venue)\n\
         5. Write a short summary (at most {limit} characters).\n\n\
         Answer with JSON only:\n\
         {{\n  \"quality\": 8,\n  \"has_bad_content\": false,\n  \"event_date\": \"27.10.2025\",\n  \
         \"event_location\": \"Moscow, Petrovka 17\",\n  \"summary\": \"Concert...\",\n  \
         \"is_relevant\": true\n}}",
        title = event.title,
        description = event.description,
        date = event.date,
        place = event.place,
        price = event.price,
        unspecified = UNSPECIFIED,
        limit = SUMMARY_LIMIT,
    )
}

/// Greedy match from the first `{` to the last `}`.
pub fn extract_json_object(content: &str) -> Option<&str> {
    JSON_OBJECT_RE.find(content).map(|found| found.as_str())
}

/// Validates a model answer field by field. `quality` is mandatory; other
/// missing fields take the local-rule value.
pub fn parse_verdict(object: &str, event: &Event) -> Result<Verdict, AnalysisError> {
    let value: Value = serde_json::from_str(object)
        .map_err(|err| AnalysisError::InvalidVerdict(err.to_string()))?;
    let fields = value
        .as_object()
        .ok_or_else(|| AnalysisError::InvalidVerdict("not an object".to_string()))?;
    let local = fallback_verdict(event);

    let quality = match fields.get("quality") {
        Some(Value::Number(number)) => {
            let raw = number
                .as_f64()
                .filter(|raw| raw.is_finite())
                .ok_or_else(|| AnalysisError::InvalidVerdict(format!("quality {number}")))?;
            let rounded = raw.round();
            if !(0.0..=f64::from(MAX_QUALITY)).contains(&rounded) {
                return Err(AnalysisError::InvalidVerdict(format!(
                    "quality {number} out of range"
                )));
            }
            rounded as u8
        }
        Some(other) => {
            return Err(AnalysisError::InvalidVerdict(format!(
                "quality is not a number: {other}"
            )))
        }
        None => return Err(AnalysisError::InvalidVerdict("quality missing".to_string())),
    };

    let has_bad_content = bool_field(fields, "has_bad_content")?.unwrap_or(local.has_bad_content);
    let event_date = string_field(fields, "event_date")?.unwrap_or(local.event_date);
    let event_location = string_field(fields, "event_location")?.unwrap_or(local.event_location);
    let summary = string_field(fields, "summary")?
        .map(|summary| truncate_chars(summary.trim(), SUMMARY_LIMIT))
        .unwrap_or(local.summary);
    let is_relevant = bool_field(fields, "is_relevant")?
        .unwrap_or(quality >= RELEVANCE_THRESHOLD && !has_bad_content);

    Ok(Verdict {
        quality,
        has_bad_content,
        event_date,
        event_location,
        summary,
        is_relevant,
    })
}

fn bool_field(fields: &Map<String, Value>, name: &str) -> Result<Option<bool>, AnalysisError> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(flag)) => Ok(Some(*flag)),
        Some(other) => Err(AnalysisError::InvalidVerdict(format!(
            "{name} is not a boolean: {other}"
        ))),
    }
}

fn string_field(fields: &Map<String, Value>, name: &str) -> Result<Option<String>, AnalysisError> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(other) => Err(AnalysisError::InvalidVerdict(format!(
            "{name} is not a string: {other}"
        ))),
    }
}

pub fn fallback_verdict(event: &Event) -> Verdict {
    let mut quality: u8 = 5;
    if !event.place.is_empty() {
        quality += 2;
    }
    if !event.description.is_empty() {
        quality += 1;
    }
    if !event.price.is_empty() {
        quality += 1;
    }
    if event.has_url() {
        quality += 1;
    }
    let quality = quality.min(MAX_QUALITY);
    let has_bad_content = contains_bad_content(event);

    Verdict {
        quality,
        has_bad_content,
        event_date: non_empty_or_unspecified(&event.date),
        event_location: non_empty_or_unspecified(&event.place),
        summary: truncate_chars(&event.description, SUMMARY_LIMIT),
        is_relevant: quality >= RELEVANCE_THRESHOLD && !has_bad_content,
    }
}

fn contains_bad_content(event: &Event) -> bool {
    let title = event.title.to_lowercase();
    let description = event.description.to_lowercase();
    BAD_CONTENT_MARKERS
        .iter()
        .any(|marker| title.contains(marker) || description.contains(marker))
}

fn non_empty_or_unspecified(value: &str) -> String {
    if value.trim().is_empty() {
        UNSPECIFIED.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Source;
    use crate::scraping::base::{self, Draft};
    use crate::test_http::serve_once;
    use chrono::Utc;
    use std::net::TcpListener;

    fn bare_event() -> Event {
        base::build_placeholder_event(
            Draft {
                title: "Open rehearsal".to_string(),
                ..Draft::default()
            },
            Source::HtmlScrape,
            "moscow",
            Utc::now(),
        )
    }

    fn full_event() -> Event {
        let mut event = bare_event();
        event.place = "Bolshoi Theatre".to_string();
        event.description = "Season opening with the full orchestra".to_string();
        event.price = "from 3000".to_string();
        event.url = Some("https://www.bolshoi.ru".to_string());
        event
    }

    fn remote_config(endpoint: String) -> AnalysisConfig {
        AnalysisConfig {
            mode: AnalysisMode::Remote,
            endpoint,
            timeout_secs: 1,
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn fallback_scores_by_populated_fields() {
        let mut event = bare_event();
        assert_eq!(fallback_verdict(&event).quality, 5);

        event.place = "X".to_string();
        event.description = "Y".to_string();
        event.price = "Z".to_string();
        event.url = None;
        let verdict = fallback_verdict(&event);
        assert_eq!(verdict.quality, 9);
        assert!(verdict.is_relevant);
        assert_eq!(fallback_verdict(&event), verdict);

        assert_eq!(fallback_verdict(&full_event()).quality, 10);
    }

    #[test]
    fn fallback_defaults_and_limits() {
        let mut event = bare_event();
        event.description = "й".repeat(250);
        let verdict = fallback_verdict(&event);
        assert_eq!(verdict.event_location, UNSPECIFIED);
        assert_eq!(verdict.event_date, UNSPECIFIED);
        assert_eq!(verdict.summary.chars().count(), SUMMARY_LIMIT);
    }

    #[test]
    fn fallback_flags_denylisted_content() {
        let mut event = full_event();
        event.title = "Stand-up with PROFANITY".to_string();
        let verdict = fallback_verdict(&event);
        assert!(verdict.has_bad_content);
        assert!(!verdict.is_relevant);
        assert_eq!(verdict.quality, 10);
    }

    #[test]
    fn extracts_greedy_json_object() {
        let content = "Sure! Here it is:\n```json\n{\"quality\": 7, \"nested\": {\"a\": 1}}\n```";
        assert_eq!(
            extract_json_object(content),
            Some("{\"quality\": 7, \"nested\": {\"a\": 1}}")
        );
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn parses_and_validates_verdicts() {
        let event = full_event();
        let verdict = parse_verdict(
            r#"{"quality": 8, "has_bad_content": false, "event_date": "27.10.2025",
                "event_location": "Moscow", "summary": "Great concert", "is_relevant": true}"#,
            &event,
        )
        .expect("valid verdict");
        assert_eq!(verdict.quality, 8);
        assert_eq!(verdict.event_location, "Moscow");

        let partial = parse_verdict(r#"{"quality": 3.6}"#, &event).expect("partial verdict");
        assert_eq!(partial.quality, 4);
        assert!(!partial.is_relevant);
        assert_eq!(partial.event_location, "Bolshoi Theatre");

        let long = format!(r#"{{"quality": 6, "summary": "{}"}}"#, "a".repeat(300));
        assert_eq!(
            parse_verdict(&long, &event).expect("long summary").summary.len(),
            SUMMARY_LIMIT
        );

        for bad in [
            r#"{"quality": 11}"#,
            r#"{"quality": -1}"#,
            r#"{"quality": "8"}"#,
            r#"{"has_bad_content": false}"#,
            r#"{"quality": 8, "has_bad_content": "no"}"#,
            r#"{"quality": 8, "summary": 12}"#,
            r#"[1, 2]"#,
        ] {
            assert!(parse_verdict(bad, &event).is_err(), "accepted {bad}");
        }
    }

    #[test]
    fn mode_selects_strategy() {
        let with_key = Credentials {
            analysis_api_key: Some("key".to_string()),
            ..Credentials::default()
        };
        let without_key = Credentials::default();
        let mut config = AnalysisConfig::default();

        assert!(QualityAnalyzer::from_config(&config, &without_key)
            .expect("auto without key")
            .is_none());
        assert!(matches!(
            QualityAnalyzer::from_config(&config, &with_key).expect("auto with key"),
            Some(QualityAnalyzer::Remote(_))
        ));

        config.mode = AnalysisMode::Local;
        assert!(matches!(
            QualityAnalyzer::from_config(&config, &without_key).expect("local"),
            Some(QualityAnalyzer::Local)
        ));

        config.mode = AnalysisMode::Remote;
        assert!(matches!(
            QualityAnalyzer::from_config(&config, &without_key),
            Err(ConfigError::Missing(_))
        ));
    }

    fn completion(content: &str) -> String {
        json!({"choices": [{"message": {"content": content}}]}).to_string()
    }

    fn serve_completion(status: &'static str, content: &str) -> String {
        let base = serve_once(status, "application/json", completion(content));
        format!("{base}/v1")
    }

    #[tokio::test]
    async fn remote_verdict_is_used_when_valid() {
        let endpoint = serve_completion(
            "200 OK",
            "Here you go: {\"quality\": 9, \"has_bad_content\": false, \"summary\": \"Opening night\", \"is_relevant\": true}",
        );
        let remote = RemoteAnalyzer::new(&remote_config(endpoint), "key".to_string())
            .expect("remote analyzer");
        let verdict = QualityAnalyzer::Remote(remote).analyze(&bare_event()).await;
        assert_eq!(verdict.quality, 9);
        assert_eq!(verdict.summary, "Opening night");
    }

    #[tokio::test]
    async fn unparsable_remote_answer_falls_back() {
        let endpoint = serve_completion("200 OK", "I cannot rate this event.");
        let remote = RemoteAnalyzer::new(&remote_config(endpoint), "key".to_string())
            .expect("remote analyzer");
        let event = full_event();
        let verdict = QualityAnalyzer::Remote(remote).analyze(&event).await;
        assert_eq!(verdict, fallback_verdict(&event));
    }

    #[tokio::test]
    async fn error_status_falls_back_even_with_a_verdict_body() {
        let endpoint = serve_completion(
            "500 Internal Server Error",
            "{\"quality\": 1, \"has_bad_content\": true}",
        );
        let remote = RemoteAnalyzer::new(&remote_config(endpoint), "key".to_string())
            .expect("remote analyzer");
        let event = full_event();
        let verdict = QualityAnalyzer::Remote(remote).analyze(&event).await;
        assert_eq!(verdict, fallback_verdict(&event));
        assert_eq!(verdict.quality, 10);
    }

    #[tokio::test]
    async fn silent_endpoint_times_out_into_fallback() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let endpoint = format!("http://{}/v1", listener.local_addr().expect("addr"));
        let remote = RemoteAnalyzer::new(&remote_config(endpoint), "key".to_string())
            .expect("remote analyzer");
        let analyzer = QualityAnalyzer::Remote(remote);

        let mut bare = bare_event();
        bare.title = "Second".to_string();
        let events = vec![full_event(), bare];
        let verdicts = analyzer.analyze_all(&events, 4).await;

        assert_eq!(verdicts.len(), 2);
        assert_eq!(verdicts[0].quality, 10);
        assert_eq!(verdicts[1].quality, 5);
        drop(listener);
    }
}
