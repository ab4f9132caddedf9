use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::event::AnalyticsEvent;

#[derive(Deserialize, Debug)]
pub struct FeedEvent {
    #[serde(alias = "ts", alias = "occurred_at")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct FeedPage {
    #[serde(default)]
    pub events: Vec<FeedEvent>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl FeedPage {
    /// The token for the next page; an empty string is treated as "no more pages".
    pub fn next_token(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|t| !t.is_empty())
    }
}

impl From<FeedEvent> for AnalyticsEvent {
    fn from(e: FeedEvent) -> Self {
        AnalyticsEvent {
            timestamp: e.timestamp,
            city: e.city,
            country: e.country,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_page_with_aliases_and_missing_fields() {
        let page: FeedPage = serde_json::from_str(
            r#"{
                "events": [
                    {"timestamp": "2025-01-01T08:00:00Z", "city": "Seattle", "country": "United States"},
                    {"ts": "2025-01-01T09:00:00+02:00", "country": "Germany"}
                ],
                "next_page_token": "p2"
            }"#,
        )
        .unwrap();

        assert_eq!(page.next_token(), Some("p2"));
        let events: Vec<AnalyticsEvent> = page.events.into_iter().map(Into::into).collect();
        assert_eq!(events[0].city.as_deref(), Some("Seattle"));
        assert_eq!(events[1].city, None);
        assert_eq!(events[1].timestamp.to_rfc3339(), "2025-01-01T07:00:00+00:00");
    }

    #[test]
    fn empty_token_ends_pagination() {
        let page: FeedPage = serde_json::from_str(r#"{"events": [], "next_page_token": ""}"#).unwrap();
        assert_eq!(page.next_token(), None);
    }
}
