#![cfg(test)]
use chrono::{Duration, Utc};
use event_ingestor::{
    models::request_params::FetchParams,
    providers::{EventSource, http_feed::HttpFeedProvider},
};
use serial_test::serial;

#[tokio::test]
#[serial]
#[ignore]
async fn test_http_feed_fetch_recent_events() {
    // This test requires VISIT_MAP_ANALYTICS_ENDPOINT to point at a live feed.
    if std::env::var("VISIT_MAP_ANALYTICS_ENDPOINT").is_err() {
        println!("Skipping test_http_feed_fetch_recent_events: endpoint not set.");
        return;
    }

    let provider = HttpFeedProvider::from_env().expect("Failed to create HttpFeedProvider");
    let since = Utc::now() - Duration::days(2);

    let result = provider
        .fetch(FetchParams {
            since: Some(since),
            page_size: Some(50),
        })
        .await;
    assert!(result.is_ok(), "fetch returned an error: {:?}", result.err());

    for event in result.unwrap() {
        assert!(event.timestamp > since, "feed returned an event at or before `since`");
    }
}
