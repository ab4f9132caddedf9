use chrono::SecondsFormat;

use crate::models::request_params::FetchParams;

/// Default page size when neither the caller nor the config sets one.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Build the query string for one page.
pub fn construct_params(
    params: &FetchParams,
    default_page_size: u32,
    page_token: Option<&str>,
) -> Vec<(String, String)> {
    let mut query = Vec::with_capacity(3);
    if let Some(since) = params.since {
        query.push((
            "since".to_string(),
            since.to_rfc3339_opts(SecondsFormat::Secs, true),
        ));
    }
    let limit = params.page_size.unwrap_or(default_page_size);
    query.push(("limit".to_string(), limit.to_string()));
    if let Some(token) = page_token {
        query.push(("page_token".to_string(), token.to_string()));
    }
    query
}
