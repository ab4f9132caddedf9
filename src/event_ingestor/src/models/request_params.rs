use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Vendor-agnostic parameters for one fetch.
///
/// Sources must only return events strictly newer than `since`; callers still
/// re-check, because upstream filters are often day-granular.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchParams {
    /// Exclusive lower bound. `None` means "everything the source still has".
    pub since: Option<DateTime<Utc>>,

    /// Page size hint for paginated providers.
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl FetchParams {
    /// Fetch everything newer than `since`.
    pub fn since(since: Option<DateTime<Utc>>) -> Self {
        Self {
            since,
            page_size: None,
        }
    }
}
