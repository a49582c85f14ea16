//! Query parameters of the dead-letter listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pitchforge_core::types::pagination::PageRequest;
use pitchforge_worker::queue::DeadLetterFilter;

/// `?page&per_page&error&from&to`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterQuery {
    /// Page number (1-based, default: 1).
    #[serde(default = "default_page")]
    pub page: u64,
    /// Items per page (default: 25, max: 100).
    #[serde(default = "default_per_page")]
    pub per_page: u64,
    /// Case-insensitive substring of the final error.
    pub error: Option<String>,
    /// Only jobs that failed at or after this time.
    pub from: Option<DateTime<Utc>>,
    /// Only jobs that failed at or before this time.
    pub to: Option<DateTime<Utc>>,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    25
}

impl DeadLetterQuery {
    /// Page to return.
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.per_page)
    }

    /// Filters to apply.
    pub fn filter(&self) -> DeadLetterFilter {
        DeadLetterFilter {
            error_contains: self.error.clone().filter(|e| !e.is_empty()),
            failed_after: self.from,
            failed_before: self.to,
        }
    }
}
