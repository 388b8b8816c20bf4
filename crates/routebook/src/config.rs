use std::env;

use routebook_core::store::DEFAULT_TRANSACTION_ATTEMPTS;
use routebook_core::DEFAULT_PAGE_SIZE;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Documents fetched per cursor page (default: 20)
    pub page_size: usize,
    /// Path to SQLite database file (default: "routebook.db")
    /// Note: Only used when the `sqlite` feature is enabled.
    #[allow(dead_code)]
    pub sqlite_path: String,
    /// Attempts per transaction before a conflict is reported (default: 5)
    pub transaction_attempts: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PAGE_SIZE` - Documents fetched per cursor page (default: 20)
    /// - `SQLITE_PATH` - SQLite database path (default: "routebook.db")
    /// - `TRANSACTION_ATTEMPTS` - Attempts per transaction (default: 5)
    ///
    /// Unparseable or zero values fall back to the default.
    pub fn from_env() -> Self {
        Self {
            page_size: positive_var("PAGE_SIZE").unwrap_or(DEFAULT_PAGE_SIZE),
            sqlite_path: env::var("SQLITE_PATH").unwrap_or_else(|_| "routebook.db".to_string()),
            transaction_attempts: positive_var("TRANSACTION_ATTEMPTS")
                .unwrap_or(DEFAULT_TRANSACTION_ATTEMPTS),
        }
    }

    /// Overrides the page size, e.g. from a command line flag.
    pub fn with_page_size(mut self, page_size: Option<usize>) -> Self {
        if let Some(page_size) = page_size.filter(|size| *size > 0) {
            self.page_size = page_size;
        }
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn positive_var(name: &str) -> Option<usize> {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|value: &usize| *value > 0)
}
