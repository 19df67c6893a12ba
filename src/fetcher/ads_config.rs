//! Ads API endpoint configuration
//!
//! Base URL and API version are the only things that vary between
//! deployments (production, sandbox, local mocks); every endpoint is derived
//! from them.

use crate::EntityType;

/// Production Ads API host
pub const DEFAULT_BASE_URL: &str = "https://ads-api.twitter.com";

/// API version used when none is configured
pub const DEFAULT_API_VERSION: &str = "12";

/// Base URL plus API version, with endpoint builders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdsApiConfig {
    base_url: String,
    api_version: String,
}

impl Default for AdsApiConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_API_VERSION)
    }
}

impl AdsApiConfig {
    /// Config for a host and version; a trailing slash on the host is dropped
    pub fn new(base_url: impl Into<String>, api_version: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            api_version: api_version.into(),
        }
    }

    /// Host part, without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// API version path segment
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    fn versioned(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.api_version, path)
    }

    /// Entity listing endpoint; for `ACCOUNT` the account resource itself
    pub fn entities_url(&self, account_id: &str, entity_type: EntityType) -> String {
        match entity_type {
            EntityType::Account => self.versioned(&format!("accounts/{account_id}")),
            other => self.versioned(&format!("accounts/{account_id}/{}", other.plural_path())),
        }
    }

    /// Synchronous stats endpoint
    pub fn stats_url(&self, account_id: &str) -> String {
        self.versioned(&format!("stats/accounts/{account_id}"))
    }

    /// Async stats job endpoint (POST to create, GET with `job_ids` to poll)
    pub fn stats_jobs_url(&self, account_id: &str) -> String {
        self.versioned(&format!("stats/jobs/accounts/{account_id}"))
    }

    /// Card listing endpoint
    pub fn cards_url(&self, account_id: &str) -> String {
        self.versioned(&format!("accounts/{account_id}/cards"))
    }
}
