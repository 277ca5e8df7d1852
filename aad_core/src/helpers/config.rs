use std::{env, fmt};

use crate::error::{CleanerError, CleanerResult};

pub const DEFAULT_APP_FILTER: &str = "displayName eq 'ipt-app-registration-cleaner'";
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/beta";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Run configuration for the cleaner, resolved once at startup.
#[derive(Clone)]
pub struct CleanerConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub report_only: bool,
    pub app_filter: String,
    pub graph_base_url: String,
    pub authority_host: String,
}

impl fmt::Debug for CleanerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanerConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("report_only", &self.report_only)
            .field("app_filter", &self.app_filter)
            .field("graph_base_url", &self.graph_base_url)
            .field("authority_host", &self.authority_host)
            .finish()
    }
}

impl CleanerConfig {
    pub fn from_env() -> CleanerResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> CleanerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| {
                    CleanerError::Config(format!("{} environment variable not set", key))
                })
        };

        let tenant_id = required("TENANT_ID")?;
        let client_id = required("CLIENT_ID")?;
        let client_secret = required("CLIENT_SECRET")?;

        // Only an explicit "false" turns deletion on.
        let report_only = lookup("REPORT_ONLY")
            .map(|value| parse_report_only(&value))
            .unwrap_or(true);

        let app_filter = lookup("APP_FILTER")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_APP_FILTER.to_string());
        let graph_base_url = lookup("GRAPH_BASE_URL")
            .unwrap_or_else(|| DEFAULT_GRAPH_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let authority_host = lookup("AUTHORITY_HOST")
            .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            tenant_id,
            client_id,
            client_secret,
            report_only,
            app_filter,
            graph_base_url,
            authority_host,
        })
    }

    pub fn with_report_only(mut self, report_only: bool) -> Self {
        self.report_only = report_only;
        self
    }
}

fn parse_report_only(value: &str) -> bool {
    value.trim() != "false"
}
