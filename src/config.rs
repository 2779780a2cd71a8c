use anyhow::{Context, Result, bail};
use reqwest::Url;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::storage::FileStorage;

pub const DEFAULT_ENDPOINT: &str = "https://campus-diary-lwk6.onrender.com/query";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Runtime settings, read once at start-up.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub endpoint: String,
    pub request_timeout: Duration,
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_timeout: DEFAULT_TIMEOUT,
            data_dir: FileStorage::default_location(),
        }
    }
}

impl Config {
    /// Build configuration from environment variables
    ///
    /// - `CAMPUS_ASSISTANT_ENDPOINT` - query endpoint URL
    /// - `CAMPUS_ASSISTANT_TIMEOUT_SECS` - request deadline in seconds
    /// - `CAMPUS_ASSISTANT_DATA_DIR` - where the question counter is stored
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(endpoint) = lookup("CAMPUS_ASSISTANT_ENDPOINT") {
            config.endpoint = validate_endpoint(endpoint.trim())?;
        }

        if let Some(raw) = lookup("CAMPUS_ASSISTANT_TIMEOUT_SECS") {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("CAMPUS_ASSISTANT_TIMEOUT_SECS is not a number: {raw}"))?;
            if secs == 0 {
                bail!("CAMPUS_ASSISTANT_TIMEOUT_SECS must be greater than zero");
            }
            config.request_timeout = Duration::from_secs(secs);
        }

        if let Some(dir) = lookup("CAMPUS_ASSISTANT_DATA_DIR") {
            if !dir.trim().is_empty() {
                config.data_dir = PathBuf::from(dir.trim());
            }
        }

        Ok(config)
    }
}

fn validate_endpoint(raw: &str) -> Result<String> {
    let url = Url::parse(raw).with_context(|| format!("invalid endpoint URL: {raw}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("endpoint must use http or https, got {}", url.scheme());
    }
    Ok(url.to_string())
}
