// Settings for talking to the dealership backend.
// Uses the 'config' crate, with 'dotenv' for local overrides.

use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub api_base_url: String,
    // Bearer token sent on every request, if set
    pub api_token: Option<String>,
    pub request_timeout_secs: u64,
    pub proxy_url: Option<String>,
    pub per_page: u32,
    // Identity of the viewing dealer, used to tag bids placed from this client
    pub dealer_id: Option<i64>,
    pub dealer_name: Option<String>,
    pub log_filter: String,
}

impl Settings {
    pub fn new() -> Result<Self> {
        dotenv::dotenv().ok(); // Load .env file if present

        let builder = Config::builder()
            .set_default("api_base_url", "http://127.0.0.1:8000/api")?
            .set_default("request_timeout_secs", 15)?
            .set_default("per_page", 10)?
            .set_default("log_filter", "dealer_portal=info")?
            // Load from a configuration file (e.g., config.toml)
            .add_source(File::with_name("config").required(false))
            // Load from environment variables (e.g., PORTAL__API_BASE_URL)
            .add_source(Environment::with_prefix("PORTAL").prefix_separator("__").separator("__"));

        let settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Settings pointing at `base_url` with every other field at its default.
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: base_url.into(),
            api_token: None,
            request_timeout_secs: 15,
            proxy_url: None,
            per_page: 10,
            dealer_id: None,
            dealer_name: None,
            log_filter: "dealer_portal=info".to_string(),
        }
    }
}
