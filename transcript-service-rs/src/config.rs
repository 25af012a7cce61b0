// transcript-service-rs/src/config.rs
//
// Service configuration loaded once at startup
//
// Configuration (.env file):
// - REDIS_URL: quota store connection URL (absence disables rate limiting, fail open)
// - DAILY_LIMIT: per-IP daily request limit (default: 5)
// - ADMIN_TOKEN: shared secret for admin endpoints (absence disables them)
// - WEBSHARE_USERNAME / WEBSHARE_PASSWORD: outbound proxy credentials
// - WEBSHARE_COUNTRIES: optional comma-separated country filter
// - OPENAI_API_KEY: summarization API key (absence disables summarization)
// - OPENAI_MODEL: summarization model override (default: "gpt-4o-mini")

use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub redis_url: Option<String>,
    pub daily_limit: i64,
    pub admin_token: Option<String>,
    pub webshare: Option<WebshareProxyConfig>,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            redis_url: non_empty(env::var("REDIS_URL").ok()),
            daily_limit: get_env_var("DAILY_LIMIT", 5),
            admin_token: non_empty(env::var("ADMIN_TOKEN").ok()),
            webshare: WebshareProxyConfig::from_env(),
            openai_api_key: non_empty(env::var("OPENAI_API_KEY").ok()),
            openai_model: env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
        }
    }

    pub fn proxy_countries(&self) -> Vec<String> {
        self.webshare
            .as_ref()
            .map(|w| w.countries.clone())
            .unwrap_or_default()
    }
}

/// Outbound residential proxy credentials, validated once at load time.
#[derive(Debug, Clone)]
pub struct WebshareProxyConfig {
    pub username: String,
    pub password: String,
    pub countries: Vec<String>,
}

impl WebshareProxyConfig {
    pub fn from_env() -> Option<Self> {
        Self::from_values(
            env::var("WEBSHARE_USERNAME").ok(),
            env::var("WEBSHARE_PASSWORD").ok(),
            env::var("WEBSHARE_COUNTRIES").ok(),
        )
    }

    /// Both credentials are required; the country filter is optional and
    /// normalized to trimmed lowercase codes.
    pub fn from_values(
        username: Option<String>,
        password: Option<String>,
        countries: Option<String>,
    ) -> Option<Self> {
        let username = non_empty(username)?;
        let password = non_empty(password)?;
        let countries = countries
            .map(|raw| {
                raw.split(',')
                    .map(|c| c.trim().to_lowercase())
                    .filter(|c| !c.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            username,
            password,
            countries,
        })
    }

    /// Build the outbound proxy for the rotating residential pool.
    pub fn to_reqwest_proxy(&self) -> Result<reqwest::Proxy, reqwest::Error> {
        let proxy = reqwest::Proxy::all("http://p.webshare.io:80")?;
        Ok(proxy.basic_auth(&format!("{}-rotate", self.username), &self.password))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// Helper function to read environment variables with default values
fn get_env_var<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
