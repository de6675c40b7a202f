use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const APP_DIR_NAME: &str = "billing-ingest";

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url: String,
    pub api_token: Option<String>,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub poll_max_attempts: u32,
    pub duplicate_retry_delay: Duration,
    pub data_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            api_token: None,
            request_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
            poll_max_attempts: 30,
            duplicate_retry_delay: Duration::from_millis(1000),
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Load `.env` from the app data folder (so deployed users can drop credentials there),
/// then from the working directory. Variables already set in the environment win.
pub fn load_env() {
    let env_path = default_data_dir().join(".env");
    if env_path.exists() {
        let _ = dotenvy::from_path(&env_path);
    }
    let _ = dotenvy::dotenv();
}

impl Settings {
    pub fn load() -> Result<Self> {
        load_env();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `load` uses the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let number = |key: &str| -> Result<Option<u64>> {
            match get(key) {
                None => Ok(None),
                Some(v) => v
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|_| Error::Config(format!("{} must be a whole number, got {:?}", key, v))),
            }
        };

        let defaults = Settings::default();
        let api_url = get("BILLING_API_URL")
            .unwrap_or(defaults.api_url)
            .trim_end_matches('/')
            .to_string();
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "BILLING_API_URL must start with http:// or https://, got {:?}",
                api_url
            )));
        }
        let poll_interval = number("BILLING_POLL_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_interval);
        if poll_interval.is_zero() {
            return Err(Error::Config("BILLING_POLL_INTERVAL_SECS must be at least 1".to_string()));
        }

        Ok(Settings {
            api_url,
            api_token: get("BILLING_API_TOKEN"),
            request_timeout: number("BILLING_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            poll_interval,
            poll_max_attempts: number("BILLING_POLL_MAX_ATTEMPTS")?
                .map(|n| n.clamp(1, u32::MAX as u64) as u32)
                .unwrap_or(defaults.poll_max_attempts),
            duplicate_retry_delay: number("BILLING_DUPLICATE_RETRY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.duplicate_retry_delay),
            data_dir: get("BILLING_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("billing_ingest.db")
    }

    /// "configured" when a token is present, for status output.
    pub fn auth_status(&self) -> &'static str {
        if self.api_token.is_some() {
            "configured"
        } else {
            "not_configured"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let s = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(s.api_url, "http://localhost:8000");
        assert_eq!(s.poll_interval, Duration::from_secs(2));
        assert_eq!(s.poll_max_attempts, 30);
        assert_eq!(s.duplicate_retry_delay, Duration::from_secs(1));
        assert_eq!(s.auth_status(), "not_configured");
    }

    #[test]
    fn test_overrides_and_trailing_slash() {
        let s = Settings::from_lookup(lookup(&[
            ("BILLING_API_URL", "https://bo.example.dz/"),
            ("BILLING_API_TOKEN", " abc "),
            ("BILLING_POLL_MAX_ATTEMPTS", "5"),
            ("BILLING_DATA_DIR", "/tmp/bi"),
        ]))
        .unwrap();
        assert_eq!(s.api_url, "https://bo.example.dz");
        assert_eq!(s.api_token.as_deref(), Some("abc"));
        assert_eq!(s.poll_max_attempts, 5);
        assert_eq!(s.db_path(), PathBuf::from("/tmp/bi/billing_ingest.db"));
    }

    #[test]
    fn test_bad_values_are_config_errors() {
        assert!(matches!(
            Settings::from_lookup(lookup(&[("BILLING_TIMEOUT_SECS", "soon")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Settings::from_lookup(lookup(&[("BILLING_API_URL", "ftp://x")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Settings::from_lookup(lookup(&[("BILLING_POLL_INTERVAL_SECS", "0")])),
            Err(Error::Config(_))
        ));
    }
}
