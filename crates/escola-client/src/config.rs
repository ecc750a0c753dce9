use std::time::Duration;

pub const ENV_API_URL: &str = "NEXT_PUBLIC_API_URL";
pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const API_URL_SOURCE_DEFAULT_LOCAL: &str = "default_local";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientConfigError {
    #[error("base url must not be empty")]
    EmptyBaseUrl,
    #[error("base url must use http:// or https:// and include a host")]
    InvalidBaseUrl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Result<Self, ClientConfigError> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        })
    }

    /// Reads `NEXT_PUBLIC_API_URL`, falling back to the local development API.
    pub fn from_env() -> Result<Self, ClientConfigError> {
        let (base_url, source) = resolve_api_base_url()?;
        tracing::debug!(
            target: "escola.client",
            base_url = %base_url,
            source,
            "resolved api base url",
        );
        Ok(Self {
            base_url,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub fn resolve_api_base_url() -> Result<(String, &'static str), ClientConfigError> {
    if let Some(base_url) = env_non_empty(ENV_API_URL) {
        return normalize_base_url(&base_url).map(|normalized| (normalized, ENV_API_URL));
    }
    normalize_base_url(DEFAULT_API_URL).map(|normalized| (normalized, API_URL_SOURCE_DEFAULT_LOCAL))
}

pub fn normalize_base_url(raw: &str) -> Result<String, ClientConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ClientConfigError::EmptyBaseUrl);
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ClientConfigError::InvalidBaseUrl);
    }
    let Some((_, remainder)) = trimmed.split_once("://") else {
        return Err(ClientConfigError::InvalidBaseUrl);
    };
    if remainder.trim().is_empty() || remainder.starts_with('/') {
        return Err(ClientConfigError::InvalidBaseUrl);
    }
    Ok(trimmed.to_string())
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn with_api_url<T>(value: Option<&str>, test: impl FnOnce() -> T) -> T {
        let lock = ENV_LOCK.get_or_init(|| Mutex::new(()));
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let previous = std::env::var(ENV_API_URL).ok();
        match value {
            Some(value) => unsafe { std::env::set_var(ENV_API_URL, value) },
            None => unsafe { std::env::remove_var(ENV_API_URL) },
        }

        let result = test();

        match previous {
            Some(value) => unsafe { std::env::set_var(ENV_API_URL, value) },
            None => unsafe { std::env::remove_var(ENV_API_URL) },
        }
        result
    }

    #[test]
    fn normalize_base_url_trims_and_drops_trailing_slash() {
        let normalized = normalize_base_url(" https://escola.example.com/api/ ").expect("valid");
        assert_eq!(normalized, "https://escola.example.com/api");
    }

    #[test]
    fn normalize_base_url_requires_scheme_and_host() {
        assert_eq!(
            normalize_base_url("escola.example.com"),
            Err(ClientConfigError::InvalidBaseUrl)
        );
        assert_eq!(
            normalize_base_url("https:///api"),
            Err(ClientConfigError::InvalidBaseUrl)
        );
        assert_eq!(normalize_base_url("  "), Err(ClientConfigError::EmptyBaseUrl));
    }

    #[test]
    fn resolve_api_base_url_defaults_to_local_development() {
        with_api_url(None, || {
            let (resolved, source) = resolve_api_base_url().expect("default url");
            assert_eq!(resolved, DEFAULT_API_URL);
            assert_eq!(source, API_URL_SOURCE_DEFAULT_LOCAL);
        });
    }

    #[test]
    fn resolve_api_base_url_prefers_env() {
        with_api_url(Some("https://escola.example.com/api/"), || {
            let config = ClientConfig::from_env().expect("env url");
            assert_eq!(config.base_url, "https://escola.example.com/api");
            assert_eq!(config.timeout, Duration::from_secs(10));
        });
    }
}
