use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::ServiceError;
use crate::session::SessionManager;

pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_CACHE_TIME: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_QUERY_RETRIES: u32 = 3;
pub const DEFAULT_MUTATION_RETRIES: u32 = 1;
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

/// Retries failures that carry no 4xx status, with capped exponential delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub const fn queries() -> Self {
        Self {
            max_retries: DEFAULT_QUERY_RETRIES,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
            max_delay: DEFAULT_RETRY_MAX_DELAY,
        }
    }

    pub const fn mutations() -> Self {
        Self {
            max_retries: DEFAULT_MUTATION_RETRIES,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
            max_delay: DEFAULT_RETRY_MAX_DELAY,
        }
    }

    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// `failure_count` is the number of failures before the current one.
    pub fn should_retry(&self, failure_count: u32, error: &ServiceError) -> bool {
        failure_count < self.max_retries && !error.is_client_error()
    }

    pub fn delay(&self, failure_count: u32) -> Duration {
        let factor = 2_u32.saturating_pow(failure_count);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    async fn run<T, F, Fut>(&self, operation: F) -> Result<T, ServiceError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut failure_count = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !self.should_retry(failure_count, &error) {
                        return Err(error);
                    }
                    let delay = self.delay(failure_count);
                    tracing::debug!(
                        target: "escola.query",
                        failure_count,
                        delay_ms = delay.as_millis() as u64,
                        kind = error.kind().as_str(),
                        "retrying failed request",
                    );
                    failure_count += 1;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub stale_time: Duration,
    pub cache_time: Duration,
    pub retry: RetryPolicy,
    pub refetch_on_window_focus: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_time: DEFAULT_STALE_TIME,
            cache_time: DEFAULT_CACHE_TIME,
            retry: RetryPolicy::queries(),
            refetch_on_window_focus: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOptions {
    pub retry: RetryPolicy,
}

impl Default for MutationOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::mutations(),
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    value: Value,
    updated_at: Instant,
    last_accessed: Instant,
    invalidated: bool,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant, stale_time: Duration) -> bool {
        !self.invalidated && now.duration_since(self.updated_at) < stale_time
    }
}

/// Keyed read cache plus retry policy for reads and writes.
#[derive(Debug, Clone, Default)]
pub struct QueryClient {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
    query_options: QueryOptions,
    mutation_options: MutationOptions,
    session: Option<SessionManager>,
}

impl QueryClient {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_query_options(mut self, options: QueryOptions) -> Self {
        self.query_options = options;
        self
    }

    #[must_use]
    pub fn with_mutation_options(mut self, options: MutationOptions) -> Self {
        self.mutation_options = options;
        self
    }

    /// Terminal failures are reported to `session`, which ends it on 401.
    #[must_use]
    pub fn with_session(mut self, session: SessionManager) -> Self {
        self.session = Some(session);
        self
    }

    pub fn query_options(&self) -> &QueryOptions {
        &self.query_options
    }

    pub fn mutation_options(&self) -> &MutationOptions {
        &self.mutation_options
    }

    /// Serves a fresh cached value for `key`, otherwise runs `fetcher` under the read retry policy.
    pub async fn fetch_query<T, F, Fut>(&self, key: &str, fetcher: F) -> Result<T, ServiceError>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        if let Some(value) = self.fresh_value(key).await {
            match serde_json::from_value::<T>(value) {
                Ok(cached) => return Ok(cached),
                Err(error) => tracing::debug!(
                    target: "escola.query",
                    key,
                    error = %error,
                    "cached value has a different shape; refetching",
                ),
            }
        }

        match self.query_options.retry.run(&fetcher).await {
            Ok(value) => {
                self.set_query_data(key, &value).await;
                Ok(value)
            }
            Err(error) => {
                self.report_failure(&error);
                Err(error)
            }
        }
    }

    /// Runs a write under the mutation retry policy and invalidates `invalidate` prefixes on success.
    pub async fn mutate<T, F, Fut>(
        &self,
        invalidate: &[&str],
        mutation: F,
    ) -> Result<T, ServiceError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        match self.mutation_options.retry.run(&mutation).await {
            Ok(value) => {
                for prefix in invalidate {
                    self.invalidate(prefix).await;
                }
                Ok(value)
            }
            Err(error) => {
                self.report_failure(&error);
                Err(error)
            }
        }
    }

    pub async fn set_query_data<T>(&self, key: &str, value: &T)
    where
        T: Serialize,
    {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(error) => {
                tracing::debug!(
                    target: "escola.query",
                    key,
                    error = %error,
                    "value is not cacheable",
                );
                return;
            }
        };
        let now = Instant::now();
        self.entries.lock().await.insert(
            key.to_string(),
            CacheEntry {
                value,
                updated_at: now,
                last_accessed: now,
                invalidated: false,
            },
        );
    }

    /// Cached value for `key` regardless of freshness, unless it has outlived the cache window.
    pub async fn cached<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let mut entries = self.entries.lock().await;
        Self::evict_locked(&mut entries, self.query_options.cache_time);
        let entry = entries.get(key)?;
        serde_json::from_value(entry.value.clone()).ok()
    }

    /// Marks every key starting with `prefix` stale; returns how many were marked.
    pub async fn invalidate(&self, prefix: &str) -> usize {
        let mut entries = self.entries.lock().await;
        let mut marked = 0;
        for (key, entry) in entries.iter_mut() {
            if key.starts_with(prefix) {
                entry.invalidated = true;
                marked += 1;
            }
        }
        marked
    }

    pub async fn remove(&self, key: &str) -> bool {
        self.entries.lock().await.remove(key).is_some()
    }

    /// Drops entries unused for longer than the cache window.
    pub async fn evict_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        Self::evict_locked(&mut entries, self.query_options.cache_time)
    }

    /// Keys a focus event should refetch; empty unless focus refetching is enabled.
    pub async fn window_focus_refetch_keys(&self) -> Vec<String> {
        if !self.query_options.refetch_on_window_focus {
            return Vec::new();
        }
        let now = Instant::now();
        let entries = self.entries.lock().await;
        let mut keys = entries
            .iter()
            .filter(|(_, entry)| !entry.is_fresh(now, self.query_options.stale_time))
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        keys.sort();
        keys
    }

    async fn fresh_value(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        Self::evict_locked(&mut entries, self.query_options.cache_time);

        let entry = entries.get_mut(key)?;
        entry.last_accessed = now;
        if entry.is_fresh(now, self.query_options.stale_time) {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    fn evict_locked(entries: &mut HashMap<String, CacheEntry>, cache_time: Duration) -> usize {
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.last_accessed) < cache_time);
        before - entries.len()
    }

    fn report_failure(&self, error: &ServiceError) {
        if let Some(session) = self.session.as_ref() {
            session.observe_error(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    use anyhow::Result;
    use reqwest::StatusCode;

    use crate::auth::AuthService;
    use crate::config::ClientConfig;
    use crate::error::ServiceErrorKind;
    use crate::http::{ApiClient, HttpError};
    use crate::session::{LOGIN_ROUTE, LoginNavigator};
    use crate::storage::{AUTH_TOKEN_KEY, LocalStorage, MemoryStorage};

    fn http_failure(status: StatusCode) -> ServiceError {
        let cause = if status == StatusCode::UNAUTHORIZED {
            HttpError::Unauthorized
        } else {
            HttpError::Http {
                status,
                body: "failure".to_string(),
            }
        };
        ServiceError::new("Failed to fetch goals", cause)
    }

    fn counting_fetcher(
        calls: &Arc<AtomicU32>,
        outcome: fn(u32) -> Result<Vec<String>, ServiceError>,
    ) -> impl Fn() -> std::future::Ready<Result<Vec<String>, ServiceError>> {
        let calls = Arc::clone(calls);
        move || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(outcome(attempt))
        }
    }

    fn always_ok(attempt: u32) -> Result<Vec<String>, ServiceError> {
        Ok(vec![format!("fetch-{attempt}")])
    }

    fn always_server_error(_: u32) -> Result<Vec<String>, ServiceError> {
        Err(http_failure(StatusCode::INTERNAL_SERVER_ERROR))
    }

    fn always_not_found(_: u32) -> Result<Vec<String>, ServiceError> {
        Err(http_failure(StatusCode::NOT_FOUND))
    }

    fn always_unauthorized(_: u32) -> Result<Vec<String>, ServiceError> {
        Err(http_failure(StatusCode::UNAUTHORIZED))
    }

    fn fails_twice(attempt: u32) -> Result<Vec<String>, ServiceError> {
        if attempt <= 2 {
            Err(ServiceError::new(
                "Failed to fetch goals",
                HttpError::Timeout {
                    message: "deadline elapsed".to_string(),
                },
            ))
        } else {
            Ok(vec!["recovered".to_string()])
        }
    }

    #[test]
    fn retry_delay_doubles_and_caps() {
        let policy = RetryPolicy::queries();
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(4), Duration::from_secs(16));
        assert_eq!(policy.delay(5), Duration::from_secs(30));
        assert_eq!(policy.delay(40), Duration::from_secs(30));
    }

    #[test]
    fn client_errors_are_never_retried() {
        let policy = RetryPolicy::queries();
        assert!(!policy.should_retry(0, &http_failure(StatusCode::BAD_REQUEST)));
        assert!(!policy.should_retry(0, &http_failure(StatusCode::UNAUTHORIZED)));
        assert!(policy.should_retry(2, &http_failure(StatusCode::BAD_GATEWAY)));
        assert!(!policy.should_retry(3, &http_failure(StatusCode::BAD_GATEWAY)));
        assert!(RetryPolicy::mutations().should_retry(0, &http_failure(StatusCode::BAD_GATEWAY)));
        assert!(!RetryPolicy::mutations().should_retry(1, &http_failure(StatusCode::BAD_GATEWAY)));
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_values_are_served_from_cache_until_stale() -> Result<()> {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicU32::new(0));
        let fetcher = counting_fetcher(&calls, always_ok);

        let first = client.fetch_query("goals", &fetcher).await?;
        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        let second = client.fetch_query("goals", &fetcher).await?;
        assert_eq!(first, vec!["fetch-1".to_string()]);
        assert_eq!(second, first);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        let third = client.fetch_query("goals", &fetcher).await?;
        assert_eq!(third, vec!["fetch-2".to_string()]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn unused_entries_are_evicted_after_cache_window() -> Result<()> {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicU32::new(0));
        client
            .fetch_query("goals", counting_fetcher(&calls, always_ok))
            .await?;

        tokio::time::advance(Duration::from_secs(29 * 60)).await;
        assert_eq!(client.evict_expired().await, 0);
        assert!(client.cached::<Vec<String>>("goals").await.is_some());

        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        assert_eq!(client.evict_expired().await, 1);
        assert!(client.cached::<Vec<String>>("goals").await.is_none());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn cached_reads_skip_entries_past_the_cache_window() -> Result<()> {
        let client = QueryClient::new();
        client.set_query_data("goals", &vec!["kept".to_string()]).await;

        tokio::time::advance(Duration::from_secs(31 * 60)).await;

        assert!(client.cached::<Vec<String>>("goals").await.is_none());
        assert_eq!(client.evict_expired().await, 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_are_retried_three_times_for_reads() {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicU32::new(0));

        let error = client
            .fetch_query("goals", counting_fetcher(&calls, always_server_error))
            .await
            .expect_err("read should fail");

        assert_eq!(error.kind(), ServiceErrorKind::Server);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(client.cached::<Vec<String>>("goals").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn mutations_stop_after_two_attempts() {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicU32::new(0));

        client
            .mutate(&["goals"], counting_fetcher(&calls, always_server_error))
            .await
            .expect_err("mutation should fail");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_fail_on_first_attempt() {
        let client = QueryClient::new();
        let reads = Arc::new(AtomicU32::new(0));
        let writes = Arc::new(AtomicU32::new(0));

        let error = client
            .fetch_query("goal:missing", counting_fetcher(&reads, always_not_found))
            .await
            .expect_err("read should fail");
        assert_eq!(error.kind(), ServiceErrorKind::NotFound);
        client
            .mutate(&[], counting_fetcher(&writes, always_not_found))
            .await
            .expect_err("mutation should fail");

        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert_eq!(writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_recover_within_budget() -> Result<()> {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicU32::new(0));

        let value = client
            .fetch_query("goals", counting_fetcher(&calls, fails_twice))
            .await?;

        assert_eq!(value, vec!["recovered".to_string()]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn mutations_invalidate_matching_prefixes() -> Result<()> {
        let client = QueryClient::new();
        let reads = Arc::new(AtomicU32::new(0));
        let writes = Arc::new(AtomicU32::new(0));
        let fetcher = counting_fetcher(&reads, always_ok);

        client.fetch_query("goals", &fetcher).await?;
        client.fetch_query("goals?studentId=42", &fetcher).await?;
        client.set_query_data("lti:config", &"cached").await;

        client
            .mutate(&["goals"], counting_fetcher(&writes, always_ok))
            .await?;
        client.fetch_query("goals", &fetcher).await?;
        client.fetch_query("goals?studentId=42", &fetcher).await?;

        assert_eq!(reads.load(Ordering::SeqCst), 4);
        assert_eq!(
            client.cached::<String>("lti:config").await.as_deref(),
            Some("cached")
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn window_focus_does_not_refetch_by_default() -> Result<()> {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicU32::new(0));
        client
            .fetch_query("goals", counting_fetcher(&calls, always_ok))
            .await?;
        tokio::time::advance(Duration::from_secs(10 * 60)).await;
        assert!(client.window_focus_refetch_keys().await.is_empty());

        let focused = QueryClient::new().with_query_options(QueryOptions {
            refetch_on_window_focus: true,
            ..QueryOptions::default()
        });
        focused
            .fetch_query("goals", counting_fetcher(&calls, always_ok))
            .await?;
        tokio::time::advance(Duration::from_secs(10 * 60)).await;
        assert_eq!(
            focused.window_focus_refetch_keys().await,
            vec!["goals".to_string()]
        );
        Ok(())
    }

    #[derive(Debug, Default)]
    struct RecordingNavigator {
        routes: StdMutex<Vec<String>>,
    }

    impl LoginNavigator for RecordingNavigator {
        fn navigate_to_login(&self, route: &str) {
            self.routes
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(route.to_string());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_failures_end_the_session_once() -> Result<()> {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item(AUTH_TOKEN_KEY, "expired-token")?;
        let config = ClientConfig::new("http://127.0.0.1:9")?;
        let api = ApiClient::new(&config, storage.clone())?;
        let navigator = Arc::new(RecordingNavigator::default());
        let session = SessionManager::new(&AuthService::new(api), navigator.clone());
        let client = QueryClient::new().with_session(session);
        let calls = Arc::new(AtomicU32::new(0));

        let error = client
            .fetch_query("goals", counting_fetcher(&calls, always_unauthorized))
            .await
            .expect_err("read should fail");

        assert!(error.is_unauthorized());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(storage.get_item(AUTH_TOKEN_KEY)?, None);
        let routes = navigator
            .routes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        assert_eq!(routes, vec![LOGIN_ROUTE.to_string()]);
        Ok(())
    }
}
