use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ServiceError, ServiceResultExt};
use crate::http::ApiClient;
use crate::session::{SessionManager, observed};

pub const DEFAULT_EVENT_LIMIT: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationStatus {
    Active,
    Inactive,
    Error,
    Pending,
}

impl IntegrationStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Error => "error",
            Self::Pending => "pending",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationEvent {
    pub id: String,
    pub event_type: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationMetrics {
    #[serde(default)]
    pub total_requests: u64,
    #[serde(default)]
    pub successful_requests: u64,
    #[serde(default)]
    pub failed_requests: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_latency_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl IntegrationMetrics {
    /// Fraction of successful requests; `None` before any traffic.
    pub fn success_rate(&self) -> Option<f64> {
        if self.total_requests == 0 {
            return None;
        }
        Some(self.successful_requests as f64 / self.total_requests as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// Fixed user-facing messages for one integration's operations.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IntegrationMessages {
    pub get_config: &'static str,
    pub update_config: &'static str,
    pub list_events: &'static str,
    pub get_metrics: &'static str,
    pub test_connection: &'static str,
}

/// Calls shared by every integration proxied under `/integrations/<name>`.
/// Nothing is cached; every call round-trips.
#[derive(Debug, Clone)]
pub(crate) struct IntegrationClient {
    http: ApiClient,
    base_path: &'static str,
    messages: IntegrationMessages,
    session: Option<SessionManager>,
}

#[derive(Debug, Serialize)]
struct EmptyBody {}

impl IntegrationClient {
    pub(crate) fn new(
        http: ApiClient,
        base_path: &'static str,
        messages: IntegrationMessages,
    ) -> Self {
        Self {
            http,
            base_path,
            messages,
            session: None,
        }
    }

    pub(crate) fn with_session(mut self, session: SessionManager) -> Self {
        self.session = Some(session);
        self
    }

    fn path(&self, suffix: &str) -> String {
        format!("{}/{suffix}", self.base_path)
    }

    pub(crate) async fn get_config<T>(&self) -> Result<T, ServiceError>
    where
        T: DeserializeOwned,
    {
        let result = self
            .http
            .get_json(&self.path("config"))
            .await
            .or_service_error(self.messages.get_config);
        observed(self.session.as_ref(), result)
    }

    pub(crate) async fn update_config<P, T>(&self, patch: &P) -> Result<T, ServiceError>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let result = self
            .http
            .patch_json(&self.path("config"), patch)
            .await
            .or_service_error(self.messages.update_config);
        observed(self.session.as_ref(), result)
    }

    pub(crate) async fn list_events(
        &self,
        limit: Option<u32>,
    ) -> Result<Vec<IntegrationEvent>, ServiceError> {
        let limit = limit.unwrap_or(DEFAULT_EVENT_LIMIT).to_string();
        let result = self
            .http
            .get_json_with_query(&self.path("events"), &[("limit", limit.as_str())])
            .await
            .or_service_error(self.messages.list_events);
        observed(self.session.as_ref(), result)
    }

    pub(crate) async fn get_metrics(&self) -> Result<IntegrationMetrics, ServiceError> {
        let result = self
            .http
            .get_json(&self.path("metrics"))
            .await
            .or_service_error(self.messages.get_metrics);
        observed(self.session.as_ref(), result)
    }

    pub(crate) async fn test_connection(&self) -> Result<ConnectionTestResult, ServiceError> {
        let result = self
            .http
            .post_json(&self.path("test"), &EmptyBody {})
            .await
            .or_service_error(self.messages.test_connection);
        observed(self.session.as_ref(), result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_uses_lowercase_wire_names() -> Result<(), serde_json::Error> {
        for status in [
            IntegrationStatus::Active,
            IntegrationStatus::Inactive,
            IntegrationStatus::Error,
            IntegrationStatus::Pending,
        ] {
            assert_eq!(serde_json::to_value(status)?, json!(status.as_str()));
        }
        assert!(serde_json::from_value::<IntegrationStatus>(json!("Active")).is_err());
        Ok(())
    }

    #[test]
    fn success_rate_is_undefined_without_traffic() -> Result<(), serde_json::Error> {
        let idle: IntegrationMetrics = serde_json::from_value(json!({}))?;
        assert_eq!(idle.success_rate(), None);

        let busy: IntegrationMetrics = serde_json::from_value(json!({
            "totalRequests": 8,
            "successfulRequests": 6,
            "failedRequests": 2
        }))?;
        assert_eq!(busy.success_rate(), Some(0.75));
        Ok(())
    }
}
