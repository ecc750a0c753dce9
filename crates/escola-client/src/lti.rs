use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::http::ApiClient;
use crate::session::SessionManager;
use crate::integrations::{
    ConnectionTestResult, IntegrationClient, IntegrationEvent, IntegrationMessages,
    IntegrationMetrics, IntegrationStatus,
};

pub const ROUTE_LTI_BASE: &str = "/integrations/lti";

const LTI_MESSAGES: IntegrationMessages = IntegrationMessages {
    get_config: "Failed to fetch LTI configuration",
    update_config: "Failed to update LTI configuration",
    list_events: "Failed to fetch LTI events",
    get_metrics: "Failed to fetch LTI metrics",
    test_connection: "Failed to test LTI connection",
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LtiConfig {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub status: IntegrationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_login_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyset_url: Option<String>,
}

/// Partial update: only the fields that are set go on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LtiConfigUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<IntegrationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_login_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyset_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LtiService {
    client: IntegrationClient,
}

impl LtiService {
    pub fn new(http: ApiClient) -> Self {
        Self {
            client: IntegrationClient::new(http, ROUTE_LTI_BASE, LTI_MESSAGES),
        }
    }

    /// Routes every failed call through `session` before returning it.
    #[must_use]
    pub fn with_session(mut self, session: SessionManager) -> Self {
        self.client = self.client.with_session(session);
        self
    }

    pub async fn get_config(&self) -> Result<LtiConfig, ServiceError> {
        self.client.get_config().await
    }

    pub async fn update_config(&self, update: &LtiConfigUpdate) -> Result<LtiConfig, ServiceError> {
        self.client.update_config(update).await
    }

    /// Most recent events first; `None` asks for the default page size.
    pub async fn list_events(
        &self,
        limit: Option<u32>,
    ) -> Result<Vec<IntegrationEvent>, ServiceError> {
        self.client.list_events(limit).await
    }

    pub async fn get_metrics(&self) -> Result<IntegrationMetrics, ServiceError> {
        self.client.get_metrics().await
    }

    pub async fn test_connection(&self) -> Result<ConnectionTestResult, ServiceError> {
        self.client.test_connection().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_sends_only_set_fields() -> Result<(), serde_json::Error> {
        let update = LtiConfigUpdate {
            status: Some(IntegrationStatus::Inactive),
            deployment_id: Some("dep-7".to_string()),
            ..LtiConfigUpdate::default()
        };

        assert_eq!(
            serde_json::to_value(&update)?,
            json!({"status": "inactive", "deploymentId": "dep-7"})
        );
        Ok(())
    }
}
