use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::http::ApiClient;
use crate::session::SessionManager;
use crate::integrations::{
    ConnectionTestResult, IntegrationClient, IntegrationEvent, IntegrationMessages,
    IntegrationMetrics, IntegrationStatus,
};

pub const ROUTE_MICROSOFT_BASE: &str = "/integrations/microsoft";

const MICROSOFT_MESSAGES: IntegrationMessages = IntegrationMessages {
    get_config: "Failed to fetch Microsoft configuration",
    update_config: "Failed to update Microsoft configuration",
    list_events: "Failed to fetch Microsoft events",
    get_metrics: "Failed to fetch Microsoft metrics",
    test_connection: "Failed to test Microsoft connection",
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicrosoftConfig {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub status: IntegrationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MicrosoftConfigUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<IntegrationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
}

/// Microsoft 365 integration proxied by the Escola API.
#[derive(Debug, Clone)]
pub struct MicrosoftService {
    client: IntegrationClient,
}

impl MicrosoftService {
    pub fn new(http: ApiClient) -> Self {
        Self {
            client: IntegrationClient::new(http, ROUTE_MICROSOFT_BASE, MICROSOFT_MESSAGES),
        }
    }

    /// Routes every failed call through `session` before returning it.
    #[must_use]
    pub fn with_session(mut self, session: SessionManager) -> Self {
        self.client = self.client.with_session(session);
        self
    }

    pub async fn get_config(&self) -> Result<MicrosoftConfig, ServiceError> {
        self.client.get_config().await
    }

    pub async fn update_config(
        &self,
        update: &MicrosoftConfigUpdate,
    ) -> Result<MicrosoftConfig, ServiceError> {
        self.client.update_config(update).await
    }

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
