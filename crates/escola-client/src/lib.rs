//! Client services for the Escola API: goals, LTI and Microsoft integrations, and auth.

pub mod auth;
pub mod config;
pub mod error;
pub mod goals;
pub mod http;
pub mod integrations;
pub mod lti;
pub mod microsoft;
pub mod query;
pub mod session;
pub mod storage;

use std::sync::Arc;

pub use auth::{AuthService, AuthenticatedUser, LoginCredentials, SessionState};
pub use config::{ClientConfig, ClientConfigError};
pub use error::{ServiceError, ServiceErrorKind};
pub use goals::{
    DeleteGoalResponse, GoalDraft, GoalProgress, GoalQueries, ProgressNote, ProgressUpdate,
    SmartGoal, SmartGoalsService,
};
pub use http::{ApiClient, HttpError};
pub use integrations::{
    ConnectionTestResult, IntegrationEvent, IntegrationMetrics, IntegrationStatus,
};
pub use lti::{LtiConfig, LtiConfigUpdate, LtiService};
pub use microsoft::{MicrosoftConfig, MicrosoftConfigUpdate, MicrosoftService};
pub use query::{MutationOptions, QueryClient, QueryOptions, RetryPolicy};
pub use session::{LoginNavigator, SessionManager, TracingLoginNavigator};
pub use storage::{FileStorage, LocalStorage, MemoryStorage, StorageError};

/// Every service for one process, sharing a single [`ApiClient`] and one
/// [`SessionManager`]: an unauthorized reply from any of them ends the session.
#[derive(Debug, Clone)]
pub struct EscolaClient {
    pub session: SessionManager,
    pub auth: AuthService,
    pub goals: SmartGoalsService,
    pub lti: LtiService,
    pub microsoft: MicrosoftService,
    queries: QueryClient,
}

impl EscolaClient {
    pub fn new(http: &ApiClient, navigator: Arc<dyn LoginNavigator>) -> Self {
        let auth = AuthService::new(http.clone());
        let session = SessionManager::new(&auth, navigator);
        Self {
            auth: auth.with_session(session.clone()),
            goals: SmartGoalsService::new(http.clone()).with_session(session.clone()),
            lti: LtiService::new(http.clone()).with_session(session.clone()),
            microsoft: MicrosoftService::new(http.clone()).with_session(session.clone()),
            queries: QueryClient::new().with_session(session.clone()),
            session,
        }
    }

    /// Cached goal reads over this client's goals service; every call shares one cache.
    pub fn goal_queries(&self) -> GoalQueries {
        GoalQueries::new(self.goals.clone(), self.queries.clone())
    }
}
