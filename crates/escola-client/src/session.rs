use std::fmt;
use std::sync::Arc;

use crate::auth::{AuthService, SessionState};
use crate::error::ServiceError;

pub const LOGIN_ROUTE: &str = "/login";

/// Where the embedding application sends the user once the session is gone.
pub trait LoginNavigator: Send + Sync + fmt::Debug {
    fn navigate_to_login(&self, route: &str);
}

/// Navigator for headless callers: records the redirect in the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLoginNavigator;

impl LoginNavigator for TracingLoginNavigator {
    fn navigate_to_login(&self, route: &str) {
        tracing::warn!(target: "escola.session", route, "session expired; login required");
    }
}

/// Applies the session policy for unauthorized outcomes reported by services.
///
/// Each failed call is acted on at most once, however many layers observe it.
#[derive(Debug, Clone)]
pub struct SessionManager {
    state: SessionState,
    navigator: Arc<dyn LoginNavigator>,
}

impl SessionManager {
    /// Shares `auth`'s session state; the manager does not keep the service itself.
    pub fn new(auth: &AuthService, navigator: Arc<dyn LoginNavigator>) -> Self {
        Self {
            state: auth.session_state().clone(),
            navigator,
        }
    }

    /// Returns `true` when the result was an unauthorized failure and the session was ended.
    pub fn observe<T>(&self, result: &Result<T, ServiceError>) -> bool {
        match result {
            Ok(_) => false,
            Err(error) => self.observe_error(error),
        }
    }

    pub fn observe_error(&self, error: &ServiceError) -> bool {
        if !error.is_unauthorized() || !error.claim_session_observation() {
            return false;
        }
        self.state.clear();
        self.navigator.navigate_to_login(LOGIN_ROUTE);
        true
    }
}

/// Runs `result` past the session policy, when one is attached, and hands it back.
pub(crate) fn observed<T>(
    session: Option<&SessionManager>,
    result: Result<T, ServiceError>,
) -> Result<T, ServiceError> {
    if let (Some(session), Err(error)) = (session, &result) {
        session.observe_error(error);
    }
    result
}
