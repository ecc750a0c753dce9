use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResultExt};
use crate::http::ApiClient;
use crate::session::{SessionManager, observed};
use crate::storage::{AUTH_TOKEN_KEY, LocalStorage, USER_KEY};

pub const ROUTE_AUTH_LOGIN: &str = "/auth/login";
pub const ROUTE_AUTH_LOGOUT: &str = "/auth/logout";
pub const ROUTE_AUTH_REFRESH: &str = "/auth/refresh";
pub const ROUTE_AUTH_ME: &str = "/auth/me";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: AuthenticatedUser,
}

#[derive(Debug, Clone, Deserialize)]
struct RefreshResponse {
    token: String,
}

#[derive(Debug, Serialize)]
struct EmptyBody {}

/// Token and logged-in user for one process: cached in memory, mirrored to local storage.
#[derive(Debug, Clone)]
pub struct SessionState {
    storage: Arc<dyn LocalStorage>,
    current_user: Arc<RwLock<Option<AuthenticatedUser>>>,
}

impl SessionState {
    /// Restores the cached user from `storage`.
    pub fn restore(storage: Arc<dyn LocalStorage>) -> Self {
        let restored = restore_user(storage.as_ref());
        Self {
            storage,
            current_user: Arc::new(RwLock::new(restored)),
        }
    }

    pub fn current_user(&self) -> Option<AuthenticatedUser> {
        self.current_user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn has_token(&self) -> bool {
        matches!(
            self.storage.get_item(AUTH_TOKEN_KEY),
            Ok(Some(ref token)) if !token.trim().is_empty()
        )
    }

    /// Drops the token, the persisted user and the cached user.
    pub fn clear(&self) {
        for key in [AUTH_TOKEN_KEY, USER_KEY] {
            if let Err(error) = self.storage.remove_item(key) {
                tracing::warn!(
                    target: "escola.auth",
                    key,
                    error = %error,
                    "failed to clear session key",
                );
            }
        }
        self.set_user(None);
    }

    fn set_user(&self, user: Option<AuthenticatedUser>) {
        *self
            .current_user
            .write()
            .unwrap_or_else(PoisonError::into_inner) = user;
    }

    fn store_token(&self, token: &str) {
        if let Err(error) = self.storage.set_item(AUTH_TOKEN_KEY, token) {
            tracing::warn!(
                target: "escola.auth",
                error = %error,
                "failed to persist session token; session will not survive restart",
            );
        }
    }

    fn store_user(&self, user: &AuthenticatedUser) {
        let encoded = match serde_json::to_string(user) {
            Ok(encoded) => encoded,
            Err(error) => {
                tracing::warn!(target: "escola.auth", error = %error, "failed to encode user");
                return;
            }
        };
        if let Err(error) = self.storage.set_item(USER_KEY, &encoded) {
            tracing::warn!(
                target: "escola.auth",
                error = %error,
                "failed to persist user; session will not survive restart",
            );
        }
        self.set_user(Some(user.clone()));
    }
}

#[derive(Debug, Clone)]
pub struct AuthService {
    http: ApiClient,
    state: SessionState,
    session: Option<SessionManager>,
}

impl AuthService {
    /// Builds the service and restores the cached user from the client's storage.
    pub fn new(http: ApiClient) -> Self {
        let state = SessionState::restore(Arc::clone(http.storage()));
        Self {
            http,
            state,
            session: None,
        }
    }

    #[must_use]
    pub fn with_session(mut self, session: SessionManager) -> Self {
        self.session = Some(session);
        self
    }

    pub fn session_state(&self) -> &SessionState {
        &self.state
    }

    pub async fn login(
        &self,
        credentials: &LoginCredentials,
    ) -> Result<AuthenticatedUser, ServiceError> {
        let result = self
            .http
            .post_json(ROUTE_AUTH_LOGIN, credentials)
            .await
            .or_service_error("Login failed");
        let response: LoginResponse = observed(self.session.as_ref(), result)?;

        self.state.store_token(&response.token);
        self.state.store_user(&response.user);

        tracing::info!(
            target: "escola.auth",
            user_id = %response.user.id,
            role = %response.user.role,
            "user logged in",
        );
        Ok(response.user)
    }

    /// Clears the local session even when the remote logout call fails.
    pub async fn logout(&self) {
        let result = self
            .http
            .post_json(ROUTE_AUTH_LOGOUT, &EmptyBody {})
            .await
            .or_service_error("Logout failed");
        let remote: Result<serde_json::Value, ServiceError> =
            observed(self.session.as_ref(), result);
        if let Err(error) = remote {
            tracing::debug!(
                target: "escola.auth",
                kind = error.kind().as_str(),
                "remote logout failed; clearing local session anyway",
            );
        }
        self.clear_session();
    }

    /// Exchanges the current token for a new one; any failure ends the session.
    pub async fn refresh_token(&self) -> Result<(), ServiceError> {
        let refreshed: Result<RefreshResponse, ServiceError> = self
            .http
            .post_json(ROUTE_AUTH_REFRESH, &EmptyBody {})
            .await
            .or_service_error("Failed to refresh session");

        match refreshed {
            Ok(response) => {
                self.state.store_token(&response.token);
                Ok(())
            }
            Err(error) => {
                self.clear_session();
                observed(self.session.as_ref(), Err(error))
            }
        }
    }

    pub async fn fetch_current_user(&self) -> Result<AuthenticatedUser, ServiceError> {
        let result = self
            .http
            .get_json(ROUTE_AUTH_ME)
            .await
            .or_service_error("Failed to fetch current user");
        let user: AuthenticatedUser = observed(self.session.as_ref(), result)?;
        self.state.store_user(&user);
        Ok(user)
    }

    pub fn current_user(&self) -> Option<AuthenticatedUser> {
        self.state.current_user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.has_token() && self.state.current_user().is_some()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.state
            .current_user()
            .is_some_and(|user| user.role == role)
    }

    pub fn clear_session(&self) {
        self.state.clear();
    }
}

fn restore_user(storage: &dyn LocalStorage) -> Option<AuthenticatedUser> {
    let raw = match storage.get_item(USER_KEY) {
        Ok(raw) => raw?,
        Err(error) => {
            tracing::warn!(target: "escola.auth", error = %error, "failed to read stored user");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(user) => Some(user),
        Err(error) => {
            tracing::warn!(
                target: "escola.auth",
                error = %error,
                "stored user is unreadable; starting signed out",
            );
            None
        }
    }
}
