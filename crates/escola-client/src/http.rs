use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::storage::{AUTH_TOKEN_KEY, LocalStorage};

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("api_client_build_failed:{message}")]
    Build { message: String },
    #[error("api_client_invalid_path")]
    InvalidPath,
    #[error("api_request_timed_out:{message}")]
    Timeout { message: String },
    #[error("api_request_failed:{message}")]
    Request { message: String },
    #[error("api_read_failed:{message}")]
    Read { message: String },
    #[error("api_unauthorized")]
    Unauthorized,
    #[error("api_http_{status}:{body}")]
    Http { status: StatusCode, body: String },
    #[error("api_json_decode_failed:{message}")]
    Decode { message: String },
}

impl HttpError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Unauthorized => Some(StatusCode::UNAUTHORIZED),
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Shared outbound client: one per process, cloned into every service.
///
/// A 401 surfaces as [`HttpError::Unauthorized`]; deciding what that means for
/// the session belongs to [`crate::session::SessionManager`].
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    timeout: Duration,
    http: reqwest::Client,
    storage: Arc<dyn LocalStorage>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, storage: Arc<dyn LocalStorage>) -> Result<Self, HttpError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| HttpError::Build {
                message: error.to_string(),
            })?;

        Ok(Self {
            base_url: config.base_url.clone(),
            timeout: config.timeout,
            http,
            storage,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn storage(&self) -> &Arc<dyn LocalStorage> {
        &self.storage
    }

    pub fn endpoint(&self, path: &str) -> Option<String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('/') {
            Some(format!("{}{trimmed}", self.base_url))
        } else {
            Some(format!("{}/{trimmed}", self.base_url))
        }
    }

    pub async fn get_json<T>(&self, path: &str) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        self.get_json_with_query(path, &[]).await
    }

    pub async fn get_json_with_query<T>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        let response = self.send(Method::GET, path, query, None::<&()>).await?;
        decode_json_response(response).await
    }

    pub async fn post_json<Req, Res>(&self, path: &str, payload: &Req) -> Result<Res, HttpError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let response = self.send(Method::POST, path, &[], Some(payload)).await?;
        decode_json_response(response).await
    }

    pub async fn put_json<Req, Res>(&self, path: &str, payload: &Req) -> Result<Res, HttpError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let response = self.send(Method::PUT, path, &[], Some(payload)).await?;
        decode_json_response(response).await
    }

    pub async fn patch_json<Req, Res>(&self, path: &str, payload: &Req) -> Result<Res, HttpError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let response = self.send(Method::PATCH, path, &[], Some(payload)).await?;
        decode_json_response(response).await
    }

    pub async fn delete_json<T>(&self, path: &str) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        let response = self.send(Method::DELETE, path, &[], None::<&()>).await?;
        decode_json_response(response).await
    }

    async fn send<Req>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        payload: Option<&Req>,
    ) -> Result<reqwest::Response, HttpError>
    where
        Req: Serialize + ?Sized,
    {
        let url = self.endpoint(path).ok_or(HttpError::InvalidPath)?;

        let mut request = self
            .http
            .request(method.clone(), url.as_str())
            .header(ACCEPT, "application/json")
            .header("x-request-id", format!("req_{}", Uuid::new_v4().simple()));
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = self.bearer_token() {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(payload) = payload {
            request = request.json(payload);
        }

        request.send().await.map_err(|error| {
            tracing::debug!(
                target: "escola.client",
                method = %method,
                url = %url,
                error = %error,
                "api request failed",
            );
            if error.is_timeout() {
                HttpError::Timeout {
                    message: error.to_string(),
                }
            } else {
                HttpError::Request {
                    message: error.to_string(),
                }
            }
        })
    }

    fn bearer_token(&self) -> Option<String> {
        match self.storage.get_item(AUTH_TOKEN_KEY) {
            Ok(token) => token.filter(|token| !token.trim().is_empty()),
            Err(error) => {
                tracing::warn!(
                    target: "escola.client",
                    error = %error,
                    "failed to read session token; sending request without it",
                );
                None
            }
        }
    }
}

pub fn format_http_error(status: StatusCode, body: &[u8]) -> HttpError {
    if status == StatusCode::UNAUTHORIZED {
        return HttpError::Unauthorized;
    }
    let body = non_empty_string(String::from_utf8_lossy(body).to_string())
        .unwrap_or_else(|| "<empty>".to_string());
    HttpError::Http { status, body }
}

async fn decode_json_response<T>(response: reqwest::Response) -> Result<T, HttpError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    let bytes = response.bytes().await.map_err(|error| {
        if error.is_timeout() {
            HttpError::Timeout {
                message: error.to_string(),
            }
        } else {
            HttpError::Read {
                message: error.to_string(),
            }
        }
    })?;

    if !status.is_success() {
        return Err(format_http_error(status, &bytes));
    }

    serde_json::from_slice::<T>(&bytes).map_err(|error| HttpError::Decode {
        message: error.to_string(),
    })
}

fn non_empty_string(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn client(base_url: &str) -> ApiClient {
        let config = ClientConfig::new(base_url).expect("client config");
        ApiClient::new(&config, Arc::new(MemoryStorage::new())).expect("api client")
    }

    #[test]
    fn endpoint_builder_normalizes_paths() {
        let client = client("https://escola.example.com/api/");

        assert_eq!(
            client.endpoint("/goals"),
            Some("https://escola.example.com/api/goals".to_string())
        );
        assert_eq!(
            client.endpoint("goals/goal_1/progress"),
            Some("https://escola.example.com/api/goals/goal_1/progress".to_string())
        );
        assert_eq!(client.endpoint("  "), None);
    }

    #[test]
    fn http_errors_keep_status_and_body() {
        let error = format_http_error(StatusCode::NOT_FOUND, b" {\"message\":\"Goal not found\"} ");
        assert_eq!(error.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(
            error.to_string(),
            "api_http_404 Not Found:{\"message\":\"Goal not found\"}"
        );

        let empty = format_http_error(StatusCode::BAD_GATEWAY, b"  ");
        assert!(matches!(empty, HttpError::Http { ref body, .. } if body == "<empty>"));
    }

    #[test]
    fn unauthorized_status_is_typed() {
        let error = format_http_error(StatusCode::UNAUTHORIZED, b"expired");
        assert!(matches!(error, HttpError::Unauthorized));
        assert_eq!(error.status(), Some(StatusCode::UNAUTHORIZED));
    }
}
