use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::StatusCode;

use crate::http::HttpError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    Unauthorized,
    NotFound,
    Rejected,
    Server,
    Timeout,
    Transport,
    InvalidResponse,
    InvalidRequest,
}

impl ServiceErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not_found",
            Self::Rejected => "rejected",
            Self::Server => "server",
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::InvalidResponse => "invalid_response",
            Self::InvalidRequest => "invalid_request",
        }
    }

    fn from_cause(cause: &HttpError) -> Self {
        match cause {
            HttpError::Unauthorized => Self::Unauthorized,
            HttpError::Http { status, .. } if *status == StatusCode::NOT_FOUND => Self::NotFound,
            HttpError::Http { status, .. } if status.is_client_error() => Self::Rejected,
            HttpError::Http { .. } => Self::Server,
            HttpError::Timeout { .. } => Self::Timeout,
            HttpError::Request { .. } | HttpError::Read { .. } => Self::Transport,
            HttpError::Decode { .. } => Self::InvalidResponse,
            HttpError::Build { .. } | HttpError::InvalidPath => Self::InvalidRequest,
        }
    }
}

/// Failure of one service operation.
///
/// `message` is fixed per operation and safe to show to users; `cause` keeps the
/// transport detail for logs.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ServiceError {
    kind: ServiceErrorKind,
    message: &'static str,
    #[source]
    cause: HttpError,
    session_observed: AtomicBool,
}

impl ServiceError {
    pub fn new(message: &'static str, cause: HttpError) -> Self {
        Self {
            kind: ServiceErrorKind::from_cause(&cause),
            message,
            cause,
            session_observed: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> ServiceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &'static str {
        self.message
    }

    pub fn cause(&self) -> &HttpError {
        &self.cause
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.cause.status()
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind == ServiceErrorKind::Unauthorized
    }

    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|status| status.is_client_error())
    }

    /// Marks the error as seen by the session policy; `true` only the first time.
    pub(crate) fn claim_session_observation(&self) -> bool {
        !self.session_observed.swap(true, Ordering::AcqRel)
    }
}

pub(crate) trait ServiceResultExt<T> {
    fn or_service_error(self, message: &'static str) -> Result<T, ServiceError>;
}

impl<T> ServiceResultExt<T> for Result<T, HttpError> {
    fn or_service_error(self, message: &'static str) -> Result<T, ServiceError> {
        self.map_err(|cause| {
            tracing::warn!(
                target: "escola.client",
                operation_message = message,
                error = %cause,
                "service call failed",
            );
            ServiceError::new(message, cause)
        })
    }
}
