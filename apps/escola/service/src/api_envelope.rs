use std::collections::HashMap;

use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;

pub type ApiErrorTuple = (StatusCode, Json<ApiErrorResponse>);

pub const MISSING_REQUIRED_FIELDS_MESSAGE: &str = "Missing required fields";
pub const GOAL_NOT_FOUND_MESSAGE: &str = "Goal not found";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCode {
    InvalidRequest,
    NotFound,
    InternalError,
}

impl ApiErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::NotFound => "not_found",
            Self::InternalError => "internal_error",
        }
    }

    pub const fn default_status(self) -> StatusCode {
        match self {
            Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub message: String,
    pub error: ApiErrorDetail,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<HashMap<String, Vec<String>>>,
}

pub fn error_response(code: ApiErrorCode, message: impl Into<String>) -> ApiErrorTuple {
    error_response_with_fields(code, message, None)
}

pub fn error_response_with_fields(
    code: ApiErrorCode,
    message: impl Into<String>,
    errors: Option<HashMap<String, Vec<String>>>,
) -> ApiErrorTuple {
    let message = message.into();
    (
        code.default_status(),
        Json(ApiErrorResponse {
            message: message.clone(),
            error: ApiErrorDetail {
                code: code.as_str(),
                message,
            },
            errors,
        }),
    )
}

/// 400 naming every missing field under `errors`, with a field-agnostic top-level message.
pub fn missing_fields_error(fields: &[&'static str]) -> ApiErrorTuple {
    let errors = fields
        .iter()
        .map(|field| ((*field).to_string(), vec!["This field is required.".to_string()]))
        .collect::<HashMap<_, _>>();

    error_response_with_fields(
        ApiErrorCode::InvalidRequest,
        MISSING_REQUIRED_FIELDS_MESSAGE,
        Some(errors),
    )
}

pub fn invalid_body_error(message: impl Into<String>) -> ApiErrorTuple {
    error_response(ApiErrorCode::InvalidRequest, message)
}

pub fn not_found_error(message: impl Into<String>) -> ApiErrorTuple {
    error_response(ApiErrorCode::NotFound, message)
}

pub fn internal_error() -> ApiErrorTuple {
    error_response(ApiErrorCode::InternalError, INTERNAL_ERROR_MESSAGE)
}
