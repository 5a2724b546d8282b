//! Result of one relay invocation, rendered to HTTP in a single place.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use relay_llm::LlmError;
use serde::Serialize;

pub const METHOD_NOT_ALLOWED: &str = "Method Not Allowed";
pub const PROMPT_REQUIRED: &str = "Prompt is required";
pub const INVALID_JSON: &str = "Invalid JSON body";
pub const BODY_REJECTED: &str = "Request body could not be read";
pub const API_KEY_NOT_CONFIGURED: &str = "API key not configured";
pub const UPSTREAM_FALLBACK: &str = "Error from Claude API";
pub const INTERNAL_SERVER_ERROR: &str = "Internal server error";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Success {
        analysis: String,
    },
    ClientError {
        status: StatusCode,
        message: String,
        details: Option<String>,
    },
    ConfigError {
        message: String,
    },
    UpstreamError {
        status: StatusCode,
        message: String,
    },
    InternalError {
        details: String,
    },
}

#[derive(Debug, Serialize)]
struct AnalysisBody<'a> {
    analysis: &'a str,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

impl RelayOutcome {
    pub fn method_not_allowed() -> Self {
        Self::ClientError {
            status: StatusCode::METHOD_NOT_ALLOWED,
            message: METHOD_NOT_ALLOWED.to_string(),
            details: None,
        }
    }

    pub fn prompt_required() -> Self {
        Self::ClientError {
            status: StatusCode::BAD_REQUEST,
            message: PROMPT_REQUIRED.to_string(),
            details: None,
        }
    }

    pub fn invalid_json(e: &serde_json::Error) -> Self {
        Self::ClientError {
            status: StatusCode::BAD_REQUEST,
            message: INVALID_JSON.to_string(),
            details: Some(e.to_string()),
        }
    }

    /// Body could not be buffered (too large, aborted stream).
    pub fn body_rejected(status: StatusCode, details: String) -> Self {
        Self::ClientError {
            status,
            message: BODY_REJECTED.to_string(),
            details: Some(details),
        }
    }

    pub fn api_key_not_configured() -> Self {
        Self::ConfigError {
            message: API_KEY_NOT_CONFIGURED.to_string(),
        }
    }

    /// Maps a failed upstream call. Non-2xx answers keep the upstream status.
    pub fn from_llm_error(e: LlmError) -> Self {
        match e {
            LlmError::Upstream {
                status,
                message,
                payload,
            } => {
                tracing::error!(status, payload = %payload, "anthropic api error");
                Self::UpstreamError {
                    status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                    message: message.unwrap_or_else(|| UPSTREAM_FALLBACK.to_string()),
                }
            }
            other => {
                tracing::error!(error = %other, "relay invocation failed");
                Self::InternalError {
                    details: other.to_string(),
                }
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Success { .. } => StatusCode::OK,
            Self::ClientError { status, .. } | Self::UpstreamError { status, .. } => *status,
            Self::ConfigError { .. } | Self::InternalError { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for RelayOutcome {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Success { analysis } => (
                status,
                Json(AnalysisBody {
                    analysis: analysis.as_str(),
                }),
            )
                .into_response(),
            Self::ClientError {
                message, details, ..
            } => (
                status,
                Json(ErrorBody {
                    error: message.as_str(),
                    details: details.as_deref(),
                }),
            )
                .into_response(),
            Self::ConfigError { message } | Self::UpstreamError { message, .. } => (
                status,
                Json(ErrorBody {
                    error: message.as_str(),
                    details: None,
                }),
            )
                .into_response(),
            Self::InternalError { details } => (
                status,
                Json(ErrorBody {
                    error: INTERNAL_SERVER_ERROR,
                    details: Some(details.as_str()),
                }),
            )
                .into_response(),
        }
    }
}
