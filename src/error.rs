//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Catalog problems. These are deployment bugs, never caused by request content.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("no capability config for resource '{resource}' (tried {referrers:?} and 'default')")]
    MissingCapability { resource: String, referrers: Vec<String> },
    #[error("unknown resource type: {0}")]
    UnknownResource(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// What went wrong with one part of a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestErrorKind {
    #[error("unknown query parameter")]
    UnknownParameter,
    #[error("value must be a string or an array of strings")]
    InvalidValueType,
    #[error("value must be a single string")]
    SingleValueRequired,
    #[error("parameter given more than once")]
    DuplicateParameter,
    #[error("operator '{0}' is not supported for this parameter")]
    UnsupportedOperator(String),
    #[error("invalid value '{0}'")]
    InvalidFilterValue(String),
    #[error("could not parse list '{0}'")]
    UnparsableList(String),
    #[error("list contains invalid values")]
    InvalidListValues,
    #[error("invalid ISO-8601 date '{0}'")]
    InvalidDate(String),
    #[error("'{prefix}' expects {expected} date(s) separated by '|'")]
    InvalidDateArity { prefix: String, expected: usize },
    #[error("limit must be an integer between 1 and {max}")]
    InvalidLimit { max: u32 },
    #[error("offset must be a non-negative integer")]
    InvalidOffset,
    #[error("order must be '<field> asc|desc'")]
    InvalidOrderFormat,
    #[error("order direction must be 'asc' or 'desc'")]
    InvalidOrderDirection,
    #[error("ordering by '{0}' is not allowed")]
    UnknownOrderField(String),
    #[error("at most {max} order fields are allowed")]
    TooManyOrderFields { max: usize },
    #[error("unknown field or relation '{0}'")]
    UnknownField(String),
    #[error("'{0}' may only be the first entry")]
    MisplacedSentinel(String),
    #[error("relations may not be nested deeper than {max} levels")]
    DepthExceeded { max: usize },
    #[error("a relation parameter must name a nested key")]
    RelationKeyRequired,
}

/// A user-facing problem, located by its dotted trace (e.g. `cabin.facilities.name`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{trace}: {kind}")]
pub struct RequestError {
    pub trace: String,
    pub kind: RequestErrorKind,
}

impl RequestError {
    pub fn new(trace: impl Into<String>, kind: RequestErrorKind) -> Self {
        RequestError {
            trace: trace.into(),
            kind,
        }
    }
}

impl Serialize for RequestError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid request: {} problem(s)", .0.len())]
    InvalidRequest(Vec<RequestError>),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        };
        let details = match &self {
            AppError::InvalidRequest(errors) => serde_json::to_value(errors).ok(),
            _ => None,
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}
