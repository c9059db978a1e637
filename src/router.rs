//! Operation router. Text request in, backend call, correlated response out.
//!
//! DESIGN
//! ======
//! Parsing is split from execution: [`Operation::parse`] validates the
//! request fields, [`Router::execute`] talks to the backend. Routing is
//! fail-closed per message:
//! - malformed payloads → [`RouteError::MalformedRequest`], no response
//! - unknown `requestType` → `Ok(None)`, no response
//! - backend failure → failure-shaped response carrying the correlation ID
//!
//! Every recognized, well-formed request yields exactly one response.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::ErrorCode;
use crate::protocol::{
    ALL_ROLES_PATTERN, ATTRIBUTE_LIST_SEPARATOR, AUTHENTICATE_FAIL, AUTHENTICATE_SUCCESS, Failure, Groups,
    OperationRequest, OperationResponse, RequestType,
};
use crate::store::{UserStore, UserStoreError};

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// The payload is not a valid request, or a required field is missing.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The response payload could not be serialized.
    #[error("response serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ErrorCode for RouteError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::MalformedRequest(_) => "E_MALFORMED_REQUEST",
            Self::Serialize(_) => "E_SERIALIZE",
        }
    }
}

// =============================================================================
// OPERATION
// =============================================================================

/// A validated operation, ready to run against the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Authenticate { username: String, password: String },
    GetClaims { username: String, attributes: Vec<String> },
    GetUserRoles { username: String },
    GetRoles { limit: usize },
}

impl Operation {
    /// Validate `requestData` for the given request type.
    ///
    /// # Errors
    ///
    /// [`RouteError::MalformedRequest`] for missing or mistyped fields and a
    /// non-numeric `limit`.
    pub fn parse(kind: RequestType, data: &Map<String, Value>, default_limit: usize) -> Result<Self, RouteError> {
        match kind {
            RequestType::Authenticate => Ok(Self::Authenticate {
                username: required_str(data, "username")?.to_owned(),
                password: required_str(data, "password")?.to_owned(),
            }),
            RequestType::GetClaims => Ok(Self::GetClaims {
                username: required_str(data, "username")?.to_owned(),
                attributes: split_attributes(required_str(data, "attributes")?),
            }),
            RequestType::GetUserRoles => Ok(Self::GetUserRoles { username: required_str(data, "username")?.to_owned() }),
            RequestType::GetRoles => Ok(Self::GetRoles { limit: parse_limit(data.get("limit"), default_limit)? }),
        }
    }
}

fn required_str<'a>(data: &'a Map<String, Value>, key: &str) -> Result<&'a str, RouteError> {
    match data.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(RouteError::MalformedRequest(format!("field `{key}` must be a string, got {other}"))),
        None => Err(RouteError::MalformedRequest(format!("missing field `{key}`"))),
    }
}

fn split_attributes(raw: &str) -> Vec<String> {
    raw.split(ATTRIBUTE_LIST_SEPARATOR)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn parse_limit(raw: Option<&Value>, default_limit: usize) -> Result<usize, RouteError> {
    match raw {
        None | Some(Value::Null) => Ok(default_limit),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(default_limit),
        Some(Value::String(s)) => s
            .trim()
            .parse::<usize>()
            .map_err(|_| RouteError::MalformedRequest(format!("limit is not a non-negative integer: {s}"))),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| RouteError::MalformedRequest(format!("limit is not a non-negative integer: {n}"))),
        Some(other) => Err(RouteError::MalformedRequest(format!("limit must be a string or number, got {other}"))),
    }
}

// =============================================================================
// ROUTER
// =============================================================================

/// Dispatches requests to an injected user-store backend.
#[derive(Clone)]
pub struct Router {
    store: Arc<dyn UserStore>,
    role_list_limit: usize,
}

impl Router {
    /// `role_list_limit` is the `GetRoles` limit used when the request leaves it blank.
    #[must_use]
    pub fn new(store: Arc<dyn UserStore>, role_list_limit: usize) -> Self {
        Self { store, role_list_limit }
    }

    /// Handle one text payload. `Ok(None)` means nothing is sent back.
    ///
    /// # Errors
    ///
    /// [`RouteError::MalformedRequest`] when the payload cannot be parsed or
    /// validated. The caller logs it and keeps the connection.
    pub async fn route(&self, text: &str) -> Result<Option<OperationResponse>, RouteError> {
        let request = OperationRequest::from_json(text).map_err(|e| RouteError::MalformedRequest(e.to_string()))?;

        let Some(kind) = request.kind() else {
            debug!(
                correlation_id = %request.correlation_id,
                request_type = %request.request_type,
                "router: unrecognized request type dropped"
            );
            return Ok(None);
        };

        let operation = Operation::parse(kind, &request.request_data, self.role_list_limit)?;
        let response_data = match self.execute(&operation).await {
            Ok(data) => data,
            Err(e) => {
                warn!(
                    correlation_id = %request.correlation_id,
                    request_type = %kind,
                    error = %e,
                    code = e.error_code(),
                    "router: backend call failed"
                );
                failure_data(kind, &e)?
            }
        };

        info!(correlation_id = %request.correlation_id, request_type = %kind, "router: request handled");
        Ok(Some(request.respond(response_data)))
    }

    /// Run a validated operation and build its `responseData`.
    ///
    /// # Errors
    ///
    /// The backend error, unchanged.
    pub async fn execute(&self, operation: &Operation) -> Result<String, UserStoreError> {
        match operation {
            Operation::Authenticate { username, password } => {
                let marker = if self.store.authenticate(username, password).await? {
                    AUTHENTICATE_SUCCESS
                } else {
                    AUTHENTICATE_FAIL
                };
                Ok(marker.to_owned())
            }
            Operation::GetClaims { username, attributes } => {
                let values = self.store.user_attributes(username, attributes).await?;
                debug!(requested = attributes.len(), found = values.len(), "router: claims resolved");
                to_json(&values)
            }
            Operation::GetUserRoles { username } => {
                let groups = self.store.user_roles(username).await?;
                to_json(&Groups { groups })
            }
            Operation::GetRoles { limit } => {
                let groups = self.store.roles(ALL_ROLES_PATTERN, *limit).await?;
                to_json(&Groups { groups })
            }
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, UserStoreError> {
    serde_json::to_string(value).map_err(|e| UserStoreError::Unavailable(format!("unserializable result: {e}")))
}

/// `responseData` sent when the backend fails. Authentication fails closed.
fn failure_data(kind: RequestType, err: &UserStoreError) -> Result<String, RouteError> {
    if kind == RequestType::Authenticate {
        return Ok(AUTHENTICATE_FAIL.to_owned());
    }
    let failure = Failure { error: err.error_code().to_owned(), message: err.to_string() };
    Ok(serde_json::to_string(&failure)?)
}

#[cfg(test)]
#[path = "router_test.rs"]
mod tests;
