//! Wire shapes for operation requests and responses.
//!
//! DESIGN
//! ======
//! Requests arrive as JSON objects with `requestType`, `correlationId` and a
//! flat `requestData` map. The request type is kept as a raw string at parse
//! time so unknown types can be dropped without treating the whole message as
//! malformed. Responses carry `responseData` as a string; structured payloads
//! are serialized JSON inside that string.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// CONSTANTS
// =============================================================================

/// `responseData` for a successful authentication.
pub const AUTHENTICATE_SUCCESS: &str = "SUCCESS";

/// `responseData` for a failed authentication.
pub const AUTHENTICATE_FAIL: &str = "FAIL";

/// Separator for the `attributes` field of a `GetClaims` request.
pub const ATTRIBUTE_LIST_SEPARATOR: char = ',';

/// Pattern passed to the backend when listing every role.
pub const ALL_ROLES_PATTERN: &str = "*";

// =============================================================================
// REQUEST
// =============================================================================

/// The four operations the coordinator may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Authenticate,
    GetClaims,
    GetUserRoles,
    GetRoles,
}

impl RequestType {
    /// Map a wire `requestType` to a known operation. Unknown names yield `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Authenticate" | "authenticate" => Some(Self::Authenticate),
            "GetClaims" | "getclaims" => Some(Self::GetClaims),
            "GetUserRoles" | "getuserroles" => Some(Self::GetUserRoles),
            "GetRoles" | "getroles" => Some(Self::GetRoles),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authenticate => "Authenticate",
            Self::GetClaims => "GetClaims",
            Self::GetUserRoles => "GetUserRoles",
            Self::GetRoles => "GetRoles",
        }
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded inbound request. `request_type` is the raw wire value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OperationRequest {
    #[serde(rename = "requestType")]
    pub request_type: String,
    #[serde(rename = "correlationId")]
    pub correlation_id: String,
    #[serde(rename = "requestData", default)]
    pub request_data: Map<String, Value>,
}

impl OperationRequest {
    /// Parse a text frame payload.
    ///
    /// # Errors
    ///
    /// Returns the serde error for malformed JSON or missing envelope fields.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// The recognized operation, or `None` for a type this agent does not serve.
    #[must_use]
    pub fn kind(&self) -> Option<RequestType> {
        RequestType::parse(&self.request_type)
    }

    /// Build the response for this request, echoing its correlation ID.
    #[must_use]
    pub fn respond(&self, response_data: impl Into<String>) -> OperationResponse {
        OperationResponse { correlation_id: self.correlation_id.clone(), response_data: response_data.into() }
    }
}

// =============================================================================
// RESPONSE
// =============================================================================

/// An outbound response, serialized as `{"correlationId", "responseData"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResponse {
    #[serde(rename = "correlationId")]
    pub correlation_id: String,
    #[serde(rename = "responseData")]
    pub response_data: String,
}

impl OperationResponse {
    /// Serialize to the JSON text sent on the wire.
    ///
    /// # Errors
    ///
    /// Serializing two strings cannot fail in practice; the serde error is
    /// propagated rather than hidden.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Payload of `GetUserRoles` and `GetRoles` responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Groups {
    pub groups: Vec<String>,
}

/// Payload of a failure-shaped response when the backend call fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub error: String,
    pub message: String,
}

#[cfg(test)]
#[path = "protocol_test.rs"]
mod tests;
