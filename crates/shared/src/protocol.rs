use serde::{Deserialize, Serialize};

/// Body of `PATCH /api/files/{id}`. The stage arrives as a raw string so a
/// missing or unrecognized value surfaces as a validation error with the
/// standard error body instead of a framework deserialization rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateFileRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl UpdateFileRequest {
    pub fn stage(stage: impl Into<String>) -> Self {
        Self {
            stage: Some(stage.into()),
            details: None,
        }
    }
}

/// JSON error body returned by every failing endpoint: `{"error": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
