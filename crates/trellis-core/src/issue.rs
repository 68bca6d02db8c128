use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One validation or lifecycle problem, addressable by a stable code.
///
/// Codes are wire identifiers (`MANIFEST_*`, `APPLY_*`, `MODULE_*`, ...);
/// `path` points at the offending location in whatever document the issue
/// concerns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub code: String,
    pub message: String,
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl Issue {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Issue {
            code: code.into(),
            message: message.into(),
            path: None,
            detail: None,
        }
    }

    pub fn at(code: impl Into<String>, message: impl Into<String>, path: impl Into<String>) -> Self {
        Issue {
            code: code.into(),
            message: message.into(),
            path: Some(path.into()),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}
