use std::fmt;
use thiserror::Error;

/// A single asset reference that could not be resolved during validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingReference {
    /// Item type of the missing asset, e.g. `group`
    pub item_type: String,
    /// Identifier the reference used (UUID, slug or key)
    pub identifier: String,
    /// Display name carried by the reference, if any
    pub name: Option<String>,
}

impl MissingReference {
    /// Create a new missing reference
    pub fn new(item_type: &str, identifier: impl Into<String>, name: Option<String>) -> Self {
        Self {
            item_type: item_type.to_string(),
            identifier: identifier.into(),
            name,
        }
    }
}

impl fmt::Display for MissingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}[uuid={}, name={}]", self.item_type, self.identifier, name),
            None => write!(f, "{}[{}]", self.item_type, self.identifier),
        }
    }
}

/// The list of references a validation pass could not resolve
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MissingReferences(pub Vec<MissingReference>);

impl MissingReferences {
    /// Whether nothing is missing
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for MissingReferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Core error type for the Palaver runtime
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Static inconsistency in a definition
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// One or more referenced assets could not be found
    #[error("Missing dependencies: {0}")]
    MissingDependencies(MissingReferences),

    /// Malformed JSON or structurally invalid payload
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Structural failure during execution that aborts the current step
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// Asset retrieval failed (transport, non-2xx status or decode failure)
    #[error("Unable to fetch asset {locator}: {reason}")]
    CacheFetchError {
        /// Locator of the asset being fetched
        locator: String,
        /// What went wrong
        reason: String,
    },

    /// Cached payload kind differs from the requested kind
    #[error("Asset cache contains {actual} for {locator}, but {expected} was requested")]
    AssetTypeMismatch {
        /// Locator of the cached asset
        locator: String,
        /// Kind requested by the caller
        expected: String,
        /// Kind actually stored
        actual: String,
    },

    /// Nothing is stored at an asset locator
    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    /// External service failure that could not be expressed as a result
    #[error("Service error: {0}")]
    ServiceError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Operation not valid for the session's current state
    #[error("Session error: {0}")]
    SessionError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// Whether this error should abort the current run step
    pub fn is_hard_failure(&self) -> bool {
        !matches!(
            self,
            CoreError::ValidationError(_) | CoreError::MissingDependencies(_)
        )
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<String> for CoreError {
    fn from(err: String) -> Self {
        CoreError::Other(err)
    }
}

impl From<&str> for CoreError {
    fn from(err: &str) -> Self {
        CoreError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors = vec![
            (CoreError::ValidationError("invalid".to_string()), "Validation error: invalid"),
            (CoreError::ParseError("bad json".to_string()), "Parse error: bad json"),
            (CoreError::ExecutionError("boom".to_string()), "Execution error: boom"),
            (
                CoreError::CacheFetchError {
                    locator: "http://assets/group".to_string(),
                    reason: "status 404".to_string(),
                },
                "Unable to fetch asset http://assets/group: status 404",
            ),
            (
                CoreError::AssetTypeMismatch {
                    locator: "http://assets/group".to_string(),
                    expected: "set of channel".to_string(),
                    actual: "set of group".to_string(),
                },
                "Asset cache contains set of group for http://assets/group, but set of channel was requested",
            ),
            (CoreError::AssetNotFound("group[1]".to_string()), "Asset not found: group[1]"),
            (CoreError::SessionError("not waiting".to_string()), "Session error: not waiting"),
            (CoreError::Other("other_err".to_string()), "other_err"),
        ];

        for (error, expected_msg) in errors {
            assert_eq!(error.to_string(), expected_msg);
        }
    }

    #[test]
    fn test_missing_dependencies_lists_every_reference() {
        let error = CoreError::MissingDependencies(MissingReferences(vec![
            MissingReference::new("group", "b7cf0d83", Some("Testers".to_string())),
            MissingReference::new("resthook", "new-registration", None),
        ]));

        assert_eq!(
            error.to_string(),
            "Missing dependencies: group[uuid=b7cf0d83, name=Testers], resthook[new-registration]"
        );
        assert!(!error.is_hard_failure());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: CoreError = json_error.into();

        match error {
            CoreError::SerializationError(msg) => {
                assert!(msg.contains("expected value"));
            }
            _ => panic!("Expected SerializationError variant"),
        }
    }

    #[test]
    fn test_from_str() {
        let error: CoreError = "test error message".into();
        assert_eq!(error, CoreError::Other("test error message".to_string()));
        assert!(error.is_hard_failure());
    }
}
