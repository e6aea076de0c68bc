use thiserror::Error;
use trellis_core_types::SessionId;

/// Result type alias using TrellisError
pub type Result<T> = std::result::Result<T, TrellisError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that can be used for programmatic
/// error handling, testing and log assertions. Absent entities are not an
/// error kind: stale references resolve to neutral results instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Input
    InvalidInput,
    NotFound,

    // Lifecycle
    /// Operating on a disposed tracker or a finished session
    InvalidState,

    // Deletion
    /// An on-delete `Fail` rule blocked a deletion
    ConstraintViolation,

    // Commit
    Concurrency,

    // User logic
    /// Failure raised by a destructor hook or other user-supplied code
    Domain,

    // Integration
    Config,
    Serialization,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::InvalidState => "ERR_INVALID_STATE",
            ExErrorKind::ConstraintViolation => "ERR_CONSTRAINT_VIOLATION",
            ExErrorKind::Concurrency => "ERR_CONCURRENCY",
            ExErrorKind::Domain => "ERR_DOMAIN",
            ExErrorKind::Config => "ERR_CONFIG",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Carries a classification kind for programmatic handling plus optional
/// context used by the logging facility.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity: Option<String>,
    link_name: Option<String>,
    session_id: Option<SessionId>,
    message: String,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity: None,
            link_name: None,
            session_id: None,
            message: String::new(),
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity context
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Add link name context
    pub fn with_link_name(mut self, link_name: impl Into<String>) -> Self {
        self.link_name = Some(link_name.into());
        self
    }

    /// Add session context
    pub fn with_session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the entity context, if any
    pub fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    /// Get the link name context, if any
    pub fn link_name(&self) -> Option<&str> {
        self.link_name.as_deref()
    }

    /// Get the session context, if any
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity) = &self.entity {
            write!(f, " (entity: {})", entity)?;
        }
        if let Some(link_name) = &self.link_name {
            write!(f, " (link: {})", link_name)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {}

// ========== End Error Facility ==========

/// Error taxonomy for trellis operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrellisError {
    // ===== Lifecycle Errors =====
    /// The changes tracker was already disposed (session committed or aborted)
    #[error("Cannot {op}: changes tracker is already disposed")]
    TrackerDisposed { op: String },

    /// The session is no longer active
    #[error("Session {session_id} is not active")]
    SessionNotActive { session_id: String },

    // ===== Deletion Errors =====
    /// An on-delete `Fail` policy rejected the deletion
    #[error("Cannot delete {entity}: link '{link_name}' still references {linked:?}")]
    ConstraintViolation {
        entity: String,
        link_name: String,
        linked: Vec<String>,
    },

    // ===== Store Errors =====
    /// Entity is not present in the persistent store
    #[error("Entity not found: {entity}")]
    EntityNotFound { entity: String },

    /// Another session committed a newer version of the entity first
    #[error("Commit conflict on {entity}: expected version {expected_version}, found {actual_version}")]
    CommitConflict {
        entity: String,
        expected_version: i64,
        actual_version: i64,
    },

    // ===== Input Errors =====
    /// Link is not declared on the entity type's metadata
    #[error("Unknown link '{link_name}' on {entity_type}")]
    UnknownLink {
        entity_type: String,
        link_name: String,
    },

    /// Invalid argument to a mutation
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    // ===== User Logic =====
    /// Error raised by a destructor hook or other user-supplied logic
    #[error("{message}")]
    Domain { message: String },

    // ===== Generic Errors =====
    /// Configuration could not be read or parsed
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Serialization error (JSON encoding/decoding)
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl TrellisError {
    /// Convenience constructor for failures raised from user hooks
    pub fn domain(message: impl Into<String>) -> Self {
        TrellisError::Domain {
            message: message.into(),
        }
    }
}

impl From<TrellisError> for ExError {
    fn from(err: TrellisError) -> Self {
        match err {
            TrellisError::TrackerDisposed { op } => ExError::new(ExErrorKind::InvalidState)
                .with_op(op)
                .with_message("Changes tracker is already disposed"),

            TrellisError::SessionNotActive { session_id } => {
                ExError::new(ExErrorKind::InvalidState)
                    .with_message(format!("Session {} is not active", session_id))
            }

            TrellisError::ConstraintViolation {
                entity,
                link_name,
                linked,
            } => ExError::new(ExErrorKind::ConstraintViolation)
                .with_entity(entity)
                .with_link_name(link_name)
                .with_message(format!("Still referenced by {:?}", linked)),

            TrellisError::EntityNotFound { entity } => ExError::new(ExErrorKind::NotFound)
                .with_entity(entity)
                .with_message("Entity not found"),

            TrellisError::CommitConflict {
                entity,
                expected_version,
                actual_version,
            } => ExError::new(ExErrorKind::Concurrency)
                .with_op("commit")
                .with_entity(entity)
                .with_message(format!(
                    "Expected version {}, found {}",
                    expected_version, actual_version
                )),

            TrellisError::UnknownLink {
                entity_type,
                link_name,
            } => ExError::new(ExErrorKind::InvalidInput)
                .with_link_name(link_name)
                .with_message(format!("Link is not declared on {}", entity_type)),

            TrellisError::InvalidInput { reason } => {
                ExError::new(ExErrorKind::InvalidInput).with_message(reason)
            }

            TrellisError::Domain { message } => {
                ExError::new(ExErrorKind::Domain).with_message(message)
            }

            TrellisError::Config { message } => {
                ExError::new(ExErrorKind::Config).with_message(message)
            }

            TrellisError::Serialization { message } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }

            TrellisError::Internal { message } => {
                ExError::new(ExErrorKind::Internal).with_message(message)
            }
        }
    }
}

/// Conversion from serde_json::Error to TrellisError
impl From<serde_json::Error> for TrellisError {
    fn from(err: serde_json::Error) -> Self {
        TrellisError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Conversion from toml::de::Error to TrellisError
impl From<toml::de::Error> for TrellisError {
    fn from(err: toml::de::Error) -> Self {
        TrellisError::Config {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_codes() {
        let cases = [
            (ExErrorKind::InvalidState, "ERR_INVALID_STATE"),
            (ExErrorKind::ConstraintViolation, "ERR_CONSTRAINT_VIOLATION"),
            (ExErrorKind::Concurrency, "ERR_CONCURRENCY"),
            (ExErrorKind::Domain, "ERR_DOMAIN"),
            (ExErrorKind::NotFound, "ERR_NOT_FOUND"),
        ];
        for (kind, expected_code) in cases {
            assert_eq!(kind.code(), expected_code, "Wrong code for {:?}", kind);
        }
    }

    #[test]
    fn test_tracker_disposed_maps_to_invalid_state() {
        let err: ExError = TrellisError::TrackerDisposed {
            op: "get_snapshot".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ExErrorKind::InvalidState);
        assert_eq!(err.op(), Some("get_snapshot"));
    }

    #[test]
    fn test_constraint_violation_carries_link_context() {
        let err: ExError = TrellisError::ConstraintViolation {
            entity: "User[1]".to_string(),
            link_name: "assignee".to_string(),
            linked: vec!["Issue[4]".to_string()],
        }
        .into();
        assert_eq!(err.code(), "ERR_CONSTRAINT_VIOLATION");
        assert_eq!(err.entity(), Some("User[1]"));
        assert_eq!(err.link_name(), Some("assignee"));
        assert!(err.to_string().contains("ERR_CONSTRAINT_VIOLATION"));
    }

    #[test]
    fn test_domain_error_message_is_unmodified() {
        let err = TrellisError::domain("refused by hook");
        assert_eq!(err.to_string(), "refused by hook");
    }
}
