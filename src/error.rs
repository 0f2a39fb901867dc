//! Playground error taxonomy.
//!
//! Every core operation returns [`PlaygroundError`]. Capacity exhaustion and
//! session completion are distinct variants produced where they originate,
//! so callers classify outcomes with the predicates below instead of
//! inspecting messages.

use crate::runtime::RuntimeError;
use crate::storage::StorageError;
use crate::types::InstanceKind;
use std::fmt;

/// Which record a lookup failed to find.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFoundKind {
    Playground(String),
    Session(String),
    Instance(String),
}

impl fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundKind::Playground(id) => write!(f, "playground {}", id),
            NotFoundKind::Session(id) => write!(f, "session {}", id),
            NotFoundKind::Instance(name) => write!(f, "instance {}", name),
        }
    }
}

/// Errors surfaced by the orchestrator and provisioners.
#[derive(Debug, thiserror::Error)]
pub enum PlaygroundError {
    /// No backend connection or pool slot available; retry-worthy
    #[error("Out of capacity")]
    CapacityExhausted,

    /// Session is closed or closing
    #[error("Session {session_id} is already complete")]
    SessionComplete { session_id: String },

    /// Instance type not permitted by playground policy
    #[error("Instance type {kind} is not allowed in playground {playground_id}")]
    PolicyDenied {
        playground_id: String,
        kind: InstanceKind,
    },

    /// Referenced record does not exist
    #[error("Not found: {0}")]
    NotFound(NotFoundKind),

    /// Container runtime failure
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Provisioning produced an unusable result
    #[error("Provisioning error: {0}")]
    Provisioning(String),
}

impl PlaygroundError {
    /// Whether the request failed for lack of backend capacity.
    pub fn is_out_of_capacity(&self) -> bool {
        matches!(self, PlaygroundError::CapacityExhausted)
    }

    /// Whether the request raced a session close.
    pub fn is_session_complete(&self) -> bool {
        matches!(self, PlaygroundError::SessionComplete { .. })
    }

    /// Whether the failure is an unclassified infrastructure error.
    pub fn is_generic(&self) -> bool {
        matches!(
            self,
            PlaygroundError::Runtime(_)
                | PlaygroundError::Storage(_)
                | PlaygroundError::Provisioning(_)
        )
    }

    pub(crate) fn session_complete(session_id: &str) -> Self {
        PlaygroundError::SessionComplete {
            session_id: session_id.to_string(),
        }
    }

    /// Map a storage lookup miss to [`PlaygroundError::NotFound`].
    pub(crate) fn from_lookup(err: StorageError, kind: NotFoundKind) -> Self {
        if err.is_not_found() {
            PlaygroundError::NotFound(kind)
        } else {
            PlaygroundError::Storage(err)
        }
    }
}

/// Result type for playground operations.
pub type Result<T> = std::result::Result<T, PlaygroundError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifier_predicates_are_exclusive() {
        let capacity = PlaygroundError::CapacityExhausted;
        assert!(capacity.is_out_of_capacity());
        assert!(!capacity.is_session_complete());
        assert!(!capacity.is_generic());

        let complete = PlaygroundError::session_complete("aaaabbbbcccc");
        assert!(complete.is_session_complete());
        assert!(!complete.is_out_of_capacity());
        assert!(!complete.is_generic());

        let generic = PlaygroundError::Runtime(RuntimeError::Other("Out of capacity".to_string()));
        assert!(generic.is_generic());
        assert!(!generic.is_out_of_capacity());
        assert!(!generic.is_session_complete());

        let denied = PlaygroundError::PolicyDenied {
            playground_id: "foobar".to_string(),
            kind: InstanceKind::Windows,
        };
        assert!(!denied.is_generic());
        assert_eq!(
            denied.to_string(),
            "Instance type windows is not allowed in playground foobar"
        );
    }

    #[test]
    fn test_from_lookup() {
        let missing = StorageError::NotFound {
            kind: "playground",
            id: "foobar".to_string(),
        };
        assert!(matches!(
            PlaygroundError::from_lookup(missing, NotFoundKind::Playground("foobar".into())),
            PlaygroundError::NotFound(NotFoundKind::Playground(_))
        ));

        let io = StorageError::Io(std::io::Error::other("disk gone"));
        assert!(PlaygroundError::from_lookup(io, NotFoundKind::Session("s".into())).is_generic());
    }
}
