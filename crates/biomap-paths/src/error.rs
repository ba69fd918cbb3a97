//! Path finder errors

use biomap_core::{ActionError, ErrorKind, OntologyType, ResourceId};

/// Error from graph construction or path search
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// No resource chain connects the two types within the hop limit
    #[error("no mapping path from '{source_type}' to '{target_type}'")]
    NoPathFound {
        source_type: OntologyType,
        target_type: OntologyType,
    },

    /// Source and target are the same type
    #[error("source and target ontology type are both '{0}'")]
    IdenticalTypes(OntologyType),

    /// A resource id was registered twice
    #[error("duplicate mapping resource: {0}")]
    DuplicateResource(ResourceId),

    /// The resource graph provider failed
    #[error("resource graph provider failed: {0}")]
    Provider(String),
}

impl PathError {
    /// Classification for provenance
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoPathFound { .. } => ErrorKind::NoPathFound,
            Self::IdenticalTypes(_) => ErrorKind::Validation,
            Self::DuplicateResource(_) | Self::Provider(_) => ErrorKind::Execution,
        }
    }
}

impl From<PathError> for ActionError {
    fn from(err: PathError) -> Self {
        match err {
            PathError::IdenticalTypes(_) => ActionError::validation("target_type", err.to_string()),
            other => ActionError::Execution {
                kind: other.kind(),
                message: other.to_string(),
            },
        }
    }
}
