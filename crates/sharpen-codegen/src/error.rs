//! Errors raised while emitting a translation unit.

use sharpen_common::{Diagnostic, SourceLocation, UnsupportedConstruct};
use thiserror::Error;

pub type EmitResult<T> = Result<T, EmitError>;

#[derive(Debug, Clone, Error, miette::Diagnostic)]
pub enum EmitError {
    /// No faithful translation exists. Caught at the nearest declaration
    /// boundary; the declaration is skipped.
    #[error("{0}")]
    #[diagnostic(code(sharpen::unsupported))]
    Unsupported(UnsupportedConstruct),

    /// The AST contradicts itself. Fatal for the whole unit.
    #[error("malformed {node_kind} at {location}: {reason}")]
    #[diagnostic(code(sharpen::malformed))]
    Malformed {
        node_kind: String,
        location: SourceLocation,
        reason: String,
    },
}

impl EmitError {
    pub fn unsupported(
        node_kind: impl Into<String>,
        location: &SourceLocation,
        reason: impl Into<String>,
    ) -> Self {
        EmitError::Unsupported(UnsupportedConstruct::new(node_kind, location.clone(), reason))
    }

    pub fn malformed(
        node_kind: impl Into<String>,
        location: &SourceLocation,
        reason: impl Into<String>,
    ) -> Self {
        EmitError::Malformed {
            node_kind: node_kind.into(),
            location: location.clone(),
            reason: reason.into(),
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, EmitError::Unsupported(_))
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            EmitError::Unsupported(marker) => Diagnostic::from(marker.clone()),
            EmitError::Malformed {
                node_kind,
                location,
                reason,
            } => Diagnostic::malformed(format!("malformed {node_kind}: {reason}"), location.clone()),
        }
    }
}
