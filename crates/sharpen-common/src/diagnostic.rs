//! Diagnostic reporting for the emitter.
//!
//! Every construct the generator refuses to translate, and every layout it
//! can only approximate, ends up here as a [`Diagnostic`]. The CLI renders
//! them through miette.

use crate::location::SourceLocation;
use miette::Diagnostic as MietteDiagnostic;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Info,
}

/// What went wrong, independent of the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Construct with no faithful translation; the declaration was skipped.
    Unsupported,
    /// Layout the target cannot express exactly; emitted best-effort.
    AmbiguousLayout,
    /// Input violates the AST's own invariants.
    Malformed,
    Other,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticKind::Unsupported => "unsupported",
            DiagnosticKind::AmbiguousLayout => "ambiguous-layout",
            DiagnosticKind::Malformed => "malformed",
            DiagnosticKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// Marker recorded for every native construct that could not be emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedConstruct {
    pub node_kind: String,
    pub location: SourceLocation,
    pub reason: String,
}

impl UnsupportedConstruct {
    pub fn new(
        node_kind: impl Into<String>,
        location: SourceLocation,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            node_kind: node_kind.into(),
            location,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for UnsupportedConstruct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unsupported {} at {}: {}",
            self.node_kind, self.location, self.reason
        )
    }
}

#[derive(Debug, Clone, Error, MietteDiagnostic)]
#[error("{message}")]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub kind: DiagnosticKind,
    pub message: String,
    pub location: Option<SourceLocation>,
    #[help]
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            kind: DiagnosticKind::Other,
            message: message.into(),
            location: None,
            help: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            kind: DiagnosticKind::Other,
            message: message.into(),
            location: None,
            help: None,
        }
    }

    pub fn ambiguous_layout(message: impl Into<String>, location: SourceLocation) -> Self {
        Self::warning(message)
            .with_kind(DiagnosticKind::AmbiguousLayout)
            .with_location(location)
    }

    pub fn malformed(message: impl Into<String>, location: SourceLocation) -> Self {
        Self::error(message)
            .with_kind(DiagnosticKind::Malformed)
            .with_location(location)
    }

    pub fn with_kind(mut self, kind: DiagnosticKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagnosticLevel::Error
    }
}

impl From<UnsupportedConstruct> for Diagnostic {
    fn from(marker: UnsupportedConstruct) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            kind: DiagnosticKind::Unsupported,
            message: format!("unsupported {}: {}", marker.node_kind, marker.reason),
            location: Some(marker.location),
            help: Some("the enclosing declaration was skipped".to_string()),
        }
    }
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticLevel::Error => "error",
            DiagnosticLevel::Warning => "warning",
            DiagnosticLevel::Info => "info",
        };
        f.write_str(s)
    }
}
