mod location;
mod diagnostic;

pub use location::{SourceLocation, Spanned};
pub use diagnostic::{Diagnostic, DiagnosticKind, DiagnosticLevel, UnsupportedConstruct};
