//! Mutable state threaded through one translation unit's traversal.

use crate::output::Usings;
use sharpen_clang::{DeclId, TypeId};
use sharpen_common::Diagnostic;

/// State restored when a declaration is skipped, so a failed declaration
/// leaves no imports or diagnostics of its own behind.
pub struct Checkpoint {
    usings: Usings,
    diagnostics: usize,
    unsafe_depth: usize,
}

#[derive(Default)]
pub struct EmissionContext {
    usings: Usings,
    diagnostics: Vec<Diagnostic>,
    records: Vec<DeclId>,
    return_types: Vec<TypeId>,
    unsafe_scopes: Vec<bool>,
}

impl EmissionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_using(&mut self, namespace: &str) {
        if !self.usings.contains(namespace) {
            self.usings.add(namespace);
        }
    }

    pub fn add_static_using(&mut self, type_name: String) {
        self.usings.add_static(type_name);
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn push_record(&mut self, record: DeclId) {
        self.records.push(record);
    }

    pub fn pop_record(&mut self) {
        self.records.pop();
    }

    /// Innermost record being emitted.
    pub fn current_record(&self) -> Option<DeclId> {
        self.records.last().copied()
    }

    pub fn push_function(&mut self, return_type: TypeId) {
        self.return_types.push(return_type);
    }

    pub fn pop_function(&mut self) {
        self.return_types.pop();
    }

    pub fn return_type(&self) -> Option<TypeId> {
        self.return_types.last().copied()
    }

    /// Start tracking whether the declaration being emitted needs `unsafe`.
    pub fn begin_unsafe_scope(&mut self) {
        self.unsafe_scopes.push(false);
    }

    pub fn mark_unsafe(&mut self) {
        if let Some(scope) = self.unsafe_scopes.last_mut() {
            *scope = true;
        }
    }

    pub fn end_unsafe_scope(&mut self) -> bool {
        self.unsafe_scopes.pop().unwrap_or(false)
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            usings: self.usings.clone(),
            diagnostics: self.diagnostics.len(),
            unsafe_depth: self.unsafe_scopes.len(),
        }
    }

    /// Undo everything recorded since `checkpoint`, including scopes the
    /// failed declaration left open.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.usings = checkpoint.usings;
        self.diagnostics.truncate(checkpoint.diagnostics);
        self.unsafe_scopes.truncate(checkpoint.unsafe_depth);
    }

    /// Drop record and function scopes above the given depths after an
    /// early return.
    pub fn unwind(&mut self, records: usize, functions: usize) {
        self.records.truncate(records);
        self.return_types.truncate(functions);
    }

    pub fn depths(&self) -> (usize, usize) {
        (self.records.len(), self.return_types.len())
    }

    pub fn finish(self) -> (Usings, Vec<Diagnostic>) {
        (self.usings, self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollback_discards_usings_and_scopes() {
        let mut ctx = EmissionContext::new();
        ctx.add_using("System");
        let checkpoint = ctx.checkpoint();
        ctx.add_using("System.Runtime.InteropServices");
        ctx.begin_unsafe_scope();
        ctx.report(Diagnostic::warning("dropped"));
        ctx.rollback(checkpoint);
        let (usings, diagnostics) = ctx.finish();
        assert!(usings.contains("System"));
        assert!(!usings.contains("System.Runtime.InteropServices"));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_unsafe_scopes_nest() {
        let mut ctx = EmissionContext::new();
        ctx.begin_unsafe_scope();
        ctx.begin_unsafe_scope();
        ctx.mark_unsafe();
        assert!(ctx.end_unsafe_scope());
        assert!(!ctx.end_unsafe_scope());
    }
}
