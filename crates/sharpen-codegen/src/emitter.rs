//! The per-unit emitter shared by the expression, statement and
//! declaration passes.
//!
//! Each pass lives in its own module as an `impl Emitter` block.

use crate::context::EmissionContext;
use crate::error::{EmitError, EmitResult};
use crate::names::string_literal;
use crate::symbols::SymbolTable;
use crate::type_map::{MappedType, TypeMapper, Usage};
use sharpen_build::GeneratorConfig;
use sharpen_clang::{Decl, DeclId, DeclKind, TranslationUnit, TypeId, TypeKind};
use sharpen_common::{Diagnostic, SourceLocation};
use tracing::warn;

pub(crate) const USING_SYSTEM: &str = "System";
pub(crate) const USING_CODE_ANALYSIS: &str = "System.Diagnostics.CodeAnalysis";
pub(crate) const USING_COMPILER_SERVICES: &str = "System.Runtime.CompilerServices";
pub(crate) const USING_INTEROP: &str = "System.Runtime.InteropServices";

pub(crate) struct Emitter<'a> {
    pub(crate) unit: &'a TranslationUnit,
    pub(crate) config: &'a GeneratorConfig,
    pub(crate) symbols: &'a SymbolTable,
    pub(crate) types: TypeMapper<'a>,
    pub(crate) ctx: EmissionContext,
}

impl<'a> Emitter<'a> {
    pub(crate) fn new(
        unit: &'a TranslationUnit,
        config: &'a GeneratorConfig,
        symbols: &'a SymbolTable,
    ) -> Self {
        Self {
            unit,
            config,
            symbols,
            types: TypeMapper::new(unit, symbols),
            ctx: EmissionContext::new(),
        }
    }

    pub(crate) fn decl(&self, id: DeclId) -> &'a Decl {
        self.unit.decl(id)
    }

    /// C# name of a declaration.
    pub(crate) fn name(&self, id: DeclId) -> &'a str {
        let symbols: &'a SymbolTable = self.symbols;
        symbols.name(id)
    }

    /// Map a type from the current record scope, marking the enclosing
    /// declaration unsafe when the result needs it.
    pub(crate) fn map(
        &mut self,
        ty: TypeId,
        usage: Usage,
        location: &SourceLocation,
    ) -> EmitResult<MappedType> {
        let mapped = self
            .types
            .map(ty, usage, self.ctx.current_record(), location)?;
        if mapped.needs_unsafe {
            self.ctx.mark_unsafe();
        }
        Ok(mapped)
    }

    /// Run `emit` for one declaration. An unsupported construct anywhere
    /// inside skips the declaration: its side effects are rolled back and a
    /// diagnostic is recorded. Malformed input still aborts.
    pub(crate) fn guard<T>(
        &mut self,
        decl: DeclId,
        emit: impl FnOnce(&mut Self) -> EmitResult<T>,
    ) -> EmitResult<Option<T>> {
        let checkpoint = self.ctx.checkpoint();
        let (records, functions) = self.ctx.depths();
        match emit(self) {
            Ok(value) => Ok(Some(value)),
            Err(EmitError::Unsupported(marker)) => {
                self.ctx.rollback(checkpoint);
                self.ctx.unwind(records, functions);
                let d = self.decl(decl);
                warn!(
                    decl = %d.name,
                    kind = d.kind.kind_name(),
                    location = %marker.location,
                    reason = %marker.reason,
                    "skipping unsupported declaration"
                );
                self.ctx.report(Diagnostic::from(marker));
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// `[Obsolete]` line for a deprecated declaration.
    pub(crate) fn obsolete_attribute(&mut self, decl: DeclId) -> Option<String> {
        let deprecation = self.decl(decl).attrs.deprecated.as_ref()?;
        self.ctx.add_using(USING_SYSTEM);
        Some(match &deprecation.message {
            Some(message) => format!("[Obsolete({})]", string_literal(message)),
            None => "[Obsolete]".to_string(),
        })
    }

    /// `[Obsolete]` inherited from a deprecated typedef naming the type of
    /// a field.
    pub(crate) fn typedef_obsolete_attribute(&mut self, ty: TypeId) -> Option<String> {
        let mut current = ty;
        loop {
            match &self.unit.ty(current).kind {
                TypeKind::Typedef { decl, underlying } => {
                    if self.decl(*decl).attrs.deprecated.is_some() {
                        return self.obsolete_attribute(*decl);
                    }
                    current = *underlying;
                }
                _ => return None,
            }
        }
    }

    /// Fully qualified C# name of a record or enum, for `using static`.
    pub(crate) fn full_type_name(&self, decl: DeclId) -> String {
        format!(
            "{}.{}",
            self.config.namespace,
            self.types.qualified_name(decl, None)
        )
    }

    /// Members of the methods class referenced from inside a record need
    /// the class imported.
    pub(crate) fn import_methods_class(&mut self) {
        if self.ctx.current_record().is_some() {
            self.ctx.add_static_using(format!(
                "{}.{}",
                self.config.namespace, self.config.methods_class
            ));
        }
    }

    /// Whether `ty` is a reference type (looking through typedefs).
    pub(crate) fn is_reference(&self, ty: TypeId) -> bool {
        self.unit.ty(self.unit.canonical(ty)).is_reference()
    }

    /// Whether a value declaration was declared with a reference type.
    pub(crate) fn is_reference_decl(&self, decl: DeclId) -> bool {
        match self.decl(decl).kind {
            DeclKind::Param { ty } | DeclKind::Var { ty, .. } => self.is_reference(ty),
            _ => false,
        }
    }

    /// Whether `record` (a definition) derives from `base`, directly or
    /// not, through first bases.
    pub(crate) fn base_chain(&self, record: DeclId, base: DeclId) -> Option<Vec<DeclId>> {
        let base = self.symbols.definition(base);
        let mut chain = Vec::new();
        let mut current = self.symbols.definition(record);
        loop {
            if current == base {
                return Some(chain);
            }
            let DeclKind::Record { bases, .. } = &self.decl(current).kind else {
                return None;
            };
            let next = bases
                .first()
                .and_then(|b| self.unit.record_decl_of(b.ty))
                .map(|id| self.symbols.definition(id))?;
            chain.push(current);
            current = next;
        }
    }
}

/// `[NativeTypeName(...)]` for a mapped type, when its spelling adds
/// anything.
pub(crate) fn native_type_name_attribute(mapped: &MappedType) -> Option<String> {
    mapped
        .native_type_name()
        .map(|native| format!("[NativeTypeName({})]", string_literal(native)))
}

/// Same, for a return type.
pub(crate) fn return_native_type_name_attribute(mapped: &MappedType) -> Option<String> {
    mapped
        .native_type_name()
        .map(|native| format!("[return: NativeTypeName({})]", string_literal(native)))
}
