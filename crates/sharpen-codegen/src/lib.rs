//! C# interop source emission for C and C++ translation units.
//!
//! [`CSharpGenerator::emit_unit`] walks a [`TranslationUnit`] once the
//! symbol table is built and returns the emitted fragments, the `using`
//! directives they need and a diagnostic for every construct that was
//! skipped. [`EmittedUnit::render`] turns that into a complete C# file.

mod context;
mod decl;
mod emitter;
mod error;
mod expr;
mod layout;
mod names;
mod output;
mod stmt;
mod symbols;
mod type_map;
mod vtable;
mod writer;

pub use error::{EmitError, EmitResult};
pub use names::{escape_identifier, string_literal};
pub use output::{EmittedUnit, Fragment, FragmentKind, Placement, Usings};
pub use symbols::{SymbolTable, VtableLayout, VtableSlot};
pub use type_map::{MappedType, TypeMapper, Usage};

use emitter::Emitter;
use writer::CodeWriter;
use sharpen_build::GeneratorConfig;
use sharpen_clang::{ExprId, StmtId, TranslationUnit};
use tracing::debug;

/// Emits C# for translation units under one configuration.
#[derive(Debug, Clone, Default)]
pub struct CSharpGenerator {
    config: GeneratorConfig,
}

impl CSharpGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Emit one translation unit. Unsupported constructs are skipped and
    /// reported in the result; malformed input fails the whole unit.
    #[tracing::instrument(skip_all, fields(file = %unit.file))]
    pub fn emit_unit(&self, unit: &TranslationUnit) -> EmitResult<EmittedUnit> {
        validate(unit)?;
        let symbols = SymbolTable::build(unit, &self.config)?;
        let mut emitter = Emitter::new(unit, &self.config, &symbols);
        let fragments = emitter.emit_top_level()?;
        let (usings, diagnostics) = emitter.ctx.finish();
        debug!(
            fragments = fragments.len(),
            diagnostics = diagnostics.len(),
            "emitted translation unit"
        );

        Ok(EmittedUnit {
            file: unit.file.clone(),
            fragments,
            usings,
            diagnostics,
        })
    }

    /// Emit a single statement of `unit`, as it would appear in a method
    /// body. Unsupported constructs are an error here.
    pub fn emit_statement(&self, unit: &TranslationUnit, stmt: StmtId) -> EmitResult<Fragment> {
        self.emit_snippet(unit, Fragment::statement, |emitter| {
            let mut w = CodeWriter::new();
            emitter.emit_stmt(stmt, &mut w)?;
            Ok(w.finish_trimmed())
        })
    }

    /// Emit a single expression of `unit`.
    pub fn emit_expression(&self, unit: &TranslationUnit, expr: ExprId) -> EmitResult<Fragment> {
        self.emit_snippet(unit, Fragment::expression, |emitter| {
            Ok(emitter.emit_expr(expr)?.text)
        })
    }

    fn emit_snippet(
        &self,
        unit: &TranslationUnit,
        fragment: fn(String) -> Fragment,
        emit: impl FnOnce(&mut Emitter<'_>) -> EmitResult<String>,
    ) -> EmitResult<Fragment> {
        validate(unit)?;
        let symbols = SymbolTable::build(unit, &self.config)?;
        let mut emitter = Emitter::new(unit, &self.config, &symbols);
        emitter.ctx.begin_unsafe_scope();
        let text = emit(&mut emitter)?;
        let needs_unsafe = emitter.ctx.end_unsafe_scope();
        Ok(fragment(text).with_unsafe(needs_unsafe))
    }

    /// Emit and render one translation unit as a C# file.
    pub fn render_unit(&self, unit: &TranslationUnit) -> EmitResult<String> {
        Ok(self.emit_unit(unit)?.render(&self.config))
    }
}

fn validate(unit: &TranslationUnit) -> EmitResult<()> {
    unit.validate()
        .map_err(|reason| EmitError::malformed("translation unit", &Default::default(), reason))
}
