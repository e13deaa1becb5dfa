//! Top-level traversal and the non-record declarations: enums, functions,
//! methods and globals.

use crate::emitter::{native_type_name_attribute, return_native_type_name_attribute, Emitter, USING_INTEROP};
use crate::error::{EmitError, EmitResult};
use crate::names::string_literal;
use crate::output::{Fragment, Placement};
use crate::type_map::{dllimport_convention, is_fixed_buffer_element, Usage};
use crate::writer::CodeWriter;
use rustc_hash::FxHashSet;
use sharpen_clang::{DeclId, DeclKind, ExprKind, Linkage, StorageClass, TypeKind};
use sharpen_common::{Diagnostic, UnsupportedConstruct};
use tracing::{debug, warn};

/// Tracks free functions so a prototype and its definition, or a
/// prototype repeated across headers, produce one member.
#[derive(Default)]
struct FunctionSet {
    defined: FxHashSet<String>,
    emitted: FxHashSet<String>,
}

impl<'a> Emitter<'a> {
    pub(crate) fn emit_top_level(&mut self) -> EmitResult<Vec<Fragment>> {
        let unit = self.unit;
        let mut functions = FunctionSet::default();
        for decl in &unit.decls {
            if let DeclKind::Function { body: Some(_), .. } = decl.kind {
                functions.defined.insert(decl.name.clone());
            }
        }

        let mut fragments = Vec::new();
        self.emit_scope(&unit.top_level, &mut functions, &mut fragments)?;
        Ok(fragments)
    }

    fn emit_scope(
        &mut self,
        decls: &[DeclId],
        functions: &mut FunctionSet,
        out: &mut Vec<Fragment>,
    ) -> EmitResult<()> {
        let unit = self.unit;
        for &id in decls {
            match &unit.decl(id).kind {
                DeclKind::Namespace { decls } | DeclKind::LinkageSpec { decls, .. } => {
                    self.emit_scope(decls, functions, out)?
                }
                _ => self.emit_top_level_decl(id, functions, out)?,
            }
        }
        Ok(())
    }

    fn emit_top_level_decl(
        &mut self,
        id: DeclId,
        functions: &mut FunctionSet,
        out: &mut Vec<Fragment>,
    ) -> EmitResult<()> {
        let d = self.decl(id);
        if !d.name.is_empty() && self.config.is_excluded(&d.name) {
            debug!(decl = %d.name, "excluded by configuration");
            return Ok(());
        }
        debug!(decl = %d.name, kind = d.kind.kind_name(), "emitting declaration");

        match &d.kind {
            DeclKind::Typedef { .. } => {}
            DeclKind::Record { .. } => {
                if self.symbols.is_shadowed(id) {
                    return Ok(());
                }
                out.extend(self.fragment(id, Placement::Namespace, |e| e.emit_record(id))?);
            }
            DeclKind::Enum { constants, .. } => {
                if d.name.is_empty() && self.symbols.naming_typedef(id).is_none() {
                    for &constant in constants {
                        out.extend(self.fragment(constant, Placement::MethodsClass, |e| {
                            e.emit_enum_constant_as_const(id, constant)
                        })?);
                    }
                } else {
                    out.extend(self.fragment(id, Placement::Namespace, |e| e.emit_enum(id))?);
                }
            }
            DeclKind::Function { body, .. } => {
                if body.is_none() && functions.defined.contains(&d.name) {
                    return Ok(());
                }
                if !functions.emitted.insert(d.name.clone()) {
                    return Ok(());
                }
                out.extend(self.fragment(id, Placement::MethodsClass, |e| e.emit_function(id))?);
            }
            DeclKind::Var { .. } => {
                out.extend(self.fragment(id, Placement::MethodsClass, |e| e.emit_global(id))?);
            }
            DeclKind::Other { kind } => {
                self.report_skipped(UnsupportedConstruct::new(
                    kind.as_str(),
                    d.location.clone(),
                    "declaration kind has no C# form",
                ));
            }
            other => {
                return Err(EmitError::malformed(
                    other.kind_name(),
                    &d.location,
                    "cannot appear at namespace scope",
                ))
            }
        }
        Ok(())
    }

    /// Emit one top-level declaration as a fragment, tracking whether it
    /// needs an unsafe context. Unsupported declarations yield nothing.
    fn fragment(
        &mut self,
        id: DeclId,
        placement: Placement,
        emit: impl FnOnce(&mut Self) -> EmitResult<String>,
    ) -> EmitResult<Option<Fragment>> {
        self.ctx.begin_unsafe_scope();
        let result = self.guard(id, emit);
        let needs_unsafe = self.ctx.end_unsafe_scope();
        Ok(result?.map(|text| {
            Fragment::declaration(self.name(id), text, placement).with_unsafe(needs_unsafe)
        }))
    }

    /// Emit a record member in its own unsafe scope, folding the result
    /// into the enclosing record's. An unsupported member is skipped.
    pub(crate) fn member(
        &mut self,
        id: DeclId,
        emit: impl FnOnce(&mut Self) -> EmitResult<String>,
    ) -> EmitResult<Option<String>> {
        self.ctx.begin_unsafe_scope();
        let result = self.guard(id, emit);
        let needs_unsafe = self.ctx.end_unsafe_scope();
        let text = result?;
        if text.is_some() && needs_unsafe {
            self.ctx.mark_unsafe();
        }
        Ok(text)
    }

    pub(crate) fn report_skipped(&mut self, marker: UnsupportedConstruct) {
        warn!(
            kind = %marker.node_kind,
            location = %marker.location,
            reason = %marker.reason,
            "skipping unsupported declaration"
        );
        self.ctx.report(Diagnostic::from(marker));
    }

    /// Parameter list entries: `[NativeTypeName("const void *")] void* input`.
    pub(crate) fn emit_params(&mut self, params: &[DeclId]) -> EmitResult<Vec<String>> {
        let mut out = Vec::with_capacity(params.len());
        for &param in params {
            let d = self.decl(param);
            let DeclKind::Param { ty } = d.kind else {
                return Err(EmitError::malformed(
                    "parameter",
                    &d.location,
                    format!("parameter list holds a {}", d.kind.kind_name()),
                ));
            };
            let mapped = self.map(ty, Usage::Parameter, &d.location)?;
            let text = match native_type_name_attribute(&mapped) {
                Some(attribute) => format!("{} {} {}", attribute, mapped.name, self.name(param)),
                None => format!("{} {}", mapped.name, self.name(param)),
            };
            out.push(text);
        }
        Ok(out)
    }

    /// Return type, variadic flag and calling convention of a function type.
    fn signature(
        &self,
        ty: sharpen_clang::TypeId,
        location: &sharpen_common::SourceLocation,
    ) -> EmitResult<(sharpen_clang::TypeId, bool, Option<sharpen_clang::CallingConvention>)> {
        let unit = self.unit;
        match unit.function_proto(ty).map(|p| &unit.ty(p).kind) {
            Some(TypeKind::FunctionProto {
                return_type,
                is_variadic,
                calling_convention,
                ..
            }) => Ok((*return_type, *is_variadic, *calling_convention)),
            _ => Err(EmitError::malformed(
                "function",
                location,
                "declared type is not a function prototype",
            )),
        }
    }

    /// `[DllImport(...)]` for an imported function or method.
    fn dllimport_attribute(
        &mut self,
        id: DeclId,
        convention: Option<sharpen_clang::CallingConvention>,
        mangled_name: Option<&str>,
    ) -> EmitResult<String> {
        let d = self.decl(id);
        let convention = dllimport_convention(convention).ok_or_else(|| {
            EmitError::unsupported(
                d.kind.kind_name(),
                &d.location,
                format!("calling convention {:?} has no DllImport form", convention),
            )
        })?;
        self.ctx.add_using(USING_INTEROP);

        let entry_point = d
            .attrs
            .asm_label
            .as_deref()
            .or_else(|| self.config.entry_point(&d.name))
            .or(mangled_name);

        let mut arguments = vec![
            string_literal(&self.config.library),
            format!("CallingConvention = CallingConvention.{}", convention),
        ];
        if let Some(entry_point) = entry_point {
            arguments.push(format!("EntryPoint = {}", string_literal(entry_point)));
        }
        arguments.push("ExactSpelling = true".to_string());
        Ok(format!("[DllImport({})]", arguments.join(", ")))
    }

    pub(crate) fn emit_function(&mut self, id: DeclId) -> EmitResult<String> {
        let d = self.decl(id);
        let DeclKind::Function {
            ty,
            params,
            body,
            linkage,
            mangled_name,
            ..
        } = &d.kind
        else {
            return Err(EmitError::malformed("function", &d.location, "not a function"));
        };
        let (return_type, is_variadic, convention) = self.signature(*ty, &d.location)?;
        let ret = self.map(return_type, Usage::Return, &d.location)?;
        let mut parameters = self.emit_params(params)?;
        let name = self.name(id);

        let mut w = CodeWriter::new();
        match body {
            Some(body) => {
                if is_variadic {
                    return Err(EmitError::unsupported(
                        "function",
                        &d.location,
                        "variadic functions can only be imported",
                    ));
                }
                if let Some(attribute) = return_native_type_name_attribute(&ret) {
                    w.line(&attribute);
                }
                if let Some(obsolete) = self.obsolete_attribute(id) {
                    w.line(&obsolete);
                }
                w.line(&format!(
                    "public static {} {}({})",
                    ret.name,
                    name,
                    parameters.join(", ")
                ));
                self.emit_function_body(return_type, *body, &mut w)?;
            }
            None => {
                let mangled = match linkage {
                    Linkage::Cxx => mangled_name.as_deref(),
                    _ => None,
                };
                w.line(&self.dllimport_attribute(id, convention, mangled)?);
                if let Some(attribute) = return_native_type_name_attribute(&ret) {
                    w.line(&attribute);
                }
                if let Some(obsolete) = self.obsolete_attribute(id) {
                    w.line(&obsolete);
                }
                if is_variadic {
                    parameters.push("__arglist".to_string());
                }
                w.line(&format!(
                    "public static extern {} {}({});",
                    ret.name,
                    name,
                    parameters.join(", ")
                ));
            }
        }
        Ok(w.finish_trimmed())
    }

    fn emit_function_body(
        &mut self,
        return_type: sharpen_clang::TypeId,
        body: sharpen_clang::StmtId,
        w: &mut CodeWriter,
    ) -> EmitResult<()> {
        self.ctx.push_function(return_type);
        let result = self.emit_block(body, w);
        self.ctx.pop_function();
        result
    }

    /// A method of `record` that is not dispatched through the vtable.
    pub(crate) fn emit_method(&mut self, record: DeclId, id: DeclId) -> EmitResult<String> {
        let d = self.decl(id);
        let DeclKind::Method {
            ty,
            params,
            body,
            is_static,
            mangled_name,
            ..
        } = &d.kind
        else {
            return Err(EmitError::malformed("method", &d.location, "not a method"));
        };
        let (return_type, is_variadic, convention) = self.signature(*ty, &d.location)?;
        let ret = self.map(return_type, Usage::Return, &d.location)?;
        let mut parameters = self.emit_params(params)?;
        let name = self.name(id);

        let mut w = CodeWriter::new();
        match body {
            Some(body) => {
                if is_variadic {
                    return Err(EmitError::unsupported(
                        "method",
                        &d.location,
                        "variadic methods can only be imported",
                    ));
                }
                if let Some(attribute) = return_native_type_name_attribute(&ret) {
                    w.line(&attribute);
                }
                if let Some(obsolete) = self.obsolete_attribute(id) {
                    w.line(&obsolete);
                }
                let modifiers = if *is_static { "public static" } else { "public" };
                w.line(&format!(
                    "{} {} {}({})",
                    modifiers,
                    ret.name,
                    name,
                    parameters.join(", ")
                ));
                self.emit_function_body(return_type, *body, &mut w)?;
            }
            None => {
                w.line(&self.dllimport_attribute(id, convention, mangled_name.as_deref())?);
                if let Some(attribute) = return_native_type_name_attribute(&ret) {
                    w.line(&attribute);
                }
                if let Some(obsolete) = self.obsolete_attribute(id) {
                    w.line(&obsolete);
                }
                if !is_static {
                    self.ctx.mark_unsafe();
                    parameters.insert(0, format!("{}* pThis", self.name(record)));
                }
                if is_variadic {
                    parameters.push("__arglist".to_string());
                }
                w.line(&format!(
                    "public static extern {} {}({});",
                    ret.name,
                    name,
                    parameters.join(", ")
                ));
            }
        }
        Ok(w.finish_trimmed())
    }

    pub(crate) fn emit_enum(&mut self, id: DeclId) -> EmitResult<String> {
        let d = self.decl(id);
        let DeclKind::Enum {
            integer_type,
            constants,
            ..
        } = &d.kind
        else {
            return Err(EmitError::malformed("enum", &d.location, "not an enum"));
        };
        let underlying = self.map(*integer_type, Usage::Field, &d.location)?;

        let mut w = CodeWriter::new();
        let obsolete = match self.obsolete_attribute(id) {
            Some(attribute) => Some(attribute),
            None => match self.symbols.naming_typedef(id) {
                Some(typedef) => self.obsolete_attribute(typedef),
                None => None,
            },
        };
        if let Some(obsolete) = obsolete {
            w.line(&obsolete);
        }
        if underlying.name == "int" {
            w.line(&format!("public enum {}", self.name(id)));
        } else {
            w.line(&format!("public enum {} : {}", self.name(id), underlying.name));
        }
        w.open();
        for &constant in constants {
            if let Some(obsolete) = self.obsolete_attribute(constant) {
                w.line(&obsolete);
            }
            match self.enum_value(constant)? {
                Some(value) => w.line(&format!("{} = {},", self.name(constant), value)),
                None => w.line(&format!("{},", self.name(constant))),
            }
        }
        w.close();
        Ok(w.finish_trimmed())
    }

    /// Constant of an unnamed enum, hoisted to a `const`.
    fn emit_enum_constant_as_const(&mut self, enumeration: DeclId, id: DeclId) -> EmitResult<String> {
        let e = self.decl(enumeration);
        let DeclKind::Enum { integer_type, .. } = &e.kind else {
            return Err(EmitError::malformed("enum", &e.location, "not an enum"));
        };
        let underlying = self.map(*integer_type, Usage::Global, &e.location)?;
        let value = match self.enum_value(id)? {
            Some(value) => value,
            None => self.constant_value(id)?.to_string(),
        };
        let mut w = CodeWriter::new();
        if let Some(obsolete) = self.obsolete_attribute(id) {
            w.line(&obsolete);
        }
        w.line(&format!(
            "public const {} {} = {};",
            underlying.name,
            self.name(id),
            value
        ));
        Ok(w.finish_trimmed())
    }

    /// Explicit value of an enum constant: its literal as spelled, or the
    /// computed value for any other initializer. `None` when implicit.
    fn enum_value(&self, constant: DeclId) -> EmitResult<Option<String>> {
        let unit = self.unit;
        let d = self.decl(constant);
        let DeclKind::EnumConstant { value, init } = &d.kind else {
            return Err(EmitError::malformed(
                "enum constant",
                &d.location,
                format!("enum lists a {}", d.kind.kind_name()),
            ));
        };
        let Some(init) = init else {
            return Ok(None);
        };
        match &unit.expr(unit.ignore_implicit(*init)).kind {
            ExprKind::IntegerLiteral { spelling } => Ok(Some(
                spelling
                    .trim_end_matches(['u', 'U', 'l', 'L'])
                    .replace('\'', "_"),
            )),
            _ => Ok(Some(value.to_string())),
        }
    }

    fn constant_value(&self, constant: DeclId) -> EmitResult<i64> {
        let d = self.decl(constant);
        match d.kind {
            DeclKind::EnumConstant { value, .. } => Ok(value),
            _ => Err(EmitError::malformed("enum constant", &d.location, "not an enum constant")),
        }
    }

    /// A namespace-scope variable, or a static data member.
    pub(crate) fn emit_global(&mut self, id: DeclId) -> EmitResult<String> {
        let unit = self.unit;
        let d = self.decl(id);
        let DeclKind::Var { ty, init, storage } = &d.kind else {
            return Err(EmitError::malformed("variable", &d.location, "not a variable"));
        };
        if *storage == StorageClass::Extern && init.is_none() {
            return Err(EmitError::unsupported(
                "extern variable",
                &d.location,
                "imported data symbols have no DllImport form",
            ));
        }
        let mapped = self.map(*ty, Usage::Global, &d.location)?;
        let name = self.name(id);

        let mut w = CodeWriter::new();
        if let Some(attribute) = native_type_name_attribute(&mapped) {
            w.line(&attribute);
        }
        if let Some(obsolete) = self.obsolete_attribute(id) {
            w.line(&obsolete);
        }

        let is_const = unit.ty(*ty).is_const
            && (is_fixed_buffer_element(&mapped.name) || mapped.name == "nint" || mapped.name == "nuint");
        match init {
            Some(init) if is_const => {
                let value = self.emit_expr(*init)?;
                w.line(&format!("public const {} {} = {};", mapped.name, name, value.text));
            }
            Some(init) => {
                let value = self.emit_expr(*init)?;
                w.line(&format!("public static {} {} = {};", mapped.name, name, value.text));
            }
            None => match &unit.ty(unit.canonical(*ty)).kind {
                TypeKind::ConstantArray { element, size } => {
                    let element = self.map(*element, Usage::Pointee, &d.location)?;
                    w.line(&format!(
                        "public static {} {} = new {}[{}];",
                        mapped.name, name, element.name, size
                    ));
                }
                _ => w.line(&format!("public static {} {};", mapped.name, name)),
            },
        }
        Ok(w.finish_trimmed())
    }
}
