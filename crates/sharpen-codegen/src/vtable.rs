//! Virtual dispatch through `lpVtbl`.
//!
//! Every slot of a polymorphic record's vtable becomes an instance method
//! that loads the slot as an unmanaged function pointer and calls it with
//! `this` as the first argument.

use crate::emitter::{return_native_type_name_attribute, Emitter, USING_COMPILER_SERVICES};
use crate::error::{EmitError, EmitResult};
use crate::type_map::{unmanaged_convention, Usage};
use crate::writer::CodeWriter;
use sharpen_clang::{DeclId, DeclKind, TypeKind};

impl<'a> Emitter<'a> {
    /// One trampoline per slot, in slot order. A slot whose signature
    /// cannot be expressed is skipped; the remaining indices do not move.
    pub(crate) fn emit_trampolines(&mut self, record: DeclId, out: &mut Vec<String>) -> EmitResult<()> {
        let symbols = self.symbols;
        let Some(Ok(layout)) = symbols.vtable(record) else {
            return Ok(());
        };
        for (index, slot) in layout.slots.iter().enumerate() {
            let method = slot.method;
            if let Some(text) = self.member(method, |e| e.emit_trampoline(record, index, method))? {
                out.push(text);
            }
        }
        Ok(())
    }

    fn emit_trampoline(&mut self, record: DeclId, index: usize, method: DeclId) -> EmitResult<String> {
        let unit = self.unit;
        let d = self.decl(method);
        let DeclKind::Method { ty, params, .. } = &d.kind else {
            return Err(EmitError::malformed(
                "vtable slot",
                &d.location,
                format!("slot holds a {}", d.kind.kind_name()),
            ));
        };
        let Some(TypeKind::FunctionProto {
            return_type,
            is_variadic,
            calling_convention,
            ..
        }) = unit.function_proto(*ty).map(|p| &unit.ty(p).kind)
        else {
            return Err(EmitError::malformed(
                "method",
                &d.location,
                "declared type is not a function prototype",
            ));
        };
        if *is_variadic {
            return Err(EmitError::unsupported(
                "virtual method",
                &d.location,
                "variadic virtual methods cannot be called through a function pointer",
            ));
        }
        let convention = unmanaged_convention(*calling_convention).ok_or_else(|| {
            EmitError::unsupported(
                "virtual method",
                &d.location,
                format!("calling convention {:?} cannot be expressed", calling_convention),
            )
        })?;

        let ret = self.map(*return_type, Usage::Return, &d.location)?;
        let parameters = self.emit_params(params)?;
        let this_type = format!("{}*", self.name(record));

        let mut signature = vec![this_type.clone()];
        let mut args = vec![format!("({})Unsafe.AsPointer(ref this)", this_type)];
        for &param in params {
            let p = self.decl(param);
            if let DeclKind::Param { ty } = p.kind {
                signature.push(self.map(ty, Usage::Parameter, &p.location)?.name);
            }
            args.push(self.name(param).to_string());
        }
        signature.push(ret.name.clone());

        self.ctx.mark_unsafe();
        self.ctx.add_using(USING_COMPILER_SERVICES);
        let call = format!(
            "((delegate* unmanaged[{}]<{}>)(lpVtbl[{}]))({})",
            convention,
            signature.join(", "),
            index,
            args.join(", ")
        );

        let mut w = CodeWriter::new();
        if let Some(attribute) = return_native_type_name_attribute(&ret) {
            w.line(&attribute);
        }
        if let Some(obsolete) = self.obsolete_attribute(method) {
            w.line(&obsolete);
        }
        w.line(&format!(
            "public {} {}({})",
            ret.name,
            self.name(method),
            parameters.join(", ")
        ));
        w.open();
        if ret.is_void() {
            w.line(&format!("{};", call));
        } else {
            w.line(&format!("return {};", call));
        }
        w.close();
        Ok(w.finish_trimmed())
    }
}
