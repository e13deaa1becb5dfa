//! Struct, class and union layout.
//!
//! A record body is assembled in five groups, each separated by blank
//! lines: fields, synthesized nested types, forwarding accessors and
//! bitfield properties, methods (vtable trampolines first), and named
//! nested records and enums.

use crate::emitter::{
    native_type_name_attribute, Emitter, USING_CODE_ANALYSIS, USING_COMPILER_SERVICES,
    USING_INTEROP, USING_SYSTEM,
};
use crate::error::{EmitError, EmitResult};
use crate::names::string_literal;
use crate::symbols::SymbolTable;
use crate::type_map::{is_fixed_buffer_element, is_implicit_integer_conversion, IntegerInfo, Usage};
use crate::writer::CodeWriter;
use sharpen_clang::{DeclId, DeclKind, RecordTag, TypeId, TypeKind};
use sharpen_common::{Diagnostic, SourceLocation, UnsupportedConstruct};
use tracing::warn;

#[derive(Default)]
struct RecordItems {
    fields: Vec<String>,
    nested: Vec<String>,
    accessors: Vec<String>,
    methods: Vec<String>,
    named: Vec<String>,
}

impl RecordItems {
    fn into_sequence(self) -> Vec<String> {
        let mut items = self.fields;
        items.extend(self.nested);
        items.extend(self.accessors);
        items.extend(self.methods);
        items.extend(self.named);
        items
    }
}

struct BitfieldMember {
    field: DeclId,
    offset: u32,
    width: u32,
}

/// Consecutive bitfields sharing one integer storage field.
struct BitfieldUnit {
    first: DeclId,
    storage: String,
    bits: u32,
    used: u32,
    members: Vec<BitfieldMember>,
}

impl<'a> Emitter<'a> {
    pub(crate) fn emit_record(&mut self, id: DeclId) -> EmitResult<String> {
        let d = self.decl(id);
        let DeclKind::Record {
            tag,
            is_definition,
            bases,
            ..
        } = &d.kind
        else {
            return Err(EmitError::malformed("record", &d.location, "not a record"));
        };
        let name = self.name(id);

        if !is_definition {
            return Ok(format!("public partial struct {}\n{{\n}}", name));
        }
        if let Some(Err(marker)) = self.symbols.vtable(id) {
            return Err(EmitError::Unsupported(marker.clone()));
        }

        let is_union = *tag == RecordTag::Union;
        self.ctx.push_record(id);
        self.ctx.begin_unsafe_scope();
        let items = self.record_items(id, is_union);
        let needs_unsafe = self.ctx.end_unsafe_scope();
        self.ctx.pop_record();
        let items = items?;

        let mut w = CodeWriter::new();
        match (is_union, d.attrs.packed) {
            (true, None) => w.line("[StructLayout(LayoutKind.Explicit)]"),
            (true, Some(pack)) => w.line(&format!("[StructLayout(LayoutKind.Explicit, Pack = {})]", pack)),
            (false, Some(pack)) => {
                w.line(&format!("[StructLayout(LayoutKind.Sequential, Pack = {})]", pack))
            }
            (false, None) => {}
        }
        if is_union || d.attrs.packed.is_some() {
            self.ctx.add_using(USING_INTEROP);
        }
        if !bases.is_empty() {
            let unit = self.unit;
            let spelled: Vec<&str> = bases.iter().map(|b| unit.ty(b.ty).spelling.as_str()).collect();
            let native = format!("{} {} : {}", tag.keyword(), d.name, spelled.join(", "));
            w.line(&format!("[NativeTypeName({})]", string_literal(&native)));
        }
        if let Some(obsolete) = self.record_obsolete_attribute(id) {
            w.line(&obsolete);
        }
        let modifiers = if needs_unsafe { "public unsafe partial" } else { "public partial" };
        w.line(&format!("{} struct {}", modifiers, name));
        w.open();
        for (index, item) in items.iter().enumerate() {
            if index > 0 {
                w.blank();
            }
            w.line(item);
        }
        w.close();
        Ok(w.finish_trimmed())
    }

    fn record_obsolete_attribute(&mut self, id: DeclId) -> Option<String> {
        if let Some(attribute) = self.obsolete_attribute(id) {
            return Some(attribute);
        }
        let typedef = self.symbols.naming_typedef(id)?;
        self.obsolete_attribute(typedef)
    }

    fn record_items(&mut self, id: DeclId, is_union: bool) -> EmitResult<Vec<String>> {
        let unit = self.unit;
        let d = self.decl(id);
        let DeclKind::Record { bases, .. } = &d.kind else {
            return Err(EmitError::malformed("record", &d.location, "not a record"));
        };

        let mut items = RecordItems::default();
        if self.symbols.is_polymorphic(id) {
            self.ctx.mark_unsafe();
            items.fields.push("public void** lpVtbl;".to_string());
            for base in bases {
                if let Some(base) = unit.record_decl_of(base.ty) {
                    self.flatten_base(base, &mut items)?;
                }
            }
            self.emit_trampolines(id, &mut items.methods)?;
        } else if let Some(base) = bases.first() {
            let mapped = self.map(base.ty, Usage::Field, &d.location)?;
            if is_union {
                items.fields.push(format!("[FieldOffset(0)]\npublic {} Base;", mapped.name));
            } else {
                items.fields.push(format!("public {} Base;", mapped.name));
            }
        }
        self.collect_members(id, is_union, false, &mut items)?;
        Ok(items.into_sequence())
    }

    /// Fields of a base of a polymorphic record, root base first. The
    /// derived record carries them inline after its own vtable pointer.
    fn flatten_base(&mut self, base: DeclId, items: &mut RecordItems) -> EmitResult<()> {
        let unit = self.unit;
        let base = self.symbols.definition(base);
        if let DeclKind::Record { bases, .. } = &self.decl(base).kind {
            for inherited in bases {
                if let Some(inherited) = unit.record_decl_of(inherited.ty) {
                    self.flatten_base(inherited, items)?;
                }
            }
        }
        self.collect_members(base, false, true, items)
    }

    fn collect_members(
        &mut self,
        record: DeclId,
        is_union: bool,
        inherited: bool,
        items: &mut RecordItems,
    ) -> EmitResult<()> {
        let unit = self.unit;
        let symbols = self.symbols;
        let units = self.bitfield_units(record, is_union)?;
        let numbered = units.len() > 1;

        for &member in unit.record_members(record) {
            let d = self.decl(member);
            match &d.kind {
                DeclKind::Field {
                    bit_width: Some(_), ..
                } => {
                    let Some(index) = units.iter().position(|u| u.first == member) else {
                        continue;
                    };
                    let mut storage_name = if numbered {
                        format!("_bitfield{}", index + 1)
                    } else {
                        "_bitfield".to_string()
                    };
                    if inherited {
                        // Keeps base storage apart from the derived record's own.
                        storage_name = format!("_{}{}", self.name(record), storage_name);
                    }
                    let bitfield = &units[index];
                    let mut w = CodeWriter::new();
                    if is_union {
                        w.line("[FieldOffset(0)]");
                    }
                    w.line(&format!("public {} {};", bitfield.storage, storage_name));
                    items.fields.push(w.finish_trimmed());
                    for m in &bitfield.members {
                        let property = self.bitfield_property(&storage_name, bitfield, m)?;
                        items.accessors.push(property);
                    }
                }
                DeclKind::Field { .. } => {
                    let (field, buffer) = self.emit_field(member, is_union)?;
                    items.fields.push(field);
                    items.nested.extend(buffer);
                }
                DeclKind::Record {
                    is_anonymous: true, ..
                } => {
                    let Some(anonymous) = symbols.anonymous_member(member) else {
                        return Err(EmitError::malformed(
                            "record",
                            &d.location,
                            "anonymous record has no enclosing field",
                        ));
                    };
                    let mut w = CodeWriter::new();
                    if is_union {
                        w.line("[FieldOffset(0)]");
                    }
                    let native = SymbolTable::anonymous_native_name(unit, member);
                    w.line(&format!("[NativeTypeName({})]", string_literal(&native)));
                    let type_name = self.types.qualified_name(member, self.ctx.current_record());
                    w.line(&format!("public {} {};", type_name, anonymous.field));
                    items.fields.push(w.finish_trimmed());
                    if !inherited {
                        let nested = self.emit_record(member)?;
                        items.nested.push(nested);
                    }
                    self.forwarding_accessors(member, anonymous.field.as_str(), &mut items.accessors)?;
                }
                _ if inherited => {}
                DeclKind::Record { .. } => {
                    if symbols.is_shadowed(member) {
                        continue;
                    }
                    if let Some(text) = self.member(member, |e| e.emit_record(member))? {
                        if d.name.is_empty() {
                            items.nested.push(text);
                        } else {
                            items.named.push(text);
                        }
                    }
                }
                DeclKind::Enum { .. } => {
                    if let Some(text) = self.member(member, |e| e.emit_enum(member))? {
                        if d.name.is_empty() {
                            items.nested.push(text);
                        } else {
                            items.named.push(text);
                        }
                    }
                }
                DeclKind::Method { is_virtual: true, .. } => {}
                DeclKind::Method { .. } => {
                    if let Some(text) = self.member(member, |e| e.emit_method(record, member))? {
                        items.methods.push(text);
                    }
                }
                DeclKind::Var { .. } => {
                    if let Some(text) = self.member(member, |e| e.emit_global(member))? {
                        items.fields.push(text);
                    }
                }
                DeclKind::Constructor { .. } | DeclKind::Destructor { .. } => {
                    self.report_skipped(UnsupportedConstruct::new(
                        d.kind.kind_name(),
                        d.location.clone(),
                        "special member functions have no struct equivalent",
                    ));
                }
                DeclKind::Other { kind } => {
                    self.report_skipped(UnsupportedConstruct::new(
                        kind.as_str(),
                        d.location.clone(),
                        "member kind has no C# form",
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// One ordinary field, plus the `InlineArray` buffer type it needs when
    /// it is an array of non-primitive elements.
    fn emit_field(&mut self, field: DeclId, in_union: bool) -> EmitResult<(String, Option<String>)> {
        let d = self.decl(field);
        let DeclKind::Field { ty, .. } = d.kind else {
            return Err(EmitError::malformed("field", &d.location, "not a field"));
        };
        let name = self.name(field);

        let mut w = CodeWriter::new();
        if in_union {
            let offset = self.field_offset(field);
            w.line(&offset);
        }

        let mut buffer = None;
        match self.array_shape(ty, &d.location)? {
            Some((element, size)) => {
                let element = self.map(element, Usage::Pointee, &d.location)?;
                let native = self.types.native_spelling(ty);
                w.line(&format!("[NativeTypeName({})]", string_literal(&native)));
                if let Some(obsolete) = self.field_obsolete_attribute(field, ty) {
                    w.line(&obsolete);
                }
                if is_fixed_buffer_element(&element.name) {
                    self.ctx.mark_unsafe();
                    w.line(&format!("public fixed {} {}[{}];", element.name, name, size));
                } else {
                    let buffer_name = format!("_{}_e__FixedBuffer", name);
                    w.line(&format!("public {} {};", buffer_name, name));
                    buffer = Some(self.inline_array(&buffer_name, &element.name, size));
                }
            }
            None => {
                let mapped = self.map(ty, Usage::Field, &d.location)?;
                if let Some(attribute) = native_type_name_attribute(&mapped) {
                    w.line(&attribute);
                }
                if let Some(obsolete) = self.field_obsolete_attribute(field, ty) {
                    w.line(&obsolete);
                }
                w.line(&format!("public {} {};", mapped.name, name));
            }
        }
        Ok((w.finish_trimmed(), buffer))
    }

    fn field_obsolete_attribute(&mut self, field: DeclId, ty: TypeId) -> Option<String> {
        match self.obsolete_attribute(field) {
            Some(attribute) => Some(attribute),
            None => self.typedef_obsolete_attribute(ty),
        }
    }

    /// Element type and length of an array field. Flexible array members
    /// are laid out with one element.
    fn array_shape(&self, ty: TypeId, location: &SourceLocation) -> EmitResult<Option<(TypeId, u64)>> {
        let unit = self.unit;
        let (element, size) = match unit.ty(unit.canonical(ty)).kind {
            TypeKind::ConstantArray { element, size } => (element, size),
            TypeKind::IncompleteArray { element } => (element, 1),
            _ => return Ok(None),
        };
        if matches!(
            unit.ty(unit.canonical(element)).kind,
            TypeKind::ConstantArray { .. } | TypeKind::IncompleteArray { .. }
        ) {
            return Err(EmitError::unsupported(
                "field",
                location,
                "multi-dimensional array fields are not supported",
            ));
        }
        Ok(Some((element, size)))
    }

    fn inline_array(&mut self, name: &str, element: &str, size: u64) -> String {
        self.ctx.add_using(USING_COMPILER_SERVICES);
        let mut w = CodeWriter::new();
        w.line(&format!("[InlineArray({})]", size));
        w.line(&format!("public partial struct {}", name));
        w.open();
        w.line(&format!("public {} e0;", element));
        w.close();
        w.finish_trimmed()
    }

    /// `[FieldOffset]` for a union member. Anything but offset zero is
    /// honored and reported.
    fn field_offset(&mut self, field: DeclId) -> String {
        let d = self.decl(field);
        match d.kind {
            DeclKind::Field {
                offset_bits: Some(bits),
                ..
            } if bits != 0 => {
                self.report_ambiguous(
                    format!("union member `{}` is not at offset zero", d.name),
                    &d.location,
                );
                format!("[FieldOffset({})]", bits / 8)
            }
            _ => "[FieldOffset(0)]".to_string(),
        }
    }

    fn report_ambiguous(&mut self, message: String, location: &SourceLocation) {
        warn!(location = %location, "{}", message);
        self.ctx
            .report(Diagnostic::ambiguous_layout(message, location.clone()));
    }

    /// Accessors on the enclosing record for every member of an anonymous
    /// record, reached through `path`.
    fn forwarding_accessors(
        &mut self,
        anonymous: DeclId,
        path: &str,
        out: &mut Vec<String>,
    ) -> EmitResult<()> {
        let unit = self.unit;
        let symbols = self.symbols;
        for &member in unit.record_members(anonymous) {
            let d = self.decl(member);
            let name = self.name(member);
            match &d.kind {
                DeclKind::Field {
                    ty,
                    bit_width: Some(_),
                    ..
                } => {
                    let mapped = self.map(*ty, Usage::Field, &d.location)?;
                    let mut w = CodeWriter::new();
                    w.line(&format!("public {} {}", mapped.name, name));
                    w.open();
                    w.line("readonly get");
                    w.open();
                    w.line(&format!("return {}.{};", path, name));
                    w.close();
                    w.blank();
                    w.line("set");
                    w.open();
                    w.line(&format!("{}.{} = value;", path, name));
                    w.close();
                    w.close();
                    out.push(w.finish_trimmed());
                }
                DeclKind::Field { ty, .. } => {
                    let accessor = self.forward_field(anonymous, member, *ty, path)?;
                    out.push(accessor);
                }
                DeclKind::Record {
                    is_anonymous: true, ..
                } => {
                    if let Some(inner) = symbols.anonymous_member(member) {
                        let path = format!("{}.{}", path, inner.field);
                        self.forwarding_accessors(member, &path, out)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn forward_field(
        &mut self,
        anonymous: DeclId,
        field: DeclId,
        ty: TypeId,
        path: &str,
    ) -> EmitResult<String> {
        let d = self.decl(field);
        let name = self.name(field);
        self.ctx.add_using(USING_CODE_ANALYSIS);

        let mut w = CodeWriter::new();
        w.line("[UnscopedRef]");
        match self.array_shape(ty, &d.location)? {
            Some((element, size)) => {
                let element = self.map(element, Usage::Pointee, &d.location)?;
                if is_fixed_buffer_element(&element.name) {
                    self.ctx.mark_unsafe();
                    self.ctx.add_using(USING_SYSTEM);
                    self.ctx.add_using(USING_INTEROP);
                    w.line(&format!("public Span<{}> {}", element.name, name));
                    w.open();
                    w.line("get");
                    w.open();
                    w.line(&format!(
                        "return MemoryMarshal.CreateSpan(ref {}.{}[0], {});",
                        path, name, size
                    ));
                    w.close();
                    w.close();
                    return Ok(w.finish_trimmed());
                }
                let owner = self.types.qualified_name(anonymous, self.ctx.current_record());
                w.line(&format!("public ref {}._{}_e__FixedBuffer {}", owner, name, name));
            }
            None => {
                let mapped = self.map(ty, Usage::Field, &d.location)?;
                w.line(&format!("public ref {} {}", mapped.name, name));
            }
        }
        w.open();
        w.line("get");
        w.open();
        w.line(&format!("return ref {}.{};", path, name));
        w.close();
        w.close();
        Ok(w.finish_trimmed())
    }

    /// Group the bitfields of `record` into storage units. A unit closes on
    /// a zero-width bitfield, a change of storage size, overflow, or any
    /// other field.
    fn bitfield_units(&mut self, record: DeclId, is_union: bool) -> EmitResult<Vec<BitfieldUnit>> {
        let unit = self.unit;
        let mut units: Vec<BitfieldUnit> = Vec::new();
        let mut open = false;

        for &member in unit.record_members(record) {
            let d = self.decl(member);
            match d.kind {
                DeclKind::Field {
                    ty,
                    bit_width: Some(width),
                    ..
                } => {
                    if width == 0 {
                        open = false;
                        continue;
                    }
                    let storage = self.bitfield_storage(ty, &d.location)?;
                    let bits = IntegerInfo::of(&storage).map(IntegerInfo::bits).unwrap_or(8);
                    let width = if width > bits {
                        self.report_ambiguous(
                            format!("bitfield `{}` is wider than its type", d.name),
                            &d.location,
                        );
                        bits
                    } else {
                        width
                    };
                    if is_union {
                        self.report_ambiguous(
                            format!("bitfield `{}` is a union member", d.name),
                            &d.location,
                        );
                        open = false;
                    }

                    let fits = match units.last() {
                        Some(current) => open && current.bits == bits && current.used + width <= bits,
                        None => false,
                    };
                    match units.last_mut() {
                        Some(current) if fits => {
                            current.members.push(BitfieldMember {
                                field: member,
                                offset: current.used,
                                width,
                            });
                            current.used += width;
                        }
                        _ => {
                            units.push(BitfieldUnit {
                                first: member,
                                storage,
                                bits,
                                used: width,
                                members: vec![BitfieldMember {
                                    field: member,
                                    offset: 0,
                                    width,
                                }],
                            });
                            open = !is_union;
                        }
                    }
                }
                DeclKind::Field { .. } | DeclKind::Record { .. } => open = false,
                _ => {}
            }
        }
        Ok(units)
    }

    /// Integer type backing a bitfield: `byte` for `bool`, the underlying
    /// type for enums.
    fn bitfield_storage(&mut self, ty: TypeId, location: &SourceLocation) -> EmitResult<String> {
        let unit = self.unit;
        let storage_ty = match unit.ty(unit.canonical(ty)).kind {
            TypeKind::Enum { decl } => match unit.decl(decl).kind {
                DeclKind::Enum { integer_type, .. } => integer_type,
                _ => ty,
            },
            _ => ty,
        };
        let mapped = self.map(storage_ty, Usage::Field, location)?;
        match mapped.name.as_str() {
            "bool" => Ok("byte".to_string()),
            "char" => Err(EmitError::unsupported(
                "bitfield",
                location,
                "character bitfields are not supported",
            )),
            name if IntegerInfo::of(name).is_some() => Ok(name.to_string()),
            other => Err(EmitError::unsupported(
                "bitfield",
                location,
                format!("bitfield of type `{}` is not supported", other),
            )),
        }
    }

    fn bitfield_property(
        &mut self,
        storage_name: &str,
        bitfield: &BitfieldUnit,
        member: &BitfieldMember,
    ) -> EmitResult<String> {
        let d = self.decl(member.field);
        let DeclKind::Field {
            ty,
            bit_width: Some(declared),
            ..
        } = d.kind
        else {
            return Err(EmitError::malformed("bitfield", &d.location, "not a bitfield"));
        };
        let property = self.map(ty, Usage::Field, &d.location)?;
        let info = IntegerInfo::of(&bitfield.storage).unwrap_or(IntegerInfo {
            signed: false,
            rank: 1,
        });
        let promoted = bitfield.bits < 32;
        let arithmetic = if promoted { "int" } else { bitfield.storage.as_str() };
        let suffix = match bitfield.storage.as_str() {
            "uint" => "u",
            "ulong" => "UL",
            "long" => "L",
            _ => "",
        };
        let (offset, width) = (member.offset, member.width);
        let mask_value = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
        // A full-width mask of a signed storage type is all ones, which no
        // signed hex literal can spell.
        let mask = if info.signed && !promoted && width >= bitfield.bits {
            format!("(-1{})", suffix)
        } else {
            format!("0x{:X}{}", mask_value, suffix)
        };

        let raw = if info.signed {
            let bits = if promoted { 32 } else { bitfield.bits };
            let left = bits - offset - width;
            let right = bits - width;
            let mut text = storage_name.to_string();
            if left > 0 {
                text = format!("({} << {})", text, left);
            }
            if right > 0 {
                text = format!("{} >> {}", text, right);
            }
            text
        } else if offset == 0 {
            format!("{} & {}", storage_name, mask)
        } else {
            format!("({} >> {}) & {}", storage_name, offset, mask)
        };
        let getter = if property.name == "bool" {
            format!("({}) != 0", raw)
        } else if property.name == arithmetic {
            raw
        } else {
            format!("({})({})", property.name, raw)
        };

        let value = if property.name == "bool" {
            format!("(value ? 1{} : 0{})", suffix, suffix)
        } else if is_implicit_integer_conversion(&property.name, arithmetic) {
            "value".to_string()
        } else {
            format!("({})(value)", arithmetic)
        };
        let (keep, insert) = if offset == 0 {
            (format!("~{}", mask), format!("({} & {})", value, mask))
        } else {
            (
                format!("~({} << {})", mask, offset),
                format!("(({} & {}) << {})", value, mask, offset),
            )
        };
        let combined = format!("({} & {}) | {}", storage_name, keep, insert);
        let setter = if promoted {
            format!("{} = ({})({});", storage_name, bitfield.storage, combined)
        } else {
            format!("{} = {};", storage_name, combined)
        };

        let mut w = CodeWriter::new();
        let native = format!("{} : {}", property.native, declared);
        w.line(&format!("[NativeTypeName({})]", string_literal(&native)));
        if let Some(obsolete) = self.obsolete_attribute(member.field) {
            w.line(&obsolete);
        }
        w.line(&format!("public {} {}", property.name, self.name(member.field)));
        w.open();
        w.line("readonly get");
        w.open();
        w.line(&format!("return {};", getter));
        w.close();
        w.blank();
        w.line("set");
        w.open();
        w.line(&setter);
        w.close();
        w.close();
        Ok(w.finish_trimmed())
    }
}
