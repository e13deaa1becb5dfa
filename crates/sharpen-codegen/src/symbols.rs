//! First pass over a translation unit.
//!
//! Every declaration gets its C# name here, before any body is emitted, so
//! forward references (a field typed as a record declared later, a call to a
//! function defined further down) resolve by lookup. The table also holds
//! the facts later passes need about records: anonymous wrappers, naming
//! typedefs, forward declarations and vtable layouts.

use crate::error::{EmitError, EmitResult};
use crate::names::escape_identifier;
use rustc_hash::{FxHashMap, FxHashSet};
use sharpen_build::GeneratorConfig;
use sharpen_clang::{DeclId, DeclKind, RecordTag, TranslationUnit, TypeKind};
use sharpen_common::UnsupportedConstruct;
use smol_str::SmolStr;

/// An anonymous record stored as a synthesized field of its enclosing
/// record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonymousMember {
    pub enclosing: DeclId,
    pub field: SmolStr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VtableSlot {
    /// Most-derived declaration occupying the slot.
    pub method: DeclId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VtableLayout {
    pub slots: Vec<VtableSlot>,
}

pub struct SymbolTable {
    names: FxHashMap<DeclId, SmolStr>,
    anonymous: FxHashMap<DeclId, AnonymousMember>,
    naming_typedefs: FxHashMap<DeclId, DeclId>,
    definitions: FxHashMap<DeclId, DeclId>,
    shadowed: FxHashSet<DeclId>,
    globals: FxHashSet<DeclId>,
    vtables: FxHashMap<DeclId, Result<VtableLayout, UnsupportedConstruct>>,
}

impl SymbolTable {
    #[tracing::instrument(skip_all, fields(decl_count = unit.decls.len()))]
    pub fn build(unit: &TranslationUnit, config: &GeneratorConfig) -> EmitResult<Self> {
        let mut table = Self {
            names: FxHashMap::default(),
            anonymous: FxHashMap::default(),
            naming_typedefs: FxHashMap::default(),
            definitions: FxHashMap::default(),
            shadowed: FxHashSet::default(),
            globals: FxHashSet::default(),
            vtables: FxHashMap::default(),
        };
        table.collect_naming_typedefs(unit);
        table.collect_anonymous_members(unit)?;
        table.assign_names(unit, config);
        table.collect_definitions(unit);
        table.collect_globals(unit, &unit.top_level);
        table.compute_vtables(unit);
        Ok(table)
    }

    /// C# name of a declaration.
    pub fn name(&self, id: DeclId) -> &str {
        self.names.get(&id).map(SmolStr::as_str).unwrap_or("")
    }

    pub fn anonymous_member(&self, record: DeclId) -> Option<&AnonymousMember> {
        self.anonymous.get(&record)
    }

    /// Synthesized field names leading from the nearest named record down to
    /// `record`, outermost first. Empty when `record` is not anonymous.
    pub fn forwarding_path(&self, record: DeclId) -> Vec<SmolStr> {
        let mut path = Vec::new();
        let mut current = record;
        while let Some(member) = self.anonymous.get(&current) {
            path.push(member.field.clone());
            current = member.enclosing;
        }
        path.reverse();
        path
    }

    /// Typedef that names an otherwise unnamed record or enum.
    pub fn naming_typedef(&self, decl: DeclId) -> Option<DeclId> {
        self.naming_typedefs.get(&decl).copied()
    }

    /// A forward declaration made redundant by a definition or an earlier
    /// forward declaration.
    pub fn is_shadowed(&self, record: DeclId) -> bool {
        self.shadowed.contains(&record)
    }

    /// The defining declaration of a record, which is `record` itself for
    /// definitions.
    pub fn definition(&self, record: DeclId) -> DeclId {
        self.definitions.get(&record).copied().unwrap_or(record)
    }

    /// Functions and variables declared at namespace scope. They live in
    /// the methods class.
    pub fn is_global(&self, decl: DeclId) -> bool {
        self.globals.contains(&decl)
    }

    /// Vtable layout of a polymorphic record, or why it cannot be laid out.
    pub fn vtable(&self, record: DeclId) -> Option<&Result<VtableLayout, UnsupportedConstruct>> {
        self.vtables.get(&self.definition(record))
    }

    pub fn is_polymorphic(&self, record: DeclId) -> bool {
        matches!(self.vtable(record), Some(Ok(layout)) if !layout.slots.is_empty())
    }

    /// Deterministic provenance spelling for an unnamed record.
    pub fn anonymous_native_name(unit: &TranslationUnit, record: DeclId) -> String {
        let decl = unit.decl(record);
        let prefix = match decl.kind {
            DeclKind::Enum { .. } => "__AnonymousEnum",
            _ => "__AnonymousRecord",
        };
        format!(
            "{}_{}_L{}_C{}",
            prefix,
            decl.location.file_stem(),
            decl.location.line,
            decl.location.column
        )
    }

    fn collect_naming_typedefs(&mut self, unit: &TranslationUnit) {
        for (index, decl) in unit.decls.iter().enumerate() {
            let DeclKind::Typedef { underlying } = decl.kind else {
                continue;
            };
            let target = match unit.ty(underlying).kind {
                TypeKind::Record { decl } | TypeKind::Enum { decl } => decl,
                _ => continue,
            };
            if unit.decl(target).name.is_empty() {
                self.naming_typedefs
                    .entry(target)
                    .or_insert(DeclId(index as u32));
            }
        }
    }

    fn collect_anonymous_members(&mut self, unit: &TranslationUnit) -> EmitResult<()> {
        for (index, decl) in unit.decls.iter().enumerate() {
            let DeclKind::Record { members, .. } = &decl.kind else {
                continue;
            };
            let anonymous: Vec<DeclId> = members
                .iter()
                .copied()
                .filter(|m| {
                    matches!(
                        unit.decl(*m).kind,
                        DeclKind::Record {
                            is_anonymous: true,
                            ..
                        }
                    )
                })
                .collect();
            let numbered = anonymous.len() > 1;
            for (position, member) in anonymous.into_iter().enumerate() {
                if unit.decl(member).parent != Some(DeclId(index as u32)) {
                    return Err(EmitError::malformed(
                        "record",
                        &unit.decl(member).location,
                        "anonymous record is listed as a member of a record that is not its parent",
                    ));
                }
                let field = if numbered {
                    SmolStr::new(format!("Anonymous{}", position + 1))
                } else {
                    SmolStr::new_static("Anonymous")
                };
                self.anonymous.insert(
                    member,
                    AnonymousMember {
                        enclosing: DeclId(index as u32),
                        field,
                    },
                );
            }
        }
        Ok(())
    }

    fn assign_names(&mut self, unit: &TranslationUnit, config: &GeneratorConfig) {
        for (index, decl) in unit.decls.iter().enumerate() {
            let id = DeclId(index as u32);
            let name = match &decl.kind {
                DeclKind::Record { tag, .. } => {
                    let suffix = if *tag == RecordTag::Union { "Union" } else { "Struct" };
                    self.type_name(unit, config, id, suffix)
                }
                DeclKind::Enum { .. } => self.type_name(unit, config, id, "Enum"),
                DeclKind::Param { .. } if decl.name.is_empty() => {
                    let position = decl
                        .parent
                        .and_then(|parent| match &unit.decl(parent).kind {
                            DeclKind::Function { params, .. }
                            | DeclKind::Method { params, .. }
                            | DeclKind::Constructor { params, .. } => {
                                params.iter().position(|p| *p == id)
                            }
                            _ => None,
                        })
                        .unwrap_or(0);
                    SmolStr::new(format!("param{}", position))
                }
                DeclKind::Function { .. } | DeclKind::Var { .. } | DeclKind::Typedef { .. } => {
                    SmolStr::new(escape_identifier(config.remapped(&decl.name)))
                }
                _ => SmolStr::new(escape_identifier(&decl.name)),
            };
            self.names.insert(id, name);
        }
    }

    fn type_name(
        &self,
        unit: &TranslationUnit,
        config: &GeneratorConfig,
        id: DeclId,
        suffix: &str,
    ) -> SmolStr {
        let decl = unit.decl(id);
        if !decl.name.is_empty() {
            return SmolStr::new(escape_identifier(config.remapped(&decl.name)));
        }
        if let Some(typedef) = self.naming_typedefs.get(&id) {
            let name = &unit.decl(*typedef).name;
            return SmolStr::new(escape_identifier(config.remapped(name)));
        }
        if let Some(member) = self.anonymous.get(&id) {
            return SmolStr::new(format!("_{}_e__{}", member.field, suffix));
        }
        if let Some(parent) = decl.parent {
            let field = unit.record_members(parent).iter().find(|m| {
                matches!(unit.decl(**m).kind, DeclKind::Field { ty, .. }
                    if field_names_record(unit, ty, id))
            });
            if let Some(field) = field {
                return SmolStr::new(format!("_{}_e__{}", unit.decl(*field).name, suffix));
            }
        }
        SmolStr::new(Self::anonymous_native_name(unit, id))
    }

    fn collect_definitions(&mut self, unit: &TranslationUnit) {
        let mut first_seen: FxHashMap<(Option<DeclId>, &str), DeclId> = FxHashMap::default();
        let mut defined: FxHashMap<(Option<DeclId>, &str), DeclId> = FxHashMap::default();

        for (index, decl) in unit.decls.iter().enumerate() {
            if let DeclKind::Record { is_definition, .. } = decl.kind {
                if decl.name.is_empty() {
                    continue;
                }
                let key = (decl.parent, decl.name.as_str());
                first_seen.entry(key).or_insert(DeclId(index as u32));
                if is_definition {
                    defined.entry(key).or_insert(DeclId(index as u32));
                }
            }
        }

        for (index, decl) in unit.decls.iter().enumerate() {
            let DeclKind::Record { is_definition, .. } = decl.kind else {
                continue;
            };
            if is_definition || decl.name.is_empty() {
                continue;
            }
            let id = DeclId(index as u32);
            let key = (decl.parent, decl.name.as_str());
            if let Some(definition) = defined.get(&key) {
                self.definitions.insert(id, *definition);
                self.shadowed.insert(id);
            } else if first_seen.get(&key) != Some(&id) {
                self.shadowed.insert(id);
            }
        }
    }

    fn collect_globals(&mut self, unit: &TranslationUnit, decls: &[DeclId]) {
        for id in decls {
            match &unit.decl(*id).kind {
                DeclKind::Namespace { decls } | DeclKind::LinkageSpec { decls, .. } => {
                    self.collect_globals(unit, decls)
                }
                DeclKind::Function { .. } | DeclKind::Var { .. } => {
                    self.globals.insert(*id);
                }
                _ => {}
            }
        }
    }

    fn compute_vtables(&mut self, unit: &TranslationUnit) {
        for (index, decl) in unit.decls.iter().enumerate() {
            if let DeclKind::Record {
                is_definition: true,
                ..
            } = decl.kind
            {
                let mut visiting = Vec::new();
                self.vtable_for(unit, DeclId(index as u32), &mut visiting);
            }
        }
        self.vtables
            .retain(|_, layout| !matches!(layout, Ok(l) if l.slots.is_empty()));
    }

    /// Slots are inherited first; an override reuses its base slot and new
    /// virtual methods are appended in declaration order.
    fn vtable_for(
        &mut self,
        unit: &TranslationUnit,
        record: DeclId,
        visiting: &mut Vec<DeclId>,
    ) -> Result<VtableLayout, UnsupportedConstruct> {
        let record = self.definition(record);
        if let Some(done) = self.vtables.get(&record) {
            return done.clone();
        }
        let decl = unit.decl(record);
        if visiting.contains(&record) {
            return Err(UnsupportedConstruct::new(
                "record",
                decl.location.clone(),
                "record inherits from itself",
            ));
        }
        visiting.push(record);

        let result = (|| {
            let DeclKind::Record { bases, members, .. } = &decl.kind else {
                return Ok(VtableLayout::default());
            };
            if bases.len() > 1 {
                return Err(UnsupportedConstruct::new(
                    "record",
                    decl.location.clone(),
                    "multiple inheritance has no single-vtable layout",
                ));
            }
            let mut layout = match bases.first() {
                Some(base) if base.is_virtual => {
                    return Err(UnsupportedConstruct::new(
                        "record",
                        decl.location.clone(),
                        "virtual base classes are not supported",
                    ))
                }
                Some(base) => match unit.record_decl_of(base.ty) {
                    Some(base_record) => self.vtable_for(unit, base_record, visiting)?,
                    None => {
                        return Err(UnsupportedConstruct::new(
                            "record",
                            decl.location.clone(),
                            format!("base `{}` is not a record", unit.ty(base.ty).spelling),
                        ))
                    }
                },
                None => VtableLayout::default(),
            };

            for member in members {
                match &unit.decl(*member).kind {
                    DeclKind::Method {
                        is_virtual: true, ..
                    } => {
                        let existing = layout
                            .slots
                            .iter()
                            .position(|slot| overrides(unit, *member, slot.method));
                        match existing {
                            Some(position) => layout.slots[position].method = *member,
                            None => layout.slots.push(VtableSlot { method: *member }),
                        }
                    }
                    DeclKind::Destructor {
                        is_virtual: true, ..
                    } => {
                        return Err(UnsupportedConstruct::new(
                            "destructor",
                            unit.decl(*member).location.clone(),
                            "virtual destructor slot layout is ABI-specific",
                        ))
                    }
                    _ => {}
                }
            }
            Ok(layout)
        })();

        visiting.pop();
        self.vtables.insert(record, result.clone());
        result
    }
}

fn field_names_record(unit: &TranslationUnit, ty: sharpen_clang::TypeId, record: DeclId) -> bool {
    match unit.ty(unit.canonical(ty)).kind {
        TypeKind::Record { decl } | TypeKind::Enum { decl } => decl == record,
        TypeKind::ConstantArray { element, .. } => field_names_record(unit, element, record),
        _ => false,
    }
}

/// `derived` overrides `base` when name and parameter types agree.
fn overrides(unit: &TranslationUnit, derived: DeclId, base: DeclId) -> bool {
    if unit.decl(derived).name != unit.decl(base).name {
        return false;
    }
    let params = |id: DeclId| -> Vec<String> {
        match unit.decl_type(id).map(|t| &unit.ty(t).kind) {
            Some(TypeKind::FunctionProto { params, .. }) => params
                .iter()
                .map(|p| unit.ty(unit.canonical(*p)).spelling.clone())
                .collect(),
            _ => Vec::new(),
        }
    };
    params(derived) == params(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharpen_clang::AstBuilder;

    fn build(b: AstBuilder) -> (TranslationUnit, SymbolTable) {
        let unit = b.finish();
        let table = SymbolTable::build(&unit, &GeneratorConfig::default()).unwrap();
        (unit, table)
    }

    #[test]
    fn test_anonymous_members_are_numbered_when_several() {
        let mut b = AstBuilder::new("ClangUnsavedFile.h");
        let outer = b.record(None, RecordTag::Union, "MyUnion");
        let first = b.anonymous_record(outer, RecordTag::Struct);
        let second = b.anonymous_record(outer, RecordTag::Union);
        let (_, table) = build(b);
        assert_eq!(table.name(first), "_Anonymous1_e__Struct");
        assert_eq!(table.name(second), "_Anonymous2_e__Union");
        assert_eq!(table.forwarding_path(second), vec![SmolStr::new("Anonymous2")]);
    }

    #[test]
    fn test_single_anonymous_member() {
        let mut b = AstBuilder::new("ClangUnsavedFile.h");
        let outer = b.record(None, RecordTag::Union, "MyUnion");
        b.at(3, 5);
        let inner = b.anonymous_record(outer, RecordTag::Struct);
        let (unit, table) = build(b);
        assert_eq!(table.name(inner), "_Anonymous_e__Struct");
        assert_eq!(
            SymbolTable::anonymous_native_name(&unit, inner),
            "__AnonymousRecord_ClangUnsavedFile_L3_C5"
        );
    }

    #[test]
    fn test_typedef_names_unnamed_record() {
        let mut b = AstBuilder::new("a.h");
        let record = b.record(None, RecordTag::Struct, "");
        let ty = b.named_type(record);
        let typedef = b.typedef(None, "MyStruct", ty);
        let (_, table) = build(b);
        assert_eq!(table.name(record), "MyStruct");
        assert_eq!(table.naming_typedef(record), Some(typedef));
    }

    #[test]
    fn test_forward_declaration_is_shadowed_by_definition() {
        let mut b = AstBuilder::new("a.h");
        let forward = b.forward_record(None, RecordTag::Struct, "Opaque");
        let lonely = b.forward_record(None, RecordTag::Struct, "Lonely");
        let definition = b.record(None, RecordTag::Struct, "Opaque");
        let (_, table) = build(b);
        assert!(table.is_shadowed(forward));
        assert!(!table.is_shadowed(lonely));
        assert_eq!(table.definition(forward), definition);
    }

    #[test]
    fn test_vtable_override_reuses_base_slot() {
        let mut b = AstBuilder::new("a.h");
        let void = b.void();
        let int = b.int();
        let base = b.record(None, RecordTag::Struct, "Base");
        let base_first = b.virtual_method(base, "First", void, vec![], None);
        let base_second = b.virtual_method(base, "Second", int, vec![], None);
        let derived = b.record(None, RecordTag::Struct, "Derived");
        b.add_base(derived, base);
        let third = b.virtual_method(derived, "Third", void, vec![], None);
        let override_first = b.virtual_method(derived, "First", void, vec![], None);
        let (_, table) = build(b);

        let Some(Ok(base_layout)) = table.vtable(base) else {
            panic!("base should be polymorphic");
        };
        assert_eq!(base_layout.slots.len(), 2);
        assert_eq!(base_layout.slots[0].method, base_first);
        assert_eq!(base_layout.slots[1].method, base_second);

        let Some(Ok(layout)) = table.vtable(derived) else {
            panic!("derived should be polymorphic");
        };
        let methods: Vec<DeclId> = layout.slots.iter().map(|s| s.method).collect();
        assert_eq!(methods, vec![override_first, base_second, third]);
    }

    #[test]
    fn test_multiple_inheritance_is_unsupported() {
        let mut b = AstBuilder::new("a.h");
        let a = b.record(None, RecordTag::Struct, "A");
        let c = b.record(None, RecordTag::Struct, "C");
        let d = b.record(None, RecordTag::Struct, "D");
        b.add_base(d, a).add_base(d, c);
        let (_, table) = build(b);
        assert!(matches!(table.vtable(d), Some(Err(_))));
        assert!(!table.is_polymorphic(a));
    }

    #[test]
    fn test_unnamed_params_are_numbered() {
        let mut b = AstBuilder::new("a.h");
        let int = b.int();
        let first = b.param("", int);
        let second = b.param("", int);
        let void = b.void();
        b.function(None, "f", void, vec![first, second], None);
        let (_, table) = build(b);
        assert_eq!(table.name(first), "param0");
        assert_eq!(table.name(second), "param1");
    }
}
