//! Native type to C# type mapping.
//!
//! The mapper is a pure function of the type, the position it is used in
//! and the record scope the reference is written from. It never consults
//! emission state, so the same native type always yields the same C# type.

use crate::error::{EmitError, EmitResult};
use crate::symbols::SymbolTable;
use sharpen_clang::{
    BuiltinKind, CallingConvention, DeclId, DeclKind, TranslationUnit, TypeId, TypeKind,
};
use sharpen_common::SourceLocation;

/// Where a type is being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    Field,
    Parameter,
    Return,
    Local,
    Global,
    /// Target of a cast expression.
    Cast,
    /// Behind a pointer or reference.
    Pointee,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedType {
    /// C# spelling.
    pub name: String,
    /// Native spelling, kept for `NativeTypeName`.
    pub native: String,
    /// Pointers, function pointers and fixed buffers need an unsafe context.
    pub needs_unsafe: bool,
}

impl MappedType {
    /// The native spelling when it says more than the C# name does.
    pub fn native_type_name(&self) -> Option<&str> {
        if normalize(&self.native) == normalize(&self.name) {
            None
        } else {
            Some(&self.native)
        }
    }

    pub fn is_void(&self) -> bool {
        self.name == "void"
    }
}

/// Drops whitespace and elaborated-type keywords.
fn normalize(spelling: &str) -> String {
    spelling
        .split_whitespace()
        .filter(|token| !matches!(*token, "struct" | "union" | "enum" | "class"))
        .collect::<Vec<_>>()
        .concat()
}

/// Integer classification of a C# primitive, used to decide whether a
/// conversion is implicit in C#.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegerInfo {
    pub signed: bool,
    /// Relative width; native-sized integers sit between 4 and 8 bytes.
    pub rank: u8,
}

impl IntegerInfo {
    pub fn of(name: &str) -> Option<Self> {
        let (signed, rank) = match name {
            "sbyte" => (true, 1),
            "byte" => (false, 1),
            "short" => (true, 2),
            "ushort" | "char" => (false, 2),
            "int" => (true, 4),
            "uint" => (false, 4),
            "nint" => (true, 6),
            "nuint" => (false, 6),
            "long" => (true, 8),
            "ulong" => (false, 8),
            _ => return None,
        };
        Some(Self { signed, rank })
    }

    /// Bits of storage, with native-sized integers taken as 64-bit.
    pub fn bits(self) -> u32 {
        match self.rank {
            6 => 64,
            rank => rank as u32 * 8,
        }
    }
}

/// Whether C# converts `from` to `to` without a cast.
pub fn is_implicit_integer_conversion(from: &str, to: &str) -> bool {
    if from == to {
        return true;
    }
    if to == "char" {
        return false;
    }
    let (Some(source), Some(target)) = (IntegerInfo::of(from), IntegerInfo::of(to)) else {
        return false;
    };
    if from == "char" {
        return target.rank >= 4;
    }
    if (from == "uint" && to == "nint") || (from == "nuint" && target.signed) {
        return false;
    }
    if source.signed == target.signed {
        target.rank >= source.rank
    } else {
        !source.signed && target.rank > source.rank
    }
}

/// Element types a C# `fixed` buffer may hold.
pub fn is_fixed_buffer_element(name: &str) -> bool {
    matches!(
        name,
        "bool"
            | "byte"
            | "char"
            | "short"
            | "int"
            | "long"
            | "sbyte"
            | "ushort"
            | "uint"
            | "ulong"
            | "float"
            | "double"
    )
}

/// Convention name inside `delegate* unmanaged[...]`.
pub fn unmanaged_convention(convention: Option<CallingConvention>) -> Option<&'static str> {
    match convention? {
        CallingConvention::C => Some("Cdecl"),
        CallingConvention::StdCall => Some("Stdcall"),
        CallingConvention::FastCall => Some("Fastcall"),
        CallingConvention::ThisCall => Some("Thiscall"),
        _ => None,
    }
}

/// `CallingConvention` member used by `[DllImport]`.
pub fn dllimport_convention(convention: Option<CallingConvention>) -> Option<&'static str> {
    match convention? {
        CallingConvention::C => Some("Cdecl"),
        CallingConvention::StdCall => Some("StdCall"),
        CallingConvention::FastCall => Some("FastCall"),
        CallingConvention::ThisCall => Some("ThisCall"),
        _ => None,
    }
}

pub struct TypeMapper<'a> {
    unit: &'a TranslationUnit,
    symbols: &'a SymbolTable,
}

impl<'a> TypeMapper<'a> {
    pub fn new(unit: &'a TranslationUnit, symbols: &'a SymbolTable) -> Self {
        Self { unit, symbols }
    }

    /// Map `ty` as written at `usage`, from inside record `scope` (if any).
    pub fn map(
        &self,
        ty: TypeId,
        usage: Usage,
        scope: Option<DeclId>,
        location: &SourceLocation,
    ) -> EmitResult<MappedType> {
        let (name, needs_unsafe) = self.managed(ty, usage, scope, location)?;
        Ok(MappedType {
            name,
            native: self.native_spelling(ty),
            needs_unsafe,
        })
    }

    /// Native spelling, with unnamed records spelled by provenance.
    pub fn native_spelling(&self, ty: TypeId) -> String {
        let native = self.unit.ty(ty);
        match native.kind {
            TypeKind::Record { decl } | TypeKind::Enum { decl }
                if self.unit.decl(decl).name.is_empty()
                    && self.symbols.naming_typedef(decl).is_none() =>
            {
                SymbolTable::anonymous_native_name(self.unit, decl)
            }
            _ => native.spelling.clone(),
        }
    }

    /// Name of a record or enum as written from `scope`: qualified by the
    /// enclosing records that `scope` is not already inside of.
    pub fn qualified_name(&self, decl: DeclId, scope: Option<DeclId>) -> String {
        let decl = self.symbols.definition(decl);
        let target = self.record_chain(Some(decl));
        let current = self.record_chain(scope);
        let common = target
            .iter()
            .zip(current.iter())
            .take_while(|(a, b)| a == b)
            .count()
            .min(target.len().saturating_sub(1));
        target[common..]
            .iter()
            .map(|id| self.symbols.name(*id))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// `decl` and its enclosing records, outermost first.
    fn record_chain(&self, decl: Option<DeclId>) -> Vec<DeclId> {
        let mut chain = Vec::new();
        let mut current = decl;
        while let Some(id) = current {
            let d = self.unit.decl(id);
            if matches!(d.kind, DeclKind::Record { .. } | DeclKind::Enum { .. }) {
                chain.push(id);
            }
            current = d.parent;
        }
        chain.reverse();
        chain
    }

    fn managed(
        &self,
        ty: TypeId,
        usage: Usage,
        scope: Option<DeclId>,
        location: &SourceLocation,
    ) -> EmitResult<(String, bool)> {
        let native = self.unit.ty(ty);
        match &native.kind {
            TypeKind::Builtin(kind) => {
                let size = native.builtin_size().unwrap_or_else(|| kind.default_size());
                builtin_name(*kind, size)
                    .map(|name| (name.to_string(), *kind == BuiltinKind::NullPtr))
                    .ok_or_else(|| {
                        EmitError::unsupported(
                            "type",
                            location,
                            format!("`{}` has no exact C# counterpart", native.spelling),
                        )
                    })
            }
            TypeKind::Pointer { pointee } | TypeKind::LValueReference { referent: pointee }
            | TypeKind::RValueReference { referent: pointee } => {
                if matches!(
                    self.unit.ty(self.unit.canonical(*pointee)).kind,
                    TypeKind::FunctionProto { .. }
                ) {
                    return self.function_pointer(self.unit.canonical(*pointee), scope, location);
                }
                let (inner, _) = self.managed(*pointee, Usage::Pointee, scope, location)?;
                Ok((format!("{}*", inner), true))
            }
            TypeKind::ConstantArray { element, .. } | TypeKind::IncompleteArray { element } => {
                let (inner, needs_unsafe) = self.managed(*element, Usage::Pointee, scope, location)?;
                let incomplete = matches!(native.kind, TypeKind::IncompleteArray { .. });
                match usage {
                    Usage::Local | Usage::Global | Usage::Field if !incomplete => {
                        if matches!(
                            self.unit.ty(self.unit.canonical(*element)).kind,
                            TypeKind::ConstantArray { .. } | TypeKind::IncompleteArray { .. }
                        ) {
                            return Err(EmitError::unsupported(
                                "type",
                                location,
                                "multi-dimensional arrays are not supported",
                            ));
                        }
                        Ok((format!("{}[]", inner), needs_unsafe))
                    }
                    _ => Ok((format!("{}*", inner), true)),
                }
            }
            TypeKind::FunctionProto { .. } => match usage {
                Usage::Parameter | Usage::Pointee => self.function_pointer(ty, scope, location),
                _ => Err(EmitError::unsupported(
                    "type",
                    location,
                    "function types are only usable through pointers",
                )),
            },
            TypeKind::Record { decl } | TypeKind::Enum { decl } => {
                Ok((self.qualified_name(*decl, scope), false))
            }
            TypeKind::Typedef { decl, underlying } => {
                match self.unit.decl(*decl).name.as_str() {
                    "size_t" | "uintptr_t" => Ok(("nuint".to_string(), false)),
                    "ptrdiff_t" | "intptr_t" | "ssize_t" => Ok(("nint".to_string(), false)),
                    _ => self.managed(*underlying, usage, scope, location),
                }
            }
            TypeKind::TemplateSpecialization { template, canonical } => match canonical {
                Some(canonical) => self.managed(*canonical, usage, scope, location),
                None => Err(EmitError::unsupported(
                    "type",
                    location,
                    format!("template specialization `{}` was not instantiated", template),
                )),
            },
            TypeKind::Unexposed => Err(EmitError::unsupported(
                "type",
                location,
                format!("`{}` could not be resolved", native.spelling),
            )),
        }
    }

    fn function_pointer(
        &self,
        proto: TypeId,
        scope: Option<DeclId>,
        location: &SourceLocation,
    ) -> EmitResult<(String, bool)> {
        let TypeKind::FunctionProto {
            return_type,
            params,
            is_variadic,
            calling_convention,
        } = &self.unit.ty(proto).kind
        else {
            return Err(EmitError::malformed(
                "type",
                location,
                "function pointer does not point at a prototype",
            ));
        };
        if *is_variadic {
            return Err(EmitError::unsupported(
                "function pointer",
                location,
                "variadic function pointers have no unmanaged equivalent",
            ));
        }
        let convention = unmanaged_convention(*calling_convention).ok_or_else(|| {
            EmitError::unsupported(
                "function pointer",
                location,
                format!(
                    "calling convention {:?} cannot be expressed",
                    calling_convention
                ),
            )
        })?;

        let mut parts = Vec::with_capacity(params.len() + 1);
        for param in params {
            parts.push(self.managed(*param, Usage::Parameter, scope, location)?.0);
        }
        parts.push(self.managed(*return_type, Usage::Return, scope, location)?.0);
        Ok((
            format!("delegate* unmanaged[{}]<{}>", convention, parts.join(", ")),
            true,
        ))
    }
}

/// C# primitive for a builtin of `size` bytes.
pub fn builtin_name(kind: BuiltinKind, size: u64) -> Option<&'static str> {
    let name = match kind {
        BuiltinKind::Void => "void",
        BuiltinKind::Bool => "bool",
        BuiltinKind::Float => "float",
        BuiltinKind::Double => "double",
        BuiltinKind::LongDouble if size == 8 => "double",
        BuiltinKind::LongDouble | BuiltinKind::Half => return None,
        BuiltinKind::Int128 | BuiltinKind::UInt128 => return None,
        BuiltinKind::NullPtr => "void*",
        BuiltinKind::Char16 => "char",
        BuiltinKind::WChar if size == 2 => "char",
        _ if kind.is_signed_integer() => match size {
            1 => "sbyte",
            2 => "short",
            4 => "int",
            8 => "long",
            _ => return None,
        },
        _ => match size {
            1 => "byte",
            2 => "ushort",
            4 => "uint",
            8 => "ulong",
            _ => return None,
        },
    };
    Some(name)
}
