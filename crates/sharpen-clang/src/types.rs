//! Resolved native types.
//!
//! Types are stored in the unit's arena like every other node. Named kinds
//! (records, enums, typedefs) point back at their declaration by id.

use crate::ast::DeclId;
use serde::{Deserialize, Serialize};

/// Index of a [`NativeType`] in its translation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeId(pub u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Builtin (primitive) types as clang classifies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinKind {
    Void,
    Bool,
    /// Plain `char` on a target where it is signed.
    CharS,
    /// Plain `char` on a target where it is unsigned.
    CharU,
    SChar,
    UChar,
    WChar,
    Char8,
    Char16,
    Char32,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    LongLong,
    ULongLong,
    Int128,
    UInt128,
    Half,
    Float,
    Double,
    LongDouble,
    NullPtr,
}

impl BuiltinKind {
    pub fn is_integer(self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }

    pub fn is_signed_integer(self) -> bool {
        matches!(
            self,
            BuiltinKind::CharS
                | BuiltinKind::SChar
                | BuiltinKind::Short
                | BuiltinKind::Int
                | BuiltinKind::Long
                | BuiltinKind::LongLong
                | BuiltinKind::Int128
        )
    }

    /// `wchar_t` counts as unsigned here; its signedness is target-defined
    /// and the front-end reports the size.
    pub fn is_unsigned_integer(self) -> bool {
        matches!(
            self,
            BuiltinKind::CharU
                | BuiltinKind::UChar
                | BuiltinKind::WChar
                | BuiltinKind::Char8
                | BuiltinKind::Char16
                | BuiltinKind::Char32
                | BuiltinKind::UShort
                | BuiltinKind::UInt
                | BuiltinKind::ULong
                | BuiltinKind::ULongLong
                | BuiltinKind::UInt128
        )
    }

    pub fn is_floating(self) -> bool {
        matches!(
            self,
            BuiltinKind::Half | BuiltinKind::Float | BuiltinKind::Double | BuiltinKind::LongDouble
        )
    }

    /// Size in bytes on an LP64 target, used when the front-end omits it.
    pub fn default_size(self) -> u64 {
        match self {
            BuiltinKind::Void => 0,
            BuiltinKind::Bool
            | BuiltinKind::CharS
            | BuiltinKind::CharU
            | BuiltinKind::SChar
            | BuiltinKind::UChar
            | BuiltinKind::Char8 => 1,
            BuiltinKind::Short | BuiltinKind::UShort | BuiltinKind::Char16 | BuiltinKind::Half => 2,
            BuiltinKind::Int
            | BuiltinKind::UInt
            | BuiltinKind::WChar
            | BuiltinKind::Char32
            | BuiltinKind::Float => 4,
            BuiltinKind::Long
            | BuiltinKind::ULong
            | BuiltinKind::LongLong
            | BuiltinKind::ULongLong
            | BuiltinKind::Double
            | BuiltinKind::NullPtr => 8,
            BuiltinKind::Int128 | BuiltinKind::UInt128 | BuiltinKind::LongDouble => 16,
        }
    }

    /// The C spelling used when a builder creates the type.
    pub fn spelling(self) -> &'static str {
        match self {
            BuiltinKind::Void => "void",
            BuiltinKind::Bool => "bool",
            BuiltinKind::CharS | BuiltinKind::CharU => "char",
            BuiltinKind::SChar => "signed char",
            BuiltinKind::UChar => "unsigned char",
            BuiltinKind::WChar => "wchar_t",
            BuiltinKind::Char8 => "char8_t",
            BuiltinKind::Char16 => "char16_t",
            BuiltinKind::Char32 => "char32_t",
            BuiltinKind::Short => "short",
            BuiltinKind::UShort => "unsigned short",
            BuiltinKind::Int => "int",
            BuiltinKind::UInt => "unsigned int",
            BuiltinKind::Long => "long",
            BuiltinKind::ULong => "unsigned long",
            BuiltinKind::LongLong => "long long",
            BuiltinKind::ULongLong => "unsigned long long",
            BuiltinKind::Int128 => "__int128",
            BuiltinKind::UInt128 => "unsigned __int128",
            BuiltinKind::Half => "__fp16",
            BuiltinKind::Float => "float",
            BuiltinKind::Double => "double",
            BuiltinKind::LongDouble => "long double",
            BuiltinKind::NullPtr => "std::nullptr_t",
        }
    }
}

/// Calling convention attached to a function prototype by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallingConvention {
    C,
    StdCall,
    FastCall,
    ThisCall,
    VectorCall,
    Win64,
    SysV,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    Builtin(BuiltinKind),
    Pointer {
        pointee: TypeId,
    },
    LValueReference {
        referent: TypeId,
    },
    RValueReference {
        referent: TypeId,
    },
    ConstantArray {
        element: TypeId,
        size: u64,
    },
    IncompleteArray {
        element: TypeId,
    },
    FunctionProto {
        return_type: TypeId,
        params: Vec<TypeId>,
        #[serde(default)]
        is_variadic: bool,
        #[serde(default)]
        calling_convention: Option<CallingConvention>,
    },
    Record {
        decl: DeclId,
    },
    Enum {
        decl: DeclId,
    },
    Typedef {
        decl: DeclId,
        underlying: TypeId,
    },
    /// A template instantiation; `canonical` is the record clang
    /// instantiated for it, when there is one.
    TemplateSpecialization {
        template: String,
        #[serde(default)]
        canonical: Option<TypeId>,
    },
    /// Anything the front-end could not classify.
    Unexposed,
}

/// A resolved type: its structure plus the exact native spelling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeType {
    pub kind: TypeKind,
    pub spelling: String,
    /// Size in bytes, when the front-end computed one.
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub is_const: bool,
}

impl NativeType {
    pub fn new(kind: TypeKind, spelling: impl Into<String>) -> Self {
        Self {
            kind,
            spelling: spelling.into(),
            size: None,
            is_const: false,
        }
    }

    pub fn builtin(kind: BuiltinKind) -> Self {
        Self::new(TypeKind::Builtin(kind), kind.spelling())
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn as_builtin(&self) -> Option<BuiltinKind> {
        match self.kind {
            TypeKind::Builtin(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        self.as_builtin() == Some(BuiltinKind::Void)
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::LValueReference { .. } | TypeKind::RValueReference { .. }
        )
    }

    /// Size in bytes of a builtin, falling back to the LP64 default.
    pub fn builtin_size(&self) -> Option<u64> {
        self.as_builtin().map(|kind| self.size.unwrap_or_else(|| kind.default_size()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_classification() {
        assert!(BuiltinKind::Int.is_signed_integer());
        assert!(BuiltinKind::ULongLong.is_unsigned_integer());
        assert!(!BuiltinKind::Float.is_integer());
        assert!(BuiltinKind::LongDouble.is_floating());
        assert_eq!(BuiltinKind::Long.default_size(), 8);
    }

    #[test]
    fn test_builtin_size_prefers_front_end() {
        let wchar = NativeType::builtin(BuiltinKind::WChar).with_size(2);
        assert_eq!(wchar.builtin_size(), Some(2));
        let int = NativeType::builtin(BuiltinKind::Int);
        assert_eq!(int.builtin_size(), Some(4));
        assert_eq!(int.spelling, "int");
    }
}
