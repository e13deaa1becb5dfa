//! Native C/C++ AST model for the sharpen emitter.
//!
//! The parser itself is an external collaborator: a front-end walks the
//! clang cursor tree and hands over a [`TranslationUnit`] either directly
//! (through [`AstBuilder`]) or as JSON (see [`load_unit`]). Every node lives
//! in an arena owned by the unit and is referenced by a typed index, so
//! forward references between declarations are plain lookups.

mod ast;
mod builder;
mod json;
mod types;

pub use ast::{
    Access, Attributes, BaseSpecifier, BinaryOp, CastKind, CastStyle, Decl, DeclId, DeclKind,
    Deprecation, Expr, ExprId, ExprKind, Linkage, RecordTag, StorageClass, Stmt, StmtId,
    StmtKind, TranslationUnit, UnaryOp,
};
pub use builder::AstBuilder;
pub use json::{load_unit, parse_unit, store_unit, AstError};
pub use types::{BuiltinKind, CallingConvention, NativeType, TypeId, TypeKind};
