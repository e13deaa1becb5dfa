//! Clang AST representation.
//!
//! One closed enum per node category ([`DeclKind`], [`StmtKind`],
//! [`ExprKind`]) so the emitter can match exhaustively. Nodes refer to each
//! other through typed ids into the arenas of the owning
//! [`TranslationUnit`].

use crate::types::{NativeType, TypeId, TypeKind};
use serde::{Deserialize, Serialize};
use sharpen_common::SourceLocation;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id!(
    /// Index of a [`Decl`] in its translation unit.
    DeclId
);
arena_id!(
    /// Index of a [`Stmt`] in its translation unit.
    StmtId
);
arena_id!(
    /// Index of an [`Expr`] in its translation unit.
    ExprId
);

/// A parsed translation unit: the arenas plus its top-level declarations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranslationUnit {
    /// Main file the unit was parsed from.
    pub file: String,
    /// Top-level declarations in source order.
    pub top_level: Vec<DeclId>,
    pub decls: Vec<Decl>,
    #[serde(default)]
    pub stmts: Vec<Stmt>,
    #[serde(default)]
    pub exprs: Vec<Expr>,
    pub types: Vec<NativeType>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deprecation {
    #[serde(default)]
    pub message: Option<String>,
}

/// Attributes the emitter cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    #[serde(default)]
    pub deprecated: Option<Deprecation>,
    /// `asm("name")` label overriding the exported symbol.
    #[serde(default)]
    pub asm_label: Option<String>,
    /// Maximum field alignment from `#pragma pack` / `packed`.
    #[serde(default)]
    pub packed: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decl {
    pub kind: DeclKind,
    /// Empty for unnamed declarations.
    #[serde(default)]
    pub name: String,
    /// Semantic parent (record, namespace, enum, function).
    #[serde(default)]
    pub parent: Option<DeclId>,
    #[serde(default)]
    pub location: SourceLocation,
    #[serde(default)]
    pub attrs: Attributes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordTag {
    Struct,
    Class,
    Union,
}

impl RecordTag {
    pub fn keyword(self) -> &'static str {
        match self {
            RecordTag::Struct => "struct",
            RecordTag::Class => "class",
            RecordTag::Union => "union",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Linkage {
    /// `extern "C"`.
    C,
    #[default]
    Cxx,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StorageClass {
    #[default]
    None,
    Static,
    Extern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Access {
    #[default]
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseSpecifier {
    pub ty: TypeId,
    #[serde(default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub access: Access,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeclKind {
    Namespace {
        decls: Vec<DeclId>,
    },
    /// `extern "C" { ... }`
    LinkageSpec {
        linkage: Linkage,
        decls: Vec<DeclId>,
    },
    Record {
        tag: RecordTag,
        #[serde(default = "default_true")]
        is_definition: bool,
        /// Anonymous struct/union member (`struct { int a; };`).
        #[serde(default)]
        is_anonymous: bool,
        #[serde(default)]
        bases: Vec<BaseSpecifier>,
        #[serde(default)]
        members: Vec<DeclId>,
    },
    Field {
        ty: TypeId,
        #[serde(default)]
        bit_width: Option<u32>,
        /// Offset within the parent record, in bits.
        #[serde(default)]
        offset_bits: Option<u64>,
    },
    Enum {
        integer_type: TypeId,
        #[serde(default)]
        is_scoped: bool,
        #[serde(default)]
        constants: Vec<DeclId>,
    },
    EnumConstant {
        value: i64,
        /// Explicit initializer, if the source spelled one.
        #[serde(default)]
        init: Option<ExprId>,
    },
    Function {
        ty: TypeId,
        #[serde(default)]
        params: Vec<DeclId>,
        #[serde(default)]
        body: Option<StmtId>,
        #[serde(default)]
        linkage: Linkage,
        #[serde(default)]
        storage: StorageClass,
        #[serde(default)]
        mangled_name: Option<String>,
    },
    Method {
        ty: TypeId,
        #[serde(default)]
        params: Vec<DeclId>,
        #[serde(default)]
        body: Option<StmtId>,
        #[serde(default)]
        is_static: bool,
        #[serde(default)]
        is_virtual: bool,
        #[serde(default)]
        is_pure: bool,
        #[serde(default)]
        mangled_name: Option<String>,
    },
    Constructor {
        #[serde(default)]
        params: Vec<DeclId>,
        #[serde(default)]
        body: Option<StmtId>,
    },
    Destructor {
        #[serde(default)]
        is_virtual: bool,
        #[serde(default)]
        body: Option<StmtId>,
    },
    Param {
        ty: TypeId,
    },
    Var {
        ty: TypeId,
        #[serde(default)]
        init: Option<ExprId>,
        #[serde(default)]
        storage: StorageClass,
    },
    Typedef {
        underlying: TypeId,
    },
    /// Templates, using-directives, static_assert and everything else the
    /// front-end passes through untranslated.
    Other {
        kind: String,
    },
}

fn default_true() -> bool {
    true
}

impl DeclKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            DeclKind::Namespace { .. } => "namespace",
            DeclKind::LinkageSpec { .. } => "linkage specification",
            DeclKind::Record { .. } => "record",
            DeclKind::Field { .. } => "field",
            DeclKind::Enum { .. } => "enum",
            DeclKind::EnumConstant { .. } => "enum constant",
            DeclKind::Function { .. } => "function",
            DeclKind::Method { .. } => "method",
            DeclKind::Constructor { .. } => "constructor",
            DeclKind::Destructor { .. } => "destructor",
            DeclKind::Param { .. } => "parameter",
            DeclKind::Var { .. } => "variable",
            DeclKind::Typedef { .. } => "typedef",
            DeclKind::Other { .. } => "declaration",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    #[serde(default)]
    pub location: SourceLocation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StmtKind {
    Compound(Vec<StmtId>),
    Decl(Vec<DeclId>),
    Expr(ExprId),
    Return(Option<ExprId>),
    If {
        cond: ExprId,
        then_branch: StmtId,
        #[serde(default)]
        else_branch: Option<StmtId>,
    },
    While {
        cond: ExprId,
        body: StmtId,
    },
    Do {
        body: StmtId,
        cond: ExprId,
    },
    For {
        #[serde(default)]
        init: Option<StmtId>,
        #[serde(default)]
        cond: Option<ExprId>,
        #[serde(default)]
        inc: Option<ExprId>,
        body: StmtId,
    },
    Switch {
        cond: ExprId,
        body: StmtId,
    },
    Case {
        value: ExprId,
        body: StmtId,
    },
    Default {
        body: StmtId,
    },
    Break,
    Continue,
    Null,
    Other {
        kind: String,
    },
}

impl StmtKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            StmtKind::Compound(_) => "compound statement",
            StmtKind::Decl(_) => "declaration statement",
            StmtKind::Expr(_) => "expression statement",
            StmtKind::Return(_) => "return statement",
            StmtKind::If { .. } => "if statement",
            StmtKind::While { .. } => "while statement",
            StmtKind::Do { .. } => "do statement",
            StmtKind::For { .. } => "for statement",
            StmtKind::Switch { .. } => "switch statement",
            StmtKind::Case { .. } => "case label",
            StmtKind::Default { .. } => "default label",
            StmtKind::Break => "break statement",
            StmtKind::Continue => "continue statement",
            StmtKind::Null => "null statement",
            StmtKind::Other { .. } => "statement",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    /// Resolved type of the expression.
    pub ty: TypeId,
    #[serde(default)]
    pub location: SourceLocation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    /// Literal as spelled in source, suffix included.
    IntegerLiteral {
        spelling: String,
    },
    FloatingLiteral {
        spelling: String,
    },
    CharacterLiteral {
        value: u32,
    },
    StringLiteral {
        value: String,
        #[serde(default = "default_char_width")]
        char_width: u8,
    },
    BoolLiteral(bool),
    /// `nullptr`, `NULL` (`__null`).
    NullPtrLiteral,
    DeclRef {
        decl: DeclId,
    },
    Paren(ExprId),
    Unary {
        op: UnaryOp,
        operand: ExprId,
    },
    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    Conditional {
        cond: ExprId,
        then_expr: ExprId,
        else_expr: ExprId,
    },
    Call {
        callee: ExprId,
        #[serde(default)]
        args: Vec<ExprId>,
    },
    Member {
        base: ExprId,
        member: DeclId,
        #[serde(default)]
        is_arrow: bool,
    },
    ArraySubscript {
        base: ExprId,
        index: ExprId,
    },
    ImplicitCast {
        kind: CastKind,
        operand: ExprId,
    },
    ExplicitCast {
        style: CastStyle,
        kind: CastKind,
        operand: ExprId,
    },
    InitList(Vec<ExprId>),
    ImplicitValueInit,
    This {
        #[serde(default)]
        implicit: bool,
    },
    SizeOf {
        arg: TypeId,
    },
    Other {
        kind: String,
    },
}

fn default_char_width() -> u8 {
    1
}

impl ExprKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ExprKind::IntegerLiteral { .. } => "integer literal",
            ExprKind::FloatingLiteral { .. } => "floating literal",
            ExprKind::CharacterLiteral { .. } => "character literal",
            ExprKind::StringLiteral { .. } => "string literal",
            ExprKind::BoolLiteral(_) => "bool literal",
            ExprKind::NullPtrLiteral => "null pointer literal",
            ExprKind::DeclRef { .. } => "declaration reference",
            ExprKind::Paren(_) => "parenthesized expression",
            ExprKind::Unary { .. } => "unary operator",
            ExprKind::Binary { .. } => "binary operator",
            ExprKind::Conditional { .. } => "conditional operator",
            ExprKind::Call { .. } => "call",
            ExprKind::Member { .. } => "member access",
            ExprKind::ArraySubscript { .. } => "array subscript",
            ExprKind::ImplicitCast { .. } => "implicit cast",
            ExprKind::ExplicitCast { .. } => "explicit cast",
            ExprKind::InitList(_) => "initializer list",
            ExprKind::ImplicitValueInit => "implicit value initialization",
            ExprKind::This { .. } => "this",
            ExprKind::SizeOf { .. } => "sizeof",
            ExprKind::Other { .. } => "expression",
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    // Bitwise
    And,
    Or,
    Xor,
    Shl,
    Shr,
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    LAnd,
    LOr,
    // Assignment
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    RemAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    ShlAssign,
    ShrAssign,
    Comma,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::LAnd => "&&",
            BinaryOp::LOr => "||",
            BinaryOp::Assign => "=",
            BinaryOp::AddAssign => "+=",
            BinaryOp::SubAssign => "-=",
            BinaryOp::MulAssign => "*=",
            BinaryOp::DivAssign => "/=",
            BinaryOp::RemAssign => "%=",
            BinaryOp::AndAssign => "&=",
            BinaryOp::OrAssign => "|=",
            BinaryOp::XorAssign => "^=",
            BinaryOp::ShlAssign => "<<=",
            BinaryOp::ShrAssign => ">>=",
            BinaryOp::Comma => ",",
        }
    }

    pub fn is_assignment(self) -> bool {
        matches!(
            self,
            BinaryOp::Assign
                | BinaryOp::AddAssign
                | BinaryOp::SubAssign
                | BinaryOp::MulAssign
                | BinaryOp::DivAssign
                | BinaryOp::RemAssign
                | BinaryOp::AndAssign
                | BinaryOp::OrAssign
                | BinaryOp::XorAssign
                | BinaryOp::ShlAssign
                | BinaryOp::ShrAssign
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::LAnd | BinaryOp::LOr)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Prefix increment (++x)
    PreInc,
    /// Prefix decrement (--x)
    PreDec,
    /// Postfix increment (x++)
    PostInc,
    /// Postfix decrement (x--)
    PostDec,
    /// Address-of (&x)
    AddrOf,
    /// Dereference (*x)
    Deref,
    Plus,
    Minus,
    /// Bitwise not (~x)
    Not,
    /// Logical not (!x)
    LNot,
}

/// Conversion performed by a cast, as clang classifies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CastKind {
    LValueToRValue,
    NoOp,
    IntegralCast,
    IntegralToBoolean,
    IntegralToFloating,
    FloatingToIntegral,
    FloatingToBoolean,
    FloatingCast,
    PointerToBoolean,
    PointerToIntegral,
    IntegralToPointer,
    BitCast,
    NullToPointer,
    ArrayToPointerDecay,
    FunctionToPointerDecay,
    DerivedToBase,
    BaseToDerived,
    Dynamic,
    ToVoid,
    Other,
}

/// Source syntax of an explicit cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CastStyle {
    /// `(T)e`
    CStyle,
    /// `T(e)`
    Functional,
    Static,
    Reinterpret,
    Const,
    Dynamic,
}

impl TranslationUnit {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Self::default()
        }
    }

    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id.index()]
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    pub fn ty(&self, id: TypeId) -> &NativeType {
        &self.types[id.index()]
    }

    /// Strips typedefs and resolved template specializations.
    pub fn canonical(&self, mut id: TypeId) -> TypeId {
        loop {
            match &self.ty(id).kind {
                TypeKind::Typedef { underlying, .. } => id = *underlying,
                TypeKind::TemplateSpecialization {
                    canonical: Some(canonical),
                    ..
                } => id = *canonical,
                _ => return id,
            }
        }
    }

    /// The record declaration a type names, looking through typedefs.
    pub fn record_decl_of(&self, ty: TypeId) -> Option<DeclId> {
        match self.ty(self.canonical(ty)).kind {
            TypeKind::Record { decl } => Some(decl),
            _ => None,
        }
    }

    /// The record a pointer or reference points at.
    pub fn pointee_record(&self, ty: TypeId) -> Option<DeclId> {
        match self.ty(self.canonical(ty)).kind {
            TypeKind::Pointer { pointee } => self.record_decl_of(pointee),
            TypeKind::LValueReference { referent } | TypeKind::RValueReference { referent } => {
                self.record_decl_of(referent)
            }
            _ => None,
        }
    }

    /// The function prototype behind a function, function pointer or
    /// typedef of either.
    pub fn function_proto(&self, ty: TypeId) -> Option<TypeId> {
        let canonical = self.canonical(ty);
        match &self.ty(canonical).kind {
            TypeKind::FunctionProto { .. } => Some(canonical),
            TypeKind::Pointer { pointee } => match self.ty(self.canonical(*pointee)).kind {
                TypeKind::FunctionProto { .. } => Some(self.canonical(*pointee)),
                _ => None,
            },
            _ => None,
        }
    }

    /// The declared type of a value declaration.
    pub fn decl_type(&self, id: DeclId) -> Option<TypeId> {
        match &self.decl(id).kind {
            DeclKind::Field { ty, .. }
            | DeclKind::Function { ty, .. }
            | DeclKind::Method { ty, .. }
            | DeclKind::Param { ty }
            | DeclKind::Var { ty, .. } => Some(*ty),
            DeclKind::Typedef { underlying } => Some(*underlying),
            _ => None,
        }
    }

    /// Strips parentheses and implicit casts.
    pub fn ignore_implicit(&self, mut id: ExprId) -> ExprId {
        loop {
            match &self.expr(id).kind {
                ExprKind::Paren(inner) | ExprKind::ImplicitCast { operand: inner, .. } => {
                    id = *inner
                }
                _ => return id,
            }
        }
    }

    /// Members of a record declaration, empty for anything else.
    pub fn record_members(&self, id: DeclId) -> &[DeclId] {
        match &self.decl(id).kind {
            DeclKind::Record { members, .. } => members,
            _ => &[],
        }
    }

    /// Checks that every id stored in the unit points inside its arena.
    pub fn validate(&self) -> Result<(), String> {
        let decls = self.decls.len();
        let stmts = self.stmts.len();
        let exprs = self.exprs.len();
        let types = self.types.len();

        let check_decl = |id: &DeclId, at: &str| {
            if id.index() < decls {
                Ok(())
            } else {
                Err(format!("{at} references missing declaration #{}", id.0))
            }
        };
        let check_stmt = |id: &StmtId, at: &str| {
            if id.index() < stmts {
                Ok(())
            } else {
                Err(format!("{at} references missing statement #{}", id.0))
            }
        };
        let check_expr = |id: &ExprId, at: &str| {
            if id.index() < exprs {
                Ok(())
            } else {
                Err(format!("{at} references missing expression #{}", id.0))
            }
        };
        let check_type = |id: &TypeId, at: &str| {
            if id.index() < types {
                Ok(())
            } else {
                Err(format!("{at} references missing type #{}", id.0))
            }
        };

        for id in &self.top_level {
            check_decl(id, "translation unit")?;
        }

        for (index, decl) in self.decls.iter().enumerate() {
            let at = format!("declaration #{index} ({})", decl.kind.kind_name());
            if let Some(parent) = &decl.parent {
                check_decl(parent, &at)?;
            }
            match &decl.kind {
                DeclKind::Namespace { decls } | DeclKind::LinkageSpec { decls, .. } => {
                    decls.iter().try_for_each(|d| check_decl(d, &at))?
                }
                DeclKind::Record { bases, members, .. } => {
                    bases.iter().try_for_each(|b| check_type(&b.ty, &at))?;
                    members.iter().try_for_each(|d| check_decl(d, &at))?;
                }
                DeclKind::Field { ty, .. } | DeclKind::Param { ty } => check_type(ty, &at)?,
                DeclKind::Enum {
                    integer_type,
                    constants,
                    ..
                } => {
                    check_type(integer_type, &at)?;
                    constants.iter().try_for_each(|d| check_decl(d, &at))?;
                }
                DeclKind::EnumConstant { init, .. } => {
                    init.iter().try_for_each(|e| check_expr(e, &at))?
                }
                DeclKind::Function {
                    ty, params, body, ..
                }
                | DeclKind::Method {
                    ty, params, body, ..
                } => {
                    check_type(ty, &at)?;
                    params.iter().try_for_each(|d| check_decl(d, &at))?;
                    body.iter().try_for_each(|s| check_stmt(s, &at))?;
                }
                DeclKind::Constructor { params, body } => {
                    params.iter().try_for_each(|d| check_decl(d, &at))?;
                    body.iter().try_for_each(|s| check_stmt(s, &at))?;
                }
                DeclKind::Destructor { body, .. } => {
                    body.iter().try_for_each(|s| check_stmt(s, &at))?
                }
                DeclKind::Var { ty, init, .. } => {
                    check_type(ty, &at)?;
                    init.iter().try_for_each(|e| check_expr(e, &at))?;
                }
                DeclKind::Typedef { underlying } => check_type(underlying, &at)?,
                DeclKind::Other { .. } => {}
            }
        }

        for (index, stmt) in self.stmts.iter().enumerate() {
            let at = format!("statement #{index} ({})", stmt.kind.kind_name());
            match &stmt.kind {
                StmtKind::Compound(children) => {
                    children.iter().try_for_each(|s| check_stmt(s, &at))?
                }
                StmtKind::Decl(decls) => decls.iter().try_for_each(|d| check_decl(d, &at))?,
                StmtKind::Expr(e) => check_expr(e, &at)?,
                StmtKind::Return(e) => e.iter().try_for_each(|e| check_expr(e, &at))?,
                StmtKind::If {
                    cond,
                    then_branch,
                    else_branch,
                } => {
                    check_expr(cond, &at)?;
                    check_stmt(then_branch, &at)?;
                    else_branch.iter().try_for_each(|s| check_stmt(s, &at))?;
                }
                StmtKind::While { cond, body }
                | StmtKind::Do { body, cond }
                | StmtKind::Switch { cond, body } => {
                    check_expr(cond, &at)?;
                    check_stmt(body, &at)?;
                }
                StmtKind::For {
                    init,
                    cond,
                    inc,
                    body,
                } => {
                    init.iter().try_for_each(|s| check_stmt(s, &at))?;
                    cond.iter().try_for_each(|e| check_expr(e, &at))?;
                    inc.iter().try_for_each(|e| check_expr(e, &at))?;
                    check_stmt(body, &at)?;
                }
                StmtKind::Case { value, body } => {
                    check_expr(value, &at)?;
                    check_stmt(body, &at)?;
                }
                StmtKind::Default { body } => check_stmt(body, &at)?,
                StmtKind::Break | StmtKind::Continue | StmtKind::Null | StmtKind::Other { .. } => {}
            }
        }

        for (index, expr) in self.exprs.iter().enumerate() {
            let at = format!("expression #{index} ({})", expr.kind.kind_name());
            check_type(&expr.ty, &at)?;
            match &expr.kind {
                ExprKind::DeclRef { decl } => check_decl(decl, &at)?,
                ExprKind::Paren(e)
                | ExprKind::Unary { operand: e, .. }
                | ExprKind::ImplicitCast { operand: e, .. }
                | ExprKind::ExplicitCast { operand: e, .. } => check_expr(e, &at)?,
                ExprKind::Binary { lhs, rhs, .. } => {
                    check_expr(lhs, &at)?;
                    check_expr(rhs, &at)?;
                }
                ExprKind::Conditional {
                    cond,
                    then_expr,
                    else_expr,
                } => {
                    check_expr(cond, &at)?;
                    check_expr(then_expr, &at)?;
                    check_expr(else_expr, &at)?;
                }
                ExprKind::Call { callee, args } => {
                    check_expr(callee, &at)?;
                    args.iter().try_for_each(|e| check_expr(e, &at))?;
                }
                ExprKind::Member { base, member, .. } => {
                    check_expr(base, &at)?;
                    check_decl(member, &at)?;
                }
                ExprKind::ArraySubscript { base, index } => {
                    check_expr(base, &at)?;
                    check_expr(index, &at)?;
                }
                ExprKind::InitList(elements) => {
                    elements.iter().try_for_each(|e| check_expr(e, &at))?
                }
                ExprKind::SizeOf { arg } => check_type(arg, &at)?,
                ExprKind::IntegerLiteral { .. }
                | ExprKind::FloatingLiteral { .. }
                | ExprKind::CharacterLiteral { .. }
                | ExprKind::StringLiteral { .. }
                | ExprKind::BoolLiteral(_)
                | ExprKind::NullPtrLiteral
                | ExprKind::ImplicitValueInit
                | ExprKind::This { .. }
                | ExprKind::Other { .. } => {}
            }
        }

        for (index, ty) in self.types.iter().enumerate() {
            let at = format!("type #{index} ({})", ty.spelling);
            match &ty.kind {
                TypeKind::Pointer { pointee: t }
                | TypeKind::LValueReference { referent: t }
                | TypeKind::RValueReference { referent: t }
                | TypeKind::ConstantArray { element: t, .. }
                | TypeKind::IncompleteArray { element: t } => check_type(t, &at)?,
                TypeKind::FunctionProto {
                    return_type,
                    params,
                    ..
                } => {
                    check_type(return_type, &at)?;
                    params.iter().try_for_each(|t| check_type(t, &at))?;
                }
                TypeKind::Record { decl } | TypeKind::Enum { decl } => check_decl(decl, &at)?,
                TypeKind::Typedef { decl, underlying } => {
                    check_decl(decl, &at)?;
                    check_type(underlying, &at)?;
                }
                TypeKind::TemplateSpecialization { canonical, .. } => {
                    canonical.iter().try_for_each(|t| check_type(t, &at))?
                }
                TypeKind::Builtin(_) | TypeKind::Unexposed => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BuiltinKind;

    #[test]
    fn test_canonical_strips_typedefs() {
        let mut tu = TranslationUnit::new("a.h");
        tu.types.push(NativeType::builtin(BuiltinKind::Int));
        tu.decls.push(Decl {
            kind: DeclKind::Typedef {
                underlying: TypeId(0),
            },
            name: "MyInt".into(),
            parent: None,
            location: SourceLocation::default(),
            attrs: Attributes::default(),
        });
        tu.types.push(NativeType::new(
            TypeKind::Typedef {
                decl: DeclId(0),
                underlying: TypeId(0),
            },
            "MyInt",
        ));
        assert_eq!(tu.canonical(TypeId(1)), TypeId(0));
        assert!(tu.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_dangling_ids() {
        let mut tu = TranslationUnit::new("a.h");
        tu.top_level.push(DeclId(3));
        let err = tu.validate().unwrap_err();
        assert!(err.contains("missing declaration #3"));
    }
}
