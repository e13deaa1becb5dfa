//! Programmatic construction of translation units.
//!
//! Front-ends written in Rust, and the emitter's tests, build units through
//! [`AstBuilder`] instead of hand-assembling arenas. The builder fills in
//! the resolved types clang would have computed (an lvalue reference to a
//! declaration has the referent's type, comparisons are `bool`, ...).

use crate::ast::{
    Attributes, BaseSpecifier, BinaryOp, CastKind, CastStyle, Decl, DeclId, DeclKind,
    Deprecation, Expr, ExprId, ExprKind, Linkage, RecordTag, Stmt, StmtId, StmtKind,
    TranslationUnit, UnaryOp,
};
use crate::types::{BuiltinKind, CallingConvention, NativeType, TypeId, TypeKind};
use rustc_hash::FxHashMap;
use sharpen_common::SourceLocation;

pub struct AstBuilder {
    unit: TranslationUnit,
    location: SourceLocation,
    builtins: FxHashMap<BuiltinKind, TypeId>,
    named_types: FxHashMap<DeclId, TypeId>,
}

impl AstBuilder {
    pub fn new(file: impl Into<String>) -> Self {
        let file = file.into();
        Self {
            location: SourceLocation::new(file.clone(), 1, 1),
            unit: TranslationUnit::new(file),
            builtins: FxHashMap::default(),
            named_types: FxHashMap::default(),
        }
    }

    /// Sets the location stamped on nodes created from now on.
    pub fn at(&mut self, line: u32, column: u32) -> &mut Self {
        self.location.line = line;
        self.location.column = column;
        self
    }

    pub fn unit(&self) -> &TranslationUnit {
        &self.unit
    }

    pub fn finish(self) -> TranslationUnit {
        self.unit
    }

    // ----------------------------------------------------------------------
    // Types
    // ----------------------------------------------------------------------

    pub fn add_type(&mut self, ty: NativeType) -> TypeId {
        let id = TypeId(self.unit.types.len() as u32);
        self.unit.types.push(ty);
        id
    }

    pub fn builtin(&mut self, kind: BuiltinKind) -> TypeId {
        if let Some(id) = self.builtins.get(&kind) {
            return *id;
        }
        let id = self.add_type(NativeType::builtin(kind));
        self.builtins.insert(kind, id);
        id
    }

    pub fn void(&mut self) -> TypeId {
        self.builtin(BuiltinKind::Void)
    }

    pub fn bool_type(&mut self) -> TypeId {
        self.builtin(BuiltinKind::Bool)
    }

    pub fn char_type(&mut self) -> TypeId {
        self.builtin(BuiltinKind::CharS)
    }

    pub fn int(&mut self) -> TypeId {
        self.builtin(BuiltinKind::Int)
    }

    pub fn uint(&mut self) -> TypeId {
        self.builtin(BuiltinKind::UInt)
    }

    pub fn float(&mut self) -> TypeId {
        self.builtin(BuiltinKind::Float)
    }

    pub fn double(&mut self) -> TypeId {
        self.builtin(BuiltinKind::Double)
    }

    /// A copy of `ty` with a `const` qualifier in its spelling.
    pub fn const_of(&mut self, ty: TypeId) -> TypeId {
        let mut qualified = self.unit.ty(ty).clone();
        qualified.spelling = format!("const {}", qualified.spelling);
        qualified.is_const = true;
        self.add_type(qualified)
    }

    pub fn pointer(&mut self, pointee: TypeId) -> TypeId {
        let spelling = self.pointer_spelling(pointee);
        self.add_type(NativeType::new(TypeKind::Pointer { pointee }, spelling))
    }

    /// Pointer to a `const`-qualified pointee (`const T *`).
    pub fn const_pointer(&mut self, pointee: TypeId) -> TypeId {
        let pointee = self.const_of(pointee);
        self.pointer(pointee)
    }

    pub fn lvalue_ref(&mut self, referent: TypeId) -> TypeId {
        let spelling = format!("{} &", self.unit.ty(referent).spelling);
        self.add_type(NativeType::new(TypeKind::LValueReference { referent }, spelling))
    }

    pub fn const_ref(&mut self, referent: TypeId) -> TypeId {
        let referent = self.const_of(referent);
        self.lvalue_ref(referent)
    }

    pub fn rvalue_ref(&mut self, referent: TypeId) -> TypeId {
        let spelling = format!("{} &&", self.unit.ty(referent).spelling);
        self.add_type(NativeType::new(TypeKind::RValueReference { referent }, spelling))
    }

    pub fn array(&mut self, element: TypeId, size: u64) -> TypeId {
        let spelling = format!("{}[{}]", self.unit.ty(element).spelling, size);
        self.add_type(NativeType::new(TypeKind::ConstantArray { element, size }, spelling))
    }

    pub fn incomplete_array(&mut self, element: TypeId) -> TypeId {
        let spelling = format!("{}[]", self.unit.ty(element).spelling);
        self.add_type(NativeType::new(TypeKind::IncompleteArray { element }, spelling))
    }

    pub fn function_type(
        &mut self,
        return_type: TypeId,
        params: &[TypeId],
        calling_convention: Option<CallingConvention>,
    ) -> TypeId {
        self.function_type_with(return_type, params, false, calling_convention)
    }

    pub fn variadic_function_type(
        &mut self,
        return_type: TypeId,
        params: &[TypeId],
        calling_convention: Option<CallingConvention>,
    ) -> TypeId {
        self.function_type_with(return_type, params, true, calling_convention)
    }

    fn function_type_with(
        &mut self,
        return_type: TypeId,
        params: &[TypeId],
        is_variadic: bool,
        calling_convention: Option<CallingConvention>,
    ) -> TypeId {
        let mut param_spellings: Vec<String> = params
            .iter()
            .map(|p| self.unit.ty(*p).spelling.clone())
            .collect();
        if is_variadic {
            param_spellings.push("...".to_string());
        }
        let spelling = format!(
            "{} ({})",
            self.unit.ty(return_type).spelling,
            param_spellings.join(", ")
        );
        self.add_type(NativeType::new(
            TypeKind::FunctionProto {
                return_type,
                params: params.to_vec(),
                is_variadic,
                calling_convention,
            },
            spelling,
        ))
    }

    /// Type naming a record, enum or typedef declaration (cached per decl).
    pub fn named_type(&mut self, decl: DeclId) -> TypeId {
        if let Some(id) = self.named_types.get(&decl) {
            return *id;
        }
        let d = self.unit.decl(decl);
        let kind = match &d.kind {
            DeclKind::Enum { .. } => TypeKind::Enum { decl },
            DeclKind::Typedef { underlying } => TypeKind::Typedef {
                decl,
                underlying: *underlying,
            },
            _ => TypeKind::Record { decl },
        };
        let spelling = if d.name.is_empty() {
            match &d.kind {
                DeclKind::Record { tag, .. } => format!(
                    "{} (unnamed at {})",
                    tag.keyword(),
                    d.location
                ),
                _ => format!("(unnamed at {})", d.location),
            }
        } else {
            d.name.clone()
        };
        let id = self.add_type(NativeType::new(kind, spelling));
        self.named_types.insert(decl, id);
        id
    }

    fn pointer_spelling(&self, pointee: TypeId) -> String {
        let ty = self.unit.ty(pointee);
        match &ty.kind {
            TypeKind::FunctionProto { .. } => ty.spelling.replacen(" (", " (*)(", 1),
            _ => format!("{} *", ty.spelling),
        }
    }

    // ----------------------------------------------------------------------
    // Declarations
    // ----------------------------------------------------------------------

    /// Adds a declaration and attaches it to `parent` (or the top level).
    pub fn add_decl(
        &mut self,
        parent: Option<DeclId>,
        name: impl Into<String>,
        kind: DeclKind,
    ) -> DeclId {
        let id = self.detached_decl(name, kind);
        self.attach(parent, id);
        id
    }

    /// Adds a declaration that no container lists (locals, parameters).
    pub fn detached_decl(&mut self, name: impl Into<String>, kind: DeclKind) -> DeclId {
        let id = DeclId(self.unit.decls.len() as u32);
        self.unit.decls.push(Decl {
            kind,
            name: name.into(),
            parent: None,
            location: self.location.clone(),
            attrs: Attributes::default(),
        });
        id
    }

    fn attach(&mut self, parent: Option<DeclId>, child: DeclId) {
        let Some(parent) = parent else {
            self.unit.top_level.push(child);
            return;
        };
        self.unit.decls[child.index()].parent = Some(parent);
        match &mut self.unit.decls[parent.index()].kind {
            DeclKind::Namespace { decls } | DeclKind::LinkageSpec { decls, .. } => {
                decls.push(child)
            }
            DeclKind::Record { members, .. } => members.push(child),
            DeclKind::Enum { constants, .. } => constants.push(child),
            _ => {}
        }
    }

    pub fn decl_mut(&mut self, id: DeclId) -> &mut Decl {
        &mut self.unit.decls[id.index()]
    }

    pub fn deprecate(&mut self, id: DeclId, message: Option<&str>) -> &mut Self {
        self.decl_mut(id).attrs.deprecated = Some(Deprecation {
            message: message.map(str::to_string),
        });
        self
    }

    pub fn namespace(&mut self, parent: Option<DeclId>, name: &str) -> DeclId {
        self.add_decl(parent, name, DeclKind::Namespace { decls: Vec::new() })
    }

    pub fn extern_c_block(&mut self, parent: Option<DeclId>) -> DeclId {
        self.add_decl(
            parent,
            "",
            DeclKind::LinkageSpec {
                linkage: Linkage::C,
                decls: Vec::new(),
            },
        )
    }

    pub fn record(&mut self, parent: Option<DeclId>, tag: RecordTag, name: &str) -> DeclId {
        self.add_decl(
            parent,
            name,
            DeclKind::Record {
                tag,
                is_definition: true,
                is_anonymous: false,
                bases: Vec::new(),
                members: Vec::new(),
            },
        )
    }

    pub fn forward_record(&mut self, parent: Option<DeclId>, tag: RecordTag, name: &str) -> DeclId {
        self.add_decl(
            parent,
            name,
            DeclKind::Record {
                tag,
                is_definition: false,
                is_anonymous: false,
                bases: Vec::new(),
                members: Vec::new(),
            },
        )
    }

    /// Anonymous struct/union member of `parent`.
    pub fn anonymous_record(&mut self, parent: DeclId, tag: RecordTag) -> DeclId {
        self.add_decl(
            Some(parent),
            "",
            DeclKind::Record {
                tag,
                is_definition: true,
                is_anonymous: true,
                bases: Vec::new(),
                members: Vec::new(),
            },
        )
    }

    pub fn add_base(&mut self, record: DeclId, base: DeclId) -> &mut Self {
        let ty = self.named_type(base);
        if let DeclKind::Record { bases, .. } = &mut self.decl_mut(record).kind {
            bases.push(BaseSpecifier {
                ty,
                is_virtual: false,
                access: Default::default(),
            });
        }
        self
    }

    pub fn field(&mut self, record: DeclId, name: &str, ty: TypeId) -> DeclId {
        self.add_decl(
            Some(record),
            name,
            DeclKind::Field {
                ty,
                bit_width: None,
                offset_bits: None,
            },
        )
    }

    pub fn bitfield(&mut self, record: DeclId, name: &str, ty: TypeId, width: u32) -> DeclId {
        self.add_decl(
            Some(record),
            name,
            DeclKind::Field {
                ty,
                bit_width: Some(width),
                offset_bits: None,
            },
        )
    }

    pub fn enumeration(&mut self, parent: Option<DeclId>, name: &str, integer_type: TypeId) -> DeclId {
        self.add_decl(
            parent,
            name,
            DeclKind::Enum {
                integer_type,
                is_scoped: false,
                constants: Vec::new(),
            },
        )
    }

    pub fn enum_constant(
        &mut self,
        enumeration: DeclId,
        name: &str,
        value: i64,
        init: Option<ExprId>,
    ) -> DeclId {
        self.add_decl(Some(enumeration), name, DeclKind::EnumConstant { value, init })
    }

    pub fn typedef(&mut self, parent: Option<DeclId>, name: &str, underlying: TypeId) -> DeclId {
        self.add_decl(parent, name, DeclKind::Typedef { underlying })
    }

    pub fn param(&mut self, name: &str, ty: TypeId) -> DeclId {
        self.detached_decl(name, DeclKind::Param { ty })
    }

    /// A function with the C calling convention and C++ linkage.
    pub fn function(
        &mut self,
        parent: Option<DeclId>,
        name: &str,
        return_type: TypeId,
        params: Vec<DeclId>,
        body: Option<StmtId>,
    ) -> DeclId {
        let param_types = self.param_types(&params);
        let ty = self.function_type(return_type, &param_types, Some(CallingConvention::C));
        let id = self.add_decl(
            parent,
            name,
            DeclKind::Function {
                ty,
                params: params.clone(),
                body,
                linkage: Linkage::Cxx,
                storage: Default::default(),
                mangled_name: None,
            },
        );
        self.adopt(id, &params);
        id
    }

    /// A bodiless `extern "C"` function.
    pub fn extern_c_function(
        &mut self,
        parent: Option<DeclId>,
        name: &str,
        return_type: TypeId,
        params: Vec<DeclId>,
    ) -> DeclId {
        let id = self.function(parent, name, return_type, params, None);
        if let DeclKind::Function { linkage, .. } = &mut self.decl_mut(id).kind {
            *linkage = Linkage::C;
        }
        id
    }

    /// An instance method using the `thiscall` convention.
    pub fn method(
        &mut self,
        record: DeclId,
        name: &str,
        return_type: TypeId,
        params: Vec<DeclId>,
        body: Option<StmtId>,
    ) -> DeclId {
        let param_types = self.param_types(&params);
        let ty = self.function_type(return_type, &param_types, Some(CallingConvention::ThisCall));
        let id = self.add_decl(
            Some(record),
            name,
            DeclKind::Method {
                ty,
                params: params.clone(),
                body,
                is_static: false,
                is_virtual: false,
                is_pure: false,
                mangled_name: None,
            },
        );
        self.adopt(id, &params);
        id
    }

    pub fn virtual_method(
        &mut self,
        record: DeclId,
        name: &str,
        return_type: TypeId,
        params: Vec<DeclId>,
        body: Option<StmtId>,
    ) -> DeclId {
        let id = self.method(record, name, return_type, params, body);
        if let DeclKind::Method { is_virtual, .. } = &mut self.decl_mut(id).kind {
            *is_virtual = true;
        }
        id
    }

    /// Sets the body of a function or method created before its body.
    pub fn set_body(&mut self, function: DeclId, new_body: StmtId) -> &mut Self {
        match &mut self.decl_mut(function).kind {
            DeclKind::Function { body, .. }
            | DeclKind::Method { body, .. }
            | DeclKind::Constructor { body, .. }
            | DeclKind::Destructor { body, .. } => *body = Some(new_body),
            _ => {}
        }
        self
    }

    pub fn global(
        &mut self,
        parent: Option<DeclId>,
        name: &str,
        ty: TypeId,
        init: Option<ExprId>,
    ) -> DeclId {
        self.add_decl(
            parent,
            name,
            DeclKind::Var {
                ty,
                init,
                storage: Default::default(),
            },
        )
    }

    /// A local variable; attach it with [`AstBuilder::decl_stmt`].
    pub fn local(&mut self, name: &str, ty: TypeId, init: Option<ExprId>) -> DeclId {
        self.detached_decl(
            name,
            DeclKind::Var {
                ty,
                init,
                storage: Default::default(),
            },
        )
    }

    fn param_types(&self, params: &[DeclId]) -> Vec<TypeId> {
        params
            .iter()
            .filter_map(|p| self.unit.decl_type(*p))
            .collect()
    }

    fn adopt(&mut self, parent: DeclId, children: &[DeclId]) {
        for child in children {
            self.unit.decls[child.index()].parent = Some(parent);
        }
    }

    // ----------------------------------------------------------------------
    // Statements
    // ----------------------------------------------------------------------

    pub fn stmt(&mut self, kind: StmtKind) -> StmtId {
        let id = StmtId(self.unit.stmts.len() as u32);
        self.unit.stmts.push(Stmt {
            kind,
            location: self.location.clone(),
        });
        id
    }

    pub fn compound(&mut self, children: Vec<StmtId>) -> StmtId {
        self.stmt(StmtKind::Compound(children))
    }

    pub fn ret(&mut self, value: Option<ExprId>) -> StmtId {
        self.stmt(StmtKind::Return(value))
    }

    pub fn expr_stmt(&mut self, expr: ExprId) -> StmtId {
        self.stmt(StmtKind::Expr(expr))
    }

    pub fn decl_stmt(&mut self, decls: Vec<DeclId>) -> StmtId {
        self.stmt(StmtKind::Decl(decls))
    }

    pub fn if_stmt(&mut self, cond: ExprId, then_branch: StmtId, else_branch: Option<StmtId>) -> StmtId {
        self.stmt(StmtKind::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    pub fn while_stmt(&mut self, cond: ExprId, body: StmtId) -> StmtId {
        self.stmt(StmtKind::While { cond, body })
    }

    pub fn do_stmt(&mut self, body: StmtId, cond: ExprId) -> StmtId {
        self.stmt(StmtKind::Do { body, cond })
    }

    pub fn for_stmt(
        &mut self,
        init: Option<StmtId>,
        cond: Option<ExprId>,
        inc: Option<ExprId>,
        body: StmtId,
    ) -> StmtId {
        self.stmt(StmtKind::For {
            init,
            cond,
            inc,
            body,
        })
    }

    pub fn switch_stmt(&mut self, cond: ExprId, body: StmtId) -> StmtId {
        self.stmt(StmtKind::Switch { cond, body })
    }

    pub fn case_stmt(&mut self, value: ExprId, body: StmtId) -> StmtId {
        self.stmt(StmtKind::Case { value, body })
    }

    pub fn default_stmt(&mut self, body: StmtId) -> StmtId {
        self.stmt(StmtKind::Default { body })
    }

    pub fn break_stmt(&mut self) -> StmtId {
        self.stmt(StmtKind::Break)
    }

    pub fn continue_stmt(&mut self) -> StmtId {
        self.stmt(StmtKind::Continue)
    }

    // ----------------------------------------------------------------------
    // Expressions
    // ----------------------------------------------------------------------

    pub fn expr(&mut self, kind: ExprKind, ty: TypeId) -> ExprId {
        let id = ExprId(self.unit.exprs.len() as u32);
        self.unit.exprs.push(Expr {
            kind,
            ty,
            location: self.location.clone(),
        });
        id
    }

    pub fn type_of(&self, expr: ExprId) -> TypeId {
        self.unit.expr(expr).ty
    }

    pub fn int_lit(&mut self, value: i64) -> ExprId {
        let ty = self.int();
        self.expr(
            ExprKind::IntegerLiteral {
                spelling: value.to_string(),
            },
            ty,
        )
    }

    pub fn int_lit_typed(&mut self, spelling: &str, ty: TypeId) -> ExprId {
        self.expr(
            ExprKind::IntegerLiteral {
                spelling: spelling.to_string(),
            },
            ty,
        )
    }

    /// Floating literal; a trailing `f` makes it a `float`.
    pub fn float_lit(&mut self, spelling: &str) -> ExprId {
        let ty = if spelling.ends_with(['f', 'F']) {
            self.float()
        } else {
            self.double()
        };
        self.expr(
            ExprKind::FloatingLiteral {
                spelling: spelling.to_string(),
            },
            ty,
        )
    }

    pub fn bool_lit(&mut self, value: bool) -> ExprId {
        let ty = self.bool_type();
        self.expr(ExprKind::BoolLiteral(value), ty)
    }

    pub fn null_ptr(&mut self) -> ExprId {
        let ty = self.builtin(BuiltinKind::NullPtr);
        self.expr(ExprKind::NullPtrLiteral, ty)
    }

    pub fn string_lit(&mut self, value: &str) -> ExprId {
        let ch = self.char_type();
        let ch = self.const_of(ch);
        let ty = self.array(ch, value.len() as u64 + 1);
        self.expr(
            ExprKind::StringLiteral {
                value: value.to_string(),
                char_width: 1,
            },
            ty,
        )
    }

    /// Reference to a declaration; references are typed as their referent.
    pub fn decl_ref(&mut self, decl: DeclId) -> ExprId {
        let target = self.unit.decl(decl);
        let enum_parent = match target.kind {
            DeclKind::EnumConstant { .. } => Some(target.parent),
            _ => None,
        };
        let ty = match enum_parent {
            Some(Some(parent)) => self.named_type(parent),
            Some(None) => self.int(),
            None => match self.unit.decl_type(decl) {
                Some(ty) => match self.unit.ty(ty).kind {
                    TypeKind::LValueReference { referent }
                    | TypeKind::RValueReference { referent } => referent,
                    _ => ty,
                },
                None => self.void(),
            },
        };
        self.expr(ExprKind::DeclRef { decl }, ty)
    }

    /// `decl` read as an rvalue (`DeclRef` under an lvalue-to-rvalue cast).
    pub fn load(&mut self, decl: DeclId) -> ExprId {
        let r = self.decl_ref(decl);
        self.rvalue(r)
    }

    pub fn rvalue(&mut self, expr: ExprId) -> ExprId {
        let ty = self.type_of(expr);
        self.implicit_cast(CastKind::LValueToRValue, expr, ty)
    }

    pub fn implicit_cast(&mut self, kind: CastKind, operand: ExprId, ty: TypeId) -> ExprId {
        self.expr(ExprKind::ImplicitCast { kind, operand }, ty)
    }

    pub fn cast(&mut self, style: CastStyle, kind: CastKind, operand: ExprId, ty: TypeId) -> ExprId {
        self.expr(ExprKind::ExplicitCast { style, kind, operand }, ty)
    }

    pub fn paren(&mut self, inner: ExprId) -> ExprId {
        let ty = self.type_of(inner);
        self.expr(ExprKind::Paren(inner), ty)
    }

    pub fn unary(&mut self, op: UnaryOp, operand: ExprId) -> ExprId {
        let operand_ty = self.type_of(operand);
        let ty = match op {
            UnaryOp::AddrOf => self.pointer(operand_ty),
            UnaryOp::Deref => match self.unit.ty(self.unit.canonical(operand_ty)).kind {
                TypeKind::Pointer { pointee } => pointee,
                _ => operand_ty,
            },
            UnaryOp::LNot => self.bool_type(),
            _ => operand_ty,
        };
        self.expr(ExprKind::Unary { op, operand }, ty)
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        let ty = match op {
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::LAnd
            | BinaryOp::LOr => self.bool_type(),
            BinaryOp::Comma => self.type_of(rhs),
            _ => self.type_of(lhs),
        };
        self.expr(ExprKind::Binary { op, lhs, rhs }, ty)
    }

    pub fn conditional(&mut self, cond: ExprId, then_expr: ExprId, else_expr: ExprId) -> ExprId {
        let ty = self.type_of(then_expr);
        self.expr(
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            },
            ty,
        )
    }

    /// Direct call of a function declaration.
    pub fn call(&mut self, function: DeclId, args: Vec<ExprId>) -> ExprId {
        let fn_ty = self.unit.decl_type(function).unwrap_or_else(|| TypeId(0));
        let return_type = match &self.unit.ty(fn_ty).kind {
            TypeKind::FunctionProto { return_type, .. } => *return_type,
            _ => fn_ty,
        };
        let callee_ref = self.expr(ExprKind::DeclRef { decl: function }, fn_ty);
        let fn_ptr = self.pointer(fn_ty);
        let callee = self.implicit_cast(CastKind::FunctionToPointerDecay, callee_ref, fn_ptr);
        self.expr(ExprKind::Call { callee, args }, return_type)
    }

    /// Call of a method through `base` (`base.m(...)` or `base->m(...)`).
    pub fn member_call(&mut self, base: ExprId, method: DeclId, is_arrow: bool, args: Vec<ExprId>) -> ExprId {
        let fn_ty = self.unit.decl_type(method).unwrap_or_else(|| TypeId(0));
        let return_type = match &self.unit.ty(fn_ty).kind {
            TypeKind::FunctionProto { return_type, .. } => *return_type,
            _ => fn_ty,
        };
        let callee = self.expr(
            ExprKind::Member {
                base,
                member: method,
                is_arrow,
            },
            fn_ty,
        );
        self.expr(ExprKind::Call { callee, args }, return_type)
    }

    pub fn member(&mut self, base: ExprId, field: DeclId, is_arrow: bool) -> ExprId {
        let ty = self.unit.decl_type(field).unwrap_or_else(|| self.type_of(base));
        self.expr(
            ExprKind::Member {
                base,
                member: field,
                is_arrow,
            },
            ty,
        )
    }

    pub fn subscript(&mut self, base: ExprId, index: ExprId) -> ExprId {
        let base_ty = self.type_of(base);
        let ty = match self.unit.ty(self.unit.canonical(base_ty)).kind {
            TypeKind::Pointer { pointee } => pointee,
            TypeKind::ConstantArray { element, .. } | TypeKind::IncompleteArray { element } => {
                element
            }
            _ => base_ty,
        };
        self.expr(ExprKind::ArraySubscript { base, index }, ty)
    }

    pub fn init_list(&mut self, elements: Vec<ExprId>, ty: TypeId) -> ExprId {
        self.expr(ExprKind::InitList(elements), ty)
    }

    pub fn implicit_value_init(&mut self, ty: TypeId) -> ExprId {
        self.expr(ExprKind::ImplicitValueInit, ty)
    }

    pub fn this(&mut self, record: DeclId, implicit: bool) -> ExprId {
        let record_ty = self.named_type(record);
        let ty = self.pointer(record_ty);
        self.expr(ExprKind::This { implicit }, ty)
    }

    pub fn size_of(&mut self, arg: TypeId) -> ExprId {
        let ty = self.builtin(BuiltinKind::ULong);
        self.expr(ExprKind::SizeOf { arg }, ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_cached() {
        let mut b = AstBuilder::new("a.h");
        let a = b.int();
        let c = b.int();
        assert_eq!(a, c);
    }

    #[test]
    fn test_pointer_spellings() {
        let mut b = AstBuilder::new("a.h");
        let void = b.void();
        let cvp = b.const_pointer(void);
        assert_eq!(b.unit().ty(cvp).spelling, "const void *");

        let int = b.int();
        let f = b.function_type(int, &[int], Some(CallingConvention::C));
        let fp = b.pointer(f);
        assert_eq!(b.unit().ty(fp).spelling, "int (*)(int)");
    }

    #[test]
    fn test_record_members_are_attached() {
        let mut b = AstBuilder::new("a.h");
        let s = b.record(None, RecordTag::Struct, "MyStruct");
        let int = b.int();
        let x = b.field(s, "x", int);
        let unit = b.finish();
        assert_eq!(unit.top_level, vec![s]);
        assert_eq!(unit.record_members(s), &[x]);
        assert_eq!(unit.decl(x).parent, Some(s));
        assert!(unit.validate().is_ok());
    }

    #[test]
    fn test_reference_decl_ref_has_referent_type() {
        let mut b = AstBuilder::new("a.h");
        let int = b.int();
        let r = b.lvalue_ref(int);
        let p = b.param("value", r);
        let e = b.decl_ref(p);
        assert_eq!(b.type_of(e), int);
    }
}
