//! Expression emission.
//!
//! Every emitted expression carries the precedence of its outermost C#
//! operator, so parenthesization is derived from the table below rather
//! than from the native tree's own `Paren` nodes (which are kept).

use crate::emitter::{Emitter, USING_COMPILER_SERVICES, USING_INTEROP};
use crate::error::{EmitError, EmitResult};
use crate::names::{char_literal, string_literal};
use crate::type_map::{is_fixed_buffer_element, is_implicit_integer_conversion, IntegerInfo, Usage};
use crate::writer::CodeWriter;
use sharpen_clang::{
    BinaryOp, BuiltinKind, CastKind, CastStyle, DeclId, DeclKind, ExprId, ExprKind, RecordTag,
    TypeId, TypeKind, UnaryOp,
};
use sharpen_common::SourceLocation;

/// C# operator precedence, loosest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Prec {
    Assignment,
    Conditional,
    LogicalOr,
    LogicalAnd,
    BitOr,
    BitXor,
    BitAnd,
    Equality,
    Relational,
    Shift,
    Additive,
    Multiplicative,
    Unary,
    Primary,
}

impl Prec {
    fn of_binary(op: BinaryOp) -> Prec {
        match op {
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => Prec::Multiplicative,
            BinaryOp::Add | BinaryOp::Sub => Prec::Additive,
            BinaryOp::Shl | BinaryOp::Shr => Prec::Shift,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => Prec::Relational,
            BinaryOp::Eq | BinaryOp::Ne => Prec::Equality,
            BinaryOp::And => Prec::BitAnd,
            BinaryOp::Xor => Prec::BitXor,
            BinaryOp::Or => Prec::BitOr,
            BinaryOp::LAnd => Prec::LogicalAnd,
            BinaryOp::LOr => Prec::LogicalOr,
            _ => Prec::Assignment,
        }
    }
}

fn is_comparison(op: BinaryOp) -> bool {
    matches!(
        op,
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExprText {
    pub(crate) text: String,
    pub(crate) prec: Prec,
}

impl ExprText {
    pub(crate) fn new(text: impl Into<String>, prec: Prec) -> Self {
        Self {
            text: text.into(),
            prec,
        }
    }

    pub(crate) fn primary(text: impl Into<String>) -> Self {
        Self::new(text, Prec::Primary)
    }

    /// Text usable where an operand of precedence `min` is expected.
    pub(crate) fn at_least(&self, min: Prec) -> String {
        if self.prec < min {
            format!("({})", self.text)
        } else {
            self.text.clone()
        }
    }

    /// Right operand of a left-associative operator of precedence `prec`.
    fn above(&self, prec: Prec) -> String {
        if self.prec <= prec {
            format!("({})", self.text)
        } else {
            self.text.clone()
        }
    }

    /// Parenthesized unless already primary.
    fn grouped(&self) -> String {
        self.at_least(Prec::Primary)
    }
}

impl<'a> Emitter<'a> {
    pub(crate) fn emit_expr(&mut self, id: ExprId) -> EmitResult<ExprText> {
        let unit = self.unit;
        let expr = unit.expr(id);
        let location = &expr.location;
        match &expr.kind {
            ExprKind::IntegerLiteral { spelling } => {
                self.emit_integer_literal(spelling, expr.ty, location)
            }
            ExprKind::FloatingLiteral { spelling } => {
                self.emit_floating_literal(spelling, expr.ty, location)
            }
            ExprKind::CharacterLiteral { value } => {
                let literal = char_literal(*value);
                let mapped = self.map(expr.ty, Usage::Cast, location)?;
                if accepts_char_constant(&mapped.name) {
                    Ok(ExprText::primary(literal))
                } else {
                    Ok(ExprText::new(
                        format!("({})({})", mapped.name, literal),
                        Prec::Unary,
                    ))
                }
            }
            ExprKind::StringLiteral { value, char_width } => {
                if *char_width != 1 {
                    return Err(EmitError::unsupported(
                        "string literal",
                        location,
                        "only narrow string literals have a UTF-8 literal form",
                    ));
                }
                Ok(ExprText::primary(format!("{}u8", string_literal(value))))
            }
            ExprKind::BoolLiteral(value) => Ok(ExprText::primary(if *value {
                "true"
            } else {
                "false"
            })),
            ExprKind::NullPtrLiteral => Ok(ExprText::primary("null")),
            ExprKind::DeclRef { decl } => self.emit_decl_ref(*decl, location),
            ExprKind::Paren(inner) => {
                let inner = self.emit_expr(*inner)?;
                Ok(ExprText::primary(format!("({})", inner.text)))
            }
            ExprKind::Unary { op, operand } => self.emit_unary(id, *op, *operand),
            ExprKind::Binary { op, lhs, rhs } => {
                if *op == BinaryOp::Comma {
                    return Err(EmitError::unsupported(
                        "comma operator",
                        location,
                        "C# has no sequencing expression",
                    ));
                }
                let raw = self.emit_binary_raw(*op, *lhs, *rhs)?;
                if is_comparison(*op) || op.is_logical() {
                    Ok(self.int_from_bool(expr.ty, raw))
                } else {
                    Ok(raw)
                }
            }
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                let cond = self.emit_condition(*cond)?;
                let then_text = self.emit_expr(*then_expr)?;
                let else_text = self.emit_expr(*else_expr)?;
                Ok(ExprText::new(
                    format!(
                        "{} ? {} : {}",
                        cond.above(Prec::Conditional),
                        then_text.at_least(Prec::Conditional),
                        else_text.at_least(Prec::Conditional)
                    ),
                    Prec::Conditional,
                ))
            }
            ExprKind::Call { callee, args } => self.emit_call(*callee, args, location),
            ExprKind::Member {
                base,
                member,
                is_arrow,
            } => self.emit_member(*base, *member, *is_arrow, location),
            ExprKind::ArraySubscript { base, index } => {
                if matches!(
                    unit.ty(unit.canonical(unit.expr(*base).ty)).kind,
                    TypeKind::Pointer { .. }
                ) {
                    self.ctx.mark_unsafe();
                }
                let base = self.emit_expr(*base)?;
                let index = self.emit_expr(*index)?;
                Ok(ExprText::primary(format!(
                    "{}[{}]",
                    base.at_least(Prec::Primary),
                    index.text
                )))
            }
            ExprKind::ImplicitCast { kind, operand } => self.emit_implicit_cast(id, *kind, *operand),
            ExprKind::ExplicitCast {
                style,
                kind,
                operand,
            } => self.emit_explicit_cast(id, *style, *kind, *operand),
            ExprKind::InitList(elements) => self.emit_init_list(expr.ty, elements, location),
            ExprKind::ImplicitValueInit => Ok(ExprText::primary("default")),
            ExprKind::This { .. } => self.emit_this_pointer(expr.ty, location),
            ExprKind::SizeOf { arg } => {
                let operand = self.map(*arg, Usage::Cast, location)?;
                if !is_fixed_buffer_element(&operand.name) {
                    self.ctx.mark_unsafe();
                }
                let result = self.map(expr.ty, Usage::Cast, location)?;
                let text = format!("sizeof({})", operand.name);
                if result.name == "int" {
                    Ok(ExprText::primary(text))
                } else {
                    Ok(ExprText::new(
                        format!("({})({})", result.name, text),
                        Prec::Unary,
                    ))
                }
            }
            ExprKind::Other { kind } => Err(EmitError::unsupported(
                kind.as_str(),
                location,
                "no C# expression form",
            )),
        }
    }

    /// A condition or logical operand, normalized to `bool`.
    pub(crate) fn emit_condition(&mut self, id: ExprId) -> EmitResult<ExprText> {
        let unit = self.unit;
        let inner = self.ignore_parens(id);
        match &unit.expr(inner).kind {
            ExprKind::Binary { op, lhs, rhs } if is_comparison(*op) || op.is_logical() => {
                self.emit_binary_raw(*op, *lhs, *rhs)
            }
            ExprKind::Unary {
                op: UnaryOp::LNot,
                operand,
            } => self.emit_logical_not(*operand),
            _ => {
                let ty = unit.expr(id).ty;
                let text = self.emit_expr(id)?;
                if self.is_bool(ty) {
                    Ok(text)
                } else if self.is_pointer(ty) {
                    Ok(ExprText::new(format!("({}) != null", text.text), Prec::Equality))
                } else {
                    Ok(ExprText::new(format!("({}) != 0", text.text), Prec::Equality))
                }
            }
        }
    }

    /// Address of an lvalue bound to a reference.
    pub(crate) fn emit_address_of(&mut self, id: ExprId) -> EmitResult<String> {
        let unit = self.unit;
        let mut inner = id;
        loop {
            match &unit.expr(inner).kind {
                ExprKind::Paren(e)
                | ExprKind::ImplicitCast {
                    kind: CastKind::LValueToRValue | CastKind::NoOp,
                    operand: e,
                } => inner = *e,
                _ => break,
            }
        }
        let expr = unit.expr(inner);
        match &expr.kind {
            ExprKind::DeclRef { decl } if self.is_reference_decl(*decl) => {
                Ok(self.name(*decl).to_string())
            }
            ExprKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => Ok(self.emit_expr(*operand)?.text),
            ExprKind::DeclRef { .. } | ExprKind::Member { .. } | ExprKind::ArraySubscript { .. } => {
                self.ctx.mark_unsafe();
                let text = self.emit_expr(inner)?;
                Ok(format!("&{}", text.at_least(Prec::Unary)))
            }
            _ => Err(EmitError::unsupported(
                "reference binding",
                &expr.location,
                "only named lvalues can be passed by reference",
            )),
        }
    }

    /// Name of a reference variable when `id` reads one, so callers can use
    /// the underlying pointer instead of `*name`.
    pub(crate) fn reference_name(&self, id: ExprId) -> Option<&'a str> {
        let unit = self.unit;
        let inner = unit.ignore_implicit(id);
        match unit.expr(inner).kind {
            ExprKind::DeclRef { decl } if self.is_reference_decl(decl) => Some(self.name(decl)),
            _ => None,
        }
    }

    pub(crate) fn ignore_parens(&self, mut id: ExprId) -> ExprId {
        while let ExprKind::Paren(inner) = self.unit.expr(id).kind {
            id = inner;
        }
        id
    }

    /// `Some(negative)` when `id` is an integer literal, possibly negated.
    fn integer_literal_sign(&self, id: ExprId) -> Option<bool> {
        let unit = self.unit;
        match &unit.expr(self.ignore_parens(id)).kind {
            ExprKind::IntegerLiteral { .. } => Some(false),
            ExprKind::Unary {
                op: UnaryOp::Minus,
                operand,
            } if matches!(
                unit.expr(self.ignore_parens(*operand)).kind,
                ExprKind::IntegerLiteral { .. }
            ) =>
            {
                Some(true)
            }
            _ => None,
        }
    }

    pub(crate) fn is_bool(&self, ty: TypeId) -> bool {
        matches!(
            self.unit.ty(self.unit.canonical(ty)).kind,
            TypeKind::Builtin(BuiltinKind::Bool)
        )
    }

    pub(crate) fn is_void_type(&self, ty: TypeId) -> bool {
        self.unit.ty(self.unit.canonical(ty)).is_void()
    }

    fn is_pointer(&self, ty: TypeId) -> bool {
        matches!(
            self.unit.ty(self.unit.canonical(ty)).kind,
            TypeKind::Pointer { .. } | TypeKind::Builtin(BuiltinKind::NullPtr)
        )
    }

    fn is_unsigned(&self, ty: TypeId) -> bool {
        match self.unit.ty(self.unit.canonical(ty)).kind {
            TypeKind::Builtin(kind) => kind.is_unsigned_integer(),
            _ => false,
        }
    }

    fn enum_of(&self, ty: TypeId) -> Option<DeclId> {
        match self.unit.ty(self.unit.canonical(ty)).kind {
            TypeKind::Enum { decl } => Some(decl),
            _ => None,
        }
    }

    /// C# comparisons yield `bool`; C gives them type `int`.
    fn int_from_bool(&self, ty: TypeId, text: ExprText) -> ExprText {
        if self.is_bool(ty) {
            text
        } else {
            ExprText::new(format!("{} ? 1 : 0", text.grouped()), Prec::Conditional)
        }
    }

    fn emit_integer_literal(
        &mut self,
        spelling: &str,
        ty: TypeId,
        location: &SourceLocation,
    ) -> EmitResult<ExprText> {
        let digits = spelling
            .trim_end_matches(['u', 'U', 'l', 'L', 'z', 'Z'])
            .replace('\'', "_");
        let lower = digits.to_ascii_lowercase();
        let body = if lower.starts_with("0x") || lower.starts_with("0b") {
            digits
        } else if digits.len() > 1 && digits.starts_with('0') {
            let octal = digits.replace('_', "");
            u64::from_str_radix(&octal, 8)
                .map(|value| value.to_string())
                .map_err(|_| {
                    EmitError::malformed(
                        "integer literal",
                        location,
                        format!("`{}` is not a valid octal literal", spelling),
                    )
                })?
        } else {
            digits
        };
        let mapped = self.map(ty, Usage::Cast, location)?;
        let suffix = match mapped.name.as_str() {
            "uint" => "U",
            "long" => "L",
            "ulong" => "UL",
            _ => "",
        };
        Ok(ExprText::primary(format!("{}{}", body, suffix)))
    }

    fn emit_floating_literal(
        &mut self,
        spelling: &str,
        ty: TypeId,
        location: &SourceLocation,
    ) -> EmitResult<ExprText> {
        let mut body = spelling
            .trim_end_matches(['f', 'F', 'l', 'L'])
            .replace('\'', "_");
        if body.starts_with('.') {
            body.insert(0, '0');
        }
        if body.ends_with('.') {
            body.push('0');
        }
        body = body.replace(".e", ".0e").replace(".E", ".0E");
        let mapped = self.map(ty, Usage::Cast, location)?;
        if mapped.name == "float" {
            body.push('f');
        }
        Ok(ExprText::primary(body))
    }

    fn emit_decl_ref(&mut self, decl: DeclId, location: &SourceLocation) -> EmitResult<ExprText> {
        let d = self.decl(decl);
        let name = self.name(decl);
        match &d.kind {
            DeclKind::EnumConstant { .. } => Ok(self.emit_enum_constant(decl)),
            DeclKind::Function { .. } => {
                self.import_methods_class();
                Ok(ExprText::primary(name))
            }
            DeclKind::Var { .. } if self.symbols.is_global(decl) => {
                self.import_methods_class();
                Ok(ExprText::primary(name))
            }
            DeclKind::Var { .. } | DeclKind::Method { .. }
                if d.parent.is_some_and(|p| self.is_record(p)) =>
            {
                Ok(ExprText::primary(self.member_reference(decl)))
            }
            DeclKind::Var { ty, .. } | DeclKind::Param { ty } => {
                if self.is_reference(*ty) {
                    self.ctx.mark_unsafe();
                    Ok(ExprText::new(format!("*{}", name), Prec::Unary))
                } else {
                    Ok(ExprText::primary(name))
                }
            }
            DeclKind::Field { .. } => Ok(ExprText::primary(name)),
            _ => Err(EmitError::malformed(
                "declaration reference",
                location,
                format!("`{}` ({}) is not a value", d.name, d.kind.kind_name()),
            )),
        }
    }

    fn is_record(&self, decl: DeclId) -> bool {
        matches!(self.decl(decl).kind, DeclKind::Record { .. })
    }

    /// A static member named from the current scope.
    fn member_reference(&self, decl: DeclId) -> String {
        let name = self.name(decl);
        match self.decl(decl).parent {
            Some(parent) if Some(parent) != self.ctx.current_record() => format!(
                "{}.{}",
                self.types.qualified_name(parent, self.ctx.current_record()),
                name
            ),
            _ => name.to_string(),
        }
    }

    fn emit_enum_constant(&mut self, constant: DeclId) -> ExprText {
        let name = self.name(constant);
        let Some(enumeration) = self.decl(constant).parent else {
            return ExprText::primary(name);
        };
        let e = self.decl(enumeration);
        let is_named = !e.name.is_empty() || self.symbols.naming_typedef(enumeration).is_some();
        let is_scoped = matches!(e.kind, DeclKind::Enum { is_scoped: true, .. });
        if !is_named {
            self.import_methods_class();
            ExprText::primary(name)
        } else if is_scoped {
            ExprText::primary(format!(
                "{}.{}",
                self.types
                    .qualified_name(enumeration, self.ctx.current_record()),
                name
            ))
        } else {
            let full = self.full_type_name(enumeration);
            self.ctx.add_static_using(full);
            ExprText::primary(name)
        }
    }

    fn emit_unary(&mut self, id: ExprId, op: UnaryOp, operand: ExprId) -> EmitResult<ExprText> {
        let unit = self.unit;
        match op {
            UnaryOp::LNot => {
                let raw = self.emit_logical_not(operand)?;
                Ok(self.int_from_bool(unit.expr(id).ty, raw))
            }
            UnaryOp::PostInc | UnaryOp::PostDec => {
                let text = self.emit_expr(operand)?;
                let symbol = if op == UnaryOp::PostInc { "++" } else { "--" };
                Ok(ExprText::primary(format!(
                    "{}{}",
                    text.at_least(Prec::Primary),
                    symbol
                )))
            }
            UnaryOp::AddrOf => {
                if let Some(name) = self.reference_name(operand) {
                    return Ok(ExprText::primary(name));
                }
                self.ctx.mark_unsafe();
                let text = self.emit_expr(operand)?;
                Ok(ExprText::new(
                    format!("&{}", text.at_least(Prec::Unary)),
                    Prec::Unary,
                ))
            }
            _ => {
                let symbol = match op {
                    UnaryOp::PreInc => "++",
                    UnaryOp::PreDec => "--",
                    UnaryOp::Deref => "*",
                    UnaryOp::Plus => "+",
                    UnaryOp::Minus => "-",
                    _ => "~",
                };
                if op == UnaryOp::Deref {
                    self.ctx.mark_unsafe();
                }
                let text = self.emit_expr(operand)?;
                let mut inner = text.at_least(Prec::Unary);
                // `- -x` must not fuse into `--x`.
                if matches!(symbol, "+" | "-" | "++" | "--") && inner.starts_with(['+', '-']) {
                    inner = format!("({})", inner);
                }
                Ok(ExprText::new(format!("{}{}", symbol, inner), Prec::Unary))
            }
        }
    }

    fn emit_logical_not(&mut self, operand: ExprId) -> EmitResult<ExprText> {
        let operand = self.emit_condition(operand)?;
        Ok(ExprText::new(
            format!("!{}", operand.at_least(Prec::Unary)),
            Prec::Unary,
        ))
    }

    /// A binary operation as C# types it: comparisons and logical
    /// operators yield `bool`.
    fn emit_binary_raw(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId) -> EmitResult<ExprText> {
        let prec = Prec::of_binary(op);
        let (left, right) = if op.is_logical() {
            (self.emit_condition(lhs)?, self.emit_condition(rhs)?)
        } else if let Some(operands) = self.same_enum_operands(op, lhs, rhs)? {
            operands
        } else {
            (self.emit_expr(lhs)?, self.emit_expr(rhs)?)
        };

        if op.is_assignment() {
            return Ok(ExprText::new(
                format!(
                    "{} {} {}",
                    left.at_least(Prec::Unary),
                    op.symbol(),
                    right.at_least(Prec::Assignment)
                ),
                Prec::Assignment,
            ));
        }
        Ok(ExprText::new(
            format!("{} {} {}", left.at_least(prec), op.symbol(), right.above(prec)),
            prec,
        ))
    }

    /// Enum operands promoted to `int` for a comparison compare as enums in
    /// C#, so the promotions are dropped.
    fn same_enum_operands(
        &mut self,
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    ) -> EmitResult<Option<(ExprText, ExprText)>> {
        if !is_comparison(op) {
            return Ok(None);
        }
        let unit = self.unit;
        let promoted = |id: ExprId| match unit.expr(id).kind {
            ExprKind::ImplicitCast {
                kind: CastKind::IntegralCast,
                operand,
            } => Some(operand),
            _ => None,
        };
        let (Some(left), Some(right)) = (promoted(lhs), promoted(rhs)) else {
            return Ok(None);
        };
        match (
            self.enum_of(unit.expr(left).ty),
            self.enum_of(unit.expr(right).ty),
        ) {
            (Some(a), Some(b)) if self.symbols.definition(a) == self.symbols.definition(b) => {
                Ok(Some((self.emit_expr(left)?, self.emit_expr(right)?)))
            }
            _ => Ok(None),
        }
    }

    fn emit_call(
        &mut self,
        callee: ExprId,
        args: &[ExprId],
        location: &SourceLocation,
    ) -> EmitResult<ExprText> {
        let unit = self.unit;
        let target = unit.ignore_implicit(callee);
        match &unit.expr(target).kind {
            ExprKind::DeclRef { decl } => match &unit.decl(*decl).kind {
                DeclKind::Function { ty, .. } => {
                    self.import_methods_class();
                    let args = self.emit_args(*ty, args, location)?;
                    Ok(ExprText::primary(format!(
                        "{}({})",
                        self.name(*decl),
                        args.join(", ")
                    )))
                }
                DeclKind::Method { ty, .. } => {
                    let args = self.emit_args(*ty, args, location)?;
                    Ok(ExprText::primary(format!(
                        "{}({})",
                        self.member_reference(*decl),
                        args.join(", ")
                    )))
                }
                _ => self.emit_indirect_call(callee, args, location),
            },
            ExprKind::Member {
                base,
                member,
                is_arrow,
            } if matches!(unit.decl(*member).kind, DeclKind::Method { .. }) => {
                self.emit_method_call(*base, *member, *is_arrow, args, location)
            }
            _ => self.emit_indirect_call(callee, args, location),
        }
    }

    /// Call through a function pointer value.
    fn emit_indirect_call(
        &mut self,
        callee: ExprId,
        args: &[ExprId],
        location: &SourceLocation,
    ) -> EmitResult<ExprText> {
        let callee_ty = self.unit.expr(callee).ty;
        let callee_text = self.emit_expr(callee)?;
        let args = self.emit_args(callee_ty, args, location)?;
        self.ctx.mark_unsafe();
        Ok(ExprText::primary(format!(
            "{}({})",
            callee_text.at_least(Prec::Primary),
            args.join(", ")
        )))
    }

    fn emit_method_call(
        &mut self,
        base: ExprId,
        method: DeclId,
        is_arrow: bool,
        args: &[ExprId],
        location: &SourceLocation,
    ) -> EmitResult<ExprText> {
        let unit = self.unit;
        let DeclKind::Method {
            ty,
            is_static,
            is_virtual,
            body,
            ..
        } = &unit.decl(method).kind
        else {
            return Err(EmitError::malformed("call", location, "callee is not a method"));
        };
        let mut args = self.emit_args(*ty, args, location)?;

        if *is_static {
            return Ok(ExprText::primary(format!(
                "{}({})",
                self.member_reference(method),
                args.join(", ")
            )));
        }

        if !is_virtual && body.is_none() {
            // Imported through DllImport with an explicit receiver.
            let receiver = match &unit.expr(base).kind {
                ExprKind::This { .. } => {
                    let this_ty = unit.expr(base).ty;
                    self.emit_this_pointer(this_ty, location)?.text
                }
                _ if is_arrow => self.emit_expr(base)?.text,
                _ => self.emit_address_of(base)?,
            };
            args.insert(0, receiver);
            return Ok(ExprText::primary(format!(
                "{}({})",
                self.member_reference(method),
                args.join(", ")
            )));
        }

        let prefix = self.member_prefix(base, is_arrow, method)?;
        Ok(ExprText::primary(format!(
            "{}{}({})",
            prefix,
            self.name(method),
            args.join(", ")
        )))
    }

    /// Arguments for a call of a function of type `fn_ty`. Reference
    /// parameters take the argument's address; variadic tails are passed
    /// through `__arglist`.
    fn emit_args(
        &mut self,
        fn_ty: TypeId,
        args: &[ExprId],
        location: &SourceLocation,
    ) -> EmitResult<Vec<String>> {
        let unit = self.unit;
        let (params, is_variadic) = match unit.function_proto(fn_ty).map(|p| &unit.ty(p).kind) {
            Some(TypeKind::FunctionProto {
                params,
                is_variadic,
                ..
            }) => (params.as_slice(), *is_variadic),
            _ => (&[][..], false),
        };

        let mut out = Vec::with_capacity(args.len());
        let mut variadic = Vec::new();
        for (index, arg) in args.iter().enumerate() {
            match params.get(index) {
                Some(param) if self.is_reference(*param) => out.push(self.emit_address_of(*arg)?),
                Some(_) => out.push(self.emit_expr(*arg)?.text),
                None if is_variadic => variadic.push(self.emit_expr(*arg)?.text),
                None => {
                    return Err(EmitError::malformed(
                        "call",
                        location,
                        format!("{} arguments passed to {} parameters", args.len(), params.len()),
                    ))
                }
            }
        }
        if is_variadic {
            out.push(format!("__arglist({})", variadic.join(", ")));
        }
        Ok(out)
    }

    fn emit_member(
        &mut self,
        base: ExprId,
        member: DeclId,
        is_arrow: bool,
        location: &SourceLocation,
    ) -> EmitResult<ExprText> {
        match &self.decl(member).kind {
            DeclKind::Field { .. } => {
                let prefix = self.member_prefix(base, is_arrow, member)?;
                Ok(ExprText::primary(format!("{}{}", prefix, self.name(member))))
            }
            DeclKind::Var { .. } => Ok(ExprText::primary(self.member_reference(member))),
            DeclKind::Method { .. } => Err(EmitError::unsupported(
                "member access",
                location,
                "pointers to member functions are not supported",
            )),
            other => Err(EmitError::malformed(
                "member access",
                location,
                format!("member is a {}", other.kind_name()),
            )),
        }
    }

    /// Everything written before a member name: the object, `.` or `->`,
    /// `Base.` hops for non-polymorphic bases, and the synthesized fields of
    /// anonymous records the member lives in.
    fn member_prefix(&mut self, base: ExprId, is_arrow: bool, member: DeclId) -> EmitResult<String> {
        let unit = self.unit;
        let base_expr = unit.expr(base);
        let (mut prefix, object) = match &base_expr.kind {
            ExprKind::This { implicit: true } => (String::new(), self.ctx.current_record()),
            ExprKind::This { implicit: false } => {
                ("this.".to_string(), self.ctx.current_record())
            }
            _ => {
                let object = if is_arrow {
                    unit.pointee_record(base_expr.ty)
                } else {
                    unit.record_decl_of(base_expr.ty)
                };
                if let Some(name) = self.reference_name(base) {
                    self.ctx.mark_unsafe();
                    (format!("{}->", name), object)
                } else {
                    let text = self.emit_expr(base)?;
                    if is_arrow {
                        self.ctx.mark_unsafe();
                        (format!("{}->", text.at_least(Prec::Primary)), object)
                    } else {
                        (format!("{}.", text.at_least(Prec::Primary)), object)
                    }
                }
            }
        };

        let Some(owner) = self.decl(member).parent else {
            return Ok(prefix);
        };
        let mut named_owner = owner;
        while let Some(anonymous) = self.symbols.anonymous_member(named_owner) {
            named_owner = anonymous.enclosing;
        }
        if let Some(object) = object {
            let object = self.symbols.definition(object);
            if object != self.symbols.definition(named_owner) && !self.symbols.is_polymorphic(object) {
                if let Some(chain) = self.base_chain(object, named_owner) {
                    for _ in chain {
                        prefix.push_str("Base.");
                    }
                }
            }
        }
        for segment in self.symbols.forwarding_path(owner) {
            prefix.push_str(&segment);
            prefix.push('.');
        }
        Ok(prefix)
    }

    /// `this` used as a pointer value.
    fn emit_this_pointer(&mut self, ty: TypeId, location: &SourceLocation) -> EmitResult<ExprText> {
        let mapped = self.map(ty, Usage::Cast, location)?;
        self.ctx.add_using(USING_COMPILER_SERVICES);
        Ok(ExprText::new(
            format!("({})Unsafe.AsPointer(ref this)", mapped.name),
            Prec::Unary,
        ))
    }

    fn cast_to(
        &mut self,
        target: TypeId,
        operand: &ExprText,
        location: &SourceLocation,
    ) -> EmitResult<ExprText> {
        let mapped = self.map(target, Usage::Cast, location)?;
        Ok(ExprText::new(
            format!("({})({})", mapped.name, operand.text),
            Prec::Unary,
        ))
    }

    fn emit_implicit_cast(
        &mut self,
        id: ExprId,
        kind: CastKind,
        operand: ExprId,
    ) -> EmitResult<ExprText> {
        let unit = self.unit;
        let expr = unit.expr(id);
        let location = &expr.location;
        let target = expr.ty;
        let source = unit.expr(operand).ty;

        match kind {
            CastKind::LValueToRValue | CastKind::NoOp => self.emit_expr(operand),
            CastKind::ArrayToPointerDecay => {
                let inner = self.ignore_parens(operand);
                if let ExprKind::StringLiteral { .. } = unit.expr(inner).kind {
                    let literal = self.emit_expr(inner)?;
                    let mapped = self.map(target, Usage::Cast, location)?;
                    self.ctx.add_using(USING_COMPILER_SERVICES);
                    self.ctx.add_using(USING_INTEROP);
                    return Ok(ExprText::new(
                        format!(
                            "({})Unsafe.AsPointer(ref MemoryMarshal.GetReference({}))",
                            mapped.name, literal.text
                        ),
                        Prec::Unary,
                    ));
                }
                self.emit_expr(operand)
            }
            CastKind::FunctionToPointerDecay => {
                let text = self.emit_expr(operand)?;
                self.ctx.mark_unsafe();
                Ok(ExprText::new(
                    format!("&{}", text.at_least(Prec::Unary)),
                    Prec::Unary,
                ))
            }
            CastKind::IntegralCast => self.emit_integral_cast(target, operand, location),
            CastKind::IntegralToBoolean
            | CastKind::FloatingToBoolean
            | CastKind::PointerToBoolean => self.emit_condition(operand),
            CastKind::IntegralToFloating => {
                if self.is_bool(source) {
                    let value = self.emit_expr(operand)?;
                    return Ok(ExprText::new(
                        format!("{} ? 1 : 0", value.grouped()),
                        Prec::Conditional,
                    ));
                }
                self.emit_expr(operand)
            }
            CastKind::FloatingToIntegral
            | CastKind::PointerToIntegral
            | CastKind::IntegralToPointer => {
                let text = self.emit_expr(operand)?;
                self.cast_to(target, &text, location)
            }
            CastKind::FloatingCast => {
                let text = self.emit_expr(operand)?;
                let to = self.map(target, Usage::Cast, location)?;
                let from = self.map(source, Usage::Cast, location)?;
                if to.name == "float" && from.name != "float" {
                    self.cast_to(target, &text, location)
                } else {
                    Ok(text)
                }
            }
            CastKind::BitCast => {
                let text = self.emit_expr(operand)?;
                let to = self.map(target, Usage::Cast, location)?;
                let from = self.map(source, Usage::Cast, location)?;
                if to.name == from.name || to.name == "void*" {
                    Ok(text)
                } else {
                    self.cast_to(target, &text, location)
                }
            }
            CastKind::NullToPointer => Ok(ExprText::primary("null")),
            CastKind::DerivedToBase | CastKind::BaseToDerived => {
                self.emit_hierarchy_cast(target, source, operand, location)
            }
            CastKind::Dynamic | CastKind::ToVoid | CastKind::Other => Err(EmitError::unsupported(
                "implicit cast",
                location,
                format!("{:?} conversion has no C# equivalent", kind),
            )),
        }
    }

    fn emit_integral_cast(
        &mut self,
        target: TypeId,
        operand: ExprId,
        location: &SourceLocation,
    ) -> EmitResult<ExprText> {
        let unit = self.unit;
        let source = unit.expr(operand).ty;
        if self.is_bool(source) && !self.is_bool(target) {
            let value = self.emit_expr(operand)?;
            return Ok(ExprText::new(
                format!("{} ? 1 : 0", value.grouped()),
                Prec::Conditional,
            ));
        }

        let text = self.emit_expr(operand)?;
        let source_enum = self.enum_of(source);
        let target_enum = self.enum_of(target);

        if let Some(negative) = self.integer_literal_sign(operand) {
            if target_enum.is_some() {
                return self.cast_to(target, &text, location);
            }
            if negative && self.is_unsigned(target) {
                let mapped = self.map(target, Usage::Cast, location)?;
                return Ok(ExprText::primary(format!(
                    "unchecked(({})({}))",
                    mapped.name, text.text
                )));
            }
            // Constant conversion.
            return Ok(text);
        }

        if source_enum.is_some() || target_enum.is_some() {
            if source_enum.map(|e| self.symbols.definition(e))
                == target_enum.map(|e| self.symbols.definition(e))
            {
                return Ok(text);
            }
            return self.cast_to(target, &text, location);
        }

        let to = self.map(target, Usage::Cast, location)?;
        let from = self.map(source, Usage::Cast, location)?;
        if is_implicit_integer_conversion(&from.name, &to.name) {
            Ok(text)
        } else {
            self.cast_to(target, &text, location)
        }
    }

    fn emit_hierarchy_cast(
        &mut self,
        target: TypeId,
        source: TypeId,
        operand: ExprId,
        location: &SourceLocation,
    ) -> EmitResult<ExprText> {
        let text = self.emit_expr(operand)?;
        if self.is_pointer(target) {
            return self.cast_to(target, &text, location);
        }
        let unit = self.unit;
        if let (Some(from), Some(to)) = (unit.record_decl_of(source), unit.record_decl_of(target)) {
            if !self.symbols.is_polymorphic(from) {
                if let Some(chain) = self.base_chain(from, to) {
                    let mut path = text.at_least(Prec::Primary);
                    for _ in chain {
                        path.push_str(".Base");
                    }
                    return Ok(ExprText::primary(path));
                }
            }
        }
        Err(EmitError::unsupported(
            "base conversion",
            location,
            "polymorphic records can only be converted through pointers",
        ))
    }

    fn emit_explicit_cast(
        &mut self,
        id: ExprId,
        style: CastStyle,
        kind: CastKind,
        operand: ExprId,
    ) -> EmitResult<ExprText> {
        let unit = self.unit;
        let expr = unit.expr(id);
        let location = &expr.location;
        let target = expr.ty;
        let source = unit.expr(operand).ty;

        match style {
            CastStyle::Const => return self.emit_expr(operand),
            CastStyle::Dynamic => return self.emit_dynamic_cast(target, source, operand, location),
            _ => {}
        }

        match kind {
            CastKind::ToVoid => Err(EmitError::unsupported(
                "void cast",
                location,
                "discarded values are only supported as statements",
            )),
            CastKind::IntegralToBoolean
            | CastKind::FloatingToBoolean
            | CastKind::PointerToBoolean => self.emit_condition(operand),
            _ if self.is_bool(source) && !self.is_bool(target) => {
                let value = self.emit_expr(operand)?;
                let as_int = ExprText::new(format!("{} ? 1 : 0", value.grouped()), Prec::Conditional);
                let mapped = self.map(target, Usage::Cast, location)?;
                if mapped.name == "int" {
                    Ok(as_int)
                } else {
                    self.cast_to(target, &as_int, location)
                }
            }
            _ if self.is_unsigned(target) && self.integer_literal_sign(operand) == Some(true) => {
                let text = self.emit_expr(operand)?;
                let mapped = self.map(target, Usage::Cast, location)?;
                Ok(ExprText::primary(format!(
                    "unchecked(({})({}))",
                    mapped.name, text.text
                )))
            }
            _ => {
                let text = self.emit_expr(operand)?;
                self.cast_to(target, &text, location)
            }
        }
    }

    /// Pointer downcast within a single-inheritance polymorphic hierarchy,
    /// emitted unchecked.
    fn emit_dynamic_cast(
        &mut self,
        target: TypeId,
        source: TypeId,
        operand: ExprId,
        location: &SourceLocation,
    ) -> EmitResult<ExprText> {
        let unit = self.unit;
        let downcast = match (
            self.is_pointer(target),
            unit.pointee_record(target),
            unit.pointee_record(source),
        ) {
            (true, Some(derived), Some(base)) => {
                self.symbols.is_polymorphic(base)
                    && matches!(self.symbols.vtable(derived), Some(Ok(_)))
                    && self.base_chain(derived, base).is_some()
            }
            _ => false,
        };
        if !downcast {
            return Err(EmitError::unsupported(
                "dynamic_cast",
                location,
                "only pointer downcasts within a single-inheritance polymorphic hierarchy are supported",
            ));
        }
        let text = self.emit_expr(operand)?;
        self.cast_to(target, &text, location)
    }

    fn emit_init_list(
        &mut self,
        ty: TypeId,
        elements: &[ExprId],
        location: &SourceLocation,
    ) -> EmitResult<ExprText> {
        let unit = self.unit;
        match &unit.ty(unit.canonical(ty)).kind {
            TypeKind::ConstantArray { element, size } => {
                let element = self.map(*element, Usage::Pointee, location)?;
                if elements.len() as u64 > *size {
                    return Err(EmitError::malformed(
                        "initializer list",
                        location,
                        format!("{} elements for an array of {}", elements.len(), size),
                    ));
                }
                if elements.is_empty() {
                    return Ok(ExprText::primary(format!("new {}[{}]", element.name, size)));
                }
                let mut w = CodeWriter::new();
                w.line(&format!("new {}[{}]", element.name, size));
                w.open();
                for index in 0..*size as usize {
                    let text = match elements.get(index) {
                        Some(e) => self.emit_expr(*e)?.text,
                        None => "default".to_string(),
                    };
                    w.line(&format!("{},", text));
                }
                w.close();
                Ok(ExprText::primary(w.finish_trimmed()))
            }
            TypeKind::Record { decl } => {
                let record = self.symbols.definition(*decl);
                let name = self.map(ty, Usage::Local, location)?.name;
                if elements.is_empty() {
                    return Ok(ExprText::primary(format!("new {}()", name)));
                }
                let targets = self.initializable_members(record);
                if elements.len() > targets.len() {
                    return Err(EmitError::malformed(
                        "initializer list",
                        location,
                        format!("{} elements for {} fields", elements.len(), targets.len()),
                    ));
                }
                let mut w = CodeWriter::new();
                w.line(&format!("new {}", name));
                w.open();
                for (member, element) in targets.iter().zip(elements) {
                    if matches!(unit.expr(*element).kind, ExprKind::ImplicitValueInit) {
                        continue;
                    }
                    let text = self.emit_expr(*element)?;
                    w.line(&format!("{} = {},", member, text.text));
                }
                w.close();
                Ok(ExprText::primary(w.finish_trimmed()))
            }
            _ => match elements {
                [] => Ok(ExprText::primary("default")),
                [single] => self.emit_expr(*single),
                _ => Err(EmitError::malformed(
                    "initializer list",
                    location,
                    "scalar initialized with several values",
                )),
            },
        }
    }

    /// Members an initializer list binds to, in order. A union binds its
    /// first member only.
    fn initializable_members(&self, record: DeclId) -> Vec<String> {
        let unit = self.unit;
        let is_union = matches!(
            unit.decl(record).kind,
            DeclKind::Record {
                tag: RecordTag::Union,
                ..
            }
        );
        let mut members = Vec::new();
        for member in unit.record_members(record) {
            match &unit.decl(*member).kind {
                DeclKind::Field { .. } => members.push(self.name(*member).to_string()),
                DeclKind::Record {
                    is_anonymous: true, ..
                } => {
                    if let Some(anonymous) = self.symbols.anonymous_member(*member) {
                        members.push(anonymous.field.to_string());
                    }
                }
                _ => continue,
            }
            if is_union {
                break;
            }
        }
        members
    }
}

/// C# converts a `char` constant implicitly to these.
fn accepts_char_constant(name: &str) -> bool {
    match IntegerInfo::of(name) {
        Some(info) => name == "char" || info.rank >= 4,
        None => matches!(name, "float" | "double"),
    }
}
