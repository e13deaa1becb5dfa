//! Statement emission.
//!
//! Statements are written straight into a [`CodeWriter`]. Every nested body
//! becomes a braced block, and a blank line follows any block-bearing
//! statement and the last of a run of declarations.

use crate::emitter::Emitter;
use crate::error::{EmitError, EmitResult};
use crate::type_map::Usage;
use crate::writer::CodeWriter;
use sharpen_clang::{
    BinaryOp, CastKind, DeclId, DeclKind, ExprId, ExprKind, StmtId, StmtKind, StorageClass,
    TranslationUnit, TypeKind, UnaryOp,
};
use sharpen_common::SourceLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Spacing {
    Block,
    Declaration,
    Simple,
}

impl Spacing {
    fn of(kind: &StmtKind) -> Spacing {
        match kind {
            StmtKind::Compound(_)
            | StmtKind::If { .. }
            | StmtKind::While { .. }
            | StmtKind::Do { .. }
            | StmtKind::For { .. }
            | StmtKind::Switch { .. } => Spacing::Block,
            StmtKind::Decl(_) => Spacing::Declaration,
            _ => Spacing::Simple,
        }
    }

    fn blank_between(previous: Spacing, next: Spacing) -> bool {
        match previous {
            Spacing::Block => true,
            Spacing::Declaration => next != Spacing::Declaration,
            Spacing::Simple => false,
        }
    }
}

/// One `case` group of a switch: its stacked labels and the statements up
/// to the next label.
struct SwitchSection {
    labels: Vec<String>,
    body: Vec<StmtId>,
}

impl SwitchSection {
    /// No statements other than `;`, so control falls into the next label.
    fn is_empty(&self, unit: &TranslationUnit) -> bool {
        self.body
            .iter()
            .all(|s| matches!(unit.stmt(*s).kind, StmtKind::Null))
    }
}

impl<'a> Emitter<'a> {
    /// `id` as a braced block. A compound statement supplies the braces;
    /// anything else is wrapped.
    pub(crate) fn emit_block(&mut self, id: StmtId, w: &mut CodeWriter) -> EmitResult<()> {
        let unit = self.unit;
        match &unit.stmt(id).kind {
            StmtKind::Compound(children) => self.emit_braced(children, w),
            _ => self.emit_braced(std::slice::from_ref(&id), w),
        }
    }

    fn emit_braced(&mut self, stmts: &[StmtId], w: &mut CodeWriter) -> EmitResult<()> {
        w.open();
        self.emit_statements(stmts, w)?;
        w.close();
        Ok(())
    }

    pub(crate) fn emit_statements(&mut self, stmts: &[StmtId], w: &mut CodeWriter) -> EmitResult<()> {
        let unit = self.unit;
        let mut previous = None;
        for &stmt in stmts {
            let kind = &unit.stmt(stmt).kind;
            if matches!(kind, StmtKind::Null) {
                continue;
            }
            let spacing = Spacing::of(kind);
            if previous.is_some_and(|p| Spacing::blank_between(p, spacing)) {
                w.blank();
            }
            self.emit_stmt(stmt, w)?;
            previous = Some(spacing);
        }
        Ok(())
    }

    pub(crate) fn emit_stmt(&mut self, id: StmtId, w: &mut CodeWriter) -> EmitResult<()> {
        let unit = self.unit;
        let stmt = unit.stmt(id);
        let location = &stmt.location;
        match &stmt.kind {
            StmtKind::Compound(children) => self.emit_braced(children, w),
            StmtKind::Decl(decls) => {
                for line in self.emit_local_decls(decls, location)? {
                    w.line(&format!("{};", line));
                }
                Ok(())
            }
            StmtKind::Expr(expr) => {
                let text = self.emit_expr_statement(*expr)?;
                w.line(&format!("{};", text));
                Ok(())
            }
            StmtKind::Return(value) => self.emit_return(*value, location, w),
            StmtKind::If { .. } => self.emit_if(id, "", w),
            StmtKind::While { cond, body } => {
                let cond = self.emit_condition(*cond)?;
                w.line(&format!("while ({})", cond.text));
                self.emit_block(*body, w)
            }
            StmtKind::Do { body, cond } => {
                w.line("do");
                self.emit_block(*body, w)?;
                let cond = self.emit_condition(*cond)?;
                w.line(&format!("while ({});", cond.text));
                Ok(())
            }
            StmtKind::For {
                init,
                cond,
                inc,
                body,
            } => {
                let init = match init {
                    Some(init) => self.emit_for_init(*init)?,
                    None => String::new(),
                };
                let cond = match cond {
                    Some(cond) => format!(" {}", self.emit_condition(*cond)?.text),
                    None => String::new(),
                };
                let inc = match inc {
                    Some(inc) => format!(" {}", self.emit_expr_statement(*inc)?),
                    None => String::new(),
                };
                w.line(&format!("for ({};{};{})", init, cond, inc));
                self.emit_block(*body, w)
            }
            StmtKind::Switch { cond, body } => {
                let cond = self.emit_expr(*cond)?;
                w.line(&format!("switch ({})", cond.text));
                w.open();
                self.emit_switch_body(*body, location, w)?;
                w.close();
                Ok(())
            }
            StmtKind::Case { .. } | StmtKind::Default { .. } => Err(EmitError::unsupported(
                stmt.kind.kind_name(),
                location,
                "labels nested below the top of a switch body cannot be expressed",
            )),
            StmtKind::Break => {
                w.line("break;");
                Ok(())
            }
            StmtKind::Continue => {
                w.line("continue;");
                Ok(())
            }
            StmtKind::Null => Ok(()),
            StmtKind::Other { kind } => Err(EmitError::unsupported(
                kind.as_str(),
                location,
                "no C# statement form",
            )),
        }
    }

    /// `if`, with `else if` chains kept flat.
    fn emit_if(&mut self, id: StmtId, prefix: &str, w: &mut CodeWriter) -> EmitResult<()> {
        let unit = self.unit;
        let StmtKind::If {
            cond,
            then_branch,
            else_branch,
        } = &unit.stmt(id).kind
        else {
            return self.emit_stmt(id, w);
        };
        let cond = self.emit_condition(*cond)?;
        w.line(&format!("{}if ({})", prefix, cond.text));
        self.emit_block(*then_branch, w)?;
        if let Some(else_branch) = else_branch {
            if matches!(unit.stmt(*else_branch).kind, StmtKind::If { .. }) {
                self.emit_if(*else_branch, "else ", w)?;
            } else {
                w.line("else");
                self.emit_block(*else_branch, w)?;
            }
        }
        Ok(())
    }

    fn emit_return(
        &mut self,
        value: Option<ExprId>,
        location: &SourceLocation,
        w: &mut CodeWriter,
    ) -> EmitResult<()> {
        let return_type = self.ctx.return_type();
        let returns_void = return_type.map_or(true, |ty| self.is_void_type(ty));
        match value {
            None => {
                if !returns_void {
                    return Err(EmitError::malformed(
                        "return statement",
                        location,
                        "missing value in a function returning a value",
                    ));
                }
                w.line("return;");
            }
            Some(value) if returns_void && return_type.is_some() => {
                // `return f();` from a void function.
                let text = self.emit_expr_statement(value)?;
                w.line(&format!("{};", text));
                w.line("return;");
            }
            Some(value) => {
                let text = match return_type {
                    Some(ty) if self.is_reference(ty) => self.emit_address_of(value)?,
                    _ => self.emit_expr(value)?.text,
                };
                w.line(&format!("return {};", text));
            }
        }
        Ok(())
    }

    /// An expression evaluated for its effect. C# only allows assignments,
    /// calls and increments there; anything else is discarded explicitly.
    pub(crate) fn emit_expr_statement(&mut self, id: ExprId) -> EmitResult<String> {
        let unit = self.unit;
        let inner = self.ignore_parens(id);
        match &unit.expr(inner).kind {
            ExprKind::ExplicitCast {
                kind: CastKind::ToVoid,
                operand,
                ..
            }
            | ExprKind::ImplicitCast {
                kind: CastKind::ToVoid,
                operand,
            } => Ok(format!("_ = {}", self.emit_expr(*operand)?.text)),
            ExprKind::Binary { op, .. } if op.is_assignment() || *op == BinaryOp::Comma => {
                Ok(self.emit_expr(inner)?.text)
            }
            ExprKind::Call { .. }
            | ExprKind::Unary {
                op: UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec,
                ..
            } => Ok(self.emit_expr(inner)?.text),
            _ => Ok(format!("_ = {}", self.emit_expr(id)?.text)),
        }
    }

    fn emit_for_init(&mut self, init: StmtId) -> EmitResult<String> {
        let unit = self.unit;
        let stmt = unit.stmt(init);
        match &stmt.kind {
            StmtKind::Decl(decls) => {
                let mut lines = self.emit_local_decls(decls, &stmt.location)?;
                if lines.len() > 1 {
                    return Err(EmitError::unsupported(
                        "for statement",
                        &stmt.location,
                        "a for initializer can only declare variables of one type",
                    ));
                }
                Ok(lines.pop().unwrap_or_default())
            }
            StmtKind::Expr(expr) => self.emit_expr_statement(*expr),
            StmtKind::Null => Ok(String::new()),
            other => Err(EmitError::malformed(
                "for statement",
                &stmt.location,
                format!("{} as initializer", other.kind_name()),
            )),
        }
    }

    /// Declarations of one statement, one line per run of variables sharing
    /// a C# type (`int y = 1, z = 2`). Lines carry no terminator.
    fn emit_local_decls(
        &mut self,
        decls: &[DeclId],
        location: &SourceLocation,
    ) -> EmitResult<Vec<String>> {
        let mut lines: Vec<(String, Vec<String>)> = Vec::new();
        for &decl in decls {
            let (ty, declarator) = self.emit_local(decl, location)?;
            match lines.last_mut() {
                Some((last_ty, declarators)) if *last_ty == ty => declarators.push(declarator),
                _ => lines.push((ty, vec![declarator])),
            }
        }
        Ok(lines
            .into_iter()
            .map(|(ty, declarators)| format!("{} {}", ty, declarators.join(", ")))
            .collect())
    }

    /// C# type and declarator of one local.
    fn emit_local(
        &mut self,
        decl: DeclId,
        location: &SourceLocation,
    ) -> EmitResult<(String, String)> {
        let unit = self.unit;
        let d = unit.decl(decl);
        let name = self.name(decl);
        let DeclKind::Var { ty, init, storage } = &d.kind else {
            return Err(EmitError::unsupported(
                d.kind.kind_name(),
                &d.location,
                "only variables can be declared inside a function body",
            ));
        };
        if *storage == StorageClass::Static {
            return Err(EmitError::unsupported(
                "static local",
                &d.location,
                "C# has no function-scoped statics",
            ));
        }

        let mapped = self.map(*ty, Usage::Local, &d.location)?;
        if self.is_reference(*ty) {
            let Some(init) = init else {
                return Err(EmitError::malformed(
                    "reference",
                    &d.location,
                    format!("reference `{}` is not bound", d.name),
                ));
            };
            let address = self.emit_address_of(*init)?;
            return Ok((mapped.name, format!("{} = {}", name, address)));
        }

        let canonical = &unit.ty(unit.canonical(*ty)).kind;
        let declarator = match init {
            Some(init) => {
                if matches!(canonical, TypeKind::ConstantArray { .. })
                    && matches!(
                        unit.expr(unit.ignore_implicit(*init)).kind,
                        ExprKind::StringLiteral { .. }
                    )
                {
                    return Err(EmitError::unsupported(
                        "array initialization",
                        location,
                        "arrays initialized from string literals are not supported",
                    ));
                }
                format!("{} = {}", name, self.emit_expr(*init)?.text)
            }
            None => match canonical {
                TypeKind::Record { .. } => format!("{} = new {}()", name, mapped.name),
                TypeKind::ConstantArray { element, size } => {
                    let element = self.map(*element, Usage::Pointee, &d.location)?;
                    format!("{} = new {}[{}]", name, element.name, size)
                }
                _ => name.to_string(),
            },
        };
        Ok((mapped.name, declarator))
    }

    fn emit_switch_body(
        &mut self,
        body: StmtId,
        location: &SourceLocation,
        w: &mut CodeWriter,
    ) -> EmitResult<()> {
        let unit = self.unit;
        let children = match &unit.stmt(body).kind {
            StmtKind::Compound(children) => children.as_slice(),
            _ => std::slice::from_ref(&body),
        };

        let mut sections: Vec<SwitchSection> = Vec::new();
        for &child in children {
            let mut current = child;
            let mut labels = Vec::new();
            loop {
                match &unit.stmt(current).kind {
                    StmtKind::Case { value, body } => {
                        labels.push(format!("case {}:", self.emit_expr(*value)?.text));
                        current = *body;
                    }
                    StmtKind::Default { body } => {
                        labels.push("default:".to_string());
                        current = *body;
                    }
                    _ => break,
                }
            }

            if labels.is_empty() {
                let Some(section) = sections.last_mut() else {
                    return Err(EmitError::unsupported(
                        "switch statement",
                        location,
                        "statements before the first case label are unreachable in C#",
                    ));
                };
                section.body.push(current);
                continue;
            }

            match sections.last_mut() {
                // A label directly after another label's empty section stacks.
                Some(section) if section.is_empty(unit) => {
                    section.labels.extend(labels);
                    section.body.push(current);
                }
                _ => sections.push(SwitchSection {
                    labels,
                    body: vec![current],
                }),
            }
        }

        for (index, section) in sections.iter().enumerate() {
            if index > 0 {
                w.blank();
            }
            for label in &section.labels {
                w.line(label);
            }
            let statements: Vec<StmtId> = section
                .body
                .iter()
                .copied()
                .filter(|s| !matches!(unit.stmt(*s).kind, StmtKind::Null))
                .collect();
            match statements.as_slice() {
                [single] if matches!(unit.stmt(*single).kind, StmtKind::Compound(_)) => {
                    self.emit_block(*single, w)?
                }
                [] => {
                    w.open();
                    w.line("break;");
                    w.close();
                }
                many => self.emit_braced(many, w)?,
            }
        }
        Ok(())
    }
}
