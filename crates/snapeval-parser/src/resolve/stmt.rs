//! Statement checking.

use super::typed::{TExpr, TStmt, TStmtKind};
use super::{Diagnostic, Resolver};
use crate::ast::{ExprKind, Stmt, StmtKind};
use crate::types::{JType, THROWABLE};

impl Resolver<'_> {
    /// Resolve a statement list, recording diagnostics and continuing with
    /// the next statement after an error.
    pub(crate) fn resolve_statements(&mut self, statements: &[Stmt]) -> Vec<TStmt> {
        let mut out = Vec::with_capacity(statements.len());
        for stmt in statements {
            match self.statement(stmt) {
                Ok(s) => out.push(s),
                Err(d) => self.diagnostics.push(d),
            }
        }
        out
    }

    fn scoped_statement(&mut self, stmt: &Stmt) -> Result<TStmt, Diagnostic> {
        self.push_scope();
        let result = self.statement(stmt);
        self.pop_scope();
        result
    }

    fn condition(&mut self, e: &crate::ast::Expr) -> Result<TExpr, Diagnostic> {
        let cond = self.expr(e)?;
        self.boolean_operand(cond)
    }

    fn statement(&mut self, stmt: &Stmt) -> Result<TStmt, Diagnostic> {
        let span = stmt.span;
        let kind = match &stmt.kind {
            StmtKind::Block(block) => {
                self.push_scope();
                let statements = self.resolve_statements(&block.statements);
                self.pop_scope();
                TStmtKind::Block(statements)
            }
            StmtKind::LocalVar { ty, declarators } => {
                let base = self.resolve_type(ty)?;
                if base.is_void() {
                    return Err(Diagnostic::new("illegal start of expression: 'void' variable", ty.span));
                }
                let mut decls = Vec::with_capacity(declarators.len());
                for d in declarators {
                    let var_ty = JType::array_of(base.clone(), d.extra_dims);
                    let init = match &d.init {
                        Some(init) => {
                            let typed = match &init.kind {
                                ExprKind::ArrayInit(elements) => self.array_init(elements, &var_ty, init.span),
                                _ => self
                                    .expr(init)
                                    .and_then(|value| self.assign_conversion(value, &var_ty)),
                            };
                            match typed {
                                Ok(t) => Some(t),
                                Err(diag) => {
                                    // keep the name declared so later uses don't cascade
                                    self.diagnostics.push(diag);
                                    None
                                }
                            }
                        }
                        None => None,
                    };
                    self.declare_local(&d.name, var_ty.clone(), d.span)?;
                    decls.push(TStmt {
                        kind: TStmtKind::LocalVar {
                            name: d.name.clone(),
                            ty: var_ty,
                            init,
                        },
                        span: d.span,
                    });
                }
                if decls.len() == 1 {
                    return decls.pop().ok_or_else(|| Diagnostic::new("empty declaration", span));
                }
                // `int a, b;` declares into the current scope, not a nested one
                TStmtKind::Block(decls)
            }
            StmtKind::Expr(e) => {
                let is_statement_expression = matches!(
                    e.kind,
                    ExprKind::Assign { .. } | ExprKind::IncDec { .. } | ExprKind::MethodCall { .. } | ExprKind::New { .. }
                );
                if !is_statement_expression {
                    return Err(Diagnostic::new("not a statement", e.span));
                }
                TStmtKind::Expr(self.expr(e)?)
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.condition(condition)?;
                let then_branch = Box::new(self.scoped_statement(then_branch)?);
                let else_branch = match else_branch {
                    Some(e) => Some(Box::new(self.scoped_statement(e)?)),
                    None => None,
                };
                TStmtKind::If {
                    condition,
                    then_branch,
                    else_branch,
                }
            }
            StmtKind::While { condition, body } => {
                let condition = self.condition(condition)?;
                self.loop_depth += 1;
                let body = self.scoped_statement(body);
                self.loop_depth -= 1;
                TStmtKind::While {
                    condition,
                    body: Box::new(body?),
                }
            }
            StmtKind::DoWhile { body, condition } => {
                self.loop_depth += 1;
                let body = self.scoped_statement(body);
                self.loop_depth -= 1;
                let condition = self.condition(condition)?;
                TStmtKind::DoWhile {
                    body: Box::new(body?),
                    condition,
                }
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                self.push_scope();
                let result = self.for_statement(init, condition.as_ref(), update, body);
                self.pop_scope();
                result?
            }
            StmtKind::Break | StmtKind::Continue => {
                if self.loop_depth == 0 {
                    let keyword = if matches!(stmt.kind, StmtKind::Break) { "break" } else { "continue" };
                    return Err(Diagnostic::new(format!("{} outside of loop", keyword), span));
                }
                if matches!(stmt.kind, StmtKind::Break) {
                    TStmtKind::Break
                } else {
                    TStmtKind::Continue
                }
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(v) => Some(self.expr(v)?),
                    None => None,
                };
                TStmtKind::Return(value)
            }
            StmtKind::Throw(value) => {
                let value = self.expr(value)?;
                let throwable = JType::Class(THROWABLE.to_string());
                let known = self.type_exists(THROWABLE);
                if !value.ty.is_reference() || (known && !self.is_subtype(&value.ty, &throwable)) {
                    return Err(Diagnostic::new(
                        format!("incompatible types: {} cannot be converted to {}", value.ty, THROWABLE),
                        value.span,
                    ));
                }
                TStmtKind::Throw(value)
            }
            StmtKind::Empty => TStmtKind::Empty,
        };
        Ok(TStmt { kind, span })
    }

    fn for_statement(
        &mut self,
        init: &[Stmt],
        condition: Option<&crate::ast::Expr>,
        update: &[crate::ast::Expr],
        body: &Stmt,
    ) -> Result<TStmtKind, Diagnostic> {
        let mut typed_init = Vec::with_capacity(init.len());
        for s in init {
            typed_init.push(self.statement(s)?);
        }
        let condition = match condition {
            Some(c) => Some(self.condition(c)?),
            None => None,
        };
        let mut typed_update = Vec::with_capacity(update.len());
        for u in update {
            typed_update.push(self.expr(u)?);
        }
        self.loop_depth += 1;
        let body = self.scoped_statement(body);
        self.loop_depth -= 1;
        Ok(TStmtKind::For {
            init: typed_init,
            condition,
            update: typed_update,
            body: Box::new(body?),
        })
    }
}
