/// Instruction generation
///
/// Lowers the resolver's typed tree for the snippet method into a flat
/// instruction sequence. Jumps are emitted with a placeholder offset and
/// patched once their target is known.

use snapeval_parser::ast::{BinaryOp, Literal, UnaryOp};
use snapeval_parser::resolve::typed::{CallTarget, ResolvedMethod, TExpr, TExprKind, TStmt, TStmtKind};
use snapeval_parser::types::{method_descriptor, JType, Primitive};

use crate::error::{CompileError, Result};
use crate::instruction::Instruction;

/// Pending jumps of one enclosing loop.
struct LoopLabels {
    breaks: Vec<usize>,
    continues: Vec<usize>,
}

/// Instruction generator for one snippet method
pub struct CodeGenerator {
    code: Vec<Instruction>,
    loops: Vec<LoopLabels>,
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            loops: Vec::new(),
        }
    }

    /// Generate the instructions for a snippet method body.
    ///
    /// When the body never returns a value, the value of its last
    /// top-level expression statement is left on the stack as the result.
    pub fn generate(mut self, method: &ResolvedMethod) -> Result<Vec<Instruction>> {
        let result_index = method
            .body
            .iter()
            .rposition(|s| matches!(&s.kind, TStmtKind::Expr(e) if !e.ty.is_void()));
        for (i, stmt) in method.body.iter().enumerate() {
            match (&stmt.kind, Some(i) == result_index) {
                (TStmtKind::Expr(e), true) => self.expr(e)?,
                _ => self.statement(stmt)?,
            }
        }
        Ok(self.code)
    }

    fn emit(&mut self, instruction: Instruction) {
        self.code.push(instruction);
    }

    /// Address of the next instruction.
    fn position(&self) -> usize {
        self.code.iter().map(Instruction::size).sum()
    }

    /// Emit a jump with an unknown target; returns its address for patching.
    fn emit_jump(&mut self, jump: fn(isize) -> Instruction) -> usize {
        let at = self.position();
        self.emit(jump(0));
        at
    }

    /// Point the jump at `at` to `target`.
    fn patch(&mut self, at: usize, target: usize) {
        let offset = target as isize - (at as isize + 1);
        if let Some(Instruction::Jump(o) | Instruction::JumpIfFalse(o) | Instruction::JumpIfTrue(o)) =
            self.code.get_mut(at)
        {
            *o = offset;
        }
    }

    fn jump_back(&mut self, jump: fn(isize) -> Instruction, target: usize) {
        let at = self.emit_jump(jump);
        self.patch(at, target);
    }

    // ==================== Statements ====================

    fn statement(&mut self, stmt: &TStmt) -> Result<()> {
        match &stmt.kind {
            TStmtKind::LocalVar { name, ty, init } => {
                if let Some(init) = init {
                    self.expr(init)?;
                }
                self.emit(Instruction::LocalVariableCreation {
                    name: name.clone(),
                    ty: ty.clone(),
                    has_init: init.is_some(),
                });
            }
            TStmtKind::Expr(e) => self.expr_statement(e)?,
            TStmtKind::Block(statements) => {
                for s in statements {
                    self.statement(s)?;
                }
            }
            TStmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.expr(condition)?;
                let to_else = self.emit_jump(Instruction::JumpIfFalse);
                self.statement(then_branch)?;
                match else_branch {
                    Some(else_branch) => {
                        let to_end = self.emit_jump(Instruction::Jump);
                        let else_at = self.position();
                        self.patch(to_else, else_at);
                        self.statement(else_branch)?;
                        let end = self.position();
                        self.patch(to_end, end);
                    }
                    None => {
                        let end = self.position();
                        self.patch(to_else, end);
                    }
                }
            }
            TStmtKind::While { condition, body } => {
                let top = self.position();
                self.expr(condition)?;
                let exit = self.emit_jump(Instruction::JumpIfFalse);
                let labels = self.loop_body(body)?;
                self.jump_back(Instruction::Jump, top);
                let end = self.position();
                self.patch(exit, end);
                self.close_loop(labels, top, end);
            }
            TStmtKind::DoWhile { body, condition } => {
                let top = self.position();
                let labels = self.loop_body(body)?;
                let check = self.position();
                self.expr(condition)?;
                self.jump_back(Instruction::JumpIfTrue, top);
                let end = self.position();
                self.close_loop(labels, check, end);
            }
            TStmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                for s in init {
                    self.statement(s)?;
                }
                let top = self.position();
                let exit = match condition {
                    Some(c) => {
                        self.expr(c)?;
                        Some(self.emit_jump(Instruction::JumpIfFalse))
                    }
                    None => None,
                };
                let labels = self.loop_body(body)?;
                let next = self.position();
                for u in update {
                    self.expr_statement(u)?;
                }
                self.jump_back(Instruction::Jump, top);
                let end = self.position();
                if let Some(exit) = exit {
                    self.patch(exit, end);
                }
                self.close_loop(labels, next, end);
            }
            TStmtKind::Break => {
                let at = self.emit_jump(Instruction::Jump);
                match self.loops.last_mut() {
                    Some(labels) => labels.breaks.push(at),
                    None => return Err(CompileError::unsupported("`break` outside of a loop", stmt.span)),
                }
            }
            TStmtKind::Continue => {
                let at = self.emit_jump(Instruction::Jump);
                match self.loops.last_mut() {
                    Some(labels) => labels.continues.push(at),
                    None => return Err(CompileError::unsupported("`continue` outside of a loop", stmt.span)),
                }
            }
            TStmtKind::Return(value) => {
                let with_value = match value {
                    Some(v) => {
                        self.expr(v)?;
                        !v.ty.is_void()
                    }
                    None => false,
                };
                self.emit(Instruction::Return { with_value });
            }
            TStmtKind::Throw(value) => {
                self.expr(value)?;
                self.emit(Instruction::Throw);
            }
            TStmtKind::Empty => {}
        }
        Ok(())
    }

    /// An expression evaluated for its side effects only.
    fn expr_statement(&mut self, e: &TExpr) -> Result<()> {
        self.expr(e)?;
        if !e.ty.is_void() {
            self.emit(Instruction::Pop);
        }
        Ok(())
    }

    fn loop_body(&mut self, body: &TStmt) -> Result<LoopLabels> {
        self.loops.push(LoopLabels {
            breaks: Vec::new(),
            continues: Vec::new(),
        });
        let result = self.statement(body);
        let labels = self.loops.pop().unwrap_or(LoopLabels {
            breaks: Vec::new(),
            continues: Vec::new(),
        });
        result.map(|_| labels)
    }

    fn close_loop(&mut self, labels: LoopLabels, continue_target: usize, break_target: usize) {
        for at in labels.continues {
            self.patch(at, continue_target);
        }
        for at in labels.breaks {
            self.patch(at, break_target);
        }
    }

    // ==================== Expressions ====================

    fn expr(&mut self, e: &TExpr) -> Result<()> {
        match &e.kind {
            TExprKind::Literal(lit) => self.emit(match lit {
                Literal::Int(v) => Instruction::PushInt(*v),
                Literal::Long(v) => Instruction::PushLong(*v),
                Literal::Float(v) => Instruction::PushFloat(*v),
                Literal::Double(v) => Instruction::PushDouble(*v),
                Literal::Char(v) => Instruction::PushChar(*v),
                Literal::String(s) => Instruction::PushString(s.clone()),
                Literal::Boolean(b) => Instruction::PushBoolean(*b),
                Literal::Null => Instruction::PushNull,
            }),
            TExprKind::Local(name) => self.emit(Instruction::PushLocal(name.clone())),
            TExprKind::This => self.emit(Instruction::PushThis),
            TExprKind::Field { target, owner, name } => match target {
                Some(target) => {
                    self.expr(target)?;
                    self.emit(Instruction::PushField {
                        owner: owner.clone(),
                        name: name.clone(),
                    });
                }
                None => self.emit(Instruction::PushStaticField {
                    owner: owner.clone(),
                    name: name.clone(),
                }),
            },
            TExprKind::ArrayLength(array) => {
                self.expr(array)?;
                self.emit(Instruction::ArrayLength);
            }
            TExprKind::ArrayElement { array, index } => {
                self.expr(array)?;
                self.expr(index)?;
                self.emit(Instruction::ArrayAccess);
            }
            TExprKind::Call {
                target,
                owner,
                name,
                params,
                args,
            } => {
                let signature = method_descriptor(params, &e.ty);
                let nonvirtual = match target {
                    CallTarget::Static => None,
                    CallTarget::Virtual(receiver) => {
                        self.expr(receiver)?;
                        Some(false)
                    }
                    CallTarget::Super => {
                        self.emit(Instruction::PushThis);
                        Some(true)
                    }
                };
                for arg in args {
                    self.expr(arg)?;
                }
                self.emit(match nonvirtual {
                    None => Instruction::SendStaticMessage {
                        owner: owner.clone(),
                        name: name.clone(),
                        signature,
                        arg_count: args.len(),
                    },
                    Some(nonvirtual) => Instruction::SendMessage {
                        owner: owner.clone(),
                        name: name.clone(),
                        signature,
                        arg_count: args.len(),
                        nonvirtual,
                    },
                });
            }
            TExprKind::New { class, params, args } => {
                for arg in args {
                    self.expr(arg)?;
                }
                self.emit(Instruction::New {
                    class: class.clone(),
                    signature: method_descriptor(params, &JType::Void),
                    arg_count: args.len(),
                });
            }
            TExprKind::NewArray { dims } => {
                for d in dims {
                    self.expr(d)?;
                }
                self.emit(Instruction::NewArray {
                    ty: e.ty.clone(),
                    dims: dims.len(),
                });
            }
            TExprKind::ArrayLiteral(elements) => {
                for element in elements {
                    self.expr(element)?;
                }
                self.emit(Instruction::ArrayInitializer {
                    ty: e.ty.clone(),
                    length: elements.len(),
                });
            }
            TExprKind::Unary { op, operand } => {
                self.expr(operand)?;
                match op {
                    UnaryOp::Not => self.emit(Instruction::Not),
                    UnaryOp::Neg => self.emit(Instruction::Negate(primitive_of(e)?)),
                    UnaryOp::BitNot => self.emit(Instruction::BitNot(primitive_of(e)?)),
                    // unary plus is folded away during resolution
                    UnaryOp::Plus => {}
                }
            }
            TExprKind::Binary {
                op,
                operand_ty,
                lhs,
                rhs,
            } => {
                self.expr(lhs)?;
                self.expr(rhs)?;
                self.emit(binary_instruction(*op, *operand_ty, e)?);
            }
            TExprKind::Logical { and, lhs, rhs } => {
                self.expr(lhs)?;
                self.emit(Instruction::Dup);
                let skip = if *and {
                    self.emit_jump(Instruction::JumpIfFalse)
                } else {
                    self.emit_jump(Instruction::JumpIfTrue)
                };
                self.emit(Instruction::Pop);
                self.expr(rhs)?;
                let end = self.position();
                self.patch(skip, end);
            }
            TExprKind::Concat(lhs, rhs) => {
                self.expr(lhs)?;
                self.expr(rhs)?;
                self.emit(Instruction::Concat);
            }
            TExprKind::Assign { target, value } => {
                self.expr(target)?;
                self.expr(value)?;
                self.emit(Instruction::Assign);
            }
            TExprKind::CompoundAssign {
                op,
                operand_ty,
                target,
                value,
            } => self.compound_assign(*op, *operand_ty, target, value, e)?,
            TExprKind::IncDec {
                increment,
                prefix,
                operand,
            } => {
                self.expr(operand)?;
                let ty = operand.ty.clone();
                self.emit(match (increment, prefix) {
                    (true, true) => Instruction::PreIncrement(ty),
                    (false, true) => Instruction::PreDecrement(ty),
                    (true, false) => Instruction::PostIncrement(ty),
                    (false, false) => Instruction::PostDecrement(ty),
                });
            }
            TExprKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                self.expr(condition)?;
                let to_else = self.emit_jump(Instruction::JumpIfFalse);
                self.expr(then_expr)?;
                let to_end = self.emit_jump(Instruction::Jump);
                let else_at = self.position();
                self.patch(to_else, else_at);
                self.expr(else_expr)?;
                let end = self.position();
                self.patch(to_end, end);
            }
            TExprKind::Convert(inner) => {
                self.expr(inner)?;
                self.emit(Instruction::Cast(primitive_of(e)?));
            }
            TExprKind::CheckCast(inner) => {
                self.expr(inner)?;
                self.emit(Instruction::CheckCast(e.ty.clone()));
            }
            TExprKind::InstanceOf { expr, target } => {
                self.expr(expr)?;
                self.emit(Instruction::InstanceOf(target.clone()));
            }
            TExprKind::Box(inner) => {
                self.expr(inner)?;
                self.emit(Instruction::Box(primitive_of(inner)?));
            }
            TExprKind::Unbox(inner) => {
                self.expr(inner)?;
                self.emit(Instruction::Unbox(primitive_of(e)?));
            }
            TExprKind::ClassLiteral(ty) => self.emit(Instruction::PushClass(ty.clone())),
        }
        Ok(())
    }

    /// `target op= value`: read the variable, operate at the promoted type,
    /// narrow back and store.
    fn compound_assign(
        &mut self,
        op: BinaryOp,
        operand_ty: Option<Primitive>,
        target: &TExpr,
        value: &TExpr,
        node: &TExpr,
    ) -> Result<()> {
        self.expr(target)?;
        self.emit(Instruction::Dup);
        let Some(p) = operand_ty else {
            self.expr(value)?;
            self.emit(Instruction::Concat);
            self.emit(Instruction::Assign);
            return Ok(());
        };

        let boxed = matches!(target.ty, JType::Class(_));
        let Some(target_p) = target.ty.unboxed_primitive() else {
            return Err(CompileError::unsupported(
                format!("compound assignment to {}", target.ty),
                node.span,
            ));
        };
        if boxed {
            self.emit(Instruction::Unbox(target_p));
        }
        if target_p != p {
            self.emit(Instruction::Cast(p));
        }
        self.expr(value)?;
        self.emit(binary_instruction(op, Some(p), node)?);
        if target_p != p {
            self.emit(Instruction::Cast(target_p));
        }
        if boxed {
            self.emit(Instruction::Box(target_p));
        }
        self.emit(Instruction::Assign);
        Ok(())
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn primitive_of(e: &TExpr) -> Result<Primitive> {
    e.ty.primitive()
        .ok_or_else(|| CompileError::unsupported(format!("primitive operation on {}", e.ty), e.span))
}

fn binary_instruction(op: BinaryOp, operand_ty: Option<Primitive>, node: &TExpr) -> Result<Instruction> {
    if let BinaryOp::Eq | BinaryOp::NotEq = op {
        return Ok(if op == BinaryOp::Eq {
            Instruction::Equal(operand_ty)
        } else {
            Instruction::NotEqual(operand_ty)
        });
    }
    let Some(p) = operand_ty else {
        return Err(CompileError::unsupported(
            format!("operator '{}' on references", op.symbol()),
            node.span,
        ));
    };
    Ok(match op {
        BinaryOp::Add => Instruction::Add(p),
        BinaryOp::Sub => Instruction::Subtract(p),
        BinaryOp::Mul => Instruction::Multiply(p),
        BinaryOp::Div => Instruction::Divide(p),
        BinaryOp::Rem => Instruction::Remainder(p),
        BinaryOp::Shl => Instruction::ShiftLeft(p),
        BinaryOp::Shr => Instruction::ShiftRight(p),
        BinaryOp::UShr => Instruction::UnsignedShiftRight(p),
        BinaryOp::Lt => Instruction::Less(p),
        BinaryOp::LtEq => Instruction::LessEqual(p),
        BinaryOp::Gt => Instruction::Greater(p),
        BinaryOp::GtEq => Instruction::GreaterEqual(p),
        BinaryOp::BitAnd => Instruction::BitAnd(p),
        BinaryOp::BitOr => Instruction::BitOr(p),
        BinaryOp::BitXor => Instruction::BitXor(p),
        BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::And | BinaryOp::Or => {
            return Err(CompileError::unsupported(
                format!("operator '{}' in arithmetic position", op.symbol()),
                node.span,
            ));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapeval_lexer::Span;

    fn span() -> Span {
        Span::new(0, 0)
    }

    fn int(v: i32) -> TExpr {
        TExpr::new(TExprKind::Literal(Literal::Int(v)), JType::int(), span())
    }

    fn local(name: &str, ty: JType) -> TExpr {
        TExpr::new(TExprKind::Local(name.into()), ty, span())
    }

    fn method(body: Vec<TStmtKind>) -> ResolvedMethod {
        ResolvedMethod {
            owner: "T".into(),
            name: "___run".into(),
            params: Vec::new(),
            ret: JType::Void,
            is_static: true,
            body: body.into_iter().map(|kind| TStmt { kind, span: span() }).collect(),
            span: span(),
        }
    }

    #[test]
    fn test_last_expression_statement_is_result() {
        let assign = TExpr::new(
            TExprKind::Assign {
                target: Box::new(local("x", JType::int())),
                value: Box::new(int(3)),
            },
            JType::int(),
            span(),
        );
        let code = CodeGenerator::new()
            .generate(&method(vec![TStmtKind::Expr(assign.clone()), TStmtKind::Expr(assign)]))
            .unwrap();
        assert_eq!(
            code,
            vec![
                Instruction::PushLocal("x".into()),
                Instruction::PushInt(3),
                Instruction::Assign,
                Instruction::Pop,
                Instruction::PushLocal("x".into()),
                Instruction::PushInt(3),
                Instruction::Assign,
            ]
        );
    }

    #[test]
    fn test_while_loop_jumps() {
        let cond = TExpr::new(TExprKind::Literal(Literal::Boolean(true)), JType::boolean(), span());
        let body = TStmt {
            kind: TStmtKind::Block(vec![TStmt {
                kind: TStmtKind::Break,
                span: span(),
            }]),
            span: span(),
        };
        let code = CodeGenerator::new()
            .generate(&method(vec![TStmtKind::While {
                condition: cond,
                body: Box::new(body),
            }]))
            .unwrap();
        assert_eq!(
            code,
            vec![
                Instruction::PushBoolean(true),
                Instruction::JumpIfFalse(2),
                Instruction::Jump(1),
                Instruction::Jump(-4),
            ]
        );
    }

    #[test]
    fn test_compound_assignment_narrows() {
        let target = local("b", JType::Primitive(Primitive::Byte));
        let node = TExpr::new(
            TExprKind::CompoundAssign {
                op: BinaryOp::Add,
                operand_ty: Some(Primitive::Int),
                target: Box::new(target),
                value: Box::new(int(1)),
            },
            JType::Primitive(Primitive::Byte),
            span(),
        );
        let code = CodeGenerator::new().generate(&method(vec![TStmtKind::Expr(node)])).unwrap();
        assert_eq!(
            code,
            vec![
                Instruction::PushLocal("b".into()),
                Instruction::Dup,
                Instruction::Cast(Primitive::Int),
                Instruction::PushInt(1),
                Instruction::Add(Primitive::Int),
                Instruction::Cast(Primitive::Byte),
                Instruction::Assign,
            ]
        );
    }

    #[test]
    fn test_logical_and_short_circuits() {
        let node = TExpr::new(
            TExprKind::Logical {
                and: true,
                lhs: Box::new(local("a", JType::boolean())),
                rhs: Box::new(local("b", JType::boolean())),
            },
            JType::boolean(),
            span(),
        );
        let code = CodeGenerator::new()
            .generate(&method(vec![TStmtKind::Return(Some(node))]))
            .unwrap();
        assert_eq!(
            code,
            vec![
                Instruction::PushLocal("a".into()),
                Instruction::Dup,
                Instruction::JumpIfFalse(2),
                Instruction::Pop,
                Instruction::PushLocal("b".into()),
                Instruction::Return { with_value: true },
            ]
        );
    }
}
