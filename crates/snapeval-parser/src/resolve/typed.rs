//! Typed intermediate form produced by the resolver.
//!
//! Every implicit conversion the language performs (widening, boxing,
//! unboxing, varargs packing) is made explicit here, so lowering to
//! instructions never has to re-derive static types.

use snapeval_lexer::Span;

use crate::ast::{BinaryOp, Literal, UnaryOp};
use crate::types::{JType, Primitive};

#[derive(Debug, Clone, PartialEq)]
pub struct TExpr {
    pub kind: TExprKind,
    pub ty: JType,
    pub span: Span,
}

/// Receiver of a method call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallTarget {
    /// Static method: no receiver
    Static,
    /// Virtual dispatch on the receiver
    Virtual(Box<TExpr>),
    /// `super.m()`: non-virtual call on `this`
    Super,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TExprKind {
    Literal(Literal),
    /// A snippet local or a frame local (frame locals are the snippet
    /// method's parameters)
    Local(String),
    This,
    Field {
        /// `None` for static fields
        target: Option<Box<TExpr>>,
        /// Binary name of the declaring type
        owner: String,
        name: String,
    },
    ArrayLength(Box<TExpr>),
    ArrayElement {
        array: Box<TExpr>,
        index: Box<TExpr>,
    },
    Call {
        target: CallTarget,
        owner: String,
        name: String,
        /// Parameter types of the selected overload
        params: Vec<JType>,
        /// Arguments already converted to `params`
        args: Vec<TExpr>,
    },
    New {
        class: String,
        params: Vec<JType>,
        args: Vec<TExpr>,
    },
    /// `new T[d1][d2]...`: `ty` is the full array type
    NewArray {
        dims: Vec<TExpr>,
    },
    /// Array built from element values: `{a, b}` or a varargs pack
    ArrayLiteral(Vec<TExpr>),
    Unary {
        op: UnaryOp,
        operand: Box<TExpr>,
    },
    /// Arithmetic, bitwise, comparison and equality operators. Both
    /// operands are already converted to `operand_ty`; `None` marks
    /// reference equality.
    Binary {
        op: BinaryOp,
        operand_ty: Option<Primitive>,
        lhs: Box<TExpr>,
        rhs: Box<TExpr>,
    },
    /// Short-circuit `&&` / `||`
    Logical {
        and: bool,
        lhs: Box<TExpr>,
        rhs: Box<TExpr>,
    },
    /// String concatenation
    Concat(Box<TExpr>, Box<TExpr>),
    Assign {
        target: Box<TExpr>,
        value: Box<TExpr>,
    },
    /// `target op= value`. The operation runs at `operand_ty` (`None` for
    /// string concatenation) and is narrowed back to the target type.
    CompoundAssign {
        op: BinaryOp,
        operand_ty: Option<Primitive>,
        target: Box<TExpr>,
        value: Box<TExpr>,
    },
    IncDec {
        increment: bool,
        prefix: bool,
        operand: Box<TExpr>,
    },
    Conditional {
        condition: Box<TExpr>,
        then_expr: Box<TExpr>,
        else_expr: Box<TExpr>,
    },
    /// Primitive conversion to the node's type
    Convert(Box<TExpr>),
    /// Checked reference cast to the node's type
    CheckCast(Box<TExpr>),
    InstanceOf {
        expr: Box<TExpr>,
        target: JType,
    },
    Box(Box<TExpr>),
    Unbox(Box<TExpr>),
    ClassLiteral(JType),
}

impl TExpr {
    pub fn new(kind: TExprKind, ty: JType, span: Span) -> Self {
        Self { kind, ty, span }
    }

    /// Whether the expression denotes an assignable location.
    pub fn is_variable(&self) -> bool {
        matches!(
            self.kind,
            TExprKind::Local(_) | TExprKind::Field { .. } | TExprKind::ArrayElement { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TStmt {
    pub kind: TStmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TStmtKind {
    LocalVar {
        name: String,
        ty: JType,
        init: Option<TExpr>,
    },
    Expr(TExpr),
    Block(Vec<TStmt>),
    If {
        condition: TExpr,
        then_branch: Box<TStmt>,
        else_branch: Option<Box<TStmt>>,
    },
    While {
        condition: TExpr,
        body: Box<TStmt>,
    },
    DoWhile {
        body: Box<TStmt>,
        condition: TExpr,
    },
    For {
        init: Vec<TStmt>,
        condition: Option<TExpr>,
        update: Vec<TExpr>,
        body: Box<TStmt>,
    },
    Break,
    Continue,
    Return(Option<TExpr>),
    Throw(TExpr),
    Empty,
}

/// A method whose body was resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMethod {
    /// Binary name of the declaring type
    pub owner: String,
    pub name: String,
    pub params: Vec<(String, JType)>,
    pub ret: JType,
    pub is_static: bool,
    pub body: Vec<TStmt>,
    pub span: Span,
}
