//! Node builders for the grammar's reductions.
//!
//! Spans are assembled from the tokens and subtrees a rule reduces, so every
//! node covers its first token through its last.

use snapeval_lexer::{Keyword, Span};

use crate::adapter::ParseError;
use crate::ast::*;
use crate::token::{Located, ParserToken};
use crate::types::Primitive;

pub(crate) type GrammarError = lalrpop_util::ParseError<usize, ParserToken, ParseError>;

fn user(error: ParseError) -> GrammarError {
    GrammarError::User { error }
}

/// A dotted name: `a.b.c`, each segment with its span.
pub(crate) struct Name {
    head: Located<String>,
    tail: Vec<Located<String>>,
}

impl Name {
    pub(crate) fn new(head: Located<String>) -> Self {
        Self { head, tail: Vec::new() }
    }

    pub(crate) fn push(&mut self, segment: Located<String>) {
        self.tail.push(segment);
    }

    pub(crate) fn span(&self) -> Span {
        match self.tail.last() {
            Some(last) => self.head.span.to(last.span),
            None => self.head.span,
        }
    }

    pub(crate) fn dotted(&self) -> String {
        let mut name = self.head.value.clone();
        for segment in &self.tail {
            name.push('.');
            name.push_str(&segment.value);
        }
        name
    }

    /// The name as an expression: a simple name, or field accesses on one.
    pub(crate) fn into_expr(self) -> Expr {
        let head = Expr {
            span: self.head.span,
            kind: ExprKind::Name(self.head.value),
        };
        self.tail.into_iter().fold(head, field_access)
    }

    /// Split off the last segment.
    fn split_last(mut self) -> (Option<Name>, Located<String>) {
        match self.tail.pop() {
            Some(last) => (Some(self), last),
            None => (None, self.head),
        }
    }
}

/// Modifiers as written, with the span of the first one.
#[derive(Default)]
pub(crate) struct ModifierList {
    pub(crate) modifiers: Modifiers,
    span: Option<Span>,
}

impl ModifierList {
    pub(crate) fn add(mut self, keyword: Keyword, span: Span) -> Self {
        let m = &mut self.modifiers;
        match keyword {
            Keyword::Public => m.is_public = true,
            Keyword::Protected => m.is_protected = true,
            Keyword::Private => m.is_private = true,
            Keyword::Static => m.is_static = true,
            Keyword::Final => m.is_final = true,
            Keyword::Abstract => m.is_abstract = true,
            Keyword::Native => m.is_native = true,
            _ => {}
        }
        self.span.get_or_insert(span);
        self
    }

    /// Where a declaration carrying these modifiers starts.
    pub(crate) fn start(&self, next: Span) -> Span {
        self.span.unwrap_or(next)
    }
}

/// A type declaration up to its body.
pub(crate) struct TypeHeader {
    kind: TypeDeclKind,
    modifiers: ModifierList,
    keyword: Span,
    name: String,
    extends: Vec<TypeRef>,
    implements: Vec<TypeRef>,
}

impl TypeHeader {
    pub(crate) fn new(
        modifiers: ModifierList,
        kind: TypeDeclKind,
        keyword: Span,
        name: Located<String>,
        extends: Option<Vec<TypeRef>>,
        implements: Option<Vec<TypeRef>>,
    ) -> Self {
        Self {
            kind,
            modifiers,
            keyword,
            name: name.value,
            extends: extends.unwrap_or_default(),
            implements: implements.unwrap_or_default(),
        }
    }

    pub(crate) fn finish(self, enum_constants: Vec<String>, members: Vec<Member>, end: Span) -> TypeDecl {
        let members = if self.kind == TypeDeclKind::Interface {
            members.into_iter().map(interface_member).collect()
        } else {
            members
        };
        TypeDecl {
            kind: self.kind,
            name: self.name,
            modifiers: self.modifiers.modifiers,
            extends: self.extends,
            implements: self.implements,
            enum_constants,
            members,
            span: self.modifiers.start(self.keyword).to(end),
        }
    }
}

/// Interface members are implicitly public, and interface fields are
/// constants.
fn interface_member(mut member: Member) -> Member {
    match &mut member {
        Member::Field(field) => {
            field.modifiers.is_public = true;
            field.modifiers.is_static = true;
            field.modifiers.is_final = true;
        }
        Member::Method(method) => method.modifiers.is_public = true,
        Member::Type(ty) => ty.modifiers.is_public = true,
        Member::Initializer { .. } => {}
    }
    member
}

pub(crate) struct EnumBody {
    pub(crate) constants: Vec<String>,
    pub(crate) members: Vec<Member>,
    pub(crate) end: Span,
}

/// A parsed or skipped method body, with the span of its last token.
pub(crate) type MethodBody = (Option<Block>, Span);

pub(crate) fn method(
    modifiers: ModifierList,
    return_type: Option<TypeRef>,
    name: Located<String>,
    params: Vec<Param>,
    throws: Option<Vec<TypeRef>>,
    body: MethodBody,
) -> Member {
    let first = return_type.as_ref().map_or(name.span, |ty| ty.span);
    let (body, end) = body;
    Member::Method(MethodDecl {
        span: modifiers.start(first).to(end),
        modifiers: modifiers.modifiers,
        return_type,
        name: name.value,
        params,
        throws: throws.unwrap_or_default(),
        body,
    })
}

/// Array dimensions written after a method's parameter list belong to its
/// return type.
pub(crate) fn with_dims(mut ty: TypeRef, dims: Option<(usize, Span)>) -> TypeRef {
    if let Some((dims, _)) = dims {
        ty.dims += dims;
    }
    ty
}

pub(crate) fn field(modifiers: ModifierList, ty: TypeRef, declarators: Vec<VarDeclarator>, end: Span) -> Member {
    Member::Field(FieldDecl {
        span: modifiers.start(ty.span).to(end),
        modifiers: modifiers.modifiers,
        ty,
        declarators,
    })
}

pub(crate) fn initializer(modifiers: ModifierList, body: Span) -> Member {
    Member::Initializer {
        is_static: modifiers.modifiers.is_static,
        span: modifiers.start(body).to(body),
    }
}

pub(crate) fn param(
    is_final: Option<Span>,
    ty: TypeRef,
    varargs: bool,
    name: Located<String>,
    dims: Option<(usize, Span)>,
) -> Param {
    let start = is_final.unwrap_or(ty.span);
    let mut ty = with_dims(ty, dims);
    if varargs {
        ty.dims += 1;
    }
    Param {
        ty,
        name: name.value,
        varargs,
        span: start.to(name.span),
    }
}

pub(crate) fn declarator(name: Located<String>, dims: Option<(usize, Span)>, init: Option<Expr>) -> VarDeclarator {
    let end = init.as_ref().map_or(name.span, |e| e.span);
    VarDeclarator {
        name: name.value,
        extra_dims: dims.map_or(0, |(dims, _)| dims),
        init,
        span: name.span.to(end),
    }
}

pub(crate) fn primitive_type(primitive: Located<Primitive>, dims: Option<(usize, Span)>) -> TypeRef {
    let (dims, end) = dims.unwrap_or((0, primitive.span));
    TypeRef {
        name: TypeName::Primitive(primitive.value),
        dims,
        span: primitive.span.to(end),
    }
}

pub(crate) fn named_type(name: Name, dims: Option<(usize, Span)>) -> TypeRef {
    let span = name.span();
    let (dims, end) = dims.unwrap_or((0, span));
    TypeRef {
        name: TypeName::Named(name.dotted()),
        dims,
        span: span.to(end),
    }
}

pub(crate) fn void_type(span: Span) -> TypeRef {
    TypeRef {
        name: TypeName::Void,
        dims: 0,
        span,
    }
}

// ==================== Statements ====================

pub(crate) fn stmt(kind: StmtKind, span: Span) -> Stmt {
    Stmt { kind, span }
}

pub(crate) fn local_var(is_final: Option<Span>, ty: TypeRef, declarators: Vec<VarDeclarator>) -> Stmt {
    let start = is_final.unwrap_or(ty.span);
    let end = declarators.last().map_or(ty.span, |d| d.span);
    stmt(StmtKind::LocalVar { ty, declarators }, start.to(end))
}

pub(crate) fn if_stmt(start: Span, condition: Expr, then_branch: Stmt, else_branch: Option<Stmt>) -> Stmt {
    let end = else_branch.as_ref().unwrap_or(&then_branch).span;
    stmt(
        StmtKind::If {
            condition,
            then_branch: Box::new(then_branch),
            else_branch: else_branch.map(Box::new),
        },
        start.to(end),
    )
}

pub(crate) fn while_stmt(start: Span, condition: Expr, body: Stmt) -> Stmt {
    let span = start.to(body.span);
    stmt(
        StmtKind::While {
            condition,
            body: Box::new(body),
        },
        span,
    )
}

pub(crate) fn for_stmt(
    start: Span,
    init: Option<Vec<Stmt>>,
    condition: Option<Expr>,
    update: Option<Vec<Expr>>,
    body: Stmt,
) -> Stmt {
    let span = start.to(body.span);
    stmt(
        StmtKind::For {
            init: init.unwrap_or_default(),
            condition,
            update: update.unwrap_or_default(),
            body: Box::new(body),
        },
        span,
    )
}

pub(crate) fn expr_stmts(exprs: Vec<Expr>) -> Vec<Stmt> {
    exprs
        .into_iter()
        .map(|e| {
            let span = e.span;
            stmt(StmtKind::Expr(e), span)
        })
        .collect()
}

// ==================== Expressions ====================

pub(crate) fn expr(kind: ExprKind, span: Span) -> Expr {
    Expr { kind, span }
}

pub(crate) fn literal(value: Literal, span: Span) -> Expr {
    expr(ExprKind::Literal(value), span)
}

/// Split a literal into radix and digits.
fn radix_digits(text: &str) -> (u32, &str) {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        (16, hex)
    } else if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        (2, bin)
    } else if text.len() > 1 && text.starts_with('0') {
        (8, &text[1..])
    } else {
        (10, text)
    }
}

pub(crate) fn int_literal(text: Located<String>) -> Result<Expr, GrammarError> {
    let (radix, digits) = radix_digits(&text.value);
    let value = if radix == 10 {
        digits.parse::<i32>().ok()
    } else {
        // non-decimal literals cover the full unsigned bit pattern
        u32::from_str_radix(digits, radix).ok().map(|v| v as i32)
    };
    match value {
        Some(value) => Ok(literal(Literal::Int(value), text.span)),
        None => Err(user(ParseError::new(
            format!("integer literal `{}` is out of range", text.value),
            text.span,
        ))),
    }
}

pub(crate) fn long_literal(text: Located<String>) -> Result<Expr, GrammarError> {
    let (radix, digits) = radix_digits(&text.value);
    let value = if radix == 10 {
        digits.parse::<i64>().ok()
    } else {
        u64::from_str_radix(digits, radix).ok().map(|v| v as i64)
    };
    match value {
        Some(value) => Ok(literal(Literal::Long(value), text.span)),
        None => Err(user(ParseError::new(
            format!("long literal `{}L` is out of range", text.value),
            text.span,
        ))),
    }
}

pub(crate) fn float_literal(text: Located<String>) -> Result<Expr, GrammarError> {
    match text.value.parse::<f32>() {
        Ok(value) => Ok(literal(Literal::Float(value), text.span)),
        Err(_) => Err(user(ParseError::new("malformed float literal", text.span))),
    }
}

pub(crate) fn double_literal(text: Located<String>) -> Result<Expr, GrammarError> {
    match text.value.parse::<f64>() {
        Ok(value) => Ok(literal(Literal::Double(value), text.span)),
        Err(_) => Err(user(ParseError::new("malformed double literal", text.span))),
    }
}

pub(crate) fn field_access(target: Expr, name: Located<String>) -> Expr {
    let span = target.span.to(name.span);
    expr(
        ExprKind::FieldAccess {
            target: Box::new(target),
            name: name.value,
        },
        span,
    )
}

/// Arguments of a call, with the span of the closing parenthesis.
pub(crate) type Arguments = (Vec<Expr>, Span);

pub(crate) fn call(target: Expr, name: Located<String>, args: Arguments) -> Expr {
    let span = target.span.to(args.1);
    expr(
        ExprKind::MethodCall {
            target: Some(Box::new(target)),
            name: name.value,
            args: args.0,
            is_super: false,
        },
        span,
    )
}

/// `a.b.c(args)`: a call on the name `a.b`, or an unqualified call.
pub(crate) fn call_on_name(name: Name, args: Arguments) -> Expr {
    match name.split_last() {
        (Some(target), method) => call(target.into_expr(), method, args),
        (None, method) => expr(
            ExprKind::MethodCall {
                target: None,
                name: method.value,
                args: args.0,
                is_super: false,
            },
            method.span.to(args.1),
        ),
    }
}

pub(crate) fn super_call(start: Span, name: Located<String>, args: Arguments) -> Expr {
    expr(
        ExprKind::MethodCall {
            target: None,
            name: name.value,
            args: args.0,
            is_super: true,
        },
        start.to(args.1),
    )
}

pub(crate) fn array_access(array: Expr, index: Expr, end: Span) -> Expr {
    let span = array.span.to(end);
    expr(
        ExprKind::ArrayAccess {
            array: Box::new(array),
            index: Box::new(index),
        },
        span,
    )
}

pub(crate) fn class_literal(ty: TypeRef, end: Span) -> Expr {
    let span = ty.span.to(end);
    expr(ExprKind::ClassLiteral(ty), span)
}

pub(crate) fn new_object(start: Span, ty: TypeRef, args: Arguments) -> Expr {
    expr(ExprKind::New { ty, args: args.0 }, start.to(args.1))
}

/// `new T[n][m][]`: sized dimensions, then unsized ones.
pub(crate) fn new_array(start: Span, element: TypeRef, dims: (Vec<Expr>, Span), extra: Option<(usize, Span)>) -> Expr {
    let end = extra.map_or(dims.1, |(_, end)| end);
    expr(
        ExprKind::NewArray {
            element,
            dims: dims.0,
            extra_dims: extra.map_or(0, |(extra, _)| extra),
            init: None,
        },
        start.to(end),
    )
}

/// `new T[][] { ... }`
pub(crate) fn new_initialized_array(start: Span, element: TypeRef, dims: (usize, Span), init: Expr) -> Expr {
    let span = start.to(init.span);
    let elements = match init.kind {
        ExprKind::ArrayInit(elements) => elements,
        other => vec![expr(other, init.span)],
    };
    expr(
        ExprKind::NewArray {
            element,
            dims: Vec::new(),
            extra_dims: dims.0,
            init: Some(elements),
        },
        span,
    )
}

pub(crate) fn unary(op: UnaryOp, start: Span, operand: Expr) -> Expr {
    let span = start.to(operand.span);
    expr(
        ExprKind::Unary {
            op,
            operand: Box::new(operand),
        },
        span,
    )
}

pub(crate) fn prefix(increment: bool, start: Span, operand: Expr) -> Expr {
    let span = start.to(operand.span);
    expr(
        ExprKind::IncDec {
            increment,
            prefix: true,
            operand: Box::new(operand),
        },
        span,
    )
}

pub(crate) fn postfix(increment: bool, operand: Expr, end: Span) -> Expr {
    let span = operand.span.to(end);
    expr(
        ExprKind::IncDec {
            increment,
            prefix: false,
            operand: Box::new(operand),
        },
        span,
    )
}

pub(crate) fn binary(lhs: Expr, op: BinaryOp, rhs: Expr) -> Expr {
    let span = lhs.span.to(rhs.span);
    expr(
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    )
}

pub(crate) fn instance_of(operand: Expr, ty: TypeRef) -> Expr {
    let span = operand.span.to(ty.span);
    expr(
        ExprKind::InstanceOf {
            expr: Box::new(operand),
            ty,
        },
        span,
    )
}

pub(crate) fn assign(target: Expr, op: Option<BinaryOp>, value: Expr) -> Expr {
    let span = target.span.to(value.span);
    expr(
        ExprKind::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        },
        span,
    )
}

pub(crate) fn conditional(condition: Expr, then_expr: Expr, else_expr: Expr) -> Expr {
    let span = condition.span.to(else_expr.span);
    expr(
        ExprKind::Conditional {
            condition: Box::new(condition),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        },
        span,
    )
}

pub(crate) fn cast(start: Span, ty: TypeRef, operand: Expr) -> Expr {
    let span = start.to(operand.span);
    expr(
        ExprKind::Cast {
            ty,
            expr: Box::new(operand),
        },
        span,
    )
}

/// `(a.b.C) x`: the parenthesized expression has to spell a type name.
pub(crate) fn cast_to_name(start: Span, ty: Expr, operand: Expr) -> Result<Expr, GrammarError> {
    let Some(name) = ty.as_dotted_name() else {
        return Err(user(ParseError::new("expected a type name in cast", ty.span)));
    };
    let ty = TypeRef {
        name: TypeName::Named(name),
        dims: 0,
        span: ty.span,
    };
    Ok(cast(start, ty, operand))
}
