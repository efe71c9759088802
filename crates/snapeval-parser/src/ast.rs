/// Abstract Syntax Tree types for snippet compilation units
///
/// These types represent the parsed structure of a (synthesized) compilation
/// unit. Every node carries the byte span it was parsed from so diagnostics
/// can be mapped back into the user's snippet.

use snapeval_lexer::Span;

use crate::types::Primitive;

/// A complete compilation unit
#[derive(Debug, Clone, PartialEq)]
pub struct CompilationUnit {
    pub package: Option<String>,
    pub imports: Vec<ImportDecl>,
    pub types: Vec<TypeDecl>,
}

/// Import declaration: `import a.b.C;`, `import a.b.*;`, `import static a.B.m;`
#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub name: String,
    pub is_static: bool,
    pub on_demand: bool,
    pub span: Span,
}

/// Declaration modifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub is_public: bool,
    pub is_protected: bool,
    pub is_private: bool,
    pub is_static: bool,
    pub is_final: bool,
    pub is_abstract: bool,
    pub is_native: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeDeclKind {
    Class,
    Interface,
    Enum,
}

/// Class, interface or enum declaration
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub kind: TypeDeclKind,
    pub name: String,
    pub modifiers: Modifiers,
    pub extends: Vec<TypeRef>,
    pub implements: Vec<TypeRef>,
    /// Enum constant names, in declaration order
    pub enum_constants: Vec<String>,
    pub members: Vec<Member>,
    pub span: Span,
}

impl TypeDecl {
    pub fn methods(&self) -> impl Iterator<Item = &MethodDecl> {
        self.members.iter().filter_map(|m| match m {
            Member::Method(method) => Some(method),
            _ => None,
        })
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDecl> {
        self.members.iter().filter_map(|m| match m {
            Member::Field(field) => Some(field),
            _ => None,
        })
    }

    pub fn nested_types(&self) -> impl Iterator<Item = &TypeDecl> {
        self.members.iter().filter_map(|m| match m {
            Member::Type(ty) => Some(ty),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Field(FieldDecl),
    Method(MethodDecl),
    Type(TypeDecl),
    Initializer { is_static: bool, span: Span },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub modifiers: Modifiers,
    pub ty: TypeRef,
    pub declarators: Vec<VarDeclarator>,
    pub span: Span,
}

/// Method or constructor declaration (`return_type` is `None` for constructors)
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub modifiers: Modifiers,
    pub return_type: Option<TypeRef>,
    pub name: String,
    pub params: Vec<Param>,
    pub throws: Vec<TypeRef>,
    /// `None` for abstract/native methods, or when bodies were skipped
    pub body: Option<Block>,
    pub span: Span,
}

impl MethodDecl {
    pub fn is_constructor(&self) -> bool {
        self.return_type.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub ty: TypeRef,
    pub name: String,
    pub varargs: bool,
    pub span: Span,
}

/// The base of a type reference
#[derive(Debug, Clone, PartialEq)]
pub enum TypeName {
    Primitive(Primitive),
    Void,
    /// Dotted name exactly as written (type arguments are erased)
    Named(String),
}

/// A reference to a type as written in source: base name plus array dimensions
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRef {
    pub name: TypeName,
    pub dims: usize,
    pub span: Span,
}

impl TypeRef {
    pub fn is_void(&self) -> bool {
        matches!(self.name, TypeName::Void) && self.dims == 0
    }
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            TypeName::Primitive(p) => write!(f, "{}", p.name())?,
            TypeName::Void => write!(f, "void")?,
            TypeName::Named(n) => write!(f, "{}", n)?,
        }
        for _ in 0..self.dims {
            write!(f, "[]")?;
        }
        Ok(())
    }
}

/// `name = init` inside a local or field declaration
#[derive(Debug, Clone, PartialEq)]
pub struct VarDeclarator {
    pub name: String,
    /// Extra dimensions written after the name: `int a[]`
    pub extra_dims: usize,
    pub init: Option<Expr>,
    pub span: Span,
}

/// Block of statements: `{ stmt1; stmt2; ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Block(Block),
    LocalVar {
        ty: TypeRef,
        declarators: Vec<VarDeclarator>,
    },
    Expr(Expr),
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        condition: Expr,
    },
    For {
        init: Vec<Stmt>,
        condition: Option<Expr>,
        update: Vec<Expr>,
        body: Box<Stmt>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Throw(Expr),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(u16),
    String(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    UShr,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Eq,
    NotEq,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    pub fn is_shift(&self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr)
    }

    pub fn is_comparison(&self) -> bool {
        matches!(self, BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq)
    }

    pub fn is_equality(&self) -> bool {
        matches!(self, BinaryOp::Eq | BinaryOp::NotEq)
    }

    pub fn is_bitwise(&self) -> bool {
        matches!(self, BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    /// Simple identifier; may denote a local, a field, a type or a package
    Name(String),
    This,
    /// `target.name`; the target may itself be an ambiguous name chain
    FieldAccess {
        target: Box<Expr>,
        name: String,
    },
    /// `super.name`
    SuperFieldAccess {
        name: String,
    },
    MethodCall {
        target: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
        /// `super.name(...)`
        is_super: bool,
    },
    New {
        ty: TypeRef,
        args: Vec<Expr>,
    },
    NewArray {
        /// Element type without dimensions
        element: TypeRef,
        dims: Vec<Expr>,
        /// Dimensions without a size expression (`new int[3][]`)
        extra_dims: usize,
        init: Option<Vec<Expr>>,
    },
    /// Bare `{a, b}` initializer, only legal in a declaration
    ArrayInit(Vec<Expr>),
    ArrayAccess {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `++x`, `--x`, `x++`, `x--`
    IncDec {
        increment: bool,
        prefix: bool,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `=` when `op` is `None`, otherwise a compound assignment
    Assign {
        op: Option<BinaryOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Cast {
        ty: TypeRef,
        expr: Box<Expr>,
    },
    InstanceOf {
        expr: Box<Expr>,
        ty: TypeRef,
    },
    ClassLiteral(TypeRef),
    Paren(Box<Expr>),
}

impl Expr {
    /// Flatten a chain of names (`a.b.c`) into its dotted spelling.
    pub fn as_dotted_name(&self) -> Option<String> {
        match &self.kind {
            ExprKind::Name(n) => Some(n.clone()),
            ExprKind::FieldAccess { target, name } => {
                target.as_dotted_name().map(|t| format!("{}.{}", t, name))
            }
            _ => None,
        }
    }
}
