//! Name binding and static type attribution.
//!
//! The resolver checks a parsed compilation unit against a
//! [`TypeEnvironment`], which answers "what does type `a.b.C` look like"
//! by binary name. Types declared in the unit itself are consulted only
//! when the environment does not know a name.
//!
//! The output is a [`ResolvedUnit`]: every method body in typed form plus
//! the positioned diagnostics collected along the way. Diagnostics carry
//! absolute byte spans into the resolved source text.

mod expr;
mod lookup;
mod stmt;
pub mod typed;

use std::collections::HashMap;
use std::sync::Arc;

use snapeval_lexer::Span;

use crate::ast::{CompilationUnit, Member, TypeDecl, TypeDeclKind, TypeName, TypeRef};
use crate::types::{JType, OBJECT};
use typed::ResolvedMethod;

/// Name of constructors in [`TypeInfo::methods`].
pub const CONSTRUCTOR_NAME: &str = "<init>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Interface,
    Enum,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    pub ty: JType,
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    /// Method name, or [`CONSTRUCTOR_NAME`]
    pub name: String,
    pub params: Vec<JType>,
    pub ret: JType,
    pub is_static: bool,
    pub is_constructor: bool,
    /// Last parameter is a variable-arity array
    pub varargs: bool,
}

/// Shape of a class or interface as far as resolution is concerned.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfo {
    /// Binary name (`java.util.Map$Entry`)
    pub name: String,
    pub kind: TypeKind,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
}

impl TypeInfo {
    pub fn constructors(&self) -> impl Iterator<Item = &MethodInfo> {
        self.methods.iter().filter(|m| m.is_constructor)
    }
}

/// Source of type metadata, keyed by binary name.
pub trait TypeEnvironment: Send + Sync {
    fn lookup(&self, binary_name: &str) -> Option<Arc<TypeInfo>>;
}

/// An environment that knows nothing; everything comes from the unit.
pub struct EmptyEnvironment;

impl TypeEnvironment for EmptyEnvironment {
    fn lookup(&self, _binary_name: &str) -> Option<Arc<TypeInfo>> {
        None
    }
}

/// A positioned resolution error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}: {}", self.span.start, self.span.end, self.message)
    }
}

/// Result of resolving a compilation unit.
#[derive(Debug, Clone, Default)]
pub struct ResolvedUnit {
    pub methods: Vec<ResolvedMethod>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ResolvedUnit {
    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn method(&self, owner: &str, name: &str) -> Option<&ResolvedMethod> {
        self.methods.iter().find(|m| m.owner == owner && m.name == name)
    }
}

/// Resolve every method body of `unit` against `env`.
pub fn resolve_unit(unit: &CompilationUnit, env: &dyn TypeEnvironment) -> ResolvedUnit {
    let mut resolver = Resolver::new(unit, env);
    resolver.declare_unit_types();

    let mut methods = Vec::new();
    for decl in &unit.types {
        let binary = resolver.qualify(&decl.name);
        resolver.resolve_type_decl(decl, &binary, &mut methods);
    }
    ResolvedUnit {
        methods,
        diagnostics: resolver.diagnostics,
    }
}

/// A lexical scope of snippet locals.
type Scope = HashMap<String, JType>;

pub(crate) struct Resolver<'a> {
    env: &'a dyn TypeEnvironment,
    unit: &'a CompilationUnit,
    /// Types declared in the unit, by binary name
    declared: HashMap<String, Arc<TypeInfo>>,
    pub(crate) diagnostics: Vec<Diagnostic>,
    /// Binary name of the type whose method is being resolved
    this_type: String,
    is_static: bool,
    scopes: Vec<Scope>,
    loop_depth: usize,
}

impl<'a> Resolver<'a> {
    fn new(unit: &'a CompilationUnit, env: &'a dyn TypeEnvironment) -> Self {
        Self {
            env,
            unit,
            declared: HashMap::new(),
            diagnostics: Vec::new(),
            this_type: OBJECT.to_string(),
            is_static: true,
            scopes: Vec::new(),
            loop_depth: 0,
        }
    }

    /// Binary name of a top-level type declared in this unit.
    fn qualify(&self, simple: &str) -> String {
        match &self.unit.package {
            Some(pkg) => format!("{}.{}", pkg, simple),
            None => simple.to_string(),
        }
    }

    /// Look a type up by binary name: environment first, then the unit.
    pub(crate) fn type_info(&self, binary_name: &str) -> Option<Arc<TypeInfo>> {
        self.env
            .lookup(binary_name)
            .or_else(|| self.declared.get(binary_name).cloned())
    }

    fn declare_unit_types(&mut self) {
        // Register names first so member signatures can refer to any type
        // in the unit, including ones declared later.
        let mut names = Vec::new();
        for decl in &self.unit.types {
            collect_type_names(decl, &self.qualify(&decl.name), &mut names);
        }
        for (binary, kind) in &names {
            self.declared.insert(
                binary.clone(),
                Arc::new(TypeInfo {
                    name: binary.clone(),
                    kind: *kind,
                    superclass: None,
                    interfaces: Vec::new(),
                    fields: Vec::new(),
                    methods: Vec::new(),
                }),
            );
        }
        for decl in &self.unit.types {
            let binary = self.qualify(&decl.name);
            self.declare_type(decl, &binary);
        }
    }

    fn declare_type(&mut self, decl: &TypeDecl, binary: &str) {
        let saved = std::mem::replace(&mut self.this_type, binary.to_string());
        let kind = match decl.kind {
            TypeDeclKind::Class => TypeKind::Class,
            TypeDeclKind::Interface => TypeKind::Interface,
            TypeDeclKind::Enum => TypeKind::Enum,
        };

        let (superclass, interfaces) = match decl.kind {
            TypeDeclKind::Interface => (
                None,
                decl.extends.iter().map(|t| self.lenient_class_name(t)).collect(),
            ),
            TypeDeclKind::Enum => (
                Some("java.lang.Enum".to_string()),
                decl.implements.iter().map(|t| self.lenient_class_name(t)).collect(),
            ),
            TypeDeclKind::Class => (
                Some(
                    decl.extends
                        .first()
                        .map(|t| self.lenient_class_name(t))
                        .unwrap_or_else(|| OBJECT.to_string()),
                ),
                decl.implements.iter().map(|t| self.lenient_class_name(t)).collect(),
            ),
        };

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        for constant in &decl.enum_constants {
            fields.push(FieldInfo {
                name: constant.clone(),
                ty: JType::Class(binary.to_string()),
                is_static: true,
            });
        }
        for member in &decl.members {
            match member {
                Member::Field(field) => {
                    for d in &field.declarators {
                        let ty = JType::array_of(self.lenient_type(&field.ty), d.extra_dims);
                        fields.push(FieldInfo {
                            name: d.name.clone(),
                            ty,
                            is_static: field.modifiers.is_static,
                        });
                    }
                }
                Member::Method(method) => {
                    let params = method.params.iter().map(|p| self.lenient_type(&p.ty)).collect();
                    let is_constructor = method.is_constructor();
                    methods.push(MethodInfo {
                        name: if is_constructor {
                            CONSTRUCTOR_NAME.to_string()
                        } else {
                            method.name.clone()
                        },
                        params,
                        ret: method
                            .return_type
                            .as_ref()
                            .map(|t| self.lenient_type(t))
                            .unwrap_or(JType::Void),
                        is_static: method.modifiers.is_static,
                        is_constructor,
                        varargs: method.params.last().is_some_and(|p| p.varargs),
                    });
                }
                Member::Type(nested) => {
                    self.declare_type(nested, &format!("{}${}", binary, nested.name));
                }
                Member::Initializer { .. } => {}
            }
        }

        self.declared.insert(
            binary.to_string(),
            Arc::new(TypeInfo {
                name: binary.to_string(),
                kind,
                superclass,
                interfaces,
                fields,
                methods,
            }),
        );
        self.this_type = saved;
    }

    /// Resolve a declared signature type without reporting failures;
    /// unknown names are kept as written.
    fn lenient_type(&self, ty: &TypeRef) -> JType {
        let base = match &ty.name {
            TypeName::Primitive(p) => JType::Primitive(*p),
            TypeName::Void => JType::Void,
            TypeName::Named(n) => JType::Class(self.find_type(n).unwrap_or_else(|| n.clone())),
        };
        JType::array_of(base, ty.dims)
    }

    fn lenient_class_name(&self, ty: &TypeRef) -> String {
        match self.lenient_type(ty) {
            JType::Class(n) => n,
            other => other.to_string(),
        }
    }

    /// Resolve a type reference written in a checked position.
    pub(crate) fn resolve_type(&mut self, ty: &TypeRef) -> Result<JType, Diagnostic> {
        let base = match &ty.name {
            TypeName::Primitive(p) => JType::Primitive(*p),
            TypeName::Void => JType::Void,
            TypeName::Named(n) => match self.find_type(n) {
                Some(binary) => JType::Class(binary),
                None => {
                    return Err(Diagnostic::new(format!("cannot find symbol: class {}", n), ty.span));
                }
            },
        };
        Ok(JType::array_of(base, ty.dims))
    }

    fn resolve_type_decl(&mut self, decl: &TypeDecl, binary: &str, out: &mut Vec<ResolvedMethod>) {
        for member in &decl.members {
            match member {
                Member::Method(method) => {
                    let Some(body) = &method.body else {
                        continue;
                    };
                    self.this_type = binary.to_string();
                    self.is_static = method.modifiers.is_static;
                    self.scopes = vec![Scope::new()];
                    self.loop_depth = 0;

                    let mut params = Vec::new();
                    for p in &method.params {
                        let ty = match self.resolve_type(&p.ty) {
                            Ok(ty) => ty,
                            Err(d) => {
                                self.diagnostics.push(d);
                                continue;
                            }
                        };
                        if let Err(d) = self.declare_local(&p.name, ty.clone(), p.span) {
                            self.diagnostics.push(d);
                        }
                        params.push((p.name.clone(), ty));
                    }
                    let ret = match &method.return_type {
                        Some(t) => self.resolve_type(t).unwrap_or_else(|d| {
                            self.diagnostics.push(d);
                            JType::Void
                        }),
                        None => JType::Void,
                    };

                    let statements = self.resolve_statements(&body.statements);
                    out.push(ResolvedMethod {
                        owner: binary.to_string(),
                        name: method.name.clone(),
                        params,
                        ret,
                        is_static: method.modifiers.is_static,
                        body: statements,
                        span: method.span,
                    });
                }
                Member::Type(nested) => {
                    let nested_binary = format!("{}${}", binary, nested.name);
                    self.resolve_type_decl(nested, &nested_binary, out);
                }
                Member::Field(_) | Member::Initializer { .. } => {}
            }
        }
    }

    // ==================== Scopes ====================

    pub(crate) fn push_scope(&mut self) {
        self.scopes.push(Scope::new());
    }

    pub(crate) fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub(crate) fn declare_local(&mut self, name: &str, ty: JType, span: Span) -> Result<(), Diagnostic> {
        if self.lookup_local(name).is_some() {
            return Err(Diagnostic::new(
                format!("variable {} is already defined in this method", name),
                span,
            ));
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), ty);
        }
        Ok(())
    }

    pub(crate) fn lookup_local(&self, name: &str) -> Option<&JType> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }
}

fn collect_type_names(decl: &TypeDecl, binary: &str, out: &mut Vec<(String, TypeKind)>) {
    let kind = match decl.kind {
        TypeDeclKind::Class => TypeKind::Class,
        TypeDeclKind::Interface => TypeKind::Interface,
        TypeDeclKind::Enum => TypeKind::Enum,
    };
    out.push((binary.to_string(), kind));
    for nested in decl.nested_types() {
        collect_type_names(nested, &format!("{}${}", binary, nested.name), out);
    }
}

#[cfg(test)]
mod tests;
