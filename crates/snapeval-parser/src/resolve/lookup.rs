//! Type-name lookup, member lookup, subtyping and overload selection.

use std::collections::HashSet;

use snapeval_lexer::Span;

use super::typed::{TExpr, TExprKind};
use super::{Diagnostic, FieldInfo, MethodInfo, Resolver, TypeKind};
use crate::ast::Literal;
use crate::types::{JType, Primitive, OBJECT};

/// How a value of one type is converted to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Conversion {
    Identity,
    /// Widening primitive conversion
    Widen,
    /// Boxing, then reference widening
    Box(Primitive),
    /// Unboxing, then primitive widening
    Unbox(Primitive),
}

/// Method applicability phase: strict, loose (boxing) or variable arity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Strict,
    Loose,
    Varargs,
}

/// A selected overload with its already-converted arguments.
pub(crate) struct Selected {
    pub owner: String,
    pub method: MethodInfo,
    pub args: Vec<TExpr>,
}

impl Resolver<'_> {
    // ==================== Type names ====================

    /// Resolve a type name as written (simple or dotted) to a binary name.
    pub(crate) fn find_type(&self, name: &str) -> Option<String> {
        if let Some((first, rest)) = name.split_once('.') {
            if let Some(found) = self.find_qualified(name) {
                return Some(found);
            }
            let outer = self.find_simple_type(first)?;
            let nested = format!("{}${}", outer, rest.replace('.', "$"));
            return self.type_exists(&nested).then_some(nested);
        }
        self.find_simple_type(name)
    }

    pub(crate) fn type_exists(&self, binary: &str) -> bool {
        self.type_info(binary).is_some()
    }

    /// `a.b.C.D` may name `a.b.C.D`, `a.b.C$D`, `a.b$C$D`...
    pub(crate) fn find_qualified(&self, name: &str) -> Option<String> {
        let segments: Vec<&str> = name.split('.').collect();
        for split in (1..=segments.len()).rev() {
            let head = segments[..split].join(".");
            let candidate = if split == segments.len() {
                head
            } else {
                format!("{}${}", head, segments[split..].join("$"))
            };
            if self.type_exists(&candidate) {
                return Some(candidate);
            }
        }
        None
    }

    /// Simple names resolve against, in order: types declared in the unit,
    /// member types of the enclosing types, single-type imports, the
    /// current package, `java.lang`, and on-demand imports.
    fn find_simple_type(&self, name: &str) -> Option<String> {
        let qualified = self.qualify(name);
        if self.declared.contains_key(&qualified) {
            return Some(qualified);
        }
        for enclosing in self.enclosing_chain() {
            let candidate = format!("{}${}", enclosing, name);
            if self.type_exists(&candidate) {
                return Some(candidate);
            }
        }
        for import in &self.unit.imports {
            if import.is_static || import.on_demand {
                continue;
            }
            let simple = import.name.rsplit('.').next().unwrap_or(&import.name);
            if simple == name {
                if let Some(found) = self.find_qualified(&import.name) {
                    return Some(found);
                }
            }
        }
        if self.type_exists(&qualified) {
            return Some(qualified);
        }
        let lang = format!("java.lang.{}", name);
        if self.type_exists(&lang) {
            return Some(lang);
        }
        for import in &self.unit.imports {
            if import.is_static || !import.on_demand {
                continue;
            }
            if let Some(found) = self.find_qualified(&format!("{}.{}", import.name, name)) {
                return Some(found);
            }
        }
        None
    }

    /// The current type followed by each lexically enclosing type
    /// (`a.Outer$Inner$1`, `a.Outer$Inner`, `a.Outer`).
    pub(crate) fn enclosing_chain(&self) -> Vec<String> {
        let mut chain = vec![self.this_type.clone()];
        let mut current = self.this_type.as_str();
        let simple_start = current.rfind('.').map(|i| i + 1).unwrap_or(0);
        while let Some(idx) = current.rfind('$') {
            if idx <= simple_start {
                break;
            }
            current = &current[..idx];
            chain.push(current.to_string());
        }
        chain
    }

    // ==================== Hierarchy ====================

    /// `class` followed by all its supertypes, superclasses first. Every
    /// hierarchy ends in `java.lang.Object`.
    pub(crate) fn supertypes(&self, class: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut interfaces = Vec::new();

        let mut current = Some(class.to_string());
        while let Some(name) = current.take() {
            if !seen.insert(name.clone()) {
                break;
            }
            out.push(name.clone());
            if let Some(info) = self.type_info(&name) {
                interfaces.extend(info.interfaces.iter().cloned());
                current = info.superclass.clone();
            }
        }
        while !interfaces.is_empty() {
            let name = interfaces.remove(0);
            if !seen.insert(name.clone()) {
                continue;
            }
            out.push(name.clone());
            if let Some(info) = self.type_info(&name) {
                interfaces.extend(info.interfaces.iter().cloned());
            }
        }
        if seen.insert(OBJECT.to_string()) {
            out.push(OBJECT.to_string());
        }
        out
    }

    fn class_extends(&self, from: &str, to: &str) -> bool {
        to == OBJECT || self.supertypes(from).iter().any(|s| s == to)
    }

    pub(crate) fn is_subtype(&self, from: &JType, to: &JType) -> bool {
        if from == to {
            return true;
        }
        match (from, to) {
            (JType::Null, t) => t.is_reference(),
            (JType::Class(a), JType::Class(b)) => self.class_extends(a, b),
            (JType::Array(_), JType::Class(b)) => {
                b == OBJECT || b == "java.lang.Cloneable" || b == "java.io.Serializable"
            }
            (JType::Array(a), JType::Array(b)) => match (a.as_ref(), b.as_ref()) {
                (JType::Primitive(x), JType::Primitive(y)) => x == y,
                (x, y) if x.is_reference() && y.is_reference() => self.is_subtype(x, y),
                _ => false,
            },
            _ => false,
        }
    }

    /// Whether `name` is known to be a class (not an interface).
    pub(crate) fn is_class_type(&self, ty: &JType) -> bool {
        match ty {
            JType::Class(name) => self
                .type_info(name)
                .is_some_and(|info| info.kind != TypeKind::Interface),
            _ => false,
        }
    }

    /// Two reference types for which no value can belong to both.
    pub(crate) fn provably_distinct(&self, a: &JType, b: &JType) -> bool {
        let (JType::Class(_), JType::Class(_)) = (a, b) else {
            return false;
        };
        self.is_class_type(a) && self.is_class_type(b) && !self.is_subtype(a, b) && !self.is_subtype(b, a)
    }

    // ==================== Members ====================

    pub(crate) fn find_field(&self, class: &str, name: &str) -> Option<(String, FieldInfo)> {
        for owner in self.supertypes(class) {
            if let Some(info) = self.type_info(&owner) {
                if let Some(field) = info.fields.iter().find(|f| f.name == name) {
                    return Some((owner, field.clone()));
                }
            }
        }
        None
    }

    /// Methods named `name` visible in `class`, most-derived first.
    /// Overridden signatures are reported once, at their most-derived owner.
    pub(crate) fn find_methods(&self, class: &str, name: &str) -> Vec<(String, MethodInfo)> {
        let mut found: Vec<(String, MethodInfo)> = Vec::new();
        for owner in self.supertypes(class) {
            let Some(info) = self.type_info(&owner) else {
                continue;
            };
            for method in info.methods.iter().filter(|m| m.name == name && !m.is_constructor) {
                if !found.iter().any(|(_, m)| m.params == method.params) {
                    found.push((owner.clone(), method.clone()));
                }
            }
        }
        found
    }

    pub(crate) fn find_constructors(&self, class: &str) -> Vec<(String, MethodInfo)> {
        let Some(info) = self.type_info(class) else {
            return Vec::new();
        };
        let declared: Vec<_> = info
            .constructors()
            .map(|m| (class.to_string(), m.clone()))
            .collect();
        if declared.is_empty() && info.kind != TypeKind::Interface {
            // implicit default constructor
            return vec![(
                class.to_string(),
                MethodInfo {
                    name: super::CONSTRUCTOR_NAME.to_string(),
                    params: Vec::new(),
                    ret: JType::Void,
                    is_static: false,
                    is_constructor: true,
                    varargs: false,
                },
            )];
        }
        declared
    }

    // ==================== Conversions ====================

    /// Conversion from `from` to `to` in an assignment or invocation
    /// context; `loose` allows boxing and unboxing.
    pub(crate) fn conversion(&self, from: &JType, to: &JType, loose: bool) -> Option<Conversion> {
        if from == to {
            return Some(Conversion::Identity);
        }
        match (from, to) {
            (JType::Primitive(a), JType::Primitive(b)) => a.widens_to(*b).then_some(Conversion::Widen),
            (JType::Primitive(a), _) if to.is_reference() => {
                let boxed = JType::Class(a.box_class().to_string());
                (loose && self.is_subtype(&boxed, to)).then_some(Conversion::Box(*a))
            }
            (JType::Class(_), JType::Primitive(b)) => {
                let p = from.unboxed_primitive()?;
                (loose && p.widens_to(*b)).then_some(Conversion::Unbox(p))
            }
            _ if from.is_reference() && to.is_reference() => {
                self.is_subtype(from, to).then_some(Conversion::Identity)
            }
            _ => None,
        }
    }

    pub(crate) fn apply_conversion(&self, expr: TExpr, conversion: Conversion, to: &JType) -> TExpr {
        match conversion {
            Conversion::Identity => expr,
            Conversion::Widen => convert(expr, to.clone()),
            Conversion::Box(_) => box_value(expr),
            Conversion::Unbox(_) => convert(unbox(expr), to.clone()),
        }
    }

    /// Assignment conversion, including narrowing of constant `int`s to
    /// `byte`, `short` and `char`.
    pub(crate) fn assign_conversion(&self, expr: TExpr, to: &JType) -> Result<TExpr, Diagnostic> {
        if expr.ty.is_void() {
            return Err(Diagnostic::new("'void' type not allowed here", expr.span));
        }
        if let Some(conversion) = self.conversion(&expr.ty, to, true) {
            return Ok(self.apply_conversion(expr, conversion, to));
        }
        if let (Some(value), Some(target)) = (int_constant(&expr), to.unboxed_primitive()) {
            let fits = match target {
                Primitive::Byte => i8::try_from(value).is_ok(),
                Primitive::Short => i16::try_from(value).is_ok(),
                Primitive::Char => u16::try_from(value).is_ok(),
                _ => false,
            };
            if fits && expr.ty == JType::int() {
                let narrowed = convert(expr, JType::Primitive(target));
                return Ok(if to.is_primitive() { narrowed } else { box_value(narrowed) });
            }
        }
        Err(Diagnostic::new(
            format!("incompatible types: {} cannot be converted to {}", expr.ty, to),
            expr.span,
        ))
    }

    // ==================== Overloads ====================

    fn applicable(&self, method: &MethodInfo, args: &[TExpr], phase: Phase) -> bool {
        match phase {
            Phase::Strict | Phase::Loose => {
                method.params.len() == args.len()
                    && method
                        .params
                        .iter()
                        .zip(args)
                        .all(|(p, a)| self.conversion(&a.ty, p, phase == Phase::Loose).is_some())
            }
            Phase::Varargs => {
                let Some((last, fixed)) = method.params.split_last() else {
                    return false;
                };
                let Some(element) = last.element_type() else {
                    return false;
                };
                method.varargs
                    && args.len() >= fixed.len()
                    && fixed
                        .iter()
                        .zip(args)
                        .all(|(p, a)| self.conversion(&a.ty, p, true).is_some())
                    && args[fixed.len()..]
                        .iter()
                        .all(|a| self.conversion(&a.ty, element, true).is_some())
            }
        }
    }

    fn more_specific(&self, m: &MethodInfo, n: &MethodInfo) -> bool {
        m.params
            .iter()
            .zip(&n.params)
            .all(|(a, b)| self.conversion(a, b, false).is_some())
    }

    /// Pick the overload for `args`: strict applicability, then loose, then
    /// variable arity. Among applicable candidates the first maximally
    /// specific one wins.
    pub(crate) fn select_method(
        &self,
        candidates: Vec<(String, MethodInfo)>,
        args: Vec<TExpr>,
        name: &str,
        span: Span,
    ) -> Result<Selected, Diagnostic> {
        let arg_list = args.iter().map(|a| a.ty.to_string()).collect::<Vec<_>>().join(",");
        if candidates.is_empty() {
            return Err(Diagnostic::new(
                format!("cannot find symbol: method {}({})", name, arg_list),
                span,
            ));
        }

        for phase in [Phase::Strict, Phase::Loose, Phase::Varargs] {
            let applicable: Vec<&(String, MethodInfo)> = candidates
                .iter()
                .filter(|(_, m)| self.applicable(m, &args, phase))
                .collect();
            if applicable.is_empty() {
                continue;
            }
            let chosen = applicable
                .iter()
                .find(|(_, m)| applicable.iter().all(|(_, n)| self.more_specific(m, n)))
                .unwrap_or(&applicable[0]);
            let (owner, method) = (chosen.0.clone(), chosen.1.clone());
            let args = self.convert_args(&method, args, phase);
            return Ok(Selected { owner, method, args });
        }

        Err(Diagnostic::new(
            format!("no suitable method found for {}({})", name, arg_list),
            span,
        ))
    }

    fn convert_args(&self, method: &MethodInfo, args: Vec<TExpr>, phase: Phase) -> Vec<TExpr> {
        let loose = phase != Phase::Strict;
        let convert_one = |arg: TExpr, param: &JType| match self.conversion(&arg.ty, param, loose) {
            Some(c) => self.apply_conversion(arg, c, param),
            None => arg,
        };
        if phase != Phase::Varargs {
            return args
                .into_iter()
                .zip(&method.params)
                .map(|(a, p)| convert_one(a, p))
                .collect();
        }

        let fixed_len = method.params.len() - 1;
        let array_ty = method.params[fixed_len].clone();
        let element = array_ty.element_type().cloned().unwrap_or_else(JType::object);
        let mut args = args.into_iter();
        let mut out: Vec<TExpr> = args
            .by_ref()
            .take(fixed_len)
            .zip(&method.params)
            .map(|(a, p)| convert_one(a, p))
            .collect();
        let rest: Vec<TExpr> = args.map(|a| convert_one(a, &element)).collect();
        let span = rest
            .iter()
            .map(|e| e.span)
            .reduce(Span::to)
            .unwrap_or_else(|| out.last().map(|e| e.span).unwrap_or_default());
        out.push(TExpr::new(TExprKind::ArrayLiteral(rest), array_ty, span));
        out
    }
}

/// Primitive conversion node (elided when the type already matches).
pub(crate) fn convert(expr: TExpr, ty: JType) -> TExpr {
    if expr.ty == ty {
        return expr;
    }
    let span = expr.span;
    TExpr::new(TExprKind::Convert(Box::new(expr)), ty, span)
}

pub(crate) fn box_value(expr: TExpr) -> TExpr {
    match expr.ty.primitive() {
        Some(p) => {
            let span = expr.span;
            TExpr::new(
                TExprKind::Box(Box::new(expr)),
                JType::Class(p.box_class().to_string()),
                span,
            )
        }
        None => expr,
    }
}

/// Unbox a wrapper-typed expression (no-op on primitives).
pub(crate) fn unbox(expr: TExpr) -> TExpr {
    match (&expr.ty, expr.ty.unboxed_primitive()) {
        (JType::Class(_), Some(p)) => {
            let span = expr.span;
            TExpr::new(TExprKind::Unbox(Box::new(expr)), JType::Primitive(p), span)
        }
        _ => expr,
    }
}

/// Value of an integer constant expression, for the narrowing rules.
pub(crate) fn int_constant(expr: &TExpr) -> Option<i64> {
    match &expr.kind {
        TExprKind::Literal(Literal::Int(v)) => Some(i64::from(*v)),
        TExprKind::Literal(Literal::Char(c)) => Some(i64::from(*c)),
        TExprKind::Unary {
            op: crate::ast::UnaryOp::Neg,
            operand,
        } => int_constant(operand).map(|v| -v),
        _ => None,
    }
}
