//! Expression typing.

use snapeval_lexer::Span;

use super::lookup::{box_value, convert, unbox};
use super::typed::{CallTarget, TExpr, TExprKind};
use super::{Diagnostic, Resolver};
use crate::ast::{BinaryOp, Expr, ExprKind, Literal, TypeRef, UnaryOp};
use crate::types::{binary_promotion, unary_promotion, JType, Primitive, CLASS, OBJECT};

type RResult<T> = Result<T, Diagnostic>;

/// What a (possibly dotted) name denotes.
enum Named {
    Value(TExpr),
    Type(String),
    Package(String),
}

impl Resolver<'_> {
    pub(crate) fn expr(&mut self, e: &Expr) -> RResult<TExpr> {
        let span = e.span;
        match &e.kind {
            ExprKind::Literal(lit) => Ok(TExpr::new(TExprKind::Literal(lit.clone()), literal_type(lit), span)),
            ExprKind::Name(_) | ExprKind::FieldAccess { .. } => match self.ambiguous(e)? {
                Named::Value(v) => Ok(v),
                Named::Type(_) | Named::Package(_) => Err(Diagnostic::new(
                    format!("cannot find symbol: variable {}", e.as_dotted_name().unwrap_or_default()),
                    span,
                )),
            },
            ExprKind::This => self.this_expr(span),
            ExprKind::SuperFieldAccess { name } => {
                let this = self.this_expr(span)?;
                let superclass = self.superclass_of_this(span)?;
                let Some((owner, field)) = self.find_field(&superclass, name) else {
                    return Err(Diagnostic::new(format!("cannot find symbol: variable {}", name), span));
                };
                let target = (!field.is_static).then(|| Box::new(this));
                Ok(TExpr::new(
                    TExprKind::Field {
                        target,
                        owner,
                        name: name.clone(),
                    },
                    field.ty,
                    span,
                ))
            }
            ExprKind::MethodCall {
                target,
                name,
                args,
                is_super,
            } => self.call(target.as_deref(), name, args, *is_super, span),
            ExprKind::New { ty, args } => self.new_instance(ty, args, span),
            ExprKind::NewArray {
                element,
                dims,
                extra_dims,
                init,
            } => {
                let element_ty = self.resolve_type(element)?;
                if element_ty.is_void() {
                    return Err(Diagnostic::new("'void' type not allowed here", element.span));
                }
                match init {
                    Some(elements) => {
                        let ty = JType::array_of(element_ty, *extra_dims);
                        self.array_init(elements, &ty, span)
                    }
                    None => {
                        let mut sizes = Vec::new();
                        for dim in dims {
                            let size = self.expr(dim)?;
                            sizes.push(self.integral_index(size)?);
                        }
                        let ty = JType::array_of(element_ty, dims.len() + extra_dims);
                        Ok(TExpr::new(TExprKind::NewArray { dims: sizes }, ty, span))
                    }
                }
            }
            ExprKind::ArrayInit(_) => Err(Diagnostic::new("array initializer is not allowed here", span)),
            ExprKind::ArrayAccess { array, index } => {
                let array = self.expr(array)?;
                let Some(element) = array.ty.element_type().cloned() else {
                    return Err(Diagnostic::new(
                        format!("array required, but {} found", array.ty),
                        array.span,
                    ));
                };
                let index = self.expr(index)?;
                let index = self.integral_index(index)?;
                Ok(TExpr::new(
                    TExprKind::ArrayElement {
                        array: Box::new(array),
                        index: Box::new(index),
                    },
                    element,
                    span,
                ))
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.expr(operand)?;
                self.unary(*op, operand, span)
            }
            ExprKind::IncDec {
                increment,
                prefix,
                operand,
            } => {
                let operand = self.expr(operand)?;
                if !operand.is_variable() {
                    return Err(Diagnostic::new("unexpected type: required variable, found value", operand.span));
                }
                if !operand.ty.unboxed_primitive().is_some_and(|p| p.is_numeric()) {
                    return Err(Diagnostic::new(
                        format!("bad operand type {} for unary operator '{}'", operand.ty, if *increment { "++" } else { "--" }),
                        span,
                    ));
                }
                let ty = operand.ty.clone();
                Ok(TExpr::new(
                    TExprKind::IncDec {
                        increment: *increment,
                        prefix: *prefix,
                        operand: Box::new(operand),
                    },
                    ty,
                    span,
                ))
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.expr(lhs)?;
                let rhs = self.expr(rhs)?;
                self.binary(*op, lhs, rhs, span)
            }
            ExprKind::Assign { op, target, value } => {
                let target = self.expr(target)?;
                if !target.is_variable() {
                    return Err(Diagnostic::new("unexpected type: required variable, found value", target.span));
                }
                let value = match (&value.kind, &target.ty) {
                    (ExprKind::ArrayInit(elements), JType::Array(_)) if op.is_none() => {
                        self.array_init(elements, &target.ty.clone(), value.span)?
                    }
                    _ => self.expr(value)?,
                };
                match op {
                    None => {
                        let value = self.assign_conversion(value, &target.ty)?;
                        let ty = target.ty.clone();
                        Ok(TExpr::new(
                            TExprKind::Assign {
                                target: Box::new(target),
                                value: Box::new(value),
                            },
                            ty,
                            span,
                        ))
                    }
                    Some(op) => self.compound_assign(*op, target, value, span),
                }
            }
            ExprKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                let condition = self.expr(condition)?;
                let condition = self.boolean_operand(condition)?;
                let then_expr = self.expr(then_expr)?;
                let else_expr = self.expr(else_expr)?;
                self.conditional(condition, then_expr, else_expr, span)
            }
            ExprKind::Cast { ty, expr } => {
                let target = self.resolve_type(ty)?;
                let operand = self.expr(expr)?;
                self.cast(operand, target, span)
            }
            ExprKind::InstanceOf { expr, ty } => {
                let operand = self.expr(expr)?;
                let target = self.resolve_type(ty)?;
                if !operand.ty.is_reference() || !target.is_reference() {
                    return Err(Diagnostic::new(
                        format!("unexpected type: {} instanceof {}", operand.ty, target),
                        span,
                    ));
                }
                if self.provably_distinct(&operand.ty, &target) {
                    return Err(Diagnostic::new(
                        format!("incompatible types: {} cannot be converted to {}", operand.ty, target),
                        span,
                    ));
                }
                Ok(TExpr::new(
                    TExprKind::InstanceOf {
                        expr: Box::new(operand),
                        target,
                    },
                    JType::boolean(),
                    span,
                ))
            }
            ExprKind::ClassLiteral(ty) => {
                let target = self.resolve_type(ty)?;
                Ok(TExpr::new(TExprKind::ClassLiteral(target), JType::Class(CLASS.to_string()), span))
            }
            ExprKind::Paren(inner) => {
                let mut inner = self.expr(inner)?;
                inner.span = span;
                Ok(inner)
            }
        }
    }

    fn this_expr(&self, span: Span) -> RResult<TExpr> {
        if self.is_static {
            return Err(Diagnostic::new("non-static variable this cannot be referenced from a static context", span));
        }
        Ok(TExpr::new(TExprKind::This, JType::Class(self.this_type.clone()), span))
    }

    fn superclass_of_this(&self, span: Span) -> RResult<String> {
        self.type_info(&self.this_type)
            .and_then(|info| info.superclass.clone())
            .ok_or_else(|| Diagnostic::new(format!("{} has no superclass", self.this_type), span))
    }

    // ==================== Names ====================

    fn ambiguous(&mut self, e: &Expr) -> RResult<Named> {
        match &e.kind {
            ExprKind::Name(name) => self.simple_name(name, e.span),
            ExprKind::FieldAccess { target, name } => match self.ambiguous(target)? {
                Named::Value(value) => Ok(Named::Value(self.field_of(value, name, e.span)?)),
                Named::Type(class) => {
                    if let Some((owner, field)) = self.find_field(&class, name) {
                        if !field.is_static {
                            return Err(Diagnostic::new(
                                format!("non-static variable {} cannot be referenced from a static context", name),
                                e.span,
                            ));
                        }
                        return Ok(Named::Value(TExpr::new(
                            TExprKind::Field {
                                target: None,
                                owner,
                                name: name.clone(),
                            },
                            field.ty,
                            e.span,
                        )));
                    }
                    let nested = format!("{}${}", class, name);
                    if self.type_exists(&nested) {
                        return Ok(Named::Type(nested));
                    }
                    Err(Diagnostic::new(
                        format!("cannot find symbol: variable {} in {}", name, class),
                        e.span,
                    ))
                }
                Named::Package(package) => {
                    let qualified = format!("{}.{}", package, name);
                    if self.type_exists(&qualified) {
                        Ok(Named::Type(qualified))
                    } else {
                        Ok(Named::Package(qualified))
                    }
                }
            },
            _ => Ok(Named::Value(self.expr(e)?)),
        }
    }

    /// Simple names bind to: snippet and frame locals, fields of the
    /// current type hierarchy, static fields of enclosing types, static
    /// imports, then types and packages.
    fn simple_name(&mut self, name: &str, span: Span) -> RResult<Named> {
        if let Some(ty) = self.lookup_local(name) {
            return Ok(Named::Value(TExpr::new(TExprKind::Local(name.to_string()), ty.clone(), span)));
        }

        let chain = self.enclosing_chain();
        for (depth, class) in chain.iter().enumerate() {
            let Some((owner, field)) = self.find_field(class, name) else {
                continue;
            };
            let target = if field.is_static {
                None
            } else if depth == 0 && !self.is_static {
                Some(Box::new(TExpr::new(TExprKind::This, JType::Class(self.this_type.clone()), span)))
            } else {
                return Err(Diagnostic::new(
                    format!("non-static variable {} cannot be referenced from a static context", name),
                    span,
                ));
            };
            return Ok(Named::Value(TExpr::new(
                TExprKind::Field {
                    target,
                    owner,
                    name: name.to_string(),
                },
                field.ty,
                span,
            )));
        }

        for class in self.static_import_owners(name) {
            if let Some((owner, field)) = self.find_field(&class, name) {
                if field.is_static {
                    return Ok(Named::Value(TExpr::new(
                        TExprKind::Field {
                            target: None,
                            owner,
                            name: name.to_string(),
                        },
                        field.ty,
                        span,
                    )));
                }
            }
        }

        if let Some(class) = self.find_type(name) {
            return Ok(Named::Type(class));
        }
        Ok(Named::Package(name.to_string()))
    }

    /// Types named by static imports that could supply member `name`.
    fn static_import_owners(&self, name: &str) -> Vec<String> {
        let mut owners = Vec::new();
        for import in self.unit.imports.iter().filter(|i| i.is_static) {
            let class_name = if import.on_demand {
                import.name.as_str()
            } else {
                match import.name.rsplit_once('.') {
                    Some((class, member)) if member == name => class,
                    _ => continue,
                }
            };
            if let Some(class) = self.find_qualified(class_name) {
                owners.push(class);
            }
        }
        owners
    }

    fn field_of(&mut self, target: TExpr, name: &str, span: Span) -> RResult<TExpr> {
        match &target.ty {
            JType::Array(_) if name == "length" => Ok(TExpr::new(
                TExprKind::ArrayLength(Box::new(target)),
                JType::int(),
                span,
            )),
            JType::Class(class) => {
                let Some((owner, field)) = self.find_field(class, name) else {
                    return Err(Diagnostic::new(
                        format!("cannot find symbol: variable {} in {}", name, class),
                        span,
                    ));
                };
                let target = (!field.is_static).then(|| Box::new(target));
                Ok(TExpr::new(
                    TExprKind::Field {
                        target,
                        owner,
                        name: name.to_string(),
                    },
                    field.ty,
                    span,
                ))
            }
            other => Err(Diagnostic::new(format!("{} cannot be dereferenced", other), span)),
        }
    }

    // ==================== Calls ====================

    fn call(&mut self, target: Option<&Expr>, name: &str, args: &[Expr], is_super: bool, span: Span) -> RResult<TExpr> {
        let mut typed_args = Vec::with_capacity(args.len());
        for arg in args {
            let arg = self.expr(arg)?;
            if arg.ty.is_void() {
                return Err(Diagnostic::new("'void' type not allowed here", arg.span));
            }
            typed_args.push(arg);
        }

        if is_super {
            self.this_expr(span)?;
            let superclass = self.superclass_of_this(span)?;
            let candidates = self.find_methods(&superclass, name);
            let selected = self.select_method(candidates, typed_args, name, span)?;
            let call_target = if selected.method.is_static {
                CallTarget::Static
            } else {
                CallTarget::Super
            };
            return Ok(make_call(call_target, selected, name, span));
        }

        let Some(target) = target else {
            return self.unqualified_call(name, typed_args, span);
        };

        match self.ambiguous(target)? {
            Named::Value(receiver) => {
                let class = match &receiver.ty {
                    JType::Class(class) => class.clone(),
                    JType::Array(_) => OBJECT.to_string(),
                    other => {
                        return Err(Diagnostic::new(format!("{} cannot be dereferenced", other), receiver.span));
                    }
                };
                let candidates = self.find_methods(&class, name);
                let selected = self.select_method(candidates, typed_args, name, span)?;
                let call_target = if selected.method.is_static {
                    CallTarget::Static
                } else {
                    CallTarget::Virtual(Box::new(receiver))
                };
                Ok(make_call(call_target, selected, name, span))
            }
            Named::Type(class) => {
                let candidates = self.find_methods(&class, name);
                let selected = self.select_method(candidates, typed_args, name, span)?;
                if !selected.method.is_static {
                    return Err(Diagnostic::new(
                        format!("non-static method {} cannot be referenced from a static context", name),
                        span,
                    ));
                }
                Ok(make_call(CallTarget::Static, selected, name, span))
            }
            Named::Package(package) => Err(Diagnostic::new(
                format!("cannot find symbol: variable {}", package),
                target.span,
            )),
        }
    }

    fn unqualified_call(&mut self, name: &str, args: Vec<TExpr>, span: Span) -> RResult<TExpr> {
        let chain = self.enclosing_chain();
        for (depth, class) in chain.iter().enumerate() {
            let candidates = self.find_methods(class, name);
            if candidates.is_empty() {
                continue;
            }
            let selected = self.select_method(candidates, args, name, span)?;
            let call_target = if selected.method.is_static {
                CallTarget::Static
            } else if depth == 0 && !self.is_static {
                CallTarget::Virtual(Box::new(TExpr::new(
                    TExprKind::This,
                    JType::Class(self.this_type.clone()),
                    span,
                )))
            } else {
                return Err(Diagnostic::new(
                    format!("non-static method {} cannot be referenced from a static context", name),
                    span,
                ));
            };
            return Ok(make_call(call_target, selected, name, span));
        }

        let mut candidates = Vec::new();
        for class in self.static_import_owners(name) {
            candidates.extend(
                self.find_methods(&class, name)
                    .into_iter()
                    .filter(|(_, m)| m.is_static),
            );
        }
        let selected = self.select_method(candidates, args, name, span)?;
        Ok(make_call(CallTarget::Static, selected, name, span))
    }

    fn new_instance(&mut self, ty: &TypeRef, args: &[Expr], span: Span) -> RResult<TExpr> {
        let class_ty = self.resolve_type(ty)?;
        let JType::Class(class) = class_ty.clone() else {
            return Err(Diagnostic::new(format!("cannot instantiate {}", class_ty), ty.span));
        };
        let mut typed_args = Vec::with_capacity(args.len());
        for arg in args {
            typed_args.push(self.expr(arg)?);
        }
        let candidates = self.find_constructors(&class);
        if candidates.is_empty() {
            return Err(Diagnostic::new(
                format!("{} is abstract; cannot be instantiated", class),
                ty.span,
            ));
        }
        let selected = self.select_method(candidates, typed_args, &class, span)?;
        Ok(TExpr::new(
            TExprKind::New {
                class,
                params: selected.method.params,
                args: selected.args,
            },
            class_ty,
            span,
        ))
    }

    /// `{a, b, ...}` against an array type.
    pub(crate) fn array_init(&mut self, elements: &[Expr], ty: &JType, span: Span) -> RResult<TExpr> {
        let Some(element_ty) = ty.element_type().cloned() else {
            return Err(Diagnostic::new(
                format!("illegal initializer for {}", ty),
                span,
            ));
        };
        let mut typed = Vec::with_capacity(elements.len());
        for element in elements {
            let value = match &element.kind {
                ExprKind::ArrayInit(nested) => self.array_init(nested, &element_ty, element.span)?,
                _ => {
                    let value = self.expr(element)?;
                    self.assign_conversion(value, &element_ty)?
                }
            };
            typed.push(value);
        }
        Ok(TExpr::new(TExprKind::ArrayLiteral(typed), ty.clone(), span))
    }

    fn integral_index(&self, index: TExpr) -> RResult<TExpr> {
        let promoted = index.ty.unboxed_primitive().and_then(unary_promotion);
        match promoted {
            Some(Primitive::Int) => Ok(convert(unbox(index), JType::int())),
            _ => Err(Diagnostic::new(
                format!("incompatible types: {} cannot be converted to int", index.ty),
                index.span,
            )),
        }
    }

    // ==================== Operators ====================

    pub(crate) fn boolean_operand(&self, e: TExpr) -> RResult<TExpr> {
        match e.ty.unboxed_primitive() {
            Some(Primitive::Boolean) => Ok(unbox(e)),
            _ => Err(Diagnostic::new(
                format!("incompatible types: {} cannot be converted to boolean", e.ty),
                e.span,
            )),
        }
    }

    fn unary(&self, op: UnaryOp, operand: TExpr, span: Span) -> RResult<TExpr> {
        let bad = |ty: &JType| {
            Diagnostic::new(
                format!("bad operand type {} for unary operator '{}'", ty, op.symbol()),
                span,
            )
        };
        match op {
            UnaryOp::Not => {
                let operand_ty = operand.ty.clone();
                let operand = self.boolean_operand(operand).map_err(|_| bad(&operand_ty))?;
                Ok(TExpr::new(
                    TExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    JType::boolean(),
                    span,
                ))
            }
            UnaryOp::Neg | UnaryOp::Plus | UnaryOp::BitNot => {
                let Some(p) = operand
                    .ty
                    .unboxed_primitive()
                    .filter(|p| p.is_numeric())
                    .and_then(unary_promotion)
                else {
                    return Err(bad(&operand.ty));
                };
                if op == UnaryOp::BitNot && !p.is_integral() {
                    return Err(bad(&operand.ty));
                }
                let ty = JType::Primitive(p);
                let operand = convert(unbox(operand), ty.clone());
                if op == UnaryOp::Plus {
                    let mut operand = operand;
                    operand.span = span;
                    return Ok(operand);
                }
                Ok(TExpr::new(
                    TExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    ty,
                    span,
                ))
            }
        }
    }

    fn binary(&self, op: BinaryOp, lhs: TExpr, rhs: TExpr, span: Span) -> RResult<TExpr> {
        let bad = |lhs: &JType, rhs: &JType| {
            Diagnostic::new(
                format!("bad operand types for binary operator '{}': {} and {}", op.symbol(), lhs, rhs),
                span,
            )
        };
        if lhs.ty.is_void() || rhs.ty.is_void() {
            return Err(bad(&lhs.ty, &rhs.ty));
        }

        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            let (lt, rt) = (lhs.ty.clone(), rhs.ty.clone());
            let lhs = self.boolean_operand(lhs).map_err(|_| bad(&lt, &rt))?;
            let rhs = self.boolean_operand(rhs).map_err(|_| bad(&lt, &rt))?;
            return Ok(TExpr::new(
                TExprKind::Logical {
                    and: op == BinaryOp::And,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                JType::boolean(),
                span,
            ));
        }

        if op == BinaryOp::Add && (lhs.ty.is_string() || rhs.ty.is_string()) {
            return Ok(TExpr::new(
                TExprKind::Concat(Box::new(lhs), Box::new(rhs)),
                JType::string(),
                span,
            ));
        }

        let lp = lhs.ty.unboxed_primitive();
        let rp = rhs.ty.unboxed_primitive();

        if op.is_equality() {
            let either_primitive = lhs.ty.is_primitive() || rhs.ty.is_primitive();
            let operand_ty = match (lp, rp) {
                (Some(Primitive::Boolean), Some(Primitive::Boolean)) if either_primitive => Some(Primitive::Boolean),
                (Some(a), Some(b)) if either_primitive => {
                    Some(binary_promotion(a, b).ok_or_else(|| bad(&lhs.ty, &rhs.ty))?)
                }
                _ if lhs.ty.is_reference() && rhs.ty.is_reference() => {
                    if self.provably_distinct(&lhs.ty, &rhs.ty) {
                        return Err(Diagnostic::new(
                            format!("incomparable types: {} and {}", lhs.ty, rhs.ty),
                            span,
                        ));
                    }
                    None
                }
                _ => return Err(bad(&lhs.ty, &rhs.ty)),
            };
            return Ok(self.binary_node(op, operand_ty, lhs, rhs, JType::boolean(), span));
        }

        let (Some(a), Some(b)) = (lp, rp) else {
            return Err(bad(&lhs.ty, &rhs.ty));
        };

        if op.is_bitwise() && a == Primitive::Boolean && b == Primitive::Boolean {
            return Ok(self.binary_node(op, Some(Primitive::Boolean), lhs, rhs, JType::boolean(), span));
        }

        if op.is_shift() {
            let (Some(pl), Some(_)) = (unary_promotion(a), unary_promotion(b)) else {
                return Err(bad(&lhs.ty, &rhs.ty));
            };
            if !a.is_integral() || !b.is_integral() {
                return Err(bad(&lhs.ty, &rhs.ty));
            }
            let lhs = convert(unbox(lhs), JType::Primitive(pl));
            // the shift distance is masked, so its low 32 bits suffice
            let rhs = convert(unbox(rhs), JType::int());
            return Ok(TExpr::new(
                TExprKind::Binary {
                    op,
                    operand_ty: Some(pl),
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                JType::Primitive(pl),
                span,
            ));
        }

        let Some(p) = binary_promotion(a, b) else {
            return Err(bad(&lhs.ty, &rhs.ty));
        };
        if op.is_bitwise() && !p.is_integral() {
            return Err(bad(&lhs.ty, &rhs.ty));
        }
        let result = if op.is_comparison() {
            JType::boolean()
        } else {
            JType::Primitive(p)
        };
        Ok(self.binary_node(op, Some(p), lhs, rhs, result, span))
    }

    fn binary_node(
        &self,
        op: BinaryOp,
        operand_ty: Option<Primitive>,
        lhs: TExpr,
        rhs: TExpr,
        result: JType,
        span: Span,
    ) -> TExpr {
        let (lhs, rhs) = match operand_ty {
            Some(p) => (
                convert(unbox(lhs), JType::Primitive(p)),
                convert(unbox(rhs), JType::Primitive(p)),
            ),
            None => (lhs, rhs),
        };
        TExpr::new(
            TExprKind::Binary {
                op,
                operand_ty,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            result,
            span,
        )
    }

    fn compound_assign(&self, op: BinaryOp, target: TExpr, value: TExpr, span: Span) -> RResult<TExpr> {
        let ty = target.ty.clone();
        let bad = || {
            Diagnostic::new(
                format!("bad operand types for binary operator '{}': {} and {}", op.symbol(), target.ty, value.ty),
                span,
            )
        };
        if value.ty.is_void() {
            return Err(bad());
        }
        if op == BinaryOp::Add && target.ty.is_string() {
            return Ok(TExpr::new(
                TExprKind::CompoundAssign {
                    op,
                    operand_ty: None,
                    target: Box::new(target),
                    value: Box::new(value),
                },
                ty,
                span,
            ));
        }
        let (Some(tp), Some(vp)) = (target.ty.unboxed_primitive(), value.ty.unboxed_primitive()) else {
            return Err(bad());
        };
        let operand_ty = if op.is_bitwise() && tp == Primitive::Boolean && vp == Primitive::Boolean {
            Primitive::Boolean
        } else if op.is_shift() {
            match unary_promotion(tp) {
                Some(p) if tp.is_integral() && vp.is_integral() => p,
                _ => return Err(bad()),
            }
        } else {
            match binary_promotion(tp, vp) {
                Some(p) if !op.is_bitwise() || p.is_integral() => p,
                _ => return Err(bad()),
            }
        };
        let value_ty = if op.is_shift() {
            JType::int()
        } else {
            JType::Primitive(operand_ty)
        };
        let value = convert(unbox(value), value_ty);
        Ok(TExpr::new(
            TExprKind::CompoundAssign {
                op,
                operand_ty: Some(operand_ty),
                target: Box::new(target),
                value: Box::new(value),
            },
            ty,
            span,
        ))
    }

    fn conditional(&self, condition: TExpr, then_expr: TExpr, else_expr: TExpr, span: Span) -> RResult<TExpr> {
        let (tt, et) = (then_expr.ty.clone(), else_expr.ty.clone());
        if tt.is_void() || et.is_void() {
            return Err(Diagnostic::new("'void' type not allowed here", span));
        }
        let (then_expr, else_expr, ty) = if tt == et {
            (then_expr, else_expr, tt)
        } else if let (Some(a), Some(b)) = (tt.unboxed_primitive(), et.unboxed_primitive()) {
            if a == Primitive::Boolean && b == Primitive::Boolean {
                (unbox(then_expr), unbox(else_expr), JType::boolean())
            } else {
                let p = binary_promotion(a, b).ok_or_else(|| {
                    Diagnostic::new(format!("incompatible types in conditional: {} and {}", tt, et), span)
                })?;
                let ty = JType::Primitive(p);
                (convert(unbox(then_expr), ty.clone()), convert(unbox(else_expr), ty.clone()), ty)
            }
        } else {
            let then_expr = box_value(then_expr);
            let else_expr = box_value(else_expr);
            let ty = if else_expr.ty == JType::Null || self.is_subtype(&else_expr.ty, &then_expr.ty) {
                then_expr.ty.clone()
            } else if then_expr.ty == JType::Null || self.is_subtype(&then_expr.ty, &else_expr.ty) {
                else_expr.ty.clone()
            } else {
                JType::object()
            };
            (then_expr, else_expr, ty)
        };
        Ok(TExpr::new(
            TExprKind::Conditional {
                condition: Box::new(condition),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            ty,
            span,
        ))
    }

    fn cast(&self, operand: TExpr, target: JType, span: Span) -> RResult<TExpr> {
        let incompatible = |from: &JType| {
            Diagnostic::new(
                format!("incompatible types: {} cannot be converted to {}", from, target),
                span,
            )
        };
        if operand.ty.is_void() || target.is_void() {
            return Err(incompatible(&operand.ty));
        }
        let from = operand.ty.clone();

        if let JType::Primitive(to) = &target {
            let to = *to;
            let node = match (&from, from.unboxed_primitive()) {
                (JType::Primitive(p), _) => {
                    if (*p == Primitive::Boolean) != (to == Primitive::Boolean) {
                        return Err(incompatible(&from));
                    }
                    operand
                }
                (JType::Class(_), Some(p)) => {
                    if (p == Primitive::Boolean) != (to == Primitive::Boolean) {
                        return Err(incompatible(&from));
                    }
                    unbox(operand)
                }
                (JType::Class(_), None) if self.is_subtype(&JType::Class(to.box_class().to_string()), &from) => {
                    // e.g. `(int) obj`: check against the wrapper, then unbox
                    let checked = TExpr::new(
                        TExprKind::CheckCast(Box::new(operand)),
                        JType::Class(to.box_class().to_string()),
                        span,
                    );
                    unbox(checked)
                }
                _ => return Err(incompatible(&from)),
            };
            let mut converted = convert(node, target.clone());
            converted.span = span;
            return Ok(converted);
        }

        if let JType::Primitive(_) = from {
            let boxed = box_value(operand);
            if !self.is_subtype(&boxed.ty, &target) {
                return Err(incompatible(&from));
            }
            let mut boxed = boxed;
            boxed.span = span;
            return Ok(boxed);
        }

        if self.is_subtype(&from, &target) {
            // upcasts never fail; only the static type changes
            let mut widened = operand;
            widened.ty = target;
            widened.span = span;
            return Ok(widened);
        }
        let arrays_incompatible = matches!((&from, &target), (JType::Array(a), JType::Array(b))
            if a.is_primitive() || b.is_primitive());
        if arrays_incompatible || self.provably_distinct(&from, &target) {
            return Err(incompatible(&from));
        }
        Ok(TExpr::new(TExprKind::CheckCast(Box::new(operand)), target, span))
    }
}

fn make_call(target: CallTarget, selected: super::lookup::Selected, name: &str, span: Span) -> TExpr {
    let ret = selected.method.ret.clone();
    TExpr::new(
        TExprKind::Call {
            target,
            owner: selected.owner,
            name: name.to_string(),
            params: selected.method.params,
            args: selected.args,
        },
        ret,
        span,
    )
}

fn literal_type(lit: &Literal) -> JType {
    match lit {
        Literal::Int(_) => JType::int(),
        Literal::Long(_) => JType::Primitive(Primitive::Long),
        Literal::Float(_) => JType::Primitive(Primitive::Float),
        Literal::Double(_) => JType::Primitive(Primitive::Double),
        Literal::Char(_) => JType::Primitive(Primitive::Char),
        Literal::String(_) => JType::string(),
        Literal::Boolean(_) => JType::boolean(),
        Literal::Null => JType::Null,
    }
}
