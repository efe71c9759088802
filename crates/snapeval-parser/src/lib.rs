//! Parser for snippet compilation units.
//!
//! Three entry points:
//! - [`parse`] parses a full compilation unit, method bodies included. This is
//!   what the resolver checks.
//! - [`parse_outline`] parses only declarations and skips method bodies by
//!   brace matching, so real-world sources that use constructs outside the
//!   supported subset still yield their package, imports and member
//!   signatures.
//! - [`parse_expression`] parses an input that must consist of exactly one
//!   expression.
//!
//! The grammar lives in `grammar.lalrpop`; [`LexerAdapter`] prepares the
//! token stream it consumes.

pub mod token;
pub mod adapter;
mod actions;
pub mod ast;
pub mod resolve;
pub mod types;

// Include generated parser code from lalrpop
#[rustfmt::skip]
#[allow(clippy::all, unused)]
mod grammar {
    include!(concat!(env!("OUT_DIR"), "/grammar.rs"));
}

pub use adapter::{LexerAdapter, Mode, ParseError};
pub use ast::*;
pub use resolve::{resolve_unit, Diagnostic, FieldInfo, MethodInfo, ResolvedUnit, TypeEnvironment, TypeInfo, TypeKind};
pub use token::ParserToken;
pub use types::{JType, Primitive};

use actions::GrammarError;
use snapeval_lexer::{lex_str, Span};

fn tokens(input: &str, mode: Mode) -> Result<LexerAdapter, ParseError> {
    Ok(LexerAdapter::new(lex_str(input)?, mode))
}

/// Parse a compilation unit including method bodies
pub fn parse(input: &str) -> Result<CompilationUnit, ParseError> {
    grammar::CompilationUnitParser::new()
        .parse(tokens(input, Mode::Full)?)
        .map_err(|e| convert_error(input, e))
}

/// Parse a compilation unit, skipping method and initializer bodies
pub fn parse_outline(input: &str) -> Result<CompilationUnit, ParseError> {
    grammar::CompilationUnitParser::new()
        .parse(tokens(input, Mode::Outline)?)
        .map_err(|e| convert_error(input, e))
}

/// Parse an input that must be a single expression
pub fn parse_expression(input: &str) -> Result<Expr, ParseError> {
    grammar::ExpressionParser::new()
        .parse(tokens(input, Mode::Full)?)
        .map_err(|e| convert_error(input, e))
}

/// Parse a sequence of block statements (a method body without braces)
pub fn parse_statements(input: &str) -> Result<Vec<Stmt>, ParseError> {
    grammar::BlockStatementsParser::new()
        .parse(tokens(input, Mode::Full)?)
        .map_err(|e| convert_error(input, e))
}

/// Turn a generated-parser error into a message over source spans.
fn convert_error(input: &str, error: GrammarError) -> ParseError {
    match error {
        GrammarError::InvalidToken { location } => ParseError::new("invalid token", Span::new(location, location)),
        GrammarError::UnrecognizedEof { expected, .. } => {
            let end = Span::new(input.len(), input.len());
            match describe_expected(&expected) {
                Some(expected) => ParseError::new(format!("expected {}, found end of input", expected), end),
                None => ParseError::new("unexpected end of input", end),
            }
        }
        GrammarError::UnrecognizedToken { token: (_, token, _), expected } => {
            let message = match describe_expected(&expected) {
                Some(expected) => format!("expected {}, found {}", expected, token),
                None => format!("unexpected {}", token),
            };
            ParseError::new(message, token.span())
        }
        GrammarError::ExtraToken { token: (_, token, _) } => ParseError::new(format!("unexpected {}", token), token.span()),
        GrammarError::User { error } => error,
    }
}

/// A short list of what the grammar would have accepted, or `None` when it
/// is too long to be useful.
fn describe_expected(expected: &[String]) -> Option<String> {
    let mut names: Vec<String> = Vec::new();
    for terminal in expected {
        let name = match terminal.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
            Some(text) => format!("`{}`", text),
            None => match terminal.as_str() {
                "Ident" => "identifier".to_string(),
                "SkippedBody" => "`{`".to_string(),
                _ => "literal".to_string(),
            },
        };
        if !names.contains(&name) {
            names.push(name);
        }
    }
    match names.len() {
        0 => None,
        1 => names.pop(),
        n if n <= 4 => {
            let last = names.pop()?;
            Some(format!("{} or {}", names.join(", "), last))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(input: &str) -> Expr {
        let result = parse_expression(input);
        assert!(result.is_ok(), "Failed to parse {:?}: {:?}", input, result);
        result.unwrap()
    }

    #[test]
    fn test_parse_empty() {
        let result = parse("");
        assert!(result.is_ok(), "Failed to parse empty input: {:?}", result);
        let unit = result.unwrap();
        assert!(unit.types.is_empty());
        assert!(unit.package.is_none());
    }

    #[test]
    fn test_parse_package_and_imports() {
        let input = "package com.acme; import java.util.List; import java.io.*; import static java.lang.Math.max;";
        let unit = parse(input).unwrap();
        assert_eq!(unit.package.as_deref(), Some("com.acme"));
        assert_eq!(unit.imports.len(), 3);
        assert_eq!(unit.imports[0].name, "java.util.List");
        assert!(unit.imports[1].on_demand);
        assert_eq!(unit.imports[1].name, "java.io");
        assert!(unit.imports[2].is_static);
    }

    #[test]
    fn test_parse_class_with_members() {
        let input = r#"
            public class Point extends Base implements Comparable<Point> {
                private int x, y = 2;
                static final String NAME = "p";
                public Point(int x) { this.x = x; }
                int sum(int a, int... rest) { return x + a; }
                abstract void run();
                static class Inner {}
            }
        "#;
        let unit = parse(input).unwrap();
        let ty = &unit.types[0];
        assert_eq!(ty.name, "Point");
        assert_eq!(ty.extends.len(), 1);
        assert_eq!(ty.implements.len(), 1);
        assert_eq!(ty.fields().count(), 2);
        let methods: Vec<_> = ty.methods().collect();
        assert_eq!(methods.len(), 3);
        assert!(methods[0].is_constructor());
        assert!(methods[1].params[1].varargs);
        assert_eq!(methods[1].params[1].ty.dims, 1);
        assert!(methods[2].body.is_none());
        assert_eq!(ty.nested_types().count(), 1);
    }

    #[test]
    fn test_outline_skips_unsupported_bodies() {
        let input = r#"
            class Worker {
                void run() {
                    try { doIt(); } catch (Exception e) { list.forEach(x -> log(x)); }
                }
                int count;
            }
        "#;
        assert!(parse(input).is_err());
        let unit = parse_outline(input).unwrap();
        assert_eq!(unit.types[0].methods().count(), 1);
        assert!(unit.types[0].methods().next().unwrap().body.is_none());
    }

    #[test]
    fn test_parse_enum() {
        let unit = parse_outline("enum Color { RED, GREEN(1) { }, BLUE; int code; }").unwrap();
        assert_eq!(unit.types[0].enum_constants, vec!["RED", "GREEN", "BLUE"]);
        assert_eq!(unit.types[0].fields().count(), 1);
    }

    #[test]
    fn test_operator_precedence() {
        let e = expr("1 + 2 * 3");
        match e.kind {
            ExprKind::Binary { op: BinaryOp::Add, rhs, .. } => {
                assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("Expected addition, got {:?}", other),
        }
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let e = expr("a = b += 3");
        match e.kind {
            ExprKind::Assign { op: None, value, .. } => {
                assert!(matches!(value.kind, ExprKind::Assign { op: Some(BinaryOp::Add), .. }));
            }
            other => panic!("Expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_cast_versus_parenthesized() {
        assert!(matches!(expr("(int) x").kind, ExprKind::Cast { .. }));
        assert!(matches!(expr("(String) obj").kind, ExprKind::Cast { .. }));
        assert!(matches!(expr("(a) + b").kind, ExprKind::Binary { .. }));
        assert!(matches!(expr("(int) -x").kind, ExprKind::Cast { .. }));
        assert!(matches!(expr("(a)").kind, ExprKind::Paren(_)));
    }

    #[test]
    fn test_generic_types_in_declarations() {
        let stmts = parse_statements("java.util.Map<String, java.util.List<Integer>> m = null; int y = a >> 2;").unwrap();
        assert_eq!(stmts.len(), 2);
        match &stmts[0].kind {
            StmtKind::LocalVar { ty, .. } => {
                assert_eq!(ty.name, TypeName::Named("java.util.Map".into()));
            }
            other => panic!("Expected local declaration, got {:?}", other),
        }
        match &stmts[1].kind {
            StmtKind::LocalVar { declarators, .. } => {
                let init = declarators[0].init.as_ref().unwrap();
                assert!(matches!(init.kind, ExprKind::Binary { op: BinaryOp::Shr, .. }));
            }
            other => panic!("Expected local declaration, got {:?}", other),
        }
    }

    #[test]
    fn test_less_than_is_not_a_type() {
        let stmts = parse_statements("a < b;").unwrap();
        assert!(matches!(stmts[0].kind, StmtKind::Expr(_)));
    }

    #[test]
    fn test_method_calls_and_member_access() {
        let e = expr("obj.items[0].name.length()");
        match e.kind {
            ExprKind::MethodCall { target: Some(target), name, args, .. } => {
                assert_eq!(name, "length");
                assert!(args.is_empty());
                assert!(matches!(target.kind, ExprKind::FieldAccess { .. }));
            }
            other => panic!("Expected method call, got {:?}", other),
        }
    }

    #[test]
    fn test_creators() {
        assert!(matches!(expr("new java.util.ArrayList<String>()").kind, ExprKind::New { .. }));
        match expr("new int[3][]").kind {
            ExprKind::NewArray { dims, extra_dims, init, .. } => {
                assert_eq!(dims.len(), 1);
                assert_eq!(extra_dims, 1);
                assert!(init.is_none());
            }
            other => panic!("Expected array creation, got {:?}", other),
        }
        match expr("new int[][] {{1}, {2, 3}}").kind {
            ExprKind::NewArray { init: Some(init), extra_dims, .. } => {
                assert_eq!(extra_dims, 2);
                assert_eq!(init.len(), 2);
            }
            other => panic!("Expected array initializer, got {:?}", other),
        }
    }

    #[test]
    fn test_class_literals() {
        assert!(matches!(expr("String.class").kind, ExprKind::ClassLiteral(_)));
        assert!(matches!(expr("int[].class").kind, ExprKind::ClassLiteral(TypeRef { dims: 1, .. })));
        assert!(matches!(expr("java.lang.String[].class").kind, ExprKind::ClassLiteral(TypeRef { dims: 1, .. })));
    }

    #[test]
    fn test_literal_ranges() {
        assert!(matches!(expr("-2147483648").kind, ExprKind::Literal(Literal::Int(i32::MIN))));
        assert!(parse_expression("2147483648").is_err());
        assert!(matches!(expr("0xFFFFFFFF").kind, ExprKind::Literal(Literal::Int(-1))));
        assert!(matches!(expr("017").kind, ExprKind::Literal(Literal::Int(15))));
    }

    #[test]
    fn test_statements() {
        let stmts = parse_statements(
            "int i = 0; for (int j = 0; j < 3; j++) { i += j; } while (i > 0) i--; do { i++; } while (i < 2); if (i == 2) return i; else throw e;",
        )
        .unwrap();
        assert_eq!(stmts.len(), 5);
        assert!(matches!(stmts[1].kind, StmtKind::For { .. }));
        assert!(matches!(stmts[4].kind, StmtKind::If { else_branch: Some(_), .. }));
    }

    #[test]
    fn test_unsupported_statements_are_reported() {
        let err = parse_statements("try { x(); } finally { }").unwrap_err();
        assert!(err.message.contains("not supported"));
        assert_eq!(err.span.start, 0);
    }

    #[test]
    fn test_instanceof_binds_tighter_than_equality() {
        let e = expr("a instanceof String == true");
        assert!(matches!(e.kind, ExprKind::Binary { op: BinaryOp::Eq, .. }));
    }

    #[test]
    fn test_expression_must_consume_input() {
        assert!(parse_expression("x + 1;").is_err());
        assert!(parse_expression("x + 1").is_ok());
    }

    #[test]
    fn test_error_position() {
        let err = parse_expression("foo(1, ").unwrap_err();
        assert_eq!(err.span.start, 7);
    }

    #[test]
    fn test_else_binds_to_nearest_if() {
        let stmts = parse_statements("if (a) if (b) x(); else y();").unwrap();
        match &stmts[0].kind {
            StmtKind::If { then_branch, else_branch: None, .. } => {
                assert!(matches!(then_branch.kind, StmtKind::If { else_branch: Some(_), .. }));
            }
            other => panic!("Expected if without else, got {:?}", other),
        }
    }

    #[test]
    fn test_interface_members_are_public() {
        let unit = parse("interface Shape { int SIDES = 4; double area(); }").unwrap();
        let ty = &unit.types[0];
        assert_eq!(ty.kind, TypeDeclKind::Interface);
        let field = ty.fields().next().unwrap();
        assert!(field.modifiers.is_public && field.modifiers.is_static && field.modifiers.is_final);
        assert!(ty.methods().next().unwrap().modifiers.is_public);
    }

    #[test]
    fn test_enum_without_constants() {
        let unit = parse("enum Empty { ; static int n; }").unwrap();
        assert!(unit.types[0].enum_constants.is_empty());
        assert_eq!(unit.types[0].fields().count(), 1);
    }

    #[test]
    fn test_generated_method_shape() {
        let input = "package p;\nclass Outer$Inner {\n  static int x;\n  native String m(int a);\n  void ___run(final int a, final String[] b) throws java.lang.Throwable {\n    return;\n  }\n}\n";
        let unit = parse(input).unwrap();
        let ty = &unit.types[0];
        assert_eq!(ty.name, "Outer$Inner");
        let run = ty.methods().find(|m| m.name == "___run").unwrap();
        assert_eq!(run.params.len(), 2);
        assert_eq!(run.params[1].ty.dims, 1);
        assert_eq!(run.throws[0].name, TypeName::Named("java.lang.Throwable".into()));
        assert!(run.body.is_some());
    }

    #[test]
    fn test_unexpected_token_message() {
        let err = parse_statements("int = 3;").unwrap_err();
        assert_eq!(err.span.start, 4);
        assert!(err.message.contains("`=`"), "{}", err.message);
    }
}
