//! Token stream rewriting between the lexer and the generated parser.
//!
//! The grammar covers a Java subset without type arguments or annotations.
//! Before tokens reach it they pass through a few rewrites:
//! - annotations are dropped, `@interface` excepted;
//! - type argument and type parameter lists are erased;
//! - `-2147483648` and `-9223372036854775808L` become single literals;
//! - in outline mode, method and initializer bodies collapse into one
//!   [`ParserToken::SkippedBody`].
//!
//! Constructs snippets cannot use end the stream with an error at the point
//! they start, so they are reported in source order along with syntax errors.

use snapeval_lexer::{Keyword, LexError, Punct, Span, Token};
use thiserror::Error;

use crate::token::{Located, ParserToken};

/// A syntax error with the byte span it was detected at.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError::new(e.message, e.span)
    }
}

/// A token with its start and end offsets, as the generated parser takes it.
pub type Spanned = (usize, ParserToken, usize);

/// How much of a compilation unit to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Full,
    /// Declarations only; bodies are skipped by brace matching.
    Outline,
}

/// Feeds rewritten lexer tokens to the generated parser.
pub struct LexerAdapter {
    tokens: std::vec::IntoIter<ParserToken>,
    error: Option<ParseError>,
}

impl LexerAdapter {
    pub fn new(tokens: Vec<Token>, mode: Mode) -> Self {
        let tokens: Vec<ParserToken> = tokens.into_iter().filter_map(ParserToken::new).collect();
        let tokens = fold_min_literals(erase_type_arguments(strip_annotations(tokens)));
        let (mut tokens, mut error) = match mode {
            Mode::Full => (tokens, None),
            Mode::Outline => collapse_bodies(tokens),
        };
        if let Some((at, unsupported)) = find_unsupported(&tokens) {
            tokens.truncate(at);
            error = Some(unsupported);
        }
        Self {
            tokens: tokens.into_iter(),
            error,
        }
    }
}

impl Iterator for LexerAdapter {
    type Item = Result<Spanned, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.tokens.next() {
            Some(token) => {
                let span = token.span();
                Some(Ok((span.start, token, span.end)))
            }
            None => self.error.take().map(Err),
        }
    }
}

fn is_punct(tokens: &[ParserToken], at: usize, p: Punct) -> bool {
    tokens.get(at).is_some_and(|t| t.is_punct(p))
}

fn is_ident(tokens: &[ParserToken], at: usize) -> bool {
    tokens.get(at).is_some_and(ParserToken::is_ident)
}

fn retain_unmarked(tokens: Vec<ParserToken>, marked: &[bool]) -> Vec<ParserToken> {
    tokens
        .into_iter()
        .zip(marked)
        .filter(|(_, marked)| !**marked)
        .map(|(token, _)| token)
        .collect()
}

/// Index of the token closing the group opened at `open`.
fn matching(tokens: &[ParserToken], open: usize, left: Punct, right: Punct) -> Option<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        if token.is_punct(left) {
            depth += 1;
        } else if token.is_punct(right) {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

fn strip_annotations(tokens: Vec<ParserToken>) -> Vec<ParserToken> {
    let mut stripped = vec![false; tokens.len()];
    let mut i = 0;
    while i < tokens.len() {
        match annotation_end(&tokens, i) {
            Some(end) => {
                stripped[i..end].fill(true);
                i = end;
            }
            None => i += 1,
        }
    }
    retain_unmarked(tokens, &stripped)
}

/// One past the last token of an annotation starting at `at`.
fn annotation_end(tokens: &[ParserToken], at: usize) -> Option<usize> {
    if !is_punct(tokens, at, Punct::At) || !is_ident(tokens, at + 1) {
        return None;
    }
    let mut end = at + 2;
    while is_punct(tokens, end, Punct::Dot) && is_ident(tokens, end + 1) {
        end += 2;
    }
    if is_punct(tokens, end, Punct::LParen) {
        end = matching(tokens, end, Punct::LParen, Punct::RParen)? + 1;
    }
    Some(end)
}

fn erase_type_arguments(tokens: Vec<ParserToken>) -> Vec<ParserToken> {
    let mut erased = vec![false; tokens.len()];
    let mut prev = None;
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i].is_punct(Punct::Lt) {
            if let Some(close) = type_arguments_at(&tokens, prev, i) {
                erased[i..=close].fill(true);
                i = close + 1;
                continue;
            }
        }
        prev = Some(i);
        i += 1;
    }
    retain_unmarked(tokens, &erased)
}

/// The closing index of a type argument or type parameter list opened at
/// `open`, or `None` when the `<` is a comparison.
///
/// After a modifier or at the start of a member the list declares type
/// parameters. After a name it is a type argument list when it is balanced,
/// holds only type syntax, and is not followed by an operand.
fn type_arguments_at(tokens: &[ParserToken], prev: Option<usize>, open: usize) -> Option<usize> {
    let declaration = match prev.map(|p| &tokens[p]) {
        None => true,
        Some(ParserToken::Keyword(kw, _)) if kw.is_modifier() => true,
        Some(ParserToken::Punct(Punct::LBrace | Punct::RBrace | Punct::Semi, _)) => true,
        Some(ParserToken::Ident(_)) => false,
        Some(_) => return None,
    };
    let close = closing_angle(tokens, open)?;
    if declaration {
        return Some(close);
    }
    match tokens.get(close + 1) {
        Some(next) if next.is_literal() => None,
        Some(ParserToken::Keyword(Keyword::This | Keyword::Super | Keyword::New, _)) => None,
        Some(ParserToken::Punct(
            Punct::Bang | Punct::Tilde | Punct::Plus | Punct::Minus | Punct::PlusPlus | Punct::MinusMinus,
            _,
        )) => None,
        _ => Some(close),
    }
}

fn closing_angle(tokens: &[ParserToken], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token {
            ParserToken::Punct(Punct::Lt, _) => depth += 1,
            ParserToken::Punct(Punct::Gt, _) => depth -= 1,
            ParserToken::Punct(Punct::Shr, _) => depth -= 2,
            ParserToken::Punct(Punct::UShr, _) => depth -= 3,
            ParserToken::Punct(
                Punct::Comma | Punct::Dot | Punct::Question | Punct::Amp | Punct::LBracket | Punct::RBracket,
                _,
            ) => {}
            ParserToken::Ident(_) => {}
            ParserToken::Keyword(kw, _) if kw.is_primitive_type() || matches!(kw, Keyword::Extends | Keyword::Super) => {}
            _ => return None,
        }
        match depth {
            0 => return Some(i),
            d if d < 0 => return None,
            _ => {}
        }
    }
    None
}

/// `-2147483648` and `-9223372036854775808L` are only in range with their
/// sign attached.
fn fold_min_literals(tokens: Vec<ParserToken>) -> Vec<ParserToken> {
    let mut out: Vec<ParserToken> = Vec::with_capacity(tokens.len());
    for token in tokens {
        let after_minus = out.last().is_some_and(|t| t.is_punct(Punct::Minus));
        let token = match token {
            ParserToken::IntLiteral(lit) if after_minus && lit.value == "2147483648" => {
                ParserToken::IntLiteral(negate(out.pop(), lit))
            }
            ParserToken::LongLiteral(lit) if after_minus && lit.value == "9223372036854775808" => {
                ParserToken::LongLiteral(negate(out.pop(), lit))
            }
            other => other,
        };
        out.push(token);
    }
    out
}

fn negate(minus: Option<ParserToken>, lit: Located<String>) -> Located<String> {
    let span = minus.map_or(lit.span, |m| m.span().to(lit.span));
    Located {
        value: format!("-{}", lit.value),
        span,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Group {
    TypeBody,
    Other,
}

/// Replace every method, constructor and initializer body with a single
/// [`ParserToken::SkippedBody`].
fn collapse_bodies(tokens: Vec<ParserToken>) -> (Vec<ParserToken>, Option<ParseError>) {
    let mut out: Vec<ParserToken> = Vec::with_capacity(tokens.len());
    let mut groups = Vec::new();
    let mut header_pending = false;
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        let after_dot = out.last().is_some_and(|t| t.is_punct(Punct::Dot));
        if matches!(token, ParserToken::Keyword(Keyword::Class | Keyword::Interface | Keyword::Enum, _)) && !after_dot {
            header_pending = true;
        } else if token.is_punct(Punct::LBrace) {
            if header_pending {
                header_pending = false;
                groups.push(Group::TypeBody);
            } else if matches!(groups.last(), None | Some(Group::TypeBody)) && out.last().is_some_and(opens_body) {
                let Some(close) = matching(&tokens, i, Punct::LBrace, Punct::RBrace) else {
                    return (out, Some(ParseError::new("unbalanced `{`", token.span())));
                };
                out.push(ParserToken::SkippedBody(token.span().to(tokens[close].span())));
                i = close + 1;
                continue;
            } else {
                groups.push(Group::Other);
            }
        } else if token.is_punct(Punct::RBrace) {
            groups.pop();
        }
        out.push(token.clone());
        i += 1;
    }
    (out, None)
}

/// Whether a `{` directly inside a type body after `prev` starts a body.
fn opens_body(prev: &ParserToken) -> bool {
    matches!(
        prev,
        ParserToken::Ident(_)
            | ParserToken::Keyword(Keyword::Static, _)
            | ParserToken::Punct(Punct::RParen | Punct::LBrace | Punct::RBrace | Punct::Semi, _)
    )
}

fn unsupported(tokens: &[ParserToken], at: usize, message: impl Into<String>) -> Option<(usize, ParseError)> {
    Some((at, ParseError::new(message, tokens[at].span())))
}

/// The first construct outside the snippet subset, with the index it starts at.
fn find_unsupported(tokens: &[ParserToken]) -> Option<(usize, ParseError)> {
    for (i, token) in tokens.iter().enumerate() {
        let next = tokens.get(i + 1);
        let prev = i.checked_sub(1).map(|p| &tokens[p]);
        let next_is = |p: Punct| next.is_some_and(|t| t.is_punct(p));
        match token {
            ParserToken::Keyword(
                kw @ (Keyword::Try | Keyword::Catch | Keyword::Finally | Keyword::Switch | Keyword::Case),
                _,
            ) => {
                return unsupported(tokens, i, format!("`{}` statements are not supported in snippets", kw.as_str()));
            }
            ParserToken::Keyword(Keyword::Synchronized, _) if next_is(Punct::LParen) => {
                return unsupported(tokens, i, "`synchronized` statements are not supported in snippets");
            }
            ParserToken::Punct(Punct::Arrow, _) => {
                return unsupported(tokens, lambda_start(tokens, i), "lambda expressions are not supported");
            }
            ParserToken::Punct(Punct::ColonColon, _) => {
                return unsupported(tokens, i, "method references are not supported");
            }
            ParserToken::Punct(Punct::Dot, _) if next.is_some_and(|t| t.is_keyword(Keyword::This)) => {
                return unsupported(tokens, i + 1, "qualified `this` is not supported");
            }
            ParserToken::Punct(Punct::Dot, _) if next_is(Punct::Lt) => {
                return unsupported(tokens, i + 1, "explicit type arguments are not supported");
            }
            ParserToken::Keyword(Keyword::This | Keyword::Super, _)
                if next_is(Punct::LParen) && !prev.is_some_and(|t| t.is_punct(Punct::Dot)) =>
            {
                return unsupported(tokens, i, "constructor calls are not supported");
            }
            ParserToken::Keyword(Keyword::Break, _) if next.is_some_and(ParserToken::is_ident) => {
                return unsupported(tokens, i + 1, "labeled break is not supported");
            }
            ParserToken::Keyword(Keyword::Continue, _) if next.is_some_and(ParserToken::is_ident) => {
                return unsupported(tokens, i + 1, "labeled continue is not supported");
            }
            ParserToken::Ident(_) if next_is(Punct::Colon) && starts_statement(prev) => {
                return unsupported(tokens, i, "labeled statements are not supported");
            }
            ParserToken::Keyword(Keyword::For, _) if next_is(Punct::LParen) => {
                if let Some(colon) = enhanced_for_colon(tokens, i + 1) {
                    return unsupported(tokens, colon - 1, "enhanced for statements are not supported");
                }
            }
            ParserToken::Keyword(Keyword::New, _) => {
                if let Some(body) = anonymous_body(tokens, i) {
                    return unsupported(tokens, body, "anonymous classes are not supported");
                }
            }
            _ => {}
        }
    }
    None
}

fn starts_statement(prev: Option<&ParserToken>) -> bool {
    match prev {
        None => true,
        Some(token) => matches!(token, ParserToken::Punct(Punct::LBrace | Punct::RBrace | Punct::Semi, _)),
    }
}

/// Where the lambda whose arrow is at `arrow` begins: its parameter name or
/// its parenthesized parameter list.
fn lambda_start(tokens: &[ParserToken], arrow: usize) -> usize {
    let Some(before) = arrow.checked_sub(1) else {
        return arrow;
    };
    if tokens[before].is_ident() {
        return before;
    }
    if !tokens[before].is_punct(Punct::RParen) {
        return arrow;
    }
    let mut depth = 0usize;
    for i in (0..=before).rev() {
        if tokens[i].is_punct(Punct::RParen) {
            depth += 1;
        } else if tokens[i].is_punct(Punct::LParen) {
            depth -= 1;
            if depth == 0 {
                return i;
            }
        }
    }
    arrow
}

/// The `:` of a `for (T x : items)` header opened at `open`.
fn enhanced_for_colon(tokens: &[ParserToken], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut conditionals = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token {
            ParserToken::Punct(Punct::LParen | Punct::LBracket | Punct::LBrace, _) => depth += 1,
            ParserToken::Punct(Punct::RParen | Punct::RBracket | Punct::RBrace, _) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return None;
                }
            }
            ParserToken::Punct(Punct::Semi, _) if depth == 1 => return None,
            ParserToken::Punct(Punct::Question, _) => conditionals += 1,
            ParserToken::Punct(Punct::Colon, _) if depth == 1 => {
                if conditionals == 0 {
                    return Some(i);
                }
                conditionals -= 1;
            }
            _ => {}
        }
    }
    None
}

/// The body of `new T(args) { ... }` when the creation at `new_at` has one.
fn anonymous_body(tokens: &[ParserToken], new_at: usize) -> Option<usize> {
    let mut i = new_at + 1;
    while is_ident(tokens, i) || is_punct(tokens, i, Punct::Dot) {
        i += 1;
    }
    if !is_punct(tokens, i, Punct::LParen) {
        return None;
    }
    let close = matching(tokens, i, Punct::LParen, Punct::RParen)?;
    match tokens.get(close + 1) {
        Some(ParserToken::SkippedBody(_)) => Some(close + 1),
        Some(token) if token.is_punct(Punct::LBrace) => Some(close + 1),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapeval_lexer::lex_str;

    fn adapt(input: &str, mode: Mode) -> (Vec<ParserToken>, Option<ParseError>) {
        let mut tokens = Vec::new();
        for item in LexerAdapter::new(lex_str(input).expect("lexing failed"), mode) {
            match item {
                Ok((_, token, _)) => tokens.push(token),
                Err(e) => return (tokens, Some(e)),
            }
        }
        (tokens, None)
    }

    fn idents(tokens: &[ParserToken]) -> Vec<&str> {
        tokens
            .iter()
            .filter_map(|t| match t {
                ParserToken::Ident(name) => Some(name.value.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_type_arguments_are_erased() {
        let (tokens, error) = adapt("java.util.Map<String, List<Integer>> m = new HashMap<>();", Mode::Full);
        assert!(error.is_none());
        assert_eq!(idents(&tokens), vec!["java", "util", "Map", "m", "HashMap"]);
        assert!(!tokens.iter().any(|t| t.is_punct(Punct::Lt) || t.is_punct(Punct::Shr)));
    }

    #[test]
    fn test_type_parameters_after_modifiers_are_erased() {
        let (tokens, _) = adapt("public static <T extends Comparable<T>> T max(T a) {}", Mode::Full);
        assert_eq!(idents(&tokens), vec!["T", "max", "T", "a"]);
    }

    #[test]
    fn test_comparisons_are_kept() {
        for input in ["a < b", "i < n >> 1", "a < b && c > d", "x < 10", "a < b > -c"] {
            let (tokens, _) = adapt(input, Mode::Full);
            assert!(tokens.iter().any(|t| t.is_punct(Punct::Lt)), "{}", input);
        }
    }

    #[test]
    fn test_annotations_are_dropped() {
        let (tokens, _) = adapt("@Override @SuppressWarnings({\"a\", \"b\"}) public void f() {}", Mode::Full);
        assert!(tokens[0].is_keyword(Keyword::Public));
        let (tokens, _) = adapt("@Retention(RUNTIME) @interface Marker {}", Mode::Full);
        assert!(tokens[0].is_punct(Punct::At));
        assert!(tokens[1].is_keyword(Keyword::Interface));
    }

    #[test]
    fn test_min_literals_are_folded() {
        let (tokens, _) = adapt("x = -2147483648 - 9223372036854775808L", Mode::Full);
        match &tokens[2] {
            ParserToken::IntLiteral(lit) => {
                assert_eq!(lit.value, "-2147483648");
                assert_eq!(lit.span, Span::new(4, 15));
            }
            other => panic!("Expected folded literal, got {:?}", other),
        }
        // the binary minus before the long literal folds too
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn test_outline_collapses_bodies() {
        let input = "class A { static { init(); } A() { super(); } void f() { g(); } int[] xs = {1}; enum E { X { } } }";
        let (tokens, error) = adapt(input, Mode::Outline);
        assert!(error.is_none(), "{:?}", error);
        let skipped = tokens.iter().filter(|t| matches!(t, ParserToken::SkippedBody(_))).count();
        assert_eq!(skipped, 4);
        assert_eq!(idents(&tokens), vec!["A", "A", "f", "xs", "E", "X"]);
    }

    #[test]
    fn test_outline_reports_unbalanced_body() {
        let (_, error) = adapt("class A { void f() { ", Mode::Outline);
        assert_eq!(error.map(|e| e.message).as_deref(), Some("unbalanced `{`"));
    }

    #[test]
    fn test_lambda_is_reported_at_its_start() {
        let (tokens, error) = adapt("f((a, b) -> a)", Mode::Full);
        let error = error.expect("lambda accepted");
        assert!(error.message.contains("not supported"));
        assert_eq!(error.span.start, 2);
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn test_unsupported_constructs() {
        let cases = [
            ("for (String s : items) {}", "enhanced for"),
            ("outer: while (true) {}", "labeled statements"),
            ("break outer;", "labeled break"),
            ("Object o = new Object() { };", "anonymous classes"),
            ("list.forEach(System.out::println);", "method references"),
            ("Outer.this.x = 1;", "qualified `this`"),
            ("this(1);", "constructor calls"),
            ("synchronized (lock) {}", "`synchronized` statements"),
        ];
        for (input, expected) in cases {
            let (_, error) = adapt(input, Mode::Full);
            let error = error.unwrap_or_else(|| panic!("{} accepted", input));
            assert!(error.message.contains(expected), "{}: {}", input, error.message);
        }
    }

    #[test]
    fn test_conditional_in_for_header_is_not_enhanced_for() {
        let (_, error) = adapt("for (int i = a ? 1 : 2; i < 3; i++) {}", Mode::Full);
        assert!(error.is_none());
    }
}
