//! Tokens as the generated parser sees them.
//!
//! Every token carries its span, and grammar actions build node spans from
//! the tokens and subtrees they reduce.

use std::fmt;

use snapeval_lexer::{Keyword, Punct, Span, Token, TokenKind};

/// A token payload together with the span it was lexed from.
#[derive(Debug, Clone, PartialEq)]
pub struct Located<T> {
    pub value: T,
    pub span: Span,
}

/// A lexer token, plus the placeholder the outline pass leaves where it
/// dropped a body.
#[derive(Debug, Clone, PartialEq)]
pub enum ParserToken {
    Ident(Located<String>),
    Keyword(Keyword, Span),
    IntLiteral(Located<String>),
    LongLiteral(Located<String>),
    FloatLiteral(Located<String>),
    DoubleLiteral(Located<String>),
    CharLiteral(Located<u16>),
    StringLiteral(Located<String>),
    Punct(Punct, Span),
    /// A brace-delimited method or initializer body that was not parsed.
    SkippedBody(Span),
}

impl ParserToken {
    /// Convert a lexer token; `None` for the end-of-input marker.
    pub fn new(token: Token) -> Option<Self> {
        let span = token.span;
        let located = |value| Located { value, span };
        Some(match token.kind {
            TokenKind::Ident(name) => ParserToken::Ident(located(name)),
            TokenKind::Keyword(kw) => ParserToken::Keyword(kw, span),
            TokenKind::IntLiteral(text) => ParserToken::IntLiteral(located(text)),
            TokenKind::LongLiteral(text) => ParserToken::LongLiteral(located(text)),
            TokenKind::FloatLiteral(text) => ParserToken::FloatLiteral(located(text)),
            TokenKind::DoubleLiteral(text) => ParserToken::DoubleLiteral(located(text)),
            TokenKind::CharLiteral(c) => ParserToken::CharLiteral(Located { value: c, span }),
            TokenKind::StringLiteral(s) => ParserToken::StringLiteral(located(s)),
            TokenKind::Punct(p) => ParserToken::Punct(p, span),
            TokenKind::Eof => return None,
        })
    }

    pub fn span(&self) -> Span {
        match self {
            ParserToken::Ident(l)
            | ParserToken::IntLiteral(l)
            | ParserToken::LongLiteral(l)
            | ParserToken::FloatLiteral(l)
            | ParserToken::DoubleLiteral(l)
            | ParserToken::StringLiteral(l) => l.span,
            ParserToken::CharLiteral(l) => l.span,
            ParserToken::Keyword(_, span) | ParserToken::Punct(_, span) | ParserToken::SkippedBody(span) => *span,
        }
    }

    pub fn is_punct(&self, p: Punct) -> bool {
        matches!(self, ParserToken::Punct(q, _) if *q == p)
    }

    pub fn is_keyword(&self, kw: Keyword) -> bool {
        matches!(self, ParserToken::Keyword(k, _) if *k == kw)
    }

    pub fn is_ident(&self) -> bool {
        matches!(self, ParserToken::Ident(_))
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            ParserToken::IntLiteral(_)
                | ParserToken::LongLiteral(_)
                | ParserToken::FloatLiteral(_)
                | ParserToken::DoubleLiteral(_)
                | ParserToken::CharLiteral(_)
                | ParserToken::StringLiteral(_)
                | ParserToken::Keyword(Keyword::True | Keyword::False | Keyword::Null, _)
        )
    }
}

impl fmt::Display for ParserToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParserToken::Ident(name) => write!(f, "identifier `{}`", name.value),
            ParserToken::Keyword(kw, _) => write!(f, "`{}`", kw.as_str()),
            ParserToken::IntLiteral(text) => write!(f, "integer literal `{}`", text.value),
            ParserToken::LongLiteral(text) => write!(f, "long literal `{}L`", text.value),
            ParserToken::FloatLiteral(text) => write!(f, "float literal `{}`", text.value),
            ParserToken::DoubleLiteral(text) => write!(f, "double literal `{}`", text.value),
            ParserToken::CharLiteral(_) => write!(f, "character literal"),
            ParserToken::StringLiteral(_) => write!(f, "string literal"),
            ParserToken::Punct(p, _) => write!(f, "`{}`", p.as_str()),
            ParserToken::SkippedBody(_) => write!(f, "`{{`"),
        }
    }
}
