//! Lexer for the Java-like snippet language.
//!
//! Produces a flat token stream with absolute byte spans. Spans are what the
//! resolver reports diagnostics against, and what the compiler later maps back
//! into coordinates relative to the user's snippet.

pub mod token;

pub use token::{Keyword, LexErrorKind, Punct, Span, Token, TokenKind};

use logos::Logos;
use thiserror::Error;

/// Errors raised while tokenizing.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

impl LexError {
    fn new(kind: LexErrorKind, slice: &str, span: Span) -> Self {
        let message = match kind {
            LexErrorKind::UnexpectedCharacter => {
                let c = slice.chars().next().unwrap_or('\0');
                format!("unexpected character `{}`", c)
            }
            LexErrorKind::UnterminatedString => "unterminated string literal".into(),
            LexErrorKind::UnterminatedComment => "unterminated comment".into(),
            LexErrorKind::MalformedCharacter => "malformed character literal".into(),
            LexErrorKind::CharacterOutOfRange => "character literal out of range".into(),
            LexErrorKind::InvalidEscape => "invalid escape sequence".into(),
        };
        Self { message, span }
    }
}

/// Tokenize an entire input. The returned vector always ends with `Eof`.
pub fn lex_str(input: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

/// A streaming lexer over a string slice.
pub struct Lexer<'input> {
    inner: logos::Lexer<'input, TokenKind>,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        Self {
            inner: TokenKind::lexer(input),
        }
    }

    /// The next token; `Eof` once the input is exhausted, and on every call
    /// after that.
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        match self.inner.next() {
            Some(Ok(kind)) => Ok(Token {
                kind,
                span: self.span(),
            }),
            Some(Err(kind)) => Err(LexError::new(kind, self.inner.slice(), self.span())),
            None => {
                let end = self.inner.source().len();
                Ok(Token {
                    kind: TokenKind::Eof,
                    span: Span::new(end, end),
                })
            }
        }
    }

    fn span(&self) -> Span {
        let range = self.inner.span();
        Span::new(range.start, range.end)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_token() {
            Ok(Token { kind: TokenKind::Eof, .. }) => None,
            other => Some(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        lex_str(input)
            .expect("lexing failed")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_lex_expression() {
        let tokens = kinds("x += 4");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Punct(Punct::PlusEq),
                TokenKind::IntLiteral("4".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lex_numbers() {
        assert_eq!(kinds("5.0")[0], TokenKind::DoubleLiteral("5.0".into()));
        assert_eq!(kinds("1e3")[0], TokenKind::DoubleLiteral("1e3".into()));
        assert_eq!(kinds("2.5f")[0], TokenKind::FloatLiteral("2.5".into()));
        assert_eq!(kinds("10L")[0], TokenKind::LongLiteral("10".into()));
        assert_eq!(kinds("0xFF")[0], TokenKind::IntLiteral("0xFF".into()));
        assert_eq!(kinds("1_000")[0], TokenKind::IntLiteral("1000".into()));
        assert_eq!(kinds(".5")[0], TokenKind::DoubleLiteral(".5".into()));
    }

    #[test]
    fn test_member_access_on_int_is_not_a_double() {
        // `a.length` style access must not swallow the dot
        let tokens = kinds("arr.length");
        assert_eq!(tokens[1], TokenKind::Punct(Punct::Dot));
    }

    #[test]
    fn test_lex_string_and_char_escapes() {
        assert_eq!(kinds(r#""a\n\"b""#)[0], TokenKind::StringLiteral("a\n\"b".into()));
        assert_eq!(kinds(r"'A'")[0], TokenKind::CharLiteral(0x41));
        assert_eq!(kinds(r"'\''")[0], TokenKind::CharLiteral('\'' as u16));
    }

    #[test]
    fn test_shift_operators_longest_match() {
        assert_eq!(kinds(">>>=")[0], TokenKind::Punct(Punct::UShrEq));
        assert_eq!(kinds(">>")[0], TokenKind::Punct(Punct::Shr));
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = kinds("a /* block */ + // line\n b");
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn test_spans_are_absolute() {
        let tokens = lex_str("  foo").unwrap();
        assert_eq!(tokens[0].span, Span::new(2, 5));
    }

    #[test]
    fn test_unterminated_string_reports_position() {
        let err = lex_str("x = \"abc").unwrap_err();
        assert_eq!(err.span.start, 4);
    }

    #[test]
    fn test_keywords() {
        assert_eq!(kinds("instanceof")[0], TokenKind::Keyword(Keyword::Instanceof));
        assert_eq!(Keyword::Int.as_str(), "int");
    }

    #[test]
    fn test_unterminated_comment_is_an_error() {
        let err = lex_str("a /* never closed").unwrap_err();
        assert_eq!(err.message, "unterminated comment");
        assert_eq!(err.span.start, 2);
    }

    #[test]
    fn test_octal_and_unicode_escapes() {
        assert_eq!(kinds(r"'\0'")[0], TokenKind::CharLiteral(0));
        assert_eq!(kinds(r"'\101'")[0], TokenKind::CharLiteral(0x41));
        assert_eq!(kinds(r"'\uu0042'")[0], TokenKind::CharLiteral(0x42));
        assert_eq!(kinds(r#""\1234""#)[0], TokenKind::StringLiteral("S4".into()));
    }

    #[test]
    fn test_malformed_character_literals() {
        assert_eq!(lex_str("'ab'").unwrap_err().message, "malformed character literal");
        assert_eq!(lex_str("'\u{1F600}'").unwrap_err().message, "character literal out of range");
    }

    #[test]
    fn test_unexpected_character() {
        let err = lex_str("a # b").unwrap_err();
        assert_eq!(err.message, "unexpected character `#`");
        assert_eq!(err.span, Span::new(2, 3));
    }
}
