//! Token definitions.

use std::fmt;

use logos::{Lexer, Logos};

/// A half-open byte range into the lexed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Reserved words of the snippet language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Abstract,
    Boolean,
    Break,
    Byte,
    Case,
    Catch,
    Char,
    Class,
    Continue,
    Default,
    Do,
    Double,
    Else,
    Enum,
    Extends,
    False,
    Final,
    Finally,
    Float,
    For,
    If,
    Implements,
    Import,
    Instanceof,
    Int,
    Interface,
    Long,
    Native,
    New,
    Null,
    Package,
    Private,
    Protected,
    Public,
    Return,
    Short,
    Static,
    Strictfp,
    Super,
    Switch,
    Synchronized,
    This,
    Throw,
    Throws,
    Transient,
    True,
    Try,
    Void,
    Volatile,
    While,
}

/// Source spellings of every keyword.
const KEYWORDS: [(&str, Keyword); 50] = [
    ("abstract", Keyword::Abstract),
    ("boolean", Keyword::Boolean),
    ("break", Keyword::Break),
    ("byte", Keyword::Byte),
    ("case", Keyword::Case),
    ("catch", Keyword::Catch),
    ("char", Keyword::Char),
    ("class", Keyword::Class),
    ("continue", Keyword::Continue),
    ("default", Keyword::Default),
    ("do", Keyword::Do),
    ("double", Keyword::Double),
    ("else", Keyword::Else),
    ("enum", Keyword::Enum),
    ("extends", Keyword::Extends),
    ("false", Keyword::False),
    ("final", Keyword::Final),
    ("finally", Keyword::Finally),
    ("float", Keyword::Float),
    ("for", Keyword::For),
    ("if", Keyword::If),
    ("implements", Keyword::Implements),
    ("import", Keyword::Import),
    ("instanceof", Keyword::Instanceof),
    ("int", Keyword::Int),
    ("interface", Keyword::Interface),
    ("long", Keyword::Long),
    ("native", Keyword::Native),
    ("new", Keyword::New),
    ("null", Keyword::Null),
    ("package", Keyword::Package),
    ("private", Keyword::Private),
    ("protected", Keyword::Protected),
    ("public", Keyword::Public),
    ("return", Keyword::Return),
    ("short", Keyword::Short),
    ("static", Keyword::Static),
    ("strictfp", Keyword::Strictfp),
    ("super", Keyword::Super),
    ("switch", Keyword::Switch),
    ("synchronized", Keyword::Synchronized),
    ("this", Keyword::This),
    ("throw", Keyword::Throw),
    ("throws", Keyword::Throws),
    ("transient", Keyword::Transient),
    ("true", Keyword::True),
    ("try", Keyword::Try),
    ("void", Keyword::Void),
    ("volatile", Keyword::Volatile),
    ("while", Keyword::While),
];

impl Keyword {
    /// Look up a keyword by its source spelling.
    pub fn from_word(word: &str) -> Option<Keyword> {
        KEYWORDS.iter().find(|(s, _)| *s == word).map(|(_, kw)| *kw)
    }

    pub fn as_str(&self) -> &'static str {
        KEYWORDS
            .iter()
            .find(|(_, kw)| kw == self)
            .map(|(s, _)| *s)
            .unwrap_or("<keyword>")
    }

    /// Primitive type keywords (`int`, `boolean`, ...), excluding `void`.
    pub fn is_primitive_type(&self) -> bool {
        matches!(
            self,
            Keyword::Boolean
                | Keyword::Byte
                | Keyword::Char
                | Keyword::Short
                | Keyword::Int
                | Keyword::Long
                | Keyword::Float
                | Keyword::Double
        )
    }

    /// Declaration modifiers.
    pub fn is_modifier(&self) -> bool {
        matches!(
            self,
            Keyword::Abstract
                | Keyword::Final
                | Keyword::Native
                | Keyword::Private
                | Keyword::Protected
                | Keyword::Public
                | Keyword::Static
                | Keyword::Strictfp
                | Keyword::Synchronized
                | Keyword::Transient
                | Keyword::Volatile
                | Keyword::Default
        )
    }
}

/// Operators and separators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Punct {
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Dot,
    Ellipsis,
    At,
    ColonColon,
    Question,
    Colon,
    Arrow,
    Assign,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Shl,
    Shr,
    UShr,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    AmpAmp,
    PipePipe,
    PlusPlus,
    MinusMinus,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    AmpEq,
    PipeEq,
    CaretEq,
    ShlEq,
    ShrEq,
    UShrEq,
}

impl Punct {
    pub fn as_str(&self) -> &'static str {
        use Punct::*;
        match self {
            LParen => "(",
            RParen => ")",
            LBrace => "{",
            RBrace => "}",
            LBracket => "[",
            RBracket => "]",
            Semi => ";",
            Comma => ",",
            Dot => ".",
            Ellipsis => "...",
            At => "@",
            ColonColon => "::",
            Question => "?",
            Colon => ":",
            Arrow => "->",
            Assign => "=",
            EqEq => "==",
            NotEq => "!=",
            Lt => "<",
            LtEq => "<=",
            Gt => ">",
            GtEq => ">=",
            Shl => "<<",
            Shr => ">>",
            UShr => ">>>",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Slash => "/",
            Percent => "%",
            Amp => "&",
            Pipe => "|",
            Caret => "^",
            Tilde => "~",
            Bang => "!",
            AmpAmp => "&&",
            PipePipe => "||",
            PlusPlus => "++",
            MinusMinus => "--",
            PlusEq => "+=",
            MinusEq => "-=",
            StarEq => "*=",
            SlashEq => "/=",
            PercentEq => "%=",
            AmpEq => "&=",
            PipeEq => "|=",
            CaretEq => "^=",
            ShlEq => "<<=",
            ShrEq => ">>=",
            UShrEq => ">>>=",
        }
    }
}

/// Why a stretch of input could not be tokenized.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LexErrorKind {
    #[default]
    UnexpectedCharacter,
    UnterminatedString,
    UnterminatedComment,
    MalformedCharacter,
    CharacterOutOfRange,
    InvalidEscape,
}

/// The kind of a lexed token, with literal payloads already decoded.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexErrorKind)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub enum TokenKind {
    #[regex(r"[_$\p{L}][_$\p{L}\p{Nd}]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[token("abstract", |_| Keyword::Abstract)]
    #[token("boolean", |_| Keyword::Boolean)]
    #[token("break", |_| Keyword::Break)]
    #[token("byte", |_| Keyword::Byte)]
    #[token("case", |_| Keyword::Case)]
    #[token("catch", |_| Keyword::Catch)]
    #[token("char", |_| Keyword::Char)]
    #[token("class", |_| Keyword::Class)]
    #[token("continue", |_| Keyword::Continue)]
    #[token("default", |_| Keyword::Default)]
    #[token("do", |_| Keyword::Do)]
    #[token("double", |_| Keyword::Double)]
    #[token("else", |_| Keyword::Else)]
    #[token("enum", |_| Keyword::Enum)]
    #[token("extends", |_| Keyword::Extends)]
    #[token("false", |_| Keyword::False)]
    #[token("final", |_| Keyword::Final)]
    #[token("finally", |_| Keyword::Finally)]
    #[token("float", |_| Keyword::Float)]
    #[token("for", |_| Keyword::For)]
    #[token("if", |_| Keyword::If)]
    #[token("implements", |_| Keyword::Implements)]
    #[token("import", |_| Keyword::Import)]
    #[token("instanceof", |_| Keyword::Instanceof)]
    #[token("int", |_| Keyword::Int)]
    #[token("interface", |_| Keyword::Interface)]
    #[token("long", |_| Keyword::Long)]
    #[token("native", |_| Keyword::Native)]
    #[token("new", |_| Keyword::New)]
    #[token("null", |_| Keyword::Null)]
    #[token("package", |_| Keyword::Package)]
    #[token("private", |_| Keyword::Private)]
    #[token("protected", |_| Keyword::Protected)]
    #[token("public", |_| Keyword::Public)]
    #[token("return", |_| Keyword::Return)]
    #[token("short", |_| Keyword::Short)]
    #[token("static", |_| Keyword::Static)]
    #[token("strictfp", |_| Keyword::Strictfp)]
    #[token("super", |_| Keyword::Super)]
    #[token("switch", |_| Keyword::Switch)]
    #[token("synchronized", |_| Keyword::Synchronized)]
    #[token("this", |_| Keyword::This)]
    #[token("throw", |_| Keyword::Throw)]
    #[token("throws", |_| Keyword::Throws)]
    #[token("transient", |_| Keyword::Transient)]
    #[token("true", |_| Keyword::True)]
    #[token("try", |_| Keyword::Try)]
    #[token("void", |_| Keyword::Void)]
    #[token("volatile", |_| Keyword::Volatile)]
    #[token("while", |_| Keyword::While)]
    Keyword(Keyword),

    /// Integer literal without suffix; the text is kept so the parser can
    /// report range errors (`2147483648` is only legal after unary minus).
    #[regex(r"[0-9][0-9_]*", integer)]
    #[regex(r"0[xX][0-9a-fA-F_]+", integer)]
    #[regex(r"0[bB][01_]+", integer)]
    IntLiteral(String),
    /// Integer literal with an `L` suffix (suffix stripped).
    #[regex(r"[0-9][0-9_]*[lL]", long)]
    #[regex(r"0[xX][0-9a-fA-F_]+[lL]", long)]
    #[regex(r"0[bB][01_]+[lL]", long)]
    LongLiteral(String),
    #[regex(r"[0-9][0-9_]*\.([0-9][0-9_]*)?([eE][+-]?[0-9][0-9_]*)?[fF]", floating)]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9][0-9_]*)?[fF]", floating)]
    #[regex(r"[0-9][0-9_]*([eE][+-]?[0-9][0-9_]*)?[fF]", floating)]
    FloatLiteral(String),
    #[regex(r"[0-9][0-9_]*\.([0-9][0-9_]*)?([eE][+-]?[0-9][0-9_]*)?[dD]?", floating)]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9][0-9_]*)?[dD]?", floating)]
    #[regex(r"[0-9][0-9_]*[eE][+-]?[0-9][0-9_]*[dD]?", floating)]
    #[regex(r"[0-9][0-9_]*[dD]", floating)]
    DoubleLiteral(String),
    /// A single UTF-16 code unit.
    #[regex(r"'([^'\\\n\r]|\\u+[0-9a-fA-F][0-9a-fA-F][0-9a-fA-F][0-9a-fA-F]|\\[0-7]([0-7][0-7]?)?|\\[^u0-7\n\r])'", character)]
    #[token("'", |_| { Err::<u16, _>(LexErrorKind::MalformedCharacter) })]
    CharLiteral(u16),
    #[regex(r#""([^"\\\n\r]|\\[^\n\r])*""#, string)]
    #[regex(r#""([^"\\\n\r]|\\[^\n\r])*"#, |_| { Err::<String, _>(LexErrorKind::UnterminatedString) })]
    StringLiteral(String),

    #[token("(", |_| Punct::LParen)]
    #[token(")", |_| Punct::RParen)]
    #[token("{", |_| Punct::LBrace)]
    #[token("}", |_| Punct::RBrace)]
    #[token("[", |_| Punct::LBracket)]
    #[token("]", |_| Punct::RBracket)]
    #[token(";", |_| Punct::Semi)]
    #[token(",", |_| Punct::Comma)]
    #[token(".", |_| Punct::Dot)]
    #[token("...", |_| Punct::Ellipsis)]
    #[token("@", |_| Punct::At)]
    #[token("::", |_| Punct::ColonColon)]
    #[token("?", |_| Punct::Question)]
    #[token(":", |_| Punct::Colon)]
    #[token("->", |_| Punct::Arrow)]
    #[token("=", |_| Punct::Assign)]
    #[token("==", |_| Punct::EqEq)]
    #[token("!=", |_| Punct::NotEq)]
    #[token("<", |_| Punct::Lt)]
    #[token("<=", |_| Punct::LtEq)]
    #[token(">", |_| Punct::Gt)]
    #[token(">=", |_| Punct::GtEq)]
    #[token("<<", |_| Punct::Shl)]
    #[token(">>", |_| Punct::Shr)]
    #[token(">>>", |_| Punct::UShr)]
    #[token("+", |_| Punct::Plus)]
    #[token("-", |_| Punct::Minus)]
    #[token("*", |_| Punct::Star)]
    #[token("/", |_| Punct::Slash)]
    #[token("%", |_| Punct::Percent)]
    #[token("&", |_| Punct::Amp)]
    #[token("|", |_| Punct::Pipe)]
    #[token("^", |_| Punct::Caret)]
    #[token("~", |_| Punct::Tilde)]
    #[token("!", |_| Punct::Bang)]
    #[token("&&", |_| Punct::AmpAmp)]
    #[token("||", |_| Punct::PipePipe)]
    #[token("++", |_| Punct::PlusPlus)]
    #[token("--", |_| Punct::MinusMinus)]
    #[token("+=", |_| Punct::PlusEq)]
    #[token("-=", |_| Punct::MinusEq)]
    #[token("*=", |_| Punct::StarEq)]
    #[token("/=", |_| Punct::SlashEq)]
    #[token("%=", |_| Punct::PercentEq)]
    #[token("&=", |_| Punct::AmpEq)]
    #[token("|=", |_| Punct::PipeEq)]
    #[token("^=", |_| Punct::CaretEq)]
    #[token("<<=", |_| Punct::ShlEq)]
    #[token(">>=", |_| Punct::ShrEq)]
    #[token(">>>=", |_| Punct::UShrEq)]
    /// A block comment left open until the end of input surfaces as an
    /// error here.
    #[regex(r"/\*([^*]|\*+[^*/])*\**", |_| { Err::<Punct, _>(LexErrorKind::UnterminatedComment) })]
    Punct(Punct),
    Eof,
}

fn integer(lex: &mut Lexer<TokenKind>) -> String {
    lex.slice().replace('_', "")
}

fn long(lex: &mut Lexer<TokenKind>) -> String {
    lex.slice().trim_end_matches(|c: char| matches!(c, 'l' | 'L')).replace('_', "")
}

fn floating(lex: &mut Lexer<TokenKind>) -> String {
    lex.slice()
        .trim_end_matches(|c: char| matches!(c, 'd' | 'D' | 'f' | 'F'))
        .replace('_', "")
}

fn string(lex: &mut Lexer<TokenKind>) -> Result<String, LexErrorKind> {
    let slice = lex.slice();
    let units = unescape(&slice[1..slice.len() - 1])?;
    Ok(String::from_utf16_lossy(&units))
}

fn character(lex: &mut Lexer<TokenKind>) -> Result<u16, LexErrorKind> {
    let slice = lex.slice();
    match unescape(&slice[1..slice.len() - 1])?.as_slice() {
        [unit] => Ok(*unit),
        _ => Err(LexErrorKind::CharacterOutOfRange),
    }
}

/// Decode the body of a string or character literal into UTF-16 code units.
fn unescape(body: &str) -> Result<Vec<u16>, LexErrorKind> {
    let mut units = Vec::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u16; 2];
            units.extend_from_slice(c.encode_utf16(&mut buf));
            continue;
        }
        let unit = match chars.next().ok_or(LexErrorKind::InvalidEscape)? {
            'n' => 0x0a,
            't' => 0x09,
            'r' => 0x0d,
            'b' => 0x08,
            'f' => 0x0c,
            's' => 0x20,
            '\\' => 0x5c,
            '\'' => 0x27,
            '"' => 0x22,
            first @ '0'..='7' => {
                // at most three digits, and no more than \377
                let limit = if first <= '3' { 2 } else { 1 };
                let mut value = first as u16 - '0' as u16;
                for _ in 0..limit {
                    match chars.peek() {
                        Some(&d @ '0'..='7') => {
                            value = value * 8 + (d as u16 - '0' as u16);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                value
            }
            'u' => {
                while chars.peek() == Some(&'u') {
                    chars.next();
                }
                let mut value = 0u16;
                for _ in 0..4 {
                    let digit = chars
                        .next()
                        .and_then(|d| d.to_digit(16))
                        .ok_or(LexErrorKind::InvalidEscape)?;
                    value = value * 16 + digit as u16;
                }
                value
            }
            _ => return Err(LexErrorKind::InvalidEscape),
        };
        units.push(unit);
    }
    Ok(units)
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(name) => write!(f, "identifier `{}`", name),
            TokenKind::Keyword(kw) => write!(f, "`{}`", kw.as_str()),
            TokenKind::IntLiteral(text) => write!(f, "integer literal `{}`", text),
            TokenKind::LongLiteral(text) => write!(f, "long literal `{}L`", text),
            TokenKind::FloatLiteral(text) => write!(f, "float literal `{}`", text),
            TokenKind::DoubleLiteral(text) => write!(f, "double literal `{}`", text),
            TokenKind::CharLiteral(_) => write!(f, "character literal"),
            TokenKind::StringLiteral(_) => write!(f, "string literal"),
            TokenKind::Punct(p) => write!(f, "`{}`", p.as_str()),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

/// A token together with its location in the input.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn is_punct(&self, p: Punct) -> bool {
        matches!(&self.kind, TokenKind::Punct(q) if *q == p)
    }

    pub fn is_keyword(&self, kw: Keyword) -> bool {
        matches!(&self.kind, TokenKind::Keyword(k) if *k == kw)
    }
}
