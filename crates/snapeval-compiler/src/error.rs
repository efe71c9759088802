//! Error types for the snippet compiler.
//!
//! User mistakes in a snippet are not errors at this level: they become
//! `CompileMessage`s inside a `CompiledExpression`. `CompileError` covers
//! what the compiler itself cannot do.

use snapeval_lexer::Span;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    /// The typed tree contains a form the instruction set cannot express.
    #[error("cannot generate code for {what} at {}..{}", span.start, span.end)]
    Unsupported { what: String, span: Span },

    /// The synthesized unit did not contain the snippet method.
    #[error("snippet method `{method}` not found in `{owner}`")]
    MissingSnippetMethod { owner: String, method: String },

    /// Reading a source or description file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid description: {0}")]
    Json(#[from] serde_json::Error),
}

impl CompileError {
    pub fn unsupported(what: impl Into<String>, span: Span) -> Self {
        CompileError::Unsupported { what: what.into(), span }
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;
