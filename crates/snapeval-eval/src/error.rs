//! Error types for evaluation.

use thiserror::Error;

use crate::target::ObjectId;

/// A failure of the remote debugging protocol itself.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("target process disconnected")]
    Disconnected,

    #[error("invalid {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u64 },

    #[error("thread {0} is not suspended")]
    ThreadNotSuspended(u64),

    #[error("no frame at depth {depth} in thread {thread}")]
    NoSuchFrame { thread: u64, depth: usize },

    #[error("no field {name} in {owner}")]
    NoSuchField { owner: String, name: String },

    #[error("no local variable {0} in frame")]
    NoSuchLocal(String),

    #[error("array index {index} out of range for length {length}")]
    IndexOutOfRange { index: i32, length: i32 },

    #[error("{0}")]
    Remote(String),
}

/// A target-process exception captured during evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedException {
    pub object: ObjectId,
    pub type_name: String,
    pub message: Option<String>,
}

impl std::fmt::Display for CapturedException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.type_name, message),
            None => write!(f, "{}", self.type_name),
        }
    }
}

/// A fault that stops an evaluation at the failing instruction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Fault {
    /// The target threw, either from an invoked method or from a `throw`
    /// in the snippet.
    #[error("exception thrown: {0}")]
    Exception(CapturedException),

    #[error("/ by zero")]
    DivideByZero,

    #[error("null pointer: {0}")]
    NullPointer(String),

    #[error("{from} cannot be cast to {to}")]
    ClassCast { from: String, to: String },

    #[error("index {index} out of bounds for length {length}")]
    ArrayIndex { index: i32, length: i32 },

    #[error("negative array size: {0}")]
    NegativeArraySize(i32),

    #[error("type {0} is not loaded in the target")]
    UnknownType(String),

    #[error("type {0} is ambiguous: no candidate matches the loaded class")]
    AmbiguousType(String),

    #[error("no method {name}{signature} in {owner}")]
    NoSuchMethod { owner: String, name: String, signature: String },

    #[error("runtime context used after its thread resumed")]
    ContextInvalidated,

    #[error("evaluation cancelled")]
    Cancelled,

    #[error("instruction limit of {0} exceeded")]
    StepLimit(u64),

    #[error("protocol failure: {0}")]
    Protocol(#[from] ProtocolError),

    /// A malformed instruction sequence; never caused by user input that
    /// compiled cleanly.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Fault {
    pub fn internal(message: impl Into<String>) -> Self {
        Fault::Internal(message.into())
    }

    /// The captured target exception, if this fault is one.
    pub fn exception(&self) -> Option<&CapturedException> {
        match self {
            Fault::Exception(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for evaluation operations.
pub type Result<T> = std::result::Result<T, Fault>;

/// Result type for raw protocol calls.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
