//! Snippet evaluation against a paused target process.
//!
//! A compiled snippet runs on a stack machine ([`Interpreter`]) whose every
//! remote effect goes through the [`Target`] protocol seam. The [`Engine`]
//! runs each evaluation on its own worker thread, watched by a timeout
//! thread, and reports exactly once through an [`EvaluationListener`]
//! unless the listener asked to stop. Faults, including exceptions thrown
//! inside the target, are values carried by the result, never panics.

mod context;
mod engine;
mod error;
mod interpreter;
pub mod ops;
mod result;
pub mod sim;
pub mod target;
mod typeenv;
pub mod value;

pub use context::RuntimeContext;
pub use engine::{
    Engine, EngineOptions, EvaluationHandle, EvaluationListener, PendingEvaluation, SourceLocator, TimeoutDecision,
};
pub use error::{CapturedException, Fault, ProtocolError, ProtocolResult, Result};
pub use interpreter::{Entry, Interpreter};
pub use result::{EvaluationResult, Outcome};
pub use target::{InvokeOutcome, MethodId, ObjectId, Target, ThreadId, TypeCategory, TypeId};
pub use typeenv::{parse_method_descriptor, TargetEnvironment};
pub use value::{describe, LocalVariable, RemoteType, Value, Variable};
