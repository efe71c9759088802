//! Evaluation results.

use std::fmt;

use snapeval_compiler::CompileMessage;

use crate::error::Fault;
use crate::target::ThreadId;
use crate::value::Value;

/// How an evaluation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The snippet produced a value
    Value(Value),
    /// The snippet ran to completion without producing a value
    Void,
    /// The snippet did not compile; nothing ran
    CompileErrors(Vec<CompileMessage>),
    /// The run stopped at a faulting instruction
    Fault(Fault),
}

/// The terminal outcome of one evaluation, delivered at most once.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    snippet: String,
    thread: ThreadId,
    outcome: Outcome,
}

impl EvaluationResult {
    pub fn new(snippet: impl Into<String>, thread: ThreadId, outcome: Outcome) -> Self {
        Self {
            snippet: snippet.into(),
            thread,
            outcome,
        }
    }

    pub fn snippet(&self) -> &str {
        &self.snippet
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn into_outcome(self) -> Outcome {
        self.outcome
    }

    /// Whether the snippet failed to compile.
    pub fn has_errors(&self) -> bool {
        matches!(self.outcome, Outcome::CompileErrors(_))
    }

    pub fn errors(&self) -> &[CompileMessage] {
        match &self.outcome {
            Outcome::CompileErrors(errors) => errors,
            _ => &[],
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn exception(&self) -> Option<&Fault> {
        match &self.outcome {
            Outcome::Fault(f) => Some(f),
            _ => None,
        }
    }
}

impl fmt::Display for EvaluationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Outcome::Value(v) => write!(f, "{}", v),
            Outcome::Void => write!(f, "(void)"),
            Outcome::CompileErrors(errors) => {
                let lines: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                write!(f, "{}", lines.join("\n"))
            }
            Outcome::Fault(fault) => write!(f, "{}", fault),
        }
    }
}
