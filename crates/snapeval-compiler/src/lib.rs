/// Snippet compiler
///
/// Turns a source fragment typed at a breakpoint into an instruction
/// sequence for the evaluation interpreter: the fragment is wrapped in a
/// synthesized compilation unit, checked, and lowered to instructions.

pub mod codegen;
pub mod driver;
pub mod environment;
pub mod error;
pub mod instruction;
pub mod mapper;

pub use codegen::CodeGenerator;
pub use driver::{
    remap_diagnostic, CompileMessage, CompileOptions, CompiledExpression, Compiler, MessageOrigin, ResolvingChecker,
    SourceChecker, SNIPPET_METHOD,
};
pub use environment::{ClassDescription, MapEnvironment};
pub use error::{CompileError, Result};
pub use instruction::{listing, Instruction};
pub use mapper::{FrameDescription, LocalDescription, MappedUnit, SnippetMapper};
