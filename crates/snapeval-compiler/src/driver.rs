//! Compiler driver
//!
//! Ties the pipeline together: map the snippet into a synthesized unit,
//! hand the unit to a [`SourceChecker`], remap its diagnostics into snippet
//! coordinates and, when the snippet is clean, generate instructions.

use std::sync::Arc;

use snapeval_parser::{parse, resolve_unit, Diagnostic, ResolvedUnit, TypeEnvironment};

use crate::codegen::CodeGenerator;
use crate::error::CompileError;
use crate::instruction::Instruction;
use crate::mapper::{FrameDescription, MappedUnit, SnippetMapper};

/// Default name of the synthetic method holding the snippet.
pub const SNIPPET_METHOD: &str = "___run";

/// Parses and resolves a synthesized compilation unit.
///
/// Diagnostics must carry absolute byte offsets into `source`.
pub trait SourceChecker: Send + Sync {
    fn check(&self, source: &str, unit_name: &str) -> ResolvedUnit;
}

/// The built-in checker: the snippet parser plus the resolver, against a
/// type environment.
#[derive(Clone)]
pub struct ResolvingChecker {
    env: Arc<dyn TypeEnvironment>,
}

impl ResolvingChecker {
    pub fn new(env: Arc<dyn TypeEnvironment>) -> Self {
        Self { env }
    }
}

impl SourceChecker for ResolvingChecker {
    fn check(&self, source: &str, unit_name: &str) -> ResolvedUnit {
        match parse(source) {
            Ok(unit) => resolve_unit(&unit, self.env.as_ref()),
            Err(e) => {
                tracing::debug!(unit = unit_name, "synthesized unit does not parse: {}", e);
                ResolvedUnit {
                    methods: Vec::new(),
                    diagnostics: vec![Diagnostic::new(e.message, e.span)],
                }
            }
        }
    }
}

/// Where a compile message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrigin {
    /// Positioned inside the user's snippet
    Snippet,
    /// Raised by the synthesized wrapper around the snippet; an internal
    /// fault rather than a user error
    Synthetic,
}

/// A compile-time error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileMessage {
    pub text: String,
    /// Character offset into the snippet
    pub offset: Option<usize>,
    /// 1-based line within the snippet
    pub line: Option<usize>,
    pub origin: MessageOrigin,
}

impl CompileMessage {
    pub fn synthetic(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            offset: None,
            line: None,
            origin: MessageOrigin::Synthetic,
        }
    }
}

impl std::fmt::Display for CompileMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.line, self.offset) {
            (Some(line), Some(offset)) => write!(f, "{}:{}: {}", line, offset, self.text),
            _ => write!(f, "{}", self.text),
        }
    }
}

/// A snippet compiled against one context. Immutable; can be shared and
/// executed any number of times against compatible contexts.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    snippet: String,
    instructions: Vec<Instruction>,
    errors: Vec<CompileMessage>,
    snippet_start: usize,
    source: String,
}

impl CompiledExpression {
    /// A compiled expression that carries only errors.
    pub fn failed(snippet: impl Into<String>, errors: Vec<CompileMessage>) -> Self {
        Self {
            snippet: snippet.into(),
            instructions: Vec::new(),
            errors,
            snippet_start: 0,
            source: String::new(),
        }
    }

    /// Build from already-generated instructions, skipping compilation.
    pub fn from_instructions(snippet: impl Into<String>, instructions: Vec<Instruction>) -> Self {
        Self {
            snippet: snippet.into(),
            instructions,
            errors: Vec::new(),
            snippet_start: 0,
            source: String::new(),
        }
    }

    pub fn snippet(&self) -> &str {
        &self.snippet
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn errors(&self) -> &[CompileMessage] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Character offset of the snippet inside the synthesized unit.
    pub fn snippet_start(&self) -> usize {
        self.snippet_start
    }

    /// The synthesized unit the snippet was checked in.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Compiler configuration
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub method_name: String,
    /// Synthesize from the frame's source file when one is available
    pub prefer_source: bool,
    /// Imports added to every synthesized unit
    pub extra_imports: Vec<String>,
}

impl CompileOptions {
    pub fn new() -> Self {
        Self {
            method_name: SNIPPET_METHOD.to_string(),
            prefer_source: true,
            extra_imports: Vec::new(),
        }
    }

    pub fn method_name(mut self, name: impl Into<String>) -> Self {
        self.method_name = name.into();
        self
    }

    pub fn prefer_source(mut self, prefer: bool) -> Self {
        self.prefer_source = prefer;
        self
    }

    pub fn import(mut self, import: impl Into<String>) -> Self {
        self.extra_imports.push(import.into());
        self
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Compiles snippets against frames and objects
#[derive(Clone)]
pub struct Compiler {
    options: CompileOptions,
    checker: Arc<dyn SourceChecker>,
}

impl Compiler {
    pub fn new(options: CompileOptions, checker: Arc<dyn SourceChecker>) -> Self {
        Self { options, checker }
    }

    /// A compiler using the built-in resolver over `env`.
    pub fn with_environment(options: CompileOptions, env: Arc<dyn TypeEnvironment>) -> Self {
        Self::new(options, Arc::new(ResolvingChecker::new(env)))
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    fn mapper(&self) -> SnippetMapper {
        SnippetMapper::new(self.options.method_name.clone()).with_imports(self.options.extra_imports.clone())
    }

    /// Compile a snippet in the scope of a paused frame.
    pub fn compile_in_frame(&self, snippet: &str, frame: &FrameDescription) -> CompiledExpression {
        let mapper = self.mapper();
        let mapped = if self.options.prefer_source {
            mapper.map(snippet, frame)
        } else {
            mapper.map_from_metadata(snippet, frame)
        };
        let compiled = self.compile_mapped(snippet, &mapped);
        if mapped.from_source && compiled.errors.iter().all(|m| m.origin == MessageOrigin::Synthetic) && compiled.has_errors() {
            // the real source may mention types the target never loaded
            tracing::debug!("source-based unit failed outside the snippet, retrying from frame metadata");
            let mapped = mapper.map_from_metadata(snippet, frame);
            return self.compile_mapped(snippet, &mapped);
        }
        compiled
    }

    /// Compile a snippet against a receiver object of type `receiver_type`,
    /// with no frame available.
    pub fn compile_for_object(&self, snippet: &str, receiver_type: &str) -> CompiledExpression {
        let frame = FrameDescription::for_object(receiver_type);
        let mapped = self.mapper().map_from_metadata(snippet, &frame);
        self.compile_mapped(snippet, &mapped)
    }

    /// Check a mapped unit and generate instructions for its snippet method.
    pub fn compile_mapped(&self, snippet: &str, mapped: &MappedUnit) -> CompiledExpression {
        tracing::debug!(unit = %mapped.unit_name, auto_return = mapped.auto_return, "compiling snippet");
        let resolved = self.checker.check(&mapped.source, &mapped.unit_name);
        let snippet_start = mapped.source[..mapped.snippet_start].chars().count();

        let mut compiled = CompiledExpression {
            snippet: snippet.to_string(),
            instructions: Vec::new(),
            errors: Vec::new(),
            snippet_start,
            source: mapped.source.clone(),
        };

        if resolved.has_errors() {
            compiled.errors = resolved
                .diagnostics
                .iter()
                .map(|d| remap_diagnostic(d, mapped, snippet))
                .collect();
            return compiled;
        }

        let result = resolved
            .method(&mapped.declaring_type, &mapped.method_name)
            .ok_or_else(|| CompileError::MissingSnippetMethod {
                owner: mapped.declaring_type.clone(),
                method: mapped.method_name.clone(),
            })
            .and_then(|method| CodeGenerator::new().generate(method));
        match result {
            Ok(instructions) => {
                tracing::debug!(count = instructions.len(), "generated instructions");
                compiled.instructions = instructions;
            }
            Err(e) => {
                tracing::warn!("code generation failed: {}", e);
                compiled.errors.push(match &e {
                    CompileError::Unsupported { span, .. } => {
                        remap_diagnostic(&Diagnostic::new(e.to_string(), *span), mapped, snippet)
                    }
                    _ => CompileMessage::synthetic(e.to_string()),
                });
            }
        }
        compiled
    }
}

/// Translate a diagnostic positioned in the synthesized unit into snippet
/// coordinates. Positions outside the snippet window mark the message as
/// synthetic.
pub fn remap_diagnostic(diagnostic: &Diagnostic, mapped: &MappedUnit, snippet: &str) -> CompileMessage {
    let start = diagnostic.span.start;
    let window = mapped.snippet_range();
    // an error reported at the very end of the snippet still belongs to it
    if snippet.is_empty() || start < window.start || start > window.end {
        tracing::warn!(offset = start, "diagnostic outside the snippet: {}", diagnostic.message);
        return CompileMessage::synthetic(diagnostic.message.clone());
    }
    let relative = (start - window.start).min(snippet.len() - 1);
    let offset = snippet.char_indices().filter(|(i, _)| *i <= relative).count() - 1;
    let line = snippet
        .char_indices()
        .take_while(|(i, _)| *i < relative)
        .filter(|(_, c)| *c == '\n')
        .count()
        + 1;
    CompileMessage {
        text: diagnostic.message.clone(),
        offset: Some(offset),
        line: Some(line),
        origin: MessageOrigin::Snippet,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapeval_lexer::Span;

    fn mapped_for(snippet: &str) -> MappedUnit {
        SnippetMapper::new(SNIPPET_METHOD).map(snippet, &FrameDescription::new("T"))
    }

    #[test]
    fn test_remap_inside_window() {
        let snippet = "a +\nmissing";
        let mapped = mapped_for(snippet);
        let at = mapped.snippet_start + 4;
        let msg = remap_diagnostic(&Diagnostic::new("cannot find symbol", Span::new(at, at + 7)), &mapped, snippet);
        assert_eq!(msg.origin, MessageOrigin::Snippet);
        assert_eq!(msg.offset, Some(4));
        assert_eq!(msg.line, Some(2));
    }

    #[test]
    fn test_remap_end_of_snippet_is_clamped() {
        let snippet = "x +";
        let mapped = mapped_for(snippet);
        let end = mapped.snippet_range().end;
        let msg = remap_diagnostic(&Diagnostic::new("expected expression", Span::new(end, end)), &mapped, snippet);
        assert_eq!(msg.offset, Some(2));
    }

    #[test]
    fn test_remap_counts_characters() {
        let snippet = "\"é\" + y";
        let mapped = mapped_for(snippet);
        let at = mapped.snippet_start + snippet.find('y').unwrap_or(0);
        let msg = remap_diagnostic(&Diagnostic::new("bad", Span::new(at, at + 1)), &mapped, snippet);
        assert_eq!(msg.offset, Some(6));
    }

    #[test]
    fn test_remap_outside_window_is_synthetic() {
        let mapped = mapped_for("1");
        let msg = remap_diagnostic(&Diagnostic::new("wrapper problem", Span::new(0, 1)), &mapped, "1");
        assert_eq!(msg.origin, MessageOrigin::Synthetic);
        assert_eq!(msg.offset, None);
    }
}
