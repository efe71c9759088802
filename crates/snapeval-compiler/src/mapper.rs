//! Snippet-to-source mapping.
//!
//! A snippet is not a compilation unit, so before it can be checked it is
//! wrapped in the body of a synthetic method placed inside a stand-in for
//! the paused frame's declaring type. The frame's locals become the
//! method's parameters, so unqualified names resolve exactly as they would
//! at the breakpoint. The mapper records where the snippet landed in the
//! synthesized text so diagnostics can be mapped back.

use serde::{Deserialize, Serialize};
use snapeval_parser::{parse_expression, parse_outline, CompilationUnit, Member, MethodDecl, TypeDecl, TypeDeclKind};

/// A local variable visible in the paused frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalDescription {
    pub name: String,
    /// Type name as the remote reports it: `int`, `java.lang.String`, `a.B$C[]`
    pub type_name: String,
    #[serde(default)]
    pub is_final: bool,
}

/// What the mapper needs to know about a paused frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameDescription {
    /// Binary name of the type declaring the frame's method
    pub declaring_type: String,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub locals: Vec<LocalDescription>,
    /// Text of the source file backing the declaring type, when available
    #[serde(default)]
    pub source: Option<String>,
}

impl FrameDescription {
    pub fn new(declaring_type: impl Into<String>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            is_static: false,
            locals: Vec::new(),
            source: None,
        }
    }

    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }

    pub fn with_local(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.locals.push(LocalDescription {
            name: name.into(),
            type_name: type_name.into(),
            is_final: false,
        });
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// The object-relative variant: the receiver's type stands in for the
    /// declaring type and no locals are visible.
    pub fn for_object(receiver_type: &str) -> Self {
        // an array receiver has no declaring type of its own
        let declaring_type = if receiver_type.ends_with("[]") {
            snapeval_parser::types::OBJECT
        } else {
            receiver_type
        };
        Self::new(declaring_type)
    }
}

/// The synthesized compilation unit and where the snippet sits in it.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedUnit {
    pub source: String,
    /// Logical file name, `Outermost.java`
    pub unit_name: String,
    /// Byte offset of the first snippet character in `source`
    pub snippet_start: usize,
    /// Byte length of the snippet as embedded
    pub snippet_len: usize,
    /// 1-based line of `source` on which the snippet starts
    pub start_line: usize,
    /// Binary name of the type holding the snippet method
    pub declaring_type: String,
    pub method_name: String,
    /// Whether the snippet was wrapped in `return ...;`
    pub auto_return: bool,
    /// Whether the unit was synthesized from the frame's source file
    pub from_source: bool,
}

impl MappedUnit {
    /// Byte range of the snippet within `source`.
    pub fn snippet_range(&self) -> std::ops::Range<usize> {
        self.snippet_start..self.snippet_start + self.snippet_len
    }
}

/// Appends text while tracking the byte offset and line of the output.
struct Emitter {
    out: String,
    line: usize,
}

impl Emitter {
    fn new() -> Self {
        Self {
            out: String::new(),
            line: 1,
        }
    }

    fn push(&mut self, text: &str) {
        self.line += text.matches('\n').count();
        self.out.push_str(text);
    }

    fn line(&mut self, text: &str) {
        self.push(text);
        self.push("\n");
    }

    fn offset(&self) -> usize {
        self.out.len()
    }
}

/// Builds synthesized compilation units for snippets.
#[derive(Debug, Clone)]
pub struct SnippetMapper {
    method_name: String,
    extra_imports: Vec<String>,
}

impl SnippetMapper {
    pub fn new(method_name: impl Into<String>) -> Self {
        Self {
            method_name: method_name.into(),
            extra_imports: Vec::new(),
        }
    }

    pub fn with_imports(mut self, imports: Vec<String>) -> Self {
        self.extra_imports = imports;
        self
    }

    /// Map a snippet, re-synthesizing from the frame's source when it is
    /// present and parses, and from the frame metadata otherwise.
    pub fn map(&self, snippet: &str, frame: &FrameDescription) -> MappedUnit {
        if let Some(source) = &frame.source {
            match parse_outline(source) {
                Ok(unit) => return self.map_from_source(snippet, frame, &unit),
                Err(e) => tracing::debug!("frame source does not parse ({}), using frame metadata", e),
            }
        }
        self.map_from_metadata(snippet, frame)
    }

    /// Map a snippet using only the frame's reflective metadata.
    pub fn map_from_metadata(&self, snippet: &str, frame: &FrameDescription) -> MappedUnit {
        let (package, simple) = split_binary_name(&frame.declaring_type);
        let mut em = Emitter::new();
        if let Some(package) = package {
            em.line(&format!("package {};", package));
        }
        self.emit_extra_imports(&mut em, &[]);
        em.line(&format!("class {} {{", simple));
        let placement = self.emit_snippet_method(&mut em, snippet, frame);
        em.line("}");
        self.finish(em, placement, frame, false)
    }

    /// Map a snippet into a unit built from the frame's parsed source file.
    ///
    /// Every type of the file, nested ones included, is emitted as a
    /// top-level stub named by its binary simple name (`Outer$Inner`) with
    /// its supertypes, fields and method signatures. The stub of the
    /// declaring type receives the snippet method.
    pub fn map_from_source(&self, snippet: &str, frame: &FrameDescription, unit: &CompilationUnit) -> MappedUnit {
        let (_, declaring_simple) = split_binary_name(&frame.declaring_type);
        let mut em = Emitter::new();
        if let Some(package) = &unit.package {
            em.line(&format!("package {};", package));
        }
        let mut written = Vec::new();
        for import in &unit.imports {
            let mut text = String::from("import ");
            if import.is_static {
                text.push_str("static ");
            }
            text.push_str(&import.name);
            if import.on_demand {
                text.push_str(".*");
            }
            text.push(';');
            em.line(&text);
            written.push(import.name.clone());
        }
        self.emit_extra_imports(&mut em, &written);

        let mut stubs = Vec::new();
        for decl in &unit.types {
            flatten(decl, decl.name.clone(), &mut stubs);
        }

        let mut placement = None;
        for (name, decl) in &stubs {
            let holds_snippet = *name == declaring_simple;
            emit_stub_header(&mut em, name, decl);
            emit_stub_members(&mut em, name, decl);
            if holds_snippet {
                placement = Some(self.emit_snippet_method(&mut em, snippet, frame));
            }
            em.line("}");
        }

        let placement = match placement {
            Some(p) => p,
            None => {
                // anonymous or local classes have no declaration of their own
                em.line(&format!("class {} {{", declaring_simple));
                let p = self.emit_snippet_method(&mut em, snippet, frame);
                em.line("}");
                p
            }
        };
        self.finish(em, placement, frame, true)
    }

    fn emit_extra_imports(&self, em: &mut Emitter, already: &[String]) {
        for import in &self.extra_imports {
            let name = import.trim_end_matches(".*");
            if already.iter().any(|w| w == name) {
                continue;
            }
            em.line(&format!("import {};", import));
        }
    }

    fn emit_snippet_method(&self, em: &mut Emitter, snippet: &str, frame: &FrameDescription) -> Placement {
        let mut header = String::from("  ");
        if frame.is_static {
            header.push_str("static ");
        }
        header.push_str("void ");
        header.push_str(&self.method_name);
        header.push('(');
        for (i, local) in frame.locals.iter().enumerate() {
            if i > 0 {
                header.push_str(", ");
            }
            if local.is_final {
                header.push_str("final ");
            }
            header.push_str(&local.type_name);
            header.push(' ');
            header.push_str(&local.name);
        }
        header.push_str(") throws java.lang.Throwable {");
        em.line(&header);

        let auto_return = needs_auto_return(snippet);
        if auto_return {
            em.push("return ");
        }
        let start = em.offset();
        let line = em.line;
        em.push(snippet);
        if auto_return {
            // own line, so a trailing line comment cannot swallow it
            em.push("\n;");
        }
        em.push("\n");
        em.line("  }");
        Placement {
            start,
            line,
            len: snippet.len(),
            auto_return,
        }
    }

    fn finish(&self, em: Emitter, placement: Placement, frame: &FrameDescription, from_source: bool) -> MappedUnit {
        let (_, simple) = split_binary_name(&frame.declaring_type);
        let outermost = simple.split('$').next().unwrap_or(simple);
        MappedUnit {
            source: em.out,
            unit_name: format!("{}.java", outermost),
            snippet_start: placement.start,
            snippet_len: placement.len,
            start_line: placement.line,
            declaring_type: frame.declaring_type.clone(),
            method_name: self.method_name.clone(),
            auto_return: placement.auto_return,
            from_source,
        }
    }
}

struct Placement {
    start: usize,
    line: usize,
    len: usize,
    auto_return: bool,
}

/// Whether a snippet is a lone expression that should produce a value.
pub fn needs_auto_return(snippet: &str) -> bool {
    !snippet.trim().is_empty() && parse_expression(snippet).is_ok()
}

/// Split `a.b.C$D` into (`Some("a.b")`, `"C$D"`).
pub fn split_binary_name(binary: &str) -> (Option<&str>, &str) {
    match binary.rfind('.') {
        Some(i) => (Some(&binary[..i]), &binary[i + 1..]),
        None => (None, binary),
    }
}

fn flatten<'a>(decl: &'a TypeDecl, name: String, out: &mut Vec<(String, &'a TypeDecl)>) {
    for nested in decl.nested_types() {
        flatten(nested, format!("{}${}", name, nested.name), out);
    }
    out.push((name, decl));
}

fn emit_stub_header(em: &mut Emitter, name: &str, decl: &TypeDecl) {
    let mut header = String::new();
    if decl.modifiers.is_abstract && decl.kind == TypeDeclKind::Class {
        header.push_str("abstract ");
    }
    header.push_str(match decl.kind {
        TypeDeclKind::Class => "class ",
        TypeDeclKind::Interface => "interface ",
        TypeDeclKind::Enum => "enum ",
    });
    header.push_str(name);
    if !decl.extends.is_empty() {
        header.push_str(" extends ");
        header.push_str(&join(decl.extends.iter().map(|t| t.to_string())));
    }
    if !decl.implements.is_empty() {
        header.push_str(" implements ");
        header.push_str(&join(decl.implements.iter().map(|t| t.to_string())));
    }
    header.push_str(" {");
    em.line(&header);
    if decl.kind == TypeDeclKind::Enum {
        em.line(&format!("  {};", decl.enum_constants.join(", ")));
    }
}

fn emit_stub_members(em: &mut Emitter, name: &str, decl: &TypeDecl) {
    for member in &decl.members {
        match member {
            Member::Field(field) => {
                for d in &field.declarators {
                    let mut line = String::from("  ");
                    if field.modifiers.is_static {
                        line.push_str("static ");
                    }
                    line.push_str(&field.ty.to_string());
                    for _ in 0..d.extra_dims {
                        line.push_str("[]");
                    }
                    line.push(' ');
                    line.push_str(&d.name);
                    line.push(';');
                    em.line(&line);
                }
            }
            Member::Method(method) => em.line(&method_stub(name, decl.kind, method)),
            // nested types are emitted as stubs of their own
            Member::Type(_) | Member::Initializer { .. } => {}
        }
    }
}

/// A signature-only rendition of a method. Methods become `native` so the
/// checker never looks into a body; constructors keep an empty one.
fn method_stub(type_name: &str, kind: TypeDeclKind, method: &MethodDecl) -> String {
    let mut line = String::from("  ");
    if method.modifiers.is_static {
        line.push_str("static ");
    }
    let params = join(method.params.iter().map(|p| {
        if p.varargs {
            let mut element = p.ty.clone();
            element.dims = element.dims.saturating_sub(1);
            format!("{}... {}", element, p.name)
        } else {
            format!("{} {}", p.ty, p.name)
        }
    }));
    match &method.return_type {
        None => {
            line.push_str(&format!("{}({}) {{}}", type_name, params));
        }
        Some(ret) => {
            if kind == TypeDeclKind::Interface && !method.modifiers.is_static {
                line.push_str(&format!("{} {}({});", ret, method.name, params));
            } else {
                line.push_str(&format!("native {} {}({});", ret, method.name, params));
            }
        }
    }
    line
}

fn join(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> FrameDescription {
        FrameDescription::new("geo.Outer$Inner")
            .with_local("x", "int")
            .with_local("name", "java.lang.String")
    }

    #[test]
    fn test_auto_return_detection() {
        assert!(needs_auto_return("x + 1"));
        assert!(needs_auto_return("  name.length()  "));
        assert!(!needs_auto_return("x += 1;"));
        assert!(!needs_auto_return("if (x > 0) { x--; }"));
        assert!(!needs_auto_return(""));
        assert!(!needs_auto_return("int y = 2"));
        assert!(needs_auto_return("x + 1 // trailing"));
        assert!(needs_auto_return("new int[] {1, 2}"));
    }

    #[test]
    fn test_metadata_unit_records_snippet_position() {
        let mapper = SnippetMapper::new("___run");
        let mapped = mapper.map("x + 1", &frame());
        assert!(mapped.auto_return);
        assert_eq!(&mapped.source[mapped.snippet_range()], "x + 1");
        assert!(mapped.source.starts_with("package geo;\n"));
        assert!(mapped.source.contains("class Outer$Inner {"));
        assert!(mapped
            .source
            .contains("void ___run(int x, java.lang.String name) throws java.lang.Throwable {"));
        assert_eq!(mapped.unit_name, "Outer.java");
        let mut lines = mapped.source.lines().skip(mapped.start_line - 1);
        assert_eq!(lines.next(), Some("return x + 1"));
        assert_eq!(lines.next(), Some(";"));
    }

    #[test]
    fn test_trailing_line_comment_keeps_terminator() {
        let mapper = SnippetMapper::new("___run");
        let mapped = mapper.map("x + 1 // one more", &frame());
        assert!(mapped.auto_return);
        assert_eq!(&mapped.source[mapped.snippet_range()], "x + 1 // one more");
        assert!(snapeval_parser::parse(&mapped.source).is_ok(), "{}", mapped.source);
    }

    #[test]
    fn test_static_frame_gets_static_method() {
        let mapped = SnippetMapper::new("___run").map("1", &FrameDescription::new("Main").with_static(true));
        assert!(mapped.source.contains("  static void ___run() throws"));
        assert!(!mapped.source.contains("package"));
    }

    #[test]
    fn test_source_unit_flattens_nested_types() {
        let source = r#"
            package geo;
            import java.util.List;
            public class Outer {
                static int COUNT = 3;
                class Inner extends Point {
                    private final String label;
                    Inner(int x, String... tags) { super(x); label = tags[0]; }
                    int twice() { return x * 2; }
                }
                interface Shape { double area(); }
            }
        "#;
        let frame = FrameDescription::new("geo.Outer$Inner").with_local("k", "int").with_source(source);
        let mapped = SnippetMapper::new("___run").map("twice() + k", &frame);
        assert!(mapped.from_source);
        assert!(mapped.source.contains("import java.util.List;"));
        assert!(mapped.source.contains("class Outer {"));
        assert!(mapped.source.contains("class Outer$Inner extends Point {"));
        assert!(mapped.source.contains("Outer$Inner(int x, String... tags) {}"));
        assert!(mapped.source.contains("native int twice();"));
        assert!(mapped.source.contains("interface Outer$Shape {"));
        assert!(mapped.source.contains("  double area();"));
        assert!(mapped.source.contains("  static int COUNT;"));
        assert_eq!(&mapped.source[mapped.snippet_range()], "twice() + k");
        // the snippet method lives in the declaring type's stub only
        assert_eq!(mapped.source.matches("___run").count(), 1);
        let inner_at = mapped.source.find("class Outer$Inner").unwrap_or(usize::MAX);
        assert!(mapped.snippet_start > inner_at);
    }

    #[test]
    fn test_unparseable_source_falls_back_to_metadata() {
        let frame = frame().with_source("class {{{ nonsense");
        let mapped = SnippetMapper::new("___run").map("x", &frame);
        assert!(!mapped.from_source);
        assert_eq!(&mapped.source[mapped.snippet_range()], "x");
    }

    #[test]
    fn test_declaring_type_missing_from_source() {
        let frame = FrameDescription::new("geo.Outer$1").with_source("package geo; class Outer { }");
        let mapped = SnippetMapper::new("___run").map("this", &frame);
        assert!(mapped.source.contains("class Outer {"));
        assert!(mapped.source.contains("class Outer$1 {"));
    }

    #[test]
    fn test_extra_imports_are_not_duplicated() {
        let frame = FrameDescription::new("a.B").with_source("package a; import java.util.List; class B {}");
        let mapped = SnippetMapper::new("___run")
            .with_imports(vec!["java.util.List".into(), "java.util.Map".into()])
            .map("1", &frame);
        assert_eq!(mapped.source.matches("import java.util.List;").count(), 1);
        assert!(mapped.source.contains("import java.util.Map;"));
    }

    #[test]
    fn test_object_relative_frame() {
        let frame = FrameDescription::for_object("geo.Point");
        assert_eq!(frame.declaring_type, "geo.Point");
        assert!(!frame.is_static);
        assert_eq!(FrameDescription::for_object("int[]").declaring_type, "java.lang.Object");
    }
}
