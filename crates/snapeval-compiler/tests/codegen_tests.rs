/// Integration tests for snippet compilation

use std::sync::Arc;

use rand::Rng;
use snapeval_compiler::{
    ClassDescription, CompileOptions, CompiledExpression, Compiler, FrameDescription, Instruction, MapEnvironment,
    MessageOrigin,
};
use snapeval_parser::types::{JType, Primitive};

const POINT: &str = r#"[{
    "name": "geo.Point",
    "fields": [
        {"name": "x", "type": "int"},
        {"name": "y", "type": "int"},
        {"name": "ORIGIN", "type": "geo.Point", "is_static": true}
    ],
    "methods": [
        {"name": "<init>", "params": ["int", "int"]},
        {"name": "distance", "returns": "double"},
        {"name": "translate", "params": ["int", "int"]}
    ]
}]"#;

/// Helper to build a compiler whose class descriptions come from a file
fn compiler() -> Compiler {
    let temp_dir = std::env::temp_dir();
    let classes_file = temp_dir.join(format!("classes_{}.json", rand::random::<u32>()));
    std::fs::write(&classes_file, POINT).expect("write fixture");
    let text = std::fs::read_to_string(&classes_file).expect("read fixture");
    let _ = std::fs::remove_file(&classes_file);

    let classes: Vec<ClassDescription> = serde_json::from_str(&text).expect("valid class descriptions");
    let mut env = MapEnvironment::with_core_types();
    env.add_descriptions(&classes);
    Compiler::with_environment(CompileOptions::new(), Arc::new(env))
}

fn frame() -> FrameDescription {
    FrameDescription::new("geo.Point")
        .with_local("n", "int")
        .with_local("d", "double")
        .with_local("label", "java.lang.String")
        .with_local("other", "geo.Point")
        .with_local("boxed", "java.lang.Integer")
        .with_local("obj", "java.lang.Object")
}

fn compile(snippet: &str) -> CompiledExpression {
    compiler().compile_in_frame(snippet, &frame())
}

fn compile_ok(snippet: &str) -> Vec<Instruction> {
    let compiled = compile(snippet);
    assert!(!compiled.has_errors(), "unexpected errors for {:?}: {:?}", snippet, compiled.errors());
    compiled.instructions().to_vec()
}

#[test]
fn test_simple_expression() {
    let code = compile_ok("n + 1");
    assert_eq!(
        code,
        vec![
            Instruction::PushLocal("n".into()),
            Instruction::PushInt(1),
            Instruction::Add(Primitive::Int),
            Instruction::Return { with_value: true },
        ]
    );
}

#[test]
fn test_mixed_arithmetic_widens() {
    let code = compile_ok("n * d");
    assert_eq!(
        code,
        vec![
            Instruction::PushLocal("n".into()),
            Instruction::Cast(Primitive::Double),
            Instruction::PushLocal("d".into()),
            Instruction::Multiply(Primitive::Double),
            Instruction::Return { with_value: true },
        ]
    );
}

#[test]
fn test_implicit_this_field_and_method() {
    let code = compile_ok("x + distance()");
    assert_eq!(code[0], Instruction::PushThis);
    assert_eq!(
        code[1],
        Instruction::PushField {
            owner: "geo.Point".into(),
            name: "x".into()
        }
    );
    assert!(code.contains(&Instruction::SendMessage {
        owner: "geo.Point".into(),
        name: "distance".into(),
        signature: "()D".into(),
        arg_count: 0,
        nonvirtual: false,
    }));
}

#[test]
fn test_static_field_and_constructor() {
    let code = compile_ok("new Point(n, 2) == Point.ORIGIN");
    assert_eq!(
        code,
        vec![
            Instruction::PushLocal("n".into()),
            Instruction::PushInt(2),
            Instruction::New {
                class: "geo.Point".into(),
                signature: "(II)V".into(),
                arg_count: 2,
            },
            Instruction::PushStaticField {
                owner: "geo.Point".into(),
                name: "ORIGIN".into()
            },
            Instruction::Equal(None),
            Instruction::Return { with_value: true },
        ]
    );
}

#[test]
fn test_compound_assignment_on_local() {
    let code = compile_ok("n += 4");
    assert_eq!(
        code,
        vec![
            Instruction::PushLocal("n".into()),
            Instruction::Dup,
            Instruction::PushInt(4),
            Instruction::Add(Primitive::Int),
            Instruction::Assign,
            Instruction::Return { with_value: true },
        ]
    );
}

#[test]
fn test_boxed_arithmetic_unboxes() {
    let code = compile_ok("boxed + 1");
    assert_eq!(code[1], Instruction::Unbox(Primitive::Int));
}

#[test]
fn test_string_concatenation() {
    let code = compile_ok("label + n");
    assert_eq!(code[2], Instruction::Concat);
}

#[test]
fn test_statement_snippet_keeps_last_value() {
    let code = compile_ok("int total = 0; for (int i = 0; i < n; i++) { total += i; } total = total * 2;");
    assert!(matches!(code[1], Instruction::LocalVariableCreation { ref name, has_init: true, .. } if name == "total"));
    assert!(code.iter().any(|i| matches!(i, Instruction::JumpIfFalse(_))));
    assert!(code.iter().any(|i| matches!(i, Instruction::Jump(o) if *o < 0)));
    // the final assignment's value is the result, so it is not popped
    assert_eq!(code.last(), Some(&Instruction::Assign));
}

#[test]
fn test_void_call_statement() {
    let code = compile_ok("other.translate(1, n);");
    assert_eq!(
        code.last(),
        Some(&Instruction::SendMessage {
            owner: "geo.Point".into(),
            name: "translate".into(),
            signature: "(II)V".into(),
            arg_count: 2,
            nonvirtual: false,
        })
    );
}

#[test]
fn test_instanceof_and_cast() {
    let code = compile_ok("obj instanceof Point");
    assert_eq!(code[1], Instruction::InstanceOf(JType::Class("geo.Point".into())));
    let code = compile_ok("((Point) obj).x");
    assert_eq!(code[1], Instruction::CheckCast(JType::Class("geo.Point".into())));
}

#[test]
fn test_array_creation_and_access() {
    let code = compile_ok("(new int[] {1, 2, n})[2]");
    assert!(code.contains(&Instruction::ArrayInitializer {
        ty: JType::array_of(JType::int(), 1),
        length: 3,
    }));
    assert!(code.contains(&Instruction::ArrayAccess));
    let code = compile_ok("(new long[n][2]).length");
    assert!(code.contains(&Instruction::NewArray {
        ty: JType::array_of(JType::Primitive(Primitive::Long), 2),
        dims: 2,
    }));
    assert!(code.contains(&Instruction::ArrayLength));
}

#[test]
fn test_unknown_name_is_reported_in_snippet_coordinates() {
    let compiled = compile("n + missing");
    assert!(compiled.instructions().is_empty());
    let error = &compiled.errors()[0];
    assert_eq!(error.origin, MessageOrigin::Snippet);
    assert_eq!(error.offset, Some(4));
    assert_eq!(error.line, Some(1));
    assert!(error.text.contains("missing"));
}

#[test]
fn test_syntax_error_is_reported() {
    let compiled = compile("int y = ;");
    assert!(compiled.has_errors());
    let error = &compiled.errors()[0];
    assert_eq!(error.origin, MessageOrigin::Snippet);
    assert!(error.offset.is_some_and(|o| o < "int y = ;".len()));
}

#[test]
fn test_object_relative_compilation() {
    let compiled = compiler().compile_for_object("x * y", "geo.Point");
    assert!(!compiled.has_errors(), "{:?}", compiled.errors());
    assert_eq!(compiled.instructions()[0], Instruction::PushThis);
}

#[test]
fn test_snippet_start_points_at_snippet() {
    let compiled = compile("n");
    let start = compiled.snippet_start();
    let tail: String = compiled.source().chars().skip(start).take(1).collect();
    assert_eq!(tail, "n");
}

#[test]
fn test_source_based_unit_resolves_nested_names() {
    let source = r#"
        package geo;
        public class Shapes {
            static final int SIDES = 4;
            static class Square extends Point {
                int side() { return SIDES; }
            }
        }
    "#;
    let frame = FrameDescription::new("geo.Shapes$Square").with_local("k", "int").with_source(source);
    let compiled = compiler().compile_in_frame("side() + SIDES + x + k", &frame);
    assert!(!compiled.has_errors(), "{:?}", compiled.errors());
    assert!(compiled.source().contains("class Shapes$Square extends Point"));
}

#[test]
fn test_error_offsets_stay_inside_snippet() {
    let fragments = ["n", "+", "missing", "(", "\"s\"", ".", "1", "label", "*", "obj", ")", " "];
    let mut rng = rand::thread_rng();
    for _ in 0..200 {
        let len = rng.gen_range(1..6);
        let snippet: String = (0..len).map(|_| fragments[rng.gen_range(0..fragments.len())]).collect();
        let compiled = compile(&snippet);
        let chars = snippet.chars().count();
        for error in compiled.errors() {
            if let Some(offset) = error.offset {
                assert!(offset < chars, "offset {} outside {:?}: {}", offset, snippet, error.text);
            }
        }
    }
}
