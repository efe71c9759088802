/// End-to-end evaluation tests against the simulated target

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use snapeval_compiler::Instruction;
use snapeval_eval::sim::fixture::Fixture;
use snapeval_eval::sim::{ClassDef, FrameSpec, SimVm};
use snapeval_eval::{
    Engine, EngineOptions, EvaluationListener, EvaluationResult, Fault, Interpreter, InvokeOutcome, Outcome,
    RuntimeContext, Target, ThreadId, TimeoutDecision, Value,
};

struct Paused {
    vm: Arc<SimVm>,
    thread: ThreadId,
    point: snapeval_eval::ObjectId,
}

/// A thread paused in an instance method of `geo.Point` with a few locals
fn paused() -> Paused {
    let vm = Arc::new(SimVm::new());
    let point_type = vm
        .define_class(ClassDef::class("geo.Point").field("x", "int").field("y", "int"))
        .unwrap();
    vm.add_native(point_type, "<init>", "(II)V", false, |vm, call| {
        let this = call.this()?;
        vm.set_field(this, "x", call.arg(0)?)?;
        vm.set_field(this, "y", call.arg(1)?)?;
        Ok(InvokeOutcome::Returned(Value::Null))
    })
    .unwrap();
    vm.add_native(point_type, "sum", "()I", false, |vm, call| {
        let this = call.this()?;
        let (Value::Int(x), Value::Int(y)) = (vm.get_field(this, "x")?, vm.get_field(this, "y")?) else {
            return Ok(InvokeOutcome::Returned(Value::Int(0)));
        };
        Ok(InvokeOutcome::Returned(Value::Int(x + y)))
    })
    .unwrap();
    vm.add_stalling(point_type, "slow", "()I", false, Value::Int(42)).unwrap();

    let point = vm.new_object(point_type).unwrap();
    vm.set_field(point, "x", Value::Int(3)).unwrap();
    vm.set_field(point, "y", Value::Int(4)).unwrap();
    let label = vm.new_string("origin").unwrap();
    let boxed = vm.boxed(snapeval_parser::types::Primitive::Int, Value::Int(9)).unwrap();

    let thread = vm.spawn_thread("main");
    vm.push_frame(
        thread,
        FrameSpec::new(point_type)
            .with_this(point)
            .with_local("n", "int", Value::Int(1))
            .with_local("label", "java.lang.String", Value::Object(label))
            .with_local("obj", "java.lang.Object", Value::Object(label))
            .with_local("none", "java.lang.String", Value::Null)
            .with_local("boxed", "java.lang.Integer", Value::Object(boxed)),
    )
    .unwrap();
    Paused { vm, thread, point }
}

fn engine(vm: &Arc<SimVm>) -> Engine {
    Engine::new(vm.clone(), EngineOptions::new().timeout(Duration::from_secs(10)))
}

fn context(p: &Paused) -> RuntimeContext {
    RuntimeContext::for_frame(p.vm.clone(), p.thread, 0).unwrap()
}

fn evaluate(p: &Paused, snippet: &str) -> EvaluationResult {
    let engine = engine(&p.vm);
    let ctx = context(p);
    let compiled = engine.compile(snippet, &ctx);
    assert!(!compiled.has_errors(), "unexpected errors for {:?}: {:?}", snippet, compiled.errors());
    engine
        .evaluate_async(Arc::new(compiled), ctx)
        .blocking_wait()
        .expect("result delivered")
}

fn value(p: &Paused, snippet: &str) -> Value {
    let result = evaluate(p, snippet);
    match result.outcome() {
        Outcome::Value(v) => *v,
        other => panic!("expected a value for {:?}, got {:?}", snippet, other),
    }
}

fn fault(p: &Paused, snippet: &str) -> Fault {
    let result = evaluate(p, snippet);
    match result.into_outcome() {
        Outcome::Fault(f) => f,
        other => panic!("expected a fault for {:?}, got {:?}", snippet, other),
    }
}

fn text(p: &Paused, snippet: &str) -> String {
    match value(p, snippet) {
        Value::Object(id) => p.vm.string_value(id).unwrap(),
        other => panic!("expected a string for {:?}, got {}", snippet, other),
    }
}

/// Records callbacks; answers `Stop` from the `stop_at`-th timeout on
#[derive(Default)]
struct Recorder {
    results: Mutex<Vec<EvaluationResult>>,
    timeouts: AtomicUsize,
    stop_at: Option<usize>,
}

impl Recorder {
    fn stopping_at(n: usize) -> Self {
        Self {
            stop_at: Some(n),
            ..Self::default()
        }
    }
}

impl EvaluationListener for Recorder {
    fn evaluation_complete(&self, result: EvaluationResult) {
        self.results.lock().push(result);
    }

    fn evaluation_timed_out(&self, _thread: ThreadId) -> TimeoutDecision {
        let seen = self.timeouts.fetch_add(1, Ordering::SeqCst) + 1;
        match self.stop_at {
            Some(n) if seen >= n => TimeoutDecision::Stop,
            _ => TimeoutDecision::Continue,
        }
    }
}

#[test]
fn test_arithmetic_on_locals_and_fields() {
    let p = paused();
    assert_eq!(value(&p, "n + 2"), Value::Int(3));
    assert_eq!(value(&p, "x * y"), Value::Int(12));
    assert_eq!(value(&p, "this.y - n * 2L"), Value::Long(2));
    assert_eq!(value(&p, "sum()"), Value::Int(7));
    assert_eq!(value(&p, "n < x && x < y"), Value::Boolean(true));
}

#[test]
fn test_same_compiled_snippet_evaluates_twice() {
    let p = paused();
    let engine = engine(&p.vm);
    let compiled = Arc::new(engine.compile("x * 10 + y", &context(&p)));
    let first = engine.evaluate_async(compiled.clone(), context(&p)).blocking_wait().unwrap();
    let second = engine.evaluate_async(compiled, context(&p)).blocking_wait().unwrap();
    assert_eq!(first.value(), Some(&Value::Int(34)));
    assert_eq!(first.outcome(), second.outcome());
}

#[test]
fn test_division_by_zero() {
    let p = paused();
    assert!(matches!(fault(&p, "5 / 0"), Fault::DivideByZero));
    assert!(matches!(fault(&p, "5L % (n - 1)"), Fault::DivideByZero));
    assert_eq!(value(&p, "5.0 / 0.0"), Value::Double(f64::INFINITY));
}

#[test]
fn test_compound_assignment_writes_frame_local() {
    let p = paused();
    assert_eq!(value(&p, "n += 4"), Value::Int(5));
    assert_eq!(p.vm.local_value(p.thread, 0, "n").unwrap(), Value::Int(5));
    assert_eq!(value(&p, "n++"), Value::Int(5));
    assert_eq!(p.vm.local_value(p.thread, 0, "n").unwrap(), Value::Int(6));
    assert_eq!(value(&p, "x = 10"), Value::Int(10));
    assert_eq!(p.vm.get_field(p.point, "x").unwrap(), Value::Int(10));
}

#[test]
fn test_instanceof_and_casts() {
    let p = paused();
    assert_eq!(value(&p, "obj instanceof Integer"), Value::Boolean(false));
    assert_eq!(value(&p, "obj instanceof CharSequence"), Value::Boolean(true));
    assert_eq!(value(&p, "none instanceof String"), Value::Boolean(false));
    match fault(&p, "(Integer) obj") {
        Fault::ClassCast { from, to } => {
            assert_eq!(from, "java.lang.String");
            assert_eq!(to, "java.lang.Integer");
        }
        other => panic!("expected a class cast fault, got {}", other),
    }
    assert_eq!(value(&p, "(int) 3.9 + (byte) 200"), Value::Int(-53));
}

#[test]
fn test_strings_and_boxing() {
    let p = paused();
    assert_eq!(text(&p, "label + n"), "origin1");
    assert_eq!(text(&p, "\"p=\" + x + ',' + none"), "p=3,null");
    assert_eq!(value(&p, "label.length()"), Value::Int(6));
    assert_eq!(value(&p, "boxed + 1"), Value::Int(10));
    assert_eq!(value(&p, "Integer.valueOf(5) == Integer.valueOf(5)"), Value::Boolean(true));
    assert_eq!(text(&p, "String.valueOf(boxed)"), "9");
}

#[test]
fn test_statements_and_arrays() {
    let p = paused();
    assert_eq!(value(&p, "int[] a = new int[3]; a[1] = 7; return a[1] + a.length;"), Value::Int(10));
    assert_eq!(
        value(&p, "int total = 0; for (int i = 1; i <= 4; i++) { total += i; } return total;"),
        Value::Int(10)
    );
    assert_eq!(value(&p, "int[][] grid = {{1, 2}, {3, 4}}; return grid[1][0];"), Value::Int(3));
    assert!(matches!(evaluate(&p, "int k = 3;").outcome(), Outcome::Void));
    match fault(&p, "int[] a = new int[2]; return a[5];") {
        Fault::ArrayIndex { index, length } => assert_eq!((index, length), (5, 2)),
        other => panic!("expected an index fault, got {}", other),
    }
    assert!(matches!(fault(&p, "new int[n - 2]"), Fault::NegativeArraySize(-1)));
}

#[test]
fn test_exceptions_become_faults() {
    let p = paused();
    match fault(&p, "label.charAt(10)") {
        Fault::Exception(captured) => {
            assert_eq!(captured.type_name, "java.lang.StringIndexOutOfBoundsException");
            assert!(captured.message.unwrap().contains("10"));
        }
        other => panic!("expected an exception, got {}", other),
    }
    match fault(&p, "throw new IllegalStateException(\"boom\");") {
        Fault::Exception(captured) => assert_eq!(captured.to_string(), "java.lang.IllegalStateException: boom"),
        other => panic!("expected an exception, got {}", other),
    }
    assert!(matches!(fault(&p, "none.length()"), Fault::NullPointer(_)));
}

#[test]
fn test_object_context() {
    let p = paused();
    let engine = engine(&p.vm);
    let ctx = RuntimeContext::for_object(p.vm.clone(), p.thread, p.point).unwrap();
    let compiled = Arc::new(engine.compile("x + y", &ctx));
    let result = engine.evaluate_async(compiled, ctx).blocking_wait().unwrap();
    assert_eq!(result.value(), Some(&Value::Int(7)));
}

#[test]
fn test_resumed_thread_invalidates_context() {
    let p = paused();
    let engine = engine(&p.vm);
    let ctx = context(&p);
    let compiled = Arc::new(engine.compile("n", &ctx));
    p.vm.resume(p.thread).unwrap();
    p.vm.suspend(p.thread).unwrap();
    let result = engine.evaluate_async(compiled, ctx).blocking_wait().unwrap();
    assert!(matches!(result.exception(), Some(Fault::ContextInvalidated)));
}

#[test]
fn test_type_loaded_by_several_loaders() {
    let p = paused();
    for (loader, id) in [(1, 100), (2, 200)] {
        p.vm.define_class_in(ClassDef::class("app.Util").static_field("ID", "int", Value::Int(id)), loader)
            .unwrap();
    }
    p.vm.set_context_loader(2);
    assert_eq!(value(&p, "app.Util.ID"), Value::Int(200));
    p.vm.set_context_loader(1);
    assert_eq!(value(&p, "app.Util.ID + 1"), Value::Int(101));
}

/// Loads `app.Util` under two loaders and swaps `Class.forName` for `body`
fn with_redefined_for_name<F>(body: F) -> Paused
where
    F: Fn(&SimVm, &snapeval_eval::sim::Call<'_>) -> snapeval_eval::ProtocolResult<InvokeOutcome> + Send + Sync + 'static,
{
    let p = paused();
    for (loader, id) in [(1, 100), (2, 200)] {
        p.vm.define_class_in(ClassDef::class("app.Util").static_field("ID", "int", Value::Int(id)), loader)
            .unwrap();
    }
    let class = p.vm.find_class("java.lang.Class").unwrap();
    p.vm.add_native(class, "forName", "(Ljava/lang/String;)Ljava/lang/Class;", true, body)
        .unwrap();
    p
}

#[test]
fn test_class_for_name_matching_no_candidate_is_ambiguous() {
    let p = with_redefined_for_name(|vm, _| {
        let string = vm.find_class("java.lang.String").expect("bootstrap String");
        Ok(InvokeOutcome::Returned(Value::Object(vm.class_object(string)?)))
    });
    assert_eq!(fault(&p, "app.Util.ID"), Fault::AmbiguousType("app.Util".to_string()));
}

#[test]
fn test_class_for_name_failure_leaves_type_unknown() {
    let p = with_redefined_for_name(|vm, call| {
        let name = match call.arg(0)? {
            Value::Object(id) => vm.text(id)?,
            _ => String::new(),
        };
        vm.throw_new("java.lang.ClassNotFoundException", &name)
    });
    assert_eq!(fault(&p, "app.Util.ID"), Fault::UnknownType("app.Util".to_string()));
}

#[test]
fn test_trailing_line_comment_in_expression() {
    let p = paused();
    assert_eq!(value(&p, "n + 1 // one more"), Value::Int(2));
}

#[test]
fn test_locals_are_captured_with_the_context() {
    let p = paused();
    let ctx = context(&p);
    let captured = |ctx: &RuntimeContext, name: &str| {
        ctx.locals().unwrap().iter().find(|l| l.name == name).cloned().unwrap()
    };
    let n = captured(&ctx, "n");
    assert_eq!(n.type_name, "int");
    assert_eq!(n.value, Value::Int(1));
    assert_eq!(captured(&ctx, "none").value, Value::Null);

    assert_eq!(value(&p, "n = 5"), Value::Int(5));
    assert_eq!(captured(&ctx, "n").value, Value::Int(1));
    assert_eq!(ctx.local_value("n").unwrap(), Value::Int(5));
    assert_eq!(captured(&context(&p), "n").value, Value::Int(5));
}

#[test]
fn test_unbalanced_operand_stack_is_an_internal_fault() {
    let p = paused();
    let ctx = context(&p);
    let leftover = [Instruction::PushInt(1), Instruction::PushInt(2)];
    match Interpreter::new(&ctx).execute(&leftover) {
        Err(Fault::Internal(message)) => assert!(message.contains("2 entries"), "{}", message),
        other => panic!("expected an internal fault, got {:?}", other),
    }
    let balanced = [Instruction::PushInt(1)];
    assert_eq!(Interpreter::new(&ctx).execute(&balanced).unwrap(), Some(Value::Int(1)));
    assert_eq!(Interpreter::new(&ctx).execute(&[]).unwrap(), None);
}

#[test]
fn test_compile_errors_are_reported_before_evaluate_returns() {
    let p = paused();
    let engine = engine(&p.vm);
    let ctx = context(&p);
    let compiled = Arc::new(engine.compile("n +", &ctx));
    assert!(compiled.has_errors());
    let recorder = Arc::new(Recorder::default());
    let handle = engine.evaluate(compiled, ctx, recorder.clone(), Duration::from_secs(10));
    assert!(handle.is_finished());
    let results = recorder.results.lock();
    assert_eq!(results.len(), 1);
    assert!(results[0].has_errors());
    assert_eq!(results[0].snippet(), "n +");
}

#[test]
fn test_step_limit_stops_runaway_loops() {
    let p = paused();
    let engine = Engine::new(p.vm.clone(), EngineOptions::new().step_limit(Some(500)));
    let ctx = context(&p);
    let compiled = Arc::new(engine.compile("while (true) { n++; }", &ctx));
    let result = engine.evaluate_async(compiled, ctx).blocking_wait().unwrap();
    assert!(matches!(result.exception(), Some(Fault::StepLimit(500))));
}

#[test]
fn test_timeouts_repeat_until_completion() {
    let p = paused();
    let engine = engine(&p.vm);
    let ctx = context(&p);
    let compiled = Arc::new(engine.compile("slow() + 1", &ctx));
    let recorder = Arc::new(Recorder::default());
    let handle = engine.evaluate(compiled, ctx, recorder.clone(), Duration::from_millis(20));

    let deadline = Instant::now() + Duration::from_secs(5);
    while recorder.timeouts.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(recorder.timeouts.load(Ordering::SeqCst) >= 2);
    assert!(recorder.results.lock().is_empty());

    p.vm.gate().open();
    assert!(handle.wait(Duration::from_secs(5)));
    // the listener's callback runs right after the phase changes
    let deadline = Instant::now() + Duration::from_secs(5);
    while recorder.results.lock().is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    let results = recorder.results.lock();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].value(), Some(&Value::Int(43)));
}

#[test]
fn test_stop_after_timeout_drops_result() {
    let p = paused();
    let engine = engine(&p.vm);
    let ctx = context(&p);
    let compiled = Arc::new(engine.compile("slow()", &ctx));
    let recorder = Arc::new(Recorder::stopping_at(2));
    let handle = engine.evaluate(compiled, ctx, recorder.clone(), Duration::from_millis(20));

    assert!(handle.wait(Duration::from_secs(5)));
    p.vm.gate().open();
    thread::sleep(Duration::from_millis(100));
    assert!(recorder.results.lock().is_empty());
    assert_eq!(recorder.timeouts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_evaluate_async_resolves_to_none_on_timeout() {
    let p = paused();
    let engine = Engine::new(p.vm.clone(), EngineOptions::new().timeout(Duration::from_millis(20)));
    let ctx = context(&p);
    let compiled = Arc::new(engine.compile("slow()", &ctx));
    let pending = engine.evaluate_async(compiled, ctx);
    let outcome = tokio::time::timeout(Duration::from_secs(5), pending).await.unwrap();
    assert!(outcome.is_none());
    p.vm.gate().open();
}

#[tokio::test]
async fn test_evaluate_async_resolves_to_result() {
    let p = paused();
    let engine = engine(&p.vm);
    let ctx = context(&p);
    let compiled = Arc::new(engine.compile("sum() * 2", &ctx));
    let result = engine.evaluate_async(compiled, ctx).await.unwrap();
    assert_eq!(result.value(), Some(&Value::Int(14)));
}

#[test]
fn test_fixture_file_end_to_end() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(
        br#"{
            "classes": [{
                "name": "shop.Cart",
                "fields": [
                    { "name": "items", "type": "int[]" },
                    { "name": "owner", "type": "java.lang.String" }
                ]
            }],
            "objects": [{ "id": "cart", "class": "shop.Cart", "fields": { "items": [2, 3, 5], "owner": "ada" } }],
            "frame": {
                "declaring_type": "shop.Cart",
                "this": "cart",
                "locals": [{ "name": "discount", "type": "int", "value": 1 }]
            }
        }"#,
    )
    .unwrap();

    let vm = Arc::new(SimVm::new());
    let thread = Fixture::from_file(file.path()).unwrap().install(&vm).unwrap();
    let engine = engine(&vm);
    let ctx = RuntimeContext::for_frame(vm.clone(), thread, 0).unwrap();
    let compiled = Arc::new(engine.compile(
        "int sum = 0; for (int i = 0; i < items.length; i++) sum += items[i]; return sum - discount;",
        &ctx,
    ));
    let result = engine.evaluate_async(compiled, ctx).blocking_wait().unwrap();
    assert_eq!(result.value(), Some(&Value::Int(9)));
}
