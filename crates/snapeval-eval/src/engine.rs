//! The evaluation engine.
//!
//! [`Engine::evaluate`] returns as soon as the worker thread is started.
//! The worker interprets the instructions and reports through the listener;
//! a watchdog thread polls the listener every `timeout` while the worker is
//! still running. Once the listener answers [`TimeoutDecision::Stop`] the
//! evaluation is cancelled: the worker stops at the next instruction
//! boundary and whatever it produces is dropped without a callback.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use snapeval_compiler::{CompileMessage, CompileOptions, CompiledExpression, Compiler};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::context::RuntimeContext;
use crate::error::Fault;
use crate::interpreter::Interpreter;
use crate::result::{EvaluationResult, Outcome};
use crate::target::{ObjectId, Target, ThreadId};
use crate::typeenv::TargetEnvironment;

/// What a listener wants done with an evaluation that is taking long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutDecision {
    /// Keep waiting another timeout period
    Continue,
    /// Cancel; the result will never be delivered
    Stop,
}

/// Receives the outcome of one evaluation.
pub trait EvaluationListener: Send + Sync {
    /// Called at most once, with the terminal result.
    fn evaluation_complete(&self, result: EvaluationResult);

    /// Called each time another timeout period elapses before completion.
    /// Completion waits for the decision, so this must not block on the
    /// evaluation's handle.
    fn evaluation_timed_out(&self, _thread: ThreadId) -> TimeoutDecision {
        TimeoutDecision::Continue
    }
}

/// Finds the source text of a declaring type, when it is available.
pub trait SourceLocator: Send + Sync {
    fn source_for(&self, declaring_type: &str) -> Option<String>;
}

impl<F> SourceLocator for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn source_for(&self, declaring_type: &str) -> Option<String> {
        self(declaring_type)
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Watchdog period in milliseconds; 0 disables the watchdog
    pub timeout_ms: u64,
    /// Prefix for worker and watchdog thread names
    pub thread_name_prefix: String,
    /// Maximum number of executed instructions per evaluation
    pub step_limit: Option<u64>,
}

impl EngineOptions {
    pub fn new() -> Self {
        Self {
            timeout_ms: 3000,
            thread_name_prefix: "snapeval".to_string(),
            step_limit: Some(1_000_000),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn step_limit(mut self, limit: Option<u64>) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Completed,
    Cancelled,
}

/// State shared by the worker, the watchdog and the caller's handle.
struct Evaluation {
    phase: Mutex<Phase>,
    changed: Condvar,
    token: CancellationToken,
}

impl Evaluation {
    fn new() -> Self {
        Self {
            phase: Mutex::new(Phase::Running),
            changed: Condvar::new(),
            token: CancellationToken::new(),
        }
    }

    /// Mark the run finished; true when its result should be delivered.
    fn finish(&self) -> bool {
        let mut phase = self.phase.lock();
        let deliver = *phase == Phase::Running;
        if deliver {
            *phase = Phase::Completed;
        }
        self.changed.notify_all();
        deliver
    }

    fn cancel(&self) {
        let mut phase = self.phase.lock();
        if *phase == Phase::Running {
            *phase = Phase::Cancelled;
            self.token.cancel();
        }
        self.changed.notify_all();
    }

    /// Ask `decide` what to do with a run that outlived a timeout period.
    /// The phase is held for the whole decision, so a run that finished
    /// meanwhile is never reported as timed out. True when watching is over.
    fn timed_out(&self, decide: impl FnOnce() -> TimeoutDecision) -> bool {
        let mut phase = self.phase.lock();
        if *phase != Phase::Running {
            return true;
        }
        match decide() {
            TimeoutDecision::Continue => false,
            TimeoutDecision::Stop => {
                *phase = Phase::Cancelled;
                self.token.cancel();
                self.changed.notify_all();
                true
            }
        }
    }

    /// Wait up to `timeout` for the run to leave the running phase; true
    /// when it has.
    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut phase = self.phase.lock();
        while *phase == Phase::Running {
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut phase, deadline).timed_out() {
                        break;
                    }
                }
                None => self.changed.wait(&mut phase),
            }
        }
        *phase != Phase::Running
    }
}

/// Caller-side handle on a running evaluation.
#[derive(Clone)]
pub struct EvaluationHandle {
    state: Arc<Evaluation>,
}

impl EvaluationHandle {
    /// Cancel the evaluation. Its result is dropped if it was not delivered
    /// yet.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    pub fn is_finished(&self) -> bool {
        *self.state.phase.lock() != Phase::Running
    }

    /// Block until the evaluation completes or is cancelled, or `timeout`
    /// elapses; true unless it timed out.
    pub fn wait(&self, timeout: Duration) -> bool {
        self.state.wait(timeout)
    }
}

/// Compiles snippets against runtime contexts and evaluates them.
pub struct Engine {
    target: Arc<dyn Target>,
    compiler: Compiler,
    options: EngineOptions,
    sources: Option<Arc<dyn SourceLocator>>,
    next_id: AtomicU64,
}

impl Engine {
    /// An engine whose compiler resolves types against the classes loaded
    /// in `target`.
    pub fn new(target: Arc<dyn Target>, options: EngineOptions) -> Self {
        let env = Arc::new(TargetEnvironment::new(target.clone()));
        Self {
            compiler: Compiler::with_environment(CompileOptions::new(), env),
            target,
            options,
            sources: None,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_compiler(mut self, compiler: Compiler) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_source_locator(mut self, sources: Arc<dyn SourceLocator>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn target(&self) -> &Arc<dyn Target> {
        &self.target
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Compile a snippet in the scope of `context`: its frame, or its
    /// receiver when the context is object-relative.
    pub fn compile(&self, snippet: &str, context: &RuntimeContext) -> CompiledExpression {
        if context.depth().is_none() {
            return self.compiler.compile_for_object(snippet, &context.receiving_type().name);
        }
        let mut frame = context.frame_description();
        if let Some(source) = self.sources.as_ref().and_then(|s| s.source_for(context.declaring_type())) {
            frame = frame.with_source(source);
        }
        self.compiler.compile_in_frame(snippet, &frame)
    }

    /// Compile a snippet against `object` with no frame available.
    pub fn compile_for_object(&self, snippet: &str, object: ObjectId, _thread: ThreadId) -> CompiledExpression {
        let type_name = self
            .target
            .object_type(object)
            .and_then(|ty| self.target.type_name(ty));
        match type_name {
            Ok(name) => self.compiler.compile_for_object(snippet, &name),
            Err(e) => CompiledExpression::failed(snippet, vec![CompileMessage::synthetic(e.to_string())]),
        }
    }

    /// Evaluate `expression` against `context` off the calling thread.
    ///
    /// An expression with compile errors is reported to `listener` before
    /// this returns, without touching the target. A zero `timeout` disables
    /// the watchdog.
    pub fn evaluate(
        &self,
        expression: Arc<CompiledExpression>,
        context: RuntimeContext,
        listener: Arc<dyn EvaluationListener>,
        timeout: Duration,
    ) -> EvaluationHandle {
        let thread_id = context.thread();
        let state = Arc::new(Evaluation::new());
        let handle = EvaluationHandle { state: state.clone() };

        if expression.has_errors() {
            tracing::debug!(snippet = expression.snippet(), "reporting compile errors without running");
            state.finish();
            listener.evaluation_complete(EvaluationResult::new(
                expression.snippet(),
                thread_id,
                Outcome::CompileErrors(expression.errors().to_vec()),
            ));
            return handle;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let step_limit = self.options.step_limit;
        let worker_state = state.clone();
        let worker_listener = listener.clone();
        let worker_expression = expression.clone();
        let spawned = thread::Builder::new()
            .name(format!("{}-eval-{}", self.options.thread_name_prefix, id))
            .spawn(move || {
                run_worker(
                    &worker_expression,
                    &context,
                    worker_listener.as_ref(),
                    &worker_state,
                    step_limit,
                )
            });
        if let Err(e) = spawned {
            tracing::warn!("cannot start evaluation worker: {}", e);
            if state.finish() {
                listener.evaluation_complete(EvaluationResult::new(
                    expression.snippet(),
                    thread_id,
                    Outcome::Fault(Fault::internal(format!("cannot start evaluation worker: {}", e))),
                ));
            }
            return handle;
        }
        tracing::debug!(id, snippet = expression.snippet(), "evaluation started");

        if !timeout.is_zero() {
            let watchdog_state = state.clone();
            let spawned = thread::Builder::new()
                .name(format!("{}-watchdog-{}", self.options.thread_name_prefix, id))
                .spawn(move || watch(&watchdog_state, listener.as_ref(), thread_id, timeout));
            if let Err(e) = spawned {
                tracing::warn!("cannot start evaluation watchdog, running without a timeout: {}", e);
            }
        }
        handle
    }

    /// Evaluate with the configured default timeout. The first timeout
    /// cancels the evaluation, and the returned future then resolves to
    /// `None`.
    pub fn evaluate_async(&self, expression: Arc<CompiledExpression>, context: RuntimeContext) -> PendingEvaluation {
        let (sender, receiver) = oneshot::channel();
        let listener = Arc::new(ChannelListener {
            sender: Mutex::new(Some(sender)),
        });
        let handle = self.evaluate(expression, context, listener, self.options.default_timeout());
        PendingEvaluation { receiver, handle }
    }
}

fn run_worker(
    expression: &CompiledExpression,
    context: &RuntimeContext,
    listener: &dyn EvaluationListener,
    state: &Evaluation,
    step_limit: Option<u64>,
) {
    let mut interpreter = Interpreter::new(context)
        .with_step_limit(step_limit)
        .with_cancellation(state.token.clone());
    let outcome = match interpreter.execute(expression.instructions()) {
        Ok(Some(value)) => Outcome::Value(value),
        Ok(None) => Outcome::Void,
        Err(fault) => {
            tracing::debug!("evaluation faulted: {}", fault);
            Outcome::Fault(fault)
        }
    };
    if state.finish() {
        listener.evaluation_complete(EvaluationResult::new(expression.snippet(), context.thread(), outcome));
    } else {
        tracing::debug!(snippet = expression.snippet(), "dropping result of cancelled evaluation");
    }
}

fn watch(state: &Evaluation, listener: &dyn EvaluationListener, thread: ThreadId, timeout: Duration) {
    while !state.wait(timeout) {
        let stopped = state.timed_out(|| listener.evaluation_timed_out(thread));
        if stopped {
            tracing::debug!(%thread, "evaluation over after timeout");
            break;
        }
        tracing::debug!(%thread, "evaluation still running");
    }
}

struct ChannelListener {
    sender: Mutex<Option<oneshot::Sender<EvaluationResult>>>,
}

impl EvaluationListener for ChannelListener {
    fn evaluation_complete(&self, result: EvaluationResult) {
        if let Some(sender) = self.sender.lock().take() {
            let _ = sender.send(result);
        }
    }

    fn evaluation_timed_out(&self, _thread: ThreadId) -> TimeoutDecision {
        // closing the channel resolves the pending future to None
        self.sender.lock().take();
        TimeoutDecision::Stop
    }
}

/// A result that may never arrive: resolves to `None` when the evaluation
/// is cancelled.
pub struct PendingEvaluation {
    receiver: oneshot::Receiver<EvaluationResult>,
    handle: EvaluationHandle,
}

impl PendingEvaluation {
    pub fn handle(&self) -> &EvaluationHandle {
        &self.handle
    }

    /// Block the current thread for the result. Must not be called from
    /// inside an async runtime.
    pub fn blocking_wait(self) -> Option<EvaluationResult> {
        self.receiver.blocking_recv().ok()
    }
}

impl Future for PendingEvaluation {
    type Output = Option<EvaluationResult>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(Result::ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finished_run_is_not_reported_as_timed_out() {
        let state = Evaluation::new();
        assert!(state.finish());
        assert!(state.timed_out(|| panic!("asked about a finished run")));
    }

    #[test]
    fn test_timeout_decisions() {
        let state = Evaluation::new();
        assert!(!state.timed_out(|| TimeoutDecision::Continue));
        assert!(!state.token.is_cancelled());

        assert!(state.timed_out(|| TimeoutDecision::Stop));
        assert!(state.token.is_cancelled());
        assert_eq!(*state.phase.lock(), Phase::Cancelled);
        // a cancelled run never delivers
        assert!(!state.finish());
    }
}
