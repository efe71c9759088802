//! Snippet evaluator CLI.
//!
//! Loads a JSON fixture describing a paused target into the simulator,
//! compiles the snippet in the fixture's frame (or against its receiver
//! with `--object`) and evaluates it with a timeout.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use snapeval_compiler::listing;
use snapeval_eval::sim::fixture::Fixture;
use snapeval_eval::sim::SimVm;
use snapeval_eval::{describe, Engine, EngineOptions, Outcome, RuntimeContext, SourceLocator, Target};
use tracing_subscriber::EnvFilter;

const SCRATCH: &str = r#"{
    "classes": [{ "name": "Scratch" }],
    "frame": { "declaring_type": "Scratch" }
}"#;

#[derive(Parser, Debug)]
#[command(name = "snapeval")]
#[command(about = "Evaluate a snippet against a paused (simulated) target process")]
#[command(version)]
struct Args {
    /// Snippet to evaluate
    #[arg(value_name = "SNIPPET")]
    snippet: String,

    /// JSON fixture: classes, objects and the paused frame
    #[arg(short, long, value_name = "FILE")]
    fixture: Option<PathBuf>,

    /// JSON engine options (timeout_ms, thread_name_prefix, step_limit)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Timeout in milliseconds, overriding the configured one
    #[arg(short, long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Maximum number of executed instructions, 0 for no limit
    #[arg(long, value_name = "N")]
    step_limit: Option<u64>,

    /// Source file backing the frame's declaring type
    #[arg(short, long, value_name = "FILE")]
    source: Option<PathBuf>,

    /// Evaluate against the frame's receiver only, without its locals
    #[arg(long)]
    object: bool,

    /// Print the compiled instructions before running them
    #[arg(long)]
    list: bool,
}

fn options(args: &Args) -> anyhow::Result<EngineOptions> {
    let mut options = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => EngineOptions::new(),
    };
    if let Some(ms) = args.timeout_ms {
        options = options.timeout(Duration::from_millis(ms));
    }
    if let Some(limit) = args.step_limit {
        options = options.step_limit((limit > 0).then_some(limit));
    }
    Ok(options)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let options = options(&args)?;

    let fixture = match &args.fixture {
        Some(path) => Fixture::from_file(path).with_context(|| format!("loading fixture {}", path.display()))?,
        None => Fixture::from_json(SCRATCH)?,
    };
    let vm = Arc::new(SimVm::new());
    let thread = fixture.install(&vm).context("installing fixture")?;
    tracing::info!(%thread, classes = fixture.classes.len(), "fixture installed");

    let target: Arc<dyn Target> = vm.clone();
    let context = if args.object {
        let this = target
            .frame(thread, 0)?
            .this
            .context("--object needs a fixture frame with a receiver")?;
        RuntimeContext::for_object(target.clone(), thread, this)?
    } else {
        RuntimeContext::for_frame(target.clone(), thread, 0)?
    };

    let mut engine = Engine::new(target.clone(), options);
    if let Some(path) = &args.source {
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let locator: Arc<dyn SourceLocator> = Arc::new(move |_: &str| Some(text.clone()));
        engine = engine.with_source_locator(locator);
    }

    let compiled = engine.compile(&args.snippet, &context);
    if args.list && !compiled.has_errors() {
        print!("{}", listing(compiled.instructions()));
    }

    let Some(result) = engine.evaluate_async(Arc::new(compiled), context).await else {
        eprintln!(
            "error: evaluation did not finish within {} ms",
            engine.options().timeout_ms
        );
        return Ok(ExitCode::from(2));
    };

    match result.outcome() {
        Outcome::Value(value) => println!("{}", describe(target.as_ref(), value)?),
        Outcome::Void => println!("(void)"),
        Outcome::CompileErrors(errors) => {
            for error in errors {
                eprintln!("error: {}", error);
            }
            return Ok(ExitCode::FAILURE);
        }
        Outcome::Fault(fault) => {
            eprintln!("exception: {}", fault);
            return Ok(ExitCode::FAILURE);
        }
    }
    Ok(ExitCode::SUCCESS)
}
