/// Snippet compiler CLI

use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use snapeval_compiler::{listing, ClassDescription, CompileOptions, Compiler, FrameDescription, MapEnvironment};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "snapevalc")]
#[command(about = "Snippet compiler - shows the synthesized unit and instructions for a snippet")]
#[command(version)]
struct Args {
    /// Snippet to compile
    #[arg(value_name = "SNIPPET")]
    snippet: String,

    /// JSON frame description (declaring type, locals, optional source)
    #[arg(short, long, value_name = "FILE", conflicts_with = "object")]
    frame: Option<PathBuf>,

    /// Compile against a receiver of this type instead of a frame
    #[arg(long, value_name = "TYPE")]
    object: Option<String>,

    /// JSON array of class descriptions known to the type checker
    #[arg(short, long, value_name = "FILE")]
    classes: Option<PathBuf>,

    /// Source file backing the frame's declaring type
    #[arg(short, long, value_name = "FILE")]
    source: Option<PathBuf>,

    /// Always synthesize from frame metadata, ignoring source
    #[arg(long)]
    no_source: bool,

    /// Extra import for the synthesized unit (repeatable)
    #[arg(short, long = "import", value_name = "NAME")]
    imports: Vec<String>,

    /// Print the synthesized compilation unit
    #[arg(long)]
    dump_unit: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut env = MapEnvironment::with_core_types();
    if let Some(path) = &args.classes {
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let classes: Vec<ClassDescription> =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        env.add_descriptions(&classes);
        tracing::info!(count = classes.len(), "loaded class descriptions");
    }

    let mut options = CompileOptions::new().prefer_source(!args.no_source);
    for import in &args.imports {
        options = options.import(import.clone());
    }
    let compiler = Compiler::with_environment(options, Arc::new(env));

    let compiled = match &args.object {
        Some(receiver_type) => compiler.compile_for_object(&args.snippet, receiver_type),
        None => {
            let mut frame = match &args.frame {
                Some(path) => {
                    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
                    serde_json::from_str::<FrameDescription>(&text)
                        .with_context(|| format!("parsing {}", path.display()))?
                }
                None => FrameDescription::new("Snippet").with_static(true),
            };
            if let Some(path) = &args.source {
                frame.source = Some(fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?);
            }
            compiler.compile_in_frame(&args.snippet, &frame)
        }
    };

    if args.dump_unit {
        println!("=== Synthesized unit (snippet at offset {}) ===", compiled.snippet_start());
        println!("{}", compiled.source());
    }

    if compiled.has_errors() {
        for error in compiled.errors() {
            eprintln!("error: {}", error);
        }
        process::exit(1);
    }

    print!("{}", listing(compiled.instructions()));
    Ok(())
}
