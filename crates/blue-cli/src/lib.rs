//! CLI logic for the Blue type resolver.
//!
//! Each subcommand loads one document through an [`Engine`] built from the
//! discovered configuration, then writes its result to a file or stdout.
//! Warnings are logged as they are found; errors are returned to `main` for
//! rendering.

pub mod error_adapter;

mod args;
mod config;

pub use args::{Args, Command, ParseArgs, ResolveArgs};

use std::{
    fs,
    io::{self, Read, Write},
    sync::Arc,
};

use log::{info, warn};

use blue::{BlueError, CancellationToken, Engine, serialize, serialize_graph};
use blue_parser::{Diagnostic, Document, Origin};

use error_adapter::{Reportable, render};

/// Input name that reads the document from stdin.
const STDIN: &str = "-";

/// Run the Blue CLI application
///
/// # Errors
///
/// Returns `BlueError` for:
/// - Configuration loading errors
/// - Unreadable, unreachable, or malformed input documents
/// - Resolutions that raised any error diagnostic
/// - Serialization and output errors
pub fn run(args: &Args) -> Result<(), BlueError> {
    let mut config = config::load_config(args.config.as_ref())?;
    let cancel = CancellationToken::new();

    match &args.command {
        Command::Resolve(resolve) => {
            info!(input = resolve.input, format:% = resolve.format; "Resolving document");
            if resolve.closed {
                config.resolve_mut().set_closed_objects(true);
            }
            if resolve.allow_recursive {
                config.resolve_mut().set_allow_recursive_types(true);
            }

            let engine = Engine::new(config)?;
            let root = load_input(&engine, &resolve.input, &cancel)?;
            let resolution = engine.resolve(root, &cancel)?;
            report_warnings(resolution.diagnostics());

            let graph = resolution.into_result()?;
            info!(
                documents = graph.document_count(),
                types = graph.types().len();
                "Resolved document",
            );
            let text = serialize_graph(&graph, resolve.format)?;
            write_output(resolve.output.as_deref(), &text)
        }
        Command::Parse(parse) => {
            info!(input = parse.input, format:% = parse.format; "Parsing document");
            let engine = Engine::new(config)?;
            let document = load_input(&engine, &parse.input, &cancel)?;
            report_warnings(document.warnings());

            let text = serialize(document.root(), parse.format)?;
            write_output(parse.output.as_deref(), &text)
        }
        Command::Hash { input } => {
            let engine = Engine::new(config)?;
            let document = load_input(&engine, input, &cancel)?;
            write_output(None, &format!("{}\n", document.hash()))
        }
    }
}

fn load_input(
    engine: &Engine,
    input: &str,
    cancel: &CancellationToken,
) -> Result<Arc<Document>, BlueError> {
    if input != STDIN {
        return engine.load(input, cancel);
    }
    let mut text = String::new();
    io::stdin().read_to_string(&mut text)?;
    engine.parse(&text, Origin::Memory("<stdin>".to_string()))
}

fn report_warnings(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics.iter().filter(|d| d.severity().is_warning()) {
        warn!("{}", render(&Reportable::diagnostic(diagnostic)));
    }
}

fn write_output(path: Option<&str>, text: &str) -> Result<(), BlueError> {
    match path {
        Some(path) => {
            fs::write(path, text)?;
            info!(output_file = path; "Output written");
        }
        None => io::stdout().lock().write_all(text.as_bytes())?,
    }
    Ok(())
}
