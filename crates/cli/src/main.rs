use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::AtomicBool;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use camber_core::{
    compile, CollectingSceneSink, CompiledRoute, Diagnostic, DiagnosticSink, FileSystemProvider,
    ObjectPlacement,
};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Camber route compiler.
#[derive(Parser)]
#[command(name = "camber", version, about = "Camber route compiler")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a scenario or route map file into a track model
    Compile {
        /// Path to the scenario or route map file
        file: PathBuf,
        /// Include placed scenery objects in the output
        #[arg(long)]
        scene: bool,
    },

    /// Compile a route and report diagnostics without emitting the model
    Check {
        /// Path to the scenario or route map file
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Compile { file, scene } => {
            cmd_compile(&file, scene, cli.output, cli.quiet);
        }
        Commands::Check { file } => {
            cmd_check(&file, cli.output, cli.quiet);
        }
    }
}

/// JSON envelope emitted by `camber compile`.
#[derive(Serialize)]
struct CompileReport {
    #[serde(flatten)]
    route: CompiledRoute,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    objects: Vec<ObjectPlacement>,
    diagnostics: Vec<Diagnostic>,
}

fn cmd_compile(file: &Path, scene: bool, output: OutputFormat, quiet: bool) {
    let provider = FileSystemProvider;
    let mut sink = DiagnosticSink::new();
    let mut scene_sink = CollectingSceneSink::new();
    let cancel = AtomicBool::new(false);

    match compile(&provider, file, &mut sink, &mut scene_sink, &cancel) {
        Ok(route) => match output {
            OutputFormat::Json => {
                let report = CompileReport {
                    route,
                    objects: if scene {
                        scene_sink.placements
                    } else {
                        Vec::new()
                    },
                    diagnostics: sink.into_messages(),
                };
                let pretty = serde_json::to_string_pretty(&report)
                    .unwrap_or_else(|e| format!("serialization error: {}", e));
                println!("{}", pretty);
            }
            OutputFormat::Text => {
                for d in sink.messages() {
                    eprintln!(
                        "{}:{}:{}: {:?}: {}",
                        d.file, d.line, d.column, d.severity, d.message
                    );
                }
                if !quiet {
                    println!(
                        "compiled {}: {} elements, {} stations, {} sections, {} objects placed",
                        file.display(),
                        route.elements.len(),
                        route.stations.len(),
                        route.sections.len(),
                        scene_sink.placements.len()
                    );
                }
            }
        },
        Err(e) => {
            report_error(&e.to_string(), output, quiet);
            process::exit(1);
        }
    }
}

fn cmd_check(file: &Path, output: OutputFormat, quiet: bool) {
    let provider = FileSystemProvider;
    let mut sink = DiagnosticSink::new();
    let mut scene_sink = CollectingSceneSink::new();
    let cancel = AtomicBool::new(false);

    match compile(&provider, file, &mut sink, &mut scene_sink, &cancel) {
        Ok(route) => {
            let errors = sink.error_count();
            match output {
                OutputFormat::Json => {
                    let pretty = serde_json::to_string_pretty(&sink.messages())
                        .unwrap_or_else(|e| format!("serialization error: {}", e));
                    println!("{}", pretty);
                }
                OutputFormat::Text => {
                    for d in sink.messages() {
                        eprintln!(
                            "{}:{}:{}: {:?}: {}",
                            d.file, d.line, d.column, d.severity, d.message
                        );
                    }
                    if !quiet {
                        println!(
                            "{} elements, {} stations, {} sections, {} diagnostics",
                            route.elements.len(),
                            route.stations.len(),
                            route.sections.len(),
                            sink.messages().len()
                        );
                    }
                }
            }
            if errors > 0 {
                process::exit(2);
            }
        }
        Err(e) => {
            report_error(&e.to_string(), output, quiet);
            process::exit(1);
        }
    }
}

fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{{\"error\": \"{}\"}}", msg.replace('"', "\\\""));
        }
    }
}
