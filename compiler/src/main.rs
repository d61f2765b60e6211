use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use ugg::codegen::CodegenOptions;
use ugg::diag::{line_col, Diagnostic};
use ugg::pass::PassId;
use ugg::pipeline::{compile_source, CompilationState, CompiledUnit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EmitStage {
    /// `<unit>.h`, `<unit>.cpp` and `<unit>.variants.json` per unit
    Cpp,
    /// Variant lookup tables as JSON on stdout
    Variants,
    /// Rate-annotated variant schedules on stdout
    Schedule,
    /// Graphviz DOT of every variant on stdout
    Dot,
    /// Source hash, compiler version and variant keys as JSON
    BuildInfo,
    /// Parsed AST on stdout
    Ast,
}

impl EmitStage {
    fn terminal(self) -> PassId {
        match self {
            EmitStage::Cpp | EmitStage::Variants => PassId::Emit,
            EmitStage::Schedule | EmitStage::Dot => PassId::Rewrite,
            EmitStage::BuildInfo | EmitStage::Ast => PassId::Enumerate,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "ugg",
    version,
    about = "Unit generator generator: compiles .ugg unit definitions to rate-specialised C++"
)]
struct Cli {
    /// Input .ugg source file
    source: PathBuf,

    /// Output directory for generated files
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Cpp)]
    emit: EmitStage,

    /// Only emit this unit (repeatable)
    #[arg(long = "unit")]
    units: Vec<String>,

    /// Log compiler passes and timing (overridden by RUST_LOG)
    #[arg(long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn report(path: &Path, source: &str, diag: &Diagnostic) {
    let (line, col) = line_col(source, diag.span.start);
    eprintln!("ugg: {}:{}:{}: {}", path.display(), line, col, diag);
    for related in &diag.related_spans {
        let (line, col) = line_col(source, related.span.start);
        eprintln!("  note: {}:{}:{}: {}", path.display(), line, col, related.label);
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), ExitCode> {
    std::fs::write(path, contents).map_err(|e| {
        eprintln!("ugg: error: {}: {}", path.display(), e);
        ExitCode::from(2)
    })?;
    tracing::info!(path = %path.display(), bytes = contents.len(), "wrote file");
    Ok(())
}

fn emit(cli: &Cli, state: &CompilationState, units: &[&CompiledUnit]) -> Result<(), ExitCode> {
    match cli.emit {
        EmitStage::Cpp => {
            std::fs::create_dir_all(&cli.output).map_err(|e| {
                eprintln!("ugg: error: {}: {}", cli.output.display(), e);
                ExitCode::from(2)
            })?;
            for unit in units {
                let Some(art) = &unit.artifacts else { continue };
                let json = art.table.to_json().map_err(|e| {
                    eprintln!("ugg: error: {}: {}", unit.name, e);
                    ExitCode::from(1)
                })?;
                let stem = cli.output.join(&art.file_stem);
                write_file(&stem.with_extension("h"), &art.header)?;
                write_file(&stem.with_extension("cpp"), &art.source)?;
                write_file(&stem.with_extension("variants.json"), &json)?;
            }
        }
        EmitStage::Variants => {
            for unit in units {
                if let Some(art) = &unit.artifacts {
                    match art.table.to_json() {
                        Ok(json) => print!("{json}"),
                        Err(e) => {
                            eprintln!("ugg: error: {}: {}", unit.name, e);
                            return Err(ExitCode::from(1));
                        }
                    }
                }
            }
        }
        EmitStage::Schedule => {
            for unit in units {
                for variant in &unit.variants {
                    println!("{variant}");
                }
            }
        }
        EmitStage::Dot => {
            for unit in units {
                print!("{}", ugg::dot::emit_dot(&unit.name, &unit.variants));
            }
        }
        EmitStage::BuildInfo => {
            let Some(provenance) = &state.provenance else {
                return Ok(());
            };
            let owned: Vec<CompiledUnit> = units.iter().map(|u| (*u).clone()).collect();
            match provenance.to_json(&owned) {
                Ok(json) => print!("{json}"),
                Err(e) => {
                    eprintln!("ugg: error: {e}");
                    return Err(ExitCode::from(1));
                }
            }
        }
        EmitStage::Ast => {
            if let Some(program) = &state.program {
                println!("{program:#?}");
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    tracing::debug!(source = %cli.source.display(), emit = ?cli.emit, "starting");

    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("ugg: error: {}: {}", cli.source.display(), e);
            return ExitCode::from(2);
        }
    };

    let options = CodegenOptions {
        source_hash: Some(ugg::pipeline::compute_provenance(&source).source_hash_hex()),
    };
    let state = compile_source(&source, cli.emit.terminal(), &options);
    for diag in &state.diagnostics {
        report(&cli.source, &source, diag);
    }

    for name in &cli.units {
        let declared = state
            .program
            .as_ref()
            .is_some_and(|p| p.units.iter().any(|u| &u.name.name == name));
        if !declared && state.program.is_some() {
            eprintln!("ugg: error: no unit named '{name}'");
            return ExitCode::from(1);
        }
    }
    let selected: Vec<&CompiledUnit> = state
        .units
        .iter()
        .filter(|u| cli.units.is_empty() || cli.units.contains(&u.name))
        .collect();

    if let Err(code) = emit(&cli, &state, &selected) {
        return code;
    }
    if state.has_error {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}
