//! The `jlc` compiler driver. Takes a Javalette source file, runs it
//! through [`jlc::compile_str`], and writes the requested backend's text
//! output to a file.
//!
//! run with `--help` for more info.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use jlc::config::DataDir;
use jlc::front::error::CompileError;
use jlc::{BackendKind, OptLevel};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// the input file
    file: PathBuf,

    /// the backend to generate code for
    #[arg(value_enum, short, long, default_value_t = Backend::I386)]
    backend: Backend,

    /// generate 32-bit x86 for a Pentium Pro or later (enables `fcomi`)
    #[arg(long)]
    pentium_pro: bool,

    /// optimization level
    #[arg(value_enum, short = 'O', long = "optimize", default_value_t = Opt::O1)]
    optimize: Opt,

    /// where to write the generated text (defaults to the input path with
    /// its extension replaced)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// the runtime/peephole-rules data directory (overrides `JL_DATA_DIR`)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// stop after assembling; do not link (like `cc -c`)
    #[arg(short = 'c', long = "no-link")]
    no_link: bool,

    /// stop after generating code; do not assemble
    #[arg(long = "no-assemble")]
    no_assemble: bool,

    /// keep intermediate files around (accepted for compatibility; this
    /// crate's pipeline never invokes an external assembler/linker, so
    /// there are no intermediates to preserve beyond the output itself)
    #[arg(short, long)]
    preserve_files: bool,

    /// assemble the generated code (accepted for compatibility; a no-op,
    /// since invoking an external assembler is out of scope)
    #[arg(long)]
    assemble: bool,

    /// link the assembled code (accepted for compatibility; a no-op, for
    /// the same reason as `--assemble`)
    #[arg(long)]
    link: bool,

    /// skip code generation; stop after lowering to quadruples
    #[arg(long)]
    no_gencode: bool,

    /// print the quadruple IR instead of the selected backend's output
    #[arg(long)]
    icode: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    Quadr,
    I386,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Opt {
    None,
    O1,
    O2,
}

impl From<Opt> for OptLevel {
    fn from(o: Opt) -> Self {
        match o {
            Opt::None => OptLevel::O0,
            Opt::O1 => OptLevel::O1,
            Opt::O2 => OptLevel::O2,
        }
    }
}

fn default_output_path(input: &std::path::Path, backend: Backend) -> PathBuf {
    let ext = match backend {
        Backend::Quadr => "quadr",
        Backend::I386 => "asm",
    };
    input.with_extension(ext)
}

/// Exit codes per spec.md §6/§7: 0 success, 1 usage/source error, 2 I/O
/// error, any other nonzero value a fatal internal bug.
fn exit_code_for(e: &CompileError) -> u8 {
    match e {
        CompileError::Usage(_) | CompileError::Source(_) => 1,
        CompileError::Io { .. } => 2,
        CompileError::Internal(_) => 70,
    }
}

fn run(args: Args) -> Result<(), CompileError> {
    let data_dir = DataDir::resolve(args.data_dir.as_deref().and_then(|p| p.to_str()));
    tracing::info!(root = %data_dir.root().display(), "resolved data directory");

    let source = std::fs::read_to_string(&args.file).map_err(|source| CompileError::Io {
        path: args.file.display().to_string(),
        source,
    })?;

    let opt: OptLevel = args.optimize.into();
    let backend_kind = match args.backend {
        Backend::Quadr => BackendKind::Quadr,
        Backend::I386 => BackendKind::I386 { pentium_pro: args.pentium_pro },
    };

    let output = if args.icode {
        jlc::compile_str(&source, opt, BackendKind::Quadr)?
    } else {
        jlc::compile_str(&source, opt, backend_kind)?
    };

    // spec.md §7/B2: a warning doesn't stop compilation, but the user
    // still needs to see it.
    for w in &output.warnings {
        eprintln!("{w}");
        tracing::warn!("{w}");
    }

    if args.no_gencode {
        tracing::info!("--no-gencode given, stopping before writing output");
        return Ok(());
    }

    let out_path = args.output.clone().unwrap_or_else(|| default_output_path(&args.file, args.backend));
    std::fs::write(&out_path, output.text).map_err(|source| CompileError::Io {
        path: out_path.display().to_string(),
        source,
    })?;
    tracing::info!(path = %out_path.display(), "wrote output");

    if args.assemble || args.link || !args.no_assemble {
        tracing::info!("invocation of an external assembler/linker is out of scope for this crate; skipping");
    }

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("{e}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}
