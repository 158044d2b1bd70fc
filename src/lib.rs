//! `jlc` — the code-generation core of a small Javalette compiler.
//!
//! The crate is organized bottom-up: [`common`] holds shared identifier and
//! collection types, [`front`] turns source text into a validated AST,
//! [`middle`] lowers the AST into a control-flow graph of quadruples and
//! optimizes it locally and globally, and [`back`] drives code generation
//! against a target backend (either the portable `quadr` text dump or the
//! x86 NASM backend), including the location tracker and the peephole pass.

pub mod common;
pub mod config;
pub mod front;
pub mod middle;
pub mod back;

use front::error::{CompileError, SourceWarning};

/// Optimization level requested on the command line (spec.md §6, `-O`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OptLevel {
    /// `-O0` / `-O none`: no optimization at all.
    O0,
    /// `-O1`: local (per-block) optimization plus peephole.
    O1,
    /// `-O2`: `-O1` plus global (cross-block) optimization and more
    /// register-passed arguments.
    O2,
}

impl OptLevel {
    pub fn local(self) -> bool {
        !matches!(self, OptLevel::O0)
    }

    pub fn global(self) -> bool {
        matches!(self, OptLevel::O2)
    }

    pub fn peephole(self) -> bool {
        !matches!(self, OptLevel::O0)
    }

    pub fn args_in_reg_num(self) -> usize {
        if matches!(self, OptLevel::O2) {
            4
        } else {
            0
        }
    }
}

/// Which backend to generate code for (spec.md §6, `-b`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BackendKind {
    /// The portable three-address text dump.
    Quadr,
    /// 32-bit x86, NASM syntax.
    I386 { pentium_pro: bool },
}

/// The generated text plus any non-fatal diagnostics collected along the
/// way (spec.md §7 `SourceWarning`, boundary behavior B2: "a warning is
/// emitted" but compilation still proceeds to output).
pub struct CompileOutput {
    pub text: String,
    pub warnings: Vec<SourceWarning>,
}

/// Compiles Javalette source text all the way to the requested backend's
/// text output, running front-end checks, IR construction, the requested
/// optimization passes, and code generation in sequence.
///
/// This is the crate's single public entry point, exercised directly by
/// the CLI binary and by the integration tests under `tests/`.
pub fn compile_str(
    source: &str,
    opt: OptLevel,
    backend: BackendKind,
) -> Result<CompileOutput, CompileError> {
    let ast = front::parse::parse(source).map_err(CompileError::from)?;
    let checked = front::check::check(&ast).map_err(CompileError::Source)?;
    let warnings = checked.warnings.clone();

    let mut program = middle::build::lower(&checked);
    for func in program.funcs.iter_mut() {
        middle::cfg::build_successors(func);
        if opt.local() {
            middle::localopt::optimize_function(func);
        }
        middle::cfg::build_successors(func);
        middle::liveness::analyze(func);
    }

    let text = match backend {
        BackendKind::Quadr => {
            let mut be = back::quadr::QuadrBackend::new();
            back::driver::gen_program(&mut program, &mut be, opt)
        }
        BackendKind::I386 { pentium_pro } => {
            let mut be = back::x86::X86Backend::new(pentium_pro, opt.args_in_reg_num());
            let mut text = back::driver::gen_program(&mut program, &mut be, opt);
            if opt.peephole() {
                text = back::peephole::default_rules().apply(&text);
            }
            text
        }
    };

    Ok(CompileOutput { text, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_str_surfaces_checker_warnings() {
        let out = compile_str("int main(){ int a[3]; a[5]=1; return 0; }", OptLevel::O0, BackendKind::Quadr).unwrap();
        assert!(!out.warnings.is_empty(), "out-of-range constant index should produce a warning");
    }
}
