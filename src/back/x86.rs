//! The target x86 backend (spec.md §4.9): 32-bit x86, NASM syntax.
//! Grounded throughout in `examples/original_source/src/i386_backend.c`,
//! simplified where the original's string-table/manual-memory plumbing
//! is only there to work around the absence of an owned `String`.

use crate::back::backend::{default_place_params, Backend, RegKind};
use crate::back::tracker::{Loc, Tracker};
use crate::back::outbuf::OutBuf;
use crate::common::*;
use crate::middle::ir::{Function, Op, Operand, Quadr, VarKind};

const REG_EAX: u32 = 0;
const REG_EBX: u32 = 1;
const REG_ECX: u32 = 2;
const REG_EDX: u32 = 3;
const REG_EDI: u32 = 4;
const REG_ESI: u32 = 5;

fn reg32_str(r: u32) -> &'static str {
    match r {
        REG_EAX => "eax",
        REG_EBX => "ebx",
        REG_ECX => "ecx",
        REG_EDX => "edx",
        REG_EDI => "edi",
        REG_ESI => "esi",
        other => unreachable!("reg32_str: no such register {other}"),
    }
}

fn size_str(size: u32) -> &'static str {
    match size {
        1 => "byte",
        4 => "dword",
        8 => "qword",
        other => unreachable!("size_str: unsupported operand size {other}"),
    }
}

/// Target x86 (32-bit, NASM syntax), grounded in
/// `examples/original_source/src/i386_backend.c`.
pub struct X86Backend {
    out: String,
    buf: OutBuf,
    pentium_pro: bool,
    args_in_reg_num: usize,
    cur_func_name: String,
    fpu_initialised: bool,
    double_consts: Vec<f64>,
    str_const_num: u32,
}

impl X86Backend {
    pub fn new(pentium_pro: bool, args_in_reg_num: usize) -> Self {
        X86Backend {
            out: String::new(),
            buf: OutBuf::new(),
            pentium_pro,
            args_in_reg_num,
            cur_func_name: String::new(),
            fpu_initialised: false,
            double_consts: vec![],
            str_const_num: 0,
        }
    }

    fn loc_str(&mut self, loc: Loc, size: u32) -> String {
        match loc {
            Loc::Register(r) => reg32_str(r).to_string(),
            Loc::FpuRegister(r) => format!("st{r}"),
            Loc::Stack(off) => format!("{} [@FP@{off}@]", size_str(size)),
            Loc::Int(v) => v.to_string(),
            Loc::Double(d) => {
                let v = d.to_f64();
                let idx = match self.double_consts.iter().position(|&c| c == v) {
                    Some(i) => i,
                    None => {
                        self.double_consts.push(v);
                        self.double_consts.len() - 1
                    }
                };
                format!("qword [__dconst_{}_{idx}]", self.cur_func_name)
            }
        }
    }

    fn size_of(func: &Function, v: VarId) -> u32 {
        func.var(v).size
    }

    fn jmp_str(op: Op, unsigned: bool) -> &'static str {
        match (op, unsigned) {
            (Op::IfEq, _) => "je",
            (Op::IfNe, _) => "jne",
            (Op::IfLt, false) => "jl",
            (Op::IfLt, true) => "jb",
            (Op::IfGt, false) => "jg",
            (Op::IfGt, true) => "ja",
            (Op::IfLe, false) => "jle",
            (Op::IfLe, true) => "jbe",
            (Op::IfGe, false) => "jge",
            (Op::IfGe, true) => "jae",
            _ => unreachable!("jmp_str called on a non-IF opcode"),
        }
    }

    fn fpu_unsigned_jmp_str(op: Op) -> &'static str {
        // x87 comparisons set flags the wrong way round for the signed
        // jump mnemonics; see gen_fpu_cmp in the grounding file.
        match op {
            Op::IfEq => "je",
            Op::IfNe => "jne",
            Op::IfLt => "ja",
            Op::IfGt => "jb",
            Op::IfLe => "jae",
            Op::IfGe => "jbe",
            _ => unreachable!("fpu_unsigned_jmp_str called on a non-IF opcode"),
        }
    }

    fn int_binop(&mut self, func: &Function, q: &Quadr, tracker: &mut Tracker) {
        let Operand::Var(dst) = q.result else { unreachable!() };
        let size = Self::size_of(func, dst);
        let loc1 = self.operand_loc(func, q.arg1, tracker);
        let loc2 = self.operand_loc(func, q.arg2, tracker);
        // The result lands wherever `arg1` already lives when possible,
        // mirroring `write_reg32_op_2`'s in-place accumulation.
        let dest_loc = match loc1 {
            Loc::Register(_) => loc1,
            _ => alloc_dest_reg(tracker, func, RegKind::Gpr, self),
        };
        if dest_loc != loc1 {
            let s1 = self.loc_str(loc1, size);
            let sd = self.loc_str(dest_loc, size);
            self.buf.writeln(format!("mov {sd}, {s1}"));
        }
        let mnem = match q.op {
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "imul",
            _ => unreachable!(),
        };
        let sd = self.loc_str(dest_loc, size);
        let s2 = self.loc_str(loc2, size);
        self.buf.writeln(format!("{mnem} {sd}, {s2}"));
        tracker.update_var_loc(dst, dest_loc);
    }

    fn last_reg_loc(&self, tracker: &Tracker, v: VarId) -> Loc {
        tracker.locs_of(v).into_iter().find(|l| matches!(l, Loc::Register(_))).expect("variable should hold a register location")
    }

    fn operand_loc(&mut self, func: &Function, op: Operand, tracker: &mut Tracker) -> Loc {
        match op {
            Operand::Var(v) => {
                let nearest = 0;
                tracker.save_var(v, func, nearest, self);
                tracker.locs_of(v).first().copied().expect("operand variable has no location")
            }
            Operand::Int(i) => Loc::Int(i),
            Operand::Double(d) => Loc::Double(FloatBits::from_f64(d)),
            _ => unreachable!("operand_loc: not a value operand"),
        }
    }

    /// Integer divide/mod (spec.md §4.9): power-of-two shift/mask special
    /// case and negative-constant negation case, falling back to a two-
    /// register `idiv`. Grounded in `gen_div_mod_32`.
    fn gen_div_mod(&mut self, func: &Function, q: &Quadr, tracker: &mut Tracker) {
        let Operand::Var(dst) = q.result else { unreachable!() };
        let Operand::Var(v1) = q.arg1 else { unreachable!("dividend must be a variable") };
        let size = Self::size_of(func, dst);

        if let Operand::Int(divisor) = q.arg2 {
            if let Some(shift) = power_of_two(divisor.unsigned_abs()) {
                tracker.move_to_reg(v1, func, 0, self);
                let loc = self.last_reg_loc(tracker, v1);
                let s = self.loc_str(loc, size);
                match q.op {
                    Op::Div => {
                        if shift > 0 {
                            self.buf.writeln(format!("sar {s}, {shift}"));
                        }
                        if divisor < 0 {
                            self.buf.writeln(format!("neg {s}"));
                        }
                    }
                    Op::Mod => {
                        self.buf.writeln(format!("and {s}, {}", (1i64 << shift) - 1));
                    }
                    _ => unreachable!(),
                }
                tracker.update_var_loc(dst, loc);
                return;
            }
        }

        tracker.save_var_to_loc(v1, Loc::Register(REG_EAX), func, self);
        let loc2 = self.operand_loc(func, q.arg2, tracker);
        tracker.deny_reg(RegKind::Gpr, REG_EAX);
        tracker.deny_reg(RegKind::Gpr, REG_EDX);
        self.buf.writeln("xor edx, edx");
        self.buf.writeln("test eax, eax");
        self.buf.writeln("sets dl");
        self.buf.writeln("neg edx");
        if let Loc::Int(_) = loc2 {
            let s = self.loc_str(loc2, size);
            self.buf.writeln(format!("mov ebp, {s}"));
            self.buf.writeln("idiv ebp");
        } else {
            let s = self.loc_str(loc2, size);
            self.buf.writeln(format!("idiv {s}"));
        }
        tracker.allow_reg(RegKind::Gpr, REG_EAX);
        tracker.allow_reg(RegKind::Gpr, REG_EDX);
        let result_reg = if q.op == Op::Div { REG_EAX } else { REG_EDX };
        tracker.update_var_loc(dst, Loc::Register(result_reg));
    }

    fn gen_branch(&mut self, func: &Function, q: &Quadr, tracker: &mut Tracker) {
        let Operand::Label(target) = q.result else { unreachable!() };
        let label = format!("b{}", target.0);
        let is_fp = matches!(q.arg1, Operand::Var(v) if func.var(v).kind.is_fp()) || matches!(q.arg2, Operand::Var(v) if func.var(v).kind.is_fp());
        if is_fp {
            self.gen_fpu_cmp(func, q, &label, tracker);
        } else {
            let mut loc1 = self.operand_loc(func, q.arg1, tracker);
            if !matches!(loc1, Loc::Register(_)) {
                if let Operand::Var(v1) = q.arg1 {
                    tracker.move_to_reg(v1, func, 0, self);
                    loc1 = self.last_reg_loc(tracker, v1);
                }
            }
            let loc2 = self.operand_loc(func, q.arg2, tracker);
            let size = if let Operand::Var(v) = q.arg1 { func.var(v).size } else { 4 };
            let s1 = self.loc_str(loc1, size);
            let s2 = self.loc_str(loc2, size);
            self.buf.writeln(format!("cmp {s1}, {s2}"));
            self.buf.writeln(format!("{} {label}", Self::jmp_str(q.op, false)));
        }
    }

    fn gen_fpu_cmp(&mut self, func: &Function, q: &Quadr, label: &str, tracker: &mut Tracker) {
        let Operand::Var(v1) = q.arg1 else { unreachable!("fpu compare's left operand must be a variable") };
        tracker.fpu_load(v1, func, self);
        let loc2 = self.operand_loc(func, q.arg2, tracker);
        let size = Self::size_of(func, v1).max(8);
        let s2 = self.loc_str(loc2, size);
        if self.pentium_pro {
            self.buf.writeln(format!("fcomi {s2}"));
        } else {
            self.buf.writeln(format!("fcom {s2}"));
            self.buf.writeln("fstsw ax");
            self.buf.writeln("fwait");
            self.buf.writeln("sahf");
        }
        tracker.fpu_pop(self);
        self.buf.writeln(format!("{} {label}", Self::fpu_unsigned_jmp_str(q.op)));
    }
}

fn power_of_two(v: u64) -> Option<u32> {
    if v == 0 || (v & (v - 1)) != 0 {
        None
    } else {
        Some(v.trailing_zeros())
    }
}

/// Allocates a register for a freshly-defined variable with no prior
/// location — unlike `Tracker::move_to_reg`, which moves an *existing*
/// value, there is nothing to `gen_mov` from here.
fn alloc_dest_reg(tracker: &mut Tracker, func: &Function, kind: RegKind, backend: &mut dyn Backend) -> Loc {
    let r = tracker.alloc_reg(kind, func, &[], &|_| 0, backend);
    match kind {
        RegKind::Gpr => Loc::Register(r),
        RegKind::Fpu => Loc::FpuRegister(r),
    }
}

impl Backend for X86Backend {
    fn init(&mut self) {
        self.out.clear();
        self.buf.clear();
    }

    fn finish(&mut self) -> String {
        std::mem::take(&mut self.out)
    }

    fn start_func(&mut self, func: &Function) {
        self.buf.clear();
        self.buf.writeln("section .text");
        self.buf.writeln(format!("{}:", func.name));
        self.buf.writeln("@P@");
        self.cur_func_name = func.name.to_string();
        self.fpu_initialised = false;
        self.double_consts.clear();
    }

    fn place_params(&self, func: &Function, args_in_reg: usize) -> Vec<Loc> {
        default_place_params(func, args_in_reg.min(self.args_in_reg_num))
    }

    fn end_func(&mut self, func: &Function, stack_size: u32) {
        let ends_in_return = func.blocks.last().and_then(|b| b.terminator()).map(|t| t.op == Op::Return).unwrap_or(false);
        if !ends_in_return {
            self.buf.writeln("@E@");
            self.buf.writeln(format!("ret {}", func.param_count as u32 * 4));
        }
        let (prologue, epilogue) = if stack_size > 0 {
            (format!("sub esp, {stack_size}"), format!("add esp, {stack_size}"))
        } else {
            (String::new(), String::new())
        };
        self.buf.fix_stack(stack_size, &prologue, &epilogue, &|offset, stack_size| format!("esp + {}", offset + stack_size as i32));
        self.buf.writeln("section .data");
        for (i, v) in self.double_consts.clone().into_iter().enumerate() {
            self.buf.writeln(format!("__dconst_{}_{i} dq {v}", self.cur_func_name));
        }
        self.buf.flush_into(&mut self.out);
    }

    fn gen_code(&mut self, func: &Function, q: &Quadr, tracker: &mut Tracker) {
        match q.op {
            Op::Add | Op::Sub | Op::Mul => self.int_binop(func, q, tracker),
            Op::Div | Op::Mod => {
                if matches!(func.var(match q.result { Operand::Var(v) => v, _ => unreachable!() }).kind, VarKind::Double) {
                    self.gen_fpu_arith(func, q, tracker);
                } else {
                    self.gen_div_mod(func, q, tracker);
                }
            }
            Op::GetAddr => {
                let Operand::Var(dst) = q.result else { unreachable!() };
                let size = Self::size_of(func, dst);
                let base = self.operand_loc(func, q.arg1, tracker);
                let idx = self.operand_loc(func, q.arg2, tracker);
                let dloc = alloc_dest_reg(tracker, func, RegKind::Gpr, self);
                let sb = self.loc_str(base, 4);
                let si = self.loc_str(idx, 4);
                let sd = self.loc_str(dloc, size);
                self.buf.writeln(format!("mov {sd}, {sb}"));
                self.buf.writeln(format!("lea {sd}, [{sd} + {si} * {size}]"));
                tracker.update_var_loc(dst, dloc);
            }
            Op::ReadPtr => {
                let Operand::Var(dst) = q.result else { unreachable!() };
                let size = Self::size_of(func, dst);
                let base = self.operand_loc(func, q.arg1, tracker);
                let dloc = alloc_dest_reg(tracker, func, RegKind::Gpr, self);
                let sb = self.loc_str(base, 4);
                let sd = self.loc_str(dloc, size);
                self.buf.writeln(format!("mov {sd}, [{sb}]"));
                tracker.update_var_loc(dst, dloc);
            }
            Op::WritePtr => {
                let Operand::Var(base) = q.result else { unreachable!() };
                let base_loc = self.operand_loc(func, Operand::Var(base), tracker);
                let value = self.operand_loc(func, q.arg2, tracker);
                let size = if let Operand::Var(v) = q.arg2 { Self::size_of(func, v) } else { 4 };
                let sb = self.loc_str(base_loc, 4);
                let sv = self.loc_str(value, size);
                self.buf.writeln(format!("mov [{sb}], {sv}"));
            }
            Op::Return => {
                if let Operand::Var(v) = q.arg1 {
                    if func.var(v).kind.is_fp() {
                        // x87 cdecl: a double result is left on the FPU
                        // stack top for the caller to pick up.
                        tracker.fpu_load(v, func, self);
                    } else {
                        tracker.save_var_to_loc(v, Loc::Register(REG_EAX), func, self);
                    }
                }
                self.buf.writeln("@E@");
                self.buf.writeln(format!("ret {}", func.param_count as u32 * 4));
            }
            Op::Goto => {
                let Operand::Label(target) = q.result else { unreachable!() };
                self.buf.writeln(format!("jmp b{}", target.0));
            }
            Op::IfEq | Op::IfNe | Op::IfLt | Op::IfGt | Op::IfLe | Op::IfGe => self.gen_branch(func, q, tracker),
            Op::Copy | Op::Param | Op::Call => unreachable!("gen_code must not be called for Copy/Param/Call"),
        }
    }

    fn gen_call(&mut self, func: &Function, callee: &Function, args: &[VarId], retvar: Option<VarId>, tracker: &mut Tracker) {
        // cdecl: push right-to-left, caller cleans up.
        for &a in args.iter().rev() {
            if func.var(a).kind.is_fp() {
                tracker.fpu_load(a, func, self);
                self.buf.writeln("sub esp, 8");
                self.buf.writeln("fstp qword [esp]");
                tracker.fpu_pop(self);
            } else {
                let loc = self.operand_loc(func, Operand::Var(a), tracker);
                let s = self.loc_str(loc, 4);
                self.buf.writeln(format!("push {s}"));
            }
        }
        // EAX/ECX/EDX are caller-saved; anything resident only there must
        // be parked elsewhere before the call clobbers them.
        tracker.flush_loc(Loc::Register(REG_EAX), func, self);
        tracker.flush_loc(Loc::Register(REG_ECX), func, self);
        tracker.flush_loc(Loc::Register(REG_EDX), func, self);
        self.buf.writeln(format!("call {}", callee.name));
        let total_args_size: u32 = args.iter().map(|&a| if func.var(a).kind.is_fp() { 8 } else { 4 }).sum();
        if total_args_size > 0 {
            self.buf.writeln(format!("add esp, {total_args_size}"));
        }
        if let Some(r) = retvar {
            if func.var(r).kind.is_fp() {
                // The callee left its result on the FPU stack top; the
                // tracker's own FPU bookkeeping starts fresh per function.
                self.fpu_initialised = true;
                tracker.update_var_loc(r, Loc::FpuRegister(0));
            } else {
                tracker.update_var_loc(r, Loc::Register(REG_EAX));
            }
        }
    }

    fn gen_print_string(&mut self, s: &str) {
        self.buf.writeln("section .data");
        self.buf.writeln(format!("__str_const{} db '{s}',10,0", self.str_const_num));
        self.buf.writeln("section .text");
        self.buf.writeln(format!("push __str_const{}", self.str_const_num));
        self.buf.writeln("call printString");
        self.buf.writeln("add esp, 4");
        self.str_const_num += 1;
    }

    fn gen_mov(&mut self, _func: &Function, dest: Loc, src: Loc) {
        let size = match dest {
            Loc::FpuRegister(_) => 8,
            _ => 4,
        };
        if let Loc::FpuRegister(_) = dest {
            return; // FPU moves go through gen_fpu_load/store, never gen_mov.
        }
        let sd = self.loc_str(dest, size);
        let ss = self.loc_str(src, size);
        self.buf.writeln(format!("mov {sd}, {ss}"));
    }

    fn gen_swap(&mut self, l1: Loc, l2: Loc) {
        let s1 = self.loc_str(l1, 4);
        let s2 = self.loc_str(l2, 4);
        self.buf.writeln(format!("xchg {s1}, {s2}"));
    }

    fn gen_label(&mut self, name: &str) {
        self.buf.writeln(format!("{name}:"));
    }

    fn find_best_src_loc(&self, var: VarId, tracker: &Tracker) -> Option<Loc> {
        let locs = tracker.locs_of(var);
        locs.iter().find(|l| l.is_reg()).copied().or_else(|| locs.first().copied())
    }

    fn find_best_dest_loc(&self, var: VarId, tracker: &Tracker) -> Option<Loc> {
        self.find_best_src_loc(var, tracker)
    }

    fn fpu_reg_free(&mut self, _fpu_reg: u32) {}

    fn gen_fpu_load(&mut self, _func: &Function, _var: VarId, src: Loc) {
        if !self.fpu_initialised {
            self.buf.writeln("finit");
            self.fpu_initialised = true;
        }
        let s = self.loc_str(src, 8);
        self.buf.writeln(format!("fld {s}"));
    }

    fn gen_fpu_store(&mut self, loc: Loc) {
        let s = self.loc_str(loc, 8);
        self.buf.writeln(format!("fst {s}"));
    }

    fn gen_fpu_pop(&mut self, was_free: bool) {
        if !was_free {
            self.buf.writeln("fstp st0");
        } else {
            self.buf.writeln("ffree st0");
        }
    }

    fn fpu_stack(&self) -> bool {
        true
    }

    fn fast_swap(&self) -> bool {
        true
    }

    fn int_size(&self) -> u32 {
        4
    }

    fn double_size(&self) -> u32 {
        8
    }

    fn ptr_size(&self) -> u32 {
        4
    }

    fn sp_size(&self) -> u32 {
        4
    }

    fn reg_num(&self) -> u32 {
        6
    }

    fn fpu_reg_num(&self) -> u32 {
        8
    }
}

impl X86Backend {
    /// Double arithmetic: both operands flow onto the x87 stack.
    fn gen_fpu_arith(&mut self, func: &Function, q: &Quadr, tracker: &mut Tracker) {
        let Operand::Var(dst) = q.result else { unreachable!() };
        let Operand::Var(v1) = q.arg1 else { unreachable!("fpu arithmetic's left operand must be a variable") };
        tracker.fpu_load(v1, func, self);
        let loc2 = self.operand_loc(func, q.arg2, tracker);
        let size = Self::size_of(func, dst).max(8);
        let s2 = self.loc_str(loc2, size);
        let mnem = match q.op {
            Op::Add => "fadd",
            Op::Sub => "fsub",
            Op::Mul => "fmul",
            Op::Div => "fdiv",
            Op::Mod => unreachable!("modulo is not defined for doubles"),
            _ => unreachable!(),
        };
        self.buf.writeln(format!("{mnem} {s2}"));
        tracker.update_var_loc(dst, Loc::FpuRegister(0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::check::check;
    use crate::front::parse::parse;
    use crate::middle::build::lower;
    use crate::middle::cfg::build_successors;
    use crate::middle::liveness::analyze;

    fn generate(src: &str, pentium_pro: bool) -> String {
        let prog = parse(src).unwrap();
        let checked = check(&prog).unwrap();
        let mut program = lower(&checked);
        for f in program.funcs.iter_mut() {
            build_successors(f);
            analyze(f);
        }
        crate::back::driver::gen_program(&mut program, &mut X86Backend::new(pentium_pro, 0), crate::OptLevel::O0)
    }

    #[test]
    fn division_by_a_power_of_two_constant_uses_a_shift() {
        let text = generate("int main(){ int x = 8; return x / 4; }", false);
        assert!(text.lines().any(|l| l.contains("sar")));
        assert!(!text.lines().any(|l| l.contains("idiv")));
    }

    #[test]
    fn division_by_a_non_power_of_two_uses_idiv() {
        let text = generate("int main(){ int x = 8; int y = 3; return x / y; }", false);
        assert!(text.lines().any(|l| l.contains("idiv")));
    }

    #[test]
    fn fpu_comparisons_use_fcomi_only_on_pentium_pro() {
        let src = "int main(){ double x = 1.0; double y = 2.0; if (x < y) { return 1; } return 0; }";
        assert!(generate(src, true).lines().any(|l| l.contains("fcomi")));
        assert!(!generate(src, false).lines().any(|l| l.contains("fcomi")));
    }

    #[test]
    fn a_function_call_cleans_up_its_own_arguments() {
        let text = generate("void f(int a, int b){ } int main(){ f(1, 2); return 0; }", false);
        assert!(text.lines().any(|l| l.contains("add esp, 8")));
    }
}
