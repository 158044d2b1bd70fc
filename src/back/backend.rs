//! The target backend contract (spec.md §4.8): "a backend is a record of
//! function pointers plus capability fields." In Rust that record becomes
//! a trait, following design note §9 ("Backend as a capability set ...
//! implement as an abstract interface with two concrete variants"),
//! grounded in `examples/original_source/gencode.h`'s `backend_t`.
//!
//! Contract requirements:
//!   (C1) a variable no longer live after the current quadruple is
//!        discarded - enforced by `back::driver`, not by each backend.
//!   (C2) a block ending in a branch must call `Tracker::save_live`
//!        before the branch is emitted.
//!   (C3) while lowering a quadruple, variable operands must be treated
//!        as live, with liveness restored on exit.
//!   (C4) `gen_mov`, `gen_swap`, and the `gen_fpu_*` primitives must not
//!        touch the tracker's bookkeeping; the tracker is driving them.
//!
//! `gen_code` and `gen_call` *are* given the tracker (mirroring
//! `gencode.h`, where a backend's function pointers may call back into
//! its public, non-static API) because some instructions have operands
//! pinned to specific physical registers - integer divide, most notably
//! - which only the backend knows about.

use crate::back::tracker::{Loc, Tracker};
use crate::common::VarId;
use crate::middle::ir::{Function, Quadr};

/// Shared cdecl-style parameter placement (spec.md §6 `-O2`, `-i386`
/// calling convention): up to `args_in_reg` leading integer parameters in
/// registers 0.., the rest on the stack above the return address and
/// saved frame pointer, doubles always on the stack. Both backends use
/// this; the x86 backend additionally has to respect it at the call site.
pub fn default_place_params(func: &Function, args_in_reg: usize) -> Vec<Loc> {
    let mut offset = 8i32;
    let mut reg_idx = 0u32;
    let mut locs = Vec::with_capacity(func.param_count);
    for i in 0..func.param_count {
        let v = func.var(VarId(i as u32));
        if !v.kind.is_fp() && (reg_idx as usize) < args_in_reg {
            locs.push(Loc::Register(reg_idx));
            reg_idx += 1;
        } else {
            let size = if v.kind.is_fp() { 8 } else { 4 };
            locs.push(Loc::Stack(offset));
            offset += size;
        }
    }
    locs
}

/// General-purpose vs. FPU register, used by the allocators and by
/// `find_best_*_loc` to pick the matching kind for a variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegKind {
    Gpr,
    Fpu,
}

pub trait Backend {
    /// Clears output state, in preparation for a new compilation unit.
    fn init(&mut self);
    /// Flushes any remaining buffered output and returns it.
    fn finish(&mut self) -> String;

    /// Initializes parameter locations and emits the function prologue.
    fn start_func(&mut self, func: &Function);
    /// The calling-convention location of each of `func`'s parameters, in
    /// order, given at most `args_in_reg` leading integer parameters may
    /// be passed in registers (spec.md §6 `-O2`). The driver registers
    /// these with the tracker as permanent locations; backends never see
    /// the tracker directly.
    fn place_params(&self, func: &Function, args_in_reg: usize) -> Vec<Loc>;
    /// Emits the function epilogue. `stack_size` is the final frame size,
    /// known only after the whole function has been generated.
    fn end_func(&mut self, func: &Function, stack_size: u32);

    /// Generates code for any quadruple except `Copy`, `Param`, `Call`
    /// (those have their own hooks below).
    fn gen_code(&mut self, func: &Function, q: &Quadr, tracker: &mut Tracker);
    /// Generates a call to a user function or a built-in. `args` are in
    /// left-to-right order; `retvar` is `None` for a void call.
    fn gen_call(&mut self, func: &Function, callee: &Function, args: &[VarId], retvar: Option<VarId>, tracker: &mut Tracker);
    /// Generates a call to the built-in `printString`.
    fn gen_print_string(&mut self, s: &str);

    /// Copies whatever is at `src` into `dest`. Must not update the
    /// tracker (C4) - the tracker already knows `src` holds the value
    /// being moved, which is why it passes the location rather than the
    /// variable.
    fn gen_mov(&mut self, func: &Function, dest: Loc, src: Loc);
    /// Swaps the contents of two locations.
    fn gen_swap(&mut self, l1: Loc, l2: Loc);
    /// Emits a label definition.
    fn gen_label(&mut self, name: &str);

    /// The cheapest location to read `var` from, among those the tracker
    /// reports it currently holds.
    fn find_best_src_loc(&self, var: VarId, tracker: &Tracker) -> Option<Loc>;
    /// The cheapest location to write `var` into, among those the tracker
    /// reports it currently holds.
    fn find_best_dest_loc(&self, var: VarId, tracker: &Tracker) -> Option<Loc>;

    /// Marks an FPU register as physically free. May be a no-op.
    fn fpu_reg_free(&mut self, fpu_reg: u32);
    /// Pushes `var`, currently resident at `src`, onto the top of the FPU
    /// stack. Only called when `fpu_stack()` is true.
    fn gen_fpu_load(&mut self, func: &Function, var: VarId, src: Loc);
    /// Stores the FPU top into `loc` without popping.
    fn gen_fpu_store(&mut self, loc: Loc);
    /// Pops the FPU stack.
    fn gen_fpu_pop(&mut self, was_free: bool);

    fn fpu_stack(&self) -> bool;
    fn fast_swap(&self) -> bool;
    fn int_size(&self) -> u32;
    fn double_size(&self) -> u32;
    fn ptr_size(&self) -> u32;
    fn sp_size(&self) -> u32;
    fn reg_num(&self) -> u32;
    fn fpu_reg_num(&self) -> u32;
}
