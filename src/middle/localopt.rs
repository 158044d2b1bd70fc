//! The local optimizer's second pass (spec.md §4.3): runs on the
//! linearized, DAG-flushed quadruple list of each block.

use crate::common::*;
use crate::middle::dag;
use crate::middle::ir::*;

pub fn optimize_function(func: &mut Function) {
    for i in 0..func.blocks.len() {
        let id = BlockId(i as u32);
        dag::optimize_block(func, id);
        let mut quadrs = std::mem::take(&mut func.block_mut(id).quadrs);
        optimize_linear(&mut quadrs);
        func.block_mut(id).quadrs = quadrs;
    }
}

fn optimize_linear(quadrs: &mut Vec<Quadr>) {
    remove_trivial_copies(quadrs);
    remove_dead_assignments(quadrs);
    back_copy_propagate(quadrs);
    forward_copy_propagate(quadrs);
    remove_trivial_copies(quadrs);
    remove_dead_assignments(quadrs);
}

/// Step 1: `x := x`.
fn remove_trivial_copies(quadrs: &mut Vec<Quadr>) {
    quadrs.retain(|q| !(q.op == Op::Copy && q.result == q.arg1));
}

/// Step 2: an assignment immediately re-assigned within the block with no
/// intervening use is dead.
fn remove_dead_assignments(quadrs: &mut Vec<Quadr>) {
    let mut keep = vec![true; quadrs.len()];
    for i in 0..quadrs.len() {
        let Some(d) = quadrs[i].def() else { continue };
        for j in (i + 1)..quadrs.len() {
            if quadrs[j].uses().contains(&d) {
                break;
            }
            if quadrs[j].def() == Some(d) {
                keep[i] = false;
                break;
            }
        }
    }
    let mut idx = 0;
    quadrs.retain(|_| {
        let k = keep[idx];
        idx += 1;
        k
    });
}

/// Step 3: for `v0 := v1`, if `v0` is untouched between this copy and the
/// nearest backward assignment to `v1`, rename `v1 -> v0` across that span
/// (so the value is computed directly into `v0`) and swap the copy so
/// `v1` keeps working for anything still expecting it.
fn back_copy_propagate(quadrs: &mut [Quadr]) {
    for i in 0..quadrs.len() {
        let (op, result, arg1) = (quadrs[i].op, quadrs[i].result, quadrs[i].arg1);
        let (Op::Copy, Operand::Var(v0), Operand::Var(v1)) = (op, result, arg1) else {
            continue;
        };
        let Some(d) = (0..i).rev().find(|&j| quadrs[j].def() == Some(v1)) else {
            continue;
        };
        let clear = ((d + 1)..i).all(|k| !quadrs[k].uses().contains(&v0) && quadrs[k].def() != Some(v0));
        if !clear {
            continue;
        }
        rename_in_range(quadrs, d, i, v1, v0);
        quadrs[i].result = Operand::Var(v1);
        quadrs[i].arg1 = Operand::Var(v0);
    }
}

fn rename_in_range(quadrs: &mut [Quadr], start: usize, end: usize, from: VarId, to: VarId) {
    for q in &mut quadrs[start..end] {
        if q.arg1 == Operand::Var(from) {
            q.arg1 = Operand::Var(to);
        }
        if q.arg2 == Operand::Var(from) {
            q.arg2 = Operand::Var(to);
        }
        if q.result == Operand::Var(from) {
            q.result = Operand::Var(to);
        }
    }
}

/// Step 4: after `v0 := v1`, replace subsequent uses of `v0` with `v1`
/// until either is reassigned.
fn forward_copy_propagate(quadrs: &mut [Quadr]) {
    let mut active: Map<VarId, VarId> = Map::new();
    for q in quadrs.iter_mut() {
        let subs: Vec<(VarId, VarId)> = active.iter().map(|(&k, &v)| (k, v)).collect();
        for (from, to) in subs {
            if q.arg1 == Operand::Var(from) {
                q.arg1 = Operand::Var(to);
            }
            if q.arg2 == Operand::Var(from) {
                q.arg2 = Operand::Var(to);
            }
            if q.op == Op::WritePtr && q.result == Operand::Var(from) {
                q.result = Operand::Var(to);
            }
        }
        if let Some(d) = q.def() {
            active.retain(|&v0, &mut v1| v0 != d && v1 != d);
        }
        if let (Op::Copy, Operand::Var(v0), Operand::Var(v1)) = (q.op, q.result, q.arg1) {
            active.insert(v0, v1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(func: &mut Function) -> VarId {
        func.declare_var(crate::front::ast::Type::Int, None)
    }

    #[test]
    fn trivial_self_copy_is_removed() {
        let mut quadrs = vec![Quadr::new(Op::Copy, Operand::Var(VarId(0)), Operand::Var(VarId(0)), Operand::None)];
        remove_trivial_copies(&mut quadrs);
        assert!(quadrs.is_empty());
    }

    #[test]
    fn dead_reassignment_without_intervening_use_is_removed() {
        let mut func = Function::new(Id::from("f".to_string()), crate::front::ast::Type::Int, FuncKind::UserDefined);
        let x = var(&mut func);
        let mut quadrs = vec![
            Quadr::new(Op::Copy, Operand::Var(x), Operand::Int(1), Operand::None),
            Quadr::new(Op::Copy, Operand::Var(x), Operand::Int(2), Operand::None),
            Quadr::new(Op::Return, Operand::None, Operand::Var(x), Operand::None),
        ];
        remove_dead_assignments(&mut quadrs);
        assert_eq!(quadrs.len(), 2);
        assert_eq!(quadrs[0].arg1, Operand::Int(2));
    }

    #[test]
    fn forward_propagation_replaces_later_uses() {
        let mut func = Function::new(Id::from("f".to_string()), crate::front::ast::Type::Int, FuncKind::UserDefined);
        let v0 = var(&mut func);
        let v1 = var(&mut func);
        let mut quadrs = vec![
            Quadr::new(Op::Copy, Operand::Var(v0), Operand::Var(v1), Operand::None),
            Quadr::new(Op::Return, Operand::None, Operand::Var(v0), Operand::None),
        ];
        forward_copy_propagate(&mut quadrs);
        assert_eq!(quadrs[1].arg1, Operand::Var(v1));
    }
}
