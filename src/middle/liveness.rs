//! Global backward liveness analysis over the CFG (spec.md §4.4).

use crate::common::*;
use crate::middle::ir::{Block, Function};

/// Per-block `def` (vars assigned anywhere in the block) and `use` (map
/// from variable to its nearest-use distance, measured in quadruples from
/// the block's first instruction).
fn local_def_use(block: &Block) -> (Set<VarId>, Map<VarId, u32>) {
    let mut def = Set::new();
    let mut uses = Map::new();
    let mut locally_defined = Set::new();
    for (i, q) in block.quadrs.iter().enumerate() {
        for v in q.uses() {
            if !locally_defined.contains(&v) {
                uses.entry(v).or_insert(i as u32);
            }
        }
        if let Some(d) = q.def() {
            locally_defined.insert(d);
            def.insert(d);
        }
    }
    (def, uses)
}

fn merge_nearest(into: &mut Map<VarId, u32>, v: VarId, dist: u32) {
    into.entry(v)
        .and_modify(|cur| {
            if dist < *cur {
                *cur = dist;
            }
        })
        .or_insert(dist);
}

fn depth_first_order(func: &Function) -> Vec<usize> {
    let n = func.blocks.len();
    let mut order = vec![];
    let mut visited = vec![false; n];
    if n > 0 {
        let mut stack = vec![0usize];
        while let Some(i) = stack.pop() {
            if visited[i] {
                continue;
            }
            visited[i] = true;
            order.push(i);
            let block = &func.blocks[i];
            if let Some(c2) = block.child2 {
                stack.push(c2.0 as usize);
            }
            if let Some(c1) = block.child1 {
                stack.push(c1.0 as usize);
            }
        }
    }
    for i in 0..n {
        if !visited[i] {
            order.push(i);
        }
    }
    order
}

/// Runs the fixpoint and stores `live_at_end`/`vars_at_start` on every
/// block of `func`.
pub fn analyze(func: &mut Function) {
    let n = func.blocks.len();
    let def_use: Vec<(Set<VarId>, Map<VarId, u32>)> = func.blocks.iter().map(local_def_use).collect();
    let mut in_sets: Vec<Map<VarId, u32>> = vec![Map::new(); n];
    let mut out_sets: Vec<Map<VarId, u32>> = vec![Map::new(); n];
    let order = depth_first_order(func);

    let mut changed = true;
    while changed {
        changed = false;
        for &i in &order {
            let block = &func.blocks[i];
            let mut out_b = Map::new();
            for succ in [block.child1, block.child2].into_iter().flatten() {
                for (&v, &d) in &in_sets[succ.0 as usize] {
                    merge_nearest(&mut out_b, v, d);
                }
            }

            let (def, uses) = &def_use[i];
            let block_len = block.quadrs.len() as u32;
            let mut in_b = uses.clone();
            for (&v, &d) in &out_b {
                if !def.contains(&v) {
                    merge_nearest(&mut in_b, v, block_len + d);
                }
            }

            if in_b != in_sets[i] || out_b != out_sets[i] {
                changed = true;
            }
            in_sets[i] = in_b;
            out_sets[i] = out_b;
        }
    }

    for i in 0..n {
        let block = &mut func.blocks[i];
        block.live_at_end = out_sets[i].keys().copied().collect();
        block.vars_at_start = in_sets[i].clone();
    }
}

#[cfg(test)]
mod tests {
    use crate::front::check::check;
    use crate::front::parse::parse;
    use crate::middle::build::lower;
    use crate::middle::cfg::build_successors;
    use crate::middle::liveness::analyze;

    fn lower_src(src: &str) -> crate::middle::ir::Function {
        let prog = parse(src).unwrap();
        let checked = check(&prog).unwrap();
        let mut program = lower(&checked);
        let mut f = program.funcs.pop().unwrap();
        build_successors(&mut f);
        analyze(&mut f);
        f
    }

    #[test]
    fn variable_live_across_a_branch_is_carried_to_the_join() {
        let f = lower_src(
            "int main(){ int x; x = 1; if (x<10) { printInt(0); } else { printInt(1); } printInt(x); return 0; }",
        );
        let any_vars_at_start = f.blocks.iter().any(|b| !b.vars_at_start.is_empty());
        assert!(any_vars_at_start, "some block must need a variable carried in from a predecessor");
    }

    #[test]
    fn nothing_is_live_past_a_return() {
        let f = lower_src("int main(){ return 0; }");
        let ret_block = f.blocks.iter().find(|b| b.terminator().is_some()).unwrap();
        assert!(ret_block.live_at_end.is_empty());
    }
}
