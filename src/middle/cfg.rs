//! Builds CFG successor edges from each block's terminating quadruple
//! (spec.md §4.2). Runs once right after IR construction, and again after
//! the local optimizer in case it deleted a block's only instructions.

use crate::common::BlockId;
use crate::middle::ir::{Function, Op};

pub fn build_successors(func: &mut Function) {
    let next: Vec<Option<BlockId>> = (0..func.blocks.len())
        .map(|i| {
            let j = i + 1;
            (j < func.blocks.len()).then(|| BlockId(j as u32))
        })
        .collect();

    for i in 0..func.blocks.len() {
        let fallthrough = next[i];
        let block = &mut func.blocks[i];
        let (child1, child2) = match block.terminator() {
            None => (fallthrough, None),
            Some(q) if q.op == Op::Return => (None, None),
            Some(q) if q.op == Op::Goto => (target_of(q), None),
            Some(q) if q.op.is_if() => (target_of(q), fallthrough),
            Some(_) => (fallthrough, None),
        };
        block.child1 = child1;
        block.child2 = child2;
    }
}

fn target_of(q: &crate::middle::ir::Quadr) -> Option<BlockId> {
    match q.result {
        crate::middle::ir::Operand::Label(b) => Some(b),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::check::check;
    use crate::front::parse::parse;
    use crate::middle::build::lower;

    fn lower_src(src: &str) -> Function {
        let prog = parse(src).unwrap();
        let checked = check(&prog).unwrap();
        let mut program = lower(&checked);
        let mut f = program.funcs.pop().unwrap();
        build_successors(&mut f);
        f
    }

    #[test]
    fn straight_line_function_has_no_children() {
        let f = lower_src("int main(){ return 0; }");
        let ret_block = f.blocks.iter().find(|b| b.terminator().is_some()).unwrap();
        assert_eq!(ret_block.child1, None);
        assert_eq!(ret_block.child2, None);
    }

    #[test]
    fn if_statement_produces_taken_and_fallthrough_children() {
        let f = lower_src("int main(){ int x; if (1<2) { x=1; } else { x=2; } return x; }");
        let branch = f
            .blocks
            .iter()
            .find(|b| b.terminator().map(|q| q.op.is_if()).unwrap_or(false))
            .unwrap();
        assert!(branch.child1.is_some());
        assert!(branch.child2.is_some());
    }
}
