//! Per-block local value-numbering DAG (spec.md §4.3): common
//! subexpression elimination, constant folding, and copy redirection.
//!
//! Arithmetic and `COPY` quadruples are buffered into the DAG without
//! emitting anything; any other opcode forces a flush, which replays the
//! DAG's net effect as a fresh quadruple sequence and resets.

use std::collections::HashMap;

use crate::common::*;
use crate::front::ast::Type;
use crate::middle::ir::*;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
struct NodeId(usize);

#[derive(Copy, Clone)]
enum NodeKind {
    Leaf(VarId),
    ConstInt(i64),
    ConstDouble(FloatBits),
    Internal(Op, NodeId, NodeId),
}

#[derive(Copy, Clone)]
enum ConstVal {
    Int(i64),
    Double(f64),
}

struct Node {
    kind: NodeKind,
    /// Variables currently holding this node's value (spec.md §4.3,
    /// "the set of variables last assigned its value").
    var_list: Vec<VarId>,
    /// Declared type, used to size a fresh temporary if this node ever
    /// needs to be materialized into one.
    ty: Type,
}

pub struct Dag {
    nodes: Vec<Node>,
    var_node: HashMap<VarId, NodeId>,
    const_int: HashMap<i64, NodeId>,
    const_double: HashMap<FloatBits, NodeId>,
    internal: HashMap<(Op, NodeId, NodeId), NodeId>,
}

impl Dag {
    pub fn new() -> Self {
        Dag {
            nodes: vec![],
            var_node: HashMap::new(),
            const_int: HashMap::new(),
            const_double: HashMap::new(),
            internal: HashMap::new(),
        }
    }

    fn push(&mut self, kind: NodeKind, ty: Type) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node { kind, var_list: vec![], ty });
        id
    }

    /// Resolves a variable operand to its current node, creating the
    /// original live-in leaf the first time `v` is referenced.
    fn leaf_for_var(&mut self, v: VarId, ty: Type) -> NodeId {
        if let Some(&id) = self.var_node.get(&v) {
            return id;
        }
        let id = self.push(NodeKind::Leaf(v), ty);
        self.nodes[id.0].var_list.push(v);
        self.var_node.insert(v, id);
        id
    }

    fn const_int(&mut self, v: i64) -> NodeId {
        if let Some(&id) = self.const_int.get(&v) {
            return id;
        }
        let id = self.push(NodeKind::ConstInt(v), Type::Int);
        self.const_int.insert(v, id);
        id
    }

    fn const_double(&mut self, v: FloatBits) -> NodeId {
        if let Some(&id) = self.const_double.get(&v) {
            return id;
        }
        let id = self.push(NodeKind::ConstDouble(v), Type::Double);
        self.const_double.insert(v, id);
        id
    }

    fn operand_node(&mut self, op: Operand, ty: Type) -> NodeId {
        match op {
            Operand::Var(v) => self.leaf_for_var(v, ty),
            Operand::Int(v) => self.const_int(v),
            Operand::Double(v) => self.const_double(FloatBits::from_f64(v)),
            other => panic!("internal error: non-value operand {other:?} reached the local optimizer"),
        }
    }

    fn const_value(&self, id: NodeId) -> Option<ConstVal> {
        match self.nodes[id.0].kind {
            NodeKind::ConstInt(v) => Some(ConstVal::Int(v)),
            NodeKind::ConstDouble(v) => Some(ConstVal::Double(v.to_f64())),
            _ => None,
        }
    }

    fn try_fold(&mut self, op: Op, l: NodeId, r: NodeId) -> Option<NodeId> {
        match (self.const_value(l)?, self.const_value(r)?) {
            (ConstVal::Int(a), ConstVal::Int(b)) => {
                let result = match op {
                    Op::Add => a.wrapping_add(b),
                    Op::Sub => a.wrapping_sub(b),
                    Op::Mul => a.wrapping_mul(b),
                    Op::Div if b == 0 => {
                        tracing::warn!("compile-time integer division by zero, folded to 1");
                        1
                    }
                    Op::Div => a.wrapping_div(b),
                    Op::Mod if b == 0 => {
                        tracing::warn!("compile-time integer modulo by zero, folded to 1");
                        1
                    }
                    Op::Mod => a.wrapping_rem(b),
                    _ => return None,
                };
                Some(self.const_int(result))
            }
            (ConstVal::Double(a), ConstVal::Double(b)) => {
                let result = match op {
                    Op::Add => a + b,
                    Op::Sub => a - b,
                    Op::Mul => a * b,
                    Op::Div if b == 0.0 => {
                        tracing::warn!("compile-time floating division by zero, folded to 1");
                        1.0
                    }
                    Op::Div => a / b,
                    Op::Mod if b == 0.0 => {
                        tracing::warn!("compile-time floating modulo by zero, folded to 1");
                        1.0
                    }
                    Op::Mod => a % b,
                    _ => return None,
                };
                Some(self.const_double(FloatBits::from_f64(result)))
            }
            _ => None,
        }
    }

    /// Gets or creates the internal node for `op(l, r)`, canonicalizing
    /// commutative operand order and constant-folding where possible.
    fn arith(&mut self, op: Op, mut l: NodeId, mut r: NodeId, ty: Type) -> NodeId {
        if op.is_commutative() && l.0 > r.0 {
            std::mem::swap(&mut l, &mut r);
        }
        if let Some(&id) = self.internal.get(&(op, l, r)) {
            return id;
        }
        let id = if let Some(folded) = self.try_fold(op, l, r) {
            folded
        } else {
            self.push(NodeKind::Internal(op, l, r), ty)
        };
        self.internal.insert((op, l, r), id);
        id
    }

    /// Redirects `v` to `node`, detaching it from whatever it previously
    /// held (spec.md §4.3: "For `COPY`, simply redirect the destination
    /// variable to the source node").
    fn bind(&mut self, v: VarId, node: NodeId) {
        if let Some(&old) = self.var_node.get(&v) {
            self.nodes[old.0].var_list.retain(|&x| x != v);
        }
        self.nodes[node.0].var_list.push(v);
        self.var_node.insert(v, node);
    }

    /// Recursively resolves `id` to an operand usable by its parent or by
    /// a trailing alias copy, materializing internal nodes into fresh
    /// temporaries and rescuing live-in leaves whose original variable is
    /// about to be overwritten by a *different* node (spec.md §4.3:
    /// "materializes live-in leaves' copies only if needed").
    fn resolve(
        &mut self,
        id: NodeId,
        func: &mut Function,
        out: &mut Vec<Quadr>,
        resolved: &mut HashMap<NodeId, Operand>,
    ) -> Operand {
        if let Some(&v) = resolved.get(&id) {
            return v;
        }
        let val = match self.nodes[id.0].kind {
            NodeKind::ConstInt(c) => Operand::Int(c),
            NodeKind::ConstDouble(c) => Operand::Double(c.to_f64()),
            NodeKind::Leaf(v) => {
                if self.var_node.get(&v) == Some(&id) {
                    Operand::Var(v)
                } else {
                    let tmp = func.declare_var(self.nodes[id.0].ty.clone(), None);
                    out.push(Quadr::new(Op::Copy, Operand::Var(tmp), Operand::Var(v), Operand::None));
                    Operand::Var(tmp)
                }
            }
            NodeKind::Internal(op, l, r) => {
                let lo = self.resolve(l, func, out, resolved);
                let ro = self.resolve(r, func, out, resolved);
                let tmp = func.declare_var(self.nodes[id.0].ty.clone(), None);
                out.push(Quadr::new(op, Operand::Var(tmp), lo, ro));
                Operand::Var(tmp)
            }
        };
        resolved.insert(id, val);
        val
    }

    /// Flushes every variable currently tracked by the DAG back into a
    /// quadruple sequence reproducing the block's net effect, in
    /// dependency order.
    fn flush(mut self, func: &mut Function) -> Vec<Quadr> {
        let mut out = vec![];
        let needed: Set<NodeId> = self.var_node.values().copied().collect();
        let mut resolved = HashMap::new();
        for &id in &needed {
            self.resolve(id, func, &mut out, &mut resolved);
        }
        for &id in &needed {
            let val = resolved[&id];
            let var_list = self.nodes[id.0].var_list.clone();
            for v in var_list {
                if val == Operand::Var(v) {
                    continue;
                }
                out.push(Quadr::new(Op::Copy, Operand::Var(v), val, Operand::None));
            }
        }
        out
    }
}

/// Runs the DAG over one block's quadruples and rewrites them in place.
pub fn optimize_block(func: &mut Function, id: BlockId) {
    let quadrs = std::mem::take(&mut func.block_mut(id).quadrs);
    let mut dag = Dag::new();
    let mut out = vec![];
    for q in quadrs {
        match q.op {
            Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Mod => {
                let ty = result_type(func, &q);
                let l = dag.operand_node(q.arg1, ty.clone());
                let r = dag.operand_node(q.arg2, ty.clone());
                let node = dag.arith(q.op, l, r, ty);
                if let Operand::Var(dst) = q.result {
                    dag.bind(dst, node);
                }
            }
            Op::Copy => {
                let ty = result_type(func, &q);
                let node = dag.operand_node(q.arg1, ty);
                if let Operand::Var(dst) = q.result {
                    dag.bind(dst, node);
                }
            }
            _ => {
                let dag_taken = std::mem::replace(&mut dag, Dag::new());
                out.extend(dag_taken.flush(func));
                out.push(q);
            }
        }
    }
    out.extend(dag.flush(func));
    func.block_mut(id).quadrs = out;
}

fn result_type(func: &Function, q: &Quadr) -> Type {
    match q.result {
        Operand::Var(v) => func.var(v).source_type.clone(),
        _ => Type::Int,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(func: &mut Function) -> VarId {
        func.declare_var(Type::Int, None)
    }

    #[test]
    fn common_subexpression_is_shared() {
        let mut func = Function::new(Id::from("f".to_string()), Type::Int, FuncKind::UserDefined);
        let a = var(&mut func);
        let b = var(&mut func);
        let t1 = var(&mut func);
        let t2 = var(&mut func);
        let block = func.new_block();
        func.block_mut(block).push(Quadr::new(Op::Add, Operand::Var(t1), Operand::Var(a), Operand::Var(b)));
        func.block_mut(block).push(Quadr::new(Op::Add, Operand::Var(t2), Operand::Var(a), Operand::Var(b)));
        func.block_mut(block).push(Quadr::new(Op::Call, Operand::None, Operand::Func(FuncId(0)), Operand::None));
        func.block_mut(block).push(Quadr::new(Op::Return, Operand::None, Operand::Var(t1), Operand::None));
        func.block_mut(block).push(Quadr::new(Op::Return, Operand::None, Operand::Var(t2), Operand::None));

        optimize_block(&mut func, block);

        let adds = func.block(block).quadrs.iter().filter(|q| q.op == Op::Add).count();
        assert_eq!(adds, 1, "t1 and t2 compute the same a+b and should share one ADD");
    }

    #[test]
    fn constant_arithmetic_is_folded() {
        let mut func = Function::new(Id::from("f".to_string()), Type::Int, FuncKind::UserDefined);
        let r = var(&mut func);
        let block = func.new_block();
        func.block_mut(block).push(Quadr::new(Op::Add, Operand::Var(r), Operand::Int(2), Operand::Int(3)));
        func.block_mut(block).push(Quadr::new(Op::Return, Operand::None, Operand::Var(r), Operand::None));

        optimize_block(&mut func, block);

        assert!(func.block(block).quadrs.iter().all(|q| q.op != Op::Add));
        let copy = func.block(block).quadrs.iter().find(|q| q.op == Op::Copy).unwrap();
        assert_eq!(copy.arg1, Operand::Int(5));
    }

    #[test]
    fn reassignment_rescues_the_original_value() {
        // t := x + 1; x := 99; return t;  -- must use x's *original* value.
        let mut func = Function::new(Id::from("f".to_string()), Type::Int, FuncKind::UserDefined);
        let x = var(&mut func);
        let t = var(&mut func);
        let block = func.new_block();
        func.block_mut(block).push(Quadr::new(Op::Add, Operand::Var(t), Operand::Var(x), Operand::Int(1)));
        func.block_mut(block).push(Quadr::new(Op::Copy, Operand::Var(x), Operand::Int(99), Operand::None));
        func.block_mut(block).push(Quadr::new(Op::Call, Operand::None, Operand::Func(FuncId(0)), Operand::None));

        optimize_block(&mut func, block);

        let quadrs = &func.block(block).quadrs;
        let add_pos = quadrs.iter().position(|q| q.op == Op::Add).unwrap();
        let x_write_pos = quadrs
            .iter()
            .position(|q| q.op == Op::Copy && q.result == Operand::Var(x))
            .unwrap();
        assert!(add_pos < x_write_pos, "x's original value must be read before it is overwritten");
    }
}
